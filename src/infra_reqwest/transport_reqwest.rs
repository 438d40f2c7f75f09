use crate::domain_model::{ApiRequest, ApiResponse};
use crate::domain_port::*;
use reqwest::Url;
use std::time::Duration;

pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidRequest(format!("base url {base_url:?}: {e}")))?;
        // Without the trailing slash `join` would drop the last path segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("coursehub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::InvalidRequest(format!("path {path:?}: {e}")))
    }
}

fn map_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(&request.path)?;
        let mut builder = self
            .client
            .request(request.method, url)
            .headers(request.headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_error)?.to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use reqwest::header::{AUTHORIZATION, HeaderValue};
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one connection: answers with the raw request head as JSON.
    async fn echo_once() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            let head = String::from_utf8_lossy(&received).to_string();
            let body = serde_json::json!({ "head": head }).to_string();
            let reply = format!(
                "HTTP/1.1 401 Unauthorized\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/api/v1")
    }

    #[test]
    fn joins_paths_under_base_path() {
        let transport =
            ReqwestTransport::new("https://learn.example.com/api/v1", Duration::from_secs(5))
                .unwrap();

        assert_eq!(
            transport.url_for("/courses/3").unwrap().as_str(),
            "https://learn.example.com/api/v1/courses/3"
        );
        assert_eq!(
            transport.url_for("auth/refresh-token").unwrap().as_str(),
            "https://learn.example.com/api/v1/auth/refresh-token"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            ReqwestTransport::new("not a url", Duration::from_secs(5)),
            Err(TransportError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn sends_headers_and_query_and_returns_status_unchanged() {
        let base = echo_once().await;
        let transport = ReqwestTransport::new(&base, Duration::from_secs(5)).unwrap();

        let request = ApiRequest::get("lessons")
            .with_query("course", "42")
            .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer t1"));
        let response = transport.send(request).await.unwrap();

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        let body: Value = response.json().unwrap();
        let head = body["head"].as_str().unwrap().to_lowercase();
        assert!(head.starts_with("get /api/v1/lessons?course=42 http/1.1"));
        assert!(head.contains("authorization: bearer t1"));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let transport =
            ReqwestTransport::new(&format!("http://{addr}"), Duration::from_millis(100)).unwrap();
        let result = transport.send(ApiRequest::get("courses")).await;

        assert!(matches!(result, Err(TransportError::Timeout)));
    }
}
