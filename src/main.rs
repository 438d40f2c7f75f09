use coursehub::app::App;
use coursehub::application_port::*;
use coursehub::domain_model::*;
use coursehub::logger::*;
use coursehub::settings::*;
use reqwest::Method;
use serde_json::{Value, json};
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap()?;

    let project_settings = parse_settings(cli.settings.as_deref())?;
    debug!(?project_settings);
    let logger_config = LogConfig {
        filter: project_settings.log.filter.clone(),
    };
    logger.reload_from_config(&logger_config)?;

    let app = App::try_new(&project_settings)?;
    let mut events = app.client.subscribe();

    let result = run(&app, cli.command).await;
    report_events(&mut events);

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(app: &App, command: Command) -> anyhow::Result<Value> {
    let client = &app.client;
    match command {
        Command::SignIn { email, password } => {
            client.sign_in(SignInInput { email, password }).await?;
            Ok(json!({ "signed_in": true }))
        }
        Command::SignOut => {
            client.sign_out().await?;
            Ok(json!({ "signed_in": false }))
        }
        Command::Status => Ok(json!({ "signed_in": client.is_signed_in().await? })),
        Command::Get { path, query } => {
            let mut request = ApiRequest::get(path);
            for pair in query {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow::anyhow!("query must be key=value, got {pair:?}"))?;
                request = request.with_query(key, value);
            }
            let response = client.request(request).await?;
            decode(response)
        }
        Command::Send { method, path, body } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())?;
            let mut request = ApiRequest::new(method, path);
            if let Some(body) = body {
                request = request.with_json(serde_json::from_str(&body)?);
            }
            let response = client.request(request).await?;
            decode(response)
        }
    }
}

fn decode(response: ApiResponse) -> anyhow::Result<Value> {
    let status = response.status;
    let body = response.json::<Value>().unwrap_or_else(|_| json!(response.text()));
    if !status.is_success() {
        return Err(anyhow::anyhow!("{status}: {body}"));
    }
    Ok(body)
}

fn report_events(events: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Expired { reason } => {
                warn!(%reason, "session expired, run `coursehub sign-in` again")
            }
            other => debug!(?other, "session event"),
        }
    }
}
