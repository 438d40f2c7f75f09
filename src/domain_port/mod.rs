mod http_transport;
mod session_store;

pub use http_transport::*;
pub use session_store::*;
