mod auth_service_remote;
mod authenticated_client;

pub use auth_service_remote::*;
pub use authenticated_client::*;
