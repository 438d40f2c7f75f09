mod credentials;
mod event;
mod request;

pub use credentials::*;
pub use event::*;
pub use request::*;
