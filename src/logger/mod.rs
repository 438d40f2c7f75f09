//! The `logger` module is a thin wrapper over `tracing-subscriber`; it is
//! exercised by the `coursehub` binary rather than by unit tests.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
