//! Settings come from a TOML file with `COURSEHUB__*` environment overrides.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
