pub mod app;
pub mod logger;
pub mod settings;

pub mod application_impl;
pub mod application_port;
pub mod domain_model;
pub mod domain_port;
pub mod infra_fake;
pub mod infra_file;
pub mod infra_memory;
pub mod infra_reqwest;
