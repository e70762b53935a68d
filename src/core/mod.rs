pub mod config;
pub mod error;
pub mod redact;
pub mod shutdown;
pub mod types;
