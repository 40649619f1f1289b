pub mod config;
pub mod engine;
pub mod internship;
pub mod mcp;
pub mod providers;
pub mod types;

pub use config::Config;
pub use types::*;
