pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use commands::CommandHandler;
pub use config::ConfigManager;
pub use error::{CliError, Result};
