//! taskcal CLI: configuration, local stores and commands.
//!
//! The binary in `main.rs` only parses arguments and dispatches here.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;
pub mod store;

pub use app::App;
pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use store::JsonFileStore;
