//! cmdweave command processor: the library crate behind the `cmdweave` binary.
//!
//! Re-exports all modules so external crates (e.g. `cw-e2e-tests`) can
//! drive the full pipeline: `CommandProcessor`, `HistoryStore`,
//! `HandlerRegistry` and the configuration types.

pub mod config;
pub mod direct;
pub mod handlers;
pub mod history;
pub mod processor;
pub mod translate;

pub use config::AppConfig;
pub use handlers::{AskHandler, CommandHandler, HandlerError, HandlerRegistry, HandlerResult};
pub use history::{HistoryError, HistoryResult, HistoryStore};
pub use processor::{CommandProcessor, ProcessorSettings};
