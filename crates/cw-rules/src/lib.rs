//! Rule-based intent classification and entity extraction.
//!
//! Pure pattern matching, no I/O: safe to run unconditionally as the fast
//! path before any model is consulted.
//!
//! - [`patterns`]: per-intent regex table and the scoring classifier.
//! - [`entities`]: target, port, option and phrase extractors.
//! - [`RuleExtractor`]: the [`Extractor`] implementation tying both together.

pub mod entities;
pub mod extractor;
pub mod patterns;

use cw_protocol::{EntityBag, Intent, ParsedCommand};

/// Deterministic text → (parsed command, intent, entities) pipeline.
///
/// Implementations must be pure: identical input yields identical output.
pub trait Extractor: Send + Sync {
    /// Tokenize and bucket entities without any intent context.
    fn parse(&self, text: &str) -> ParsedCommand;

    /// Pick an intent, or `Intent::Unknown` when nothing matches.
    fn classify(&self, text: &str, parsed: &ParsedCommand) -> Intent;

    /// Build the intent-specific entity bag.
    fn extract_entities(&self, text: &str, intent: Intent, parsed: &ParsedCommand) -> EntityBag;
}

pub use entities::{compress_ports, parse_port_spec};
pub use extractor::RuleExtractor;
