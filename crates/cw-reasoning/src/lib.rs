//! Model-backed command understanding for cmdweave.
//!
//! - [`prompts`]: named templates.
//! - [`repair`]: ordered strategies for recovering a JSON object from
//!   malformed model output.
//! - [`engine`]: the [`Reasoner`] trait and its proxy-backed implementation.
//! - [`MockReasoner`]: scripted reasoner for tests.

pub mod engine;
pub mod mock;
pub mod prompts;
pub mod repair;

pub use engine::{DEFAULT_CONFIDENCE, Reasoner, ReasoningEngine};
pub use mock::MockReasoner;
pub use prompts::PromptStore;
pub use repair::{RepairCascade, RepairStrategy, Repaired};
