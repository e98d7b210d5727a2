//! Scripted reasoner for processor and end-to-end tests.
//!
//! Each method pops its own FIFO queue; an empty queue yields a neutral
//! answer (unknown intent, nothing resolved). Every call is recorded.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use cw_protocol::{
    ActionPlan, AmbiguityResolution, EntityBag, EntityResolution, Intent, ParsedCommand,
    UnderstandingResult,
};

use crate::engine::Reasoner;

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum ReasonerCall {
    Understand { text: String },
    ResolveEntities { text: String, intent: Intent, missing: Vec<String> },
    ResolveAmbiguity { text: String, candidates: Vec<String> },
    PlanActions { text: String, intent: Intent },
}

#[derive(Default)]
pub struct MockReasoner {
    understandings: Mutex<VecDeque<UnderstandingResult>>,
    resolutions: Mutex<VecDeque<EntityResolution>>,
    calls: Mutex<Vec<ReasonerCall>>,
}

impl MockReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result for `understand_command`.
    pub fn with_understanding(self, result: UnderstandingResult) -> Self {
        self.understandings.lock().unwrap().push_back(result);
        self
    }

    /// Convenience: queue a provider-sourced understanding.
    pub fn understands(self, intent: Intent, confidence: f64, entities: EntityBag) -> Self {
        self.with_understanding(UnderstandingResult {
            intent,
            confidence,
            entities,
            reasoning: format!("mock chose {intent}"),
            source: "mock".into(),
        })
    }

    /// Queue a result for `resolve_entities`.
    pub fn with_resolution(self, resolution: EntityResolution) -> Self {
        self.resolutions.lock().unwrap().push_back(resolution);
        self
    }

    pub fn calls(&self) -> Vec<ReasonerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: ReasonerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Reasoner for MockReasoner {
    async fn understand_command(&self, text: &str, _parsed: &ParsedCommand) -> UnderstandingResult {
        self.record(ReasonerCall::Understand { text: text.to_string() });
        self.understandings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| UnderstandingResult::unavailable("mock reasoner has no scripted answer"))
    }

    async fn resolve_entities(
        &self,
        text: &str,
        intent: Intent,
        _entities: &EntityBag,
        missing: &[String],
    ) -> EntityResolution {
        self.record(ReasonerCall::ResolveEntities {
            text: text.to_string(),
            intent,
            missing: missing.to_vec(),
        });
        self.resolutions.lock().unwrap().pop_front().unwrap_or_default()
    }

    async fn resolve_ambiguity(&self, text: &str, candidates: &[String]) -> AmbiguityResolution {
        self.record(ReasonerCall::ResolveAmbiguity {
            text: text.to_string(),
            candidates: candidates.to_vec(),
        });
        AmbiguityResolution::default()
    }

    async fn plan_actions(&self, text: &str, intent: Intent, _entities: &EntityBag) -> ActionPlan {
        self.record(ReasonerCall::PlanActions {
            text: text.to_string(),
            intent,
        });
        ActionPlan::default()
    }
}
