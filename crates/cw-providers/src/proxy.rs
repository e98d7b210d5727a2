//! Provider proxy: availability snapshot, preference ordering, fallback.
//!
//! The proxy never returns an error. Every failure ends up as a string in
//! the `error` field of a [`QueryOutcome`] or [`BestOutcome`], and a total
//! failure is reported with provider `none`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use cw_protocol::{AiMode, BestOutcome, ProviderDescriptor, ProviderKind, QueryOutcome};

use crate::error::ProviderError;
use crate::provider::{CompletionRequest, Provider};

/// Cloud preference, most capable first.
pub const CLOUD_ORDER: &[&str] = &["anthropic", "openai", "bedrock"];

/// Local preference.
pub const LOCAL_ORDER: &[&str] = &["ollama", "llamacpp"];

/// Providers tried first when a prompt needs deeper reasoning.
pub const HIGH_CAPABILITY: &[&str] = &["anthropic", "openai"];

/// Prompt fragments (lower-case) that mark a request as needing a
/// high-capability provider.
pub const REASONING_KEYWORDS: &[&str] = &[
    "exploit",
    "vulnerab",
    "evasion",
    "bypass",
    "privilege",
    "escalat",
    "lateral",
    "persistence",
    "obfuscat",
    "chain",
    "multi-step",
    "ambiguous",
];

/// Generation parameters and mode applied to every proxy query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProxySettings {
    pub mode: AiMode,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            mode: AiMode::Auto,
            max_tokens: 512,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Availability {
    available: bool,
    capacity: u32,
}

/// Whether the prompt mentions any reasoning keyword.
pub fn needs_reasoning(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    REASONING_KEYWORDS.iter().any(|k| lower.contains(k))
}

pub struct ProviderProxy {
    providers: Vec<Arc<dyn Provider>>,
    settings: ProxySettings,
    status: RwLock<HashMap<String, Availability>>,
}

impl ProviderProxy {
    /// Register providers and take the initial availability snapshot.
    pub async fn connect(providers: Vec<Arc<dyn Provider>>, settings: ProxySettings) -> Self {
        let proxy = Self {
            providers,
            settings,
            status: RwLock::new(HashMap::new()),
        };
        proxy.refresh().await;
        proxy
    }

    /// Re-probe every registered provider and replace the snapshot.
    pub async fn refresh(&self) {
        let mut snapshot = HashMap::with_capacity(self.providers.len());
        for provider in &self.providers {
            let availability = match provider.probe().await {
                Ok(capacity) => Availability {
                    available: true,
                    capacity,
                },
                Err(e) => {
                    tracing::debug!(provider = %provider.id(), error = %e, "provider unavailable");
                    Availability::default()
                }
            };
            snapshot.insert(provider.id().to_string(), availability);
        }

        let available = snapshot.values().filter(|a| a.available).count();
        tracing::info!(
            registered = self.providers.len(),
            available,
            mode = ?self.settings.mode,
            "provider availability refreshed"
        );
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    pub fn settings(&self) -> ProxySettings {
        self.settings
    }

    fn availability(&self, id: &str) -> Availability {
        self.status
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .copied()
            .unwrap_or_default()
    }

    fn find(&self, id: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    /// Descriptors for every provider the current mode allows, in
    /// registration order.
    pub fn list_providers(&self) -> Vec<ProviderDescriptor> {
        self.providers
            .iter()
            .filter(|p| self.settings.mode.allows(p.kind()))
            .map(|p| {
                let a = self.availability(p.id());
                p.descriptor(a.available, a.capacity)
            })
            .collect()
    }

    /// Registered, allowed by the mode, and available at the last probe.
    pub fn is_available(&self, id: &str) -> bool {
        self.find(id)
            .is_some_and(|p| self.settings.mode.allows(p.kind()) && self.availability(id).available)
    }

    /// Query one specific provider.
    pub async fn query(
        &self,
        id: &str,
        prompt: &str,
        system: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> QueryOutcome {
        let start = Instant::now();
        let result = match self.find(id) {
            None => Err(ProviderError::UnknownProvider(id.to_string())),
            Some(_) if !self.is_available(id) => {
                Err(ProviderError::Unavailable(format!("{id} is not available")))
            }
            Some(provider) => {
                let request = CompletionRequest {
                    prompt: prompt.to_string(),
                    system: system.to_string(),
                    max_tokens,
                    temperature,
                };
                provider.complete(&request).await
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                tracing::debug!(provider = %id, elapsed_ms, "provider answered");
                QueryOutcome {
                    response: Some(response),
                    elapsed_ms,
                    error: None,
                }
            }
            Err(e) => QueryOutcome {
                response: None,
                elapsed_ms,
                error: Some(e.to_string()),
            },
        }
    }

    /// Providers in the order the mode dictates, unavailable ones included.
    pub fn preference_order(&self) -> Vec<String> {
        let cloud = self.ranked(ProviderKind::Cloud, CLOUD_ORDER);
        let local = self.ranked(ProviderKind::Local, LOCAL_ORDER);
        match self.settings.mode {
            AiMode::Auto => cloud.into_iter().chain(local).collect(),
            AiMode::Hybrid => local.into_iter().chain(cloud).collect(),
            AiMode::Cloud => cloud,
            AiMode::Local => local,
        }
    }

    /// Providers of one kind: the static order first, unknown ids after in
    /// registration order.
    fn ranked(&self, kind: ProviderKind, order: &[&str]) -> Vec<String> {
        let of_kind: Vec<&str> = self
            .providers
            .iter()
            .filter(|p| p.kind() == kind)
            .map(|p| p.id())
            .collect();

        let mut ranked: Vec<String> = order
            .iter()
            .filter(|id| of_kind.contains(*id))
            .map(|id| id.to_string())
            .collect();
        ranked.extend(
            of_kind
                .iter()
                .filter(|id| !order.contains(*id))
                .map(|id| id.to_string()),
        );
        ranked
    }

    /// Walk `candidates` in order; the first available provider that answers wins.
    ///
    /// Returns the winner, or the last error seen (None if nothing was tried).
    async fn first_answer(
        &self,
        candidates: &[String],
        prompt: &str,
        system: &str,
        tried: &mut Vec<String>,
    ) -> Result<(String, String), Option<String>> {
        let mut last_error = None;
        for id in candidates {
            if tried.contains(id) || !self.is_available(id) {
                continue;
            }
            tried.push(id.clone());
            let outcome = self
                .query(
                    id,
                    prompt,
                    system,
                    self.settings.max_tokens,
                    self.settings.temperature,
                )
                .await;
            match (outcome.response, outcome.error) {
                (Some(response), None) => return Ok((id.clone(), response)),
                (_, error) => {
                    let error = error.unwrap_or_else(|| "no response".to_string());
                    tracing::warn!(provider = %id, error = %error, "provider query failed, trying next");
                    last_error = Some(format!("{id}: {error}"));
                }
            }
        }
        Err(last_error)
    }

    /// Query through the mode's preference order.
    pub async fn query_best(&self, prompt: &str, system: &str) -> BestOutcome {
        self.best_excluding(prompt, system, &mut Vec::new(), None)
            .await
    }

    async fn best_excluding(
        &self,
        prompt: &str,
        system: &str,
        tried: &mut Vec<String>,
        earlier_error: Option<String>,
    ) -> BestOutcome {
        let order = self.preference_order();
        match self.first_answer(&order, prompt, system, tried).await {
            Ok((provider, response)) => BestOutcome::answered(provider, response),
            Err(last) => match last.or(earlier_error) {
                Some(last) => {
                    tracing::warn!(last_error = %last, "all providers failed");
                    BestOutcome::none(format!("all providers failed; last error: {last}"))
                }
                None => BestOutcome::none("no AI provider available"),
            },
        }
    }

    /// Like [`query_best`](Self::query_best), but prompts that mention a
    /// reasoning keyword go to the high-capability providers first.
    /// Providers already tried are not retried in the fallback pass.
    pub async fn query_with_reasoning(&self, prompt: &str, system: &str) -> BestOutcome {
        let mut tried = Vec::new();
        let mut earlier_error = None;
        if needs_reasoning(prompt) {
            let preferred: Vec<String> = HIGH_CAPABILITY.iter().map(|id| id.to_string()).collect();
            tracing::debug!(candidates = ?preferred, "reasoning keywords matched");
            match self
                .first_answer(&preferred, prompt, system, &mut tried)
                .await
            {
                Ok((provider, response)) => return BestOutcome::answered(provider, response),
                Err(last) => {
                    tracing::debug!("high-capability providers missed, using default order");
                    earlier_error = last;
                }
            }
        }
        self.best_excluding(prompt, system, &mut tried, earlier_error)
            .await
    }
}
