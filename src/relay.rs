//! Sequential multi-provider fallback.
//!
//! A [`FallbackRelay`] owns an ordered provider list for one logical
//! operation and tries each provider exactly once, in order, until one
//! returns a usable value. Provider failures are logged and swallowed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::normalize::{CaptionResult, ClassificationCandidate, DetectionResult, TranslationResult};
use crate::providers::ProviderError;

/// One upstream able to serve requests of type `Req`.
#[async_trait]
pub trait Provider<Req: ?Sized + Sync, Out>: Send + Sync {
    /// Stable name used in logs and in relay outcomes.
    fn name(&self) -> &str;

    /// Issues a single attempt against the upstream.
    async fn call(&self, req: &Req) -> Result<Out, ProviderError>;
}

/// Predicate deciding whether a provider answer ends the attempt chain.
pub trait Usable {
    fn is_usable(&self) -> bool;
}

impl Usable for TranslationResult {
    fn is_usable(&self) -> bool {
        !self.translated_text.is_empty()
    }
}

impl Usable for DetectionResult {
    fn is_usable(&self) -> bool {
        self.language.is_some()
    }
}

impl Usable for CaptionResult {
    fn is_usable(&self) -> bool {
        !self.caption_text.trim().is_empty()
    }
}

impl Usable for Vec<ClassificationCandidate> {
    fn is_usable(&self) -> bool {
        !self.is_empty()
    }
}

/// Result of running a relay to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome<Out> {
    /// First provider answer that passed [`Usable::is_usable`].
    Usable { provider: String, value: Out },
    /// Some provider answered but none usably; holds the first answer.
    Degenerate { provider: String, value: Out },
    /// Every provider failed at transport, status, or decode level.
    Exhausted,
}

impl<Out> RelayOutcome<Out> {
    /// Returns the usable value, if any.
    pub fn usable(self) -> Option<Out> {
        match self {
            Self::Usable { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Ordered provider chain for a single operation.
pub struct FallbackRelay<Req: ?Sized + Sync, Out> {
    operation: &'static str,
    providers: Vec<Arc<dyn Provider<Req, Out>>>,
}

impl<Req, Out> FallbackRelay<Req, Out>
where
    Req: ?Sized + Sync,
    Out: Usable,
{
    /// Creates an empty relay for `operation`.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            providers: Vec::new(),
        }
    }

    /// Appends a provider to the end of the chain.
    pub fn with(mut self, provider: impl Provider<Req, Out> + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Tries providers strictly in order and stops at the first usable answer.
    pub async fn run(&self, req: &Req) -> RelayOutcome<Out> {
        let mut first_answer: Option<(String, Out)> = None;

        for provider in &self.providers {
            debug!(
                operation = self.operation,
                provider = provider.name(),
                "trying provider"
            );
            match provider.call(req).await {
                Ok(value) if value.is_usable() => {
                    info!(
                        operation = self.operation,
                        provider = provider.name(),
                        "provider answered"
                    );
                    return RelayOutcome::Usable {
                        provider: provider.name().to_string(),
                        value,
                    };
                }
                Ok(value) => {
                    debug!(
                        operation = self.operation,
                        provider = provider.name(),
                        "provider answer not usable"
                    );
                    if first_answer.is_none() {
                        first_answer = Some((provider.name().to_string(), value));
                    }
                }
                Err(err) => {
                    warn!(
                        operation = self.operation,
                        provider = provider.name(),
                        error = %err,
                        "provider failed; moving on"
                    );
                }
            }
        }

        match first_answer {
            Some((provider, value)) => RelayOutcome::Degenerate { provider, value },
            None => RelayOutcome::Exhausted,
        }
    }
}
