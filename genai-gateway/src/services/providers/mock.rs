//! Mock provider implementation for testing.

use super::{FinishReason, ProviderError, ProviderResponse, TextProvider};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

enum Behavior {
    Echo,
    Responses(HashMap<String, String>),
    Fail(ProviderError),
}

/// Mock text provider for testing.
///
/// Records every prompt it receives so tests can assert on exactly what was
/// forwarded.
pub struct MockTextProvider {
    behavior: Behavior,
    delay: Option<Duration>,
    enabled: bool,
    calls: Mutex<Vec<String>>,
}

impl MockTextProvider {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: None,
            enabled: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the prompt unchanged.
    pub fn echo() -> Self {
        Self::with_behavior(Behavior::Echo)
    }

    /// Answers from a fixed prompt → text table; unknown prompts get an
    /// `ApiError`.
    pub fn with_responses<I, K, V>(responses: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::with_behavior(Behavior::Responses(
            responses
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// Fails every call with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self::with_behavior(Behavior::Fail(error))
    }

    /// A provider whose readiness check fails, as with a missing API key.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::echo()
        }
    }

    /// Sleep before answering, to force requests to overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompts received so far, in arrival order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(prompt.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if !self.enabled {
            return Err(ProviderError::NotConfigured(
                "Mock text provider not enabled".to_string(),
            ));
        }

        let text = match &self.behavior {
            Behavior::Echo => prompt.to_string(),
            Behavior::Responses(table) => table.get(prompt).cloned().ok_or_else(|| {
                ProviderError::ApiError(format!("No mock response for prompt {:?}", prompt))
            })?,
            Behavior::Fail(err) => return Err(err.clone()),
        };

        Ok(ProviderResponse {
            text,
            input_tokens: estimate_tokens(prompt.len()),
            output_tokens: 10,
            finish_reason: FinishReason::Complete,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.enabled {
            Ok(())
        } else {
            Err(ProviderError::NotConfigured(
                "Mock text provider not enabled".to_string(),
            ))
        }
    }
}

/// Rough token count at four bytes per token, saturating at `i32::MAX`.
fn estimate_tokens(len: usize) -> i32 {
    i32::try_from(len / 4).unwrap_or(i32::MAX)
}
