use crate::credentials::Secret;
use crate::errors::AdapterError;
use crate::model::{ProviderKind, RunConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Duration;

pub mod anthropic;
pub mod fake;
pub mod local;
pub mod openai;

/// Sampling parameters forwarded to the provider on every call.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl RequestParams {
    pub fn from_config(cfg: &RunConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        }
    }
}

/// One provider call outcome: the response text plus observed latency.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub latency_ms: u64,
}

/// Uniform execution capability over one model provider.
///
/// Adapters never retry internally, and must honor `timeout`: a call that
/// cannot finish by the deadline resolves to `AdapterError::Timeout` instead
/// of hanging.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    async fn execute(
        &self,
        prompt: &str,
        params: &RequestParams,
        timeout: Duration,
    ) -> Result<Completion, AdapterError>;

    fn provider(&self) -> ProviderKind;
}

/// Selects the adapter variant for a run configuration.
pub fn build_adapter(cfg: &RunConfig, secret: &Secret) -> Arc<dyn ModelAdapter> {
    match cfg.provider {
        ProviderKind::OpenAi => {
            let mut a = openai::OpenAiAdapter::new(secret.clone());
            if let Some(url) = &cfg.base_url {
                a = a.with_base_url(url.clone());
            }
            Arc::new(a)
        }
        ProviderKind::Anthropic => {
            let mut a = anthropic::AnthropicAdapter::new(secret.clone());
            if let Some(url) = &cfg.base_url {
                a = a.with_base_url(url.clone());
            }
            Arc::new(a)
        }
        ProviderKind::Local => Arc::new(local::LocalAdapter::new(
            cfg.base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
        )),
        ProviderKind::Fake => Arc::new(fake::FakeAdapter::default()),
    }
}

/// Maps a non-2xx provider response to the error taxonomy.
pub(crate) fn map_status(status: u16, body: &str) -> AdapterError {
    match status {
        401 | 403 => AdapterError::Auth(truncate(body)),
        429 => AdapterError::RateLimit(truncate(body)),
        s => AdapterError::Provider {
            status: s,
            message: truncate(body),
        },
    }
}

/// Maps a reqwest transport failure to the error taxonomy.
pub(crate) fn map_transport(err: reqwest::Error) -> AdapterError {
    AdapterError::Network(err.to_string())
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}
