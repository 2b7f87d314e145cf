use super::{map_status, map_transport, Completion, ModelAdapter, RequestParams};
use crate::credentials::Secret;
use crate::errors::AdapterError;
use crate::model::ProviderKind;
use async_trait::async_trait;
use serde_json::json;
use tokio::time::{Duration, Instant};

pub struct OpenAiAdapter {
    api_key: Secret,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(api_key: Secret) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Points the adapter at a non-default endpoint (mock server, proxy,
    /// OpenAI-compatible gateway).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn call(&self, prompt: &str, params: &RequestParams) -> Result<String, AdapterError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut body = json!({
            "model": params.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(t) = params.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = params.max_tokens {
            body["max_tokens"] = json!(m);
        }

        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_status(status, &text));
        }

        let payload: serde_json::Value = resp.json().await.map_err(|e| AdapterError::Provider {
            status,
            message: format!("malformed response body: {}", e),
        })?;

        payload
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(AdapterError::Provider {
                status,
                message: "response missing content".to_string(),
            })
    }
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    async fn execute(
        &self,
        prompt: &str,
        params: &RequestParams,
        timeout: Duration,
    ) -> Result<Completion, AdapterError> {
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.call(prompt, params)).await {
            Ok(Ok(text)) => Ok(Completion {
                text,
                latency_ms: started.elapsed().as_millis() as u64,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AdapterError::Timeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }
}
