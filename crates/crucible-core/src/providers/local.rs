use super::{map_status, map_transport, Completion, ModelAdapter, RequestParams};
use crate::errors::AdapterError;
use crate::model::ProviderKind;
use async_trait::async_trait;
use serde_json::json;
use tokio::time::{Duration, Instant};

/// Self-hosted backend speaking the ollama-style generate API. No credential.
pub struct LocalAdapter {
    base_url: String,
    client: reqwest::Client,
}

impl LocalAdapter {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, prompt: &str, params: &RequestParams) -> Result<String, AdapterError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));

        let mut options = json!({});
        if let Some(t) = params.temperature {
            options["temperature"] = json!(t);
        }
        if let Some(m) = params.max_tokens {
            options["num_predict"] = json!(m);
        }
        let body = json!({
            "model": params.model,
            "prompt": prompt,
            "stream": false,
            "options": options,
        });

        let resp = self
            .client
            .post(&url)
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
            .get("response")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(AdapterError::Provider {
                status,
                message: "response missing content".to_string(),
            })
    }
}

#[async_trait]
impl ModelAdapter for LocalAdapter {
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
        ProviderKind::Local
    }
}
