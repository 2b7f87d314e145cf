use super::{Completion, ModelAdapter, RequestParams};
use crate::errors::AdapterError;
use crate::model::ProviderKind;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Deterministic offline adapter for tests and dry runs.
///
/// Scripted outcomes are consumed in order; once the script is exhausted the
/// adapter settles on a fixed response. Concurrency is instrumented so tests
/// can assert the runner's in-flight bound.
pub struct FakeAdapter {
    response: String,
    delay: Duration,
    script: Mutex<VecDeque<Result<String, AdapterError>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for FakeAdapter {
    fn default() -> Self {
        Self::new("ok")
    }
}

impl FakeAdapter {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_script(self, outcomes: Vec<Result<String, AdapterError>>) -> Self {
        *self.script.lock().unwrap() = outcomes.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrency_seen(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelAdapter for FakeAdapter {
    async fn execute(
        &self,
        _prompt: &str,
        _params: &RequestParams,
        timeout: Duration,
    ) -> Result<Completion, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let outcome = self.script.lock().unwrap().pop_front();
        let started = Instant::now();
        let work = async {
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            match outcome {
                Some(res) => res,
                None => Ok(self.response.clone()),
            }
        };
        let res = match tokio::time::timeout(timeout, work).await {
            Ok(res) => res,
            Err(_) => Err(AdapterError::Timeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        res.map(|text| Completion {
            text,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::Fake
    }
}
