use crate::aggregate::{LiveMetrics, ResultAggregator};
use crate::classify;
use crate::config;
use crate::detect::VulnerabilityDetector;
use crate::errors::AdapterError;
use crate::limiter::{LimiterKey, RateLimiter};
use crate::model::{ResultStatus, RunConfig, RunStatus, TestCase, TestResult, TestRun};
use crate::providers::{ModelAdapter, RequestParams};
use crate::retry::RetryPolicy;
use crate::storage::RunSink;

use super::cancel::{cancel_pair, CancelHandle, CancelToken};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration, Instant};

/// Hook invoked after each result is finalized (realtime progress).
pub type ResultHook = Arc<dyn Fn(&TestResult) + Send + Sync>;

pub struct RunArtifacts {
    pub run: TestRun,
    /// One result per submitted case, in completion order.
    pub results: Vec<TestResult>,
    pub metrics: LiveMetrics,
}

/// Orchestrates one run: bounded concurrent dispatch through admission
/// control, centralized retries, classification, vulnerability detection and
/// online emission to the sink and aggregator.
pub struct Runner {
    pub adapter: Arc<dyn ModelAdapter>,
    pub limiter: Arc<RateLimiter>,
    pub limiter_key: LimiterKey,
    pub retry: RetryPolicy,
    pub detector: Arc<VulnerabilityDetector>,
    pub sink: Arc<dyn RunSink>,
    pub cancel: CancelToken,
    pub on_result: Option<ResultHook>,
}

struct WorkerCtx {
    adapter: Arc<dyn ModelAdapter>,
    limiter: Arc<RateLimiter>,
    limiter_key: LimiterKey,
    retry: RetryPolicy,
    detector: Arc<VulnerabilityDetector>,
    params: RequestParams,
    per_request_timeout: Duration,
    admission_timeout: Duration,
    model: String,
    run_id: String,
    cancel: CancelToken,
    handle: Arc<CancelHandle>,
    fatal: Arc<AtomicBool>,
}

impl Runner {
    /// Executes every test case and returns the finalized run.
    ///
    /// At most `max_concurrent` cases are in flight at any instant. Exactly
    /// one immutable result is emitted per submitted case: cases the run
    /// never admits (cancellation, deadline, fatal auth failure) are reported
    /// with `cancelled` status rather than dropped. Results stream to the
    /// sink, the aggregator and the optional hook as each case completes.
    pub async fn run(&self, cfg: &RunConfig, cases: &[TestCase]) -> anyhow::Result<RunArtifacts> {
        let mut run = TestRun::new(cfg.clone());

        if let Err(e) = config::validate(cfg) {
            tracing::error!(error = %e, "run configuration rejected");
            run.transition(RunStatus::Failed);
            self.sink.update_run(&run)?;
            return Ok(RunArtifacts {
                run,
                results: Vec::new(),
                metrics: ResultAggregator::new().snapshot(),
            });
        }

        run.transition(RunStatus::Running);
        self.sink.update_run(&run)?;
        tracing::info!(run = %run.id, cases = cases.len(), model = %cfg.model, "run started");

        let (handle, token) = cancel_pair();
        let handle = Arc::new(handle);

        // merge external cancellation and the run deadline into the run token
        {
            let external = self.cancel.clone();
            let internal = token.clone();
            let h = handle.clone();
            let deadline = cfg.run_timeout_ms.map(Duration::from_millis);
            tokio::spawn(async move {
                tokio::select! {
                    _ = internal.cancelled() => {}
                    _ = external.cancelled() => h.cancel(),
                    _ = sleep_opt(deadline) => h.cancel(),
                }
            });
        }

        let fatal = Arc::new(AtomicBool::new(false));
        let ctx = Arc::new(WorkerCtx {
            adapter: self.adapter.clone(),
            limiter: self.limiter.clone(),
            limiter_key: self.limiter_key.clone(),
            retry: self.retry.clone(),
            detector: self.detector.clone(),
            params: RequestParams::from_config(cfg),
            per_request_timeout: Duration::from_millis(cfg.per_request_timeout_ms),
            admission_timeout: Duration::from_millis(cfg.admission_timeout_ms),
            model: cfg.model.clone(),
            run_id: run.id.clone(),
            cancel: token.clone(),
            handle: handle.clone(),
            fatal: fatal.clone(),
        });

        let sem = Arc::new(Semaphore::new(cfg.max_concurrent));
        let mut join_set: JoinSet<TestResult> = JoinSet::new();
        let mut aggregator = ResultAggregator::new();
        let mut rows: Vec<TestResult> = Vec::with_capacity(cases.len());

        let mut queue = cases.to_vec().into_iter();
        let mut next_case = queue.next();

        loop {
            if next_case.is_none() && join_set.is_empty() {
                break;
            }
            tokio::select! {
                permit = Arc::clone(&sem).acquire_owned(),
                    if next_case.is_some()
                        && !token.is_cancelled()
                        && !fatal.load(Ordering::SeqCst) =>
                {
                    let Ok(permit) = permit else { break };
                    // the signal may have fired while the permit was in
                    // flight; re-check before admitting
                    if token.is_cancelled() || fatal.load(Ordering::SeqCst) {
                        drop(permit);
                        continue;
                    }
                    if let Some(case) = next_case.take() {
                        next_case = queue.next();
                        let ctx = ctx.clone();
                        join_set.spawn(async move {
                            let _permit = permit;
                            execute_case(ctx, case).await
                        });
                    }
                }
                joined = join_set.join_next(), if !join_set.is_empty() => {
                    if let Some(res) = joined {
                        let result = res.unwrap_or_else(|e| {
                            join_error_result(&run.id, &cfg.model, &e.to_string())
                        });
                        emit(
                            self.sink.as_ref(),
                            &self.on_result,
                            &mut aggregator,
                            &mut rows,
                            result,
                        )?;
                    }
                }
                _ = token.cancelled(), if !token.is_cancelled() && next_case.is_some() => {
                    // stop admitting; queued cases are reported below
                }
                else => break,
            }
        }

        // queued-but-never-admitted cases are reported, not dropped
        for case in next_case.take().into_iter().chain(queue) {
            let result = cancelled_result(&ctx, &case, 0);
            emit(
                self.sink.as_ref(),
                &self.on_result,
                &mut aggregator,
                &mut rows,
                result,
            )?;
        }

        let was_cancelled = token.is_cancelled();
        handle.cancel(); // release the deadline/cancel merge task

        let final_status = if fatal.load(Ordering::SeqCst) {
            RunStatus::Failed
        } else if was_cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        run.transition(final_status);
        self.sink.update_run(&run)?;

        let metrics = aggregator.snapshot();
        tracing::info!(
            run = %run.id,
            status = final_status.as_str(),
            results = rows.len(),
            success_rate = metrics.success_rate,
            "run finished"
        );
        Ok(RunArtifacts {
            run,
            results: rows,
            metrics,
        })
    }
}

fn emit(
    sink: &dyn RunSink,
    on_result: &Option<ResultHook>,
    aggregator: &mut ResultAggregator,
    rows: &mut Vec<TestResult>,
    result: TestResult,
) -> anyhow::Result<()> {
    sink.save_result(&result)?;
    aggregator.push(&result);
    if let Some(hook) = on_result {
        hook(&result);
    }
    rows.push(result);
    Ok(())
}

/// One test case's full lifecycle: admission -> execute -> retry loop ->
/// classify -> detect. Every suspension point also selects on the run token.
async fn execute_case(ctx: Arc<WorkerCtx>, case: TestCase) -> TestResult {
    let mut rng = StdRng::from_entropy();
    let mut attempts: u32 = 0;
    let mut last_error: Option<String> = None;
    let mut last_status = ResultStatus::Error;
    let mut last_latency: u64 = 0;

    while attempts < ctx.retry.max_attempts {
        if ctx.cancel.is_cancelled() {
            return cancelled_result(&ctx, &case, attempts);
        }
        // admission control guards every attempt, retries included
        let admission = tokio::select! {
            res = ctx.limiter.acquire(&ctx.limiter_key, ctx.admission_timeout) => res,
            _ = ctx.cancel.cancelled() => return cancelled_result(&ctx, &case, attempts),
        };
        if ctx.cancel.is_cancelled() {
            return cancelled_result(&ctx, &case, attempts);
        }
        attempts += 1;

        match admission {
            Err(timeout) => {
                last_error = Some(timeout.to_string());
                last_status = ResultStatus::Error;
            }
            Ok(_token) => {
                let attempt_started = Instant::now();
                let outcome = tokio::select! {
                    res = ctx
                        .adapter
                        .execute(&case.payload, &ctx.params, ctx.per_request_timeout) => res,
                    _ = ctx.cancel.cancelled() => return cancelled_result(&ctx, &case, attempts),
                };
                match outcome {
                    Ok(completion) => {
                        let classification = classify::classify(
                            Some(&completion.text),
                            ResultStatus::Success,
                            &case,
                        );
                        let flags = ctx.detector.scan(&case, Some(&completion.text));
                        return TestResult {
                            test_case_id: case.id.clone(),
                            run_id: ctx.run_id.clone(),
                            model_name: ctx.model.clone(),
                            raw_response: Some(completion.text),
                            latency_ms: completion.latency_ms,
                            attempt_count: attempts,
                            status: ResultStatus::Success,
                            classification,
                            vulnerability_flags: flags,
                            error: None,
                            timestamp: Utc::now(),
                        };
                    }
                    Err(err) => {
                        last_latency = attempt_started.elapsed().as_millis() as u64;
                        last_status = match err {
                            AdapterError::Timeout { .. } => ResultStatus::Timeout,
                            _ => ResultStatus::Error,
                        };
                        last_error = Some(err.to_string());
                        if err.is_auth() {
                            // known-bad credential: abort the whole run
                            ctx.fatal.store(true, Ordering::SeqCst);
                            ctx.handle.cancel();
                            tracing::error!(case = %case.id, "authentication failed, aborting run");
                            break;
                        }
                        if !RetryPolicy::is_transient(&err) {
                            break;
                        }
                    }
                }
            }
        }

        if attempts >= ctx.retry.max_attempts {
            break;
        }
        let delay = ctx.retry.backoff(attempts - 1, &mut rng);
        tracing::debug!(
            case = %case.id,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "transient failure, backing off"
        );
        tokio::select! {
            _ = sleep(delay) => {}
            _ = ctx.cancel.cancelled() => return cancelled_result(&ctx, &case, attempts),
        }
    }

    TestResult {
        test_case_id: case.id.clone(),
        run_id: ctx.run_id.clone(),
        model_name: ctx.model.clone(),
        raw_response: None,
        latency_ms: last_latency,
        attempt_count: attempts,
        status: last_status,
        classification: classify::classify(None, last_status, &case),
        vulnerability_flags: Vec::new(),
        error: last_error,
        timestamp: Utc::now(),
    }
}

fn cancelled_result(ctx: &WorkerCtx, case: &TestCase, attempts: u32) -> TestResult {
    TestResult {
        test_case_id: case.id.clone(),
        run_id: ctx.run_id.clone(),
        model_name: ctx.model.clone(),
        raw_response: None,
        latency_ms: 0,
        attempt_count: attempts,
        status: ResultStatus::Cancelled,
        classification: classify::classify(None, ResultStatus::Cancelled, case),
        vulnerability_flags: Vec::new(),
        error: None,
        timestamp: Utc::now(),
    }
}

fn join_error_result(run_id: &str, model: &str, message: &str) -> TestResult {
    TestResult {
        test_case_id: "unknown".to_string(),
        run_id: run_id.to_string(),
        model_name: model.to_string(),
        raw_response: None,
        latency_ms: 0,
        attempt_count: 0,
        status: ResultStatus::Error,
        classification: crate::model::Classification::Crash,
        vulnerability_flags: Vec::new(),
        error: Some(format!("task error: {}", message)),
        timestamp: Utc::now(),
    }
}

async fn sleep_opt(deadline: Option<Duration>) {
    match deadline {
        Some(d) => sleep(d).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::RateLimits;
    use crate::model::{Classification, ProviderKind};
    use crate::providers::fake::FakeAdapter;
    use crate::storage::NullSink;
    use std::collections::HashSet;

    fn cases(n: usize) -> Vec<TestCase> {
        (0..n)
            .map(|i| TestCase {
                id: format!("t{}", i),
                category: "adversarial".into(),
                payload: "hello".into(),
                ..Default::default()
            })
            .collect()
    }

    fn cfg(max_concurrent: usize) -> RunConfig {
        RunConfig {
            model: "fake-model".into(),
            provider: ProviderKind::Fake,
            max_concurrent,
            per_request_timeout_ms: 1_000,
            ..Default::default()
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base: Duration::from_millis(5),
            cap: Duration::from_millis(20),
        }
    }

    fn runner(adapter: Arc<FakeAdapter>, retry: RetryPolicy) -> Runner {
        Runner {
            adapter,
            limiter: Arc::new(RateLimiter::new(RateLimits {
                per_minute: 10_000,
                per_hour: 100_000,
            })),
            limiter_key: LimiterKey {
                provider: ProviderKind::Fake,
                credential: "test".into(),
            },
            retry,
            detector: Arc::new(VulnerabilityDetector::new()),
            sink: Arc::new(NullSink),
            cancel: CancelToken::never(),
            on_result: None,
        }
    }

    #[tokio::test]
    async fn ten_successes_respect_concurrency_bound() -> anyhow::Result<()> {
        let adapter = Arc::new(FakeAdapter::new("fine").with_delay(Duration::from_millis(30)));
        let r = runner(adapter.clone(), fast_retry(3));
        let artifacts = r.run(&cfg(3), &cases(10)).await?;

        assert_eq!(artifacts.run.status, RunStatus::Completed);
        assert_eq!(artifacts.results.len(), 10);
        for res in &artifacts.results {
            assert_eq!(res.status, ResultStatus::Success);
            assert_eq!(res.classification, Classification::Success);
            assert_eq!(res.attempt_count, 1);
        }
        assert!(adapter.max_concurrency_seen() <= 3);
        assert_eq!(artifacts.metrics.total_test_cases, 10);
        assert!((artifacts.metrics.success_rate - 100.0).abs() < f64::EPSILON);
        assert!(artifacts.metrics.average_latency >= 30.0);
        Ok(())
    }

    #[tokio::test]
    async fn rate_limit_then_success_counts_two_attempts() -> anyhow::Result<()> {
        let adapter = Arc::new(
            FakeAdapter::new("fine")
                .with_script(vec![Err(AdapterError::RateLimit("slow down".into()))]),
        );
        let r = runner(adapter.clone(), fast_retry(3));
        let artifacts = r.run(&cfg(1), &cases(1)).await?;

        let res = &artifacts.results[0];
        assert_eq!(res.status, ResultStatus::Success);
        assert_eq!(res.attempt_count, 2);
        assert_eq!(adapter.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn permanent_provider_error_is_not_retried() -> anyhow::Result<()> {
        let adapter = Arc::new(FakeAdapter::new("x").with_script(vec![Err(
            AdapterError::Provider {
                status: 400,
                message: "invalid request".into(),
            },
        )]));
        let r = runner(adapter.clone(), fast_retry(3));
        let artifacts = r.run(&cfg(1), &cases(1)).await?;

        let res = &artifacts.results[0];
        assert_eq!(res.status, ResultStatus::Error);
        assert_eq!(res.classification, Classification::Crash);
        assert_eq!(res.attempt_count, 1);
        assert_eq!(adapter.calls(), 1);
        assert_eq!(artifacts.run.status, RunStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn transient_errors_retry_up_to_max_attempts() -> anyhow::Result<()> {
        let adapter = Arc::new(FakeAdapter::new("x").with_script(vec![
            Err(AdapterError::Network("reset".into())),
            Err(AdapterError::Network("reset".into())),
            Err(AdapterError::Network("reset".into())),
        ]));
        let r = runner(adapter.clone(), fast_retry(3));
        let artifacts = r.run(&cfg(1), &cases(1)).await?;

        let res = &artifacts.results[0];
        assert_eq!(res.status, ResultStatus::Error);
        assert_eq!(res.attempt_count, 3);
        assert_eq!(adapter.calls(), 3);
        assert!(res.error.as_deref().unwrap_or("").contains("network"));
        // a per-case failure never aborts the run
        assert_eq!(artifacts.run.status, RunStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn adapter_timeout_yields_timeout_status() -> anyhow::Result<()> {
        let adapter = Arc::new(FakeAdapter::new("late").with_delay(Duration::from_millis(500)));
        let r = runner(adapter, fast_retry(1));
        let mut config = cfg(1);
        config.per_request_timeout_ms = 30;
        let artifacts = r.run(&config, &cases(1)).await?;

        let res = &artifacts.results[0];
        assert_eq!(res.status, ResultStatus::Timeout);
        assert_eq!(res.classification, Classification::Crash);
        Ok(())
    }

    #[tokio::test]
    async fn auth_error_fails_run_and_stops_admissions() -> anyhow::Result<()> {
        let adapter = Arc::new(
            FakeAdapter::new("x").with_script(vec![Err(AdapterError::Auth("bad key".into()))]),
        );
        let r = runner(adapter.clone(), fast_retry(3));
        let artifacts = r.run(&cfg(1), &cases(5)).await?;

        assert_eq!(artifacts.run.status, RunStatus::Failed);
        assert_eq!(artifacts.results.len(), 5);
        assert_eq!(adapter.calls(), 1);
        let errors = artifacts
            .results
            .iter()
            .filter(|r| r.status == ResultStatus::Error)
            .count();
        let cancelled = artifacts
            .results
            .iter()
            .filter(|r| r.status == ResultStatus::Cancelled)
            .count();
        assert_eq!(errors, 1);
        assert_eq!(cancelled, 4);
        Ok(())
    }

    #[tokio::test]
    async fn cancellation_reaches_every_case_quickly() -> anyhow::Result<()> {
        let adapter = Arc::new(FakeAdapter::new("slow").with_delay(Duration::from_millis(200)));
        let (handle, token) = cancel_pair();
        let mut r = runner(adapter, fast_retry(3));
        r.cancel = token;

        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        let started = Instant::now();
        let artifacts = r.run(&cfg(2), &cases(6)).await?;
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(artifacts.run.status, RunStatus::Cancelled);
        assert_eq!(artifacts.results.len(), 6);
        for res in &artifacts.results {
            assert_eq!(res.status, ResultStatus::Cancelled);
        }
        Ok(())
    }

    #[tokio::test]
    async fn run_deadline_behaves_like_cancellation() -> anyhow::Result<()> {
        let adapter = Arc::new(FakeAdapter::new("slow").with_delay(Duration::from_millis(200)));
        let r = runner(adapter, fast_retry(3));
        let mut config = cfg(1);
        config.run_timeout_ms = Some(50);
        let artifacts = r.run(&config, &cases(3)).await?;

        assert_eq!(artifacts.run.status, RunStatus::Cancelled);
        assert_eq!(artifacts.results.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn admission_timeout_counts_toward_attempts() -> anyhow::Result<()> {
        let adapter = Arc::new(FakeAdapter::new("fine"));
        let mut r = runner(adapter, fast_retry(2));
        r.limiter = Arc::new(RateLimiter::new(RateLimits {
            per_minute: 1,
            per_hour: 1_000,
        }));
        let mut config = cfg(2);
        config.admission_timeout_ms = 20;
        let artifacts = r.run(&config, &cases(2)).await?;

        let ok = artifacts
            .results
            .iter()
            .filter(|r| r.status == ResultStatus::Success)
            .count();
        let err: Vec<_> = artifacts
            .results
            .iter()
            .filter(|r| r.status == ResultStatus::Error)
            .collect();
        assert_eq!(ok, 1);
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].attempt_count, 2);
        assert!(err[0].error.as_deref().unwrap_or("").contains("admission"));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_config_fails_run_without_dispatch() -> anyhow::Result<()> {
        let adapter = Arc::new(FakeAdapter::new("x"));
        let r = runner(adapter.clone(), fast_retry(3));
        let mut config = cfg(1);
        config.max_concurrent = 0;
        let artifacts = r.run(&config, &cases(3)).await?;

        assert_eq!(artifacts.run.status, RunStatus::Failed);
        assert!(artifacts.results.is_empty());
        assert_eq!(adapter.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn result_stream_is_exhaustive_with_unique_ids() -> anyhow::Result<()> {
        let adapter = Arc::new(FakeAdapter::new("fine").with_script(vec![
            Err(AdapterError::Network("blip".into())),
            Err(AdapterError::Provider {
                status: 502,
                message: "bad gateway".into(),
            }),
        ]));
        let r = runner(adapter, fast_retry(1));
        let submitted = cases(20);
        let artifacts = r.run(&cfg(4), &submitted).await?;

        assert_eq!(artifacts.results.len(), 20);
        let ids: HashSet<_> = artifacts
            .results
            .iter()
            .map(|r| r.test_case_id.clone())
            .collect();
        let expected: HashSet<_> = submitted.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, expected);
        Ok(())
    }

    #[tokio::test]
    async fn hook_sees_results_as_they_complete() -> anyhow::Result<()> {
        let adapter = Arc::new(FakeAdapter::new("fine"));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut r = runner(adapter, fast_retry(1));
        let sink_seen = seen.clone();
        r.on_result = Some(Arc::new(move |res: &TestResult| {
            sink_seen.lock().unwrap().push(res.test_case_id.clone());
        }));
        let artifacts = r.run(&cfg(2), &cases(4)).await?;
        assert_eq!(seen.lock().unwrap().len(), 4);
        assert_eq!(artifacts.results.len(), 4);
        Ok(())
    }
}
