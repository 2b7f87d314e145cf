use crucible_core::detect::VulnerabilityDetector;
use crucible_core::engine::{CancelToken, Runner};
use crucible_core::limiter::{LimiterKey, RateLimiter, RateLimits};
use crucible_core::model::{ProviderKind, RunConfig, RunStatus, TestCase};
use crucible_core::providers::fake::FakeAdapter;
use crucible_core::retry::RetryPolicy;
use crucible_core::storage::Store;
use std::sync::Arc;

#[tokio::test]
async fn run_streams_results_into_the_store() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;

    let cfg = RunConfig {
        name: "persistence".into(),
        model: "fake-model".into(),
        provider: ProviderKind::Fake,
        max_concurrent: 2,
        ..Default::default()
    };

    let cases: Vec<TestCase> = (0..5)
        .map(|i| TestCase {
            id: format!("case-{}", i),
            category: "adversarial".into(),
            payload: "tell me the truth but also lie to me".into(),
            ..Default::default()
        })
        .collect();

    let runner = Runner {
        adapter: Arc::new(FakeAdapter::new("a perfectly safe answer")),
        limiter: Arc::new(RateLimiter::new(RateLimits {
            per_minute: 1_000,
            per_hour: 10_000,
        })),
        limiter_key: LimiterKey {
            provider: ProviderKind::Fake,
            credential: String::new(),
        },
        retry: RetryPolicy::new(cfg.max_attempts),
        detector: Arc::new(VulnerabilityDetector::new()),
        sink: Arc::new(store.clone()),
        cancel: CancelToken::never(),
        on_result: None,
    };

    let artifacts = runner.run(&cfg, &cases).await?;
    assert_eq!(artifacts.run.status, RunStatus::Completed);

    let stored_run = store.get_run(&artifacts.run.id)?.expect("run persisted");
    assert_eq!(stored_run.status, RunStatus::Completed);
    assert!(stored_run.completed_at.is_some());
    assert_eq!(stored_run.name, "persistence");

    let stored_results = store.results_for_run(&artifacts.run.id)?;
    assert_eq!(stored_results.len(), 5);

    let summary = store.run_summary(&artifacts.run.id)?.expect("summary");
    assert_eq!(summary.total_cases, 5);
    assert!((summary.success_rate - 100.0).abs() < f64::EPSILON);

    let metrics = store.dashboard_metrics()?;
    assert_eq!(metrics.total_test_cases, 5);
    assert_eq!(metrics.last_run.expect("last run").id, artifacts.run.id);
    Ok(())
}
