use chrono::Utc;
use crucible_core::model::{
    Classification, ResultStatus, RunConfig, RunStatus, TestResult, TestRun, VulnerabilityFlag,
};
use crucible_core::storage::{RunSink, Store};
use tempfile::tempdir;

fn sample_run() -> TestRun {
    TestRun::new(RunConfig {
        name: "smoke".into(),
        model: "fake-model".into(),
        ..Default::default()
    })
}

fn sample_result(run_id: &str, case_id: &str, class: Classification) -> TestResult {
    TestResult {
        test_case_id: case_id.into(),
        run_id: run_id.into(),
        model_name: "fake-model".into(),
        raw_response: Some("ok".into()),
        latency_ms: 120,
        attempt_count: 1,
        status: ResultStatus::Success,
        classification: class,
        vulnerability_flags: vec![VulnerabilityFlag {
            tag: "system-prompt-leak".into(),
            confidence: 0.8,
        }],
        error: None,
        timestamp: Utc::now(),
    }
}

#[test]
fn store_lifecycle_on_disk() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("crucible.db");

    let store = Store::open(&db_path)?;
    store.init_schema()?;

    let mut run = sample_run();
    run.transition(RunStatus::Running);
    store.update_run(&run)?;

    store.save_result(&sample_result(&run.id, "t1", Classification::Success))?;
    store.save_result(&sample_result(&run.id, "t2", Classification::Refusal))?;

    run.transition(RunStatus::Completed);
    store.update_run(&run)?;

    let loaded = store.get_run(&run.id)?.expect("run persisted");
    assert_eq!(loaded.status, RunStatus::Completed);
    assert!(loaded.completed_at.is_some());
    assert_eq!(loaded.config.model, "fake-model");

    let results = store.results_for_run(&run.id)?;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].test_case_id, "t1");
    assert_eq!(results[0].vulnerability_flags.len(), 1);
    assert_eq!(results[1].classification, Classification::Refusal);

    let summary = store.run_summary(&run.id)?.expect("summary");
    assert_eq!(summary.total_cases, 2);
    assert!((summary.success_rate - 50.0).abs() < f64::EPSILON);
    assert!((summary.average_latency - 120.0).abs() < f64::EPSILON);
    Ok(())
}

#[test]
fn completed_at_survives_later_updates() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;

    let mut run = sample_run();
    run.transition(RunStatus::Running);
    store.update_run(&run)?;
    run.transition(RunStatus::Cancelled);
    store.update_run(&run)?;

    let first = store.get_run(&run.id)?.expect("run").completed_at;
    assert!(first.is_some());

    // a stale writer re-sending the terminal state must not move the stamp
    store.update_run(&run)?;
    let second = store.get_run(&run.id)?.expect("run").completed_at;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn duplicate_result_for_same_case_is_rejected() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;

    let mut run = sample_run();
    run.transition(RunStatus::Running);
    store.update_run(&run)?;

    store.save_result(&sample_result(&run.id, "t1", Classification::Success))?;
    assert!(store
        .save_result(&sample_result(&run.id, "t1", Classification::Success))
        .is_err());
    Ok(())
}

#[test]
fn dashboard_metrics_aggregate_across_runs() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;

    for _ in 0..2 {
        let mut run = sample_run();
        run.transition(RunStatus::Running);
        store.update_run(&run)?;
        store.save_result(&sample_result(&run.id, "a", Classification::Success))?;
        store.save_result(&sample_result(&run.id, "b", Classification::Crash))?;
        run.transition(RunStatus::Completed);
        store.update_run(&run)?;
    }

    let metrics = store.dashboard_metrics()?;
    assert_eq!(metrics.total_test_cases, 4);
    assert!((metrics.success_rate - 50.0).abs() < f64::EPSILON);
    assert!((metrics.average_latency - 120.0).abs() < f64::EPSILON);
    assert_eq!(metrics.total_vulnerabilities, 4);
    let last = metrics.last_run.expect("last run present");
    assert_eq!(last.total_cases, 2);

    let recent = store.recent_runs(10)?;
    assert_eq!(recent.len(), 2);
    Ok(())
}

#[test]
fn prune_removes_only_old_runs() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;

    let mut old = sample_run();
    old.created_at = Utc::now() - chrono::Duration::days(90);
    old.transition(RunStatus::Running);
    store.update_run(&old)?;
    store.save_result(&sample_result(&old.id, "a", Classification::Success))?;

    let mut fresh = sample_run();
    fresh.transition(RunStatus::Running);
    store.update_run(&fresh)?;

    let pruned = store.prune_runs_older_than(30)?;
    assert_eq!(pruned, 1);
    assert!(store.get_run(&old.id)?.is_none());
    assert!(store.get_run(&fresh.id)?.is_some());
    Ok(())
}
