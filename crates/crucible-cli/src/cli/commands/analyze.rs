use super::{ensure_parent_dir, exit_codes};
use crate::cli::args::AnalyzeArgs;
use crucible_core::aggregate::ResultAggregator;
use crucible_core::model::Classification;
use crucible_core::storage::Store;
use serde_json::json;

pub fn cmd_analyze(args: AnalyzeArgs) -> anyhow::Result<i32> {
    let store = Store::open(&args.db)?;
    store.init_schema()?;

    let run_id = match args.run_id {
        Some(id) => id,
        None => match store.recent_runs(1)?.into_iter().next() {
            Some(run) => run.id,
            None => {
                eprintln!("no runs stored in {}", args.db.display());
                return Ok(exit_codes::CONFIG_ERROR);
            }
        },
    };

    let Some(run) = store.get_run(&run_id)? else {
        eprintln!("run not found: {}", run_id);
        return Ok(exit_codes::CONFIG_ERROR);
    };
    let results = store.results_for_run(&run_id)?;

    let mut agg = ResultAggregator::new();
    for r in &results {
        agg.push(r);
    }

    let vulnerabilities: Vec<_> = results
        .iter()
        .flat_map(|r| {
            r.vulnerability_flags.iter().map(move |f| {
                json!({
                    "test_case_id": r.test_case_id,
                    "tag": f.tag,
                    "confidence": f.confidence,
                })
            })
        })
        .collect();

    let analysis = json!({
        "run_id": run.id,
        "name": run.name,
        "status": run.status.as_str(),
        "total_tests": agg.total(),
        "success_rate": agg.success_rate(),
        "average_latency": agg.average_latency(),
        "failure_categories": {
            "refusal": agg.count(Classification::Refusal),
            "crash": agg.count(Classification::Crash),
            "incorrect_output": agg.count(Classification::IncorrectOutput),
            "policy_violation": agg.count(Classification::PolicyViolation),
        },
        "vulnerabilities": vulnerabilities,
    });

    eprintln!("Analysis for run {} ({}):", run.id, run.status.as_str());
    eprintln!("  Total tests: {}", agg.total());
    eprintln!("  Success rate: {:.1}%", agg.success_rate());
    eprintln!("  Average latency: {:.0}ms", agg.average_latency());
    eprintln!("  Failure categories:");
    for (label, class) in [
        ("refusal", Classification::Refusal),
        ("crash", Classification::Crash),
        ("incorrect_output", Classification::IncorrectOutput),
        ("policy_violation", Classification::PolicyViolation),
    ] {
        eprintln!("    {}: {}", label, agg.count(class));
    }
    if !vulnerabilities.is_empty() {
        eprintln!("  Vulnerabilities found: {}", vulnerabilities.len());
        for v in vulnerabilities.iter().take(3) {
            eprintln!("    - {} ({})", v["tag"], v["test_case_id"]);
        }
    }

    if let Some(path) = &args.output {
        ensure_parent_dir(path)?;
        std::fs::write(path, serde_json::to_string_pretty(&analysis)?)?;
        eprintln!("wrote analysis to {}", path.display());
    }

    Ok(exit_codes::OK)
}
