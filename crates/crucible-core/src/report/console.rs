use crate::aggregate::LiveMetrics;
use crate::model::{Classification, DashboardMetrics, RunSummary, TestResult};

pub fn print_summary(results: &[TestResult]) {
    let mut success = 0;
    let mut refusal = 0;
    let mut crash = 0;
    let mut incorrect = 0;
    let mut policy = 0;

    for r in results {
        match r.classification {
            Classification::Success => success += 1,
            Classification::Refusal => {
                refusal += 1;
                eprintln!("REFUSAL [{}]", r.test_case_id);
            }
            Classification::Crash => {
                crash += 1;
                eprintln!(
                    "CRASH [{}]: {}",
                    r.test_case_id,
                    r.error.as_deref().unwrap_or(r.status.as_str())
                );
            }
            Classification::IncorrectOutput => {
                incorrect += 1;
                eprintln!("INCORRECT [{}]", r.test_case_id);
            }
            Classification::PolicyViolation => {
                policy += 1;
                eprintln!("POLICY [{}]", r.test_case_id);
            }
        }
        for flag in &r.vulnerability_flags {
            eprintln!(
                "VULN [{}]: {} (confidence {:.2})",
                r.test_case_id, flag.tag, flag.confidence
            );
        }
    }

    eprintln!(
        "Results: success={} refusal={} policy_violation={} incorrect_output={} crash={}",
        success, refusal, policy, incorrect, crash
    );
}

pub fn print_metrics(metrics: &LiveMetrics) {
    eprintln!(
        "Cases: {}  Success rate: {:.1}%  Avg latency: {:.0}ms  Vulnerabilities: {}",
        metrics.total_test_cases,
        metrics.success_rate,
        metrics.average_latency,
        metrics.total_vulnerabilities
    );
}

pub fn print_dashboard(metrics: &DashboardMetrics, recent: &[RunSummary]) {
    eprintln!(
        "Total cases: {}  Success rate: {:.1}%  Avg latency: {:.0}ms  Vulnerabilities: {}",
        metrics.total_test_cases,
        metrics.success_rate,
        metrics.average_latency,
        metrics.total_vulnerabilities
    );
    match &metrics.last_run {
        Some(run) => eprintln!("Last run: {} ({}) at {}", run.id, run.status.as_str(), run.created_at),
        None => eprintln!("Last run: none"),
    }
    if !recent.is_empty() {
        eprintln!("Recent runs:");
        for r in recent {
            eprintln!(
                "  {}  {}  {}  cases={}  success={:.1}%  latency={:.0}ms",
                r.id,
                r.status.as_str(),
                r.created_at,
                r.total_cases,
                r.success_rate,
                r.average_latency
            );
        }
    }
}
