use super::{ensure_parent_dir, exit_codes};
use crate::cli::args::RunArgs;
use crucible_core::credentials::{CredentialSource, EnvCredentials};
use crucible_core::detect::VulnerabilityDetector;
use crucible_core::engine::{cancel_pair, Runner};
use crucible_core::limiter::{LimiterKey, RateLimiter, RateLimits};
use crucible_core::model::RunStatus;
use crucible_core::providers;
use crucible_core::report::console;
use crucible_core::retry::RetryPolicy;
use crucible_core::storage::Store;
use crucible_generators::{generate_seeded, AdversarialGenerator};
use std::sync::Arc;

pub async fn cmd_run(args: RunArgs) -> anyhow::Result<i32> {
    ensure_parent_dir(&args.db)?;

    let cfg = match crucible_core::config::load_config(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let cases = match &args.cases {
        Some(path) => match crucible_core::config::load_cases(path) {
            Ok(cases) => cases,
            Err(e) => {
                eprintln!("{}", e);
                return Ok(exit_codes::CONFIG_ERROR);
            }
        },
        None => {
            eprintln!("note: no --cases file given, generating a default adversarial batch");
            generate_seeded(&AdversarialGenerator, 20, 7)
        }
    };

    let secret = match EnvCredentials.get_credential(cfg.provider) {
        Ok(secret) => secret,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let store = Store::open(&args.db)?;
    store.init_schema()?;

    let (cancel_handle, cancel_token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received, cancelling run");
            cancel_handle.cancel();
        }
    });

    let runner = Runner {
        adapter: providers::build_adapter(&cfg, &secret),
        limiter: Arc::new(RateLimiter::new(RateLimits {
            per_minute: cfg.rate_limit_per_minute,
            per_hour: cfg.rate_limit_per_hour,
        })),
        limiter_key: LimiterKey {
            provider: cfg.provider,
            credential: secret.expose().to_string(),
        },
        retry: RetryPolicy::new(cfg.max_attempts),
        detector: Arc::new(VulnerabilityDetector::new()),
        sink: Arc::new(store.clone()),
        cancel: cancel_token,
        on_result: None,
    };

    let artifacts = runner.run(&cfg, &cases).await?;

    console::print_summary(&artifacts.results);
    console::print_metrics(&artifacts.metrics);
    eprintln!(
        "Run {} finished with status: {}",
        artifacts.run.id,
        artifacts.run.status.as_str()
    );

    if let Some(path) = &args.output {
        ensure_parent_dir(path)?;
        std::fs::write(path, serde_json::to_string_pretty(&artifacts.results)?)?;
        eprintln!("wrote results to {}", path.display());
    }

    Ok(match artifacts.run.status {
        RunStatus::Completed => exit_codes::OK,
        _ => exit_codes::RUN_FAILED,
    })
}
