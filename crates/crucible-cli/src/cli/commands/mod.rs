use super::args::*;
use std::path::Path;

pub mod analyze;
pub mod dashboard;
pub mod run;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const RUN_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => cmd_init(args),
        Command::Generate(args) => cmd_generate(args),
        Command::Run(args) => run::cmd_run(args).await,
        Command::Analyze(args) => analyze::cmd_analyze(args),
        Command::Dashboard(args) => dashboard::cmd_dashboard(args),
        Command::Cleanup(args) => cmd_cleanup(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    if args.config.exists() {
        eprintln!("note: {} already exists (skipped)", args.config.display());
        return Ok(exit_codes::OK);
    }
    if let Some(parent) = args.config.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    crucible_core::config::write_sample_config(&args.config).map_err(anyhow::Error::new)?;
    eprintln!("created {}", args.config.display());
    Ok(exit_codes::OK)
}

fn cmd_generate(args: GenerateArgs) -> anyhow::Result<i32> {
    let Some(generator) = crucible_generators::by_name(&args.kind) else {
        eprintln!("unknown generator kind: {}", args.kind);
        return Ok(exit_codes::CONFIG_ERROR);
    };

    let cases = crucible_generators::generate_seeded(generator.as_ref(), args.count, args.seed);
    tracing::info!(kind = %args.kind, count = cases.len(), seed = args.seed, "generated test cases");

    match &args.output {
        Some(path) => {
            ensure_parent_dir(path)?;
            std::fs::write(path, serde_json::to_string_pretty(&cases)?)?;
            eprintln!("wrote {} cases to {}", cases.len(), path.display());
        }
        None => {
            eprintln!("Generated {} {} test cases:", cases.len(), args.kind);
            for tc in cases.iter().take(5) {
                eprintln!(
                    "  {}  [{}]",
                    tc.id,
                    tc.subcategory.as_deref().unwrap_or("-")
                );
            }
            if cases.len() > 5 {
                eprintln!("  ... and {} more", cases.len() - 5);
            }
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_cleanup(args: CleanupArgs) -> anyhow::Result<i32> {
    let store = crucible_core::storage::Store::open(&args.db)?;
    store.init_schema()?;
    let pruned = store.prune_runs_older_than(args.days)?;
    eprintln!("pruned {} runs older than {} days", pruned, args.days);
    Ok(exit_codes::OK)
}

pub(crate) fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
