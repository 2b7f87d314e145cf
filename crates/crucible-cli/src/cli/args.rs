use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "crucible",
    version,
    about = "Stress-testing and red-team harness for LLM endpoints"
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    Init(InitArgs),
    Generate(GenerateArgs),
    Run(RunArgs),
    Analyze(AnalyzeArgs),
    Dashboard(DashboardArgs),
    Cleanup(CleanupArgs),
    Version,
}

#[derive(Parser, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "crucible.yaml")]
    pub config: PathBuf,
}

#[derive(Parser, Clone)]
pub struct GenerateArgs {
    /// Number of test cases to generate
    #[arg(long, default_value_t = 10)]
    pub count: usize,

    /// Generator family: adversarial | prompt_injection | edge_case
    #[arg(long, default_value = "adversarial")]
    pub kind: String,

    /// Output file (JSON); prints a preview when omitted
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// RNG seed, for reproducible batches
    #[arg(long, default_value_t = 7)]
    pub seed: u64,
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    #[arg(long, default_value = "crucible.yaml")]
    pub config: PathBuf,

    /// Test cases file (JSON); a default adversarial batch is generated
    /// when omitted
    #[arg(long)]
    pub cases: Option<PathBuf>,

    #[arg(long, default_value = ".crucible/crucible.db")]
    pub db: PathBuf,

    /// Write per-case results to this JSON file
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct AnalyzeArgs {
    #[arg(long, default_value = ".crucible/crucible.db")]
    pub db: PathBuf,

    /// Run to analyze; the most recent run when omitted
    #[arg(long)]
    pub run_id: Option<String>,

    /// Write the analysis to this JSON file
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct DashboardArgs {
    #[arg(long, default_value = ".crucible/crucible.db")]
    pub db: PathBuf,

    /// Number of recent runs to list
    #[arg(long, default_value_t = 10)]
    pub last: u32,
}

#[derive(Parser, Clone)]
pub struct CleanupArgs {
    #[arg(long, default_value = ".crucible/crucible.db")]
    pub db: PathBuf,

    /// Delete runs older than this many days
    #[arg(long, default_value_t = 30)]
    pub days: i64,
}
