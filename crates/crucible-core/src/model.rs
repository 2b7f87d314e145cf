use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// One adversarial input unit submitted for execution. Immutable once created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_behavior: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProviderKind {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "fake")]
    Fake,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Local => "local",
            ProviderKind::Fake => "fake",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(ProviderKind::OpenAi),
            "anthropic" => Some(ProviderKind::Anthropic),
            "local" => Some(ProviderKind::Local),
            "fake" => Some(ProviderKind::Fake),
            _ => None,
        }
    }
}

/// Run configuration, snapshotted into the TestRun when orchestration begins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_timeout_ms")]
    pub per_request_timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_per_minute")]
    pub rate_limit_per_minute: u32,
    #[serde(default = "default_per_hour")]
    pub rate_limit_per_hour: u32,
    #[serde(default = "default_admission_timeout_ms")]
    pub admission_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            model: String::new(),
            provider: ProviderKind::default(),
            max_concurrent: default_max_concurrent(),
            per_request_timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            rate_limit_per_minute: default_per_minute(),
            rate_limit_per_hour: default_per_hour(),
            admission_timeout_ms: default_admission_timeout_ms(),
            run_timeout_ms: None,
            max_tokens: None,
            temperature: None,
            base_url: None,
        }
    }
}

fn default_name() -> String {
    "stress".to_string()
}
fn default_max_concurrent() -> usize {
    4
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_per_minute() -> u32 {
    60
}
fn default_per_hour() -> u32 {
    1_000
}
fn default_admission_timeout_ms() -> u64 {
    120_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    fn rank(&self) -> u8 {
        match self {
            RunStatus::Pending => 0,
            RunStatus::Running => 1,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => RunStatus::Pending,
            "running" => RunStatus::Running,
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            "cancelled" => RunStatus::Cancelled,
            _ => RunStatus::Failed,
        }
    }
}

static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

/// One execution batch with its own lifecycle and config snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub id: String,
    pub name: String,
    pub status: RunStatus,
    pub config: RunConfig,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TestRun {
    pub fn new(config: RunConfig) -> Self {
        let seq = RUN_SEQ.fetch_add(1, Ordering::Relaxed);
        let id = format!("run-{}-{}", Utc::now().timestamp_millis(), seq);
        Self {
            id,
            name: config.name.clone(),
            status: RunStatus::Pending,
            config,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Monotonic status transition: pending -> running -> terminal. Returns
    /// false (and leaves the run untouched) for any backward or
    /// terminal-to-terminal move. `completed_at` is set exactly once, on the
    /// first transition into a terminal status.
    pub fn transition(&mut self, next: RunStatus) -> bool {
        if self.status.is_terminal() || next.rank() <= self.status.rank() {
            return false;
        }
        self.status = next;
        if next.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Error,
    Timeout,
    Cancelled,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Error => "error",
            ResultStatus::Timeout => "timeout",
            ResultStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => ResultStatus::Success,
            "timeout" => ResultStatus::Timeout,
            "cancelled" => ResultStatus::Cancelled,
            _ => ResultStatus::Error,
        }
    }
}

/// Failure-taxonomy label assigned to every terminal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Refusal,
    Crash,
    IncorrectOutput,
    PolicyViolation,
    Success,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Refusal => "refusal",
            Classification::Crash => "crash",
            Classification::IncorrectOutput => "incorrect_output",
            Classification::PolicyViolation => "policy_violation",
            Classification::Success => "success",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "refusal" => Classification::Refusal,
            "incorrect_output" => Classification::IncorrectOutput,
            "policy_violation" => Classification::PolicyViolation,
            "success" => Classification::Success,
            _ => Classification::Crash,
        }
    }
}

/// A tagged, confidence-scored indicator of a successful attack pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerabilityFlag {
    pub tag: String,
    pub confidence: f64,
}

/// Terminal, immutable outcome of executing one TestCase within one TestRun.
/// The engine finalizes at most one of these per (run_id, test_case_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub test_case_id: String,
    pub run_id: String,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    pub latency_ms: u64,
    pub attempt_count: u32,
    pub status: ResultStatus,
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vulnerability_flags: Vec<VulnerabilityFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Per-run summary consumed by reporting surfaces. Latency in milliseconds,
/// rates as percentages 0-100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: String,
    pub name: String,
    pub status: RunStatus,
    pub created_at: String,
    pub total_cases: u64,
    pub success_rate: f64,
    pub average_latency: f64,
}

/// Aggregated metrics across all stored runs (dashboard contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total_test_cases: u64,
    pub success_rate: f64,
    pub average_latency: f64,
    pub total_vulnerabilities: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<RunSummary>,
}
