use crate::errors::ConfigError;
use crate::model::{RunConfig, TestCase};
use std::collections::HashSet;
use std::path::Path;

pub fn load_config(path: &Path) -> Result<RunConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;

    let mut ignored_keys = HashSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(&raw);

    // serde_ignored wrapper to capture unknown fields
    let cfg: RunConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    if !ignored_keys.is_empty() {
        tracing::warn!(keys = ?ignored_keys, "ignored unknown config fields");
    }

    validate(&cfg)?;
    Ok(cfg)
}

pub fn validate(cfg: &RunConfig) -> Result<(), ConfigError> {
    if cfg.model.trim().is_empty() {
        return Err(ConfigError("model must not be empty".into()));
    }
    if cfg.max_concurrent == 0 {
        return Err(ConfigError("max_concurrent must be at least 1".into()));
    }
    if cfg.per_request_timeout_ms == 0 {
        return Err(ConfigError("per_request_timeout_ms must be positive".into()));
    }
    if cfg.max_attempts == 0 {
        return Err(ConfigError("max_attempts must be at least 1".into()));
    }
    if cfg.rate_limit_per_minute == 0 || cfg.rate_limit_per_hour == 0 {
        return Err(ConfigError("rate limits must be at least 1".into()));
    }
    if cfg.admission_timeout_ms == 0 {
        return Err(ConfigError("admission_timeout_ms must be positive".into()));
    }
    Ok(())
}

/// Loads a batch of test cases from a JSON file (generator boundary: `id`,
/// `category` and `payload` required, ids unique within the batch).
pub fn load_cases(path: &Path) -> Result<Vec<TestCase>, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read cases {}: {}", path.display(), e)))?;
    let cases: Vec<TestCase> = serde_json::from_str(&raw)
        .map_err(|e| ConfigError(format!("failed to parse cases JSON: {}", e)))?;

    if cases.is_empty() {
        return Err(ConfigError("case file has no test cases".into()));
    }
    let mut seen = HashSet::new();
    for tc in &cases {
        if tc.id.is_empty() {
            return Err(ConfigError("test case with empty id".into()));
        }
        if !seen.insert(tc.id.as_str()) {
            return Err(ConfigError(format!("duplicate test case id: {}", tc.id)));
        }
        if tc.payload.is_empty() {
            return Err(ConfigError(format!("test case {} has empty payload", tc.id)));
        }
    }
    Ok(cases)
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(
        path,
        r#"name: smoke
model: gpt-4o-mini
provider: openai
max_concurrent: 4
per_request_timeout_ms: 30000
max_attempts: 3
rate_limit_per_minute: 60
rate_limit_per_hour: 1000
# admission_timeout_ms: 120000
# run_timeout_ms: 600000
# max_tokens: 512
# temperature: 0.1
# base_url: http://localhost:11434   # local provider only
"#,
    )
    .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RunConfig {
        RunConfig {
            model: "m".into(),
            ..Default::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&base()).is_ok());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let cfg = RunConfig {
            max_concurrent: 0,
            ..base()
        };
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_empty_model() {
        let cfg = RunConfig {
            model: " ".into(),
            ..base()
        };
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_zero_attempts_and_limits() {
        assert!(validate(&RunConfig {
            max_attempts: 0,
            ..base()
        })
        .is_err());
        assert!(validate(&RunConfig {
            rate_limit_per_minute: 0,
            ..base()
        })
        .is_err());
    }

    #[test]
    fn sample_config_round_trips() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("crucible.yaml");
        write_sample_config(&path)?;
        let cfg = load_config(&path)?;
        assert_eq!(cfg.name, "smoke");
        assert_eq!(cfg.max_concurrent, 4);
        Ok(())
    }

    #[test]
    fn load_cases_rejects_duplicates() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cases.json");
        std::fs::write(
            &path,
            r#"[{"id":"a","category":"c","payload":"p"},{"id":"a","category":"c","payload":"p"}]"#,
        )?;
        assert!(load_cases(&path).is_err());
        Ok(())
    }
}
