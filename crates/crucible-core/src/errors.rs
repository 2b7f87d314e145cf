use std::fmt;

/// Invalid run configuration. Fatal: the run never starts.
#[derive(Debug, Clone)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Failure reported by a model adapter for a single execute call.
///
/// Adapters never retry internally; the retry policy decides which of these
/// are transient. `Auth` is run-fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    Auth(String),
    RateLimit(String),
    Network(String),
    Timeout { elapsed_ms: u64 },
    Provider { status: u16, message: String },
}

impl AdapterError {
    pub fn is_auth(&self) -> bool {
        matches!(self, AdapterError::Auth(_))
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::Auth(msg) => write!(f, "auth error: {}", msg),
            AdapterError::RateLimit(msg) => write!(f, "rate limited: {}", msg),
            AdapterError::Network(msg) => write!(f, "network error: {}", msg),
            AdapterError::Timeout { elapsed_ms } => {
                write!(f, "timed out after {}ms", elapsed_ms)
            }
            AdapterError::Provider { status, message } => {
                write!(f, "provider error {}: {}", status, message)
            }
        }
    }
}

impl std::error::Error for AdapterError {}

/// The rate limiter could not admit a request before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionTimeout {
    pub waited_ms: u64,
}

impl fmt::Display for AdmissionTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "admission timed out after {}ms", self.waited_ms)
    }
}

impl std::error::Error for AdmissionTimeout {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        assert_eq!(
            ConfigError("no tests".into()).to_string(),
            "config error: no tests"
        );
        assert_eq!(
            AdapterError::Provider {
                status: 503,
                message: "overloaded".into()
            }
            .to_string(),
            "provider error 503: overloaded"
        );
        assert_eq!(
            AdapterError::Timeout { elapsed_ms: 1200 }.to_string(),
            "timed out after 1200ms"
        );
        assert_eq!(
            AdmissionTimeout { waited_ms: 50 }.to_string(),
            "admission timed out after 50ms"
        );
    }

    #[test]
    fn auth_is_flagged() {
        assert!(AdapterError::Auth("expired".into()).is_auth());
        assert!(!AdapterError::Network("reset".into()).is_auth());
    }
}
