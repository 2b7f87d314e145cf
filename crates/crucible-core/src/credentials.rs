use crate::errors::AdapterError;
use crate::model::ProviderKind;
use std::fmt;

/// Secret material wrapper. Debug output is redacted so credential values
/// cannot leak through logs or error messages.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(****)")
    }
}

/// Credential boundary: resolves a usable credential per provider.
pub trait CredentialSource: Send + Sync {
    fn get_credential(&self, provider: ProviderKind) -> Result<Secret, AdapterError>;
}

/// Reads provider keys from the environment. Local and fake providers need
/// no credential and resolve to an empty secret.
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn get_credential(&self, provider: ProviderKind) -> Result<Secret, AdapterError> {
        let var = match provider {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Local | ProviderKind::Fake => return Ok(Secret::new(String::new())),
        };
        std::env::var(var)
            .map(Secret::new)
            .map_err(|_| AdapterError::Auth(format!("{} is not set", var)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let s = Secret::new("sk-very-secret".into());
        let dbg = format!("{:?}", s);
        assert!(!dbg.contains("sk-very-secret"));
        assert_eq!(s.expose(), "sk-very-secret");
    }

    #[test]
    fn fake_provider_needs_no_key() {
        let secret = EnvCredentials
            .get_credential(ProviderKind::Fake)
            .expect("fake provider");
        assert!(secret.is_empty());
    }
}
