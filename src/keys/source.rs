//! Backing sources for key material

use std::path::PathBuf;
use std::time::Duration;

use super::{KeyError, KeyKind, SecretValue};

/// Default cache TTL for file-backed keys
pub const FILE_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default cache TTL for environment-backed keys
pub const ENV_CACHE_TTL: Duration = Duration::from_secs(60);

/// A single place key material can be loaded from
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Plain-text file holding exactly one value
    File(PathBuf),

    /// Environment variable, re-read on every load
    Env(String),

    /// Value fixed at startup
    Static(SecretValue),
}

impl KeySource {
    /// Load the value from this source.
    ///
    /// Surrounding whitespace is trimmed; an empty result is an error.
    pub fn load(&self) -> Result<SecretValue, KeyError> {
        match self {
            KeySource::File(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| KeyError::FileRead {
                    path: path.display().to_string(),
                    source: e,
                })?;
                let value = raw.trim();
                if value.is_empty() {
                    return Err(KeyError::EmptyFile(path.display().to_string()));
                }
                Ok(SecretValue::from(value))
            }
            KeySource::Env(var) => {
                let raw = std::env::var(var).map_err(|_| KeyError::EnvUnset(var.clone()))?;
                let value = raw.trim();
                if value.is_empty() {
                    return Err(KeyError::EnvEmpty(var.clone()));
                }
                Ok(SecretValue::from(value))
            }
            KeySource::Static(value) => Ok(value.clone()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            KeySource::File(path) => format!("file:{}", path.display()),
            KeySource::Env(var) => format!("env:{var}"),
            KeySource::Static(_) => "static".to_string(),
        }
    }

    fn default_ttl(&self) -> Duration {
        match self {
            KeySource::File(_) | KeySource::Static(_) => FILE_CACHE_TTL,
            KeySource::Env(_) => ENV_CACHE_TTL,
        }
    }
}

/// Ordered list of sources for one key, plus its cache TTL
#[derive(Debug, Clone)]
pub struct KeySourceChain {
    pub kind: KeyKind,
    /// Highest priority first
    pub sources: Vec<KeySource>,
    pub ttl: Duration,
}

impl KeySourceChain {
    /// Build a chain in the standard priority order (file, env, static).
    ///
    /// The TTL defaults to the primary source's default unless overridden.
    pub fn new(
        kind: KeyKind,
        file: Option<PathBuf>,
        env_var: Option<String>,
        static_value: Option<SecretValue>,
        ttl_override: Option<Duration>,
    ) -> Self {
        let mut sources = Vec::new();
        if let Some(path) = file {
            sources.push(KeySource::File(path));
        }
        if let Some(var) = env_var {
            sources.push(KeySource::Env(var));
        }
        if let Some(value) = static_value {
            sources.push(KeySource::Static(value));
        }

        let ttl = ttl_override
            .or_else(|| sources.first().map(KeySource::default_ttl))
            .unwrap_or(FILE_CACHE_TTL);

        Self { kind, sources, ttl }
    }

    pub fn is_configured(&self) -> bool {
        !self.sources.is_empty()
    }

    pub fn primary(&self) -> Option<&KeySource> {
        self.sources.first()
    }

    /// File path of the primary source, if it is file-backed
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self.primary() {
            Some(KeySource::File(path)) => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_source_trims() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_key");
        std::fs::write(&path, "  ek_file_value \n").unwrap();

        let value = KeySource::File(path).load().unwrap();
        assert_eq!(value.expose(), "ek_file_value");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = KeySource::File(dir.path().join("absent")).load();
        assert!(matches!(result, Err(KeyError::FileRead { .. })));
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank");
        std::fs::write(&path, "   \n").unwrap();
        assert!(matches!(
            KeySource::File(path).load(),
            Err(KeyError::EmptyFile(_))
        ));
    }

    #[test]
    fn test_env_source() {
        let var = "EXPENSE_AUTH_TEST_ENV_SOURCE";
        std::env::set_var(var, "from-env");
        assert_eq!(
            KeySource::Env(var.to_string()).load().unwrap().expose(),
            "from-env"
        );
        std::env::remove_var(var);
        assert!(matches!(
            KeySource::Env(var.to_string()).load(),
            Err(KeyError::EnvUnset(_))
        ));
    }

    #[test]
    fn test_chain_ttl_follows_primary() {
        let chain = KeySourceChain::new(
            KeyKind::ApiKey,
            Some(PathBuf::from("/run/secrets/api_key")),
            Some("API_KEY".to_string()),
            None,
            None,
        );
        assert_eq!(chain.ttl, FILE_CACHE_TTL);
        assert_eq!(chain.sources.len(), 2);

        let chain = KeySourceChain::new(
            KeyKind::ApiKey,
            None,
            Some("API_KEY".to_string()),
            Some(SecretValue::from("fallback")),
            None,
        );
        assert_eq!(chain.ttl, ENV_CACHE_TTL);
        assert!(chain.file_path().is_none());

        let chain = KeySourceChain::new(
            KeyKind::ApiKey,
            None,
            None,
            None,
            Some(Duration::from_secs(5)),
        );
        assert!(!chain.is_configured());
        assert_eq!(chain.ttl, Duration::from_secs(5));
    }
}
