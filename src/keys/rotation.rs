//! Key rotation
//!
//! A rotation replaces the file backing a key, tells the running service to
//! drop its cached copy, and proves the new value works before declaring
//! success. If the proof fails the previous file is put back.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use super::{KeyKind, KeyProvider, SecretValue};
use crate::auth::{sign_claims, ApiKeyValidator, Authenticator, TokenConfig, SCOPE_READ};

/// Subject used for tokens minted to probe a new signing secret
pub const PROBE_SUBJECT: &str = "rotation-probe";

/// Rotation errors
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("new {0} value is empty")]
    EmptyValue(KeyKind),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cache invalidation failed: {0}")]
    Invalidate(String),

    #[error("new {kind} was rejected by the service: {reason}")]
    ProbeFailed { kind: KeyKind, reason: String },

    #[error("rollback of {path} failed: {reason}")]
    RollbackFailed { path: String, reason: String },

    #[error("restart hook failed: {0}")]
    Restart(String),
}

impl RotationError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        RotationError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Replace `path` with `contents` so readers see either the whole old file
/// or the whole new one.
///
/// The contents go to a uniquely named sibling temp file, created owner-only
/// and synced, which is then renamed over the target.
pub fn atomic_write(path: &Path, contents: &str) -> Result<(), RotationError> {
    use std::io::Write;

    let tmp = temp_path(path);
    let written = create_private(&tmp).and_then(|mut file| {
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(RotationError::io(&tmp, e));
    }

    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        RotationError::io(path, e)
    })
}

/// Sibling temp file for `path`, unique per call
fn temp_path(path: &Path) -> PathBuf {
    use rand::Rng;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "key".to_string());
    let nonce: u32 = rand::thread_rng().gen();
    path.with_file_name(format!(
        ".{file_name}.{}.{nonce:08x}.tmp",
        std::process::id()
    ))
}

/// Create a new file readable by the owner only, failing if it exists
fn create_private(path: &Path) -> std::io::Result<std::fs::File> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}

/// Random 48-byte signing secret, URL-safe base64
pub fn generate_signing_secret() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 48];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Location of the backup written before a key file is replaced
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Tells the service holding the key cache to reload `kind`
#[async_trait::async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, kind: KeyKind) -> Result<(), RotationError>;
}

/// Proves a candidate value is accepted by the service
#[async_trait::async_trait]
pub trait RotationProbe: Send + Sync {
    async fn probe(&self, kind: KeyKind, candidate: &SecretValue) -> Result<(), String>;
}

/// Restarts the service after a signing-secret rotation
#[async_trait::async_trait]
pub trait RestartHook: Send + Sync {
    async fn restart(&self) -> Result<(), RotationError>;
}

// ============================================================================
// In-process implementations
// ============================================================================

/// Invalidates a provider living in the same process
pub struct ProviderInvalidator(pub Arc<dyn KeyProvider>);

#[async_trait::async_trait]
impl CacheInvalidator for ProviderInvalidator {
    async fn invalidate(&self, kind: KeyKind) -> Result<(), RotationError> {
        self.0.invalidate(kind);
        Ok(())
    }
}

/// Probes through the same authenticator that serves requests
pub struct AuthenticatorProbe(pub Arc<Authenticator>);

#[async_trait::async_trait]
impl RotationProbe for AuthenticatorProbe {
    async fn probe(&self, kind: KeyKind, candidate: &SecretValue) -> Result<(), String> {
        match kind {
            KeyKind::ApiKey => match self.0.api_keys().validate_api_key(candidate.expose()) {
                Ok(true) => Ok(()),
                Ok(false) => Err("service still expects the previous key".to_string()),
                Err(e) => Err(e.to_string()),
            },
            KeyKind::SigningSecret => {
                let tokens = self.0.tokens();
                let token = mint_probe_token(tokens.config(), candidate)?;
                tokens.validate(&token).map(|_| ()).map_err(|e| e.to_string())
            }
        }
    }
}

fn mint_probe_token(config: &TokenConfig, secret: &SecretValue) -> Result<String, String> {
    let claims = config.claims_for(PROBE_SUBJECT, SCOPE_READ, Utc::now());
    sign_claims(&claims, secret).map_err(|e| e.to_string())
}

// ============================================================================
// Remote implementations
// ============================================================================

/// Calls the admin reload endpoint of a running service.
///
/// Tries each API key in order; during an API key rotation the service may
/// accept either the old or the new key depending on its cache state.
pub struct HttpInvalidator {
    client: reqwest::Client,
    base_url: String,
    api_keys: Vec<SecretValue>,
}

impl HttpInvalidator {
    pub fn new(base_url: impl Into<String>, api_keys: Vec<SecretValue>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.into(),
            api_keys,
        }
    }
}

#[async_trait::async_trait]
impl CacheInvalidator for HttpInvalidator {
    async fn invalidate(&self, kind: KeyKind) -> Result<(), RotationError> {
        let url = format!(
            "{}/api/v1/admin/keys/reload",
            self.base_url.trim_end_matches('/')
        );
        let body = serde_json::json!({ "kind": kind.as_str() });

        let mut last_error = "no admin credential available".to_string();
        for key in &self.api_keys {
            let response = self
                .client
                .post(&url)
                .header("x-api-key", key.expose())
                .json(&body)
                .send()
                .await
                .map_err(|e| RotationError::Invalidate(e.to_string()))?;

            if response.status().is_success() {
                return Ok(());
            }
            last_error = format!("reload endpoint returned {}", response.status());
        }

        Err(RotationError::Invalidate(last_error))
    }
}

/// Probes a running service over HTTP with the candidate credential
pub struct HttpProbe {
    client: reqwest::Client,
    base_url: String,
    token_config: TokenConfig,
}

impl HttpProbe {
    pub fn new(base_url: impl Into<String>, token_config: TokenConfig) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.into(),
            token_config,
        }
    }
}

#[async_trait::async_trait]
impl RotationProbe for HttpProbe {
    async fn probe(&self, kind: KeyKind, candidate: &SecretValue) -> Result<(), String> {
        let url = format!("{}/api/v1/me", self.base_url.trim_end_matches('/'));
        let request = match kind {
            KeyKind::ApiKey => self.client.get(&url).header("x-api-key", candidate.expose()),
            KeyKind::SigningSecret => {
                let token = mint_probe_token(&self.token_config, candidate)?;
                self.client.get(&url).bearer_auth(token)
            }
        };

        let response = request.send().await.map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("probe request returned {}", response.status()))
        }
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Runs an external command, e.g. `systemctl restart expense-auth`
pub struct CommandRestart {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandRestart {
    /// Parse a whitespace-separated command line
    pub fn parse(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait::async_trait]
impl RestartHook for CommandRestart {
    async fn restart(&self) -> Result<(), RotationError> {
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .status()
            .await
            .map_err(|e| RotationError::Restart(format!("{}: {}", self.program, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(RotationError::Restart(format!(
                "{} exited with {}",
                self.program, status
            )))
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Result of a completed rotation
#[derive(Debug, Clone)]
pub struct RotationOutcome {
    pub kind: KeyKind,
    /// Previous contents, if the file existed
    pub backup: Option<PathBuf>,
    /// Log-safe identifier of the new value
    pub fingerprint: String,
    pub restarted: bool,
}

/// Coordinates backup, write, invalidation, probe and rollback
pub struct RotationController {
    invalidator: Arc<dyn CacheInvalidator>,
    probe: Arc<dyn RotationProbe>,
    restart: Option<Arc<dyn RestartHook>>,
}

impl RotationController {
    pub fn new(invalidator: Arc<dyn CacheInvalidator>, probe: Arc<dyn RotationProbe>) -> Self {
        Self {
            invalidator,
            probe,
            restart: None,
        }
    }

    /// Run `hook` after a successful signing-secret rotation.
    ///
    /// Signing-secret rotations are refused without one.
    pub fn with_restart(mut self, hook: Arc<dyn RestartHook>) -> Self {
        self.restart = Some(hook);
        self
    }

    /// Rotate the key stored at `path` to `new_value`
    pub async fn rotate(
        &self,
        kind: KeyKind,
        path: &Path,
        new_value: &str,
    ) -> Result<RotationOutcome, RotationError> {
        let new_value = new_value.trim();
        if new_value.is_empty() {
            return Err(RotationError::EmptyValue(kind));
        }

        // Tokens signed with the old secret die with it; the service must be
        // restarted, so refuse to start without a way to do that.
        if kind == KeyKind::SigningSecret && self.restart.is_none() {
            return Err(RotationError::Restart(
                "no restart hook configured for signing secret rotation".to_string(),
            ));
        }

        let previous = match std::fs::read_to_string(path) {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(RotationError::io(path, e)),
        };

        let backup = match &previous {
            Some(contents) => {
                let backup = backup_path(path);
                atomic_write(&backup, contents)?;
                Some(backup)
            }
            None => None,
        };

        atomic_write(path, &format!("{new_value}\n"))?;

        let fingerprint = ApiKeyValidator::fingerprint(new_value);
        info!(kind = %kind, path = %path.display(), fingerprint = %fingerprint, "key file replaced");

        if let Err(e) = self.invalidator.invalidate(kind).await {
            error!(kind = %kind, error = %e, "invalidation failed, rolling back");
            self.rollback(kind, path, previous.as_deref()).await?;
            return Err(e);
        }

        let candidate = SecretValue::from(new_value);
        if let Err(reason) = self.probe.probe(kind, &candidate).await {
            error!(kind = %kind, reason = %reason, "probe rejected new key, rolling back");
            self.rollback(kind, path, previous.as_deref()).await?;
            return Err(RotationError::ProbeFailed { kind, reason });
        }

        let mut restarted = false;
        if kind == KeyKind::SigningSecret {
            if let Some(hook) = &self.restart {
                hook.restart().await?;
                restarted = true;
            }
        }

        info!(kind = %kind, fingerprint = %fingerprint, restarted, "key rotated");

        Ok(RotationOutcome {
            kind,
            backup,
            fingerprint,
            restarted,
        })
    }

    async fn rollback(
        &self,
        kind: KeyKind,
        path: &Path,
        previous: Option<&str>,
    ) -> Result<(), RotationError> {
        let restored = match previous {
            Some(contents) => atomic_write(path, contents),
            None => std::fs::remove_file(path).map_err(|e| RotationError::io(path, e)),
        };

        if let Err(e) = restored {
            return Err(RotationError::RollbackFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            });
        }

        if let Err(e) = self.invalidator.invalidate(kind).await {
            warn!(kind = %kind, error = %e, "invalidation after rollback failed");
        }

        Ok(())
    }
}
