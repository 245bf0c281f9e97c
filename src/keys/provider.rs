//! TTL-cached key provider with stale-on-failure reloads

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{KeyError, KeyKind, KeyProvider, KeySourceChain, SecretValue};

/// Key provider configuration
#[derive(Debug, Clone)]
pub struct KeyProviderConfig {
    pub api_key: KeySourceChain,
    pub signing_secret: KeySourceChain,
}

impl KeyProviderConfig {
    /// Load source configuration from environment variables.
    ///
    /// Static fallbacks are captured here, once. The `API_KEY` / `JWT_SECRET`
    /// variables are re-read on every reload.
    pub fn from_env() -> Self {
        let ttl_override = std::env::var("KEY_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);

        let api_key = KeySourceChain::new(
            KeyKind::ApiKey,
            env_path("API_KEY_FILE"),
            env_present("API_KEY").then(|| "API_KEY".to_string()),
            env_secret("API_KEY_FALLBACK"),
            ttl_override,
        );

        let signing_secret = KeySourceChain::new(
            KeyKind::SigningSecret,
            env_path("SIGNING_SECRET_FILE"),
            env_present("JWT_SECRET").then(|| "JWT_SECRET".to_string()),
            env_secret("JWT_SECRET_FALLBACK"),
            ttl_override,
        );

        Self {
            api_key,
            signing_secret,
        }
    }

    pub fn chain(&self, kind: KeyKind) -> &KeySourceChain {
        match kind {
            KeyKind::ApiKey => &self.api_key,
            KeyKind::SigningSecret => &self.signing_secret,
        }
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_present(var: &str) -> bool {
    std::env::var(var).map(|v| !v.trim().is_empty()).unwrap_or(false)
}

fn env_secret(var: &str) -> Option<SecretValue> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(SecretValue::from)
}

/// A value as it was loaded, never mutated after construction
struct LoadedKey {
    value: SecretValue,
    source: String,
    /// Drives TTL expiry
    checked_at: Instant,
    /// When the value itself was last read successfully
    loaded_at: DateTime<Utc>,
}

/// Cache slot for one key
struct CachedKey {
    chain: KeySourceChain,
    snapshot: ArcSwapOption<LoadedKey>,
    invalidated: AtomicBool,
    /// Serializes reloads; readers never wait on it unless forced
    reload_lock: Mutex<()>,
}

impl CachedKey {
    fn new(chain: KeySourceChain) -> Self {
        Self {
            chain,
            snapshot: ArcSwapOption::empty(),
            invalidated: AtomicBool::new(false),
            reload_lock: Mutex::new(()),
        }
    }

    fn get(&self) -> Result<SecretValue, KeyError> {
        if !self.chain.is_configured() {
            return Err(KeyError::NotConfigured(self.chain.kind));
        }

        if let Some(loaded) = self.fresh_snapshot() {
            return Ok(loaded.value.clone());
        }

        let forced = self.invalidated.load(Ordering::Acquire) || self.snapshot.load().is_none();
        let _guard = if forced {
            self.lock_reload()
        } else {
            match self.reload_lock.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    // Another reader is already reloading; serve what we have.
                    if let Some(loaded) = self.snapshot.load_full() {
                        return Ok(loaded.value.clone());
                    }
                    self.lock_reload()
                }
            }
        };

        // Someone may have finished a reload while we waited for the lock.
        if let Some(loaded) = self.fresh_snapshot() {
            return Ok(loaded.value.clone());
        }

        match self.reload_locked() {
            Ok(loaded) => Ok(loaded.value.clone()),
            Err(e) => match self.snapshot.load_full() {
                Some(previous) => {
                    warn!(
                        kind = %self.chain.kind,
                        error = %e,
                        last_loaded = %previous.loaded_at,
                        "key reload failed, serving last known good value"
                    );
                    Ok(previous.value.clone())
                }
                None => Err(e),
            },
        }
    }

    fn refresh(&self) -> Result<(), KeyError> {
        if !self.chain.is_configured() {
            return Ok(());
        }
        let _guard = self.lock_reload();
        self.reload_locked().map(|_| ())
    }

    fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
        debug!(kind = %self.chain.kind, "key cache invalidated");
    }

    fn fresh_snapshot(&self) -> Option<Arc<LoadedKey>> {
        if self.invalidated.load(Ordering::Acquire) {
            return None;
        }
        self.snapshot
            .load_full()
            .filter(|loaded| loaded.checked_at.elapsed() < self.chain.ttl)
    }

    fn lock_reload(&self) -> MutexGuard<'_, ()> {
        self.reload_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Reload from the backing sources. Caller must hold `reload_lock`.
    ///
    /// With no cached value yet, or after an invalidation, the whole chain is
    /// tried in priority order. A plain TTL expiry only consults the primary
    /// source. If nothing loads, the cached value stays in place and its TTL
    /// is re-armed.
    fn reload_locked(&self) -> Result<Arc<LoadedKey>, KeyError> {
        // Cleared before reading, so an invalidation racing with this reload
        // forces another one.
        let forced = self.invalidated.swap(false, Ordering::AcqRel);

        let previous = self.snapshot.load_full();
        let sources = if previous.is_none() || forced {
            &self.chain.sources[..]
        } else {
            &self.chain.sources[..1]
        };

        let mut last_error = None;
        for source in sources {
            match source.load() {
                Ok(value) => {
                    let changed = previous
                        .as_ref()
                        .map(|p| p.value != value)
                        .unwrap_or(true);
                    let loaded = Arc::new(LoadedKey {
                        value,
                        source: source.describe(),
                        checked_at: Instant::now(),
                        loaded_at: Utc::now(),
                    });
                    self.snapshot.store(Some(loaded.clone()));
                    if changed {
                        info!(
                            kind = %self.chain.kind,
                            source = %loaded.source,
                            "key material loaded"
                        );
                    }
                    return Ok(loaded);
                }
                Err(e) => {
                    debug!(kind = %self.chain.kind, source = %source.describe(), error = %e, "key source failed");
                    last_error = Some(e);
                }
            }
        }

        if let Some(previous) = previous {
            self.snapshot.store(Some(Arc::new(LoadedKey {
                value: previous.value.clone(),
                source: previous.source.clone(),
                checked_at: Instant::now(),
                loaded_at: previous.loaded_at,
            })));
        }

        Err(last_error.unwrap_or(KeyError::NotConfigured(self.chain.kind)))
    }

    fn status(&self) -> KeyStatus {
        let snapshot = self.snapshot.load_full();
        KeyStatus {
            kind: self.chain.kind.as_str(),
            configured: self.chain.is_configured(),
            source: snapshot.as_ref().map(|s| s.source.clone()),
            loaded_at: snapshot.as_ref().map(|s| s.loaded_at),
            age_seconds: snapshot
                .as_ref()
                .map(|s| (Utc::now() - s.loaded_at).num_seconds().max(0) as u64),
            ttl_seconds: self.chain.ttl.as_secs(),
        }
    }
}

/// Observable state of one cached key (never includes the value)
#[derive(Debug, Clone, Serialize)]
pub struct KeyStatus {
    pub kind: &'static str,
    pub configured: bool,
    pub source: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub age_seconds: Option<u64>,
    pub ttl_seconds: u64,
}

/// Key provider backed by files, environment variables, and static fallbacks
pub struct ExternalKeyProvider {
    api_key: CachedKey,
    signing_secret: CachedKey,
}

impl ExternalKeyProvider {
    pub fn new(config: KeyProviderConfig) -> Self {
        Self {
            api_key: CachedKey::new(config.api_key),
            signing_secret: CachedKey::new(config.signing_secret),
        }
    }

    pub fn from_env() -> Self {
        Self::new(KeyProviderConfig::from_env())
    }

    fn slot(&self, kind: KeyKind) -> &CachedKey {
        match kind {
            KeyKind::ApiKey => &self.api_key,
            KeyKind::SigningSecret => &self.signing_secret,
        }
    }

    pub fn is_configured(&self, kind: KeyKind) -> bool {
        self.slot(kind).chain.is_configured()
    }

    /// File backing `kind`, when the primary source is a file
    pub fn file_path(&self, kind: KeyKind) -> Option<PathBuf> {
        self.slot(kind).chain.file_path().cloned()
    }
}

impl KeyProvider for ExternalKeyProvider {
    fn current(&self, kind: KeyKind) -> Result<SecretValue, KeyError> {
        self.slot(kind).get()
    }

    fn refresh_kind(&self, kind: KeyKind) -> Result<(), KeyError> {
        self.slot(kind).refresh()
    }

    fn invalidate(&self, kind: KeyKind) {
        self.slot(kind).invalidate();
    }

    fn status(&self) -> Vec<KeyStatus> {
        vec![self.api_key.status(), self.signing_secret.status()]
    }
}

/// In-memory provider whose values are set directly.
///
/// Useful for tests and local development; values never expire.
#[derive(Default)]
pub struct InMemoryKeyProvider {
    api_key: ArcSwapOption<SecretValue>,
    signing_secret: ArcSwapOption<SecretValue>,
}

impl InMemoryKeyProvider {
    pub fn new(api_key: Option<SecretValue>, signing_secret: Option<SecretValue>) -> Self {
        Self {
            api_key: ArcSwapOption::from_pointee(api_key),
            signing_secret: ArcSwapOption::from_pointee(signing_secret),
        }
    }

    /// Replace the value for `kind` atomically
    pub fn set(&self, kind: KeyKind, value: impl Into<SecretValue>) {
        self.slot(kind).store(Some(Arc::new(value.into())));
    }

    fn slot(&self, kind: KeyKind) -> &ArcSwapOption<SecretValue> {
        match kind {
            KeyKind::ApiKey => &self.api_key,
            KeyKind::SigningSecret => &self.signing_secret,
        }
    }
}

impl KeyProvider for InMemoryKeyProvider {
    fn current(&self, kind: KeyKind) -> Result<SecretValue, KeyError> {
        self.slot(kind)
            .load_full()
            .map(|value| (*value).clone())
            .ok_or(KeyError::NotConfigured(kind))
    }

    fn refresh_kind(&self, _kind: KeyKind) -> Result<(), KeyError> {
        Ok(())
    }

    fn invalidate(&self, _kind: KeyKind) {}
}
