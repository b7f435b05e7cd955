//! Provider credential resolution
//!
//! The engine never interprets credential material itself. A
//! [`CredentialResolver`] turns a declared [`ProviderConfig`] into an opaque
//! [`ResolvedCredential`]; the bundled [`ProfileCredentialResolver`] delegates
//! the actual lookup to a [`CredentialStore`] supplied by the environment.
//!
//! Resolved material is never logged and never serialized.

use crate::error::{CloudError, Result};
use appflow_core::ProviderConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Default prefix for [`EnvCredentialStore`] variables
pub const ENV_CREDENTIAL_PREFIX: &str = "APPFLOW_CREDENTIAL";

/// Opaque authentication context for one provider
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    provider: String,
    kind: String,
    profile: Option<String>,
    material: Arc<str>,
}

impl ResolvedCredential {
    pub fn new(
        provider: impl Into<String>,
        kind: impl Into<String>,
        profile: Option<String>,
        material: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind: kind.into(),
            profile,
            material: material.into(),
        }
    }

    /// Provider key this credential was resolved for
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Raw material, for resource constructors only
    pub fn material(&self) -> &str {
        &self.material
    }
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("provider", &self.provider)
            .field("kind", &self.kind)
            .field("profile", &self.profile)
            .field("material", &"<redacted>")
            .finish()
    }
}

/// External key-value store of credential material, keyed by kind + profile
///
/// `Ok(None)` means "no entry"; `Err` is reserved for store failures.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn lookup(&self, kind: &str, profile: Option<&str>) -> Result<Option<String>>;
}

/// Resolves provider configs into credentials
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, key: &str, config: &ProviderConfig) -> Result<ResolvedCredential>;
}

/// In-memory store, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    entries: HashMap<(String, Option<String>), String>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(
        mut self,
        kind: impl Into<String>,
        profile: Option<&str>,
        material: impl Into<String>,
    ) -> Self {
        self.insert(kind, profile, material);
        self
    }

    pub fn insert(
        &mut self,
        kind: impl Into<String>,
        profile: Option<&str>,
        material: impl Into<String>,
    ) {
        self.entries
            .insert((kind.into(), profile.map(|p| p.to_string())), material.into());
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn lookup(&self, kind: &str, profile: Option<&str>) -> Result<Option<String>> {
        let key = (kind.to_string(), profile.map(|p| p.to_string()));
        Ok(self.entries.get(&key).cloned())
    }
}

/// Environment-backed store
///
/// Looks up `{PREFIX}_{KIND}_{PROFILE}` first and falls back to
/// `{PREFIX}_{KIND}`. Names are uppercased and every non-alphanumeric
/// character becomes `_` (`sst-dev` → `SST_DEV`).
#[derive(Debug, Clone)]
pub struct EnvCredentialStore {
    prefix: String,
}

impl Default for EnvCredentialStore {
    fn default() -> Self {
        Self::new(ENV_CREDENTIAL_PREFIX)
    }
}

impl EnvCredentialStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Variable names checked for a lookup, most specific first
    pub fn variable_names(&self, kind: &str, profile: Option<&str>) -> Vec<String> {
        let base = format!("{}_{}", self.prefix, env_segment(kind));
        match profile {
            Some(profile) => vec![format!("{}_{}", base, env_segment(profile)), base],
            None => vec![base],
        }
    }
}

fn env_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn lookup(&self, kind: &str, profile: Option<&str>) -> Result<Option<String>> {
        for name in self.variable_names(kind, profile) {
            if let Ok(value) = std::env::var(&name)
                && !value.is_empty()
            {
                debug!(variable = %name, "Credential found in environment");
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

/// Tries each store in order; the first hit wins
#[derive(Default)]
pub struct ChainedCredentialStore {
    stores: Vec<Box<dyn CredentialStore>>,
}

impl ChainedCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: impl CredentialStore + 'static) -> Self {
        self.stores.push(Box::new(store));
        self
    }
}

#[async_trait]
impl CredentialStore for ChainedCredentialStore {
    async fn lookup(&self, kind: &str, profile: Option<&str>) -> Result<Option<String>> {
        for store in &self.stores {
            if let Some(material) = store.lookup(kind, profile).await? {
                return Ok(Some(material));
            }
        }
        Ok(None)
    }
}

/// Resolver for profile-based vendors
///
/// Results are cached per `(kind, profile)` for the resolver's lifetime; the
/// cache is the only state a resolver shares between runs.
pub struct ProfileCredentialResolver<S> {
    store: S,
    cache: Mutex<HashMap<(String, Option<String>), Arc<str>>>,
}

impl<S: CredentialStore> ProfileCredentialResolver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, key: &(String, Option<String>)) -> Option<Arc<str>> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(key).cloned()
    }
}

#[async_trait]
impl<S: CredentialStore> CredentialResolver for ProfileCredentialResolver<S> {
    async fn resolve(&self, key: &str, config: &ProviderConfig) -> Result<ResolvedCredential> {
        let cache_key = (config.kind.clone(), config.profile.clone());

        let material = match self.cached(&cache_key) {
            Some(material) => material,
            None => {
                let found = self
                    .store
                    .lookup(&config.kind, config.profile.as_deref())
                    .await
                    .map_err(|e| CloudError::CredentialResolution {
                        provider: key.to_string(),
                        kind: config.kind.clone(),
                        message: e.to_string(),
                    })?;
                let material: Arc<str> = found
                    .ok_or_else(|| CloudError::CredentialResolution {
                        provider: key.to_string(),
                        kind: config.kind.clone(),
                        message: match &config.profile {
                            Some(profile) => format!("no credentials for profile '{}'", profile),
                            None => "no credentials found".to_string(),
                        },
                    })?
                    .into();
                self.cache
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(cache_key, material.clone());
                material
            }
        };

        debug!(provider = %key, kind = %config.kind, "Credential resolved");
        Ok(ResolvedCredential::new(
            key,
            config.kind.clone(),
            config.profile.clone(),
            material,
        ))
    }
}
