//! Resource constructor abstraction
//!
//! Resource types (queues, functions, buckets, ...) live outside the engine.
//! Each one implements [`ResourceConstructor`] and is registered in a
//! [`ConstructorCatalog`] keyed by its type tag.

use crate::credential::ResolvedCredential;
use crate::error::{CloudError, Result};
use crate::registry::{Properties, ResourceRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Resource type abstraction trait
///
/// `create` provisions the resource and returns its outputs (ids, urls,
/// arns...). `delete` receives the committed record, outputs included.
#[async_trait]
pub trait ResourceConstructor: Send + Sync {
    /// Returns the type tag this constructor handles (e.g., "queue")
    fn type_tag(&self) -> &str;

    /// Returns the default provider key (e.g., "aws")
    fn provider(&self) -> &str;

    /// Provision the resource
    async fn create(
        &self,
        request: &CreateRequest,
        credential: &ResolvedCredential,
    ) -> Result<Properties>;

    /// Delete a previously created resource
    async fn delete(&self, record: &ResourceRecord, credential: &ResolvedCredential)
    -> Result<()>;
}

/// Everything a constructor needs to provision one resource
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub app: String,
    pub stage: Option<String>,
    pub region: String,
    pub type_tag: String,
    pub logical_name: String,
    pub effective_name: String,
    pub properties: Properties,
}

impl CreateRequest {
    /// Get a property value as a specific type
    pub fn get_property<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.properties
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Options of a construct call
#[derive(Debug, Clone, Default)]
pub struct ConstructOptions {
    pub name_prefix: Option<String>,
    /// Overrides the constructor's default provider
    pub provider: Option<String>,
    pub properties: Properties,
}

impl ConstructOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Type tag → constructor
#[derive(Default, Clone)]
pub struct ConstructorCatalog {
    constructors: HashMap<String, Arc<dyn ResourceConstructor>>,
    fallback: Option<Arc<dyn ResourceConstructor>>,
}

impl ConstructorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, constructor: Arc<dyn ResourceConstructor>) -> Result<()> {
        let type_tag = constructor.type_tag().to_string();
        if self.constructors.contains_key(&type_tag) {
            return Err(CloudError::DuplicateConstructor(type_tag));
        }
        tracing::debug!(type_tag = %type_tag, provider = constructor.provider(), "Constructor registered");
        self.constructors.insert(type_tag, constructor);
        Ok(())
    }

    pub fn with(mut self, constructor: Arc<dyn ResourceConstructor>) -> Result<Self> {
        self.register(constructor)?;
        Ok(self)
    }

    /// Constructor used for type tags with no explicit registration
    pub fn with_fallback(mut self, constructor: Arc<dyn ResourceConstructor>) -> Self {
        self.fallback = Some(constructor);
        self
    }

    pub fn get(&self, type_tag: &str) -> Result<Arc<dyn ResourceConstructor>> {
        self.constructors
            .get(type_tag)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| CloudError::UnknownResourceType(type_tag.to_string()))
    }

    pub fn type_tags(&self) -> Vec<&str> {
        let mut tags: Vec<_> = self.constructors.keys().map(|k| k.as_str()).collect();
        tags.sort_unstable();
        tags
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty() && self.fallback.is_none()
    }
}

impl std::fmt::Debug for ConstructorCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructorCatalog")
            .field("type_tags", &self.type_tags())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
