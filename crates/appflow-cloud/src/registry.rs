//! Run-scoped resource registry
//!
//! Assigns every resource constructed during a run a stable effective name
//! and a construction ordinal, and rejects `(type_tag, effective_name)`
//! collisions. The registry is append-only: a record, once committed, is
//! never removed or changed for the rest of the run.
//!
//! Registration is two-phase. [`ResourceRegistry::reserve`] claims the
//! effective name before any provisioning happens; [`ResourceRegistry::commit`]
//! appends the record once the resource actually exists. A reservation that
//! is never committed keeps its name claimed, so a failed resource's name is
//! never handed out again within the same run.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Resource properties and constructor outputs
pub type Properties = BTreeMap<String, serde_json::Value>;

/// How the suffix of a prefixed name is generated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SuffixStrategy {
    /// Run-scoped counter: `d1`, `d2`, ...
    #[default]
    Sequential,
    /// 8 hex characters from a v4 UUID
    Random,
    /// Always the same suffix (forces collisions)
    Fixed(String),
}

/// A resource constructed during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub logical_name: String,
    pub type_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    /// Collision-checked name
    pub effective_name: String,
    /// Provider key the resource was created with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Construction ordinal, starting at 1
    pub ordinal: u64,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub outputs: Properties,
}

impl ResourceRecord {
    /// Registry key (`type:effective_name`)
    pub fn key(&self) -> String {
        format!("{}:{}", self.type_tag, self.effective_name)
    }

    /// Get an output value as a specific type
    pub fn get_output<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.outputs
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Input of one registration
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub type_tag: String,
    pub logical_name: String,
    pub name_prefix: Option<String>,
    pub provider: Option<String>,
    pub properties: Properties,
}

impl Registration {
    pub fn new(type_tag: impl Into<String>, logical_name: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            logical_name: logical_name.into(),
            ..Default::default()
        }
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }
}

/// A claimed effective name awaiting [`ResourceRegistry::commit`]
#[derive(Debug)]
#[must_use = "a reservation only becomes a record once committed"]
pub struct Reservation {
    registration: Registration,
    effective_name: String,
}

impl Reservation {
    pub fn effective_name(&self) -> &str {
        &self.effective_name
    }

    pub fn type_tag(&self) -> &str {
        &self.registration.type_tag
    }

    pub fn logical_name(&self) -> &str {
        &self.registration.logical_name
    }

    pub fn properties(&self) -> &Properties {
        &self.registration.properties
    }
}

/// Ledger of one run
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    suffix: SuffixStrategy,
    claimed: HashSet<(String, String)>,
    records: Vec<ResourceRecord>,
    suffix_counter: u64,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suffix_strategy(suffix: SuffixStrategy) -> Self {
        Self {
            suffix,
            ..Default::default()
        }
    }

    /// Register and commit in one step
    pub fn register(
        &mut self,
        type_tag: &str,
        logical_name: &str,
        name_prefix: Option<&str>,
        properties: Properties,
    ) -> Result<ResourceRecord> {
        let mut registration = Registration::new(type_tag, logical_name).with_properties(properties);
        registration.name_prefix = name_prefix.map(|p| p.to_string());
        let reservation = self.reserve(registration)?;
        Ok(self.commit(reservation, Properties::new()))
    }

    /// Compute the effective name and claim it
    pub fn reserve(&mut self, registration: Registration) -> Result<Reservation> {
        if registration.type_tag.is_empty() {
            return Err(CloudError::InvalidResource(
                "type tag must not be empty".to_string(),
            ));
        }
        if registration.logical_name.is_empty() {
            return Err(CloudError::InvalidResource(format!(
                "{} requires a logical name",
                registration.type_tag
            )));
        }

        let effective_name = match &registration.name_prefix {
            Some(prefix) => format!("{}{}", prefix, self.next_suffix()),
            None => registration.logical_name.clone(),
        };

        let key = (registration.type_tag.clone(), effective_name.clone());
        if self.claimed.contains(&key) {
            return Err(CloudError::DuplicateResource {
                type_tag: registration.type_tag,
                effective_name,
            });
        }
        self.claimed.insert(key);

        tracing::debug!(
            type_tag = %registration.type_tag,
            logical_name = %registration.logical_name,
            effective_name = %effective_name,
            "Resource name reserved"
        );

        Ok(Reservation {
            registration,
            effective_name,
        })
    }

    /// Append the record for a reservation whose resource now exists
    pub fn commit(&mut self, reservation: Reservation, outputs: Properties) -> ResourceRecord {
        let Reservation {
            registration,
            effective_name,
        } = reservation;

        let record = ResourceRecord {
            logical_name: registration.logical_name,
            type_tag: registration.type_tag,
            name_prefix: registration.name_prefix,
            effective_name,
            provider: registration.provider,
            ordinal: self.records.len() as u64 + 1,
            properties: registration.properties,
            outputs,
        };
        self.records.push(record.clone());
        record
    }

    fn next_suffix(&mut self) -> String {
        match &self.suffix {
            SuffixStrategy::Sequential => {
                self.suffix_counter += 1;
                self.suffix_counter.to_string()
            }
            SuffixStrategy::Random => uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
            SuffixStrategy::Fixed(suffix) => suffix.clone(),
        }
    }

    /// Look up a committed record by its effective name
    pub fn get(&self, type_tag: &str, effective_name: &str) -> Option<&ResourceRecord> {
        self.records
            .iter()
            .find(|r| r.type_tag == type_tag && r.effective_name == effective_name)
    }

    /// Committed records in construction order
    pub fn records(&self) -> &[ResourceRecord] {
        &self.records
    }

    pub fn by_type(&self, type_tag: &str) -> Vec<&ResourceRecord> {
        self.records
            .iter()
            .filter(|r| r.type_tag == type_tag)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<ResourceRecord> {
        self.records
    }
}
