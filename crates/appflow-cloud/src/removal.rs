//! Removal policy engine and teardown
//!
//! [`RemovalPolicyEngine`] only decides *whether* and *in what order*
//! resources go away. [`Teardown`] carries the plan out, delegating each
//! deletion to the resource's constructor.

use crate::action::{ActionType, TeardownAction, TeardownPlan, TeardownResult};
use crate::constructor::ConstructorCatalog;
use crate::credential::{CredentialResolver, ResolvedCredential};
use crate::error::{CloudError, Result};
use crate::executor::RunResult;
use crate::registry::ResourceRecord;
use crate::state::StateStore;
use appflow_core::RemovalPolicy;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Credential for one provider, or why it could not be resolved
type Resolution = std::result::Result<ResolvedCredential, String>;

/// Maps a run and its removal policy to a teardown plan
pub struct RemovalPolicyEngine;

impl RemovalPolicyEngine {
    pub fn plan(run: &RunResult) -> TeardownPlan {
        Self::plan_with_pins(run, &BTreeSet::new())
    }

    /// Plan, leaving records pinned by an earlier teardown untouched
    pub fn plan_with_pins(run: &RunResult, pinned: &BTreeSet<String>) -> TeardownPlan {
        let policy = run
            .descriptor
            .as_ref()
            .map(|d| d.removal_policy())
            .unwrap_or_default();

        let mut records: Vec<&ResourceRecord> = run.resources.iter().collect();
        // last created, first removed
        records.sort_by(|a, b| b.ordinal.cmp(&a.ordinal));

        let actions = records
            .into_iter()
            .map(|record| {
                let action_type = if pinned.contains(&record.key()) {
                    ActionType::Pinned
                } else if policy == RemovalPolicy::Remove {
                    ActionType::Delete
                } else {
                    ActionType::Retain
                };
                TeardownAction {
                    action_type,
                    resource: record.clone(),
                    pin: action_type == ActionType::Retain && policy == RemovalPolicy::RetainAll,
                }
            })
            .collect();

        TeardownPlan::new(policy, actions)
    }
}

/// Executes teardown plans
pub struct Teardown {
    resolver: Arc<dyn CredentialResolver>,
    catalog: Arc<ConstructorCatalog>,
    state: Option<Arc<dyn StateStore>>,
}

impl Teardown {
    pub fn new(resolver: Arc<dyn CredentialResolver>, catalog: ConstructorCatalog) -> Self {
        Self {
            resolver,
            catalog: Arc::new(catalog),
            state: None,
        }
    }

    /// State store used for pins and for forgetting removed records
    pub fn with_state(mut self, state: Arc<dyn StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// Plan against the configured state store's pins
    pub async fn plan(&self, run: &RunResult) -> Result<TeardownPlan> {
        let pinned = match &self.state {
            Some(state) => state.pinned().await?,
            None => BTreeSet::new(),
        };
        Ok(RemovalPolicyEngine::plan_with_pins(run, &pinned))
    }

    /// Tear a run down according to its removal policy
    ///
    /// Credentials for every provider that has something to delete are
    /// resolved before the first deletion. A provider that cannot be resolved
    /// fails only its own deletions; every other deletion still runs. State
    /// store failures are reported in the result next to what was deleted.
    #[instrument(skip_all, fields(resources = run.resources.len()))]
    pub async fn teardown(&self, run: &RunResult) -> Result<TeardownResult> {
        let plan = self.plan(run).await?;
        self.apply(run, &plan).await
    }

    /// Execute an already computed plan
    pub async fn apply(&self, run: &RunResult, plan: &TeardownPlan) -> Result<TeardownResult> {
        let started = Instant::now();
        let mut result = TeardownResult::new(plan.policy);
        info!(policy = %plan.policy, summary = %plan.summary(), "Starting teardown");

        let credentials = self.resolve_for(run, plan).await?;

        let mut forgotten = Vec::new();
        let mut to_pin = Vec::new();

        for action in &plan.actions {
            let record = &action.resource;
            match action.action_type {
                ActionType::Delete => match self.delete(record, &credentials).await {
                    Ok(()) => {
                        debug!(resource = %record.key(), "Deleted");
                        result.add_deleted(record);
                        forgotten.push(record.key());
                    }
                    Err(e) => {
                        warn!(resource = %record.key(), error = %e, "Deletion failed");
                        result.add_failure(record, e.to_string());
                    }
                },
                ActionType::Retain => {
                    result.add_retained(record);
                    if action.pin {
                        to_pin.push(record.clone());
                    } else {
                        forgotten.push(record.key());
                    }
                }
                ActionType::Pinned => {
                    debug!(resource = %record.key(), "Skipping pinned resource");
                    result.add_pinned(record);
                }
            }
        }

        if let Some(state) = &self.state {
            if !to_pin.is_empty() {
                match state.pin(&to_pin).await {
                    Ok(()) => {
                        for record in &to_pin {
                            result.add_pinned(record);
                        }
                    }
                    Err(e) => {
                        warn!(count = to_pin.len(), error = %e, "Pinning retained resources failed");
                        result.add_state_error(format!("pin: {}", e));
                    }
                }
            }
            if !forgotten.is_empty()
                && let Err(e) = state.forget(&forgotten).await
            {
                warn!(count = forgotten.len(), error = %e, "Forgetting removed resources failed");
                result.add_state_error(format!("forget: {}", e));
            }
        } else if !to_pin.is_empty() {
            warn!(
                count = to_pin.len(),
                "No state store configured, retained resources cannot be pinned"
            );
        }

        result.finish();
        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            status = %result.status,
            deleted = result.deleted.len(),
            retained = result.retained.len(),
            failed = result.failures.len(),
            "Teardown finished"
        );
        Ok(result)
    }

    /// Resolve each provider with pending deletions, keeping failures per provider
    async fn resolve_for(
        &self,
        run: &RunResult,
        plan: &TeardownPlan,
    ) -> Result<HashMap<String, Resolution>> {
        let deletions = plan.deletions();
        let mut credentials = HashMap::new();
        if deletions.is_empty() {
            return Ok(credentials);
        }

        let descriptor = run.descriptor.as_ref().ok_or_else(|| {
            CloudError::StateError("run has resources but no app descriptor".to_string())
        })?;

        for action in deletions {
            // an unknown resource type is reported by its own deletion
            let Ok(key) = self.provider_of(&action.resource) else {
                continue;
            };
            if credentials.contains_key(&key) {
                continue;
            }
            let resolved = match descriptor.providers().get(&key) {
                Ok(config) => self.resolver.resolve(&key, config).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = &resolved {
                warn!(provider = %key, error = %e, "Credential resolution failed");
            }
            credentials.insert(key, resolved.map_err(|e| e.to_string()));
        }
        Ok(credentials)
    }

    fn provider_of(&self, record: &ResourceRecord) -> Result<String> {
        match &record.provider {
            Some(provider) => Ok(provider.clone()),
            None => Ok(self.catalog.get(&record.type_tag)?.provider().to_string()),
        }
    }

    async fn delete(
        &self,
        record: &ResourceRecord,
        credentials: &HashMap<String, Resolution>,
    ) -> Result<()> {
        let constructor = self.catalog.get(&record.type_tag)?;
        let provider = self.provider_of(record)?;
        let credential = match credentials.get(&provider) {
            Some(Ok(credential)) => credential.clone(),
            Some(Err(message)) => {
                return Err(CloudError::Deletion {
                    type_tag: record.type_tag.clone(),
                    effective_name: record.effective_name.clone(),
                    message: message.clone(),
                });
            }
            None => return Err(CloudError::UnknownProvider(provider)),
        };

        let owned = record.clone();
        let task = tokio::spawn(async move { constructor.delete(&owned, &credential).await });
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(CloudError::Construction(format!(
                "constructor task failed: {}",
                e
            ))),
        };
        outcome.map_err(|e| CloudError::Deletion {
            type_tag: record.type_tag.clone(),
            effective_name: record.effective_name.clone(),
            message: e.to_string(),
        })
    }
}
