//! Teardown actions, plans and results

use crate::error::{CloudError, Result};
use crate::executor::RunStatus;
use crate::registry::ResourceRecord;
use appflow_core::RemovalPolicy;
use serde::{Deserialize, Serialize};

/// What teardown does with one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Delete through the resource's constructor
    Delete,
    /// Leave in place and stop tracking it
    Retain,
    /// Pinned by an earlier `retainAll` teardown; left untouched
    Pinned,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Delete => write!(f, "delete"),
            ActionType::Retain => write!(f, "retain"),
            ActionType::Pinned => write!(f, "pinned"),
        }
    }
}

/// Planned action for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownAction {
    pub action_type: ActionType,

    /// Record the action applies to
    pub resource: ResourceRecord,

    /// Pin the record in the state store after retaining it
    #[serde(default)]
    pub pin: bool,
}

impl TeardownAction {
    pub fn key(&self) -> String {
        self.resource.key()
    }

    pub fn description(&self) -> String {
        let verb = match (self.action_type, self.pin) {
            (ActionType::Retain, true) => "retain and pin".to_string(),
            (action, _) => action.to_string(),
        };
        format!(
            "{} {} '{}' (#{})",
            verb, self.resource.type_tag, self.resource.effective_name, self.resource.ordinal
        )
    }
}

/// Ordered teardown actions
///
/// Delete actions are in strictly decreasing ordinal order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownPlan {
    pub policy: RemovalPolicy,
    pub actions: Vec<TeardownAction>,
}

impl TeardownPlan {
    pub fn new(policy: RemovalPolicy, actions: Vec<TeardownAction>) -> Self {
        Self { policy, actions }
    }

    pub fn empty(policy: RemovalPolicy) -> Self {
        Self::new(policy, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&TeardownAction> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    pub fn deletions(&self) -> Vec<&TeardownAction> {
        self.actions_by_type(ActionType::Delete)
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            delete: self.actions_by_type(ActionType::Delete).len(),
            retain: self.actions_by_type(ActionType::Retain).len(),
            pin: self.actions.iter().filter(|a| a.pin).count(),
            already_pinned: self.actions_by_type(ActionType::Pinned).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub delete: usize,
    pub retain: usize,
    pub pin: usize,
    pub already_pinned: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to delete, {} to retain ({} to pin), {} already pinned",
            self.delete, self.retain, self.pin, self.already_pinned
        )
    }
}

/// A deletion that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownFailure {
    pub type_tag: String,
    pub effective_name: String,
    pub message: String,
}

/// Result of one teardown
///
/// Entries are record keys (`type:effective_name`), in the order they were
/// handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownResult {
    pub policy: RemovalPolicy,
    pub deleted: Vec<String>,
    pub retained: Vec<String>,
    pub pinned: Vec<String>,
    pub failures: Vec<TeardownFailure>,

    /// State store updates that did not land; `deleted` is still accurate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state_errors: Vec<String>,

    pub status: RunStatus,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl TeardownResult {
    pub fn new(policy: RemovalPolicy) -> Self {
        Self {
            policy,
            deleted: Vec::new(),
            retained: Vec::new(),
            pinned: Vec::new(),
            failures: Vec::new(),
            state_errors: Vec::new(),
            status: RunStatus::Success,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.state_errors.is_empty()
    }

    pub fn add_deleted(&mut self, record: &ResourceRecord) {
        self.deleted.push(record.key());
    }

    pub fn add_retained(&mut self, record: &ResourceRecord) {
        self.retained.push(record.key());
    }

    pub fn add_pinned(&mut self, record: &ResourceRecord) {
        self.pinned.push(record.key());
    }

    pub fn add_failure(&mut self, record: &ResourceRecord, message: String) {
        self.failures.push(TeardownFailure {
            type_tag: record.type_tag.clone(),
            effective_name: record.effective_name.clone(),
            message,
        });
    }

    pub fn add_state_error(&mut self, message: String) {
        self.state_errors.push(message);
    }

    /// Derive `status` from the outcome
    pub fn finish(&mut self) {
        self.status = if self.is_success() {
            RunStatus::Success
        } else if self.deleted.is_empty() && !self.failures.is_empty() {
            RunStatus::Failure
        } else {
            RunStatus::PartialFailure
        };
    }

    /// Aggregate teardown failure when any deletion or state update failed
    pub fn ensure_success(&self) -> Result<()> {
        if !self.failures.is_empty() {
            Err(CloudError::Teardown {
                failed: self.failures.len(),
                total: self.failures.len() + self.deleted.len(),
            })
        } else if !self.state_errors.is_empty() {
            Err(CloudError::StateError(self.state_errors.join("; ")))
        } else {
            Ok(())
        }
    }
}
