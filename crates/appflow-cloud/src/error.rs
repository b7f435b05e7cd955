//! Lifecycle engine error types

use appflow_core::FlowError;
use thiserror::Error;

/// Lifecycle engine errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("App descriptor error: {0}")]
    Descriptor(#[from] FlowError),

    #[error("Provider not found: {0}")]
    UnknownProvider(String),

    #[error("Credential resolution failed for provider '{provider}' ({kind}): {message}")]
    CredentialResolution {
        provider: String,
        kind: String,
        message: String,
    },

    #[error("Resource already registered: {type_tag} '{effective_name}'")]
    DuplicateResource {
        type_tag: String,
        effective_name: String,
    },

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("No constructor registered for resource type: {0}")]
    UnknownResourceType(String),

    #[error("Constructor already registered for resource type: {0}")]
    DuplicateConstructor(String),

    #[error("Construction failed: {0}")]
    Construction(String),

    #[error("Run cancelled")]
    Cancelled,

    /// A failure attributed to one construct call
    #[error("{type_tag} '{logical_name}': {source}")]
    Resource {
        type_tag: String,
        logical_name: String,
        #[source]
        source: Box<CloudError>,
    },

    #[error("Deletion failed for {type_tag} '{effective_name}': {message}")]
    Deletion {
        type_tag: String,
        effective_name: String,
        message: String,
    },

    #[error("Teardown failed: {failed} of {total} deletions did not complete")]
    Teardown { failed: usize, total: usize },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Wrap an error with the identity of the construct call that raised it
    pub fn for_resource(
        type_tag: impl Into<String>,
        logical_name: impl Into<String>,
        source: CloudError,
    ) -> Self {
        CloudError::Resource {
            type_tag: type_tag.into(),
            logical_name: logical_name.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, skipping resource attribution
    pub fn root(&self) -> &CloudError {
        match self {
            CloudError::Resource { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), CloudError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
