//! appflow deployment lifecycle engine
//!
//! Takes a validated app descriptor through one deployment operation and
//! back out again.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   appflow CLI                    │
//! │             (appflow deploy/remove)              │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 appflow-cloud                    │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │ RunExecutor  │──│ RunContext (registry)    │ │
//! │  └──────┬───────┘  └──────────────────────────┘ │
//! │  ┌──────▼───────┐  ┌──────────────┐             │
//! │  │  Credential  │  │   Teardown   │──StateStore │
//! │  │   Resolver   │  │  (removal)   │             │
//! │  └──────────────┘  └──────────────┘             │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼─────────────────────┐
//! │ ResourceConstructor impls   │
//! │ (queue, bucket, function..) │
//! └─────────────────────────────┘
//! ```

pub mod action;
pub mod constructor;
pub mod credential;
pub mod error;
pub mod executor;
pub mod registry;
pub mod removal;
pub mod state;

// Re-exports
pub use action::{
    ActionType, PlanSummary, TeardownAction, TeardownFailure, TeardownPlan, TeardownResult,
};
pub use constructor::{ConstructOptions, ConstructorCatalog, CreateRequest, ResourceConstructor};
pub use credential::{
    ChainedCredentialStore, CredentialResolver, CredentialStore, EnvCredentialStore,
    ProfileCredentialResolver, ResolvedCredential, StaticCredentialStore,
};
pub use error::{CloudError, Result};
pub use executor::{
    BodyFuture, ConstructionBody, DeclaredBody, ResourceHandle, ResourceRef, RunContext,
    RunError, RunErrorKind, RunExecutor, RunResult, RunStatus, body_fn,
};
pub use registry::{
    Properties, Registration, Reservation, ResourceRecord, ResourceRegistry, SuffixStrategy,
};
pub use removal::{RemovalPolicyEngine, Teardown};
pub use state::{GlobalState, PinnedResource, StateLock, StateManager, StateStore};
