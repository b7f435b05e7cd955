//! Run executor
//!
//! One [`RunExecutor::execute`] call is one deployment operation:
//!
//! 1. build the [`AppDescriptor`] (no side effects on failure)
//! 2. resolve every declared provider (fail-closed: the body never runs if
//!    any provider cannot be resolved)
//! 3. invoke the construction body exactly once with a fresh [`RunContext`]
//! 4. collect per-resource failures instead of aborting
//! 5. return a [`RunResult`] holding every resource that was actually created

use crate::constructor::{ConstructOptions, ConstructorCatalog, CreateRequest};
use crate::credential::{CredentialResolver, ResolvedCredential};
use crate::error::{CloudError, Result};
use crate::registry::{Registration, ResourceRecord, ResourceRegistry, SuffixStrategy};
use appflow_core::{AppDescriptor, FlowError, RawAppSpec, ResourceDecl};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Success,
    PartialFailure,
    Failure,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::PartialFailure => write!(f, "partial-failure"),
            RunStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Error category recorded in a [`RunResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunErrorKind {
    InvalidAppSpec,
    DuplicateProvider,
    UnknownProvider,
    CredentialResolution,
    DuplicateResource,
    UnknownResourceType,
    InvalidResource,
    Construction,
    Cancelled,
    Other,
}

impl RunErrorKind {
    fn of(error: &CloudError) -> Self {
        match error.root() {
            CloudError::Descriptor(FlowError::InvalidAppSpec { .. }) => RunErrorKind::InvalidAppSpec,
            CloudError::Descriptor(FlowError::DuplicateProvider(_)) => {
                RunErrorKind::DuplicateProvider
            }
            CloudError::Descriptor(FlowError::UnknownProvider(_)) | CloudError::UnknownProvider(_) => {
                RunErrorKind::UnknownProvider
            }
            CloudError::CredentialResolution { .. } => RunErrorKind::CredentialResolution,
            CloudError::DuplicateResource { .. } => RunErrorKind::DuplicateResource,
            CloudError::UnknownResourceType(_) => RunErrorKind::UnknownResourceType,
            CloudError::InvalidResource(_) => RunErrorKind::InvalidResource,
            CloudError::Construction(_) => RunErrorKind::Construction,
            CloudError::Cancelled => RunErrorKind::Cancelled,
            _ => RunErrorKind::Other,
        }
    }
}

/// Identity of the construct call an error is attributed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub type_tag: String,
    pub logical_name: String,
}

/// One failure recorded during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: RunErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceRef>,
    /// Provider key for credential failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub message: String,
}

impl RunError {
    pub fn from_error(error: &CloudError) -> Self {
        let resource = match error {
            CloudError::Resource {
                type_tag,
                logical_name,
                ..
            } => Some(ResourceRef {
                type_tag: type_tag.clone(),
                logical_name: logical_name.clone(),
            }),
            _ => None,
        };
        let provider = match error.root() {
            CloudError::CredentialResolution { provider, .. } => Some(provider.clone()),
            CloudError::UnknownProvider(provider) => Some(provider.clone()),
            _ => None,
        };
        Self {
            kind: RunErrorKind::of(error),
            resource,
            provider,
            message: error.root().to_string(),
        }
    }

    /// Whether this error is attributed to the given construct call
    pub fn is_for(&self, type_tag: &str, logical_name: &str) -> bool {
        self.resource
            .as_ref()
            .is_some_and(|r| r.type_tag == type_tag && r.logical_name == logical_name)
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(r) => write!(f, "{} '{}': {}", r.type_tag, r.logical_name, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Result of one deployment operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Missing only when the app spec failed validation
    pub descriptor: Option<AppDescriptor>,
    /// Created resources in construction order
    pub resources: Vec<ResourceRecord>,
    pub status: RunStatus,
    pub errors: Vec<RunError>,
    pub duration_ms: u64,
}

impl RunResult {
    fn failed(descriptor: Option<AppDescriptor>, errors: Vec<RunError>, started: Instant) -> Self {
        Self {
            descriptor,
            resources: Vec::new(),
            status: RunStatus::Failure,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Find a record by its effective name
    pub fn resource(&self, type_tag: &str, effective_name: &str) -> Option<&ResourceRecord> {
        self.resources
            .iter()
            .find(|r| r.type_tag == type_tag && r.effective_name == effective_name)
    }

    pub fn was_cancelled(&self) -> bool {
        self.errors.iter().any(|e| e.kind == RunErrorKind::Cancelled)
    }
}

/// Status from the errors and resources of a finished run
fn status_of(resources: &[ResourceRecord], errors: &[RunError]) -> RunStatus {
    if errors.is_empty() {
        RunStatus::Success
    } else if resources.is_empty() {
        RunStatus::Failure
    } else {
        RunStatus::PartialFailure
    }
}

/// Handle returned to the construction body for a created resource
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    record: ResourceRecord,
}

impl ResourceHandle {
    pub fn effective_name(&self) -> &str {
        &self.record.effective_name
    }

    pub fn ordinal(&self) -> u64 {
        self.record.ordinal
    }

    pub fn output<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.record.get_output(key)
    }

    pub fn record(&self) -> &ResourceRecord {
        &self.record
    }
}

/// Capability handed to the construction body
///
/// Scoped to exactly one `execute` call. The body can construct resources and
/// read what it has constructed so far; it cannot reach the registry itself.
pub struct RunContext {
    descriptor: AppDescriptor,
    credentials: HashMap<String, ResolvedCredential>,
    catalog: Arc<ConstructorCatalog>,
    registry: Mutex<ResourceRegistry>,
    errors: Mutex<Vec<RunError>>,
    cancel: CancellationToken,
}

impl RunContext {
    fn new(
        descriptor: AppDescriptor,
        credentials: HashMap<String, ResolvedCredential>,
        catalog: Arc<ConstructorCatalog>,
        suffix: SuffixStrategy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            descriptor,
            credentials,
            catalog,
            registry: Mutex::new(ResourceRegistry::with_suffix_strategy(suffix)),
            errors: Mutex::new(Vec::new()),
            cancel,
        }
    }

    pub fn descriptor(&self) -> &AppDescriptor {
        &self.descriptor
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Records committed so far, in construction order
    pub fn resources(&self) -> Vec<ResourceRecord> {
        self.registry().records().to_vec()
    }

    fn registry(&self) -> MutexGuard<'_, ResourceRegistry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn errors(&self) -> MutexGuard<'_, Vec<RunError>> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Construct one resource
    ///
    /// Any failure is recorded against `(type_tag, logical_name)` before it
    /// is returned, so the body may ignore it and keep going, or propagate it
    /// with `?` without the executor recording it twice.
    pub async fn construct(
        &self,
        type_tag: &str,
        logical_name: &str,
        options: ConstructOptions,
    ) -> Result<ResourceHandle> {
        match self.try_construct(type_tag, logical_name, options).await {
            Ok(handle) => Ok(handle),
            Err(source) => {
                let error = CloudError::for_resource(type_tag, logical_name, source);
                warn!(error = %error, "Resource construction failed");
                self.errors().push(RunError::from_error(&error));
                Err(error)
            }
        }
    }

    async fn try_construct(
        &self,
        type_tag: &str,
        logical_name: &str,
        options: ConstructOptions,
    ) -> Result<ResourceHandle> {
        // Cancellation is only observed between registrations
        if self.cancel.is_cancelled() {
            return Err(CloudError::Cancelled);
        }

        let constructor = self.catalog.get(type_tag)?;
        let provider = options
            .provider
            .clone()
            .unwrap_or_else(|| constructor.provider().to_string());
        let credential = self
            .credentials
            .get(&provider)
            .cloned()
            .ok_or_else(|| CloudError::UnknownProvider(provider.clone()))?;

        let mut registration = Registration::new(type_tag, logical_name)
            .with_provider(provider)
            .with_properties(options.properties);
        registration.name_prefix = options.name_prefix;
        let reservation = self.registry().reserve(registration)?;

        let request = CreateRequest {
            app: self.descriptor.name().to_string(),
            stage: self.descriptor.stage().map(|s| s.to_string()),
            region: self.descriptor.region().to_string(),
            type_tag: type_tag.to_string(),
            logical_name: logical_name.to_string(),
            effective_name: reservation.effective_name().to_string(),
            properties: reservation.properties().clone(),
        };

        // Provisioning runs as its own task so a panicking constructor
        // surfaces as a construction error
        let task = tokio::spawn(async move { constructor.create(&request, &credential).await });
        let outputs = match task.await {
            Ok(Ok(outputs)) => outputs,
            Ok(Err(e @ CloudError::Construction(_))) => return Err(e),
            Ok(Err(e)) => return Err(CloudError::Construction(e.to_string())),
            Err(e) => {
                return Err(CloudError::Construction(format!(
                    "constructor task failed: {}",
                    e
                )));
            }
        };

        let record = self.registry().commit(reservation, outputs);
        debug!(
            type_tag = %record.type_tag,
            effective_name = %record.effective_name,
            ordinal = record.ordinal,
            "Resource created"
        );
        Ok(ResourceHandle { record })
    }

    /// Construct a resource from a `run` block declaration
    pub async fn construct_decl(&self, decl: &ResourceDecl) -> Result<ResourceHandle> {
        let options = ConstructOptions {
            name_prefix: decl.name_prefix.clone(),
            provider: decl.provider.clone(),
            properties: decl.properties.clone(),
        };
        self.construct(&decl.type_tag, &decl.logical_name, options)
            .await
    }

    fn finish(self) -> (Vec<ResourceRecord>, Vec<RunError>) {
        let registry = self.registry.into_inner().unwrap_or_else(|e| e.into_inner());
        let errors = self.errors.into_inner().unwrap_or_else(|e| e.into_inner());
        (registry.into_records(), errors)
    }
}

/// The user-supplied resource-construction body
///
/// Consumed by value: a body runs at most once.
#[async_trait]
pub trait ConstructionBody: Send {
    async fn run(self, ctx: &RunContext) -> Result<()>;
}

/// Boxed future returned by closure bodies
pub type BodyFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Closure adapter, see [`body_fn`]
pub struct FnBody<F>(F);

/// Build a construction body from a closure
///
/// ```ignore
/// let body = body_fn(|ctx| Box::pin(async move {
///     ctx.construct("queue", "queue", ConstructOptions::new().name_prefix("d")).await?;
///     Ok(())
/// }));
/// ```
pub fn body_fn<F>(f: F) -> FnBody<F>
where
    F: for<'a> FnOnce(&'a RunContext) -> BodyFuture<'a> + Send,
{
    FnBody(f)
}

#[async_trait]
impl<F> ConstructionBody for FnBody<F>
where
    F: for<'a> FnOnce(&'a RunContext) -> BodyFuture<'a> + Send,
{
    async fn run(self, ctx: &RunContext) -> Result<()> {
        (self.0)(ctx).await
    }
}

/// Body built from `run` block declarations
///
/// Every declaration is constructed in order; a failing declaration is
/// recorded and the remaining ones still run.
#[derive(Debug, Clone, Default)]
pub struct DeclaredBody {
    resources: Vec<ResourceDecl>,
}

impl DeclaredBody {
    pub fn new(resources: Vec<ResourceDecl>) -> Self {
        Self { resources }
    }
}

#[async_trait]
impl ConstructionBody for DeclaredBody {
    async fn run(self, ctx: &RunContext) -> Result<()> {
        for decl in &self.resources {
            match ctx.construct_decl(decl).await {
                Ok(_) => {}
                // Nothing after a cancellation can be registered
                Err(e) if e.is_cancelled() => return Err(e),
                Err(_) => {}
            }
        }
        Ok(())
    }
}

/// Orchestrates deployment operations
pub struct RunExecutor {
    resolver: Arc<dyn CredentialResolver>,
    catalog: Arc<ConstructorCatalog>,
    suffix: SuffixStrategy,
    cancel: CancellationToken,
}

impl RunExecutor {
    pub fn new(resolver: Arc<dyn CredentialResolver>, catalog: ConstructorCatalog) -> Self {
        Self {
            resolver,
            catalog: Arc::new(catalog),
            suffix: SuffixStrategy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_suffix_strategy(mut self, suffix: SuffixStrategy) -> Self {
        self.suffix = suffix;
        self
    }

    /// Token checked between resource registrations
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn catalog(&self) -> &ConstructorCatalog {
        &self.catalog
    }

    /// Run one deployment operation
    #[instrument(skip_all, fields(app = %spec.name))]
    pub async fn execute<B: ConstructionBody>(&self, spec: RawAppSpec, body: B) -> RunResult {
        let started = Instant::now();

        // 1. Descriptor
        let descriptor = match AppDescriptor::build(spec) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(error = %e, "App spec rejected");
                let error = RunError::from_error(&CloudError::Descriptor(e));
                return RunResult::failed(None, vec![error], started);
            }
        };

        // 2. Credentials, all of them before any construction
        let mut credentials = HashMap::new();
        let mut failures = Vec::new();
        for (key, config) in descriptor.providers().iter() {
            match self.resolver.resolve(key, config).await {
                Ok(credential) => {
                    credentials.insert(key.clone(), credential);
                }
                Err(e) => {
                    warn!(provider = %key, error = %e, "Provider could not be resolved");
                    failures.push(RunError::from_error(&e));
                }
            }
        }
        if !failures.is_empty() {
            return RunResult::failed(Some(descriptor), failures, started);
        }
        info!(providers = credentials.len(), "Providers resolved");

        // 3. Body, exactly once
        let ctx = RunContext::new(
            descriptor.clone(),
            credentials,
            self.catalog.clone(),
            self.suffix.clone(),
            self.cancel.clone(),
        );
        if let Err(e) = body.run(&ctx).await {
            // Errors from construct were recorded when they happened
            if !matches!(e, CloudError::Resource { .. }) {
                warn!(error = %e, "Construction body failed");
                ctx.errors().push(RunError::from_error(&e));
            }
        }

        // 4./5. Everything that was created, whatever the outcome
        let (resources, errors) = ctx.finish();
        let status = status_of(&resources, &errors);
        info!(
            status = %status,
            resources = resources.len(),
            errors = errors.len(),
            "Run finished"
        );

        RunResult {
            descriptor: Some(descriptor),
            resources,
            status,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}
