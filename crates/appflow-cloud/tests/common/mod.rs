use appflow_cloud::{
    CloudError, ConstructorCatalog, CreateRequest, ProfileCredentialResolver, Properties,
    ResolvedCredential, ResourceConstructor, ResourceRecord, Result, StaticCredentialStore,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Constructor that records every call instead of talking to a cloud
pub struct RecordingConstructor {
    type_tag: String,
    events: Arc<Mutex<Vec<String>>>,
    fail_create: HashSet<String>,
    fail_delete: HashSet<String>,
}

impl RecordingConstructor {
    pub fn new(type_tag: &str, events: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            type_tag: type_tag.to_string(),
            events,
            fail_create: HashSet::new(),
            fail_delete: HashSet::new(),
        }
    }

    /// Fail `create` for this logical name
    pub fn failing_create(mut self, logical_name: &str) -> Self {
        self.fail_create.insert(logical_name.to_string());
        self
    }

    /// Fail `delete` for this effective name
    pub fn failing_delete(mut self, effective_name: &str) -> Self {
        self.fail_delete.insert(effective_name.to_string());
        self
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ResourceConstructor for RecordingConstructor {
    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn provider(&self) -> &str {
        "aws"
    }

    async fn create(
        &self,
        request: &CreateRequest,
        credential: &ResolvedCredential,
    ) -> Result<Properties> {
        if self.fail_create.contains(&request.logical_name) {
            return Err(CloudError::Construction(format!(
                "quota exceeded for {}",
                request.logical_name
            )));
        }
        self.push(format!("create:{}", request.effective_name));
        let mut outputs = Properties::new();
        outputs.insert(
            "arn".to_string(),
            serde_json::json!(format!(
                "arn:aws:{}:{}:{}:{}",
                request.type_tag,
                request.region,
                credential.profile().unwrap_or("default"),
                request.effective_name
            )),
        );
        Ok(outputs)
    }

    async fn delete(&self, record: &ResourceRecord, _credential: &ResolvedCredential) -> Result<()> {
        if self.fail_delete.contains(&record.effective_name) {
            return Err(CloudError::Construction("resource in use".to_string()));
        }
        self.push(format!("delete:{}", record.effective_name));
        Ok(())
    }
}

pub struct Harness {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn queue(&self) -> RecordingConstructor {
        RecordingConstructor::new("queue", self.events.clone())
    }

    pub fn catalog(&self, queue: RecordingConstructor) -> ConstructorCatalog {
        ConstructorCatalog::new().with(Arc::new(queue)).unwrap()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn deletions(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix("delete:").map(|s| s.to_string()))
            .collect()
    }
}

/// Resolver that knows the `sst-dev` profile of the `aws` kind
pub fn sst_dev_resolver() -> Arc<ProfileCredentialResolver<StaticCredentialStore>> {
    Arc::new(ProfileCredentialResolver::new(
        StaticCredentialStore::new().with_entry("aws", Some("sst-dev"), "sst-dev-secret"),
    ))
}

/// Resolver with no credentials at all
pub fn empty_resolver() -> Arc<ProfileCredentialResolver<StaticCredentialStore>> {
    Arc::new(ProfileCredentialResolver::new(StaticCredentialStore::new()))
}
