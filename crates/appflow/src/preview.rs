//! クラウド API を呼ばないプレビュー用コンストラクタ
//!
//! どのリソース種別でも受け付け、実効名と入力プロパティをそのまま出力として返す。

use appflow_cloud::{
    CreateRequest, Properties, ResolvedCredential, ResourceConstructor, ResourceRecord, Result,
};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

pub struct PreviewConstructor {
    provider: String,
}

impl PreviewConstructor {
    /// `provider` は `provider=` 指定のないリソースが使うプロバイダーキー
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

#[async_trait]
impl ResourceConstructor for PreviewConstructor {
    fn type_tag(&self) -> &str {
        "*"
    }

    fn provider(&self) -> &str {
        &self.provider
    }

    async fn create(
        &self,
        request: &CreateRequest,
        credential: &ResolvedCredential,
    ) -> Result<Properties> {
        info!(
            type_tag = %request.type_tag,
            effective_name = %request.effective_name,
            provider = credential.provider(),
            "Preview create"
        );
        let mut outputs = Properties::new();
        outputs.insert(
            "id".to_string(),
            json!(format!(
                "{}/{}/{}",
                request.app, request.type_tag, request.effective_name
            )),
        );
        outputs.insert("region".to_string(), json!(request.region));
        outputs.insert("preview".to_string(), json!(true));
        Ok(outputs)
    }

    async fn delete(&self, record: &ResourceRecord, credential: &ResolvedCredential) -> Result<()> {
        info!(
            type_tag = %record.type_tag,
            effective_name = %record.effective_name,
            provider = credential.provider(),
            "Preview delete"
        );
        Ok(())
    }
}
