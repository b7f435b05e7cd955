//! アプリディスクリプタ
//!
//! `app` 宣言を検証して作る不変のレコード。構築後に変更する API はない。
//! 名前とリージョンが変わると別のアプリとして扱われる。

use crate::error::{FlowError, Result, Violation};
use crate::model::{RawAppSpec, RawProvider, RemovalPolicy};
use crate::provider::{ProviderConfig, ProviderRegistry};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// アプリ名の形式（URLセーフ）
pub const APP_NAME_PATTERN: &str = r"^[a-zA-Z][a-zA-Z0-9-]*$";

/// 検証済みのアプリ定義
///
/// シリアライズは RawAppSpec 形式で行い、デシリアライズ時には再検証する
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAppSpec", into = "RawAppSpec")]
pub struct AppDescriptor {
    name: String,
    region: String,
    stage: Option<String>,
    removal_policy: RemovalPolicy,
    providers: ProviderRegistry,
}

impl AppDescriptor {
    /// RawAppSpec を検証して AppDescriptor を作る
    ///
    /// 違反はすべて収集してから `InvalidAppSpec` として返す（最初の1件で止めない）。
    /// ステージが指定されていれば、そのステージの上書きを先に適用する。
    pub fn build(raw: RawAppSpec) -> Result<Self> {
        let name_re = Regex::new(APP_NAME_PATTERN)
            .map_err(|e| FlowError::InvalidConfig(format!("正規表現のコンパイルエラー: {}", e)))?;

        let mut violations = Vec::new();

        if raw.name.is_empty() {
            violations.push(Violation::new("name", "空にできません"));
        } else if !name_re.is_match(&raw.name) {
            violations.push(Violation::new(
                "name",
                format!("'{}' は {} に一致しません", raw.name, APP_NAME_PATTERN),
            ));
        }

        let stage_override = raw.active_override();

        let region = stage_override
            .and_then(|s| s.region.clone())
            .or_else(|| raw.region.clone())
            .unwrap_or_default();
        if region.trim().is_empty() {
            violations.push(Violation::new("region", "指定されていません"));
        }

        let policy_raw = stage_override
            .and_then(|s| s.removal_policy.as_deref())
            .or(raw.removal_policy.as_deref());
        // 省略時は破壊的でない retain
        let removal_policy = match policy_raw {
            None => RemovalPolicy::default(),
            Some(value) => match value.parse::<RemovalPolicy>() {
                Ok(policy) => policy,
                Err(message) => {
                    violations.push(Violation::new("removalPolicy", message));
                    RemovalPolicy::default()
                }
            },
        };

        let mut providers = ProviderRegistry::new();
        let mut seen = BTreeSet::new();
        let mut duplicate = None;
        for provider in &raw.providers {
            let field = format!("providers.{}", provider.key);
            if provider.key.is_empty() {
                violations.push(Violation::new("providers", "キーが空のプロバイダーがあります"));
                continue;
            }
            // 種別が不正なエントリも重複判定には数える
            if !seen.insert(provider.key.as_str()) {
                violations.push(Violation::new(field, "キーが重複しています"));
                duplicate.get_or_insert_with(|| provider.key.clone());
                continue;
            }
            let config = match provider_config(provider) {
                Some(config) => config,
                None => {
                    violations.push(Violation::new(format!("{}.kind", field), "指定されていません"));
                    continue;
                }
            };
            if let Err(e) = providers.register(provider.key.clone(), config) {
                violations.push(Violation::new(field, e.to_string()));
            }
        }

        // 重複だけが問題なら専用のエラーを返す
        if let Some(key) = duplicate
            && violations.len() == 1
        {
            return Err(FlowError::DuplicateProvider(key));
        }
        if !violations.is_empty() {
            return Err(FlowError::InvalidAppSpec { violations });
        }

        debug!(
            app = %raw.name,
            region = %region,
            removal_policy = %removal_policy,
            providers = providers.len(),
            "App descriptor built"
        );

        Ok(Self {
            name: raw.name,
            region,
            stage: raw.stage,
            removal_policy,
            providers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        self.removal_policy
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// アプリの識別子（名前とステージ）
    pub fn qualified_name(&self) -> String {
        match &self.stage {
            Some(stage) => format!("{}-{}", self.name, stage),
            None => self.name.clone(),
        }
    }
}

/// kind が空なら None（kind 省略時はキーを使う）
fn provider_config(provider: &RawProvider) -> Option<ProviderConfig> {
    let kind = provider.kind.clone().unwrap_or_else(|| provider.key.clone());
    if kind.trim().is_empty() {
        return None;
    }
    Some(ProviderConfig {
        kind,
        profile: provider.profile.clone(),
        extra: provider.extra.clone(),
    })
}

impl TryFrom<RawAppSpec> for AppDescriptor {
    type Error = FlowError;

    fn try_from(raw: RawAppSpec) -> Result<Self> {
        Self::build(raw)
    }
}

impl From<AppDescriptor> for RawAppSpec {
    fn from(descriptor: AppDescriptor) -> Self {
        RawAppSpec {
            name: descriptor.name,
            region: Some(descriptor.region),
            stage: descriptor.stage,
            removal_policy: Some(descriptor.removal_policy.to_string()),
            providers: descriptor
                .providers
                .iter()
                .map(|(key, config)| RawProvider {
                    key: key.clone(),
                    kind: Some(config.kind.clone()),
                    profile: config.profile.clone(),
                    extra: config.extra.clone(),
                })
                .collect(),
            stages: Vec::new(),
        }
    }
}
