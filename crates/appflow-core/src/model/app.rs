//! アプリ宣言モデル
//!
//! 設定ファイルの `app` ノードをそのまま写した未検証の値。
//! 検証済みの値は [`crate::AppDescriptor`] を参照。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 削除ポリシー
///
/// デプロイ撤去時にリソースを削除するか保持するかを決める
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemovalPolicy {
    /// すべてのリソースを削除
    Remove,
    /// 削除しない（既定値）
    #[default]
    Retain,
    /// 削除せず、状態ストアで自動クリーンアップ対象から外す
    RetainAll,
}

impl RemovalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalPolicy::Remove => "remove",
            RemovalPolicy::Retain => "retain",
            RemovalPolicy::RetainAll => "retainAll",
        }
    }
}

impl fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemovalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remove" => Ok(RemovalPolicy::Remove),
            "retain" => Ok(RemovalPolicy::Retain),
            // KDL では kebab-case も許可
            "retainAll" | "retain-all" | "retain_all" => Ok(RemovalPolicy::RetainAll),
            other => Err(format!(
                "'{}' は不正な値です (remove, retain, retainAll のいずれか)",
                other
            )),
        }
    }
}

/// 未検証のプロバイダー宣言
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProvider {
    /// プロバイダーキー（aws, cloudflare など）
    pub key: String,

    /// ベンダー種別（省略時はキーと同じ）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// 認証プロファイル名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// 追加設定（プロバイダー固有）
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RawProvider {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// ステージ別の上書き設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOverride {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removal_policy: Option<String>,
}

/// 未検証のアプリ宣言
///
/// 値は文字列のまま保持し、検証は [`crate::AppDescriptor::build`] でまとめて行う
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAppSpec {
    pub name: String,

    #[serde(default)]
    pub region: Option<String>,

    /// 対象ステージ（CLI引数や APPFLOW_STAGE から）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,

    #[serde(default)]
    pub removal_policy: Option<String>,

    /// 宣言順を保持（重複キーの検出に必要）
    #[serde(default)]
    pub providers: Vec<RawProvider>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageOverride>,
}

impl RawAppSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_removal_policy(mut self, policy: impl Into<String>) -> Self {
        self.removal_policy = Some(policy.into());
        self
    }

    pub fn with_provider(mut self, provider: RawProvider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_stage_override(mut self, stage: StageOverride) -> Self {
        self.stages.push(stage);
        self
    }

    /// 選択中のステージの上書きを取得
    pub fn active_override(&self) -> Option<&StageOverride> {
        let stage = self.stage.as_deref()?;
        self.stages.iter().find(|s| s.name == stage)
    }
}
