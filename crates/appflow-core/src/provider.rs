//! プロバイダーレジストリ
//!
//! アプリ設定で宣言されたプロバイダー（ベンダー種別 + 認証プロファイル）を保持する

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 検証済みのプロバイダー設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// ベンダー種別（aws, cloudflare など）
    pub kind: String,

    /// 認証プロファイル名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// 追加設定（プロバイダー固有）
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ProviderConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            profile: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// 追加設定を型付きで取得
    pub fn get_extra<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.extra
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// キー → プロバイダー設定
///
/// ひとつの AppDescriptor の構築中にだけ変更される
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// プロバイダーを登録（既存キーはエラー）
    pub fn register(&mut self, key: impl Into<String>, config: ProviderConfig) -> Result<()> {
        let key = key.into();
        if self.providers.contains_key(&key) {
            return Err(FlowError::DuplicateProvider(key));
        }
        self.providers.insert(key, config);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&ProviderConfig> {
        self.providers
            .get(key)
            .ok_or_else(|| FlowError::UnknownProvider(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.providers.contains_key(key)
    }

    /// キー順に列挙
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProviderConfig)> {
        self.providers.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.providers.keys()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
