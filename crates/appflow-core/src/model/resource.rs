//! リソース宣言モデル
//!
//! `run` ブロックの各ノードは1回のリソース構築呼び出しに対応する

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `run` ブロック内のリソース宣言
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// リソース種別（queue, bucket など）
    pub type_tag: String,

    /// 論理名
    pub logical_name: String,

    /// 名前プレフィックス（指定時は実効名に接尾辞が付く）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,

    /// 使用するプロバイダーキー（省略時はコンストラクタの既定）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// リソース固有のプロパティ
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl ResourceDecl {
    pub fn new(type_tag: impl Into<String>, logical_name: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            logical_name: logical_name.into(),
            ..Default::default()
        }
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }
}
