//! KDLパーサー
//!
//! appflowのKDL設定ファイル（app.kdl）をパースします。
//! 各ノードタイプのパース処理はモジュールに分離されています。

mod app;
mod run;

pub use app::{parse_app, parse_provider};
pub use run::{parse_resource, parse_run};

use crate::error::{FlowError, Result};
use crate::model::AppFile;
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::fs;
use std::path::Path;

/// KDLファイルをパースしてAppFileを生成
pub fn parse_app_file<P: AsRef<Path>>(path: P) -> Result<AppFile> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| FlowError::IoError {
        path: path.as_ref().to_path_buf(),
        message: e.to_string(),
    })?;
    parse_app_string(&content)
}

/// KDL文字列をパース
pub fn parse_app_string(content: &str) -> Result<AppFile> {
    let doc: KdlDocument = content.parse()?;

    let mut app = None;
    let mut resources = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "app" => {
                if app.is_some() {
                    return Err(FlowError::InvalidConfig(
                        "app ノードは1つだけ定義できます".to_string(),
                    ));
                }
                app = Some(parse_app(node)?);
            }
            "run" => {
                // 複数の run ブロックは宣言順に連結
                resources.extend(parse_run(node)?);
            }
            _ => {
                // 不明なノードはスキップ
            }
        }
    }

    let app = app.ok_or_else(|| FlowError::InvalidConfig("app ノードが必要です".to_string()))?;

    Ok(AppFile { app, resources })
}

/// 最初の引数（プロパティを除く）を文字列として取得
pub(crate) fn first_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// KDLの値をJSONの値に変換
pub(crate) fn kdl_to_json(value: &KdlValue) -> serde_json::Value {
    if let Some(s) = value.as_string() {
        return serde_json::Value::String(s.to_string());
    }
    if let Some(i) = value.as_integer() {
        // i64 に収まらない整数は文字列で保持
        return i64::try_from(i)
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(i.to_string()));
    }
    if let Some(f) = value.as_float() {
        return serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);
    }
    if let Some(b) = value.as_bool() {
        return serde_json::Value::Bool(b);
    }
    serde_json::Value::Null
}
