//! run ブロックのパース
//!
//! 子ノード1つがリソース構築呼び出し1回に対応する:
//! `queue "queue" name-prefix="d"` → type_tag="queue", logical_name="queue"

use super::{first_string, kdl_to_json};
use crate::error::{FlowError, Result};
use crate::model::ResourceDecl;
use kdl::KdlNode;

/// run ブロックをパース（宣言順を保持）
pub fn parse_run(node: &KdlNode) -> Result<Vec<ResourceDecl>> {
    let mut resources = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            resources.push(parse_resource(child)?);
        }
    }
    Ok(resources)
}

/// リソース宣言ノードをパース
pub fn parse_resource(node: &KdlNode) -> Result<ResourceDecl> {
    let type_tag = node.name().value().to_string();
    let logical_name = first_string(node).ok_or_else(|| {
        FlowError::InvalidConfig(format!("{} requires a logical name", type_tag))
    })?;

    let mut decl = ResourceDecl::new(type_tag, logical_name);

    for entry in node.entries() {
        let Some(key) = entry.name() else {
            continue;
        };
        match key.value() {
            "name-prefix" | "name_prefix" | "namePrefix" => {
                decl.name_prefix = entry.value().as_string().map(|s| s.to_string());
            }
            "provider" => {
                decl.provider = entry.value().as_string().map(|s| s.to_string());
            }
            other => {
                decl.properties
                    .insert(other.to_string(), kdl_to_json(entry.value()));
            }
        }
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            decl.properties
                .insert(child.name().value().to_string(), node_value(child));
        }
    }

    Ok(decl)
}

/// プロパティ子ノードの値
///
/// 引数1つ → スカラー、複数 → 配列、子ノードあり → オブジェクト
fn node_value(node: &KdlNode) -> serde_json::Value {
    if let Some(children) = node.children() {
        let map = children
            .nodes()
            .iter()
            .map(|c| (c.name().value().to_string(), node_value(c)))
            .collect();
        return serde_json::Value::Object(map);
    }

    let args: Vec<serde_json::Value> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| kdl_to_json(e.value()))
        .collect();

    match args.len() {
        0 => serde_json::Value::Null,
        1 => args.into_iter().next().unwrap_or(serde_json::Value::Null),
        _ => serde_json::Value::Array(args),
    }
}
