//! app ノードのパース

use super::{first_string, kdl_to_json};
use crate::error::{FlowError, Result};
use crate::model::{RawAppSpec, RawProvider, StageOverride};
use kdl::KdlNode;

/// app ノードをパース
pub fn parse_app(node: &KdlNode) -> Result<RawAppSpec> {
    let name = first_string(node)
        .ok_or_else(|| FlowError::InvalidConfig("app requires a name".to_string()))?;

    let mut app = RawAppSpec::new(name);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "region" => {
                    app.region = first_string(child);
                }
                "removal-policy" | "removal_policy" | "removalPolicy" => {
                    app.removal_policy = first_string(child);
                }
                "providers" => {
                    if let Some(providers) = child.children() {
                        for provider_node in providers.nodes() {
                            app.providers.push(parse_provider(provider_node));
                        }
                    }
                }
                "stage" => {
                    app.stages.push(parse_stage_override(child)?);
                }
                other => {
                    tracing::debug!(node = other, "Ignoring unknown app setting");
                }
            }
        }
    }

    Ok(app)
}

/// providers ブロック内のノードをパース
///
/// プロパティ形式 `aws profile="sst-dev"` と
/// 子ノード形式 `aws { profile "sst-dev" }` の両方をサポート
pub fn parse_provider(node: &KdlNode) -> RawProvider {
    let mut provider = RawProvider::new(node.name().value());

    for entry in node.entries() {
        let Some(key) = entry.name() else {
            continue;
        };
        assign_provider_field(&mut provider, key.value(), entry.value());
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            if let Some(value) = child.entries().first().map(|e| e.value()) {
                assign_provider_field(&mut provider, child.name().value(), value);
            }
        }
    }

    provider
}

fn assign_provider_field(provider: &mut RawProvider, key: &str, value: &kdl::KdlValue) {
    match key {
        "kind" => provider.kind = value.as_string().map(|s| s.to_string()),
        "profile" => provider.profile = value.as_string().map(|s| s.to_string()),
        // 追加設定はextraに保存
        other => {
            provider.extra.insert(other.to_string(), kdl_to_json(value));
        }
    }
}

/// app 内の stage ノードをパース
fn parse_stage_override(node: &KdlNode) -> Result<StageOverride> {
    let name = first_string(node)
        .ok_or_else(|| FlowError::InvalidConfig("stage requires a name".to_string()))?;

    let mut stage = StageOverride {
        name,
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "region" => stage.region = first_string(child),
                "removal-policy" | "removal_policy" | "removalPolicy" => {
                    stage.removal_policy = first_string(child);
                }
                _ => {}
            }
        }
    }

    Ok(stage)
}
