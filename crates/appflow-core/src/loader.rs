//! 統合ローダー
//!
//! 設定ファイルの読み込み、ステージの適用、ディスクリプタの構築をまとめる

use crate::descriptor::AppDescriptor;
use crate::error::Result;
use crate::model::AppFile;
use crate::parser::parse_app_file;
use std::path::Path;
use tracing::{info, instrument};

/// 設定ファイルをロードしてステージを適用
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_app_file(path: &Path, stage: Option<&str>) -> Result<AppFile> {
    let file = parse_app_file(path)?.with_stage(stage.map(|s| s.to_string()));
    info!(
        app = %file.app.name,
        resources = file.resources.len(),
        "App file loaded"
    );
    Ok(file)
}

/// 設定ファイルをロードして検証済みのディスクリプタを返す
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_descriptor(path: &Path, stage: Option<&str>) -> Result<AppDescriptor> {
    let file = load_app_file(path, stage)?;
    AppDescriptor::build(file.app)
}
