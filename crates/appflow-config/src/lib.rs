pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// 設定ファイルの直接指定に使う環境変数
pub const CONFIG_PATH_ENV: &str = "APPFLOW_CONFIG_PATH";

/// プロジェクト内の作業ディレクトリ名（state.json などを置く）
pub const PROJECT_DIR: &str = ".appflow";

/// 検索対象のファイル名（優先順）
const CANDIDATES: [&str; 4] = ["app.local.kdl", ".app.local.kdl", "app.kdl", ".app.kdl"];

/// カレントディレクトリからapp.kdlファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 APPFLOW_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: app.local.kdl, .app.local.kdl, app.kdl, .app.kdl
/// 3. ./.appflow/ ディレクトリ内: 同様の順序
pub fn find_app_file() -> Result<PathBuf> {
    let current_dir = std::env::current_dir()?;
    find_app_file_in(&current_dir)
}

/// 指定ディレクトリを起点にapp.kdlファイルを探す
pub fn find_app_file_in(dir: &Path) -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            tracing::debug!(path = %path.display(), "Using app file from environment");
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{} points to a missing file", CONFIG_PATH_ENV);
    }

    // 2. 指定ディレクトリで検索
    for filename in &CANDIDATES {
        let path = dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.appflow/ ディレクトリで検索
    let work_dir = project_dir(dir);
    if work_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = work_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    Err(ConfigError::AppFileNotFound)
}

/// 設定ファイルのパスからプロジェクトルートを求める
///
/// `.appflow/` 内の設定ファイルの場合はその親ディレクトリがルートになる
pub fn project_root_of(app_file: &Path) -> PathBuf {
    let parent = app_file.parent().unwrap_or_else(|| Path::new("."));
    if parent.file_name().and_then(|n| n.to_str()) == Some(PROJECT_DIR) {
        parent.parent().unwrap_or(parent).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

/// プロジェクトの作業ディレクトリ (`{root}/.appflow`)
pub fn project_dir(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR)
}
