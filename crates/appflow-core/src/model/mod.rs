mod app;
mod resource;

pub use app::*;
pub use resource::*;

use serde::{Deserialize, Serialize};

/// 設定ファイル1つ分の内容
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppFile {
    /// `app` ノード
    pub app: RawAppSpec,

    /// `run` ブロックのリソース宣言（宣言順）
    pub resources: Vec<ResourceDecl>,
}

impl AppFile {
    /// ステージを指定した AppFile を返す
    pub fn with_stage(mut self, stage: Option<String>) -> Self {
        if stage.is_some() {
            self.app.stage = stage;
        }
        self
    }
}
