use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "アプリ設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: app.kdl, app.local.kdl, .app.kdl, .app.local.kdl\n\
        - ./.appflow/ ディレクトリ\n\
        または APPFLOW_CONFIG_PATH 環境変数で直接指定できます"
    )]
    AppFileNotFound,

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
