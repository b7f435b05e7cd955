use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("アプリ設定が不正です ({} 件):\n{}", .violations.len(), format_violations(.violations))]
    InvalidAppSpec { violations: Vec<Violation> },

    #[error("プロバイダー '{0}' が重複して定義されています")]
    DuplicateProvider(String),

    #[error("プロバイダーが見つかりません: {0}")]
    UnknownProvider(String),
}

/// バリデーション違反（フィールド単位）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}

impl FlowError {
    /// InvalidAppSpec の違反フィールド一覧
    pub fn violated_fields(&self) -> Vec<&str> {
        match self {
            FlowError::InvalidAppSpec { violations } => {
                violations.iter().map(|v| v.field.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
