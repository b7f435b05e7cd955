//! appflow core
//!
//! アプリ設定（app.kdl）のモデル、パーサー、プロバイダーレジストリ、
//! アプリディスクリプタの検証を提供します。

pub mod descriptor;
pub mod error;
pub mod loader;
pub mod model;
pub mod parser;
pub mod provider;

pub use descriptor::{APP_NAME_PATTERN, AppDescriptor};
pub use error::{FlowError, Result, Violation};
pub use loader::{load_app_file, load_descriptor};
pub use model::{AppFile, RawAppSpec, RawProvider, RemovalPolicy, ResourceDecl, StageOverride};
pub use parser::{parse_app_file, parse_app_string};
pub use provider::{ProviderConfig, ProviderRegistry};
