use crate::preview::PreviewConstructor;
use appflow_cloud::{
    ConstructorCatalog, EnvCredentialStore, ProfileCredentialResolver, RunError, RunStatus,
};
use appflow_core::RawAppSpec;
use colored::Colorize;
use std::sync::Arc;

/// 環境変数 `APPFLOW_CREDENTIAL_*` から認証情報を引くリゾルバー
pub fn credential_resolver() -> Arc<ProfileCredentialResolver<EnvCredentialStore>> {
    Arc::new(ProfileCredentialResolver::new(EnvCredentialStore::default()))
}

/// プレビューコンストラクタだけを持つカタログ
///
/// プロバイダー指定のないリソースは、最初に宣言されたプロバイダーを使う
pub fn preview_catalog(app: &RawAppSpec) -> ConstructorCatalog {
    let default_provider = app
        .providers
        .first()
        .map(|p| p.key.clone())
        .unwrap_or_default();
    ConstructorCatalog::new().with_fallback(Arc::new(PreviewConstructor::new(default_provider)))
}

/// 実行ステータスを色付きで表示
pub fn status_label(status: RunStatus) -> colored::ColoredString {
    match status {
        RunStatus::Success => "成功".green().bold(),
        RunStatus::PartialFailure => "一部失敗".yellow().bold(),
        RunStatus::Failure => "失敗".red().bold(),
    }
}

/// エラー一覧を表示
pub fn print_errors(errors: &[RunError]) {
    if errors.is_empty() {
        return;
    }
    eprintln!();
    eprintln!("{}", format!("エラー ({} 件):", errors.len()).red().bold());
    for error in errors {
        eprintln!("  ✗ {}", error);
    }
}

/// `APPFLOW_CREDENTIAL_*` の設定方法を表示
pub fn print_credential_hint(app: &RawAppSpec) {
    let store = EnvCredentialStore::default();
    eprintln!();
    eprintln!(
        "{}",
        "ヒント: 以下の環境変数で認証情報を設定してください:".yellow()
    );
    for provider in &app.providers {
        let kind = provider.kind.as_deref().unwrap_or(&provider.key);
        if let Some(name) = store
            .variable_names(kind, provider.profile.as_deref())
            .first()
        {
            eprintln!("  {}=<secret>  ({})", name, provider.key.cyan());
        }
    }
}
