use crate::utils;
use appflow_cloud::{DeclaredBody, RunErrorKind, RunExecutor, RunStatus, StateManager, StateStore};
use colored::Colorize;
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub async fn handle(
    app_file: &Path,
    project_root: &Path,
    stage: Option<String>,
) -> anyhow::Result<()> {
    println!("{}", "デプロイを開始します...".blue().bold());
    println!("設定ファイル: {}", app_file.display().to_string().cyan());

    let file = appflow_core::load_app_file(app_file, stage.as_deref())?;
    println!("アプリ: {}", file.app.name.cyan());
    if let Some(stage) = &file.app.stage {
        println!("ステージ: {}", stage.cyan());
    }

    // Ctrl-C で以降のリソース登録を止める（作成済みのものは結果に残る）
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("{}", "中断を受け付けました。作成中のリソースを待っています...".yellow());
            watcher.cancel();
        }
    });

    let executor = RunExecutor::new(utils::credential_resolver(), utils::preview_catalog(&file.app))
        .with_cancellation(cancel);
    let app = file.app.clone();
    let result = executor
        .execute(file.app, DeclaredBody::new(file.resources))
        .await;

    // 記述子が作れた実行は、失敗していても作成済みリソースを記録する
    if result.descriptor.is_some() {
        let state = StateManager::new(project_root);
        state.record_run(&result).await?;
        tracing::debug!(path = %state.state_path().display(), "Run recorded");
    }

    println!();
    println!("{}", format!("作成したリソース ({} 個):", result.resources.len()).bold());
    for record in &result.resources {
        println!(
            "  {} {} {} (#{})",
            "✓".green(),
            record.type_tag,
            record.effective_name.cyan(),
            record.ordinal
        );
    }

    utils::print_errors(&result.errors);
    if result
        .errors
        .iter()
        .any(|e| e.kind == RunErrorKind::CredentialResolution)
    {
        utils::print_credential_hint(&app);
    }

    println!();
    println!("結果: {}", utils::status_label(result.status));
    if result.was_cancelled() {
        println!("{}", "デプロイは中断されました".yellow());
    }

    if result.status != RunStatus::Success {
        std::process::exit(1);
    }
    Ok(())
}
