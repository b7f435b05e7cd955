use crate::utils;
use appflow_cloud::{ActionType, RunStatus, StateManager, StateStore, Teardown};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

pub async fn handle(project_root: &Path, stage: Option<String>, yes: bool) -> anyhow::Result<()> {
    let state = Arc::new(StateManager::new(project_root));

    let Some(run) = state.last_run().await? else {
        println!("{}", "記録されたデプロイはありません".yellow());
        return Ok(());
    };
    let Some(descriptor) = run.descriptor.clone() else {
        println!("{}", "記録されたデプロイはありません".yellow());
        return Ok(());
    };

    // 状態ファイルは直近の実行1つだけを持つ
    if let Some(requested) = stage.as_deref()
        && descriptor.stage() != Some(requested)
    {
        return Err(anyhow::anyhow!(
            "ステージ '{}' のデプロイは記録されていません（記録: {}）",
            requested,
            descriptor.stage().unwrap_or("(なし)")
        ));
    }

    println!("{}", "削除計画".blue().bold());
    println!("アプリ: {}", descriptor.qualified_name().cyan());
    println!("削除ポリシー: {}", descriptor.removal_policy());

    let raw = appflow_core::RawAppSpec::from(descriptor);
    let teardown = Teardown::new(utils::credential_resolver(), utils::preview_catalog(&raw))
        .with_state(state.clone());
    let plan = teardown.plan(&run).await?;

    if plan.is_empty() {
        println!("{}", "対象のリソースはありません".yellow());
        return Ok(());
    }

    println!();
    for action in &plan.actions {
        let marker = match action.action_type {
            ActionType::Delete => "-".red(),
            ActionType::Retain => "=".yellow(),
            ActionType::Pinned => "*".cyan(),
        };
        println!("  {} {}", marker, action.description());
    }
    println!();
    println!("{}", plan.summary());

    // 確認（--yesが指定されていない場合）
    if !yes {
        println!();
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    }

    let result = match teardown.apply(&run, &plan).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    println!();
    println!(
        "削除: {}個 / 保持: {}個 / 固定: {}個",
        result.deleted.len(),
        result.retained.len(),
        result.pinned.len()
    );
    for failure in &result.failures {
        eprintln!(
            "  ✗ {} '{}': {}",
            failure.type_tag, failure.effective_name, failure.message
        );
    }
    // 削除は済んでいるが状態ファイルに反映されていない
    for error in &result.state_errors {
        eprintln!("  {} 状態ファイルを更新できませんでした: {}", "!".yellow(), error);
    }
    println!("結果: {}", utils::status_label(result.status));

    if result.status != RunStatus::Success {
        std::process::exit(1);
    }
    Ok(())
}
