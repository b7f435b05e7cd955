use appflow_core::{AppDescriptor, FlowError};
use colored::Colorize;
use std::path::Path;

pub fn handle(app_file: &Path, stage: Option<String>) -> anyhow::Result<()> {
    println!("{}", "設定を検証中...".blue());
    println!("設定ファイル: {}", app_file.display().to_string().cyan());

    let file = match appflow_core::load_app_file(app_file, stage.as_deref()) {
        Ok(file) => file,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 設定ファイルを読み込めません".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    match AppDescriptor::build(file.app) {
        Ok(descriptor) => {
            println!("{}", "✓ 設定ファイルは正常です！".green().bold());
            println!();
            println!("サマリー:");
            println!("  アプリ: {}", descriptor.name().cyan());
            if let Some(stage) = descriptor.stage() {
                println!("  ステージ: {}", stage.cyan());
            }
            println!("  リージョン: {}", descriptor.region());
            println!("  削除ポリシー: {}", descriptor.removal_policy());
            println!("  プロバイダー: {}個", descriptor.providers().len());
            for (key, config) in descriptor.providers().iter() {
                let profile = config.profile.as_deref().unwrap_or("(未設定)");
                println!(
                    "    - {} (kind: {}, profile: {})",
                    key.cyan(),
                    config.kind,
                    profile
                );
            }
            println!("  リソース: {}個", file.resources.len());
            for decl in &file.resources {
                let name = match &decl.name_prefix {
                    Some(prefix) => format!("{} (prefix: {})", decl.logical_name, prefix),
                    None => decl.logical_name.clone(),
                };
                println!("    - {} {}", decl.type_tag, name.cyan());
            }
        }
        Err(FlowError::InvalidAppSpec { violations }) => {
            eprintln!();
            eprintln!(
                "{}",
                format!("✗ 設定エラー ({} 件)", violations.len()).red().bold()
            );
            for violation in &violations {
                eprintln!("  • {}: {}", violation.field.yellow(), violation.message);
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 設定エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
