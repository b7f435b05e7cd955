mod commands;
mod preview;
mod utils;

use clap::{Parser, Subcommand};
use colored::Colorize;

#[derive(Parser)]
#[command(name = "appflow")]
#[command(about = "宣言して、作って、片付ける。", long_about = None)]
struct Cli {
    /// デバッグログを表示
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 設定を検証
    Validate {
        /// ステージ名 (dev, stg, prod)
        stage: Option<String>,
        /// ステージ名 (-s/--stage フラグ、APPFLOW_STAGE 環境変数)
        #[arg(
            short = 's',
            long = "stage",
            env = "APPFLOW_STAGE",
            conflicts_with = "stage",
            hide = true
        )]
        stage_flag: Option<String>,
    },
    /// run ブロックのリソースを作成
    Deploy {
        /// ステージ名 (dev, stg, prod)
        stage: Option<String>,
        /// ステージ名 (-s/--stage フラグ、APPFLOW_STAGE 環境変数)
        #[arg(
            short = 's',
            long = "stage",
            env = "APPFLOW_STAGE",
            conflicts_with = "stage",
            hide = true
        )]
        stage_flag: Option<String>,
    },
    /// 削除ポリシーに従ってリソースを片付ける
    Remove {
        /// ステージ名 (dev, stg, prod)
        stage: Option<String>,
        /// ステージ名 (-s/--stage フラグ、APPFLOW_STAGE 環境変数)
        #[arg(
            short = 's',
            long = "stage",
            env = "APPFLOW_STAGE",
            conflicts_with = "stage",
            hide = true
        )]
        stage_flag: Option<String>,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// バージョン情報を表示
    Version,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout はコマンドの出力に使うので、ログは stderr へ
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("appflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let app_file = match appflow_config::find_app_file() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            eprintln!();
            eprintln!("app.kdl が存在するディレクトリで実行してください");
            eprintln!(
                "  または {}=<path> で設定ファイルを指定してください",
                appflow_config::CONFIG_PATH_ENV
            );
            std::process::exit(1);
        }
    };
    let project_root = appflow_config::project_root_of(&app_file);

    // コマンドディスパッチ
    match cli.command {
        Commands::Validate { stage, stage_flag } => {
            commands::validate::handle(&app_file, stage.or(stage_flag))?;
        }
        Commands::Deploy { stage, stage_flag } => {
            commands::deploy::handle(&app_file, &project_root, stage.or(stage_flag)).await?;
        }
        Commands::Remove {
            stage,
            stage_flag,
            yes,
        } => {
            commands::remove::handle(&project_root, stage.or(stage_flag), yes).await?;
        }
        Commands::Version => {}
    }

    Ok(())
}
