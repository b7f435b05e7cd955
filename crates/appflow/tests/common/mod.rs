#![allow(deprecated)]

use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const APP_KDL: &str = r#"
app "test" {
    region "us-east-1"
    removal-policy "remove"
    providers {
        aws profile="sst-dev"
    }
    stage "production" {
        removal-policy "retainAll"
    }
}

run {
    queue "queue" name-prefix="d"
}
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_app_kdl(&self, content: &str) {
        fs::write(self.root.path().join("app.kdl"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// `appflow` をプロジェクトルートで、認証情報つきで起動する
    pub fn appflow(&self) -> Command {
        let mut cmd = Command::cargo_bin("appflow").unwrap();
        cmd.current_dir(self.path())
            .env_remove("APPFLOW_CONFIG_PATH")
            .env_remove("APPFLOW_STAGE")
            .env_remove("RUST_LOG")
            .env("APPFLOW_CREDENTIAL_AWS_SST_DEV", "sst-dev-secret");
        cmd
    }

    #[allow(dead_code)]
    pub fn state(&self) -> Option<serde_json::Value> {
        let path = self.root.path().join(".appflow/state.json");
        let content = fs::read_to_string(path).ok()?;
        Some(serde_json::from_str(&content).unwrap())
    }
}
