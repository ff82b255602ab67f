//! Common test utilities for toolloop integration tests
#![allow(dead_code)]

use assert_cmd::Command;
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Isolated HOME with its own config directory and bucket root
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
    pub buckets_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let config_dir = temp_dir.path().join(".toolloop");
        let buckets_dir = temp_dir.path().join("buckets");

        std::fs::create_dir_all(&config_dir)?;

        Ok(Self {
            temp_dir,
            config_dir,
            buckets_dir,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    /// Command with HOME pointed at the test environment
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_toolloop"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env_remove("TOOLLOOP_API_KEY");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Config talking to `endpoint` with a test key and local buckets
    pub fn config_for(&self, endpoint: &str) -> Value {
        json!({
            "provider": {
                "api_key": "test-api-key",
                "endpoint": endpoint,
                "model_id": "test-model"
            },
            "agent": { "doc_dirs": [] },
            "storage": { "root": self.buckets_dir.to_string_lossy() }
        })
    }

    pub fn write_config(&self, config: &Value) -> anyhow::Result<()> {
        std::fs::write(self.config_file(), serde_json::to_string_pretty(config)?)?;
        Ok(())
    }

    /// Basic config with an unreachable endpoint
    pub fn create_config(&self) -> anyhow::Result<()> {
        self.write_config(&self.config_for("http://127.0.0.1:9"))
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}

/// Converse response envelope around `content` blocks
pub fn envelope(content: Value, stop_reason: &str) -> String {
    json!({
        "output": { "message": { "role": "assistant", "content": content } },
        "stopReason": stop_reason,
        "usage": { "inputTokens": 10, "outputTokens": 5, "totalTokens": 15 }
    })
    .to_string()
}
