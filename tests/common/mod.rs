//! Shared utilities for integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Commented TOML fixture with one stdio server and a dev overlay.
#[allow(dead_code)]
pub fn commented_fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/config-with-comments.toml")
}

/// The same configuration as [`commented_fixture`], written as commented JSON.
#[allow(dead_code)]
pub fn commented_json_fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/config-with-comments.json")
}

/// Write `content` to `name` inside `dir` and return the path.
pub fn write_config(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Minimal valid TOML config with one stdio server named `test`.
#[allow(dead_code)]
pub fn stdio_config(command: &str) -> String {
    format!("[mcpServers.test]\ncommand = \"{command}\"\n")
}

/// Poll `check` until it holds or `timeout` passes.
#[allow(dead_code)]
pub async fn eventually<F>(timeout: Duration, check: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}
