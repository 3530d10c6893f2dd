use crate::models::test_state::CompletedTest;
use anyhow::{Context, Result};
use serde::Serialize;
use shared::models::SpeedtestResult;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Serialize)]
struct ReportEntry<'a> {
    timestamp: String,
    node: &'a str,
    #[serde(flatten)]
    result: &'a SpeedtestResult,
}

/// Appends successful speedtest results to a JSON lines file.
pub struct ReportSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Failed tests are skipped, returns whether a line was written.
    pub async fn record(&self, node_name: &str, test: &CompletedTest) -> Result<bool> {
        if !test.result.is_success() {
            return Ok(false);
        }

        let entry = ReportEntry {
            timestamp: test.finished_at.to_rfc3339(),
            node: node_name,
            result: &test.result,
        };
        let mut line = serde_json::to_string(&entry).context("failed to serialize report")?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        file.flush().await?;
        Ok(true)
    }
}
