//! Task execution and the completion sink
//!
//! Running a task is a no-op business action followed by one appended line in
//! the completion log. The append is awaited by the drain step that triggered
//! it, so the scheduler only pops a task once its record is on disk.

use std::collections::VecDeque;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use eyre::{Context, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::domain::{CompletionRecord, Task};

/// Performs the unit of work for one task
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run `task` and durably record its completion
    async fn execute(&self, task: &Task) -> Result<CompletionRecord>;
}

/// Append-only, line-per-record completion log
#[derive(Debug, Clone)]
pub struct CompletionLog {
    path: PathBuf,
}

impl CompletionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(?path, "CompletionLog::new: called");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single write
    ///
    /// Each call opens the file in append mode, so concurrent writers in
    /// other workers interleave whole lines, never partial ones.
    pub async fn append(&self, record: &CompletionRecord) -> Result<()> {
        debug!(path = ?self.path, owner = %record.owner, "CompletionLog::append: called");
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create completion log directory")?;
        }

        let line = format!("{}\n", record.to_line());
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open completion log {}", self.path.display()))?;

        file.write_all(line.as_bytes())
            .await
            .context("Failed to write completion record")?;
        file.flush().await.context("Failed to flush completion record")?;
        Ok(())
    }

    /// Last `lines` records, optionally only those owned by `user`
    pub fn tail(&self, lines: usize, user: Option<&str>) -> Result<Vec<String>> {
        debug!(path = ?self.path, lines, ?user, "CompletionLog::tail: called");
        if !self.path.exists() {
            debug!("CompletionLog::tail: log does not exist");
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path).context("Failed to open completion log")?;
        let prefix = user.map(|u| format!("{} - ", u));

        // Keep only the last `lines` matches; undecodable bytes are replaced, not fatal
        let mut recent = VecDeque::with_capacity(lines.min(1024));
        for raw in BufReader::new(file).split(b'\n') {
            let raw = raw.context("Failed to read completion log")?;
            let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
            if prefix.as_ref().is_some_and(|p| !line.starts_with(p.as_str())) {
                continue;
            }
            if recent.len() == lines {
                if lines == 0 {
                    break;
                }
                recent.pop_front();
            }
            recent.push_back(line);
        }

        Ok(recent.into())
    }
}

#[async_trait]
impl TaskExecutor for CompletionLog {
    async fn execute(&self, task: &Task) -> Result<CompletionRecord> {
        let record = CompletionRecord::now(task);
        info!(
            task_id = %task.id(),
            "{} - task completed at - {}",
            record.owner,
            record.completed_at.timestamp_millis()
        );
        self.append(&record).await?;
        Ok(record)
    }
}
