//! Run repository
//!
//! Stores each run under `<workspace>/.sluice/runs/<run-id>/`:
//! - `run.json`: the run record, rewritten on every state change
//! - `log.jsonl`: one [`LogEntry`] per line, appended as logs are flushed

use async_trait::async_trait;
use sluice_core::domain::log::LogEntry;
use sluice_core::domain::run::Run;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::state_dir;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("run {0} not found")]
    NotFound(Uuid),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid data in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Repository trait for run records and logs
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Creates or replaces a run record
    async fn save(&self, run: &Run) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Run>;

    /// All runs, newest first
    async fn list(&self) -> Result<Vec<Run>>;

    /// Appends entries to the run log
    async fn append_logs(&self, id: Uuid, entries: &[LogEntry]) -> Result<()>;

    async fn read_logs(&self, id: Uuid) -> Result<Vec<LogEntry>>;
}

/// File-backed implementation of RunRepository
pub struct FileRunRepository {
    root: PathBuf,
}

impl FileRunRepository {
    /// Repository for the runs of a workspace
    pub fn new(workspace: &Path) -> Self {
        Self {
            root: state_dir(workspace).join("runs"),
        }
    }

    fn run_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> RepositoryError + '_ {
        move |source| RepositoryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl RunRepository for FileRunRepository {
    async fn save(&self, run: &Run) -> Result<()> {
        let dir = self.run_dir(run.id);
        tokio::fs::create_dir_all(&dir).await.map_err(Self::io(&dir))?;

        let path = dir.join("run.json");
        let tmp = dir.join("run.json.tmp");
        let json = serde_json::to_vec_pretty(run).map_err(|source| RepositoryError::Json {
            path: path.clone(),
            source,
        })?;

        // Write then rename so readers never see a partial record
        tokio::fs::write(&tmp, json).await.map_err(Self::io(&tmp))?;
        tokio::fs::rename(&tmp, &path).await.map_err(Self::io(&path))?;

        debug!("Saved run {} ({})", run.id, run.status);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Run> {
        let path = self.run_dir(id).join("run.json");
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepositoryError::NotFound(id));
            }
            Err(e) => return Err(Self::io(&path)(e)),
        };

        serde_json::from_slice(&data).map_err(|source| RepositoryError::Json { path, source })
    }

    async fn list(&self) -> Result<Vec<Run>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io(&self.root)(e)),
        };

        let mut runs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(Self::io(&self.root))? {
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| Uuid::parse_str(name).ok())
            else {
                continue;
            };

            match self.get(id).await {
                Ok(run) => runs.push(run),
                Err(e) => warn!("Skipping unreadable run {}: {}", id, e),
            }
        }

        runs.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(runs)
    }

    async fn append_logs(&self, id: Uuid, entries: &[LogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let dir = self.run_dir(id);
        tokio::fs::create_dir_all(&dir).await.map_err(Self::io(&dir))?;

        let path = dir.join("log.jsonl");
        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry).map_err(|source| RepositoryError::Json {
                path: path.clone(),
                source,
            })?;
            buf.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(Self::io(&path))?;
        file.write_all(&buf).await.map_err(Self::io(&path))?;
        file.flush().await.map_err(Self::io(&path))?;

        Ok(())
    }

    async fn read_logs(&self, id: Uuid) -> Result<Vec<LogEntry>> {
        let path = self.run_dir(id).join("log.jsonl");
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // A run that never logged has no log file
                if self.run_dir(id).join("run.json").exists() {
                    return Ok(Vec::new());
                }
                return Err(RepositoryError::NotFound(id));
            }
            Err(e) => return Err(Self::io(&path)(e)),
        };

        data.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|source| RepositoryError::Json {
                    path: path.clone(),
                    source,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use sluice_core::domain::log::LogLevel;
    use sluice_core::domain::run::{RunResult, RunStatus};
    use sluice_core::domain::trigger::TriggerEvent;

    #[tokio::test]
    async fn test_save_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRunRepository::new(dir.path());

        let mut run = Run::new(&testing::metadata(&["build"]), TriggerEvent::push("main"));
        repo.save(&run).await.unwrap();

        run.start().unwrap();
        run.complete(RunResult::success()).unwrap();
        repo.save(&run).await.unwrap();

        let loaded = repo.get(run.id).await.unwrap();
        assert_eq!(loaded.id, run.id);
        assert_eq!(loaded.status, RunStatus::Succeeded);
        assert_eq!(loaded.trigger, TriggerEvent::push("main"));
        assert!(
            dir.path()
                .join(".sluice/runs")
                .join(run.id.to_string())
                .join("run.json")
                .exists()
        );
    }

    #[tokio::test]
    async fn test_get_missing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRunRepository::new(dir.path());

        let id = Uuid::new_v4();
        assert!(matches!(repo.get(id).await, Err(RepositoryError::NotFound(found)) if found == id));
        assert!(matches!(repo.read_logs(id).await, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRunRepository::new(dir.path());
        assert!(repo.list().await.unwrap().is_empty());

        let metadata = testing::metadata(&["build"]);
        let mut older = Run::new(&metadata, TriggerEvent::push("main"));
        older.requested_at -= chrono::Duration::minutes(5);
        let newer = Run::new(&metadata, TriggerEvent::schedule(chrono::Utc::now()));

        repo.save(&older).await.unwrap();
        repo.save(&newer).await.unwrap();
        std::fs::create_dir_all(dir.path().join(".sluice/runs/not-a-run")).unwrap();

        let ids: Vec<Uuid> = repo.list().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn test_append_and_read_logs() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRunRepository::new(dir.path());
        let run = Run::new(&testing::metadata(&["build"]), TriggerEvent::push("main"));
        repo.save(&run).await.unwrap();

        assert!(repo.read_logs(run.id).await.unwrap().is_empty());

        repo.append_logs(run.id, &[LogEntry::new(LogLevel::Info, None, "first")])
            .await
            .unwrap();
        repo.append_logs(
            run.id,
            &[
                LogEntry::new(LogLevel::Info, Some("build".into()), "second"),
                LogEntry::new(LogLevel::Error, Some("build".into()), "third"),
            ],
        )
        .await
        .unwrap();
        repo.append_logs(run.id, &[]).await.unwrap();

        let logs = repo.read_logs(run.id).await.unwrap();
        let messages: Vec<&str> = logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(logs[2].stage.as_deref(), Some("build"));
    }
}
