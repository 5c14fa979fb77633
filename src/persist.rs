//! Result Persistence
//!
//! Side effects run after an accepted vote: write the election snapshot and
//! refresh the tally export.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::config::BallotConfig;
use crate::election::{export, snapshot, Election};
use crate::error::Result;

/// Replace `path` with `contents` through a sibling `<name>.tmp` file
///
/// Readers see either the old or the new content, never a partial write.
pub(crate) async fn replace_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Receives the election after each accepted vote
#[async_trait::async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist the current election; must complete before returning
    async fn persist(&self, election: &Election) -> Result<()>;
}

/// Writes the snapshot and export files
pub struct FileSink {
    snapshot_path: PathBuf,
    export_path: PathBuf,
    /// Serializes writers so the files never interleave
    write_lock: Mutex<()>,
}

impl FileSink {
    pub fn new(snapshot_path: PathBuf, export_path: PathBuf) -> Self {
        Self {
            snapshot_path,
            export_path,
            write_lock: Mutex::new(()),
        }
    }

    /// Use the locations from a configuration
    pub fn from_config(config: &BallotConfig) -> Self {
        Self::new(config.snapshot_path(), config.export_path())
    }

    /// Write the snapshot only
    pub async fn save_snapshot(&self, election: &Election) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        snapshot::save(&self.snapshot_path, &election.snapshot().await).await
    }

    /// Write the export only
    pub async fn export(&self, election: &Election) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        export::write(&self.export_path, &election.tally().await).await
    }

    pub fn export_path(&self) -> &Path {
        &self.export_path
    }

    /// Delete the snapshot; `false` when there was none
    pub async fn remove_snapshot(&self) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.snapshot_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl ResultSink for FileSink {
    async fn persist(&self, election: &Election) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        // Taken under the sink lock so the last writer always carries the newest state;
        // the export is derived from the same copy
        let state = election.snapshot().await;
        let tally = state.tally();

        snapshot::save(&self.snapshot_path, &state).await?;
        export::write(&self.export_path, &tally).await?;
        Ok(())
    }
}

/// Discards everything; for servers that should not touch disk
pub struct NullSink;

#[async_trait::async_trait]
impl ResultSink for NullSink {
    async fn persist(&self, _election: &Election) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_sink_writes_both_files() {
        let dir = tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("snap.txt"), dir.path().join("out.csv"));

        let election = Election::new();
        election.register_voter(1, "Alice", "alice").await.unwrap();
        election.register_candidate(5, "Bob").await.unwrap();
        election.open().await;
        election.cast_vote(1, "alice", 5).await.unwrap();

        sink.persist(&election).await.unwrap();

        let restored = snapshot::load(&dir.path().join("snap.txt")).await.unwrap();
        assert_eq!(restored, election.snapshot().await);

        let csv = std::fs::read_to_string(dir.path().join("out.csv")).unwrap();
        assert!(csv.contains("5;Bob;1"));
        assert!(csv.ends_with("0;ABSTAIN;0\n"));
    }

    #[tokio::test]
    async fn test_export_matches_snapshot_while_voting() {
        let dir = tempdir().unwrap();
        let snap_path = dir.path().join("snap.txt");
        let csv_path = dir.path().join("out.csv");
        let sink = FileSink::new(snap_path.clone(), csv_path.clone());

        let election = std::sync::Arc::new(Election::new());
        for id in 1..=40 {
            election
                .register_voter(id, &format!("V{}", id), &format!("v{}", id))
                .await
                .unwrap();
        }
        election.register_candidate(5, "Bob").await.unwrap();
        election.open().await;

        let voting = {
            let election = std::sync::Arc::clone(&election);
            tokio::spawn(async move {
                for id in 1..=40 {
                    let candidate = if id % 3 == 0 { 0 } else { 5 };
                    election.cast_vote(id, &format!("v{}", id), candidate).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..40 {
            sink.persist(&election).await.unwrap();
            let saved = snapshot::load(&snap_path).await.unwrap();
            let csv = std::fs::read_to_string(&csv_path).unwrap();
            assert_eq!(csv, export::render(&saved.tally()));
            tokio::task::yield_now().await;
        }
        voting.await.unwrap();
    }

    #[tokio::test]
    async fn test_replace_file_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");

        replace_file(&path, "old").await.unwrap();
        replace_file(&path, "new").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert!(!dir.path().join("results.csv.tmp").exists());
    }

    #[tokio::test]
    async fn test_remove_snapshot() {
        let dir = tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("snap.txt"), dir.path().join("out.csv"));

        assert!(!sink.remove_snapshot().await.unwrap());
        sink.save_snapshot(&Election::new()).await.unwrap();
        assert!(sink.remove_snapshot().await.unwrap());
        assert!(!dir.path().join("snap.txt").exists());
    }

    #[tokio::test]
    async fn test_file_sink_reports_io_failure() {
        let dir = tempdir().unwrap();
        let sink = FileSink::new(
            dir.path().join("nope").join("snap.txt"),
            dir.path().join("out.csv"),
        );
        assert!(sink.persist(&Election::new()).await.is_err());
    }
}
