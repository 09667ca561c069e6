//! Off-thread file work requested by patch objects.
//!
//! Objects never touch the filesystem from inside a tick. They ask the
//! `FileService` instead; the read or write runs on a worker thread and the
//! result is queued back to the runtime, which hands it to the owning object
//! at the top of the next tick.

use crate::patch::id::ObjectId;
use crossbeam_channel::{Receiver, Sender};
use std::path::PathBuf;

/// What was asked of the file service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Open,
    Save,
}

/// Completed file operation, delivered to `on_async_file_result`.
#[derive(Debug, Clone)]
pub struct AsyncFileResult {
    pub op: FileOp,
    pub path: PathBuf,
    /// File contents for `Open`, empty for `Save`; error text on failure.
    pub outcome: Result<Vec<u8>, String>,
}

impl AsyncFileResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

pub type FileResultMsg = (ObjectId, AsyncFileResult);

/// Spawns file work and owns the sending half of the result queue.
#[derive(Clone)]
pub struct FileService {
    tx: Sender<FileResultMsg>,
}

impl FileService {
    /// Create a service and the receiver the runtime drains each tick.
    pub fn new() -> (Self, Receiver<FileResultMsg>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    /// Read `path` on a worker thread.
    pub fn open(&self, owner: ObjectId, path: impl Into<PathBuf>) {
        let path = path.into();
        let tx = self.tx.clone();
        std::thread::spawn(move || {
            let outcome = std::fs::read(&path).map_err(|e| e.to_string());
            let _ = tx.send((
                owner,
                AsyncFileResult {
                    op: FileOp::Open,
                    path,
                    outcome,
                },
            ));
        });
    }

    /// Write `bytes` to `path` on a worker thread.
    pub fn save(&self, owner: ObjectId, path: impl Into<PathBuf>, bytes: Vec<u8>) {
        let path = path.into();
        let tx = self.tx.clone();
        std::thread::spawn(move || {
            let outcome = std::fs::write(&path, bytes)
                .map(|_| Vec::new())
                .map_err(|e| e.to_string());
            let _ = tx.send((
                owner,
                AsyncFileResult {
                    op: FileOp::Save,
                    path,
                    outcome,
                },
            ));
        });
    }

    /// Queue an already-computed result, e.g. from a host file dialog.
    pub fn post(&self, owner: ObjectId, result: AsyncFileResult) {
        let _ = self.tx.send((owner, result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_open_reports_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let (service, rx) = FileService::new();
        service.open(ObjectId(3), &path);

        let (owner, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(owner, ObjectId(3));
        assert_eq!(result.op, FileOp::Open);
        assert_eq!(result.outcome.unwrap(), b"hello");
    }

    #[test]
    fn test_open_missing_file_is_error() {
        let (service, rx) = FileService::new();
        service.open(ObjectId(1), "/definitely/not/here.txt");
        let (_, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!result.is_ok());
    }

    #[test]
    fn test_save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let (service, rx) = FileService::new();
        service.save(ObjectId(2), &path, vec![1, 2, 3]);
        let (_, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(result.is_ok());
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    }
}
