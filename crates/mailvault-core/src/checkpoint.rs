//! Sync/restore progress checkpoints.
//!
//! A checkpoint is the last successfully processed permanent id for one
//! operation kind, written every N items. It is advisory, not
//! transactional: a crash between processing and checkpointing re-runs a
//! bounded number of already-done items, which the idempotent store
//! absorbs as no-ops.

#![allow(clippy::missing_errors_doc)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

const INFO_DIR: &str = ".info";

/// The four independently checkpointed operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Mirroring messages from the remote.
    EmailSync,
    /// Mirroring chat transcripts from the remote.
    ChatSync,
    /// Replaying archived messages into the remote.
    EmailRestore,
    /// Replaying archived chat transcripts into the remote.
    ChatRestore,
}

impl OperationKind {
    /// File name suffix under `.info/`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmailSync => "email_sync",
            Self::ChatSync => "chat_sync",
            Self::EmailRestore => "email_restore",
            Self::ChatRestore => "chat_restore",
        }
    }
}

/// Persisted checkpoint payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last permanent id known fully processed.
    pub last_id: u32,
}

/// Reads and writes `.info/<account>_<operation>` checkpoint files under
/// one archive root.
#[derive(Debug)]
pub struct CheckpointStore {
    info_dir: PathBuf,
    account: String,
}

impl CheckpointStore {
    /// Binds to the archive rooted at `root` for the given account.
    #[must_use]
    pub fn new(root: &Path, account: impl Into<String>) -> Self {
        Self {
            info_dir: root.join(INFO_DIR),
            account: account.into(),
        }
    }

    fn path(&self, kind: OperationKind) -> PathBuf {
        self.info_dir
            .join(format!("{}_{}", self.account, kind.as_str()))
    }

    /// Loads the checkpoint for an operation, if one exists.
    pub fn load(&self, kind: OperationKind) -> Result<Option<Checkpoint>> {
        let path = self.path(kind);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&json)?))
    }

    /// Persists the checkpoint for an operation, overwriting any previous
    /// one.
    pub fn save(&self, kind: OperationKind, checkpoint: Checkpoint) -> Result<()> {
        fs::create_dir_all(&self.info_dir)?;
        let json = serde_json::to_vec(&checkpoint)?;
        fs::write(self.path(kind), json)?;
        Ok(())
    }

    /// Removes the checkpoint after an operation completes cleanly.
    pub fn clear(&self, kind: OperationKind) -> Result<()> {
        let path = self.path(kind);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn save_load_clear_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointStore::new(dir.path(), "a@gmail.com");

        assert!(checkpoints.load(OperationKind::EmailSync).unwrap().is_none());

        checkpoints
            .save(OperationKind::EmailSync, Checkpoint { last_id: 4021 })
            .unwrap();
        assert_eq!(
            checkpoints.load(OperationKind::EmailSync).unwrap(),
            Some(Checkpoint { last_id: 4021 })
        );
        assert!(
            dir.path()
                .join(".info/a@gmail.com_email_sync")
                .exists()
        );

        checkpoints.clear(OperationKind::EmailSync).unwrap();
        assert!(checkpoints.load(OperationKind::EmailSync).unwrap().is_none());
        // Clearing twice is fine.
        checkpoints.clear(OperationKind::EmailSync).unwrap();
    }

    #[test]
    fn operations_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointStore::new(dir.path(), "a@gmail.com");

        checkpoints
            .save(OperationKind::EmailSync, Checkpoint { last_id: 10 })
            .unwrap();
        checkpoints
            .save(OperationKind::ChatRestore, Checkpoint { last_id: 99 })
            .unwrap();

        assert_eq!(
            checkpoints.load(OperationKind::EmailSync).unwrap(),
            Some(Checkpoint { last_id: 10 })
        );
        assert_eq!(
            checkpoints.load(OperationKind::ChatRestore).unwrap(),
            Some(Checkpoint { last_id: 99 })
        );
        assert!(checkpoints.load(OperationKind::ChatSync).unwrap().is_none());
    }
}
