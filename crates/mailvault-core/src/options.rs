//! Run options for sync and restore.

use chrono::NaiveDate;
use mailvault_imap::command::SearchCriteria;

/// How the remote candidate set is enumerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// Every message in the account.
    Full,
    /// Messages received on or after the date.
    Since(NaiveDate),
    /// Gmail free-text query dialect.
    Query(String),
}

impl SyncMode {
    /// The search criteria this mode enumerates with.
    #[must_use]
    pub fn criteria(&self) -> SearchCriteria {
        match self {
            Self::Full => SearchCriteria::All,
            Self::Since(date) => SearchCriteria::Since(*date),
            Self::Query(q) => SearchCriteria::GmRaw(q.clone()),
        }
    }

    /// True for a full enumeration; cleaning is only legal then.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }
}

/// Options for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Enumeration mode.
    pub mode: SyncMode,
    /// Gzip content files on disk.
    pub compress: bool,
    /// Encrypt content files on disk.
    pub encrypt: bool,
    /// After a full sync, move remotely-deleted records to the bin.
    pub clean: bool,
    /// Permit more than one owning account for this archive.
    pub allow_multi_owner: bool,
    /// Resume from the operation checkpoint if one exists.
    pub resume: bool,
    /// Sync ordinary messages.
    pub emails: bool,
    /// Sync chat transcripts.
    pub chats: bool,
    /// Ids per fetch round trip.
    pub batch_size: usize,
    /// Checkpoint after this many processed items.
    pub checkpoint_every: usize,
    /// Items per chat bucket before rotating to a new one.
    pub chat_bucket_cap: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: SyncMode::Full,
            compress: true,
            encrypt: false,
            clean: false,
            allow_multi_owner: false,
            resume: true,
            emails: true,
            chats: true,
            batch_size: 500,
            checkpoint_every: 100,
            chat_bucket_cap: 1000,
        }
    }
}

/// Options for one restore run.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Resume from the operation checkpoint if one exists.
    pub resume: bool,
    /// Restore only recent partitions instead of the whole archive.
    pub quick: bool,
    /// Restore ordinary messages.
    pub emails: bool,
    /// Restore chat transcripts.
    pub chats: bool,
    /// Records pushed per batch.
    pub batch_size: usize,
    /// Checkpoint after this many pushed items.
    pub checkpoint_every: usize,
    /// Uids per label-application STORE command.
    pub apply_label_batch: usize,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            resume: true,
            quick: false,
            emails: true,
            chats: true,
            batch_size: 100,
            checkpoint_every: 50,
            apply_label_batch: 500,
        }
    }
}
