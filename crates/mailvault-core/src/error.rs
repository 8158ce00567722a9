//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in archive and orchestration operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] mailvault_imap::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The archive already belongs to a different account.
    ///
    /// Destructive cleaning assumes a single owner, so a second account is
    /// rejected unless multi-owner mode is explicitly requested.
    #[error("archive at {archive} is owned by {owners:?}, refusing to sync {account}")]
    OwnershipConflict {
        /// Archive root path.
        archive: String,
        /// Accounts already registered as owners.
        owners: Vec<String>,
        /// The account that was denied.
        account: String,
    },

    /// Cleaning was requested together with a bounded or query sync.
    ///
    /// A partial enumeration cannot tell "deleted remotely" from "outside
    /// the window", so cleaning only ever runs against a full enumeration.
    #[error("cleaning requires a full sync, not a bounded or query sync")]
    CleanRequiresFullSync,

    /// A record the operation needs is missing from the archive.
    #[error("record {0} not found in archive")]
    RecordNotFound(u32),

    /// A record's metadata exists but its content pair is missing.
    #[error("content for record {0} not found in archive")]
    ContentNotFound(u32),

    /// A fetched response lacked a field the archive cannot do without.
    #[error("incomplete fetch response: missing {0}")]
    IncompleteRecord(&'static str),

    /// Encryption or decryption failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The on-disk archive violates the expected layout.
    #[error("archive layout error: {0}")]
    Layout(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the failure is scoped to a single message and the run
    /// should quarantine or skip it rather than abort.
    #[must_use]
    pub const fn is_item_failure(&self) -> bool {
        match self {
            Self::Imap(e) => {
                e.is_per_item()
                    || matches!(
                        e,
                        mailvault_imap::Error::No(_)
                            | mailvault_imap::Error::Bad(_)
                            | mailvault_imap::Error::Parse { .. }
                    )
            }
            Self::IncompleteRecord(_) => true,
            _ => false,
        }
    }
}
