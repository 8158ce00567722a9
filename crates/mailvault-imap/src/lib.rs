//! # mailvault-imap
//!
//! Gmail-flavoured IMAP client layer for the mailvault archiver.
//!
//! This is not a general IMAP library: it implements exactly the slice of
//! RFC 3501 plus the Gmail extensions (`X-GM-EXT-1`, `XLIST`,
//! `COMPRESS=DEFLATE`, `AUTH=XOAUTH2`) that a mailbox mirror needs, and
//! wraps it in a reconnect-supervised session suitable for multi-hour
//! batch jobs.
//!
//! ## Layers
//!
//! - [`connection`]: TLS stream setup, optional DEFLATE stream layer,
//!   CRLF/literal framing with a bounded read timeout
//! - [`command`]: command builders and wire serialization
//! - [`parser`]: sans-I/O response parser for the consumed subset
//! - [`Session`]: one authenticated connection with resolved
//!   special-purpose folders
//! - [`RetrySession`]: the reconnect/backoff supervisor every caller
//!   actually talks to
//! - [`BatchFetcher`]: chunked UID fetching with per-item degradation
//!
//! ## Quick start
//!
//! ```ignore
//! use mailvault_imap::{Credential, RetryPolicy, RetrySession, SessionConfig};
//!
//! let config = SessionConfig::new("imap.gmail.com", 993, "user@gmail.com")
//!     .credential(Credential::Password("app-password".into()));
//!
//! let mut session = RetrySession::new(config, RetryPolicy::default());
//! session.connect().await?;
//!
//! let all_mail = session.special_folders()?.all_mail.clone();
//! session.examine(&mailvault_imap::Mailbox::new(all_mail)).await?;
//! let uids = session.uid_search(&mailvault_imap::SearchCriteria::All).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod fetch;
pub mod parser;
pub mod retry;
pub mod session;
pub mod types;

pub use command::{Command, FetchProfile, SearchCriteria, TagGenerator};
pub use connection::{FramedStream, ImapStream, ResponseAccumulator};
pub use error::{Error, Result};
pub use fetch::{BatchFetcher, BatchResult, UidFetcher};
pub use parser::{FetchRecord, Response, ResponseParser, UntaggedResponse};
pub use retry::{RetryPolicy, RetrySession};
pub use session::{Credential, Session, SessionConfig};
pub use types::{
    Capability, Flag, Flags, FolderAttribute, Label, ListedFolder, Mailbox, SpecialFolders, Status,
    ThreadId, Uid, UidSet,
};
