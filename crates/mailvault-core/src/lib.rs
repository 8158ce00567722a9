//! # mailvault-core
//!
//! Archive store and orchestration for the mailvault Gmail archiver.
//!
//! This crate owns everything between the supervised IMAP session and the
//! disk:
//! - [`archive`]: partitioned, content-addressed storage with quarantine
//!   and bin side areas, optional gzip and AES-GCM at rest
//! - [`record`]: the archived message metadata model
//! - [`checkpoint`]: advisory per-operation resume points
//! - [`remote`]: the [`remote::RemoteMailbox`] seam the orchestrators
//!   drive, implemented by the supervised session
//! - [`sync`] / [`restore`]: the two orchestrators
//! - [`report`]: the structured end-of-run summary handed to the CLI

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod archive;
pub mod checkpoint;
mod error;
pub mod options;
pub mod record;
pub mod remote;
pub mod report;
pub mod restore;
pub mod sync;

pub use archive::{ArchiveStore, ContentCipher, Partition};
pub use checkpoint::{Checkpoint, CheckpointStore, OperationKind};
pub use error::{Error, Result};
pub use options::{RestoreOptions, SyncMode, SyncOptions};
pub use record::MessageRecord;
pub use remote::{FolderKind, RemoteMailbox};
pub use report::OpReport;
pub use restore::restore;
pub use sync::sync;
