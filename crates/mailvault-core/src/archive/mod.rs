//! Durable, partitioned, content-addressed storage for archived mail.

mod crypto;
mod partition;
mod store;

pub use crypto::ContentCipher;
pub use partition::Partition;
pub use store::ArchiveStore;
