//! Core IMAP and Gmail-extension types.

mod capability;
mod flags;
mod folder;
mod ids;
mod label;
mod mailbox;

pub use capability::Capability;
pub use flags::{Flag, Flags};
pub use folder::{FolderAttribute, ListedFolder, SpecialFolders};
pub use ids::{SeqNum, ThreadId, Uid, UidSet};
pub use label::Label;
pub use mailbox::Mailbox;

/// Status of a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed.
    No,
    /// Command was malformed or invalid in this state.
    Bad,
    /// Server is closing the connection.
    Bye,
    /// Connection starts pre-authenticated.
    PreAuth,
}

impl Status {
    /// Parses a status atom (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "BYE" => Some(Self::Bye),
            "PREAUTH" => Some(Self::PreAuth),
            _ => None,
        }
    }
}
