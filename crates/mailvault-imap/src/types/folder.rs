//! Folder listings and special-purpose folder resolution.
//!
//! Gmail localizes its system folder names per account language
//! ("[Gmail]/All Mail", "[Gmail]/Alle Nachrichten", ...), so the engine
//! never hard-codes them: it resolves them from XLIST / SPECIAL-USE
//! attributes at connect time.

/// An attribute attached to an XLIST/LIST entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderAttribute {
    /// The account's "all messages" folder (`\AllMail` / `\All`).
    AllMail,
    /// Drafts folder.
    Drafts,
    /// Sent mail folder.
    Sent,
    /// Trash folder.
    Trash,
    /// Spam folder.
    Spam,
    /// Starred messages.
    Starred,
    /// Important messages.
    Important,
    /// The inbox.
    Inbox,
    /// Folder cannot be selected.
    Noselect,
    /// Folder has child folders.
    HasChildren,
    /// Folder has no child folders.
    HasNoChildren,
    /// Anything else, preserved verbatim.
    Other(String),
}

impl FolderAttribute {
    /// Parses a folder attribute atom (with leading backslash).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        // XLIST says \AllMail, SPECIAL-USE (RFC 6154) says \All.
        match s.to_ascii_uppercase().as_str() {
            "\\ALLMAIL" | "\\ALL" => Self::AllMail,
            "\\DRAFTS" => Self::Drafts,
            "\\SENT" => Self::Sent,
            "\\TRASH" => Self::Trash,
            "\\SPAM" | "\\JUNK" => Self::Spam,
            "\\STARRED" | "\\FLAGGED" => Self::Starred,
            "\\IMPORTANT" => Self::Important,
            "\\INBOX" => Self::Inbox,
            "\\NOSELECT" => Self::Noselect,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            _ => Self::Other(s.to_string()),
        }
    }

    /// True for the special-purpose attributes (as opposed to the
    /// structural `\Noselect` / `\HasChildren` family).
    #[must_use]
    pub const fn is_special_use(&self) -> bool {
        matches!(
            self,
            Self::AllMail
                | Self::Drafts
                | Self::Sent
                | Self::Trash
                | Self::Spam
                | Self::Starred
                | Self::Important
                | Self::Inbox
        )
    }
}

/// One entry of an XLIST/LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFolder {
    /// Attributes attached to the entry.
    pub attributes: Vec<FolderAttribute>,
    /// Hierarchy delimiter, if any.
    pub delimiter: Option<char>,
    /// Full folder name.
    pub name: String,
}

impl ListedFolder {
    /// True if the folder carries the given attribute.
    #[must_use]
    pub fn has(&self, attr: &FolderAttribute) -> bool {
        self.attributes.contains(attr)
    }

    /// True if the folder can be selected.
    #[must_use]
    pub fn selectable(&self) -> bool {
        !self.has(&FolderAttribute::Noselect)
    }
}

/// Resolved localized names of the special-purpose folders the engine uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialFolders {
    /// The "all messages" folder; every archived email lives here.
    pub all_mail: String,
    /// The drafts folder; draft records are restored into it.
    pub drafts: String,
    /// The chat transcript folder, when the account exposes it over IMAP.
    pub chats: Option<String>,
}

impl SpecialFolders {
    /// Resolves the special folders from a folder listing.
    ///
    /// All-mail and drafts are identified by attribute. The chats folder
    /// carries no attribute of its own: it is the only selectable,
    /// attribute-free child of the same system namespace ("[Gmail]" or its
    /// localized equivalent) that holds all-mail.
    #[must_use]
    pub fn resolve(folders: &[ListedFolder]) -> Option<Self> {
        let all_mail = folders
            .iter()
            .find(|f| f.has(&FolderAttribute::AllMail))?;
        let drafts = folders
            .iter()
            .find(|f| f.has(&FolderAttribute::Drafts))?;

        let delimiter = all_mail.delimiter.unwrap_or('/');
        let namespace = all_mail
            .name
            .rsplit_once(delimiter)
            .map(|(ns, _)| ns.to_string());

        let chats = namespace.and_then(|ns| {
            let prefix = format!("{ns}{delimiter}");
            folders
                .iter()
                .find(|f| {
                    f.name.starts_with(&prefix)
                        && f.selectable()
                        && !f.attributes.iter().any(FolderAttribute::is_special_use)
                })
                .map(|f| f.name.clone())
        });

        Some(Self {
            all_mail: all_mail.name.clone(),
            drafts: drafts.name.clone(),
            chats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(attrs: &[FolderAttribute], name: &str) -> ListedFolder {
        ListedFolder {
            attributes: attrs.to_vec(),
            delimiter: Some('/'),
            name: name.to_string(),
        }
    }

    #[test]
    fn resolves_localized_names_by_attribute() {
        let listing = vec![
            folder(&[FolderAttribute::Inbox], "INBOX"),
            folder(&[FolderAttribute::Noselect], "[Google Mail]"),
            folder(
                &[FolderAttribute::AllMail],
                "[Google Mail]/Alle Nachrichten",
            ),
            folder(&[FolderAttribute::Drafts], "[Google Mail]/Entw\u{fc}rfe"),
            folder(&[FolderAttribute::HasNoChildren], "[Google Mail]/Chats"),
        ];

        let special = SpecialFolders::resolve(&listing).unwrap();
        assert_eq!(special.all_mail, "[Google Mail]/Alle Nachrichten");
        assert_eq!(special.drafts, "[Google Mail]/Entw\u{fc}rfe");
        assert_eq!(special.chats.as_deref(), Some("[Google Mail]/Chats"));
    }

    #[test]
    fn chats_folder_is_optional() {
        let listing = vec![
            folder(&[FolderAttribute::AllMail], "[Gmail]/All Mail"),
            folder(&[FolderAttribute::Drafts], "[Gmail]/Drafts"),
            folder(&[FolderAttribute::Trash], "[Gmail]/Trash"),
        ];

        let special = SpecialFolders::resolve(&listing).unwrap();
        assert!(special.chats.is_none());
    }

    #[test]
    fn missing_all_mail_fails_resolution() {
        let listing = vec![folder(&[FolderAttribute::Drafts], "[Gmail]/Drafts")];
        assert!(SpecialFolders::resolve(&listing).is_none());
    }

    #[test]
    fn special_use_attrs_never_mistaken_for_chats() {
        let listing = vec![
            folder(&[FolderAttribute::AllMail], "[Gmail]/All Mail"),
            folder(&[FolderAttribute::Drafts], "[Gmail]/Drafts"),
            folder(&[FolderAttribute::Spam], "[Gmail]/Spam"),
            folder(&[FolderAttribute::HasNoChildren], "[Gmail]/Chats"),
        ];
        let special = SpecialFolders::resolve(&listing).unwrap();
        assert_eq!(special.chats.as_deref(), Some("[Gmail]/Chats"));
    }
}
