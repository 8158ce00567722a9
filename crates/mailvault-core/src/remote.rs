//! The seam between the orchestrators and the wire protocol.
//!
//! [`RemoteMailbox`] is exactly the primitive set sync and restore need;
//! the supervised IMAP session implements it for production and an
//! in-memory double implements it for tests.

#![allow(clippy::missing_errors_doc)]

use std::future::Future;

use chrono::{DateTime, FixedOffset};

use mailvault_imap::command::{FetchProfile, SearchCriteria};
use mailvault_imap::fetch::{BatchFetcher, BatchResult};
use mailvault_imap::retry::RetrySession;
use mailvault_imap::types::{Flags, Label, Mailbox, Uid, UidSet};

use crate::Result;

/// Special-purpose folders the orchestrators address by role, not name;
/// the session resolves the account's localized names behind this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderKind {
    /// The "all messages" folder.
    AllMail,
    /// The chat transcripts folder, when visible.
    Chats,
    /// The drafts folder.
    Drafts,
}

/// Primitives the sync and restore orchestrators drive a mailbox with.
///
/// All operations act on the last selected folder where the protocol
/// requires one; implementations must keep selection valid across their
/// own reconnects.
pub trait RemoteMailbox {
    /// Whether the account exposes the folder at all.
    fn has_folder(&self, kind: FolderKind) -> Result<bool>;

    /// Selects a folder; read-only for sync, read-write for restore.
    /// Returns the folder's message count.
    fn select_folder(
        &mut self,
        kind: FolderKind,
        read_only: bool,
    ) -> impl Future<Output = Result<u32>>;

    /// Enumerates matching UIDs in the selected folder, ascending.
    fn search(&mut self, criteria: &SearchCriteria) -> impl Future<Output = Result<Vec<Uid>>>;

    /// Fetches one batch, degrading to per-item requests on a per-item
    /// refusal.
    fn fetch_batch(
        &mut self,
        uids: &[Uid],
        profile: FetchProfile,
    ) -> impl Future<Output = Result<BatchResult>>;

    /// Pushes a message and returns its new transient UID when the server
    /// reports one.
    fn append(
        &mut self,
        kind: FolderKind,
        flags: &Flags,
        internal_date: Option<DateTime<FixedOffset>>,
        body: &[u8],
    ) -> impl Future<Output = Result<Option<Uid>>>;

    /// Creates one label path level. Idempotent: an already existing label
    /// is not an error.
    fn create_label(&mut self, label: &Label) -> impl Future<Output = Result<()>>;

    /// Attaches one label to a batch of messages in the selected folder.
    fn apply_labels(&mut self, uids: &[Uid], label: &Label) -> impl Future<Output = Result<()>>;

    /// Every label/folder name the account currently has.
    fn list_labels(&mut self) -> impl Future<Output = Result<Vec<Label>>>;

    /// Times the underlying connection was re-established.
    fn reconnections(&self) -> u64;
}

impl RemoteMailbox for RetrySession {
    fn has_folder(&self, kind: FolderKind) -> Result<bool> {
        let special = self.special_folders()?;
        Ok(match kind {
            FolderKind::AllMail | FolderKind::Drafts => true,
            FolderKind::Chats => special.chats.is_some(),
        })
    }

    async fn select_folder(&mut self, kind: FolderKind, read_only: bool) -> Result<u32> {
        let mailbox = self.folder_name(kind)?;
        let count = if read_only {
            self.examine(&mailbox).await?
        } else {
            self.select(&mailbox).await?
        };
        Ok(count)
    }

    async fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<Uid>> {
        Ok(self.uid_search(criteria).await?)
    }

    async fn fetch_batch(&mut self, uids: &[Uid], profile: FetchProfile) -> Result<BatchResult> {
        // One chunk per call; the orchestrator already sized the batch.
        let fetcher = BatchFetcher::new(uids.len().max(1));
        Ok(fetcher.fetch(self, uids, profile).await?)
    }

    async fn append(
        &mut self,
        kind: FolderKind,
        flags: &Flags,
        internal_date: Option<DateTime<FixedOffset>>,
        body: &[u8],
    ) -> Result<Option<Uid>> {
        let mailbox = self.folder_name(kind)?;
        Ok(RetrySession::append(self, &mailbox, flags, internal_date, body).await?)
    }

    async fn create_label(&mut self, label: &Label) -> Result<()> {
        match self.create_folder(&Mailbox::new(label.as_str())).await {
            // NO here means the label already exists.
            Err(mailvault_imap::Error::No(_)) | Ok(()) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_labels(&mut self, uids: &[Uid], label: &Label) -> Result<()> {
        let Some(set) = UidSet::from_uids(uids) else {
            return Ok(());
        };
        Ok(self.store_labels(&set, std::slice::from_ref(label)).await?)
    }

    async fn list_labels(&mut self) -> Result<Vec<Label>> {
        let folders = self.list_folders().await?;
        Ok(folders.iter().map(|f| Label::new(f.name.as_str())).collect())
    }

    fn reconnections(&self) -> u64 {
        RetrySession::reconnections(self)
    }
}

/// Helper: resolve a [`FolderKind`] to the account's localized name.
trait FolderNames {
    fn folder_name(&self, kind: FolderKind) -> Result<Mailbox>;
}

impl FolderNames for RetrySession {
    fn folder_name(&self, kind: FolderKind) -> Result<Mailbox> {
        let special = self.special_folders()?;
        let name = match kind {
            FolderKind::AllMail => special.all_mail.clone(),
            FolderKind::Drafts => special.drafts.clone(),
            FolderKind::Chats => special.chats.clone().ok_or_else(|| {
                mailvault_imap::Error::InvalidState("account exposes no chats folder".to_owned())
            })?,
        };
        Ok(Mailbox::new(name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing {
    //! In-memory mailbox double shared by the orchestrator tests.

    use std::collections::{BTreeMap, BTreeSet};

    use chrono::{DateTime, FixedOffset, NaiveDate};

    use mailvault_imap::parser::FetchRecord;
    use mailvault_imap::types::{Flag, ThreadId};

    use super::{
        BatchResult, FetchProfile, Flags, FolderKind, Label, RemoteMailbox, Result,
        SearchCriteria, Uid,
    };

    /// One message living in the fake remote.
    #[derive(Debug, Clone)]
    pub struct FakeMessage {
        pub thread_id: u64,
        pub labels: Vec<String>,
        pub flags: Flags,
        pub date: DateTime<FixedOffset>,
        pub subject: String,
        pub body: Vec<u8>,
    }

    impl FakeMessage {
        pub fn plain(subject: &str, body: &[u8], date: &str) -> Self {
            Self {
                thread_id: 1,
                labels: vec!["\\Inbox".to_owned()],
                flags: Flags::from_vec(vec![Flag::Seen]),
                date: DateTime::parse_from_rfc3339(date).unwrap(),
                subject: subject.to_owned(),
                body: body.to_vec(),
            }
        }
    }

    /// Scriptable in-memory remote mailbox.
    #[derive(Debug, Default)]
    pub struct FakeRemote {
        pub mail: BTreeMap<u32, FakeMessage>,
        pub drafts: BTreeMap<u32, FakeMessage>,
        /// `None` means the account exposes no chats folder.
        pub chats: Option<BTreeMap<u32, FakeMessage>>,
        pub labels: BTreeSet<String>,
        /// UIDs the server refuses to FETCH, even individually.
        pub refuse: BTreeSet<u32>,
        /// Bodies containing this marker fail APPEND with a NO.
        pub reject_append_marker: Option<Vec<u8>>,
        /// Fail every STORE with a transport error.
        pub fail_labels: bool,

        pub created: Vec<String>,
        pub applied: Vec<(Vec<u32>, String)>,
        pub append_kinds: Vec<FolderKind>,
        pub metadata_fetches: usize,
        pub content_fetches: usize,
        pub appends: usize,

        selected: Option<FolderKind>,
        // Each folder numbers its own messages, like a real server; the
        // spaces deliberately overlap so cross-folder UID leaks show up.
        next_uid: u32,
        next_draft_uid: u32,
    }

    impl FakeRemote {
        pub fn new() -> Self {
            Self {
                next_uid: 1_000,
                next_draft_uid: 1_000,
                ..Self::default()
            }
        }

        fn folder(&self, kind: FolderKind) -> &BTreeMap<u32, FakeMessage> {
            static EMPTY: BTreeMap<u32, FakeMessage> = BTreeMap::new();
            match kind {
                FolderKind::AllMail => &self.mail,
                FolderKind::Drafts => &self.drafts,
                FolderKind::Chats => self.chats.as_ref().unwrap_or(&EMPTY),
            }
        }

        fn record_for(uid: u32, message: &FakeMessage, profile: FetchProfile) -> FetchRecord {
            let header = format!(
                "Subject: {}\r\nMessage-ID: <{uid}@fake>\r\nX-Received: by fake\r\n\r\n",
                message.subject
            );
            FetchRecord {
                uid: Uid::new(uid),
                thread_id: Some(ThreadId::new(message.thread_id)),
                labels: message.labels.iter().map(|l| Label::new(l.as_str())).collect(),
                flags: message.flags.clone(),
                internal_date: Some(message.date),
                header: Some(header.into_bytes()),
                body: match profile {
                    FetchProfile::Metadata => None,
                    FetchProfile::Content => Some(message.body.clone()),
                },
            }
        }
    }

    impl RemoteMailbox for FakeRemote {
        fn has_folder(&self, kind: FolderKind) -> Result<bool> {
            Ok(match kind {
                FolderKind::AllMail | FolderKind::Drafts => true,
                FolderKind::Chats => self.chats.is_some(),
            })
        }

        async fn select_folder(&mut self, kind: FolderKind, _read_only: bool) -> Result<u32> {
            self.selected = Some(kind);
            Ok(u32::try_from(self.folder(kind).len()).unwrap_or(u32::MAX))
        }

        async fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<Uid>> {
            let kind = self.selected.unwrap_or(FolderKind::AllMail);
            let since: Option<NaiveDate> = match criteria {
                SearchCriteria::Since(d) => Some(*d),
                _ => None,
            };
            Ok(self
                .folder(kind)
                .iter()
                .filter(|(_, m)| since.is_none_or(|d| m.date.date_naive() >= d))
                .filter_map(|(&uid, _)| Uid::new(uid))
                .collect())
        }

        async fn fetch_batch(
            &mut self,
            uids: &[Uid],
            profile: FetchProfile,
        ) -> Result<BatchResult> {
            match profile {
                FetchProfile::Metadata => self.metadata_fetches += 1,
                FetchProfile::Content => self.content_fetches += 1,
            }
            let kind = self.selected.unwrap_or(FolderKind::AllMail);
            let mut result = BatchResult::default();
            for &uid in uids {
                if self.refuse.contains(&uid.get()) {
                    result.failed.push(uid);
                    continue;
                }
                if let Some(message) = self.folder(kind).get(&uid.get()) {
                    result
                        .fetched
                        .push(Self::record_for(uid.get(), message, profile));
                }
            }
            Ok(result)
        }

        async fn append(
            &mut self,
            kind: FolderKind,
            flags: &Flags,
            internal_date: Option<DateTime<FixedOffset>>,
            body: &[u8],
        ) -> Result<Option<Uid>> {
            if let Some(marker) = &self.reject_append_marker {
                if body.windows(marker.len()).any(|w| w == marker.as_slice()) {
                    return Err(mailvault_imap::Error::No("APPEND rejected".to_owned()).into());
                }
            }
            self.append_kinds.push(kind);
            self.appends += 1;
            let message = FakeMessage {
                thread_id: 0,
                labels: Vec::new(),
                flags: flags.clone(),
                date: internal_date.unwrap_or_else(|| {
                    DateTime::parse_from_rfc3339("1970-01-01T00:00:00Z").unwrap()
                }),
                subject: String::new(),
                body: body.to_vec(),
            };
            let uid = if kind == FolderKind::Drafts {
                self.next_draft_uid += 1;
                self.drafts.insert(self.next_draft_uid, message);
                self.next_draft_uid
            } else {
                self.next_uid += 1;
                self.mail.insert(self.next_uid, message);
                self.next_uid
            };
            Ok(Uid::new(uid))
        }

        async fn create_label(&mut self, label: &Label) -> Result<()> {
            if self.labels.insert(label.as_str().to_owned()) {
                self.created.push(label.as_str().to_owned());
            }
            Ok(())
        }

        async fn apply_labels(&mut self, uids: &[Uid], label: &Label) -> Result<()> {
            if self.fail_labels {
                return Err(mailvault_imap::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset during STORE",
                ))
                .into());
            }
            // UID STORE resolves against the selected folder only.
            let ids: Vec<u32> = uids.iter().map(|u| u.get()).collect();
            let folder = match self.selected.unwrap_or(FolderKind::AllMail) {
                FolderKind::AllMail => &mut self.mail,
                FolderKind::Drafts => &mut self.drafts,
                FolderKind::Chats => match self.chats.as_mut() {
                    Some(chats) => chats,
                    None => return Ok(()),
                },
            };
            for id in &ids {
                if let Some(message) = folder.get_mut(id) {
                    message.labels.push(label.as_str().to_owned());
                }
            }
            self.applied.push((ids, label.as_str().to_owned()));
            Ok(())
        }

        async fn list_labels(&mut self) -> Result<Vec<Label>> {
            Ok(self.labels.iter().map(|l| Label::new(l.as_str())).collect())
        }

        fn reconnections(&self) -> u64 {
            0
        }
    }
}
