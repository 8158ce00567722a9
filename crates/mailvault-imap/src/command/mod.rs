//! IMAP command builders and wire serialization.

mod serialize;
mod tag_generator;

pub use tag_generator::TagGenerator;

use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::types::{Flags, Label, Mailbox, UidSet};

use serialize::{write_astring, write_label};

/// Search criteria for UID SEARCH.
///
/// The native date-bounded forms and the server's free-text dialect
/// (X-GM-RAW) are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// Every message in the selected folder.
    All,
    /// Messages received on or after the date.
    Since(NaiveDate),
    /// Messages received before the date.
    Before(NaiveDate),
    /// Gmail free-text query dialect (X-GM-RAW).
    GmRaw(String),
}

impl SearchCriteria {
    fn write(&self, buf: &mut Vec<u8>) {
        match self {
            Self::All => buf.extend_from_slice(b"ALL"),
            Self::Since(date) => {
                buf.extend_from_slice(b"SINCE ");
                buf.extend_from_slice(date.format("%d-%b-%Y").to_string().as_bytes());
            }
            Self::Before(date) => {
                buf.extend_from_slice(b"BEFORE ");
                buf.extend_from_slice(date.format("%d-%b-%Y").to_string().as_bytes());
            }
            Self::GmRaw(query) => {
                buf.extend_from_slice(b"X-GM-RAW ");
                write_astring(buf, query);
            }
        }
    }
}

/// The two fetch shapes the archiver uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchProfile {
    /// Everything needed to diff a message against the archive without
    /// transferring its body: ids, labels, flags, date, correlation headers.
    Metadata,
    /// Metadata plus the full raw message bytes.
    Content,
}

impl FetchProfile {
    /// The FETCH item list for this profile.
    #[must_use]
    pub const fn items(self) -> &'static str {
        match self {
            Self::Metadata => {
                "(UID X-GM-THRID X-GM-LABELS FLAGS INTERNALDATE \
                 BODY.PEEK[HEADER.FIELDS (SUBJECT MESSAGE-ID X-RECEIVED)])"
            }
            Self::Content => {
                "(UID X-GM-THRID X-GM-LABELS FLAGS INTERNALDATE \
                 BODY.PEEK[HEADER.FIELDS (SUBJECT MESSAGE-ID X-RECEIVED)] BODY.PEEK[])"
            }
        }
    }
}

/// An IMAP command.
#[derive(Debug, Clone)]
pub enum Command {
    /// Request the capability list.
    Capability,
    /// Plain LOGIN with a reusable secret.
    Login {
        /// Account name.
        username: String,
        /// Password or app password.
        password: String,
    },
    /// AUTHENTICATE XOAUTH2 with a pre-encoded SASL initial response.
    AuthenticateXOauth2 {
        /// Base64 SASL initial response.
        initial: String,
    },
    /// Negotiate RFC 4978 stream compression.
    CompressDeflate,
    /// List folders (RFC 3501 LIST).
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// List folders with Gmail's XLIST (special-purpose attributes).
    Xlist {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// Create a folder (one hierarchy level per command).
    Create {
        /// Folder to create.
        mailbox: Mailbox,
    },
    /// Select a folder read-write.
    Select {
        /// Folder to select.
        mailbox: Mailbox,
    },
    /// Select a folder read-only.
    Examine {
        /// Folder to examine.
        mailbox: Mailbox,
    },
    /// UID SEARCH in the selected folder.
    UidSearch {
        /// Search criteria.
        criteria: SearchCriteria,
    },
    /// UID FETCH in the selected folder.
    UidFetch {
        /// Target UIDs.
        set: UidSet,
        /// Fetch shape.
        profile: FetchProfile,
    },
    /// UID STORE +X-GM-LABELS: attach labels to messages.
    UidStoreAddLabels {
        /// Target UIDs.
        set: UidSet,
        /// Labels to attach.
        labels: Vec<Label>,
    },
    /// The initial line of a two-phase APPEND; the literal follows after
    /// the server's continuation.
    Append {
        /// Destination folder.
        mailbox: Mailbox,
        /// Flags to set on the appended message.
        flags: Flags,
        /// Original INTERNALDATE to preserve.
        internal_date: Option<DateTime<FixedOffset>>,
        /// Size of the message literal that follows.
        literal_len: usize,
    },
    /// Keep-alive.
    Noop,
    /// Graceful disconnect.
    Logout,
}

impl Command {
    /// Serializes the command as a tagged wire line.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }
            Self::AuthenticateXOauth2 { initial } => {
                buf.extend_from_slice(b"AUTHENTICATE XOAUTH2 ");
                buf.extend_from_slice(initial.as_bytes());
            }
            Self::CompressDeflate => buf.extend_from_slice(b"COMPRESS DEFLATE"),
            Self::List { reference, pattern } => {
                buf.extend_from_slice(b"LIST ");
                write_astring(&mut buf, reference);
                buf.push(b' ');
                write_astring(&mut buf, pattern);
            }
            Self::Xlist { reference, pattern } => {
                buf.extend_from_slice(b"XLIST ");
                write_astring(&mut buf, reference);
                buf.push(b' ');
                write_astring(&mut buf, pattern);
            }
            Self::Create { mailbox } => {
                buf.extend_from_slice(b"CREATE ");
                write_astring(&mut buf, mailbox.as_str());
            }
            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox.as_str());
            }
            Self::Examine { mailbox } => {
                buf.extend_from_slice(b"EXAMINE ");
                write_astring(&mut buf, mailbox.as_str());
            }
            Self::UidSearch { criteria } => {
                buf.extend_from_slice(b"UID SEARCH ");
                criteria.write(&mut buf);
            }
            Self::UidFetch { set, profile } => {
                buf.extend_from_slice(b"UID FETCH ");
                buf.extend_from_slice(set.to_string().as_bytes());
                buf.push(b' ');
                buf.extend_from_slice(profile.items().as_bytes());
            }
            Self::UidStoreAddLabels { set, labels } => {
                buf.extend_from_slice(b"UID STORE ");
                buf.extend_from_slice(set.to_string().as_bytes());
                buf.extend_from_slice(b" +X-GM-LABELS (");
                for (i, label) in labels.iter().enumerate() {
                    if i > 0 {
                        buf.push(b' ');
                    }
                    write_label(&mut buf, label);
                }
                buf.push(b')');
            }
            Self::Append {
                mailbox,
                flags,
                internal_date,
                literal_len,
            } => {
                buf.extend_from_slice(b"APPEND ");
                write_astring(&mut buf, mailbox.as_str());
                if !flags.is_empty() {
                    buf.extend_from_slice(b" (");
                    for (i, flag) in flags.iter().enumerate() {
                        if i > 0 {
                            buf.push(b' ');
                        }
                        buf.extend_from_slice(flag.as_str().as_bytes());
                    }
                    buf.push(b')');
                }
                if let Some(date) = internal_date {
                    buf.extend_from_slice(
                        format!(" \"{}\"", date.format("%d-%b-%Y %H:%M:%S %z")).as_bytes(),
                    );
                }
                buf.extend_from_slice(format!(" {{{literal_len}}}").as_bytes());
            }
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }
}
