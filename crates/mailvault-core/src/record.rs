//! The unit of archiving.
//!
//! A [`MessageRecord`] is the JSON metadata half of an archived message;
//! the raw content lives beside it as a separate file. The record carries
//! everything needed to diff against the remote without re-downloading
//! bodies, plus correlation headers for re-finding a message after a
//! restore assigns it a new identifier.

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use mailvault_imap::parser::FetchRecord;
use mailvault_imap::types::{Flag, Flags, Label};

use crate::archive::Partition;
use crate::{Error, Result};

/// Archived message metadata, serialized as the `.meta` JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Permanent id: the message's UID in its owning folder.
    pub gm_id: u32,
    /// Conversation thread id (X-GM-THRID).
    pub thread_id: u64,
    /// Label names, `/`-separated segments forming a hierarchy.
    pub labels: Vec<String>,
    /// Protocol flags, in their wire spelling (`\Seen`, `\Flagged`, ...).
    pub flags: Vec<String>,
    /// Server receipt timestamp as epoch seconds.
    pub internal_date: i64,
    /// Subject header, used as a fallback correlation key.
    pub subject: String,
    /// Message-ID header.
    pub msg_id: String,
    /// X-Received header.
    pub x_received: String,
}

impl MessageRecord {
    /// Builds a record from a metadata (or content) fetch response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteRecord`] when the response lacks a UID or
    /// internal date; both are required to place the record in the archive.
    pub fn from_fetch(fetched: &FetchRecord) -> Result<Self> {
        let uid = fetched.uid.ok_or(Error::IncompleteRecord("uid"))?;
        let internal_date = fetched
            .internal_date
            .ok_or(Error::IncompleteRecord("internal date"))?;

        let header = fetched.header.as_deref().unwrap_or(&[]);

        Ok(Self {
            gm_id: uid.get(),
            thread_id: fetched.thread_id.map_or(0, |t| t.get()),
            labels: fetched.labels.iter().map(|l| l.as_str().to_owned()).collect(),
            flags: fetched.flags.iter().map(|f| f.as_str().to_owned()).collect(),
            internal_date: internal_date.timestamp(),
            subject: header_field(header, "Subject").unwrap_or_default(),
            msg_id: header_field(header, "Message-ID").unwrap_or_default(),
            x_received: header_field(header, "X-Received").unwrap_or_default(),
        })
    }

    /// The year-month partition this record belongs to.
    #[must_use]
    pub fn month_partition(&self) -> Partition {
        let date = DateTime::from_timestamp(self.internal_date, 0)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Partition::Month {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Typed view of the stored flags.
    #[must_use]
    pub fn typed_flags(&self) -> Flags {
        Flags::from_vec(self.flags.iter().map(|f| Flag::parse(f)).collect())
    }

    /// Typed view of the stored labels.
    #[must_use]
    pub fn typed_labels(&self) -> Vec<Label> {
        self.labels.iter().map(|l| Label::new(l.as_str())).collect()
    }

    /// The internal date with a fixed offset, as the APPEND command wants
    /// it. Archived dates are normalized to UTC.
    #[must_use]
    pub fn internal_date_fixed(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::from_timestamp(self.internal_date, 0).map(Into::into)
    }

    /// True when the remote's flags and labels match the archived ones, so
    /// a re-sync can skip the record entirely.
    #[must_use]
    pub fn matches_remote(&self, fetched: &FetchRecord) -> bool {
        if !self.typed_flags().same_set(&fetched.flags) {
            return false;
        }

        let mut local: Vec<&str> = self.labels.iter().map(String::as_str).collect();
        let mut remote: Vec<&str> = fetched.labels.iter().map(Label::as_str).collect();
        local.sort_unstable();
        local.dedup();
        remote.sort_unstable();
        remote.dedup();
        local == remote
    }
}

/// Extracts one header field's value, unfolding continuation lines.
fn header_field(header: &[u8], name: &str) -> Option<String> {
    let text = String::from_utf8_lossy(header);
    let mut value: Option<String> = None;

    for line in text.lines() {
        if let Some(v) = &mut value {
            // Folded continuation lines start with whitespace.
            if line.starts_with(' ') || line.starts_with('\t') {
                v.push(' ');
                v.push_str(line.trim());
                continue;
            }
            break;
        }

        if let Some((field, rest)) = line.split_once(':') {
            if field.eq_ignore_ascii_case(name) {
                value = Some(rest.trim().to_owned());
            }
        }
    }

    value
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mailvault_imap::types::{ThreadId, Uid};

    fn fetched(uid: u32) -> FetchRecord {
        FetchRecord {
            uid: Uid::new(uid),
            thread_id: Some(ThreadId::new(1_278_455_344_688_687_096)),
            labels: vec![Label::new("\\Inbox"), Label::new("Work/Projects")],
            flags: Flags::from_vec(vec![Flag::Seen]),
            internal_date: DateTime::parse_from_rfc3339("2021-03-14T09:26:53Z").ok(),
            header: Some(
                b"Subject: quarterly numbers,\r\n revised\r\n\
                  Message-ID: <abc@example.com>\r\n\
                  X-Received: by 10.0.0.1\r\n\r\n"
                    .to_vec(),
            ),
            body: None,
        }
    }

    #[test]
    fn builds_record_from_fetch_response() {
        let record = MessageRecord::from_fetch(&fetched(4021)).unwrap();

        assert_eq!(record.gm_id, 4021);
        assert_eq!(record.thread_id, 1_278_455_344_688_687_096);
        assert_eq!(record.labels, vec!["\\Inbox", "Work/Projects"]);
        assert_eq!(record.flags, vec!["\\Seen"]);
        assert_eq!(record.subject, "quarterly numbers, revised");
        assert_eq!(record.msg_id, "<abc@example.com>");
        assert_eq!(record.x_received, "by 10.0.0.1");
    }

    #[test]
    fn missing_uid_is_incomplete() {
        let mut incomplete = fetched(1);
        incomplete.uid = None;
        assert!(matches!(
            MessageRecord::from_fetch(&incomplete),
            Err(Error::IncompleteRecord("uid"))
        ));
    }

    #[test]
    fn month_partition_from_internal_date() {
        let record = MessageRecord::from_fetch(&fetched(1)).unwrap();
        assert_eq!(
            record.month_partition(),
            Partition::Month {
                year: 2021,
                month: 3
            }
        );
    }

    #[test]
    fn unchanged_remote_state_matches() {
        let remote = fetched(1);
        let record = MessageRecord::from_fetch(&remote).unwrap();
        assert!(record.matches_remote(&remote));

        let mut changed = fetched(1);
        changed.flags = Flags::from_vec(vec![Flag::Seen, Flag::Flagged]);
        assert!(!record.matches_remote(&changed));

        let mut relabeled = fetched(1);
        relabeled.labels.push(Label::new("Archive"));
        assert!(!record.matches_remote(&relabeled));
    }

    #[test]
    fn label_order_does_not_matter() {
        let remote = fetched(1);
        let record = MessageRecord::from_fetch(&remote).unwrap();

        let mut reordered = fetched(1);
        reordered.labels.reverse();
        assert!(record.matches_remote(&reordered));
    }

    #[test]
    fn json_shape_is_stable() {
        let record = MessageRecord::from_fetch(&fetched(7)).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["gm_id"], 7);
        assert_eq!(json["internal_date"], 1_615_714_013);
        assert!(json["labels"].is_array());
    }
}
