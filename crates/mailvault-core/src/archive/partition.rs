//! Archive partitions.
//!
//! Mail is partitioned by year-month of its internal date; chat
//! transcripts go into rotating numeric buckets so no single directory
//! grows unbounded. Quarantine and bin are side areas with the same
//! metadata+content pair layout, never auto-replayed.

use std::fmt;
use std::path::PathBuf;

/// A directory in the archive that holds metadata+content pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Partition {
    /// `db/<yyyy-mm>` for ordinary mail, keyed by internal date.
    Month {
        /// Calendar year.
        year: i32,
        /// Calendar month, 1-12.
        month: u32,
    },
    /// `db/chats/chats-<n>` rotating bucket for chat transcripts.
    ChatBucket(u32),
    /// `quarantine/` for items that failed an unrecoverable remote
    /// operation.
    Quarantine,
    /// `bin/` for items removed remotely but not yet permanently deleted.
    Bin,
}

impl Partition {
    /// Directory path relative to the archive root.
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        match self {
            Self::Month { year, month } => PathBuf::from(format!("db/{year:04}-{month:02}")),
            Self::ChatBucket(n) => PathBuf::from(format!("db/chats/chats-{n}")),
            Self::Quarantine => PathBuf::from("quarantine"),
            Self::Bin => PathBuf::from("bin"),
        }
    }

    /// Parses a `yyyy-mm` directory name under `db/`.
    #[must_use]
    pub fn parse_month(name: &str) -> Option<Self> {
        let (year, month) = name.split_once('-')?;
        if year.len() != 4 || month.len() != 2 {
            return None;
        }
        let year = year.parse().ok()?;
        let month: u32 = month.parse().ok()?;
        (1..=12).contains(&month).then_some(Self::Month { year, month })
    }

    /// Parses a `chats-<n>` directory name under `db/chats/`.
    #[must_use]
    pub fn parse_chat_bucket(name: &str) -> Option<Self> {
        let n = name.strip_prefix("chats-")?.parse().ok()?;
        Some(Self::ChatBucket(n))
    }

    /// True for the main archive areas (mail months and chat buckets).
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Month { .. } | Self::ChatBucket(_))
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir().display())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn directory_names() {
        let month = Partition::Month {
            year: 2021,
            month: 3,
        };
        assert_eq!(month.dir(), PathBuf::from("db/2021-03"));
        assert_eq!(Partition::ChatBucket(7).dir(), PathBuf::from("db/chats/chats-7"));
        assert_eq!(Partition::Quarantine.dir(), PathBuf::from("quarantine"));
        assert_eq!(Partition::Bin.dir(), PathBuf::from("bin"));
    }

    #[test]
    fn month_names_round_trip() {
        let month = Partition::parse_month("2021-03").unwrap();
        assert_eq!(
            month,
            Partition::Month {
                year: 2021,
                month: 3
            }
        );
        assert!(Partition::parse_month("2021-13").is_none());
        assert!(Partition::parse_month("chats").is_none());
        assert!(Partition::parse_month("21-03").is_none());
    }

    #[test]
    fn chat_bucket_names_round_trip() {
        assert_eq!(
            Partition::parse_chat_bucket("chats-7"),
            Some(Partition::ChatBucket(7))
        );
        assert!(Partition::parse_chat_bucket("2021-03").is_none());
    }

    #[test]
    fn months_order_chronologically() {
        let earlier = Partition::Month {
            year: 2020,
            month: 12,
        };
        let later = Partition::Month {
            year: 2021,
            month: 1,
        };
        assert!(earlier < later);
    }
}
