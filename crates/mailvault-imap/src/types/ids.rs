//! Message identifiers and UID sets.

use std::num::NonZeroU32;

/// Message sequence number, valid only within one folder selection.
///
/// Never persisted: the archive is keyed by [`Uid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(pub NonZeroU32);

impl SeqNum {
    /// Creates a sequence number; zero is not a valid value.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for SeqNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message UID within its owning folder.
///
/// For an account's "all messages" (or chats) folder this is the stable
/// per-message identifier the archive is keyed by; it only shifts if the
/// folder's UIDVALIDITY changes, in which case the stored header fields are
/// the fallback correlation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU32);

impl Uid {
    /// Creates a UID; zero is not a valid value.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Gmail thread identifier (X-GM-THRID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId {
    /// Creates a thread id.
    #[must_use]
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UID set for UID FETCH / UID STORE commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidSet {
    /// Single UID.
    Single(Uid),
    /// Inclusive range.
    Range(Uid, Uid),
    /// Explicit list, serialized comma-separated.
    List(Vec<Uid>),
}

impl UidSet {
    /// Builds a set from a slice of UIDs, collapsing a contiguous ascending
    /// run into a range.
    ///
    /// Returns `None` for an empty slice.
    #[must_use]
    pub fn from_uids(uids: &[Uid]) -> Option<Self> {
        match uids {
            [] => None,
            [single] => Some(Self::Single(*single)),
            [first, .., last] => {
                let contiguous = uids
                    .windows(2)
                    .all(|w| w[1].get() == w[0].get().saturating_add(1));
                if contiguous {
                    Some(Self::Range(*first, *last))
                } else {
                    Some(Self::List(uids.to_vec()))
                }
            }
        }
    }
}

impl std::fmt::Display for UidSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(uid) => write!(f, "{uid}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::List(uids) => {
                let s: Vec<_> = uids.iter().map(ToString::to_string).collect();
                write!(f, "{}", s.join(","))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    #[test]
    fn zero_is_rejected() {
        assert!(Uid::new(0).is_none());
        assert!(SeqNum::new(0).is_none());
    }

    #[test]
    fn contiguous_run_collapses_to_range() {
        let set = UidSet::from_uids(&[uid(4), uid(5), uid(6)]).unwrap();
        assert_eq!(set.to_string(), "4:6");
    }

    #[test]
    fn sparse_uids_stay_a_list() {
        let set = UidSet::from_uids(&[uid(4), uid(9), uid(100)]).unwrap();
        assert_eq!(set.to_string(), "4,9,100");
    }

    #[test]
    fn singleton_and_empty() {
        assert_eq!(UidSet::from_uids(&[uid(7)]).unwrap().to_string(), "7");
        assert!(UidSet::from_uids(&[]).is_none());
    }

    /// Expands the wire form of a UID set back into its values.
    fn expand(s: &str) -> Vec<u32> {
        s.split(',')
            .flat_map(|part| match part.split_once(':') {
                Some((a, b)) => (a.parse().unwrap()..=b.parse().unwrap()).collect::<Vec<u32>>(),
                None => vec![part.parse().unwrap()],
            })
            .collect()
    }

    proptest! {
        #[test]
        fn wire_form_covers_every_uid(
            values in prop::collection::btree_set(1u32..100_000, 1..60)
        ) {
            let uids: Vec<Uid> = values.iter().map(|&n| uid(n)).collect();
            let set = UidSet::from_uids(&uids).unwrap();
            let expanded = expand(&set.to_string());
            let expected: Vec<u32> = values.into_iter().collect();
            prop_assert_eq!(expanded, expected);
        }
    }
}
