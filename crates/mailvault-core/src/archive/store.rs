//! On-disk archive store.
//!
//! Layout, stable across versions:
//!
//! ```text
//! <root>/db/2021-03/4021.meta          metadata JSON
//! <root>/db/2021-03/4021.eml[.gz][.crypt]
//! <root>/db/chats/chats-7/...          same pair layout
//! <root>/quarantine/, <root>/bin/      side areas, same pair layout
//! <root>/.info/owner_account.info      JSON list of owner accounts
//! <root>/.info/.storage_key.sec        symmetric key, created on first use
//! ```
//!
//! Writes are keyed by permanent id and idempotent: re-writing an
//! unchanged record produces the same bytes. Every write goes through a
//! temp file and rename so a crash never leaves a partial file under its
//! final name.

#![allow(clippy::missing_errors_doc)]

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::debug;

use super::crypto::ContentCipher;
use super::partition::Partition;
use crate::record::MessageRecord;
use crate::{Error, Result};

const INFO_DIR: &str = ".info";
const KEY_FILE: &str = ".storage_key.sec";
const OWNER_FILE: &str = "owner_account.info";

/// Content suffixes in the order transforms are reversed on read: the
/// suffix records exactly which transforms were applied on write.
const CONTENT_SUFFIXES: [&str; 4] = ["eml", "eml.gz", "eml.crypt", "eml.gz.crypt"];

/// The local archive.
#[derive(Debug)]
pub struct ArchiveStore {
    root: PathBuf,
    cipher: OnceLock<ContentCipher>,
}

impl ArchiveStore {
    /// Opens (creating if needed) the archive rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("db"))?;
        fs::create_dir_all(root.join(INFO_DIR))?;
        Ok(Self {
            root,
            cipher: OnceLock::new(),
        })
    }

    /// The archive root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes (or overwrites) a record's metadata in the given partition.
    pub fn write_metadata(&self, record: &MessageRecord, partition: Partition) -> Result<()> {
        let dir = self.root.join(partition.dir());
        fs::create_dir_all(&dir)?;
        let json = serde_json::to_vec(record)?;
        write_atomic(&dir.join(format!("{}.meta", record.gm_id)), &json)?;
        debug!(id = record.gm_id, %partition, "metadata written");
        Ok(())
    }

    /// Writes (or overwrites) a record's raw content in the given
    /// partition, applying the requested transforms.
    ///
    /// Compression runs before encryption; the file suffix records both so
    /// [`ArchiveStore::read_content`] reverses exactly the right ones.
    pub fn write_content(
        &self,
        id: u32,
        content: &[u8],
        partition: Partition,
        compress: bool,
        encrypt: bool,
    ) -> Result<()> {
        let dir = self.root.join(partition.dir());
        fs::create_dir_all(&dir)?;

        let mut data = content.to_vec();
        let mut suffix = String::from("eml");
        if compress {
            data = gzip(&data)?;
            suffix.push_str(".gz");
        }
        if encrypt {
            data = self.cipher()?.encrypt(&data)?;
            suffix.push_str(".crypt");
        }

        write_atomic(&dir.join(format!("{id}.{suffix}")), &data)?;

        // An earlier write with different transform options must not leave
        // a stale variant behind.
        for other in CONTENT_SUFFIXES {
            if other != suffix {
                let stale = dir.join(format!("{id}.{other}"));
                if stale.exists() {
                    fs::remove_file(stale)?;
                }
            }
        }

        debug!(id, %partition, suffix, "content written");
        Ok(())
    }

    /// Reads a record's metadata, wherever it lives in the live areas.
    pub fn read_metadata(&self, id: u32) -> Result<MessageRecord> {
        let partition = self.exists(id)?.ok_or(Error::RecordNotFound(id))?;
        self.read_metadata_in(id, partition)
    }

    /// Reads a record's metadata from a known partition.
    pub fn read_metadata_in(&self, id: u32, partition: Partition) -> Result<MessageRecord> {
        let path = self.root.join(partition.dir()).join(format!("{id}.meta"));
        if !path.exists() {
            return Err(Error::RecordNotFound(id));
        }
        let json = fs::read(path)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Reads a record's raw content, reversing the transforms its suffix
    /// records.
    pub fn read_content(&self, id: u32) -> Result<Vec<u8>> {
        let partition = self.exists(id)?.ok_or(Error::RecordNotFound(id))?;
        let dir = self.root.join(partition.dir());

        let (suffix, path) = CONTENT_SUFFIXES
            .iter()
            .map(|s| (*s, dir.join(format!("{id}.{s}"))))
            .find(|(_, p)| p.exists())
            .ok_or(Error::ContentNotFound(id))?;

        let mut data = fs::read(path)?;
        if suffix.ends_with(".crypt") {
            data = self.cipher()?.decrypt(&data)?;
        }
        if suffix.contains(".gz") {
            data = gunzip(&data)?;
        }
        Ok(data)
    }

    /// Whether a content file (any suffix) exists beside the record's
    /// metadata.
    pub fn has_content(&self, id: u32) -> Result<bool> {
        let Some(partition) = self.exists(id)? else {
            return Ok(false);
        };
        let dir = self.root.join(partition.dir());
        Ok(CONTENT_SUFFIXES
            .iter()
            .any(|s| dir.join(format!("{id}.{s}")).exists()))
    }

    /// Where the record lives in the live areas, if it is archived at all.
    ///
    /// Quarantine and bin do not count as present: a quarantined or
    /// soft-deleted record is re-fetched by the next sync.
    pub fn exists(&self, id: u32) -> Result<Option<Partition>> {
        for partition in self.live_partitions()? {
            if self
                .root
                .join(partition.dir())
                .join(format!("{id}.meta"))
                .exists()
            {
                return Ok(Some(partition));
            }
        }
        Ok(None)
    }

    /// Moves a record's pair into the quarantine area.
    pub fn quarantine(&self, id: u32) -> Result<()> {
        self.move_pair(id, Partition::Quarantine)
    }

    /// Moves a record's pair into the bin (soft delete).
    pub fn soft_delete(&self, id: u32) -> Result<()> {
        self.move_pair(id, Partition::Bin)
    }

    /// All archived ids in ascending order, optionally starting from a
    /// given partition (used by bounded "quick" operations).
    pub fn all_ids(&self, since: Option<Partition>) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        for partition in self.live_partitions()? {
            if let Some(since) = since {
                if partition < since {
                    continue;
                }
            }
            self.collect_ids(partition, &mut ids)?;
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Archived mail ids (month partitions only), ascending, optionally
    /// starting from a given month.
    pub fn mail_ids(&self, since: Option<Partition>) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        for partition in self.month_partitions()? {
            if let Some(since) = since {
                if partition < since {
                    continue;
                }
            }
            self.collect_ids(partition, &mut ids)?;
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Number of records in a partition.
    pub fn partition_len(&self, partition: Partition) -> Result<usize> {
        let mut ids = Vec::new();
        self.collect_ids(partition, &mut ids)?;
        Ok(ids.len())
    }

    /// Archived chat ids (chat buckets only), ascending.
    pub fn chat_ids(&self) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        for partition in self.chat_buckets()? {
            self.collect_ids(partition, &mut ids)?;
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// The chat bucket the next write should land in: the newest existing
    /// bucket while it has room, otherwise the next number up.
    pub fn chat_bucket(&self, item_cap: usize) -> Result<Partition> {
        let buckets = self.chat_buckets()?;
        let Some(&last) = buckets.last() else {
            return Ok(Partition::ChatBucket(0));
        };
        let Partition::ChatBucket(n) = last else {
            return Ok(Partition::ChatBucket(0));
        };

        let mut ids = Vec::new();
        self.collect_ids(last, &mut ids)?;

        if ids.len() >= item_cap {
            Ok(Partition::ChatBucket(n + 1))
        } else {
            Ok(last)
        }
    }

    /// Registers `account` as an archive owner.
    ///
    /// A second, different owner is rejected with
    /// [`Error::OwnershipConflict`] unless `allow_multi` is set, before any
    /// other write happens.
    pub fn register_owner(&self, account: &str, allow_multi: bool) -> Result<()> {
        let mut owners = self.owners()?;
        if owners.iter().any(|o| o == account) {
            return Ok(());
        }
        if !owners.is_empty() && !allow_multi {
            return Err(Error::OwnershipConflict {
                archive: self.root.display().to_string(),
                owners,
                account: account.to_owned(),
            });
        }
        owners.push(account.to_owned());
        let json = serde_json::to_vec(&owners)?;
        write_atomic(&self.root.join(INFO_DIR).join(OWNER_FILE), &json)?;
        Ok(())
    }

    /// The accounts that have synced into this archive.
    pub fn owners(&self) -> Result<Vec<String>> {
        let path = self.root.join(INFO_DIR).join(OWNER_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read(path)?;
        Ok(serde_json::from_slice(&json)?)
    }

    fn cipher(&self) -> Result<&ContentCipher> {
        if self.cipher.get().is_none() {
            let cipher =
                ContentCipher::load_or_create(&self.root.join(INFO_DIR).join(KEY_FILE))?;
            let _ = self.cipher.set(cipher);
        }
        self.cipher
            .get()
            .ok_or_else(|| Error::Crypto("cipher initialization raced".to_owned()))
    }

    fn move_pair(&self, id: u32, to: Partition) -> Result<()> {
        let from = self.exists(id)?.ok_or(Error::RecordNotFound(id))?;
        let from_dir = self.root.join(from.dir());
        let to_dir = self.root.join(to.dir());
        fs::create_dir_all(&to_dir)?;

        let meta = format!("{id}.meta");
        fs::rename(from_dir.join(&meta), to_dir.join(&meta))?;

        for suffix in CONTENT_SUFFIXES {
            let name = format!("{id}.{suffix}");
            let src = from_dir.join(&name);
            if src.exists() {
                fs::rename(src, to_dir.join(&name))?;
            }
        }
        debug!(id, from = %from, to = %to, "record moved");
        Ok(())
    }

    /// Month partitions sorted chronologically, then chat buckets sorted
    /// numerically.
    fn live_partitions(&self) -> Result<Vec<Partition>> {
        let mut partitions = self.month_partitions()?;
        partitions.extend(self.chat_buckets()?);
        Ok(partitions)
    }

    fn month_partitions(&self) -> Result<Vec<Partition>> {
        let mut months = Vec::new();
        for entry in read_dir_if_exists(&self.root.join("db"))? {
            let entry = entry?;
            if let Some(p) = entry
                .file_name()
                .to_str()
                .and_then(Partition::parse_month)
            {
                months.push(p);
            }
        }
        months.sort_unstable();
        Ok(months)
    }

    fn chat_buckets(&self) -> Result<Vec<Partition>> {
        let mut buckets = Vec::new();
        for entry in read_dir_if_exists(&self.root.join("db").join("chats"))? {
            let entry = entry?;
            if let Some(p) = entry
                .file_name()
                .to_str()
                .and_then(Partition::parse_chat_bucket)
            {
                buckets.push(p);
            }
        }
        buckets.sort_unstable_by_key(|p| match p {
            Partition::ChatBucket(n) => *n,
            _ => 0,
        });
        Ok(buckets)
    }

    fn collect_ids(&self, partition: Partition, ids: &mut Vec<u32>) -> Result<()> {
        for entry in read_dir_if_exists(&self.root.join(partition.dir()))? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_suffix(".meta").and_then(|s| s.parse().ok()) {
                ids.push(id);
            }
        }
        Ok(())
    }
}

/// Like `fs::read_dir`, but a missing directory yields no entries.
fn read_dir_if_exists(path: &Path) -> Result<Box<dyn Iterator<Item = std::io::Result<fs::DirEntry>>>> {
    if path.is_dir() {
        Ok(Box::new(fs::read_dir(path)?))
    } else {
        Ok(Box::new(std::iter::empty()))
    }
}

/// Writes via a temp file in the same directory, then renames into place.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("write");
    let tmp = path.with_file_name(format!("{name}.tmp"));
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(id: u32) -> MessageRecord {
        MessageRecord {
            gm_id: id,
            thread_id: 17,
            labels: vec!["\\Inbox".to_owned()],
            flags: vec!["\\Seen".to_owned()],
            internal_date: 1_615_714_013, // 2021-03-14
            subject: "hello".to_owned(),
            msg_id: format!("<{id}@example.com>"),
            x_received: String::new(),
        }
    }

    fn march() -> Partition {
        Partition::Month {
            year: 2021,
            month: 3,
        }
    }

    #[test]
    fn pair_round_trips_plain() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();

        store.write_metadata(&record(100), march()).unwrap();
        store
            .write_content(100, b"raw message", march(), false, false)
            .unwrap();

        assert_eq!(store.exists(100).unwrap(), Some(march()));
        assert_eq!(store.read_metadata(100).unwrap(), record(100));
        assert_eq!(store.read_content(100).unwrap(), b"raw message");
        assert!(dir.path().join("db/2021-03/100.eml").exists());
    }

    #[test]
    fn suffix_records_applied_transforms() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let body = b"compressible compressible compressible".as_slice();

        store.write_metadata(&record(1), march()).unwrap();

        store.write_content(1, body, march(), true, false).unwrap();
        assert!(dir.path().join("db/2021-03/1.eml.gz").exists());
        assert_eq!(store.read_content(1).unwrap(), body);

        store.write_content(1, body, march(), true, true).unwrap();
        assert!(dir.path().join("db/2021-03/1.eml.gz.crypt").exists());
        // The previous variant must not linger.
        assert!(!dir.path().join("db/2021-03/1.eml.gz").exists());
        assert_eq!(store.read_content(1).unwrap(), body);

        store.write_content(1, body, march(), false, true).unwrap();
        assert!(dir.path().join("db/2021-03/1.eml.crypt").exists());
        assert_eq!(store.read_content(1).unwrap(), body);
    }

    #[test]
    fn encrypted_content_is_not_plaintext_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();

        store.write_metadata(&record(2), march()).unwrap();
        store
            .write_content(2, b"secret body", march(), false, true)
            .unwrap();

        let on_disk = fs::read(dir.path().join("db/2021-03/2.eml.crypt")).unwrap();
        assert!(!on_disk.windows(6).any(|w| w == b"secret"));
    }

    #[test]
    fn missing_record_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        assert!(store.exists(9).unwrap().is_none());
        assert!(matches!(
            store.read_metadata(9),
            Err(Error::RecordNotFound(9))
        ));
    }

    #[test]
    fn soft_delete_moves_the_pair_to_bin() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();

        store.write_metadata(&record(101), march()).unwrap();
        store
            .write_content(101, b"gone soon", march(), false, false)
            .unwrap();

        store.soft_delete(101).unwrap();

        assert!(store.exists(101).unwrap().is_none());
        assert!(dir.path().join("bin/101.meta").exists());
        assert!(dir.path().join("bin/101.eml").exists());
        assert!(!dir.path().join("db/2021-03/101.meta").exists());
    }

    #[test]
    fn quarantine_moves_the_pair() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();

        store.write_metadata(&record(5), march()).unwrap();
        store.quarantine(5).unwrap();

        assert!(dir.path().join("quarantine/5.meta").exists());
        assert!(store.exists(5).unwrap().is_none());
    }

    #[test]
    fn all_ids_ascending_across_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();

        let feb = Partition::Month {
            year: 2021,
            month: 2,
        };
        store.write_metadata(&record(300), march()).unwrap();
        store.write_metadata(&record(7), feb).unwrap();
        store
            .write_metadata(&record(42), Partition::ChatBucket(0))
            .unwrap();

        assert_eq!(store.all_ids(None).unwrap(), vec![7, 42, 300]);
        assert_eq!(store.all_ids(Some(march())).unwrap(), vec![42, 300]);
        assert_eq!(store.mail_ids(None).unwrap(), vec![7, 300]);
        assert_eq!(store.mail_ids(Some(march())).unwrap(), vec![300]);
        assert_eq!(store.chat_ids().unwrap(), vec![42]);
    }

    #[test]
    fn chat_buckets_rotate_at_the_cap() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();

        assert_eq!(store.chat_bucket(2).unwrap(), Partition::ChatBucket(0));

        store
            .write_metadata(&record(1), Partition::ChatBucket(0))
            .unwrap();
        assert_eq!(store.chat_bucket(2).unwrap(), Partition::ChatBucket(0));

        store
            .write_metadata(&record(2), Partition::ChatBucket(0))
            .unwrap();
        assert_eq!(store.chat_bucket(2).unwrap(), Partition::ChatBucket(1));
    }

    #[test]
    fn first_owner_registers_and_second_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();

        store.register_owner("a@gmail.com", false).unwrap();
        store.register_owner("a@gmail.com", false).unwrap();
        assert_eq!(store.owners().unwrap(), vec!["a@gmail.com"]);

        let err = store.register_owner("b@gmail.com", false).unwrap_err();
        assert!(matches!(err, Error::OwnershipConflict { .. }));
        assert_eq!(store.owners().unwrap(), vec!["a@gmail.com"]);

        store.register_owner("b@gmail.com", true).unwrap();
        assert_eq!(store.owners().unwrap().len(), 2);
    }
}
