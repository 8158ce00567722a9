//! Sync orchestrator.
//!
//! One run walks Enumerate → Diff → Fetch-and-persist → Checkpoint, then
//! optionally Clean. Per-item failures land in the report and never abort
//! the run; transport failures that outlive the session supervisor
//! propagate and leave the checkpoint pointing at the last fully
//! persisted item.

use std::collections::HashSet;

use tracing::{info, warn};

use mailvault_imap::command::{FetchProfile, SearchCriteria};
use mailvault_imap::types::Uid;

use crate::archive::{ArchiveStore, Partition};
use crate::checkpoint::{Checkpoint, CheckpointStore, OperationKind};
use crate::options::SyncOptions;
use crate::record::MessageRecord;
use crate::remote::{FolderKind, RemoteMailbox};
use crate::report::OpReport;
use crate::{Error, Result};

/// Mirrors the remote account into the archive.
///
/// # Errors
///
/// Fails up front on an ownership conflict or on cleaning requested with
/// a non-full enumeration; mid-run only exhausted-retry transport
/// failures propagate.
pub async fn sync<R: RemoteMailbox>(
    remote: &mut R,
    store: &ArchiveStore,
    account: &str,
    options: &SyncOptions,
) -> Result<OpReport> {
    if options.clean && !options.mode.is_full() {
        return Err(Error::CleanRequiresFullSync);
    }
    store.register_owner(account, options.allow_multi_owner)?;

    let checkpoints = CheckpointStore::new(store.root(), account);
    let mut report = OpReport::default();

    if options.emails {
        sync_folder(
            remote,
            store,
            &checkpoints,
            FolderKind::AllMail,
            OperationKind::EmailSync,
            options,
            &mut report,
        )
        .await?;
    }
    if options.chats && remote.has_folder(FolderKind::Chats)? {
        sync_folder(
            remote,
            store,
            &checkpoints,
            FolderKind::Chats,
            OperationKind::ChatSync,
            options,
            &mut report,
        )
        .await?;
    }
    if options.clean {
        clean(remote, store, options, &mut report).await?;
    }

    report.reconnections = remote.reconnections();
    Ok(report)
}

async fn sync_folder<R: RemoteMailbox>(
    remote: &mut R,
    store: &ArchiveStore,
    checkpoints: &CheckpointStore,
    kind: FolderKind,
    op: OperationKind,
    options: &SyncOptions,
    report: &mut OpReport,
) -> Result<()> {
    let count = remote.select_folder(kind, true).await?;
    info!(?kind, messages = count, "folder selected");

    let mut uids = remote.search(&options.mode.criteria()).await?;
    if options.resume {
        if let Some(checkpoint) = checkpoints.load(op)? {
            uids.retain(|u| u.get() > checkpoint.last_id);
            info!(
                ?op,
                last_id = checkpoint.last_id,
                remaining = uids.len(),
                "resuming from checkpoint"
            );
        }
    }

    // (bucket number, items already in it), initialized on first chat write.
    let mut chat_bucket: Option<(u32, usize)> = None;
    let mut since_checkpoint = 0usize;

    for chunk in uids.chunks(options.batch_size.max(1)) {
        let metadata = remote.fetch_batch(chunk, FetchProfile::Metadata).await?;
        for uid in &metadata.failed {
            report.note_cannot_fetch(uid.get());
        }

        let mut need_content: Vec<Uid> = Vec::new();
        for fetched in &metadata.fetched {
            let Some(uid) = fetched.uid else { continue };
            match store.exists(uid.get())? {
                Some(partition) => {
                    let local = store.read_metadata_in(uid.get(), partition)?;
                    if local.matches_remote(fetched) {
                        report.skipped += 1;
                    } else {
                        let record = match MessageRecord::from_fetch(fetched) {
                            Ok(record) => record,
                            Err(e) if e.is_item_failure() => {
                                report.note_empty(uid.get());
                                continue;
                            }
                            Err(e) => return Err(e),
                        };
                        store.write_metadata(&record, partition)?;
                        report.fetched += 1;
                    }
                }
                None => need_content.push(uid),
            }
        }

        if !need_content.is_empty() {
            let content = remote.fetch_batch(&need_content, FetchProfile::Content).await?;
            for uid in &content.failed {
                report.note_cannot_fetch(uid.get());
            }
            for fetched in &content.fetched {
                let Some(uid) = fetched.uid else { continue };
                let record = match MessageRecord::from_fetch(fetched) {
                    Ok(record) => record,
                    Err(e) if e.is_item_failure() => {
                        report.note_empty(uid.get());
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let Some(body) = fetched.body.as_deref().filter(|b| !b.is_empty()) else {
                    report.note_empty(uid.get());
                    continue;
                };

                let partition = next_partition(store, kind, options, &mut chat_bucket, &record)?;
                // Metadata first: content must never exist without it.
                store.write_metadata(&record, partition)?;
                store.write_content(
                    record.gm_id,
                    body,
                    partition,
                    options.compress,
                    options.encrypt,
                )?;
                report.fetched += 1;
            }
        }

        since_checkpoint += chunk.len();
        if since_checkpoint >= options.checkpoint_every.max(1) {
            if let Some(last) = chunk.last() {
                checkpoints.save(op, Checkpoint { last_id: last.get() })?;
            }
            since_checkpoint = 0;
        }
    }

    checkpoints.clear(op)?;
    Ok(())
}

/// The partition a freshly fetched record lands in: its year-month for
/// mail, the current rotating bucket for chats.
fn next_partition(
    store: &ArchiveStore,
    kind: FolderKind,
    options: &SyncOptions,
    chat_bucket: &mut Option<(u32, usize)>,
    record: &MessageRecord,
) -> Result<Partition> {
    if kind != FolderKind::Chats {
        return Ok(record.month_partition());
    }

    let cap = options.chat_bucket_cap.max(1);
    let (mut n, mut len) = match *chat_bucket {
        Some(state) => state,
        None => {
            let bucket = store.chat_bucket(cap)?;
            let Partition::ChatBucket(n) = bucket else {
                return Err(Error::Layout("expected a chat bucket".to_owned()));
            };
            (n, store.partition_len(bucket)?)
        }
    };
    if len >= cap {
        n += 1;
        len = 0;
    }
    *chat_bucket = Some((n, len + 1));
    Ok(Partition::ChatBucket(n))
}

/// Moves locally archived records that no longer exist remotely to the
/// bin. Runs only against a single-owner archive; with more owners the
/// pass is a no-op regardless of the enabled flag.
async fn clean<R: RemoteMailbox>(
    remote: &mut R,
    store: &ArchiveStore,
    options: &SyncOptions,
    report: &mut OpReport,
) -> Result<()> {
    let owners = store.owners()?;
    if owners.len() != 1 {
        warn!(
            owners = owners.len(),
            "cleaning skipped: archive does not have exactly one owner"
        );
        return Ok(());
    }

    if options.emails {
        remote.select_folder(FolderKind::AllMail, true).await?;
        let remote_ids: HashSet<u32> = remote
            .search(&SearchCriteria::All)
            .await?
            .iter()
            .map(|u| u.get())
            .collect();
        for id in store.mail_ids(None)? {
            if !remote_ids.contains(&id) {
                info!(id, "remotely deleted, moving to bin");
                store.soft_delete(id)?;
                report.cleaned += 1;
            }
        }
    }

    if options.chats && remote.has_folder(FolderKind::Chats)? {
        remote.select_folder(FolderKind::Chats, true).await?;
        let remote_ids: HashSet<u32> = remote
            .search(&SearchCriteria::All)
            .await?
            .iter()
            .map(|u| u.get())
            .collect();
        for id in store.chat_ids()? {
            if !remote_ids.contains(&id) {
                info!(id, "remotely deleted chat, moving to bin");
                store.soft_delete(id)?;
                report.cleaned += 1;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::options::SyncMode;
    use crate::remote::testing::{FakeMessage, FakeRemote};
    use chrono::NaiveDate;

    fn options() -> SyncOptions {
        SyncOptions {
            compress: false,
            chats: false,
            ..SyncOptions::default()
        }
    }

    fn seeded_remote(uids: &[u32]) -> FakeRemote {
        let mut remote = FakeRemote::new();
        for &uid in uids {
            remote.mail.insert(
                uid,
                FakeMessage::plain(
                    &format!("message {uid}"),
                    format!("body of {uid}").as_bytes(),
                    "2021-03-14T09:26:53Z",
                ),
            );
        }
        remote
    }

    #[tokio::test]
    async fn first_sync_mirrors_the_folder() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut remote = seeded_remote(&[100, 101, 102]);

        let report = sync(&mut remote, &store, "a@gmail.com", &options())
            .await
            .unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(report.skipped, 0);
        assert_eq!(store.mail_ids(None).unwrap(), vec![100, 101, 102]);
        assert_eq!(store.read_content(101).unwrap(), b"body of 101");
        assert_eq!(store.owners().unwrap(), vec!["a@gmail.com"]);
        assert!(dir.path().join("db/2021-03/100.meta").exists());
    }

    #[tokio::test]
    async fn second_sync_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut remote = seeded_remote(&[100, 101]);

        sync(&mut remote, &store, "a@gmail.com", &options())
            .await
            .unwrap();
        let content_fetches = remote.content_fetches;

        let report = sync(&mut remote, &store, "a@gmail.com", &options())
            .await
            .unwrap();

        assert_eq!(report.fetched, 0);
        assert_eq!(report.skipped, 2);
        // No content was re-downloaded.
        assert_eq!(remote.content_fetches, content_fetches);
    }

    #[tokio::test]
    async fn changed_flags_update_metadata_without_refetching_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut remote = seeded_remote(&[100]);

        sync(&mut remote, &store, "a@gmail.com", &options())
            .await
            .unwrap();
        let content_fetches = remote.content_fetches;

        remote.mail.get_mut(&100).unwrap().labels.push("Work".to_owned());
        let report = sync(&mut remote, &store, "a@gmail.com", &options())
            .await
            .unwrap();

        assert_eq!(report.fetched, 1);
        assert_eq!(remote.content_fetches, content_fetches);
        assert!(
            store
                .read_metadata(100)
                .unwrap()
                .labels
                .contains(&"Work".to_owned())
        );
    }

    #[tokio::test]
    async fn refused_message_lands_in_the_report_not_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut remote = seeded_remote(&[100, 101, 102]);
        remote.refuse.insert(101);

        let report = sync(&mut remote, &store, "a@gmail.com", &options())
            .await
            .unwrap();

        assert_eq!(store.mail_ids(None).unwrap(), vec![100, 102]);
        assert_eq!(report.cannot_fetched_ids, vec![101]);
    }

    #[tokio::test]
    async fn ownership_conflict_fails_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        store.register_owner("a@gmail.com", false).unwrap();
        let mut remote = seeded_remote(&[100]);

        let err = sync(&mut remote, &store, "b@gmail.com", &options())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::OwnershipConflict { .. }));
        assert!(store.mail_ids(None).unwrap().is_empty());
        assert_eq!(remote.metadata_fetches, 0);
    }

    #[tokio::test]
    async fn cleaning_rejects_bounded_sync() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut remote = seeded_remote(&[100]);

        let bounded = SyncOptions {
            clean: true,
            mode: SyncMode::Since(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()),
            ..options()
        };
        let err = sync(&mut remote, &store, "a@gmail.com", &bounded)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CleanRequiresFullSync));
    }

    #[tokio::test]
    async fn cleaning_moves_remotely_deleted_records_to_bin() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut remote = seeded_remote(&[100, 101, 102]);

        sync(&mut remote, &store, "a@gmail.com", &options())
            .await
            .unwrap();

        remote.mail.remove(&101);
        let clean_run = SyncOptions {
            clean: true,
            ..options()
        };
        let report = sync(&mut remote, &store, "a@gmail.com", &clean_run)
            .await
            .unwrap();

        assert_eq!(report.cleaned, 1);
        assert_eq!(store.mail_ids(None).unwrap(), vec![100, 102]);
        assert!(dir.path().join("db/2021-03/100.meta").exists());
        assert!(dir.path().join("db/2021-03/102.meta").exists());
        assert!(dir.path().join("bin/101.meta").exists());
        assert!(dir.path().join("bin/101.eml").exists());
    }

    #[tokio::test]
    async fn cleaning_is_a_no_op_with_two_owners() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut remote = seeded_remote(&[100, 101]);

        sync(&mut remote, &store, "a@gmail.com", &options())
            .await
            .unwrap();
        store.register_owner("b@gmail.com", true).unwrap();

        remote.mail.remove(&101);
        let clean_run = SyncOptions {
            clean: true,
            ..options()
        };
        let report = sync(&mut remote, &store, "a@gmail.com", &clean_run)
            .await
            .unwrap();

        assert_eq!(report.cleaned, 0);
        assert_eq!(store.mail_ids(None).unwrap(), vec![100, 101]);
    }

    #[tokio::test]
    async fn resume_processes_exactly_the_remaining_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut remote = seeded_remote(&[100, 101, 102, 103, 104]);

        let checkpoints = CheckpointStore::new(store.root(), "a@gmail.com");
        checkpoints
            .save(OperationKind::EmailSync, Checkpoint { last_id: 102 })
            .unwrap();

        let report = sync(&mut remote, &store, "a@gmail.com", &options())
            .await
            .unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(store.mail_ids(None).unwrap(), vec![103, 104]);
        // One metadata round trip for the single remaining chunk.
        assert_eq!(remote.metadata_fetches, 1);
        // A clean finish retires the checkpoint.
        assert!(
            checkpoints
                .load(OperationKind::EmailSync)
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn small_batches_complete_and_retire_the_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut remote = seeded_remote(&[100, 101, 102, 103]);

        let batched = SyncOptions {
            batch_size: 2,
            checkpoint_every: 2,
            ..options()
        };
        sync(&mut remote, &store, "a@gmail.com", &batched)
            .await
            .unwrap();

        // The run completed, so the checkpoint is gone; but every item is
        // in the archive in ascending id order.
        assert_eq!(store.mail_ids(None).unwrap(), vec![100, 101, 102, 103]);
        assert_eq!(remote.metadata_fetches, 2);
    }

    #[tokio::test]
    async fn chats_rotate_into_capped_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();

        let mut remote = FakeRemote::new();
        let mut chats = std::collections::BTreeMap::new();
        for uid in [1u32, 2, 3] {
            chats.insert(
                uid,
                FakeMessage::plain(
                    &format!("chat {uid}"),
                    b"transcript",
                    "2021-03-14T09:26:53Z",
                ),
            );
        }
        remote.chats = Some(chats);

        let with_chats = SyncOptions {
            chats: true,
            emails: false,
            chat_bucket_cap: 2,
            ..options()
        };
        let report = sync(&mut remote, &store, "a@gmail.com", &with_chats)
            .await
            .unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(store.chat_ids().unwrap(), vec![1, 2, 3]);
        assert!(dir.path().join("db/chats/chats-0/1.meta").exists());
        assert!(dir.path().join("db/chats/chats-0/2.meta").exists());
        assert!(dir.path().join("db/chats/chats-1/3.meta").exists());
    }

    #[tokio::test]
    async fn account_without_chats_folder_skips_chat_sync() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut remote = seeded_remote(&[100]);

        let with_chats = SyncOptions {
            chats: true,
            ..options()
        };
        let report = sync(&mut remote, &store, "a@gmail.com", &with_chats)
            .await
            .unwrap();

        assert_eq!(report.fetched, 1);
        assert!(store.chat_ids().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_body_is_reported_not_archived() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut remote = seeded_remote(&[100]);
        remote.mail.get_mut(&100).unwrap().body.clear();

        let report = sync(&mut remote, &store, "a@gmail.com", &options())
            .await
            .unwrap();

        assert_eq!(report.empty_ids, vec![100]);
        assert!(store.mail_ids(None).unwrap().is_empty());
    }
}
