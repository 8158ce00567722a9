//! Restore orchestrator.
//!
//! Replays the archive into a mailbox in checkpointed batches: push raw
//! content with original flags and date, then recreate and batch-apply
//! labels. The transient UID the server assigns on APPEND is used once,
//! to attach labels, and then discarded.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Datelike, Utc};
use tracing::{info, warn};

use mailvault_imap::types::{Label, Uid};

use crate::archive::{ArchiveStore, Partition};
use crate::checkpoint::{Checkpoint, CheckpointStore, OperationKind};
use crate::options::RestoreOptions;
use crate::remote::{FolderKind, RemoteMailbox};
use crate::report::OpReport;
use crate::{Error, Result};

/// Replays archived records into the remote account.
///
/// # Errors
///
/// Per-item push and label failures quarantine the item and continue;
/// only exhausted-retry transport failures propagate.
pub async fn restore<R: RemoteMailbox>(
    remote: &mut R,
    store: &ArchiveStore,
    account: &str,
    options: &RestoreOptions,
) -> Result<OpReport> {
    let checkpoints = CheckpointStore::new(store.root(), account);
    let mut report = OpReport::default();

    // Label existence is session-scoped knowledge, seeded once from LIST
    // so re-restores create nothing that is already there.
    let mut known: HashSet<String> = remote
        .list_labels()
        .await?
        .iter()
        .map(|l| l.as_str().to_owned())
        .collect();

    // Every STORE below acts on the all-mail folder.
    remote.select_folder(FolderKind::AllMail, false).await?;

    if options.emails {
        let since = options.quick.then(|| quick_start(Utc::now()));
        let ids = store.mail_ids(since)?;
        restore_area(
            remote,
            store,
            &checkpoints,
            OperationKind::EmailRestore,
            ids,
            options,
            &mut known,
            &mut report,
        )
        .await?;
    }
    if options.chats {
        let ids = store.chat_ids()?;
        restore_area(
            remote,
            store,
            &checkpoints,
            OperationKind::ChatRestore,
            ids,
            options,
            &mut known,
            &mut report,
        )
        .await?;
    }

    report.reconnections = remote.reconnections();
    Ok(report)
}

/// The starting month for a quick restore: the month before `now`, so
/// roughly the last two months of mail are replayed.
fn quick_start(now: DateTime<Utc>) -> Partition {
    let (year, month) = if now.month() == 1 {
        (now.year() - 1, 12)
    } else {
        (now.year(), now.month() - 1)
    };
    Partition::Month { year, month }
}

#[allow(clippy::too_many_arguments)]
async fn restore_area<R: RemoteMailbox>(
    remote: &mut R,
    store: &ArchiveStore,
    checkpoints: &CheckpointStore,
    op: OperationKind,
    mut ids: Vec<u32>,
    options: &RestoreOptions,
    known: &mut HashSet<String>,
    report: &mut OpReport,
) -> Result<()> {
    if options.resume {
        if let Some(checkpoint) = checkpoints.load(op)? {
            ids.retain(|&id| id > checkpoint.last_id);
            info!(
                ?op,
                last_id = checkpoint.last_id,
                remaining = ids.len(),
                "resuming from checkpoint"
            );
        }
    }

    let mut since_checkpoint = 0usize;

    for chunk in ids.chunks(options.batch_size.max(1)) {
        // label name -> (transient uids, archive ids), for this batch.
        let mut groups: BTreeMap<String, (Vec<Uid>, Vec<u32>)> = BTreeMap::new();

        for &id in chunk {
            let record = store.read_metadata(id)?;
            let content = match store.read_content(id) {
                Ok(content) => content,
                Err(Error::ContentNotFound(_)) => {
                    report.note_empty(id);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let flags = record.typed_flags();
            let target = if flags.is_draft() {
                FolderKind::Drafts
            } else {
                FolderKind::AllMail
            };

            let uid = match remote
                .append(target, &flags, record.internal_date_fixed(), &content)
                .await
            {
                Ok(uid) => uid,
                Err(e) if e.is_item_failure() => {
                    warn!(id, error = %e, "push failed, quarantining");
                    store.quarantine(id)?;
                    report.quarantined += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            report.pushed += 1;

            // UIDs are scoped to their folder (RFC 3501), and the STORE
            // in apply_label_groups runs against the all-mail selection.
            // A draft's UID would address an unrelated all-mail message.
            if target == FolderKind::AllMail
                && let Some(uid) = uid
            {
                for label in record.typed_labels() {
                    let target = if label.is_reserved() {
                        label.sanitized()
                    } else {
                        label
                    };
                    let entry = groups.entry(target.as_str().to_owned()).or_default();
                    entry.0.push(uid);
                    entry.1.push(id);
                }
            }
        }

        apply_label_groups(remote, store, &groups, options, known, report).await?;

        // The checkpoint only moves once the batch's labels are on; a
        // resume after a crash must re-apply them, not skip them.
        since_checkpoint += chunk.len();
        if since_checkpoint >= options.checkpoint_every.max(1) {
            if let Some(&last) = chunk.last() {
                checkpoints.save(op, Checkpoint { last_id: last })?;
            }
            since_checkpoint = 0;
        }
    }

    checkpoints.clear(op)?;
    Ok(())
}

/// Creates missing labels (parents first) and applies each group with one
/// STORE per uid batch.
async fn apply_label_groups<R: RemoteMailbox>(
    remote: &mut R,
    store: &ArchiveStore,
    groups: &BTreeMap<String, (Vec<Uid>, Vec<u32>)>,
    options: &RestoreOptions,
    known: &mut HashSet<String>,
    report: &mut OpReport,
) -> Result<()> {
    for (name, (uids, ids)) in groups {
        let label = Label::new(name.as_str());

        // System labels (\Inbox, \Important, ...) exist on every account
        // and cannot be created.
        if !label.is_system() {
            for prefix in label.hierarchy() {
                if !known.contains(prefix.as_str()) {
                    remote.create_label(&prefix).await?;
                    known.insert(prefix.as_str().to_owned());
                }
            }
        }

        let cap = options.apply_label_batch.max(1);
        for (uid_chunk, id_chunk) in uids.chunks(cap).zip(ids.chunks(cap)) {
            match remote.apply_labels(uid_chunk, &label).await {
                Ok(()) => {}
                Err(e) if e.is_item_failure() => {
                    // One bad message must not cost the whole group its
                    // label: fall back to per-item application.
                    for (&uid, &id) in uid_chunk.iter().zip(id_chunk) {
                        if let Err(e) = remote.apply_labels(&[uid], &label).await {
                            if e.is_item_failure() {
                                warn!(id, label = %label, error = %e, "label failed, quarantining");
                                store.quarantine(id)?;
                                report.quarantined += 1;
                            } else {
                                return Err(e);
                            }
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}
