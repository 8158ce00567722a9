//! Chunked UID fetching with per-item degradation.
//!
//! Gmail fails a whole FETCH when any message in the set is one it
//! refuses to hand over. The batcher keeps throughput by fetching in
//! chunks, and on a per-item refusal re-fetches that chunk one UID at a
//! time so a single poisoned message costs one item, not five hundred.

#![allow(clippy::missing_errors_doc)]

use std::future::Future;

use tracing::warn;

use crate::command::FetchProfile;
use crate::parser::FetchRecord;
use crate::retry::RetrySession;
use crate::session::Session;
use crate::types::{Uid, UidSet};
use crate::Result;

use tokio::io::{AsyncRead, AsyncWrite};

/// Default number of UIDs per FETCH command.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Anything that can serve UID FETCH requests.
///
/// Implemented for both the supervised and the bare session so the
/// degradation logic can be exercised against scripted doubles.
pub trait UidFetcher {
    /// Fetches records for the given UID set.
    fn uid_fetch(
        &mut self,
        set: &UidSet,
        profile: FetchProfile,
    ) -> impl Future<Output = Result<Vec<FetchRecord>>>;
}

impl UidFetcher for RetrySession {
    async fn uid_fetch(
        &mut self,
        set: &UidSet,
        profile: FetchProfile,
    ) -> Result<Vec<FetchRecord>> {
        Self::uid_fetch(self, set, profile).await
    }
}

impl<S> UidFetcher for Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn uid_fetch(
        &mut self,
        set: &UidSet,
        profile: FetchProfile,
    ) -> Result<Vec<FetchRecord>> {
        Self::uid_fetch(self, set, profile).await
    }
}

/// Outcome of a batched fetch.
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Successfully fetched records, in request order.
    pub fetched: Vec<FetchRecord>,
    /// UIDs the server refused to hand over even individually.
    pub failed: Vec<Uid>,
}

/// Chunked UID fetcher.
#[derive(Debug, Clone, Copy)]
pub struct BatchFetcher {
    chunk_size: usize,
}

impl Default for BatchFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl BatchFetcher {
    /// Creates a fetcher with the given chunk size (minimum 1).
    #[must_use]
    pub const fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: if chunk_size == 0 { 1 } else { chunk_size },
        }
    }

    /// Fetches all UIDs, degrading to single-item fetches on per-item
    /// refusals.
    ///
    /// Transport and session errors propagate (the supervised session has
    /// already exhausted its reconnects by then); only per-item refusals
    /// are absorbed into [`BatchResult::failed`].
    pub async fn fetch<F>(
        &self,
        source: &mut F,
        uids: &[Uid],
        profile: FetchProfile,
    ) -> Result<BatchResult>
    where
        F: UidFetcher,
    {
        let mut result = BatchResult {
            fetched: Vec::with_capacity(uids.len()),
            failed: Vec::new(),
        };

        for chunk in uids.chunks(self.chunk_size) {
            let Some(set) = UidSet::from_uids(chunk) else {
                continue;
            };

            match source.uid_fetch(&set, profile).await {
                Ok(records) => result.fetched.extend(records),
                Err(e) if e.is_per_item() => {
                    warn!(
                        chunk = %set,
                        "batch refused, degrading to per-item fetches"
                    );
                    self.fetch_singly(source, chunk, profile, &mut result)
                        .await?;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(result)
    }

    async fn fetch_singly<F>(
        &self,
        source: &mut F,
        chunk: &[Uid],
        profile: FetchProfile,
        result: &mut BatchResult,
    ) -> Result<()>
    where
        F: UidFetcher,
    {
        for &uid in chunk {
            match source.uid_fetch(&UidSet::Single(uid), profile).await {
                Ok(records) => result.fetched.extend(records),
                Err(e) if e.is_per_item() => {
                    warn!(%uid, "message cannot be fetched, skipping");
                    result.failed.push(uid);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
