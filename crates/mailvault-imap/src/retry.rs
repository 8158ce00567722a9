//! Reconnect/backoff supervision.
//!
//! Long archive runs ride over connections that Gmail drops at will, so
//! every caller goes through [`RetrySession`]: transport failures and
//! server-side aborts tear the session down, wait out an exponential
//! backoff, reconnect, restore the folder selection, and re-issue the
//! operation. Authentication failures and per-item fetch refusals are
//! never retried.

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use tracing::{info, warn};

use crate::command::{FetchProfile, SearchCriteria};
use crate::parser::FetchRecord;
use crate::session::{Selection, Session, SessionConfig};
use crate::types::{Flags, Label, ListedFolder, Mailbox, SpecialFolders, Uid, UidSet};
use crate::{Error, Result};

/// Backoff and attempt-cap policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay before the first reconnect.
    pub base_delay: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: u32,
    /// Cap on attempts for transport failures.
    pub max_attempts: u32,
    /// Stricter cap for server-side aborts (BYE): a server that is
    /// shedding load will not welcome a persistent client.
    pub abort_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2,
            max_attempts: 5,
            abort_attempts: 2,
        }
    }
}

impl RetryPolicy {
    /// The backoff delay before the given 1-based attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// The future shape retried operations are boxed into.
type OpFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a>>;

/// A session wrapper that transparently reconnects.
///
/// State restored on reconnect: authentication, resolved special folders,
/// and the last folder selection.
pub struct RetrySession {
    config: SessionConfig,
    policy: RetryPolicy,
    session: Option<Session>,
    last_selection: Option<Selection>,
    connects: u64,
}

impl RetrySession {
    /// Creates a supervisor; no connection is made until
    /// [`RetrySession::connect`].
    #[must_use]
    pub const fn new(config: SessionConfig, policy: RetryPolicy) -> Self {
        Self {
            config,
            policy,
            session: None,
            last_selection: None,
            connects: 0,
        }
    }

    /// Establishes the initial connection, retrying per policy.
    pub async fn connect(&mut self) -> Result<()> {
        self.retrying(|_session| Box::pin(async { Ok(()) })).await
    }

    /// How many times the underlying connection was re-established after
    /// the initial connect.
    #[must_use]
    pub const fn reconnections(&self) -> u64 {
        self.connects.saturating_sub(1)
    }

    /// Resolved special-purpose folders of the connected session.
    pub fn special_folders(&self) -> Result<&SpecialFolders> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::InvalidState("not connected".to_string()))?
            .special_folders()
    }

    /// Lists every folder visible to the account.
    pub async fn list_folders(&mut self) -> Result<Vec<ListedFolder>> {
        self.retrying(|session| Box::pin(async { session.list_folders().await }))
            .await
    }

    /// Selects a folder read-write and returns its message count.
    pub async fn select(&mut self, mailbox: &Mailbox) -> Result<u32> {
        self.last_selection = Some(Selection {
            mailbox: mailbox.clone(),
            read_only: false,
        });
        let mailbox = mailbox.clone();
        self.retrying(move |session| {
            let mailbox = mailbox.clone();
            Box::pin(async move { session.select(&mailbox).await })
        })
        .await
    }

    /// Selects a folder read-only and returns its message count.
    pub async fn examine(&mut self, mailbox: &Mailbox) -> Result<u32> {
        self.last_selection = Some(Selection {
            mailbox: mailbox.clone(),
            read_only: true,
        });
        let mailbox = mailbox.clone();
        self.retrying(move |session| {
            let mailbox = mailbox.clone();
            Box::pin(async move { session.examine(&mailbox).await })
        })
        .await
    }

    /// UID SEARCH in the selected folder.
    pub async fn uid_search(&mut self, criteria: &SearchCriteria) -> Result<Vec<Uid>> {
        let criteria = criteria.clone();
        self.retrying(move |session| {
            let criteria = criteria.clone();
            Box::pin(async move { session.uid_search(&criteria).await })
        })
        .await
    }

    /// UID FETCH in the selected folder.
    pub async fn uid_fetch(
        &mut self,
        set: &UidSet,
        profile: FetchProfile,
    ) -> Result<Vec<FetchRecord>> {
        let set = set.clone();
        self.retrying(move |session| {
            let set = set.clone();
            Box::pin(async move { session.uid_fetch(&set, profile).await })
        })
        .await
    }

    /// Attaches labels to messages.
    pub async fn store_labels(&mut self, set: &UidSet, labels: &[Label]) -> Result<()> {
        let set = set.clone();
        let labels = labels.to_vec();
        self.retrying(move |session| {
            let set = set.clone();
            let labels = labels.clone();
            Box::pin(async move { session.store_labels(&set, &labels).await })
        })
        .await
    }

    /// Creates a folder. One hierarchy level per call.
    pub async fn create_folder(&mut self, mailbox: &Mailbox) -> Result<()> {
        let mailbox = mailbox.clone();
        self.retrying(move |session| {
            let mailbox = mailbox.clone();
            Box::pin(async move { session.create_folder(&mailbox).await })
        })
        .await
    }

    /// Appends a message and returns the server-assigned UID when
    /// available.
    pub async fn append(
        &mut self,
        mailbox: &Mailbox,
        flags: &Flags,
        internal_date: Option<DateTime<FixedOffset>>,
        body: &[u8],
    ) -> Result<Option<Uid>> {
        let mailbox = mailbox.clone();
        let flags = flags.clone();
        let body = body.to_vec();
        self.retrying(move |session| {
            let mailbox = mailbox.clone();
            let flags = flags.clone();
            let body = body.clone();
            Box::pin(async move {
                session
                    .append(&mailbox, &flags, internal_date, &body)
                    .await
            })
        })
        .await
    }

    /// Keep-alive.
    pub async fn noop(&mut self) -> Result<()> {
        self.retrying(|session| Box::pin(async { session.noop().await }))
            .await
    }

    /// Logs out and drops the connection. Not retried: a failed goodbye
    /// changes nothing.
    pub async fn logout(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.logout().await?;
        }
        Ok(())
    }

    /// Drives one operation to completion through reconnects.
    async fn retrying<T, F>(&mut self, mut op: F) -> Result<T>
    where
        F: for<'a> FnMut(&'a mut Session) -> OpFuture<'a, T>,
    {
        let mut attempt: u32 = 0;
        let mut aborts: u32 = 0;

        loop {
            let result = match self.session.as_mut() {
                Some(session) => op(session).await,
                None => match self.reconnect().await {
                    Ok(()) => continue,
                    Err(e) => Err(e),
                },
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if error.is_auth() || error.is_per_item() {
                return Err(error);
            }
            if !error.is_transport() && !error.is_session_abort() {
                return Err(error);
            }

            if error.is_session_abort() {
                aborts += 1;
                if aborts >= self.policy.abort_attempts {
                    return Err(error);
                }
            }
            attempt += 1;
            if attempt >= self.policy.max_attempts {
                return Err(error);
            }

            self.session = None;
            let delay = self.policy.delay_for(attempt);
            warn!(
                error = %error,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "transient failure, reconnecting after backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Connects a fresh session and restores the last folder selection.
    async fn reconnect(&mut self) -> Result<()> {
        let mut session = Session::connect(&self.config).await?;

        if let Some(selection) = &self.last_selection {
            if selection.read_only {
                session.examine(&selection.mailbox).await?;
            } else {
                session.select(&selection.mailbox).await?;
            }
        }

        self.session = Some(session);
        self.connects += 1;
        if self.connects > 1 {
            info!(reconnections = self.reconnections(), "connection re-established");
        }
        Ok(())
    }
}
