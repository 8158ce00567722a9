//! One authenticated connection to the mail server.
//!
//! A [`Session`] owns the framed stream, performs the login handshake
//! (including XOAUTH2 and COMPRESS=DEFLATE negotiation), resolves the
//! account's special-purpose folders, and exposes the protocol operations
//! the archiver uses. It does not retry anything: supervision lives in
//! [`crate::RetrySession`].

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, trace};

use mailvault_oauth::{RefreshConfig, sasl};

use crate::command::{Command, FetchProfile, SearchCriteria, TagGenerator};
use crate::connection::{
    DEFAULT_READ_TIMEOUT, FramedStream, ImapStream, ResponseAccumulator, connect_tls,
};
use crate::parser::{FetchRecord, Response, ResponseCode, ResponseParser, UntaggedResponse};
use crate::types::{
    Capability, Flags, Label, ListedFolder, Mailbox, SpecialFolders, Status, Uid, UidSet,
};
use crate::{Error, Result};

use tokio::io::{AsyncRead, AsyncWrite};

/// How the session proves who it is.
#[derive(Clone)]
pub enum Credential {
    /// Plain LOGIN with a password or app password.
    Password(String),
    /// XOAUTH2 with a refresh-token config; an access token is minted on
    /// every (re)connect.
    OAuth(RefreshConfig),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Credential::Password(..)"),
            Self::OAuth(_) => f.write_str("Credential::OAuth(..)"),
        }
    }
}

/// Configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server hostname.
    pub host: String,
    /// Server port (993 for TLS).
    pub port: u16,
    /// Account name.
    pub username: String,
    /// Authentication material.
    pub credential: Credential,
    /// Bound on any single response read.
    pub read_timeout: Duration,
    /// Negotiate COMPRESS=DEFLATE when the server offers it.
    pub compress: bool,
}

impl SessionConfig {
    /// Creates a configuration for the given server and account.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            credential: Credential::Password(String::new()),
            read_timeout: DEFAULT_READ_TIMEOUT,
            compress: true,
        }
    }

    /// Sets the credential.
    #[must_use]
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Enables or disables DEFLATE negotiation.
    #[must_use]
    pub const fn compress(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }
}

/// The folder currently selected, remembered so a reconnect can restore it.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Selected folder.
    pub mailbox: Mailbox,
    /// True if selected with EXAMINE.
    pub read_only: bool,
}

/// One authenticated connection with resolved special folders.
pub struct Session<S = ImapStream> {
    framed: FramedStream<S>,
    tags: TagGenerator,
    capabilities: Vec<Capability>,
    special: Option<SpecialFolders>,
    selection: Option<Selection>,
}

impl Session<ImapStream> {
    /// Connects, authenticates, negotiates compression, and resolves the
    /// special-purpose folders.
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let stream = connect_tls(&config.host, config.port).await?;
        let mut session = Self::from_framed(FramedStream::with_timeout(
            stream,
            config.read_timeout,
        ));

        session.read_greeting().await?;
        session.authenticate(config).await?;
        session.load_capabilities().await?;

        if config.compress && session.has_capability(&Capability::CompressDeflate) {
            session.run(&Command::CompressDeflate).await?;
            session = session.with_deflate(config.read_timeout)?;
            debug!("DEFLATE stream compression active");
        }

        session.resolve_folders().await?;

        debug!(host = %config.host, user = %config.username, "session established");
        Ok(session)
    }

    /// Re-frames the session over a DEFLATE layer after a successful
    /// COMPRESS=DEFLATE completion.
    fn with_deflate(self, read_timeout: Duration) -> Result<Self> {
        let Self {
            framed,
            tags,
            capabilities,
            special,
            selection,
        } = self;
        let stream = framed.into_inner().enable_deflate()?;
        Ok(Self {
            framed: FramedStream::with_timeout(stream, read_timeout),
            tags,
            capabilities,
            special,
            selection,
        })
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already-connected framed stream. The caller still has to
    /// drive the greeting/login handshake.
    pub(crate) fn from_framed(framed: FramedStream<S>) -> Self {
        Self {
            framed,
            tags: TagGenerator::default(),
            capabilities: Vec::new(),
            special: None,
            selection: None,
        }
    }

    /// Server capabilities from the last CAPABILITY exchange.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// True if the server advertised the capability.
    #[must_use]
    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Resolved special-purpose folders.
    pub fn special_folders(&self) -> Result<&SpecialFolders> {
        self.special
            .as_ref()
            .ok_or_else(|| Error::InvalidState("special folders not resolved".to_string()))
    }

    /// The current folder selection, if any.
    #[must_use]
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Reads and validates the server greeting.
    pub(crate) async fn read_greeting(&mut self) -> Result<()> {
        let raw = self.framed.read_response().await?;
        match ResponseParser::parse(&raw)? {
            Response::Untagged(UntaggedResponse::Ok { .. }) => Ok(()),
            Response::Untagged(UntaggedResponse::Bye { text }) => Err(Error::Bye(text)),
            other => Err(Error::Protocol(format!(
                "unexpected greeting: {other:?}"
            ))),
        }
    }

    /// Authenticates with the configured credential.
    pub(crate) async fn authenticate(&mut self, config: &SessionConfig) -> Result<()> {
        match &config.credential {
            Credential::Password(password) => {
                let command = Command::Login {
                    username: config.username.clone(),
                    password: password.clone(),
                };
                self.run(&command).await.map_err(auth_failure)?;
            }
            Credential::OAuth(refresh) => {
                let token = refresh.refresh().await?;
                let initial = sasl::xoauth2_response(&config.username, &token.access_token);
                self.authenticate_xoauth2(&initial).await?;
            }
        }
        debug!(user = %config.username, "authenticated");
        Ok(())
    }

    /// Runs the XOAUTH2 exchange.
    ///
    /// On failure the server sends a continuation carrying an error blob
    /// and expects an empty line before it issues the tagged NO.
    async fn authenticate_xoauth2(&mut self, initial: &str) -> Result<()> {
        let tag = self.tags.next();
        let command = Command::AuthenticateXOauth2 {
            initial: initial.to_string(),
        };
        self.framed.write_command(&command.serialize(&tag)).await?;

        loop {
            let raw = self.framed.read_response().await?;
            match ResponseParser::parse(&raw)? {
                Response::Continuation { .. } => {
                    self.framed.write_raw(b"\r\n").await?;
                }
                Response::Tagged { tag: t, status, text, .. } if t == tag => {
                    return match status {
                        Status::Ok => Ok(()),
                        _ => Err(Error::Auth(text)),
                    };
                }
                Response::Untagged(UntaggedResponse::Bye { text }) => {
                    return Err(Error::Bye(text));
                }
                _ => {}
            }
        }
    }

    /// Fetches and stores the capability list.
    pub(crate) async fn load_capabilities(&mut self) -> Result<()> {
        let responses = self.run(&Command::Capability).await?;
        for response in responses {
            if let Response::Untagged(UntaggedResponse::Capability(caps)) = response {
                self.capabilities = caps;
            }
        }
        Ok(())
    }

    /// Lists all folders, preferring XLIST for its special-purpose
    /// attributes.
    pub async fn list_folders(&mut self) -> Result<Vec<ListedFolder>> {
        let command = if self.has_capability(&Capability::Xlist) {
            Command::Xlist {
                reference: String::new(),
                pattern: "*".to_string(),
            }
        } else {
            Command::List {
                reference: String::new(),
                pattern: "*".to_string(),
            }
        };

        let responses = self.run(&command).await?;
        Ok(responses
            .into_iter()
            .filter_map(|r| match r {
                Response::Untagged(UntaggedResponse::List(folder)) => Some(folder),
                _ => None,
            })
            .collect())
    }

    /// Resolves the special-purpose folders from the folder listing.
    pub(crate) async fn resolve_folders(&mut self) -> Result<()> {
        let folders = self.list_folders().await?;
        let special = SpecialFolders::resolve(&folders).ok_or_else(|| {
            Error::Protocol("could not resolve all-mail and drafts folders".to_string())
        })?;
        trace!(all_mail = %special.all_mail, drafts = %special.drafts, "resolved folders");
        self.special = Some(special);
        Ok(())
    }

    /// Selects a folder read-write and returns its message count.
    pub async fn select(&mut self, mailbox: &Mailbox) -> Result<u32> {
        self.select_inner(mailbox, false).await
    }

    /// Selects a folder read-only and returns its message count.
    pub async fn examine(&mut self, mailbox: &Mailbox) -> Result<u32> {
        self.select_inner(mailbox, true).await
    }

    async fn select_inner(&mut self, mailbox: &Mailbox, read_only: bool) -> Result<u32> {
        let command = if read_only {
            Command::Examine {
                mailbox: mailbox.clone(),
            }
        } else {
            Command::Select {
                mailbox: mailbox.clone(),
            }
        };

        let responses = self.run(&command).await?;
        self.selection = Some(Selection {
            mailbox: mailbox.clone(),
            read_only,
        });

        let exists = responses
            .iter()
            .find_map(|r| match r {
                Response::Untagged(UntaggedResponse::Exists(n)) => Some(*n),
                _ => None,
            })
            .unwrap_or(0);
        Ok(exists)
    }

    /// UID SEARCH in the selected folder.
    pub async fn uid_search(&mut self, criteria: &SearchCriteria) -> Result<Vec<Uid>> {
        let responses = self
            .run(&Command::UidSearch {
                criteria: criteria.clone(),
            })
            .await?;

        let mut uids = Vec::new();
        for response in responses {
            if let Response::Untagged(UntaggedResponse::Search(batch)) = response {
                uids.extend(batch);
            }
        }
        uids.sort_unstable();
        Ok(uids)
    }

    /// UID FETCH in the selected folder.
    pub async fn uid_fetch(
        &mut self,
        set: &UidSet,
        profile: FetchProfile,
    ) -> Result<Vec<FetchRecord>> {
        let responses = self
            .run(&Command::UidFetch {
                set: set.clone(),
                profile,
            })
            .await?;

        Ok(responses
            .into_iter()
            .filter_map(|r| match r {
                Response::Untagged(UntaggedResponse::Fetch { record, .. }) => Some(record),
                _ => None,
            })
            .collect())
    }

    /// Attaches labels to messages via UID STORE +X-GM-LABELS.
    pub async fn store_labels(&mut self, set: &UidSet, labels: &[Label]) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        self.run(&Command::UidStoreAddLabels {
            set: set.clone(),
            labels: labels.to_vec(),
        })
        .await?;
        Ok(())
    }

    /// Creates a folder. One hierarchy level per call.
    pub async fn create_folder(&mut self, mailbox: &Mailbox) -> Result<()> {
        self.run(&Command::Create {
            mailbox: mailbox.clone(),
        })
        .await?;
        Ok(())
    }

    /// Appends a message, preserving flags and the original INTERNALDATE.
    ///
    /// Returns the UID the server assigned when it advertises UIDPLUS,
    /// `None` otherwise.
    pub async fn append(
        &mut self,
        mailbox: &Mailbox,
        flags: &Flags,
        internal_date: Option<DateTime<FixedOffset>>,
        body: &[u8],
    ) -> Result<Option<Uid>> {
        let tag = self.tags.next();
        let command = Command::Append {
            mailbox: mailbox.clone(),
            flags: flags.clone(),
            internal_date,
            literal_len: body.len(),
        };
        self.framed.write_command(&command.serialize(&tag)).await?;

        // The literal may only follow the server's continuation.
        let raw = self.framed.read_response().await?;
        match ResponseParser::parse(&raw)? {
            Response::Continuation { .. } => {}
            Response::Untagged(UntaggedResponse::Bye { text }) => return Err(Error::Bye(text)),
            Response::Tagged { status, text, .. } if status == Status::No => {
                return Err(Error::from_no_text(text));
            }
            Response::Tagged { text, .. } => return Err(Error::Bad(text)),
            other => {
                return Err(Error::Protocol(format!(
                    "expected continuation after APPEND, got {other:?}"
                )));
            }
        }

        self.framed.write_raw(body).await?;
        self.framed.write_raw(b"\r\n").await?;

        let responses = self.collect_replies(&tag).await?;
        Ok(responses.iter().find_map(|r| match r {
            Response::Tagged {
                code: Some(ResponseCode::AppendUid { uid, .. }),
                ..
            } => Some(*uid),
            _ => None,
        }))
    }

    /// Keep-alive.
    pub async fn noop(&mut self) -> Result<()> {
        self.run(&Command::Noop).await?;
        Ok(())
    }

    /// Logs out gracefully. A BYE-terminated exchange counts as success.
    pub async fn logout(&mut self) -> Result<()> {
        match self.run(&Command::Logout).await {
            Ok(_) | Err(Error::Bye(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Serializes a command, sends it, and collects responses through the
    /// tagged completion.
    pub(crate) async fn run(&mut self, command: &Command) -> Result<Vec<Response>> {
        let tag = self.tags.next();
        self.framed.write_command(&command.serialize(&tag)).await?;
        self.collect_replies(&tag).await
    }

    async fn collect_replies(&mut self, tag: &str) -> Result<Vec<Response>> {
        let raw = ResponseAccumulator::new(tag)
            .read_until_tagged(&mut self.framed)
            .await?;

        let mut responses = Vec::with_capacity(raw.len());
        for line in &raw {
            responses.push(ResponseParser::parse(line)?);
        }

        check_completion(tag, &responses)?;
        Ok(responses)
    }
}

/// Validates the tagged completion of an exchange.
///
/// NO responses pass through [`Error::from_no_text`] so per-item fetch
/// refusals keep their identity; a BYE with no completion means the server
/// aborted the session.
fn check_completion(tag: &str, responses: &[Response]) -> Result<()> {
    for response in responses {
        if let Response::Tagged {
            tag: t,
            status,
            text,
            ..
        } = response
            && t == tag
        {
            return match status {
                Status::Ok => Ok(()),
                Status::No => Err(Error::from_no_text(text.clone())),
                Status::Bad => Err(Error::Bad(text.clone())),
                Status::Bye | Status::PreAuth => {
                    Err(Error::Protocol(format!("unexpected status: {status:?}")))
                }
            };
        }
    }

    for response in responses {
        if let Response::Untagged(UntaggedResponse::Bye { text }) = response {
            return Err(Error::Bye(text.clone()));
        }
    }

    Err(Error::Protocol("missing tagged completion".to_string()))
}

/// Maps a failed LOGIN completion to an auth error.
fn auth_failure(error: Error) -> Error {
    match error {
        Error::No(text) | Error::Bad(text) | Error::CannotFetch(text) => Error::Auth(text),
        other => other,
    }
}
