//! Error types for the IMAP layer.
//!
//! The retry supervisor and the orchestrators never inspect response text;
//! every failure subtype they care about is a dedicated variant, decided
//! here or at the parse boundary where the server response is first seen.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// A read or connect exceeded its bounded timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Protocol parsing error.
    #[error("Protocol error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Token refresh failed while (re)authenticating.
    #[error("OAuth error: {0}")]
    OAuth(#[from] mailvault_oauth::Error),

    /// Server returned NO response.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD response.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Server sent BYE (session aborted server-side).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// The server refused to hand over one or more messages in a FETCH.
    ///
    /// Gmail signals this with a NO whose text matches its "could not be
    /// fetched" family. It is a per-item failure: the caller quarantines or
    /// skips the offending item instead of retrying the connection.
    #[error("Message(s) could not be fetched: {0}")]
    CannotFetch(String),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// True for transport-level failures: retried with backoff and a full
    /// reconnect.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::InvalidDnsName(_) | Self::Timeout(_)
        )
    }

    /// True when the server aborted the session (BYE). Retried like a
    /// transport failure but with a stricter attempt cap.
    #[must_use]
    pub const fn is_session_abort(&self) -> bool {
        matches!(self, Self::Bye(_))
    }

    /// True for per-item protocol failures that must never be retried as
    /// connection problems.
    #[must_use]
    pub const fn is_per_item(&self) -> bool {
        matches!(self, Self::CannotFetch(_))
    }

    /// True for credential problems that no amount of reconnecting fixes.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::OAuth(_))
    }

    /// Classifies a tagged NO response at the boundary where it is first
    /// observed.
    ///
    /// Gmail's per-item fetch refusals all carry a "could not be fetched" /
    /// "cannot be fetched" text; everything else stays a plain NO.
    #[must_use]
    pub fn from_no_text(text: String) -> Self {
        let lower = text.to_ascii_lowercase();
        if lower.contains("could not be fetched") || lower.contains("cannot be fetched") {
            Self::CannotFetch(text)
        } else {
            Self::No(text)
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_text_classification() {
        let err = Error::from_no_text("Some messages could not be FETCHed (Failure)".into());
        assert!(err.is_per_item());

        let err = Error::from_no_text("[ALERT] quota exceeded".into());
        assert!(matches!(err, Error::No(_)));
    }

    #[test]
    fn transport_taxonomy() {
        let err = Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(err.is_transport());
        assert!(!err.is_session_abort());

        let bye = Error::Bye("server shed load".into());
        assert!(bye.is_session_abort());
        assert!(!bye.is_transport());
    }
}
