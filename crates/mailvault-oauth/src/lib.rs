//! # mailvault-oauth
//!
//! `OAuth2` bearer-token plumbing for Gmail IMAP sessions.
//!
//! The interactive grant (browser consent) is deliberately out of scope:
//! some external collaborator has already produced a refresh token. This
//! crate turns that refresh token into short-lived access tokens and
//! encodes them as SASL initial responses.
//!
//! ## Token refresh
//!
//! ```ignore
//! use mailvault_oauth::{RefreshConfig, Token};
//!
//! let refresh = RefreshConfig::gmail("client_id", "client_secret", "refresh_token");
//! let token: Token = refresh.refresh().await?;
//! assert!(token.is_valid());
//! ```
//!
//! ## SASL encoding
//!
//! ```ignore
//! use mailvault_oauth::sasl::xoauth2_response;
//!
//! let auth_string = xoauth2_response("user@gmail.com", &token.access_token);
//! // Send: AUTHENTICATE XOAUTH2 {auth_string}
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod sasl;
pub mod token;

pub use error::{Error, Result};
pub use token::{RefreshConfig, Token, TokenResponse};
