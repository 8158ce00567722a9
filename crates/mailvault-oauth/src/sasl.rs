//! SASL authentication mechanisms.
//!
//! Implements:
//! - PLAIN (RFC 4616) - Basic username/password authentication
//! - XOAUTH2 (Google proprietary) - `OAuth2` bearer authentication

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Generates PLAIN initial response (RFC 4616).
///
/// Format: `\0<username>\0<password>` (base64 encoded)
///
/// The PLAIN mechanism sends credentials as: authorization-id (empty),
/// authentication-id (username), and password, separated by NUL bytes.
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    // The first NUL is for the authorization identity (empty = same as auth identity)
    let auth_string = format!("\0{username}\0{password}");
    STANDARD.encode(auth_string.as_bytes())
}

/// Generates XOAUTH2 initial response (Google proprietary).
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`
///
/// # Example
///
/// ```
/// use mailvault_oauth::sasl::xoauth2_response;
///
/// let response = xoauth2_response("user@gmail.com", "ya29.a0...");
/// // Can be used with IMAP AUTHENTICATE XOAUTH2
/// ```
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    let auth_string = format!("user={user}\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}
