//! Server capabilities.

/// A server capability advertised in CAPABILITY data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// RFC 3501 baseline.
    Imap4Rev1,
    /// Gmail extensions: X-GM-MSGID, X-GM-THRID, X-GM-LABELS, X-GM-RAW.
    XGmExt1,
    /// XLIST folder listing with special-purpose attributes.
    Xlist,
    /// RFC 6154 SPECIAL-USE attributes on LIST.
    SpecialUse,
    /// RFC 4978 stream compression.
    CompressDeflate,
    /// RFC 4315 UIDPLUS (APPENDUID response codes).
    UidPlus,
    /// RFC 2177 IDLE.
    Idle,
    /// Supported SASL mechanism, e.g. `AUTH=XOAUTH2`.
    Auth(String),
    /// Anything else, preserved verbatim.
    Other(String),
}

impl Capability {
    /// Parses a capability atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "X-GM-EXT-1" => Self::XGmExt1,
            "XLIST" => Self::Xlist,
            "SPECIAL-USE" => Self::SpecialUse,
            "COMPRESS=DEFLATE" => Self::CompressDeflate,
            "UIDPLUS" => Self::UidPlus,
            "IDLE" => Self::Idle,
            _ => upper.strip_prefix("AUTH=").map_or_else(
                || Self::Other(s.to_string()),
                |mech| Self::Auth(mech.to_string()),
            ),
        }
    }
}
