//! Sans-I/O parser for the server response subset the archiver consumes.

#![allow(clippy::missing_errors_doc)]

mod fetch;
mod lexer;

pub use fetch::FetchRecord;
pub use lexer::{Lexer, Token};

use crate::types::{
    Capability, Flag, Flags, FolderAttribute, ListedFolder, SeqNum, Status, Uid,
};
use crate::{Error, Result};

/// A response code carried in brackets before the human-readable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// The user should see the text.
    Alert,
    /// Folder selected read-only.
    ReadOnly,
    /// Folder selected read-write.
    ReadWrite,
    /// Target folder does not exist but may be created.
    TryCreate,
    /// UIDVALIDITY of the selected folder.
    UidValidity(u32),
    /// Predicted next UID.
    UidNext(Uid),
    /// RFC 4315: the UID the server assigned to an appended message.
    AppendUid {
        /// UIDVALIDITY of the destination folder.
        validity: u32,
        /// Assigned UID.
        uid: Uid,
    },
    /// Capability list embedded in a status response.
    Capability(Vec<Capability>),
    /// Anything else, name preserved.
    Unknown(String),
}

/// An untagged server data response.
#[derive(Debug, Clone, PartialEq)]
pub enum UntaggedResponse {
    /// `* OK [code] text`
    Ok {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* NO text`
    No {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* BAD text`
    Bad {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* BYE text`: the server is dropping the connection.
    Bye {
        /// Human-readable text.
        text: String,
    },
    /// Server capabilities.
    Capability(Vec<Capability>),
    /// One LIST or XLIST entry.
    List(ListedFolder),
    /// UIDs matching a UID SEARCH.
    Search(Vec<Uid>),
    /// Message count of the selected folder.
    Exists(u32),
    /// Recent-message count.
    Recent(u32),
    /// A message was expunged.
    Expunge(SeqNum),
    /// Applicable flags of the selected folder.
    Flags(Flags),
    /// FETCH data for one message.
    Fetch {
        /// Transient sequence number within this selection.
        seq: SeqNum,
        /// Aggregated fetch items.
        record: FetchRecord,
    },
    /// Untagged data the archiver never requested, kept by keyword only.
    Other {
        /// The response keyword as sent.
        keyword: String,
    },
}

/// A parsed response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Tagged command completion.
    Tagged {
        /// The command tag.
        tag: String,
        /// Completion status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged server data.
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Optional text after `+`.
        text: Option<String>,
    },
}

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses a complete response (one line, with any inline literals
    /// already buffered).
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);

        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer),
            Token::Plus => Self::parse_continuation(&mut lexer),
            Token::Atom(tag) => Self::parse_tagged(&mut lexer, tag),
            token => Err(Error::Parse {
                position: 0,
                message: format!("Expected *, +, or tag, got {token:?}"),
            }),
        }
    }

    fn parse_tagged(lexer: &mut Lexer<'_>, tag: &str) -> Result<Response> {
        lexer.expect_space()?;

        let atom = lexer.read_atom_string()?;
        let status = Status::parse(atom).ok_or_else(|| Error::Parse {
            position: lexer.position(),
            message: format!("Invalid status: {atom}"),
        })?;
        lexer.expect_space()?;

        let (code, text) = parse_resp_text(lexer)?;

        Ok(Response::Tagged {
            tag: tag.to_string(),
            status,
            code,
            text,
        })
    }

    fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<Response> {
        lexer.expect_space()?;

        match lexer.next_token()? {
            Token::Atom(s) => {
                let upper = s.to_uppercase();
                match upper.as_str() {
                    "OK" => {
                        lexer.expect_space()?;
                        let (code, text) = parse_resp_text(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Ok { code, text }))
                    }
                    "NO" => {
                        lexer.expect_space()?;
                        let (code, text) = parse_resp_text(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::No { code, text }))
                    }
                    "BAD" => {
                        lexer.expect_space()?;
                        let (code, text) = parse_resp_text(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Bad { code, text }))
                    }
                    "BYE" => {
                        lexer.expect_space()?;
                        let (_, text) = parse_resp_text(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Bye { text }))
                    }
                    "CAPABILITY" => {
                        let caps = parse_capability_data(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Capability(caps)))
                    }
                    "FLAGS" => {
                        lexer.expect_space()?;
                        let flags = parse_flag_list(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Flags(flags)))
                    }
                    "LIST" | "XLIST" => {
                        lexer.expect_space()?;
                        let folder = parse_list_entry(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::List(folder)))
                    }
                    "SEARCH" => {
                        let uids = parse_search_data(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Search(uids)))
                    }
                    _ => {
                        // Servers volunteer data we never asked for
                        // (ENABLED, STATUS, ...); consume the line.
                        read_text_until_crlf(lexer);
                        Ok(Response::Untagged(UntaggedResponse::Other {
                            keyword: s.to_string(),
                        }))
                    }
                }
            }
            Token::Number(n) => {
                lexer.expect_space()?;
                let keyword = lexer.read_atom_string()?;
                let n32 = u32::try_from(n).map_err(|_| Error::Parse {
                    position: lexer.position(),
                    message: format!("Message count out of range: {n}"),
                })?;

                match keyword.to_uppercase().as_str() {
                    "EXISTS" => Ok(Response::Untagged(UntaggedResponse::Exists(n32))),
                    "RECENT" => Ok(Response::Untagged(UntaggedResponse::Recent(n32))),
                    "EXPUNGE" => {
                        let seq = SeqNum::new(n32).ok_or_else(|| Error::Parse {
                            position: lexer.position(),
                            message: "Invalid sequence number 0".to_string(),
                        })?;
                        Ok(Response::Untagged(UntaggedResponse::Expunge(seq)))
                    }
                    "FETCH" => {
                        let seq = SeqNum::new(n32).ok_or_else(|| Error::Parse {
                            position: lexer.position(),
                            message: "Invalid sequence number 0".to_string(),
                        })?;
                        lexer.expect_space()?;
                        let record = fetch::parse_fetch_record(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Fetch { seq, record }))
                    }
                    _ => {
                        read_text_until_crlf(lexer);
                        Ok(Response::Untagged(UntaggedResponse::Other {
                            keyword: keyword.to_string(),
                        }))
                    }
                }
            }
            token => Err(Error::Parse {
                position: lexer.position(),
                message: format!("Unexpected token in untagged response: {token:?}"),
            }),
        }
    }

    fn parse_continuation(lexer: &mut Lexer<'_>) -> Result<Response> {
        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }

        let text = read_text_until_crlf(lexer);

        Ok(Response::Continuation {
            text: if text.is_empty() { None } else { Some(text) },
        })
    }
}

/// Parses response text with its optional bracketed code.
fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
    let code = if lexer.peek() == Some(b'[') {
        Some(parse_response_code(lexer)?)
    } else {
        None
    };

    if lexer.peek() == Some(b' ') {
        lexer.advance();
    }

    Ok((code, read_text_until_crlf(lexer)))
}

fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;

    let atom = lexer.read_atom_string()?;
    let upper = atom.to_uppercase();

    let code = match upper.as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let n = read_u32(lexer)?;
            ResponseCode::UidValidity(n)
        }
        "UIDNEXT" => {
            lexer.expect_space()?;
            let uid = read_uid(lexer)?;
            ResponseCode::UidNext(uid)
        }
        "APPENDUID" => {
            lexer.expect_space()?;
            let validity = read_u32(lexer)?;
            lexer.expect_space()?;
            let uid = read_uid(lexer)?;
            ResponseCode::AppendUid { validity, uid }
        }
        "CAPABILITY" => {
            let caps = parse_capability_data(lexer)?;
            ResponseCode::Capability(caps)
        }
        _ => {
            while lexer.peek() != Some(b']') && !lexer.is_eof() {
                lexer.advance();
            }
            ResponseCode::Unknown(atom.to_string())
        }
    };

    // Tolerate trailing material inside unrecognized code bodies.
    while lexer.peek() != Some(b']') && !lexer.is_eof() {
        lexer.advance();
    }
    lexer.expect(Token::RBracket)?;

    Ok(code)
}

fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        if let Token::Atom(s) = lexer.next_token()? {
            caps.push(Capability::parse(s));
        }
    }

    Ok(caps)
}

/// Parses a flag list `(\Seen \Flagged ...)`.
pub(crate) fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(Token::LParen)?;

    let mut flags = Flags::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => flags.insert(Flag::parse(s)),
            Token::Space => continue,
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in flag list: {token:?}"),
                });
            }
        }
    }

    Ok(flags)
}

fn parse_list_entry(lexer: &mut Lexer<'_>) -> Result<ListedFolder> {
    lexer.expect(Token::LParen)?;
    let mut attributes = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => attributes.push(FolderAttribute::parse(s)),
            Token::Space => continue,
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in LIST attributes: {token:?}"),
                });
            }
        }
    }

    lexer.expect_space()?;

    let delimiter = match lexer.next_token()? {
        Token::Nil => None,
        Token::QuotedString(s) => s.chars().next(),
        token => {
            return Err(Error::Parse {
                position: lexer.position(),
                message: format!("Expected delimiter, got {token:?}"),
            });
        }
    };

    lexer.expect_space()?;
    let name = lexer.read_astring()?;

    Ok(ListedFolder {
        attributes,
        delimiter,
        name,
    })
}

/// Parses the number list of a UID SEARCH response.
fn parse_search_data(lexer: &mut Lexer<'_>) -> Result<Vec<Uid>> {
    let mut uids = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        if let Token::Number(n) = lexer.next_token()?
            && let Some(uid) = u32::try_from(n).ok().and_then(Uid::new)
        {
            uids.push(uid);
        }
    }

    Ok(uids)
}

fn read_u32(lexer: &mut Lexer<'_>) -> Result<u32> {
    let n = lexer.read_number()?;
    u32::try_from(n).map_err(|_| Error::Parse {
        position: lexer.position(),
        message: format!("Number out of range: {n}"),
    })
}

fn read_uid(lexer: &mut Lexer<'_>) -> Result<Uid> {
    let n = read_u32(lexer)?;
    Uid::new(n).ok_or_else(|| Error::Parse {
        position: lexer.position(),
        message: "Invalid UID 0".to_string(),
    })
}

fn read_text_until_crlf(lexer: &mut Lexer<'_>) -> String {
    let remaining = lexer.remaining();

    let end = remaining
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(remaining.len());

    lexer.skip(end);
    if lexer.peek() == Some(b'\r') {
        lexer.skip(2);
    }

    String::from_utf8_lossy(&remaining[..end]).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tagged_ok() {
        let response = ResponseParser::parse(b"A0003 OK SELECT completed\r\n").unwrap();
        match response {
            Response::Tagged {
                tag, status, text, ..
            } => {
                assert_eq!(tag, "A0003");
                assert_eq!(status, Status::Ok);
                assert_eq!(text, "SELECT completed");
            }
            other => panic!("Expected tagged response, got {other:?}"),
        }
    }

    #[test]
    fn capability_with_gmail_extensions() {
        let response = ResponseParser::parse(
            b"* CAPABILITY IMAP4rev1 X-GM-EXT-1 XLIST COMPRESS=DEFLATE AUTH=XOAUTH2\r\n",
        )
        .unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Capability(caps)) => {
                assert!(caps.contains(&Capability::XGmExt1));
                assert!(caps.contains(&Capability::CompressDeflate));
                assert!(caps.contains(&Capability::Auth("XOAUTH2".into())));
            }
            other => panic!("Expected capability, got {other:?}"),
        }
    }

    #[test]
    fn xlist_entry_with_all_mail_attribute() {
        let response = ResponseParser::parse(
            b"* XLIST (\\HasNoChildren \\AllMail) \"/\" \"[Gmail]/All Mail\"\r\n",
        )
        .unwrap();
        match response {
            Response::Untagged(UntaggedResponse::List(folder)) => {
                assert!(folder.has(&FolderAttribute::AllMail));
                assert_eq!(folder.delimiter, Some('/'));
                assert_eq!(folder.name, "[Gmail]/All Mail");
            }
            other => panic!("Expected list entry, got {other:?}"),
        }
    }

    #[test]
    fn uid_search_results() {
        let response = ResponseParser::parse(b"* SEARCH 100 101 4213\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Search(uids)) => {
                let values: Vec<u32> = uids.iter().map(|u| u.get()).collect();
                assert_eq!(values, vec![100, 101, 4213]);
            }
            other => panic!("Expected search, got {other:?}"),
        }
    }

    #[test]
    fn append_uid_response_code() {
        let response =
            ResponseParser::parse(b"A0009 OK [APPENDUID 38505 3955] APPEND completed\r\n").unwrap();
        match response {
            Response::Tagged {
                code: Some(ResponseCode::AppendUid { validity, uid }),
                ..
            } => {
                assert_eq!(validity, 38505);
                assert_eq!(uid.get(), 3955);
            }
            other => panic!("Expected APPENDUID, got {other:?}"),
        }
    }

    #[test]
    fn bye_is_surfaced() {
        let response =
            ResponseParser::parse(b"* BYE System Error. Please try again later\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Bye { text }) => {
                assert!(text.contains("System Error"));
            }
            other => panic!("Expected BYE, got {other:?}"),
        }
    }

    #[test]
    fn fetch_with_literal_body() {
        let response =
            ResponseParser::parse(b"* 12 FETCH (UID 4213 BODY[] {5}\r\nhello)\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Fetch { seq, record }) => {
                assert_eq!(seq.get(), 12);
                assert_eq!(record.uid.unwrap().get(), 4213);
                assert_eq!(record.body.as_deref(), Some(&b"hello"[..]));
            }
            other => panic!("Expected FETCH, got {other:?}"),
        }
    }

    #[test]
    fn continuation_request() {
        let response = ResponseParser::parse(b"+ go ahead\r\n").unwrap();
        assert_eq!(
            response,
            Response::Continuation {
                text: Some("go ahead".into())
            }
        );
    }

    #[test]
    fn exists_count() {
        let response = ResponseParser::parse(b"* 23 EXISTS\r\n").unwrap();
        assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(23)));
    }

    #[test]
    fn unknown_untagged_data_is_skipped() {
        let response = ResponseParser::parse(b"* ENABLED CONDSTORE\r\n").unwrap();
        assert_eq!(
            response,
            Response::Untagged(UntaggedResponse::Other {
                keyword: "ENABLED".into()
            })
        );

        let response = ResponseParser::parse(b"* 7 MODSEQ (12345)\r\n").unwrap();
        assert_eq!(
            response,
            Response::Untagged(UntaggedResponse::Other {
                keyword: "MODSEQ".into()
            })
        );
    }
}
