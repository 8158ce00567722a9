//! FETCH response parsing.

use chrono::{DateTime, FixedOffset};

use crate::parser::lexer::{Lexer, Token};
use crate::types::{Flags, Label, ThreadId, Uid};
use crate::{Error, Result};

use super::parse_flag_list;

/// One message's worth of FETCH data, aggregated across the items the
/// server chose to return.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRecord {
    /// UID, when the UID item was requested.
    pub uid: Option<Uid>,
    /// Conversation thread id (X-GM-THRID).
    pub thread_id: Option<ThreadId>,
    /// Labels attached to the message (X-GM-LABELS).
    pub labels: Vec<Label>,
    /// Message flags.
    pub flags: Flags,
    /// Server-assigned arrival timestamp.
    pub internal_date: Option<DateTime<FixedOffset>>,
    /// Raw header-field bytes from a HEADER.FIELDS section.
    pub header: Option<Vec<u8>>,
    /// Full raw message bytes from an empty BODY[] section.
    pub body: Option<Vec<u8>>,
}

/// Parses the parenthesized item list of a FETCH response into a record.
pub fn parse_fetch_record(lexer: &mut Lexer<'_>) -> Result<FetchRecord> {
    lexer.expect(Token::LParen)?;

    let mut record = FetchRecord::default();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(name) => {
                let upper = name.to_uppercase();
                match upper.as_str() {
                    "UID" => {
                        lexer.expect_space()?;
                        let n = lexer.read_number()?;
                        let uid = u32::try_from(n)
                            .ok()
                            .and_then(Uid::new)
                            .ok_or_else(|| Error::Parse {
                                position: lexer.position(),
                                message: format!("invalid UID value: {n}"),
                            })?;
                        record.uid = Some(uid);
                    }
                    "X-GM-THRID" => {
                        lexer.expect_space()?;
                        record.thread_id = Some(ThreadId::new(lexer.read_number()?));
                    }
                    "X-GM-LABELS" => {
                        lexer.expect_space()?;
                        record.labels = parse_label_list(lexer)?;
                    }
                    "FLAGS" => {
                        lexer.expect_space()?;
                        record.flags = parse_flag_list(lexer)?;
                    }
                    "INTERNALDATE" => {
                        lexer.expect_space()?;
                        if let Token::QuotedString(date) = lexer.next_token()? {
                            record.internal_date = Some(parse_internal_date(&date).map_err(
                                |()| Error::Parse {
                                    position: lexer.position(),
                                    message: format!("invalid INTERNALDATE: {date}"),
                                },
                            )?);
                        }
                    }
                    "BODY" | "BODY.PEEK" | "RFC822" => {
                        let section = parse_body_section(lexer)?;

                        lexer.expect_space()?;
                        let data = match lexer.next_token()? {
                            Token::Literal(d) => Some(d),
                            Token::QuotedString(s) => Some(s.into_bytes()),
                            _ => None,
                        };

                        if section.as_deref().is_some_and(|s| s.starts_with("HEADER")) {
                            record.header = data;
                        } else {
                            record.body = data;
                        }
                    }
                    _ => skip_fetch_item(lexer),
                }
            }
            _ => continue,
        }
    }

    Ok(record)
}

/// Parses an X-GM-LABELS value list. Entries can be backslash atoms,
/// quoted strings, or literals.
fn parse_label_list(lexer: &mut Lexer<'_>) -> Result<Vec<Label>> {
    lexer.expect(Token::LParen)?;

    let mut labels = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(s) => labels.push(Label::new(s)),
            Token::QuotedString(s) => labels.push(Label::new(s)),
            Token::Literal(data) => {
                let s = String::from_utf8(data).map_err(|_| Error::Parse {
                    position: lexer.position(),
                    message: "invalid UTF-8 in label literal".to_string(),
                })?;
                labels.push(Label::new(s));
            }
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in label list: {token:?}"),
                });
            }
        }
    }

    Ok(labels)
}

/// Consumes an optional `[section]` after a BODY item and returns the
/// section text.
fn parse_body_section(lexer: &mut Lexer<'_>) -> Result<Option<String>> {
    if lexer.peek() != Some(b'[') {
        return Ok(None);
    }
    lexer.advance();

    let mut section = String::new();
    loop {
        match lexer.peek() {
            Some(b']') => {
                lexer.advance();
                break;
            }
            Some(b) => {
                section.push(b as char);
                lexer.advance();
            }
            None => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: "unterminated BODY section".to_string(),
                });
            }
        }
    }

    Ok(Some(section))
}

/// Parses an RFC 3501 INTERNALDATE value, e.g. `01-Mar-2021 10:20:30 +0000`.
///
/// The day may be space-padded to two characters.
fn parse_internal_date(s: &str) -> std::result::Result<DateTime<FixedOffset>, ()> {
    DateTime::parse_from_str(s.trim_start(), "%d-%b-%Y %H:%M:%S %z")
        .or_else(|_| DateTime::parse_from_str(s.trim_start(), "%e-%b-%Y %H:%M:%S %z"))
        .map_err(|_| ())
}

/// Skips an unrecognized fetch item value, balancing parentheses.
fn skip_fetch_item(lexer: &mut Lexer<'_>) {
    if lexer.peek() == Some(b' ') {
        lexer.advance();
    }

    let mut paren_depth = 0;

    loop {
        match lexer.peek() {
            Some(b'(') => {
                paren_depth += 1;
                lexer.advance();
            }
            Some(b')') => {
                if paren_depth == 0 {
                    break;
                }
                paren_depth -= 1;
                lexer.advance();
            }
            Some(b' ') if paren_depth == 0 => break,
            Some(_) => {
                lexer.advance();
            }
            None => break,
        }
    }
}
