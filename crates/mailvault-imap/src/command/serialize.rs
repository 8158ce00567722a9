//! Low-level wire encoding helpers.

use crate::types::Label;

/// True if the byte may appear in a bare atom.
fn atom_safe(b: u8) -> bool {
    !matches!(
        b,
        b'(' | b')' | b'{' | b'}' | b'%' | b'*' | b'"' | b'\\' | 0..=0x1f | 0x7f | b' '
    )
}

/// Writes an astring: bare when atom-safe, quoted otherwise.
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if !s.is_empty() && s.bytes().all(atom_safe) {
        buf.extend_from_slice(s.as_bytes());
        return;
    }
    buf.push(b'"');
    for b in s.bytes() {
        if b == b'"' || b == b'\\' {
            buf.push(b'\\');
        }
        buf.push(b);
    }
    buf.push(b'"');
}

/// Writes a label value for X-GM-LABELS.
///
/// System labels are backslash atoms and must go out unquoted; quoting
/// them would make the server treat them as user labels.
pub fn write_label(buf: &mut Vec<u8>, label: &Label) {
    if label.is_system() {
        buf.extend_from_slice(label.as_str().as_bytes());
    } else {
        buf.push(b'"');
        for b in label.as_str().bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn astring(s: &str) -> String {
        let mut buf = Vec::new();
        write_astring(&mut buf, s);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn bare_atom_stays_bare() {
        assert_eq!(astring("INBOX"), "INBOX");
    }

    #[test]
    fn spaces_force_quoting() {
        assert_eq!(astring("[Gmail]/All Mail"), "\"[Gmail]/All Mail\"");
    }

    #[test]
    fn embedded_quotes_are_escaped() {
        assert_eq!(astring("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn empty_string_is_quoted() {
        assert_eq!(astring(""), "\"\"");
    }
}
