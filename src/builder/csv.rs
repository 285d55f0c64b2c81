//! Field extraction for comma-separated rows, on raw bytes.
//!
//! A field may be wrapped in double quotes; inside quotes `""` is a literal
//! quote and commas do not separate fields. While skipping to a later column,
//! a quoted field only ends at a quote followed by a comma or end of line, so
//! a stray quote mid-field does not split it. The selected field itself ends
//! at its first lone quote, and an unterminated quoted field runs to end of
//! line.

use std::borrow::Cow;

fn is_line_end(b: Option<u8>) -> bool {
    matches!(b, None | Some(b'\n' | b'\r'))
}

/// C-locale `isspace`: includes vertical tab and form feed, excludes any
/// non-ASCII space.
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| !is_space(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| !is_space(b)).map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Skip the field starting at `pos`. Returns where the next field starts and
/// whether a separating comma was consumed.
fn skip_field(line: &[u8], mut pos: usize) -> (usize, bool) {
    if line.get(pos) == Some(&b'"') {
        pos += 1;
        while pos < line.len() {
            let next = line.get(pos + 1).copied();
            if line[pos] == b'"' {
                if next == Some(b',') || is_line_end(next) {
                    break;
                }
                if next == Some(b'"') {
                    pos += 2;
                    continue;
                }
            }
            pos += 1;
        }
        if line.get(pos) == Some(&b'"') {
            pos += 1;
        }
    } else {
        while pos < line.len() && line[pos] != b',' {
            pos += 1;
        }
    }

    if line.get(pos) == Some(&b',') {
        (pos + 1, true)
    } else {
        (pos, false)
    }
}

/// Contents of the field starting at `pos`, quotes removed. Unquoted fields
/// are borrowed.
fn extract_field(line: &[u8], pos: usize) -> Cow<'_, [u8]> {
    let rest = &line[pos.min(line.len())..];

    let Some(body) = rest.strip_prefix(b"\"") else {
        let end = rest
            .iter()
            .position(|&b| matches!(b, b',' | b'\n' | b'\r'))
            .unwrap_or(rest.len());
        return Cow::Borrowed(&rest[..end]);
    };

    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        if body[i] == b'"' {
            if body.get(i + 1) == Some(&b'"') {
                out.push(b'"');
                i += 2;
                continue;
            }
            break;
        }
        out.push(body[i]);
        i += 1;
    }
    Cow::Owned(out)
}

/// Field `idx` of `line`, whitespace-trimmed. `None` if the row ends before
/// reaching that column.
pub fn field(line: &[u8], idx: usize) -> Option<Vec<u8>> {
    let mut pos = 0;
    for _ in 0..idx {
        let (next, separated) = skip_field(line, pos);
        if !separated && next >= line.len() {
            return None;
        }
        pos = next;
    }
    Some(trim(&extract_field(line, pos)).to_vec())
}
