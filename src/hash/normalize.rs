//! Key normalization applied before hashing.
//!
//! ASCII letters are lower-cased, digits pass through, whitespace runs
//! collapse to one interior space, and everything else is dropped, except the
//! two-byte UTF-8 forms of á é í ó ú ñ (either case) which fold to their
//! unaccented ASCII letter.

/// Fold the second byte of a `0xC3 xx` sequence to its unaccented letter.
fn fold_latin1(second: u8) -> Option<u8> {
    match second {
        0xA1 | 0x81 => Some(b'a'), // á Á
        0xA9 | 0x89 => Some(b'e'), // é É
        0xAD | 0x8D => Some(b'i'), // í Í
        0xB3 | 0x93 => Some(b'o'), // ó Ó
        0xBA | 0x9A => Some(b'u'), // ú Ú
        0xB1 | 0x91 => Some(b'n'), // ñ Ñ
        _ => None,
    }
}

fn is_ascii_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

/// Normalize `input` for hashing. Never mutates its input. Bytes outside the
/// kept set are dropped, so non-UTF-8 input still yields ASCII output.
pub fn normalize<K: AsRef<[u8]> + ?Sized>(input: &K) -> String {
    let bytes = input.as_ref();
    let mut out = String::with_capacity(bytes.len());
    let mut pending_space = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let folded = if is_ascii_space(b) {
            pending_space = true;
            None
        } else if b.is_ascii_alphabetic() {
            Some(b.to_ascii_lowercase())
        } else if b.is_ascii_digit() {
            Some(b)
        } else if b == 0xC3 && i + 1 < bytes.len() {
            let f = fold_latin1(bytes[i + 1]);
            if f.is_some() {
                i += 1;
            }
            f
        } else {
            None
        };
        i += 1;

        if let Some(c) = folded {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c as char);
        }
    }

    out
}

/// Absent input normalizes to the empty string.
pub fn normalize_opt(input: Option<&str>) -> String {
    input.map(|s| normalize(s)).unwrap_or_default()
}
