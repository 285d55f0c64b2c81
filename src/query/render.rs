//! Human-readable rendering of framed responses for the interactive client.

use std::fmt::Write as _;

use super::{RESPONSE_END, RESPONSE_ERR_PREFIX, RESPONSE_OK};

/// Column labels of a catalog row, in source order. The last column takes the
/// rest of the row, so genre lists keep their commas.
pub const RECORD_LABELS: [&str; 14] = [
    "Title",
    "Author",
    "Image URL",
    "Pages",
    "Average rating",
    "Text reviews",
    "Description",
    "5-star ratings",
    "4-star ratings",
    "3-star ratings",
    "2-star ratings",
    "1-star ratings",
    "Total ratings",
    "Genres",
];

/// One line of a framed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLine<'a> {
    Ok,
    End,
    Error(&'a str),
    Record(&'a str),
}

impl<'a> ResponseLine<'a> {
    pub fn parse(line: &'a str) -> Self {
        if line == RESPONSE_OK {
            ResponseLine::Ok
        } else if line == RESPONSE_END {
            ResponseLine::End
        } else if let Some(msg) = line.strip_prefix(RESPONSE_ERR_PREFIX) {
            ResponseLine::Error(msg)
        } else {
            ResponseLine::Record(line)
        }
    }
}

/// Split a row on plain commas into labeled fields. Missing trailing columns
/// render empty.
pub fn record_fields(record: &str) -> Vec<(&'static str, &str)> {
    let last = RECORD_LABELS.len() - 1;
    let mut fields = Vec::with_capacity(RECORD_LABELS.len());
    let mut rest = Some(record);
    for (i, label) in RECORD_LABELS.iter().enumerate() {
        let value = match rest {
            Some(r) if i == last => {
                rest = None;
                r
            }
            Some(r) => match r.split_once(',') {
                Some((head, tail)) => {
                    rest = Some(tail);
                    head
                }
                // No comma left: everything remaining belongs to the genres.
                None => {
                    fields.extend(RECORD_LABELS[i..last].iter().map(|l| (*l, "")));
                    fields.push((RECORD_LABELS[last], r));
                    return fields;
                }
            },
            None => "",
        };
        fields.push((*label, value));
    }
    fields
}

/// Render every line up to `<END>`: server errors, then numbered records.
pub fn render_response<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    let mut count = 0;
    for line in lines {
        match ResponseLine::parse(line.as_ref()) {
            ResponseLine::Ok => {}
            ResponseLine::End => break,
            ResponseLine::Error(msg) => {
                let _ = writeln!(out, "ERROR (server): {}", msg);
            }
            ResponseLine::Record(record) => {
                count += 1;
                if count == 1 {
                    out.push_str("\nResults:\n\n");
                }
                let _ = writeln!(out, "Result {}:", count);
                for (label, value) in record_fields(record) {
                    let _ = writeln!(out, "- {}: {}", label, value);
                }
                out.push('\n');
            }
        }
    }
    if count == 0 {
        out.push_str("No results found\n");
    }
    out
}
