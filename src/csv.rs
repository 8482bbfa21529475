//! Comma separated text codec used for the table files.
//!
//! Fields holding a separator, a quote or a line break are wrapped in double
//! quotes with inner quotes doubled. Lines end with `\n`; `\r\n` is accepted
//! when reading.

use std::borrow::Cow;

const SEPARATOR: char = ',';
const QUOTE: char = '"';

/// One decoded record plus the line it started on (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub line: usize,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub reason: String,
}

pub fn escape_field(value: &str) -> Cow<'_, str> {
    let needs_quotes = value
        .chars()
        .any(|ch| ch == SEPARATOR || ch == QUOTE || ch == '\n' || ch == '\r');
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// A lone empty field is written as `""` so the record is not read back as a
/// blank line.
pub fn encode_line<S: AsRef<str>>(fields: &[S]) -> String {
    if let [only] = fields {
        if only.as_ref().is_empty() {
            return "\"\"".to_string();
        }
    }
    fields
        .iter()
        .map(|field| escape_field(field.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Renders a header followed by one line per row, each terminated by `\n`.
pub fn encode<I>(header: &[&str], rows: I) -> String
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut out = encode_line(header);
    out.push('\n');
    for row in rows {
        out.push_str(encode_line(row.as_slice()).as_str());
        out.push('\n');
    }
    out
}

/// Splits `text` into records. Blank lines are skipped.
pub fn parse(text: &str) -> Result<Vec<ParsedLine>, ParseError> {
    let mut out = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut line = 1_usize;
    let mut record_line = 1_usize;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                QUOTE if chars.peek() == Some(&QUOTE) => {
                    chars.next();
                    field.push(QUOTE);
                }
                QUOTE => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            SEPARATOR => fields.push(std::mem::take(&mut field)),
            QUOTE if field.is_empty() => {
                in_quotes = true;
                quoted = true;
            }
            '\r' | '\n' => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                if !fields.is_empty() || !field.is_empty() || quoted {
                    fields.push(std::mem::take(&mut field));
                    out.push(ParsedLine {
                        line: record_line,
                        fields: std::mem::take(&mut fields),
                    });
                }
                quoted = false;
                line += 1;
                record_line = line;
            }
            _ => field.push(ch),
        }
    }

    if in_quotes {
        return Err(ParseError {
            line: record_line,
            reason: "unterminated quoted field".to_string(),
        });
    }
    if !fields.is_empty() || !field.is_empty() || quoted {
        fields.push(field);
        out.push(ParsedLine {
            line: record_line,
            fields,
        });
    }
    Ok(out)
}

fn should_neutralize(value: &str) -> bool {
    let trimmed = value.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('\'') {
        return false;
    }
    matches!(
        trimmed.chars().next(),
        Some('=') | Some('+') | Some('-') | Some('@')
    )
}

/// Prefixes spreadsheet formula triggers with `'`. Only for exports handed to
/// spreadsheet software, never for the table files themselves.
pub fn neutralize_formula(value: &str) -> Cow<'_, str> {
    if should_neutralize(value) {
        Cow::Owned(format!("'{value}"))
    } else {
        Cow::Borrowed(value)
    }
}
