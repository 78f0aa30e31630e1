//! Minimal CSV reading and writing: comma separated, fields quoted with `"`
//! when needed, quotes doubled inside quoted fields, quoted fields may span
//! lines.

use super::TransferError;

/// One logical CSV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
    /// 1-based line the record starts on.
    pub line: usize,
    pub fields: Vec<String>,
    quoted: bool,
}

impl Record {
    /// An empty line.
    pub fn is_blank(&self) -> bool {
        !self.quoted && self.fields.len() == 1 && self.fields[0].trim().is_empty()
    }

    /// `[label]` on a line of its own.
    pub fn marker(&self) -> Option<&str> {
        if self.quoted || self.fields.len() != 1 {
            return None;
        }
        let field = self.fields[0].trim();
        field
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .map(str::trim)
    }
}

pub(crate) fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub(crate) fn write_line(fields: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    fields
        .into_iter()
        .map(|f| escape(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn parse(text: &str) -> Result<Vec<Record>, TransferError> {
    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_was_quoted = false;
    let mut record_quoted = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() && !field_was_quoted => {
                in_quotes = true;
                field_was_quoted = true;
                record_quoted = true;
            }
            '"' => {
                return Err(TransferError::Malformed {
                    line,
                    reason: "unexpected quote inside a field".to_string(),
                })
            }
            ',' => {
                fields.push(std::mem::take(&mut field));
                field_was_quoted = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                records.push(Record {
                    line: record_line,
                    fields: std::mem::take(&mut fields),
                    quoted: record_quoted,
                });
                field_was_quoted = false;
                record_quoted = false;
                line += 1;
                record_line = line;
            }
            _ if field_was_quoted => {
                return Err(TransferError::Malformed {
                    line,
                    reason: "text after a closing quote".to_string(),
                })
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(TransferError::Malformed {
            line: record_line,
            reason: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !fields.is_empty() || field_was_quoted {
        fields.push(field);
        records.push(Record {
            line: record_line,
            fields,
            quoted: record_quoted,
        });
    }
    Ok(records)
}
