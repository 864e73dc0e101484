//! Dialect-driven tokenizer for delimited text
//!
//! Converts raw text into an ordered sequence of rows, and each row into an
//! ordered sequence of cell strings, under the dialect's quoting/escaping
//! state machine. Malformed quoting is a fatal error, never recovered.

use crate::dialect::Dialect;
use crate::errors::{Result, TabularError, Warning};

/// One tokenized data row
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 1-based row number in the source file, counting every raw row
    pub source_row: usize,
    /// Cell strings after trimming, one per source column
    pub cells: Vec<String>,
}

/// Extract the next raw row from `text` starting at byte offset `cursor`.
///
/// Returns the cursor past the row's line terminator and the row content
/// without the terminator, or `None` at end of input. Line terminators
/// inside quoted regions do not end the row. The dialect's configured
/// terminators are tried in order at each position.
pub fn tokenize_row<'a>(
    text: &'a str,
    cursor: usize,
    dialect: &Dialect,
) -> Result<Option<(usize, &'a str)>> {
    if cursor >= text.len() {
        return Ok(None);
    }

    let bytes = text.as_bytes();
    let mut in_quotes = false;
    let mut i = cursor;
    while i < text.len() {
        let c = text[i..].chars().next().expect("cursor on char boundary");
        if in_quotes {
            if Some(c) == dialect.escape_char && dialect.escape_char != dialect.quote_char {
                // escape + X is a literal X, step over both
                i += c.len_utf8();
                if let Some(next) = text[i..].chars().next() {
                    i += next.len_utf8();
                }
                continue;
            }
            if Some(c) == dialect.quote_char {
                let rest = &text[i + c.len_utf8()..];
                if dialect.escape_char == dialect.quote_char
                    && rest.chars().next() == dialect.quote_char
                {
                    // doubled quote, stays inside the quoted region
                    i += c.len_utf8() * 2;
                    continue;
                }
                in_quotes = false;
            }
            i += c.len_utf8();
            continue;
        }
        if Some(c) == dialect.quote_char {
            in_quotes = true;
            i += c.len_utf8();
            continue;
        }
        for terminator in &dialect.line_terminators {
            if bytes[i..].starts_with(terminator.as_bytes()) {
                return Ok(Some((i + terminator.len(), &text[cursor..i])));
            }
        }
        i += c.len_utf8();
    }

    if in_quotes {
        return Err(TabularError::Tokenize {
            row: 0,
            message: "unterminated quoted cell at end of input".to_string(),
        });
    }
    Ok(Some((text.len(), &text[cursor..])))
}

/// Split a raw row into cell strings at unescaped delimiters.
///
/// Each emitted cell is trimmed per the dialect's trim mode. A quote
/// character appearing mid-cell, or any character other than the delimiter
/// immediately after a closing quote, is a fatal tokenizing error.
pub fn split_row(row: &str, dialect: &Dialect) -> Result<Vec<String>> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = row.chars().peekable();
    // leading whitespace before an opening quote is tolerated when the trim
    // mode would remove it anyway
    let skip_leading = matches!(
        dialect.trim,
        crate::dialect::TrimMode::True | crate::dialect::TrimMode::Start
    );

    'cell: loop {
        current.clear();
        if skip_leading {
            while chars.peek().is_some_and(|c| *c == ' ' || *c == '\t') {
                current.push(chars.next().expect("peeked"));
            }
        }
        if dialect.quote_char.is_some() && chars.peek().copied() == dialect.quote_char {
            chars.next();
            current.clear();
            // quoted cell
            loop {
                let Some(c) = chars.next() else {
                    return Err(tokenize_err("unterminated quoted cell"));
                };
                if Some(c) == dialect.escape_char && dialect.escape_char != dialect.quote_char {
                    // escape + quote is a literal quote, escape + X a literal X
                    match chars.next() {
                        Some(escaped) => current.push(escaped),
                        None => return Err(tokenize_err("dangling escape character")),
                    }
                    continue;
                }
                if Some(c) == dialect.quote_char {
                    if dialect.escape_char == dialect.quote_char
                        && chars.peek().copied() == dialect.quote_char
                    {
                        chars.next();
                        current.push(c);
                        continue;
                    }
                    // closing quote: next must be the delimiter or end of row
                    match chars.next() {
                        None => {
                            cells.push(dialect.trim.apply(&current).to_string());
                            break 'cell;
                        }
                        Some(d) if d == dialect.delimiter => {
                            cells.push(dialect.trim.apply(&current).to_string());
                            continue 'cell;
                        }
                        Some(other) => {
                            return Err(tokenize_err(&format!(
                                "expected delimiter after closing quote, found '{other}'"
                            )));
                        }
                    }
                }
                current.push(c);
            }
        }
        // unquoted cell
        loop {
            match chars.next() {
                None => {
                    cells.push(dialect.trim.apply(&current).to_string());
                    break 'cell;
                }
                Some(c) if c == dialect.delimiter => {
                    cells.push(dialect.trim.apply(&current).to_string());
                    continue 'cell;
                }
                Some(c) if Some(c) == dialect.quote_char => {
                    return Err(tokenize_err("unescaped quote in unquoted cell"));
                }
                Some(c) => current.push(c),
            }
        }
    }

    Ok(cells)
}

fn tokenize_err(message: &str) -> TabularError {
    TabularError::Tokenize {
        row: 0,
        message: message.to_string(),
    }
}

/// Streaming tokenizer over one tabular file
///
/// Yields data records in order, diverting comment rows into [`comments`]
/// and optionally skipping blank rows. Skip rows and header rows are
/// consumed first, in that order, via [`skip_rows`] and [`header_rows`].
///
/// [`comments`]: Tokenizer::comments
/// [`skip_rows`]: Tokenizer::skip_rows
/// [`header_rows`]: Tokenizer::header_rows
pub struct Tokenizer<'a> {
    text: &'a str,
    cursor: usize,
    dialect: &'a Dialect,
    /// 1-based number of the next raw row
    next_source_row: usize,
    /// Comment rows encountered anywhere in the file, prefix stripped
    pub comments: Vec<String>,
    pub warnings: Vec<Warning>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(text: &'a str, dialect: &'a Dialect) -> Self {
        // tolerate a UTF-8 byte order mark
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Self {
            text,
            cursor: 0,
            dialect,
            next_source_row: 1,
            comments: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn next_raw_row(&mut self) -> Result<Option<(usize, &'a str)>> {
        match tokenize_row(self.text, self.cursor, self.dialect) {
            Ok(Some((next_cursor, row))) => {
                let source_row = self.next_source_row;
                self.cursor = next_cursor;
                self.next_source_row += 1;
                Ok(Some((source_row, row)))
            }
            Ok(None) => Ok(None),
            Err(TabularError::Tokenize { message, .. }) => Err(TabularError::Tokenize {
                row: self.next_source_row,
                message,
            }),
            Err(e) => Err(e),
        }
    }

    fn divert_if_comment(&mut self, row: &str) -> bool {
        if let Some(prefix) = &self.dialect.comment_prefix {
            if !prefix.is_empty() && row.starts_with(prefix.as_str()) {
                self.comments.push(row[prefix.len()..].trim().to_string());
                return true;
            }
        }
        false
    }

    /// Consume `n` raw rows before any header or data processing.
    /// Comment-prefixed rows within the skipped region are still collected.
    pub fn skip_rows(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            match self.next_raw_row()? {
                Some((_, row)) => {
                    self.divert_if_comment(row);
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Consume `n` raw rows as header rows and return their cell lists.
    /// Comment rows count toward `n` but produce no header entry.
    pub fn header_rows(&mut self, n: usize) -> Result<Vec<Vec<String>>> {
        let mut headers = Vec::new();
        for _ in 0..n {
            match self.next_raw_row()? {
                Some((source_row, row)) => {
                    if self.divert_if_comment(row) {
                        continue;
                    }
                    let cells = split_row(row, self.dialect).map_err(|e| at_row(e, source_row))?;
                    headers.push(cells);
                }
                None => break,
            }
        }
        Ok(headers)
    }

    /// Next data record, or `None` at end of input.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let Some((source_row, row)) = self.next_raw_row()? else {
                return Ok(None);
            };
            if self.divert_if_comment(row) {
                continue;
            }
            let cells = split_row(row, self.dialect).map_err(|e| at_row(e, source_row))?;
            let blank = cells.iter().all(|c| c.is_empty());
            if blank && self.dialect.skip_blank_rows {
                continue;
            }
            return Ok(Some(Record { source_row, cells }));
        }
    }
}

fn at_row(e: TabularError, source_row: usize) -> TabularError {
    match e {
        TabularError::Tokenize { message, .. } => TabularError::Tokenize {
            row: source_row,
            message,
        },
        other => other,
    }
}

/// Serialize one cell string under a dialect, quoting when the content
/// contains the delimiter, the quote character, or a line terminator.
/// Inverse of [`split_row`] for a single cell.
pub fn serialize_cell(value: &str, dialect: &Dialect) -> String {
    let needs_quoting = value.contains(dialect.delimiter)
        || dialect.quote_char.is_some_and(|q| value.contains(q))
        || dialect
            .line_terminators
            .iter()
            .any(|t| value.contains(t.as_str()))
        || value.starts_with(' ')
        || value.ends_with(' ');
    let Some(quote) = dialect.quote_char else {
        return value.to_string();
    };
    if !needs_quoting {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for c in value.chars() {
        if c == quote {
            match dialect.escape_char {
                Some(e) if e != quote => out.push(e),
                _ => out.push(quote),
            }
        }
        out.push(c);
    }
    out.push(quote);
    out
}
