//! Delimited text → rows of cells
//!
//! Spreadsheet exports arrive as comma-delimited text with RFC 4180 quoting:
//! a quoted span may contain commas, newlines and doubled quotes (`""` → `"`).
//! [`parse_lines`] turns such text into a lazy iterator of rows. The iterator
//! borrows the input and is `Clone`, so a caller can restart it at will.
//!
//! Malformed input is repaired rather than rejected. A quoted span only
//! crosses a line break when it opened at the start of a cell and the next
//! unpaired quote is a proper closer (followed by a delimiter, a line break or
//! the end of input), reached before any line that starts a new `Label:,`
//! pair. Any other open quote ends at the end of its physical line, so one
//! broken cell cannot swallow the rows below it. Lines that are blank after
//! trimming are skipped.
//!
//! Cells are returned exactly as they appeared (minus quoting). Trimming is
//! left to the label/value decoder.

const DELIMITER: char = ',';
const QUOTE: char = '"';

/// Lazy row iterator over delimited text. See [`parse_lines`].
#[derive(Debug, Clone)]
pub struct Lines<'a> {
    rest: &'a str,
}

/// Parse delimited text into rows of string cells.
pub fn parse_lines(text: &str) -> Lines<'_> {
    Lines { rest: text }
}

impl<'a> Iterator for Lines<'a> {
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.rest.is_empty() {
            let (cells, consumed) = parse_record(self.rest);
            let line = &self.rest[..consumed];
            self.rest = &self.rest[consumed..];

            if !line.trim().is_empty() {
                return Some(cells);
            }
        }
        None
    }
}

/// Parse one record from the start of `input`.
///
/// Returns the cells and the number of bytes consumed, including the record
/// terminator when there is one.
fn parse_record(input: &str) -> (Vec<String>, usize) {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut quoted_cell = false;
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            QUOTE => {
                if in_quotes && matches!(chars.peek(), Some((_, QUOTE))) {
                    cell.push(QUOTE);
                    chars.next();
                } else {
                    if !in_quotes {
                        quoted_cell = cell.is_empty();
                    }
                    in_quotes = !in_quotes;
                }
            }
            DELIMITER if !in_quotes => {
                cells.push(std::mem::take(&mut cell));
            }
            '\r' if matches!(chars.peek(), Some((_, '\n'))) => {
                if in_quotes && quoted_cell && span_continues(input, i) {
                    cell.push('\r');
                }
            }
            '\n' => {
                if in_quotes && quoted_cell && span_continues(input, i) {
                    cell.push('\n');
                } else {
                    cells.push(cell);
                    return (cells, i + 1);
                }
            }
            _ => cell.push(c),
        }
    }

    cells.push(cell);
    (cells, input.len())
}

/// Whether a quoted span still open at the line break at byte `at` carries on.
///
/// The first unpaired quote after the break decides: it must be followed by a
/// delimiter, a line break or the end of input. A line starting a new pair
/// before that quote ends the span.
fn span_continues(input: &str, at: usize) -> bool {
    let rest = &input[at..];
    let mut chars = rest.char_indices().peekable();
    let mut line_start = false;

    while let Some((i, c)) = chars.next() {
        match c {
            '\n' => line_start = true,
            '\r' => {}
            QUOTE => {
                if !matches!(chars.peek(), Some((_, QUOTE))) {
                    return matches!(chars.peek(), None | Some((_, DELIMITER | '\r' | '\n')));
                }
                chars.next();
                line_start = false;
            }
            _ => {
                if line_start && starts_pair(&rest[i..]) {
                    return false;
                }
                line_start = false;
            }
        }
    }
    false
}

/// A line whose first cell is an unquoted `Label:`.
fn starts_pair(line: &str) -> bool {
    let line = line.lines().next().unwrap_or_default();
    match line.split_once(DELIMITER) {
        Some((label, _)) => !label.contains(QUOTE) && label.trim_end().ends_with(':'),
        None => false,
    }
}

/// Serialize a cell matrix back into delimited text.
///
/// Cells containing the delimiter, a quote or a line break are quoted with
/// inner quotes doubled, so `parse_lines(&rows_to_text(m))` yields `m` back
/// for any matrix without blank rows.
pub fn rows_to_text<R, C>(rows: R) -> String
where
    R: IntoIterator,
    R::Item: IntoIterator<Item = C>,
    C: AsRef<str>,
{
    let mut out = String::new();
    for (row_index, row) in rows.into_iter().enumerate() {
        if row_index > 0 {
            out.push('\n');
        }
        for (cell_index, cell) in row.into_iter().enumerate() {
            if cell_index > 0 {
                out.push(DELIMITER);
            }
            write_cell(&mut out, cell.as_ref());
        }
    }
    out
}

fn write_cell(out: &mut String, cell: &str) {
    let needs_quotes = cell
        .chars()
        .any(|c| c == DELIMITER || c == QUOTE || c == '\n' || c == '\r');
    if !needs_quotes {
        out.push_str(cell);
        return;
    }
    out.push(QUOTE);
    for c in cell.chars() {
        if c == QUOTE {
            out.push(QUOTE);
        }
        out.push(c);
    }
    out.push(QUOTE);
}
