//! Layout inference for subject grade exports.
//!
//! The exports carry no header markers. The content titles sit on one row
//! (normally the third) between two leading columns and a trailing block of
//! evaluation-summary columns; student rows are recognised by shape alone.

use crate::classify::year_marker;
use crate::error::FileError;
use crate::normalize::normalize;
use encoding_rs::Encoding;

const TITLE_ROW_INDEX: usize = 2;
const TITLE_SCAN_LINES: usize = 10;
const FIRST_TITLE_COLUMN: usize = 2;
const MIN_ROW_FIELDS: usize = 6;
const MIN_STUDENT_NAME_CHARS: usize = 6;

// Matched against normalized cells; the first hit closes the title region.
const SUMMARY_KEYWORDS: &[&str] = &[
    "valoracion preliminar",
    "trayectoria",
    "desempeno",
    "observacion",
];

#[derive(Clone, Debug, PartialEq)]
pub struct ContentTitle {
    pub title: String,
    /// 1-based position among accepted titles.
    pub ordinal: usize,
    /// Column holding this content's grade token in every student row.
    pub column: usize,
}

#[derive(Clone, Debug)]
pub struct StudentRow {
    pub line_no: usize,
    pub roll: u32,
    pub name: String,
    pub cells: Vec<String>,
}

impl StudentRow {
    pub fn token_for(&self, title: &ContentTitle) -> Option<&str> {
        self.cells.get(title.column).map(|s| s.as_str())
    }
}

#[derive(Debug)]
pub struct Extraction {
    pub titles: Vec<ContentTitle>,
    pub student_rows: Vec<StudentRow>,
    /// First field of the title row, e.g. `3er AÑO`.
    pub title_row_label: String,
}

impl Extraction {
    pub fn labelled_year(&self) -> Option<u8> {
        year_marker(&self.title_row_label)
    }
}

pub fn extract(raw: &[u8], legacy_encodings: &[String]) -> Result<Extraction, FileError> {
    let text = decode(raw, legacy_encodings)?;
    let rows: Vec<Vec<String>> = text.lines().map(parse_csv_record).collect();

    let title_row = locate_title_row(&rows).ok_or(FileError::NoTitleRow)?;
    let titles = content_titles(title_row);
    let student_rows = rows
        .iter()
        .enumerate()
        .filter_map(|(i, fields)| student_row(i + 1, fields))
        .collect();

    Ok(Extraction {
        titles,
        student_rows,
        title_row_label: title_row
            .first()
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    })
}

/// UTF-8 first, then each legacy single-byte encoding in order.
pub fn decode(raw: &[u8], legacy_encodings: &[String]) -> Result<String, FileError> {
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
    let raw = trim_trailing_controls(raw);
    if let Ok(s) = std::str::from_utf8(raw) {
        if plausible_text(s) {
            return Ok(s.to_string());
        }
        return Err(FileError::Undecodable);
    }
    for label in legacy_encodings {
        let Some(encoding) = Encoding::for_label(label.as_bytes()) else {
            continue;
        };
        let Some(decoded) = encoding.decode_without_bom_handling_and_without_replacement(raw)
        else {
            continue;
        };
        if plausible_text(&decoded) {
            return Ok(decoded.into_owned());
        }
    }
    Err(FileError::Undecodable)
}

// DOS-era exports end with a SUB (0x1A) marker, sometimes NUL padded.
fn trim_trailing_controls(raw: &[u8]) -> &[u8] {
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_control() || matches!(b, b'\n' | b'\r' | b'\t'))
        .map_or(0, |i| i + 1);
    &raw[..end]
}

// Binary uploads (spreadsheets, archives) decode to control characters under
// any single-byte table.
fn plausible_text(s: &str) -> bool {
    !s.chars().any(|c| {
        (c.is_control() && !matches!(c, '\n' | '\r' | '\t')) || c == '\u{FFFD}'
    })
}

fn locate_title_row(rows: &[Vec<String>]) -> Option<&Vec<String>> {
    if let Some(row) = rows.get(TITLE_ROW_INDEX) {
        if row.len() >= MIN_ROW_FIELDS {
            return Some(row);
        }
    }
    rows.iter().take(TITLE_SCAN_LINES).find(|row| {
        row.first()
            .map(|f| year_marker(f.trim()).is_some())
            .unwrap_or(false)
    })
}

fn content_titles(row: &[String]) -> Vec<ContentTitle> {
    let mut out = Vec::new();
    for (column, cell) in row.iter().enumerate().skip(FIRST_TITLE_COLUMN) {
        if is_summary_column(cell) {
            break;
        }
        let title = cell.trim();
        if !is_acceptable_title(title) {
            continue;
        }
        out.push(ContentTitle {
            title: title.to_string(),
            ordinal: out.len() + 1,
            column,
        });
    }
    out
}

fn is_summary_column(cell: &str) -> bool {
    let n = normalize(cell);
    SUMMARY_KEYWORDS.iter().any(|k| n.contains(k))
}

fn is_acceptable_title(title: &str) -> bool {
    if title.is_empty() || title == "0" || title.chars().count() <= 2 {
        return false;
    }
    !is_numeric(title)
}

fn is_numeric(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
        && s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+' | ' '))
}

fn student_row(line_no: usize, fields: &[String]) -> Option<StudentRow> {
    if fields.len() < MIN_ROW_FIELDS {
        return None;
    }
    let roll_field = fields[0].trim();
    if roll_field.is_empty() || !roll_field.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let roll = roll_field.parse::<u32>().ok()?;
    let name = fields[1].trim();
    if name.chars().count() < MIN_STUDENT_NAME_CHARS {
        return None;
    }
    Some(StudentRow {
        line_no,
        roll,
        name: name.to_string(),
        cells: fields.iter().map(|s| s.trim().to_string()).collect(),
    })
}

/// One comma-separated record; double quotes group fields and `""` escapes a quote.
pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '"' {
            if in_quotes && chars.peek() == Some(&'"') {
                buf.push('"');
                chars.next();
                continue;
            }
            in_quotes = !in_quotes;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(std::mem::take(&mut buf));
            continue;
        }
        buf.push(ch);
    }
    out.push(buf);
    out
}
