//! Point file reading and writing with encoding and delimiter auto-detection.
//!
//! A point file holds one row per line. Blank lines are kept as empty rows so
//! the output lines up with the input. Fields are split on the detected
//! delimiter (`;`, `,`, tab or `|`) or, when none occurs, on runs of
//! whitespace.

use encoding_rs::Encoding;
use std::io::Write;
use std::path::Path;

use crate::error::{PointFileError, PointFileResult};

/// Field separator of a point file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Char(u8),
    Whitespace,
}

impl Delimiter {
    /// Character used when writing.
    pub fn as_byte(&self) -> u8 {
        match self {
            Delimiter::Char(c) => *c,
            Delimiter::Whitespace => b' ',
        }
    }
}

/// Rows of a point file plus what was detected while reading it.
#[derive(Debug, Clone)]
pub struct PointFile {
    pub rows: Vec<Vec<String>>,
    pub encoding: String,
    pub delimiter: Delimiter,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        "windows-1251" | "cp1251" => "windows-1251".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes with the named encoding.
///
/// UTF-8 falls back to lossy decoding; any other label must be known to
/// `encoding_rs`.
pub fn decode_content(bytes: &[u8], encoding: &str) -> PointFileResult<String> {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => Ok(encoding_rs::UTF_8.decode(bytes).0.into_owned()),
        "iso-8859-1" | "latin-1" | "latin1" => {
            Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned())
        }
        label => Encoding::for_label(label.as_bytes())
            .map(|enc| enc.decode(bytes).0.into_owned())
            .ok_or_else(|| PointFileError::Encoding(encoding.to_string())),
    }
}

/// Pick the separator occurring most often on the first non-blank line.
pub fn detect_delimiter(content: &str) -> Delimiter {
    let first_line = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("");

    let mut best = Delimiter::Whitespace;
    let mut best_count = 0;
    for sep in [b';', b',', b'\t', b'|'] {
        let count = first_line.bytes().filter(|b| *b == sep).count();
        if count > best_count {
            best_count = count;
            best = Delimiter::Char(sep);
        }
    }
    best
}

fn split_line(line: &str, delimiter: Delimiter, number: usize) -> PointFileResult<Vec<String>> {
    if line.trim().is_empty() {
        return Ok(Vec::new());
    }
    let sep = match delimiter {
        Delimiter::Whitespace => {
            return Ok(line.split_whitespace().map(str::to_string).collect());
        }
        Delimiter::Char(sep) => sep,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sep)
        .from_reader(line.as_bytes());
    let record = reader
        .records()
        .next()
        .transpose()?
        .ok_or_else(|| PointFileError::Line {
            line: number,
            message: "no fields".to_string(),
        })?;
    Ok(record.iter().map(|f| f.trim().to_string()).collect())
}

/// Split decoded content into rows.
pub fn parse_content(content: &str, delimiter: Delimiter) -> PointFileResult<Vec<Vec<String>>> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| split_line(line, delimiter, i + 1))
        .collect()
}

/// Parse raw bytes with auto-detected encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> PointFileResult<PointFile> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    let rows = parse_content(&content, delimiter)?;
    Ok(PointFile {
        rows,
        encoding,
        delimiter,
    })
}

/// Read a point file with auto-detection.
pub fn read_point_file(path: impl AsRef<Path>) -> PointFileResult<PointFile> {
    let bytes = std::fs::read(path)?;
    parse_bytes_auto(&bytes)
}

/// Write rows, one line each; empty rows become blank lines.
pub fn write_rows<W: Write>(mut out: W, rows: &[Vec<String>], delimiter: Delimiter) -> PointFileResult<()> {
    for row in rows {
        if row.is_empty() {
            out.write_all(b"\n")?;
            continue;
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter.as_byte())
            .from_writer(Vec::new());
        writer.write_record(row)?;
        let line = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(e.error().kind(), e.error().to_string()))?;
        out.write_all(&line)?;
    }
    out.flush()?;
    Ok(())
}

/// Write rows to a file.
pub fn write_point_file(path: impl AsRef<Path>, rows: &[Vec<String>], delimiter: Delimiter) -> PointFileResult<()> {
    let file = std::fs::File::create(path)?;
    write_rows(std::io::BufWriter::new(file), rows, delimiter)
}
