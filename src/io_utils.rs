//! I/O utilities for directory scans, delimited readers/writers, and encodings.
//!
//! All file I/O in data-prep flows through this module. It provides:
//!
//! - **Directory scans**: regular files filtered by name suffix, always
//!   returned in lexicographic order so reports are stable across platforms.
//! - **Encoding**: label resolution via `encoding_rs`, strict field decoding
//!   for validation, and lenient streaming transcoding to UTF-8 via
//!   `encoding_rs_io` for normalization.
//! - **Reader/writer construction**: `open_csv_reader_from_path`,
//!   `open_decoded_csv_reader`, and `open_csv_writer`.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

use crate::error::PrepError;

pub const TSV_DELIMITER: u8 = b'\t';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding, PrepError> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| PrepError::InvalidArgument(format!("Unknown encoding '{value}'")))
    } else {
        Ok(UTF_8)
    }
}

/// Lists regular files directly under `dir` whose name ends with one of
/// `suffixes`, sorted by file name.
pub fn list_files_with_suffixes(dir: &Path, suffixes: &[&str]) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Reading directory {dir:?}"))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Listing directory {dir:?}"))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = file_name(&path)
            .map(|name| suffixes.iter().any(|suffix| name.ends_with(suffix)))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

pub fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

pub fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|stem| stem.to_str())
}

/// Builds a reader over `reader`. With `flexible`, records may differ in
/// width from the header; callers then conform them with [`pad_record`].
pub fn open_csv_reader<R>(reader: R, delimiter: u8, flexible: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(flexible);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
    flexible: bool,
) -> Result<csv::Reader<BufReader<File>>> {
    let reader =
        BufReader::new(File::open(path).with_context(|| format!("Opening input file {path:?}"))?);
    Ok(open_csv_reader(reader, delimiter, flexible))
}

/// Opens `path` as a flexible delimited reader over UTF-8 text transcoded
/// from `encoding`. A byte-order mark overrides `encoding`; malformed
/// sequences surface as U+FFFD rather than errors.
pub fn open_decoded_csv_reader(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<csv::Reader<Box<dyn Read>>> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let decoded = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .build(BufReader::new(file));
    Ok(open_csv_reader(Box::new(decoded), delimiter, true))
}

pub fn open_csv_writer(path: &Path, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
    let base: Box<dyn Write> = Box::new(BufWriter::new(file));
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(base))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String, String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(format!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> Result<Vec<String>, String> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Reads and strictly decodes the header row of `reader`.
pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    path: &Path,
    encoding: &'static Encoding,
) -> Result<Vec<String>, PrepError>
where
    R: Read,
{
    let headers = reader
        .byte_headers()
        .map_err(|err| PrepError::parse(path, err))?
        .clone();
    decode_record(&headers, encoding).map_err(|message| PrepError::parse(path, message))
}

/// Pads a short record with empty trailing fields up to `width`. Records
/// wider than the header are rejected.
pub fn pad_record(record: &mut csv::StringRecord, width: usize) -> Result<(), String> {
    if record.len() > width {
        let line = record
            .position()
            .map(|pos| pos.line().to_string())
            .unwrap_or_else(|| "?".to_string());
        return Err(format!(
            "line {line} has {} field(s) but the header has {width}",
            record.len()
        ));
    }
    while record.len() < width {
        record.push_field("");
    }
    Ok(())
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
