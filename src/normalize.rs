//! Accent stripping and re-encoding of delimited files into UTF-8 TSV.
//!
//! Every `.csv`/`.tsv` file in the input directory is decoded with a detected
//! encoding, its values are transliterated to ASCII in fixed-size row chunks,
//! and the result is written to `<output_dir>/<stem>.tsv`. The header row is
//! written once through the same writer that receives every chunk.

use std::{
    borrow::Cow,
    collections::HashMap,
    fs::{self, File},
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chardetng::EncodingDetector;
use deunicode::deunicode_with_tofu;
use encoding_rs::Encoding;
use encoding_rs_io::DecodeReaderBytesBuilder;
use log::{debug, info};

use crate::{error::PrepError, io_utils};

pub const ENCODING_SAMPLE_BYTES: usize = 10_000;
pub const DEFAULT_CHUNK_SIZE: usize = 1_000_000;
pub const NORMALIZE_SUFFIXES: [&str; 2] = [".csv", ".tsv"];

/// Candidate delimiters in order of preference.
const DELIMITER_PRIORITY: [u8; 3] = [b'\t', b',', b';'];

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Delimiter of the input files; inferred per file when `None`.
    pub delimiter: Option<u8>,
    /// Rows held in memory at once.
    pub chunk_size: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedFile {
    pub input: PathBuf,
    pub output: PathBuf,
    pub encoding: &'static Encoding,
    pub delimiter: u8,
    pub rows: usize,
    pub chunks: usize,
}

pub fn normalize_directory(
    input_dir: &Path,
    output_dir: &Path,
    options: &NormalizeOptions,
) -> Result<Vec<NormalizedFile>> {
    if options.chunk_size == 0 {
        return Err(
            PrepError::InvalidArgument("Chunk size must be greater than zero".to_string()).into(),
        );
    }
    let files = io_utils::list_files_with_suffixes(input_dir, &NORMALIZE_SUFFIXES)?;
    ensure_distinct_outputs(&files)?;
    let mut summaries = Vec::with_capacity(files.len());
    for path in &files {
        let summary = normalize_file(path, output_dir, options)
            .with_context(|| format!("Normalizing {path:?}"))?;
        info!(
            "✓ {:?} -> {:?} ({} row(s), {} chunk(s), {})",
            summary.input,
            summary.output,
            summary.rows,
            summary.chunks,
            summary.encoding.name()
        );
        summaries.push(summary);
    }
    info!("Normalized {} file(s) into {:?}", summaries.len(), output_dir);
    Ok(summaries)
}

pub fn normalize_file(
    path: &Path,
    output_dir: &Path,
    options: &NormalizeOptions,
) -> Result<NormalizedFile> {
    let encoding = detect_encoding(path)?;
    let delimiter = match options.delimiter {
        Some(delimiter) => delimiter,
        None => {
            let first_line = read_first_line(path, encoding)?;
            infer_delimiter(&first_line).ok_or_else(|| PrepError::DelimiterNotRecognized {
                path: path.to_path_buf(),
            })?
        }
    };
    debug!(
        "{:?}: encoding {}, delimiter '{}'",
        path,
        encoding.name(),
        io_utils::printable_delimiter(delimiter)
    );

    let output = output_path(path, output_dir)?;
    let mut reader = io_utils::open_decoded_csv_reader(path, delimiter, encoding)?;
    let headers = reader
        .headers()
        .map_err(|err| PrepError::parse(path, err))?
        .clone();
    let mut writer = io_utils::open_csv_writer(&output, io_utils::TSV_DELIMITER)?;
    writer
        .write_record(headers.iter())
        .context("Writing output headers")?;

    let mut rows = 0usize;
    let mut chunks = 0usize;
    let mut chunk: Vec<csv::StringRecord> = Vec::new();
    loop {
        chunk.clear();
        let exhausted = fill_chunk(&mut reader, &mut chunk, options.chunk_size, headers.len())
            .map_err(|message| PrepError::parse(path, message))?;
        if !chunk.is_empty() {
            for record in &chunk {
                let values = normalize_record(record);
                writer
                    .write_record(values.iter().map(|v| v.as_bytes()))
                    .with_context(|| format!("Writing row {} to {output:?}", rows + 2))?;
                rows += 1;
            }
            chunks += 1;
            debug!("{:?}: chunk {} flushed ({} row(s) total)", path, chunks, rows);
        }
        if exhausted {
            break;
        }
    }
    writer.flush().context("Flushing normalized output")?;

    Ok(NormalizedFile {
        input: path.to_path_buf(),
        output,
        encoding,
        delimiter,
        rows,
        chunks,
    })
}

/// Reads up to `limit` records padded to `width` into `chunk`; returns `true`
/// once the input is exhausted.
fn fill_chunk<R: Read>(
    reader: &mut csv::Reader<R>,
    chunk: &mut Vec<csv::StringRecord>,
    limit: usize,
    width: usize,
) -> Result<bool, String> {
    while chunk.len() < limit {
        let mut record = csv::StringRecord::new();
        if !reader.read_record(&mut record).map_err(|err| err.to_string())? {
            return Ok(true);
        }
        io_utils::pad_record(&mut record, width)?;
        chunk.push(record);
    }
    Ok(false)
}

fn normalize_record(record: &csv::StringRecord) -> Vec<Cow<'_, str>> {
    record.iter().map(normalize_value).collect()
}

/// Transliterates `value` to ASCII, dropping undecodable sequences and
/// characters without a transliteration. ASCII input is returned untouched.
pub fn normalize_value(value: &str) -> Cow<'_, str> {
    if value.is_ascii() {
        return Cow::Borrowed(value);
    }
    let decodable: String = value.chars().filter(|ch| *ch != '\u{FFFD}').collect();
    Cow::Owned(deunicode_with_tofu(&decodable, ""))
}

/// Picks the first of tab, comma, semicolon present in `line`.
pub fn infer_delimiter(line: &str) -> Option<u8> {
    DELIMITER_PRIORITY
        .iter()
        .copied()
        .find(|delimiter| line.contains(*delimiter as char))
}

/// Guesses the encoding of `path` from its first [`ENCODING_SAMPLE_BYTES`]
/// bytes. A byte-order mark takes precedence over the heuristic detector.
pub fn detect_encoding(path: &Path) -> Result<&'static Encoding> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let mut sample = Vec::with_capacity(ENCODING_SAMPLE_BYTES);
    file.take(ENCODING_SAMPLE_BYTES as u64)
        .read_to_end(&mut sample)
        .with_context(|| format!("Sampling {path:?}"))?;
    if sample.is_empty() {
        return Err(PrepError::EncodingDetection {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        }
        .into());
    }
    if let Some((encoding, _)) = Encoding::for_bom(&sample) {
        return Ok(encoding);
    }
    let mut detector = EncodingDetector::new();
    detector.feed(&sample, sample.len() < ENCODING_SAMPLE_BYTES);
    Ok(detector.guess(None, true))
}

fn read_first_line(path: &Path, encoding: &'static Encoding) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let decoded = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .build(file);
    let mut line = String::new();
    BufReader::new(decoded)
        .read_line(&mut line)
        .with_context(|| format!("Reading first line of {path:?}"))?;
    Ok(line)
}

/// Rejects inputs such as `a.csv` and `a.tsv` that would share one output.
fn ensure_distinct_outputs(files: &[PathBuf]) -> Result<()> {
    let mut seen: HashMap<&str, &Path> = HashMap::new();
    for path in files {
        let Some(stem) = io_utils::file_stem(path) else {
            continue;
        };
        if let Some(previous) = seen.insert(stem, path.as_path()) {
            return Err(PrepError::InvalidArgument(format!(
                "{previous:?} and {path:?} would both be written to {stem}.tsv"
            ))
            .into());
        }
    }
    Ok(())
}

fn output_path(input: &Path, output_dir: &Path) -> Result<PathBuf> {
    let stem = io_utils::file_stem(input).ok_or_else(|| {
        PrepError::InvalidArgument(format!("Input file {input:?} has no usable name"))
    })?;
    let output = output_dir.join(format!("{stem}.tsv"));
    let resolved_dir = fs::canonicalize(output_dir)
        .with_context(|| format!("Resolving output directory {output_dir:?}"))?;
    let resolved_input =
        fs::canonicalize(input).with_context(|| format!("Resolving input file {input:?}"))?;
    if resolved_dir.join(format!("{stem}.tsv")) == resolved_input {
        return Err(PrepError::InvalidArgument(format!(
            "Output {output:?} would overwrite its own input"
        ))
        .into());
    }
    Ok(output)
}
