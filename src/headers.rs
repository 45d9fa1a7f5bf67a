//! Header validation across a directory of delimited files.
//!
//! Each file's header is uppercased and compared as a set against a canonical
//! header. One report (`header_comparison_result.tsv` or `.xlsx`) is written
//! for the whole directory, with one row per file in file-name order.

use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use itertools::Itertools;
use log::{debug, info};
use rust_xlsxwriter::{Format, Workbook};

use crate::{error::PrepError, io_utils};

pub const REPORT_BASENAME: &str = "header_comparison_result";
pub const COLUMN_SEPARATOR: &str = " --- ";
pub const REPORT_COLUMNS: [&str; 4] = [
    "File",
    "Status",
    "Missing Columns",
    "Columns not present in the correct header",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    Tsv,
    Xlsx,
}

impl ResultFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ResultFormat::Tsv => "tsv",
            ResultFormat::Xlsx => "xlsx",
        }
    }

    pub fn report_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{REPORT_BASENAME}.{}", self.extension()))
    }
}

impl FromStr for ResultFormat {
    type Err = PrepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "tsv" => Ok(ResultFormat::Tsv),
            "xlsx" => Ok(ResultFormat::Xlsx),
            _ => Err(PrepError::InvalidArgument(format!(
                "Result format must be '.tsv' or '.xlsx' (got '{value}')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    Correct,
    Incorrect,
}

impl HeaderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeaderStatus::Correct => "correct",
            HeaderStatus::Incorrect => "incorrect",
        }
    }
}

impl fmt::Display for HeaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of comparing one file's header with the canonical header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderComparison {
    pub file: String,
    pub status: HeaderStatus,
    /// Canonical columns absent from the file, sorted.
    pub missing_columns: Vec<String>,
    /// File columns absent from the canonical header, sorted.
    pub excess_columns: Vec<String>,
}

impl HeaderComparison {
    pub fn missing_display(&self) -> String {
        self.missing_columns.iter().join(COLUMN_SEPARATOR)
    }

    pub fn excess_display(&self) -> String {
        self.excess_columns.iter().join(COLUMN_SEPARATOR)
    }

    pub fn report_cells(&self) -> [String; 4] {
        [
            self.file.clone(),
            self.status.to_string(),
            self.missing_display(),
            self.excess_display(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub correct_header: String,
    pub header_delimiter: String,
    pub file_extension: String,
    pub file_delimiter: u8,
    /// Encoding label of the scanned files; `None` means UTF-8.
    pub encoding: Option<String>,
    pub result_format: ResultFormat,
}

impl CompareOptions {
    pub fn new(correct_header: impl Into<String>, result_format: ResultFormat) -> Self {
        Self {
            correct_header: correct_header.into(),
            header_delimiter: ",".to_string(),
            file_extension: ".csv".to_string(),
            file_delimiter: b',',
            encoding: None,
            result_format,
        }
    }
}

/// Splits the canonical header into an uppercased set. Tokens are trimmed of
/// surrounding whitespace and blank tokens are dropped, so `" id , name,,"`
/// yields `{ID, NAME}`.
pub fn canonical_header(header: &str, delimiter: &str) -> BTreeSet<String> {
    header
        .split(delimiter)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_uppercase)
        .collect()
}

pub fn compare_columns(
    file: impl Into<String>,
    canonical: &BTreeSet<String>,
    columns: &[String],
) -> HeaderComparison {
    let actual: BTreeSet<String> = columns.iter().map(|name| name.to_uppercase()).collect();
    let missing_columns: Vec<String> = canonical.difference(&actual).cloned().collect();
    let excess_columns: Vec<String> = actual.difference(canonical).cloned().collect();
    let status = if missing_columns.is_empty() && excess_columns.is_empty() {
        HeaderStatus::Correct
    } else {
        HeaderStatus::Incorrect
    };
    HeaderComparison {
        file: file.into(),
        status,
        missing_columns,
        excess_columns,
    }
}

pub fn compare_headers(
    input_dir: &Path,
    output_dir: &Path,
    options: &CompareOptions,
) -> Result<Vec<HeaderComparison>> {
    if options.header_delimiter.is_empty() {
        return Err(
            PrepError::InvalidArgument("Header delimiter cannot be empty".to_string()).into(),
        );
    }
    let encoding = io_utils::resolve_encoding(options.encoding.as_deref())?;
    let canonical = canonical_header(&options.correct_header, &options.header_delimiter);
    debug!("Canonical header: {:?}", canonical);

    let files =
        io_utils::list_files_with_suffixes(input_dir, &[options.file_extension.as_str()])?;
    let mut results = Vec::with_capacity(files.len());
    for path in &files {
        let columns = read_file_columns(path, options.file_delimiter, encoding)
            .with_context(|| format!("Comparing headers of {path:?}"))?;
        let name = io_utils::file_name(path).unwrap_or_default().to_string();
        let comparison = compare_columns(name, &canonical, &columns);
        info!("{} -> {}", comparison.file, comparison.status);
        results.push(comparison);
    }

    let report_path = options.result_format.report_path(output_dir);
    match options.result_format {
        ResultFormat::Tsv => write_tsv_report(&report_path, &results)?,
        ResultFormat::Xlsx => write_xlsx_report(&report_path, &results)?,
    }
    let correct = results
        .iter()
        .filter(|r| r.status == HeaderStatus::Correct)
        .count();
    info!(
        "Compared {} file(s): {} correct, {} incorrect -> {:?}",
        results.len(),
        correct,
        results.len() - correct,
        report_path
    );
    Ok(results)
}

/// Returns the header of `path` after checking that every record parses and
/// decodes with `encoding`.
fn read_file_columns(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Vec<String>> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, false)?;
    let headers = io_utils::reader_headers(&mut reader, path, encoding)?;
    if headers.is_empty() {
        return Err(PrepError::parse(path, "file has no header row").into());
    }
    let mut record = csv::ByteRecord::new();
    let mut row = 1usize;
    while reader
        .read_byte_record(&mut record)
        .map_err(|err| PrepError::parse(path, err))?
    {
        row += 1;
        io_utils::decode_record(&record, encoding)
            .map_err(|message| PrepError::parse(path, format!("row {row}: {message}")))?;
    }
    debug!("{:?}: {} column(s), {} row(s)", path, headers.len(), row - 1);
    Ok(headers)
}

fn write_tsv_report(path: &Path, results: &[HeaderComparison]) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(path, io_utils::TSV_DELIMITER)?;
    writer
        .write_record(REPORT_COLUMNS)
        .context("Writing report headers")?;
    for result in results {
        writer
            .write_record(result.report_cells())
            .with_context(|| format!("Writing report row for {}", result.file))?;
    }
    writer.flush().context("Flushing report")?;
    Ok(())
}

fn write_xlsx_report(path: &Path, results: &[HeaderComparison]) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();
    for (col, title) in REPORT_COLUMNS.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, *title, &bold)
            .context("Writing report headers")?;
    }
    for (idx, result) in results.iter().enumerate() {
        let row = (idx + 1) as u32;
        for (col, value) in result.report_cells().iter().enumerate() {
            worksheet
                .write_string(row, col as u16, value)
                .with_context(|| format!("Writing report row for {}", result.file))?;
        }
    }
    workbook
        .save(path)
        .with_context(|| format!("Saving report {path:?}"))?;
    Ok(())
}
