use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{headers::ResultFormat, normalize::DEFAULT_CHUNK_SIZE, schema::ColumnType};

#[derive(Debug, Parser)]
#[command(author, version, about = "Prepare delimited datasets for analysis", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compare the header of every file in a directory against a canonical header
    Headers(HeadersArgs),
    /// Strip accents and re-encode delimited files as UTF-8 TSV
    Normalize(NormalizeArgs),
    /// Load normalized TSV files into a SQLite table
    Load(LoadArgs),
    /// Join two loaded tables into a new table on a shared key
    Join(JoinArgs),
}

#[derive(Debug, Args)]
pub struct HeadersArgs {
    /// Directory containing the files to check
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Directory where the comparison report is written
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Canonical header as a delimited string
    #[arg(long = "header")]
    pub header: String,
    /// Delimiter used inside --header
    #[arg(long = "header-delimiter", default_value = ",")]
    pub header_delimiter: String,
    /// File name suffix selecting the files to check
    #[arg(long = "extension", default_value = ".csv")]
    pub extension: String,
    /// Delimiter of the checked files (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter, default_value = ",")]
    pub delimiter: u8,
    /// Character encoding of the checked files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Report format: tsv or xlsx
    #[arg(long = "format", value_parser = parse_result_format)]
    pub format: ResultFormat,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Directory containing .csv/.tsv files
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Directory receiving the normalized .tsv files
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Delimiter of the input files; inferred from each file's first line when omitted
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Number of rows processed per chunk
    #[arg(long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Directory containing normalized .tsv files
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// SQLite database file
    #[arg(long = "db")]
    pub db: PathBuf,
    /// Destination table
    #[arg(long = "table")]
    pub table: String,
    /// Primary key column to generate when a file does not carry it
    #[arg(long = "primary-key")]
    pub primary_key: Option<String>,
    /// Column whose value prefixes the surrogate key
    #[arg(long = "id-column", default_value = crate::load::DEFAULT_IDENTIFIER_COLUMN)]
    pub id_column: String,
    /// Name of the generated surrogate key column
    #[arg(long = "key-column", default_value = crate::load::DEFAULT_SURROGATE_KEY_COLUMN)]
    pub key_column: String,
    /// Keep generated primary keys unique across files and runs
    #[arg(long = "global-primary-key")]
    pub global_primary_key: bool,
    /// Explicit column types such as `CODESC=text` (integer, real, text)
    #[arg(long = "column-type", value_parser = parse_column_type, action = clap::ArgAction::Append)]
    pub column_types: Vec<(String, ColumnType)>,
}

#[derive(Debug, Args)]
pub struct JoinArgs {
    /// SQLite database file
    #[arg(long = "db")]
    pub db: PathBuf,
    /// Left table; its values win for shared columns
    #[arg(long = "left")]
    pub left: String,
    /// Right table
    #[arg(long = "right")]
    pub right: String,
    /// Table created from the join (must not exist)
    #[arg(long = "output")]
    pub output: String,
    /// Join key present in both tables
    #[arg(long = "key", default_value = crate::load::DEFAULT_SURROGATE_KEY_COLUMN)]
    pub key: String,
    /// Column kept from both sides under table-specific aliases
    #[arg(long = "origin-column", default_value = crate::join::DEFAULT_ORIGIN_COLUMN)]
    pub origin_column: String,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_result_format(value: &str) -> Result<ResultFormat, String> {
    value.parse().map_err(|err: crate::error::PrepError| err.to_string())
}

pub fn parse_column_type(value: &str) -> Result<(String, ColumnType), String> {
    let (name, column_type) = value
        .split_once('=')
        .ok_or_else(|| format!("Expected NAME=TYPE but found '{value}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("Column name cannot be empty".to_string());
    }
    let column_type = column_type
        .parse::<ColumnType>()
        .map_err(|err| err.to_string())?;
    Ok((name.to_string(), column_type))
}
