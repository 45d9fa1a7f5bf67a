//! Loading normalized TSV files into a SQLite table.
//!
//! Every row gets a surrogate key built from an identifier column and the last
//! four characters of its file stem (typically a year), plus an optional
//! generated integer primary key. The first load into a missing table starts
//! clean; loads into an existing table append.

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rusqlite::types::Value as SqlValue;

use crate::{
    error::PrepError,
    io_utils,
    schema::{self, ColumnType, TableSchema},
    store::Store,
};

pub const DEFAULT_IDENTIFIER_COLUMN: &str = "CODESC";
pub const DEFAULT_SURROGATE_KEY_COLUMN: &str = "SK_CODESC_ANO";
pub const SURROGATE_SUFFIX_CHARS: usize = 4;
pub const LOAD_SUFFIX: &str = ".tsv";

/// How generated primary keys are numbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeySequence {
    /// Restart at 1 for every file.
    #[default]
    PerFile,
    /// Continue from the largest key already stored in the table.
    Global,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Primary key column to generate when a file does not carry it.
    pub primary_key: Option<String>,
    pub identifier_column: String,
    pub surrogate_key_column: String,
    pub key_sequence: KeySequence,
    /// Explicit types that win over inference when the table is created.
    pub column_types: Vec<(String, ColumnType)>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            primary_key: None,
            identifier_column: DEFAULT_IDENTIFIER_COLUMN.to_string(),
            surrogate_key_column: DEFAULT_SURROGATE_KEY_COLUMN.to_string(),
            key_sequence: KeySequence::default(),
            column_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub table: String,
    pub created: bool,
    pub files: usize,
    pub rows: usize,
}

/// Last [`SURROGATE_SUFFIX_CHARS`] characters of the file stem, or the whole
/// stem when it is shorter.
pub fn surrogate_suffix(path: &Path) -> String {
    let stem = io_utils::file_stem(path).unwrap_or_default();
    let count = stem.chars().count();
    stem.chars()
        .skip(count.saturating_sub(SURROGATE_SUFFIX_CHARS))
        .collect()
}

pub fn surrogate_key(identifier: &str, path: &Path) -> String {
    format!("{identifier}{}", surrogate_suffix(path))
}

pub fn load_directory_to_table(
    source_dir: &Path,
    db_path: &Path,
    table: &str,
    options: &LoadOptions,
) -> Result<LoadSummary> {
    if table.trim().is_empty() {
        return Err(PrepError::InvalidArgument("Table name cannot be empty".to_string()).into());
    }
    let mut store =
        Store::open(db_path).with_context(|| format!("Opening database {db_path:?}"))?;
    let existed = store.table_exists(table)?;
    let mut schema = if existed {
        Some(store.table_schema(table)?)
    } else {
        store.drop_table_if_exists(table)?;
        None
    };

    let mut next_key = match (&options.primary_key, &schema, options.key_sequence) {
        (Some(pk), Some(existing), KeySequence::Global) if existing.contains(pk) => {
            store.max_integer(table, pk)? + 1
        }
        _ => 1,
    };

    let files = io_utils::list_files_with_suffixes(source_dir, &[LOAD_SUFFIX])?;
    let mut total_rows = 0usize;
    for path in &files {
        if options.key_sequence == KeySequence::PerFile {
            next_key = 1;
        }
        let (headers, rows) = read_prepared_file(path, options, &mut next_key)
            .with_context(|| format!("Preparing {path:?} for table '{table}'"))?;

        let table_schema = match schema.take() {
            Some(existing) => {
                ensure_columns_known(table, &existing, &headers)?;
                existing
            }
            None => {
                let created = build_schema(&headers, &rows, options);
                store.create_table(table, &created)?;
                info!(
                    "Created table '{}' with {} column(s)",
                    table,
                    created.columns.len()
                );
                created
            }
        };

        let values = to_sql_rows(&table_schema, &headers, &rows);
        schema = Some(table_schema);
        let inserted = store
            .insert_rows(table, &headers, &values)
            .with_context(|| format!("Inserting rows from {path:?} into '{table}'"))?;
        total_rows += inserted;
        info!("✓ Loaded {} row(s) from {:?} into '{}'", inserted, path, table);
    }

    info!(
        "Loaded {} file(s), {} row(s) into '{}'",
        files.len(),
        total_rows,
        table
    );
    Ok(LoadSummary {
        table: table.to_string(),
        created: !existed && schema.is_some(),
        files: files.len(),
        rows: total_rows,
    })
}

/// Reads `path` and returns its columns and rows with the surrogate key and
/// any generated primary key applied.
fn read_prepared_file(
    path: &Path,
    options: &LoadOptions,
    next_key: &mut i64,
) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut reader = io_utils::open_csv_reader_from_path(path, io_utils::TSV_DELIMITER, true)?;
    let mut headers: Vec<String> = reader
        .headers()
        .map_err(|err| PrepError::parse(path, err))?
        .iter()
        .map(str::to_string)
        .collect();
    ensure_unique(path, &headers)?;
    let width = headers.len();

    let identifier_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(&options.identifier_column))
        .ok_or_else(|| PrepError::MissingColumn {
            column: options.identifier_column.clone(),
            path: path.to_path_buf(),
        })?;
    let suffix = surrogate_suffix(path);
    let key_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(&options.surrogate_key_column));
    if key_idx.is_none() {
        headers.push(options.surrogate_key_column.clone());
    }
    let generate_pk = options
        .primary_key
        .as_ref()
        .filter(|pk| !headers.iter().any(|h| h.eq_ignore_ascii_case(pk)));
    if let Some(pk) = generate_pk {
        headers.insert(0, pk.clone());
    }

    let mut rows = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let mut record = record
            .map_err(|err| PrepError::parse(path, err))
            .with_context(|| format!("Reading row {}", row_idx + 2))?;
        io_utils::pad_record(&mut record, width)
            .map_err(|message| PrepError::parse(path, message))?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        let key = format!("{}{suffix}", row[identifier_idx]);
        match key_idx {
            Some(idx) => row[idx] = key,
            None => row.push(key),
        }
        if generate_pk.is_some() {
            row.insert(0, next_key.to_string());
            *next_key += 1;
        }
        rows.push(row);
    }
    debug!("{:?}: {} row(s), suffix '{}'", path, rows.len(), suffix);
    Ok((headers, rows))
}

fn ensure_unique(path: &Path, headers: &[String]) -> Result<()> {
    for (idx, name) in headers.iter().enumerate() {
        if headers[..idx].iter().any(|h| h.eq_ignore_ascii_case(name)) {
            return Err(PrepError::parse(path, format!("duplicate column '{name}'")).into());
        }
    }
    Ok(())
}

fn build_schema(headers: &[String], rows: &[Vec<String>], options: &LoadOptions) -> TableSchema {
    let mut table_schema = schema::infer_schema(headers, rows);
    table_schema.set_type(&options.surrogate_key_column, ColumnType::Text);
    if let Some(pk) = &options.primary_key {
        table_schema.set_type(pk, ColumnType::Integer);
    }
    for (name, column_type) in &options.column_types {
        if !table_schema.set_type(name, *column_type) {
            warn!("Ignoring type override for unknown column '{name}'");
        }
    }
    table_schema
}

fn ensure_columns_known(table: &str, existing: &TableSchema, headers: &[String]) -> Result<()> {
    let unknown: Vec<&str> = headers
        .iter()
        .filter(|h| !existing.contains(h))
        .map(String::as_str)
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(PrepError::SchemaMismatch {
            table: table.to_string(),
            message: format!("unknown column(s) {}", unknown.join(", ")),
        }
        .into())
    }
}

fn to_sql_rows(
    schema: &TableSchema,
    headers: &[String],
    rows: &[Vec<String>],
) -> Vec<Vec<SqlValue>> {
    let types: Vec<ColumnType> = headers
        .iter()
        .map(|h| {
            schema
                .column_index(h)
                .map(|idx| schema.columns[idx].column_type)
                .unwrap_or(ColumnType::Text)
        })
        .collect();
    rows.iter()
        .map(|row| {
            row.iter()
                .zip(types.iter())
                .map(|(value, column_type)| column_type.to_sql_value(value))
                .collect()
        })
        .collect()
}
