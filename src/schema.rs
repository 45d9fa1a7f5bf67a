//! Column typing for loaded tables.
//!
//! A table's column types are fixed when the table is created: inferred from
//! the first file's values, then overridden by any explicit mapping the caller
//! supplies. Later files are coerced to those types instead of redefining them.

use std::{fmt, str::FromStr};

use rusqlite::types::Value as SqlValue;

use crate::error::PrepError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Maps a declared SQLite column type onto its affinity.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            ColumnType::Integer
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            ColumnType::Real
        } else {
            ColumnType::Text
        }
    }

    /// Converts a raw cell into a bound value. Empty cells become NULL and
    /// values that do not parse as the column type are stored as text.
    pub fn to_sql_value(&self, raw: &str) -> SqlValue {
        if raw.is_empty() {
            return SqlValue::Null;
        }
        match self {
            ColumnType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(SqlValue::Integer)
                .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
            ColumnType::Real => raw
                .trim()
                .parse::<f64>()
                .map(SqlValue::Real)
                .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
            ColumnType::Text => SqlValue::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_type())
    }
}

impl FromStr for ColumnType {
    type Err = PrepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" => Ok(ColumnType::Integer),
            "real" | "float" | "double" => Ok(ColumnType::Real),
            "text" | "string" => Ok(ColumnType::Text),
            other => Err(PrepError::InvalidArgument(format!(
                "Unknown column type '{other}' (expected integer, real, or text)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Sets the type of `name`; returns `false` when the column is unknown.
    pub fn set_type(&mut self, name: &str, column_type: ColumnType) -> bool {
        match self.column_index(name) {
            Some(idx) => {
                self.columns[idx].column_type = column_type;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    seen_value: bool,
    possible_integer: bool,
    possible_real: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            seen_value: false,
            possible_integer: true,
            possible_real: true,
        }
    }

    fn observe(&mut self, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        self.seen_value = true;
        if self.possible_integer && value.parse::<i64>().is_err() {
            self.possible_integer = false;
        }
        if self.possible_real && value.parse::<f64>().is_err() {
            self.possible_real = false;
        }
    }

    fn decide(&self) -> ColumnType {
        if !self.seen_value {
            ColumnType::Text
        } else if self.possible_integer {
            ColumnType::Integer
        } else if self.possible_real {
            ColumnType::Real
        } else {
            ColumnType::Text
        }
    }
}

pub fn infer_schema(headers: &[String], rows: &[Vec<String>]) -> TableSchema {
    let mut candidates = vec![TypeCandidate::new(); headers.len()];
    for row in rows {
        for (idx, value) in row.iter().enumerate().take(headers.len()) {
            candidates[idx].observe(value);
        }
    }
    let columns = headers
        .iter()
        .zip(candidates.iter())
        .map(|(name, candidate)| ColumnSpec {
            name: name.clone(),
            column_type: candidate.decide(),
        })
        .collect();
    TableSchema { columns }
}
