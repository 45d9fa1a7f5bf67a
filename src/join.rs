//! Equi-join of two loaded tables into a new table.
//!
//! Columns shared by both tables appear once, taken from the left table. The
//! origin column is the exception: it is kept from both sides under
//! `<ORIGIN>_<TABLE>` aliases so each row still records where it came from.

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{
    error::PrepError,
    load::DEFAULT_SURROGATE_KEY_COLUMN,
    store::{Store, quote_identifier},
};

pub const DEFAULT_ORIGIN_COLUMN: &str = "DATABASE";

const LEFT_ALIAS: &str = "l";
const RIGHT_ALIAS: &str = "r";

#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub left_table: String,
    pub right_table: String,
    pub output_table: String,
    pub join_key: String,
    pub origin_column: String,
}

impl JoinSpec {
    pub fn new(
        left_table: impl Into<String>,
        right_table: impl Into<String>,
        output_table: impl Into<String>,
    ) -> Self {
        Self {
            left_table: left_table.into(),
            right_table: right_table.into(),
            output_table: output_table.into(),
            join_key: DEFAULT_SURROGATE_KEY_COLUMN.to_string(),
            origin_column: DEFAULT_ORIGIN_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// One projected column of the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    pub side: Side,
    pub name: String,
    pub alias: Option<String>,
}

impl SelectColumn {
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    fn to_sql(&self) -> String {
        let table_alias = match self.side {
            Side::Left => LEFT_ALIAS,
            Side::Right => RIGHT_ALIAS,
        };
        let column = format!("{table_alias}.{}", quote_identifier(&self.name));
        match &self.alias {
            Some(alias) => format!("{column} AS {}", quote_identifier(alias)),
            None => column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSummary {
    pub output_table: String,
    pub columns: Vec<String>,
    pub rows: usize,
}

pub fn origin_alias(origin_column: &str, table: &str) -> String {
    format!("{origin_column}_{}", table.to_uppercase())
}

/// Resolves the projection: every left column, then right columns the left
/// table does not already provide. Names compare case-insensitively, as SQLite
/// identifiers do.
pub fn resolve_columns(
    left_columns: &[String],
    right_columns: &[String],
    spec: &JoinSpec,
) -> Vec<SelectColumn> {
    let is_origin = |name: &str| name.eq_ignore_ascii_case(&spec.origin_column);
    let mut columns = Vec::with_capacity(left_columns.len() + right_columns.len());
    for name in left_columns {
        columns.push(SelectColumn {
            side: Side::Left,
            name: name.clone(),
            alias: is_origin(name).then(|| origin_alias(&spec.origin_column, &spec.left_table)),
        });
    }
    for name in right_columns {
        if is_origin(name) {
            columns.push(SelectColumn {
                side: Side::Right,
                name: name.clone(),
                alias: Some(origin_alias(&spec.origin_column, &spec.right_table)),
            });
        } else if !left_columns.iter().any(|l| l.eq_ignore_ascii_case(name)) {
            columns.push(SelectColumn {
                side: Side::Right,
                name: name.clone(),
                alias: None,
            });
        }
    }
    columns
}

pub fn build_join_sql(spec: &JoinSpec, columns: &[SelectColumn]) -> String {
    let projection = columns
        .iter()
        .map(SelectColumn::to_sql)
        .collect::<Vec<_>>()
        .join(", ");
    let key = quote_identifier(&spec.join_key);
    format!(
        "CREATE TABLE {output} AS SELECT {projection} FROM {left} AS {LEFT_ALIAS} \
         JOIN {right} AS {RIGHT_ALIAS} ON {LEFT_ALIAS}.{key} = {RIGHT_ALIAS}.{key}",
        output = quote_identifier(&spec.output_table),
        left = quote_identifier(&spec.left_table),
        right = quote_identifier(&spec.right_table),
    )
}

pub fn join_tables(db_path: &Path, spec: &JoinSpec) -> Result<JoinSummary> {
    let store = Store::open(db_path).with_context(|| format!("Opening database {db_path:?}"))?;
    if store.table_exists(&spec.output_table)? {
        return Err(PrepError::TableExists(spec.output_table.clone()).into());
    }
    let left_columns = source_columns(&store, &spec.left_table, &spec.join_key)?;
    let right_columns = source_columns(&store, &spec.right_table, &spec.join_key)?;

    let columns = resolve_columns(&left_columns, &right_columns, spec);
    let sql = build_join_sql(spec, &columns);
    debug!("{sql}");
    store.execute(&sql).with_context(|| {
        format!(
            "Joining '{}' and '{}' into '{}'",
            spec.left_table, spec.right_table, spec.output_table
        )
    })?;
    let rows = store.row_count(&spec.output_table)?;
    info!(
        "Joined '{}' and '{}' on '{}' into '{}': {} row(s), {} column(s)",
        spec.left_table,
        spec.right_table,
        spec.join_key,
        spec.output_table,
        rows,
        columns.len()
    );
    Ok(JoinSummary {
        output_table: spec.output_table.clone(),
        columns: columns.iter().map(|c| c.output_name().to_string()).collect(),
        rows,
    })
}

fn source_columns(store: &Store, table: &str, join_key: &str) -> Result<Vec<String>> {
    if !store.table_exists(table)? {
        return Err(PrepError::SchemaMismatch {
            table: table.to_string(),
            message: "table does not exist".to_string(),
        }
        .into());
    }
    let schema = store.table_schema(table)?;
    if !schema.contains(join_key) {
        return Err(PrepError::SchemaMismatch {
            table: table.to_string(),
            message: format!("join key '{join_key}' is missing"),
        }
        .into());
    }
    Ok(schema.names())
}
