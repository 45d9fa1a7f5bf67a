//! Thin wrapper over a single-file SQLite database.
//!
//! Each batch operation opens its own [`Store`] and drops it before returning,
//! so the connection never outlives the call. Table and column names are
//! always quoted with [`quote_identifier`].

use std::path::Path;

use log::debug;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter, types::Value as SqlValue};

use crate::{
    error::PrepError,
    schema::{ColumnSpec, ColumnType, TableSchema},
};

pub type StoreResult<T> = std::result::Result<T, PrepError>;

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> StoreResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn table_exists(&self, table: &str) -> StoreResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master \
                 WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                params![table],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn drop_table_if_exists(&self, table: &str) -> StoreResult<()> {
        self.execute(&format!("DROP TABLE IF EXISTS {}", quote_identifier(table)))?;
        Ok(())
    }

    /// Reads column names and declared types from the schema catalog.
    pub fn table_schema(&self, table: &str) -> StoreResult<TableSchema> {
        let sql = format!("PRAGMA table_info({})", quote_identifier(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let declared: String = row.get(2)?;
                Ok(ColumnSpec {
                    name,
                    column_type: ColumnType::from_declared(&declared),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TableSchema { columns })
    }

    pub fn create_table(&self, table: &str, schema: &TableSchema) -> StoreResult<()> {
        let definitions = schema
            .columns
            .iter()
            .map(|column| {
                format!(
                    "{} {}",
                    quote_identifier(&column.name),
                    column.column_type.sql_type()
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        self.execute(&format!(
            "CREATE TABLE {} ({definitions})",
            quote_identifier(table)
        ))?;
        Ok(())
    }

    /// Inserts `rows` by column name inside a single transaction.
    pub fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<SqlValue>],
    ) -> StoreResult<usize> {
        let column_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|idx| format!("?{idx}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
            quote_identifier(table)
        );
        debug!("{sql}");
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Largest value of `column` read as an integer, or 0 for an empty table.
    /// Text cells that do not parse count as 0.
    pub fn max_integer(&self, table: &str, column: &str) -> StoreResult<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX(CAST({} AS INTEGER)), 0) FROM {}",
            quote_identifier(column),
            quote_identifier(table)
        );
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    pub fn row_count(&self, table: &str) -> StoreResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn execute(&self, sql: &str) -> StoreResult<usize> {
        debug!("{sql}");
        Ok(self.conn.execute(sql, [])?)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
