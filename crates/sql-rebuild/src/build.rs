//! Forward and rollback statement construction.

use crate::decode::{DecodedEvent, DecodedRows, Row, SqlValue};
use crate::RebuildError;
use table_schema::TableDefinition;

/// Which statements to produce for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Replays the change
    Forward,
    /// Undoes the change
    Rollback,
}

#[derive(Debug, Clone)]
pub struct RebuildOptions {
    /// SET and WHERE clauses use every column
    pub full_columns: bool,
    /// Identify rows by a unique key before the primary key
    pub prefer_unique_key: bool,
    /// Leave primary key columns out of INSERT statements
    pub ignore_primary_key_for_insert: bool,
    /// Maximum number of rows per INSERT statement
    pub insert_batch_rows: usize,
    /// Qualify table names with their database
    pub schema_prefix: bool,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            full_columns: false,
            prefer_unique_key: false,
            ignore_primary_key_for_insert: false,
            insert_batch_rows: 30,
            schema_prefix: true,
        }
    }
}

/// Builds DML statements from decoded row images.
#[derive(Debug, Clone, Default)]
pub struct Reconstructor {
    options: RebuildOptions,
}

impl Reconstructor {
    pub fn new(options: RebuildOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RebuildOptions {
        &self.options
    }

    /// Statements replaying (`Forward`) or undoing (`Rollback`) `event`, in
    /// the order they must run.
    ///
    /// Rollback swaps the roles of the images: an insert is undone by a
    /// delete of the inserted rows, a delete by an insert of the deleted
    /// rows and an update by an update from the after image back to the
    /// before image.
    pub fn build(
        &self,
        event: &DecodedEvent,
        direction: Direction,
    ) -> Result<Vec<String>, RebuildError> {
        let table = event.table.as_ref();
        match (&event.rows, direction) {
            (DecodedRows::Insert(rows), Direction::Forward)
            | (DecodedRows::Delete(rows), Direction::Rollback) => {
                self.inserts(table, rows, direction)
            }
            (DecodedRows::Delete(rows), Direction::Forward)
            | (DecodedRows::Insert(rows), Direction::Rollback) => rows
                .iter()
                .map(|row| self.delete(table, row))
                .collect(),
            (DecodedRows::Update(pairs), Direction::Forward) => {
                self.updates(table, pairs.iter().map(|(before, after)| (before, after)))
            }
            (DecodedRows::Update(pairs), Direction::Rollback) => {
                self.updates(table, pairs.iter().map(|(before, after)| (after, before)))
            }
        }
    }

    fn table_name(&self, table: &TableDefinition) -> String {
        if self.options.schema_prefix {
            format!("{}.{}", quote_identifier(&table.database), quote_identifier(&table.table))
        } else {
            quote_identifier(&table.table)
        }
    }

    /// Multi-row INSERT statements of at most `insert_batch_rows` rows each.
    ///
    /// Primary key columns are left out only of forward inserts; a rollback
    /// insert restores deleted rows with their original keys.
    fn inserts(
        &self,
        table: &TableDefinition,
        rows: &[Row],
        direction: Direction,
    ) -> Result<Vec<String>, RebuildError> {
        let skip_primary_key =
            self.options.ignore_primary_key_for_insert && direction == Direction::Forward;
        let skipped: Vec<usize> = match &table.primary_key {
            Some(pk) if skip_primary_key => pk.column_indices(),
            _ => Vec::new(),
        };
        let columns: Vec<usize> = (0..table.columns.len())
            .filter(|i| !skipped.contains(i))
            .collect();
        let column_list = columns
            .iter()
            .map(|&i| quote_identifier(&table.columns[i].name))
            .collect::<Vec<_>>()
            .join(",");
        let name = self.table_name(table);

        let mut statements = Vec::new();
        for batch in rows.chunks(self.options.insert_batch_rows.max(1)) {
            let mut tuples = Vec::with_capacity(batch.len());
            for row in batch {
                check_width(table, row)?;
                let values = columns
                    .iter()
                    .map(|&i| render_literal(&row[i]))
                    .collect::<Vec<_>>()
                    .join(",");
                tuples.push(format!("({values})"));
            }
            statements.push(format!(
                "INSERT INTO {name} ({column_list}) VALUES {};",
                tuples.join(",")
            ));
        }
        Ok(statements)
    }

    fn delete(&self, table: &TableDefinition, row: &Row) -> Result<String, RebuildError> {
        check_width(table, row)?;
        Ok(format!(
            "DELETE FROM {} WHERE {};",
            self.table_name(table),
            self.where_clause(table, row)
        ))
    }

    /// One UPDATE per pair whose images differ, moving rows from the first
    /// image of the pair to the second.
    fn updates<'a>(
        &self,
        table: &TableDefinition,
        pairs: impl Iterator<Item = (&'a Row, &'a Row)>,
    ) -> Result<Vec<String>, RebuildError> {
        let name = self.table_name(table);
        let mut statements = Vec::new();
        for (from, to) in pairs {
            check_width(table, from)?;
            check_width(table, to)?;
            let changed = changed_columns(from, to);
            if changed.is_empty() {
                continue;
            }
            let set_columns: Vec<usize> = if self.options.full_columns {
                (0..table.columns.len()).collect()
            } else {
                changed
            };
            let assignments = set_columns
                .iter()
                .map(|&i| {
                    format!(
                        "{}={}",
                        quote_identifier(&table.columns[i].name),
                        render_literal(&to[i])
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            statements.push(format!(
                "UPDATE {name} SET {assignments} WHERE {};",
                self.where_clause(table, from)
            ));
        }
        Ok(statements)
    }

    /// Columns that identify a row: every column with `full_columns` or when
    /// the table has no primary or unique key, otherwise the chosen key.
    pub fn key_columns(&self, table: &TableDefinition) -> Vec<usize> {
        if !self.options.full_columns {
            if let Some(key) = table.identifying_key(self.options.prefer_unique_key) {
                return key.column_indices();
            }
        }
        (0..table.columns.len()).collect()
    }

    fn where_clause(&self, table: &TableDefinition, row: &Row) -> String {
        self.key_columns(table)
            .into_iter()
            .map(|i| {
                let column = quote_identifier(&table.columns[i].name);
                match &row[i] {
                    SqlValue::Null => format!("{column} IS NULL"),
                    value => format!("{column}={}", render_literal(value)),
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

fn check_width(table: &TableDefinition, row: &Row) -> Result<(), RebuildError> {
    if row.len() == table.columns.len() {
        Ok(())
    } else {
        Err(RebuildError::RowWidth {
            table: table.identity().to_string(),
            expected: table.columns.len(),
            found: row.len(),
        })
    }
}

/// Positions where the two images differ.
pub fn changed_columns(before: &Row, after: &Row) -> Vec<usize> {
    before
        .iter()
        .zip(after)
        .enumerate()
        .filter(|(_, (b, a))| b != a)
        .map(|(i, _)| i)
        .collect()
}

/// Backtick-quoted identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// SQL literal for a value.
pub fn render_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Int(v) => v.to_string(),
        SqlValue::UInt(v) => v.to_string(),
        SqlValue::Float(v) => v.to_string(),
        SqlValue::Double(v) => v.to_string(),
        SqlValue::Decimal(v) => v.clone(),
        SqlValue::String(s) => quote_string(s),
        SqlValue::Bytes(bytes) if bytes.is_empty() => "''".to_string(),
        SqlValue::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            format!("0x{hex}")
        }
    }
}

/// Single-quoted string with MySQL backslash escapes.
pub fn quote_string(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for c in s.chars() {
        match c {
            '\0' => quoted.push_str("\\0"),
            '\'' => quoted.push_str("\\'"),
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '\u{8}' => quoted.push_str("\\b"),
            '\u{1a}' => quoted.push_str("\\Z"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}
