//! Table definitions from `information_schema`.
//!
//! Columns come from `COLUMNS` ordered by `ORDINAL_POSITION`; primary and
//! unique keys from `STATISTICS` rows with `NON_UNIQUE = 0`.

use crate::definition::{ColumnDefinition, TableDefinition, TableIdentity};
use crate::SchemaError;
use mysql_async::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const SYSTEM_SCHEMAS: &str = "'information_schema','mysql','performance_schema','sys'";

fn field<T: FromValue>(
    row: &mysql_async::Row,
    index: usize,
    name: &'static str,
) -> Result<T, SchemaError> {
    row.get_opt::<T, _>(index)
        .and_then(Result::ok)
        .ok_or(SchemaError::MissingField { field: name })
}

/// Load definitions for every user table accepted by `include`.
pub async fn load_tables<F>(
    conn: &mut mysql_async::Conn,
    include: F,
) -> Result<Vec<TableDefinition>, SchemaError>
where
    F: Fn(&TableIdentity) -> bool,
{
    let columns_query = format!(
        "SELECT TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, DATA_TYPE, COLUMN_TYPE, IS_NULLABLE, EXTRA
         FROM information_schema.COLUMNS
         WHERE TABLE_SCHEMA NOT IN ({SYSTEM_SCHEMAS})
         ORDER BY TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION"
    );
    let column_rows: Vec<mysql_async::Row> = conn.query(columns_query).await?;

    let mut tables: BTreeMap<TableIdentity, TableDefinition> = BTreeMap::new();
    for row in column_rows {
        let database: String = field(&row, 0, "TABLE_SCHEMA")?;
        let table: String = field(&row, 1, "TABLE_NAME")?;
        let identity = TableIdentity::new(&database, &table);
        if !include(&identity) {
            continue;
        }
        let name: String = field(&row, 2, "COLUMN_NAME")?;
        let data_type: String = field(&row, 3, "DATA_TYPE")?;
        let column_type: String = field(&row, 4, "COLUMN_TYPE")?;
        let is_nullable: String = field(&row, 5, "IS_NULLABLE")?;
        let extra: String = field(&row, 6, "EXTRA")?;

        let column = ColumnDefinition::new(name, &data_type, &column_type)
            .with_nullable(is_nullable.eq_ignore_ascii_case("yes"))
            .with_auto_increment(extra.to_ascii_lowercase().contains("auto_increment"));
        tables
            .entry(identity)
            .or_insert_with(|| TableDefinition::new(database, table))
            .push_column(column);
    }

    let keys_query = format!(
        "SELECT TABLE_SCHEMA, TABLE_NAME, INDEX_NAME, COLUMN_NAME
         FROM information_schema.STATISTICS
         WHERE NON_UNIQUE = 0 AND TABLE_SCHEMA NOT IN ({SYSTEM_SCHEMAS})
         ORDER BY TABLE_SCHEMA, TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX"
    );
    let key_rows: Vec<mysql_async::Row> = conn.query(keys_query).await?;

    let mut keys: BTreeMap<(TableIdentity, String), Vec<String>> = BTreeMap::new();
    for row in key_rows {
        let database: String = field(&row, 0, "TABLE_SCHEMA")?;
        let table: String = field(&row, 1, "TABLE_NAME")?;
        let index_name: String = field(&row, 2, "INDEX_NAME")?;
        // functional key parts have a NULL column name
        let Some(column) = row.get_opt::<Option<String>, _>(3).and_then(Result::ok).flatten()
        else {
            continue;
        };
        keys.entry((TableIdentity::new(&database, &table), index_name))
            .or_default()
            .push(column);
    }

    for ((identity, index_name), columns) in keys {
        let Some(table) = tables.get_mut(&identity) else {
            continue;
        };
        let result = if index_name.eq_ignore_ascii_case("primary") {
            table.set_primary_key(&columns)
        } else {
            table.add_unique_key(Some(&index_name), &columns)
        };
        if let Err(e) = result {
            warn!(table = %identity, key = %index_name, "skipping key: {e}");
        }
    }

    for table in tables.values() {
        debug!(
            table = %table.identity(),
            columns = table.columns.len(),
            unique_keys = table.unique_keys.len(),
            has_primary_key = table.primary_key.is_some(),
            "loaded table definition"
        );
    }
    info!(tables = tables.len(), "loaded table definitions from information_schema");
    Ok(tables.into_values().collect())
}
