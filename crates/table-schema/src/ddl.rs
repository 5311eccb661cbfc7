//! Replays classified DDL against the registry.
//!
//! Must be driven in binlog order by a single caller. A statement that names
//! a column the current definition does not have fails with
//! [`DdlError::Schema`]: the tracked schema no longer matches the stream.

use crate::definition::{ColumnDefinition, InsertPosition, TableDefinition, TableIdentity};
use crate::registry::{SchemaRegistry, SchemaSource};
use crate::SchemaError;
use sql_classify::{
    AlterAction, ColumnPosition, ColumnSpec, CreateTable, CreateTableBody, KeyKind, KeySpec,
    Statement, TableRef,
};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum DdlError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Effect of one statement on the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlOutcome {
    Applied,
    /// The statement does not change any tracked definition.
    Unchanged,
    /// The statement targets a table the registry does not know.
    UnknownTable(TableIdentity),
}

fn identity(table: &TableRef) -> TableIdentity {
    TableIdentity::new(&table.database, &table.table)
}

fn column_from_spec(spec: &ColumnSpec) -> ColumnDefinition {
    let mut column = ColumnDefinition::new(&spec.name, &spec.data_type, &spec.column_type)
        .with_nullable(spec.nullable)
        .with_auto_increment(spec.auto_increment);
    column.unsigned = spec.unsigned;
    column
}

fn apply_inline_keys(table: &mut TableDefinition, spec: &ColumnSpec) -> Result<(), SchemaError> {
    if spec.primary_key {
        table.set_primary_key(std::slice::from_ref(&spec.name))?;
    }
    if spec.unique {
        table.add_unique_key(None, std::slice::from_ref(&spec.name))?;
    }
    Ok(())
}

fn apply_key(table: &mut TableDefinition, key: &KeySpec) -> Result<(), SchemaError> {
    match key.kind {
        KeyKind::Primary => table.set_primary_key(&key.columns),
        KeyKind::Unique => table.add_unique_key(key.name.as_deref(), &key.columns),
    }
}

fn insert_position(position: &ColumnPosition) -> Option<InsertPosition> {
    match position {
        ColumnPosition::Unspecified => None,
        ColumnPosition::First => Some(InsertPosition::First),
        ColumnPosition::After(column) => Some(InsertPosition::After(column.clone())),
    }
}

/// Apply one statement to the registry.
pub fn apply_statement(
    registry: &SchemaRegistry,
    statement: &Statement,
) -> Result<DdlOutcome, DdlError> {
    match statement {
        Statement::CreateTable(create) => create_table(registry, create),
        Statement::AlterTable(alter) => {
            let id = identity(&alter.table);
            let Some(current) = registry.get(&id) else {
                return Ok(DdlOutcome::UnknownTable(id));
            };
            let mut table = current.as_ref().clone();
            for action in &alter.actions {
                apply_alter_action(&mut table, action)?;
            }
            let new_id = table.identity();
            if new_id != id {
                registry.remove(&id);
            }
            registry.set(new_id, table, SchemaSource::ReplayedDdl);
            Ok(DdlOutcome::Applied)
        }
        Statement::CreateIndex(index) => {
            if !index.unique || index.columns.is_empty() {
                debug!(index = %index.name, table = %index.table, "index not tracked");
                return Ok(DdlOutcome::Unchanged);
            }
            let id = identity(&index.table);
            let Some(current) = registry.get(&id) else {
                return Ok(DdlOutcome::UnknownTable(id));
            };
            let mut table = current.as_ref().clone();
            if let Err(e) = table.add_unique_key(Some(&index.name), &index.columns) {
                warn!(index = %index.name, table = %id, "unique index not tracked: {e}");
                return Ok(DdlOutcome::Unchanged);
            }
            registry.set(id, table, SchemaSource::ReplayedDdl);
            Ok(DdlOutcome::Applied)
        }
        Statement::DropIndex(index) => {
            let id = identity(&index.table);
            let Some(current) = registry.get(&id) else {
                return Ok(DdlOutcome::UnknownTable(id));
            };
            let mut table = current.as_ref().clone();
            if !table.drop_key(&index.name) {
                return Ok(DdlOutcome::Unchanged);
            }
            registry.set(id, table, SchemaSource::ReplayedDdl);
            Ok(DdlOutcome::Applied)
        }
        Statement::DropTable(tables) => {
            for table in tables {
                if registry.remove(&identity(table)).is_none() {
                    debug!(table = %table, "dropped table was not tracked");
                }
            }
            Ok(DdlOutcome::Applied)
        }
        Statement::DropDatabase(database) => {
            let removed = registry.remove_database(database);
            debug!(database = %database, removed, "dropped database");
            Ok(DdlOutcome::Applied)
        }
        Statement::RenameTable(pairs) => {
            let mut outcome = DdlOutcome::Applied;
            for (from, to) in pairs {
                let from = identity(from);
                if !registry.rename(&from, &identity(to)) {
                    outcome = DdlOutcome::UnknownTable(from);
                }
            }
            Ok(outcome)
        }
        Statement::CreateDatabase(_)
        | Statement::AlterDatabase(_)
        | Statement::TruncateTable(_)
        | Statement::Dml(_) => Ok(DdlOutcome::Unchanged),
    }
}

fn create_table(registry: &SchemaRegistry, create: &CreateTable) -> Result<DdlOutcome, DdlError> {
    let id = identity(&create.table);
    if create.if_not_exists && registry.contains(&id) {
        return Ok(DdlOutcome::Unchanged);
    }

    let table = match &create.body {
        CreateTableBody::Like(source) => {
            let source_id = identity(source);
            let Some(source) = registry.get(&source_id) else {
                return Ok(DdlOutcome::UnknownTable(source_id));
            };
            let mut table = source.as_ref().clone();
            table.database = create.table.database.clone();
            table.table = create.table.table.clone();
            table
        }
        CreateTableBody::Columns { columns, .. } if columns.is_empty() => {
            debug!(table = %id, "CREATE TABLE without column list not tracked");
            return Ok(DdlOutcome::Unchanged);
        }
        CreateTableBody::Columns { columns, keys } => {
            let mut table =
                TableDefinition::new(create.table.database.clone(), create.table.table.clone());
            for spec in columns {
                table.insert_column(column_from_spec(spec), &InsertPosition::End)?;
            }
            for spec in columns {
                apply_inline_keys(&mut table, spec)?;
            }
            for key in keys {
                apply_key(&mut table, key)?;
            }
            table
        }
    };

    registry.set(id, table, SchemaSource::ReplayedDdl);
    Ok(DdlOutcome::Applied)
}

fn apply_alter_action(table: &mut TableDefinition, action: &AlterAction) -> Result<(), SchemaError> {
    match action {
        AlterAction::AddColumns { columns, position } => {
            let mut position = insert_position(position).unwrap_or(InsertPosition::End);
            for spec in columns {
                table.insert_column(column_from_spec(spec), &position)?;
                apply_inline_keys(table, spec)?;
                if position != InsertPosition::End {
                    position = InsertPosition::After(spec.name.clone());
                }
            }
        }
        AlterAction::DropColumn(name) => {
            table.remove_column(name)?;
        }
        AlterAction::ModifyColumn { column, position } => {
            table.replace_column(
                &column.name,
                column_from_spec(column),
                insert_position(position).as_ref(),
            )?;
            apply_inline_keys(table, column)?;
        }
        AlterAction::ChangeColumn {
            old_name,
            column,
            position,
        } => {
            table.replace_column(
                old_name,
                column_from_spec(column),
                insert_position(position).as_ref(),
            )?;
            apply_inline_keys(table, column)?;
        }
        AlterAction::RenameColumn { from, to } => {
            let mut column = table
                .column(from)
                .cloned()
                .ok_or_else(|| SchemaError::ColumnNotFound {
                    table: table.identity().full_name(),
                    column: from.clone(),
                })?;
            column.name = to.clone();
            table.replace_column(from, column, None)?;
        }
        AlterAction::AddKey(key) => apply_key(table, key)?,
        AlterAction::DropPrimaryKey => {
            table.drop_primary_key();
        }
        AlterAction::DropIndex(name) => {
            table.drop_key(name);
        }
        AlterAction::RenameIndex { from, to } => {
            table.rename_key(from, to);
        }
        AlterAction::RenameTable(to) => {
            table.database = to.database.clone();
            table.table = to.table.clone();
        }
        AlterAction::Other => {}
    }
    Ok(())
}
