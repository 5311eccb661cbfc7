//! Column, key and table definitions.
//!
//! Key columns are stored as `(name, index)` pairs. The index is a position
//! into `TableDefinition::columns` and is re-derived by
//! [`TableDefinition::reindex_keys`] at the end of every column mutation.

use crate::types::{self, FieldType, UNKNOWN_DATA_TYPE};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Identity
// ============================================================================

/// Lower-cased `(database, table)` pair used as the registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdentity {
    pub database: String,
    pub table: String,
}

impl TableIdentity {
    pub fn new(database: impl AsRef<str>, table: impl AsRef<str>) -> Self {
        Self {
            database: database.as_ref().to_lowercase(),
            table: table.as_ref().to_lowercase(),
        }
    }

    /// `database.table`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

// ============================================================================
// Columns
// ============================================================================

/// A single column. Replaced wholesale when DDL touches it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,

    /// Base type name, e.g. `int` or `varchar`
    pub data_type: String,

    /// Full column type, e.g. `int(10) unsigned` or `enum('a','b')`
    pub column_type: String,

    pub field_type: FieldType,

    #[serde(default)]
    pub nullable: bool,

    #[serde(default)]
    pub unsigned: bool,

    #[serde(default)]
    pub auto_increment: bool,

    /// ENUM / SET elements in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<String>,
}

impl ColumnDefinition {
    /// Build a column from its data type and full column type.
    pub fn new(name: impl Into<String>, data_type: &str, column_type: &str) -> Self {
        let data_type = data_type.to_ascii_lowercase();
        let field_type = FieldType::from_data_type(&data_type);
        let elements = match field_type {
            FieldType::Enum | FieldType::Set => types::extract_elements(column_type),
            _ => Vec::new(),
        };
        Self {
            name: name.into(),
            unsigned: types::is_unsigned_column_type(column_type),
            data_type,
            column_type: column_type.to_string(),
            field_type,
            nullable: true,
            auto_increment: false,
            elements,
        }
    }

    /// Placeholder for a wire column the registry has no definition for.
    pub fn placeholder(index: usize) -> Self {
        Self {
            name: format!("dropped_column_{index}"),
            data_type: UNKNOWN_DATA_TYPE.to_string(),
            column_type: UNKNOWN_DATA_TYPE.to_string(),
            field_type: FieldType::Null,
            nullable: true,
            unsigned: false,
            auto_increment: false,
            elements: Vec::new(),
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }

    pub fn is_placeholder(&self) -> bool {
        self.data_type == UNKNOWN_DATA_TYPE
    }

    pub fn is_binary(&self) -> bool {
        types::is_binary_data_type(&self.data_type)
    }
}

// ============================================================================
// Keys
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyColumn {
    pub name: String,
    pub index: usize,
}

/// PRIMARY or UNIQUE key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyDefinition {
    pub name: String,
    #[serde(default)]
    pub primary: bool,
    pub columns: Vec<KeyColumn>,
}

impl KeyDefinition {
    pub fn column_indices(&self) -> Vec<usize> {
        self.columns.iter().map(|c| c.index).collect()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(column))
    }
}

// ============================================================================
// Tables
// ============================================================================

/// Where a new column is placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertPosition {
    First,
    After(String),
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableDefinition {
    pub database: String,
    pub table: String,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub primary_key: Option<KeyDefinition>,
    #[serde(default)]
    pub unique_keys: BTreeMap<String, KeyDefinition>,
}

impl TableDefinition {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            columns: Vec::new(),
            primary_key: None,
            unique_keys: BTreeMap::new(),
        }
    }

    pub fn identity(&self) -> TableIdentity {
        TableIdentity::new(&self.database, &self.table)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    fn column_not_found(&self, column: &str) -> SchemaError {
        SchemaError::ColumnNotFound {
            table: self.identity().full_name(),
            column: column.to_string(),
        }
    }

    fn resolve_position(&self, position: &InsertPosition) -> Result<usize, SchemaError> {
        match position {
            InsertPosition::First => Ok(0),
            InsertPosition::End => Ok(self.columns.len()),
            InsertPosition::After(name) => self
                .column_index(name)
                .map(|i| i + 1)
                .ok_or_else(|| self.column_not_found(name)),
        }
    }

    /// Append a column while building a definition (no key bookkeeping).
    pub fn push_column(&mut self, column: ColumnDefinition) {
        self.columns.push(column);
    }

    /// Insert a column at `position`.
    pub fn insert_column(
        &mut self,
        column: ColumnDefinition,
        position: &InsertPosition,
    ) -> Result<(), SchemaError> {
        if self.column_index(&column.name).is_some() {
            return Err(SchemaError::DuplicateColumn {
                table: self.identity().full_name(),
                column: column.name,
            });
        }
        let at = self.resolve_position(position)?;
        self.columns.insert(at, column);
        self.reindex_keys()
    }

    /// Remove a column. A PRIMARY or UNIQUE key that references it is
    /// dropped entirely.
    pub fn remove_column(&mut self, name: &str) -> Result<ColumnDefinition, SchemaError> {
        let index = self
            .column_index(name)
            .ok_or_else(|| self.column_not_found(name))?;

        if self.primary_key.as_ref().is_some_and(|k| k.contains(name)) {
            self.primary_key = None;
        }
        self.unique_keys.retain(|_, key| !key.contains(name));

        let removed = self.columns.remove(index);
        self.reindex_keys()?;
        Ok(removed)
    }

    /// Replace column `old_name` with `column` (MODIFY / CHANGE).
    ///
    /// Implemented as drop-then-add: the column is removed and re-inserted at
    /// `position`, or at its old position when none is given. Keys keep
    /// referencing the column under its new name.
    pub fn replace_column(
        &mut self,
        old_name: &str,
        column: ColumnDefinition,
        position: Option<&InsertPosition>,
    ) -> Result<(), SchemaError> {
        let old_index = self
            .column_index(old_name)
            .ok_or_else(|| self.column_not_found(old_name))?;
        if !old_name.eq_ignore_ascii_case(&column.name) && self.column_index(&column.name).is_some()
        {
            return Err(SchemaError::DuplicateColumn {
                table: self.identity().full_name(),
                column: column.name,
            });
        }

        let new_name = column.name.clone();
        self.columns.remove(old_index);
        let at = match position {
            Some(position) => self.resolve_position(position)?,
            None => old_index,
        };
        self.columns.insert(at, column);

        for key in self.keys_mut() {
            for key_column in &mut key.columns {
                if key_column.name.eq_ignore_ascii_case(old_name) {
                    key_column.name = new_name.clone();
                }
            }
        }
        self.reindex_keys()
    }

    fn keys_mut(&mut self) -> impl Iterator<Item = &mut KeyDefinition> {
        self.primary_key
            .iter_mut()
            .chain(self.unique_keys.values_mut())
    }

    fn build_key(
        &self,
        name: &str,
        primary: bool,
        columns: &[String],
    ) -> Result<KeyDefinition, SchemaError> {
        let columns = columns
            .iter()
            .map(|column| {
                self.column_index(column)
                    .map(|index| KeyColumn {
                        name: self.columns[index].name.clone(),
                        index,
                    })
                    .ok_or_else(|| self.column_not_found(column))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(KeyDefinition {
            name: name.to_string(),
            primary,
            columns,
        })
    }

    pub fn set_primary_key(&mut self, columns: &[String]) -> Result<(), SchemaError> {
        self.primary_key = Some(self.build_key("PRIMARY", true, columns)?);
        Ok(())
    }

    /// Add a unique key. Without a name the key is named after its first column.
    pub fn add_unique_key(
        &mut self,
        name: Option<&str>,
        columns: &[String],
    ) -> Result<(), SchemaError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => columns
                .first()
                .cloned()
                .ok_or_else(|| self.column_not_found(""))?,
        };
        let key = self.build_key(&name, false, columns)?;
        self.unique_keys.insert(name.to_lowercase(), key);
        Ok(())
    }

    pub fn drop_primary_key(&mut self) -> bool {
        self.primary_key.take().is_some()
    }

    /// Drop a key by name; `PRIMARY` drops the primary key.
    pub fn drop_key(&mut self, name: &str) -> bool {
        if name.eq_ignore_ascii_case("primary") {
            return self.drop_primary_key();
        }
        self.unique_keys.remove(&name.to_lowercase()).is_some()
    }

    pub fn rename_key(&mut self, from: &str, to: &str) -> bool {
        match self.unique_keys.remove(&from.to_lowercase()) {
            Some(mut key) => {
                key.name = to.to_string();
                self.unique_keys.insert(to.to_lowercase(), key);
                true
            }
            None => false,
        }
    }

    /// Re-derive every key column index from its column name.
    pub fn reindex_keys(&mut self) -> Result<(), SchemaError> {
        let positions: Vec<String> = self.columns.iter().map(|c| c.name.to_lowercase()).collect();
        let table = self.identity().full_name();
        for key in self.keys_mut() {
            for key_column in &mut key.columns {
                let lowered = key_column.name.to_lowercase();
                key_column.index = positions.iter().position(|p| *p == lowered).ok_or_else(
                    || SchemaError::ColumnNotFound {
                        table: table.clone(),
                        column: key_column.name.clone(),
                    },
                )?;
            }
        }
        Ok(())
    }

    /// Key used to identify a row, or `None` when every column must be used.
    ///
    /// Only unique keys whose columns are all NOT NULL qualify, since several
    /// rows may hold NULL in a unique column. Among those the key with the
    /// fewest columns wins, ties going to the lowest key name.
    pub fn identifying_key(&self, prefer_unique: bool) -> Option<&KeyDefinition> {
        let unique = self
            .unique_keys
            .values()
            .filter(|key| self.is_not_null_key(key))
            .min_by_key(|key| key.columns.len());
        if prefer_unique {
            unique.or(self.primary_key.as_ref())
        } else {
            self.primary_key.as_ref().or(unique)
        }
    }

    fn is_not_null_key(&self, key: &KeyDefinition) -> bool {
        key.columns.iter().all(|kc| {
            self.columns
                .get(kc.index)
                .is_some_and(|column| !column.nullable)
        })
    }
}
