//! Thread-safe registry of table definitions.
//!
//! Definitions are handed out as `Arc` snapshots: mutating a table replaces
//! its `Arc`, so a reader holding an older snapshot keeps seeing the schema
//! that was in force when it looked the table up.

use crate::definition::{TableDefinition, TableIdentity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Where a registry entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaSource {
    Database,
    SnapshotFile,
    ReplayedDdl,
}

#[derive(Debug, Clone)]
struct RegistryEntry {
    definition: Arc<TableDefinition>,
    source: SchemaSource,
}

/// Mapping from `database.table` to the current definition.
///
/// Writes only ever happen on the binlog reader; workers read.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: RwLock<HashMap<String, RegistryEntry>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the snapshot file tables and the live database
    /// tables. A table present in both takes the live definition.
    pub fn merged(file_tables: Vec<TableDefinition>, live_tables: Vec<TableDefinition>) -> Self {
        let registry = Self::new();
        for table in file_tables {
            registry.set(table.identity(), table, SchemaSource::SnapshotFile);
        }
        for table in live_tables {
            let identity = table.identity();
            if registry.contains(&identity) {
                debug!(table = %identity, "live definition overrides snapshot file");
            }
            registry.set(identity, table, SchemaSource::Database);
        }
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, RegistryEntry>> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, RegistryEntry>> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, identity: &TableIdentity) -> Option<Arc<TableDefinition>> {
        self.read()
            .get(&identity.full_name())
            .map(|entry| Arc::clone(&entry.definition))
    }

    pub fn source(&self, identity: &TableIdentity) -> Option<SchemaSource> {
        self.read().get(&identity.full_name()).map(|e| e.source)
    }

    pub fn contains(&self, identity: &TableIdentity) -> bool {
        self.read().contains_key(&identity.full_name())
    }

    /// Insert or replace the definition of a table.
    pub fn set(&self, identity: TableIdentity, definition: TableDefinition, source: SchemaSource) {
        self.write().insert(
            identity.full_name(),
            RegistryEntry {
                definition: Arc::new(definition),
                source,
            },
        );
    }

    pub fn remove(&self, identity: &TableIdentity) -> Option<Arc<TableDefinition>> {
        self.write()
            .remove(&identity.full_name())
            .map(|entry| entry.definition)
    }

    /// Remove every table of a database, returning how many were dropped.
    pub fn remove_database(&self, database: &str) -> usize {
        let prefix = format!("{}.", database.to_lowercase());
        let mut tables = self.write();
        let before = tables.len();
        tables.retain(|name, _| !name.starts_with(&prefix));
        before - tables.len()
    }

    /// Move a table to a new identity, keeping its definition.
    pub fn rename(&self, from: &TableIdentity, to: &TableIdentity) -> bool {
        let mut tables = self.write();
        let Some(entry) = tables.remove(&from.full_name()) else {
            return false;
        };
        let mut definition = Arc::unwrap_or_clone(entry.definition);
        definition.database = to.database.clone();
        definition.table = to.table.clone();
        tables.insert(
            to.full_name(),
            RegistryEntry {
                definition: Arc::new(definition),
                source: entry.source,
            },
        );
        true
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// All definitions, sorted by full name.
    pub fn snapshot(&self) -> Vec<TableDefinition> {
        let tables = self.read();
        let mut names: Vec<&String> = tables.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| tables[name].definition.as_ref().clone())
            .collect()
    }
}
