//! JSON snapshot of table definitions.

use crate::definition::TableDefinition;
use crate::SchemaError;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Load table definitions previously written by [`dump`].
pub fn load(path: &Path) -> Result<Vec<TableDefinition>, SchemaError> {
    let reader = BufReader::new(File::open(path)?);
    let mut tables: Vec<TableDefinition> = serde_json::from_reader(reader)?;
    // indices in a hand-edited file are not trusted
    for table in &mut tables {
        table.reindex_keys()?;
    }
    info!(path = %path.display(), tables = tables.len(), "loaded table definitions");
    Ok(tables)
}

pub fn dump(path: &Path, tables: &[TableDefinition]) -> Result<(), SchemaError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, tables)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    info!(path = %path.display(), tables = tables.len(), "dumped table definitions");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ColumnDefinition;

    #[test]
    fn test_dump_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tables.json");

        let mut t = TableDefinition::new("shop", "orders");
        t.push_column(ColumnDefinition::new("id", "int", "int(11)"));
        t.push_column(ColumnDefinition::new("size", "enum", "enum('s','m')"));
        t.set_primary_key(&["id".into()]).unwrap();

        dump(&path, std::slice::from_ref(&t)).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, vec![t]);
    }

    #[test]
    fn test_load_rejects_dangling_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tables.json");
        std::fs::write(
            &path,
            r#"[{"database":"d","table":"t","columns":[],
                "primary_key":{"name":"PRIMARY","primary":true,"columns":[{"name":"id","index":0}]}}]"#,
        )
        .unwrap();
        assert!(matches!(
            load(&path).unwrap_err(),
            SchemaError::ColumnNotFound { .. }
        ));
    }
}
