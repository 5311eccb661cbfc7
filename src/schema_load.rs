//! Startup loading of table definitions.
//!
//! Definitions come from a snapshot file, the live database, or both. A
//! table found in both takes the live definition unless only the file was
//! requested.

use crate::cli::WorkType;
use crate::config::Config;
use crate::filter::TableFilter;
use anyhow::{bail, Context};
use table_schema::{introspect, snapshot, SchemaRegistry, TableDefinition};
use tracing::info;

async fn load_live(
    opts: mysql_async::Opts,
    filter: &TableFilter,
) -> anyhow::Result<Vec<TableDefinition>> {
    let mut conn = mysql_async::Conn::new(opts)
        .await
        .context("Failed to connect to MySQL")?;
    let tables = introspect::load_tables(&mut conn, |table| {
        filter.matches(&table.database, &table.table)
    })
    .await
    .context("Failed to load table definitions from the database")?;
    conn.disconnect()
        .await
        .context("Failed to close MySQL connection")?;
    Ok(tables)
}

fn needs_live_definitions(config: &Config) -> bool {
    match config.work_type {
        WorkType::Tbldef => true,
        WorkType::ToSql | WorkType::Rollback => !config.only_schema_file,
        WorkType::Stats => false,
    }
}

/// Build the registry the pipeline starts from, dumping it when requested.
pub async fn load_registry(config: &Config) -> anyhow::Result<SchemaRegistry> {
    let file_tables = match &config.schema_file {
        Some(path) => snapshot::load(path)
            .with_context(|| format!("Failed to load table definitions from {}", path.display()))?,
        None => Vec::new(),
    };
    let live_tables = if needs_live_definitions(config) {
        let opts = config
            .connection
            .clone()
            .context("Database credentials are required to load table definitions")?;
        load_live(opts, &config.filter).await?
    } else {
        Vec::new()
    };
    info!(
        from_file = file_tables.len(),
        from_database = live_tables.len(),
        "loaded table definitions"
    );

    let registry = SchemaRegistry::merged(file_tables, live_tables);

    if let Some(path) = &config.dump_schema_file {
        snapshot::dump(path, &registry.snapshot())
            .with_context(|| format!("Failed to dump table definitions to {}", path.display()))?;
    }
    if config.work_type.writes_sql() && registry.is_empty() {
        bail!(
            "No table definitions found. Check --databases/--tables, the database credentials or --schema-file"
        );
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use table_schema::{ColumnDefinition, TableIdentity};

    fn config(dir: &std::path::Path, extra: &[&str]) -> Config {
        let mut args = vec![
            "binlog-rewind".to_string(),
            "--output-dir".to_string(),
            dir.display().to_string(),
        ];
        args.extend(extra.iter().map(|a| a.to_string()));
        Config::from_cli(&Cli::parse_from(args)).unwrap()
    }

    fn write_snapshot(path: &std::path::Path) {
        let mut orders = TableDefinition::new("shop", "orders");
        orders.push_column(ColumnDefinition::new("id", "int", "int(11)"));
        orders.set_primary_key(&["id".to_string()]).unwrap();
        snapshot::dump(path, &[orders]).unwrap();
    }

    #[tokio::test]
    async fn test_file_only_registry_is_dumped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.json");
        write_snapshot(&input);
        let binlog = dir.path().join("mysql-bin.000001");
        std::fs::write(&binlog, b"").unwrap();

        let config = config(
            dir.path(),
            &[
                "--work-type",
                "rollback",
                "--schema-file",
                input.to_str().unwrap(),
                "--only-schema-file",
                "--dump-schema-file",
                "out.json",
                binlog.to_str().unwrap(),
            ],
        );
        let registry = load_registry(&config).await.unwrap();
        assert!(registry.contains(&TableIdentity::new("shop", "orders")));

        let dumped = snapshot::load(&dir.path().join("out.json")).unwrap();
        assert_eq!(dumped.len(), 1);
        assert_eq!(dumped[0].table, "orders");
    }

    #[tokio::test]
    async fn test_stats_needs_no_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let binlog = dir.path().join("mysql-bin.000001");
        std::fs::write(&binlog, b"").unwrap();
        let config = config(dir.path(), &[binlog.to_str().unwrap()]);
        let registry = load_registry(&config).await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_empty_registry_is_fatal_for_sql() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.json");
        snapshot::dump(&input, &[]).unwrap();
        let binlog = dir.path().join("mysql-bin.000001");
        std::fs::write(&binlog, b"").unwrap();
        let config = config(
            dir.path(),
            &[
                "--work-type",
                "2sql",
                "--schema-file",
                input.to_str().unwrap(),
                "--only-schema-file",
                binlog.to_str().unwrap(),
            ],
        );
        let err = load_registry(&config).await.unwrap_err();
        assert!(err.to_string().contains("No table definitions"));
    }
}
