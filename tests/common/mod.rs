//! Shared helpers for the pipeline tests.

#![allow(dead_code)]

use binlog_events::{BinlogEvent, MemorySource};
use binlog_rewind::cli::Cli;
use binlog_rewind::config::Config;
use binlog_rewind::pipeline::{self, PipelineSummary};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use table_schema::{ColumnDefinition, SchemaRegistry, SchemaSource, TableDefinition};

pub const BIN1: &str = "mysql-bin.000001";
pub const BIN2: &str = "mysql-bin.000002";

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("binlog_rewind=debug")
        .with_test_writer()
        .try_init()
        .ok();
}

/// Configuration writing into `dir`, streaming from `mysql-bin.000001:4`
/// in UTC. `extra` options are appended.
pub fn config(dir: &Path, extra: &[&str]) -> Config {
    let mut args = vec![
        "binlog-rewind",
        "--mode",
        "repl",
        "--start-file",
        BIN1,
        "--start-pos",
        "4",
        "--user",
        "root",
        "--time-zone",
        "UTC",
        "--output-dir",
        dir.to_str().expect("utf-8 temp dir"),
    ];
    args.extend_from_slice(extra);
    Config::from_cli(&Cli::parse_from(args)).expect("valid test configuration")
}

/// `shop.orders (id int primary key, note varchar(64))`
pub fn orders_table() -> TableDefinition {
    let mut table = TableDefinition::new("shop", "orders");
    table.push_column(ColumnDefinition::new("id", "int", "int(11)"));
    table.push_column(ColumnDefinition::new("note", "varchar", "varchar(64)"));
    table
        .set_primary_key(&["id".to_string()])
        .expect("id is a column");
    table
}

pub fn registry_with(tables: Vec<TableDefinition>) -> SchemaRegistry {
    let registry = SchemaRegistry::new();
    for table in tables {
        registry.set(table.identity(), table, SchemaSource::Database);
    }
    registry
}

pub async fn run(
    config: Config,
    registry: SchemaRegistry,
    events: Vec<BinlogEvent>,
) -> anyhow::Result<PipelineSummary> {
    let mut source = MemorySource::new(events);
    pipeline::run(Arc::new(config), Arc::new(registry), &mut source, None).await
}

/// Like [`run`], but the source stays open after its last event the way a
/// replication connection does. Fails if the pipeline is still waiting
/// after five seconds.
pub async fn run_live(
    config: Config,
    registry: SchemaRegistry,
    events: Vec<BinlogEvent>,
) -> anyhow::Result<PipelineSummary> {
    let mut source = MemorySource::new(events).hold_open();
    let pipeline = pipeline::run(Arc::new(config), Arc::new(registry), &mut source, None);
    tokio::time::timeout(std::time::Duration::from_secs(5), pipeline)
        .await
        .map_err(|_| anyhow::anyhow!("pipeline did not stop at the stop position"))?
}

/// Lines of an output file, without the trailing newline.
pub fn lines(dir: &Path, name: &str) -> Vec<String> {
    std::fs::read_to_string(dir.join(name))
        .unwrap_or_else(|e| panic!("failed to read {name}: {e}"))
        .lines()
        .map(str::to_string)
        .collect()
}

/// Report records: every line after the header.
pub fn records(dir: &Path, name: &str) -> Vec<String> {
    lines(dir, name).into_iter().skip(1).collect()
}
