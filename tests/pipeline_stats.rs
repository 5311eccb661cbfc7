//! Statistics reports produced by the pipeline.

mod common;

use binlog_events::testing::StreamBuilder;
use binlog_events::ColumnValue;
use binlog_rewind::report::{BIG_LONG_TRX_FILE, DDL_FILE, STATS_FILE};
use common::{config, init_tracing, records, run, BIN1, BIN2};
use table_schema::SchemaRegistry;

fn rows(count: i64) -> Vec<Vec<ColumnValue>> {
    (0..count)
        .map(|id| vec![ColumnValue::Int(id), "x".into()])
        .collect()
}

#[tokio::test]
async fn test_big_transaction_recorded_once() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let events = StreamBuilder::new(BIN1, 1_700_000_000)
        .begin("shop")
        .insert("shop", "orders", rows(200))
        .insert("shop", "orders", rows(200))
        .insert("shop", "orders", rows(200))
        .commit()
        .build();

    let summary = run(config(dir.path(), &[]), SchemaRegistry::new(), events).await?;
    assert_eq!(summary.rows_events, 3);

    let trx = records(dir.path(), BIG_LONG_TRX_FILE);
    assert_eq!(trx.len(), 1);
    let fields: Vec<&str> = trx[0].split_whitespace().collect();
    assert_eq!(fields[0], BIN1);
    assert_eq!(fields[5], "600");
    assert!(trx[0].ends_with("[shop.orders(inserts=600, updates=0, deletes=0)]"));

    let stats = records(dir.path(), STATS_FILE);
    assert_eq!(stats.len(), 1);
    let fields: Vec<&str> = stats[0].split_whitespace().collect();
    assert_eq!(&fields[5..], ["600", "0", "0", "shop", "orders"]);
    Ok(())
}

#[tokio::test]
async fn test_filtered_tables_excluded_from_statistics() -> Result<(), Box<dyn std::error::Error>>
{
    init_tracing();
    let dir = tempfile::tempdir()?;
    let events = StreamBuilder::new(BIN1, 1_700_000_000)
        .begin("salesdb")
        .insert("salesdb", "customers", rows(2))
        .insert("salesdb", "orders", rows(3))
        .insert("archive", "orders", rows(4))
        .commit()
        .build();

    let config = config(
        dir.path(),
        &["--databases", "^salesdb$", "--tables", "^orders$"],
    );
    let summary = run(config, SchemaRegistry::new(), events).await?;
    assert_eq!(summary.rows_events, 1);

    let stats = records(dir.path(), STATS_FILE);
    assert_eq!(stats.len(), 1);
    assert!(stats[0].contains(" salesdb "));
    assert!(stats[0].trim_end().ends_with("orders"));
    assert!(!stats.iter().any(|line| line.contains("customers")));
    Ok(())
}

#[tokio::test]
async fn test_ddl_logged_and_stats_split_by_binlog() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let events = StreamBuilder::new(BIN1, 1_700_000_000)
        .query("shop", "CREATE TABLE orders (id INT PRIMARY KEY, note VARCHAR(64))")
        .begin("shop")
        .insert("shop", "orders", rows(1))
        .commit()
        .rotate(BIN2)
        .query("shop", "DROP DATABASE archive")
        .begin("shop")
        .delete("shop", "orders", rows(1))
        .commit()
        .build();

    run(config(dir.path(), &[]), SchemaRegistry::new(), events).await?;

    let ddl = records(dir.path(), DDL_FILE);
    assert_eq!(ddl.len(), 2);
    assert!(ddl[0].contains(BIN1));
    assert!(ddl[0].ends_with("use shop;CREATE TABLE orders (id INT PRIMARY KEY, note VARCHAR(64))"));
    assert!(ddl[1].contains(BIN2));
    assert!(ddl[1].ends_with(" DROP DATABASE archive"));

    let stats = records(dir.path(), STATS_FILE);
    assert_eq!(stats.len(), 2);
    assert!(stats[0].starts_with(BIN1));
    assert_eq!(stats[0].split_whitespace().nth(5), Some("1"));
    assert!(stats[1].starts_with(BIN2));
    assert_eq!(stats[1].split_whitespace().nth(7), Some("1"));
    Ok(())
}

#[tokio::test]
async fn test_parse_error_ignored_when_pattern_matches() -> Result<(), Box<dyn std::error::Error>>
{
    init_tracing();
    let dir = tempfile::tempdir()?;
    let events = StreamBuilder::new(BIN1, 1_700_000_000)
        .query("shop", "ALTER TABLE t ADD COLUMN")
        .begin("shop")
        .insert("shop", "orders", rows(1))
        .commit()
        .build();

    let config = config(
        dir.path(),
        &["--ignore-parse-error", "^alter table t add column$"],
    );
    let summary = run(config, SchemaRegistry::new(), events).await?;
    assert_eq!(summary.ignored_statements, 1);
    assert_eq!(records(dir.path(), STATS_FILE).len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_parse_error_fatal_otherwise() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let events = StreamBuilder::new(BIN1, 1_700_000_000)
        .query("shop", "ALTER TABLE t ADD COLUMN")
        .begin("shop")
        .insert("shop", "orders", rows(1))
        .commit()
        .build();

    let err = run(config(dir.path(), &[]), SchemaRegistry::new(), events)
        .await
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("mysql-bin.000001:4"));
    assert!(message.contains("ALTER TABLE t ADD COLUMN"));
    Ok(())
}

#[tokio::test]
async fn test_stop_position_ends_stream() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let events = StreamBuilder::new(BIN1, 1_700_000_000)
        .begin("shop")
        .insert("shop", "orders", rows(1))
        .commit()
        .rotate(BIN2)
        .begin("shop")
        .insert("shop", "orders", rows(5))
        .commit()
        .build();

    let config = config(
        dir.path(),
        &["--stop-file", BIN2, "--stop-pos", "4"],
    );
    let summary = run(config, SchemaRegistry::new(), events).await?;
    assert_eq!(summary.rows_events, 1);
    let stats = records(dir.path(), STATS_FILE);
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].split_whitespace().nth(5), Some("1"));
    Ok(())
}
