//! Reconstruction workers.

use super::{Job, Output, WorkItem, WorkResult};
use crate::cli::WorkType;
use crate::config::Config;
use anyhow::{anyhow, Context};
use sql_rebuild::{decode_rows, Direction, ReconstructedEvent, Reconstructor};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

pub(crate) fn direction(work_type: WorkType) -> Direction {
    match work_type {
        WorkType::Rollback => Direction::Rollback,
        WorkType::Tbldef | WorkType::Stats | WorkType::ToSql => Direction::Forward,
    }
}

/// Turn one job into its output.
pub(crate) fn reconstruct(
    item: WorkItem,
    config: &Config,
    reconstructor: &Reconstructor,
) -> anyhow::Result<WorkResult> {
    let direction = direction(config.work_type);
    let WorkItem {
        seq,
        header,
        gtid,
        job,
    } = item;
    let output = match job {
        Job::Rows { event, table } => {
            let decoded = decode_rows(&event, table, config.time_zone);
            let rebuilt = ReconstructedEvent::from_rows(&header, &decoded, reconstructor, direction)
                .with_context(|| {
                    format!(
                        "Failed to build SQL for {}.{} at {}:{}",
                        event.database, event.table, header.binlog, header.start_pos
                    )
                })?;
            Output::Event(rebuilt)
        }
        Job::Passthrough {
            database,
            table,
            sql,
            kind,
        } => Output::Event(ReconstructedEvent::passthrough(
            &header, &database, &table, &sql, kind, direction,
        )),
        Job::TrxBegin => Output::TrxBegin,
        Job::TrxEnd => Output::TrxEnd,
    };
    Ok(WorkResult {
        seq,
        header,
        gtid,
        output,
    })
}

pub(crate) async fn run(
    id: usize,
    config: Arc<Config>,
    jobs: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    results: mpsc::Sender<WorkResult>,
) -> anyhow::Result<()> {
    let reconstructor = Reconstructor::new(config.rebuild.clone());
    let mut done = 0u64;
    loop {
        // the lock is released before the job is processed
        let item = jobs.lock().await.recv().await;
        let Some(item) = item else {
            break;
        };
        let result = reconstruct(item, &config, &reconstructor)?;
        results
            .send(result)
            .await
            .map_err(|_| anyhow!("SQL writer stopped accepting results"))?;
        done += 1;
    }
    debug!(worker = id, jobs = done, "worker finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use binlog_events::{ColumnValue, EventHeader, RowsEvent, RowsEventKind};
    use clap::Parser;
    use table_schema::{ColumnDefinition, TableDefinition};

    fn config(work_type: &str) -> Config {
        let dir = std::env::temp_dir();
        let cli = Cli::parse_from([
            "binlog-rewind",
            "--mode",
            "repl",
            "--start-file",
            "mysql-bin.000001",
            "--start-pos",
            "4",
            "--user",
            "root",
            "--work-type",
            work_type,
            "--output-dir",
            dir.to_str().unwrap(),
        ]);
        Config::from_cli(&cli).unwrap()
    }

    fn header() -> EventHeader {
        EventHeader {
            binlog: "mysql-bin.000001".to_string(),
            start_pos: 300,
            stop_pos: 380,
            timestamp: 1_700_000_000,
        }
    }

    fn orders() -> Arc<TableDefinition> {
        let mut table = TableDefinition::new("shop", "orders");
        table.push_column(ColumnDefinition::new("id", "int", "int(11)"));
        table.push_column(ColumnDefinition::new("note", "varchar", "varchar(20)"));
        table.set_primary_key(&["id".to_string()]).unwrap();
        Arc::new(table)
    }

    fn insert_item(seq: u64) -> WorkItem {
        WorkItem {
            seq,
            header: header(),
            gtid: Some("3e11fa47-71ca-11e1-9e33-c80aa9429562:23".to_string()),
            job: Job::Rows {
                event: RowsEvent {
                    kind: RowsEventKind::Insert,
                    database: "shop".to_string(),
                    table: "orders".to_string(),
                    rows: vec![vec![ColumnValue::Int(7), "it's".into()]],
                },
                table: Some(orders()),
            },
        }
    }

    #[test]
    fn test_rows_become_statements() {
        let config = config("2sql");
        let reconstructor = Reconstructor::new(config.rebuild.clone());
        let result = reconstruct(insert_item(5), &config, &reconstructor).unwrap();
        assert_eq!(result.seq, 5);
        let Output::Event(event) = result.output else {
            panic!("expected an event");
        };
        assert_eq!(
            event.statements,
            ["INSERT INTO `shop`.`orders` (`id`,`note`) VALUES (7,'it\\'s');"]
        );
    }

    #[test]
    fn test_rollback_direction() {
        let config = config("rollback");
        let reconstructor = Reconstructor::new(config.rebuild.clone());
        let result = reconstruct(insert_item(0), &config, &reconstructor).unwrap();
        let Output::Event(event) = result.output else {
            panic!("expected an event");
        };
        assert_eq!(event.direction, Direction::Rollback);
        assert_eq!(event.statements, ["DELETE FROM `shop`.`orders` WHERE `id`=7;"]);
    }

    #[tokio::test]
    async fn test_workers_drain_queue() {
        let config = Arc::new(config("2sql"));
        let (work_tx, work_rx) = mpsc::channel(4);
        let (result_tx, mut result_rx) = mpsc::channel(16);
        let work_rx = Arc::new(Mutex::new(work_rx));
        let workers: Vec<_> = (0..2)
            .map(|id| {
                tokio::spawn(run(
                    id,
                    Arc::clone(&config),
                    Arc::clone(&work_rx),
                    result_tx.clone(),
                ))
            })
            .collect();
        drop(result_tx);
        for seq in 0..6 {
            work_tx.send(insert_item(seq)).await.unwrap();
        }
        drop(work_tx);

        let mut seqs = Vec::new();
        while let Some(result) = result_rx.recv().await {
            seqs.push(result.seq);
        }
        for worker in workers {
            worker.await.unwrap().unwrap();
        }
        seqs.sort_unstable();
        assert_eq!(seqs, [0, 1, 2, 3, 4, 5]);
    }
}
