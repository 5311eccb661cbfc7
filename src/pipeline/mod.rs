//! Event dispatch pipeline.
//!
//! One reader walks the binlog stream in order. It applies DDL to the
//! schema registry inline, feeds the statistics writer and hands
//! reconstruction jobs to a pool of workers through a bounded queue. The
//! workers send their statements to a single SQL writer, which puts them
//! back into dispatch order before writing.
//!
//! ```text
//!                    +-> stats writer
//!                    |
//! source -> reader --+-> original SQL writer
//!                    |
//!                    +-> workers (N) -> SQL writer
//! ```
//!
//! Every stage boundary is a bounded channel, so a slow writer blocks the
//! reader instead of buffering without limit.

mod original_sql;
mod reader;
mod sql_writer;
mod worker;

pub use sql_writer::SqlWriterSummary;

use crate::config::Config;
use crate::report;
use crate::stats::{StatEvent, StatsAggregator};
use binlog_events::{BinlogSource, EventHeader, RowsEvent};
use original_sql::{OriginalSql, OriginalSqlWriter};
use reader::Reader;
use sql_rebuild::{ChangeKind, ReconstructedEvent};
use sql_writer::SqlWriter;
use std::sync::Arc;
use table_schema::{SchemaRegistry, TableDefinition};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A job for the reconstruction workers.
#[derive(Debug)]
pub(crate) struct WorkItem {
    /// Dispatch order, contiguous from 0
    pub seq: u64,
    pub header: EventHeader,
    pub gtid: Option<String>,
    pub job: Job,
}

#[derive(Debug)]
pub(crate) enum Job {
    Rows {
        event: RowsEvent,
        /// Definition in force at the event's position
        table: Option<Arc<TableDefinition>>,
    },
    /// DDL or statement-based DML written as logged
    Passthrough {
        database: String,
        table: String,
        sql: String,
        kind: ChangeKind,
    },
    TrxBegin,
    TrxEnd,
}

#[derive(Debug)]
pub(crate) struct WorkResult {
    pub seq: u64,
    pub header: EventHeader,
    pub gtid: Option<String>,
    pub output: Output,
}

#[derive(Debug)]
pub(crate) enum Output {
    Event(ReconstructedEvent),
    TrxBegin,
    TrxEnd,
}

/// Counters reported when the pipeline finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Events read from the source, including skipped ones
    pub events: u64,
    /// Rows events admitted by the filters
    pub rows_events: u64,
    /// Statements skipped because they failed to parse and matched the ignore pattern
    pub ignored_statements: u64,
    pub sql: Option<SqlWriterSummary>,
}

/// Run the pipeline over `source` until it is exhausted, a stop condition is
/// reached, or `shutdown` fires.
pub async fn run(
    config: Arc<Config>,
    registry: Arc<SchemaRegistry>,
    source: &mut dyn BinlogSource,
    shutdown: Option<broadcast::Receiver<()>>,
) -> anyhow::Result<PipelineSummary> {
    let capacity = config.threads * 2;

    let (stats_tx, stats_rx) = mpsc::channel::<StatEvent>(capacity);
    let stats_task = spawn_stats_writer(&config, stats_rx)?;

    let (original_tx, original_task) = if config.write_original_sql {
        let (tx, rx) = mpsc::channel::<OriginalSql>(capacity);
        let writer = OriginalSqlWriter::new(config.output_dir.clone(), config.time_zone);
        (Some(tx), Some(tokio::task::spawn_blocking(move || writer.run(rx))))
    } else {
        (None, None)
    };

    let mut worker_tasks = Vec::new();
    let (work_tx, writer_task) = if config.work_type.writes_sql() {
        let (work_tx, work_rx) = mpsc::channel::<WorkItem>(capacity);
        let (result_tx, result_rx) = mpsc::channel::<WorkResult>(capacity);
        let work_rx = Arc::new(Mutex::new(work_rx));
        for id in 0..config.threads {
            worker_tasks.push(tokio::spawn(worker::run(
                id,
                Arc::clone(&config),
                Arc::clone(&work_rx),
                result_tx.clone(),
            )));
        }
        drop(result_tx);
        let writer = SqlWriter::new(&config);
        let writer_task = tokio::task::spawn_blocking(move || writer.run(result_rx));
        (Some(work_tx), Some(writer_task))
    } else {
        (None, None)
    };

    info!(
        work_type = ?config.work_type,
        threads = config.threads,
        "starting binlog processing"
    );
    let mut reader = Reader::new(
        Arc::clone(&config),
        registry,
        stats_tx,
        work_tx,
        original_tx,
    );
    let read_result = reader.run(source, shutdown).await;
    let counters = reader.into_summary();

    // The reader has dropped its senders; every downstream task drains and exits.
    let mut downstream_error = None;
    let sql = match writer_task {
        Some(task) => match join(task, "SQL writer").await {
            Ok(summary) => Some(summary),
            Err(e) => {
                downstream_error.get_or_insert(e);
                None
            }
        },
        None => None,
    };
    for task in worker_tasks {
        if let Err(e) = join(task, "worker").await {
            downstream_error.get_or_insert(e);
        }
    }
    if let Err(e) = join(stats_task, "statistics writer").await {
        downstream_error.get_or_insert(e);
    }
    if let Some(task) = original_task {
        if let Err(e) = join(task, "original SQL writer").await {
            downstream_error.get_or_insert(e);
        }
    }

    match (read_result, downstream_error) {
        // a failed writer closes its channel and the reader only sees the closed channel
        (_, Some(e)) => Err(e),
        (Err(e), None) => Err(e),
        (Ok(()), None) => {
            let summary = PipelineSummary { sql, ..counters };
            info!(
                events = summary.events,
                rows_events = summary.rows_events,
                ignored_statements = summary.ignored_statements,
                "binlog processing finished"
            );
            Ok(summary)
        }
    }
}

fn spawn_stats_writer(
    config: &Config,
    mut rx: mpsc::Receiver<StatEvent>,
) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
    let dir = &config.output_dir;
    let mut aggregator = StatsAggregator::new(
        report::create(dir, report::STATS_FILE)?,
        report::create(dir, report::DDL_FILE)?,
        report::create(dir, report::BIG_LONG_TRX_FILE)?,
        config.stats,
        config.time_zone,
    )?;
    Ok(tokio::task::spawn_blocking(move || {
        info!("statistics writer started");
        while let Some(event) = rx.blocking_recv() {
            aggregator.handle(&event)?;
        }
        aggregator.finish()?;
        info!("statistics writer finished");
        Ok(())
    }))
}

async fn join<T>(task: JoinHandle<anyhow::Result<T>>, name: &str) -> anyhow::Result<T> {
    match task.await {
        Ok(result) => result.map_err(|e| e.context(format!("{name} failed"))),
        Err(e) => {
            warn!(task = name, error = %e, "task did not complete");
            Err(anyhow::anyhow!("{name} task panicked or was cancelled: {e}"))
        }
    }
}
