//! The single binlog reader.

use super::original_sql::OriginalSql;
use super::{Job, PipelineSummary, WorkItem};
use crate::cli::WorkType;
use crate::config::Config;
use crate::stats::{StatEvent, StatKind};
use anyhow::{anyhow, Context};
use binlog_events::{BinlogEvent, BinlogSource, EventHeader, EventPayload, RowsEvent};
use sql_classify::{classify, ParsedStatement};
use sql_rebuild::ChangeKind;
use std::sync::Arc;
use table_schema::{apply_statement, DdlOutcome, SchemaRegistry, TableIdentity};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

pub(crate) struct Reader {
    config: Arc<Config>,
    registry: Arc<SchemaRegistry>,
    stats_tx: mpsc::Sender<StatEvent>,
    work_tx: Option<mpsc::Sender<WorkItem>>,
    original_tx: Option<mpsc::Sender<OriginalSql>>,
    next_seq: u64,
    /// Last GTID seen, attached to the events of its transaction
    gtid: Option<String>,
    summary: PipelineSummary,
}

fn closed(stage: &str) -> anyhow::Error {
    anyhow!("{stage} stopped accepting events")
}

fn is_transaction_start(sql: &str) -> bool {
    sql.eq_ignore_ascii_case("begin")
}

fn is_transaction_end(sql: &str) -> bool {
    sql.eq_ignore_ascii_case("commit") || sql.eq_ignore_ascii_case("rollback")
}

impl Reader {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<SchemaRegistry>,
        stats_tx: mpsc::Sender<StatEvent>,
        work_tx: Option<mpsc::Sender<WorkItem>>,
        original_tx: Option<mpsc::Sender<OriginalSql>>,
    ) -> Self {
        Self {
            config,
            registry,
            stats_tx,
            work_tx,
            original_tx,
            next_seq: 0,
            gtid: None,
            summary: PipelineSummary::default(),
        }
    }

    pub fn into_summary(self) -> PipelineSummary {
        self.summary
    }

    pub async fn run(
        &mut self,
        source: &mut dyn BinlogSource,
        mut shutdown: Option<broadcast::Receiver<()>>,
    ) -> anyhow::Result<()> {
        let mut signal_gone = false;
        loop {
            if signal_gone {
                shutdown = None;
            }
            let next = match shutdown.as_mut() {
                Some(shutdown) => tokio::select! {
                    signal = shutdown.recv() => {
                        if let Err(broadcast::error::RecvError::Closed) = signal {
                            signal_gone = true;
                            continue;
                        }
                        info!("received shutdown signal, stopping reader");
                        return Ok(());
                    }
                    next = source.next() => next,
                },
                None => source.next().await,
            };
            let Some(event) = next else {
                info!("binlog source exhausted");
                return Ok(());
            };
            let event = event.context("Failed to read binlog event")?;
            self.summary.events += 1;

            if let EventPayload::Rotate { next_binlog, .. } = &event.payload {
                if self.config.window.is_binlog_past_stop(next_binlog) {
                    info!(binlog = %next_binlog, "next binlog is past the stop position");
                    return Ok(());
                }
                debug!(binlog = %next_binlog, "binlog rotated");
                continue;
            }
            if self.config.window.is_past_stop(&event.header) {
                info!(
                    binlog = %event.header.binlog,
                    pos = event.header.start_pos,
                    "reached stop condition"
                );
                return Ok(());
            }
            let stop_at = self
                .config
                .window
                .reaches_stop(&event.header)
                .then(|| (event.header.binlog.clone(), event.header.stop_pos));
            if !self.config.window.is_before_start(&event.header) {
                self.handle(event).await?;
            }
            if let Some((binlog, pos)) = stop_at {
                // a live server would otherwise block waiting for the next event
                info!(%binlog, pos, "reached stop position");
                return Ok(());
            }
        }
    }

    async fn handle(&mut self, event: BinlogEvent) -> anyhow::Result<()> {
        let BinlogEvent { header, payload } = event;
        match payload {
            EventPayload::Rows(rows) => self.handle_rows(header, rows).await,
            EventPayload::Query { database, sql } => {
                self.handle_query(header, &database, &sql).await
            }
            EventPayload::Xid => self.end_transaction(&header).await,
            EventPayload::Gtid {
                gtid,
                starts_transaction,
            } => {
                self.gtid = Some(gtid);
                if starts_transaction {
                    self.begin_transaction(&header).await?;
                }
                Ok(())
            }
            EventPayload::RowsQuery(sql) => {
                if let Some(tx) = &self.original_tx {
                    tx.send(OriginalSql { header, sql })
                        .await
                        .map_err(|_| closed("original SQL writer"))?;
                }
                Ok(())
            }
            EventPayload::Rotate { .. } => Ok(()),
        }
    }

    async fn send_stat(&self, header: &EventHeader, kind: StatKind) -> anyhow::Result<()> {
        self.stats_tx
            .send(StatEvent::new(header, kind))
            .await
            .map_err(|_| closed("statistics writer"))
    }

    async fn dispatch(&mut self, header: &EventHeader, job: Job) -> anyhow::Result<()> {
        let Some(tx) = &self.work_tx else {
            return Ok(());
        };
        let item = WorkItem {
            seq: self.next_seq,
            header: header.clone(),
            gtid: self.gtid.clone(),
            job,
        };
        tx.send(item).await.map_err(|_| closed("SQL workers"))?;
        self.next_seq += 1;
        Ok(())
    }

    async fn begin_transaction(&mut self, header: &EventHeader) -> anyhow::Result<()> {
        self.send_stat(header, StatKind::Begin).await?;
        self.dispatch(header, Job::TrxBegin).await
    }

    async fn end_transaction(&mut self, header: &EventHeader) -> anyhow::Result<()> {
        self.send_stat(header, StatKind::End).await?;
        self.dispatch(header, Job::TrxEnd).await
    }

    async fn handle_rows(&mut self, header: EventHeader, event: RowsEvent) -> anyhow::Result<()> {
        if !self.config.filter.matches(&event.database, &event.table)
            || !self.config.sql_types.admits(event.kind)
        {
            return Ok(());
        }
        self.summary.rows_events += 1;
        self.send_stat(
            &header,
            StatKind::Rows {
                kind: event.kind,
                database: event.database.clone(),
                table: event.table.clone(),
                rows: event.row_count() as u64,
            },
        )
        .await?;
        if self.work_tx.is_some() {
            let table = self
                .registry
                .get(&TableIdentity::new(&event.database, &event.table));
            self.dispatch(&header, Job::Rows { event, table }).await?;
        }
        Ok(())
    }

    async fn handle_query(
        &mut self,
        header: EventHeader,
        database: &str,
        sql: &str,
    ) -> anyhow::Result<()> {
        let trimmed = sql.trim().trim_end_matches(';').trim_end();
        if is_transaction_start(trimmed) {
            return self.begin_transaction(&header).await;
        }
        if is_transaction_end(trimmed) {
            return self.end_transaction(&header).await;
        }

        let statements = match classify(sql, database) {
            Ok(statements) => statements,
            Err(e) if self.config.ignores_parse_error(sql) => {
                warn!(
                    binlog = %header.binlog,
                    pos = header.start_pos,
                    sql,
                    error = %e,
                    "skipping statement that failed to parse"
                );
                self.summary.ignored_statements += 1;
                return Ok(());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!(
                        "Failed to parse statement at {}:{}: {sql}",
                        header.binlog, header.start_pos
                    )
                })
            }
        };

        for statement in statements {
            if statement.kind().is_ddl() {
                self.handle_ddl(&header, statement).await?;
            } else if statement.kind().is_dml() {
                self.handle_statement_dml(&header, statement).await?;
            }
        }
        Ok(())
    }

    fn admits_statement(&self, statement: &ParsedStatement) -> bool {
        let filter = &self.config.filter;
        if filter.is_empty() {
            return true;
        }
        statement.tables().iter().any(|t| {
            if t.table.is_empty() {
                filter.matches_database(&t.database)
            } else {
                filter.matches(&t.database, &t.table)
            }
        })
    }

    async fn handle_ddl(
        &mut self,
        header: &EventHeader,
        statement: ParsedStatement,
    ) -> anyhow::Result<()> {
        // the registry must follow every DDL, filtered or not
        let outcome = apply_statement(&self.registry, &statement.statement).with_context(|| {
            format!(
                "Failed to apply DDL at {}:{}: {}",
                header.binlog, header.start_pos, statement.sql
            )
        })?;
        match outcome {
            DdlOutcome::Applied => {
                debug!(kind = %statement.kind(), sql = %statement.sql, "applied DDL")
            }
            DdlOutcome::Unchanged => {}
            DdlOutcome::UnknownTable(table) => {
                debug!(%table, sql = %statement.sql, "DDL for a table without definition")
            }
        }

        if !self.admits_statement(&statement) {
            return Ok(());
        }
        let kind = statement.kind();
        self.send_stat(
            header,
            StatKind::Ddl {
                database: statement.database.clone(),
                sql: statement.sql.clone(),
                database_level: kind.is_database_ddl(),
            },
        )
        .await?;

        match self.config.work_type {
            WorkType::ToSql => {
                let table = statement
                    .tables()
                    .into_iter()
                    .next()
                    .map(|t| t.table)
                    .unwrap_or_default();
                let database = if kind.is_database_ddl() {
                    String::new()
                } else {
                    statement.database
                };
                let job = Job::Passthrough {
                    database,
                    table,
                    sql: statement.sql,
                    kind: ChangeKind::Ddl,
                };
                self.dispatch(header, job).await
            }
            WorkType::Rollback => {
                warn!(
                    binlog = %header.binlog,
                    pos = header.start_pos,
                    sql = %statement.sql,
                    "DDL cannot be rolled back, skipped"
                );
                Ok(())
            }
            WorkType::Stats | WorkType::Tbldef => Ok(()),
        }
    }

    async fn handle_statement_dml(
        &mut self,
        header: &EventHeader,
        statement: ParsedStatement,
    ) -> anyhow::Result<()> {
        let tables: Vec<(String, String)> = statement
            .tables()
            .into_iter()
            .filter(|t| self.config.filter.matches(&t.database, &t.table))
            .map(|t| (t.database, t.table))
            .collect();
        if tables.is_empty() {
            return Ok(());
        }
        self.send_stat(
            header,
            StatKind::DmlQuery {
                tables: tables.clone(),
            },
        )
        .await?;

        if !self.config.statement_sql {
            return Ok(());
        }
        match self.config.work_type {
            WorkType::ToSql => {
                let (database, table) = tables.into_iter().next().unwrap_or_default();
                let job = Job::Passthrough {
                    database,
                    table,
                    sql: statement.sql,
                    kind: ChangeKind::Query,
                };
                self.dispatch(header, job).await
            }
            WorkType::Rollback => {
                warn!(
                    binlog = %header.binlog,
                    pos = header.start_pos,
                    sql = %statement.sql,
                    "statement-based DML cannot be rolled back, skipped"
                );
                Ok(())
            }
            WorkType::Stats | WorkType::Tbldef => Ok(()),
        }
    }
}
