//! Writer of the original statements carried by rows-query events.

use crate::report::{self, original_sql_file_name};
use anyhow::Context;
use binlog_events::EventHeader;
use sql_rebuild::BinlogTimeZone;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug)]
pub(crate) struct OriginalSql {
    pub header: EventHeader,
    pub sql: String,
}

/// Writes one file per binlog, switching files when the binlog changes.
pub(crate) struct OriginalSqlWriter {
    dir: PathBuf,
    time_zone: BinlogTimeZone,
    current: Option<(String, BufWriter<File>)>,
}

impl OriginalSqlWriter {
    pub fn new(dir: PathBuf, time_zone: BinlogTimeZone) -> Self {
        Self {
            dir,
            time_zone,
            current: None,
        }
    }

    pub fn run(mut self, mut rx: mpsc::Receiver<OriginalSql>) -> anyhow::Result<()> {
        info!("original SQL writer started");
        while let Some(statement) = rx.blocking_recv() {
            self.write(&statement)?;
        }
        self.close()?;
        info!("original SQL writer finished");
        Ok(())
    }

    pub fn write(&mut self, statement: &OriginalSql) -> anyhow::Result<()> {
        let header = &statement.header;
        let same_binlog =
            matches!(&self.current, Some((binlog, _)) if *binlog == header.binlog);
        if !same_binlog {
            self.close()?;
            let name = original_sql_file_name(&header.binlog);
            let mut writer = report::create(&self.dir, &name)?;
            writer
                .write_all(report::statement_header().as_bytes())
                .with_context(|| format!("Failed to write {name}"))?;
            self.current = Some((header.binlog.clone(), writer));
        }
        let (_, writer) = self
            .current
            .as_mut()
            .context("original SQL file is not open")?;
        let line = report::statement_line(
            self.time_zone,
            header.timestamp,
            &header.binlog,
            header.start_pos,
            header.stop_pos,
            &statement.sql,
        );
        writer
            .write_all(line.as_bytes())
            .context("Failed to write original SQL")
    }

    fn close(&mut self) -> anyhow::Result<()> {
        if let Some((binlog, mut writer)) = self.current.take() {
            writer
                .flush()
                .with_context(|| format!("Failed to write {}", original_sql_file_name(&binlog)))?;
        }
        Ok(())
    }
}
