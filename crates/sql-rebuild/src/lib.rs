//! SQL reconstruction from binlog events.
//!
//! Row images are first decoded against the table definition in force at
//! their binlog position ([`decode_rows`]), then turned into statements that
//! replay or undo the change ([`Reconstructor`]). DDL and statement-based DML
//! pass through as they were logged.

pub mod build;
pub mod decode;
pub mod time;

pub use build::{
    changed_columns, quote_identifier, quote_string, render_literal, Direction, Reconstructor,
    RebuildOptions,
};
pub use decode::{decode_rows, DecodedEvent, DecodedRows, Row, SqlValue};
pub use time::{BinlogTimeZone, InvalidTimeZone, DATETIME_FORMAT};

use binlog_events::{EventHeader, RowsEventKind};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    #[error("row of table {table} has {found} columns, definition has {expected}")]
    RowWidth {
        table: String,
        expected: usize,
        found: usize,
    },
}

/// What produced a reconstructed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    Ddl,
    /// Statement-based DML
    Query,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
            ChangeKind::Ddl => "ddl",
            ChangeKind::Query => "query",
        }
    }
}

impl From<RowsEventKind> for ChangeKind {
    fn from(kind: RowsEventKind) -> Self {
        match kind {
            RowsEventKind::Insert => ChangeKind::Insert,
            RowsEventKind::Update => ChangeKind::Update,
            RowsEventKind::Delete => ChangeKind::Delete,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One output unit: the statements built for one source event together
/// with everything needed to route and annotate them.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedEvent {
    pub binlog: String,
    pub start_pos: u64,
    pub stop_pos: u64,
    pub timestamp: u32,
    pub database: String,
    pub table: String,
    pub kind: ChangeKind,
    pub direction: Direction,
    /// Statements in execution order for `direction`
    pub statements: Vec<String>,
    /// Built from placeholder columns
    pub degraded: bool,
}

impl ReconstructedEvent {
    /// Statements for decoded row images.
    pub fn from_rows(
        header: &EventHeader,
        event: &DecodedEvent,
        reconstructor: &Reconstructor,
        direction: Direction,
    ) -> Result<Self, RebuildError> {
        Ok(Self {
            binlog: header.binlog.clone(),
            start_pos: header.start_pos,
            stop_pos: header.stop_pos,
            timestamp: header.timestamp,
            database: event.table.database.clone(),
            table: event.table.table.clone(),
            kind: event.rows.kind().into(),
            direction,
            statements: reconstructor.build(event, direction)?,
            degraded: event.degraded,
        })
    }

    /// A statement passed through verbatim: DDL or statement-based DML.
    /// Nothing is synthesized for the rollback direction.
    pub fn passthrough(
        header: &EventHeader,
        database: &str,
        table: &str,
        sql: &str,
        kind: ChangeKind,
        direction: Direction,
    ) -> Self {
        let statements = match direction {
            Direction::Forward => vec![format!("{};", sql.trim_end().trim_end_matches(';'))],
            Direction::Rollback => Vec::new(),
        };
        Self {
            binlog: header.binlog.clone(),
            start_pos: header.start_pos,
            stop_pos: header.stop_pos,
            timestamp: header.timestamp,
            database: database.to_string(),
            table: table.to_string(),
            kind,
            direction,
            statements,
            degraded: false,
        }
    }
}
