//! MySQL/MariaDB binlog events.
//!
//! This crate turns raw binlog data into an ordered stream of
//! [`BinlogEvent`]s carrying the binlog file name, start/stop offsets,
//! timestamp and a typed payload (row images, query text, transaction
//! boundaries, rotation).
//!
//! # Sources
//!
//! - [`FileSource`] - a local binlog file followed by the next files of its
//!   sequence, parsed with `mysql_common`
//! - [`ReplicationSource`] - a live `COM_BINLOG_DUMP` stream via `mysql_async`
//! - [`MemorySource`] - a fixed list of events

mod convert;
pub mod event;
pub mod position;
pub mod source;
pub mod testing;

pub use event::{BinlogEvent, ColumnValue, EventHeader, EventPayload, RowsEvent, RowsEventKind};
pub use position::{binlog_index, next_binlog_name, BinlogPosition};
pub use source::{BinlogSource, FileSource, MemorySource, ReplicationSource};

use std::path::PathBuf;

/// Server implementation that wrote the binlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerFlavor {
    #[default]
    MySql,
    MariaDb,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read binlog {binlog}: {source}")]
    Io {
        binlog: String,
        #[source]
        source: std::io::Error,
    },

    #[error("replication stream failed: {0}")]
    Replication(#[from] mysql_async::Error),

    #[error("rows event for table id {table_id} has no preceding TABLE_MAP event")]
    MissingTableMap { table_id: u64 },

    #[error("binlog file not found: {}", .0.display())]
    NotFound(PathBuf),
}
