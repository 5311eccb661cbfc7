//! Typed binlog events.

use std::fmt;

/// Location and time of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHeader {
    /// Binlog file the event was read from
    pub binlog: String,
    /// Offset of the first byte of the event
    pub start_pos: u64,
    /// Offset just past the event (the `log_pos` field)
    pub stop_pos: u64,
    /// Seconds since the epoch, as written by the server
    pub timestamp: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowsEventKind {
    Insert,
    Update,
    Delete,
}

impl RowsEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RowsEventKind::Insert => "insert",
            RowsEventKind::Update => "update",
            RowsEventKind::Delete => "delete",
        }
    }
}

impl fmt::Display for RowsEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw column value of a row image.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    /// Strings, decimals, bit fields and binary data
    Bytes(Vec<u8>),
    Date {
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        micros: u32,
    },
    Time {
        negative: bool,
        days: u32,
        hours: u8,
        minutes: u8,
        seconds: u8,
        micros: u32,
    },
    Json(serde_json::Value),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }
}

impl From<&str> for ColumnValue {
    fn from(s: &str) -> Self {
        ColumnValue::Bytes(s.as_bytes().to_vec())
    }
}

impl From<i64> for ColumnValue {
    fn from(v: i64) -> Self {
        ColumnValue::Int(v)
    }
}

/// Row images of one WRITE/UPDATE/DELETE rows event.
#[derive(Debug, Clone, PartialEq)]
pub struct RowsEvent {
    pub kind: RowsEventKind,
    pub database: String,
    pub table: String,
    /// Row images in wire order. For updates, before and after images
    /// alternate: `[before0, after0, before1, after1, ...]`.
    pub rows: Vec<Vec<ColumnValue>>,
}

impl RowsEvent {
    /// Number of logical rows changed.
    pub fn row_count(&self) -> usize {
        match self.kind {
            RowsEventKind::Update => self.rows.len() / 2,
            RowsEventKind::Insert | RowsEventKind::Delete => self.rows.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Rows(RowsEvent),
    Query {
        database: String,
        sql: String,
    },
    /// Transaction commit
    Xid,
    Gtid {
        gtid: String,
        /// MariaDB GTID events open a transaction in place of `BEGIN`
        starts_transaction: bool,
    },
    /// The stream continues in `next_binlog`
    Rotate {
        next_binlog: String,
        position: u64,
    },
    /// Original statement text of the following rows events
    RowsQuery(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinlogEvent {
    pub header: EventHeader,
    pub payload: EventPayload,
}
