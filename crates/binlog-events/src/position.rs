//! Binlog file names and positions.
//!
//! Binlog files are named `<base>.<index>` with a zero-padded numeric index
//! (`mysql-bin.000042`). Positions order by file index first, offset second.

use std::cmp::Ordering;
use std::fmt;

/// Numeric index of a binlog file name.
pub fn binlog_index(name: &str) -> Option<u64> {
    let (_, index) = name.rsplit_once('.')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    index.parse().ok()
}

/// The file that follows `name` in its sequence, keeping the index width.
pub fn next_binlog_name(name: &str) -> Option<String> {
    let (base, index) = name.rsplit_once('.')?;
    let next = binlog_index(name)? + 1;
    Some(format!("{base}.{next:0width$}", width = index.len()))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinlogPosition {
    pub binlog: String,
    pub pos: u64,
}

impl BinlogPosition {
    pub fn new(binlog: impl Into<String>, pos: u64) -> Self {
        Self {
            binlog: binlog.into(),
            pos,
        }
    }

    pub fn index(&self) -> u64 {
        binlog_index(&self.binlog).unwrap_or(0)
    }
}

impl Ord for BinlogPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index()
            .cmp(&other.index())
            .then(self.pos.cmp(&other.pos))
            .then_with(|| self.binlog.cmp(&other.binlog))
    }
}

impl PartialOrd for BinlogPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.binlog, self.pos)
    }
}
