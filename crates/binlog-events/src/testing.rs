//! Builder for synthetic event streams used by tests across the workspace.

use crate::event::{BinlogEvent, ColumnValue, EventHeader, EventPayload, RowsEvent, RowsEventKind};

/// Appends events with consecutive positions, the way a server would lay
/// them out in one binlog file.
#[derive(Debug)]
pub struct StreamBuilder {
    binlog: String,
    pos: u64,
    timestamp: u32,
    events: Vec<BinlogEvent>,
}

impl StreamBuilder {
    pub fn new(binlog: &str, timestamp: u32) -> Self {
        Self {
            binlog: binlog.to_string(),
            pos: 4,
            timestamp,
            events: Vec::new(),
        }
    }

    /// Set the timestamp of the following events.
    pub fn at(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn push(mut self, size: u64, payload: EventPayload) -> Self {
        let header = EventHeader {
            binlog: self.binlog.clone(),
            start_pos: self.pos,
            stop_pos: self.pos + size,
            timestamp: self.timestamp,
        };
        self.pos += size;
        self.events.push(BinlogEvent { header, payload });
        self
    }

    pub fn query(self, database: &str, sql: &str) -> Self {
        let size = 60 + sql.len() as u64;
        self.push(
            size,
            EventPayload::Query {
                database: database.to_string(),
                sql: sql.to_string(),
            },
        )
    }

    pub fn begin(self, database: &str) -> Self {
        self.query(database, "BEGIN")
    }

    pub fn commit(self) -> Self {
        self.push(31, EventPayload::Xid)
    }

    pub fn gtid(self, gtid: &str, starts_transaction: bool) -> Self {
        self.push(
            65,
            EventPayload::Gtid {
                gtid: gtid.to_string(),
                starts_transaction,
            },
        )
    }

    pub fn rows_query(self, sql: &str) -> Self {
        let size = 30 + sql.len() as u64;
        self.push(size, EventPayload::RowsQuery(sql.to_string()))
    }

    pub fn rows(
        self,
        kind: RowsEventKind,
        database: &str,
        table: &str,
        rows: Vec<Vec<ColumnValue>>,
    ) -> Self {
        let size = 40 + 10 * rows.len() as u64;
        self.push(
            size,
            EventPayload::Rows(RowsEvent {
                kind,
                database: database.to_string(),
                table: table.to_string(),
                rows,
            }),
        )
    }

    pub fn insert(self, database: &str, table: &str, rows: Vec<Vec<ColumnValue>>) -> Self {
        self.rows(RowsEventKind::Insert, database, table, rows)
    }

    pub fn delete(self, database: &str, table: &str, rows: Vec<Vec<ColumnValue>>) -> Self {
        self.rows(RowsEventKind::Delete, database, table, rows)
    }

    /// `pairs` are `(before, after)` images.
    pub fn update(
        self,
        database: &str,
        table: &str,
        pairs: Vec<(Vec<ColumnValue>, Vec<ColumnValue>)>,
    ) -> Self {
        let rows = pairs
            .into_iter()
            .flat_map(|(before, after)| [before, after])
            .collect();
        self.rows(RowsEventKind::Update, database, table, rows)
    }

    /// Rotate to `next`; following events belong to the new file.
    pub fn rotate(mut self, next: &str) -> Self {
        self = self.push(
            47,
            EventPayload::Rotate {
                next_binlog: next.to_string(),
                position: 4,
            },
        );
        self.binlog = next.to_string();
        self.pos = 4;
        self
    }

    pub fn build(self) -> Vec<BinlogEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_are_contiguous() {
        let events = StreamBuilder::new("bin.000001", 100)
            .begin("db")
            .insert("db", "t", vec![vec![ColumnValue::Int(1)]])
            .commit()
            .rotate("bin.000002")
            .query("db", "DROP TABLE t")
            .build();

        for pair in events[..4].windows(2) {
            assert_eq!(pair[0].header.stop_pos, pair[1].header.start_pos);
        }
        assert_eq!(events[3].header.binlog, "bin.000001");
        assert_eq!(events[4].header.binlog, "bin.000002");
        assert_eq!(events[4].header.start_pos, 4);
    }
}
