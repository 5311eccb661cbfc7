//! Transaction and DDL statistics.
//!
//! [`StatsAggregator`] consumes classified events in binlog order and writes
//! three reports: per-table row counts flushed on an interval and at every
//! binlog change, a DDL log, and a log of big or long transactions.
//!
//! A transaction starts at `BEGIN` (or a MariaDB GTID event) and ends at
//! `COMMIT`, `ROLLBACK` or an XID event. It is carried across binlog
//! rotation and reported with the binlog it began in.

use crate::config::StatsSettings;
use crate::report::{self, RowCounts, TableStats, TrxSummary};
use binlog_events::{EventHeader, RowsEventKind};
use sql_rebuild::BinlogTimeZone;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// What an event means to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatKind {
    Begin,
    /// `COMMIT`, `ROLLBACK` or XID
    End,
    Ddl {
        /// Session database the statement ran in
        database: String,
        sql: String,
        /// `CREATE/ALTER/DROP DATABASE`
        database_level: bool,
    },
    /// Statement-based DML; its tables are counted with zero rows
    DmlQuery { tables: Vec<(String, String)> },
    Rows {
        kind: RowsEventKind,
        database: String,
        table: String,
        rows: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatEvent {
    pub header: EventHeader,
    pub kind: StatKind,
}

impl StatEvent {
    pub fn new(header: &EventHeader, kind: StatKind) -> Self {
        Self {
            header: header.clone(),
            kind,
        }
    }
}

#[derive(Debug)]
struct TrxAccumulator {
    binlog: String,
    start_pos: u64,
    /// Timestamp of the first counted rows event, 0 before it
    start_time: u32,
    rows: u64,
    tables: BTreeMap<String, RowCounts>,
}

pub struct StatsAggregator<W: Write> {
    stats: W,
    ddl: W,
    big_long: W,
    settings: StatsSettings,
    time_zone: BinlogTimeZone,
    last_binlog: Option<String>,
    /// Flush once an event reaches this timestamp; 0 means unset
    next_flush: u32,
    pending: BTreeMap<String, TableStats>,
    trx: Option<TrxAccumulator>,
}

impl<W: Write> StatsAggregator<W> {
    /// Write the report headers and start aggregating.
    pub fn new(
        mut stats: W,
        mut ddl: W,
        mut big_long: W,
        settings: StatsSettings,
        time_zone: BinlogTimeZone,
    ) -> io::Result<Self> {
        stats.write_all(report::stats_header().as_bytes())?;
        ddl.write_all(report::statement_header().as_bytes())?;
        big_long.write_all(report::big_long_trx_header().as_bytes())?;
        Ok(Self {
            stats,
            ddl,
            big_long,
            settings,
            time_zone,
            last_binlog: None,
            next_flush: 0,
            pending: BTreeMap::new(),
            trx: None,
        })
    }

    pub fn handle(&mut self, event: &StatEvent) -> io::Result<()> {
        let header = &event.header;
        if self.last_binlog.as_deref() != Some(header.binlog.as_str()) {
            self.flush_pending()?;
            self.next_flush = 0;
            self.last_binlog = Some(header.binlog.clone());
        }
        if self.next_flush == 0 {
            self.next_flush = header.timestamp.saturating_add(self.settings.print_interval);
        }

        match &event.kind {
            StatKind::Begin => {
                self.trx = Some(TrxAccumulator {
                    binlog: header.binlog.clone(),
                    start_pos: header.start_pos,
                    start_time: 0,
                    rows: 0,
                    tables: BTreeMap::new(),
                });
            }
            StatKind::End => {
                if let Some(trx) = self.trx.take() {
                    self.end_transaction(trx, header)?;
                }
            }
            StatKind::Ddl {
                database,
                sql,
                database_level,
            } => {
                let sql = if database.is_empty() || *database_level {
                    sql.clone()
                } else {
                    format!("use {database};{sql}")
                };
                let line = report::statement_line(
                    self.time_zone,
                    header.timestamp,
                    &header.binlog,
                    header.start_pos,
                    header.stop_pos,
                    &sql,
                );
                self.ddl.write_all(line.as_bytes())?;
            }
            StatKind::DmlQuery { tables } => {
                for (database, table) in tables {
                    self.count(header, database, table, None, 0);
                }
            }
            StatKind::Rows {
                kind,
                database,
                table,
                rows,
            } => {
                if let Some(trx) = &mut self.trx {
                    trx.rows += rows;
                    let counts = trx.tables.entry(format!("{database}.{table}")).or_default();
                    add_rows(counts, *kind, *rows);
                    if trx.start_time == 0 {
                        trx.start_time = header.timestamp;
                    }
                }
                self.count(header, database, table, Some(*kind), *rows);
            }
        }

        if header.timestamp >= self.next_flush {
            self.flush_pending()?;
            self.next_flush = header.timestamp.saturating_add(self.settings.print_interval);
        }
        Ok(())
    }

    fn count(
        &mut self,
        header: &EventHeader,
        database: &str,
        table: &str,
        kind: Option<RowsEventKind>,
        rows: u64,
    ) {
        let stats = self
            .pending
            .entry(format!("{database}.{table}"))
            .or_insert_with(|| TableStats {
                binlog: header.binlog.clone(),
                start_time: header.timestamp,
                stop_time: header.timestamp,
                start_pos: header.start_pos,
                stop_pos: header.stop_pos,
                inserts: 0,
                updates: 0,
                deletes: 0,
                database: database.to_string(),
                table: table.to_string(),
            });
        match kind {
            Some(RowsEventKind::Insert) => stats.inserts += rows,
            Some(RowsEventKind::Update) => stats.updates += rows,
            Some(RowsEventKind::Delete) => stats.deletes += rows,
            None => {}
        }
        stats.stop_time = header.timestamp;
        stats.stop_pos = header.stop_pos;
    }

    fn end_transaction(&mut self, trx: TrxAccumulator, header: &EventHeader) -> io::Result<()> {
        // every rows event of the transaction may have been filtered out
        if trx.start_time == 0 {
            return Ok(());
        }
        let duration = header.timestamp.saturating_sub(trx.start_time);
        if trx.rows < self.settings.big_trx_rows && duration < self.settings.long_trx_secs {
            return Ok(());
        }
        let summary = TrxSummary {
            binlog: trx.binlog,
            start_time: trx.start_time,
            stop_time: header.timestamp,
            start_pos: trx.start_pos,
            stop_pos: header.stop_pos,
            rows: trx.rows,
            duration,
            tables: trx.tables.into_iter().collect(),
        };
        self.big_long.write_all(summary.line(self.time_zone).as_bytes())
    }

    fn flush_pending(&mut self) -> io::Result<()> {
        for stats in std::mem::take(&mut self.pending).into_values() {
            self.stats.write_all(stats.line(self.time_zone).as_bytes())?;
        }
        Ok(())
    }

    /// Flush what is left and hand back the writers.
    pub fn finish(mut self) -> io::Result<(W, W, W)> {
        self.flush_pending()?;
        self.stats.flush()?;
        self.ddl.flush()?;
        self.big_long.flush()?;
        Ok((self.stats, self.ddl, self.big_long))
    }
}

fn add_rows(counts: &mut RowCounts, kind: RowsEventKind, rows: u64) {
    match kind {
        RowsEventKind::Insert => counts.inserts += rows,
        RowsEventKind::Update => counts.updates += rows,
        RowsEventKind::Delete => counts.deletes += rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UTC: BinlogTimeZone = BinlogTimeZone::Named(chrono_tz::UTC);

    fn header(binlog: &str, pos: u64, timestamp: u32) -> EventHeader {
        EventHeader {
            binlog: binlog.to_string(),
            start_pos: pos,
            stop_pos: pos + 50,
            timestamp,
        }
    }

    fn rows(kind: RowsEventKind, table: &str, rows: u64) -> StatKind {
        StatKind::Rows {
            kind,
            database: "shop".to_string(),
            table: table.to_string(),
            rows,
        }
    }

    fn run(events: Vec<StatEvent>, settings: StatsSettings) -> (String, String, String) {
        let mut aggregator =
            StatsAggregator::new(Vec::new(), Vec::new(), Vec::new(), settings, UTC).unwrap();
        for event in &events {
            aggregator.handle(event).unwrap();
        }
        let (stats, ddl, big_long) = aggregator.finish().unwrap();
        (
            String::from_utf8(stats).unwrap(),
            String::from_utf8(ddl).unwrap(),
            String::from_utf8(big_long).unwrap(),
        )
    }

    fn records(report: &str) -> Vec<&str> {
        report.lines().skip(1).collect()
    }

    const BIN1: &str = "mysql-bin.000001";
    const BIN2: &str = "mysql-bin.000002";

    #[test]
    fn test_big_transaction_reported_once() {
        let events = vec![
            StatEvent::new(&header(BIN1, 4, 100), StatKind::Begin),
            StatEvent::new(&header(BIN1, 100, 100), rows(RowsEventKind::Insert, "orders", 200)),
            StatEvent::new(&header(BIN1, 200, 101), rows(RowsEventKind::Insert, "orders", 200)),
            StatEvent::new(&header(BIN1, 300, 102), rows(RowsEventKind::Insert, "orders", 200)),
            StatEvent::new(&header(BIN1, 400, 102), StatKind::End),
        ];
        let (stats, _, big_long) = run(events, StatsSettings::default());

        let trx = records(&big_long);
        assert_eq!(trx.len(), 1);
        let fields: Vec<&str> = trx[0].split_whitespace().collect();
        assert_eq!(fields[0], BIN1);
        assert_eq!(fields[3], "4");
        assert_eq!(fields[4], "450");
        assert_eq!(fields[5], "600");
        assert_eq!(fields[6], "2");
        assert!(trx[0].ends_with("[shop.orders(inserts=600, updates=0, deletes=0)]"));

        let table = records(&stats);
        assert_eq!(table.len(), 1);
        let fields: Vec<&str> = table[0].split_whitespace().collect();
        assert_eq!(&fields[5..], ["600", "0", "0", "shop", "orders"]);
    }

    #[test]
    fn test_small_short_transaction_not_reported() {
        let events = vec![
            StatEvent::new(&header(BIN1, 4, 100), StatKind::Begin),
            StatEvent::new(&header(BIN1, 100, 100), rows(RowsEventKind::Delete, "orders", 3)),
            StatEvent::new(&header(BIN1, 200, 100), StatKind::End),
        ];
        let (_, _, big_long) = run(events, StatsSettings::default());
        assert!(records(&big_long).is_empty());
    }

    #[test]
    fn test_long_transaction_reported() {
        let settings = StatsSettings {
            long_trx_secs: 60,
            print_interval: 600,
            ..Default::default()
        };
        let events = vec![
            StatEvent::new(&header(BIN1, 4, 1000), StatKind::Begin),
            StatEvent::new(&header(BIN1, 100, 1000), rows(RowsEventKind::Update, "stock", 1)),
            StatEvent::new(&header(BIN1, 200, 1090), rows(RowsEventKind::Delete, "orders", 1)),
            StatEvent::new(&header(BIN1, 300, 1090), StatKind::End),
        ];
        let (_, _, big_long) = run(events, settings);
        let trx = records(&big_long);
        assert_eq!(trx.len(), 1);
        assert_eq!(trx[0].split_whitespace().nth(6), Some("90"));
        assert!(trx[0].ends_with(
            "[shop.orders(inserts=0, updates=0, deletes=1) shop.stock(inserts=0, updates=1, deletes=0)]"
        ));
    }

    #[test]
    fn test_flush_on_interval_and_binlog_change() {
        let settings = StatsSettings {
            print_interval: 10,
            ..Default::default()
        };
        let events = vec![
            StatEvent::new(&header(BIN1, 4, 100), rows(RowsEventKind::Insert, "orders", 1)),
            StatEvent::new(&header(BIN1, 100, 105), rows(RowsEventKind::Insert, "orders", 1)),
            // reaches 100 + 10: flushed together with this event
            StatEvent::new(&header(BIN1, 200, 110), rows(RowsEventKind::Insert, "orders", 1)),
            StatEvent::new(&header(BIN1, 300, 111), rows(RowsEventKind::Insert, "orders", 1)),
            StatEvent::new(&header(BIN2, 4, 112), rows(RowsEventKind::Insert, "orders", 1)),
        ];
        let (stats, _, _) = run(events, settings);
        let lines = records(&stats);
        assert_eq!(lines.len(), 3);
        let inserts: Vec<&str> = lines
            .iter()
            .map(|l| l.split_whitespace().nth(5).unwrap())
            .collect();
        assert_eq!(inserts, ["3", "1", "1"]);
        assert!(lines[1].starts_with(BIN1));
        assert!(lines[2].starts_with(BIN2));
    }

    #[test]
    fn test_ddl_logged_with_use_prefix() {
        let events = vec![
            StatEvent::new(
                &header(BIN1, 4, 0),
                StatKind::Ddl {
                    database: "shop".to_string(),
                    sql: "ALTER TABLE orders ADD note TEXT".to_string(),
                    database_level: false,
                },
            ),
            StatEvent::new(
                &header(BIN1, 100, 0),
                StatKind::Ddl {
                    database: "shop".to_string(),
                    sql: "DROP DATABASE archive".to_string(),
                    database_level: true,
                },
            ),
        ];
        let (_, ddl, _) = run(events, StatsSettings::default());
        let lines = records(&ddl);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("use shop;ALTER TABLE orders ADD note TEXT"));
        assert!(lines[1].ends_with(" DROP DATABASE archive"));
    }

    #[test]
    fn test_statement_dml_counts_tables_with_zero_rows() {
        let events = vec![StatEvent::new(
            &header(BIN1, 4, 0),
            StatKind::DmlQuery {
                tables: vec![("shop".to_string(), "orders".to_string())],
            },
        )];
        let (stats, _, _) = run(events, StatsSettings::default());
        let lines = records(&stats);
        assert_eq!(lines.len(), 1);
        let fields: Vec<&str> = lines[0].split_whitespace().collect();
        assert_eq!(&fields[5..], ["0", "0", "0", "shop", "orders"]);
    }

    #[test]
    fn test_transaction_carried_across_rotation() {
        let events = vec![
            StatEvent::new(&header(BIN1, 900, 100), StatKind::Begin),
            StatEvent::new(&header(BIN1, 1000, 100), rows(RowsEventKind::Insert, "orders", 300)),
            StatEvent::new(&header(BIN2, 4, 101), rows(RowsEventKind::Insert, "orders", 300)),
            StatEvent::new(&header(BIN2, 100, 101), StatKind::End),
        ];
        let (_, _, big_long) = run(events, StatsSettings::default());
        let trx = records(&big_long);
        assert_eq!(trx.len(), 1);
        let fields: Vec<&str> = trx[0].split_whitespace().collect();
        assert_eq!(fields[0], BIN1);
        assert_eq!(fields[3], "900");
        assert_eq!(fields[4], "150");
        assert_eq!(fields[5], "600");
    }
}
