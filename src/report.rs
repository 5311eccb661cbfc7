//! Fixed-width text reports.
//!
//! Every report starts with a header line naming its columns; records follow
//! one per line. Datetimes are written without a space so that columns stay
//! whitespace separated.

use anyhow::Context;
use binlog_events::binlog_index;
use sql_rebuild::BinlogTimeZone;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub const STATS_FILE: &str = "binlog_status.txt";
pub const DDL_FILE: &str = "ddl_info.txt";
pub const BIG_LONG_TRX_FILE: &str = "binlog_biglong_trx.txt";

const ORIGINAL_SQL_BASE_NAME: &str = "original_sql";

/// Create (truncating) a report file in `dir`.
pub fn create(dir: &Path, name: &str) -> anyhow::Result<BufWriter<File>> {
    let path = dir.join(name);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

pub fn report_datetime(time_zone: BinlogTimeZone, timestamp: u32) -> String {
    time_zone
        .format_timestamp(i64::from(timestamp), 0)
        .replace(' ', "_")
}

/// Index of a binlog file name, 0 when it has none.
pub fn binlog_number(binlog: &str) -> u64 {
    binlog_index(binlog).unwrap_or(0)
}

pub fn original_sql_file_name(binlog: &str) -> String {
    format!("{ORIGINAL_SQL_BASE_NAME}.binlog{}.sql", binlog_number(binlog))
}

// ============================================================================
// Per-table statistics
// ============================================================================

pub fn stats_header() -> String {
    format!(
        "{:<17} {:<19} {:<19} {:<10} {:<10} {:<8} {:<8} {:<8} {:<15} {:<20}\n",
        "binlog",
        "starttime",
        "stoptime",
        "startpos",
        "stoppos",
        "inserts",
        "updates",
        "deletes",
        "database",
        "table"
    )
}

/// Row counts of one table over one flush window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub binlog: String,
    pub start_time: u32,
    pub stop_time: u32,
    pub start_pos: u64,
    pub stop_pos: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub database: String,
    pub table: String,
}

impl TableStats {
    pub fn line(&self, time_zone: BinlogTimeZone) -> String {
        format!(
            "{:<17} {:<19} {:<19} {:<10} {:<10} {:<8} {:<8} {:<8} {:<15} {:<20}\n",
            self.binlog,
            report_datetime(time_zone, self.start_time),
            report_datetime(time_zone, self.stop_time),
            self.start_pos,
            self.stop_pos,
            self.inserts,
            self.updates,
            self.deletes,
            self.database,
            self.table
        )
    }
}

// ============================================================================
// DDL and original statements
// ============================================================================

/// Header shared by the DDL log and the original-SQL files.
pub fn statement_header() -> String {
    format!(
        "{:<19} {:<17} {:<10} {:<10} {}\n",
        "datetime", "binlog", "startpos", "stoppos", "sql"
    )
}

pub fn statement_line(
    time_zone: BinlogTimeZone,
    timestamp: u32,
    binlog: &str,
    start_pos: u64,
    stop_pos: u64,
    sql: &str,
) -> String {
    format!(
        "{:<19} {:<17} {:<10} {:<10} {}\n",
        report_datetime(time_zone, timestamp),
        binlog,
        start_pos,
        stop_pos,
        sql
    )
}

// ============================================================================
// Big and long transactions
// ============================================================================

pub fn big_long_trx_header() -> String {
    format!(
        "{:<17} {:<19} {:<19} {:<10} {:<10} {:<8} {:<10} {}\n",
        "binlog", "starttime", "stoptime", "startpos", "stoppos", "rows", "duration", "tables"
    )
}

/// Rows changed in one table by one transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrxSummary {
    pub binlog: String,
    pub start_time: u32,
    pub stop_time: u32,
    pub start_pos: u64,
    pub stop_pos: u64,
    pub rows: u64,
    pub duration: u32,
    /// `database.table` with its row counts, sorted by name
    pub tables: Vec<(String, RowCounts)>,
}

impl TrxSummary {
    pub fn line(&self, time_zone: BinlogTimeZone) -> String {
        let tables = self
            .tables
            .iter()
            .map(|(name, counts)| {
                format!(
                    "{name}(inserts={}, updates={}, deletes={})",
                    counts.inserts, counts.updates, counts.deletes
                )
            })
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "{:<17} {:<19} {:<19} {:<10} {:<10} {:<8} {:<10} [{}]\n",
            self.binlog,
            report_datetime(time_zone, self.start_time),
            report_datetime(time_zone, self.stop_time),
            self.start_pos,
            self.stop_pos,
            self.rows,
            self.duration,
            tables
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UTC: BinlogTimeZone = BinlogTimeZone::Named(chrono_tz::UTC);

    #[test]
    fn test_headers_name_columns_in_order() {
        let columns: Vec<String> = stats_header()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        assert_eq!(
            columns,
            [
                "binlog", "starttime", "stoptime", "startpos", "stoppos", "inserts", "updates",
                "deletes", "database", "table"
            ]
        );
        assert!(statement_header().starts_with("datetime "));
        assert!(big_long_trx_header().trim_end().ends_with("tables"));
    }

    #[test]
    fn test_stats_line_aligns_with_header() {
        let stats = TableStats {
            binlog: "mysql-bin.000003".to_string(),
            start_time: 0,
            stop_time: 61,
            start_pos: 4,
            stop_pos: 900,
            inserts: 2,
            updates: 0,
            deletes: 1,
            database: "shop".to_string(),
            table: "orders".to_string(),
        };
        let line = stats.line(UTC);
        assert!(line.starts_with("mysql-bin.000003  1970-01-01_00:00:00 1970-01-01_00:01:01 4 "));
        assert_eq!(line.find("shop"), stats_header().find("database"));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn test_trx_line_lists_tables() {
        let summary = TrxSummary {
            binlog: "mysql-bin.000003".to_string(),
            start_time: 10,
            stop_time: 20,
            start_pos: 120,
            stop_pos: 5000,
            rows: 600,
            duration: 10,
            tables: vec![
                (
                    "shop.orders".to_string(),
                    RowCounts {
                        inserts: 400,
                        ..Default::default()
                    },
                ),
                (
                    "shop.stock".to_string(),
                    RowCounts {
                        updates: 200,
                        ..Default::default()
                    },
                ),
            ],
        };
        let line = summary.line(UTC);
        assert!(line.contains(" 600 "));
        assert!(line.trim_end().ends_with(
            "[shop.orders(inserts=400, updates=0, deletes=0) shop.stock(inserts=0, updates=200, deletes=0)]"
        ));
    }

    #[test]
    fn test_file_names() {
        assert_eq!(original_sql_file_name("mysql-bin.000012"), "original_sql.binlog12.sql");
        assert_eq!(binlog_number("relay"), 0);
        let line = statement_line(UTC, 0, "mysql-bin.000001", 4, 100, "use app;DROP TABLE t");
        assert!(line.starts_with("1970-01-01_00:00:00 mysql-bin.000001  4 "));
        assert!(line.ends_with("use app;DROP TABLE t\n"));
    }
}
