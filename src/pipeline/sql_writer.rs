//! Ordered writer of reconstructed SQL.
//!
//! Results arrive from the workers in any order and are released strictly by
//! sequence number. Statements are grouped into blocks: one block per source
//! transaction, or one per event outside a transaction. Forward blocks are
//! written as they complete. Rollback blocks have their statements reversed
//! and are held per file until the file is closed, then written newest
//! first, so a rollback file undoes the most recent change first.
//!
//! Events of a transaction are routed to the files of the binlog in which
//! the transaction began, even when it commits in a later binlog.

use super::{Output, WorkResult};
use crate::config::{Config, OutputSettings};
use crate::report::{binlog_number, report_datetime};
use anyhow::{bail, Context};
use binlog_events::EventHeader;
use sql_rebuild::{quote_identifier, BinlogTimeZone, ChangeKind, Direction, ReconstructedEvent};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What the writer produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlWriterSummary {
    /// Output files in creation order
    pub files: Vec<PathBuf>,
    pub statements: u64,
    /// Events built from placeholder columns
    pub degraded_events: u64,
}

/// Statements of one source event with the lines that annotate them.
#[derive(Debug)]
struct Group {
    /// Database a `use` line switches to before the statements, if any
    use_database: Option<String>,
    comments: Vec<String>,
    statements: Vec<String>,
}

#[derive(Debug, Default)]
struct Block {
    /// Wrap in `begin;` and `commit;` forward, `begin;` and `rollback;` for rollback
    wrapped: bool,
    groups: Vec<Group>,
}

struct SqlFile {
    writer: BufWriter<File>,
    last_use: Option<String>,
    /// Rollback blocks waiting to be written in reverse
    held: Vec<Block>,
}

/// Output file of an event: per binlog, optionally per table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct FileKey {
    table: Option<(String, String)>,
    binlog: String,
}

struct OpenTransaction {
    binlog: String,
    /// Groups per file, files in first-use order
    groups: Vec<(FileKey, Vec<Group>)>,
}

pub(crate) struct SqlWriter {
    dir: PathBuf,
    direction: Direction,
    output: OutputSettings,
    schema_prefix: bool,
    time_zone: BinlogTimeZone,
    next_seq: u64,
    reorder: BTreeMap<u64, WorkResult>,
    trx: Option<OpenTransaction>,
    current_binlog: Option<String>,
    files: HashMap<FileKey, SqlFile>,
    summary: SqlWriterSummary,
}

impl SqlWriter {
    pub fn new(config: &Config) -> Self {
        Self {
            dir: config.output_dir.clone(),
            direction: super::worker::direction(config.work_type),
            output: config.output,
            schema_prefix: config.rebuild.schema_prefix,
            time_zone: config.time_zone,
            next_seq: 0,
            reorder: BTreeMap::new(),
            trx: None,
            current_binlog: None,
            files: HashMap::new(),
            summary: SqlWriterSummary::default(),
        }
    }

    pub fn run(mut self, mut rx: mpsc::Receiver<WorkResult>) -> anyhow::Result<SqlWriterSummary> {
        info!(direction = ?self.direction, "SQL writer started");
        while let Some(result) = rx.blocking_recv() {
            self.push(result)?;
        }
        let summary = self.finish()?;
        info!(
            files = summary.files.len(),
            statements = summary.statements,
            "SQL writer finished"
        );
        Ok(summary)
    }

    /// Accept one result; results are processed once every earlier one has arrived.
    pub fn push(&mut self, result: WorkResult) -> anyhow::Result<()> {
        self.reorder.insert(result.seq, result);
        while let Some(result) = self.reorder.remove(&self.next_seq) {
            self.next_seq += 1;
            self.process(result)?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> anyhow::Result<SqlWriterSummary> {
        if let Some((&seq, _)) = self.reorder.first_key_value() {
            bail!(
                "SQL results incomplete: expected sequence {}, next available is {seq}",
                self.next_seq
            );
        }
        if let Some(trx) = self.trx.take() {
            warn!(binlog = %trx.binlog, "stream ended inside a transaction, writing it unterminated");
            self.emit_transaction(trx, false)?;
        }
        self.close_all()?;
        Ok(self.summary)
    }

    fn process(&mut self, result: WorkResult) -> anyhow::Result<()> {
        let WorkResult {
            header,
            gtid,
            output,
            ..
        } = result;
        match output {
            Output::TrxBegin => {
                if let Some(trx) = self.trx.take() {
                    debug!(binlog = %trx.binlog, "transaction without end, closing it");
                    self.emit_transaction(trx, false)?;
                }
                self.rotate_if_needed(&header.binlog)?;
                self.trx = Some(OpenTransaction {
                    binlog: header.binlog,
                    groups: Vec::new(),
                });
            }
            Output::TrxEnd => {
                if let Some(trx) = self.trx.take() {
                    self.emit_transaction(trx, self.output.keep_trx)?;
                }
            }
            Output::Event(event) => {
                if event.degraded {
                    self.summary.degraded_events += 1;
                }
                let group = self.group(&event, &header, gtid.as_deref());
                match &mut self.trx {
                    Some(trx) => {
                        let key = file_key(&event, &trx.binlog, self.output.file_per_table);
                        match trx.groups.iter_mut().find(|(k, _)| *k == key) {
                            Some((_, groups)) => groups.push(group),
                            None => trx.groups.push((key, vec![group])),
                        }
                    }
                    None => {
                        self.rotate_if_needed(&event.binlog)?;
                        let key = file_key(&event, &event.binlog, self.output.file_per_table);
                        let block = Block {
                            wrapped: false,
                            groups: vec![group],
                        };
                        self.emit_block(key, block)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn group(&self, event: &ReconstructedEvent, header: &EventHeader, gtid: Option<&str>) -> Group {
        let needs_use = event.kind == ChangeKind::Ddl
            || event.kind == ChangeKind::Query
            || !self.schema_prefix;
        let use_database = (needs_use && !event.database.is_empty()).then(|| event.database.clone());

        let mut comments = Vec::new();
        if self.output.print_extra_info {
            comments.push(format!(
                "# datetime={} database={} table={} binlog={} startpos={} stoppos={} gtid={}",
                report_datetime(self.time_zone, header.timestamp),
                event.database,
                event.table,
                event.binlog,
                event.start_pos,
                event.stop_pos,
                gtid.unwrap_or("")
            ));
        }
        if event.degraded {
            comments.push(format!(
                "# WARNING: rows of {}.{} at {}:{} were decoded without a matching table definition, statements may be wrong",
                event.database, event.table, event.binlog, event.start_pos
            ));
        }
        Group {
            use_database,
            comments,
            statements: event.statements.clone(),
        }
    }

    fn emit_transaction(&mut self, trx: OpenTransaction, wrapped: bool) -> anyhow::Result<()> {
        for (key, groups) in trx.groups {
            self.emit_block(key, Block { wrapped, groups })?;
        }
        Ok(())
    }

    fn emit_block(&mut self, key: FileKey, mut block: Block) -> anyhow::Result<()> {
        block.groups.retain(|g| !g.statements.is_empty());
        if block.groups.is_empty() {
            return Ok(());
        }
        self.summary.statements += block
            .groups
            .iter()
            .map(|g| g.statements.len() as u64)
            .sum::<u64>();

        let direction = self.direction;
        let file = self.file(&key)?;
        match direction {
            Direction::Forward => write_block(file, &block, direction),
            Direction::Rollback => {
                block.groups.reverse();
                for group in &mut block.groups {
                    group.statements.reverse();
                }
                file.held.push(block);
                Ok(())
            }
        }
    }

    fn file(&mut self, key: &FileKey) -> anyhow::Result<&mut SqlFile> {
        if !self.files.contains_key(key) {
            let path = self.dir.join(file_name(key, self.direction));
            let handle = File::create(&path)
                .with_context(|| format!("Failed to create SQL file {}", path.display()))?;
            info!(path = %path.display(), "opened SQL file");
            self.summary.files.push(path);
            self.files.insert(
                key.clone(),
                SqlFile {
                    writer: BufWriter::new(handle),
                    last_use: None,
                    held: Vec::new(),
                },
            );
        }
        self.files
            .get_mut(key)
            .context("SQL file missing right after it was opened")
    }

    /// Close the files of the previous binlog once output moves to a new one.
    fn rotate_if_needed(&mut self, binlog: &str) -> anyhow::Result<()> {
        if self.current_binlog.as_deref() == Some(binlog) {
            return Ok(());
        }
        if self.current_binlog.is_some() {
            self.close_all()?;
        }
        self.current_binlog = Some(binlog.to_string());
        Ok(())
    }

    fn close_all(&mut self) -> anyhow::Result<()> {
        let mut files: Vec<(FileKey, SqlFile)> = self.files.drain().collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, mut file) in files {
            let held = std::mem::take(&mut file.held);
            for block in held.iter().rev() {
                write_block(&mut file, block, self.direction)?;
            }
            file.writer
                .flush()
                .with_context(|| format!("Failed to write {}", file_name(&key, self.direction)))?;
            debug!(file = %file_name(&key, self.direction), "closed SQL file");
        }
        Ok(())
    }
}

fn file_key(event: &ReconstructedEvent, binlog: &str, per_table: bool) -> FileKey {
    FileKey {
        table: (per_table && !event.table.is_empty())
            .then(|| (event.database.clone(), event.table.clone())),
        binlog: binlog.to_string(),
    }
}

fn file_name(key: &FileKey, direction: Direction) -> String {
    let kind = match direction {
        Direction::Forward => "forward",
        Direction::Rollback => "rollback",
    };
    let index = binlog_number(&key.binlog);
    match &key.table {
        Some((database, table)) => format!("{database}.{table}.{kind}.{index}.sql"),
        None => format!("{kind}.{index}.sql"),
    }
}

fn write_block(file: &mut SqlFile, block: &Block, direction: Direction) -> anyhow::Result<()> {
    let mut lines = Vec::new();
    if block.wrapped {
        lines.push("begin;".to_string());
    }
    for group in &block.groups {
        if let Some(database) = &group.use_database {
            if file.last_use.as_ref() != Some(database) {
                lines.push(format!("use {};", quote_identifier(database)));
                file.last_use = Some(database.clone());
            }
        }
        lines.extend(group.comments.iter().cloned());
        lines.extend(group.statements.iter().cloned());
    }
    if block.wrapped {
        let end = match direction {
            Direction::Forward => "commit;",
            Direction::Rollback => "rollback;",
        };
        lines.push(end.to_string());
    }
    for line in lines {
        writeln!(file.writer, "{line}").context("Failed to write SQL file")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn config(dir: &std::path::Path, extra: &[&str]) -> Config {
        let mut args = vec![
            "binlog-rewind",
            "--mode",
            "repl",
            "--start-file",
            "mysql-bin.000001",
            "--start-pos",
            "4",
            "--user",
            "root",
            "--time-zone",
            "UTC",
            "--output-dir",
            dir.to_str().unwrap(),
        ];
        args.extend_from_slice(extra);
        Config::from_cli(&Cli::parse_from(args)).unwrap()
    }

    fn header(binlog: &str, pos: u64) -> EventHeader {
        EventHeader {
            binlog: binlog.to_string(),
            start_pos: pos,
            stop_pos: pos + 10,
            timestamp: 0,
        }
    }

    fn event(binlog: &str, pos: u64, table: &str, statements: &[&str], direction: Direction) -> Output {
        Output::Event(ReconstructedEvent {
            binlog: binlog.to_string(),
            start_pos: pos,
            stop_pos: pos + 10,
            timestamp: 0,
            database: "shop".to_string(),
            table: table.to_string(),
            kind: ChangeKind::Insert,
            direction,
            statements: statements.iter().map(|s| s.to_string()).collect(),
            degraded: false,
        })
    }

    fn result(seq: u64, binlog: &str, pos: u64, output: Output) -> WorkResult {
        WorkResult {
            seq,
            header: header(binlog, pos),
            gtid: None,
            output,
        }
    }

    fn read(dir: &std::path::Path, name: &str) -> Vec<String> {
        std::fs::read_to_string(dir.join(name))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    const BIN1: &str = "mysql-bin.000001";
    const BIN2: &str = "mysql-bin.000002";

    #[test]
    fn test_out_of_order_results_written_in_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SqlWriter::new(&config(dir.path(), &["--work-type", "2sql"]));
        let fwd = Direction::Forward;
        writer.push(result(2, BIN1, 30, event(BIN1, 30, "orders", &["S3;"], fwd))).unwrap();
        writer.push(result(0, BIN1, 10, event(BIN1, 10, "orders", &["S1;"], fwd))).unwrap();
        writer.push(result(1, BIN1, 20, event(BIN1, 20, "orders", &["S2;"], fwd))).unwrap();
        let summary = writer.finish().unwrap();
        assert_eq!(summary.statements, 3);
        assert_eq!(read(dir.path(), "forward.1.sql"), ["S1;", "S2;", "S3;"]);
    }

    #[test]
    fn test_missing_sequence_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SqlWriter::new(&config(dir.path(), &["--work-type", "2sql"]));
        let output = event(BIN1, 10, "orders", &["S2;"], Direction::Forward);
        writer.push(result(1, BIN1, 10, output)).unwrap();
        let err = writer.finish().unwrap_err();
        assert!(err.to_string().contains("expected sequence 0"));
    }

    #[test]
    fn test_keep_trx_wraps_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            SqlWriter::new(&config(dir.path(), &["--work-type", "2sql", "--keep-trx"]));
        let fwd = Direction::Forward;
        writer.push(result(0, BIN1, 4, Output::TrxBegin)).unwrap();
        writer.push(result(1, BIN1, 10, event(BIN1, 10, "orders", &["S1;"], fwd))).unwrap();
        writer.push(result(2, BIN1, 20, event(BIN1, 20, "stock", &["S2;"], fwd))).unwrap();
        writer.push(result(3, BIN1, 30, Output::TrxEnd)).unwrap();
        writer.finish().unwrap();
        assert_eq!(
            read(dir.path(), "forward.1.sql"),
            ["begin;", "S1;", "S2;", "commit;"]
        );
    }

    #[test]
    fn test_rollback_reversed_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            SqlWriter::new(&config(dir.path(), &["--work-type", "rollback", "--keep-trx"]));
        let rb = Direction::Rollback;
        let items = vec![
            Output::TrxBegin,
            event(BIN1, 10, "orders", &["U1a;", "U1b;"], rb),
            event(BIN1, 20, "orders", &["U2;"], rb),
            Output::TrxEnd,
            Output::TrxBegin,
            event(BIN1, 50, "orders", &["U3;"], rb),
            Output::TrxEnd,
        ];
        for (seq, output) in items.into_iter().enumerate() {
            writer.push(result(seq as u64, BIN1, seq as u64 * 10, output)).unwrap();
        }
        writer.finish().unwrap();
        assert_eq!(
            read(dir.path(), "rollback.1.sql"),
            ["begin;", "U3;", "rollback;", "begin;", "U2;", "U1b;", "U1a;", "rollback;"]
        );
    }

    #[test]
    fn test_transaction_stays_in_its_starting_binlog() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SqlWriter::new(&config(dir.path(), &["--work-type", "2sql"]));
        let fwd = Direction::Forward;
        let items = vec![
            (BIN1, Output::TrxBegin),
            (BIN1, event(BIN1, 10, "orders", &["S1;"], fwd)),
            (BIN2, event(BIN2, 4, "orders", &["S2;"], fwd)),
            (BIN2, Output::TrxEnd),
            (BIN2, event(BIN2, 80, "orders", &["S3;"], fwd)),
        ];
        for (seq, (binlog, output)) in items.into_iter().enumerate() {
            writer.push(result(seq as u64, binlog, 10, output)).unwrap();
        }
        let summary = writer.finish().unwrap();
        assert_eq!(read(dir.path(), "forward.1.sql"), ["S1;", "S2;"]);
        assert_eq!(read(dir.path(), "forward.2.sql"), ["S3;"]);
        assert_eq!(summary.files.len(), 2);
    }

    #[test]
    fn test_ddl_gets_use_line_and_file_per_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SqlWriter::new(&config(
            dir.path(),
            &["--work-type", "2sql", "--file-per-table"],
        ));
        let ddl = |pos| {
            Output::Event(ReconstructedEvent::passthrough(
                &header(BIN1, pos),
                "shop",
                "orders",
                "ALTER TABLE orders ADD note TEXT",
                ChangeKind::Ddl,
                Direction::Forward,
            ))
        };
        writer.push(result(0, BIN1, 10, ddl(10))).unwrap();
        writer.push(result(1, BIN1, 20, ddl(20))).unwrap();
        writer
            .push(result(2, BIN1, 30, event(BIN1, 30, "stock", &["S1;"], Direction::Forward)))
            .unwrap();
        writer.finish().unwrap();
        assert_eq!(
            read(dir.path(), "shop.orders.forward.1.sql"),
            [
                "use `shop`;",
                "ALTER TABLE orders ADD note TEXT;",
                "ALTER TABLE orders ADD note TEXT;"
            ]
        );
        assert_eq!(read(dir.path(), "shop.stock.forward.1.sql"), ["S1;"]);
    }

    #[test]
    fn test_extra_info_and_degraded_comments() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SqlWriter::new(&config(
            dir.path(),
            &["--work-type", "2sql", "--print-extra-info"],
        ));
        let Output::Event(mut degraded) = event(BIN1, 10, "orders", &["S1;"], Direction::Forward)
        else {
            unreachable!()
        };
        degraded.degraded = true;
        let mut item = result(0, BIN1, 10, Output::Event(degraded));
        item.gtid = Some("uuid:7".to_string());
        writer.push(item).unwrap();
        let summary = writer.finish().unwrap();
        assert_eq!(summary.degraded_events, 1);

        let lines = read(dir.path(), "forward.1.sql");
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "# datetime=1970-01-01_00:00:00 database=shop table=orders binlog=mysql-bin.000001 startpos=10 stoppos=20 gtid=uuid:7"
        );
        assert!(lines[1].starts_with("# WARNING: rows of shop.orders"));
        assert_eq!(lines[2], "S1;");
    }
}
