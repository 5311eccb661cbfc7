//! Validated run configuration.
//!
//! [`Config::from_cli`] turns raw command-line options into an immutable
//! configuration, failing with a descriptive error on the first invalid or
//! inconsistent option.

mod window;

pub use window::StreamWindow;

use crate::cli::{Cli, SourceMode, WorkType, DEFAULT_SCHEMA_DUMP_FILE};
use crate::filter::{SqlTypeFilter, TableFilter};
use anyhow::{bail, Context};
use binlog_events::{BinlogPosition, ServerFlavor};
use regex::Regex;
use sql_rebuild::{BinlogTimeZone, RebuildOptions};
use std::path::{Path, PathBuf};

/// Thresholds and cadence of the statistics aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSettings {
    pub print_interval: u32,
    pub big_trx_rows: u64,
    pub long_trx_secs: u32,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            print_interval: 30,
            big_trx_rows: 500,
            long_trx_secs: 300,
        }
    }
}

/// How reconstructed SQL is laid out in files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputSettings {
    pub keep_trx: bool,
    pub file_per_table: bool,
    pub print_extra_info: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: SourceMode,
    pub work_type: WorkType,
    pub flavor: ServerFlavor,
    /// Connection to the source database, when credentials were given
    pub connection: Option<mysql_async::Opts>,
    pub server_id: u32,
    pub filter: TableFilter,
    pub sql_types: SqlTypeFilter,
    pub window: StreamWindow,
    pub time_zone: BinlogTimeZone,
    pub to_last_log: bool,
    pub stats: StatsSettings,
    pub rebuild: RebuildOptions,
    pub output: OutputSettings,
    pub statement_sql: bool,
    pub write_original_sql: bool,
    pub threads: usize,
    pub output_dir: PathBuf,
    pub schema_file: Option<PathBuf>,
    pub only_schema_file: bool,
    pub dump_schema_file: Option<PathBuf>,
    pub ignore_parse_error: Option<Regex>,
    pub binlog_file: Option<PathBuf>,
}

fn check_range<T>(option: &str, value: T, min: T, max: T) -> anyhow::Result<T>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        bail!("{option}: {value} is out of range, valid values range from {min} to {max}");
    }
    Ok(value)
}

/// `file` and `pos` must be given together.
fn position(
    file: Option<&str>,
    pos: Option<u64>,
    file_option: &str,
    pos_option: &str,
) -> anyhow::Result<Option<BinlogPosition>> {
    match (file, pos) {
        (Some(file), Some(pos)) => {
            let name = Path::new(file)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .with_context(|| format!("{file_option}: invalid binlog file name '{file}'"))?;
            Ok(Some(BinlogPosition::new(name, pos)))
        }
        (None, None) => Ok(None),
        _ => bail!("{file_option} and {pos_option} must be set together"),
    }
}

fn datetime(
    value: Option<&str>,
    option: &str,
    time_zone: BinlogTimeZone,
) -> anyhow::Result<Option<u32>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let secs = time_zone.parse_datetime(value).with_context(|| {
        format!("{option}: invalid datetime '{value}', expected format \"2004-12-25 11:25:56\"")
    })?;
    let secs = u32::try_from(secs).with_context(|| format!("{option}: {value} is out of range"))?;
    Ok(Some(secs))
}

fn connection_opts(cli: &Cli) -> Option<mysql_async::Opts> {
    let opts = &cli.connection;
    let user = opts.user.as_ref()?;
    let mut builder = mysql_async::OptsBuilder::default()
        .ip_or_hostname(opts.host.clone())
        .tcp_port(opts.port)
        .user(Some(user.clone()))
        .pass(opts.password.clone());
    if let Some(socket) = &opts.socket {
        builder = builder.socket(Some(socket.to_string_lossy().into_owned()));
    }
    Some(builder.into())
}

impl Config {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let time_zone: BinlogTimeZone = cli.time_zone.parse()?;

        let start = position(
            cli.start_file.as_deref(),
            cli.start_pos,
            "--start-file",
            "--start-pos",
        )?;
        let stop = position(
            cli.stop_file.as_deref(),
            cli.stop_pos,
            "--stop-file",
            "--stop-pos",
        )?;
        if let (Some(start), Some(stop)) = (&start, &stop) {
            if start >= stop {
                bail!("start position ({start}) must be before stop position ({stop})");
            }
        }

        let start_time = datetime(cli.start_datetime.as_deref(), "--start-datetime", time_zone)?;
        let stop_time = datetime(cli.stop_datetime.as_deref(), "--stop-datetime", time_zone)?;
        if let (Some(start), Some(stop)) = (start_time, stop_time) {
            if start >= stop {
                bail!("--start-datetime must be earlier than --stop-datetime");
            }
        }

        if cli.mode == SourceMode::Repl && cli.work_type != WorkType::Tbldef && start.is_none() {
            bail!("--start-file and --start-pos must be set when --mode repl");
        }
        if cli.to_last_log && (cli.mode != SourceMode::Repl || cli.work_type != WorkType::Stats) {
            bail!("--to-last-log only works with --mode repl and --work-type stats");
        }
        if cli.only_schema_file && cli.schema_file.is_none() {
            bail!("--only-schema-file requires --schema-file");
        }

        let connection = connection_opts(cli);
        let needs_database = cli.mode == SourceMode::Repl
            || cli.work_type == WorkType::Tbldef
            || (cli.work_type.writes_sql() && !cli.only_schema_file);
        if needs_database && connection.is_none() {
            bail!("--user (and usually --password) must be set to connect to the source database");
        }

        let binlog_file = match (cli.mode, cli.work_type, &cli.binlog_file) {
            (SourceMode::File, WorkType::Tbldef, _) | (SourceMode::Repl, _, _) => None,
            (SourceMode::File, _, None) => {
                bail!("missing binlog file: it must be given as the last argument with --mode file")
            }
            (SourceMode::File, _, Some(path)) => {
                if !path.is_file() {
                    bail!("{} does not exist or is not a file", path.display());
                }
                Some(path.clone())
            }
        };

        let output_dir = match &cli.output_dir {
            Some(dir) => {
                if !dir.is_dir() {
                    bail!("output directory {} does not exist or is not a directory", dir.display());
                }
                dir.clone()
            }
            None => std::env::current_dir().context("Failed to determine current directory")?,
        };

        if let Some(path) = &cli.schema_file {
            if !path.is_file() {
                bail!("schema file {} does not exist or is not a file", path.display());
            }
        }
        let dump_schema_file = match (&cli.dump_schema_file, cli.work_type) {
            (Some(path), _) => Some(path.clone()),
            (None, WorkType::Tbldef) => Some(PathBuf::from(DEFAULT_SCHEMA_DUMP_FILE)),
            (None, _) => None,
        }
        .map(|path| {
            if path.is_absolute() {
                path
            } else {
                output_dir.join(path)
            }
        });
        if let Some(path) = &dump_schema_file {
            if let Some(parent) = path.parent() {
                if !parent.is_dir() {
                    bail!("directory of {} does not exist", path.display());
                }
            }
        }

        let ignore_parse_error = if cli.ignore_parse_error.is_empty() {
            None
        } else {
            Some(Regex::new(&cli.ignore_parse_error).with_context(|| {
                format!(
                    "--ignore-parse-error: {} is not a valid regular expression",
                    cli.ignore_parse_error
                )
            })?)
        };

        Ok(Self {
            mode: cli.mode,
            work_type: cli.work_type,
            flavor: cli.server_flavor.into(),
            connection,
            server_id: cli.server_id,
            filter: TableFilter::parse(cli.databases.as_deref(), cli.tables.as_deref())?,
            sql_types: SqlTypeFilter::parse(cli.sql_types.as_deref())?,
            window: StreamWindow {
                start,
                stop,
                start_time,
                stop_time,
            },
            time_zone,
            to_last_log: cli.to_last_log,
            stats: StatsSettings {
                print_interval: check_range("--print-interval", cli.print_interval, 1, 600)?,
                big_trx_rows: check_range("--big-trx-rows", cli.big_trx_rows, 10, 30000)?,
                long_trx_secs: check_range("--long-trx-secs", cli.long_trx_secs, 1, 3600)?,
            },
            rebuild: RebuildOptions {
                full_columns: cli.full_columns,
                prefer_unique_key: cli.prefer_unique_key,
                ignore_primary_key_for_insert: cli.ignore_primary_key_for_insert,
                insert_batch_rows: check_range("--insert-rows", cli.insert_rows, 1, 500)?,
                schema_prefix: cli.schema_prefix,
            },
            output: OutputSettings {
                keep_trx: cli.keep_trx,
                file_per_table: cli.file_per_table,
                print_extra_info: cli.print_extra_info,
            },
            statement_sql: cli.statement_sql,
            write_original_sql: cli.write_original_sql,
            threads: check_range("--threads", cli.threads, 1, 16)?,
            output_dir,
            schema_file: cli.schema_file.clone(),
            only_schema_file: cli.only_schema_file,
            dump_schema_file,
            ignore_parse_error,
            binlog_file,
        })
    }

    /// Whether a parse failure of `sql` may be skipped.
    pub fn ignores_parse_error(&self, sql: &str) -> bool {
        self.ignore_parse_error
            .as_ref()
            .is_some_and(|re| re.is_match(&sql.to_lowercase()))
    }
}
