//! Command-line options.
//!
//! # Usage Examples
//!
//! ```bash
//! # Transaction statistics of a local binlog and every binlog after it
//! binlog-rewind --work-type stats --output-dir /tmp/out /var/lib/mysql/mysql-bin.000042
//!
//! # Rollback SQL for one table between two positions
//! binlog-rewind --work-type rollback --user root --password secret \
//!   --databases '^shop$' --tables '^orders$' \
//!   --start-file mysql-bin.000042 --start-pos 4 \
//!   --stop-file mysql-bin.000043 --stop-pos 1200 \
//!   /var/lib/mysql/mysql-bin.000042
//!
//! # Forward SQL streamed from a live server, acting as a replica
//! binlog-rewind --mode repl --work-type 2sql --host db1 --user repl --password secret \
//!   --start-file mysql-bin.000042 --start-pos 4
//! ```

use binlog_events::ServerFlavor;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub const DEFAULT_SERVER_ID: u32 = 1113306;
pub const DEFAULT_IGNORE_PARSE_ERROR: &str = "^create definer.+trigger";
pub const DEFAULT_SCHEMA_DUMP_FILE: &str = "table_definitions.json";

#[derive(Parser, Debug, Clone)]
#[command(name = "binlog-rewind")]
#[command(about = "Transaction statistics, forward SQL and rollback SQL from MySQL/MariaDB binlogs")]
#[command(long_about = None)]
pub struct Cli {
    /// Where binlog events come from
    #[arg(long, value_enum, default_value_t = SourceMode::File)]
    pub mode: SourceMode,

    /// What to produce
    #[arg(long, value_enum, default_value_t = WorkType::Stats)]
    pub work_type: WorkType,

    /// Server implementation that wrote the binlogs
    #[arg(long, value_enum, default_value_t = Flavor::Mysql)]
    pub server_flavor: Flavor,

    /// Source database connection options
    #[command(flatten)]
    pub connection: ConnectionOpts,

    /// Server id announced when replicating; must differ from every other replica
    #[arg(long, default_value_t = DEFAULT_SERVER_ID)]
    pub server_id: u32,

    /// Comma separated regular expressions; only databases matching one of them are processed.
    /// Names are lower-cased before matching
    #[arg(long)]
    pub databases: Option<String>,

    /// Comma separated regular expressions; only tables matching one of them are processed.
    /// Names are lower-cased before matching
    #[arg(long)]
    pub tables: Option<String>,

    /// Comma separated statement types to process: insert, update, delete (default: all)
    #[arg(long)]
    pub sql_types: Option<String>,

    /// Binlog file to start reading at (with --start-pos)
    #[arg(long)]
    pub start_file: Option<String>,

    /// Position to start reading at (with --start-file)
    #[arg(long)]
    pub start_pos: Option<u64>,

    /// Binlog file to stop reading at (with --stop-pos)
    #[arg(long)]
    pub stop_file: Option<String>,

    /// Position to stop reading at (with --stop-file)
    #[arg(long)]
    pub stop_pos: Option<u64>,

    /// Time zone of binlog timestamps: 'Local' or an IANA name such as 'Asia/Shanghai'
    #[arg(long, default_value = "Local")]
    pub time_zone: String,

    /// Skip events before this time, format "2004-12-25 11:25:56"
    #[arg(long)]
    pub start_datetime: Option<String>,

    /// Stop at the first event at or after this time, format "2004-12-25 11:25:56"
    #[arg(long)]
    pub stop_datetime: Option<String>,

    /// With --mode repl --work-type stats, keep reading new events instead of
    /// stopping at the server's current position
    #[arg(long)]
    pub to_last_log: bool,

    /// Seconds between two statistics flushes (1-600)
    #[arg(long, default_value_t = 30)]
    pub print_interval: u32,

    /// Transactions changing at least this many rows are big (10-30000)
    #[arg(long, default_value_t = 500)]
    pub big_trx_rows: u64,

    /// Transactions lasting at least this many seconds are long (1-3600)
    #[arg(long, default_value_t = 300)]
    pub long_trx_secs: u32,

    /// UPDATE sets every column and UPDATE/DELETE match on every column
    #[arg(long)]
    pub full_columns: bool,

    /// Identify rows by a unique key before the primary key
    #[arg(long)]
    pub prefer_unique_key: bool,

    /// Leave primary key columns out of forward INSERT statements
    #[arg(long)]
    pub ignore_primary_key_for_insert: bool,

    /// Rows per INSERT statement (1-500)
    #[arg(long, default_value_t = 30)]
    pub insert_rows: usize,

    /// Wrap the statements of each transaction in begin/commit, or begin/rollback for rollback SQL
    #[arg(long)]
    pub keep_trx: bool,

    /// Qualify table names with their database
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub schema_prefix: bool,

    /// One SQL file per table instead of one per binlog
    #[arg(long)]
    pub file_per_table: bool,

    /// Write a comment with time, table, binlog position and GTID before each statement group
    #[arg(long)]
    pub print_extra_info: bool,

    /// Also pass through DML logged as statements (binlog_format other than ROW)
    #[arg(long)]
    pub statement_sql: bool,

    /// Write the original statements of rows events (binlog_rows_query_log_events=ON)
    #[arg(long)]
    pub write_original_sql: bool,

    /// Number of SQL reconstruction workers (1-16)
    #[arg(long, default_value_t = 2)]
    pub threads: usize,

    /// Directory result files are written to (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Read table definitions from this file and merge them with the live database
    #[arg(long, value_name = "PATH")]
    pub schema_file: Option<PathBuf>,

    /// Only use table definitions from --schema-file, never query the database
    #[arg(long)]
    pub only_schema_file: bool,

    /// Dump the table definitions in use to this file
    #[arg(long, value_name = "PATH")]
    pub dump_schema_file: Option<PathBuf>,

    /// Statements that fail to parse and match this regular expression (against the
    /// lower-cased SQL) are logged and skipped; any other parse failure is fatal
    #[arg(long, default_value = DEFAULT_IGNORE_PARSE_ERROR)]
    pub ignore_parse_error: String,

    /// Binlog file to read (file mode); following files of the sequence are read too
    #[arg(value_name = "BINLOG")]
    pub binlog_file: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct ConnectionOpts {
    /// MySQL host
    #[arg(long, default_value = "127.0.0.1", env = "MYSQL_HOST")]
    pub host: String,

    /// MySQL port
    #[arg(long, default_value_t = 3306, env = "MYSQL_PORT")]
    pub port: u16,

    /// MySQL user
    #[arg(long, env = "MYSQL_USER")]
    pub user: Option<String>,

    /// MySQL password
    #[arg(long, env = "MYSQL_PASSWORD")]
    pub password: Option<String>,

    /// MySQL socket file, used instead of host and port
    #[arg(long)]
    pub socket: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceMode {
    /// Read local binlog files
    File,
    /// Stream binlogs from a server as a replica
    Repl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkType {
    /// Dump table definitions and exit
    Tbldef,
    /// Transaction and DDL statistics
    Stats,
    /// Statistics plus forward SQL
    #[value(name = "2sql")]
    ToSql,
    /// Statistics plus rollback SQL
    Rollback,
}

impl WorkType {
    /// Whether SQL is reconstructed from row images.
    pub fn writes_sql(self) -> bool {
        matches!(self, WorkType::ToSql | WorkType::Rollback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Flavor {
    Mysql,
    Mariadb,
}

impl From<Flavor> for ServerFlavor {
    fn from(flavor: Flavor) -> Self {
        match flavor {
            Flavor::Mysql => ServerFlavor::MySql,
            Flavor::Mariadb => ServerFlavor::MariaDb,
        }
    }
}
