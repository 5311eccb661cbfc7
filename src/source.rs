//! Opening the configured binlog source.

use crate::cli::SourceMode;
use crate::config::Config;
use anyhow::Context;
use binlog_events::{BinlogPosition, BinlogSource, FileSource, ReplicationSource};
use mysql_async::prelude::Queryable;
use tracing::info;

/// Current end of the server's binlog, `None` when binary logging is off.
async fn server_binlog_end(opts: mysql_async::Opts) -> anyhow::Result<Option<BinlogPosition>> {
    let mut conn = mysql_async::Conn::new(opts)
        .await
        .context("Failed to connect to MySQL")?;
    // MySQL 8.4 removed the old spelling
    let row = match conn
        .query_first::<mysql_async::Row, _>("SHOW MASTER STATUS")
        .await
    {
        Ok(row) => row,
        Err(_) => conn
            .query_first::<mysql_async::Row, _>("SHOW BINARY LOG STATUS")
            .await
            .context("Failed to query binlog status")?,
    };
    conn.disconnect()
        .await
        .context("Failed to close MySQL connection")?;

    let Some(row) = row else {
        return Ok(None);
    };
    let file = row
        .get_opt::<String, _>(0)
        .and_then(Result::ok)
        .context("Binlog status has no file name")?;
    let pos = row
        .get_opt::<u64, _>(1)
        .and_then(Result::ok)
        .context("Binlog status has no position")?;
    Ok(Some(BinlogPosition::new(file, pos)))
}

/// Open the source for `config`.
///
/// In replication mode without any stop condition the stream would never
/// end, so reading stops at the server's current binlog end unless
/// `--to-last-log` asks to follow new events.
pub async fn open(config: &mut Config) -> anyhow::Result<Box<dyn BinlogSource>> {
    match config.mode {
        SourceMode::File => {
            let path = config
                .binlog_file
                .as_deref()
                .context("A binlog file is required with --mode file")?;
            let source = FileSource::open(path, config.flavor)
                .with_context(|| format!("Failed to open binlog {}", path.display()))?;
            Ok(Box::new(source))
        }
        SourceMode::Repl => {
            let opts = config
                .connection
                .clone()
                .context("Database credentials are required with --mode repl")?;
            let start = config
                .window
                .start
                .clone()
                .context("--start-file and --start-pos are required with --mode repl")?;

            let window = &config.window;
            if window.stop.is_none() && window.stop_time.is_none() && !config.to_last_log {
                if let Some(end) = server_binlog_end(opts.clone()).await? {
                    info!(stop = %end, "stopping at the current end of the server binlog");
                    config.window.stop = Some(end);
                }
            }

            let source = ReplicationSource::connect(
                opts,
                config.server_id,
                &start.binlog,
                start.pos,
                config.flavor,
            )
            .await
            .context("Failed to start binlog replication")?;
            Ok(Box::new(source))
        }
    }
}
