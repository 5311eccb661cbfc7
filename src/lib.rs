//! binlog-rewind
//!
//! Reads MySQL/MariaDB binlogs, from local files or as a replica, and
//! produces transaction statistics together with forward or rollback SQL.
//!
//! # Features
//!
//! - Statistics: per-table row counts, a DDL log and big/long transactions
//! - Forward SQL: replayable statements rebuilt from row images
//! - Rollback SQL: statements undoing each change, newest first
//! - Schema tracking: table definitions follow the DDL in the stream
//!
//! # Workspace crates
//!
//! - `binlog_events` - typed binlog events and their sources
//! - `sql_classify` - statement classification of query events
//! - `table_schema` - table definitions, DDL replay and introspection
//! - `sql_rebuild` - row image decoding and statement reconstruction

pub mod cli;
pub mod config;
pub mod filter;
pub mod pipeline;
pub mod report;
pub mod schema_load;
pub mod source;
pub mod stats;

use cli::WorkType;
use config::Config;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Load table definitions, then process the binlog stream as configured.
pub async fn execute(
    mut config: Config,
    shutdown: Option<broadcast::Receiver<()>>,
) -> anyhow::Result<()> {
    let registry = schema_load::load_registry(&config).await?;
    if config.work_type == WorkType::Tbldef {
        info!(tables = registry.len(), "table definitions dumped");
        return Ok(());
    }

    let mut source = source::open(&mut config).await?;
    pipeline::run(
        Arc::new(config),
        Arc::new(registry),
        source.as_mut(),
        shutdown,
    )
    .await?;
    Ok(())
}
