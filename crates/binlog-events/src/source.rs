//! Binlog event sources.

use crate::convert::EventConverter;
use crate::event::BinlogEvent;
use crate::position::next_binlog_name;
use crate::{ServerFlavor, SourceError};
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{BinlogStream, BinlogStreamRequest};
use mysql_common::binlog::consts::BinlogVersion;
use mysql_common::binlog::BinlogFile;
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tokio_stream::StreamExt as _;
use tracing::info;

/// An ordered stream of binlog events.
#[async_trait]
pub trait BinlogSource: Send {
    /// The next event, or `None` once the source is exhausted.
    async fn next(&mut self) -> Option<Result<BinlogEvent, SourceError>>;
}

// ============================================================================
// In-memory source
// ============================================================================

/// Replays a fixed list of events.
#[derive(Debug, Default)]
pub struct MemorySource {
    events: VecDeque<BinlogEvent>,
    hold_open: bool,
}

impl MemorySource {
    pub fn new(events: impl IntoIterator<Item = BinlogEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            hold_open: false,
        }
    }

    /// Wait forever after the last event instead of ending, like a
    /// replication connection to a server with no newer events.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

#[async_trait]
impl BinlogSource for MemorySource {
    async fn next(&mut self) -> Option<Result<BinlogEvent, SourceError>> {
        match self.events.pop_front() {
            Some(event) => Some(Ok(event)),
            None if self.hold_open => std::future::pending().await,
            None => None,
        }
    }
}

// ============================================================================
// Local binlog files
// ============================================================================

/// Reads a local binlog file, then each following file of the sequence
/// found in the same directory.
pub struct FileSource {
    dir: PathBuf,
    events: BinlogFile<BufReader<File>>,
    converter: EventConverter,
}

fn open_binlog(path: &Path) -> Result<BinlogFile<BufReader<File>>, SourceError> {
    let io_error = |source| SourceError::Io {
        binlog: path.display().to_string(),
        source,
    };
    let file = File::open(path).map_err(io_error)?;
    BinlogFile::new(BinlogVersion::Version4, BufReader::new(file)).map_err(io_error)
}

impl FileSource {
    pub fn open(path: &Path, flavor: ServerFlavor) -> Result<Self, SourceError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SourceError::NotFound(path.to_path_buf()))?;
        if !path.is_file() {
            return Err(SourceError::NotFound(path.to_path_buf()));
        }
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        info!(binlog = %path.display(), "reading binlog file");
        Ok(Self {
            events: open_binlog(path)?,
            converter: EventConverter::new(name, flavor),
            dir,
        })
    }

    /// Open the next file of the sequence, if it exists.
    fn advance(&mut self) -> Result<bool, SourceError> {
        let Some(next) = next_binlog_name(self.converter.binlog()) else {
            return Ok(false);
        };
        let path = self.dir.join(&next);
        if !path.is_file() {
            info!(binlog = %next, "no further binlog file, stopping");
            return Ok(false);
        }
        info!(binlog = %path.display(), "reading binlog file");
        self.events = open_binlog(&path)?;
        self.converter.set_binlog(next);
        Ok(true)
    }
}

#[async_trait]
impl BinlogSource for FileSource {
    async fn next(&mut self) -> Option<Result<BinlogEvent, SourceError>> {
        loop {
            match self.events.next() {
                Some(Ok(event)) => match self.converter.convert(&event) {
                    Ok(Some(event)) => return Some(Ok(event)),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(e)),
                },
                Some(Err(source)) => {
                    return Some(Err(SourceError::Io {
                        binlog: self.converter.binlog().to_string(),
                        source,
                    }))
                }
                None => match self.advance() {
                    Ok(true) => continue,
                    Ok(false) => return None,
                    Err(e) => return Some(Err(e)),
                },
            }
        }
    }
}

// ============================================================================
// Replication stream
// ============================================================================

/// Connects as a replica and streams events from a start position.
pub struct ReplicationSource {
    stream: BinlogStream,
    converter: EventConverter,
}

impl ReplicationSource {
    pub async fn connect(
        opts: mysql_async::Opts,
        server_id: u32,
        binlog: &str,
        pos: u64,
        flavor: ServerFlavor,
    ) -> Result<Self, SourceError> {
        let mut conn = mysql_async::Conn::new(opts).await?;
        if flavor == ServerFlavor::MariaDb {
            conn.query_drop("SET @mariadb_slave_capability = 4").await?;
        }
        info!(binlog, pos, server_id, "starting binlog replication");
        let request = BinlogStreamRequest::new(server_id)
            .with_filename(binlog.as_bytes())
            .with_pos(pos);
        let stream = conn.get_binlog_stream(request).await?;
        Ok(Self {
            stream,
            converter: EventConverter::new(binlog, flavor),
        })
    }
}

#[async_trait]
impl BinlogSource for ReplicationSource {
    async fn next(&mut self) -> Option<Result<BinlogEvent, SourceError>> {
        loop {
            match self.stream.next().await? {
                Ok(event) => match self.converter.convert(&event) {
                    Ok(Some(event)) => return Some(Ok(event)),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
