//! Position and time window of the events to process.

use binlog_events::{binlog_index, BinlogPosition, EventHeader};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamWindow {
    /// Events starting before this position are skipped
    pub start: Option<BinlogPosition>,
    /// Reading stops after the event ending at this position, or before the
    /// first event starting at or after it
    pub stop: Option<BinlogPosition>,
    /// Events older than this epoch second are skipped
    pub start_time: Option<u32>,
    /// Reading stops at the first event at or after this epoch second
    pub stop_time: Option<u32>,
}

impl StreamWindow {
    pub fn is_before_start(&self, header: &EventHeader) -> bool {
        if let Some(start) = &self.start {
            if position_of(header) < *start {
                return true;
            }
        }
        matches!(self.start_time, Some(t) if header.timestamp < t)
    }

    pub fn is_past_stop(&self, header: &EventHeader) -> bool {
        if let Some(stop) = &self.stop {
            if position_of(header) >= *stop {
                return true;
            }
        }
        matches!(self.stop_time, Some(t) if header.timestamp >= t)
    }

    /// True when the event ends at or after the stop position, so nothing
    /// after it belongs to the window.
    pub fn reaches_stop(&self, header: &EventHeader) -> bool {
        self.stop.as_ref().is_some_and(|stop| {
            BinlogPosition::new(header.binlog.as_str(), header.stop_pos) >= *stop
        })
    }

    /// True once every event of `binlog` lies past the stop position.
    pub fn is_binlog_past_stop(&self, binlog: &str) -> bool {
        match (&self.stop, binlog_index(binlog)) {
            (Some(stop), Some(index)) => index > stop.index(),
            _ => false,
        }
    }
}

fn position_of(header: &EventHeader) -> BinlogPosition {
    BinlogPosition::new(header.binlog.as_str(), header.start_pos)
}
