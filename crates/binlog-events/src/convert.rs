//! Conversion of `mysql_common` binlog events into [`BinlogEvent`]s.
//!
//! TABLE_MAP events are cached by table id; every rows event is resolved
//! through the cache to learn its schema/table name and column metadata.

use crate::event::{BinlogEvent, ColumnValue, EventHeader, EventPayload, RowsEvent, RowsEventKind};
use crate::{ServerFlavor, SourceError};
use mysql_common::binlog::events::{Event, EventData, RowsEventData, TableMapEvent};
use mysql_common::binlog::row::BinlogRow;
use mysql_common::binlog::value::BinlogValue;
use mysql_common::value::Value;
use std::collections::HashMap;
use std::io;
use tracing::{debug, warn};

const MARIADB_GTID_EVENT: u8 = 162;

pub(crate) struct EventConverter {
    binlog: String,
    flavor: ServerFlavor,
    table_maps: HashMap<u64, TableMapEvent<'static>>,
}

impl EventConverter {
    pub(crate) fn new(binlog: impl Into<String>, flavor: ServerFlavor) -> Self {
        Self {
            binlog: binlog.into(),
            flavor,
            table_maps: HashMap::new(),
        }
    }

    pub(crate) fn binlog(&self) -> &str {
        &self.binlog
    }

    pub(crate) fn set_binlog(&mut self, binlog: impl Into<String>) {
        self.binlog = binlog.into();
    }

    fn io_error(&self, source: io::Error) -> SourceError {
        SourceError::Io {
            binlog: self.binlog.clone(),
            source,
        }
    }

    /// Convert one raw event. Events with no meaning for the pipeline
    /// (format description, previous GTIDs, heartbeats, ...) yield `None`.
    pub(crate) fn convert(&mut self, event: &Event) -> Result<Option<BinlogEvent>, SourceError> {
        let raw_header = event.header();
        let stop_pos = u64::from(raw_header.log_pos());
        let header = EventHeader {
            binlog: self.binlog.clone(),
            start_pos: stop_pos.saturating_sub(u64::from(raw_header.event_size())),
            stop_pos,
            timestamp: raw_header.timestamp(),
        };

        if self.flavor == ServerFlavor::MariaDb && raw_header.event_type_raw() == MARIADB_GTID_EVENT
        {
            let gtid = mariadb_gtid(event.data(), raw_header.server_id())
                .ok_or_else(|| self.io_error(io::ErrorKind::UnexpectedEof.into()))?;
            return Ok(Some(BinlogEvent {
                header,
                payload: EventPayload::Gtid {
                    gtid,
                    starts_transaction: true,
                },
            }));
        }

        let data = match event.read_data() {
            Ok(Some(data)) => data,
            Ok(None) => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let payload = match data {
            EventData::TableMapEvent(tme) => {
                self.table_maps.insert(tme.table_id(), tme.into_owned());
                return Ok(None);
            }
            EventData::RowsEvent(rows) => EventPayload::Rows(self.rows_event(&rows)?),
            EventData::QueryEvent(query) => EventPayload::Query {
                database: query.schema().into_owned(),
                sql: query.query().into_owned(),
            },
            EventData::XidEvent(_) => EventPayload::Xid,
            EventData::GtidEvent(gtid) => EventPayload::Gtid {
                gtid: format!("{}:{}", format_sid(&gtid.sid()), gtid.gno()),
                starts_transaction: false,
            },
            EventData::RotateEvent(rotate) => {
                let next_binlog = rotate.name().into_owned();
                let position = rotate.position();
                debug!(from = %self.binlog, to = %next_binlog, "binlog rotated");
                let event = BinlogEvent {
                    header,
                    payload: EventPayload::Rotate {
                        next_binlog: next_binlog.clone(),
                        position,
                    },
                };
                self.binlog = next_binlog;
                return Ok(Some(event));
            }
            EventData::RowsQueryEvent(rows_query) => {
                EventPayload::RowsQuery(rows_query.query().into_owned())
            }
            _ => return Ok(None),
        };

        Ok(Some(BinlogEvent { header, payload }))
    }

    fn rows_event(&self, rows: &RowsEventData<'_>) -> Result<RowsEvent, SourceError> {
        let table_id = rows.table_id();
        let tme = self
            .table_maps
            .get(&table_id)
            .ok_or(SourceError::MissingTableMap { table_id })?;

        let kind = match rows {
            RowsEventData::WriteRowsEventV1(_) | RowsEventData::WriteRowsEvent(_) => {
                RowsEventKind::Insert
            }
            RowsEventData::UpdateRowsEventV1(_)
            | RowsEventData::UpdateRowsEvent(_)
            | RowsEventData::PartialUpdateRowsEvent(_) => RowsEventKind::Update,
            RowsEventData::DeleteRowsEventV1(_) | RowsEventData::DeleteRowsEvent(_) => {
                RowsEventKind::Delete
            }
        };

        let mut images = Vec::new();
        for row in rows.rows(tme) {
            let (before, after) = row.map_err(|e| self.io_error(e))?;
            match kind {
                RowsEventKind::Insert => images.extend(after.as_ref().map(row_values)),
                RowsEventKind::Delete => images.extend(before.as_ref().map(row_values)),
                RowsEventKind::Update => {
                    let (Some(before), Some(after)) = (before, after) else {
                        return Err(self.io_error(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "update row without before and after image",
                        )));
                    };
                    images.push(row_values(&before));
                    images.push(row_values(&after));
                }
            }
        }

        Ok(RowsEvent {
            kind,
            database: tme.database_name().into_owned(),
            table: tme.table_name().into_owned(),
            rows: images,
        })
    }
}

fn row_values(row: &BinlogRow) -> Vec<ColumnValue> {
    (0..row.len())
        .map(|i| row.as_ref(i).map(column_value).unwrap_or(ColumnValue::Null))
        .collect()
}

fn column_value(value: &BinlogValue<'_>) -> ColumnValue {
    match value {
        BinlogValue::Value(value) => match value {
            Value::NULL => ColumnValue::Null,
            Value::Int(v) => ColumnValue::Int(*v),
            Value::UInt(v) => ColumnValue::UInt(*v),
            Value::Float(v) => ColumnValue::Float(*v),
            Value::Double(v) => ColumnValue::Double(*v),
            Value::Bytes(v) => ColumnValue::Bytes(v.clone()),
            Value::Date(year, month, day, hour, minute, second, micros) => ColumnValue::Date {
                year: *year,
                month: *month,
                day: *day,
                hour: *hour,
                minute: *minute,
                second: *second,
                micros: *micros,
            },
            Value::Time(negative, days, hours, minutes, seconds, micros) => ColumnValue::Time {
                negative: *negative,
                days: *days,
                hours: *hours,
                minutes: *minutes,
                seconds: *seconds,
                micros: *micros,
            },
        },
        BinlogValue::Jsonb(jsonb) => match serde_json::Value::try_from(jsonb.clone()) {
            Ok(json) => ColumnValue::Json(json),
            Err(e) => {
                warn!("undecodable JSON column value: {e}");
                ColumnValue::Null
            }
        },
        BinlogValue::JsonDiff(_) => {
            warn!("partial JSON update images are not supported, value treated as NULL");
            ColumnValue::Null
        }
    }
}

fn format_sid(sid: &[u8; 16]) -> String {
    let hex: String = sid.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// MariaDB GTID event body: sequence number (u64 LE), domain id (u32 LE), flags.
fn mariadb_gtid(data: &[u8], server_id: u32) -> Option<String> {
    let sequence = u64::from_le_bytes(data.get(0..8)?.try_into().ok()?);
    let domain = u32::from_le_bytes(data.get(8..12)?.try_into().ok()?);
    Some(format!("{domain}-{server_id}-{sequence}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sid() {
        let sid = [
            0x3e, 0x11, 0xfa, 0x47, 0x71, 0xca, 0x11, 0xe1, 0x9e, 0x33, 0xc8, 0x0a, 0xa9, 0x42,
            0x95, 0x62,
        ];
        assert_eq!(format_sid(&sid), "3e11fa47-71ca-11e1-9e33-c80aa9429562");
    }

    #[test]
    fn test_mariadb_gtid() {
        let mut data = 42u64.to_le_bytes().to_vec();
        data.extend(0u32.to_le_bytes());
        data.push(0);
        assert_eq!(mariadb_gtid(&data, 7).as_deref(), Some("0-7-42"));
        assert_eq!(mariadb_gtid(&data[..5], 7), None);
    }

    #[test]
    fn test_column_value_mapping() {
        assert_eq!(
            column_value(&BinlogValue::Value(Value::Int(-3))),
            ColumnValue::Int(-3)
        );
        assert_eq!(
            column_value(&BinlogValue::Value(Value::Bytes(b"12.50".to_vec()))),
            ColumnValue::Bytes(b"12.50".to_vec())
        );
        assert_eq!(
            column_value(&BinlogValue::Value(Value::Date(2024, 2, 29, 13, 5, 9, 0))),
            ColumnValue::Date {
                year: 2024,
                month: 2,
                day: 29,
                hour: 13,
                minute: 5,
                second: 9,
                micros: 0
            }
        );
    }
}
