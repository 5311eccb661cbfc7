//! Row image decoding.
//!
//! Raw row images are aligned to the table definition in force at the
//! event's binlog position and normalized into [`SqlValue`]s. When the
//! definition is missing or narrower than the wire row, placeholder columns
//! named `dropped_column_<n>` are synthesized and the event is flagged as
//! degraded.

use crate::time::BinlogTimeZone;
use binlog_events::{ColumnValue, RowsEvent, RowsEventKind};
use std::sync::Arc;
use table_schema::{ColumnDefinition, FieldType, TableDefinition};
use tracing::warn;

/// A column value ready to be rendered as a SQL literal.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    /// Exact numeric text, rendered unquoted
    Decimal(String),
    /// Character data, temporal values and JSON documents
    String(String),
    /// Binary data, rendered as a hex literal
    Bytes(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::String(s.to_string())
    }
}

pub type Row = Vec<SqlValue>;

/// Row images of one rows event.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRows {
    Insert(Vec<Row>),
    Delete(Vec<Row>),
    /// `(before, after)` pairs
    Update(Vec<(Row, Row)>),
}

impl DecodedRows {
    pub fn kind(&self) -> RowsEventKind {
        match self {
            DecodedRows::Insert(_) => RowsEventKind::Insert,
            DecodedRows::Delete(_) => RowsEventKind::Delete,
            DecodedRows::Update(_) => RowsEventKind::Update,
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            DecodedRows::Insert(rows) | DecodedRows::Delete(rows) => rows.len(),
            DecodedRows::Update(pairs) => pairs.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    /// Definition the rows are aligned to, including any placeholder columns
    pub table: Arc<TableDefinition>,
    pub rows: DecodedRows,
    /// Set when placeholder columns had to be synthesized; SQL built from
    /// such rows may not identify the original rows.
    pub degraded: bool,
}

/// Decode a rows event against `definition`, the registry entry for its
/// table at the event's position (`None` when the table is unknown).
pub fn decode_rows(
    event: &RowsEvent,
    definition: Option<Arc<TableDefinition>>,
    time_zone: BinlogTimeZone,
) -> DecodedEvent {
    let width = event.rows.iter().map(Vec::len).max().unwrap_or(0);
    let (table, degraded) = align_definition(event, definition, width);

    let decode = |raw: &[ColumnValue]| -> Row {
        table
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| match raw.get(i) {
                Some(value) => normalize(value, column, time_zone),
                None => SqlValue::Null,
            })
            .collect()
    };

    let rows = match event.kind {
        RowsEventKind::Insert => DecodedRows::Insert(event.rows.iter().map(|r| decode(r)).collect()),
        RowsEventKind::Delete => DecodedRows::Delete(event.rows.iter().map(|r| decode(r)).collect()),
        RowsEventKind::Update => DecodedRows::Update(
            event
                .rows
                .chunks_exact(2)
                .map(|pair| (decode(&pair[0]), decode(&pair[1])))
                .collect(),
        ),
    };

    DecodedEvent {
        table,
        rows,
        degraded,
    }
}

/// Make the definition exactly `width` columns wide.
fn align_definition(
    event: &RowsEvent,
    definition: Option<Arc<TableDefinition>>,
    width: usize,
) -> (Arc<TableDefinition>, bool) {
    let Some(definition) = definition else {
        warn!(
            table = %format!("{}.{}", event.database, event.table),
            columns = width,
            "table definition not found, using placeholder columns; rollback SQL may be unreliable"
        );
        let mut table = TableDefinition::new(event.database.as_str(), event.table.as_str());
        for i in 0..width {
            table.push_column(ColumnDefinition::placeholder(i));
        }
        return (Arc::new(table), true);
    };

    let known = definition.columns.len();
    if width == known || event.rows.is_empty() {
        return (definition, false);
    }

    warn!(
        table = %definition.identity(),
        known_columns = known,
        row_columns = width,
        "row image width differs from the table definition; rollback SQL may be unreliable"
    );
    let mut table = Arc::unwrap_or_clone(definition);
    if width > known {
        for i in known..width {
            table.push_column(ColumnDefinition::placeholder(i));
        }
    } else {
        table.columns.truncate(width);
        let in_range = |key: &table_schema::KeyDefinition| {
            key.columns.iter().all(|c| c.index < width)
        };
        if table.primary_key.as_ref().is_some_and(|pk| !in_range(pk)) {
            table.primary_key = None;
        }
        table.unique_keys.retain(|_, key| in_range(key));
    }
    (Arc::new(table), true)
}

/// Interpret a raw value through its column definition.
fn normalize(value: &ColumnValue, column: &ColumnDefinition, time_zone: BinlogTimeZone) -> SqlValue {
    match value {
        ColumnValue::Null => SqlValue::Null,
        ColumnValue::Int(v) => integer(*v as i128, column, time_zone),
        ColumnValue::UInt(v) => integer(*v as i128, column, time_zone),
        ColumnValue::Float(v) => SqlValue::Float(*v),
        ColumnValue::Double(v) => SqlValue::Double(*v),
        ColumnValue::Bytes(bytes) => bytes_value(bytes, column, time_zone),
        ColumnValue::Date {
            year,
            month,
            day,
            hour,
            minute,
            second,
            micros,
        } => {
            let mut text = format!("{year:04}-{month:02}-{day:02}");
            if column.field_type != FieldType::Date {
                text.push_str(&format!(" {hour:02}:{minute:02}:{second:02}"));
                if *micros > 0 {
                    text.push_str(&format!(".{micros:06}"));
                }
            }
            SqlValue::String(text)
        }
        ColumnValue::Time {
            negative,
            days,
            hours,
            minutes,
            seconds,
            micros,
        } => {
            let sign = if *negative { "-" } else { "" };
            let hours = u64::from(*days) * 24 + u64::from(*hours);
            let mut text = format!("{sign}{hours:02}:{minutes:02}:{seconds:02}");
            if *micros > 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            SqlValue::String(text)
        }
        ColumnValue::Json(json) => SqlValue::String(json.to_string()),
    }
}

fn integer(v: i128, column: &ColumnDefinition, time_zone: BinlogTimeZone) -> SqlValue {
    match column.field_type {
        FieldType::Enum => return enum_element(v, column),
        FieldType::Set => return set_elements(v, column),
        FieldType::Timestamp => {
            return SqlValue::String(time_zone.format_timestamp(v as i64, 0));
        }
        _ => {}
    }

    // Unsigned columns arrive as signed values of the column's storage width.
    let v = match column.field_type.integer_bits() {
        Some(bits) if column.unsigned && v < 0 => v + (1i128 << bits),
        _ => v,
    };
    match i64::try_from(v) {
        Ok(v) => SqlValue::Int(v),
        Err(_) => SqlValue::UInt(v as u64),
    }
}

fn enum_element(index: i128, column: &ColumnDefinition) -> SqlValue {
    // Index 0 is the empty string stored for invalid values.
    if index == 0 {
        return SqlValue::String(String::new());
    }
    usize::try_from(index - 1)
        .ok()
        .and_then(|i| column.elements.get(i))
        .map(|e| SqlValue::String(e.clone()))
        .unwrap_or(SqlValue::Int(index as i64))
}

fn set_elements(mask: i128, column: &ColumnDefinition) -> SqlValue {
    if column.elements.is_empty() {
        return SqlValue::Int(mask as i64);
    }
    let names: Vec<&str> = column
        .elements
        .iter()
        .enumerate()
        .filter(|(i, _)| *i < 64 && mask & (1i128 << i) != 0)
        .map(|(_, e)| e.as_str())
        .collect();
    SqlValue::String(names.join(","))
}

fn bytes_value(bytes: &[u8], column: &ColumnDefinition, time_zone: BinlogTimeZone) -> SqlValue {
    match column.field_type {
        FieldType::NewDecimal => {
            if let Ok(text) = std::str::from_utf8(bytes) {
                return SqlValue::Decimal(text.to_string());
            }
        }
        FieldType::Timestamp => {
            if let Some(text) = timestamp_text(bytes, time_zone) {
                return SqlValue::String(text);
            }
        }
        FieldType::Enum | FieldType::Set if bytes.len() <= 8 && !column.elements.is_empty() => {
            if let Ok(text) = std::str::from_utf8(bytes) {
                if let Ok(v) = text.parse::<i128>() {
                    return integer(v, column, time_zone);
                }
            }
        }
        _ => {}
    }
    if column.is_binary() {
        return SqlValue::Bytes(bytes.to_vec());
    }
    match String::from_utf8(bytes.to_vec()) {
        Ok(text) => SqlValue::String(text),
        Err(_) => SqlValue::Bytes(bytes.to_vec()),
    }
}

/// `TIMESTAMP` values may arrive as `"<secs>[.<fraction>]"`.
fn timestamp_text(bytes: &[u8], time_zone: BinlogTimeZone) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    let (secs, fraction) = match text.split_once('.') {
        Some((secs, fraction)) => (secs, fraction),
        None => (text, ""),
    };
    let secs: i64 = secs.parse().ok()?;
    let micros = if fraction.is_empty() {
        0
    } else {
        let digits: String = fraction.chars().chain(std::iter::repeat('0')).take(6).collect();
        digits.parse().ok()?
    };
    Some(time_zone.format_timestamp(secs, micros))
}
