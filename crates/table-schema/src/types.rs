//! MySQL column type classification.
//!
//! Maps the textual type information found in `information_schema.COLUMNS`
//! (or in a `CREATE TABLE` column definition) to the wire-level field type
//! code used when interpreting row images.

use serde::{Deserialize, Serialize};

/// Data type name given to placeholder columns.
pub const UNKNOWN_DATA_TYPE: &str = "unknown_type";

/// Wire-level field type of a column, mirroring the `MYSQL_TYPE_*` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Tiny,
    Short,
    Int24,
    Long,
    LongLong,
    Float,
    Double,
    NewDecimal,
    Year,
    Date,
    Time,
    DateTime,
    Timestamp,
    Bit,
    Varchar,
    String,
    Blob,
    Json,
    Enum,
    Set,
    Geometry,
    /// Type could not be determined (placeholder columns).
    Null,
}

impl FieldType {
    /// Classify a MySQL data type name such as `int`, `varchar` or `mediumblob`.
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type.to_ascii_lowercase().as_str() {
            "tinyint" | "bool" | "boolean" => FieldType::Tiny,
            "smallint" => FieldType::Short,
            "mediumint" => FieldType::Int24,
            "int" | "integer" => FieldType::Long,
            "bigint" | "serial" => FieldType::LongLong,
            "float" => FieldType::Float,
            "double" | "real" => FieldType::Double,
            "decimal" | "numeric" | "dec" | "fixed" => FieldType::NewDecimal,
            "year" => FieldType::Year,
            "date" => FieldType::Date,
            "time" => FieldType::Time,
            "datetime" => FieldType::DateTime,
            "timestamp" => FieldType::Timestamp,
            "bit" => FieldType::Bit,
            "varchar" | "varbinary" | "nvarchar" => FieldType::Varchar,
            "char" | "binary" | "nchar" => FieldType::String,
            "tinytext" | "text" | "mediumtext" | "longtext" | "tinyblob" | "blob"
            | "mediumblob" | "longblob" => FieldType::Blob,
            "json" => FieldType::Json,
            "enum" => FieldType::Enum,
            "set" => FieldType::Set,
            "geometry" | "point" | "linestring" | "polygon" | "multipoint"
            | "multilinestring" | "multipolygon" | "geometrycollection" => FieldType::Geometry,
            _ => FieldType::Null,
        }
    }

    /// Storage width in bits for integer types.
    pub fn integer_bits(self) -> Option<u32> {
        match self {
            FieldType::Tiny => Some(8),
            FieldType::Short => Some(16),
            FieldType::Int24 => Some(24),
            FieldType::Long => Some(32),
            FieldType::LongLong => Some(64),
            _ => None,
        }
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            FieldType::Date | FieldType::Time | FieldType::DateTime | FieldType::Timestamp
        )
    }
}

/// True for data types whose values are raw bytes rather than text.
pub fn is_binary_data_type(data_type: &str) -> bool {
    matches!(
        data_type.to_ascii_lowercase().as_str(),
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" | "bit"
            | "geometry"
            | "point"
            | "linestring"
            | "polygon"
            | "multipoint"
            | "multilinestring"
            | "multipolygon"
            | "geometrycollection"
    )
}

/// Extract the element list from an `enum(...)` or `set(...)` column type.
///
/// E.g. `enum('small','medium','large')` -> `["small", "medium", "large"]`.
/// Quotes doubled inside an element (`'it''s'`) are unescaped.
pub fn extract_elements(column_type: &str) -> Vec<String> {
    let (Some(start), Some(end)) = (column_type.find('('), column_type.rfind(')')) else {
        return Vec::new();
    };
    if start >= end {
        return Vec::new();
    }

    let mut elements = Vec::new();
    let mut chars = column_type[start + 1..end].chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\'' {
            continue;
        }
        let mut element = String::new();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    element.push('\'');
                } else {
                    break;
                }
            } else {
                element.push(c);
            }
        }
        elements.push(element);
    }
    elements
}

/// True when the full column type carries the `unsigned` attribute.
pub fn is_unsigned_column_type(column_type: &str) -> bool {
    column_type
        .to_ascii_lowercase()
        .split_whitespace()
        .any(|w| w == "unsigned")
}
