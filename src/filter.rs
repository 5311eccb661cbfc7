//! Database, table and statement type filters.

use anyhow::Context;
use binlog_events::RowsEventKind;
use regex::Regex;

/// Split a comma separated option value, dropping empty items.
pub fn split_list(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

fn compile_all(value: Option<&str>, option: &str) -> anyhow::Result<Vec<Regex>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    split_list(value)
        .into_iter()
        .map(|pattern| {
            Regex::new(pattern)
                .with_context(|| format!("{option}: {pattern} is not a valid regular expression"))
        })
        .collect()
}

/// Selects tables by regular expressions over lower-cased names. An empty
/// expression list admits everything.
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    databases: Vec<Regex>,
    tables: Vec<Regex>,
}

impl TableFilter {
    pub fn parse(databases: Option<&str>, tables: Option<&str>) -> anyhow::Result<Self> {
        Ok(Self {
            databases: compile_all(databases, "--databases")?,
            tables: compile_all(tables, "--tables")?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty() && self.tables.is_empty()
    }

    pub fn matches_database(&self, database: &str) -> bool {
        let database = database.to_lowercase();
        self.databases.is_empty() || self.databases.iter().any(|re| re.is_match(&database))
    }

    pub fn matches(&self, database: &str, table: &str) -> bool {
        if !self.matches_database(database) {
            return false;
        }
        let table = table.to_lowercase();
        self.tables.is_empty() || self.tables.iter().any(|re| re.is_match(&table))
    }
}

/// Row change types to process. Empty means all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlTypeFilter {
    kinds: Vec<RowsEventKind>,
}

impl SqlTypeFilter {
    pub fn parse(value: Option<&str>) -> anyhow::Result<Self> {
        let Some(value) = value else {
            return Ok(Self::default());
        };
        let kinds = split_list(value)
            .into_iter()
            .map(|item| match item.to_lowercase().as_str() {
                "insert" => Ok(RowsEventKind::Insert),
                "update" => Ok(RowsEventKind::Update),
                "delete" => Ok(RowsEventKind::Delete),
                other => Err(anyhow::anyhow!(
                    "--sql-types: invalid type '{other}', valid types are: insert, update, delete"
                )),
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { kinds })
    }

    pub fn admits(&self, kind: RowsEventKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_filter() {
        let filter = TableFilter::parse(Some("^salesdb$"), Some("^orders$, ^order_items$")).unwrap();
        assert!(filter.matches("salesdb", "orders"));
        assert!(filter.matches("SalesDB", "Order_Items"));
        assert!(!filter.matches("salesdb", "customers"));
        assert!(!filter.matches("salesdb_archive", "orders"));
        assert!(filter.matches_database("salesdb"));
    }

    #[test]
    fn test_empty_filter_admits_all() {
        let filter = TableFilter::parse(None, Some("  ,")).unwrap();
        assert!(filter.is_empty());
        assert!(filter.matches("any", "thing"));
    }

    #[test]
    fn test_invalid_regex() {
        let err = TableFilter::parse(Some("(unclosed"), None).unwrap_err();
        assert!(err.to_string().contains("--databases"));
    }

    #[test]
    fn test_sql_types() {
        let filter = SqlTypeFilter::parse(Some("insert,DELETE")).unwrap();
        assert!(filter.admits(RowsEventKind::Insert));
        assert!(filter.admits(RowsEventKind::Delete));
        assert!(!filter.admits(RowsEventKind::Update));
        assert!(SqlTypeFilter::parse(Some("merge")).is_err());
        assert!(SqlTypeFilter::default().admits(RowsEventKind::Update));
    }
}
