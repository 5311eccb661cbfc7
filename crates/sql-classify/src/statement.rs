//! Statement descriptors produced by the classifier.

use std::fmt;

// ============================================================================
// Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Delete,
    Update,
    Replace,
    LoadData,
    AlterTable,
    AlterDatabase,
    CreateTable,
    CreateDatabase,
    CreateIndex,
    DropTable,
    DropDatabase,
    DropIndex,
    TruncateTable,
    RenameTable,
}

impl StatementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::Delete => "delete",
            StatementKind::Update => "update",
            StatementKind::Replace => "replace",
            StatementKind::LoadData => "load_data",
            StatementKind::AlterTable => "alter_table",
            StatementKind::AlterDatabase => "alter_database",
            StatementKind::CreateTable => "create_table",
            StatementKind::CreateDatabase => "create_database",
            StatementKind::CreateIndex => "create_index",
            StatementKind::DropTable => "drop_table",
            StatementKind::DropDatabase => "drop_database",
            StatementKind::DropIndex => "drop_index",
            StatementKind::TruncateTable => "truncate_table",
            StatementKind::RenameTable => "rename_table",
        }
    }

    /// Statements that change data row by row.
    pub fn is_dml(self) -> bool {
        matches!(
            self,
            StatementKind::Insert
                | StatementKind::Delete
                | StatementKind::Update
                | StatementKind::Replace
                | StatementKind::LoadData
        )
    }

    pub fn is_ddl(self) -> bool {
        !self.is_dml() && self != StatementKind::Select
    }

    /// DDL that operates on a whole database rather than a table.
    pub fn is_database_ddl(self) -> bool {
        matches!(
            self,
            StatementKind::CreateDatabase
                | StatementKind::AlterDatabase
                | StatementKind::DropDatabase
        )
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// A table referenced by a statement. The database is the explicit qualifier,
/// or the session database when the name was unqualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub database: String,
    pub table: String,
}

impl TableRef {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.database.is_empty() {
            f.write_str(&self.table)
        } else {
            write!(f, "{}.{}", self.database, self.table)
        }
    }
}

/// A column as declared in CREATE TABLE / ALTER TABLE.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnSpec {
    pub name: String,
    /// Lower-cased base type, e.g. `varchar`
    pub data_type: String,
    /// Full type as MySQL reports it in `COLUMN_TYPE`, e.g. `int(10) unsigned`
    pub column_type: String,
    pub unsigned: bool,
    pub nullable: bool,
    pub auto_increment: bool,
    /// Inline `PRIMARY KEY`
    pub primary_key: bool,
    /// Inline `UNIQUE [KEY]`
    pub unique: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Primary,
    Unique,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    pub kind: KeyKind,
    pub name: Option<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ColumnPosition {
    /// End of the table for ADD, the current position for MODIFY / CHANGE
    #[default]
    Unspecified,
    First,
    After(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateTableBody {
    Columns {
        columns: Vec<ColumnSpec>,
        keys: Vec<KeySpec>,
    },
    Like(TableRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    pub table: TableRef,
    pub if_not_exists: bool,
    pub body: CreateTableBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterAction {
    AddColumns {
        columns: Vec<ColumnSpec>,
        position: ColumnPosition,
    },
    DropColumn(String),
    ModifyColumn {
        column: ColumnSpec,
        position: ColumnPosition,
    },
    ChangeColumn {
        old_name: String,
        column: ColumnSpec,
        position: ColumnPosition,
    },
    RenameColumn {
        from: String,
        to: String,
    },
    AddKey(KeySpec),
    DropPrimaryKey,
    DropIndex(String),
    RenameIndex {
        from: String,
        to: String,
    },
    RenameTable(TableRef),
    /// Clauses with no effect on the tracked schema (ENGINE=, ADD INDEX, ...)
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterTable {
    pub table: TableRef,
    pub actions: Vec<AlterAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIndex {
    pub name: String,
    pub table: TableRef,
    pub unique: bool,
    /// Empty when a key part is an expression
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropIndex {
    pub name: String,
    pub table: TableRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dml {
    pub kind: StatementKind,
    pub tables: Vec<TableRef>,
}

/// One classified statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    CreateTable(CreateTable),
    AlterTable(AlterTable),
    CreateIndex(CreateIndex),
    DropIndex(DropIndex),
    DropTable(Vec<TableRef>),
    CreateDatabase(String),
    AlterDatabase(String),
    DropDatabase(String),
    RenameTable(Vec<(TableRef, TableRef)>),
    TruncateTable(TableRef),
    Dml(Dml),
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::CreateTable(_) => StatementKind::CreateTable,
            Statement::AlterTable(_) => StatementKind::AlterTable,
            Statement::CreateIndex(_) => StatementKind::CreateIndex,
            Statement::DropIndex(_) => StatementKind::DropIndex,
            Statement::DropTable(_) => StatementKind::DropTable,
            Statement::CreateDatabase(_) => StatementKind::CreateDatabase,
            Statement::AlterDatabase(_) => StatementKind::AlterDatabase,
            Statement::DropDatabase(_) => StatementKind::DropDatabase,
            Statement::RenameTable(_) => StatementKind::RenameTable,
            Statement::TruncateTable(_) => StatementKind::TruncateTable,
            Statement::Dml(dml) => dml.kind,
        }
    }

    /// Every `(database, table)` pair the statement references. Database
    /// level statements report the database with an empty table name.
    pub fn tables(&self) -> Vec<TableRef> {
        match self {
            Statement::CreateTable(create) => vec![create.table.clone()],
            Statement::AlterTable(alter) => {
                let mut tables = vec![alter.table.clone()];
                tables.extend(alter.actions.iter().filter_map(|action| match action {
                    AlterAction::RenameTable(to) => Some(to.clone()),
                    _ => None,
                }));
                tables
            }
            Statement::CreateIndex(index) => vec![index.table.clone()],
            Statement::DropIndex(index) => vec![index.table.clone()],
            Statement::DropTable(tables) => tables.clone(),
            Statement::CreateDatabase(db)
            | Statement::AlterDatabase(db)
            | Statement::DropDatabase(db) => vec![TableRef::new(db.clone(), "")],
            Statement::RenameTable(pairs) => pairs
                .iter()
                .flat_map(|(from, to)| [from.clone(), to.clone()])
                .collect(),
            Statement::TruncateTable(table) => vec![table.clone()],
            Statement::Dml(dml) => dml.tables.clone(),
        }
    }
}

/// A statement together with its text and the session database it ran in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    pub sql: String,
    pub database: String,
    pub statement: Statement,
}

impl ParsedStatement {
    pub fn kind(&self) -> StatementKind {
        self.statement.kind()
    }

    pub fn tables(&self) -> Vec<TableRef> {
        self.statement.tables()
    }
}
