//! Statement descriptors built from the `sqlparser` MySQL AST.
//!
//! The AST is authoritative for the statements it models: CREATE TABLE,
//! ALTER TABLE, CREATE INDEX, DROP, RENAME TABLE, TRUNCATE, CREATE
//! DATABASE and the DML statements. Anything sqlparser rejects or parses
//! into a shape not mapped here (MySQL-only clauses such as `RENAME INDEX`,
//! `DROP INDEX .. ON`, key prefix lengths, `ALTER DATABASE`) is deferred to
//! the token-level parser.

use crate::statement::{
    AlterAction, AlterTable, ColumnPosition, ColumnSpec, CreateIndex, CreateTable,
    CreateTableBody, Dml, KeyKind, KeySpec, Statement, StatementKind, TableRef,
};
use sqlparser::ast::{
    self, AlterTableOperation, ColumnDef, ColumnOption, DataType, EnumMember, Expr, FromTable,
    Ident, MySQLColumnPosition, ObjectName, ObjectType, SchemaName, SetExpr, TableConstraint,
    TableFactor, TableObject, TableWithJoins, UpdateTableFromKind,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

/// Words that open a key clause. sqlparser reads an unquoted one in
/// column position as a column name when it does not know the clause.
const CLAUSE_WORDS: &[&str] = &[
    "INDEX", "KEY", "UNIQUE", "PRIMARY", "CONSTRAINT", "FOREIGN", "CHECK", "FULLTEXT",
    "SPATIAL", "PARTITION", "IF", "LIKE",
];

pub(crate) enum Mapping {
    Tracked(Statement),
    /// Not modelled by the AST path; the token parser decides
    Deferred,
}

/// Map one statement's text through the sqlparser AST.
pub(crate) fn map_statement(sql: &str, database: &str) -> Mapping {
    let Ok(mut parsed) = Parser::parse_sql(&MySqlDialect {}, sql) else {
        return Mapping::Deferred;
    };
    if parsed.len() != 1 {
        return Mapping::Deferred;
    }
    match map(parsed.remove(0), database) {
        Some(statement) => Mapping::Tracked(statement),
        None => Mapping::Deferred,
    }
}

fn map(statement: ast::Statement, database: &str) -> Option<Statement> {
    match statement {
        ast::Statement::CreateTable(create) => {
            let table = table_ref(&create.name, database)?;
            let body = match &create.like {
                Some(like) => CreateTableBody::Like(table_ref(like, database)?),
                None => {
                    let columns = create
                        .columns
                        .iter()
                        .map(|c| {
                            column_spec(&c.name, &c.data_type, c.options.iter().map(|o| &o.option))
                        })
                        .collect::<Option<Vec<_>>>()?;
                    let keys = create.constraints.iter().filter_map(key_spec).collect();
                    CreateTableBody::Columns { columns, keys }
                }
            };
            Some(Statement::CreateTable(CreateTable {
                table,
                if_not_exists: create.if_not_exists,
                body,
            }))
        }
        ast::Statement::AlterTable {
            name, operations, ..
        } => {
            let table = table_ref(&name, database)?;
            let actions = operations
                .iter()
                .map(|op| alter_action(op, database))
                .collect::<Option<Vec<_>>>()?;
            Some(Statement::AlterTable(AlterTable { table, actions }))
        }
        ast::Statement::CreateIndex(index) => {
            let name = last_ident(index.name.as_ref()?)?;
            let columns = index
                .columns
                .iter()
                .map(|c| match &c.expr {
                    Expr::Identifier(ident) => Some(ident.value.clone()),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()?;
            Some(Statement::CreateIndex(CreateIndex {
                name,
                table: table_ref(&index.table_name, database)?,
                unique: index.unique,
                columns,
            }))
        }
        ast::Statement::Drop {
            object_type, names, ..
        } => match object_type {
            ObjectType::Table => Some(Statement::DropTable(
                names
                    .iter()
                    .map(|n| table_ref(n, database))
                    .collect::<Option<Vec<_>>>()?,
            )),
            ObjectType::Database | ObjectType::Schema => {
                Some(Statement::DropDatabase(last_ident(names.first()?)?))
            }
            _ => None,
        },
        ast::Statement::RenameTable(renames) => Some(Statement::RenameTable(
            renames
                .iter()
                .map(|r| {
                    Some((
                        table_ref(&r.old_name, database)?,
                        table_ref(&r.new_name, database)?,
                    ))
                })
                .collect::<Option<Vec<_>>>()?,
        )),
        ast::Statement::Truncate { table_names, .. } => {
            let [target] = table_names.as_slice() else {
                return None;
            };
            Some(Statement::TruncateTable(table_ref(&target.name, database)?))
        }
        ast::Statement::CreateDatabase { db_name, .. } => {
            Some(Statement::CreateDatabase(last_ident(&db_name)?))
        }
        ast::Statement::CreateSchema {
            schema_name: SchemaName::Simple(name),
            ..
        } => Some(Statement::CreateDatabase(last_ident(&name)?)),
        ast::Statement::Insert(insert) => {
            let TableObject::TableName(name) = &insert.table else {
                return None;
            };
            let kind = if insert.replace_into {
                StatementKind::Replace
            } else {
                StatementKind::Insert
            };
            Some(dml(kind, vec![table_ref(name, database)?]))
        }
        ast::Statement::Update { table, from, .. } => {
            let mut tables = Vec::new();
            collect_tables(std::slice::from_ref(&table), database, &mut tables)?;
            if let Some(UpdateTableFromKind::BeforeSet(from) | UpdateTableFromKind::AfterSet(from)) =
                &from
            {
                collect_tables(from, database, &mut tables)?;
            }
            Some(dml(StatementKind::Update, tables))
        }
        ast::Statement::Delete(delete) => {
            // with USING the FROM list names targets, the tables follow USING
            let sources = match (&delete.using, &delete.from) {
                (Some(using), _) => using,
                (None, FromTable::WithFromKeyword(from) | FromTable::WithoutKeyword(from)) => from,
            };
            let mut tables = Vec::new();
            collect_tables(sources, database, &mut tables)?;
            Some(dml(StatementKind::Delete, tables))
        }
        ast::Statement::Query(query) => {
            let mut tables = Vec::new();
            query_tables(&query.body, database, &mut tables)?;
            Some(dml(StatementKind::Select, tables))
        }
        _ => None,
    }
}

fn dml(kind: StatementKind, tables: Vec<TableRef>) -> Statement {
    Statement::Dml(Dml { kind, tables })
}

// ============================================================================
// Names
// ============================================================================

fn table_ref(name: &ObjectName, database: &str) -> Option<TableRef> {
    let parts = name
        .0
        .iter()
        .map(|part| part.as_ident().map(|ident| ident.value.clone()))
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [table] => Some(TableRef::new(database, table.clone())),
        [schema, table] => Some(TableRef::new(schema.clone(), table.clone())),
        _ => None,
    }
}

fn last_ident(name: &ObjectName) -> Option<String> {
    name.0.last()?.as_ident().map(|ident| ident.value.clone())
}

fn is_clause_word(ident: &Ident) -> bool {
    ident.quote_style.is_none()
        && CLAUSE_WORDS
            .iter()
            .any(|word| ident.value.eq_ignore_ascii_case(word))
}

// ============================================================================
// Columns and keys
// ============================================================================

fn column_spec<'a>(
    name: &Ident,
    data_type: &DataType,
    options: impl Iterator<Item = &'a ColumnOption>,
) -> Option<ColumnSpec> {
    if is_clause_word(name) {
        return None;
    }
    let (data_type, mut column_type, mut unsigned, serial) = render_type(data_type);
    let mut spec = ColumnSpec {
        name: name.value.clone(),
        data_type,
        nullable: true,
        ..Default::default()
    };
    if serial {
        unsigned = true;
        spec.nullable = false;
        spec.auto_increment = true;
        spec.unique = true;
    }
    for option in options {
        match option {
            ColumnOption::Null => spec.nullable = true,
            ColumnOption::NotNull => spec.nullable = false,
            ColumnOption::Unique { is_primary: true, .. } => {
                spec.primary_key = true;
                spec.nullable = false;
            }
            ColumnOption::Unique { is_primary: false, .. } => spec.unique = true,
            ColumnOption::DialectSpecific(tokens) => {
                if tokens.iter().any(|t| is_word(t, "AUTO_INCREMENT")) {
                    spec.auto_increment = true;
                }
            }
            _ => {}
        }
    }
    if unsigned && !column_type.ends_with(" unsigned") {
        column_type.push_str(" unsigned");
    }
    spec.unsigned = unsigned;
    spec.column_type = column_type;
    Some(spec)
}

fn is_word(token: &Token, word: &str) -> bool {
    matches!(token, Token::Word(w) if w.value.eq_ignore_ascii_case(word))
}

/// `(data_type, column_type, unsigned, serial)` with the names MySQL
/// reports in `information_schema`.
fn render_type(data_type: &DataType) -> (String, String, bool, bool) {
    match data_type {
        DataType::Enum(members, _) => {
            let values = members
                .iter()
                .map(|m| match m {
                    EnumMember::Name(name) | EnumMember::NamedValue(name, _) => quote(name),
                })
                .collect::<Vec<_>>();
            ("enum".into(), format!("enum({})", values.join(",")), false, false)
        }
        DataType::Set(values) => {
            let values = values.iter().map(|v| quote(v)).collect::<Vec<_>>();
            ("set".into(), format!("set({})", values.join(",")), false, false)
        }
        DataType::Bool | DataType::Boolean => ("tinyint".into(), "tinyint(1)".into(), false, false),
        other => {
            let rendered = other.to_string().to_ascii_lowercase();
            let unsigned = rendered.ends_with(" unsigned");
            let text = rendered.trim_end_matches(" unsigned");
            let (name, args) = match text.find('(') {
                Some(i) => (text[..i].trim(), text[i..].replace(", ", ",")),
                None => (text.trim(), String::new()),
            };
            let name = match name {
                "integer" | "int4" => "int",
                "int2" => "smallint",
                "int8" => "bigint",
                "dec" | "numeric" | "fixed" => "decimal",
                "real" | "double precision" => "double",
                "character" | "nchar" => "char",
                "character varying" | "char varying" | "nvarchar" => "varchar",
                other => other,
            };
            if name == "serial" {
                return ("bigint".into(), "bigint".into(), true, true);
            }
            let mut column_type = format!("{name}{args}");
            if unsigned {
                column_type.push_str(" unsigned");
            }
            (name.to_string(), column_type, unsigned, false)
        }
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// PRIMARY KEY and UNIQUE constraints; other constraints carry no row identity.
fn key_spec(constraint: &TableConstraint) -> Option<KeySpec> {
    match constraint {
        TableConstraint::PrimaryKey { columns, .. } => Some(KeySpec {
            kind: KeyKind::Primary,
            name: None,
            columns: columns.iter().map(|c| c.value.clone()).collect(),
        }),
        TableConstraint::Unique {
            name,
            index_name,
            columns,
            ..
        } => Some(KeySpec {
            kind: KeyKind::Unique,
            name: index_name.as_ref().or(name.as_ref()).map(|n| n.value.clone()),
            columns: columns.iter().map(|c| c.value.clone()).collect(),
        }),
        _ => None,
    }
}

fn position(position: Option<&MySQLColumnPosition>) -> ColumnPosition {
    match position {
        None => ColumnPosition::Unspecified,
        Some(MySQLColumnPosition::First) => ColumnPosition::First,
        Some(MySQLColumnPosition::After(column)) => ColumnPosition::After(column.value.clone()),
    }
}

fn alter_action(op: &AlterTableOperation, database: &str) -> Option<AlterAction> {
    let action = match op {
        AlterTableOperation::AddColumn {
            column_def,
            column_position,
            ..
        } => {
            let ColumnDef {
                name,
                data_type,
                options,
                ..
            } = column_def;
            AlterAction::AddColumns {
                columns: vec![column_spec(name, data_type, options.iter().map(|o| &o.option))?],
                position: position(column_position.as_ref()),
            }
        }
        AlterTableOperation::AddConstraint(constraint) => key_spec(constraint)
            .map(AlterAction::AddKey)
            .unwrap_or(AlterAction::Other),
        AlterTableOperation::DropColumn { column_name, .. } => {
            if is_clause_word(column_name) {
                return None;
            }
            AlterAction::DropColumn(column_name.value.clone())
        }
        AlterTableOperation::DropPrimaryKey => AlterAction::DropPrimaryKey,
        AlterTableOperation::DropConstraint { name, .. } => AlterAction::DropIndex(name.value.clone()),
        AlterTableOperation::ModifyColumn {
            col_name,
            data_type,
            options,
            column_position,
            ..
        } => AlterAction::ModifyColumn {
            column: column_spec(col_name, data_type, options.iter())?,
            position: position(column_position.as_ref()),
        },
        AlterTableOperation::ChangeColumn {
            old_name,
            new_name,
            data_type,
            options,
            column_position,
            ..
        } => AlterAction::ChangeColumn {
            old_name: old_name.value.clone(),
            column: column_spec(new_name, data_type, options.iter())?,
            position: position(column_position.as_ref()),
        },
        AlterTableOperation::RenameColumn {
            old_column_name,
            new_column_name,
            ..
        } => {
            if is_clause_word(old_column_name) {
                return None;
            }
            AlterAction::RenameColumn {
                from: old_column_name.value.clone(),
                to: new_column_name.value.clone(),
            }
        }
        AlterTableOperation::RenameTable { table_name, .. } => {
            AlterAction::RenameTable(table_ref(table_name, database)?)
        }
        _ => AlterAction::Other,
    };
    Some(action)
}

// ============================================================================
// DML tables
// ============================================================================

/// Named tables of a FROM-style list, joins included. Derived tables and
/// table functions are skipped.
fn collect_tables(
    from: &[TableWithJoins],
    database: &str,
    tables: &mut Vec<TableRef>,
) -> Option<()> {
    for item in from {
        for factor in std::iter::once(&item.relation).chain(item.joins.iter().map(|j| &j.relation)) {
            match factor {
                TableFactor::Table {
                    name, args: None, ..
                } => tables.push(table_ref(name, database)?),
                TableFactor::NestedJoin {
                    table_with_joins, ..
                } => collect_tables(std::slice::from_ref(&**table_with_joins), database, tables)?,
                _ => {}
            }
        }
    }
    Some(())
}

fn query_tables(body: &SetExpr, database: &str, tables: &mut Vec<TableRef>) -> Option<()> {
    match body {
        SetExpr::Select(select) => collect_tables(&select.from, database, tables),
        SetExpr::Query(query) => query_tables(&query.body, database, tables),
        SetExpr::SetOperation { left, right, .. } => {
            query_tables(left, database, tables)?;
            query_tables(right, database, tables)
        }
        _ => Some(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(sql: &str) -> Statement {
        match map_statement(sql, "app") {
            Mapping::Tracked(statement) => statement,
            Mapping::Deferred => panic!("deferred: {sql}"),
        }
    }

    fn is_deferred(sql: &str) -> bool {
        matches!(map_statement(sql, "app"), Mapping::Deferred)
    }

    #[test]
    fn test_create_table_from_ast() {
        let Statement::CreateTable(create) = tracked(
            "CREATE TABLE shop.items (
                id bigint unsigned NOT NULL AUTO_INCREMENT,
                sku varchar(20) NOT NULL,
                price decimal(10,2) DEFAULT NULL,
                kind enum('a','b''c') NOT NULL,
                flag bool,
                PRIMARY KEY (id),
                UNIQUE KEY uk_sku (sku),
                KEY idx_price (price)
            ) ENGINE=InnoDB",
        ) else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(create.table, TableRef::new("shop", "items"));
        let CreateTableBody::Columns { columns, keys } = create.body else {
            panic!("expected columns");
        };
        assert_eq!(columns[0].column_type, "bigint unsigned");
        assert!(columns[0].unsigned && columns[0].auto_increment && !columns[0].nullable);
        assert_eq!(columns[1].column_type, "varchar(20)");
        assert!(!columns[1].nullable);
        assert_eq!(columns[2].column_type, "decimal(10,2)");
        assert!(columns[2].nullable);
        assert_eq!(columns[3].column_type, "enum('a','b''c')");
        assert_eq!(columns[4].column_type, "tinyint(1)");
        assert_eq!(
            keys,
            vec![
                KeySpec {
                    kind: KeyKind::Primary,
                    name: None,
                    columns: vec!["id".into()],
                },
                KeySpec {
                    kind: KeyKind::Unique,
                    name: Some("uk_sku".into()),
                    columns: vec!["sku".into()],
                },
            ]
        );
    }

    #[test]
    fn test_type_aliases() {
        let Statement::CreateTable(create) =
            tracked("CREATE TABLE t (a integer(11), b numeric(8,3), c int(10) unsigned, d datetime(6))")
        else {
            panic!("expected CREATE TABLE");
        };
        let CreateTableBody::Columns { columns, .. } = create.body else {
            panic!("expected columns");
        };
        let types: Vec<&str> = columns.iter().map(|c| c.column_type.as_str()).collect();
        assert_eq!(types, ["int(11)", "decimal(8,3)", "int(10) unsigned", "datetime(6)"]);
        assert_eq!(columns[0].data_type, "int");
    }

    #[test]
    fn test_alter_table_from_ast() {
        let Statement::AlterTable(alter) = tracked(
            "ALTER TABLE t ADD COLUMN c1 int AFTER id, ADD c2 varchar(3) FIRST, DROP COLUMN old, \
             MODIFY c1 bigint NOT NULL, CHANGE c2 c5 char(3) AFTER c1, ADD PRIMARY KEY (id), \
             ADD CONSTRAINT uq UNIQUE (c3, c4), DROP PRIMARY KEY, ADD INDEX idx (c1), \
             RENAME TO t_new",
        ) else {
            panic!("expected ALTER TABLE");
        };
        assert!(matches!(
            &alter.actions[0],
            AlterAction::AddColumns { columns, position: ColumnPosition::After(after) }
                if columns[0].name == "c1" && after == "id"
        ));
        assert!(matches!(
            &alter.actions[1],
            AlterAction::AddColumns { position: ColumnPosition::First, .. }
        ));
        assert_eq!(alter.actions[2], AlterAction::DropColumn("old".into()));
        assert!(matches!(
            &alter.actions[3],
            AlterAction::ModifyColumn { column, position: ColumnPosition::Unspecified }
                if column.data_type == "bigint" && !column.nullable
        ));
        assert!(matches!(
            &alter.actions[4],
            AlterAction::ChangeColumn { old_name, column, position: ColumnPosition::After(after) }
                if old_name == "c2" && column.name == "c5" && after == "c1"
        ));
        assert!(matches!(&alter.actions[5], AlterAction::AddKey(k) if k.kind == KeyKind::Primary));
        assert!(matches!(
            &alter.actions[6],
            AlterAction::AddKey(k) if k.name.as_deref() == Some("uq") && k.columns.len() == 2
        ));
        assert_eq!(alter.actions[7], AlterAction::DropPrimaryKey);
        assert_eq!(alter.actions[8], AlterAction::Other);
        assert_eq!(alter.actions[9], AlterAction::RenameTable(TableRef::new("app", "t_new")));
    }

    #[test]
    fn test_drop_rename_truncate_from_ast() {
        assert_eq!(
            tracked("DROP TABLE IF EXISTS a, b.c"),
            Statement::DropTable(vec![TableRef::new("app", "a"), TableRef::new("b", "c")])
        );
        assert_eq!(
            tracked("RENAME TABLE a TO b, x.c TO x.d"),
            Statement::RenameTable(vec![
                (TableRef::new("app", "a"), TableRef::new("app", "b")),
                (TableRef::new("x", "c"), TableRef::new("x", "d")),
            ])
        );
        assert_eq!(
            tracked("TRUNCATE TABLE t"),
            Statement::TruncateTable(TableRef::new("app", "t"))
        );
        assert_eq!(tracked("CREATE TABLE t2 LIKE db1.t1"), {
            Statement::CreateTable(CreateTable {
                table: TableRef::new("app", "t2"),
                if_not_exists: false,
                body: CreateTableBody::Like(TableRef::new("db1", "t1")),
            })
        });
    }

    #[test]
    fn test_dml_tables_from_ast() {
        assert_eq!(
            tracked("UPDATE t1 a JOIN db2.t2 b ON a.id = b.id SET a.x = 1").tables(),
            vec![TableRef::new("app", "t1"), TableRef::new("db2", "t2")]
        );
        assert_eq!(
            tracked("DELETE a FROM t1 a, t2 b WHERE a.id = b.id").tables(),
            vec![TableRef::new("app", "t1"), TableRef::new("app", "t2")]
        );
        assert_eq!(tracked("REPLACE INTO t VALUES (1)").kind(), StatementKind::Replace);
    }

    #[test]
    fn test_mysql_only_clauses_are_deferred() {
        assert!(is_deferred("ALTER TABLE t RENAME INDEX a TO b"));
        assert!(is_deferred("DROP INDEX uk ON t"));
        assert!(is_deferred("CREATE TABLE t (a varchar(10), UNIQUE KEY uk (a(4)))"));
        assert!(is_deferred("ALTER TABLE t ADD (a int, b int)"));
        assert!(is_deferred("BEGIN"));
    }
}
