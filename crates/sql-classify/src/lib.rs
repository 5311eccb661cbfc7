//! Statement classification for binlog query events.
//!
//! [`classify`] splits a query event's text into statements and returns one
//! [`ParsedStatement`] per statement of a tracked kind:
//!
//! - DML (`INSERT`, `REPLACE`, `UPDATE`, `DELETE`, `LOAD DATA`, `SELECT`)
//!   with the tables they touch
//! - DDL that changes table definitions (`CREATE TABLE`, `ALTER TABLE`,
//!   `CREATE/DROP INDEX`, `RENAME TABLE`, `DROP TABLE`, `TRUNCATE`)
//!   with a structured payload
//! - database level DDL
//!
//! Statements of any other kind (views, triggers, grants, `BEGIN`, ...) yield
//! no descriptor. A tracked statement that cannot be parsed is an error.
//!
//! Each statement is first parsed into the `sqlparser` MySQL AST. MySQL
//! clauses sqlparser does not accept (`RENAME INDEX`, `DROP INDEX .. ON`,
//! key prefix lengths, `ALTER DATABASE`, `LOAD DATA INFILE`, ...) fall back
//! to a token-level parser over the same tokenizer output.

mod ast;
mod cursor;
mod parser;
pub mod statement;

pub use statement::{
    AlterAction, AlterTable, ColumnPosition, ColumnSpec, CreateIndex, CreateTable,
    CreateTableBody, DropIndex, Dml, KeyKind, KeySpec, ParsedStatement, Statement,
    StatementKind, TableRef,
};

use sqlparser::dialect::MySqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("failed to tokenize SQL: {0}")]
    Tokenize(String),

    #[error("syntax error: expected {expected}, found {found}")]
    Syntax { expected: String, found: String },
}

/// Classify `sql`, executed with `current_database` as the session database.
pub fn classify(sql: &str, current_database: &str) -> Result<Vec<ParsedStatement>, ClassifyError> {
    let tokens = Tokenizer::new(&MySqlDialect {}, sql)
        .tokenize()
        .map_err(|e| ClassifyError::Tokenize(e.to_string()))?;

    let statements: Vec<Vec<Token>> = cursor::split_top_level(&tokens, &Token::SemiColon)
        .into_iter()
        .filter(|piece| piece.iter().any(is_significant))
        .collect();
    let single = statements.len() == 1;

    let mut parsed = Vec::new();
    for piece in statements {
        let text = if single {
            sql.trim().trim_end_matches(';').trim_end().to_string()
        } else {
            piece.iter().map(ToString::to_string).collect::<String>().trim().to_string()
        };
        let statement = match ast::map_statement(&text, current_database) {
            ast::Mapping::Tracked(statement) => statement,
            ast::Mapping::Deferred => {
                let significant: Vec<Token> =
                    piece.iter().filter(|t| is_significant(t)).cloned().collect();
                match parser::parse(significant, current_database)? {
                    Some(statement) => statement,
                    None => continue,
                }
            }
        };
        parsed.push(ParsedStatement {
            sql: text,
            database: current_database.to_string(),
            statement,
        });
    }
    Ok(parsed)
}

fn is_significant(token: &Token) -> bool {
    !matches!(token, Token::Whitespace(_) | Token::EOF)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(sql: &str) -> Statement {
        let mut parsed = classify(sql, "app").unwrap();
        assert_eq!(parsed.len(), 1, "{sql}");
        parsed.remove(0).statement
    }

    #[test]
    fn test_create_table_columns_and_keys() {
        let Statement::CreateTable(create) = one(
            "CREATE TABLE IF NOT EXISTS `shop`.`orders` (
                `id` int(10) unsigned NOT NULL AUTO_INCREMENT,
                `code` varchar(32) CHARACTER SET utf8mb4 DEFAULT NULL COMMENT 'order, code',
                `size` enum('s','m','it''s') NOT NULL DEFAULT 's',
                `price` decimal(10,2) DEFAULT '0.00',
                `created` datetime(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6) ON UPDATE CURRENT_TIMESTAMP(6),
                PRIMARY KEY (`id`),
                UNIQUE KEY `uk_code` (`code`(10)),
                KEY `idx_created` (`created`),
                CONSTRAINT `fk` FOREIGN KEY (`code`) REFERENCES other (`code`)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
        ) else {
            panic!("expected CREATE TABLE");
        };
        assert!(create.if_not_exists);
        assert_eq!(create.table, TableRef::new("shop", "orders"));
        let CreateTableBody::Columns { columns, keys } = create.body else {
            panic!("expected columns");
        };
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "code", "size", "price", "created"]);

        assert_eq!(columns[0].column_type, "int(10) unsigned");
        assert!(columns[0].unsigned && columns[0].auto_increment && !columns[0].nullable);
        assert!(columns[1].nullable);
        assert_eq!(columns[2].column_type, "enum('s','m','it''s')");
        assert_eq!(columns[3].column_type, "decimal(10,2)");
        assert_eq!(columns[4].data_type, "datetime");

        assert_eq!(
            keys,
            vec![
                KeySpec {
                    kind: KeyKind::Primary,
                    name: None,
                    columns: vec!["id".into()]
                },
                KeySpec {
                    kind: KeyKind::Unique,
                    name: Some("uk_code".into()),
                    columns: vec!["code".into()]
                },
            ]
        );
    }

    #[test]
    fn test_inline_keys_and_session_database() {
        let Statement::CreateTable(create) = one("create table t (id int primary key, a int unique)")
        else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(create.table, TableRef::new("app", "t"));
        let CreateTableBody::Columns { columns, keys } = create.body else {
            panic!("expected columns");
        };
        assert!(keys.is_empty());
        assert!(columns[0].primary_key);
        assert!(columns[1].unique);
    }

    #[test]
    fn test_create_table_like() {
        let Statement::CreateTable(create) = one("CREATE TABLE t2 LIKE db1.t1") else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(create.body, CreateTableBody::Like(TableRef::new("db1", "t1")));

        let Statement::CreateTable(create) = one("CREATE TABLE t2 (LIKE t1)") else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(create.body, CreateTableBody::Like(TableRef::new("app", "t1")));
    }

    #[test]
    fn test_alter_table_actions() {
        let Statement::AlterTable(alter) = one(
            "ALTER TABLE t ADD COLUMN c1 int AFTER id, ADD c2 varchar(3) FIRST, \
             ADD (c3 int, c4 int), DROP COLUMN old, DROP other, MODIFY c1 bigint NOT NULL, \
             CHANGE c2 c5 char(3), ADD PRIMARY KEY (id), ADD CONSTRAINT uq UNIQUE (c3, c4), \
             DROP PRIMARY KEY, DROP INDEX uq, RENAME INDEX a TO b, ADD INDEX idx (c1), \
             ENGINE=InnoDB, RENAME TO t_new",
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
        assert!(matches!(
            &alter.actions[2],
            AlterAction::AddColumns { columns, position: ColumnPosition::Unspecified }
                if columns.len() == 2
        ));
        assert_eq!(alter.actions[3], AlterAction::DropColumn("old".into()));
        assert_eq!(alter.actions[4], AlterAction::DropColumn("other".into()));
        assert!(matches!(
            &alter.actions[5],
            AlterAction::ModifyColumn { column, .. } if column.data_type == "bigint" && !column.nullable
        ));
        assert!(matches!(
            &alter.actions[6],
            AlterAction::ChangeColumn { old_name, column, .. } if old_name == "c2" && column.name == "c5"
        ));
        assert!(matches!(&alter.actions[7], AlterAction::AddKey(k) if k.kind == KeyKind::Primary));
        assert!(matches!(
            &alter.actions[8],
            AlterAction::AddKey(k) if k.name.as_deref() == Some("uq") && k.columns.len() == 2
        ));
        assert_eq!(alter.actions[9], AlterAction::DropPrimaryKey);
        assert_eq!(alter.actions[10], AlterAction::DropIndex("uq".into()));
        assert_eq!(
            alter.actions[11],
            AlterAction::RenameIndex {
                from: "a".into(),
                to: "b".into()
            }
        );
        assert_eq!(alter.actions[12], AlterAction::Other);
        assert_eq!(alter.actions[13], AlterAction::Other);
        assert_eq!(
            alter.actions[14],
            AlterAction::RenameTable(TableRef::new("app", "t_new"))
        );
        assert_eq!(
            Statement::AlterTable(alter).tables(),
            vec![TableRef::new("app", "t"), TableRef::new("app", "t_new")]
        );
    }

    #[test]
    fn test_index_statements() {
        assert_eq!(
            one("CREATE UNIQUE INDEX uk ON db.t (a, b)"),
            Statement::CreateIndex(CreateIndex {
                name: "uk".into(),
                table: TableRef::new("db", "t"),
                unique: true,
                columns: vec!["a".into(), "b".into()],
            })
        );
        assert!(matches!(
            one("CREATE INDEX idx ON t ((lower(a)))"),
            Statement::CreateIndex(CreateIndex { unique: false, ref columns, .. }) if columns.is_empty()
        ));
        assert_eq!(
            one("DROP INDEX uk ON t"),
            Statement::DropIndex(DropIndex {
                name: "uk".into(),
                table: TableRef::new("app", "t"),
            })
        );
    }

    #[test]
    fn test_drop_rename_truncate_database() {
        assert_eq!(
            one("DROP TABLE IF EXISTS a, b.c /* generated by server */"),
            Statement::DropTable(vec![TableRef::new("app", "a"), TableRef::new("b", "c")])
        );
        assert_eq!(
            one("RENAME TABLE a TO b, x.c TO x.d"),
            Statement::RenameTable(vec![
                (TableRef::new("app", "a"), TableRef::new("app", "b")),
                (TableRef::new("x", "c"), TableRef::new("x", "d")),
            ])
        );
        assert_eq!(
            one("truncate table t"),
            Statement::TruncateTable(TableRef::new("app", "t"))
        );
        assert_eq!(one("DROP DATABASE IF EXISTS old"), Statement::DropDatabase("old".into()));
        assert_eq!(
            one("CREATE SCHEMA IF NOT EXISTS s"),
            Statement::CreateDatabase("s".into())
        );
        assert_eq!(
            one("ALTER DATABASE DEFAULT CHARACTER SET utf8mb4"),
            Statement::AlterDatabase("app".into())
        );
        assert!(one("DROP DATABASE d").kind().is_database_ddl());
    }

    #[test]
    fn test_dml_tables() {
        let cases = [
            ("INSERT IGNORE INTO db.t (a) VALUES (1)", StatementKind::Insert, vec![TableRef::new("db", "t")]),
            ("replace into t values (1)", StatementKind::Replace, vec![TableRef::new("app", "t")]),
            (
                "UPDATE t1 a JOIN db2.t2 b ON a.id = b.id SET a.x = 1 WHERE b.y = 2",
                StatementKind::Update,
                vec![TableRef::new("app", "t1"), TableRef::new("db2", "t2")],
            ),
            ("DELETE FROM t WHERE id = 1", StatementKind::Delete, vec![TableRef::new("app", "t")]),
            (
                "DELETE a FROM t1 a, t2 b WHERE a.id = b.id",
                StatementKind::Delete,
                vec![TableRef::new("app", "t1"), TableRef::new("app", "t2")],
            ),
            (
                "LOAD DATA LOCAL INFILE '/tmp/x' IGNORE INTO TABLE t",
                StatementKind::LoadData,
                vec![TableRef::new("app", "t")],
            ),
            (
                "SELECT * FROM t1 LEFT JOIN (SELECT 1) x ON 1 WHERE a IN (SELECT b FROM t3)",
                StatementKind::Select,
                vec![TableRef::new("app", "t1")],
            ),
        ];
        for (sql, kind, tables) in cases {
            let statement = one(sql);
            assert_eq!(statement.kind(), kind, "{sql}");
            assert_eq!(statement.tables(), tables, "{sql}");
        }
        assert!(StatementKind::Replace.is_dml());
        assert!(!StatementKind::Select.is_ddl());
    }

    #[test]
    fn test_untracked_statements_yield_nothing() {
        for sql in [
            "BEGIN",
            "COMMIT",
            "CREATE DEFINER=`root`@`%` TRIGGER trg BEFORE INSERT ON t FOR EACH ROW SET NEW.a = 1",
            "CREATE VIEW v AS SELECT 1",
            "GRANT ALL ON *.* TO x",
            "FLUSH PRIVILEGES",
        ] {
            assert!(classify(sql, "app").unwrap().is_empty(), "{sql}");
        }
    }

    #[test]
    fn test_multiple_statements_keep_their_text() {
        let parsed = classify("drop table a; create table b (id int);", "app").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].sql, "drop table a");
        assert_eq!(parsed[1].sql, "create table b (id int)");
        assert_eq!(parsed[1].database, "app");
    }

    #[test]
    fn test_single_statement_text_is_verbatim() {
        let parsed = classify("ALTER TABLE t ADD c varchar(3) DEFAULT 'a\\'b';", "app").unwrap();
        assert_eq!(parsed[0].sql, "ALTER TABLE t ADD c varchar(3) DEFAULT 'a\\'b'");
    }

    #[test]
    fn test_malformed_ddl_is_an_error() {
        assert!(matches!(
            classify("ALTER TABLE t ADD COLUMN", "app"),
            Err(ClassifyError::Syntax { .. })
        ));
        assert!(classify("RENAME TABLE a b", "app").is_err());
        assert!(classify("CREATE UNIQUE t", "app").is_err());
    }
}
