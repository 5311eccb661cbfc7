//! Token-level parsing of the statements the sqlparser AST does not accept.
//!
//! Only the parts of a statement that affect table definitions or the table
//! list are interpreted; everything else (table options, defaults, index
//! hints, ...) is skipped token by token.

use crate::cursor::{is_keyword, split_top_level, Cursor};
use crate::statement::{
    AlterAction, AlterTable, ColumnPosition, ColumnSpec, CreateIndex, CreateTable,
    CreateTableBody, DropIndex, Dml, KeyKind, KeySpec, Statement, StatementKind, TableRef,
};
use crate::ClassifyError;
use sqlparser::tokenizer::Token;

/// Words that open a key or constraint clause inside a table definition.
const KEY_CLAUSE_WORDS: &[&str] = &[
    "PRIMARY",
    "UNIQUE",
    "CONSTRAINT",
    "KEY",
    "INDEX",
    "FULLTEXT",
    "SPATIAL",
    "FOREIGN",
    "CHECK",
    "PERIOD",
];

const SELECT_STOP_WORDS: &[&str] = &[
    "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "UNION", "FOR", "LOCK", "INTO", "WINDOW",
];

/// Parse one statement (whitespace already removed). `None` means the
/// statement is not one of the tracked kinds.
pub(crate) fn parse(tokens: Vec<Token>, database: &str) -> Result<Option<Statement>, ClassifyError> {
    let mut c = Cursor::new(tokens);
    let lead = match c.peek() {
        Some(Token::Word(w)) if w.quote_style.is_none() => w.value.to_ascii_uppercase(),
        _ => return Ok(None),
    };
    c.next();

    match lead.as_str() {
        "CREATE" => parse_create(&mut c, database),
        "ALTER" => parse_alter(&mut c, database),
        "DROP" => parse_drop(&mut c, database),
        "RENAME" => parse_rename(&mut c, database),
        "TRUNCATE" => {
            c.eat_keyword("TABLE");
            Ok(Some(Statement::TruncateTable(c.table_ref(database)?)))
        }
        "INSERT" => parse_insert(&mut c, database, StatementKind::Insert).map(Some),
        "REPLACE" => parse_insert(&mut c, database, StatementKind::Replace).map(Some),
        "UPDATE" => parse_update(&mut c, database).map(Some),
        "DELETE" => parse_delete(&mut c, database).map(Some),
        "LOAD" => parse_load(&mut c, database),
        "SELECT" | "WITH" => parse_select(&mut c, database).map(Some),
        _ => Ok(None),
    }
}

// ============================================================================
// CREATE
// ============================================================================

fn parse_create(c: &mut Cursor, database: &str) -> Result<Option<Statement>, ClassifyError> {
    c.eat_keywords(&["OR", "REPLACE"]);
    c.eat_any_keyword(&["ONLINE", "OFFLINE"]);
    c.eat_keyword("TEMPORARY");

    if c.eat_keyword("TABLE") {
        return parse_create_table(c, database).map(|t| Some(Statement::CreateTable(t)));
    }
    if c.eat_any_keyword(&["DATABASE", "SCHEMA"]) {
        c.eat_if_not_exists();
        return Ok(Some(Statement::CreateDatabase(c.identifier()?)));
    }

    let unique = c.eat_keyword("UNIQUE");
    let other_index = !unique && c.eat_any_keyword(&["FULLTEXT", "SPATIAL"]);
    if c.eat_keyword("INDEX") {
        return parse_create_index(c, database, unique).map(|i| Some(Statement::CreateIndex(i)));
    }
    if unique || other_index {
        return Err(c.unexpected("INDEX"));
    }
    Ok(None)
}

fn parse_create_table(c: &mut Cursor, database: &str) -> Result<CreateTable, ClassifyError> {
    let if_not_exists = c.eat_if_not_exists();
    let table = c.table_ref(database)?;

    let body = if c.eat_keyword("LIKE") {
        CreateTableBody::Like(c.table_ref(database)?)
    } else if c.peek() == Some(&Token::LParen) {
        let like_in_parens = c.peek_nth(1).is_some_and(|t| is_keyword(t, "LIKE"));
        let select_in_parens = c.peek_nth(1).is_some_and(|t| is_keyword(t, "SELECT"));
        let inner = c.parenthesized()?;
        if like_in_parens {
            let mut inner = Cursor::new(inner);
            inner.expect_keyword("LIKE")?;
            CreateTableBody::Like(inner.table_ref(database)?)
        } else if select_in_parens {
            CreateTableBody::Columns {
                columns: Vec::new(),
                keys: Vec::new(),
            }
        } else {
            parse_table_elements(&inner)?
        }
    } else {
        // CREATE TABLE ... SELECT without a column list
        CreateTableBody::Columns {
            columns: Vec::new(),
            keys: Vec::new(),
        }
    };

    Ok(CreateTable {
        table,
        if_not_exists,
        body,
    })
}

fn parse_table_elements(tokens: &[Token]) -> Result<CreateTableBody, ClassifyError> {
    let mut columns = Vec::new();
    let mut keys = Vec::new();
    for element in split_top_level(tokens, &Token::Comma) {
        let mut e = Cursor::new(element);
        if e.peek_any_keyword(KEY_CLAUSE_WORDS) {
            keys.extend(parse_key_clause(&mut e)?);
        } else {
            columns.push(parse_column_spec(&mut e)?.0);
        }
    }
    Ok(CreateTableBody::Columns { columns, keys })
}

fn parse_create_index(
    c: &mut Cursor,
    database: &str,
    unique: bool,
) -> Result<CreateIndex, ClassifyError> {
    c.eat_if_not_exists();
    let name = c.identifier()?;
    skip_index_type(c)?;
    c.expect_keyword("ON")?;
    let table = c.table_ref(database)?;
    let columns = key_parts(c)?.unwrap_or_default();
    Ok(CreateIndex {
        name,
        table,
        unique,
        columns,
    })
}

// ============================================================================
// Columns and keys
// ============================================================================

/// `name type[(args)] [attributes...] [FIRST | AFTER col]`
fn parse_column_spec(c: &mut Cursor) -> Result<(ColumnSpec, ColumnPosition), ClassifyError> {
    let name = c.identifier()?;
    let raw_type = c.identifier()?.to_ascii_lowercase();
    let raw_type = if raw_type == "national" {
        c.identifier()?.to_ascii_lowercase()
    } else {
        raw_type
    };

    let mut data_type = match raw_type.as_str() {
        "integer" => "int",
        "bool" | "boolean" => "tinyint",
        "dec" | "numeric" | "fixed" => "decimal",
        "real" => "double",
        "character" | "nchar" => "char",
        "nvarchar" => "varchar",
        "serial" => "bigint",
        other => other,
    }
    .to_string();
    if data_type == "double" {
        c.eat_keyword("PRECISION");
    }
    if data_type == "char" && c.eat_keyword("VARYING") {
        data_type = "varchar".to_string();
    }

    let mut column_type = data_type.clone();
    if c.peek() == Some(&Token::LParen) {
        let args = c.parenthesized()?;
        column_type = format!("{data_type}({})", render_args(&args));
    } else if matches!(raw_type.as_str(), "bool" | "boolean") {
        column_type = "tinyint(1)".to_string();
    }

    let mut spec = ColumnSpec {
        name,
        data_type,
        nullable: true,
        ..Default::default()
    };
    if raw_type == "serial" {
        spec.unsigned = true;
        spec.nullable = false;
        spec.auto_increment = true;
        spec.unique = true;
    }

    let mut zerofill = false;
    let mut position = ColumnPosition::Unspecified;
    while let Some(token) = c.peek().cloned() {
        if token == Token::LParen {
            c.parenthesized()?;
            continue;
        }
        c.next();
        let word = match &token {
            Token::Word(w) if w.quote_style.is_none() => w.value.to_ascii_uppercase(),
            _ => continue,
        };
        match word.as_str() {
            "UNSIGNED" => spec.unsigned = true,
            "ZEROFILL" => {
                zerofill = true;
                spec.unsigned = true;
            }
            "NOT" => {
                if c.eat_keyword("NULL") {
                    spec.nullable = false;
                }
            }
            "NULL" => spec.nullable = true,
            "AUTO_INCREMENT" => spec.auto_increment = true,
            "PRIMARY" | "KEY" => {
                c.eat_keyword("KEY");
                spec.primary_key = true;
                spec.nullable = false;
            }
            "UNIQUE" => {
                c.eat_keyword("KEY");
                spec.unique = true;
            }
            "DEFAULT" | "COMMENT" | "COLLATE" | "CHARSET" => skip_value(c)?,
            "CHARACTER" => {
                c.eat_keyword("SET");
                skip_value(c)?;
            }
            "ON" => {
                if c.eat_keyword("UPDATE") {
                    skip_value(c)?;
                }
            }
            "FIRST" => position = ColumnPosition::First,
            "AFTER" => position = ColumnPosition::After(c.identifier()?),
            _ => {}
        }
    }

    if spec.unsigned {
        column_type.push_str(" unsigned");
    }
    if zerofill {
        column_type.push_str(" zerofill");
    }
    spec.column_type = column_type;
    Ok((spec, position))
}

/// Render type arguments the way `information_schema` shows them.
fn render_args(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|token| match token {
            Token::Number(n, _) => n.clone(),
            Token::SingleQuotedString(s) | Token::DoubleQuotedString(s) => {
                format!("'{}'", s.replace('\'', "''"))
            }
            Token::Word(w) => w.value.clone(),
            other => other.to_string(),
        })
        .collect()
}

/// Skip one attribute value such as `DEFAULT -1` or `DEFAULT now(6)`.
fn skip_value(c: &mut Cursor) -> Result<(), ClassifyError> {
    while c.eat(&Token::Minus) || c.eat(&Token::Plus) {}
    if c.peek() == Some(&Token::LParen) {
        c.parenthesized()?;
        return Ok(());
    }
    c.next();
    if c.peek() == Some(&Token::LParen) {
        c.parenthesized()?;
    }
    Ok(())
}

fn skip_index_type(c: &mut Cursor) -> Result<(), ClassifyError> {
    if c.eat_keyword("USING") {
        c.identifier()?;
    }
    Ok(())
}

/// Column names of a `( key_part, ... )` list, or `None` when a key part is
/// an expression.
fn key_parts(c: &mut Cursor) -> Result<Option<Vec<String>>, ClassifyError> {
    let inner = c.parenthesized()?;
    let mut columns = Vec::new();
    for part in split_top_level(&inner, &Token::Comma) {
        match part.first() {
            Some(Token::Word(w)) => columns.push(w.value.clone()),
            _ => return Ok(None),
        }
    }
    Ok((!columns.is_empty()).then_some(columns))
}

/// PRIMARY KEY / UNIQUE clauses. Other index and constraint kinds are
/// recognized and yield `None`.
fn parse_key_clause(c: &mut Cursor) -> Result<Option<KeySpec>, ClassifyError> {
    let mut constraint_name = None;
    if c.eat_keyword("CONSTRAINT")
        && !c.peek_any_keyword(&["PRIMARY", "UNIQUE", "FOREIGN", "CHECK"])
    {
        constraint_name = Some(c.identifier()?);
    }

    if c.eat_keyword("PRIMARY") {
        c.expect_keyword("KEY")?;
        skip_index_type(c)?;
        return Ok(key_parts(c)?.map(|columns| KeySpec {
            kind: KeyKind::Primary,
            name: None,
            columns,
        }));
    }

    if c.eat_keyword("UNIQUE") {
        c.eat_any_keyword(&["KEY", "INDEX"]);
        let mut name = constraint_name;
        if c.peek() != Some(&Token::LParen) && !c.peek_keyword("USING") {
            name = Some(c.identifier()?);
        }
        skip_index_type(c)?;
        return Ok(key_parts(c)?.map(|columns| KeySpec {
            kind: KeyKind::Unique,
            name,
            columns,
        }));
    }

    Ok(None)
}

// ============================================================================
// ALTER
// ============================================================================

fn parse_alter(c: &mut Cursor, database: &str) -> Result<Option<Statement>, ClassifyError> {
    c.eat_any_keyword(&["ONLINE", "OFFLINE"]);
    c.eat_keyword("IGNORE");

    if c.eat_keyword("TABLE") {
        c.eat_if_exists();
        let table = c.table_ref(database)?;
        let mut actions = Vec::new();
        for clause in split_top_level(&c.remaining(), &Token::Comma) {
            actions.extend(parse_alter_action(&mut Cursor::new(clause), database)?);
        }
        return Ok(Some(Statement::AlterTable(AlterTable { table, actions })));
    }

    if c.eat_any_keyword(&["DATABASE", "SCHEMA"]) {
        let option_words = [
            "DEFAULT",
            "CHARACTER",
            "CHARSET",
            "COLLATE",
            "ENCRYPTION",
            "READ",
            "UPGRADE",
            "COMMENT",
        ];
        let name = if c.at_end() || c.peek_any_keyword(&option_words) {
            database.to_string()
        } else {
            c.identifier()?
        };
        return Ok(Some(Statement::AlterDatabase(name)));
    }

    Ok(None)
}

fn parse_alter_action(c: &mut Cursor, database: &str) -> Result<Vec<AlterAction>, ClassifyError> {
    if c.eat_keyword("ADD") {
        if c.eat_keyword("COLUMN") {
            c.eat_if_not_exists();
            return parse_added_columns(c);
        }
        c.eat_if_not_exists();
        if c.peek_any_keyword(KEY_CLAUSE_WORDS) {
            return Ok(vec![parse_key_clause(c)?
                .map(AlterAction::AddKey)
                .unwrap_or(AlterAction::Other)]);
        }
        if c.peek_keyword("PARTITION") {
            return Ok(vec![AlterAction::Other]);
        }
        return parse_added_columns(c);
    }

    if c.eat_keyword("DROP") {
        if c.eat_keywords(&["PRIMARY", "KEY"]) {
            return Ok(vec![AlterAction::DropPrimaryKey]);
        }
        if c.eat_any_keyword(&["INDEX", "KEY", "CONSTRAINT"]) {
            c.eat_if_exists();
            return Ok(vec![AlterAction::DropIndex(c.identifier()?)]);
        }
        if c.peek_any_keyword(&["FOREIGN", "CHECK", "PARTITION", "PERIOD", "SYSTEM"]) {
            return Ok(vec![AlterAction::Other]);
        }
        c.eat_keyword("COLUMN");
        c.eat_if_exists();
        return Ok(vec![AlterAction::DropColumn(c.identifier()?)]);
    }

    if c.eat_keyword("MODIFY") {
        c.eat_keyword("COLUMN");
        c.eat_if_exists();
        let (column, position) = parse_column_spec(c)?;
        return Ok(vec![AlterAction::ModifyColumn { column, position }]);
    }

    if c.eat_keyword("CHANGE") {
        c.eat_keyword("COLUMN");
        c.eat_if_exists();
        let old_name = c.identifier()?;
        let (column, position) = parse_column_spec(c)?;
        return Ok(vec![AlterAction::ChangeColumn {
            old_name,
            column,
            position,
        }]);
    }

    if c.eat_keyword("RENAME") {
        if c.eat_keyword("COLUMN") {
            let from = c.identifier()?;
            c.expect_keyword("TO")?;
            let to = c.identifier()?;
            return Ok(vec![AlterAction::RenameColumn { from, to }]);
        }
        if c.eat_any_keyword(&["INDEX", "KEY"]) {
            let from = c.identifier()?;
            c.expect_keyword("TO")?;
            let to = c.identifier()?;
            return Ok(vec![AlterAction::RenameIndex { from, to }]);
        }
        c.eat_any_keyword(&["TO", "AS"]);
        return Ok(vec![AlterAction::RenameTable(c.table_ref(database)?)]);
    }

    Ok(vec![AlterAction::Other])
}

/// `ADD [COLUMN] col_def [FIRST | AFTER x]` or `ADD [COLUMN] (col_def, ...)`.
fn parse_added_columns(c: &mut Cursor) -> Result<Vec<AlterAction>, ClassifyError> {
    if c.peek() != Some(&Token::LParen) {
        let (column, position) = parse_column_spec(c)?;
        return Ok(vec![AlterAction::AddColumns {
            columns: vec![column],
            position,
        }]);
    }

    let inner = c.parenthesized()?;
    let mut columns = Vec::new();
    let mut actions = Vec::new();
    for element in split_top_level(&inner, &Token::Comma) {
        let mut e = Cursor::new(element);
        if e.peek_any_keyword(KEY_CLAUSE_WORDS) {
            actions.extend(parse_key_clause(&mut e)?.map(AlterAction::AddKey));
        } else {
            columns.push(parse_column_spec(&mut e)?.0);
        }
    }
    if columns.is_empty() && actions.is_empty() {
        return Err(c.unexpected("column definition"));
    }
    if !columns.is_empty() {
        actions.insert(
            0,
            AlterAction::AddColumns {
                columns,
                position: ColumnPosition::Unspecified,
            },
        );
    }
    Ok(actions)
}

// ============================================================================
// DROP / RENAME
// ============================================================================

fn parse_drop(c: &mut Cursor, database: &str) -> Result<Option<Statement>, ClassifyError> {
    c.eat_keyword("TEMPORARY");
    if c.eat_keyword("TABLE") {
        c.eat_if_exists();
        let mut tables = vec![c.table_ref(database)?];
        while c.eat(&Token::Comma) {
            tables.push(c.table_ref(database)?);
        }
        return Ok(Some(Statement::DropTable(tables)));
    }
    if c.eat_any_keyword(&["DATABASE", "SCHEMA"]) {
        c.eat_if_exists();
        return Ok(Some(Statement::DropDatabase(c.identifier()?)));
    }
    c.eat_any_keyword(&["ONLINE", "OFFLINE"]);
    if c.eat_keyword("INDEX") {
        c.eat_if_exists();
        let name = c.identifier()?;
        c.expect_keyword("ON")?;
        let table = c.table_ref(database)?;
        return Ok(Some(Statement::DropIndex(DropIndex { name, table })));
    }
    Ok(None)
}

fn parse_rename(c: &mut Cursor, database: &str) -> Result<Option<Statement>, ClassifyError> {
    if !c.eat_any_keyword(&["TABLE", "TABLES"]) {
        return Ok(None);
    }
    let mut pairs = Vec::new();
    loop {
        let from = c.table_ref(database)?;
        c.expect_keyword("TO")?;
        let to = c.table_ref(database)?;
        pairs.push((from, to));
        if !c.eat(&Token::Comma) {
            break;
        }
    }
    Ok(Some(Statement::RenameTable(pairs)))
}

// ============================================================================
// DML
// ============================================================================

fn dml(kind: StatementKind, tables: Vec<TableRef>) -> Statement {
    Statement::Dml(Dml { kind, tables })
}

fn parse_insert(
    c: &mut Cursor,
    database: &str,
    kind: StatementKind,
) -> Result<Statement, ClassifyError> {
    while c.eat_any_keyword(&["LOW_PRIORITY", "DELAYED", "HIGH_PRIORITY", "IGNORE"]) {}
    c.eat_keyword("INTO");
    Ok(dml(kind, vec![c.table_ref(database)?]))
}

fn parse_update(c: &mut Cursor, database: &str) -> Result<Statement, ClassifyError> {
    while c.eat_any_keyword(&["LOW_PRIORITY", "IGNORE"]) {}
    let tables = table_list(c, database, &["SET"])?;
    Ok(dml(StatementKind::Update, tables))
}

fn parse_delete(c: &mut Cursor, database: &str) -> Result<Statement, ClassifyError> {
    while c.eat_any_keyword(&["LOW_PRIORITY", "QUICK", "IGNORE"]) {}
    if !c.eat_keyword("FROM") {
        // multi-table form: the targets are aliases, the tables follow FROM
        skip_to_top_level_keyword(c, "FROM")?;
        c.eat_keyword("FROM");
    }
    let tables = table_list(c, database, &["WHERE", "USING", "ORDER", "LIMIT", "RETURNING"])?;
    Ok(dml(StatementKind::Delete, tables))
}

fn parse_load(c: &mut Cursor, database: &str) -> Result<Option<Statement>, ClassifyError> {
    if !c.eat_any_keyword(&["DATA", "XML"]) {
        return Ok(None);
    }
    while !c.at_end() && !c.eat_keywords(&["INTO", "TABLE"]) {
        c.next();
    }
    if c.at_end() {
        return Err(c.unexpected("INTO TABLE"));
    }
    Ok(Some(dml(StatementKind::LoadData, vec![c.table_ref(database)?])))
}

fn parse_select(c: &mut Cursor, database: &str) -> Result<Statement, ClassifyError> {
    skip_to_top_level_keyword(c, "FROM")?;
    let tables = if c.eat_keyword("FROM") {
        table_list(c, database, SELECT_STOP_WORDS)?
    } else {
        Vec::new()
    };
    Ok(dml(StatementKind::Select, tables))
}

fn skip_to_top_level_keyword(c: &mut Cursor, keyword: &str) -> Result<(), ClassifyError> {
    while let Some(token) = c.peek() {
        if is_keyword(token, keyword) {
            break;
        }
        if *token == Token::LParen {
            c.parenthesized()?;
        } else {
            c.next();
        }
    }
    Ok(())
}

/// Tables of a FROM-style list, following commas and JOINs and skipping
/// aliases, join conditions and derived tables.
fn table_list(
    c: &mut Cursor,
    database: &str,
    stop_words: &[&str],
) -> Result<Vec<TableRef>, ClassifyError> {
    let mut tables = Vec::new();
    let mut expect_table = true;
    while let Some(token) = c.peek() {
        if stop_words.iter().any(|w| is_keyword(token, w)) {
            break;
        }
        match token {
            Token::Comma => {
                c.next();
                expect_table = true;
            }
            Token::LParen => {
                c.parenthesized()?;
                expect_table = false;
            }
            t if is_keyword(t, "JOIN") || is_keyword(t, "STRAIGHT_JOIN") => {
                c.next();
                expect_table = true;
            }
            Token::Word(_) if expect_table => {
                tables.push(c.table_ref(database)?);
                expect_table = false;
            }
            _ => {
                c.next();
            }
        }
    }
    Ok(tables)
}
