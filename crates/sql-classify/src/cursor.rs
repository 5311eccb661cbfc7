//! Token cursor over a whitespace-free token stream.

use crate::statement::TableRef;
use crate::ClassifyError;
use sqlparser::tokenizer::{Token, Word};

pub(crate) struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

/// An unquoted word matching `keyword` case-insensitively.
pub(crate) fn is_keyword(token: &Token, keyword: &str) -> bool {
    match token {
        Token::Word(Word {
            value,
            quote_style: None,
            ..
        }) => value.eq_ignore_ascii_case(keyword),
        _ => false,
    }
}

/// Split tokens on commas that are not nested inside parentheses.
pub(crate) fn split_top_level(tokens: &[Token], separator: &Token) -> Vec<Vec<Token>> {
    let mut parts = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            t if depth == 0 && t == separator => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(token.clone());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

impl Cursor {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    pub(crate) fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub(crate) fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| is_keyword(t, keyword))
    }

    pub(crate) fn peek_any_keyword(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.peek_keyword(k))
    }

    pub(crate) fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume a keyword sequence only if all of it is present.
    pub(crate) fn eat_keywords(&mut self, keywords: &[&str]) -> bool {
        let matched = keywords
            .iter()
            .enumerate()
            .all(|(i, k)| self.peek_nth(i).is_some_and(|t| is_keyword(t, k)));
        if matched {
            self.pos += keywords.len();
        }
        matched
    }

    pub(crate) fn eat_any_keyword(&mut self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.eat_keyword(k))
    }

    pub(crate) fn expect_keyword(&mut self, keyword: &str) -> Result<(), ClassifyError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    pub(crate) fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, token: &Token) -> Result<(), ClassifyError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ClassifyError {
        ClassifyError::Syntax {
            expected: expected.to_string(),
            found: self
                .peek()
                .map(ToString::to_string)
                .unwrap_or_else(|| "end of statement".to_string()),
        }
    }

    /// A quoted or unquoted identifier. Single-quoted names are accepted
    /// where MySQL allows them (index and constraint names).
    pub(crate) fn identifier(&mut self) -> Result<String, ClassifyError> {
        match self.peek() {
            Some(Token::Word(word)) => {
                let value = word.value.clone();
                self.pos += 1;
                Ok(value)
            }
            Some(Token::SingleQuotedString(s)) | Some(Token::DoubleQuotedString(s)) => {
                let value = s.clone();
                self.pos += 1;
                Ok(value)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// `[database.]table`, defaulting the database to `default_database`.
    pub(crate) fn table_ref(&mut self, default_database: &str) -> Result<TableRef, ClassifyError> {
        let first = self.identifier()?;
        if self.eat(&Token::Period) {
            let table = self.identifier()?;
            Ok(TableRef::new(first, table))
        } else {
            Ok(TableRef::new(default_database, first))
        }
    }

    pub(crate) fn eat_if_exists(&mut self) -> bool {
        self.eat_keywords(&["IF", "EXISTS"])
    }

    pub(crate) fn eat_if_not_exists(&mut self) -> bool {
        self.eat_keywords(&["IF", "NOT", "EXISTS"])
    }

    /// Consume a balanced `( ... )` group and return the tokens inside it.
    pub(crate) fn parenthesized(&mut self) -> Result<Vec<Token>, ClassifyError> {
        self.expect(&Token::LParen)?;
        let mut depth = 1usize;
        let mut inner = Vec::new();
        while let Some(token) = self.next() {
            match token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(inner);
                    }
                }
                _ => {}
            }
            inner.push(token);
        }
        Err(self.unexpected(")"))
    }

    pub(crate) fn remaining(&mut self) -> Vec<Token> {
        let rest = self.tokens[self.pos..].to_vec();
        self.pos = self.tokens.len();
        rest
    }
}
