//! MySQL view bodies -> SQLite `CREATE VIEW` statements.
//!
//! Bodies are parsed to drop source-schema qualifiers, then re-tokenized so
//! identifiers use SQLite quoting.

use std::ops::ControlFlow;

use regex::Regex;
use sqlparser::ast::{visit_expressions_mut, visit_relations_mut, Expr, Statement};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use tracing::debug;

use crate::core::identifier::quote_sqlite;
use crate::error::Result;

/// Rewrites view bodies so they no longer reference the source schema.
#[derive(Debug, Clone)]
pub struct ViewTranspiler {
    schema: String,
}

impl ViewTranspiler {
    /// `schema` is the MySQL database the views were read from.
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    /// Build `CREATE VIEW IF NOT EXISTS "<name>" AS <body>;`.
    pub fn transpile(&self, view_name: &str, select_sql: &str) -> Result<String> {
        let cleaned = select_sql.trim().trim_end_matches(';').trim_end();
        let body = match self.structural(cleaned) {
            Some(sql) => sql,
            None => {
                debug!("View {} did not parse, stripping schema qualifiers textually", view_name);
                self.textual(cleaned)
            }
        };
        let body = sqlite_tokens(&body).unwrap_or(body);
        Ok(format!(
            "CREATE VIEW IF NOT EXISTS {} AS\n{};",
            quote_sqlite(view_name)?,
            body
        ))
    }

    fn is_source_schema(&self, qualifier: &str) -> bool {
        qualifier
            .trim_matches(|c| c == '`' || c == '"')
            .eq_ignore_ascii_case(&self.schema)
    }

    fn structural(&self, sql: &str) -> Option<String> {
        let mut statements = Parser::parse_sql(&MySqlDialect {}, sql).ok()?;
        if statements.len() != 1 || !matches!(statements[0], Statement::Query(_)) {
            return None;
        }
        let statement = &mut statements[0];

        let _ = visit_relations_mut(statement, |name| {
            if name.0.len() >= 2 && self.is_source_schema(&name.0[0].to_string()) {
                name.0.remove(0);
            }
            ControlFlow::<()>::Continue(())
        });
        let _ = visit_expressions_mut(statement, |expr| {
            if let Expr::CompoundIdentifier(idents) = expr {
                if idents.len() >= 3 && self.is_source_schema(&idents[0].value) {
                    idents.remove(0);
                }
            }
            ControlFlow::<()>::Continue(())
        });

        Some(statement.to_string())
    }

    fn textual(&self, sql: &str) -> String {
        let schema = regex::escape(&self.schema);
        let mut stripped = sql.to_string();
        for pattern in [
            format!(r"(?i)`{}`\.", schema),
            format!(r#"(?i)"{}"\."#, schema),
            format!(r"(?i)\b{}\.", schema),
        ] {
            if let Ok(re) = Regex::new(&pattern) {
                stripped = re.replace_all(&stripped, "").into_owned();
            }
        }
        stripped
    }
}

/// Re-emit MySQL tokens for SQLite: backtick-quoted identifiers become
/// double-quoted and `IF(` becomes `IIF(`. `None` when the text does not
/// tokenize.
fn sqlite_tokens(sql: &str) -> Option<String> {
    let tokens = Tokenizer::new(&MySqlDialect {}, sql)
        .with_unescape(false)
        .tokenize()
        .ok()?;

    let mut out = String::with_capacity(sql.len());
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Word(word)
                if word.quote_style == Some('`')
                    && !word.value.contains(['`', '"']) =>
            {
                out.push('"');
                out.push_str(&word.value);
                out.push('"');
            }
            Token::Word(word)
                if word.quote_style.is_none()
                    && word.value.eq_ignore_ascii_case("if")
                    && next_significant(&tokens[i + 1..]) == Some(&Token::LParen) =>
            {
                out.push_str("IIF");
            }
            other => out.push_str(&other.to_string()),
        }
    }
    Some(out)
}

fn next_significant(tokens: &[Token]) -> Option<&Token> {
    tokens
        .iter()
        .find(|t| !matches!(t, Token::Whitespace(_)))
}
