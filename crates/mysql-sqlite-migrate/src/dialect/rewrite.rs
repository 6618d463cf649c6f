//! MySQL -> SQLite rewriting of expression and type fragments.
//!
//! Two stages implement [`SqlRewriter`]:
//!
//! - [`StructuralRewriter`] parses the fragment with `sqlparser`'s MySQL dialect
//!   and re-renders the AST. It handles MySQL string escapes, hex literals,
//!   and type synonyms.
//! - [`TextualRewriter`] recognizes a handful of literal shapes with regular
//!   expressions. It is used when the parser rejects a fragment.
//!
//! [`FallbackRewriter`] chains the two. None of them ever fail; `None` means
//! the fragment was not understood.

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::ast::{Expr, UnaryOperator};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use crate::core::traits::SqlRewriter;

static SINGLE_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^'(?:[^'\\]|''|\\.)*'$").unwrap());
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-+]?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?$").unwrap());
static HEX_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[Xx]'[0-9A-Fa-f]*'$").unwrap());
static HEX_0X: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x([0-9A-Fa-f]+)$").unwrap());
static TYPE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9 ]*(?:\s*\(.*\))?(?:\s+[A-Za-z ]+)?$").unwrap());

/// Parse a complete scalar expression, rejecting trailing input.
fn parse_expr(sql: &str) -> Option<Expr> {
    let dialect = MySqlDialect {};
    let mut parser = Parser::new(&dialect).try_with_sql(sql).ok()?;
    let expr = parser.parse_expr().ok()?;
    if parser.peek_token().token != Token::EOF {
        return None;
    }
    Some(expr)
}

/// Re-render a MySQL double-quoted string as a SQLite single-quoted one.
fn requote_double_quoted(rendered: String) -> String {
    if rendered.len() >= 2 && rendered.starts_with('"') && rendered.ends_with('"') {
        let inner = rendered[1..rendered.len() - 1].replace("\"\"", "\"");
        format!("'{}'", inner.replace('\'', "''"))
    } else {
        rendered
    }
}

fn is_literal(expr: &Expr) -> bool {
    match expr {
        Expr::Value(_) => true,
        Expr::UnaryOp {
            op: UnaryOperator::Minus | UnaryOperator::Plus,
            expr,
        } => matches!(expr.as_ref(), Expr::Value(_)),
        _ => false,
    }
}

/// `sqlparser`-backed rewriter.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralRewriter;

impl SqlRewriter for StructuralRewriter {
    fn rewrite(&self, expr: &str) -> Option<String> {
        let parsed = parse_expr(expr.trim())?;
        Some(requote_double_quoted(parsed.to_string()))
    }

    fn literal(&self, expr: &str) -> Option<String> {
        let parsed = parse_expr(expr.trim())?;
        let inner = match parsed {
            Expr::Nested(inner) => *inner,
            other => other,
        };
        if is_literal(&inner) {
            Some(requote_double_quoted(inner.to_string()))
        } else {
            None
        }
    }

    fn type_name(&self, column_type: &str) -> Option<String> {
        match parse_expr(&format!("CAST(NULL AS {})", column_type.trim()))? {
            Expr::Cast { data_type, .. } => Some(data_type.to_string().to_uppercase()),
            _ => None,
        }
    }
}

/// Regex-backed rewriter for fragments the parser cannot handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextualRewriter;

impl TextualRewriter {
    fn simple_literal(text: &str) -> Option<String> {
        if SINGLE_QUOTED.is_match(text) {
            let inner = &text[1..text.len() - 1];
            let unescaped = inner.replace("\\'", "'").replace("''", "'");
            return Some(format!("'{}'", unescaped.replace('\'', "''")));
        }
        if NUMBER.is_match(text) || HEX_LITERAL.is_match(text) {
            return Some(text.to_string());
        }
        if let Some(caps) = HEX_0X.captures(text) {
            return Some(format!("X'{}'", &caps[1]));
        }
        let upper = text.to_uppercase();
        if matches!(upper.as_str(), "NULL" | "TRUE" | "FALSE") {
            return Some(upper);
        }
        None
    }
}

impl SqlRewriter for TextualRewriter {
    fn rewrite(&self, expr: &str) -> Option<String> {
        let text = expr.trim().trim_end_matches(';').trim();
        Self::simple_literal(text)
    }

    fn literal(&self, expr: &str) -> Option<String> {
        let mut text = expr.trim();
        if text.starts_with('(') && text.ends_with(')') && text.len() >= 2 {
            text = text[1..text.len() - 1].trim();
        }
        Self::simple_literal(text)
    }

    fn type_name(&self, column_type: &str) -> Option<String> {
        let collapsed = column_type.split_whitespace().collect::<Vec<_>>().join(" ");
        if TYPE_NAME.is_match(&collapsed) {
            Some(collapsed.to_uppercase())
        } else {
            None
        }
    }
}

/// Try `primary` first and fall back to `fallback` when it has no answer.
#[derive(Debug, Clone, Default)]
pub struct FallbackRewriter<P, F> {
    primary: P,
    fallback: F,
}

impl<P: SqlRewriter, F: SqlRewriter> FallbackRewriter<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: SqlRewriter, F: SqlRewriter> SqlRewriter for FallbackRewriter<P, F> {
    fn rewrite(&self, expr: &str) -> Option<String> {
        self.primary
            .rewrite(expr)
            .or_else(|| self.fallback.rewrite(expr))
    }

    fn literal(&self, expr: &str) -> Option<String> {
        self.primary
            .literal(expr)
            .or_else(|| self.fallback.literal(expr))
    }

    fn type_name(&self, column_type: &str) -> Option<String> {
        self.primary
            .type_name(column_type)
            .or_else(|| self.fallback.type_name(column_type))
    }
}

/// The rewriter used by default: structural parsing with a regex fallback.
pub type DefaultRewriter = FallbackRewriter<StructuralRewriter, TextualRewriter>;

pub fn default_rewriter() -> DefaultRewriter {
    FallbackRewriter::new(StructuralRewriter, TextualRewriter)
}
