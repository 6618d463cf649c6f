//! Translation of MySQL column defaults into SQLite `DEFAULT` clauses.
//!
//! [`DefaultTranslator::translate`] is total: any default it cannot express
//! structurally degrades to a quoted string literal.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::schema::RawDefault;
use crate::core::traits::SqlRewriter;

use super::typemap::is_blob_type;

/// MySQL character set names usable as `_charset` literal introducers.
const CHARSET_INTRODUCERS: &[&str] = &[
    "armscii8", "ascii", "big5", "binary", "cp1250", "cp1251", "cp1256", "cp1257", "cp850",
    "cp852", "cp866", "cp932", "dec8", "eucjpms", "euckr", "gb18030", "gb2312", "gbk",
    "geostd8", "greek", "hebrew", "hp8", "keybcs2", "koi8r", "koi8u", "latin1", "latin2",
    "latin5", "latin7", "macce", "macroman", "sjis", "swe7", "tis620", "ucs2", "ujis",
    "utf16", "utf16le", "utf32", "utf8", "utf8mb3", "utf8mb4",
];

static CALL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z_]+)\s*(\(\s*\d*\s*\))?\s*$").unwrap());
static HEX_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[Xx]'[0-9A-Fa-f]+'$").unwrap());
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").unwrap());
static ARITHMETIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d\.\s\+\-\*/\(\)]+$").unwrap());

/// SQLite keyword for a MySQL current date/time default, if `text` is one.
///
/// Keyword forms match with or without empty (or precision) parentheses;
/// function synonyms such as `now()` only match when called.
pub fn current_time_keyword(text: &str) -> Option<&'static str> {
    let caps = CALL_SHAPE.captures(text)?;
    let name = caps[1].to_lowercase();
    let called = caps.get(2).is_some();
    match name.as_str() {
        "current_timestamp" | "localtimestamp" | "localtime" => Some("CURRENT_TIMESTAMP"),
        "now" if called => Some("CURRENT_TIMESTAMP"),
        "current_time" => Some("CURRENT_TIME"),
        "curtime" if called => Some("CURRENT_TIME"),
        "current_date" => Some("CURRENT_DATE"),
        "curdate" if called => Some("CURRENT_DATE"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiteralForm {
    Bit,
    Hex,
    Plain,
}

/// A literal carrying a charset introducer, e.g. `_utf8mb4 b'0101'`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Introduced {
    form: LiteralForm,
    body: String,
}

fn starts_with_quote(s: &str) -> bool {
    s.starts_with('\'') || s.starts_with("\\'")
}

fn split_introducer(text: &str) -> Option<Introduced> {
    let rest = text.strip_prefix('_')?;
    let name_len = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());
    if !CHARSET_INTRODUCERS.contains(&rest[..name_len].to_lowercase().as_str()) {
        return None;
    }
    let rest = rest[name_len..].trim_start();
    let (form, rest) = match rest.chars().next() {
        Some('b' | 'B') if starts_with_quote(&rest[1..]) => (LiteralForm::Bit, &rest[1..]),
        Some('x' | 'X') if starts_with_quote(&rest[1..]) => (LiteralForm::Hex, &rest[1..]),
        _ => (LiteralForm::Plain, rest),
    };
    let body = rest.replace("\\'", "").replace('\'', "").trim().to_string();
    Some(Introduced { form, body })
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn is_quoted(text: &str) -> bool {
    text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'')
}

fn is_parenthesized(text: &str) -> bool {
    text.len() >= 2 && text.starts_with('(') && text.ends_with(')')
}

fn is_arithmetic(text: &str) -> bool {
    ARITHMETIC.is_match(text) && text.chars().any(|c| c.is_ascii_digit())
}

/// Renders `DEFAULT` clauses for one destination.
pub struct DefaultTranslator<'a> {
    rewriter: &'a dyn SqlRewriter,
    boolean_literals: bool,
}

impl<'a> DefaultTranslator<'a> {
    /// `boolean_literals` enables `DEFAULT(TRUE)` (SQLite >= 3.23.0).
    pub fn new(rewriter: &'a dyn SqlRewriter, boolean_literals: bool) -> Self {
        Self {
            rewriter,
            boolean_literals,
        }
    }

    /// Translate a source default for a column whose mapped SQLite type is
    /// `mapped_type`. `is_expression` is set when the source marks the
    /// default as computed rather than literal. Returns an empty string when
    /// there is no default.
    pub fn translate(
        &self,
        default: Option<&RawDefault>,
        mapped_type: &str,
        is_expression: bool,
    ) -> String {
        match default {
            None => String::new(),
            Some(RawDefault::Bool(value)) => self.boolean(*value, mapped_type),
            Some(RawDefault::Binary(bytes)) if is_blob_type(mapped_type) => {
                self.binary(bytes, is_expression)
            }
            Some(RawDefault::Binary(bytes)) => match std::str::from_utf8(bytes) {
                Ok(text) => self.text(text, mapped_type, is_expression),
                Err(_) => format!("DEFAULT x'{}'", hex(bytes)),
            },
            Some(RawDefault::Text(text)) => self.text(text, mapped_type, is_expression),
        }
    }

    fn boolean(&self, value: bool, mapped_type: &str) -> String {
        if self.boolean_literals && mapped_type.eq_ignore_ascii_case("BOOLEAN") {
            if value {
                "DEFAULT(TRUE)".to_string()
            } else {
                "DEFAULT(FALSE)".to_string()
            }
        } else {
            format!("DEFAULT '{}'", u8::from(value))
        }
    }

    fn binary(&self, bytes: &[u8], is_expression: bool) -> String {
        if is_expression {
            if let Some(intro) = std::str::from_utf8(bytes).ok().and_then(split_introducer) {
                return match intro.form {
                    LiteralForm::Bit => self
                        .bit_literal(&intro.body)
                        .unwrap_or_else(|| format!("DEFAULT x'{}'", hex(intro.body.as_bytes()))),
                    LiteralForm::Hex => format!("DEFAULT x'{}'", intro.body),
                    LiteralForm::Plain => format!("DEFAULT x'{}'", hex(intro.body.as_bytes())),
                };
            }
        }
        format!("DEFAULT x'{}'", hex(bytes))
    }

    fn bit_literal(&self, bits: &str) -> Option<String> {
        let code = u32::from_str_radix(bits, 2).ok()?;
        let ch = char::from_u32(code)?;
        Some(format!("DEFAULT {}", quote_literal(&ch.to_string())))
    }

    fn text(&self, text: &str, mapped_type: &str, is_expression: bool) -> String {
        if let Some(keyword) = current_time_keyword(text) {
            return format!("DEFAULT {}", keyword);
        }

        if is_expression {
            if let Some(intro) = split_introducer(text) {
                let rendered = match intro.form {
                    LiteralForm::Bit => self.bit_literal(&intro.body),
                    LiteralForm::Hex if intro.body.chars().all(|c| c.is_ascii_hexdigit()) => {
                        Some(format!("DEFAULT x'{}'", intro.body))
                    }
                    LiteralForm::Hex => None,
                    LiteralForm::Plain => Some(format!("DEFAULT {}", quote_literal(&intro.body))),
                };
                if let Some(clause) = rendered {
                    return clause;
                }
            }
            if let Some(clause) = self.rewritten_expression(text, mapped_type) {
                return clause;
            }
        }

        let stripped = text.trim();
        if stripped.starts_with('\'') || is_parenthesized(stripped) {
            if let Some(literal) = self.rewriter.literal(text) {
                return format!("DEFAULT {}", literal);
            }
        }

        format!("DEFAULT {}", quote_literal(&text.replace("\\'", "'")))
    }

    /// Accept a rewritten expression only when it is a shape SQLite takes
    /// verbatim in a column definition.
    fn rewritten_expression(&self, text: &str, mapped_type: &str) -> Option<String> {
        let rewritten = self.rewriter.rewrite(text)?;
        let norm = rewritten.trim().trim_end_matches(';').trim();
        let upper = norm.to_uppercase();

        if let Some(keyword) = current_time_keyword(norm) {
            return Some(format!("DEFAULT {}", keyword));
        }
        if upper == "NULL" {
            return Some("DEFAULT NULL".to_string());
        }
        if HEX_LITERAL.is_match(norm) {
            return Some(format!("DEFAULT {}", norm));
        }
        if upper == "TRUE" || upper == "FALSE" {
            return Some(self.boolean(upper == "TRUE", mapped_type));
        }
        if is_parenthesized(norm) {
            let inner = norm[1..norm.len() - 1].trim();
            if is_quoted(inner) || NUMBER.is_match(inner) {
                return Some(format!("DEFAULT {}", inner));
            }
            if is_arithmetic(norm) {
                return Some(format!("DEFAULT {}", norm));
            }
        }
        if is_quoted(norm) || NUMBER.is_match(norm) {
            return Some(format!("DEFAULT {}", norm));
        }
        if is_arithmetic(norm) {
            return Some(format!("DEFAULT ({})", norm));
        }
        None
    }
}
