//! MySQL -> SQLite column type mapping and collation clauses.
//!
//! Mapping happens in two passes. The base keyword of the source type is first
//! looked up in a fixed table of kinds SQLite understands directly. Anything
//! else is canonicalized by a [`SqlRewriter`] and run through a synonym table
//! (`DOUBLE PRECISION`, `FIXED`, ANSI and national character types, the TEXT
//! and BLOB families). Types that survive both passes become `TEXT`.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::traits::{SqlRewriter, TypeMapper, TypeMapping};
use crate::error::{MigrateError, Result};

static COLUMN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^(]+").unwrap());
static COLUMN_LENGTH_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\d+\)").unwrap());

/// Source kinds SQLite accepts verbatim.
const PASSTHROUGH_TYPES: &[&str] = &[
    "BIGINT",
    "BLOB",
    "BOOLEAN",
    "DATE",
    "DATETIME",
    "DECIMAL",
    "DOUBLE",
    "FLOAT",
    "INTEGER",
    "MEDIUMINT",
    "NUMERIC",
    "REAL",
    "SMALLINT",
    "TIME",
    "TINYINT",
    "YEAR",
];

/// Source kinds stored as raw bytes.
const BLOB_TYPES: &[&str] = &[
    "BIT",
    "BINARY",
    "BLOB",
    "LONGBLOB",
    "MEDIUMBLOB",
    "TINYBLOB",
    "VARBINARY",
];

/// Mapped types eligible for `INTEGER PRIMARY KEY AUTOINCREMENT`.
const INTEGER_TYPES: &[&str] = &[
    "INTEGER",
    "INTEGER UNSIGNED",
    "INT",
    "INT UNSIGNED",
    "BIGINT",
    "BIGINT UNSIGNED",
    "MEDIUMINT",
    "MEDIUMINT UNSIGNED",
    "SMALLINT",
    "SMALLINT UNSIGNED",
    "TINYINT",
    "TINYINT UNSIGNED",
    "NUMERIC",
];

/// Whether a mapped SQLite type belongs to the integer family.
pub fn is_integer_type(mapped: &str) -> bool {
    INTEGER_TYPES.contains(&mapped.to_uppercase().as_str())
}

/// Whether a type names one of the binary kinds.
pub fn is_blob_type(column_type: &str) -> bool {
    BLOB_TYPES.contains(&column_type.trim().to_uppercase().as_str())
}

/// `"(n)"` length suffix of a type string, or empty.
fn length_suffix(column_type: &str) -> String {
    COLUMN_LENGTH_PATTERN
        .find(column_type)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Map a canonical (upper-case) type through the synonym table.
fn resolve_synonym(canonical: &str) -> Option<String> {
    let base = canonical
        .split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches(" ZEROFILL")
        .trim_end_matches(" UNSIGNED")
        .trim()
        .to_string();
    let suffix = length_suffix(canonical);

    let mapped = match base.as_str() {
        "DOUBLE PRECISION" => "DOUBLE".to_string(),
        "FIXED" | "DEC" => "DECIMAL".to_string(),
        "CHARACTER VARYING" | "CHAR VARYING" | "VARCHAR" => format!("VARCHAR{}", suffix),
        "NATIONAL CHARACTER VARYING" | "NATIONAL CHAR VARYING" | "NATIONAL VARCHAR" | "NVARCHAR" => {
            format!("NVARCHAR{}", suffix)
        }
        "NATIONAL CHARACTER" | "NATIONAL CHAR" | "NCHAR" => format!("NCHAR{}", suffix),
        "CHARACTER" | "CHAR" => format!("CHARACTER{}", suffix),
        "INT" | "INTEGER" => "INTEGER".to_string(),
        "BOOL" | "BOOLEAN" => "BOOLEAN".to_string(),
        "TIMESTAMP" => "DATETIME".to_string(),
        b if PASSTHROUGH_TYPES.contains(&b) => b.to_string(),
        b if BLOB_TYPES.contains(&b) => "BLOB".to_string(),
        b if b.contains("TEXT")
            || b.contains("CHAR")
            || b.contains("CLOB")
            || b.contains("JSON")
            || b == "ENUM"
            || b == "SET" =>
        {
            "TEXT".to_string()
        }
        _ => return None,
    };
    Some(mapped)
}

/// Whether a mapped type has SQLite TEXT affinity.
fn is_textual(mapped: &str) -> bool {
    let upper = mapped.to_uppercase();
    upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT")
}

/// MySQL/MariaDB -> SQLite type mapper.
#[derive(Clone)]
pub struct MysqlToSqliteMapper {
    json1: bool,
    rewriter: Arc<dyn SqlRewriter>,
}

impl MysqlToSqliteMapper {
    /// Create a mapper. `json1` enables the native `JSON` type.
    pub fn new(json1: bool, rewriter: Arc<dyn SqlRewriter>) -> Self {
        Self { json1, rewriter }
    }

    fn canonical_fallback(&self, column_type: &str) -> TypeMapping {
        let canonical = self
            .rewriter
            .type_name(column_type)
            .unwrap_or_else(|| column_type.trim().to_uppercase());
        match resolve_synonym(&canonical) {
            Some(mapped) => TypeMapping::lossless(mapped),
            None => TypeMapping::lossy(
                "TEXT",
                format!("unrecognized type '{}' stored as TEXT", column_type),
            ),
        }
    }
}

impl std::fmt::Debug for MysqlToSqliteMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MysqlToSqliteMapper")
            .field("json1", &self.json1)
            .finish_non_exhaustive()
    }
}

impl TypeMapper for MysqlToSqliteMapper {
    fn map_type(&self, column_type: &str) -> Result<TypeMapping> {
        let trimmed = column_type.trim();
        let base = COLUMN_PATTERN
            .find(trimmed)
            .map(|m| m.as_str().trim())
            .filter(|b| !b.is_empty())
            .ok_or_else(|| MigrateError::InvalidColumnType(column_type.to_string()))?;

        let mut data_type = base.to_uppercase();
        for qualifier in [" ZEROFILL", " UNSIGNED"] {
            data_type = data_type.replace(qualifier, "");
        }

        let mapped = match data_type.as_str() {
            t if PASSTHROUGH_TYPES.contains(&t) => t.to_string(),
            "DOUBLE PRECISION" => "DOUBLE".to_string(),
            "FIXED" => "DECIMAL".to_string(),
            "CHARACTER VARYING" | "CHAR VARYING" => format!("VARCHAR{}", length_suffix(trimmed)),
            "NATIONAL CHARACTER VARYING" | "NATIONAL CHAR VARYING" | "NATIONAL VARCHAR" => {
                format!("NVARCHAR{}", length_suffix(trimmed))
            }
            "NATIONAL CHARACTER" => format!("NCHAR{}", length_suffix(trimmed)),
            t if BLOB_TYPES.contains(&t) => "BLOB".to_string(),
            "NCHAR" | "NVARCHAR" | "VARCHAR" => {
                format!("{}{}", data_type, length_suffix(trimmed))
            }
            "CHAR" => format!("CHARACTER{}", length_suffix(trimmed)),
            "INT" => "INTEGER".to_string(),
            "TIMESTAMP" => "DATETIME".to_string(),
            "JSON" if self.json1 => "JSON".to_string(),
            _ => return Ok(self.canonical_fallback(trimmed)),
        };
        Ok(TypeMapping::lossless(mapped))
    }
}

/// SQLite built-in collating sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Collation {
    #[default]
    Binary,
    Nocase,
    Rtrim,
}

impl Collation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collation::Binary => "BINARY",
            Collation::Nocase => "NOCASE",
            Collation::Rtrim => "RTRIM",
        }
    }
}

impl std::fmt::Display for Collation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Collation {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "BINARY" => Ok(Collation::Binary),
            "NOCASE" => Ok(Collation::Nocase),
            "RTRIM" => Ok(Collation::Rtrim),
            other => Err(MigrateError::Config(format!(
                "collation must be one of BINARY, NOCASE, RTRIM; got '{}'",
                other
            ))),
        }
    }
}

/// `COLLATE` clause for a column of mapped type `mapped`, or empty.
///
/// Only non-default collations on textual columns produce a clause.
pub fn collation_clause(collation: Collation, mapped: &str, rewriter: &dyn SqlRewriter) -> String {
    if collation == Collation::Binary || mapped.trim().is_empty() {
        return String::new();
    }
    let upper = mapped.to_uppercase();
    let clause = format!("COLLATE {}", collation);

    if ["CHARACTER", "NCHAR", "NVARCHAR", "TEXT", "VARCHAR"]
        .iter()
        .any(|p| upper.starts_with(p))
    {
        return clause;
    }
    if upper.contains("JSON") || upper.contains("BLOB") {
        return String::new();
    }
    if is_textual(&upper) {
        return clause;
    }
    match rewriter.type_name(mapped).and_then(|c| resolve_synonym(&c)) {
        Some(resolved) if is_textual(&resolved) => clause,
        _ => String::new(),
    }
}

/// SQLite storage class permitted in a `STRICT` table for a mapped type,
/// following SQLite's column affinity rules.
pub fn strict_storage_type(mapped: &str) -> &'static str {
    let upper = mapped.to_uppercase();
    if upper.contains("INT") {
        "INTEGER"
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        "TEXT"
    } else if upper.contains("BLOB") || upper.is_empty() {
        "BLOB"
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        "REAL"
    } else {
        "ANY"
    }
}
