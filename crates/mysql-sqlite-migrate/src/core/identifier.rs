//! Centralized identifier validation and quoting for SQL injection prevention.
//!
//! SQL identifiers (table names, column names, index names) cannot be passed as
//! parameters in prepared statements - only data values can be parameterized.
//! Every identifier that ends up inside generated SQL goes through this module:
//!
//! 1. Validate identifiers for suspicious patterns (null bytes, excessive length)
//! 2. Apply dialect-specific quoting (double quotes for SQLite, backticks for MySQL)
//! 3. Escape the quote character within the identifier by doubling it
//!
//! Names returned by MySQL introspection are treated as untrusted input: a table
//! called ``a`b`` or `a"b` must still produce a single well-formed identifier.

use crate::error::{MigrateError, Result};

/// Maximum identifier length accepted in generated SQL.
///
/// MySQL caps identifiers at 64 characters, but index names prefixed with
/// their table name can reach twice that.
const MAX_IDENTIFIER_LENGTH: usize = 256;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
///
/// # Errors
///
/// Returns `MigrateError::Config` for invalid identifiers with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a SQLite identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
/// Validates the identifier before quoting.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(quote_sqlite("users")?, "\"users\"");
/// assert_eq!(quote_sqlite("table\"name")?, "\"table\"\"name\"");
/// ```
pub fn quote_sqlite(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier using backticks.
///
/// Escapes backticks by doubling them and wraps in backticks.
/// Validates the identifier before quoting.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(quote_mysql("users")?, "`users`");
/// assert_eq!(quote_mysql("table`name")?, "`table``name`");
/// ```
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Quote and join a list of SQLite column names: `"a", "b"`.
pub fn quote_sqlite_list<S: AsRef<str>>(names: &[S]) -> Result<String> {
    let quoted = names
        .iter()
        .map(|n| quote_sqlite(n.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}

/// Quote and join a list of MySQL column names: `` `a`, `b` ``.
pub fn quote_mysql_list<S: AsRef<str>>(names: &[S]) -> Result<String> {
    let quoted = names
        .iter()
        .map(|n| quote_mysql(n.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}
