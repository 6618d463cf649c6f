//! Row value types crossing the MySQL -> SQLite boundary.
//!
//! The MySQL reader produces [`SqlValue`]s where numeric columns are already
//! decoded and everything else is left as raw bytes. Before a row is bound to
//! the SQLite insert statement each cell passes through [`encode_cell`], which
//! makes a single UTF-8 decode attempt and tags the result as text or binary.

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Integer value.
    Integer(i64),

    /// Floating point value.
    Real(f64),

    /// Text value.
    Text(String),

    /// Opaque bytes.
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// Outcome of encoding a raw byte cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedCell {
    /// The bytes were valid UTF-8.
    Text(String),
    /// The bytes are kept as an opaque blob.
    Binary(Vec<u8>),
}

impl EncodedCell {
    /// Decode bytes as UTF-8 once; keep them as binary if that fails.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => EncodedCell::Text(text),
            Err(err) => EncodedCell::Binary(err.into_bytes()),
        }
    }
}

impl From<EncodedCell> for SqlValue {
    fn from(cell: EncodedCell) -> Self {
        match cell {
            EncodedCell::Text(s) => SqlValue::Text(s),
            EncodedCell::Binary(b) => SqlValue::Blob(b),
        }
    }
}

/// Normalize one source cell for insertion into SQLite.
pub fn encode_cell(value: SqlValue) -> SqlValue {
    match value {
        SqlValue::Blob(bytes) => EncodedCell::from_bytes(bytes).into(),
        other => other,
    }
}

/// Normalize every cell of a row.
pub fn encode_row(row: Vec<SqlValue>) -> Vec<SqlValue> {
    row.into_iter().map(encode_cell).collect()
}
