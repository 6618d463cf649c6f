//! Schema and metadata types for tables, views, columns, indexes, and foreign keys.
//!
//! These descriptors are built fresh from live MySQL introspection on every run,
//! consumed once to emit SQLite DDL, and then discarded.

use serde::{Deserialize, Serialize};

/// Whether a source object is a base table or a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Table,
    View,
}

impl TableKind {
    /// Classify an `information_schema.TABLES.TABLE_TYPE` value.
    pub fn from_table_type(table_type: &str) -> Self {
        if table_type.eq_ignore_ascii_case("VIEW") {
            TableKind::View
        } else {
            TableKind::Table
        }
    }
}

/// A source object name together with its kind, as returned by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
    pub kind: TableKind,
}

impl TableRef {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TableKind::Table,
        }
    }

    pub fn view(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TableKind::View,
        }
    }

    pub fn is_view(&self) -> bool {
        self.kind == TableKind::View
    }
}

/// A column default exactly as the source reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawDefault {
    /// Textual default (literal or expression text).
    Text(String),
    /// Boolean default.
    Bool(bool),
    /// Raw bytes, typically from a binary-typed column.
    Binary(Vec<u8>),
}

impl From<&str> for RawDefault {
    fn from(v: &str) -> Self {
        RawDefault::Text(v.to_string())
    }
}

/// Column metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Full source type string (e.g., "int(11) unsigned", "varchar(50)").
    pub column_type: String,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Raw default value, if any.
    pub default: Option<RawDefault>,

    /// Whether the source marks the default as an expression rather than a literal.
    pub default_is_expression: bool,

    /// Whether the column is AUTO_INCREMENT.
    pub is_auto_increment: bool,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,
}

impl Column {
    /// Create a nullable column with no default.
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            is_nullable: true,
            default: None,
            default_is_expression: false,
            is_auto_increment: false,
            is_primary_key: false,
            ordinal_pos: 0,
        }
    }

    /// Lowercased base keyword of the source type ("int(11) unsigned" -> "int").
    pub fn base_type(&self) -> String {
        self.column_type
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    /// Whether the source type stores raw bytes.
    pub fn is_binary(&self) -> bool {
        matches!(
            self.base_type().as_str(),
            "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "bit"
        )
    }
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name as reported by the source.
    pub name: String,

    /// Indexed column names, in key order.
    pub columns: Vec<String>,

    /// Whether the index is unique.
    pub is_unique: bool,

    /// Whether this is the primary key.
    pub is_primary: bool,
}

/// Foreign key metadata for a single owning column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Owning column.
    pub column: String,

    /// Referenced table name.
    pub ref_table: String,

    /// Referenced column name.
    pub ref_column: String,

    /// ON UPDATE action.
    pub on_update: String,

    /// ON DELETE action.
    pub on_delete: String,
}

/// Table or view metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Object kind.
    pub kind: TableKind,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,

    /// Indexes, including the primary key.
    pub indexes: Vec<Index>,

    /// Foreign key constraints.
    pub foreign_keys: Vec<ForeignKey>,

    /// SELECT body for views.
    pub view_definition: Option<String>,
}

impl Table {
    pub fn new(name: impl Into<String>, kind: TableKind) -> Self {
        Self {
            name: name.into(),
            kind,
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            view_definition: None,
        }
    }

    /// Primary key column names, from the primary index or, failing that,
    /// the per-column key flags.
    pub fn primary_key(&self) -> Vec<String> {
        if let Some(pk) = self.indexes.iter().find(|i| i.is_primary) {
            return pk.columns.clone();
        }
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk_column(name: &str) -> Column {
        Column {
            is_primary_key: true,
            is_nullable: false,
            ..Column::new(name, "int(11)")
        }
    }

    #[test]
    fn test_table_kind_from_table_type() {
        assert_eq!(TableKind::from_table_type("BASE TABLE"), TableKind::Table);
        assert_eq!(TableKind::from_table_type("VIEW"), TableKind::View);
        assert_eq!(TableKind::from_table_type("view"), TableKind::View);
    }

    #[test]
    fn test_base_type() {
        assert_eq!(Column::new("a", "int(11) unsigned").base_type(), "int");
        assert_eq!(Column::new("a", "VARCHAR(50)").base_type(), "varchar");
        assert_eq!(Column::new("a", "double precision").base_type(), "double");
        assert!(Column::new("a", "varbinary(16)").is_binary());
        assert!(Column::new("a", "bit(1)").is_binary());
        assert!(!Column::new("a", "text").is_binary());
    }

    #[test]
    fn test_primary_key_prefers_index() {
        let mut table = Table::new("orders", TableKind::Table);
        table.columns = vec![pk_column("a"), pk_column("b")];
        assert_eq!(table.primary_key(), vec!["a", "b"]);

        table.indexes.push(Index {
            name: "PRIMARY".into(),
            columns: vec!["b".into(), "a".into()],
            is_unique: true,
            is_primary: true,
        });
        assert_eq!(table.primary_key(), vec!["b", "a"]);
    }
}
