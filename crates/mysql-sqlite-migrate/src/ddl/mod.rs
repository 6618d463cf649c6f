//! SQLite DDL generation from introspected MySQL metadata.
//!
//! [`SchemaBuilder`] turns a [`Table`] descriptor into a `CREATE TABLE`
//! statement plus its `CREATE INDEX` statements, and a view body into a
//! `CREATE VIEW` statement. It performs no I/O.

mod index_names;

pub use index_names::IndexNameRegistry;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::core::identifier::{quote_sqlite, quote_sqlite_list};
use crate::core::{Column, SqlRewriter, Table, TypeMapper};
use crate::dialect::{
    collation_clause, default_rewriter, is_integer_type, strict_storage_type, Collation,
    DefaultTranslator, MysqlToSqliteMapper, ViewTranspiler,
};
use crate::error::Result;

/// Destination-dependent switches for DDL generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchemaOptions {
    /// Collating sequence for textual columns.
    pub collation: Collation,
    /// Always prefix index names with the table name.
    pub prefix_indices: bool,
    /// Emit FOREIGN KEY clauses.
    pub foreign_keys: bool,
    /// Append `STRICT` and reduce column types to storage classes.
    pub strict: bool,
    /// Render boolean defaults as `DEFAULT(TRUE)`.
    pub boolean_literals: bool,
    /// Map `JSON` columns to `JSON` instead of `TEXT`.
    pub json1: bool,
}

/// Statements creating one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDdl {
    pub create_table: String,
    pub create_indexes: Vec<String>,
}

impl TableDdl {
    /// All statements, table first.
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.create_table.as_str())
            .chain(self.create_indexes.iter().map(String::as_str))
    }

    /// The statements as one script.
    pub fn script(&self) -> String {
        self.statements().collect::<Vec<_>>().join("\n")
    }
}

/// Builds SQLite DDL for tables and views of one source schema.
pub struct SchemaBuilder {
    options: SchemaOptions,
    mapper: MysqlToSqliteMapper,
    rewriter: Arc<dyn SqlRewriter>,
    views: ViewTranspiler,
}

impl SchemaBuilder {
    /// Builder for tables read from the MySQL database `schema`.
    pub fn new(schema: &str, options: SchemaOptions) -> Self {
        Self::with_rewriter(schema, options, Arc::new(default_rewriter()))
    }

    pub fn with_rewriter(
        schema: &str,
        options: SchemaOptions,
        rewriter: Arc<dyn SqlRewriter>,
    ) -> Self {
        Self {
            options,
            mapper: MysqlToSqliteMapper::new(options.json1, Arc::clone(&rewriter)),
            rewriter,
            views: ViewTranspiler::new(schema),
        }
    }

    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    /// Generate `CREATE TABLE` and `CREATE INDEX` statements for `table`.
    ///
    /// `source_tables` holds every table and view name of the source schema;
    /// an index whose name equals one of them is prefixed with its table name. Index
    /// names are allocated from `registry` unless prefixing is forced.
    pub fn build_table(
        &self,
        table: &Table,
        source_tables: &HashSet<String>,
        registry: &mut IndexNameRegistry,
    ) -> Result<TableDdl> {
        let table_ident = quote_sqlite(&table.name)?;
        let primary_key = table.primary_key();
        let single_pk = primary_key.len() == 1;

        let mut definitions = Vec::with_capacity(table.columns.len() + 1);
        let mut autoincrement = false;

        for column in &table.columns {
            let mapping = self.mapper.map_type(&column.column_type)?;
            if mapping.is_lossy {
                if let Some(w) = &mapping.warning {
                    warn!("{}.{}: {}", table.name, column.name, w);
                }
            }
            let mapped = mapping.target_type;
            if single_pk
                && column.is_auto_increment
                && primary_key.first() == Some(&column.name)
            {
                if is_integer_type(&mapped) {
                    definitions.push(format!(
                        "{} INTEGER PRIMARY KEY AUTOINCREMENT",
                        quote_sqlite(&column.name)?
                    ));
                    autoincrement = true;
                    continue;
                }
                warn!(
                    "Primary key \"{}\" in table \"{}\" is not an INTEGER type; AUTOINCREMENT dropped",
                    column.name, table.name
                );
            }
            definitions.push(self.column_definition(column, &mapped)?);
        }

        if !autoincrement && !primary_key.is_empty() {
            definitions.push(format!("PRIMARY KEY ({})", quote_sqlite_list(&primary_key)?));
        }

        if self.options.foreign_keys {
            for fk in &table.foreign_keys {
                definitions.push(format!(
                    "FOREIGN KEY({}) REFERENCES {} ({}) ON UPDATE {} ON DELETE {}",
                    quote_sqlite(&fk.column)?,
                    quote_sqlite(&fk.ref_table)?,
                    quote_sqlite(&fk.ref_column)?,
                    referential_action(&fk.on_update),
                    referential_action(&fk.on_delete),
                ));
            }
        }

        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n\t{}\n){};",
            table_ident,
            definitions.join(",\n\t"),
            if self.options.strict { " STRICT" } else { "" }
        );

        let mut create_indexes = Vec::new();
        for index in table.indexes.iter().filter(|i| !i.is_primary) {
            if index.columns.is_empty() {
                continue;
            }
            let proposed = if self.options.prefix_indices || source_tables.contains(&index.name) {
                format!("{}_{}", table.name, index.name)
            } else {
                index.name.clone()
            };
            let name = if self.options.prefix_indices {
                proposed
            } else {
                registry.claim(&proposed)
            };
            create_indexes.push(format!(
                "CREATE {}INDEX IF NOT EXISTS {} ON {} ({});",
                if index.is_unique { "UNIQUE " } else { "" },
                quote_sqlite(&name)?,
                table_ident,
                quote_sqlite_list(&index.columns)?
            ));
        }

        Ok(TableDdl {
            create_table,
            create_indexes,
        })
    }

    /// Generate `CREATE VIEW` for a view whose MySQL body is `select_sql`.
    pub fn build_view(&self, view_name: &str, select_sql: &str) -> Result<String> {
        self.views.transpile(view_name, select_sql)
    }

    fn column_definition(&self, column: &Column, mapped: &str) -> Result<String> {
        let defaults = DefaultTranslator::new(self.rewriter.as_ref(), self.options.boolean_literals);
        let column_type = if self.options.strict {
            strict_storage_type(mapped)
        } else {
            mapped
        };

        let mut parts = vec![
            quote_sqlite(&column.name)?,
            column_type.to_string(),
            if column.is_nullable { "NULL" } else { "NOT NULL" }.to_string(),
        ];
        let default =
            defaults.translate(column.default.as_ref(), mapped, column.default_is_expression);
        if !default.is_empty() {
            parts.push(default);
        }
        let collate = collation_clause(self.options.collation, mapped, self.rewriter.as_ref());
        if !collate.is_empty() {
            parts.push(collate);
        }
        Ok(parts.join(" "))
    }
}

impl std::fmt::Debug for SchemaBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("options", &self.options)
            .field("mapper", &self.mapper)
            .finish_non_exhaustive()
    }
}

/// Normalize a referential action; MySQL reports none as NULL.
fn referential_action(action: &str) -> String {
    let action = action.trim();
    if action.is_empty() {
        "NO ACTION".to_string()
    } else {
        action.to_uppercase()
    }
}

/// Map a single source type the same way [`SchemaBuilder`] does.
pub fn map_column_type(column_type: &str, json1: bool) -> Result<String> {
    let mapper = MysqlToSqliteMapper::new(json1, Arc::new(default_rewriter()));
    Ok(mapper.map_type(column_type)?.target_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ForeignKey, Index, RawDefault, TableKind};

    fn users() -> Table {
        let mut table = Table::new("users", TableKind::Table);
        table.columns = vec![
            Column {
                is_nullable: false,
                is_auto_increment: true,
                is_primary_key: true,
                ordinal_pos: 1,
                ..Column::new("id", "int(11)")
            },
            Column {
                default: Some(RawDefault::from("anon")),
                ordinal_pos: 2,
                ..Column::new("name", "varchar(50)")
            },
        ];
        table.indexes = vec![
            Index {
                name: "PRIMARY".into(),
                columns: vec!["id".into()],
                is_unique: true,
                is_primary: true,
            },
            Index {
                name: "name".into(),
                columns: vec!["name".into()],
                is_unique: true,
                is_primary: false,
            },
        ];
        table
    }

    fn tables(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_users_table() {
        let builder = SchemaBuilder::new("shop", SchemaOptions::default());
        let mut registry = IndexNameRegistry::new();
        let ddl = builder
            .build_table(&users(), &tables(&["users"]), &mut registry)
            .unwrap();

        assert_eq!(
            ddl.create_table,
            "CREATE TABLE IF NOT EXISTS \"users\" (\n\
             \t\"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n\
             \t\"name\" VARCHAR(50) NULL DEFAULT 'anon'\n\
             );"
        );
        assert_eq!(
            ddl.create_indexes,
            vec!["CREATE UNIQUE INDEX IF NOT EXISTS \"name\" ON \"users\" (\"name\");".to_string()]
        );
        assert!(ddl.script().starts_with("CREATE TABLE"));
        assert_eq!(ddl.statements().count(), 2);
    }

    #[test]
    fn test_composite_primary_key_is_trailing_clause() {
        let mut table = Table::new("order_items", TableKind::Table);
        table.columns = vec![
            Column {
                is_nullable: false,
                is_primary_key: true,
                ..Column::new("order_id", "bigint(20) unsigned")
            },
            Column {
                is_nullable: false,
                is_primary_key: true,
                ..Column::new("line", "smallint")
            },
        ];
        table.indexes = vec![Index {
            name: "PRIMARY".into(),
            columns: vec!["order_id".into(), "line".into()],
            is_unique: true,
            is_primary: true,
        }];

        let builder = SchemaBuilder::new("shop", SchemaOptions::default());
        let ddl = builder
            .build_table(&table, &HashSet::new(), &mut IndexNameRegistry::new())
            .unwrap();
        assert!(ddl.create_table.contains("\"order_id\" BIGINT NOT NULL"));
        assert!(ddl.create_table.contains("PRIMARY KEY (\"order_id\", \"line\")"));
        assert!(!ddl.create_table.contains("AUTOINCREMENT"));
        assert!(ddl.create_indexes.is_empty());
    }

    #[test]
    fn test_non_integer_auto_increment_keeps_column() {
        let mut table = Table::new("codes", TableKind::Table);
        table.columns = vec![Column {
            is_nullable: false,
            is_primary_key: true,
            is_auto_increment: true,
            ..Column::new("code", "decimal(10,0)")
        }];

        let builder = SchemaBuilder::new("shop", SchemaOptions::default());
        let ddl = builder
            .build_table(&table, &HashSet::new(), &mut IndexNameRegistry::new())
            .unwrap();
        assert!(ddl.create_table.contains("\"code\" DECIMAL NOT NULL"));
        assert!(ddl.create_table.contains("PRIMARY KEY (\"code\")"));
    }

    #[test]
    fn test_foreign_keys_only_when_enabled() {
        let mut table = Table::new("orders", TableKind::Table);
        table.columns = vec![Column::new("user_id", "int")];
        table.foreign_keys = vec![ForeignKey {
            column: "user_id".into(),
            ref_table: "users".into(),
            ref_column: "id".into(),
            on_update: "".into(),
            on_delete: "cascade".into(),
        }];

        let off = SchemaBuilder::new("shop", SchemaOptions::default());
        let ddl = off
            .build_table(&table, &HashSet::new(), &mut IndexNameRegistry::new())
            .unwrap();
        assert!(!ddl.create_table.contains("FOREIGN KEY"));

        let on = SchemaBuilder::new(
            "shop",
            SchemaOptions {
                foreign_keys: true,
                ..SchemaOptions::default()
            },
        );
        let ddl = on
            .build_table(&table, &HashSet::new(), &mut IndexNameRegistry::new())
            .unwrap();
        assert!(ddl.create_table.contains(
            "FOREIGN KEY(\"user_id\") REFERENCES \"users\" (\"id\") ON UPDATE NO ACTION ON DELETE CASCADE"
        ));
    }

    #[test]
    fn test_index_names_across_tables() {
        let builder = SchemaBuilder::new("shop", SchemaOptions::default());
        let mut registry = IndexNameRegistry::new();
        let source = tables(&["users", "admins", "name"]);

        let mut admins = users();
        admins.name = "admins".into();
        let mut other = users();
        other.name = "staff".into();
        other.indexes[1].name = "staff_idx".into();

        // "name" collides with a table name, so it is prefixed.
        let first = builder.build_table(&users(), &source, &mut registry).unwrap();
        assert!(first.create_indexes[0].contains("\"users_name\""));
        let second = builder.build_table(&admins, &source, &mut registry).unwrap();
        assert!(second.create_indexes[0].contains("\"admins_name\""));

        let mut dup = users();
        dup.name = "users_copy".into();
        dup.indexes[1].name = "staff_idx".into();
        builder.build_table(&other, &source, &mut registry).unwrap();
        let third = builder.build_table(&dup, &source, &mut registry).unwrap();
        assert!(third.create_indexes[0].contains("\"staff_idx_2\""));
    }

    #[test]
    fn test_prefix_indices_skips_registry() {
        let builder = SchemaBuilder::new(
            "shop",
            SchemaOptions {
                prefix_indices: true,
                ..SchemaOptions::default()
            },
        );
        let mut registry = IndexNameRegistry::new();
        let ddl = builder
            .build_table(&users(), &tables(&["users"]), &mut registry)
            .unwrap();
        assert!(ddl.create_indexes[0].contains("\"users_name\""));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_strict_and_collation() {
        let builder = SchemaBuilder::new(
            "shop",
            SchemaOptions {
                strict: true,
                collation: Collation::Nocase,
                ..SchemaOptions::default()
            },
        );
        let ddl = builder
            .build_table(&users(), &HashSet::new(), &mut IndexNameRegistry::new())
            .unwrap();
        assert!(ddl.create_table.ends_with(") STRICT;"));
        assert!(ddl
            .create_table
            .contains("\"name\" TEXT NULL DEFAULT 'anon' COLLATE NOCASE"));
        assert!(ddl.create_table.contains("INTEGER PRIMARY KEY AUTOINCREMENT"));
    }

    #[test]
    fn test_unknown_type_is_stored_as_text() {
        let mut table = Table::new("places", TableKind::Table);
        table.columns = vec![Column::new("shape", "geometry")];
        let builder = SchemaBuilder::new("shop", SchemaOptions::default());
        let ddl = builder
            .build_table(&table, &HashSet::new(), &mut IndexNameRegistry::new())
            .unwrap();
        assert!(ddl.create_table.contains("\"shape\" TEXT NULL"), "{}", ddl.create_table);
    }

    #[test]
    fn test_invalid_column_type_propagates() {
        let mut table = Table::new("bad", TableKind::Table);
        table.columns = vec![Column::new("c", "(11)")];
        let builder = SchemaBuilder::new("shop", SchemaOptions::default());
        assert!(builder
            .build_table(&table, &HashSet::new(), &mut IndexNameRegistry::new())
            .is_err());
    }

    #[test]
    fn test_build_view_and_map_column_type() {
        let builder = SchemaBuilder::new("shop", SchemaOptions::default());
        let sql = builder.build_view("v", "select `shop`.`t`.`a` AS `a` from `shop`.`t`").unwrap();
        assert!(sql.starts_with("CREATE VIEW IF NOT EXISTS \"v\" AS\n"));
        assert!(!sql.contains("shop"));

        assert_eq!(map_column_type("json", false).unwrap(), "TEXT");
        assert_eq!(map_column_type("json", true).unwrap(), "JSON");
    }
}
