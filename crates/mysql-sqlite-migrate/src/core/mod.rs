//! Core abstractions shared by every stage of the migration.
//!
//! - [`schema`]: table, column, index, and foreign key descriptors
//! - [`value`]: cell values and the byte-to-text encode step
//! - [`traits`]: the source reader, type mapper, and SQL rewriter seams
//! - [`identifier`]: identifier validation and quoting for both dialects

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{Column, ForeignKey, Index, RawDefault, Table, TableKind, TableRef};
pub use traits::{FetchRequest, SourceReader, SqlRewriter, TableFilter, TypeMapper, TypeMapping};
pub use value::{encode_cell, encode_row, EncodedCell, SqlValue};
