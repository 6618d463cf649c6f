//! MySQL -> SQLite dialect translation.
//!
//! - [`typemap`]: column types and collation clauses
//! - [`defaults`]: `DEFAULT` clause translation
//! - [`rewrite`]: parser-backed and regex-backed fragment rewriting
//! - [`view`]: view bodies with the source schema stripped

mod defaults;
mod rewrite;
mod typemap;
mod view;

pub use defaults::{current_time_keyword, DefaultTranslator};
pub use rewrite::{
    default_rewriter, DefaultRewriter, FallbackRewriter, StructuralRewriter, TextualRewriter,
};
pub use typemap::{
    collation_clause, is_blob_type, is_integer_type, strict_storage_type, Collation,
    MysqlToSqliteMapper,
};
pub use view::ViewTranspiler;
