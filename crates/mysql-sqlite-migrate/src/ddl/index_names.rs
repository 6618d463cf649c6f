//! Database-wide index name allocation.

use std::collections::{HashMap, HashSet};

use tracing::info;

/// Hands out index names that are unique across one SQLite file.
///
/// SQLite index names share a single namespace per database, while MySQL
/// scopes them per table, so two tables with an index called `idx_name`
/// collide. The first claim of a name gets it unchanged; later claims get
/// `name_2`, `name_3`, ... skipping anything already taken.
///
/// One registry lives for one run. Callers that may retry a table should
/// claim into a clone and keep it only once the DDL has been applied.
#[derive(Debug, Clone, Default)]
pub struct IndexNameRegistry {
    seen: HashSet<String>,
    next_suffix: HashMap<String, u32>,
}

impl IndexNameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a unique name derived from `base`.
    pub fn claim(&mut self, base: &str) -> String {
        if self.seen.insert(base.to_string()) {
            return base.to_string();
        }

        let mut n = self.next_suffix.get(base).copied().unwrap_or(2);
        let mut candidate = format!("{}_{}", base, n);
        while self.seen.contains(&candidate) {
            n += 1;
            candidate = format!("{}_{}", base, n);
        }
        self.seen.insert(candidate.clone());
        self.next_suffix.insert(base.to_string(), n + 1);

        info!(
            "Index \"{}\" renamed to \"{}\" to keep index names unique in the SQLite database",
            base, candidate
        );
        candidate
    }
}

#[cfg(test)]
impl IndexNameRegistry {
    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
