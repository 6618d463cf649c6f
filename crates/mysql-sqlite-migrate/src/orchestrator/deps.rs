//! Foreign-key-safe table creation order.

use std::collections::{HashMap, HashSet, VecDeque};

/// A `(child, parent)` foreign key edge: `child` references `parent`.
pub type DependencyEdge = (String, String);

/// Output of [`resolve_order`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedOrder {
    /// Tables whose parents all precede them.
    pub ordered: Vec<String>,
    /// Edges still unresolved after the sort; every table in a cycle, or
    /// depending on one, appears here.
    pub cyclic_edges: Vec<DependencyEdge>,
}

impl ResolvedOrder {
    pub fn has_cycles(&self) -> bool {
        !self.cyclic_edges.is_empty()
    }

    /// Tables that could not be ordered, in first-seen order.
    pub fn cyclic_tables(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut tables = Vec::new();
        for (child, parent) in &self.cyclic_edges {
            for name in [child, parent] {
                if !self.ordered.contains(name) && seen.insert(name.clone()) {
                    tables.push(name.clone());
                }
            }
        }
        tables
    }
}

/// Kahn topological sort of `tables` over `edges`.
///
/// Self-references and edges touching a table outside `tables` are ignored,
/// since neither constrains creation order. Ties keep the order of `tables`.
/// Never fails: a fully cyclic graph yields an empty `ordered`.
pub fn resolve_order(tables: &[String], edges: &[DependencyEdge]) -> ResolvedOrder {
    let known: HashSet<&str> = tables.iter().map(String::as_str).collect();

    let mut parents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for (child, parent) in edges {
        let (child, parent) = (child.as_str(), parent.as_str());
        if child == parent || !known.contains(child) || !known.contains(parent) {
            continue;
        }
        let entry = parents.entry(child).or_default();
        if entry.contains(&parent) {
            continue;
        }
        entry.push(parent);
        children.entry(parent).or_default().push(child);
    }

    let mut queue: VecDeque<&str> = tables
        .iter()
        .map(String::as_str)
        .filter(|t| parents.get(t).map_or(true, Vec::is_empty))
        .collect();
    let mut queued: HashSet<&str> = queue.iter().copied().collect();
    let mut ordered = Vec::with_capacity(tables.len());

    while let Some(table) = queue.pop_front() {
        ordered.push(table.to_string());
        for &child in children.get(table).map(Vec::as_slice).unwrap_or_default() {
            if let Some(remaining) = parents.get_mut(child) {
                remaining.retain(|p| *p != table);
                if remaining.is_empty() && queued.insert(child) {
                    queue.push_back(child);
                }
            }
        }
    }

    let mut cyclic_edges = Vec::new();
    for table in tables {
        if queued.contains(table.as_str()) {
            continue;
        }
        if let Some(remaining) = parents.get(table.as_str()) {
            for parent in remaining {
                cyclic_edges.push((table.clone(), parent.to_string()));
            }
        }
    }

    ResolvedOrder {
        ordered,
        cyclic_edges,
    }
}
