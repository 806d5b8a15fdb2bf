//! Include-cycle diagnostics over a snapshot of the store.
//!
//! Cycles are legal (mutually including headers behind guards); they are
//! reported, not rejected.

use std::collections::BTreeMap;
use std::path::PathBuf;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::graph::GraphStore;
use crate::model::{EdgeKind, Entity, FileId};

/// Strongly connected components of the include graph with more than one
/// file. Each cycle is sorted by path and the list is sorted by first path.
pub fn include_cycles(store: &GraphStore) -> Vec<Vec<PathBuf>> {
    let mut graph: DiGraph<FileId, ()> = DiGraph::new();
    let mut index: BTreeMap<FileId, NodeIndex> = BTreeMap::new();

    for file in store.files() {
        index.insert(file.id, graph.add_node(file.id));
    }

    for edge in store.edges().filter(|e| e.kind == EdgeKind::Includes) {
        if let (Entity::File(from), Entity::File(to)) = (edge.source, edge.target) {
            if let (Some(&a), Some(&b)) = (index.get(&from), index.get(&to)) {
                graph.add_edge(a, b, ());
            }
        }
    }

    let mut cycles: Vec<Vec<PathBuf>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .map(|scc| {
            let mut paths: Vec<PathBuf> = scc
                .into_iter()
                .filter_map(|idx| store.file_by_id(graph[idx]))
                .map(|file| file.path.clone())
                .collect();
            paths.sort();
            paths
        })
        .collect();
    cycles.sort();

    if !cycles.is_empty() {
        tracing::debug!(count = cycles.len(), "Include cycles found");
    }
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::FileFacts;
    use crate::model::Fingerprint;

    fn header(path: &str, includes: &[&str]) -> FileFacts {
        let mut facts = FileFacts::new(path, Fingerprint::of(path.as_bytes()));
        facts.includes = includes.iter().map(PathBuf::from).collect();
        facts
    }

    #[test]
    fn test_mutual_includes_form_a_cycle() {
        let mut store = GraphStore::new();
        store.upsert_file(&header("x.h", &["y.h"]));
        store.upsert_file(&header("y.h", &["x.h"]));
        store.upsert_file(&header("main.cc", &["x.h"]));

        let cycles = include_cycles(&store);
        assert_eq!(cycles, vec![vec![PathBuf::from("x.h"), PathBuf::from("y.h")]]);
    }

    #[test]
    fn test_acyclic_includes() {
        let mut store = GraphStore::new();
        store.upsert_file(&header("a.h", &[]));
        store.upsert_file(&header("b.cc", &["a.h"]));

        assert!(include_cycles(&store).is_empty());
    }
}
