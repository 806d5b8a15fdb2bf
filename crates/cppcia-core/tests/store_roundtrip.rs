//! Persisted stores reload to an identical graph.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use cppcia_core::*;
use tempfile::TempDir;

fn sample_store() -> GraphStore {
    let mut store = GraphStore::new();
    store.upsert_file(
        &FileFacts::new("config.h", Fingerprint::of(b"config"))
            .declare(DeclFacts::definition(DeclKey::named("FEATURE_X"), DeclKind::Macro, "FEATURE_X", "1")),
    );
    store.upsert_file(
        &FileFacts::new("a.h", Fingerprint::of(b"a"))
            .include("config.h")
            .declare(DeclFacts::definition(
                DeclKey::new("f", "(int)"),
                DeclKind::Function,
                "int f(int)",
                "{ return x; }",
            )),
    );
    store.upsert_file(
        &FileFacts::new("b.cc", Fingerprint::of(b"b"))
            .include("a.h")
            .include("missing.h")
            .declare(
                DeclFacts::definition(DeclKey::named("caller"), DeclKind::Function, "void caller()", "{}")
                    .referencing(DeclKey::new("f", "(int)"), RefKind::Calls)
                    .referencing(DeclKey::named("not_indexed"), RefKind::UsesType),
            )
            .expands(MacroUse::Declaration(DeclKey::named("FEATURE_X"))),
    );
    store
}

fn edge_set(store: &GraphStore) -> BTreeSet<Edge> {
    store.edges().copied().collect()
}

#[test]
fn test_round_trip_preserves_files_declarations_and_edges() {
    let dir = TempDir::new().unwrap();
    let cache = cache_dir(dir.path());
    let store = sample_store();
    store.check_invariants().unwrap();

    let fingerprints: BTreeMap<PathBuf, Fingerprint> = store
        .files()
        .map(|f| (f.path.clone(), f.fingerprint))
        .collect();
    save_state(&cache, &PersistedState::new(store.clone(), fingerprints.clone())).unwrap();

    let loaded = load_state(&cache).unwrap().unwrap();
    let reloaded = loaded.store;

    assert_eq!(
        store.files().collect::<Vec<_>>(),
        reloaded.files().collect::<Vec<_>>()
    );
    assert_eq!(
        store.declarations().collect::<Vec<_>>(),
        reloaded.declarations().collect::<Vec<_>>()
    );
    assert_eq!(edge_set(&store), edge_set(&reloaded));
    assert_eq!(store.parked_edges(), reloaded.parked_edges());
    assert_eq!(loaded.fingerprints, fingerprints);
    reloaded.check_invariants().unwrap();
}

#[test]
fn test_reloaded_store_keeps_accepting_updates() {
    let dir = TempDir::new().unwrap();
    let cache = cache_dir(dir.path());
    save_state(&cache, &PersistedState::new(sample_store(), BTreeMap::new())).unwrap();

    let mut store = load_state(&cache).unwrap().unwrap().store;
    store.upsert_file(&FileFacts::new("missing.h", Fingerprint::of(b"m")));
    assert_eq!(store.includers_of(Path::new("missing.h")).len(), 1);

    store.remove_file(Path::new("a.h"));
    assert!(store.references_from(DeclKey::named("caller").id()).is_empty());
    store.check_invariants().unwrap();
}

#[test]
fn test_include_cycles_survive_reload() {
    let mut store = GraphStore::new();
    store.upsert_file(&FileFacts::new("x.h", Fingerprint::of(b"x")).include("y.h"));
    store.upsert_file(&FileFacts::new("y.h", Fingerprint::of(b"y")).include("x.h"));

    let dir = TempDir::new().unwrap();
    let cache = cache_dir(dir.path());
    save_state(&cache, &PersistedState::new(store, BTreeMap::new())).unwrap();
    let reloaded = load_state(&cache).unwrap().unwrap().store;

    assert_eq!(include_cycles(&reloaded).len(), 1);
}
