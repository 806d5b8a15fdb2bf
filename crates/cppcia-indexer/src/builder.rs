//! Incremental builder: merges parse results into the graph store and
//! reports what changed as a [`GraphDelta`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cppcia_core::{
    normalize_path, ChangedDecl, CoreError, DeclEntry, DeclId, DeclKey, DeclKind, DeltaKind, Edge,
    EdgeKind, Entity, FileId, Fingerprint, GraphDelta, GraphStore, MovedDecl, ParseFailure,
    ParseOutcome, SharedStore,
};

use crate::fingerprints::FingerprintCache;

/// Declaration state as seen from one file, captured around an upsert.
#[derive(Debug, Clone, PartialEq)]
struct DeclState {
    key: DeclKey,
    kind: DeclKind,
    signature: Fingerprint,
    body: Fingerprint,
}

#[derive(Debug, Clone)]
struct FileSnapshot {
    fingerprint: Fingerprint,
    includes: Vec<PathBuf>,
    decls: BTreeMap<DeclId, DeclState>,
    edges: BTreeSet<Edge>,
}

impl FileSnapshot {
    fn capture(store: &GraphStore, path: &Path) -> Option<Self> {
        let record = store.file(path)?;
        let decls = record
            .declarations()
            .filter_map(|id| store.declaration(id))
            .map(|decl| {
                (
                    decl.id,
                    DeclState {
                        key: decl.key.clone(),
                        kind: decl.kind,
                        signature: decl.signature,
                        body: decl.body,
                    },
                )
            })
            .collect();

        Some(FileSnapshot {
            fingerprint: record.fingerprint,
            includes: record.includes.clone(),
            decls,
            edges: store.owned_edges(record.id).copied().collect(),
        })
    }

    fn macro_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| e.kind == EdgeKind::MacroExpandsIn)
    }
}

/// Fingerprint-cache mutation, held back until the batch is published.
#[derive(Debug)]
enum CacheUpdate {
    Record(PathBuf, Fingerprint),
    Invalidate(PathBuf),
}

/// Applies parse results to a store in batches.
///
/// Owns the fingerprint cache: entries are recorded only for facts that were
/// merged in a published batch and invalidated for failed or removed files.
#[derive(Debug)]
pub struct IncrementalBuilder {
    cache: Arc<FingerprintCache>,
    sequence: u64,
}

impl IncrementalBuilder {
    pub fn new(cache: Arc<FingerprintCache>) -> Self {
        IncrementalBuilder { cache, sequence: 0 }
    }

    pub fn cache(&self) -> &Arc<FingerprintCache> {
        &self.cache
    }

    /// Sequence number of the last non-empty delta.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Merge one batch into `store`. On error `store` is left as it was.
    pub fn apply(
        &mut self,
        store: &mut GraphStore,
        outcomes: Vec<ParseOutcome>,
        removed: &[PathBuf],
    ) -> Result<GraphDelta, CoreError> {
        // Whole-store copy, O(store) per batch.
        let mut working = store.clone();
        let (delta, updates) = self.merge(&mut working, outcomes, removed)?;
        *store = working;
        Ok(self.commit(delta, updates))
    }

    /// Merge one batch into a shared store, publishing it only on success.
    pub fn apply_shared(
        &mut self,
        shared: &SharedStore,
        outcomes: Vec<ParseOutcome>,
        removed: &[PathBuf],
    ) -> Result<GraphDelta, CoreError> {
        let (delta, updates) = shared.apply(|store| self.merge(store, outcomes, removed))?;
        Ok(self.commit(delta, updates))
    }

    fn commit(&mut self, mut delta: GraphDelta, updates: Vec<CacheUpdate>) -> GraphDelta {
        for update in updates {
            match update {
                CacheUpdate::Record(path, fingerprint) => self.cache.record(&path, fingerprint),
                CacheUpdate::Invalidate(path) => self.cache.invalidate(&path),
            }
        }

        if delta.is_empty() {
            delta.sequence = self.sequence;
            tracing::debug!("Batch changed nothing");
        } else {
            self.sequence = delta.sequence;
            tracing::info!(sequence = delta.sequence, "Applied batch: {}", delta.summary());
        }
        delta
    }

    fn merge(
        &self,
        store: &mut GraphStore,
        outcomes: Vec<ParseOutcome>,
        removed: &[PathBuf],
    ) -> Result<(GraphDelta, Vec<CacheUpdate>), CoreError> {
        let mut delta = GraphDelta::new(self.sequence + 1);
        let mut updates = Vec::new();
        let mut touched: BTreeSet<Entity> = BTreeSet::new();

        let removed: BTreeSet<PathBuf> = removed.iter().map(|p| normalize_path(p)).collect();
        // Last outcome per path wins; removal wins over any outcome.
        let mut by_path: BTreeMap<PathBuf, ParseOutcome> = BTreeMap::new();
        for outcome in outcomes {
            let path = normalize_path(outcome.path());
            if !removed.contains(&path) {
                by_path.insert(path, outcome);
            }
        }

        let mut added_edges = BTreeSet::new();
        let mut removed_edges = BTreeSet::new();

        for path in &removed {
            updates.push(CacheUpdate::Invalidate(path.clone()));
            let Some(before) = FileSnapshot::capture(store, path) else {
                continue;
            };
            store.remove_file(path);

            touched.insert(Entity::File(FileId::of(path)));
            for (id, state) in &before.decls {
                touched.insert(Entity::Decl(*id));
                delta.removed_decls.push(DeclEntry {
                    key: state.key.clone(),
                    kind: state.kind,
                    file: path.clone(),
                });
            }
            for edge in &before.edges {
                touched.insert(edge.source);
                touched.insert(edge.target);
                removed_edges.insert(*edge);
            }
            delta.removed_files.push(path.clone());
        }

        let mut snapshots: Vec<(PathBuf, Option<FileSnapshot>)> = Vec::new();
        for (path, outcome) in by_path {
            match outcome {
                ParseOutcome::Parsed(facts) => {
                    let before = FileSnapshot::capture(store, &path);
                    let upserted = store.upsert_file(&facts);
                    // A file with rejected declarations is offered to the
                    // adapter again until the conflict is gone.
                    if upserted.conflicts.is_empty() {
                        updates.push(CacheUpdate::Record(path.clone(), facts.fingerprint));
                    } else {
                        updates.push(CacheUpdate::Invalidate(path.clone()));
                    }
                    delta.conflicts.extend(upserted.conflicts);
                    if upserted.created {
                        delta.added_files.push(path.clone());
                    }
                    snapshots.push((path, before));
                }
                ParseOutcome::Failed { reason, .. } => {
                    // Last known-good facts stay in the store.
                    tracing::warn!(path = %path.display(), "Keeping previous facts after parse failure: {}", reason);
                    updates.push(CacheUpdate::Invalidate(path.clone()));
                    delta.failures.push(ParseFailure { path, reason });
                }
            }
        }

        // Diff after every upsert so fingerprints merged from several files are final.
        for (path, before) in snapshots {
            let Some(after) = FileSnapshot::capture(store, &path) else {
                continue;
            };
            touched.insert(Entity::File(FileId::of(&path)));

            let empty = BTreeMap::new();
            let before_decls = before.as_ref().map(|b| &b.decls).unwrap_or(&empty);
            let mut decl_deltas = 0;

            for (id, state) in &after.decls {
                match before_decls.get(id) {
                    None => {
                        delta.added_decls.push(DeclEntry {
                            key: state.key.clone(),
                            kind: state.kind,
                            file: path.clone(),
                        });
                        decl_deltas += 1;
                    }
                    Some(old) => {
                        let signature = old.signature != state.signature || old.kind != state.kind;
                        let body = old.body != state.body;
                        let kind = match (signature, body) {
                            (true, true) => Some(DeltaKind::Both),
                            (true, false) => Some(DeltaKind::Signature),
                            (false, true) => Some(DeltaKind::Body),
                            (false, false) => None,
                        };
                        if let Some(kind) = kind {
                            delta.changed_decls.push(ChangedDecl {
                                key: state.key.clone(),
                                kind: state.kind,
                                file: path.clone(),
                                delta: kind,
                            });
                            decl_deltas += 1;
                        }
                    }
                }
                touched.insert(Entity::Decl(*id));
            }
            for (id, state) in before_decls {
                if !after.decls.contains_key(id) {
                    delta.removed_decls.push(DeclEntry {
                        key: state.key.clone(),
                        kind: state.kind,
                        file: path.clone(),
                    });
                    decl_deltas += 1;
                    touched.insert(Entity::Decl(*id));
                }
            }

            let empty_edges = BTreeSet::new();
            let before_edges = before.as_ref().map(|b| &b.edges).unwrap_or(&empty_edges);
            for edge in after.edges.difference(before_edges) {
                added_edges.insert(*edge);
                touched.insert(edge.source);
                touched.insert(edge.target);
            }
            for edge in before_edges.difference(&after.edges) {
                removed_edges.insert(*edge);
                touched.insert(edge.source);
                touched.insert(edge.target);
            }

            if is_textual(&path, before.as_ref(), &after, decl_deltas, store) {
                delta.textual_files.push(path.clone());
            }
        }

        delta.moved_decls = moves(&delta.removed_decls, &delta.added_decls);
        delta.added_edges = added_edges.into_iter().collect();
        delta.removed_edges = removed_edges.into_iter().collect();
        delta.added_decls.sort_by(|a, b| (&a.file, &a.key).cmp(&(&b.file, &b.key)));
        delta.removed_decls.sort_by(|a, b| (&a.file, &a.key).cmp(&(&b.file, &b.key)));
        delta.changed_decls.sort_by(|a, b| (&a.file, &a.key).cmp(&(&b.file, &b.key)));

        store.check_entities(&touched)?;
        Ok((delta, updates))
    }
}

/// Whether a file changed in a way only textual inclusion can account for.
fn is_textual(
    path: &Path,
    before: Option<&FileSnapshot>,
    after: &FileSnapshot,
    decl_deltas: usize,
    store: &GraphStore,
) -> bool {
    match before {
        // A new file matters textually to anything already including it.
        None => !store.includers_of(path).is_empty(),
        Some(before) => {
            let content_only = before.fingerprint != after.fingerprint && decl_deltas == 0;
            let includes = before.includes != after.includes;
            let macros = !before.macro_edges().eq(after.macro_edges());
            content_only || includes || macros
        }
    }
}

/// Declarations removed from some files and added to others in one batch.
fn moves(removed: &[DeclEntry], added: &[DeclEntry]) -> Vec<MovedDecl> {
    let mut from: BTreeMap<&DeclKey, Vec<PathBuf>> = BTreeMap::new();
    for entry in removed {
        from.entry(&entry.key).or_default().push(entry.file.clone());
    }
    let mut to: BTreeMap<&DeclKey, Vec<PathBuf>> = BTreeMap::new();
    for entry in added {
        to.entry(&entry.key).or_default().push(entry.file.clone());
    }

    from.into_iter()
        .filter_map(|(key, mut from)| {
            let mut to = to.get(key)?.clone();
            from.sort();
            to.sort();
            Some(MovedDecl {
                key: key.clone(),
                from,
                to,
            })
        })
        .collect()
}
