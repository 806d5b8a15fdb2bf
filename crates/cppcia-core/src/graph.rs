//! The graph store: files, declarations and typed edges with incrementally
//! maintained reverse indices.
//!
//! Every edge is asserted by one or more files (its *owners*). An owned edge
//! is *live* when both endpoints exist and *parked* under each missing
//! endpoint otherwise; it becomes live the moment the missing entity is
//! upserted. Reverse indices only ever change on link/unlink.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::facts::{DeclFacts, DeclRole, FileFacts, MacroUse};
use crate::model::*;

/// Two facts disagree on the kind of the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticConflict {
    pub key: DeclKey,
    /// File whose facts were rejected.
    pub file: PathBuf,
    pub kept: DeclKind,
    pub rejected: DeclKind,
}

/// What an upsert did besides replacing the file's facts.
#[derive(Debug, Clone, Default)]
pub struct UpsertOutcome {
    /// The file was not in the store before.
    pub created: bool,
    pub conflicts: Vec<SemanticConflict>,
    /// Declarations deleted because no file defines or declares them any more.
    pub orphaned: Vec<Declaration>,
}

/// A file taken out of the store.
#[derive(Debug, Clone)]
pub struct RemovedFile {
    pub record: FileRecord,
    pub orphaned: Vec<Declaration>,
}

/// Signature and body fingerprints of one declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclFingerprints {
    pub signature: Fingerprint,
    pub body: Fingerprint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StoreStats {
    pub files: usize,
    pub declarations: usize,
    pub live_edges: usize,
    pub parked_edges: usize,
}

/// The persistent graph of files, declarations and edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStore {
    files: BTreeMap<FileId, FileRecord>,
    decls: BTreeMap<DeclId, Declaration>,
    /// Edges asserted by each file's facts.
    owned: BTreeMap<FileId, BTreeSet<Edge>>,
    /// Files asserting each edge.
    owners: BTreeMap<Edge, BTreeSet<FileId>>,
    outgoing: BTreeMap<Entity, BTreeSet<Edge>>,
    incoming: BTreeMap<Entity, BTreeSet<Edge>>,
    /// Owned edges waiting for a missing endpoint, keyed by that endpoint.
    parked: BTreeMap<Entity, BTreeSet<Edge>>,
    /// Qualified name → overloads.
    by_name: BTreeMap<String, BTreeSet<DeclId>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Mutation ────────────────────────────────────────────

    /// Replace everything known about `facts.path` with `facts`.
    pub fn upsert_file(&mut self, facts: &FileFacts) -> UpsertOutcome {
        let path = normalize_path(&facts.path);
        let file_id = FileId::of(&path);
        let mut outcome = UpsertOutcome {
            created: !self.files.contains_key(&file_id),
            ..Default::default()
        };

        let accepted = self.accept_declarations(file_id, &path, facts, &mut outcome.conflicts);
        let mut defines = BTreeSet::new();
        let mut declares = BTreeSet::new();
        for decl in &accepted {
            match decl.role {
                DeclRole::Definition => defines.insert(decl.key.id()),
                DeclRole::Declaration => declares.insert(decl.key.id()),
            };
        }
        declares.retain(|id| !defines.contains(id));

        let mut seen = BTreeSet::new();
        let includes: Vec<PathBuf> = facts
            .includes
            .iter()
            .map(|p| normalize_path(p))
            .filter(|p| seen.insert(p.clone()))
            .collect();

        let previous = self.files.insert(
            file_id,
            FileRecord {
                id: file_id,
                path: path.clone(),
                fingerprint: facts.fingerprint,
                includes: includes.clone(),
                defines: defines.clone(),
                declares: declares.clone(),
            },
        );
        if outcome.created {
            self.entity_appeared(Entity::File(file_id));
        }

        // Roles are re-derived from scratch for this file.
        let previous_decls: BTreeSet<DeclId> = previous
            .as_ref()
            .map(|r| r.declarations().collect())
            .unwrap_or_default();
        for id in &previous_decls {
            if let Some(decl) = self.decls.get_mut(id) {
                decl.defining_files.remove(&file_id);
                decl.declaring_files.remove(&file_id);
            }
        }

        for decl in &accepted {
            self.merge_declaration(file_id, decl, defines.contains(&decl.key.id()));
        }

        let edges = owned_edges(file_id, &defines, &declares, &includes, &accepted, facts);
        let old = self.owned.remove(&file_id).unwrap_or_default();
        for edge in old.difference(&edges) {
            self.release(*edge, file_id);
        }
        for edge in edges.difference(&old) {
            self.acquire(*edge, file_id);
        }
        if !edges.is_empty() {
            self.owned.insert(file_id, edges);
        }

        for id in previous_decls {
            if let Some(decl) = self.remove_if_orphaned(id) {
                outcome.orphaned.push(decl);
            }
        }

        tracing::debug!(
            path = %path.display(),
            declarations = defines.len() + declares.len(),
            conflicts = outcome.conflicts.len(),
            orphaned = outcome.orphaned.len(),
            "Upserted file"
        );
        outcome
    }

    /// Remove a file, its declarations and every edge touching it.
    pub fn remove_file(&mut self, path: &Path) -> Option<RemovedFile> {
        let file_id = FileId::of(path);
        if !self.files.contains_key(&file_id) {
            return None;
        }

        for edge in self.owned.remove(&file_id).unwrap_or_default() {
            self.release(edge, file_id);
        }

        let record = self.files.remove(&file_id)?;
        for id in record.declarations() {
            if let Some(decl) = self.decls.get_mut(&id) {
                decl.defining_files.remove(&file_id);
                decl.declaring_files.remove(&file_id);
            }
        }
        self.entity_vanished(Entity::File(file_id));

        let orphaned = record
            .declarations()
            .filter_map(|id| self.remove_if_orphaned(id))
            .collect::<Vec<_>>();

        tracing::debug!(
            path = %record.path.display(),
            orphaned = orphaned.len(),
            "Removed file"
        );
        Some(RemovedFile { record, orphaned })
    }

    /// Split a file's declarations into accepted facts and kind conflicts.
    fn accept_declarations<'a>(
        &self,
        file_id: FileId,
        path: &Path,
        facts: &'a FileFacts,
        conflicts: &mut Vec<SemanticConflict>,
    ) -> Vec<&'a DeclFacts> {
        let mut kinds: BTreeMap<DeclId, DeclKind> = BTreeMap::new();
        let mut accepted = Vec::new();

        for decl in &facts.declarations {
            let id = decl.key.id();
            let kept = match kinds.get(&id) {
                Some(kind) => Some(*kind),
                None => self
                    .decls
                    .get(&id)
                    .filter(|existing| existing.home_files().any(|f| f != file_id))
                    .map(|existing| existing.kind),
            };

            if let Some(kept) = kept.filter(|kept| *kept != decl.kind) {
                tracing::warn!(
                    key = %decl.key,
                    path = %path.display(),
                    ?kept,
                    rejected = ?decl.kind,
                    "Semantic conflict, keeping known entry"
                );
                conflicts.push(SemanticConflict {
                    key: decl.key.clone(),
                    file: path.to_path_buf(),
                    kept,
                    rejected: decl.kind,
                });
                continue;
            }

            kinds.insert(id, decl.kind);
            accepted.push(decl);
        }

        accepted
    }

    fn merge_declaration(&mut self, file_id: FileId, facts: &DeclFacts, defined_here: bool) {
        let id = facts.key.id();
        let is_definition = facts.role == DeclRole::Definition;

        match self.decls.get_mut(&id) {
            Some(decl) => {
                decl.kind = facts.kind;
                if defined_here {
                    decl.defining_files.insert(file_id);
                } else {
                    decl.declaring_files.insert(file_id);
                }
                if is_definition {
                    decl.signature = facts.signature;
                    decl.body = facts.body;
                } else if !defined_here && decl.defining_files.is_empty() {
                    decl.signature = facts.signature;
                }
            }
            None => {
                let mut decl = Declaration {
                    id,
                    key: facts.key.clone(),
                    kind: facts.kind,
                    defining_files: BTreeSet::new(),
                    declaring_files: BTreeSet::new(),
                    signature: facts.signature,
                    body: if is_definition { facts.body } else { Fingerprint::EMPTY },
                };
                if defined_here {
                    decl.defining_files.insert(file_id);
                } else {
                    decl.declaring_files.insert(file_id);
                }
                self.by_name
                    .entry(facts.key.qualified_name.clone())
                    .or_default()
                    .insert(id);
                self.decls.insert(id, decl);
                self.entity_appeared(Entity::Decl(id));
            }
        }
    }

    fn remove_if_orphaned(&mut self, id: DeclId) -> Option<Declaration> {
        if !self.decls.get(&id)?.is_orphaned() {
            return None;
        }
        let decl = self.decls.remove(&id)?;
        if let Some(ids) = self.by_name.get_mut(&decl.key.qualified_name) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_name.remove(&decl.key.qualified_name);
            }
        }
        self.entity_vanished(Entity::Decl(id));
        Some(decl)
    }

    // ── Edge ownership ──────────────────────────────────────

    fn acquire(&mut self, edge: Edge, owner: FileId) {
        let owners = self.owners.entry(edge).or_default();
        let first = owners.is_empty();
        owners.insert(owner);
        if first {
            if self.exists(edge.source) && self.exists(edge.target) {
                self.link(edge);
            } else {
                self.park(edge);
            }
        }
    }

    fn release(&mut self, edge: Edge, owner: FileId) {
        let Some(owners) = self.owners.get_mut(&edge) else {
            return;
        };
        owners.remove(&owner);
        if owners.is_empty() {
            self.owners.remove(&edge);
            if !self.unlink(edge) {
                self.unpark(edge);
            }
        }
    }

    fn link(&mut self, edge: Edge) {
        self.outgoing.entry(edge.source).or_default().insert(edge);
        self.incoming.entry(edge.target).or_default().insert(edge);
    }

    /// Returns whether the edge was live.
    fn unlink(&mut self, edge: Edge) -> bool {
        let was_out = remove_from(&mut self.outgoing, edge.source, &edge);
        let was_in = remove_from(&mut self.incoming, edge.target, &edge);
        was_out || was_in
    }

    fn park(&mut self, edge: Edge) {
        for endpoint in [edge.source, edge.target] {
            if !self.exists(endpoint) {
                self.parked.entry(endpoint).or_default().insert(edge);
            }
        }
    }

    fn unpark(&mut self, edge: Edge) {
        remove_from(&mut self.parked, edge.source, &edge);
        remove_from(&mut self.parked, edge.target, &edge);
    }

    fn entity_appeared(&mut self, entity: Entity) {
        let Some(waiting) = self.parked.remove(&entity) else {
            return;
        };
        for edge in waiting {
            // Otherwise it stays parked under the other missing endpoint.
            if self.exists(edge.source) && self.exists(edge.target) {
                self.unpark(edge);
                self.link(edge);
            }
        }
    }

    fn entity_vanished(&mut self, entity: Entity) {
        let mut touching = BTreeSet::new();
        if let Some(out) = self.outgoing.remove(&entity) {
            touching.extend(out);
        }
        if let Some(inc) = self.incoming.remove(&entity) {
            touching.extend(inc);
        }
        for edge in touching {
            self.unlink(edge);
            self.park(edge);
        }
    }

    // ── Queries ─────────────────────────────────────────────

    pub fn exists(&self, entity: Entity) -> bool {
        match entity {
            Entity::File(id) => self.files.contains_key(&id),
            Entity::Decl(id) => self.decls.contains_key(&id),
        }
    }

    pub fn file(&self, path: &Path) -> Option<&FileRecord> {
        self.files.get(&FileId::of(path))
    }

    pub fn file_by_id(&self, id: FileId) -> Option<&FileRecord> {
        self.files.get(&id)
    }

    pub fn declaration(&self, id: DeclId) -> Option<&Declaration> {
        self.decls.get(&id)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.decls.values()
    }

    /// Every live edge, in deterministic order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.outgoing.values().flatten()
    }

    /// Owned edges waiting for a missing endpoint.
    pub fn parked_edges(&self) -> BTreeSet<Edge> {
        self.parked.values().flatten().copied().collect()
    }

    pub fn declarations_defined_in(&self, path: &Path) -> Vec<&Declaration> {
        self.file(path)
            .map(|record| {
                record
                    .defines
                    .iter()
                    .filter_map(|id| self.decls.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn declarations_declared_in(&self, path: &Path) -> Vec<&Declaration> {
        self.file(path)
            .map(|record| {
                record
                    .declares
                    .iter()
                    .filter_map(|id| self.decls.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Overloads sharing a qualified name.
    pub fn declarations_named(&self, qualified_name: &str) -> Vec<&Declaration> {
        self.by_name
            .get(qualified_name)
            .into_iter()
            .flatten()
            .filter_map(|id| self.decls.get(id))
            .collect()
    }

    /// Declarations referencing `id`, with the reference subtype.
    pub fn references_to(&self, id: DeclId) -> BTreeSet<(DeclId, RefKind)> {
        self.incoming_edges(Entity::Decl(id))
            .filter_map(|edge| match (edge.source, edge.kind) {
                (Entity::Decl(source), EdgeKind::References(kind)) => Some((source, kind)),
                _ => None,
            })
            .collect()
    }

    /// Declarations referenced by `id`, with the reference subtype.
    pub fn references_from(&self, id: DeclId) -> BTreeSet<(DeclId, RefKind)> {
        self.outgoing_edges(Entity::Decl(id))
            .filter_map(|edge| match (edge.target, edge.kind) {
                (Entity::Decl(target), EdgeKind::References(kind)) => Some((target, kind)),
                _ => None,
            })
            .collect()
    }

    /// Files directly including `path`.
    pub fn includers_of(&self, path: &Path) -> BTreeSet<FileId> {
        self.incoming_edges(Entity::File(FileId::of(path)))
            .filter(|edge| edge.kind == EdgeKind::Includes)
            .filter_map(|edge| match edge.source {
                Entity::File(id) => Some(id),
                Entity::Decl(_) => None,
            })
            .collect()
    }

    pub fn fingerprint_of(&self, id: DeclId) -> Option<DeclFingerprints> {
        self.decls.get(&id).map(|decl| DeclFingerprints {
            signature: decl.signature,
            body: decl.body,
        })
    }

    pub fn outgoing_edges(&self, entity: Entity) -> impl Iterator<Item = &Edge> {
        self.outgoing.get(&entity).into_iter().flatten()
    }

    pub fn incoming_edges(&self, entity: Entity) -> impl Iterator<Item = &Edge> {
        self.incoming.get(&entity).into_iter().flatten()
    }

    /// Edges pointing at `entity`: live ones while it exists, otherwise the
    /// parked edges still asserted against it by other files.
    pub fn dependents(&self, entity: Entity) -> Vec<Edge> {
        if self.exists(entity) {
            self.incoming_edges(entity).copied().collect()
        } else {
            self.parked
                .get(&entity)
                .into_iter()
                .flatten()
                .filter(|edge| edge.target == entity)
                .copied()
                .collect()
        }
    }

    /// `MacroExpandsIn` edges leaving `entity`, parked ones included when it
    /// no longer exists.
    pub fn expansions_of(&self, entity: Entity) -> Vec<Edge> {
        let leaving: Vec<Edge> = if self.exists(entity) {
            self.outgoing_edges(entity).copied().collect()
        } else {
            self.parked
                .get(&entity)
                .into_iter()
                .flatten()
                .filter(|edge| edge.source == entity)
                .copied()
                .collect()
        };
        leaving
            .into_iter()
            .filter(|edge| edge.kind == EdgeKind::MacroExpandsIn)
            .collect()
    }

    /// Edges asserted by a file's facts.
    pub fn owned_edges(&self, file: FileId) -> impl Iterator<Item = &Edge> {
        self.owned.get(&file).into_iter().flatten()
    }

    pub fn owners_of(&self, edge: &Edge) -> impl Iterator<Item = FileId> + '_ {
        self.owners.get(edge).into_iter().flatten().copied()
    }

    /// `path` or `path:qualified_name` for use in reports.
    pub fn describe(&self, entity: Entity) -> Option<String> {
        match entity {
            Entity::File(id) => self.files.get(&id).map(|f| f.path.display().to_string()),
            Entity::Decl(id) => {
                let decl = self.decls.get(&id)?;
                let home = decl.home_files().next().and_then(|f| self.files.get(&f));
                Some(match home {
                    Some(file) => format!("{}:{}", file.path.display(), decl.key),
                    None => decl.key.to_string(),
                })
            }
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn declaration_count(&self) -> usize {
        self.decls.len()
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(|s| s.len()).sum()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            files: self.file_count(),
            declarations: self.declaration_count(),
            live_edges: self.edge_count(),
            parked_edges: self.parked_edges().len(),
        }
    }

    // ── Invariants ──────────────────────────────────────────

    /// Audit only the entities touched by an update batch.
    pub fn check_entities<'a>(&self, touched: impl IntoIterator<Item = &'a Entity>) -> Result<()> {
        for &entity in touched {
            if self.exists(entity) {
                self.check_entity(entity)?;
            } else if self.outgoing.contains_key(&entity) || self.incoming.contains_key(&entity) {
                return Err(violation(format!("live edges touch missing {:?}", entity)));
            }
        }
        Ok(())
    }

    fn check_entity(&self, entity: Entity) -> Result<()> {
        match entity {
            Entity::File(id) => {
                let Some(record) = self.files.get(&id) else {
                    return Err(violation(format!("missing file {:?}", id)));
                };
                for decl_id in &record.defines {
                    let ok = self
                        .decls
                        .get(decl_id)
                        .is_some_and(|d| d.defining_files.contains(&id));
                    if !ok {
                        return Err(violation(format!(
                            "{} defines {:?} without a matching declaration",
                            record.path.display(),
                            decl_id
                        )));
                    }
                }
                for decl_id in &record.declares {
                    let ok = self
                        .decls
                        .get(decl_id)
                        .is_some_and(|d| d.declaring_files.contains(&id));
                    if !ok {
                        return Err(violation(format!(
                            "{} declares {:?} without a matching declaration",
                            record.path.display(),
                            decl_id
                        )));
                    }
                }
            }
            Entity::Decl(id) => {
                let Some(decl) = self.decls.get(&id) else {
                    return Err(violation(format!("missing declaration {:?}", id)));
                };
                if decl.is_orphaned() {
                    return Err(violation(format!("orphaned declaration {}", decl.key)));
                }
                for file in &decl.defining_files {
                    if !self.files.get(file).is_some_and(|f| f.defines.contains(&id)) {
                        return Err(violation(format!(
                            "{} has dangling defining file {:?}",
                            decl.key, file
                        )));
                    }
                }
                for file in &decl.declaring_files {
                    if !self.files.get(file).is_some_and(|f| f.declares.contains(&id)) {
                        return Err(violation(format!(
                            "{} has dangling declaring file {:?}",
                            decl.key, file
                        )));
                    }
                }
            }
        }

        for edge in self.outgoing_edges(entity).chain(self.incoming_edges(entity)) {
            self.check_live_edge(edge)?;
        }
        Ok(())
    }

    fn check_live_edge(&self, edge: &Edge) -> Result<()> {
        if !self.exists(edge.source) || !self.exists(edge.target) {
            return Err(violation(format!("dangling edge {:?}", edge)));
        }
        if !self.owners.get(edge).is_some_and(|o| !o.is_empty()) {
            return Err(violation(format!("unowned edge {:?}", edge)));
        }
        let indexed_out = self.outgoing.get(&edge.source).is_some_and(|s| s.contains(edge));
        let indexed_in = self.incoming.get(&edge.target).is_some_and(|s| s.contains(edge));
        if !indexed_out || !indexed_in {
            return Err(violation(format!("half-indexed edge {:?}", edge)));
        }
        Ok(())
    }

    /// Full audit of every invariant. Linear in the size of the store.
    pub fn check_invariants(&self) -> Result<()> {
        let entities: Vec<Entity> = self
            .files
            .keys()
            .map(|id| Entity::File(*id))
            .chain(self.decls.keys().map(|id| Entity::Decl(*id)))
            .collect();
        self.check_entities(&entities)?;

        for (name, ids) in &self.by_name {
            for id in ids {
                if !self.decls.get(id).is_some_and(|d| &d.key.qualified_name == name) {
                    return Err(violation(format!("stale name index entry {}", name)));
                }
            }
        }
        for decl in self.decls.values() {
            if !self
                .by_name
                .get(&decl.key.qualified_name)
                .is_some_and(|ids| ids.contains(&decl.id))
            {
                return Err(violation(format!("{} missing from name index", decl.key)));
            }
        }

        for (entity, edges) in &self.incoming {
            for edge in edges {
                if edge.target != *entity {
                    return Err(violation(format!("misfiled edge {:?}", edge)));
                }
                self.check_live_edge(edge)?;
            }
        }
        for (entity, edges) in &self.outgoing {
            for edge in edges {
                if edge.source != *entity {
                    return Err(violation(format!("misfiled edge {:?}", edge)));
                }
            }
        }

        for (entity, edges) in &self.parked {
            if self.exists(*entity) {
                return Err(violation(format!("edges parked under present {:?}", entity)));
            }
            for edge in edges {
                if edge.other(*entity).is_none() {
                    return Err(violation(format!("misfiled parked edge {:?}", edge)));
                }
                if !self.owners.contains_key(edge) {
                    return Err(violation(format!("unowned parked edge {:?}", edge)));
                }
            }
        }

        for (file, edges) in &self.owned {
            if !self.files.contains_key(file) {
                return Err(violation(format!("edges owned by missing file {:?}", file)));
            }
            for edge in edges {
                if !self.owners.get(edge).is_some_and(|o| o.contains(file)) {
                    return Err(violation(format!("ownership out of sync for {:?}", edge)));
                }
            }
        }
        for (edge, owners) in &self.owners {
            if owners.is_empty() {
                return Err(violation(format!("edge with empty owner set {:?}", edge)));
            }
            for owner in owners {
                if !self.owned.get(owner).is_some_and(|e| e.contains(edge)) {
                    return Err(violation(format!("ownership out of sync for {:?}", edge)));
                }
            }
            let live = self.outgoing.get(&edge.source).is_some_and(|s| s.contains(edge));
            let parked = self.parked.values().any(|s| s.contains(edge));
            if live == parked {
                return Err(violation(format!("edge neither live nor parked {:?}", edge)));
            }
        }

        Ok(())
    }
}

/// The edge set a file's facts assert.
fn owned_edges(
    file_id: FileId,
    defines: &BTreeSet<DeclId>,
    declares: &BTreeSet<DeclId>,
    includes: &[PathBuf],
    accepted: &[&DeclFacts],
    facts: &FileFacts,
) -> BTreeSet<Edge> {
    let file = Entity::File(file_id);
    let mut edges = BTreeSet::new();

    for id in defines {
        edges.insert(Edge::new(file, EdgeKind::Defines, Entity::Decl(*id)));
    }
    for id in declares {
        edges.insert(Edge::new(file, EdgeKind::Declares, Entity::Decl(*id)));
    }
    for included in includes {
        let target = FileId::of(included);
        // A guarded self-include is a no-op.
        if target != file_id {
            edges.insert(Edge::new(file, EdgeKind::Includes, Entity::File(target)));
        }
    }
    for decl in accepted {
        let source = Entity::Decl(decl.key.id());
        for reference in &decl.references {
            edges.insert(Edge::new(
                source,
                EdgeKind::References(reference.kind),
                Entity::Decl(reference.target.id()),
            ));
        }
    }
    for use_ in &facts.macro_uses {
        let source = match use_ {
            MacroUse::Declaration(key) => Entity::Decl(key.id()),
            MacroUse::File(path) => Entity::File(FileId::of(path)),
        };
        if source != file {
            edges.insert(Edge::new(source, EdgeKind::MacroExpandsIn, file));
        }
    }

    edges
}

fn remove_from(map: &mut BTreeMap<Entity, BTreeSet<Edge>>, key: Entity, edge: &Edge) -> bool {
    let Some(set) = map.get_mut(&key) else {
        return false;
    };
    let removed = set.remove(edge);
    if set.is_empty() {
        map.remove(&key);
    }
    removed
}

fn violation(message: String) -> CoreError {
    CoreError::GraphInvariantViolation(message)
}
