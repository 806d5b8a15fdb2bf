//! Impact propagation: a breadth-first reverse traversal from the entities
//! named in a [`ChangeSet`] over a store snapshot.
//!
//! Rules by what reached an entity:
//! - a declaration whose interface changed reaches every referencer as
//!   signature-impacted, and its home files through containment;
//! - a body-only change stays in the defining files, except that template
//!   instantiation sites are always treated as signature-impacted;
//! - a textual change (macro edit, file-level edit, unparseable file) reaches
//!   every transitive includer and macro expansion site as textual-impacted,
//!   with no declaration-level claims.
//!
//! Containment steps (declaration to home file) do not count as hops.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

use cppcia_core::{
    ChangeSet, DeclKey, DeclKind, DeltaKind, Edge, EdgeKind, Entity, FileChange, FileId,
    GraphStore, RefKind,
};
use serde::{Deserialize, Serialize};

/// Severity of an impact, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ImpactClass {
    /// Beyond the depth limit; the real class is unknown.
    #[serde(rename = "truncated")]
    Truncated,
    #[serde(rename = "body-only-impacted")]
    BodyOnly,
    #[serde(rename = "textual-impacted")]
    Textual,
    #[serde(rename = "signature-impacted")]
    Signature,
}

impl ImpactClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactClass::Truncated => "truncated",
            ImpactClass::BodyOnly => "body-only-impacted",
            ImpactClass::Textual => "textual-impacted",
            ImpactClass::Signature => "signature-impacted",
        }
    }
}

impl fmt::Display for ImpactClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a provenance chain, in the direction impact flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProvenanceStep {
    pub source: Entity,
    pub kind: EdgeKind,
    pub target: Entity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Impact {
    pub class: ImpactClass,
    /// Steps from `root` to this entity; empty for roots.
    pub chain: Vec<ProvenanceStep>,
    /// Hops from `root`.
    pub depth: usize,
    pub root: Entity,
}

/// How an entity is named in reports, captured from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityLabel {
    pub file: Option<PathBuf>,
    /// Qualified name plus discriminator, for declarations.
    pub name: Option<String>,
    pub kind: Option<DeclKind>,
}

impl fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, &self.name) {
            (Some(file), Some(name)) => write!(f, "{}:{}", file.display(), name),
            (Some(file), None) => write!(f, "{}", file.display()),
            (None, Some(name)) => f.write_str(name),
            (None, None) => f.write_str("?"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PropagationOptions {
    /// Maximum hops from a root. Entities one hop past the limit are
    /// reported as truncated and the walk stops there.
    pub max_depth: Option<usize>,
}

/// Affected entities with class and provenance. Never mutates the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImpactResult {
    pub entries: BTreeMap<Entity, Impact>,
    pub roots: BTreeSet<Entity>,
    pub labels: BTreeMap<Entity, EntityLabel>,
}

impl ImpactResult {
    pub fn get(&self, entity: Entity) -> Option<&Impact> {
        self.entries.get(&entity)
    }

    pub fn class_of(&self, entity: Entity) -> Option<ImpactClass> {
        self.entries.get(&entity).map(|i| i.class)
    }

    pub fn label(&self, entity: Entity) -> String {
        self.labels
            .get(&entity)
            .map(|l| l.to_string())
            .unwrap_or_else(|| "?".to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn truncated(&self) -> usize {
        self.entries
            .values()
            .filter(|i| i.class == ImpactClass::Truncated)
            .count()
    }
}

/// What an entity propagates once dequeued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Mode {
    Body,
    Signature,
    Textual,
}

#[derive(Debug, Clone)]
struct Item {
    entity: Entity,
    mode: Mode,
    depth: usize,
    chain: Vec<ProvenanceStep>,
    root: Entity,
}

struct Walk<'a> {
    store: &'a GraphStore,
    max_depth: Option<usize>,
    visited: BTreeSet<(Entity, Mode)>,
    queue: VecDeque<Item>,
    result: ImpactResult,
    /// Labels for entities the snapshot no longer knows.
    fallback: BTreeMap<Entity, EntityLabel>,
}

/// Compute the impact of `changes` on a snapshot of the store.
pub fn compute_impact(
    store: &GraphStore,
    changes: &ChangeSet,
    options: &PropagationOptions,
) -> ImpactResult {
    let mut walk = Walk {
        store,
        max_depth: options.max_depth,
        visited: BTreeSet::new(),
        queue: VecDeque::new(),
        result: ImpactResult::default(),
        fallback: BTreeMap::new(),
    };

    for (path, change) in changes.iter() {
        walk.seed_file(path, change);
    }
    while let Some(item) = walk.queue.pop_front() {
        walk.expand(item);
    }
    let result = walk.finish();

    tracing::debug!(
        roots = result.roots.len(),
        impacted = result.len(),
        truncated = result.truncated(),
        "Impact computed"
    );
    result
}

impl Walk<'_> {
    fn seed_file(&mut self, path: &Path, change: &FileChange) {
        let file = Entity::File(FileId::of(path));
        self.fallback.insert(
            file,
            EntityLabel {
                file: Some(path.to_path_buf()),
                ..Default::default()
            },
        );

        let mut decls: Vec<_> = change.declarations.iter().collect();
        decls.sort_by(|a, b| a.key.cmp(&b.key));
        for decl in decls {
            self.seed_declaration(path, &decl.key, decl.kind, decl.delta);
        }

        if change.textual || change.maximal || change.is_file_level() {
            self.seed(file, Mode::Textual, ImpactClass::Textual);
        }

        if change.maximal {
            let known: Vec<_> = self
                .store
                .file(path)
                .map(|record| record.declarations().collect())
                .unwrap_or_default();
            for id in known {
                self.seed(Entity::Decl(id), Mode::Signature, ImpactClass::Signature);
            }
        }
    }

    fn seed_declaration(&mut self, path: &Path, key: &DeclKey, kind: DeclKind, delta: DeltaKind) {
        let decl = Entity::Decl(key.id());
        self.fallback.insert(
            decl,
            EntityLabel {
                file: Some(path.to_path_buf()),
                name: Some(key.to_string()),
                kind: Some(kind),
            },
        );

        if kind == DeclKind::Macro {
            // Macro impact is textual and whole-file.
            self.seed(decl, Mode::Textual, ImpactClass::Textual);
            let file = Entity::File(FileId::of(path));
            self.fallback.entry(file).or_insert_with(|| EntityLabel {
                file: Some(path.to_path_buf()),
                ..Default::default()
            });
            self.seed(file, Mode::Textual, ImpactClass::Textual);
            return;
        }

        let (mode, class) = if delta.is_signature_visible() {
            (Mode::Signature, ImpactClass::Signature)
        } else {
            (Mode::Body, ImpactClass::BodyOnly)
        };
        self.seed(decl, mode, class);

        // A declaration that left the file (removal or move) is no longer
        // contained by it in the snapshot.
        let file = FileId::of(path);
        let homed = self
            .store
            .declaration(key.id())
            .is_some_and(|d| d.home_files().any(|home| home == file));
        if !homed && self.store.file_by_id(file).is_some() {
            let root = self.root_item(decl, mode);
            self.contain(&root, EdgeKind::Defines, Entity::File(file), class);
        }
    }

    fn root_item(&self, entity: Entity, mode: Mode) -> Item {
        Item {
            entity,
            mode,
            depth: 0,
            chain: Vec::new(),
            root: entity,
        }
    }

    fn seed(&mut self, entity: Entity, mode: Mode, class: ImpactClass) {
        self.result.roots.insert(entity);
        self.record(entity, class, Vec::new(), 0, entity);
        let item = self.root_item(entity, mode);
        self.push(item);
    }

    fn push(&mut self, item: Item) {
        if self.visited.insert((item.entity, item.mode)) {
            self.queue.push_back(item);
        }
    }

    /// Keep the strongest class; on ties the first (shortest) chain stays.
    fn record(
        &mut self,
        entity: Entity,
        class: ImpactClass,
        chain: Vec<ProvenanceStep>,
        depth: usize,
        root: Entity,
    ) -> bool {
        if let Some(existing) = self.result.entries.get(&entity) {
            if existing.class >= class {
                return false;
            }
        }
        self.result.entries.insert(
            entity,
            Impact {
                class,
                chain,
                depth,
                root,
            },
        );
        true
    }

    /// One hop along `kind` to `target`, continuing in `mode`.
    fn step(&mut self, from: &Item, kind: EdgeKind, target: Entity, mode: Mode, class: ImpactClass) {
        if !self.store.exists(target) {
            return;
        }
        let depth = from.depth + 1;
        let mut chain = from.chain.clone();
        chain.push(ProvenanceStep {
            source: from.entity,
            kind,
            target,
        });

        if self.max_depth.is_some_and(|max| depth > max) {
            self.record(target, ImpactClass::Truncated, chain, depth, from.root);
            return;
        }

        self.record(target, class, chain.clone(), depth, from.root);
        self.push(Item {
            entity: target,
            mode,
            depth,
            chain,
            root: from.root,
        });
    }

    /// Declaration to home file; not a hop and not expanded further.
    fn contain(&mut self, from: &Item, kind: EdgeKind, file: Entity, class: ImpactClass) {
        let mut chain = from.chain.clone();
        chain.push(ProvenanceStep {
            source: from.entity,
            kind,
            target: file,
        });
        self.record(file, class, chain, from.depth, from.root);
    }

    fn expand(&mut self, item: Item) {
        match (item.entity, item.mode) {
            (Entity::Decl(_), Mode::Signature) => self.expand_signature(&item),
            (Entity::Decl(_), Mode::Body) => {
                // A signature walk already covers everything a body walk would.
                if !self.visited.contains(&(item.entity, Mode::Signature)) {
                    self.expand_body(&item);
                }
            }
            (_, Mode::Textual) => self.expand_textual(&item),
            (Entity::File(_), _) => {}
        }
    }

    fn expand_signature(&mut self, item: &Item) {
        for edge in self.store.dependents(item.entity) {
            match edge.kind {
                EdgeKind::References(_) => {
                    self.step(item, edge.kind, edge.source, Mode::Signature, ImpactClass::Signature)
                }
                EdgeKind::Defines | EdgeKind::Declares => {
                    self.contain(item, edge.kind, edge.source, ImpactClass::Signature)
                }
                _ => {}
            }
        }
        self.expand_macro_sites(item);
    }

    fn expand_body(&mut self, item: &Item) {
        for edge in self.store.dependents(item.entity) {
            match edge.kind {
                EdgeKind::Defines => self.contain(item, edge.kind, edge.source, ImpactClass::BodyOnly),
                // Instantiation sites see the template's body.
                EdgeKind::References(RefKind::Instantiates) => {
                    self.step(item, edge.kind, edge.source, Mode::Signature, ImpactClass::Signature)
                }
                _ => {}
            }
        }
    }

    fn expand_textual(&mut self, item: &Item) {
        if let Entity::File(_) = item.entity {
            for edge in self.store.dependents(item.entity) {
                if edge.kind == EdgeKind::Includes {
                    self.step(item, edge.kind, edge.source, Mode::Textual, ImpactClass::Textual);
                }
            }
        }
        self.expand_macro_sites(item);
    }

    fn expand_macro_sites(&mut self, item: &Item) {
        let sites: Vec<Edge> = self.store.expansions_of(item.entity);
        for edge in sites {
            self.step(item, edge.kind, edge.target, Mode::Textual, ImpactClass::Textual);
        }
    }

    fn finish(mut self) -> ImpactResult {
        let mut mentioned: BTreeSet<Entity> = self.result.entries.keys().copied().collect();
        for impact in self.result.entries.values() {
            for step in &impact.chain {
                mentioned.insert(step.source);
                mentioned.insert(step.target);
            }
        }

        for entity in mentioned {
            let label = label_of(self.store, entity)
                .or_else(|| self.fallback.get(&entity).cloned())
                .unwrap_or_default();
            self.result.labels.insert(entity, label);
        }
        self.result
    }
}

fn label_of(store: &GraphStore, entity: Entity) -> Option<EntityLabel> {
    match entity {
        Entity::File(id) => store.file_by_id(id).map(|file| EntityLabel {
            file: Some(file.path.clone()),
            ..Default::default()
        }),
        Entity::Decl(id) => {
            let decl = store.declaration(id)?;
            let file = decl
                .home_files()
                .next()
                .and_then(|f| store.file_by_id(f))
                .map(|f| f.path.clone());
            Some(EntityLabel {
                file,
                name: Some(decl.key.to_string()),
                kind: Some(decl.kind),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cppcia_core::{DeclFacts, FileFacts, Fingerprint, MacroUse};

    fn key(name: &str) -> DeclKey {
        DeclKey::named(name)
    }

    fn decl(name: &str) -> Entity {
        Entity::Decl(key(name).id())
    }

    fn file(path: &str) -> Entity {
        Entity::File(FileId::of(Path::new(path)))
    }

    fn function(name: &str) -> DeclFacts {
        DeclFacts::definition(key(name), DeclKind::Function, name, "{}")
    }

    /// a.h defines f; b.cc includes a.h and calls f from caller.
    fn example() -> GraphStore {
        let mut store = GraphStore::new();
        store.upsert_file(&FileFacts::new("a.h", Fingerprint::of(b"a")).declare(function("f")));
        store.upsert_file(
            &FileFacts::new("b.cc", Fingerprint::of(b"b"))
                .include("a.h")
                .declare(function("caller").referencing(key("f"), RefKind::Calls)),
        );
        store
    }

    fn changed(name: &str, path: &str, delta: DeltaKind) -> ChangeSet {
        let mut changes = ChangeSet::new();
        changes.declaration(path, key(name), DeclKind::Function, delta);
        changes
    }

    fn unbounded() -> PropagationOptions {
        PropagationOptions::default()
    }

    #[test]
    fn test_signature_change_reaches_caller() {
        let store = example();
        let result = compute_impact(&store, &changed("f", "a.h", DeltaKind::Signature), &unbounded());

        let caller = result.get(decl("caller")).unwrap();
        assert_eq!(caller.class, ImpactClass::Signature);
        assert_eq!(
            caller.chain,
            vec![ProvenanceStep {
                source: decl("f"),
                kind: EdgeKind::References(RefKind::Calls),
                target: decl("caller"),
            }]
        );
        assert_eq!(result.label(decl("f")), "a.h:f");
        assert_eq!(result.label(decl("caller")), "b.cc:caller");
        assert_eq!(result.class_of(file("b.cc")), Some(ImpactClass::Signature));
        assert_eq!(result.roots, [decl("f")].into_iter().collect());
    }

    #[test]
    fn test_body_change_stays_in_defining_file() {
        let store = example();
        let result = compute_impact(&store, &changed("f", "a.h", DeltaKind::Body), &unbounded());

        assert_eq!(result.class_of(decl("f")), Some(ImpactClass::BodyOnly));
        assert_eq!(result.class_of(file("a.h")), Some(ImpactClass::BodyOnly));
        assert!(result.get(decl("caller")).is_none());
        assert!(result.get(file("b.cc")).is_none());
    }

    #[test]
    fn test_template_body_change_reaches_instantiations() {
        let mut store = GraphStore::new();
        store.upsert_file(
            &FileFacts::new("t.h", Fingerprint::of(b"t")).declare(DeclFacts::definition(
                key("Box"),
                DeclKind::Template,
                "template<class T> struct Box",
                "{ T v; }",
            )),
        );
        store.upsert_file(
            &FileFacts::new("u.cc", Fingerprint::of(b"u"))
                .include("t.h")
                .declare(function("use").referencing(key("Box"), RefKind::Instantiates))
                .declare(function("call").referencing(key("Box"), RefKind::Calls)),
        );

        let mut changes = ChangeSet::new();
        changes.declaration("t.h", key("Box"), DeclKind::Template, DeltaKind::Body);
        let result = compute_impact(&store, &changes, &unbounded());

        assert_eq!(result.class_of(decl("use")), Some(ImpactClass::Signature));
        assert!(result.get(decl("call")).is_none());
    }

    #[test]
    fn test_macro_change_is_textual_for_includers() {
        let mut store = GraphStore::new();
        store.upsert_file(&FileFacts::new("config.h", Fingerprint::of(b"c")).declare(
            DeclFacts::definition(key("FEATURE_X"), DeclKind::Macro, "FEATURE_X", "1"),
        ));
        for path in ["a.cc", "b.cc"] {
            store.upsert_file(
                &FileFacts::new(path, Fingerprint::of(path.as_bytes()))
                    .include("config.h")
                    .declare(function(&format!("in_{}", &path[..1])))
                    .expands(MacroUse::Declaration(key("FEATURE_X"))),
            );
        }

        let mut changes = ChangeSet::new();
        changes.declaration("config.h", key("FEATURE_X"), DeclKind::Macro, DeltaKind::Body);
        let result = compute_impact(&store, &changes, &unbounded());

        assert_eq!(result.class_of(file("a.cc")), Some(ImpactClass::Textual));
        assert_eq!(result.class_of(file("b.cc")), Some(ImpactClass::Textual));
        // No declaration-level claims.
        assert!(result.get(decl("in_a")).is_none());
        assert!(result.get(decl("in_b")).is_none());
    }

    #[test]
    fn test_textual_change_follows_includes_transitively_through_cycles() {
        let mut store = GraphStore::new();
        store.upsert_file(&FileFacts::new("x.h", Fingerprint::of(b"x")).include("y.h"));
        store.upsert_file(&FileFacts::new("y.h", Fingerprint::of(b"y")).include("x.h"));
        store.upsert_file(&FileFacts::new("main.cc", Fingerprint::of(b"m")).include("x.h"));

        let mut changes = ChangeSet::new();
        changes.file_level("y.h");
        let result = compute_impact(&store, &changes, &unbounded());

        assert_eq!(result.class_of(file("x.h")), Some(ImpactClass::Textual));
        assert_eq!(result.class_of(file("main.cc")), Some(ImpactClass::Textual));
        assert_eq!(result.get(file("main.cc")).unwrap().depth, 2);
    }

    #[test]
    fn test_recursion_terminates() {
        let mut store = GraphStore::new();
        store.upsert_file(
            &FileFacts::new("r.cc", Fingerprint::of(b"r"))
                .declare(function("even").referencing(key("odd"), RefKind::Calls))
                .declare(function("odd").referencing(key("even"), RefKind::Calls)),
        );

        let result = compute_impact(&store, &changed("even", "r.cc", DeltaKind::Signature), &unbounded());
        assert_eq!(result.class_of(decl("odd")), Some(ImpactClass::Signature));
        assert!(result.get(decl("even")).unwrap().chain.is_empty());
    }

    #[test]
    fn test_depth_limit_truncates() {
        let mut store = GraphStore::new();
        store.upsert_file(
            &FileFacts::new("chain.cc", Fingerprint::of(b"c"))
                .declare(function("d0"))
                .declare(function("d1").referencing(key("d0"), RefKind::Calls))
                .declare(function("d2").referencing(key("d1"), RefKind::Calls))
                .declare(function("d3").referencing(key("d2"), RefKind::Calls)),
        );

        let options = PropagationOptions { max_depth: Some(1) };
        let result = compute_impact(&store, &changed("d0", "chain.cc", DeltaKind::Signature), &options);

        assert_eq!(result.class_of(decl("d1")), Some(ImpactClass::Signature));
        assert_eq!(result.class_of(decl("d2")), Some(ImpactClass::Truncated));
        assert!(result.get(decl("d3")).is_none());
        assert_eq!(result.truncated(), 1);
    }

    #[test]
    fn test_stronger_class_upgrades_and_replaces_chain() {
        // b.cc both includes the changed header and calls into it.
        let mut store = example();
        store.upsert_file(&FileFacts::new("a.h", Fingerprint::of(b"a2")).declare(function("f")));

        let mut changes = ChangeSet::new();
        changes
            .file_level("a.h")
            .declaration("a.h", key("f"), DeclKind::Function, DeltaKind::Signature);
        let result = compute_impact(&store, &changes, &unbounded());

        let b = result.get(file("b.cc")).unwrap();
        assert_eq!(b.class, ImpactClass::Signature);
        assert_eq!(b.chain.last().unwrap().kind, EdgeKind::Defines);
    }

    #[test]
    fn test_removed_declaration_reaches_former_referencers() {
        let mut store = example();
        store.upsert_file(&FileFacts::new("a.h", Fingerprint::of(b"empty")));

        let result = compute_impact(&store, &changed("f", "a.h", DeltaKind::Removed), &unbounded());
        assert_eq!(result.class_of(decl("caller")), Some(ImpactClass::Signature));
        assert_eq!(result.class_of(file("a.h")), Some(ImpactClass::Signature));
        assert_eq!(result.label(decl("f")), "a.h:f");
    }

    #[test]
    fn test_maximal_file_seeds_every_declaration() {
        let store = example();
        let mut changes = ChangeSet::new();
        changes.maximal("a.h");
        let result = compute_impact(&store, &changes, &unbounded());

        assert_eq!(result.class_of(decl("caller")), Some(ImpactClass::Signature));
        assert!(result.roots.contains(&decl("f")));
        assert!(result.roots.contains(&file("a.h")));
    }

    #[test]
    fn test_removed_file_reaches_includers() {
        let mut store = example();
        store.remove_file(Path::new("a.h"));

        let mut changes = ChangeSet::new();
        changes.maximal("a.h");
        let result = compute_impact(&store, &changes, &unbounded());

        assert_eq!(result.class_of(file("b.cc")), Some(ImpactClass::Textual));
        assert_eq!(result.label(file("a.h")), "a.h");
    }

    #[test]
    fn test_deterministic() {
        let store = example();
        let changes = changed("f", "a.h", DeltaKind::Both);
        let first = compute_impact(&store, &changes, &unbounded());
        for _ in 0..5 {
            assert_eq!(compute_impact(&store, &changes, &unbounded()), first);
        }
    }
}
