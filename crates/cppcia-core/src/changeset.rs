//! Edits to be analysed: files with optional declaration-level deltas.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{normalize_path, DeclKey, DeclKind};

/// What changed about a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Signature,
    Body,
    Both,
    Added,
    Removed,
}

impl DeltaKind {
    /// Whether users of the declaration see the change.
    pub fn is_signature_visible(&self) -> bool {
        !matches!(self, DeltaKind::Body)
    }

    /// Combine two deltas observed for the same declaration.
    pub fn merge(self, other: DeltaKind) -> DeltaKind {
        use DeltaKind::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Removed, _) | (_, Removed) => Removed,
            (Added, _) | (_, Added) => Added,
            _ => Both,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclChange {
    pub key: DeclKey,
    pub kind: DeclKind,
    pub delta: DeltaKind,
}

/// Changes recorded for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    #[serde(default)]
    pub declarations: Vec<DeclChange>,
    /// Content changed in a way only textual inclusion can account for.
    #[serde(default)]
    pub textual: bool,
    /// Nothing is known about the file; assume everything in it changed.
    #[serde(default)]
    pub maximal: bool,
}

impl FileChange {
    /// True when no finer-grained declaration delta is available.
    pub fn is_file_level(&self) -> bool {
        self.declarations.is_empty()
    }
}

/// A set of (file, declaration deltas) pairs describing one edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    entries: BTreeMap<PathBuf, FileChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, path: &Path) -> &mut FileChange {
        self.entries.entry(normalize_path(path)).or_default()
    }

    /// The file's content changed with no declaration-level detail.
    pub fn file_level(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.entry(path.as_ref()).textual = true;
        self
    }

    /// A declaration in `path` changed.
    pub fn declaration(
        &mut self,
        path: impl AsRef<Path>,
        key: DeclKey,
        kind: DeclKind,
        delta: DeltaKind,
    ) -> &mut Self {
        let file = self.entry(path.as_ref());
        match file.declarations.iter_mut().find(|c| c.key == key) {
            Some(existing) => existing.delta = existing.delta.merge(delta),
            None => file.declarations.push(DeclChange { key, kind, delta }),
        }
        self
    }

    /// Anything in the file may have changed (parse failure, deletion).
    pub fn maximal(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.entry(path.as_ref()).maximal = true;
        self
    }

    /// Fold another changeset into this one.
    pub fn extend(&mut self, other: ChangeSet) {
        for (path, change) in other.entries {
            let file = self.entry(&path);
            file.textual |= change.textual;
            file.maximal |= change.maximal;
            for decl in change.declarations {
                match file.declarations.iter_mut().find(|c| c.key == decl.key) {
                    Some(existing) => existing.delta = existing.delta.merge(decl.delta),
                    None => file.declarations.push(decl),
                }
            }
        }
    }

    pub fn get(&self, path: &Path) -> Option<&FileChange> {
        self.entries.get(&normalize_path(path))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &FileChange)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
