//! Graph deltas produced by incremental updates

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::changeset::{ChangeSet, DeltaKind};
use crate::graph::SemanticConflict;
use crate::model::*;

/// A declaration as it appeared in, or disappeared from, one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclEntry {
    pub key: DeclKey,
    pub kind: DeclKind,
    pub file: PathBuf,
}

/// A declaration present before and after whose fingerprints differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedDecl {
    pub key: DeclKey,
    pub kind: DeclKind,
    pub file: PathBuf,
    pub delta: DeltaKind,
}

/// A declaration that left some files and appeared in others in one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovedDecl {
    pub key: DeclKey,
    pub from: Vec<PathBuf>,
    pub to: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Everything one update batch changed in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDelta {
    /// Monotonically increasing batch number.
    pub sequence: u64,
    pub added_files: Vec<PathBuf>,
    pub removed_files: Vec<PathBuf>,
    pub added_decls: Vec<DeclEntry>,
    pub removed_decls: Vec<DeclEntry>,
    pub changed_decls: Vec<ChangedDecl>,
    /// Also present as removal + addition above.
    pub moved_decls: Vec<MovedDecl>,
    pub added_edges: Vec<Edge>,
    pub removed_edges: Vec<Edge>,
    /// Files whose change only textual inclusion can account for.
    pub textual_files: Vec<PathBuf>,
    pub failures: Vec<ParseFailure>,
    pub conflicts: Vec<SemanticConflict>,
}

impl GraphDelta {
    /// Create an empty delta with given sequence number.
    pub fn new(sequence: u64) -> Self {
        GraphDelta {
            sequence,
            ..Default::default()
        }
    }

    /// True when the batch changed nothing and reported nothing.
    pub fn is_empty(&self) -> bool {
        self.added_files.is_empty()
            && self.removed_files.is_empty()
            && self.added_decls.is_empty()
            && self.removed_decls.is_empty()
            && self.changed_decls.is_empty()
            && self.moved_decls.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
            && self.textual_files.is_empty()
            && self.failures.is_empty()
            && self.conflicts.is_empty()
    }

    /// The edit this delta represents, ready for impact propagation.
    ///
    /// Removed declarations are seeded in the file they left and added ones in
    /// the file they entered, so a move reaches the dependents of both sides.
    /// Failed and deleted files are maximal.
    pub fn to_change_set(&self) -> ChangeSet {
        let mut changes = ChangeSet::new();

        for entry in &self.removed_decls {
            changes.declaration(&entry.file, entry.key.clone(), entry.kind, DeltaKind::Removed);
        }
        for entry in &self.added_decls {
            changes.declaration(&entry.file, entry.key.clone(), entry.kind, DeltaKind::Added);
        }
        for changed in &self.changed_decls {
            changes.declaration(&changed.file, changed.key.clone(), changed.kind, changed.delta);
        }
        for path in &self.textual_files {
            changes.file_level(path);
        }
        for failure in &self.failures {
            changes.maximal(&failure.path);
        }
        for path in &self.removed_files {
            changes.maximal(path);
        }

        changes
    }

    /// Short summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "+{}/-{} files, +{}/-{}/~{} decls, {} moved, +{}/-{} edges, {} failed, {} conflicts",
            self.added_files.len(),
            self.removed_files.len(),
            self.added_decls.len(),
            self.removed_decls.len(),
            self.changed_decls.len(),
            self.moved_decls.len(),
            self.added_edges.len(),
            self.removed_edges.len(),
            self.failures.len(),
            self.conflicts.len(),
        )
    }
}
