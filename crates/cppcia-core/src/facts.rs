//! Per-file facts supplied by a semantic index adapter

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{DeclKey, DeclKind, Fingerprint, RefKind};

/// Whether a file holds the definition of a declaration or only declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeclRole {
    #[default]
    Definition,
    Declaration,
}

/// An outgoing reference from a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceFacts {
    pub target: DeclKey,
    pub kind: RefKind,
}

/// A declaration as seen in one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclFacts {
    pub key: DeclKey,
    pub kind: DeclKind,
    #[serde(default)]
    pub role: DeclRole,
    pub signature: Fingerprint,
    /// [`Fingerprint::EMPTY`] for declarations without a body.
    #[serde(default)]
    pub body: Fingerprint,
    #[serde(default)]
    pub references: Vec<ReferenceFacts>,
}

impl DeclFacts {
    /// A definition whose fingerprints hash the given interface and body text.
    pub fn definition(key: DeclKey, kind: DeclKind, signature: &str, body: &str) -> Self {
        DeclFacts {
            key,
            kind,
            role: DeclRole::Definition,
            signature: Fingerprint::of(signature.as_bytes()),
            body: Fingerprint::of(body.as_bytes()),
            references: Vec::new(),
        }
    }

    /// A forward declaration without a body.
    pub fn forward(key: DeclKey, kind: DeclKind, signature: &str) -> Self {
        DeclFacts {
            key,
            kind,
            role: DeclRole::Declaration,
            signature: Fingerprint::of(signature.as_bytes()),
            body: Fingerprint::EMPTY,
            references: Vec::new(),
        }
    }

    pub fn referencing(mut self, target: DeclKey, kind: RefKind) -> Self {
        self.references.push(ReferenceFacts { target, kind });
        self
    }
}

/// The origin of a macro expanded in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroUse {
    /// A macro resolved to its declaration.
    Declaration(DeclKey),
    /// A macro only attributable to the file that defines it.
    File(PathBuf),
}

/// Everything the adapter knows about one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFacts {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    /// Direct includes in textual order.
    #[serde(default)]
    pub includes: Vec<PathBuf>,
    #[serde(default)]
    pub declarations: Vec<DeclFacts>,
    #[serde(default)]
    pub macro_uses: Vec<MacroUse>,
}

impl FileFacts {
    pub fn new(path: impl Into<PathBuf>, fingerprint: Fingerprint) -> Self {
        FileFacts {
            path: path.into(),
            fingerprint,
            includes: Vec::new(),
            declarations: Vec::new(),
            macro_uses: Vec::new(),
        }
    }

    pub fn include(mut self, path: impl Into<PathBuf>) -> Self {
        self.includes.push(path.into());
        self
    }

    pub fn declare(mut self, decl: DeclFacts) -> Self {
        self.declarations.push(decl);
        self
    }

    pub fn expands(mut self, origin: MacroUse) -> Self {
        self.macro_uses.push(origin);
        self
    }
}

/// Result of asking the adapter for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseOutcome {
    Parsed(FileFacts),
    /// The adapter could not produce facts; callers assume maximal impact.
    Failed { path: PathBuf, reason: String },
}

impl ParseOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ParseOutcome::Parsed(facts) => &facts.path,
            ParseOutcome::Failed { path, .. } => path,
        }
    }
}
