//! Semantic index adapters: the boundary to the external C++ front-end

use std::path::{Path, PathBuf};

use anyhow::Context;
use cppcia_core::{DeclFacts, FileFacts, Fingerprint, MacroUse};
use serde::Deserialize;

use crate::resolve::IncludeResolver;

/// Produces semantic facts for one file. Called concurrently from pool
/// workers; an `Err` (or a panic) becomes a parse failure for that file.
pub trait SemanticIndexAdapter: Send + Sync {
    /// `path` is root-relative; `fingerprint` is the normalised content hash.
    fn parse(&self, path: &Path, content: &[u8], fingerprint: Fingerprint) -> anyhow::Result<FileFacts>;

    fn name(&self) -> &str;
}

/// A facts document as written by an external indexer.
#[derive(Debug, Deserialize)]
struct FactsDocument {
    /// Include spellings in textual order, resolved against the tree.
    #[serde(default)]
    includes: Vec<String>,
    #[serde(default)]
    declarations: Vec<DeclFacts>,
    #[serde(default)]
    macro_uses: Vec<MacroUse>,
}

/// Reads `<facts_dir>/<path>.json` documents produced by an external
/// front-end (e.g. a clang-based exporter run as part of the build).
#[derive(Debug, Clone)]
pub struct JsonIndexAdapter {
    facts_dir: PathBuf,
    resolver: IncludeResolver,
}

impl JsonIndexAdapter {
    pub fn new(facts_dir: impl Into<PathBuf>, resolver: IncludeResolver) -> Self {
        JsonIndexAdapter {
            facts_dir: facts_dir.into(),
            resolver,
        }
    }

    /// Where the document for `path` is expected.
    pub fn document_path(&self, path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".json");
        self.facts_dir.join(name)
    }
}

impl SemanticIndexAdapter for JsonIndexAdapter {
    fn parse(&self, path: &Path, _content: &[u8], fingerprint: Fingerprint) -> anyhow::Result<FileFacts> {
        let document_path = self.document_path(path);
        let text = std::fs::read_to_string(&document_path)
            .with_context(|| format!("no facts document at {}", document_path.display()))?;
        let document: FactsDocument = serde_json::from_str(&text)
            .with_context(|| format!("malformed facts document {}", document_path.display()))?;

        let mut includes = Vec::with_capacity(document.includes.len());
        for spelling in &document.includes {
            match self.resolver.resolve(path, spelling) {
                Some(resolved) => includes.push(resolved),
                None => tracing::debug!(
                    path = %path.display(),
                    include = %spelling,
                    "Include outside the analysed tree"
                ),
            }
        }

        Ok(FileFacts {
            path: path.to_path_buf(),
            fingerprint,
            includes,
            declarations: document.declarations,
            macro_uses: document.macro_uses,
        })
    }

    fn name(&self) -> &str {
        "json"
    }
}
