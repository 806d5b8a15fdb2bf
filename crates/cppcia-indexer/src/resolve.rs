//! Include-spelling resolution against the analysed tree

use std::path::{Component, Path, PathBuf};

use cppcia_core::normalize_path;

/// Resolves `#include` spellings to root-relative paths.
///
/// Search order: the includer's directory, then each include path in order.
/// Headers outside the root (system and third-party) do not resolve.
#[derive(Debug, Clone)]
pub struct IncludeResolver {
    root: PathBuf,
    include_paths: Vec<PathBuf>,
}

impl IncludeResolver {
    /// `include_paths` may be absolute or relative to `root`.
    pub fn new(root: impl Into<PathBuf>, include_paths: Vec<PathBuf>) -> Self {
        let root = root.into();
        let include_paths = include_paths
            .into_iter()
            .filter_map(|p| relative_to(&root, &p))
            .collect();
        IncludeResolver { root, include_paths }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `spelling` as written in `includer` (root-relative).
    pub fn resolve(&self, includer: &Path, spelling: &str) -> Option<PathBuf> {
        let spelled = Path::new(spelling);
        if spelled.is_absolute() {
            return relative_to(&self.root, spelled).filter(|p| self.root.join(p).is_file());
        }

        let includer_dir = includer.parent().map(Path::to_path_buf).unwrap_or_default();
        std::iter::once(includer_dir)
            .chain(self.include_paths.iter().cloned())
            .map(|dir| normalize_path(&dir.join(spelled)))
            .filter(|candidate| !escapes_root(candidate))
            .find(|candidate| self.root.join(candidate).is_file())
    }

    /// Path of `file` relative to the root, if it lies inside it.
    pub fn relativize(&self, file: &Path) -> Option<PathBuf> {
        relative_to(&self.root, file)
    }
}

fn relative_to(root: &Path, path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        let relative = path.strip_prefix(root).ok()?;
        Some(normalize_path(relative))
    } else {
        Some(normalize_path(path)).filter(|p| !escapes_root(p))
    }
}

fn escapes_root(path: &Path) -> bool {
    matches!(path.components().next(), Some(Component::ParentDir))
}
