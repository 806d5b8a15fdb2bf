//! Source discovery with gitignore support and exclusion globs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use cppcia_core::normalize_path;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;

use crate::error::{IndexerError, Result};

/// Which root-relative paths take part in the analysis.
#[derive(Debug, Clone)]
pub struct SourceFilter {
    extensions: BTreeSet<String>,
    exclude: GlobSet,
}

impl SourceFilter {
    pub fn new<I, S>(extensions: &[String], exclude: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        for pattern in exclude {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern).map_err(|e| IndexerError::Pattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        let exclude = builder.build().map_err(|e| IndexerError::Pattern {
            pattern: "<set>".to_string(),
            message: e.to_string(),
        })?;

        Ok(SourceFilter {
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            exclude,
        })
    }

    /// Whether a root-relative path is an analysed source.
    pub fn matches(&self, relative: &Path) -> bool {
        let has_extension = relative
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(&e.to_ascii_lowercase()));
        has_extension && !self.exclude.is_match(relative)
    }
}

/// Every analysed source under `root`, root-relative and sorted.
pub fn discover_sources(root: &Path, filter: &SourceFilter) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_exclude(true)
        .ignore(true)
        .parents(true)
        .build();

    let mut sources: Vec<PathBuf> = walker
        .filter_map(|result| match result {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(error = %e, "Walk error");
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?;
            Some(normalize_path(relative))
        })
        .filter(|relative| filter.matches(relative))
        .collect();

    sources.sort();
    tracing::debug!(root = %root.display(), count = sources.len(), "Discovered sources");
    sources
}
