//! Analysis configuration loaded from `cppcia.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use cppcia_core::{cache, normalize_path};
use serde::{Deserialize, Serialize};

use crate::discover::SourceFilter;
use crate::error::{IndexerError, Result};
use crate::resolve::IncludeResolver;

/// Config file looked up in the analysed root.
pub const CONFIG_FILE: &str = "cppcia.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Analysed tree; relative values are taken from the config file's directory.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Include search paths, after the includer's own directory
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,

    /// Glob patterns (root-relative) excluded from analysis
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Source file extensions
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Maximum propagation hops (unbounded when absent)
    #[serde(default)]
    pub max_depth: Option<usize>,

    /// Parser pool workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-file adapter deadline
    #[serde(default = "default_parse_timeout_ms")]
    pub parse_timeout_ms: u64,

    /// Directory holding facts documents from the external indexer
    #[serde(default = "default_facts_dir")]
    pub facts_dir: PathBuf,

    /// Persisted state location (defaults to `<root>/.cppcia`)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_exclude() -> Vec<String> {
    vec!["build/**".to_string()]
}

fn default_extensions() -> Vec<String> {
    ["c", "cc", "cpp", "cxx", "h", "hh", "hpp", "hxx", "ipp", "inl", "tpp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_workers() -> usize {
    // Use number of CPU cores as default worker count, but at least 2
    std::thread::available_parallelism()
        .map(|n| n.get().max(2))
        .unwrap_or(2)
}

fn default_parse_timeout_ms() -> u64 {
    30_000
}

fn default_facts_dir() -> PathBuf {
    PathBuf::from(".cppcia/facts")
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            include_paths: Vec::new(),
            exclude: default_exclude(),
            extensions: default_extensions(),
            max_depth: None,
            workers: default_workers(),
            parse_timeout_ms: default_parse_timeout_ms(),
            facts_dir: default_facts_dir(),
            cache_dir: None,
        }
    }
}

impl AnalysisConfig {
    /// Load `<dir>/cppcia.toml`, falling back to defaults when absent.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::debug!(dir = %dir.display(), "No config file, using defaults");
            Self::default()
        };
        config.root = normalize_path(&dir.join(&config.root));
        // `.` normalises to the empty path, which walks nothing.
        if config.root.as_os_str().is_empty() {
            config.root = PathBuf::from(".");
        }
        Ok(config)
    }

    /// Parse a config file without resolving `root`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| IndexerError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn cache_dir(&self) -> PathBuf {
        match &self.cache_dir {
            Some(dir) => self.root.join(dir),
            None => cache::cache_dir(&self.root),
        }
    }

    pub fn facts_dir(&self) -> PathBuf {
        self.root.join(&self.facts_dir)
    }

    pub fn parse_timeout(&self) -> Duration {
        Duration::from_millis(self.parse_timeout_ms)
    }

    pub fn source_filter(&self) -> Result<SourceFilter> {
        SourceFilter::new(&self.extensions, &self.exclude)
    }

    pub fn include_resolver(&self) -> IncludeResolver {
        IncludeResolver::new(self.root.clone(), self.include_paths.clone())
    }
}
