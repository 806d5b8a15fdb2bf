//! Source discovery, fingerprinting, parse dispatch and incremental merging

pub mod adapter;
pub mod builder;
pub mod config;
pub mod discover;
pub mod error;
pub mod fingerprints;
pub mod normalize;
pub mod parser_pool;
pub mod resolve;

pub use adapter::{JsonIndexAdapter, SemanticIndexAdapter};
pub use builder::IncrementalBuilder;
pub use config::{AnalysisConfig, CONFIG_FILE};
pub use discover::{discover_sources, SourceFilter};
pub use error::{IndexerError, Result};
pub use fingerprints::FingerprintCache;
pub use normalize::{FileType, Normalizer};
pub use parser_pool::{ParserPool, PoolOptions, ScanOutcome};
pub use resolve::IncludeResolver;
