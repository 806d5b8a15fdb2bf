//! CLI command implementations

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use cppcia_core::{
    include_cycles, load_state, normalize_path, save_state, ChangeSet, DeclKey, DeclKind,
    DeltaKind, GraphDelta, GraphStore, PersistedState,
};
use cppcia_impact::{assemble, compute_impact, PropagationOptions};
use cppcia_indexer::{
    discover_sources, AnalysisConfig, FingerprintCache, IncrementalBuilder, JsonIndexAdapter,
    ParserPool, PoolOptions, ScanOutcome,
};

/// Explicit edits given on the command line instead of the indexed delta.
#[derive(Debug, Default)]
pub struct ImpactArgs {
    /// Files changed with no declaration-level detail.
    pub changed: Vec<PathBuf>,
    /// `FILE=QUALIFIED_NAME[#DISCRIMINATOR]` pairs.
    pub decls: Vec<String>,
    /// Declaration edits only touch bodies.
    pub body_only: bool,
    pub max_depth: Option<usize>,
    pub json: bool,
}

/// State after bringing the store up to date with the tree.
struct IndexRun {
    config: AnalysisConfig,
    store: GraphStore,
    delta: GraphDelta,
}

pub async fn index(root: PathBuf) -> anyhow::Result<()> {
    let run = refresh(&root).await?;
    let stats = run.store.stats();
    tracing::info!(
        files = stats.files,
        declarations = stats.declarations,
        edges = stats.live_edges,
        unresolved = stats.parked_edges,
        "Index up to date"
    );

    println!("{}", run.delta.summary());
    for conflict in &run.delta.conflicts {
        println!(
            "conflict: {} in {} is a {:?}, kept as {:?}",
            conflict.key,
            conflict.file.display(),
            conflict.rejected,
            conflict.kept
        );
    }
    for failure in &run.delta.failures {
        println!("failed: {}: {}", failure.path.display(), failure.reason);
    }
    Ok(())
}

pub async fn impact(root: PathBuf, args: ImpactArgs) -> anyhow::Result<()> {
    let run = refresh(&root).await?;

    let changes = if args.changed.is_empty() && args.decls.is_empty() {
        run.delta.to_change_set()
    } else {
        explicit_changes(&run.store, &args)?
    };
    if changes.is_empty() {
        tracing::info!("No changes to analyse");
    }

    let options = PropagationOptions {
        max_depth: args.max_depth.or(run.config.max_depth),
    };
    let result = compute_impact(&run.store, &changes, &options);
    let report = assemble(&result)?.with_diagnostics(&run.delta);

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

pub fn clear(root: PathBuf) -> anyhow::Result<()> {
    let config = AnalysisConfig::load(&root)?;
    let cache_dir = config.cache_dir();
    tracing::info!("Clearing cache in: {}", cache_dir.display());

    cppcia_core::clear_cache(&cache_dir)?;

    tracing::info!("Cache cleared");
    Ok(())
}

/// Load persisted state, rescan the tree and persist the merged result.
async fn refresh(root: &Path) -> anyhow::Result<IndexRun> {
    let config = AnalysisConfig::load(root)?;
    tracing::info!("Indexing repository: {}", config.root.display());
    let cache_dir = config.cache_dir();

    let (mut store, fingerprints) = match load_state(&cache_dir) {
        Ok(Some(state)) => (state.store, state.fingerprints),
        Ok(None) => Default::default(),
        Err(e) => {
            tracing::warn!("Discarding unreadable graph state: {}", e);
            Default::default()
        }
    };
    let cache = Arc::new(FingerprintCache::from_map(fingerprints));

    let sources = discover_sources(&config.root, &config.source_filter()?);
    let present: BTreeSet<&PathBuf> = sources.iter().collect();
    let removed: Vec<PathBuf> = store
        .files()
        .map(|f| f.path.clone())
        .filter(|p| !present.contains(p))
        .collect();

    let adapter = Arc::new(JsonIndexAdapter::new(
        config.facts_dir(),
        config.include_resolver(),
    ));
    let pool = ParserPool::new(
        &config.root,
        adapter,
        Arc::clone(&cache),
        PoolOptions {
            workers: config.workers,
            timeout: config.parse_timeout(),
        },
    )?;
    let outcomes = pool
        .scan(sources)
        .await?
        .into_iter()
        .filter_map(ScanOutcome::into_parse_outcome)
        .collect();

    let mut builder = IncrementalBuilder::new(Arc::clone(&cache));
    let delta = builder.apply(&mut store, outcomes, &removed)?;

    for cycle in include_cycles(&store) {
        let names: Vec<String> = cycle.iter().map(|p| p.display().to_string()).collect();
        tracing::debug!("Include cycle: {}", names.join(" -> "));
    }

    save_state(&cache_dir, &PersistedState::new(store.clone(), cache.to_map()))
        .with_context(|| format!("Failed to save graph state in {}", cache_dir.display()))?;

    Ok(IndexRun {
        config,
        store,
        delta,
    })
}

fn explicit_changes(store: &GraphStore, args: &ImpactArgs) -> anyhow::Result<ChangeSet> {
    let mut changes = ChangeSet::new();
    for path in &args.changed {
        changes.file_level(path);
    }

    let delta = if args.body_only {
        DeltaKind::Body
    } else {
        DeltaKind::Signature
    };
    for arg in &args.decls {
        let (file, name) = arg
            .split_once('=')
            .with_context(|| format!("Expected FILE=NAME[#DISCRIMINATOR], got '{}'", arg))?;
        let key = DeclKey::parse(name);
        let kind = store
            .declaration(key.id())
            .map(|d| d.kind)
            .unwrap_or(DeclKind::Function);
        changes.declaration(normalize_path(Path::new(file)), key, kind, delta);
    }
    Ok(changes)
}
