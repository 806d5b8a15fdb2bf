//! Worker pool dispatching files to the semantic index adapter
//!
//! Tree-sitter parsers are not `Sync`, so each worker thread owns its own
//! [`Normalizer`] and pulls requests from a shared channel. Callers wait for
//! each file with a deadline; a file that overruns it degrades to a parse
//! failure and a replacement worker keeps the pool at full strength.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cppcia_core::ParseOutcome;

use crate::adapter::SemanticIndexAdapter;
use crate::error::{IndexerError, Result};
use crate::fingerprints::FingerprintCache;
use crate::normalize::Normalizer;

/// Pool sizing and per-file deadline.
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub workers: usize,
    pub timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            workers: std::thread::available_parallelism()
                .map(|n| n.get().max(2))
                .unwrap_or(2),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Result of scanning one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Content fingerprint matches the cache; the adapter was not asked.
    Unchanged(PathBuf),
    Changed(ParseOutcome),
}

impl ScanOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ScanOutcome::Unchanged(path) => path,
            ScanOutcome::Changed(outcome) => outcome.path(),
        }
    }

    /// The parse result to merge, if any.
    pub fn into_parse_outcome(self) -> Option<ParseOutcome> {
        match self {
            ScanOutcome::Unchanged(_) => None,
            ScanOutcome::Changed(outcome) => Some(outcome),
        }
    }
}

enum WorkerEvent {
    Started,
    Finished(ScanOutcome),
}

/// Internal message for the parser worker
struct WorkerRequest {
    path: PathBuf,
    events: Sender<WorkerEvent>,
}

struct WorkerContext {
    root: PathBuf,
    adapter: Arc<dyn SemanticIndexAdapter>,
    cache: Arc<FingerprintCache>,
    receiver: Mutex<Receiver<WorkerRequest>>,
    spawned: AtomicUsize,
}

/// Thread-safe parser pool
#[derive(Clone)]
pub struct ParserPool {
    sender: Sender<WorkerRequest>,
    context: Arc<WorkerContext>,
    timeout: Duration,
}

impl ParserPool {
    /// Start `options.workers` threads reading files under `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        adapter: Arc<dyn SemanticIndexAdapter>,
        cache: Arc<FingerprintCache>,
        options: PoolOptions,
    ) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<WorkerRequest>();
        let context = Arc::new(WorkerContext {
            root: root.into(),
            adapter,
            cache,
            receiver: Mutex::new(receiver),
            spawned: AtomicUsize::new(0),
        });

        for _ in 0..options.workers.max(1) {
            spawn_worker(&context)?;
        }

        Ok(Self {
            sender,
            context,
            timeout: options.timeout,
        })
    }

    /// Scan files (root-relative) and return one outcome per path, in order.
    /// Blocks the current thread.
    pub fn scan_blocking(&self, paths: &[PathBuf]) -> Result<Vec<ScanOutcome>> {
        let started = Instant::now();
        let mut pending = Vec::with_capacity(paths.len());

        for path in paths {
            let (events, receiver) = mpsc::channel();
            self.sender
                .send(WorkerRequest {
                    path: path.clone(),
                    events,
                })
                .map_err(|_| IndexerError::PoolShutDown)?;
            pending.push((path.clone(), receiver));
        }

        let outcomes: Vec<ScanOutcome> = pending
            .into_iter()
            .map(|(path, receiver)| self.await_outcome(path, receiver))
            .collect();

        let changed = outcomes
            .iter()
            .filter(|o| matches!(o, ScanOutcome::Changed(_)))
            .count();
        tracing::info!(
            files = outcomes.len(),
            changed,
            adapter = self.context.adapter.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scan complete"
        );
        Ok(outcomes)
    }

    /// Scan asynchronously using the parser pool
    pub async fn scan(&self, paths: Vec<PathBuf>) -> Result<Vec<ScanOutcome>> {
        // Use spawn_blocking to run the synchronous scan in a blocking context
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.scan_blocking(&paths)).await?
    }

    fn await_outcome(&self, path: PathBuf, receiver: Receiver<WorkerEvent>) -> ScanOutcome {
        // The deadline starts once a worker picks the file up.
        match receiver.recv() {
            Ok(WorkerEvent::Started) => {}
            Ok(WorkerEvent::Finished(outcome)) => return outcome,
            Err(_) => return self.worker_lost(path, "parser worker died"),
        }

        match receiver.recv_timeout(self.timeout) {
            Ok(WorkerEvent::Finished(outcome)) => outcome,
            Ok(WorkerEvent::Started) => failed(path, "parser worker protocol error".to_string()),
            Err(RecvTimeoutError::Timeout) => {
                let reason = format!("timed out after {} ms", self.timeout.as_millis());
                self.worker_lost(path, &reason)
            }
            Err(RecvTimeoutError::Disconnected) => self.worker_lost(path, "parser worker died"),
        }
    }

    /// Record a failure for a file whose worker is gone or stuck, and replace it.
    fn worker_lost(&self, path: PathBuf, reason: &str) -> ScanOutcome {
        tracing::warn!(path = %path.display(), "Parse failed: {}", reason);
        if let Err(e) = spawn_worker(&self.context) {
            tracing::warn!("Failed to spawn replacement parser worker: {}", e);
        }
        failed(path, reason.to_string())
    }
}

fn failed(path: PathBuf, reason: String) -> ScanOutcome {
    ScanOutcome::Changed(ParseOutcome::Failed { path, reason })
}

fn spawn_worker(context: &Arc<WorkerContext>) -> Result<()> {
    let worker_id = context.spawned.fetch_add(1, Ordering::Relaxed);
    let context = Arc::clone(context);
    std::thread::Builder::new()
        .name(format!("cppcia-parser-{}", worker_id))
        .spawn(move || worker_thread(worker_id, context))?;
    Ok(())
}

/// Worker thread function that processes scan requests
fn worker_thread(worker_id: usize, context: Arc<WorkerContext>) {
    tracing::debug!("Parser worker {} started", worker_id);
    let mut normalizer = Normalizer::new();

    loop {
        let request = {
            let receiver = match context.receiver.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            receiver.recv()
        };
        let Ok(WorkerRequest { path, events }) = request else {
            tracing::debug!("Parser worker {} shutting down", worker_id);
            break;
        };

        // A closed channel only means the caller gave up on this file.
        let _ = events.send(WorkerEvent::Started);
        let outcome = scan_file(&context, &mut normalizer, path);
        let _ = events.send(WorkerEvent::Finished(outcome));
    }
}

fn scan_file(context: &WorkerContext, normalizer: &mut Normalizer, path: PathBuf) -> ScanOutcome {
    let content = match std::fs::read(context.root.join(&path)) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Cannot read file: {}", e);
            return failed(path, format!("cannot read file: {}", e));
        }
    };

    let fingerprint = normalizer.fingerprint(&path, &content);
    if context.cache.is_unchanged(&path, fingerprint) {
        tracing::debug!(path = %path.display(), "Fingerprint unchanged, skipping");
        return ScanOutcome::Unchanged(path);
    }

    let adapter = &context.adapter;
    let result = catch_unwind(AssertUnwindSafe(|| adapter.parse(&path, &content, fingerprint)));
    match result {
        Ok(Ok(mut facts)) => {
            facts.path = path;
            facts.fingerprint = fingerprint;
            tracing::debug!(
                path = %facts.path.display(),
                declarations = facts.declarations.len(),
                "Parsed"
            );
            ScanOutcome::Changed(ParseOutcome::Parsed(facts))
        }
        Ok(Err(e)) => {
            tracing::warn!(path = %path.display(), "Parse failed: {:#}", e);
            failed(path, format!("{:#}", e))
        }
        Err(_) => {
            tracing::warn!(path = %path.display(), "Adapter panicked");
            failed(path, "adapter panicked".to_string())
        }
    }
}
