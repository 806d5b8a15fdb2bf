//! Dependency graph model, graph store, deltas and persistence

pub mod cache;
pub mod changeset;
pub mod cycles;
pub mod diff;
pub mod error;
pub mod facts;
pub mod graph;
pub mod model;
pub mod shared;

pub use cache::{
    cache_dir, clear_cache, load_state, save_state, state_path, PersistedState, CACHE_DIR,
    FORMAT_VERSION,
};
pub use changeset::{ChangeSet, DeclChange, DeltaKind, FileChange};
pub use cycles::include_cycles;
pub use diff::{ChangedDecl, DeclEntry, GraphDelta, MovedDecl, ParseFailure};
pub use error::{CoreError, Result};
pub use facts::{DeclFacts, DeclRole, FileFacts, MacroUse, ParseOutcome, ReferenceFacts};
pub use graph::{GraphStore, RemovedFile, SemanticConflict, StoreStats, UpsertOutcome};
pub use model::{
    normalize_path, DeclId, DeclKey, DeclKind, Declaration, Edge, EdgeKind, Entity, FileId,
    FileRecord, Fingerprint, RefKind,
};
pub use shared::SharedStore;
