//! Change impact propagation over a graph store snapshot, and report assembly

pub mod propagate;
pub mod report;

pub use propagate::{
    compute_impact, EntityLabel, Impact, ImpactClass, ImpactResult, PropagationOptions,
    ProvenanceStep,
};
pub use report::{assemble, Diagnostics, ImpactReport, ProvenanceTriple, ReportEntry, ReportSummary};
