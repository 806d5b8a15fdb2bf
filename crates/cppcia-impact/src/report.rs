//! Result assembly: turns an [`ImpactResult`] into an order-stable report

use std::fmt;
use std::path::PathBuf;

use cppcia_core::{CoreError, DeclKind, Entity, GraphDelta, ParseFailure, SemanticConflict};
use serde::Serialize;

use crate::propagate::{Impact, ImpactClass, ImpactResult};

/// One `(source, edge, target)` step, endpoints rendered as `file:name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvenanceTriple {
    pub source: String,
    pub edge: String,
    pub target: String,
}

impl fmt::Display for ProvenanceTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --{}--> {}", self.source, self.edge, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    /// `path` for files, `path:name` for declarations.
    pub entity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<DeclKind>,
    pub class: ImpactClass,
    /// Named directly by the change set.
    pub root: bool,
    pub depth: usize,
    pub provenance: Vec<ProvenanceTriple>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub roots: usize,
    pub files: usize,
    pub declarations: usize,
    pub signature_impacted: usize,
    pub body_only_impacted: usize,
    pub textual_impacted: usize,
    pub truncated: usize,
}

impl ReportSummary {
    fn count(&mut self, class: ImpactClass) {
        match class {
            ImpactClass::Signature => self.signature_impacted += 1,
            ImpactClass::BodyOnly => self.body_only_impacted += 1,
            ImpactClass::Textual => self.textual_impacted += 1,
            ImpactClass::Truncated => self.truncated += 1,
        }
    }
}

/// Recovered problems from the update that fed the analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub conflicts: Vec<SemanticConflict>,
    /// Files assumed fully impacted because no facts were available.
    pub failures: Vec<ParseFailure>,
}

impl Diagnostics {
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty() && self.failures.is_empty()
    }
}

/// The assembled, deterministic impact report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImpactReport {
    pub summary: ReportSummary,
    pub files: Vec<ReportEntry>,
    pub declarations: Vec<ReportEntry>,
    #[serde(skip_serializing_if = "Diagnostics::is_empty")]
    pub diagnostics: Diagnostics,
}

impl ImpactReport {
    /// Attach conflicts and parse failures recorded in `delta`.
    pub fn with_diagnostics(mut self, delta: &GraphDelta) -> Self {
        self.diagnostics.conflicts.extend(delta.conflicts.iter().cloned());
        self.diagnostics.failures.extend(delta.failures.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.declarations.is_empty()
    }

    pub fn entry(&self, entity: &str) -> Option<&ReportEntry> {
        self.files
            .iter()
            .chain(&self.declarations)
            .find(|e| e.entity == entity)
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for ImpactReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.summary;
        writeln!(
            f,
            "{} files, {} declarations impacted ({} signature, {} body-only, {} textual, {} truncated)",
            s.files, s.declarations, s.signature_impacted, s.body_only_impacted, s.textual_impacted, s.truncated
        )?;
        for (title, entries) in [("Files", &self.files), ("Declarations", &self.declarations)] {
            if entries.is_empty() {
                continue;
            }
            writeln!(f, "\n{}:", title)?;
            for entry in entries {
                let marker = if entry.root { " (changed)" } else { "" };
                writeln!(f, "  {} [{}]{}", entry.entity, entry.class, marker)?;
                for step in &entry.provenance {
                    writeln!(f, "      {}", step)?;
                }
            }
        }
        for conflict in &self.diagnostics.conflicts {
            writeln!(
                f,
                "warning: {} in {} is a {:?}, kept as {:?}",
                conflict.key,
                conflict.file.display(),
                conflict.rejected,
                conflict.kept
            )?;
        }
        for failure in &self.diagnostics.failures {
            writeln!(f, "warning: {} could not be parsed: {}", failure.path.display(), failure.reason)?;
        }
        Ok(())
    }
}

/// Sort, label and validate `result`.
///
/// Fails with [`CoreError::MalformedResult`] when the result could not have
/// been produced by propagation: an unlabelled entity, a chain that does not
/// lead from a root to its entity, or a non-root without a chain.
pub fn assemble(result: &ImpactResult) -> Result<ImpactReport, CoreError> {
    let mut report = ImpactReport::default();
    report.summary.roots = result.roots.len();

    for (&entity, impact) in &result.entries {
        validate(result, entity, impact)?;
        let label = result
            .labels
            .get(&entity)
            .ok_or_else(|| malformed(format!("no label for {:?}", entity)))?;

        let provenance = impact
            .chain
            .iter()
            .map(|step| ProvenanceTriple {
                source: result.label(step.source),
                edge: step.kind.to_string(),
                target: result.label(step.target),
            })
            .collect();

        let entry = ReportEntry {
            entity: label.to_string(),
            file: label.file.clone(),
            name: label.name.clone(),
            kind: label.kind,
            class: impact.class,
            root: result.roots.contains(&entity),
            depth: impact.depth,
            provenance,
        };
        report.summary.count(entry.class);
        match entity {
            Entity::File(_) => {
                if entry.file.is_none() {
                    return Err(malformed(format!("file {:?} has no path", entity)));
                }
                report.files.push(entry);
            }
            Entity::Decl(_) => report.declarations.push(entry),
        }
    }

    report.files.sort_by(|a, b| a.file.cmp(&b.file));
    report
        .declarations
        .sort_by(|a, b| (&a.file, &a.name).cmp(&(&b.file, &b.name)));
    report.summary.files = report.files.len();
    report.summary.declarations = report.declarations.len();
    Ok(report)
}

fn validate(result: &ImpactResult, entity: Entity, impact: &Impact) -> Result<(), CoreError> {
    if !result.roots.contains(&impact.root) {
        return Err(malformed(format!("{:?} traces to a non-root", entity)));
    }
    let (Some(first), Some(last)) = (impact.chain.first(), impact.chain.last()) else {
        if result.roots.contains(&entity) {
            return Ok(());
        }
        return Err(malformed(format!("{:?} has no provenance", entity)));
    };
    if first.source != impact.root || last.target != entity {
        return Err(malformed(format!("chain of {:?} is not anchored", entity)));
    }
    if impact.chain.windows(2).any(|w| w[0].target != w[1].source) {
        return Err(malformed(format!("chain of {:?} is broken", entity)));
    }
    for step in &impact.chain {
        for end in [step.source, step.target] {
            if !result.labels.contains_key(&end) {
                return Err(malformed(format!("no label for {:?}", end)));
            }
        }
    }
    Ok(())
}

fn malformed(message: String) -> CoreError {
    CoreError::MalformedResult(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagate::{compute_impact, PropagationOptions, ProvenanceStep};
    use cppcia_core::{
        ChangeSet, DeclFacts, DeclKey, DeltaKind, EdgeKind, FileFacts, FileId, Fingerprint,
        GraphStore, RefKind,
    };
    use std::path::Path;

    fn function(name: &str) -> DeclFacts {
        DeclFacts::definition(DeclKey::named(name), DeclKind::Function, name, "{}")
            .referencing(DeclKey::named("f"), RefKind::Calls)
    }

    fn store() -> GraphStore {
        let mut store = GraphStore::new();
        store.upsert_file(&FileFacts::new("a.h", Fingerprint::of(b"a")).declare(
            DeclFacts::definition(DeclKey::named("f"), DeclKind::Function, "int f(int)", "{}"),
        ));
        store.upsert_file(
            &FileFacts::new("c.cc", Fingerprint::of(b"c"))
                .include("a.h")
                .declare(function("zeta")),
        );
        store.upsert_file(
            &FileFacts::new("b.cc", Fingerprint::of(b"b"))
                .include("a.h")
                .declare(function("caller"))
                .declare(function("alpha")),
        );
        store
    }

    fn signature_change() -> ChangeSet {
        let mut changes = ChangeSet::new();
        changes.declaration("a.h", DeclKey::named("f"), DeclKind::Function, DeltaKind::Signature);
        changes
    }

    fn report() -> ImpactReport {
        let result = compute_impact(&store(), &signature_change(), &PropagationOptions::default());
        assemble(&result).unwrap()
    }

    #[test]
    fn test_entries_sorted_by_file_then_name() {
        let report = report();
        let files: Vec<_> = report.files.iter().map(|e| e.entity.as_str()).collect();
        assert_eq!(files, vec!["a.h", "b.cc", "c.cc"]);

        let decls: Vec<_> = report.declarations.iter().map(|e| e.entity.as_str()).collect();
        assert_eq!(decls, vec!["a.h:f", "b.cc:alpha", "b.cc:caller", "c.cc:zeta"]);
    }

    #[test]
    fn test_provenance_rendered_as_triples() {
        let report = report();
        let caller = report.entry("b.cc:caller").unwrap();
        assert_eq!(caller.class, ImpactClass::Signature);
        assert!(!caller.root);
        assert_eq!(caller.provenance.len(), 1);
        assert_eq!(caller.provenance[0].to_string(), "a.h:f --calls--> b.cc:caller");

        let root = report.entry("a.h:f").unwrap();
        assert!(root.root);
        assert!(root.provenance.is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let summary = report().summary;
        assert_eq!(summary.roots, 1);
        assert_eq!(summary.files, 3);
        assert_eq!(summary.declarations, 4);
        assert_eq!(summary.signature_impacted, 7);
        assert_eq!(summary.truncated, 0);
    }

    #[test]
    fn test_json_is_byte_identical() {
        let first = report().to_json().unwrap();
        assert_eq!(report().to_json().unwrap(), first);
        assert!(first.contains("\"signature-impacted\""));
        assert!(!first.contains("diagnostics"));
    }

    #[test]
    fn test_diagnostics_attached_from_delta() {
        let mut delta = GraphDelta::new(3);
        delta.failures.push(ParseFailure {
            path: PathBuf::from("broken.cc"),
            reason: "timed out".into(),
        });
        let report = report().with_diagnostics(&delta);
        assert_eq!(report.diagnostics.failures.len(), 1);
        assert!(report.to_string().contains("broken.cc could not be parsed"));
    }

    #[test]
    fn test_rejects_unanchored_chain() {
        let mut result = compute_impact(&store(), &signature_change(), &PropagationOptions::default());
        let caller = Entity::Decl(DeclKey::named("caller").id());
        let stray = Entity::File(FileId::of(Path::new("c.cc")));
        result.entries.get_mut(&caller).unwrap().chain = vec![ProvenanceStep {
            source: stray,
            kind: EdgeKind::Includes,
            target: caller,
        }];
        assert!(matches!(assemble(&result), Err(CoreError::MalformedResult(_))));
    }

    #[test]
    fn test_rejects_non_root_without_chain() {
        let mut result = compute_impact(&store(), &signature_change(), &PropagationOptions::default());
        let caller = Entity::Decl(DeclKey::named("caller").id());
        result.entries.get_mut(&caller).unwrap().chain.clear();
        assert!(matches!(assemble(&result), Err(CoreError::MalformedResult(_))));
    }

    #[test]
    fn test_rejects_missing_label() {
        let mut result = compute_impact(&store(), &signature_change(), &PropagationOptions::default());
        result.labels.clear();
        assert!(matches!(assemble(&result), Err(CoreError::MalformedResult(_))));
    }
}
