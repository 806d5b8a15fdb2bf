//! Integration tests for cppcia
//!
//! These drive the built binary over a small tree with facts documents.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn facts_for_a(root: &Path, signature: &str) {
    write(
        root,
        ".cppcia/facts/src/a.h.json",
        &format!(
            r#"{{ "declarations": [{{ "key": {{ "qualified_name": "f" }}, "kind": "function",
                 "signature": "{signature}", "body": "000000000000000000000000000000aa" }}] }}"#
        ),
    );
}

fn tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "src/a.h", "#pragma once\nint f(int x);\n");
    write(root, "src/b.cc", "#include \"a.h\"\nvoid caller() { f(1); }\n");
    facts_for_a(root, "00000000000000000000000000000001");
    write(
        root,
        ".cppcia/facts/src/b.cc.json",
        r#"{ "includes": ["a.h"], "declarations": [{
             "key": { "qualified_name": "caller" }, "kind": "function",
             "signature": "000000000000000000000000000000bb", "body": "000000000000000000000000000000cc",
             "references": [{ "target": { "qualified_name": "f" }, "kind": "calls" }] }] }"#,
    );
    dir
}

fn cppcia(root: &Path, args: &[&str]) -> Output {
    let output = Command::new(env!("CARGO_BIN_EXE_cppcia"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "cppcia {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn impact_json(root: &Path, args: &[&str]) -> Value {
    let mut all = vec!["impact", "--json"];
    all.extend_from_slice(args);
    serde_json::from_slice(&cppcia(root, &all).stdout).unwrap()
}

fn entry<'a>(report: &'a Value, section: &str, entity: &str) -> Option<&'a Value> {
    report[section]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["entity"] == entity)
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_cppcia"))
        .arg("--help")
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Change impact analysis for C++ codebases"));
}

#[test]
fn test_index_persists_state() {
    let dir = tree();
    cppcia(dir.path(), &["index"]);
    assert!(dir.path().join(".cppcia/graph.bin").exists());

    // Nothing changed since: the delta is empty.
    let report = impact_json(dir.path(), &[]);
    assert_eq!(report["summary"]["files"], 0);
    assert_eq!(report["summary"]["declarations"], 0);
}

#[test]
fn test_default_root_indexes_working_directory() {
    let dir = tree();
    let output = Command::new(env!("CARGO_BIN_EXE_cppcia"))
        .current_dir(dir.path())
        .arg("index")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    assert!(String::from_utf8_lossy(&output.stdout).starts_with("+2/-0 files"));

    // The absolute root sees the same tree: nothing added or removed.
    let report = impact_json(dir.path(), &[]);
    assert_eq!(report["summary"]["files"], 0);
}

#[test]
fn test_signature_edit_reported_against_caller() {
    let dir = tree();
    cppcia(dir.path(), &["index"]);

    write(dir.path(), "src/a.h", "#pragma once\nint f(long x);\n");
    facts_for_a(dir.path(), "00000000000000000000000000000002");
    let report = impact_json(dir.path(), &[]);

    let caller = entry(&report, "declarations", "src/b.cc:caller").unwrap();
    assert_eq!(caller["class"], "signature-impacted");
    assert_eq!(caller["provenance"][0]["source"], "src/a.h:f");
    assert_eq!(caller["provenance"][0]["edge"], "calls");
    assert_eq!(caller["provenance"][0]["target"], "src/b.cc:caller");
}

#[test]
fn test_explicit_body_edit_stays_in_header() {
    let dir = tree();
    let report = impact_json(dir.path(), &["--decl", "src/a.h=f", "--body-only"]);

    assert_eq!(entry(&report, "declarations", "src/a.h:f").unwrap()["class"], "body-only-impacted");
    assert!(entry(&report, "files", "src/b.cc").is_none());
}

#[test]
fn test_explicit_edit_names_one_overload() {
    let dir = tree();
    write(
        dir.path(),
        "src/c.cc",
        "int h(int x) { return x; }\nlong h(long x) { return x; }\nint use_int() { return h(1); }\n",
    );
    write(
        dir.path(),
        ".cppcia/facts/src/c.cc.json",
        r#"{ "declarations": [
             { "key": { "qualified_name": "h", "discriminator": "(int)" }, "kind": "function",
               "signature": "00000000000000000000000000000011", "body": "00000000000000000000000000000012" },
             { "key": { "qualified_name": "h", "discriminator": "(long)" }, "kind": "function",
               "signature": "00000000000000000000000000000021", "body": "00000000000000000000000000000022" },
             { "key": { "qualified_name": "use_int" }, "kind": "function",
               "signature": "00000000000000000000000000000031", "body": "00000000000000000000000000000032",
               "references": [{ "target": { "qualified_name": "h", "discriminator": "(int)" }, "kind": "calls" }] }
           ] }"#,
    );

    let report = impact_json(dir.path(), &["--decl", "src/c.cc=h#(int)"]);
    assert_eq!(entry(&report, "declarations", "src/c.cc:h#(int)").unwrap()["root"], true);
    assert_eq!(entry(&report, "declarations", "src/c.cc:use_int").unwrap()["class"], "signature-impacted");
    assert!(entry(&report, "declarations", "src/c.cc:h#(long)").is_none());
}

#[test]
fn test_explicit_file_change_is_textual_for_includers() {
    let dir = tree();
    let report = impact_json(dir.path(), &["--changed", "src/a.h"]);

    assert_eq!(entry(&report, "files", "src/b.cc").unwrap()["class"], "textual-impacted");
    assert!(entry(&report, "declarations", "src/b.cc:caller").is_none());
}

#[test]
fn test_missing_facts_reported_as_failure() {
    let dir = tree();
    cppcia(dir.path(), &["index"]);

    write(dir.path(), "src/c.cc", "int c;\n");
    let report = impact_json(dir.path(), &[]);
    assert_eq!(report["diagnostics"]["failures"][0]["path"], "src/c.cc");
    assert_eq!(entry(&report, "files", "src/c.cc").unwrap()["root"], true);
}

#[test]
fn test_clear_keeps_facts() {
    let dir = tree();
    cppcia(dir.path(), &["index"]);
    cppcia(dir.path(), &["clear"]);

    assert!(!dir.path().join(".cppcia/graph.bin").exists());
    assert!(dir.path().join(".cppcia/facts/src/a.h.json").exists());
}
