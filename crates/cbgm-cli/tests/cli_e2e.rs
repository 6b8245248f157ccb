//! End-to-end CLI tests: build a cache from a small collation and drive the
//! table and DOT commands against it.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn cbgm_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cbgm"))
}

fn run(args: &[&str], cwd: &Path) -> Output {
    Command::new(cbgm_bin())
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("spawn cbgm")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Three-unit collation: W2 descends from the initial text A at u1 and u3,
/// agrees at u2; W1 matches A throughout.
fn collation_json() -> &'static str {
    r#"{
        "witnesses": ["A", "W1", "W2"],
        "units": [
            {
                "id": "u1",
                "label": "1:1",
                "connectivity": 3,
                "readings": [
                    {"id": "a", "witnesses": ["A", "W1"]},
                    {"id": "b", "witnesses": ["W2"]}
                ],
                "edges": [{"prior": "a", "posterior": "b", "weight": 1.0}]
            },
            {
                "id": "u2",
                "label": "1:2",
                "readings": [
                    {"id": "a", "witnesses": ["A", "W1", "W2"]}
                ],
                "edges": []
            },
            {
                "id": "u3",
                "label": "1:3",
                "readings": [
                    {"id": "a", "witnesses": ["A", "W1"]},
                    {"id": "b", "witnesses": ["W2"]}
                ],
                "edges": [{"prior": "a", "posterior": "b", "weight": 2.0}]
            }
        ]
    }"#
}

fn build_fixture_cache(dir: &TempDir) -> PathBuf {
    let collation = dir.path().join("collation.json");
    fs::write(&collation, collation_json()).unwrap();
    let cache = dir.path().join("cache.cbgc");
    let output = run(
        &[
            "build-cache",
            collation.to_str().unwrap(),
            cache.to_str().unwrap(),
        ],
        dir.path(),
    );
    assert!(
        output.status.success(),
        "build-cache failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(cache.exists());
    cache
}

#[test]
fn build_then_compare_witnesses_json() {
    let dir = TempDir::new().unwrap();
    let cache = build_fixture_cache(&dir);

    let output = run(
        &[
            "compare-witnesses",
            cache.to_str().unwrap(),
            "W2",
            "-f",
            "json",
        ],
        dir.path(),
    );
    assert!(output.status.success());
    let text = stdout(&output);
    let json_start = text.find('{').unwrap();
    let v: serde_json::Value = serde_json::from_str(&text[json_start..]).unwrap();
    let rows = v["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    // A outranks W1 only by ID; both are prior to W2 at u1 and u3.
    assert_eq!(rows[0]["SECONDARY_WIT"], "A");
    assert_eq!(rows[0]["NR"], "1");
    assert_eq!(rows[0]["POSTERIOR"], "2");
    assert_eq!(rows[0]["COST"], "3");
}

#[test]
fn optimize_substemmata_reports_the_minimum() {
    let dir = TempDir::new().unwrap();
    let cache = build_fixture_cache(&dir);

    let output = run(
        &[
            "optimize-substemmata",
            cache.to_str().unwrap(),
            "W2",
            "-f",
            "csv",
        ],
        dir.path(),
    );
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("SUBSTEMMA,COST,COVERED"));
    assert!(text.contains("A,3,3"));
}

#[test]
fn enumerate_relationships_lists_passages_by_label() {
    let dir = TempDir::new().unwrap();
    let cache = build_fixture_cache(&dir);

    let output = run(
        &[
            "enumerate-relationships",
            cache.to_str().unwrap(),
            "W2",
            "A",
            "--filter",
            "posterior",
            "-f",
            "tsv",
        ],
        dir.path(),
    );
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("1:1\tposterior"));
    assert!(text.contains("1:3\tposterior"));
    assert!(!text.contains("1:2\tposterior"));
}

#[test]
fn find_relatives_shows_readings_at_the_unit() {
    let dir = TempDir::new().unwrap();
    let cache = build_fixture_cache(&dir);

    let output = run(
        &[
            "find-relatives",
            cache.to_str().unwrap(),
            "W2",
            "u1",
            "-f",
            "csv",
        ],
        dir.path(),
    );
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("A,a,1"));
    assert!(text.contains("W1,a,2"));
}

#[test]
fn dot_commands_write_their_files() {
    let dir = TempDir::new().unwrap();
    let cache = build_fixture_cache(&dir);
    let cache_arg = cache.to_str().unwrap();

    let output = run(&["print-local-stemma", cache_arg], dir.path());
    assert!(output.status.success());
    let local = fs::read_to_string(dir.path().join("local/u1-local-stemma.dot")).unwrap();
    assert!(local.starts_with("digraph local_stemma {"));

    let output = run(&["print-textual-flow", cache_arg, "u1", "--flow"], dir.path());
    assert!(output.status.success());
    let flow = fs::read_to_string(dir.path().join("flow/u1-textual-flow.dot")).unwrap();
    assert!(flow.contains("W2 (b)"));

    let output = run(&["print-global-stemma", cache_arg, "--lengths"], dir.path());
    assert!(output.status.success());
    let global = fs::read_to_string(dir.path().join("global/global-stemma.dot")).unwrap();
    assert!(global.starts_with("digraph global_stemma {"));
    assert!(global.contains("W2"));
}

#[test]
fn unknown_witness_is_a_user_error() {
    let dir = TempDir::new().unwrap();
    let cache = build_fixture_cache(&dir);

    let output = run(
        &["compare-witnesses", cache.to_str().unwrap(), "nope"],
        dir.path(),
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown witness"));
}

#[test]
fn missing_cache_is_a_user_error() {
    let dir = TempDir::new().unwrap();
    let output = run(
        &["compare-witnesses", "absent.cbgc", "W2"],
        dir.path(),
    );
    assert_eq!(output.status.code(), Some(1));
}
