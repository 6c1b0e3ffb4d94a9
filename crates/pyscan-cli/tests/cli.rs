use std::fs;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

fn write(dir: &TempDir, rel: &str, content: &str) {
    let path = dir.path().join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn scans_a_tree_and_emits_stats_line() {
    let dir = TempDir::new().unwrap();
    write(&dir, "pkg/__init__.py", "");
    write(&dir, "pkg/util.py", "def greet():\n    return 'hi'\n");
    write(
        &dir,
        "pkg/worker.py",
        "from .util import greet\n\ndef run():\n    return greet()\n",
    );

    let mut cmd = Command::cargo_bin("static-pyscan").unwrap();
    let assert = cmd
        .arg("--root")
        .arg(dir.path())
        .arg("--workers")
        .arg("1")
        .assert()
        .success()
        .stderr(contains("PYSCAN_STATS"));

    let output = assert.get_output();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["engine"], "static-pyscan");
    let edges = report["edges"].as_array().unwrap();
    let callees: Vec<&str> = edges.iter().map(|e| e["callee"].as_str().unwrap()).collect();
    assert!(callees.contains(&"pkg.util.greet"));
}

#[test]
fn writes_report_to_out_file() {
    let dir = TempDir::new().unwrap();
    write(&dir, "mod.py", "def f():\n    pass\n");
    let out_path = dir.path().join("report.json");

    Command::cargo_bin("static-pyscan")
        .unwrap()
        .arg("--root")
        .arg(dir.path())
        .arg("--out")
        .arg(&out_path)
        .assert()
        .success();

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out_path).unwrap()).unwrap();
    assert!(report["functions"].as_array().unwrap().iter().any(|f| f["name"] == "f"));
}

#[test]
fn rejects_invalid_hash_mode() {
    let dir = TempDir::new().unwrap();
    write(&dir, "mod.py", "def f():\n    pass\n");

    Command::cargo_bin("static-pyscan")
        .unwrap()
        .arg("--root")
        .arg(dir.path())
        .arg("--hash-mode")
        .arg("crc32")
        .assert()
        .failure();
}

#[test]
fn rejects_missing_root() {
    Command::cargo_bin("static-pyscan")
        .unwrap()
        .arg("--root")
        .arg("/definitely/not/a/real/path")
        .assert()
        .failure();
}
