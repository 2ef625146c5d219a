use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("app/services")).unwrap();
    fs::create_dir_all(root.join("node_modules/lib")).unwrap();
    fs::write(root.join("app/services/user.py"), "def user():\n    pass\n").unwrap();
    fs::write(root.join("app/main.ts"), "export const x = 1;\n").unwrap();
    fs::write(root.join("node_modules/lib/index.js"), "module.exports = {};\n").unwrap();
    fs::write(root.join("README.md"), "# readme\n").unwrap();
    dir
}

fn codepack(config_dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("codepack");
    cmd.arg("--config-dir").arg(config_dir);
    cmd.env_remove("PROJECT_ROOT");
    cmd
}

#[test]
fn help_lists_commands() {
    let mut cmd = cargo_bin_cmd!("codepack");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("template"));
}

#[test]
fn scan_json_skips_excluded_directories() {
    let project = project();
    let config = TempDir::new().unwrap();
    let output = codepack(config.path())
        .args(["scan", "-f", "json", "--root"])
        .arg(project.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["total"], 2);
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("user.py"));
    assert!(text.contains("main.ts"));
    assert!(!text.contains("node_modules"));
    assert!(!text.contains("README.md"));
}

#[test]
fn export_writes_bom_prefixed_bundle() {
    let project = project();
    let config = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    codepack(config.path())
        .args(["export", "--name", "bundle", "--root"])
        .arg(project.path())
        .arg("-o")
        .arg(out.path())
        .assert()
        .success();

    let bytes = fs::read(out.path().join("bundle.txt")).unwrap();
    assert_eq!(&bytes[..3], &[0xEF, 0xBB, 0xBF]);
    let text = String::from_utf8_lossy(&bytes[3..]);
    assert!(text.contains("def user():"));
    assert!(text.contains("export const x = 1;"));
    assert!(text.contains(&"=".repeat(80)));
}

#[test]
fn export_with_glob_groups_by_folder() {
    let project = project();
    let config = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    codepack(config.path())
        .args(["export", "--glob", "app/services/", "--group-by", "folder", "--root"])
        .arg(project.path())
        .arg("-o")
        .arg(out.path())
        .assert()
        .success();

    assert!(out.path().join("services.txt").is_file());
    assert!(!out.path().join("app.txt").exists());
}

#[test]
fn duplicate_template_exits_with_code_three() {
    let project = project();
    let config = TempDir::new().unwrap();
    codepack(config.path())
        .args(["template", "create", "api", "--root"])
        .arg(project.path())
        .assert()
        .success();
    assert!(config.path().join("templates/api.json").is_file());

    codepack(config.path())
        .args(["template", "list", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"api\""));

    codepack(config.path())
        .args(["template", "create", "api", "--root"])
        .arg(project.path())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn unknown_template_exits_with_code_three() {
    let config = TempDir::new().unwrap();
    codepack(config.path())
        .args(["template", "show", "missing"])
        .assert()
        .code(3);
}

#[test]
fn config_set_is_persisted() {
    let config = TempDir::new().unwrap();
    codepack(config.path())
        .args(["config", "set", "max_workers", "3"])
        .assert()
        .success();
    codepack(config.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"max_workers\": 3"));

    codepack(config.path())
        .args(["config", "set", "no_such_key", "1"])
        .assert()
        .code(1);
}

#[test]
fn config_set_is_rejected_without_stored_config() {
    let mut cmd = cargo_bin_cmd!("codepack");
    cmd.args(["--no-config", "config", "set", "max_workers", "3"])
        .assert()
        .code(1);
}

#[test]
fn invalid_root_exits_with_code_two() {
    let config = TempDir::new().unwrap();
    codepack(config.path())
        .args(["scan", "--root"])
        .arg(config.path().join("does-not-exist"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn selection_round_trips_through_csv() {
    let project = project();
    let config = TempDir::new().unwrap();
    let csv = config.path().join("selection.csv");
    codepack(config.path())
        .args(["selection", "save"])
        .arg(&csv)
        .args(["--glob", "**/*.py", "--root"])
        .arg(project.path())
        .assert()
        .success();

    let output = codepack(config.path())
        .args(["selection", "load"])
        .arg(&csv)
        .args(["-f", "json", "--root"])
        .arg(project.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["matched"], 1);
    assert_eq!(report["missing"].as_array().map(Vec::len), Some(0));
}
