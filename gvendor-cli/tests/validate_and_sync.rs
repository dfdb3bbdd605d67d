use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;

use gvendor_core::{config, PathMapping, RefSpec, VendorConfig, VendorName, VendorSpec};
use tempfile::TempDir;

fn gvendor_cmd(home: &Path, root: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("gvendor"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1")
        .env("GIT_TERMINAL_PROMPT", "0")
        .arg("-C")
        .arg(root);
    cmd
}

fn vendor(name: &str, mappings: &[(&str, &str)]) -> VendorSpec {
    VendorSpec {
        name: VendorName::from(name),
        url: format!("file:///nonexistent/gvendor-tests/{name}.git"),
        license: "MIT".to_string(),
        groups: vec![],
        hooks: None,
        specs: vec![RefSpec {
            git_ref: "main".to_string(),
            default_target: String::new(),
            mapping: mappings.iter().map(|(f, t)| PathMapping::new(*f, *t)).collect(),
        }],
    }
}

fn project(vendors: Vec<VendorSpec>) -> TempDir {
    let root = TempDir::new().expect("project");
    config::save_config_at(root.path(), &VendorConfig { vendors }).expect("save config");
    root
}

#[test]
fn validate_accepts_clean_config() {
    let home = TempDir::new().unwrap();
    let root = project(vec![
        vendor("alpha", &[("src/a.go", "vendor/a.go")]),
        vendor("beta", &[("src/b.go:L1-L10", "vendor/b.go")]),
    ]);
    gvendor_cmd(home.path(), root.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(contains("2 vendor(s), no conflicts"));
}

#[test]
fn validate_reports_conflicting_destinations() {
    let home = TempDir::new().unwrap();
    let root = project(vec![
        vendor("alpha", &[("x.go", "lib/shared.go")]),
        vendor("beta", &[("y.go", "lib/shared.go")]),
    ]);
    gvendor_cmd(home.path(), root.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(contains("lib/shared.go"))
        .stderr(contains("1 problem(s)"));
}

#[test]
fn validate_rejects_destination_outside_root() {
    let home = TempDir::new().unwrap();
    let root = project(vec![vendor("alpha", &[("x.go", "../escape.go")])]);
    gvendor_cmd(home.path(), root.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(contains("escapes the project root"));
}

#[test]
fn sync_refuses_to_start_on_conflicts() {
    let home = TempDir::new().unwrap();
    let root = project(vec![
        vendor("alpha", &[("x.go", "lib/shared.go")]),
        vendor("beta", &[("y.go", "lib/shared.go")]),
    ]);
    gvendor_cmd(home.path(), root.path())
        .args(["sync", "--parallel"])
        .assert()
        .failure()
        .stderr(contains("destination conflict"));
    assert!(!root.path().join("lib").exists());
    assert!(!config::lock_path_at(root.path()).exists());
}

#[test]
fn dry_run_sync_reports_files_and_writes_nothing() {
    let home = TempDir::new().unwrap();
    let root = project(vec![vendor(
        "alpha",
        &[("src/a.go", "vendor/a.go"), ("src/b.go:L2", "vendor/b.go")],
    )]);
    let output = gvendor_cmd(home.path(), root.path())
        .args(["sync", "--dry-run"])
        .output()
        .expect("run gvendor sync --dry-run");
    assert!(
        output.status.success(),
        "command failed: status={} stderr={}",
        output.status,
        String::from_utf8_lossy(&output.stderr),
    );
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("[dry-run]"), "missing dry-run prefix");
    assert!(stdout.contains("a.go"), "missing a.go in output");
    assert!(stdout.contains("2 file(s) would be written"), "got: {stdout}");

    assert!(!root.path().join("vendor").exists(), "dry-run must not create files");
    assert!(!config::lock_path_at(root.path()).exists());
}

#[test]
fn sync_of_unknown_vendor_fails() {
    let home = TempDir::new().unwrap();
    let root = project(vec![vendor("alpha", &[("a.go", "vendor/a.go")])]);
    gvendor_cmd(home.path(), root.path())
        .args(["sync", "nope"])
        .assert()
        .failure()
        .stderr(contains("unknown vendor 'nope'"));
}

#[test]
fn unreachable_remote_exits_non_zero() {
    let home = TempDir::new().unwrap();
    let root = project(vec![vendor("alpha", &[("a.go", "vendor/a.go")])]);
    gvendor_cmd(home.path(), root.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(contains("1 vendor(s) failed to sync"));
    assert!(!root.path().join("vendor/a.go").exists());
}

#[test]
fn missing_config_is_reported() {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    gvendor_cmd(home.path(), root.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(contains("vendor config not found"));
    assert!(fs::read_dir(root.path()).unwrap().next().is_none());
}
