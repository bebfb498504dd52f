// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

#[test]
fn npm_ci_when_lockfile_present() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("package.json"), "{}").unwrap();
    std::fs::write(dir.path().join("package-lock.json"), "{}").unwrap();
    let plan = detect_install(dir.path()).unwrap();
    assert_eq!(plan.argv, vec!["npm", "ci"]);
}

#[test]
fn prebaked_node_modules_prefers_offline() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("package.json"), "{}").unwrap();
    std::fs::write(dir.path().join("package-lock.json"), "{}").unwrap();
    std::fs::create_dir(dir.path().join("node_modules")).unwrap();
    let plan = detect_install(dir.path()).unwrap();
    assert_eq!(plan.argv, vec!["npm", "ci", "--prefer-offline"]);
}

#[test]
fn npm_install_without_lockfile() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("package.json"), "{}").unwrap();
    assert_eq!(detect_install(dir.path()).unwrap().argv, vec!["npm", "install"]);
}

#[yare::parameterized(
    cargo = { "Cargo.toml", &["cargo", "fetch"] },
    pip   = { "requirements.txt", &["pip", "install", "-r", "requirements.txt"] },
)]
fn other_ecosystems(manifest: &str, expected: &[&str]) {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(manifest), "").unwrap();
    assert_eq!(detect_install(dir.path()).unwrap().argv, expected);
}

#[test]
fn node_takes_priority_over_cargo() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("package.json"), "{}").unwrap();
    std::fs::write(dir.path().join("Cargo.toml"), "").unwrap();
    assert_eq!(detect_install(dir.path()).unwrap().manifest, "package.json");
}

#[test]
fn empty_workspace_has_no_plan() {
    let dir = TempDir::new().unwrap();
    assert!(detect_install(dir.path()).is_none());
}
