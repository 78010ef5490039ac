//! Command-line behavior that needs no compiler.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn pyr(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pyr"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute pyr")
}

#[test]
fn test_no_action_prints_help() {
    let dir = TempDir::new().unwrap();
    let output = pyr(dir.path(), &[]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"), "{stdout}");
    assert!(stdout.contains("build"));
}

#[test]
fn test_version_flag() {
    let dir = TempDir::new().unwrap();
    let output = pyr(dir.path(), &["--version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_project_file_fails() {
    let dir = TempDir::new().unwrap();
    let output = pyr(dir.path(), &["build"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not find project file"), "{stderr}");
}

#[test]
fn test_all_config_errors_are_reported() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("pyruvic.projinfo"),
        "[target]\n\ttype: shared object\n\tmacroname: X\n\tversion: 1.x\n",
    )
    .unwrap();

    let output = pyr(dir.path(), &["build"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[target] must have name"), "{stderr}");
    assert!(stderr.contains("unknown target type"), "{stderr}");
    assert!(stderr.contains("invalid version"), "{stderr}");
    assert!(stderr.contains("3 error(s)"), "{stderr}");
}

#[test]
fn test_parse_errors_carry_locations() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("pyruvic.projinfo"),
        "[target]\n\tname: a\n\t}\n",
    )
    .unwrap();

    let output = pyr(dir.path(), &["build"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pyruvic.projinfo:3:"), "{stderr}");
}

#[test]
fn test_new_creates_project() {
    let dir = TempDir::new().unwrap();
    let output = pyr(dir.path(), &["new", "hello_app"]);
    assert!(output.status.success());

    let root = dir.path().join("hello_app");
    assert!(root.join("src/main.cpp").is_file());
    assert!(root.join(".pyr").is_dir());
    let projinfo = fs::read_to_string(root.join("pyruvic.projinfo")).unwrap();
    assert!(projinfo.contains("\tname: hello_app\n"));
    assert!(projinfo.contains("\tmacroname: HELLO_APP\n"));

    let again = pyr(dir.path(), &["new", "hello_app"]);
    assert!(!again.status.success());
}

#[test]
fn test_clean_without_action_removes_state() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join(".pyr/objfiles")).unwrap();
    let output = pyr(dir.path(), &["-c"]);
    assert!(output.status.success());
    assert!(!dir.path().join(".pyr").exists());
}
