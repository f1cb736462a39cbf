use std::{
    ffi::OsStr,
    fs,
    os::unix::ffi::OsStrExt,
    path::Path,
    process::{Command, Output},
    time::{Duration, UNIX_EPOCH},
};

use insta::assert_snapshot;

const SITEFILE: &str = r#"
default = "all"
clean = ["*.html"]

[tools]
transform = "cat"

[[rule]]
target = "all"
prerequisites = ["index.html"]

[[rule]]
target = "%.html"
prerequisites = ["%.xml", "navbar.inc"]
action = "echo {TARGET} >> log.txt && {tool:transform} {ALL_PREREQS} > {TARGET}"
"#;

fn write(root: &Path, name: &str, contents: &str, mtime: u64) {
    let path = root.join(name);
    fs::write(&path, contents).unwrap();
    fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(UNIX_EPOCH + Duration::from_secs(mtime))
        .unwrap();
}

fn site() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Sitefile.toml", SITEFILE, 10);
    write(dir.path(), "index.xml", "<index/>", 10);
    write(dir.path(), "navbar.inc", "<nav/>", 10);
    dir
}

fn sitemake(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sitemake"))
        .arg("-C")
        .arg(root)
        .args(args)
        .env_remove("SITEMAKE_LOG")
        .env_remove("SITEMAKE_TOOL_TRANSFORM")
        .output()
        .unwrap()
}

fn log(root: &Path) -> String {
    fs::read_to_string(root.join("log.txt")).unwrap_or_default()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn builds_default_target_then_nothing() {
    let dir = site();
    let first = sitemake(dir.path(), &[]);
    assert!(first.status.success(), "{}", stderr(&first));
    assert_eq!(log(dir.path()), "index.html\n");
    assert_eq!(
        fs::read_to_string(dir.path().join("index.html")).unwrap(),
        "<index/><nav/>"
    );
    assert!(stderr(&first).contains("[1/1] index.html"));

    let second = sitemake(dir.path(), &["build", "all"]);
    assert!(second.status.success());
    assert_eq!(log(dir.path()), "index.html\n");
    assert!(stderr(&second).contains("no work to do"));
}

#[test]
fn failing_action_exit_status_propagates() {
    let dir = site();
    write(dir.path(), "index.html", "old", 20);
    write(dir.path(), "index.xml", "<index/>", 30);
    let output = Command::new(env!("CARGO_BIN_EXE_sitemake"))
        .arg("-C")
        .arg(dir.path())
        .env("SITEMAKE_TOOL_TRANSFORM", "false")
        .env_remove("SITEMAKE_LOG")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("FAILED: index.html"), "{}", err);
    assert!(err.contains("error: building 'index.html' failed"), "{}", err);
}

#[test]
fn engine_errors_exit_with_two() {
    let dir = site();
    let output = sitemake(dir.path(), &["missing.txt"]);
    assert_eq!(output.status.code(), Some(2));
    assert_snapshot!(
        stderr(&output).trim_end(),
        @"sitemake: error: no rule to make target 'missing.txt'"
    );
}

#[test]
fn non_unicode_environment() {
    let dir = site();
    let output = Command::new(env!("CARGO_BIN_EXE_sitemake"))
        .arg("-C")
        .arg(dir.path())
        .env("SITEMAKE_UNRELATED", OsStr::from_bytes(b"\xff\xfe"))
        .env_remove("SITEMAKE_LOG")
        .env_remove("SITEMAKE_TOOL_TRANSFORM")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(log(dir.path()), "index.html\n");

    let output = Command::new(env!("CARGO_BIN_EXE_sitemake"))
        .arg("-C")
        .arg(dir.path())
        .env("SITEMAKE_TOOL_TRANSFORM", OsStr::from_bytes(b"\xff\xfe"))
        .env_remove("SITEMAKE_LOG")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert_snapshot!(
        stderr(&output).trim_end(),
        @"sitemake: error: environment variable SITEMAKE_TOOL_TRANSFORM is not valid UTF-8"
    );
}

#[test]
fn missing_rule_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = sitemake(dir.path(), &[]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Sitefile.toml"));
}

#[test]
fn dry_run_prints_commands() {
    let dir = site();
    let output = sitemake(dir.path(), &["-n"]);
    assert!(output.status.success());
    assert!(stderr(&output).contains("echo index.html >> log.txt"), "{}", stderr(&output));
    assert!(!dir.path().join("index.html").exists());
    assert_eq!(log(dir.path()), "");
}

#[test]
fn clean_uses_declared_patterns() {
    let dir = site();
    write(dir.path(), "index.html", "old", 20);
    let output = sitemake(dir.path(), &["clean"]);
    assert!(output.status.success());
    assert_snapshot!(String::from_utf8_lossy(&output.stdout).trim_end(), @"Cleaning... 1 files.");
    assert!(!dir.path().join("index.html").exists());
    assert!(dir.path().join("index.xml").exists());
}

#[test]
fn stats_prints_metrics() {
    let dir = site();
    let output = sitemake(dir.path(), &["-d", "stats"]);
    assert!(output.status.success());
    let err = stderr(&output);
    assert!(err.contains("metric"), "{}", err);
    assert!(err.contains("resolve"), "{}", err);
}

#[test]
fn bad_flag_is_a_usage_error() {
    let dir = site();
    let output = sitemake(dir.path(), &["--frobnicate"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).starts_with("sitemake: unknown option '--frobnicate'"));
}
