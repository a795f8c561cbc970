/// Runner tests: drive the built `tkbridge` binary against the in-process
/// backend and check what it prints and how it exits.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tkbridge"))
}

/// Run the binary with the given arguments and a clean settings environment.
fn run(args: &[&str]) -> Output {
    let mut cmd = Command::new(binary());
    cmd.args(args);
    for key in ["THEME", "APP_NAME", "DEBUG", "TKBRIDGE_BACKEND", "RUST_LOG"] {
        cmd.env_remove(key);
    }
    cmd.output().expect("failed to run tkbridge")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

// ── Evaluation ────────────────────────────────────────────────────────────────

#[test]
fn prints_non_empty_result() {
    let out = run(&["--backend", "mini", "-n", "-c", "set x 5"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "5\n");
}

#[test]
fn empty_result_prints_nothing_but_puts_does() {
    let out = run(&["--backend", "mini", "-n", "-c", "puts hello"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "hello\n");
}

#[test]
fn script_file_then_command() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "set a 1\nset b [list $a {{two words}}]").unwrap();
    let path = file.path().to_str().unwrap();

    let out = run(&["--backend", "mini", "-n", path]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "1 {two words}\n");

    let out = run(&["--backend", "mini", "-n", path, "-c", "llength $b"]);
    assert_eq!(stdout(&out), "2\n");
}

#[test]
fn script_error_fails_the_run() {
    let out = run(&["--backend", "mini", "-n", "-c", "error boom"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("boom"), "{}", stderr(&out));
}

#[test]
fn missing_script_file_fails() {
    let out = run(&["--backend", "mini", "-n", "/nonexistent/script.tcl"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("reading /nonexistent/script.tcl"), "{}", stderr(&out));
}

// ── Event loop ────────────────────────────────────────────────────────────────

#[test]
fn loop_stops_after_run_time() {
    let out = run(&["--backend", "mini", "--for", "100", "-c", "set ready 1"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "1\n");
}

#[test]
fn loop_ends_when_root_is_destroyed() {
    let out = run(&["--backend", "mini", "--for", "10000", "-c", "destroy ."]);
    assert!(out.status.success(), "{}", stderr(&out));
}

// ── Settings ──────────────────────────────────────────────────────────────────

#[test]
fn settings_file_names_the_application() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "backend = \"mini\"\napp_name = \"cfgapp\"\ntheme = \"classic\"").unwrap();
    let path = file.path().to_str().unwrap();
    let out = run(&["--config", path, "-n", "-c", "list [wm title .] [ttk::style theme use]"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "cfgapp classic\n");
}

#[test]
fn debug_flag_logs_the_loaded_settings() {
    let out = run(&["--backend", "mini", "-n", "-d", "-c", "set x 1"]);
    assert!(out.status.success(), "{}", stderr(&out));
    let log = stderr(&out);
    assert!(log.contains("settings loaded"), "{log}");
    assert!(log.contains("Mini"), "{log}");
}

#[test]
fn bad_settings_file_is_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "colour = \"red\"").unwrap();
    let out = run(&["--config", file.path().to_str().unwrap(), "-n"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("colour"), "{}", stderr(&out));
}
