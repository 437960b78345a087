//! CLI contract tests.

use assert_cmd::Command;

fn tukang() -> Command {
    match Command::cargo_bin("tukang") {
        Ok(cmd) => cmd,
        Err(err) => panic!("tukang binary should build: {err}"),
    }
}

#[test]
fn help_lists_primary_subcommands() {
    let output = tukang().arg("--help").output().expect("run --help");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for subcommand in ["start", "pair", "status"] {
        assert!(stdout.contains(subcommand), "--help is missing {subcommand}");
    }
}

#[test]
fn unknown_subcommand_is_rejected() {
    tukang().arg("dance").assert().failure();
}

#[test]
fn status_reports_unreachable_bridge() {
    let home = tempfile::tempdir().expect("tempdir");
    let output = tukang()
        .arg("status")
        .env("HOME", home.path())
        .env("TUKANG_BRIDGE_URL", "http://127.0.0.1:9")
        .output()
        .expect("run status");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("unreachable"), "unexpected output: {stdout}");
}
