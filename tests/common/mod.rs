//! Shared harness for CLI integration tests.
//!
//! Every case runs the real `reclaim` binary with a scrubbed environment and
//! leaves a log of its command line and output behind for post-mortems.

#![allow(dead_code, missing_docs)]

use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

pub struct CliResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

pub fn run_cli_case(case: &str, args: &[&str]) -> CliResult {
    run_cli_case_with_env(case, args, &[])
}

pub fn run_cli_case_with_env(case: &str, args: &[&str], env: &[(&str, &str)]) -> CliResult {
    let mut command = Command::new(env!("CARGO_BIN_EXE_reclaim"));
    command.args(args);
    for (key, _) in std::env::vars() {
        if key.starts_with("RECLAIM_") {
            command.env_remove(key);
        }
    }
    command.env("NO_COLOR", "1");
    for (key, value) in env {
        command.env(key, value);
    }

    let output = command.output().expect("failed to spawn reclaim binary");
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    let log_dir = std::env::temp_dir().join("reclaim-cli-cases");
    fs::create_dir_all(&log_dir).expect("create case log dir");
    let log_path = log_dir.join(format!("{case}.log"));
    let record = format!(
        "args: {args:?}\nenv: {env:?}\nstatus: {:?}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}\n",
        output.status.code()
    );
    fs::write(&log_path, record).expect("write case log");

    CliResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
