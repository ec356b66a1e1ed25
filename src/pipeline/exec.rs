//! Subprocess protocol shared by every external engine.
//!
//! 1. Launch with the scratch directory as working directory and the
//!    library search path augmented per the configured strategy.
//! 2. In buffer mode, write the whole buffer to stdin from a separate task
//!    and close it; the engine may not read until it has all its input, and
//!    we must keep draining stdout meanwhile.
//! 3. Wait up to the timeout. On expiry the child is dropped, which kills it
//!    (`kill_on_drop`), and [`ConversionError::Timeout`] is returned.
//!
//! Launch and I/O failures never escape as raw errors: they become
//! `ProcessFailed { exit_code: -1, .. }`.

use crate::error::ConversionError;
use crate::pipeline::command::EngineCommand;
use engine_locate::LibrarySearchPath;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Per-invocation environment.
#[derive(Debug, Clone, Copy)]
pub struct ExecOptions<'a> {
    pub working_dir: &'a Path,
    pub timeout: Duration,
    pub search_path: &'a LibrarySearchPath,
}

/// What a finished process left behind.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// stdout followed by stderr, lossily decoded and trimmed.
    pub fn combined_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text.trim().to_string()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Run `cmd` to completion and capture its output, whatever the exit code.
pub async fn run(
    cmd: &EngineCommand,
    stdin: Option<Vec<u8>>,
    opts: ExecOptions<'_>,
) -> Result<ProcessOutput, ConversionError> {
    let program = cmd.program.display().to_string();
    debug!(argv = ?cmd.argv(), cwd = %opts.working_dir.display(), "launching engine");

    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .current_dir(opts.working_dir)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(value) = opts.search_path.env_value()? {
        command.env(LibrarySearchPath::env_var(), value);
    }

    let started = Instant::now();
    let mut child = command
        .spawn()
        .map_err(|e| ConversionError::process_failed(-1, format!("Failed to start {program}: {e}")))?;

    let writer = match (stdin, child.stdin.take()) {
        (Some(bytes), Some(mut pipe)) => Some(tokio::spawn(async move {
            pipe.write_all(&bytes).await?;
            pipe.shutdown().await
        })),
        _ => None,
    };

    let waited = tokio::time::timeout(opts.timeout, child.wait_with_output()).await;

    let output = match waited {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            abort_writer(writer);
            return Err(ConversionError::process_failed(
                -1,
                format!("Failed waiting for {program}: {e}"),
            ));
        }
        Err(_) => {
            abort_writer(writer);
            warn!(
                "{} killed after {}s timeout",
                program,
                opts.timeout.as_secs_f32()
            );
            return Err(ConversionError::Timeout);
        }
    };

    if let Some(handle) = writer {
        // An engine that exits without reading all of stdin closes the pipe
        // early; its exit code tells the real story.
        if let Ok(Err(e)) = handle.await {
            debug!("stdin write to {} ended early: {}", program, e);
        }
    }

    let exit_code = output.status.code().unwrap_or(-1);
    info!(
        exit_code,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "{} finished",
        program
    );

    Ok(ProcessOutput {
        exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

fn abort_writer(writer: Option<tokio::task::JoinHandle<std::io::Result<()>>>) {
    if let Some(handle) = writer {
        handle.abort();
    }
}

/// Run the conversion engine and verify it produced `output_file`.
pub async fn run_engine(
    cmd: &EngineCommand,
    stdin: Option<Vec<u8>>,
    output_file: &Path,
    opts: ExecOptions<'_>,
) -> Result<(), ConversionError> {
    let output = run(cmd, stdin, opts).await?;

    if output.exit_code != 0 {
        let text = output.combined_text();
        warn!(exit_code = output.exit_code, "engine failed: {}", text);
        return Err(ConversionError::process_failed(output.exit_code, text));
    }

    if !tokio::fs::try_exists(output_file).await.unwrap_or(false) {
        return Err(ConversionError::process_failed(
            output.exit_code,
            "Output file not created",
        ));
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&p, std::fs::Permissions::from_mode(0o755)).unwrap();
        p
    }

    fn cmd(program: PathBuf, args: &[&str]) -> EngineCommand {
        EngineCommand {
            program,
            args: args.iter().map(OsString::from).collect(),
        }
    }

    fn opts<'a>(dir: &'a Path, sp: &'a LibrarySearchPath, secs: u64) -> ExecOptions<'a> {
        ExecOptions {
            working_dir: dir,
            timeout: Duration::from_secs(secs),
            search_path: sp,
        }
    }

    #[tokio::test]
    async fn stdin_is_delivered_and_closed() {
        let dir = tempfile::tempdir().unwrap();
        let sp = LibrarySearchPath::default();
        let cat = script(dir.path(), "cat.sh", "cat");
        let out = run(&cmd(cat, &[]), Some(b"hello engine".to_vec()), opts(dir.path(), &sp, 10))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, b"hello engine");
    }

    #[tokio::test]
    async fn large_stdin_does_not_deadlock() {
        let dir = tempfile::tempdir().unwrap();
        let sp = LibrarySearchPath::default();
        let cat = script(dir.path(), "cat.sh", "cat");
        let payload = vec![b'x'; 1 << 20];
        let out = run(&cmd(cat, &[]), Some(payload.clone()), opts(dir.path(), &sp, 10))
            .await
            .unwrap();
        assert_eq!(out.stdout.len(), payload.len());
    }

    #[tokio::test]
    async fn timeout_kills_engine() {
        let dir = tempfile::tempdir().unwrap();
        let sp = LibrarySearchPath::default();
        let slow = script(dir.path(), "slow.sh", "sleep 10");
        let started = Instant::now();
        let err = run(&cmd(slow, &[]), None, opts(dir.path(), &sp, 1)).await.unwrap_err();
        assert_eq!(err, ConversionError::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn nonzero_exit_captures_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let sp = LibrarySearchPath::default();
        let bad = script(dir.path(), "bad.sh", "echo partial; echo 'unknown reader' >&2; exit 21");
        let out_file = dir.path().join("out.html");
        let err = run_engine(&cmd(bad, &[]), None, &out_file, opts(dir.path(), &sp, 10))
            .await
            .unwrap_err();
        match err {
            ConversionError::ProcessFailed { exit_code, stderr } => {
                assert_eq!(exit_code, 21);
                assert!(stderr.contains("partial"));
                assert!(stderr.contains("unknown reader"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_output_file_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let sp = LibrarySearchPath::default();
        let lazy = script(dir.path(), "lazy.sh", "exit 0");
        let out_file = dir.path().join("never.html");
        let err = run_engine(&cmd(lazy, &[]), None, &out_file, opts(dir.path(), &sp, 10))
            .await
            .unwrap_err();
        assert_eq!(err, ConversionError::process_failed(0, "Output file not created"));
    }

    #[tokio::test]
    async fn launch_failure_is_minus_one() {
        let dir = tempfile::tempdir().unwrap();
        let sp = LibrarySearchPath::default();
        let err = run(
            &cmd(dir.path().join("does-not-exist"), &[]),
            None,
            opts(dir.path(), &sp, 10),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConversionError::ProcessFailed { exit_code: -1, .. }));
    }

    #[tokio::test]
    async fn search_path_and_working_dir_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let libs = dir.path().join("libs");
        let sp = LibrarySearchPath::new(vec![libs.clone()]);
        let env = script(
            dir.path(),
            "env.sh",
            &format!("pwd; printenv {}", LibrarySearchPath::env_var()),
        );
        let out = run(&cmd(env, &[]), None, opts(dir.path(), &sp, 10)).await.unwrap();
        let text = String::from_utf8(out.stdout).unwrap();
        let mut lines = text.lines();
        let cwd = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(cwd, std::fs::canonicalize(dir.path()).unwrap());
        assert!(lines.next().unwrap().starts_with(libs.to_str().unwrap()));
    }
}
