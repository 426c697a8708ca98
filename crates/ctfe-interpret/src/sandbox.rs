//! Running compiled runners in a child process.

use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{EvalError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    timeout: Duration,
}

impl Sandbox {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `program` in `workdir` until it exits or the timeout elapses.
    /// A non-zero exit is reported with the program's stderr.
    pub fn run(&self, program: &Path, workdir: &Path) -> Result<RunOutput> {
        let mut child = Command::new(program)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("RUST_BACKTRACE", "0")
            .spawn()
            .map_err(|source| EvalError::Toolchain {
                program: program.display().to_string(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || read_all(stdout));
        let stderr_reader = thread::spawn(move || read_all(stderr));

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                tracing::warn!("Killing {} after {:?}", program.display(), self.timeout);
                let _ = child.kill();
                let _ = child.wait();
                return Err(EvalError::Timeout(self.timeout.as_millis() as u64));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        if !status.success() {
            return Err(EvalError::Invocation(failure_message(&stderr, status)));
        }
        Ok(RunOutput { stdout, stderr })
    }
}

fn read_all(pipe: Option<impl Read>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn failure_message(stderr: &str, status: ExitStatus) -> String {
    let message = stderr
        .lines()
        .filter(|line| !line.starts_with("note: run with `RUST_BACKTRACE"))
        .collect::<Vec<_>>()
        .join("\n");
    let message = message.trim();
    if message.is_empty() {
        format!("the invocation exited with {}", status)
    } else {
        message.to_string()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn script(dir: &Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("run.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "echo hello");
        let output = Sandbox::new(Duration::from_secs(5))
            .run(&program, dir.path())
            .unwrap();
        assert_eq!(output.stdout, "hello\n");
    }

    #[test]
    fn failures_report_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(
            dir.path(),
            "echo \"thread 'main' panicked at src/lib.rs:1:1:\" >&2\necho 'boom' >&2\necho 'note: run with `RUST_BACKTRACE=1` environment variable to display a backtrace' >&2\nexit 101",
        );
        let err = Sandbox::new(Duration::from_secs(5))
            .run(&program, dir.path())
            .unwrap_err();
        match err {
            EvalError::Invocation(message) => {
                assert_eq!(message, "thread 'main' panicked at src/lib.rs:1:1:\nboom")
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn slow_programs_time_out() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "exec sleep 5");
        let started = Instant::now();
        let err = Sandbox::new(Duration::from_millis(100))
            .run(&program, dir.path())
            .unwrap_err();
        assert!(matches!(err, EvalError::Timeout(100)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
