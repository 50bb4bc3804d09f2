//! process.rs
//! Runs the solver as a child process, one command per invocation.
use super::command::SolverCommand;
use super::error::SolverError;
use super::Solver;
use log::{debug, warn};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Trailing stderr kept in a failure message.
const STDERR_TAIL: usize = 2000;

/// Invokes `<program> <image file> <verb...>`. The child is killed when the
/// timeout passes or the shared cancel flag is raised.
#[derive(Debug, Clone)]
pub struct ProcessSolver {
    program: PathBuf,
    timeout: Option<Duration>,
    cancel: Arc<AtomicBool>,
}

impl ProcessSolver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), timeout: None, cancel: Arc::new(AtomicBool::new(false)) }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Raising the flag stops the running command and every later one.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }
}

impl Solver for ProcessSolver {
    fn name(&self) -> &str {
        self.program.to_str().unwrap_or("solver")
    }

    fn run(&self, path: &Path, command: &SolverCommand) -> Result<(), SolverError> {
        let command_line = command.to_string();
        if self.cancel.load(Ordering::Relaxed) {
            return Err(SolverError::Cancelled { command: command_line });
        }

        let stderr_path = path.with_extension("stderr.log");
        let stderr = File::create(&stderr_path)
            .map_err(|source| SolverError::File { action: "create", path: stderr_path.clone(), source })?;
        let mut child = Command::new(&self.program)
            .arg(path)
            .args(command.verbs())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .spawn()
            .map_err(|source| SolverError::Spawn { program: self.program.display().to_string(), source })?;
        debug!("Started '{} {} {}' as pid {}", self.program.display(), path.display(), command_line, child.id());

        let started = Instant::now();
        loop {
            let status = child.try_wait().map_err(|source| SolverError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;
            if let Some(status) = status {
                if status.success() {
                    return Ok(());
                }
                let text = fs::read_to_string(&stderr_path).unwrap_or_default();
                let tail = text.char_indices().rev().nth(STDERR_TAIL).map_or(0, |(i, _)| i);
                return Err(SolverError::Failed {
                    command: command_line,
                    status: status.code(),
                    stderr: text[tail..].trim().to_string(),
                });
            }

            let stop = if self.cancel.load(Ordering::Relaxed) {
                Some(SolverError::Cancelled { command: command_line.clone() })
            } else {
                self.timeout.filter(|t| started.elapsed() > *t).map(|t| SolverError::TimedOut {
                    command: command_line.clone(),
                    seconds: t.as_secs(),
                })
            };
            if let Some(err) = stop {
                warn!("Stopping solver pid {}: {}", child.id(), err);
                // the child may already have exited between the checks
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("solver.sh");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{}", body).unwrap();
        drop(file);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_nonzero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let solver = ProcessSolver::new(script(dir.path(), "echo 'no such option' >&2\nexit 3"));
        let err = solver.run(&dir.path().join("image.json"), &SolverCommand::Init).unwrap_err();
        match err {
            SolverError::Failed { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "no such option");
            }
            other => panic!("Expected a failure, got {:?}", other),
        }
    }

    #[test]
    fn test_slow_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let solver = ProcessSolver::new(script(dir.path(), "sleep 5"))
            .with_timeout(Some(Duration::from_millis(200)));
        let err = solver.run(&dir.path().join("image.json"), &SolverCommand::FitBoth).unwrap_err();
        assert!(matches!(err, SolverError::TimedOut { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_raised_flag_cancels_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let solver = ProcessSolver::new(script(dir.path(), "exit 0"));
        solver.cancel_flag().store(true, Ordering::Relaxed);
        let err = solver.run(&dir.path().join("image.json"), &SolverCommand::Init).unwrap_err();
        assert!(matches!(err, SolverError::Cancelled { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let solver = ProcessSolver::new(dir.path().join("absent"));
        let err = solver.run(&dir.path().join("image.json"), &SolverCommand::Init).unwrap_err();
        assert!(matches!(err, SolverError::Spawn { .. }));
    }
}
