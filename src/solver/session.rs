//! session.rs
//! One solver run for one job: encode, write, invoke, read back, with retries.
use super::command::SolverCommand;
use super::error::SolverError;
use super::file::{read_image, write_image};
use super::Solver;
use crate::compiler::RelationalImage;
use crate::error::CascadeError;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub struct SolverSession<'a> {
    solver: &'a dyn Solver,
    path: PathBuf,
    retries: u32,
}

impl<'a> SolverSession<'a> {
    /// `retries` counts extra attempts after the first.
    pub fn new(solver: &'a dyn Solver, path: impl Into<PathBuf>, retries: u32) -> Self {
        Self { solver, path: path.into(), retries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `commands` in order on the image made by `encode`, returning the
    /// image the solver left behind. Every attempt starts from a new encode,
    /// so nothing a failed or cancelled attempt wrote is read again.
    pub fn run<F>(&self, encode: F, commands: &[SolverCommand]) -> Result<RelationalImage, CascadeError>
    where
        F: Fn() -> Result<RelationalImage, CascadeError>,
    {
        let attempts = self.retries + 1;
        let mut attempt = 1;
        loop {
            let mut image = encode()?;
            image.clear_outputs();
            match self.attempt(&image, commands) {
                Ok(result) => return Ok(result),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(
                        "Attempt {}/{} with {} on {} failed, retrying: {}",
                        attempt,
                        attempts,
                        self.solver.name(),
                        self.path.display(),
                        err
                    );
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    return Err(SolverError::RetriesExhausted { attempts, last: Box::new(err) }.into());
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn attempt(&self, image: &RelationalImage, commands: &[SolverCommand]) -> Result<RelationalImage, SolverError> {
        write_image(&self.path, image)?;
        for command in commands {
            let started = Instant::now();
            self.solver.run(&self.path, command)?;
            info!("{} '{}' on {} took {:.2?}", self.solver.name(), command, self.path.display(), started.elapsed());
        }
        read_image(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::tables::StartVarRow;
    use crate::error::ErrorClass;
    use crate::solver::EchoSolver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Times out a fixed number of times, then behaves like the echo solver.
    struct Flaky {
        failures: AtomicUsize,
    }

    impl Solver for Flaky {
        fn name(&self) -> &str { "flaky" }

        fn run(&self, path: &Path, command: &SolverCommand) -> Result<(), SolverError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(SolverError::TimedOut { command: command.to_string(), seconds: 1 });
            }
            EchoSolver.run(path, command)
        }
    }

    fn start_image() -> Result<RelationalImage, CascadeError> {
        Ok(RelationalImage {
            start_var: vec![StartVarRow { start_var_id: 0, start_var_value: 0.25 }],
            ..RelationalImage::default()
        })
    }

    #[test]
    fn test_retry_uses_a_fresh_encode() {
        let dir = tempfile::tempdir().unwrap();
        let solver = Flaky { failures: AtomicUsize::new(2) };
        let encodes = AtomicUsize::new(0);
        let session = SolverSession::new(&solver, dir.path().join("fit.json"), 2);
        let image = session
            .run(
                || {
                    encodes.fetch_add(1, Ordering::SeqCst);
                    start_image()
                },
                &[SolverCommand::Init, SolverCommand::FitBoth],
            )
            .unwrap();
        assert_eq!(encodes.load(Ordering::SeqCst), 3);
        assert_eq!(image.fit_var[0].fit_var_value, 0.25);
    }

    #[test]
    fn test_exhausted_retries_fail_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let solver = Flaky { failures: AtomicUsize::new(5) };
        let session = SolverSession::new(&solver, dir.path().join("fit.json"), 1);
        let err = session.run(start_image, &[SolverCommand::FitBoth]).unwrap_err();
        assert!(matches!(err, CascadeError::Solver(SolverError::RetriesExhausted { attempts: 2, .. })));
        assert_eq!(err.class(), ErrorClass::SolverInvocation);
        assert!(!err.class().aborts_run());
    }
}
