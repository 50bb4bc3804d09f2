//! runner.rs
//! Drives every job of a plan, in order or with sibling subtrees in parallel.
//!
//! A grid or solver failure stops the failing location and everything planned
//! beneath it; other subtrees carry on. A configuration or structural failure
//! stops the whole run.

use super::artifact::Artifact;
use super::estimate::JobContext;
use crate::cache::{CacheKey, LocalCache, DEFAULT_CAPACITY};
use crate::data::InputSource;
use crate::error::{CascadeError, ErrorClass};
use crate::hierarchy::{LocationHierarchy, LocationId};
use crate::plan::{CascadePlan, JobId};
use crate::settings::Policies;
use crate::solver::{EchoSolver, ProcessSolver, Solver};
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// How one run executes. Passed in explicitly; nothing is read from the environment.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub work_dir: PathBuf,
    pub parallel: bool,
    pub cache_capacity: usize,
    /// Solver program. Without one, or in a dry run, the echo solver is used.
    pub solver_program: Option<PathBuf>,
    pub dry_run: bool,
}

impl RunConfig {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            parallel: false,
            cache_capacity: DEFAULT_CAPACITY,
            solver_program: None,
            dry_run: false,
        }
    }

    pub fn solver(&self, policies: &Policies, cancel: Arc<AtomicBool>) -> Box<dyn Solver> {
        match (&self.solver_program, self.dry_run) {
            (Some(program), false) => Box::new(
                ProcessSolver::new(program)
                    .with_timeout(policies.solver_timeout_seconds.map(Duration::from_secs))
                    .with_cancel_flag(cancel),
            ),
            _ => Box::new(EchoSolver),
        }
    }
}

#[derive(Debug)]
pub struct JobFailure {
    pub job: JobId,
    pub class: ErrorClass,
    pub error: CascadeError,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub completed: Vec<JobId>,
    pub failed: Vec<JobFailure>,
    /// Jobs not attempted because a location they depend on failed.
    pub skipped: Vec<JobId>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    fn sort_by(&mut self, position: &HashMap<JobId, usize>) {
        let at = |j: &JobId| position.get(j).copied().unwrap_or(usize::MAX);
        self.completed.sort_by_key(|j| at(j));
        self.skipped.sort_by_key(|j| at(j));
        self.failed.sort_by_key(|f| at(&f.job));
    }
}

pub struct Runner<'a> {
    plan: &'a CascadePlan,
    hierarchy: &'a LocationHierarchy,
    inputs: &'a dyn InputSource,
    solver: &'a dyn Solver,
    config: &'a RunConfig,
    cache: LocalCache<CacheKey, Artifact>,
}

impl<'a> Runner<'a> {
    pub fn new(
        plan: &'a CascadePlan,
        hierarchy: &'a LocationHierarchy,
        inputs: &'a dyn InputSource,
        solver: &'a dyn Solver,
        config: &'a RunConfig,
    ) -> Self {
        Self { plan, hierarchy, inputs, solver, config, cache: LocalCache::new(config.cache_capacity) }
    }

    fn context(&self) -> JobContext<'_> {
        JobContext {
            plan: self.plan,
            hierarchy: self.hierarchy,
            inputs: self.inputs,
            solver: self.solver,
            cache: &self.cache,
            work_dir: &self.config.work_dir,
        }
    }

    /// Runs one job from this plan by its identifier, computing whatever it depends on.
    pub fn run_single(&self, identifier: &str) -> Result<Artifact, CascadeError> {
        let (stage, work) = self.plan.job_for(identifier)?;
        self.context().run_job(JobId::new(stage, work.location))
    }

    pub fn run(&self) -> Result<RunReport, CascadeError> {
        if self.config.parallel {
            self.run_parallel()
        } else {
            self.run_sequential()
        }
    }

    /// Runs jobs one at a time in plan order.
    pub fn run_sequential(&self) -> Result<RunReport, CascadeError> {
        let context = self.context();
        let mut report = RunReport::default();
        let mut blocked: HashSet<LocationId> = HashSet::new();

        for &job in self.plan.jobs() {
            if blocked.contains(&job.location) {
                report.skipped.push(job);
                continue;
            }
            match context.run_job(job) {
                Ok(_) => report.completed.push(job),
                Err(err) if err.class().aborts_run() => {
                    error!("Aborting run: {}", err);
                    return Err(err);
                }
                Err(err) => {
                    warn!("{} failed, skipping its subtree: {}", job, err);
                    blocked.extend(self.plan.subtree_jobs(job.location).iter().map(|j| j.location));
                    report.failed.push(JobFailure { job, class: err.class(), error: err });
                }
            }
        }
        self.finish(report)
    }

    /// Runs each location's jobs in order on the rayon pool. Once a location
    /// has finished, its planned children start, siblings in parallel.
    pub fn run_parallel(&self) -> Result<RunReport, CascadeError> {
        let shared = Shared {
            context: self.context(),
            plan: self.plan,
            report: Mutex::new(RunReport::default()),
            fatal: Mutex::new(None),
            abort: AtomicBool::new(false),
        };
        let roots: Vec<LocationId> = self
            .plan
            .locations()
            .iter()
            .copied()
            .filter(|l| self.plan.work(*l).map_or(false, |w| w.parent.is_none()))
            .collect();

        rayon::scope(|scope| {
            for root in roots {
                let shared = &shared;
                scope.spawn(move |s| shared.run_subtree(s, root));
            }
        });

        if let Some(err) = shared.fatal.into_inner().unwrap_or_else(PoisonError::into_inner) {
            error!("Aborting run: {}", err);
            return Err(err);
        }
        let report = shared.report.into_inner().unwrap_or_else(PoisonError::into_inner);
        self.finish(report)
    }

    fn finish(&self, mut report: RunReport) -> Result<RunReport, CascadeError> {
        let position: HashMap<JobId, usize> = self.plan.jobs().iter().enumerate().map(|(i, j)| (*j, i)).collect();
        report.sort_by(&position);
        info!(
            "Run finished: {} completed, {} failed, {} skipped",
            report.completed.len(),
            report.failed.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}

struct Shared<'a> {
    context: JobContext<'a>,
    plan: &'a CascadePlan,
    report: Mutex<RunReport>,
    fatal: Mutex<Option<CascadeError>>,
    abort: AtomicBool,
}

impl<'a> Shared<'a> {
    fn record(&self, f: impl FnOnce(&mut RunReport)) {
        f(&mut self.report.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn skip_subtree(&self, location: LocationId, done: &[JobId]) {
        let skipped: Vec<JobId> =
            self.plan.subtree_jobs(location).into_iter().filter(|j| !done.contains(j)).collect();
        self.record(|r| r.skipped.extend(skipped));
    }

    fn run_subtree<'s>(&'s self, scope: &rayon::Scope<'s>, location: LocationId) {
        let jobs: Vec<JobId> = self.plan.jobs().iter().copied().filter(|j| j.location == location).collect();
        let mut done: Vec<JobId> = Vec::with_capacity(jobs.len());

        for job in jobs {
            if self.abort.load(Ordering::SeqCst) {
                self.skip_subtree(location, &done);
                return;
            }
            match self.context.run_job(job) {
                Ok(_) => {
                    self.record(|r| r.completed.push(job));
                    done.push(job);
                }
                Err(err) => {
                    done.push(job);
                    if err.class().aborts_run() {
                        self.abort.store(true, Ordering::SeqCst);
                        let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
                        fatal.get_or_insert(err);
                    } else {
                        warn!("{} failed, skipping its subtree: {}", job, err);
                        self.record(|r| r.failed.push(JobFailure { job, class: err.class(), error: err }));
                    }
                    self.skip_subtree(location, &done);
                    return;
                }
            }
        }

        for child in self.plan.plan_children(location) {
            scope.spawn(move |s| self.run_subtree(s, child));
        }
    }
}
