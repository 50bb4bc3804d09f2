use cascade_core::cache::DEFAULT_CAPACITY;
use cascade_core::executor::{RunConfig, RunFile, Runner};
use cascade_core::plan::CascadePlan;
use cascade_core::CascadeError;
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "cascade",
    about = "Run a cascade of disease-rate fits down a location hierarchy",
    long_about = "Reads a run file holding the location hierarchy, settings and inputs, \
                  plans one job per stage and location, and runs them through the solver."
)]
struct Cli {
    /// JSON file with locations, settings, observations, country_covariates and avgint
    run_file: PathBuf,

    /// Directory for solver images and predictions
    #[arg(long, value_name = "DIR", default_value = "cascade_work")]
    work_dir: PathBuf,

    /// Solver program, invoked as `<program> <image> <verb...>`
    #[arg(long, value_name = "PROGRAM")]
    solver: Option<PathBuf>,

    /// Use the in-process echo solver instead of the solver program
    #[arg(long)]
    dry_run: bool,

    /// Run sibling subtrees in parallel
    #[arg(long)]
    parallel: bool,

    /// Number of stage results kept in memory
    #[arg(long, value_name = "N", default_value_t = DEFAULT_CAPACITY)]
    cache_size: usize,

    /// Print the planned jobs in order and exit
    #[arg(long)]
    list_jobs: bool,

    /// Run only this job (and whatever it depends on), e.g. `bundle_setup@102`
    #[arg(long, value_name = "JOB")]
    job: Option<String>,
}

enum Outcome {
    Done,
    /// Some locations failed; the rest of the cascade finished.
    Partial,
}

fn run(cli: &Cli) -> Result<Outcome, CascadeError> {
    let run_file = RunFile::load(&cli.run_file)?;
    let hierarchy = run_file.hierarchy()?;
    let settings = Arc::new(run_file.settings.clone());
    let plan = CascadePlan::build(&hierarchy, Arc::clone(&settings))?;

    if cli.list_jobs {
        for job in plan.jobs() {
            println!("{}", job);
        }
        return Ok(Outcome::Done);
    }

    let config = RunConfig {
        work_dir: cli.work_dir.clone(),
        parallel: cli.parallel,
        cache_capacity: cli.cache_size,
        solver_program: cli.solver.clone(),
        dry_run: cli.dry_run,
    };
    let solver = config.solver(&settings.policies, Arc::new(AtomicBool::new(false)));
    info!("Using solver '{}' with work directory {}", solver.name(), config.work_dir.display());
    let runner = Runner::new(&plan, &hierarchy, &run_file.inputs, solver.as_ref(), &config);

    if let Some(job) = &cli.job {
        let artifact = runner.run_single(job)?;
        info!("{}: {}", job, artifact.summary());
        return Ok(Outcome::Done);
    }

    let report = runner.run()?;
    for failure in &report.failed {
        warn!("{} failed ({:?}): {}", failure.job, failure.class, failure.error);
    }
    if !report.skipped.is_empty() {
        warn!("Skipped {} jobs below failed locations", report.skipped.len());
    }
    Ok(if report.is_success() { Outcome::Done } else { Outcome::Partial })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let started = Instant::now();

    match run(&cli) {
        Ok(Outcome::Done) => {
            info!("Completed successfully in {:.2?}", started.elapsed());
            ExitCode::SUCCESS
        }
        Ok(Outcome::Partial) => {
            error!("Completed with failures in {:.2?}", started.elapsed());
            ExitCode::from(2)
        }
        Err(err) => {
            error!("{:?} error: {}", err.class(), err);
            ExitCode::FAILURE
        }
    }
}
