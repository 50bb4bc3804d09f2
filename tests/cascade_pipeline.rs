use cascade_core::compiler::{Prediction, RelationalImage};
use cascade_core::executor::{Artifact, RunConfig, RunFile, Runner};
use cascade_core::hierarchy::LocationId;
use cascade_core::model::Integrand;
use cascade_core::plan::{CascadePlan, JobId, Stage};
use cascade_core::solver::EchoSolver;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn run_file(model: serde_json::Value) -> RunFile {
    let observation = |location: i64, integrand: &str, sex: f64| {
        json!({"integrand": integrand, "location_id": location, "age_lower": 20, "age_upper": 40,
               "time_lower": 2000, "time_upper": 2004, "mean": 0.03, "std": 0.005,
               "study_covariates": {"sex": sex}})
    };
    let point = |location: i64, integrand: &str| {
        json!({"integrand": integrand, "location_id": location, "age_lower": 50, "age_upper": 50,
               "time_lower": 2005, "time_upper": 2005})
    };
    let mut doc = json!({
        "locations": [
            {"location_id": 1, "name": "Global"},
            {"location_id": 2, "parent_id": 1, "name": "Europe"},
            {"location_id": 3, "parent_id": 1, "name": "Asia"},
            {"location_id": 4, "parent_id": 2, "name": "France"},
            {"location_id": 5, "parent_id": 2, "name": "Spain"}
        ],
        "settings": {
            "model": {"drill": "cascade", "default_age_grid": [0, 20, 60, 100], "default_time_grid": [1990, 2005, 2020]},
            "rate": [
                {"rate": "iota", "default": {"value": {"density": "uniform", "min": 1e-6, "max": 1, "mean": 0.01},
                                             "dage": {"density": "gaussian", "mean": 0, "std": 0.1}}},
                {"rate": 9, "age_grid": [0, 100], "time_grid": [2000],
                 "default": {"value": {"density": "uniform", "min": 0, "max": 2, "mean": 0.02}}}
            ],
            "random_effect": [
                {"rate": "iota", "age_grid": [50], "time_grid": [2005],
                 "default": {"value": {"density": "gaussian", "mean": 0, "std": 0.5}}},
                {"rate": "chi", "age_grid": [50], "time_grid": [2005],
                 "default": {"value": {"density": "gaussian", "mean": 0, "std": 0.5}}}
            ],
            "country_covariate": [
                {"covariate": "ldi", "transformation": 1, "mulcov_type": "rate_value", "measure": "iota",
                 "age_grid": [0], "time_grid": [2000],
                 "default": {"value": {"density": "uniform", "min": -1, "max": 1, "mean": 0}}}
            ],
            "study_covariate": [
                {"covariate": "sex", "mulcov_type": "meas_value", "measure": "prevalence",
                 "age_grid": [0], "time_grid": [2000],
                 "default": {"value": {"density": "uniform", "min": -1, "max": 1, "mean": 0}}}
            ],
            "policies": {"num_samples": 3, "solver_retries": 1, "minimum_meas_cv": 0.1},
            "option": {"quasi_fixed": false, "random_seed": 7}
        },
        "observations": [
            observation(2, "Sincidence", 0.5),
            observation(4, "prevalence", -0.5),
            observation(5, "mtexcess", 0.5),
            observation(3, "Sincidence", -0.5)
        ],
        "country_covariates": [
            {"covariate": "ldi", "location_id": 1, "time": 1990, "value": 2000},
            {"covariate": "ldi", "location_id": 1, "time": 2020, "value": 4000},
            {"covariate": "ldi", "location_id": 2, "time": 2005, "value": 9000}
        ],
        "avgint": [point(1, "Sincidence"), point(3, "Sincidence"), point(4, "Sincidence"), point(4, "mtexcess")]
    });
    if let (Some(target), Some(extra)) = (doc["settings"]["model"].as_object_mut(), model.as_object()) {
        for (k, v) in extra {
            target.insert(k.clone(), v.clone());
        }
    }
    RunFile::parse(&doc.to_string(), "pipeline").unwrap()
}

fn read_predictions(work_dir: &Path, location: i64) -> Vec<Prediction> {
    let text = fs::read_to_string(work_dir.join(location.to_string()).join("predictions.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn test_full_cascade_through_echo_solver() {
    let dir = tempfile::tempdir().unwrap();
    let run = run_file(json!({}));
    let hierarchy = run.hierarchy().unwrap();
    let plan = CascadePlan::build(&hierarchy, Arc::new(run.settings.clone())).unwrap();
    assert_eq!(plan.jobs().len(), 5 * Stage::ALL.len());

    let config = RunConfig::new(dir.path());
    let runner = Runner::new(&plan, &hierarchy, &run.inputs, &EchoSolver, &config);
    let report = runner.run().unwrap();
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.completed, plan.jobs().to_vec());

    // the echo solver returns start values, so the root's prior means flow down the cascade
    let france = read_predictions(dir.path(), 4);
    assert_eq!(france.len(), 2);
    for prediction in &france {
        assert_eq!(prediction.location_id, LocationId(4));
        let expected = if prediction.integrand == Integrand::Sincidence { 0.01 } else { 0.02 };
        assert!((prediction.value - expected).abs() < 1e-12, "{:?}", prediction);
    }
    assert_eq!(read_predictions(dir.path(), 1).len(), 1);
    assert!(read_predictions(dir.path(), 5).is_empty());

    let image: RelationalImage =
        serde_json::from_str(&fs::read_to_string(dir.path().join("2").join("initial_fit.json")).unwrap()).unwrap();
    assert_eq!(image.fit_var.len(), image.var.len());
    let europe = image.node.iter().find(|n| n.c_location_id == 2).unwrap();
    assert_eq!(image.option("parent_node_id"), Some(europe.node_id.to_string().as_str()));
    assert_eq!(image.option("random_seed"), Some("7"));
    assert_eq!(image.covariate.len(), 2);
    // data at 2 and its children, each std raised to a tenth of the mean
    assert_eq!(image.data.len(), 3);
    assert!(image.data.iter().all(|d| d.meas_std >= 0.003 - 1e-12));
}

#[test]
fn test_parallel_run_matches_sequential() {
    let run = run_file(json!({}));
    let hierarchy = run.hierarchy().unwrap();
    let plan = CascadePlan::build(&hierarchy, Arc::new(run.settings.clone())).unwrap();

    let sequential_dir = tempfile::tempdir().unwrap();
    let config = RunConfig::new(sequential_dir.path());
    let sequential = Runner::new(&plan, &hierarchy, &run.inputs, &EchoSolver, &config).run().unwrap();

    let parallel_dir = tempfile::tempdir().unwrap();
    let config = RunConfig { parallel: true, cache_capacity: 4, ..RunConfig::new(parallel_dir.path()) };
    let parallel = Runner::new(&plan, &hierarchy, &run.inputs, &EchoSolver, &config).run().unwrap();

    assert_eq!(parallel.completed, sequential.completed);
    for location in [1, 3, 4] {
        assert_eq!(read_predictions(parallel_dir.path(), location), read_predictions(sequential_dir.path(), location));
    }
}

#[test]
fn test_drill_fits_one_path() {
    let dir = tempfile::tempdir().unwrap();
    let run = run_file(json!({"drill": "drill", "drill_location": 4, "drill_location_start": 1}));
    let hierarchy = run.hierarchy().unwrap();
    let plan = CascadePlan::build(&hierarchy, Arc::new(run.settings.clone())).unwrap();
    assert_eq!(plan.locations(), &[LocationId(1), LocationId(2), LocationId(4)]);
    assert_eq!(plan.jobs().last(), Some(&JobId::new(Stage::SavePredictions, LocationId(4))));

    let config = RunConfig::new(dir.path());
    let runner = Runner::new(&plan, &hierarchy, &run.inputs, &EchoSolver, &config);
    match runner.run_single("estimate_location:compute_draws_from_parent_fit@4").unwrap() {
        Artifact::Draws(draws) => assert_eq!(draws.len(), 3),
        other => panic!("Expected draws, got {}", other.kind()),
    }
    assert!(runner.run_single("estimate_location:save_predictions@2").is_err());
}
