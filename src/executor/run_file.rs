//! run_file.rs
//! The JSON document a command-line run starts from.
use crate::data::InMemoryInputs;
use crate::error::CascadeError;
use crate::hierarchy::{LocationHierarchy, LocationRow};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFile {
    pub locations: Vec<LocationRow>,
    pub settings: Settings,
    /// `observations`, `country_covariates` and `avgint` at the top level.
    #[serde(flatten)]
    pub inputs: InMemoryInputs,
}

impl RunFile {
    pub fn load(path: &Path) -> Result<Self, CascadeError> {
        let text = fs::read_to_string(path).map_err(|e| CascadeError::input_io("read", path, e))?;
        Self::parse(&text, &path.display().to_string())
    }

    pub fn parse(text: &str, what: &str) -> Result<Self, CascadeError> {
        serde_json::from_str(text).map_err(|source| CascadeError::Parse { what: what.to_string(), source })
    }

    pub fn hierarchy(&self) -> Result<LocationHierarchy, CascadeError> {
        Ok(LocationHierarchy::build(&self.locations)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn test_inputs_sit_beside_settings() {
        let text = r#"{
            "locations": [{"location_id": 1}, {"location_id": 2, "parent_id": 1}],
            "settings": {"model": {"drill": "cascade", "default_age_grid": [0], "default_time_grid": [2000]}},
            "observations": [{"integrand": "prevalence", "location_id": 2, "age_lower": 0, "age_upper": 5,
                              "time_lower": 2000, "time_upper": 2001, "mean": 0.1, "std": 0.02}]
        }"#;
        let run = RunFile::parse(text, "run").unwrap();
        assert_eq!(run.inputs.observations.len(), 1);
        assert!(run.inputs.avgint.is_empty());
        assert_eq!(run.hierarchy().unwrap().len(), 2);
    }

    #[test]
    fn test_bad_document_is_a_configuration_error() {
        let err = RunFile::parse("{\"locations\": 3}", "run.json").unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert!(err.to_string().contains("run.json"));
    }

    #[test]
    fn test_missing_run_file_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunFile::load(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert!(err.class().aborts_run());
        assert!(!err.is_retryable());
    }
}
