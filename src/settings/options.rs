//! Solver options passed through from the settings document.
use super::error::ConfigurationError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Options the solver understands and the settings may set.
pub const KNOWN_OPTIONS: &[&str] = &[
    "random_seed",
    "ode_step_size",
    "age_avg_split",
    "rate_case",
    "meas_std_effect",
    "quasi_fixed",
    "derivative_test_fixed",
    "derivative_test_random",
    "max_num_iter_fixed",
    "max_num_iter_random",
    "print_level_fixed",
    "print_level_random",
    "tolerance_fixed",
    "tolerance_random",
    "accept_after_max_steps_fixed",
    "accept_after_max_steps_random",
    "limited_memory_max_history_fixed",
    "bound_frac_fixed",
    "bound_random",
    "zero_sum_random",
    "warn_on_stderr",
];

/// Options the cascade sets itself for every location.
pub const RESERVED_OPTIONS: &[&str] = &["parent_node_id", "parent_node_name"];

/// Validates the option map and renders each value as solver text, in name order.
pub fn solver_options(options: &BTreeMap<String, Value>) -> Result<Vec<(String, String)>, ConfigurationError> {
    let mut rendered = Vec::with_capacity(options.len());
    for (name, value) in options {
        if RESERVED_OPTIONS.contains(&name.as_str()) {
            return Err(ConfigurationError::InvalidOption {
                name: name.clone(),
                reason: "set by the cascade for each location".into(),
            });
        }
        if !KNOWN_OPTIONS.contains(&name.as_str()) {
            return Err(ConfigurationError::UnknownOption { name: name.clone() });
        }
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => continue,
            Value::Array(_) | Value::Object(_) => {
                return Err(ConfigurationError::InvalidOption {
                    name: name.clone(),
                    reason: "expected a string, number or boolean".into(),
                })
            }
        };
        rendered.push((name.clone(), text));
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_renders_scalar_options() {
        let mut options = BTreeMap::new();
        options.insert("quasi_fixed".to_string(), json!(true));
        options.insert("ode_step_size".to_string(), json!(10));
        options.insert("random_seed".to_string(), Value::Null);
        let rendered = solver_options(&options).unwrap();
        assert_eq!(
            rendered,
            vec![("ode_step_size".to_string(), "10".to_string()), ("quasi_fixed".to_string(), "true".to_string())]
        );
    }

    #[test]
    fn test_rejects_unknown_and_reserved_names() {
        let mut options = BTreeMap::new();
        options.insert("odd_step_size".to_string(), json!(10));
        assert!(matches!(solver_options(&options), Err(ConfigurationError::UnknownOption { .. })));

        let mut options = BTreeMap::new();
        options.insert("parent_node_id".to_string(), json!(0));
        assert!(matches!(solver_options(&options), Err(ConfigurationError::InvalidOption { .. })));
    }
}
