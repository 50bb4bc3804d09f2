//! command.rs
//! Verbs understood by the solver program.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverCommand {
    Init,
    /// Optimize fixed effects with random effects held at zero.
    FitFixed,
    FitBoth,
    /// Draw this many samples of every var around the current fit.
    Sample(usize),
    Predict,
}

impl SolverCommand {
    pub fn verbs(&self) -> Vec<String> {
        match self {
            SolverCommand::Init => vec!["init".into()],
            SolverCommand::FitFixed => vec!["fit".into(), "fixed".into()],
            SolverCommand::FitBoth => vec!["fit".into(), "both".into()],
            SolverCommand::Sample(n) => vec!["sample".into(), "asymptotic".into(), n.to_string()],
            SolverCommand::Predict => vec!["predict".into(), "fit_var".into()],
        }
    }
}

impl fmt::Display for SolverCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verbs().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SolverCommand::Init, "init")]
    #[case(SolverCommand::FitFixed, "fit fixed")]
    #[case(SolverCommand::Sample(20), "sample asymptotic 20")]
    #[case(SolverCommand::Predict, "predict fit_var")]
    fn test_command_line(#[case] command: SolverCommand, #[case] expected: &str) {
        assert_eq!(command.to_string(), expected);
    }
}
