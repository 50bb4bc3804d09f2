//! The boundary to the external optimizer: commands, the solver trait, and
//! the retrying session that hands it a freshly written image.
pub mod command;
pub mod echo;
pub mod error;
pub mod file;
pub mod process;
pub mod session;

pub use command::SolverCommand;
pub use echo::EchoSolver;
pub use error::SolverError;
pub use process::ProcessSolver;
pub use session::SolverSession;

use std::path::Path;

/// Runs one command against the image file at `path`, updating it in place.
pub trait Solver: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, path: &Path, command: &SolverCommand) -> Result<(), SolverError>;
}
