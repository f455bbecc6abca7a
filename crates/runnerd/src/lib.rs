pub mod job_file;
pub mod logging;
pub mod orchestrator;
pub mod state_machine;

pub use job_file::*;
pub use logging::*;
pub use orchestrator::*;
pub use state_machine::*;
