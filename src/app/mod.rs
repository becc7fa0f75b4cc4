pub mod importer;
pub mod task_runner;

pub use importer::run_import;
pub use task_runner::{Acquisition, Pipeline, RunSummary};
