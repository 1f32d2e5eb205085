use crate::cli::OutputFormat;
use std::path::Path;

use ingestbench_core::Evaluation;
use ingestbench_core::runner::{ProgressFn, RunConfig, RunReport};

mod human;
mod json;

/// What a finished run hands to the formatter.
pub(crate) struct RunOutcome<'a> {
    pub scenario: &'a str,
    pub report: &'a RunReport,
    pub evaluation: &'a Evaluation,
    pub results_path: &'a Path,
}

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, scenario: &str, ingest_url: &str, cfg: &RunConfig);
    fn progress(&self) -> Option<ProgressFn>;
    fn print_summary(&self, outcome: &RunOutcome<'_>) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
