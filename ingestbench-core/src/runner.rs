mod config;
mod gate;
mod progress;
mod run;
mod schedule;
mod signal;
mod vu;

pub use config::{LoadProfile, RunConfig, Stage};
pub use gate::IterationGate;
pub use progress::{ProgressFn, ProgressUpdate, StageProgress};
pub use run::{RunReport, run_scenario};
pub use schedule::{StageSnapshot, UserSchedule};
pub use signal::StopSignal;
