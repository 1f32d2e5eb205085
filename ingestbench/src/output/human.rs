use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_duration_single, format_ms, format_percent, format_rate};
use ingestbench_core::runner::{LoadProfile, ProgressFn, RunConfig};
use progress::HumanProgress;
use summary::render;

use super::{OutputFormatter, RunOutcome};

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, scenario: &str, ingest_url: &str, cfg: &RunConfig) {
        println!("target: {ingest_url}");
        let users = match &cfg.profile {
            LoadProfile::Constant { users } => format!("users={users}"),
            LoadProfile::Ramping {
                start_users,
                stages,
            } => format!(
                "users={start_users}->{} stages={}",
                cfg.profile.max_users(),
                stages.len()
            ),
        };
        println!(
            "scenario: {scenario} {users} iterations={:?} duration={:?}",
            cfg.iterations,
            cfg.effective_duration()
        );
        println!();
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u| {
            let s = &u.snapshot;
            let rates = format!(
                " rps={} errors={} total={} p95={}",
                format_rate(u.rps_now),
                format_percent(u.error_rate_now),
                s.total_requests,
                format_ms(s.p95_ms)
            );

            let message = match &u.stage {
                Some(st) => format!(
                    "users={}/{} stage={}/{} left={} elapsed={}{}",
                    u.active_users,
                    u.target_users,
                    st.stage,
                    st.stages,
                    format_duration_single(st.stage_remaining),
                    format_duration_single(u.elapsed),
                    rates
                ),
                None => format!(
                    "users={} elapsed={}{}",
                    u.active_users,
                    format_duration_single(u.elapsed),
                    rates
                ),
            };

            progress.update("run", u.planned_duration, u.elapsed, message);
        }))
    }

    fn print_summary(&self, outcome: &RunOutcome<'_>) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(outcome));
        Ok(())
    }
}
