use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt as _;
use rand::SeedableRng as _;
use rand::rngs::StdRng;

use super::gate::IterationGate;
use super::schedule::UserSchedule;
use super::signal::StopSignal;
use crate::outcome::RequestOutcome;
use crate::scenario::Scenario;
use crate::session::VirtualUser;
use crate::stats::StatsCollector;

/// Counters shared by all actors of one run.
#[derive(Debug, Default)]
pub(crate) struct RunCounters {
    pub users_started: AtomicU64,
    pub active_users: AtomicU64,
    pub peak_active_users: AtomicU64,
    pub setup_failures: AtomicU64,
    pub teardown_failures: AtomicU64,
    pub abandoned_iterations: AtomicU64,
}

struct ActiveUserGuard<'a> {
    counters: &'a RunCounters,
}

impl<'a> ActiveUserGuard<'a> {
    fn new(counters: &'a RunCounters) -> Self {
        let now = counters.active_users.fetch_add(1, Ordering::AcqRel) + 1;
        counters.peak_active_users.fetch_max(now, Ordering::AcqRel);
        Self { counters }
    }
}

impl Drop for ActiveUserGuard<'_> {
    fn drop(&mut self) {
        self.counters.active_users.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Clone)]
pub(crate) struct UserContext {
    /// 1-based slot; also the user id handed to setup.
    pub slot: u64,
    pub scenario: Arc<Scenario>,
    pub stats: Arc<StatsCollector>,
    pub gate: Arc<IterationGate>,
    pub schedule: Arc<UserSchedule>,
    pub counters: Arc<RunCounters>,
    /// No new iterations once fired.
    pub stop: Arc<StopSignal>,
    /// In-flight iterations are abandoned once fired.
    pub hard_stop: Arc<StopSignal>,
    pub started: Instant,
    pub grace: Duration,
    pub seed: Option<u64>,
}

impl UserContext {
    fn is_active(&self) -> bool {
        self.slot <= self.schedule.target_at(self.started.elapsed())
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => {
                StdRng::seed_from_u64(seed ^ self.slot.wrapping_mul(0x9E37_79B9_7F4A_7C15))
            }
            None => StdRng::from_os_rng(),
        }
    }
}

enum LoopExit {
    /// Stop signal or exhausted budget.
    Stopped,
    /// Ramped down below this slot; the user may come back later.
    Deactivated,
    /// An iteration was abandoned at the grace deadline.
    Abandoned,
}

/// One actor: wait for the schedule, set up, iterate, tear down. A ramping
/// schedule may cycle a slot through this more than once.
pub(crate) async fn run_user(ctx: UserContext) {
    let mut rng = ctx.rng();

    loop {
        if !wait_until_active(&ctx).await {
            return;
        }

        let setup = tokio::select! {
            biased;
            _ = ctx.stop.wait() => return,
            res = ctx.scenario.lifecycle().setup(ctx.slot) => res,
        };
        let session = match setup {
            Ok(session) => session,
            Err(err) => {
                ctx.counters.setup_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    user = ctx.slot,
                    error = %err,
                    "user setup failed, user stays inert"
                );
                return;
            }
        };
        ctx.counters.users_started.fetch_add(1, Ordering::Relaxed);

        let mut user = VirtualUser::new(ctx.slot, session);
        let exit = {
            let _active = ActiveUserGuard::new(&ctx.counters);
            iterate(&ctx, &mut user, &mut rng).await
        };

        teardown(&ctx, user).await;

        match exit {
            LoopExit::Deactivated if !ctx.stop.is_fired() => continue,
            _ => return,
        }
    }
}

async fn wait_until_active(ctx: &UserContext) -> bool {
    loop {
        if ctx.stop.is_fired() {
            return false;
        }

        let elapsed = ctx.started.elapsed();
        if ctx.slot <= ctx.schedule.target_at(elapsed) {
            return true;
        }
        if ctx.schedule.is_done(elapsed) {
            // Above the final target: this slot never runs again.
            return false;
        }

        let wait = ctx
            .schedule
            .next_recheck_in(elapsed, ctx.slot)
            .max(Duration::from_millis(1));
        tokio::select! {
            biased;
            _ = ctx.stop.wait() => return false,
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

async fn iterate(ctx: &UserContext, user: &mut VirtualUser, rng: &mut StdRng) -> LoopExit {
    loop {
        if ctx.stop.is_fired() {
            return LoopExit::Stopped;
        }
        if !ctx.is_active() {
            return LoopExit::Deactivated;
        }
        if !ctx.gate.try_acquire() {
            ctx.stop.fire();
            return LoopExit::Stopped;
        }

        let pattern = ctx.scenario.pick(rng).clone();
        let iteration_started = Instant::now();

        let outcome = tokio::select! {
            biased;
            res = AssertUnwindSafe(pattern.execute(user, rng)).catch_unwind() => match res {
                Ok(outcome) => Some(outcome),
                Err(payload) => Some(RequestOutcome::failure(
                    pattern.name().clone(),
                    iteration_started.elapsed(),
                    format!("panicked: {}", panic_message(payload.as_ref())),
                )),
            },
            _ = ctx.hard_stop.wait() => None,
        };

        let Some(outcome) = outcome else {
            ctx.counters.abandoned_iterations.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                user = user.id(),
                pattern = %pattern.name(),
                "iteration abandoned at shutdown"
            );
            ctx.stats.record(&RequestOutcome::failure(
                pattern.name().clone(),
                iteration_started.elapsed(),
                "abandoned at shutdown",
            ));
            return LoopExit::Abandoned;
        };
        ctx.stats.record(&outcome);

        let pause = ctx.scenario.pacing().sample(rng);
        if !pause.is_zero() {
            tokio::select! {
                biased;
                _ = ctx.stop.wait() => return LoopExit::Stopped,
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

async fn teardown(ctx: &UserContext, user: VirtualUser) {
    let user_id = user.id();
    let session = user.into_session();
    match tokio::time::timeout(ctx.grace, ctx.scenario.lifecycle().teardown(session)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            ctx.counters.teardown_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(user = user_id, error = %err, "user teardown failed");
        }
        Err(_) => {
            ctx.counters.teardown_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(user = user_id, grace = ?ctx.grace, "user teardown timed out");
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
