use std::time::Duration;

use super::config::{LoadProfile, Stage};

const RECHECK_DEFAULT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Where `elapsed` falls inside the stage list.
struct Located {
    index: usize,
    stage_start: Duration,
    stage_end: Duration,
    start_target: u64,
    end_target: u64,
}

impl Located {
    fn stage_duration(&self) -> Duration {
        self.stage_end.saturating_sub(self.stage_start)
    }
}

/// Target number of active users as a function of elapsed run time.
#[derive(Debug, Clone)]
pub struct UserSchedule {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl UserSchedule {
    #[must_use]
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            start,
            stages,
            cumulative_ends,
        }
    }

    #[must_use]
    pub fn constant(users: u64) -> Self {
        Self::new(users, Vec::new())
    }

    #[must_use]
    pub fn from_profile(profile: &LoadProfile) -> Self {
        match profile {
            LoadProfile::Constant { users } => Self::constant(*users),
            LoadProfile::Ramping {
                start_users,
                stages,
            } => Self::new(*start_users, stages.clone()),
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    pub fn final_target(&self) -> u64 {
        self.stages.last().map_or(self.start, |s| s.target)
    }

    fn locate(&self, elapsed: Duration) -> Option<Located> {
        if self.stages.is_empty() {
            return None;
        }

        let idx = if elapsed >= self.total_duration() {
            self.stages.len() - 1
        } else {
            match self
                .cumulative_ends
                .binary_search_by(|end| end.cmp(&elapsed))
            {
                // An exact stage boundary belongs to the next stage.
                Ok(i) => (i + 1).min(self.stages.len() - 1),
                Err(i) => i,
            }
        };

        Some(Located {
            index: idx,
            stage_start: if idx == 0 {
                Duration::ZERO
            } else {
                self.cumulative_ends[idx - 1]
            },
            stage_end: self.cumulative_ends[idx],
            start_target: if idx == 0 {
                self.start
            } else {
                self.stages[idx - 1].target
            },
            end_target: self.stages[idx].target,
        })
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let Some(loc) = self.locate(elapsed) else {
            return self.start;
        };
        if elapsed >= self.total_duration() {
            return self.final_target();
        }

        let stage_duration = loc.stage_duration();
        if stage_duration.is_zero() {
            return loc.end_target;
        }

        // Linear interpolation across the stage.
        let start_i = i128::from(loc.start_target);
        let delta = i128::from(loc.end_target) - start_i;
        let num = elapsed.saturating_sub(loc.stage_start).as_nanos() as i128;
        let den = stage_duration.as_nanos() as i128;

        let cur = start_i + delta.saturating_mul(num) / den.max(1);
        cur.clamp(0, i128::from(u64::MAX)) as u64
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        let clamped = elapsed.min(self.total_duration());
        let loc = self.locate(clamped)?;

        let stage_elapsed = clamped.saturating_sub(loc.stage_start);
        Some(StageSnapshot {
            index: loc.index,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: loc.stage_duration().saturating_sub(stage_elapsed),
            start_target: loc.start_target,
            end_target: loc.end_target,
            current_target: self.target_at(clamped),
        })
    }

    /// How long the user in `slot` (1-based) should sleep before checking
    /// again whether it is active.
    pub fn next_recheck_in(&self, elapsed: Duration, slot: u64) -> Duration {
        let Some(loc) = self.locate(elapsed) else {
            return RECHECK_DEFAULT;
        };
        if elapsed >= self.total_duration() {
            return Duration::ZERO;
        }

        if slot <= self.target_at(elapsed) {
            return Duration::from_millis(1);
        }

        let until_stage_end = loc.stage_end.saturating_sub(elapsed).min(RECHECK_DEFAULT);

        // A flat or decreasing stage cannot activate this slot.
        if loc.end_target <= loc.start_target || slot > loc.end_target {
            return until_stage_end;
        }

        // Solve start + (end - start) * t / dur >= slot for t.
        let start_i = i128::from(loc.start_target);
        let delta = i128::from(loc.end_target) - start_i;
        let want = i128::from(slot);
        if want <= start_i {
            return Duration::ZERO;
        }

        let stage_ns = loc.stage_duration().as_nanos() as i128;
        let elapsed_ns = elapsed.saturating_sub(loc.stage_start).as_nanos() as i128;
        let needed_ns = (want - start_i).saturating_mul(stage_ns) / delta;
        let wait_ns = needed_ns.saturating_sub(elapsed_ns).max(0);

        Duration::from_nanos(wait_ns.min(i128::from(u64::MAX)) as u64).min(RECHECK_DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn ramp() -> UserSchedule {
        UserSchedule::new(
            0,
            vec![
                Stage {
                    duration: ms(1000),
                    target: 10,
                },
                Stage {
                    duration: ms(1000),
                    target: 10,
                },
                Stage {
                    duration: ms(1000),
                    target: 2,
                },
            ],
        )
    }

    #[test]
    fn constant_schedule_is_flat() {
        let s = UserSchedule::constant(7);
        assert_eq!(s.target_at(Duration::ZERO), 7);
        assert_eq!(s.target_at(ms(123_456)), 7);
        assert!(s.is_done(Duration::ZERO));
        assert!(s.stage_snapshot_at(ms(5)).is_none());
    }

    #[test]
    fn targets_interpolate_linearly() {
        let s = ramp();
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(ms(500)), 5);
        assert_eq!(s.target_at(ms(1000)), 10);
        assert_eq!(s.target_at(ms(1500)), 10);
        assert_eq!(s.target_at(ms(2500)), 6);
        assert_eq!(s.target_at(ms(3000)), 2);
        assert_eq!(s.target_at(ms(9000)), 2);
        assert_eq!(s.total_duration(), ms(3000));
    }

    #[test]
    fn snapshot_reports_current_stage() {
        let s = ramp();
        let snap = s.stage_snapshot_at(ms(2250));
        assert_eq!(
            snap,
            Some(StageSnapshot {
                index: 2,
                count: 3,
                stage_elapsed: ms(250),
                stage_remaining: ms(750),
                start_target: 10,
                end_target: 2,
                current_target: 8,
            })
        );
    }

    #[test]
    fn recheck_waits_for_the_ramp() {
        let s = ramp();
        // Slot 5 activates at 500ms.
        assert_eq!(s.next_recheck_in(ms(480), 5), ms(20));
        // Already active.
        assert_eq!(s.next_recheck_in(ms(600), 5), ms(1));
        // Never active in a decreasing stage: capped sleep.
        assert_eq!(s.next_recheck_in(ms(2900), 9), ms(50));
        assert_eq!(s.next_recheck_in(ms(3000), 9), Duration::ZERO);
    }
}
