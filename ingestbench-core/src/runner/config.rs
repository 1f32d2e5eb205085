use std::time::Duration;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// How many users are active over time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadProfile {
    /// All users active for the whole run.
    Constant { users: u64 },

    /// Ramp the number of active users up/down over time, interpolating
    /// linearly inside each stage.
    Ramping { start_users: u64, stages: Vec<Stage> },
}

impl LoadProfile {
    /// `users` reached linearly over `ramp_up`, starting from zero.
    #[must_use]
    pub fn ramp_up(users: u64, ramp_up: Duration) -> Self {
        if ramp_up.is_zero() {
            return Self::Constant { users };
        }
        Self::Ramping {
            start_users: 0,
            stages: vec![Stage {
                duration: ramp_up,
                target: users,
            }],
        }
    }

    /// Upper bound on concurrently active users; one actor is spawned per slot.
    #[must_use]
    pub fn max_users(&self) -> u64 {
        match self {
            Self::Constant { users } => *users,
            Self::Ramping {
                start_users,
                stages,
            } => stages
                .iter()
                .map(|s| s.target)
                .max()
                .unwrap_or(0)
                .max(*start_users),
        }
    }

    #[must_use]
    pub fn ramp_duration(&self) -> Duration {
        match self {
            Self::Constant { .. } => Duration::ZERO,
            Self::Ramping { stages, .. } => stages
                .iter()
                .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub profile: LoadProfile,
    /// Test window. For ramping profiles without an iteration budget this
    /// defaults to the total stage duration.
    pub duration: Option<Duration>,
    /// Total iterations across all users; the run stops once all are started.
    pub iterations: Option<u64>,
    /// How long in-flight work may continue after the stop signal.
    pub grace: Duration,
    /// Seed for pattern selection and pacing; each user derives its own stream.
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            profile: LoadProfile::Constant { users: 1 },
            duration: None,
            iterations: None,
            grace: Duration::from_secs(5),
            seed: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if let LoadProfile::Ramping { stages, .. } = &self.profile
            && (stages.is_empty() || self.profile.ramp_duration().is_zero())
        {
            return Err(Error::InvalidStages);
        }
        if self.profile.max_users() == 0 {
            return Err(Error::InvalidUsers);
        }
        if self.iterations == Some(0) {
            return Err(Error::InvalidIterations);
        }
        if self.effective_duration().is_none() && self.iterations.is_none() {
            return Err(Error::UnboundedRun);
        }
        Ok(())
    }

    /// The wall-clock window the run is bounded by, if any.
    #[must_use]
    pub fn effective_duration(&self) -> Option<Duration> {
        self.duration.or_else(|| match &self.profile {
            LoadProfile::Ramping { .. } if self.iterations.is_none() => {
                Some(self.profile.ramp_duration())
            }
            _ => None,
        })
    }
}
