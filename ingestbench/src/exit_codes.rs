#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more absolute thresholds failed.
    ThresholdsFailed = 10,

    /// The run regressed against the baseline.
    RegressionFailed = 11,

    /// Thresholds failed and the run regressed.
    ThresholdsAndRegressionFailed = 12,

    /// Invalid CLI/config/options (bad flags, missing API key, unusable baseline, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, failed results write, panicked tasks).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_quality_gates(thresholds_failed: bool, regression_failed: bool) -> Self {
        match (thresholds_failed, regression_failed) {
            (false, false) => Self::Success,
            (true, false) => Self::ThresholdsFailed,
            (false, true) => Self::RegressionFailed,
            (true, true) => Self::ThresholdsAndRegressionFailed,
        }
    }
}
