use crate::error::Error;
use std::time::Duration;

const DEFAULT_VISIBILITY_THRESHOLD: &str = "0.5";
const DEFAULT_STUCK_TIMEOUT_SECS: &str = "2.5";
const DEFAULT_SEARCH_WINDOW: &str = "10";
const DEFAULT_STALL_SKIP: &str = "20";
const DEFAULT_END_MARGIN: &str = "5";
const DEFAULT_DRIFT_TOLERANCE: &str = "0.08";

/// Knobs of the pose matcher and progression tracker.
#[derive(Debug, Clone, Copy, structopt::StructOpt)]
pub(crate) struct TrackingConfig {
    /// Minimum live landmark visibility for a joint to be scored.
    #[structopt(long, default_value = DEFAULT_VISIBILITY_THRESHOLD)]
    pub(crate) visibility_threshold: f32,

    /// Seconds without progress before a stall is logged.
    #[structopt(long = "stuck-timeout", default_value = DEFAULT_STUCK_TIMEOUT_SECS)]
    pub(crate) stuck_timeout_secs: f64,

    /// Reference frames searched on either side of the current one.
    #[structopt(short = "w", long, default_value = DEFAULT_SEARCH_WINDOW)]
    pub(crate) search_window: usize,

    /// Reference frames skipped after a stall.
    #[structopt(long, default_value = DEFAULT_STALL_SKIP)]
    pub(crate) stall_skip: usize,

    /// The session ends once the tracker is this close to the last reference frame.
    #[structopt(long, default_value = DEFAULT_END_MARGIN)]
    pub(crate) end_margin: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD.parse().unwrap(),
            stuck_timeout_secs: DEFAULT_STUCK_TIMEOUT_SECS.parse().unwrap(),
            search_window: DEFAULT_SEARCH_WINDOW.parse().unwrap(),
            stall_skip: DEFAULT_STALL_SKIP.parse().unwrap(),
            end_margin: DEFAULT_END_MARGIN.parse().unwrap(),
        }
    }
}

impl TrackingConfig {
    /// Negative and NaN timeouts saturate to zero, overly large ones to `Duration::MAX`.
    pub(crate) fn stuck_timeout(&self) -> Duration {
        match Duration::try_from_secs_f64(self.stuck_timeout_secs) {
            Ok(timeout) => timeout,
            Err(_) if self.stuck_timeout_secs > 0.0 => Duration::MAX,
            Err(_) => Duration::ZERO,
        }
    }

    pub(crate) fn validate(self) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&self.visibility_threshold) {
            return Err(Error::InvalidConfig(format!(
                "visibility threshold must be within [0, 1], got {}",
                self.visibility_threshold
            )));
        }
        if !self.stuck_timeout_secs.is_finite() || self.stuck_timeout_secs <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "stuck timeout must be a positive number of seconds, got {}",
                self.stuck_timeout_secs
            )));
        }
        if self.search_window == 0 {
            return Err(Error::InvalidConfig(
                "search window must cover at least one frame".to_owned(),
            ));
        }
        if self.stall_skip == 0 {
            return Err(Error::InvalidConfig(
                "stall skip must be at least one frame".to_owned(),
            ));
        }
        Ok(self)
    }
}

/// Knobs of the coaching analysis.
#[derive(Debug, Clone, Copy, structopt::StructOpt)]
pub(crate) struct CoachConfig {
    /// Offset difference beyond which a joint is called out as high, low or drifting.
    #[structopt(long, default_value = DEFAULT_DRIFT_TOLERANCE)]
    pub(crate) drift_tolerance: f32,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            drift_tolerance: DEFAULT_DRIFT_TOLERANCE.parse().unwrap(),
        }
    }
}
