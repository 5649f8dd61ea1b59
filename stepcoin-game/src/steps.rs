//! Seam for the on-device step counter.
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepSourceError {
    #[error("step data not authorized: {0}")]
    Unauthorized(String),
    #[error("failed to fetch steps: {0}")]
    Fetch(String),
}

/// Source of today's cumulative step count.
#[async_trait]
pub trait StepProvider: Send {
    /// Steps walked since local midnight.
    ///
    /// # Errors
    ///
    /// Returns `StepSourceError` when the count cannot be read.
    async fn steps_today(&mut self) -> Result<u64, StepSourceError>;
}

/// Provider that always reports the same count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantSteps(pub u64);

#[async_trait]
impl StepProvider for ConstantSteps {
    async fn steps_today(&mut self) -> Result<u64, StepSourceError> {
        Ok(self.0)
    }
}

/// Rate limit for background step checks.
///
/// The host wakes the engine whenever its scheduler allows; a check only runs
/// once `interval_secs` have passed since the previous one. Times are
/// monotonic seconds chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundSchedule {
    interval_secs: u64,
    last_run: Option<u64>,
}

impl BackgroundSchedule {
    #[must_use]
    pub const fn new(interval_secs: u64) -> Self {
        Self {
            interval_secs,
            last_run: None,
        }
    }

    #[must_use]
    pub const fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    #[must_use]
    pub const fn last_run(&self) -> Option<u64> {
        self.last_run
    }

    /// Whether a check may run at `now_secs`. The first check is always due.
    #[must_use]
    pub fn is_due(&self, now_secs: u64) -> bool {
        self.last_run
            .is_none_or(|last| now_secs.saturating_sub(last) >= self.interval_secs)
    }

    pub fn mark_run(&mut self, now_secs: u64) {
        self.last_run = Some(now_secs);
    }

    /// Claim the slot at `now_secs` if it is due.
    pub fn try_claim(&mut self, now_secs: u64) -> bool {
        let due = self.is_due(now_secs);
        if due {
            self.mark_run(now_secs);
        }
        due
    }
}
