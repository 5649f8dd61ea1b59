//! Milestone detection and the notification seam.
use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    MILESTONE_MESSAGE_VARIANTS, MILESTONE_NOTICE_CATEGORY, MILESTONE_NOTICE_TITLE,
    STEPS_PER_REWARD,
};

/// Latest milestone crossed when the box count grows from `previous` to `current`.
///
/// Several milestones crossed in one jump still report a single value.
#[must_use]
pub fn crossed_milestone(previous: usize, current: usize) -> Option<u64> {
    if current <= previous {
        return None;
    }
    u64::try_from(current)
        .ok()
        .map(|count| count.saturating_mul(STEPS_PER_REWARD))
}

/// Payload handed to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneNotice {
    pub title: String,
    pub body: String,
    /// Milestone step value, carried as notification metadata.
    pub milestone: u64,
    /// Actionable category the platform maps to a "collect" button.
    pub category: String,
}

impl MilestoneNotice {
    /// Build the notice for `milestone` using message `variant`.
    #[must_use]
    pub fn new(milestone: u64, variant: usize) -> Self {
        Self {
            title: MILESTONE_NOTICE_TITLE.to_string(),
            body: milestone_message(milestone, variant),
            milestone,
            category: MILESTONE_NOTICE_CATEGORY.to_string(),
        }
    }
}

fn milestone_message(milestone: u64, variant: usize) -> String {
    match variant % MILESTONE_MESSAGE_VARIANTS {
        0 => format!("Amazing! You've reached {milestone} steps! 🎉"),
        1 => format!("Great job! {milestone} steps completed! 💪"),
        2 => format!("Keep going! You've hit {milestone} steps! ⭐️"),
        _ => format!("Fantastic progress! {milestone} steps achieved! 🌟"),
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification permission request failed: {0}")]
    Permission(String),
    #[error("notification dispatch failed: {0}")]
    Dispatch(String),
}

/// Fire-and-forget local notification sink.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Ask the platform for permission to post notifications.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Permission` when the platform request fails.
    async fn ensure_permission(&self) -> Result<bool, NotifyError> {
        Ok(true)
    }

    /// Post a milestone notice immediately.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Dispatch` when the platform rejects the notice.
    async fn notify(&self, notice: &MilestoneNotice) -> Result<(), NotifyError>;
}

/// Sink that drops every notice.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSink;

#[async_trait]
impl NotificationSink for SilentSink {
    async fn notify(&self, _notice: &MilestoneNotice) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Turns crossed milestones into notices without ever failing the caller.
#[derive(Debug)]
pub struct MilestoneNotifier<N> {
    sink: N,
    enabled: bool,
    permission: Option<bool>,
    rng: SmallRng,
}

impl<N: NotificationSink> MilestoneNotifier<N> {
    #[must_use]
    pub fn new(sink: N, enabled: bool, seed: u64) -> Self {
        Self {
            sink,
            enabled,
            permission: None,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub const fn sink(&self) -> &N {
        &self.sink
    }

    /// Announce `milestone`. Returns the notice that was posted, if any.
    pub async fn announce(&mut self, milestone: u64) -> Option<MilestoneNotice> {
        if !self.enabled || !self.permitted().await {
            log::debug!("milestone {milestone} reached; notifications unavailable");
            return None;
        }

        let variant = self.rng.gen_range(0..MILESTONE_MESSAGE_VARIANTS);
        let notice = MilestoneNotice::new(milestone, variant);
        log::info!("scheduling milestone notification for {milestone} steps");
        match self.sink.notify(&notice).await {
            Ok(()) => Some(notice),
            Err(err) => {
                log::warn!("milestone notification for {milestone} failed: {err}");
                None
            }
        }
    }

    async fn permitted(&mut self) -> bool {
        if let Some(granted) = self.permission {
            return granted;
        }
        let granted = match self.sink.ensure_permission().await {
            Ok(granted) => granted,
            Err(err) => {
                log::warn!("{err}");
                false
            }
        };
        if !granted {
            log::warn!("notification permission not granted");
        }
        self.permission = Some(granted);
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        notices: Arc<Mutex<Vec<MilestoneNotice>>>,
        permission_calls: Arc<Mutex<u32>>,
        deny: bool,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSink for Recorder {
        async fn ensure_permission(&self) -> Result<bool, NotifyError> {
            *self.permission_calls.lock().unwrap() += 1;
            Ok(!self.deny)
        }

        async fn notify(&self, notice: &MilestoneNotice) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Dispatch("offline".to_string()));
            }
            self.notices.lock().unwrap().push(notice.clone());
            Ok(())
        }
    }

    #[test]
    fn crossing_reports_latest_milestone_only() {
        assert_eq!(crossed_milestone(0, 1), Some(500));
        assert_eq!(crossed_milestone(1, 4), Some(2_000));
        assert_eq!(crossed_milestone(3, 3), None);
        assert_eq!(crossed_milestone(3, 1), None);
    }

    #[test]
    fn notice_carries_milestone_and_category() {
        for variant in 0..MILESTONE_MESSAGE_VARIANTS {
            let notice = MilestoneNotice::new(1_500, variant);
            assert_eq!(notice.milestone, 1_500);
            assert_eq!(notice.category, "steps");
            assert!(notice.body.contains("1500"));
            assert!(notice.title.starts_with("Step Milestone Reached"));
        }
    }

    #[tokio::test]
    async fn announce_posts_and_caches_permission() {
        let sink = Recorder::default();
        let mut notifier = MilestoneNotifier::new(sink.clone(), true, 7);
        assert!(notifier.announce(500).await.is_some());
        assert!(notifier.announce(1_000).await.is_some());
        assert_eq!(sink.notices.lock().unwrap().len(), 2);
        assert_eq!(*sink.permission_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn announce_swallows_denial_failure_and_disable() {
        let denied = Recorder {
            deny: true,
            ..Recorder::default()
        };
        let mut notifier = MilestoneNotifier::new(denied.clone(), true, 1);
        assert!(notifier.announce(500).await.is_none());
        assert!(denied.notices.lock().unwrap().is_empty());

        let failing = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let mut notifier = MilestoneNotifier::new(failing, true, 1);
        assert!(notifier.announce(500).await.is_none());

        let quiet = Recorder::default();
        let mut notifier = MilestoneNotifier::new(quiet.clone(), false, 1);
        assert!(notifier.announce(500).await.is_none());
        assert_eq!(*quiet.permission_calls.lock().unwrap(), 0);
    }
}
