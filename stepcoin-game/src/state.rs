//! Reward state aggregate: today's stats plus the lifetime coin balance.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::boxes::{RewardBox, box_count_for_steps, milestone_for_index, reward_box_id};
use crate::constants::{DATE_FORMAT, STEPS_PER_REWARD};

/// Progress for a single calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub date: String,
    pub steps: u64,
    pub reward_boxes: Vec<RewardBox>,
}

impl DailyStats {
    /// Empty stats for `date`.
    #[must_use]
    pub fn fresh(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            steps: 0,
            reward_boxes: Vec::new(),
        }
    }

    #[must_use]
    pub fn find_box(&self, box_id: &str) -> Option<&RewardBox> {
        self.reward_boxes.iter().find(|reward| reward.id == box_id)
    }

    pub fn find_box_mut(&mut self, box_id: &str) -> Option<&mut RewardBox> {
        self.reward_boxes.iter_mut().find(|reward| reward.id == box_id)
    }
}

/// Root aggregate persisted as one blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardState {
    pub coins: u64,
    pub today_stats: DailyStats,
}

impl RewardState {
    /// Zero-coin state with empty stats for `date`.
    #[must_use]
    pub fn fresh(date: impl Into<String>) -> Self {
        Self {
            coins: 0,
            today_stats: DailyStats::fresh(date),
        }
    }

    #[must_use]
    pub fn find_box(&self, box_id: &str) -> Option<&RewardBox> {
        self.today_stats.find_box(box_id)
    }

    /// Boxes unlocked today that are still waiting to be collected.
    #[must_use]
    pub fn uncollected_count(&self) -> usize {
        self.today_stats
            .reward_boxes
            .iter()
            .filter(|reward| !reward.collected)
            .count()
    }

    #[must_use]
    pub fn collected_count(&self) -> usize {
        self.today_stats
            .reward_boxes
            .iter()
            .filter(|reward| reward.collected)
            .count()
    }

    #[must_use]
    pub fn multiplied_count(&self) -> usize {
        self.today_stats
            .reward_boxes
            .iter()
            .filter(|reward| reward.multiplier.is_some())
            .count()
    }

    /// Step threshold of the next box that has not been unlocked yet.
    #[must_use]
    pub fn next_milestone(&self) -> u64 {
        box_count_for_steps(self.today_stats.steps)
            .saturating_add(1)
            .saturating_mul(STEPS_PER_REWARD)
    }

    /// Steps still needed today before the next box unlocks.
    #[must_use]
    pub fn steps_to_next_reward(&self) -> u64 {
        self.next_milestone().saturating_sub(self.today_stats.steps)
    }

    /// Verify the structural invariants of a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StateInvariantError` describing the first violated invariant.
    pub fn check_invariants(&self) -> Result<(), StateInvariantError> {
        let stats = &self.today_stats;
        if NaiveDate::parse_from_str(&stats.date, DATE_FORMAT).is_err() {
            return Err(StateInvariantError::InvalidDate(stats.date.clone()));
        }

        let expected = box_count_for_steps(stats.steps);
        let actual = stats.reward_boxes.len();
        if u64::try_from(actual).ok() != Some(expected) {
            return Err(StateInvariantError::BoxCount {
                steps: stats.steps,
                expected,
                actual,
            });
        }

        for (index, have) in (0..expected).zip(&stats.reward_boxes) {
            let want_id = reward_box_id(index);
            if have.id != want_id || have.step_milestone != milestone_for_index(index) {
                return Err(StateInvariantError::BoxSequence {
                    expected: want_id,
                    actual: have.id.clone(),
                });
            }
            if have.multiplier.is_some() && !have.collected {
                return Err(StateInvariantError::MultiplierWithoutCollection(
                    have.id.clone(),
                ));
            }
        }
        Ok(())
    }
}

/// Structural problems detected in a reward snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateInvariantError {
    #[error("date {0:?} is not an ISO calendar date")]
    InvalidDate(String),
    #[error("{steps} steps unlock {expected} boxes but {actual} are stored")]
    BoxCount {
        steps: u64,
        expected: u64,
        actual: usize,
    },
    #[error("box sequence broken: expected {expected}, found {actual}")]
    BoxSequence { expected: String, actual: String },
    #[error("box {0} carries a multiplier but was never collected")]
    MultiplierWithoutCollection(String),
}
