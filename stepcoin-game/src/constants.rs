//! Centralized reward tuning constants for the Stepcoin engine.
//!
//! Milestone spacing and coin credit define the economy of the app and are
//! not configurable at runtime.

// Reward economy -----------------------------------------------------------
/// Step distance between two consecutive reward-box milestones.
pub const STEPS_PER_REWARD: u64 = 500;
/// Coins credited when a box is collected, before any multiplier.
pub const BASE_REWARD_COINS: u64 = 1;
/// Prefix of every reward-box identifier (`reward-<index>`).
pub const REWARD_ID_PREFIX: &str = "reward-";
/// Upper bound on boxes unlocked in one day (500,000 steps).
///
/// Step readings past `MAX_BOXES_PER_DAY * STEPS_PER_REWARD` are still stored
/// but unlock nothing further.
pub const MAX_BOXES_PER_DAY: u64 = 1_000;

// Persistence --------------------------------------------------------------
/// Blob-store key under which the full reward state is written.
pub const DEFAULT_STORAGE_KEY: &str = "reward_state";
/// Calendar-date layout used for `todayStats.date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// Step polling -------------------------------------------------------------
pub(crate) const DEFAULT_STEP_POLL_INTERVAL_SECS: u64 = 30;
pub(crate) const MIN_STEP_POLL_INTERVAL_SECS: u64 = 5;
pub(crate) const MAX_STEP_POLL_INTERVAL_SECS: u64 = 3_600;
pub(crate) const DEFAULT_BACKGROUND_CHECK_INTERVAL_SECS: u64 = 15 * 60;
pub(crate) const MIN_BACKGROUND_CHECK_INTERVAL_SECS: u64 = 60;
pub(crate) const MAX_BACKGROUND_CHECK_INTERVAL_SECS: u64 = 86_400;

// Notifications ------------------------------------------------------------
pub(crate) const MILESTONE_NOTICE_TITLE: &str = "Step Milestone Reached! 🎉";
pub(crate) const MILESTONE_NOTICE_CATEGORY: &str = "steps";
pub(crate) const MILESTONE_MESSAGE_VARIANTS: usize = 4;
