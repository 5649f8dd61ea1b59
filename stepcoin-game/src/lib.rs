//! Stepcoin Reward Engine
//!
//! Platform-agnostic core logic that turns a daily step count into
//! collectible coin boxes. Step counting, storage, notifications and
//! rewarded ads are reached through traits; this crate provides the state
//! machine and the controller that runs its effects.

pub mod boxes;
pub mod clock;
pub mod config;
pub mod constants;
pub mod controller;
pub mod milestone;
pub mod multiplier;
pub mod numbers;
pub mod persistence;
pub mod reducer;
pub mod state;
pub mod steps;

// Re-export commonly used types
pub use boxes::{
    Multiplier, RewardBox, box_count_for_steps, generate_reward_boxes, milestone_for_index,
    reconcile_reward_boxes, reward_box_id,
};
pub use clock::{Clock, FixedClock, SystemClock, format_date};
pub use config::{ConfigError, RewardConfig};
pub use constants::{BASE_REWARD_COINS, DEFAULT_STORAGE_KEY, MAX_BOXES_PER_DAY, STEPS_PER_REWARD};
pub use controller::{DispatchReport, RewardController};
pub use milestone::{
    MilestoneNotice, MilestoneNotifier, NotificationSink, NotifyError, SilentSink,
    crossed_milestone,
};
pub use multiplier::{
    AdError, AdMessage, AdPhase, AdSettlement, AdShowOutcome, FlowReport, FlowTicket,
    MultiplierError, MultiplierFlow, MultiplierFlows, RewardedAd, run_multiplier_flow,
};
pub use persistence::{
    BlobStore, FileBlobStore, LoadFallback, LoadOutcome, MemoryBlobStore, PersistenceBridge,
    StorageError,
};
pub use reducer::{Effects, RewardEvent, Transition, reduce};
pub use state::{DailyStats, RewardState, StateInvariantError};
pub use steps::{BackgroundSchedule, ConstantSteps, StepProvider, StepSourceError};
