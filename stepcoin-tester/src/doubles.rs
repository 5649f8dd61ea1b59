//! Simulated collaborators for the reward controller.
use async_trait::async_trait;
use rand::Rng;
use rand_chacha::ChaCha20Rng;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use stepcoin_game::{
    AdError, AdShowOutcome, BlobStore, FileBlobStore, MemoryBlobStore, MilestoneNotice,
    NotificationSink, NotifyError, RewardedAd, StepProvider, StepSourceError, StorageError,
};

/// Store selected on the command line: in-memory unless `--state-dir` is set.
#[derive(Debug, Clone)]
pub enum SimStore {
    Memory(MemoryBlobStore),
    File(FileBlobStore),
}

impl SimStore {
    /// Fresh store; a file-backed one starts from an emptied directory.
    pub async fn fresh(dir: Option<PathBuf>) -> std::io::Result<Self> {
        let Some(dir) = dir else {
            return Ok(Self::Memory(MemoryBlobStore::new()));
        };
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        Ok(Self::File(FileBlobStore::new(dir)))
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::File(_) => "file",
        }
    }
}

#[async_trait]
impl BlobStore for SimStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self {
            Self::Memory(store) => store.get(key).await,
            Self::File(store) => store.get(key).await,
        }
    }

    async fn set(&self, key: &str, blob: &str) -> Result<(), StorageError> {
        match self {
            Self::Memory(store) => store.set(key, blob).await,
            Self::File(store) => store.set(key, blob).await,
        }
    }
}

/// Sink that keeps every posted notice.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    notices: Arc<Mutex<Vec<MilestoneNotice>>>,
    denied: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose permission prompt is always refused.
    pub fn denied() -> Self {
        Self {
            denied: true,
            ..Self::default()
        }
    }

    pub fn notices(&self) -> Vec<MilestoneNotice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn ensure_permission(&self) -> Result<bool, NotifyError> {
        Ok(!self.denied)
    }

    async fn notify(&self, notice: &MilestoneNotice) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice.clone());
        Ok(())
    }
}

/// Rewarded ad with a fixed script of load and show results.
#[derive(Debug, Clone)]
pub struct ScriptedAd {
    load: Result<(), AdError>,
    show: Result<AdShowOutcome, AdError>,
    pub shows: u32,
}

impl ScriptedAd {
    pub const fn new(load: Result<(), AdError>, show: Result<AdShowOutcome, AdError>) -> Self {
        Self {
            load,
            show,
            shows: 0,
        }
    }

    /// Ad that loads and is watched to the end.
    pub const fn rewarding() -> Self {
        Self::new(Ok(()), Ok(AdShowOutcome::EarnedReward))
    }

    /// Ad the player dismisses before the reward.
    pub const fn dismissed() -> Self {
        Self::new(Ok(()), Ok(AdShowOutcome::Closed))
    }

    pub fn unavailable() -> Self {
        Self::new(
            Err(AdError::Load("no fill".to_string())),
            Ok(AdShowOutcome::EarnedReward),
        )
    }

    /// Draw an ad outcome: mostly rewarded, sometimes closed or unfilled.
    pub fn roll(rng: &mut ChaCha20Rng) -> Self {
        match rng.gen_range(0..10) {
            0 => Self::unavailable(),
            1 | 2 => Self::dismissed(),
            _ => Self::rewarding(),
        }
    }
}

#[async_trait]
impl RewardedAd for ScriptedAd {
    async fn load(&mut self) -> Result<(), AdError> {
        self.load.clone()
    }

    async fn show(&mut self) -> Result<AdShowOutcome, AdError> {
        self.shows += 1;
        self.show.clone()
    }
}

/// Pedometer that walks toward a daily target in monotone increments.
#[derive(Debug, Clone)]
pub struct SimulatedWalker {
    rng: ChaCha20Rng,
    target: u64,
    steps: u64,
    polls_left: u64,
}

impl SimulatedWalker {
    pub const fn new(rng: ChaCha20Rng) -> Self {
        Self {
            rng,
            target: 0,
            steps: 0,
            polls_left: 0,
        }
    }

    /// Reset for a new day spread over `polls` readings and return the target.
    pub fn begin_day(&mut self, polls: u64) -> u64 {
        self.target = self.rng.gen_range(1_200..=14_000);
        self.steps = 0;
        self.polls_left = polls.max(1);
        self.target
    }
}

#[async_trait]
impl StepProvider for SimulatedWalker {
    async fn steps_today(&mut self) -> Result<u64, StepSourceError> {
        if self.polls_left <= 1 {
            self.polls_left = 0;
            self.steps = self.target;
            return Ok(self.steps);
        }
        let remaining = self.target.saturating_sub(self.steps);
        let mean = remaining / self.polls_left;
        let stride = self.rng.gen_range(0..=mean.saturating_mul(2));
        self.steps = self.steps.saturating_add(stride).min(self.target);
        self.polls_left -= 1;
        Ok(self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use tokio_test::block_on;

    #[test]
    fn walker_is_monotone_and_hits_target() {
        let mut walker = SimulatedWalker::new(ChaCha20Rng::seed_from_u64(9));
        let target = walker.begin_day(12);
        let mut last = 0;
        for _ in 0..12 {
            let steps = block_on(walker.steps_today()).unwrap();
            assert!(steps >= last);
            last = steps;
        }
        assert_eq!(last, target);
    }

    #[test]
    fn walker_is_reproducible_by_seed() {
        let mut a = SimulatedWalker::new(ChaCha20Rng::seed_from_u64(4));
        let mut b = SimulatedWalker::new(ChaCha20Rng::seed_from_u64(4));
        assert_eq!(a.begin_day(5), b.begin_day(5));
        for _ in 0..5 {
            assert_eq!(
                block_on(a.steps_today()).unwrap(),
                block_on(b.steps_today()).unwrap()
            );
        }
    }

    #[test]
    fn recording_sink_honours_denied_permission() {
        let sink = RecordingSink::denied();
        assert!(!block_on(sink.ensure_permission()).unwrap());
        block_on(sink.notify(&MilestoneNotice::new(500, 0))).unwrap();
        assert_eq!(sink.notices().len(), 1);
    }

    #[test]
    fn sim_store_round_trips_through_memory() {
        let store = block_on(SimStore::fresh(None)).unwrap();
        assert_eq!(store.label(), "memory");
        block_on(store.set("k", "v")).unwrap();
        assert_eq!(block_on(store.get("k")).unwrap().as_deref(), Some("v"));
    }
}
