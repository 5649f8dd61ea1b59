//! Single owner of reward state and the dispatch entry point.
use crate::boxes::{Multiplier, RewardBox};
use crate::clock::Clock;
use crate::config::RewardConfig;
use crate::milestone::{MilestoneNotice, MilestoneNotifier, NotificationSink};
use crate::multiplier::{
    FlowReport, MultiplierError, MultiplierFlows, RewardedAd, run_multiplier_flow,
};
use crate::persistence::{BlobStore, LoadOutcome, PersistenceBridge};
use crate::reducer::{Effects, RewardEvent, reduce};
use crate::state::RewardState;
use crate::steps::{BackgroundSchedule, StepProvider, StepSourceError};

/// What a dispatch did beyond the state change itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatchReport {
    pub effects: Effects,
    /// Notice handed to the sink, if a milestone was announced.
    pub notice: Option<MilestoneNotice>,
    /// Whether the new state reached the store.
    pub saved: bool,
}

/// Owns `RewardState` and runs reducer effects against the collaborators.
#[derive(Debug)]
pub struct RewardController<S, N, C> {
    state: RewardState,
    clock: C,
    persistence: PersistenceBridge<S>,
    notifier: MilestoneNotifier<N>,
    config: RewardConfig,
    background: BackgroundSchedule,
    restored: bool,
}

impl<S, N, C> RewardController<S, N, C>
where
    S: BlobStore,
    N: NotificationSink,
    C: Clock,
{
    /// Load persisted state, then return a controller ready for events.
    ///
    /// Loading finishes before the controller exists, so no step update can
    /// race ahead of the saved snapshot.
    pub async fn start(store: S, sink: N, clock: C, config: RewardConfig, seed: u64) -> Self {
        let today = clock.today();
        let persistence = PersistenceBridge::new(store, config.storage_key.clone());
        let notifier = MilestoneNotifier::new(sink, config.notifications_enabled, seed);
        let background = BackgroundSchedule::new(config.background_check_interval_secs);
        let mut controller = Self {
            state: RewardState::fresh(today.clone()),
            clock,
            persistence,
            notifier,
            config,
            background,
            restored: false,
        };

        match controller.persistence.load(&today).await {
            LoadOutcome::Restored(snapshot) => {
                log::info!(
                    "restored reward state: {} coins, {} boxes on {}",
                    snapshot.coins,
                    snapshot.today_stats.reward_boxes.len(),
                    snapshot.today_stats.date
                );
                controller.restored = true;
                controller
                    .dispatch(RewardEvent::LoadSavedState(snapshot))
                    .await;
            }
            LoadOutcome::Fresh { state, .. } => controller.state = state,
        }
        controller
    }

    /// Apply one event and run the effects it requests.
    pub async fn dispatch(&mut self, event: RewardEvent) -> DispatchReport {
        let today = self.clock.today();
        let transition = reduce(&self.state, &event, &today);
        self.state = transition.state;
        let effects = transition.effects;

        let mut report = DispatchReport {
            effects,
            ..DispatchReport::default()
        };
        if let Some(milestone) = effects.milestone {
            report.notice = self.notifier.announce(milestone).await;
        }
        if effects.persist {
            match self.persistence.save(&self.state).await {
                Ok(()) => report.saved = true,
                Err(err) => {
                    log::error!("failed to persist reward state after {}: {err}", event.kind());
                }
            }
        }
        report
    }

    pub async fn update_steps(&mut self, steps: u64) -> DispatchReport {
        self.dispatch(RewardEvent::update_steps(steps)).await
    }

    pub async fn collect_reward(&mut self, box_id: &str) -> DispatchReport {
        self.dispatch(RewardEvent::collect(box_id)).await
    }

    pub async fn apply_multiplier(&mut self, box_id: &str, multiplier: f64) -> DispatchReport {
        self.dispatch(RewardEvent::apply_multiplier(box_id, multiplier))
            .await
    }

    /// Poll `provider` once and feed the count in as a step update.
    ///
    /// # Errors
    ///
    /// Returns the provider error; state is left untouched in that case.
    pub async fn sync_steps<P>(
        &mut self,
        provider: &mut P,
    ) -> Result<DispatchReport, StepSourceError>
    where
        P: StepProvider + ?Sized,
    {
        match provider.steps_today().await {
            Ok(steps) => Ok(self.update_steps(steps).await),
            Err(err) => {
                log::warn!("{err}");
                Err(err)
            }
        }
    }

    /// Background wake-up: sync steps if `background_check_interval_secs`
    /// have passed since the last background check.
    ///
    /// Returns `Ok(None)` when the check is not due yet. A due check takes its
    /// slot even if the provider then fails.
    ///
    /// # Errors
    ///
    /// Returns the provider error from a due check.
    pub async fn background_check<P>(
        &mut self,
        provider: &mut P,
        now_secs: u64,
    ) -> Result<Option<DispatchReport>, StepSourceError>
    where
        P: StepProvider + ?Sized,
    {
        if !self.background.try_claim(now_secs) {
            log::trace!("background check skipped at {now_secs}s");
            return Ok(None);
        }
        log::debug!("background step check at {now_secs}s");
        self.sync_steps(provider).await.map(Some)
    }

    /// Run a rewarded-ad flow for `box_id` and apply the granted multiplier.
    ///
    /// # Errors
    ///
    /// Returns `MultiplierError` when the box cannot take a multiplier or a
    /// flow for it is already running. Ad failures are reported through the
    /// returned `FlowReport`.
    pub async fn multiply_reward<A, F>(
        &mut self,
        flows: &MultiplierFlows,
        box_id: &str,
        ad: &mut A,
        choose: F,
    ) -> Result<FlowReport, MultiplierError>
    where
        A: RewardedAd + ?Sized,
        F: FnOnce(&[Multiplier]) -> Option<Multiplier> + Send,
    {
        if !self.is_multiplier_eligible(box_id) {
            return Err(MultiplierError::NotEligible(box_id.to_string()));
        }
        let ticket = flows.begin(box_id)?;
        let report = run_multiplier_flow(ticket, ad, choose).await;
        if let Some(event) = report.event.clone() {
            self.dispatch(event).await;
        }
        Ok(report)
    }

    #[must_use]
    pub const fn current_state(&self) -> &RewardState {
        &self.state
    }

    #[must_use]
    pub fn uncollected_count(&self) -> usize {
        self.state.uncollected_count()
    }

    /// Box exists, is collected and has no multiplier yet.
    #[must_use]
    pub fn is_multiplier_eligible(&self, box_id: &str) -> bool {
        self.state
            .find_box(box_id)
            .is_some_and(RewardBox::accepts_multiplier)
    }

    /// Whether startup found a usable snapshot.
    #[must_use]
    pub const fn restored_from_storage(&self) -> bool {
        self.restored
    }

    #[must_use]
    pub const fn background_schedule(&self) -> &BackgroundSchedule {
        &self.background
    }

    #[must_use]
    pub const fn config(&self) -> &RewardConfig {
        &self.config
    }

    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        self.persistence.store()
    }

    #[must_use]
    pub const fn sink(&self) -> &N {
        self.notifier.sink()
    }
}
