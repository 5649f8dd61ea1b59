//! Named end-to-end checks run against the reward controller.
use anyhow::{Context, Result, bail, ensure};
use chrono::NaiveDate;
use std::path::PathBuf;
use stepcoin_game::{
    AdSettlement, BlobStore, Clock, FixedClock, Multiplier, MultiplierError, MultiplierFlows,
    RewardConfig, RewardController, RewardEvent, RewardState, generate_reward_boxes,
};

use crate::doubles::{RecordingSink, ScriptedAd, SimStore};
use crate::util::state_dir_for;

/// Inputs shared by every scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioCtx {
    pub config: RewardConfig,
    pub start_date: NaiveDate,
    pub state_dir: Option<PathBuf>,
    pub seed: u64,
}

type Controller = RewardController<SimStore, RecordingSink, FixedClock>;

impl ScenarioCtx {
    async fn store(&self, label: &str) -> Result<SimStore> {
        let dir = self
            .state_dir
            .as_deref()
            .map(|base| state_dir_for(base, label, self.seed));
        SimStore::fresh(dir)
            .await
            .with_context(|| format!("failed to prepare store for {label}"))
    }

    async fn controller(&self, store: SimStore, clock: FixedClock) -> Controller {
        self.controller_with_sink(store, clock, RecordingSink::new())
            .await
    }

    async fn controller_with_sink(
        &self,
        store: SimStore,
        clock: FixedClock,
        sink: RecordingSink,
    ) -> Controller {
        RewardController::start(store, sink, clock, self.config.clone(), self.seed).await
    }

    async fn fresh_controller(&self, label: &str) -> Result<Controller> {
        let store = self.store(label).await?;
        Ok(self
            .controller(store, FixedClock::new(self.start_date))
            .await)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    FirstBox,
    Collect,
    DoubleMultiplier,
    HalfMultiplier,
    DayRollover,
    UnknownBox,
    Reconciliation,
    StepRegression,
    MultiplierBounds,
    IdempotentCollect,
    PersistenceRestart,
    CorruptSnapshot,
    AdOutcomes,
    ConcurrentFlow,
    DeniedPermission,
}

impl Scenario {
    pub const ALL: [Self; 15] = [
        Self::FirstBox,
        Self::Collect,
        Self::DoubleMultiplier,
        Self::HalfMultiplier,
        Self::DayRollover,
        Self::UnknownBox,
        Self::Reconciliation,
        Self::StepRegression,
        Self::MultiplierBounds,
        Self::IdempotentCollect,
        Self::PersistenceRestart,
        Self::CorruptSnapshot,
        Self::AdOutcomes,
        Self::ConcurrentFlow,
        Self::DeniedPermission,
    ];

    /// The six basic reducer walkthroughs.
    pub const SMOKE: [Self; 6] = [
        Self::FirstBox,
        Self::Collect,
        Self::DoubleMultiplier,
        Self::HalfMultiplier,
        Self::DayRollover,
        Self::UnknownBox,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            Self::FirstBox => "first-box",
            Self::Collect => "collect",
            Self::DoubleMultiplier => "double-multiplier",
            Self::HalfMultiplier => "half-multiplier",
            Self::DayRollover => "day-rollover",
            Self::UnknownBox => "unknown-box",
            Self::Reconciliation => "reconciliation",
            Self::StepRegression => "step-regression",
            Self::MultiplierBounds => "multiplier-bounds",
            Self::IdempotentCollect => "idempotent-collect",
            Self::PersistenceRestart => "persistence-restart",
            Self::CorruptSnapshot => "corrupt-snapshot",
            Self::AdOutcomes => "ad-outcomes",
            Self::ConcurrentFlow => "concurrent-flow",
            Self::DeniedPermission => "denied-permission",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::FirstBox => "500 steps on a fresh state unlock reward-0",
            Self::Collect => "Collecting reward-0 pays one coin",
            Self::DoubleMultiplier => "A 2x multiplier pays one bonus coin",
            Self::HalfMultiplier => "A 1.5x multiplier floors to zero bonus",
            Self::DayRollover => "A new day discards yesterday's boxes",
            Self::UnknownBox => "Collecting a missing box changes nothing",
            Self::Reconciliation => "Rising steps keep collected flags",
            Self::StepRegression => "Falling steps drop the excess boxes",
            Self::MultiplierBounds => "Only 1.5, 2 and 3 apply, once per box",
            Self::IdempotentCollect => "Repeated collects pay once",
            Self::PersistenceRestart => "A restart restores the saved state",
            Self::CorruptSnapshot => "A corrupt snapshot falls back to fresh",
            Self::AdOutcomes => "Dismissed and failed ads pay nothing",
            Self::ConcurrentFlow => "A second flow for the same box is refused",
            Self::DeniedPermission => "Refused notification permission stays silent",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scenario| scenario.key() == key)
    }

    pub async fn run(self, ctx: &ScenarioCtx) -> Result<()> {
        match self {
            Self::FirstBox => first_box(ctx).await,
            Self::Collect => collect(ctx).await,
            Self::DoubleMultiplier => multiplied(ctx, 2.0, 2).await,
            Self::HalfMultiplier => multiplied(ctx, 1.5, 1).await,
            Self::DayRollover => day_rollover(ctx).await,
            Self::UnknownBox => unknown_box(ctx).await,
            Self::Reconciliation => reconciliation(ctx).await,
            Self::StepRegression => step_regression(ctx).await,
            Self::MultiplierBounds => multiplier_bounds(ctx).await,
            Self::IdempotentCollect => idempotent_collect(ctx).await,
            Self::PersistenceRestart => persistence_restart(ctx).await,
            Self::CorruptSnapshot => corrupt_snapshot(ctx).await,
            Self::AdOutcomes => ad_outcomes(ctx).await,
            Self::ConcurrentFlow => concurrent_flow(ctx).await,
            Self::DeniedPermission => denied_permission(ctx).await,
        }
    }
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    Scenario::ALL
        .into_iter()
        .map(|scenario| (scenario.key(), scenario.description()))
        .collect()
}

/// Expand scenario tokens, honouring the `all` and `smoke` groups.
pub fn expand_scenarios(tokens: &[String]) -> (Vec<Scenario>, Vec<String>) {
    let mut scenarios = Vec::new();
    let mut unknown = Vec::new();
    for token in tokens {
        let group: &[Scenario] = match token.as_str() {
            "all" => &Scenario::ALL,
            "smoke" => &Scenario::SMOKE,
            key => match Scenario::ALL.iter().find(|s| s.key() == key) {
                Some(scenario) => std::slice::from_ref(scenario),
                None => {
                    unknown.push(token.clone());
                    continue;
                }
            },
        };
        for scenario in group {
            if !scenarios.contains(scenario) {
                scenarios.push(*scenario);
            }
        }
    }
    (scenarios, unknown)
}

async fn first_box(ctx: &ScenarioCtx) -> Result<()> {
    let mut controller = ctx.fresh_controller("first-box").await?;
    let report = controller.update_steps(500).await;
    let boxes = &controller.current_state().today_stats.reward_boxes;
    ensure!(boxes.len() == 1, "expected one box, found {}", boxes.len());
    ensure!(boxes[0].id == "reward-0", "unexpected id {}", boxes[0].id);
    ensure!(boxes[0].step_milestone == 500, "milestone should be 500");
    ensure!(!boxes[0].collected, "new box must start uncollected");
    if ctx.config.notifications_enabled {
        ensure!(
            report.notice.as_ref().map(|n| n.milestone) == Some(500),
            "crossing 500 should notify"
        );
        let posted = controller.sink().notices();
        ensure!(posted.len() == 1, "expected one posted notice");
        ensure!(posted[0].category == "steps", "notice lacks the steps category");
    }
    Ok(())
}

async fn collect(ctx: &ScenarioCtx) -> Result<()> {
    let mut controller = ctx.fresh_controller("collect").await?;
    controller.update_steps(500).await;
    controller.collect_reward("reward-0").await;
    let state = controller.current_state();
    ensure!(state.coins == 1, "expected 1 coin, found {}", state.coins);
    ensure!(
        state.find_box("reward-0").is_some_and(|b| b.collected),
        "reward-0 should be collected"
    );
    Ok(())
}

async fn multiplied(ctx: &ScenarioCtx, factor: f64, expected_coins: u64) -> Result<()> {
    let mut controller = ctx
        .fresh_controller(&format!("multiplied-{expected_coins}"))
        .await?;
    controller.update_steps(500).await;
    controller.collect_reward("reward-0").await;
    controller.apply_multiplier("reward-0", factor).await;
    let state = controller.current_state();
    ensure!(
        state.coins == expected_coins,
        "{factor}x should leave {expected_coins} coins, found {}",
        state.coins
    );
    ensure!(
        state
            .find_box("reward-0")
            .and_then(|b| b.multiplier)
            .map(Multiplier::value)
            == Some(factor),
        "reward-0 should record the {factor}x multiplier"
    );
    Ok(())
}

async fn day_rollover(ctx: &ScenarioCtx) -> Result<()> {
    let store = ctx.store("day-rollover").await?;
    let clock = FixedClock::new(ctx.start_date);
    let mut controller = ctx.controller(store, clock.clone()).await;
    controller.update_steps(1_500).await;
    controller.collect_reward("reward-2").await;

    clock.advance_days(1);
    controller.update_steps(500).await;
    let state = controller.current_state();
    ensure!(
        state.today_stats.date == clock.today(),
        "date should roll to {}, found {}",
        clock.today(),
        state.today_stats.date
    );
    ensure!(
        state.today_stats.reward_boxes == generate_reward_boxes(500),
        "boxes should be rebuilt fresh"
    );
    ensure!(state.today_stats.steps == 500, "steps should be 500");
    ensure!(state.coins == 1, "coins carry across days");
    Ok(())
}

async fn unknown_box(ctx: &ScenarioCtx) -> Result<()> {
    let mut controller = ctx.fresh_controller("unknown-box").await?;
    controller.update_steps(1_000).await;
    let before = controller.current_state().clone();
    let report = controller.collect_reward("reward-7").await;
    ensure!(controller.current_state() == &before, "state changed");
    ensure!(!report.saved, "a no-op must not persist");
    Ok(())
}

async fn reconciliation(ctx: &ScenarioCtx) -> Result<()> {
    let mut controller = ctx.fresh_controller("reconciliation").await?;
    controller.update_steps(1_000).await;
    controller.collect_reward("reward-1").await;
    controller.apply_multiplier("reward-1", 3.0).await;
    controller.update_steps(2_600).await;

    let state = controller.current_state();
    ensure!(state.today_stats.reward_boxes.len() == 5, "expected 5 boxes");
    let kept = state.find_box("reward-1").context("reward-1 missing")?;
    ensure!(kept.collected, "reward-1 lost its collected flag");
    ensure!(
        kept.multiplier == Some(Multiplier::Triple),
        "reward-1 lost its multiplier"
    );
    ensure!(state.uncollected_count() == 4, "new boxes start uncollected");
    Ok(())
}

async fn step_regression(ctx: &ScenarioCtx) -> Result<()> {
    let mut controller = ctx.fresh_controller("step-regression").await?;
    controller.update_steps(2_000).await;
    controller.collect_reward("reward-0").await;
    controller.collect_reward("reward-3").await;
    controller.update_steps(1_100).await;

    let state = controller.current_state();
    ensure!(state.today_stats.reward_boxes.len() == 2, "expected 2 boxes");
    ensure!(state.find_box("reward-3").is_none(), "reward-3 should be gone");
    ensure!(state.coins == 2, "coins must never be taken back");
    state.check_invariants()?;
    Ok(())
}

async fn multiplier_bounds(ctx: &ScenarioCtx) -> Result<()> {
    let mut controller = ctx.fresh_controller("multiplier-bounds").await?;
    controller.update_steps(1_000).await;

    controller.apply_multiplier("reward-0", 2.0).await;
    ensure!(
        controller.current_state().coins == 0,
        "uncollected boxes cannot be multiplied"
    );

    controller.collect_reward("reward-0").await;
    for bogus in [0.0, 1.0, 2.5, 5.0] {
        controller.apply_multiplier("reward-0", bogus).await;
    }
    ensure!(controller.current_state().coins == 1, "bogus factor applied");

    controller.apply_multiplier("reward-0", 3.0).await;
    controller.apply_multiplier("reward-0", 3.0).await;
    controller.apply_multiplier("reward-0", 2.0).await;
    ensure!(
        controller.current_state().coins == 3,
        "a box takes one multiplier, found {} coins",
        controller.current_state().coins
    );
    Ok(())
}

async fn idempotent_collect(ctx: &ScenarioCtx) -> Result<()> {
    let mut controller = ctx.fresh_controller("idempotent-collect").await?;
    controller.update_steps(500).await;
    controller.collect_reward("reward-0").await;
    let after_first = controller.current_state().clone();
    let report = controller.collect_reward("reward-0").await;
    ensure!(controller.current_state() == &after_first, "second collect changed state");
    ensure!(report.effects.milestone.is_none() && !report.saved, "second collect had effects");
    let repeat = controller.update_steps(500).await;
    ensure!(repeat.notice.is_none(), "repeat update must not notify");
    Ok(())
}

async fn persistence_restart(ctx: &ScenarioCtx) -> Result<()> {
    let store = ctx.store("persistence-restart").await?;
    let clock = FixedClock::new(ctx.start_date);
    let saved = {
        let mut controller = ctx.controller(store.clone(), clock.clone()).await;
        controller.update_steps(1_700).await;
        controller.collect_reward("reward-1").await;
        controller.apply_multiplier("reward-1", 2.0).await;
        controller.current_state().clone()
    };

    let restarted = ctx.controller(store, clock).await;
    ensure!(restarted.restored_from_storage(), "snapshot was not restored");
    ensure!(restarted.current_state() == &saved, "restored state differs");
    Ok(())
}

async fn corrupt_snapshot(ctx: &ScenarioCtx) -> Result<()> {
    let store = ctx.store("corrupt-snapshot").await?;
    let key = ctx.config.storage_key.clone();
    let mut bad = RewardState::fresh("2024-01-01");
    bad.today_stats.steps = 1_000;
    let blob = serde_json::to_string(&bad)?;
    store.set(&key, &blob).await?;

    let clock = FixedClock::new(ctx.start_date);
    let controller = ctx.controller(store.clone(), clock.clone()).await;
    ensure!(
        !controller.restored_from_storage(),
        "inconsistent snapshot should be rejected"
    );
    ensure!(
        controller.current_state() == &RewardState::fresh(clock.today()),
        "fallback should be a fresh state"
    );

    store.set(&key, "{ not json").await?;
    let controller = ctx.controller(store, clock).await;
    ensure!(!controller.restored_from_storage(), "garbage should be rejected");
    Ok(())
}

async fn ad_outcomes(ctx: &ScenarioCtx) -> Result<()> {
    let mut controller = ctx.fresh_controller("ad-outcomes").await?;
    let flows = MultiplierFlows::new();
    controller.update_steps(500).await;
    controller.collect_reward("reward-0").await;

    let mut dismissed = ScriptedAd::dismissed();
    let report = controller
        .multiply_reward(&flows, "reward-0", &mut dismissed, |_| {
            Some(Multiplier::Triple)
        })
        .await?;
    ensure!(report.settlement == AdSettlement::Declined, "close should decline");

    let mut unavailable = ScriptedAd::unavailable();
    let report = controller
        .multiply_reward(&flows, "reward-0", &mut unavailable, |_| {
            Some(Multiplier::Triple)
        })
        .await?;
    if !matches!(report.settlement, AdSettlement::Failed(_)) {
        bail!("load failure should settle as failed, got {:?}", report.settlement);
    }
    ensure!(unavailable.shows == 0, "an unloaded ad must not be shown");

    let mut rewarding = ScriptedAd::rewarding();
    let report = controller
        .multiply_reward(&flows, "reward-0", &mut rewarding, |_| None)
        .await?;
    ensure!(report.event.is_none(), "backing out must not apply a multiplier");

    ensure!(controller.current_state().coins == 1, "coins changed");
    ensure!(
        controller.is_multiplier_eligible("reward-0"),
        "box should remain eligible"
    );
    Ok(())
}

async fn concurrent_flow(ctx: &ScenarioCtx) -> Result<()> {
    let mut controller = ctx.fresh_controller("concurrent-flow").await?;
    let flows = MultiplierFlows::new();
    controller.update_steps(500).await;
    controller.collect_reward("reward-0").await;

    let held = flows.begin("reward-0")?;
    let mut ad = ScriptedAd::rewarding();
    match controller
        .multiply_reward(&flows, "reward-0", &mut ad, |_| Some(Multiplier::Double))
        .await
    {
        Err(MultiplierError::AlreadyInFlight(_)) => {}
        other => bail!("expected an in-flight rejection, got {other:?}"),
    }
    drop(held);

    let report = controller
        .multiply_reward(&flows, "reward-0", &mut ad, |_| Some(Multiplier::Double))
        .await?;
    ensure!(
        report.settlement == AdSettlement::Granted(Multiplier::Double),
        "released slot should allow a new flow"
    );
    ensure!(controller.current_state().coins == 2, "expected 2 coins");
    let again = controller
        .dispatch(RewardEvent::apply_multiplier("reward-0", 3.0))
        .await;
    ensure!(!again.saved, "second multiplier must be ignored");
    Ok(())
}

async fn denied_permission(ctx: &ScenarioCtx) -> Result<()> {
    let store = ctx.store("denied-permission").await?;
    let clock = FixedClock::new(ctx.start_date);
    let mut controller = ctx
        .controller_with_sink(store, clock, RecordingSink::denied())
        .await;
    let first = controller.update_steps(500).await;
    let second = controller.update_steps(1_000).await;
    ensure!(
        first.notice.is_none() && second.notice.is_none(),
        "no notice may be posted without permission"
    );
    ensure!(controller.sink().notices().is_empty(), "sink received a notice");
    ensure!(
        first.saved && second.saved,
        "notification refusal must not block persistence"
    );
    ensure!(controller.uncollected_count() == 2, "boxes still unlock");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    fn ctx() -> ScenarioCtx {
        ScenarioCtx {
            config: RewardConfig::default(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            state_dir: None,
            seed: 1337,
        }
    }

    #[test]
    fn every_scenario_passes_in_memory() {
        let ctx = ctx();
        for scenario in Scenario::ALL {
            block_on(scenario.run(&ctx))
                .unwrap_or_else(|err| panic!("{} failed: {err:#}", scenario.key()));
        }
    }

    #[test]
    fn keys_round_trip_and_are_unique() {
        for scenario in Scenario::ALL {
            assert_eq!(Scenario::from_key(scenario.key()), Some(scenario));
        }
        let listed = list_scenarios();
        assert_eq!(listed.len(), Scenario::ALL.len());
    }

    #[test]
    fn expand_handles_groups_and_unknowns() {
        let tokens = vec![
            "smoke".to_string(),
            "collect".to_string(),
            "nope".to_string(),
        ];
        let (scenarios, unknown) = expand_scenarios(&tokens);
        assert_eq!(scenarios, Scenario::SMOKE.to_vec());
        assert_eq!(unknown, vec!["nope".to_string()]);

        let (all, _) = expand_scenarios(&["all".to_string()]);
        assert_eq!(all.len(), Scenario::ALL.len());
    }
}
