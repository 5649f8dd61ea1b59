//! Seeded multi-day runs of the reward controller with simulated players.
use anyhow::{Context, Result};
use chrono::NaiveDate;
use colored::Colorize;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use std::path::PathBuf;
use stepcoin_game::{
    AdSettlement, BackgroundSchedule, Clock, FixedClock, Multiplier, MultiplierFlows, RewardConfig,
    RewardController, STEPS_PER_REWARD,
};

use crate::doubles::{RecordingSink, ScriptedAd, SimStore, SimulatedWalker};
use crate::util::state_dir_for;

/// Waking hours during which the foreground poller runs.
const ACTIVE_DAY_SECS: u64 = 16 * 60 * 60;
/// Hours before the app is opened; only background wake-ups happen here.
const BACKGROUND_DAY_SECS: u64 = 24 * 60 * 60 - ACTIVE_DAY_SECS;
const MAX_POLLS_PER_DAY: u64 = 240;

#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub days: u32,
    pub start_date: NaiveDate,
    pub config: RewardConfig,
    pub state_dir: Option<PathBuf>,
    pub verbose: bool,
}

impl SimulationPlan {
    /// Foreground polls per simulated day at the configured interval.
    pub fn polls_per_day(&self) -> u64 {
        (ACTIVE_DAY_SECS / self.config.step_poll_interval_secs.max(1)).clamp(1, MAX_POLLS_PER_DAY)
    }

    /// Seconds into the day at which the host wakes the background task.
    ///
    /// Wake-ups come at the poll interval (at most `MAX_POLLS_PER_DAY` of
    /// them); the controller decides which of them run a check.
    pub fn background_wake_times(&self) -> Vec<u64> {
        let spacing = self
            .config
            .step_poll_interval_secs
            .max(BACKGROUND_DAY_SECS / MAX_POLLS_PER_DAY)
            .max(1);
        (0..BACKGROUND_DAY_SECS)
            .step_by(usize::try_from(spacing).unwrap_or(usize::MAX))
            .collect()
    }

    /// Background checks that run per day at the configured interval.
    pub fn background_checks_per_day(&self) -> u64 {
        let mut schedule = BackgroundSchedule::new(self.config.background_check_interval_secs);
        let claimed = self
            .background_wake_times()
            .into_iter()
            .filter(|&now| schedule.try_claim(now))
            .count();
        u64::try_from(claimed).unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayRecord {
    pub date: String,
    pub steps: u64,
    pub boxes: usize,
    pub coins: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationSummary {
    pub seed: u64,
    pub store: String,
    pub days: Vec<DayRecord>,
    pub coins: u64,
    pub boxes_earned: u64,
    pub boxes_collected: u64,
    pub multipliers_granted: u64,
    pub ads_declined: u64,
    pub ads_failed: u64,
    pub bonus_coins: u64,
    pub notifications: u64,
    pub background_checks: u64,
    pub restores: u64,
    pub failures: Vec<String>,
}

impl SimulationSummary {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

type Controller = RewardController<SimStore, RecordingSink, FixedClock>;

pub async fn run_simulation(plan: &SimulationPlan, seed: u64) -> Result<SimulationSummary> {
    let dir = plan
        .state_dir
        .as_deref()
        .map(|base| state_dir_for(base, "simulation", seed));
    let store = SimStore::fresh(dir)
        .await
        .context("failed to prepare simulation store")?;
    let clock = FixedClock::new(plan.start_date);
    let sink = RecordingSink::new();

    let mut player_rng = ChaCha20Rng::seed_from_u64(seed);
    let mut walker_rng = ChaCha20Rng::seed_from_u64(seed);
    walker_rng.set_stream(1);
    let mut walker = SimulatedWalker::new(walker_rng);
    let flows = MultiplierFlows::new();
    let polls = plan.polls_per_day();
    let wake_times = plan.background_wake_times();
    let background_checks = plan.background_checks_per_day();

    let mut summary = SimulationSummary {
        seed,
        store: store.label().to_string(),
        ..SimulationSummary::default()
    };
    let mut previous = None;

    for day in 0..plan.days {
        if day > 0 {
            clock.advance_days(1);
        }
        // Each day starts from a relaunch so the saved snapshot is exercised.
        let mut controller: Controller = RewardController::start(
            store.clone(),
            sink.clone(),
            clock.clone(),
            plan.config.clone(),
            seed.wrapping_add(u64::from(day)),
        )
        .await;
        if let Some(expected) = previous.take() {
            if controller.restored_from_storage() {
                summary.restores += 1;
            }
            if controller.current_state() != &expected {
                summary
                    .failures
                    .push(format!("day {day}: relaunch did not restore the saved state"));
            }
        }

        let target = walker.begin_day(background_checks + polls);
        summary.boxes_earned += target / STEPS_PER_REWARD;

        // App closed: steps arrive only through background wake-ups.
        for &now in &wake_times {
            let coins_before = controller.current_state().coins;
            let Some(report) = controller
                .background_check(&mut walker, now)
                .await
                .with_context(|| format!("background check at {now}s on day {day}"))?
            else {
                continue;
            };
            summary.background_checks += 1;
            if report.notice.is_some() {
                summary.notifications += 1;
            }
            check_state(&controller, coins_before, day, &mut summary);
        }

        for poll in 0..polls {
            let coins_before = controller.current_state().coins;
            let report = controller
                .sync_steps(&mut walker)
                .await
                .with_context(|| format!("step poll {poll} on day {day}"))?;
            if report.notice.is_some() {
                summary.notifications += 1;
            }
            collect_everything(&mut controller, &flows, &mut player_rng, &mut summary).await;
            check_state(&controller, coins_before, day, &mut summary);
        }

        let state = controller.current_state();
        let record = DayRecord {
            date: state.today_stats.date.clone(),
            steps: state.today_stats.steps,
            boxes: state.today_stats.reward_boxes.len(),
            coins: state.coins,
        };
        if plan.verbose {
            println!(
                "  {} seed {seed} {} steps:{} boxes:{} coins:{}",
                "📅".cyan(),
                record.date,
                record.steps,
                record.boxes,
                record.coins
            );
        }
        if record.date != clock.today() {
            summary
                .failures
                .push(format!("day {day}: state dated {} on {}", record.date, clock.today()));
        }
        summary.days.push(record);
        summary.coins = state.coins;
        previous = Some(state.clone());
    }

    check_totals(plan, &mut summary);
    Ok(summary)
}

async fn collect_everything(
    controller: &mut Controller,
    flows: &MultiplierFlows,
    rng: &mut ChaCha20Rng,
    summary: &mut SimulationSummary,
) {
    let pending: Vec<String> = controller
        .current_state()
        .today_stats
        .reward_boxes
        .iter()
        .filter(|reward| !reward.collected)
        .map(|reward| reward.id.clone())
        .collect();

    for box_id in pending {
        if !controller.collect_reward(&box_id).await.effects.persist {
            summary.failures.push(format!("{box_id} could not be collected"));
            continue;
        }
        summary.boxes_collected += 1;

        let mut ad = ScriptedAd::roll(rng);
        let pick = rng.gen_range(0..Multiplier::ALL.len());
        let coins_before = controller.current_state().coins;
        let report = match controller
            .multiply_reward(flows, &box_id, &mut ad, |offered| offered.get(pick).copied())
            .await
        {
            Ok(report) => report,
            Err(err) => {
                summary.failures.push(format!("{box_id}: {err}"));
                continue;
            }
        };
        match report.settlement {
            AdSettlement::Granted(_) => summary.multipliers_granted += 1,
            AdSettlement::Declined => summary.ads_declined += 1,
            AdSettlement::Failed(_) => summary.ads_failed += 1,
        }
        summary.bonus_coins += controller
            .current_state()
            .coins
            .saturating_sub(coins_before);
    }
}

fn check_state(
    controller: &Controller,
    coins_before: u64,
    day: u32,
    summary: &mut SimulationSummary,
) {
    let state = controller.current_state();
    if state.coins < coins_before {
        summary.failures.push(format!(
            "day {day}: coins dropped from {coins_before} to {}",
            state.coins
        ));
    }
    if let Err(err) = state.check_invariants() {
        summary.failures.push(format!("day {day}: {err}"));
    }
}

fn check_totals(plan: &SimulationPlan, summary: &mut SimulationSummary) {
    let expected = summary.boxes_collected + summary.bonus_coins;
    if summary.coins != expected {
        summary.failures.push(format!(
            "coins {} != collected {} + bonus {}",
            summary.coins, summary.boxes_collected, summary.bonus_coins
        ));
    }
    if summary.boxes_collected != summary.boxes_earned {
        summary.failures.push(format!(
            "collected {} of {} earned boxes",
            summary.boxes_collected, summary.boxes_earned
        ));
    }
    let settled = summary.multipliers_granted + summary.ads_declined + summary.ads_failed;
    if settled != summary.boxes_collected {
        summary.failures.push(format!(
            "{settled} ad flows settled for {} collected boxes",
            summary.boxes_collected
        ));
    }
    if summary.notifications > summary.boxes_earned {
        summary.failures.push(format!(
            "{} notifications for {} boxes",
            summary.notifications, summary.boxes_earned
        ));
    }
    let days = u64::from(plan.days);
    let expected_checks = days * plan.background_checks_per_day();
    if summary.background_checks != expected_checks {
        summary.failures.push(format!(
            "{} background checks, expected {expected_checks}",
            summary.background_checks
        ));
    }
    if plan.days > 0 && summary.restores + 1 != days {
        summary.failures.push(format!(
            "{} restores over {days} days",
            summary.restores
        ));
    }
}
