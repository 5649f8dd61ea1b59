//! Pure reward state machine.
//!
//! `reduce` is the only place reward state changes. It performs no I/O;
//! side effects come back as [`Effects`] for the controller to run.
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::boxes::{Multiplier, RewardBox, generate_reward_boxes, reconcile_reward_boxes};
use crate::constants::BASE_REWARD_COINS;
use crate::milestone::crossed_milestone;
use crate::numbers::floored_bonus;
use crate::state::{DailyStats, RewardState};

/// Events accepted by the reward state machine.
///
/// On the wire an event is `{"type": ..., "payload": ...}`. Any unrecognized
/// `type` decodes to [`RewardEvent::Unknown`] whatever its payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardEvent {
    /// Replace the whole state with a persisted snapshot.
    LoadSavedState(RewardState),
    /// Latest cumulative step count for today.
    UpdateSteps { steps: u64 },
    CollectReward {
        #[serde(rename = "boxId")]
        box_id: String,
    },
    /// Raw factor as reported by the ad flow; validated by the reducer.
    ApplyMultiplier {
        #[serde(rename = "boxId")]
        box_id: String,
        multiplier: f64,
    },
    /// Any event kind this build does not understand.
    Unknown,
}

#[derive(Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Deserialize)]
struct StepsPayload {
    steps: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectPayload {
    box_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultiplierPayload {
    box_id: String,
    multiplier: f64,
}

impl<'de> Deserialize<'de> for RewardEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let EventEnvelope { kind, payload } = EventEnvelope::deserialize(deserializer)?;
        let event = match kind.as_str() {
            "LOAD_SAVED_STATE" => serde_json::from_value(payload).map(Self::LoadSavedState),
            "UPDATE_STEPS" => serde_json::from_value(payload)
                .map(|StepsPayload { steps }| Self::UpdateSteps { steps }),
            "COLLECT_REWARD" => serde_json::from_value(payload)
                .map(|CollectPayload { box_id }| Self::CollectReward { box_id }),
            "APPLY_MULTIPLIER" => serde_json::from_value(payload).map(
                |MultiplierPayload { box_id, multiplier }| Self::ApplyMultiplier {
                    box_id,
                    multiplier,
                },
            ),
            other => {
                log::debug!("unrecognized event type {other}");
                return Ok(Self::Unknown);
            }
        };
        event.map_err(|err| D::Error::custom(format!("{kind} payload: {err}")))
    }
}

impl RewardEvent {
    #[must_use]
    pub fn update_steps(steps: u64) -> Self {
        Self::UpdateSteps { steps }
    }

    #[must_use]
    pub fn collect(box_id: impl Into<String>) -> Self {
        Self::CollectReward {
            box_id: box_id.into(),
        }
    }

    #[must_use]
    pub fn apply_multiplier(box_id: impl Into<String>, multiplier: f64) -> Self {
        Self::ApplyMultiplier {
            box_id: box_id.into(),
            multiplier,
        }
    }

    /// Short label used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LoadSavedState(_) => "LOAD_SAVED_STATE",
            Self::UpdateSteps { .. } => "UPDATE_STEPS",
            Self::CollectReward { .. } => "COLLECT_REWARD",
            Self::ApplyMultiplier { .. } => "APPLY_MULTIPLIER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Side effects requested by a transition (data, not actions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Effects {
    /// Write the new state to the blob store.
    pub persist: bool,
    /// Milestone to announce, if this transition crossed one.
    pub milestone: Option<u64>,
}

impl Effects {
    #[must_use]
    pub const fn none() -> Self {
        Self {
            persist: false,
            milestone: None,
        }
    }

    #[must_use]
    pub const fn persist() -> Self {
        Self {
            persist: true,
            milestone: None,
        }
    }
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: RewardState,
    pub effects: Effects,
}

impl Transition {
    fn unchanged(state: &RewardState) -> Self {
        Self {
            state: state.clone(),
            effects: Effects::none(),
        }
    }

    /// Whether the transition requested no side effects.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.effects == Effects::none()
    }
}

/// Apply `event` to `state` given the current calendar date `today`.
#[must_use]
pub fn reduce(state: &RewardState, event: &RewardEvent, today: &str) -> Transition {
    match event {
        RewardEvent::LoadSavedState(snapshot) => Transition {
            state: snapshot.clone(),
            effects: Effects::none(),
        },
        RewardEvent::UpdateSteps { steps } => update_steps(state, *steps, today),
        RewardEvent::CollectReward { box_id } => collect_reward(state, box_id, today),
        RewardEvent::ApplyMultiplier { box_id, multiplier } => {
            apply_multiplier(state, box_id, *multiplier)
        }
        RewardEvent::Unknown => {
            log::debug!("ignoring unknown reward event");
            Transition::unchanged(state)
        }
    }
}

fn update_steps(state: &RewardState, steps: u64, today: &str) -> Transition {
    let rolled_over = state.today_stats.date != today;
    if rolled_over {
        log::info!(
            "day rollover {} -> {today}; discarding {} boxes",
            state.today_stats.date,
            state.today_stats.reward_boxes.len()
        );
    }
    let held: &[_] = if rolled_over {
        &[]
    } else {
        &state.today_stats.reward_boxes
    };

    let reward_boxes = reconcile_reward_boxes(held, generate_reward_boxes(steps));
    let milestone = crossed_milestone(held.len(), reward_boxes.len());

    Transition {
        state: RewardState {
            coins: state.coins,
            today_stats: DailyStats {
                date: today.to_string(),
                steps,
                reward_boxes,
            },
        },
        effects: Effects {
            persist: true,
            milestone,
        },
    }
}

fn collect_reward(state: &RewardState, box_id: &str, today: &str) -> Transition {
    if state.today_stats.date != today {
        log::debug!(
            "collect {box_id} ignored: boxes belong to {}",
            state.today_stats.date
        );
        return Transition::unchanged(state);
    }
    match state.find_box(box_id) {
        Some(reward) if !reward.collected => {}
        Some(_) => {
            log::debug!("collect {box_id} ignored: already collected");
            return Transition::unchanged(state);
        }
        None => {
            log::debug!("collect {box_id} ignored: unknown box");
            return Transition::unchanged(state);
        }
    }

    let mut next = state.clone();
    if let Some(reward) = next.today_stats.find_box_mut(box_id) {
        reward.collected = true;
    }
    next.coins = next.coins.saturating_add(BASE_REWARD_COINS);
    Transition {
        state: next,
        effects: Effects::persist(),
    }
}

fn apply_multiplier(state: &RewardState, box_id: &str, raw: f64) -> Transition {
    let Some(multiplier) = Multiplier::from_value(raw) else {
        log::debug!("multiplier {raw} for {box_id} ignored: outside the offered set");
        return Transition::unchanged(state);
    };
    if !state
        .find_box(box_id)
        .is_some_and(RewardBox::accepts_multiplier)
    {
        log::debug!("multiplier for {box_id} ignored: box missing, uncollected or multiplied");
        return Transition::unchanged(state);
    }

    let mut next = state.clone();
    if let Some(reward) = next.today_stats.find_box_mut(box_id) {
        reward.multiplier = Some(multiplier);
    }
    let bonus = floored_bonus(BASE_REWARD_COINS, multiplier.value());
    next.coins = next.coins.saturating_add(bonus);
    Transition {
        state: next,
        effects: Effects::persist(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{MAX_BOXES_PER_DAY, STEPS_PER_REWARD};

    const DAY_ONE: &str = "2024-01-01";
    const DAY_TWO: &str = "2024-01-02";

    fn run(state: &RewardState, events: &[RewardEvent], today: &str) -> RewardState {
        events
            .iter()
            .fold(state.clone(), |acc, event| reduce(&acc, event, today).state)
    }

    fn collected_day() -> RewardState {
        run(
            &RewardState::fresh(DAY_ONE),
            &[RewardEvent::update_steps(500), RewardEvent::collect("reward-0")],
            DAY_ONE,
        )
    }

    #[test]
    fn update_steps_builds_boxes_and_requests_notice() {
        let fresh = RewardState::fresh(DAY_ONE);
        let step = reduce(&fresh, &RewardEvent::update_steps(500), DAY_ONE);
        assert_eq!(step.state.today_stats.steps, 500);
        assert_eq!(step.state.today_stats.reward_boxes.len(), 1);
        assert_eq!(step.state.today_stats.reward_boxes[0].id, "reward-0");
        assert_eq!(step.effects.milestone, Some(500));
        assert!(step.effects.persist);

        let repeat = reduce(&step.state, &RewardEvent::update_steps(700), DAY_ONE);
        assert_eq!(repeat.effects.milestone, None);
        assert!(repeat.effects.persist);
    }

    #[test]
    fn jump_across_milestones_reports_only_latest() {
        let fresh = RewardState::fresh(DAY_ONE);
        let step = reduce(&fresh, &RewardEvent::update_steps(2_100), DAY_ONE);
        assert_eq!(step.state.today_stats.reward_boxes.len(), 4);
        assert_eq!(step.effects.milestone, Some(2_000));
    }

    #[test]
    fn huge_step_reading_unlocks_at_most_the_daily_cap() {
        let fresh = RewardState::fresh(DAY_ONE);
        let step = reduce(&fresh, &RewardEvent::update_steps(u64::MAX), DAY_ONE);
        let stats = &step.state.today_stats;
        assert_eq!(stats.steps, u64::MAX);
        assert_eq!(stats.reward_boxes.len() as u64, MAX_BOXES_PER_DAY);
        assert_eq!(step.effects.milestone, Some(MAX_BOXES_PER_DAY * STEPS_PER_REWARD));
        assert_eq!(step.state.check_invariants(), Ok(()));

        let again = reduce(&step.state, &RewardEvent::update_steps(u64::MAX - 1), DAY_ONE);
        assert_eq!(again.effects.milestone, None);
        assert_eq!(again.state.today_stats.reward_boxes.len() as u64, MAX_BOXES_PER_DAY);
    }

    #[test]
    fn regression_drops_uncollected_but_keeps_lower_collected() {
        let mut state = run(
            &RewardState::fresh(DAY_ONE),
            &[RewardEvent::update_steps(1_600), RewardEvent::collect("reward-0")],
            DAY_ONE,
        );
        state = reduce(&state, &RewardEvent::update_steps(900), DAY_ONE).state;
        let boxes = &state.today_stats.reward_boxes;
        assert_eq!(boxes.len(), 1);
        assert!(boxes[0].collected);
        assert_eq!(state.coins, 1);
        assert_eq!(state.today_stats.steps, 900);
    }

    #[test]
    fn rollover_discards_previous_boxes() {
        let state = collected_day();
        let next = reduce(&state, &RewardEvent::update_steps(500), DAY_TWO);
        assert_eq!(next.state.today_stats.date, DAY_TWO);
        assert_eq!(next.state.today_stats.steps, 500);
        assert_eq!(next.state.today_stats.reward_boxes.len(), 1);
        assert!(!next.state.today_stats.reward_boxes[0].collected);
        assert_eq!(next.state.coins, 1);
        assert_eq!(next.effects.milestone, Some(500));
    }

    #[test]
    fn collect_is_idempotent_and_guarded() {
        let once = collected_day();
        let twice = reduce(&once, &RewardEvent::collect("reward-0"), DAY_ONE);
        assert!(twice.is_noop());
        assert_eq!(twice.state, once);

        let unknown = reduce(&once, &RewardEvent::collect("reward-9"), DAY_ONE);
        assert!(unknown.is_noop());
        assert_eq!(unknown.state, once);

        let fresh = RewardState::fresh(DAY_ONE);
        let unlocked = reduce(&fresh, &RewardEvent::update_steps(500), DAY_ONE);
        let stale = reduce(&unlocked.state, &RewardEvent::collect("reward-0"), DAY_TWO);
        assert!(stale.is_noop());
        assert_eq!(stale.state.coins, 0);
    }

    #[test]
    fn multiplier_bonus_floors_and_applies_once() {
        let base = collected_day();
        let doubled = reduce(&base, &RewardEvent::apply_multiplier("reward-0", 2.0), DAY_ONE);
        assert_eq!(doubled.state.coins, 2);
        assert!(doubled.effects.persist);

        let retry = RewardEvent::apply_multiplier("reward-0", 3.0);
        let again = reduce(&doubled.state, &retry, DAY_ONE);
        assert!(again.is_noop());
        assert_eq!(again.state.coins, 2);

        let half = reduce(&base, &RewardEvent::apply_multiplier("reward-0", 1.5), DAY_ONE);
        assert_eq!(half.state.coins, 1);
        assert_eq!(
            half.state.today_stats.reward_boxes[0].multiplier,
            Some(Multiplier::OneAndHalf)
        );

        let triple = reduce(&base, &RewardEvent::apply_multiplier("reward-0", 3.0), DAY_ONE);
        assert_eq!(triple.state.coins, 3);
    }

    #[test]
    fn multiplier_rejects_out_of_set_and_uncollected() {
        let base = collected_day();
        for bogus in [1.0, 2.5, 10.0, -1.0, f64::NAN] {
            let event = RewardEvent::apply_multiplier("reward-0", bogus);
            let step = reduce(&base, &event, DAY_ONE);
            assert!(step.is_noop(), "multiplier {bogus}");
        }

        let uncollected = run(
            &RewardState::fresh(DAY_ONE),
            &[RewardEvent::update_steps(500)],
            DAY_ONE,
        );
        let event = RewardEvent::apply_multiplier("reward-0", 2.0);
        let step = reduce(&uncollected, &event, DAY_ONE);
        assert!(step.is_noop());
    }

    #[test]
    fn load_replaces_without_persisting_and_unknown_is_noop() {
        let snapshot = collected_day();
        let event = RewardEvent::LoadSavedState(snapshot.clone());
        let loaded = reduce(&RewardState::fresh(DAY_TWO), &event, DAY_TWO);
        assert_eq!(loaded.state, snapshot);
        assert!(!loaded.effects.persist);

        let unknown = reduce(&snapshot, &RewardEvent::Unknown, DAY_ONE);
        assert!(unknown.is_noop());
        assert_eq!(unknown.state, snapshot);
    }

    #[test]
    fn events_deserialize_from_tagged_json() {
        let update: RewardEvent =
            serde_json::from_str(r#"{"type":"UPDATE_STEPS","payload":{"steps":1200}}"#).unwrap();
        assert_eq!(update, RewardEvent::update_steps(1_200));

        let apply: RewardEvent = serde_json::from_str(
            r#"{"type":"APPLY_MULTIPLIER","payload":{"boxId":"reward-0","multiplier":1.5}}"#,
        )
        .unwrap();
        assert_eq!(apply, RewardEvent::apply_multiplier("reward-0", 1.5));

        let unknown: RewardEvent = serde_json::from_str(r#"{"type":"RESET_EVERYTHING"}"#).unwrap();
        assert_eq!(unknown, RewardEvent::Unknown);
    }

    #[test]
    fn unrecognized_event_with_payload_is_unknown() {
        for raw in [
            r#"{"type":"RESET_EVERYTHING","payload":{"x":1}}"#,
            r#"{"type":"RESET_EVERYTHING","payload":[1,2,3]}"#,
            r#"{"type":"RESET_EVERYTHING","payload":null}"#,
            r#"{"payload":{"steps":5},"type":"SYNC_FRIENDS"}"#,
        ] {
            let event: RewardEvent = serde_json::from_str(raw).unwrap();
            assert_eq!(event, RewardEvent::Unknown, "{raw}");
        }

        let malformed = r#"{"type":"UPDATE_STEPS","payload":{"steps":"x"}}"#;
        assert!(serde_json::from_str::<RewardEvent>(malformed).is_err());
        let missing = serde_json::from_str::<RewardEvent>(r#"{"type":"COLLECT_REWARD"}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn serialized_events_decode_back() {
        let events = [
            RewardEvent::LoadSavedState(collected_day()),
            RewardEvent::update_steps(42),
            RewardEvent::collect("reward-3"),
            RewardEvent::apply_multiplier("reward-3", 3.0),
        ];
        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let back: RewardEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back, event, "{json}");
        }
    }
}
