//! Rewarded-ad multiplier flow.
//!
//! The flow is a message-driven state machine:
//! `Idle -> Loading -> Ready -> Showing -> Settled`. Only a reward earned while
//! showing produces an `APPLY_MULTIPLIER` event; every other ending settles
//! without touching reward state.
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::boxes::Multiplier;
use crate::reducer::RewardEvent;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdError {
    #[error("reward video failed to load: {0}")]
    Load(String),
    #[error("reward video failed to play: {0}")]
    Show(String),
}

/// How a shown ad ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdShowOutcome {
    EarnedReward,
    Closed,
}

/// External rewarded-video operation.
#[async_trait]
pub trait RewardedAd: Send {
    /// Fetch an ad so it can be shown.
    ///
    /// # Errors
    ///
    /// Returns `AdError::Load` when no ad could be loaded.
    async fn load(&mut self) -> Result<(), AdError>;

    /// Play the loaded ad to completion or dismissal.
    ///
    /// # Errors
    ///
    /// Returns `AdError::Show` when playback fails.
    async fn show(&mut self) -> Result<AdShowOutcome, AdError>;
}

/// Terminal result of a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdSettlement {
    Granted(Multiplier),
    Declined,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdPhase {
    Idle,
    Loading,
    Ready,
    Showing { multiplier: Multiplier },
    Settled(AdSettlement),
}

/// Inputs that drive the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdMessage {
    Open,
    Loaded,
    LoadFailed(String),
    Choose(Multiplier),
    EarnedReward,
    ShowFailed(String),
    Closed,
    Cancel,
}

/// Multiplier flow for a single box.
#[derive(Debug, Clone)]
pub struct MultiplierFlow {
    box_id: String,
    phase: AdPhase,
}

impl MultiplierFlow {
    #[must_use]
    pub fn new(box_id: impl Into<String>) -> Self {
        Self {
            box_id: box_id.into(),
            phase: AdPhase::Idle,
        }
    }

    #[must_use]
    pub fn box_id(&self) -> &str {
        &self.box_id
    }

    #[must_use]
    pub const fn phase(&self) -> &AdPhase {
        &self.phase
    }

    /// Multipliers the player may pick from once the ad is ready.
    #[must_use]
    pub fn offered(&self) -> &'static [Multiplier] {
        if matches!(self.phase, AdPhase::Ready) {
            &Multiplier::ALL
        } else {
            &[]
        }
    }

    #[must_use]
    pub const fn settlement(&self) -> Option<&AdSettlement> {
        match &self.phase {
            AdPhase::Settled(settlement) => Some(settlement),
            _ => None,
        }
    }

    /// Advance the flow. Returns the reducer event to dispatch, if any.
    pub fn handle(&mut self, message: AdMessage) -> Option<RewardEvent> {
        if matches!(self.phase, AdPhase::Settled(_)) {
            return None;
        }
        let (next, event) = match (&self.phase, message) {
            (_, AdMessage::Cancel)
            | (AdPhase::Ready | AdPhase::Showing { .. }, AdMessage::Closed) => {
                (AdPhase::Settled(AdSettlement::Declined), None)
            }
            (AdPhase::Idle, AdMessage::Open) => (AdPhase::Loading, None),
            (AdPhase::Loading, AdMessage::Loaded) => (AdPhase::Ready, None),
            (AdPhase::Loading, AdMessage::LoadFailed(reason))
            | (AdPhase::Showing { .. }, AdMessage::ShowFailed(reason)) => {
                (AdPhase::Settled(AdSettlement::Failed(reason)), None)
            }
            (AdPhase::Ready, AdMessage::Choose(multiplier)) => {
                (AdPhase::Showing { multiplier }, None)
            }
            (AdPhase::Showing { multiplier }, AdMessage::EarnedReward) => (
                AdPhase::Settled(AdSettlement::Granted(*multiplier)),
                Some(RewardEvent::apply_multiplier(
                    self.box_id.clone(),
                    multiplier.value(),
                )),
            ),
            (phase, message) => {
                log::debug!(
                    "multiplier flow for {} ignored {message:?} while {phase:?}",
                    self.box_id
                );
                return None;
            }
        };
        self.phase = next;
        event
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MultiplierError {
    #[error("box {0} cannot take a multiplier")]
    NotEligible(String),
    #[error("a multiplier flow for box {0} is already running")]
    AlreadyInFlight(String),
}

/// Tracks which boxes have a multiplier flow in flight.
#[derive(Debug, Clone, Default)]
pub struct MultiplierFlows {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl MultiplierFlows {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the flow slot for `box_id`.
    ///
    /// # Errors
    ///
    /// Returns `MultiplierError::AlreadyInFlight` when a flow for the same box
    /// has not finished yet.
    pub fn begin(&self, box_id: &str) -> Result<FlowTicket, MultiplierError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(box_id.to_string()) {
            return Err(MultiplierError::AlreadyInFlight(box_id.to_string()));
        }
        Ok(FlowTicket {
            flow: MultiplierFlow::new(box_id),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    #[must_use]
    pub fn is_in_flight(&self, box_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(box_id)
    }
}

/// Exclusive handle on a running flow; releases its slot when dropped.
#[derive(Debug)]
pub struct FlowTicket {
    flow: MultiplierFlow,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl FlowTicket {
    #[must_use]
    pub const fn flow(&self) -> &MultiplierFlow {
        &self.flow
    }

    pub fn handle(&mut self, message: AdMessage) -> Option<RewardEvent> {
        self.flow.handle(message)
    }
}

impl Drop for FlowTicket {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.flow.box_id());
    }
}

/// What a completed flow produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowReport {
    pub settlement: AdSettlement,
    pub event: Option<RewardEvent>,
}

/// Drive `ticket` through load, choice and playback.
///
/// `choose` sees the offered multipliers once the ad is loaded and returns
/// `None` when the player backs out.
pub async fn run_multiplier_flow<A, F>(mut ticket: FlowTicket, ad: &mut A, choose: F) -> FlowReport
where
    A: RewardedAd + ?Sized,
    F: FnOnce(&[Multiplier]) -> Option<Multiplier> + Send,
{
    ticket.handle(AdMessage::Open);
    let loaded = match ad.load().await {
        Ok(()) => AdMessage::Loaded,
        Err(err) => {
            log::warn!("{err}");
            AdMessage::LoadFailed(err.to_string())
        }
    };
    ticket.handle(loaded);

    if matches!(ticket.flow().phase(), AdPhase::Ready) {
        let choice = choose(ticket.flow().offered());
        ticket.handle(choice.map_or(AdMessage::Closed, AdMessage::Choose));
    }

    let mut event = None;
    if matches!(ticket.flow().phase(), AdPhase::Showing { .. }) {
        let shown = match ad.show().await {
            Ok(AdShowOutcome::EarnedReward) => AdMessage::EarnedReward,
            Ok(AdShowOutcome::Closed) => AdMessage::Closed,
            Err(err) => {
                log::warn!("{err}");
                AdMessage::ShowFailed(err.to_string())
            }
        };
        event = ticket.handle(shown);
    }

    let settlement = ticket
        .flow()
        .settlement()
        .cloned()
        .unwrap_or(AdSettlement::Declined);
    FlowReport { settlement, event }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedAd {
        load: Result<(), AdError>,
        show: Result<AdShowOutcome, AdError>,
        shows: u32,
    }

    impl ScriptedAd {
        fn new(load: Result<(), AdError>, show: Result<AdShowOutcome, AdError>) -> Self {
            Self {
                load,
                show,
                shows: 0,
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

    #[test]
    fn happy_path_emits_apply_event_once() {
        let mut flow = MultiplierFlow::new("reward-0");
        assert!(flow.offered().is_empty());
        assert_eq!(flow.handle(AdMessage::Open), None);
        assert_eq!(flow.handle(AdMessage::Loaded), None);
        assert_eq!(flow.offered(), &Multiplier::ALL);
        assert_eq!(flow.handle(AdMessage::Choose(Multiplier::Triple)), None);
        assert_eq!(
            flow.handle(AdMessage::EarnedReward),
            Some(RewardEvent::apply_multiplier("reward-0", 3.0))
        );
        assert_eq!(flow.handle(AdMessage::Closed), None);
        assert_eq!(flow.handle(AdMessage::EarnedReward), None);
        assert_eq!(
            flow.settlement(),
            Some(&AdSettlement::Granted(Multiplier::Triple))
        );
    }

    #[test]
    fn failures_and_cancellation_settle_without_events() {
        let mut load_fail = MultiplierFlow::new("reward-1");
        load_fail.handle(AdMessage::Open);
        assert_eq!(load_fail.handle(AdMessage::LoadFailed("no fill".into())), None);
        assert_eq!(
            load_fail.settlement(),
            Some(&AdSettlement::Failed("no fill".to_string()))
        );

        let mut closed = MultiplierFlow::new("reward-1");
        closed.handle(AdMessage::Open);
        closed.handle(AdMessage::Loaded);
        closed.handle(AdMessage::Choose(Multiplier::Double));
        assert_eq!(closed.handle(AdMessage::Closed), None);
        assert_eq!(closed.settlement(), Some(&AdSettlement::Declined));

        let mut cancelled = MultiplierFlow::new("reward-1");
        cancelled.handle(AdMessage::Open);
        assert_eq!(cancelled.handle(AdMessage::Cancel), None);
        assert_eq!(cancelled.handle(AdMessage::Loaded), None);
        assert_eq!(cancelled.settlement(), Some(&AdSettlement::Declined));
    }

    #[test]
    fn out_of_order_messages_are_ignored() {
        let mut flow = MultiplierFlow::new("reward-2");
        assert_eq!(flow.handle(AdMessage::EarnedReward), None);
        assert_eq!(flow.phase(), &AdPhase::Idle);
        flow.handle(AdMessage::Open);
        flow.handle(AdMessage::Choose(Multiplier::Double));
        assert_eq!(flow.phase(), &AdPhase::Loading);
    }

    #[test]
    fn second_flow_for_same_box_is_rejected_until_ticket_drops() {
        let flows = MultiplierFlows::new();
        let ticket = flows.begin("reward-0").unwrap();
        assert!(flows.is_in_flight("reward-0"));
        assert_eq!(
            flows.begin("reward-0").unwrap_err(),
            MultiplierError::AlreadyInFlight("reward-0".to_string())
        );
        let other = flows.begin("reward-1");
        assert!(other.is_ok());

        drop(ticket);
        assert!(!flows.is_in_flight("reward-0"));
        assert!(flows.begin("reward-0").is_ok());
    }

    #[tokio::test]
    async fn runner_covers_grant_decline_and_errors() {
        let flows = MultiplierFlows::new();

        let mut granted = ScriptedAd::new(Ok(()), Ok(AdShowOutcome::EarnedReward));
        let report = run_multiplier_flow(flows.begin("reward-0").unwrap(), &mut granted, |offered| {
            offered.get(1).copied()
        })
        .await;
        assert_eq!(report.settlement, AdSettlement::Granted(Multiplier::Double));
        assert_eq!(report.event, Some(RewardEvent::apply_multiplier("reward-0", 2.0)));
        assert!(!flows.is_in_flight("reward-0"));

        let mut unused = ScriptedAd::new(Ok(()), Ok(AdShowOutcome::EarnedReward));
        let report =
            run_multiplier_flow(flows.begin("reward-0").unwrap(), &mut unused, |_| None).await;
        assert_eq!(report.settlement, AdSettlement::Declined);
        assert_eq!(report.event, None);
        assert_eq!(unused.shows, 0);

        let mut no_fill = ScriptedAd::new(
            Err(AdError::Load("no fill".into())),
            Ok(AdShowOutcome::EarnedReward),
        );
        let report = run_multiplier_flow(flows.begin("reward-0").unwrap(), &mut no_fill, |_| {
            Some(Multiplier::Triple)
        })
        .await;
        assert!(matches!(report.settlement, AdSettlement::Failed(_)));
        assert_eq!(report.event, None);

        let mut broken = ScriptedAd::new(Ok(()), Err(AdError::Show("crash".into())));
        let report = run_multiplier_flow(flows.begin("reward-0").unwrap(), &mut broken, |_| {
            Some(Multiplier::Triple)
        })
        .await;
        assert!(matches!(report.settlement, AdSettlement::Failed(_)));
        assert_eq!(report.event, None);
    }
}
