//! Reward boxes and the milestone-driven box factory.
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::constants::{MAX_BOXES_PER_DAY, REWARD_ID_PREFIX, STEPS_PER_REWARD};

/// Bonus factor a player may apply once to a collected box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Multiplier {
    OneAndHalf,
    Double,
    Triple,
}

impl Multiplier {
    /// Offered choices, in the order they are presented.
    pub const ALL: [Self; 3] = [Self::OneAndHalf, Self::Double, Self::Triple];

    /// Numeric factor of this multiplier.
    #[must_use]
    pub const fn value(self) -> f64 {
        match self {
            Self::OneAndHalf => 1.5,
            Self::Double => 2.0,
            Self::Triple => 3.0,
        }
    }

    /// Map a raw factor onto the closed multiplier set.
    ///
    /// Anything other than exactly 1.5, 2 or 3 yields `None`.
    #[must_use]
    pub fn from_value(value: f64) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|candidate| (candidate.value() - value).abs() < f64::EPSILON)
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneAndHalf => f.write_str("1.5x"),
            Self::Double => f.write_str("2x"),
            Self::Triple => f.write_str("3x"),
        }
    }
}

impl Serialize for Multiplier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(self.value())
    }
}

impl<'de> Deserialize<'de> for Multiplier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = f64::deserialize(deserializer)?;
        Self::from_value(raw)
            .ok_or_else(|| D::Error::custom(format!("unsupported multiplier {raw}")))
    }
}

/// A collectible token unlocked by reaching a step milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardBox {
    pub id: String,
    pub step_milestone: u64,
    pub collected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<Multiplier>,
}

impl RewardBox {
    /// Fresh, uncollected box for the zero-based `index` of the day.
    #[must_use]
    pub fn new(index: u64) -> Self {
        Self {
            id: reward_box_id(index),
            step_milestone: milestone_for_index(index),
            collected: false,
            multiplier: None,
        }
    }

    /// Whether a multiplier may still be applied to this box.
    #[must_use]
    pub const fn accepts_multiplier(&self) -> bool {
        self.collected && self.multiplier.is_none()
    }
}

/// Stable identifier for the box at `index`.
#[must_use]
pub fn reward_box_id(index: u64) -> String {
    format!("{REWARD_ID_PREFIX}{index}")
}

/// Step threshold represented by the box at `index`.
#[must_use]
pub const fn milestone_for_index(index: u64) -> u64 {
    index.saturating_add(1).saturating_mul(STEPS_PER_REWARD)
}

/// Number of boxes unlocked by `steps`, capped at `MAX_BOXES_PER_DAY`.
#[must_use]
pub const fn box_count_for_steps(steps: u64) -> u64 {
    let count = steps / STEPS_PER_REWARD;
    if count > MAX_BOXES_PER_DAY {
        MAX_BOXES_PER_DAY
    } else {
        count
    }
}

/// Every box unlocked by `steps`, in ascending milestone order.
#[must_use]
pub fn generate_reward_boxes(steps: u64) -> Vec<RewardBox> {
    (0..box_count_for_steps(steps)).map(RewardBox::new).collect()
}

/// Merge a freshly generated target list with the boxes already held.
///
/// The result follows `target` exactly; a held box with the same id replaces
/// its fresh counterpart so collection and multiplier state survive.
#[must_use]
pub fn reconcile_reward_boxes(previous: &[RewardBox], target: Vec<RewardBox>) -> Vec<RewardBox> {
    target
        .into_iter()
        .map(|fresh| {
            previous
                .iter()
                .find(|held| held.id == fresh.id)
                .cloned()
                .unwrap_or(fresh)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_floor_of_steps_over_spacing() {
        for steps in [0, 1, 499, 500, 501, 999, 1_000, 12_345] {
            let boxes = generate_reward_boxes(steps);
            assert_eq!(boxes.len() as u64, steps / STEPS_PER_REWARD, "steps {steps}");
            for (index, reward) in boxes.iter().enumerate() {
                let index = index as u64;
                assert_eq!(reward.id, format!("reward-{index}"));
                assert_eq!(reward.step_milestone, 500 * (index + 1));
                assert!(!reward.collected);
                assert!(reward.multiplier.is_none());
            }
        }
    }

    #[test]
    fn box_count_stops_at_daily_cap() {
        let cap_steps = MAX_BOXES_PER_DAY * STEPS_PER_REWARD;
        assert_eq!(box_count_for_steps(cap_steps - 1), MAX_BOXES_PER_DAY - 1);
        assert_eq!(box_count_for_steps(cap_steps), MAX_BOXES_PER_DAY);
        assert_eq!(box_count_for_steps(u64::MAX), MAX_BOXES_PER_DAY);

        let boxes = generate_reward_boxes(u64::MAX);
        assert_eq!(boxes.len() as u64, MAX_BOXES_PER_DAY);
        let last = boxes.last().unwrap();
        assert_eq!(last.id, reward_box_id(MAX_BOXES_PER_DAY - 1));
        assert_eq!(last.step_milestone, cap_steps);
    }

    #[test]
    fn reconcile_keeps_held_boxes_and_drops_excess() {
        let mut held = generate_reward_boxes(1_500);
        held[0].collected = true;
        held[0].multiplier = Some(Multiplier::Double);
        held[2].collected = true;

        let merged = reconcile_reward_boxes(&held, generate_reward_boxes(1_000));
        assert_eq!(merged.len(), 2);
        assert!(merged[0].collected);
        assert_eq!(merged[0].multiplier, Some(Multiplier::Double));
        assert!(!merged[1].collected);

        let grown = reconcile_reward_boxes(&merged, generate_reward_boxes(2_000));
        assert_eq!(grown.len(), 4);
        assert!(grown[0].collected);
        assert!(!grown[3].collected);
    }

    #[test]
    fn multiplier_set_is_closed() {
        assert_eq!(Multiplier::from_value(1.5), Some(Multiplier::OneAndHalf));
        assert_eq!(Multiplier::from_value(2.0), Some(Multiplier::Double));
        assert_eq!(Multiplier::from_value(3.0), Some(Multiplier::Triple));
        for bogus in [0.0, 1.0, 2.5, 4.0, -2.0, f64::NAN, f64::INFINITY] {
            assert_eq!(Multiplier::from_value(bogus), None, "value {bogus}");
        }
        assert_eq!(Multiplier::OneAndHalf.to_string(), "1.5x");
    }

    #[test]
    fn box_serializes_with_camel_case_and_optional_multiplier() {
        let mut reward = RewardBox::new(0);
        let plain = serde_json::to_value(&reward).unwrap();
        assert_eq!(
            plain,
            serde_json::json!({"id": "reward-0", "stepMilestone": 500, "collected": false})
        );

        reward.collected = true;
        reward.multiplier = Some(Multiplier::OneAndHalf);
        let json = serde_json::to_string(&reward).unwrap();
        let restored: RewardBox = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, reward);

        let integer_multiplier: RewardBox = serde_json::from_str(
            r#"{"id":"reward-1","stepMilestone":1000,"collected":true,"multiplier":2}"#,
        )
        .unwrap();
        assert_eq!(integer_multiplier.multiplier, Some(Multiplier::Double));

        let rejected = serde_json::from_str::<RewardBox>(
            r#"{"id":"reward-1","stepMilestone":1000,"collected":true,"multiplier":5}"#,
        );
        assert!(rejected.is_err());
    }
}
