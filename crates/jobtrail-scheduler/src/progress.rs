//! Daily progress and motivational tier.

use jobtrail_core::error::{JobtrailError, Result};
use serde::{Deserialize, Serialize};

/// Motivational bucket, ordered worst to best.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum MotivationTier {
    BuildingMomentum,
    GoodProgress,
    NearGoal,
    Exceeded,
}

impl MotivationTier {
    /// Thresholds are checked top-down; the first match wins.
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 100.0 {
            Self::Exceeded
        } else if percentage >= 80.0 {
            Self::NearGoal
        } else if percentage >= 50.0 {
            Self::GoodProgress
        } else {
            Self::BuildingMomentum
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exceeded => "exceeded",
            Self::NearGoal => "near-goal",
            Self::GoodProgress => "good-progress",
            Self::BuildingMomentum => "building-momentum",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Exceeded => {
                "Incredible! You've exceeded your daily goal. Keep this momentum going!"
            }
            Self::NearGoal => "You're so close! Just a few more applications to hit your goal.",
            Self::GoodProgress => "Great progress! You're more than halfway to your daily goal.",
            Self::BuildingMomentum => "Every application counts. Let's build some momentum today!",
        }
    }
}

/// Today's progress against the target, computed fresh per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub percentage: f64,
    pub tier: MotivationTier,
}

/// `target` must be positive; callers treat a zero target as ineligible.
pub fn compute_progress(activity_count: u32, target: u32) -> Result<Progress> {
    if target == 0 {
        return Err(JobtrailError::InvalidInput(
            "daily target must be greater than zero".into(),
        ));
    }
    let percentage = f64::from(activity_count) / f64::from(target) * 100.0;
    Ok(Progress { percentage, tier: MotivationTier::from_percentage(percentage) })
}
