//! Feed composition and feed-risk models.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference nutrition index of one feed item for one species.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedScore {
    pub species: String,
    pub feed_item: String,
    /// Feed Nutrition Index contribution per unit of inclusion
    pub fni: f64,
}

/// One item of a submitted daily ration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedInclusion {
    pub feed_item: String,
    /// Share of the daily ration (0.0 - 1.0)
    pub inclusion_rate: f64,
}

/// AMU-propensity bucket derived from feed composition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FeedRiskLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl FeedRiskLevel {
    pub const ALL: [FeedRiskLevel; 4] = [
        FeedRiskLevel::Low,
        FeedRiskLevel::Moderate,
        FeedRiskLevel::High,
        FeedRiskLevel::VeryHigh,
    ];

    /// `< 0.20` low, `< 0.40` moderate, `< 0.60` high, otherwise very high.
    pub fn from_amu_risk(amu_risk: f64) -> Self {
        if amu_risk < 0.2 {
            Self::Low
        } else if amu_risk < 0.4 {
            Self::Moderate
        } else if amu_risk < 0.6 {
            Self::High
        } else {
            Self::VeryHigh
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "moderate" => Some(Self::Moderate),
            "high" => Some(Self::High),
            "very_high" => Some(Self::VeryHigh),
            _ => None,
        }
    }
}

impl fmt::Display for FeedRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted feed line of a submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedEntry {
    pub entry_id: String,
    pub summary_id: String,
    pub farmer_id: String,
    pub species: String,
    pub feed_item: String,
    pub inclusion_rate: f64,
    /// `inclusion_rate × fni`
    pub fni_contribution: f64,
    pub created_at: String,
}

/// Derived daily FNI / AMU-risk snapshot for a farmer and species.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedRiskSummary {
    pub summary_id: String,
    pub farmer_id: String,
    pub species: String,
    pub daily_fni: f64,
    pub health_risk: f64,
    pub amu_risk: f64,
    pub risk_level: FeedRiskLevel,
    pub created_at: String,
}

/// Farmer ranked by latest AMU risk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FarmerFeedRisk {
    pub farmer_id: String,
    pub species: String,
    pub amu_risk: f64,
    pub risk_level: FeedRiskLevel,
}

/// Aggregate view over stored feed risk summaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedRiskStatistics {
    pub total_assessments: u32,
    /// Count per risk level, in level order
    pub level_counts: Vec<(FeedRiskLevel, u32)>,
    pub mean_daily_fni: Option<f64>,
    pub mean_amu_risk: Option<f64>,
    pub highest_risk_farmers: Vec<FarmerFeedRisk>,
}
