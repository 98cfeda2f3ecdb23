//! Feed-based AMU propensity.
//!
//! `daily_fni = Σ inclusion × fni`, `health_risk = 1 - daily_fni`,
//! `amu_risk = health_risk × species sensitivity`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::FeedConfig;
use crate::db::DbError;
use crate::models::{FeedEntry, FeedInclusion, FeedRiskLevel, FeedRiskSummary};
use crate::store::FeedStore;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Unknown feed item '{feed_item}' for {species}")]
    UnknownFeedItem { species: String, feed_item: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type FeedResult<T> = Result<T, FeedError>;

/// Derived scores for one ration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeedScoreCard {
    pub daily_fni: f64,
    pub health_risk: f64,
    pub amu_risk: f64,
    pub risk_level: FeedRiskLevel,
}

pub struct FeedRiskScorer {
    default_sensitivity: f64,
    sensitivity: HashMap<String, f64>,
}

impl FeedRiskScorer {
    pub fn new(default_sensitivity: f64, sensitivity: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            default_sensitivity,
            sensitivity: sensitivity
                .into_iter()
                .map(|(species, s)| (species.trim().to_lowercase(), s))
                .collect(),
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(config.default_sensitivity, config.sensitivity.clone())
    }

    pub fn sensitivity(&self, species: &str) -> f64 {
        self.sensitivity
            .get(&species.trim().to_lowercase())
            .copied()
            .unwrap_or(self.default_sensitivity)
    }

    /// Score `(inclusion_rate, fni)` pairs for a species.
    pub fn score(&self, species: &str, contributions: &[(f64, f64)]) -> FeedScoreCard {
        let daily_fni: f64 = contributions.iter().map(|(rate, fni)| rate * fni).sum();
        let health_risk = 1.0 - daily_fni;
        let amu_risk = health_risk * self.sensitivity(species);
        FeedScoreCard {
            daily_fni,
            health_risk,
            amu_risk,
            risk_level: FeedRiskLevel::from_amu_risk(amu_risk),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedSubmission {
    pub farmer_id: String,
    pub species: String,
    pub feeds: Vec<FeedInclusion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedAssessment {
    pub summary: FeedRiskSummary,
    pub entries: Vec<FeedEntry>,
}

/// Resolves feed scores, scores the ration, and stores it atomically.
pub struct FeedRiskService<'a, S: ?Sized> {
    store: &'a S,
    scorer: &'a FeedRiskScorer,
}

impl<'a, S: FeedStore + ?Sized> FeedRiskService<'a, S> {
    pub fn new(store: &'a S, scorer: &'a FeedRiskScorer) -> Self {
        Self { store, scorer }
    }

    /// Validate and store a submission. Nothing is written when any feed
    /// line is rejected.
    pub fn submit(&self, submission: &FeedSubmission) -> FeedResult<FeedAssessment> {
        let species = submission.species.trim().to_lowercase();
        if submission.farmer_id.trim().is_empty() {
            return Err(FeedError::InvalidInput("farmer id is empty".into()));
        }
        if species.is_empty() {
            return Err(FeedError::InvalidInput("species is empty".into()));
        }
        if submission.feeds.is_empty() {
            return Err(FeedError::InvalidInput("feed list is empty".into()));
        }

        let mut resolved = Vec::with_capacity(submission.feeds.len());
        for feed in &submission.feeds {
            if !feed.inclusion_rate.is_finite() || feed.inclusion_rate < 0.0 {
                return Err(FeedError::InvalidInput(format!(
                    "inclusion rate {} for '{}' must be a non-negative number",
                    feed.inclusion_rate, feed.feed_item
                )));
            }
            let score = self
                .store
                .get_feed_score(&species, &feed.feed_item)?
                .ok_or_else(|| FeedError::UnknownFeedItem {
                    species: species.clone(),
                    feed_item: feed.feed_item.clone(),
                })?;
            resolved.push((feed, score.fni));
        }

        let pairs: Vec<(f64, f64)> = resolved
            .iter()
            .map(|(feed, fni)| (feed.inclusion_rate, *fni))
            .collect();
        let card = self.scorer.score(&species, &pairs);

        let created_at = chrono::Utc::now().to_rfc3339();
        let summary = FeedRiskSummary {
            summary_id: uuid::Uuid::new_v4().to_string(),
            farmer_id: submission.farmer_id.clone(),
            species: species.clone(),
            daily_fni: card.daily_fni,
            health_risk: card.health_risk,
            amu_risk: card.amu_risk,
            risk_level: card.risk_level,
            created_at: created_at.clone(),
        };
        let entries: Vec<FeedEntry> = resolved
            .iter()
            .map(|(feed, fni)| FeedEntry {
                entry_id: uuid::Uuid::new_v4().to_string(),
                summary_id: summary.summary_id.clone(),
                farmer_id: submission.farmer_id.clone(),
                species: species.clone(),
                feed_item: feed.feed_item.trim().to_lowercase(),
                inclusion_rate: feed.inclusion_rate,
                fni_contribution: feed.inclusion_rate * fni,
                created_at: created_at.clone(),
            })
            .collect();

        self.store.save_feed_assessment(&summary, &entries)?;
        info!(
            farmer_id = %summary.farmer_id,
            species = %summary.species,
            amu_risk = summary.amu_risk,
            level = summary.risk_level.as_str(),
            "Stored feed risk assessment"
        );

        Ok(FeedAssessment { summary, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::FeedScore;

    fn scorer() -> FeedRiskScorer {
        FeedRiskScorer::from_config(&FeedConfig::default())
    }

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        for (item, fni) in [("green fodder", 0.8), ("concentrate", 0.6), ("straw", 0.2)] {
            db.upsert_feed_score(&FeedScore {
                species: "cattle".into(),
                feed_item: item.into(),
                fni,
            })
            .unwrap();
        }
        db
    }

    fn feed(item: &str, rate: f64) -> FeedInclusion {
        FeedInclusion {
            feed_item: item.into(),
            inclusion_rate: rate,
        }
    }

    #[test]
    fn test_score_formula_and_sensitivity() {
        let s = scorer();
        assert_eq!(s.sensitivity("Cattle"), 0.45);
        assert_eq!(s.sensitivity("poultry"), 0.65);
        assert_eq!(s.sensitivity("goat"), 0.5);

        let card = s.score("cattle", &[(0.5, 0.8), (0.5, 0.2)]);
        assert!((card.daily_fni - 0.5).abs() < 1e-12);
        assert!((card.health_risk - 0.5).abs() < 1e-12);
        assert!((card.amu_risk - 0.225).abs() < 1e-12);
        assert_eq!(card.risk_level, FeedRiskLevel::Moderate);
    }

    #[test]
    fn test_submit_stores_summary_and_entries() {
        let db = seeded_db();
        let s = scorer();
        let service = FeedRiskService::new(&db, &s);
        let assessment = service
            .submit(&FeedSubmission {
                farmer_id: "farmer-1".into(),
                species: "Cattle".into(),
                feeds: vec![feed("Green Fodder", 0.6), feed("straw", 0.4)],
            })
            .unwrap();

        // 0.6 × 0.8 + 0.4 × 0.2 = 0.56
        assert!((assessment.summary.daily_fni - 0.56).abs() < 1e-12);
        assert_eq!(assessment.entries.len(), 2);
        assert_eq!(assessment.entries[0].feed_item, "green fodder");
        assert_eq!(db.feed_history("farmer-1", 10).unwrap().len(), 2);
        assert_eq!(db.latest_feed_summaries("farmer-1", 5).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_item_rejects_whole_submission() {
        let db = seeded_db();
        let s = scorer();
        let service = FeedRiskService::new(&db, &s);
        let result = service.submit(&FeedSubmission {
            farmer_id: "farmer-1".into(),
            species: "cattle".into(),
            feeds: vec![feed("green fodder", 0.5), feed("mystery pellets", 0.5)],
        });
        assert!(matches!(result, Err(FeedError::UnknownFeedItem { .. })));
        assert!(db.feed_history("farmer-1", 10).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_submissions() {
        let db = seeded_db();
        let s = scorer();
        let service = FeedRiskService::new(&db, &s);
        let empty = FeedSubmission {
            farmer_id: "farmer-1".into(),
            species: "cattle".into(),
            feeds: vec![],
        };
        assert!(matches!(service.submit(&empty), Err(FeedError::InvalidInput(_))));

        let negative = FeedSubmission {
            feeds: vec![feed("straw", -0.1)],
            ..empty.clone()
        };
        assert!(matches!(service.submit(&negative), Err(FeedError::InvalidInput(_))));

        let nan = FeedSubmission {
            feeds: vec![feed("straw", f64::NAN)],
            ..empty
        };
        assert!(matches!(service.submit(&nan), Err(FeedError::InvalidInput(_))));
    }
}
