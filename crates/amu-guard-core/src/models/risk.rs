//! AMU risk models: dose tiers, residue categories and the immutable risk record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::ProductMatrix;

/// Upper bound (exclusive) of the safe residue band, in percent of MRL.
pub const SAFE_CEILING_PERCENT: f64 = 100.0;
/// Upper bound (inclusive) of the borderline residue band, in percent of MRL.
pub const BORDERLINE_CEILING_PERCENT: f64 = 125.0;

/// Classification of an administered dose against the catalog bands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DoseTier {
    UnderDose,
    Safe,
    Moderate,
    Overdose,
    /// No catalog entry, a unit mismatch or an unusable dose value
    Unknown,
}

impl DoseTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnderDose => "under_dose",
            Self::Safe => "safe",
            Self::Moderate => "moderate",
            Self::Overdose => "overdose",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "under_dose" => Some(Self::UnderDose),
            "safe" => Some(Self::Safe),
            "moderate" => Some(Self::Moderate),
            "overdose" => Some(Self::Overdose),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for DoseTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Residue risk category, shared by predictions and lab verdicts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Safe,
    Borderline,
    Unsafe,
}

impl RiskCategory {
    /// `< 100` safe, `100..=125` borderline, `> 125` unsafe.
    pub fn from_risk_percent(percent: f64) -> Self {
        if percent < SAFE_CEILING_PERCENT {
            Self::Safe
        } else if percent <= BORDERLINE_CEILING_PERCENT {
            Self::Borderline
        } else {
            Self::Unsafe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Borderline => "borderline",
            Self::Unsafe => "unsafe",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "safe" => Some(Self::Safe),
            "borderline" => Some(Self::Borderline),
            "unsafe" => Some(Self::Unsafe),
            _ => None,
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicted residue for one tissue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TissueResidue {
    pub tissue: String,
    /// Predicted residue at the end of the course (µg/kg)
    pub predicted_residue: f64,
    pub base_mrl: f64,
    /// `predicted_residue / base_mrl × 100`
    pub risk_percent: f64,
    pub category: RiskCategory,
}

/// Immutable AMU risk record, owned 1:1 by a treatment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AmuRiskRecord {
    pub record_id: String,
    pub treatment_id: String,
    pub entity_id: String,
    pub farm_id: String,
    pub species: String,
    pub medicine: String,
    pub matrix: ProductMatrix,
    pub dose_tier: DoseTier,
    /// True iff the dose tier is `overdose`
    pub overdosage: bool,
    /// Vaccine or vitamin/mineral course with no modeled residue
    pub withdrawal_exempt: bool,
    /// Per-tissue predictions in catalog order
    pub tissues: Vec<TissueResidue>,
    pub worst_tissue: Option<String>,
    pub risk_percent: Option<f64>,
    pub risk_category: Option<RiskCategory>,
    pub withdrawal_days: Option<u32>,
    pub end_date: NaiveDate,
    pub safe_date: Option<NaiveDate>,
    /// Residue model that produced the projection
    pub model_version: String,
    /// Reference catalog version used for the projection
    pub catalog_version: String,
    pub created_at: String,
    /// SHA-256 over the canonical JSON of every other field
    pub record_hash: String,
}

impl AmuRiskRecord {
    /// Canonical JSON of every field, with the stored hash blanked.
    pub fn to_canonical_json(&self) -> serde_json::Result<String> {
        let mut unsealed = self.clone();
        unsealed.record_hash = String::new();
        serde_json::to_string(&unsealed)
    }

    /// Compute the fingerprint of this record, ignoring the stored hash.
    pub fn compute_hash(&self) -> serde_json::Result<String> {
        let canonical = self.to_canonical_json()?;
        Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    /// Set `record_hash` from the current field values.
    pub fn seal(mut self) -> serde_json::Result<Self> {
        self.record_hash = self.compute_hash()?;
        Ok(self)
    }

    /// Whether the stored hash still matches the record contents.
    pub fn verify_hash(&self) -> bool {
        match self.compute_hash() {
            Ok(hash) => !self.record_hash.is_empty() && self.record_hash == hash,
            Err(_) => false,
        }
    }

    pub fn worst(&self) -> Option<&TissueResidue> {
        let name = self.worst_tissue.as_deref()?;
        self.tissues.iter().find(|t| t.tissue == name)
    }
}
