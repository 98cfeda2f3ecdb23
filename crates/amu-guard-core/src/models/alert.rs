//! Alert events raised by the risk and compliance pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Predicted or measured residue above the MRL tolerance
    UnsafeMrl,
    /// Dose in the moderate tier
    HighDosage,
    /// Dose in the overdose tier
    Overdosage,
    /// Withdrawal period elapsed, sample ready for collection
    SafeDateReached,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsafeMrl => "unsafe_mrl",
            Self::HighDosage => "high_dosage",
            Self::Overdosage => "overdosage",
            Self::SafeDateReached => "safe_date_reached",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub message: String,
    pub treatment_id: Option<String>,
    pub entity_id: Option<String>,
    pub raised_at: String,
}

impl AlertEvent {
    pub fn new(kind: AlertKind, message: String) -> Self {
        Self {
            kind,
            message,
            treatment_id: None,
            entity_id: None,
            raised_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn for_treatment(mut self, treatment_id: &str, entity_id: &str) -> Self {
        self.treatment_id = Some(treatment_id.to_string());
        self.entity_id = Some(entity_id.to_string());
        self
    }
}
