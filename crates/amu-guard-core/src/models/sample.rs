//! Sample-compliance models: requests, collected samples and lab reports.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::RiskCategory;

/// Lifecycle of a sample request. Status only ever moves one step forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    Requested,
    Collected,
    Tested,
    Completed,
}

/// Rejected status change.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid sample status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SampleStatus,
    pub to: SampleStatus,
}

impl SampleStatus {
    pub const ALL: [SampleStatus; 4] = [
        SampleStatus::Requested,
        SampleStatus::Collected,
        SampleStatus::Tested,
        SampleStatus::Completed,
    ];

    /// Position in the lifecycle, starting at 0.
    pub fn index(&self) -> u8 {
        match self {
            Self::Requested => 0,
            Self::Collected => 1,
            Self::Tested => 2,
            Self::Completed => 3,
        }
    }

    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Requested => Some(Self::Collected),
            Self::Collected => Some(Self::Tested),
            Self::Tested => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    pub fn can_transition_to(&self, to: SampleStatus) -> bool {
        self.next() == Some(to)
    }

    /// Validate a single forward step.
    pub fn transition_to(self, to: SampleStatus) -> Result<SampleStatus, InvalidTransition> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Collected => "collected",
            Self::Tested => "tested",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(Self::Requested),
            "collected" => Some(Self::Collected),
            "tested" => Some(Self::Tested),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a laboratory was chosen for a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    Nearest,
    SameDistrict,
    SameState,
    Default,
    Manual,
}

impl AssignmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::SameDistrict => "same_district",
            Self::SameState => "same_state",
            Self::Default => "default",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "nearest" => Some(Self::Nearest),
            "same_district" => Some(Self::SameDistrict),
            "same_state" => Some(Self::SameState),
            "default" => Some(Self::Default),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for AssignmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to collect a residue sample once the withdrawal period ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleRequest {
    pub request_id: String,
    /// Unique: at most one request per treatment
    pub treatment_id: String,
    pub entity_id: String,
    pub farm_id: String,
    pub farmer_id: Option<String>,
    /// `None` until a laboratory is assigned
    pub assigned_lab_id: Option<String>,
    pub assignment_method: Option<AssignmentMethod>,
    /// Haversine distance when assigned by proximity
    pub distance_km: Option<f64>,
    pub safe_date: NaiveDate,
    pub status: SampleStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl SampleRequest {
    pub fn new(
        treatment_id: String,
        entity_id: String,
        farm_id: String,
        safe_date: NaiveDate,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            treatment_id,
            entity_id,
            farm_id,
            farmer_id: None,
            assigned_lab_id: None,
            assignment_method: None,
            distance_km: None,
            safe_date,
            status: SampleStatus::Requested,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Unassigned and still waiting for collection.
    pub fn needs_manual_assignment(&self) -> bool {
        self.assigned_lab_id.is_none() && self.status == SampleStatus::Requested
    }

    /// Whether the withdrawal period has elapsed on `today`.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.status == SampleStatus::Requested && self.safe_date <= today
    }

    /// Whole days past the safe date, negative while still within it.
    pub fn days_past_safe_date(&self, today: NaiveDate) -> i64 {
        (today - self.safe_date).num_days()
    }
}

/// A physical sample collected against a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub sample_id: String,
    /// Unique: one sample per request
    pub request_id: String,
    /// Collected material (e.g., "milk", "meat", "egg", "blood")
    pub sample_type: String,
    pub collected_on: NaiveDate,
    pub collected_by_lab_id: String,
    pub remarks: Option<String>,
    pub created_at: String,
}

impl Sample {
    pub fn new(
        request_id: String,
        sample_type: String,
        collected_on: NaiveDate,
        collected_by_lab_id: String,
    ) -> Self {
        Self {
            sample_id: uuid::Uuid::new_v4().to_string(),
            request_id,
            sample_type,
            collected_on,
            collected_by_lab_id,
            remarks: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Laboratory verdict for a sample. Terminal and authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabTestReport {
    pub report_id: String,
    /// Unique: one report per sample
    pub sample_id: String,
    pub request_id: String,
    pub lab_id: String,
    /// Measured residue (µg/kg)
    pub detected_residue: f64,
    pub mrl_limit: f64,
    pub final_status: RiskCategory,
    pub withdrawal_days_remaining: u32,
    pub tested_on: NaiveDate,
    pub remarks: Option<String>,
    pub certificate_ref: Option<String>,
    pub created_at: String,
}

/// Request counts per status for one laboratory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabStatistics {
    pub lab_id: String,
    pub requested: u32,
    pub collected: u32,
    pub tested: u32,
    pub completed: u32,
}

impl LabStatistics {
    pub fn total(&self) -> u32 {
        self.requested + self.collected + self.tested + self.completed
    }

    pub fn record(&mut self, status: SampleStatus) {
        match status {
            SampleStatus::Requested => self.requested += 1,
            SampleStatus::Collected => self.collected += 1,
            SampleStatus::Tested => self.tested += 1,
            SampleStatus::Completed => self.completed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_steps_only() {
        assert_eq!(
            SampleStatus::Requested.transition_to(SampleStatus::Collected),
            Ok(SampleStatus::Collected)
        );
        assert_eq!(
            SampleStatus::Requested.transition_to(SampleStatus::Tested),
            Err(InvalidTransition {
                from: SampleStatus::Requested,
                to: SampleStatus::Tested
            })
        );
        assert!(SampleStatus::Tested
            .transition_to(SampleStatus::Collected)
            .is_err());
        assert!(SampleStatus::Completed
            .transition_to(SampleStatus::Completed)
            .is_err());
    }

    #[test]
    fn test_every_valid_transition_increments_index() {
        for from in SampleStatus::ALL {
            for to in SampleStatus::ALL {
                if from.can_transition_to(to) {
                    assert_eq!(to.index(), from.index() + 1);
                }
            }
        }
    }

    #[test]
    fn test_error_message() {
        let err = SampleStatus::Collected
            .transition_to(SampleStatus::Requested)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid sample status transition: collected -> requested"
        );
    }

    #[test]
    fn test_due_and_overdue() {
        let safe = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let req = SampleRequest::new("t".into(), "e".into(), "f".into(), safe);
        let before = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let after = NaiveDate::from_ymd_opt(2024, 3, 13).unwrap();
        assert!(!req.is_due(before));
        assert!(req.is_due(safe));
        assert_eq!(req.days_past_safe_date(after), 3);
        assert!(req.needs_manual_assignment());
    }

    #[test]
    fn test_lab_statistics_total() {
        let mut stats = LabStatistics::default();
        stats.record(SampleStatus::Requested);
        stats.record(SampleStatus::Tested);
        stats.record(SampleStatus::Tested);
        assert_eq!(stats.tested, 2);
        assert_eq!(stats.total(), 3);
    }
}
