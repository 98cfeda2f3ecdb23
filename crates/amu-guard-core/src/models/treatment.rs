//! Treatment models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::MedicineCategory;

/// Longest administration course accepted, in days.
pub const MAX_COURSE_DAYS: u32 = 365;
/// Most administrations accepted per day.
pub const MAX_DAILY_FREQUENCY: u32 = 24;

/// Treatment values no projection can be made from.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid treatment {field}: {reason}")]
pub struct InvalidTreatment {
    pub field: &'static str,
    pub reason: String,
}

impl InvalidTreatment {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// A medicine administration course recorded for an animal or batch.
///
/// Treatments are locked once an AMU risk record references them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Treatment {
    pub treatment_id: String,
    pub entity_id: String,
    pub farm_id: String,
    pub species: String,
    /// Medicine name as recorded (matched case-insensitively against the catalog)
    pub medicine: String,
    pub category: MedicineCategory,
    /// Dose per administration
    pub dose_amount: f64,
    /// Unit of `dose_amount` (e.g., "mg/kg")
    pub dose_unit: String,
    /// Route of administration (e.g., "IM", "oral", "water")
    pub route: Option<String>,
    pub frequency_per_day: u32,
    pub duration_days: u32,
    pub start_date: NaiveDate,
    pub is_vaccine: bool,
    /// Body weight recorded at treatment time
    pub body_weight_kg: Option<f64>,
    pub created_at: String,
}

impl Treatment {
    /// Create a one-day, once-daily treatment. Adjust the course fields directly.
    pub fn new(
        entity_id: String,
        farm_id: String,
        species: String,
        medicine: String,
        dose_amount: f64,
        dose_unit: String,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            treatment_id: uuid::Uuid::new_v4().to_string(),
            entity_id,
            farm_id,
            species,
            medicine,
            category: MedicineCategory::Other,
            dose_amount,
            dose_unit,
            route: None,
            frequency_per_day: 1,
            duration_days: 1,
            start_date,
            is_vaccine: false,
            body_weight_kg: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Date of the last administration day boundary: `start_date + duration_days`.
    ///
    /// `None` when the date falls outside the calendar range.
    pub fn end_date(&self) -> Option<NaiveDate> {
        self.start_date
            .checked_add_signed(chrono::Duration::days(i64::from(self.duration_days)))
    }

    /// Reject a course the projector cannot work with.
    pub fn validate(&self) -> Result<(), InvalidTreatment> {
        if !self.dose_amount.is_finite() || self.dose_amount < 0.0 {
            return Err(InvalidTreatment::new(
                "dose_amount",
                format!("{} is not a non-negative number", self.dose_amount),
            ));
        }
        if self.duration_days > MAX_COURSE_DAYS {
            return Err(InvalidTreatment::new(
                "duration_days",
                format!("{} exceeds {} days", self.duration_days, MAX_COURSE_DAYS),
            ));
        }
        if self.frequency_per_day == 0 || self.frequency_per_day > MAX_DAILY_FREQUENCY {
            return Err(InvalidTreatment::new(
                "frequency_per_day",
                format!("{} is outside 1..={}", self.frequency_per_day, MAX_DAILY_FREQUENCY),
            ));
        }
        if let Some(weight) = self.body_weight_kg {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(InvalidTreatment::new(
                    "body_weight_kg",
                    format!("{} is not a positive number", weight),
                ));
            }
        }
        if self.end_date().is_none() {
            return Err(InvalidTreatment::new("start_date", "course ends past the calendar range"));
        }
        Ok(())
    }

    /// Vaccines and vitamin/mineral supplements carry no withdrawal period.
    pub fn is_withdrawal_exempt(&self) -> bool {
        self.is_vaccine || self.category.is_withdrawal_exempt()
    }
}
