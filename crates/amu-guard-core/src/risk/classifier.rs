//! Dose classification against catalog dose bands.

use crate::catalog::ReferenceLookup;
use crate::models::{DoseTier, ReferenceEntry};

/// Classifies administered doses. Pure: the same inputs always give the same tier.
pub struct DoseClassifier<'a> {
    catalog: &'a dyn ReferenceLookup,
}

impl<'a> DoseClassifier<'a> {
    pub fn new(catalog: &'a dyn ReferenceLookup) -> Self {
        Self { catalog }
    }

    pub fn classify(&self, species: &str, medicine: &str, dose: f64, unit: &str) -> DoseTier {
        match self.catalog.lookup(species, medicine) {
            Some(entry) => classify_against(entry, dose, unit),
            None => DoseTier::Unknown,
        }
    }
}

/// Place `dose` in the bands of a known entry.
///
/// Unit mismatches and unusable dose values are `Unknown`. A dose above
/// `overdose.min` is an overdose even when a wider moderate band would
/// still contain it.
pub fn classify_against(entry: &ReferenceEntry, dose: f64, unit: &str) -> DoseTier {
    if !entry.unit_matches(unit) {
        tracing::debug!(
            medicine = %entry.medicine,
            expected = %entry.dose_unit,
            got = unit,
            "Dose unit mismatch"
        );
        return DoseTier::Unknown;
    }
    if !dose.is_finite() || dose < 0.0 {
        return DoseTier::Unknown;
    }

    let bands = &entry.doses;
    if dose < bands.safe.min {
        DoseTier::UnderDose
    } else if dose <= bands.safe.max {
        DoseTier::Safe
    } else if dose > bands.overdose.min {
        DoseTier::Overdose
    } else if dose <= bands.moderate.max {
        DoseTier::Moderate
    } else {
        DoseTier::Overdose
    }
}
