//! Residue and withdrawal projection.
//!
//! Model `exp-decay-v1`: first-order elimination with daily accumulation.
//! With `k = ln 2 / t½` and `n = max(duration, 1)` administrations, the
//! residue in a tissue at the end of the course is
//!
//! ```text
//! residue = dose × frequency × conversion × species_factor × partition × Σ_{i<n} e^{-k·i}
//! ```
//!
//! and the withdrawal period is the smallest whole number of days `d` with
//! `residue × e^{-k·d} ≤ MRL` for the worst tissue.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::classifier::classify_against;
use crate::catalog::ReferenceLookup;
use crate::models::{
    DoseTier, InvalidTreatment, ProductMatrix, ReferenceEntry, RiskCategory, TissueLimit,
    TissueResidue, Treatment,
};

pub const MODEL_VERSION: &str = "exp-decay-v1";

/// Outcome of projecting one treatment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Projection {
    pub dose_tier: DoseTier,
    pub overdosage: bool,
    pub withdrawal_exempt: bool,
    pub tissues: Vec<TissueResidue>,
    pub worst_tissue: Option<String>,
    pub risk_percent: Option<f64>,
    pub risk_category: Option<RiskCategory>,
    pub withdrawal_days: Option<u32>,
    pub end_date: NaiveDate,
    pub safe_date: Option<NaiveDate>,
}

impl Projection {
    fn without_residue(dose_tier: DoseTier, end_date: NaiveDate) -> Self {
        Self {
            dose_tier,
            overdosage: dose_tier == DoseTier::Overdose,
            withdrawal_exempt: false,
            tissues: Vec::new(),
            worst_tissue: None,
            risk_percent: None,
            risk_category: None,
            withdrawal_days: None,
            end_date,
            safe_date: None,
        }
    }

    fn exempt(dose_tier: DoseTier, end_date: NaiveDate) -> Self {
        Self {
            withdrawal_exempt: true,
            risk_category: Some(RiskCategory::Safe),
            withdrawal_days: Some(0),
            safe_date: Some(end_date),
            ..Self::without_residue(dose_tier, end_date)
        }
    }
}

pub struct ResidueProjector<'a> {
    catalog: &'a dyn ReferenceLookup,
}

impl<'a> ResidueProjector<'a> {
    pub fn new(catalog: &'a dyn ReferenceLookup) -> Self {
        Self { catalog }
    }

    /// Project residue for a treatment in the given product matrix.
    ///
    /// Fails only when the course end date cannot be represented. A residue
    /// that never decays below the MRL, or a safe date past the calendar
    /// range, leaves the withdrawal fields null.
    pub fn project(
        &self,
        treatment: &Treatment,
        matrix: ProductMatrix,
    ) -> Result<Projection, InvalidTreatment> {
        let entry = self.catalog.lookup(&treatment.species, &treatment.medicine);
        let tier = entry
            .map(|e| classify_against(e, treatment.dose_amount, &treatment.dose_unit))
            .unwrap_or(DoseTier::Unknown);
        let end_date = treatment.end_date().ok_or_else(|| InvalidTreatment {
            field: "duration_days",
            reason: format!(
                "{} days from {} ends past the calendar range",
                treatment.duration_days, treatment.start_date
            ),
        })?;

        let entry_exempt = entry.is_some_and(|e| e.category.is_withdrawal_exempt());
        if treatment.is_withdrawal_exempt() || entry_exempt {
            return Ok(Projection::exempt(tier, end_date));
        }

        let entry = match entry {
            Some(entry) if entry.unit_matches(&treatment.dose_unit) => entry,
            _ => return Ok(Projection::without_residue(tier, end_date)),
        };
        if !treatment.dose_amount.is_finite() || treatment.dose_amount < 0.0 {
            return Ok(Projection::without_residue(tier, end_date));
        }

        Ok(match project_residue(entry, treatment, matrix) {
            Some(curve) => {
                let safe_date = curve.withdrawal_days.and_then(|days| {
                    end_date.checked_add_signed(chrono::Duration::days(i64::from(days)))
                });
                if safe_date.is_none() {
                    tracing::warn!(
                        treatment_id = %treatment.treatment_id,
                        residue = curve.worst.predicted_residue,
                        "Residue has no representable safe date"
                    );
                }
                tracing::debug!(
                    treatment_id = %treatment.treatment_id,
                    worst = %curve.worst.tissue,
                    risk_percent = curve.worst.risk_percent,
                    withdrawal_days = ?curve.withdrawal_days,
                    "Projected residue"
                );
                Projection {
                    dose_tier: tier,
                    overdosage: tier == DoseTier::Overdose,
                    withdrawal_exempt: false,
                    worst_tissue: Some(curve.worst.tissue.clone()),
                    risk_percent: Some(curve.worst.risk_percent),
                    risk_category: Some(curve.worst.category),
                    withdrawal_days: safe_date.and(curve.withdrawal_days),
                    tissues: curve.tissues,
                    end_date,
                    safe_date,
                }
            }
            None => {
                tracing::debug!(
                    treatment_id = %treatment.treatment_id,
                    matrix = %matrix,
                    "No withdrawal curve for matrix"
                );
                Projection::without_residue(tier, end_date)
            }
        })
    }
}

struct CurveResult {
    tissues: Vec<TissueResidue>,
    worst: TissueResidue,
    withdrawal_days: Option<u32>,
}

fn project_residue(
    entry: &ReferenceEntry,
    treatment: &Treatment,
    matrix: ProductMatrix,
) -> Option<CurveResult> {
    let profile = entry.residue.as_ref()?;
    let limits = profile.tissues(matrix)?;
    let k = profile.elimination_rate();

    let daily_dose = treatment.dose_amount * f64::from(treatment.frequency_per_day);
    let systemic = daily_dose
        * profile.dose_conversion_factor
        * profile.species_factor
        * accumulation_factor(k, treatment.duration_days);

    let tissues: Vec<TissueResidue> = limits
        .iter()
        .map(|limit| tissue_residue(limit, systemic))
        .collect();

    // Strictly greater keeps the first tissue on ties.
    let mut worst = tissues.first()?;
    for tissue in &tissues[1..] {
        if tissue.risk_percent > worst.risk_percent {
            worst = tissue;
        }
    }
    let worst = worst.clone();
    let withdrawal_days = withdrawal_days(worst.predicted_residue, worst.base_mrl, k);

    Some(CurveResult {
        tissues,
        worst,
        withdrawal_days,
    })
}

fn tissue_residue(limit: &TissueLimit, systemic: f64) -> TissueResidue {
    let predicted_residue = systemic * limit.partition_factor;
    let risk_percent = predicted_residue / limit.base_mrl * 100.0;
    TissueResidue {
        tissue: limit.tissue.clone(),
        predicted_residue,
        base_mrl: limit.base_mrl,
        risk_percent,
        category: RiskCategory::from_risk_percent(risk_percent),
    }
}

/// `Σ_{i=0}^{n-1} e^{-k·i}` with `n = max(duration_days, 1)`.
pub fn accumulation_factor(k: f64, duration_days: u32) -> f64 {
    let n = duration_days.max(1);
    let mut sum = 0.0;
    for i in 0..n {
        let term = (-k * f64::from(i)).exp();
        // Terms only shrink; once one is below half an ulp the sum is final.
        if term <= sum * f64::EPSILON / 4.0 {
            break;
        }
        sum += term;
    }
    sum
}

/// Smallest `d ≥ 0` with `residue × e^{-k·d} ≤ mrl`.
///
/// `None` when the residue cannot decay to the MRL within `u32` days, which
/// covers non-finite inputs and a non-positive MRL or elimination rate.
pub fn withdrawal_days(residue: f64, mrl: f64, k: f64) -> Option<u32> {
    if residue <= mrl {
        return Some(0);
    }
    if !residue.is_finite() || !mrl.is_finite() || mrl <= 0.0 || !k.is_finite() || k <= 0.0 {
        return None;
    }
    let decays_to_mrl = |d: u32| residue * (-k * f64::from(d)).exp() <= mrl;

    let estimate = ((residue / mrl).ln() / k).ceil();
    if !estimate.is_finite() || estimate >= f64::from(u32::MAX) {
        return None;
    }
    let mut days = (estimate as u32).max(1);
    // The closed form can land one day off either way through rounding.
    while days > 0 && decays_to_mrl(days - 1) {
        days -= 1;
    }
    while !decays_to_mrl(days) {
        days = days.checked_add(1)?;
    }
    Some(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ReferenceCatalog;
    use crate::models::MedicineCategory;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn treatment(species: &str, medicine: &str, dose: f64, days: u32) -> Treatment {
        let mut t = Treatment::new(
            "entity".into(),
            "farm".into(),
            species.into(),
            medicine.into(),
            dose,
            "mg/kg".into(),
            date(2024, 1, 1),
        );
        t.category = MedicineCategory::Antibiotic;
        t.duration_days = days;
        t
    }

    #[test]
    fn test_enrofloxacin_cattle_safe_course() {
        let catalog = ReferenceCatalog::builtin().unwrap();
        let projector = ResidueProjector::new(&catalog);
        let t = treatment("cattle", "Enrofloxacin", 5.0, 5);
        let p = projector.project(&t, ProductMatrix::Meat).unwrap();

        assert_eq!(p.dose_tier, DoseTier::Safe);
        assert!(!p.overdosage);
        assert_eq!(p.tissues.len(), 4);
        assert_eq!(p.worst_tissue.as_deref(), Some("muscle"));

        let k = std::f64::consts::LN_2 / 0.25;
        let expected = 5.0 * 16.0 * accumulation_factor(k, 5);
        let muscle = &p.tissues[0];
        assert!((muscle.predicted_residue - expected).abs() < 1e-9);
        assert!(muscle.risk_percent < 100.0);
        assert_eq!(p.risk_category, Some(RiskCategory::Safe));

        let withdrawal = p.withdrawal_days.unwrap();
        assert_eq!(withdrawal, 0);
        assert_eq!(
            p.safe_date,
            Some(date(2024, 1, 6) + chrono::Duration::days(i64::from(withdrawal)))
        );
        assert_eq!(p.end_date, date(2024, 1, 6));
    }

    #[test]
    fn test_oxytetracycline_unsafe_needs_withdrawal() {
        let catalog = ReferenceCatalog::builtin().unwrap();
        let projector = ResidueProjector::new(&catalog);
        let t = treatment("cattle", "Oxytetracycline", 20.0, 3);
        let p = projector.project(&t, ProductMatrix::Meat).unwrap();

        // 20 × 10 × (1 + 0.5 + 0.25) = 350 µg/kg against MRL 200
        assert_eq!(p.worst_tissue.as_deref(), Some("muscle"));
        assert!((p.risk_percent.unwrap() - 175.0).abs() < 1e-9);
        assert_eq!(p.risk_category, Some(RiskCategory::Unsafe));
        assert_eq!(p.withdrawal_days, Some(1));
        assert_eq!(p.safe_date, Some(date(2024, 1, 5)));
    }

    #[test]
    fn test_amoxicillin_overdosage_follows_tier_only() {
        let catalog = ReferenceCatalog::builtin().unwrap();
        let projector = ResidueProjector::new(&catalog);
        let mut t = treatment("poultry", "Amoxicillin", 20.0, 3);
        t.route = Some("water".into());
        let p = projector.project(&t, ProductMatrix::Meat).unwrap();

        assert_eq!(p.dose_tier, DoseTier::Moderate);
        assert!(!p.overdosage);
        // Residue is well above MRL while the dose is not an overdose
        assert_eq!(p.risk_category, Some(RiskCategory::Unsafe));

        t.dose_amount = 25.0;
        let p = projector.project(&t, ProductMatrix::Meat).unwrap();
        assert_eq!(p.dose_tier, DoseTier::Overdose);
        assert!(p.overdosage);
    }

    #[test]
    fn test_vaccine_is_exempt() {
        let catalog = ReferenceCatalog::builtin().unwrap();
        let projector = ResidueProjector::new(&catalog);
        let mut t = treatment("cattle", "FMD Vaccine", 2.0, 1);
        t.dose_unit = "ml".into();
        t.category = MedicineCategory::Vaccine;
        let p = projector.project(&t, ProductMatrix::Milk).unwrap();

        assert!(p.withdrawal_exempt);
        assert!(p.tissues.is_empty());
        assert_eq!(p.withdrawal_days, Some(0));
        assert_eq!(p.safe_date, Some(p.end_date));
        assert_eq!(p.risk_category, Some(RiskCategory::Safe));
        assert_eq!(p.risk_percent, None);
    }

    #[test]
    fn test_vaccine_flag_without_catalog_entry_is_exempt() {
        let catalog = ReferenceCatalog::builtin().unwrap();
        let projector = ResidueProjector::new(&catalog);
        let mut t = treatment("goat", "PPR Vaccine", 1.0, 1);
        t.is_vaccine = true;
        let p = projector.project(&t, ProductMatrix::Meat).unwrap();
        assert_eq!(p.dose_tier, DoseTier::Unknown);
        assert_eq!(p.safe_date, Some(date(2024, 1, 2)));
    }

    #[test]
    fn test_missing_data_yields_nulls() {
        let catalog = ReferenceCatalog::builtin().unwrap();
        let projector = ResidueProjector::new(&catalog);

        let unknown = projector
            .project(&treatment("cattle", "Unlisted", 5.0, 3), ProductMatrix::Meat)
            .unwrap();
        let mut wrong_unit = treatment("cattle", "Enrofloxacin", 5.0, 3);
        wrong_unit.dose_unit = "ml".into();
        let wrong_unit = projector.project(&wrong_unit, ProductMatrix::Meat).unwrap();
        // Ivermectin lists no milk channel
        let no_curve = projector
            .project(&treatment("cattle", "Ivermectin", 0.2, 1), ProductMatrix::Milk)
            .unwrap();

        for p in [unknown, wrong_unit, no_curve] {
            assert!(p.tissues.is_empty());
            assert_eq!(p.worst_tissue, None);
            assert_eq!(p.risk_percent, None);
            assert_eq!(p.risk_category, None);
            assert_eq!(p.withdrawal_days, None);
            assert_eq!(p.safe_date, None);
        }
    }

    #[test]
    fn test_zero_duration_counts_one_administration() {
        let k = 1.0;
        assert_eq!(accumulation_factor(k, 0), 1.0);
        assert_eq!(accumulation_factor(k, 1), 1.0);
    }

    #[test]
    fn test_accumulation_converges_for_long_courses() {
        let k = std::f64::consts::LN_2;
        let long = accumulation_factor(k, u32::MAX);
        assert_eq!(long, accumulation_factor(k, 200));
        assert!((long - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_withdrawal_days_minimal() {
        let k = std::f64::consts::LN_2; // one-day half life
        assert_eq!(withdrawal_days(100.0, 100.0, k), Some(0));
        assert_eq!(withdrawal_days(199.0, 100.0, k), Some(1));
        assert_eq!(withdrawal_days(201.0, 100.0, k), Some(2));
        assert_eq!(withdrawal_days(790.0, 100.0, k), Some(3));
    }

    #[test]
    fn test_withdrawal_days_unreachable() {
        let k = std::f64::consts::LN_2;
        assert_eq!(withdrawal_days(f64::INFINITY, 100.0, k), None);
        assert_eq!(withdrawal_days(f64::NAN, 100.0, k), None);
        assert_eq!(withdrawal_days(500.0, 100.0, 0.0), None);
        // ln(1e308 / 1e-300) / 1e-9 days is far beyond u32
        assert_eq!(withdrawal_days(1e308, 1e-300, 1e-9), None);
        assert_eq!(withdrawal_days(f64::MAX, 100.0, k), Some(1018));
    }

    #[test]
    fn test_overflowing_course_is_rejected() {
        let catalog = ReferenceCatalog::builtin().unwrap();
        let projector = ResidueProjector::new(&catalog);
        let t = treatment("cattle", "Oxytetracycline", 20.0, 200_000_000);
        let err = projector.project(&t, ProductMatrix::Meat).unwrap_err();
        assert_eq!(err.field, "duration_days");
    }

    #[test]
    fn test_infinite_residue_leaves_safe_date_null() {
        let catalog = ReferenceCatalog::builtin().unwrap();
        let projector = ResidueProjector::new(&catalog);
        let mut t = treatment("cattle", "Oxytetracycline", 1e308, 3);
        t.frequency_per_day = 24;
        let p = projector.project(&t, ProductMatrix::Meat).unwrap();

        assert_eq!(p.dose_tier, DoseTier::Overdose);
        assert_eq!(p.risk_category, Some(RiskCategory::Unsafe));
        assert_eq!(p.withdrawal_days, None);
        assert_eq!(p.safe_date, None);
    }

    #[test]
    fn test_projection_is_repeatable() {
        let catalog = ReferenceCatalog::builtin().unwrap();
        let projector = ResidueProjector::new(&catalog);
        let t = treatment("sheep", "Albendazole", 8.0, 3);
        assert_eq!(
            projector.project(&t, ProductMatrix::Meat),
            projector.project(&t, ProductMatrix::Meat)
        );
    }
}
