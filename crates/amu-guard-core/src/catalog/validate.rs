//! Structural checks for reference catalog entries.

use std::collections::HashSet;

use super::catalog_key;
use crate::models::{ProductMatrix, ReferenceEntry, TissueLimit};

/// Validate a set of entries, returning every problem found.
pub fn validate_entries(entries: &[ReferenceEntry]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for entry in entries {
        if !seen.insert(catalog_key(&entry.species, &entry.medicine)) {
            errors.push(format!(
                "Duplicate entry for species '{}' and medicine '{}'",
                entry.species, entry.medicine
            ));
        }
        errors.extend(validate_entry(entry));
    }

    errors
}

/// Validate one entry in isolation.
pub fn validate_entry(entry: &ReferenceEntry) -> Vec<String> {
    let mut errors = Vec::new();
    let label = format!("{}/{}", entry.species, entry.medicine);

    if entry.species.trim().is_empty() || entry.medicine.trim().is_empty() {
        errors.push(format!("Entry '{}' has an empty species or medicine", label));
    }
    if entry.dose_unit.trim().is_empty() {
        errors.push(format!("Entry '{}' has an empty dose unit", label));
    }

    let doses = &entry.doses;
    let bounds = [
        ("safe.min", doses.safe.min),
        ("safe.max", doses.safe.max),
        ("moderate.min", doses.moderate.min),
        ("moderate.max", doses.moderate.max),
        ("overdose.min", doses.overdose.min),
    ];
    for (name, value) in bounds {
        if !value.is_finite() || value < 0.0 {
            errors.push(format!("Entry '{}' has invalid {}: {}", label, name, value));
        }
    }
    if doses.safe.min > doses.safe.max {
        errors.push(format!("Entry '{}' has safe.min > safe.max", label));
    }
    if doses.moderate.min > doses.moderate.max {
        errors.push(format!("Entry '{}' has moderate.min > moderate.max", label));
    }
    if doses.safe.max > doses.moderate.max {
        errors.push(format!("Entry '{}' safe band overlaps past moderate.max", label));
    }
    if doses.overdose.min < doses.moderate.max {
        errors.push(format!("Entry '{}' has overdose.min below moderate.max", label));
    }

    if let Some(residue) = &entry.residue {
        if !residue.half_life_days.is_finite() || residue.half_life_days <= 0.0 {
            errors.push(format!("Entry '{}' has non-positive half life", label));
        }
        if !residue.dose_conversion_factor.is_finite() || residue.dose_conversion_factor < 0.0 {
            errors.push(format!("Entry '{}' has invalid dose conversion factor", label));
        }
        if !residue.species_factor.is_finite() || residue.species_factor < 0.0 {
            errors.push(format!("Entry '{}' has invalid species factor", label));
        }
        if residue.matrices.is_empty() {
            errors.push(format!("Entry '{}' residue profile lists no tissues", label));
        }
        for matrix in [ProductMatrix::Meat, ProductMatrix::Milk, ProductMatrix::Egg] {
            for tissue in residue.matrices.for_matrix(matrix) {
                errors.extend(validate_tissue(&label, matrix, tissue));
            }
        }
    }

    errors
}

fn validate_tissue(label: &str, matrix: ProductMatrix, tissue: &TissueLimit) -> Vec<String> {
    let mut errors = Vec::new();
    if tissue.tissue.trim().is_empty() {
        errors.push(format!("Entry '{}' {} has an unnamed tissue", label, matrix));
    }
    if !tissue.base_mrl.is_finite() || tissue.base_mrl <= 0.0 {
        errors.push(format!(
            "Entry '{}' {} tissue '{}' has non-positive MRL",
            label, matrix, tissue.tissue
        ));
    }
    if !tissue.partition_factor.is_finite() || tissue.partition_factor <= 0.0 {
        errors.push(format!(
            "Entry '{}' {} tissue '{}' has non-positive partition factor",
            label, matrix, tissue.tissue
        ));
    }
    errors
}
