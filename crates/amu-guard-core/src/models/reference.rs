//! Reference catalog models: dose bands, tissue limits and withdrawal curves.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Therapeutic category of a medicine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MedicineCategory {
    Antibiotic,
    Antiparasitic,
    AntiInflammatory,
    Nsaid,
    Hormonal,
    Anticoccidial,
    Vaccine,
    Vitamin,
    Mineral,
    Other,
}

impl MedicineCategory {
    /// Categories that never carry a residue withdrawal period.
    pub fn is_withdrawal_exempt(&self) -> bool {
        matches!(self, Self::Vaccine | Self::Vitamin | Self::Mineral)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Antibiotic => "antibiotic",
            Self::Antiparasitic => "antiparasitic",
            Self::AntiInflammatory => "anti_inflammatory",
            Self::Nsaid => "nsaid",
            Self::Hormonal => "hormonal",
            Self::Anticoccidial => "anticoccidial",
            Self::Vaccine => "vaccine",
            Self::Vitamin => "vitamin",
            Self::Mineral => "mineral",
            Self::Other => "other",
        }
    }

    /// Parse a category label, tolerating case and `-`/space separators.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "antibiotic" => Some(Self::Antibiotic),
            "antiparasitic" => Some(Self::Antiparasitic),
            "anti_inflammatory" => Some(Self::AntiInflammatory),
            "nsaid" => Some(Self::Nsaid),
            "hormonal" => Some(Self::Hormonal),
            "anticoccidial" => Some(Self::Anticoccidial),
            "vaccine" => Some(Self::Vaccine),
            "vitamin" => Some(Self::Vitamin),
            "mineral" => Some(Self::Mineral),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for MedicineCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Animal product channel a residue projection is made for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProductMatrix {
    Meat,
    Milk,
    Egg,
}

impl ProductMatrix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meat => "meat",
            Self::Milk => "milk",
            Self::Egg => "egg",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "meat" => Some(Self::Meat),
            "milk" => Some(Self::Milk),
            "egg" | "eggs" => Some(Self::Egg),
            _ => None,
        }
    }
}

impl fmt::Display for ProductMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed dose interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DoseBand {
    pub min: f64,
    pub max: f64,
}

impl DoseBand {
    pub fn contains(&self, dose: f64) -> bool {
        dose >= self.min && dose <= self.max
    }
}

/// Lower bound of the overdose tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OverdoseBand {
    pub min: f64,
}

/// The three dose tiers of a catalog entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DoseBands {
    pub safe: DoseBand,
    pub moderate: DoseBand,
    pub overdose: OverdoseBand,
}

/// Maximum residue limit and distribution factor for one tissue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TissueLimit {
    /// Tissue name (e.g., "muscle", "liver", "milk")
    pub tissue: String,
    /// Maximum residue limit in µg/kg
    pub base_mrl: f64,
    /// Fraction of the systemic concentration that reaches this tissue
    pub partition_factor: f64,
}

/// Tissue limits per product matrix. Meat usually lists muscle, liver,
/// kidney and fat; milk and egg carry a single channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MatrixTissues {
    #[serde(default)]
    pub meat: Vec<TissueLimit>,
    #[serde(default)]
    pub milk: Vec<TissueLimit>,
    #[serde(default)]
    pub egg: Vec<TissueLimit>,
}

impl MatrixTissues {
    pub fn for_matrix(&self, matrix: ProductMatrix) -> &[TissueLimit] {
        match matrix {
            ProductMatrix::Meat => &self.meat,
            ProductMatrix::Milk => &self.milk,
            ProductMatrix::Egg => &self.egg,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.meat.is_empty() && self.milk.is_empty() && self.egg.is_empty()
    }
}

/// First-order elimination curve parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResidueProfile {
    /// Elimination half life in days
    pub half_life_days: f64,
    /// Converts an administered dose into a systemic concentration (µg/kg)
    pub dose_conversion_factor: f64,
    /// Species-specific scaling of the systemic concentration
    pub species_factor: f64,
    pub matrices: MatrixTissues,
}

impl ResidueProfile {
    /// Elimination rate constant `k = ln 2 / t½` (per day).
    pub fn elimination_rate(&self) -> f64 {
        std::f64::consts::LN_2 / self.half_life_days
    }

    /// Tissues modeled for a matrix, `None` when the curve does not cover it.
    pub fn tissues(&self, matrix: ProductMatrix) -> Option<&[TissueLimit]> {
        let tissues = self.matrices.for_matrix(matrix);
        if tissues.is_empty() {
            None
        } else {
            Some(tissues)
        }
    }
}

/// One (species, medicine) row of the reference catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceEntry {
    pub species: String,
    pub medicine: String,
    pub category: MedicineCategory,
    /// Unit the dose bands are expressed in (e.g., "mg/kg")
    pub dose_unit: String,
    pub doses: DoseBands,
    /// Withdrawal curve; absent for products without residue data
    #[serde(default)]
    pub residue: Option<ResidueProfile>,
}

impl ReferenceEntry {
    /// Case- and whitespace-insensitive unit comparison.
    pub fn unit_matches(&self, unit: &str) -> bool {
        normalize_unit(&self.dose_unit) == normalize_unit(unit)
    }
}

fn normalize_unit(unit: &str) -> String {
    unit.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
