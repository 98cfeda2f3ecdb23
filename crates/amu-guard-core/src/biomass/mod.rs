//! Herd-level antimicrobial exposure.
//!
//! Biomass of one treatment is
//! `dose_amount × duration_days × population_count × weight_kg / 1000`,
//! with the weight taken from the treatment, then the entity, then the
//! species default table.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BiomassConfig;
use crate::db::DbResult;
use crate::store::BiomassSource;

/// Treatment fields needed for biomass, joined with entity and farm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BiomassInput {
    pub treatment_id: String,
    pub farm_id: String,
    pub species: String,
    pub state: Option<String>,
    pub district: Option<String>,
    pub start_date: NaiveDate,
    pub dose_amount: f64,
    pub duration_days: u32,
    pub population_count: u32,
    pub treatment_weight_kg: Option<f64>,
    pub entity_weight_kg: Option<f64>,
}

/// Selection applied before aggregation. Date bounds are inclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BiomassFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub state: Option<String>,
    pub district: Option<String>,
    pub species: Option<String>,
}

impl BiomassFilter {
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Self::default()
        }
    }

    pub fn matches(&self, input: &BiomassInput) -> bool {
        if self.from.is_some_and(|from| input.start_date < from) {
            return false;
        }
        if self.to.is_some_and(|to| input.start_date > to) {
            return false;
        }
        name_matches(self.state.as_deref(), input.state.as_deref())
            && name_matches(self.district.as_deref(), input.district.as_deref())
            && name_matches(self.species.as_deref(), Some(input.species.as_str()))
    }
}

fn name_matches(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match wanted.map(str::trim).filter(|w| !w.is_empty()) {
        None => true,
        Some(wanted) => actual.is_some_and(|a| a.trim().eq_ignore_ascii_case(wanted)),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BiomassGrouping {
    Species,
    Farm,
    /// `YYYY-MM` of the start date
    Month,
    State,
    District,
}

impl BiomassGrouping {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Species => "species",
            Self::Farm => "farm",
            Self::Month => "month",
            Self::State => "state",
            Self::District => "district",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "species" => Some(Self::Species),
            "farm" => Some(Self::Farm),
            "month" => Some(Self::Month),
            "state" => Some(Self::State),
            "district" => Some(Self::District),
            _ => None,
        }
    }

    fn key(&self, input: &BiomassInput) -> String {
        let key = match self {
            Self::Species => Some(input.species.trim().to_lowercase()),
            Self::Farm => Some(input.farm_id.clone()),
            Self::Month => Some(input.start_date.format("%Y-%m").to_string()),
            Self::State => input.state.clone(),
            Self::District => input.district.clone(),
        };
        key.filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_KEY.to_string())
    }
}

/// Group key used when a location field is missing.
pub const UNKNOWN_KEY: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BiomassRow {
    pub key: String,
    pub treatment_count: u32,
    pub biomass_kg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BiomassReport {
    pub grouping: BiomassGrouping,
    /// Ordered by biomass descending, then key
    pub rows: Vec<BiomassRow>,
    pub total_biomass_kg: f64,
    pub treatment_count: u32,
    pub distinct_farms: u32,
    /// Mean resolved weight over counted treatments
    pub mean_weight_kg: Option<f64>,
    /// Treatments left out because no weight could be resolved
    pub skipped_treatments: Vec<String>,
}

/// `dose × duration × population × weight / 1000`.
pub fn biomass_kg(dose_amount: f64, duration_days: u32, population_count: u32, weight_kg: f64) -> f64 {
    dose_amount * f64::from(duration_days) * f64::from(population_count) * weight_kg / 1000.0
}

pub struct BiomassAggregator {
    default_weights: HashMap<String, f64>,
}

impl BiomassAggregator {
    pub fn new(default_weights: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            default_weights: default_weights
                .into_iter()
                .map(|(species, weight)| (species.trim().to_lowercase(), weight))
                .collect(),
        }
    }

    pub fn from_config(config: &BiomassConfig) -> Self {
        Self::new(config.default_weights_kg.clone())
    }

    /// Treatment weight, then entity weight, then the species default.
    pub fn resolve_weight(&self, input: &BiomassInput) -> Option<f64> {
        let usable = |w: &f64| w.is_finite() && *w > 0.0;
        input
            .treatment_weight_kg
            .filter(usable)
            .or(input.entity_weight_kg.filter(usable))
            .or_else(|| {
                self.default_weights
                    .get(&input.species.trim().to_lowercase())
                    .copied()
                    .filter(usable)
            })
    }

    pub fn aggregate(&self, inputs: &[BiomassInput], grouping: BiomassGrouping) -> BiomassReport {
        let mut groups: BTreeMap<String, (u32, f64)> = BTreeMap::new();
        let mut farms = BTreeSet::new();
        let mut skipped = Vec::new();
        let mut total = 0.0;
        let mut weight_sum = 0.0;
        let mut counted = 0u32;

        for input in inputs {
            let Some(weight) = self.resolve_weight(input) else {
                skipped.push(input.treatment_id.clone());
                continue;
            };
            let mass = biomass_kg(
                input.dose_amount,
                input.duration_days,
                input.population_count,
                weight,
            );
            let group = groups.entry(grouping.key(input)).or_insert((0, 0.0));
            group.0 += 1;
            group.1 += mass;

            total += mass;
            weight_sum += weight;
            counted += 1;
            farms.insert(input.farm_id.as_str());
        }

        if !skipped.is_empty() {
            warn!(
                count = skipped.len(),
                "Treatments without a resolvable weight left out of biomass"
            );
        }

        let mut rows: Vec<BiomassRow> = groups
            .into_iter()
            .map(|(key, (treatment_count, biomass_kg))| BiomassRow {
                key,
                treatment_count,
                biomass_kg,
            })
            .collect();
        // BTreeMap order already sorts keys; a stable sort keeps it on ties.
        rows.sort_by(|a, b| b.biomass_kg.total_cmp(&a.biomass_kg));

        debug!(grouping = grouping.as_str(), groups = rows.len(), total, "Aggregated biomass");

        BiomassReport {
            grouping,
            rows,
            total_biomass_kg: total,
            treatment_count: counted,
            distinct_farms: farms.len() as u32,
            mean_weight_kg: (counted > 0).then(|| weight_sum / f64::from(counted)),
            skipped_treatments: skipped,
        }
    }

    /// Fetch from `source` and aggregate.
    pub fn report<S: BiomassSource + ?Sized>(
        &self,
        source: &S,
        filter: &BiomassFilter,
        grouping: BiomassGrouping,
    ) -> DbResult<BiomassReport> {
        let inputs = source.biomass_inputs(filter)?;
        Ok(self.aggregate(&inputs, grouping))
    }
}
