//! Laboratory assignment strategies.
//!
//! Strategies are tried in order and the first one that finds a lab wins:
//! nearest within radius, same district, same state, then the first lab
//! ever registered.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{AssignmentMethod, Farm, Laboratory};

/// Default search radius for proximity assignment.
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 200.0;

/// A lab chosen for a farm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabMatch {
    pub lab_id: String,
    pub lab_name: String,
    pub method: AssignmentMethod,
    /// Set when chosen by distance
    pub distance_km: Option<f64>,
}

impl LabMatch {
    fn new(lab: &Laboratory, method: AssignmentMethod, distance_km: Option<f64>) -> Self {
        Self {
            lab_id: lab.lab_id.clone(),
            lab_name: lab.name.clone(),
            method,
            distance_km,
        }
    }
}

pub trait AssignmentStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `labs` are in creation order.
    fn select(&self, farm: &Farm, labs: &[Laboratory]) -> Option<LabMatch>;
}

/// Closest lab within `max_km`, when both sides have coordinates.
#[derive(Debug, Clone, Copy)]
pub struct NearestWithinRadius {
    pub max_km: f64,
}

impl AssignmentStrategy for NearestWithinRadius {
    fn name(&self) -> &'static str {
        "nearest"
    }

    fn select(&self, farm: &Farm, labs: &[Laboratory]) -> Option<LabMatch> {
        let origin = farm.location.coordinates?;
        let mut best: Option<(&Laboratory, f64)> = None;
        for lab in labs {
            let Some(point) = lab.location.coordinates else {
                continue;
            };
            let distance = origin.distance_km(&point);
            if !distance.is_finite() || distance > self.max_km {
                continue;
            }
            // Earlier labs win ties.
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((lab, distance));
            }
        }
        best.map(|(lab, d)| LabMatch::new(lab, AssignmentMethod::Nearest, Some(d)))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SameDistrict;

impl AssignmentStrategy for SameDistrict {
    fn name(&self) -> &'static str {
        "same_district"
    }

    fn select(&self, farm: &Farm, labs: &[Laboratory]) -> Option<LabMatch> {
        labs.iter()
            .find(|lab| lab.location.same_district(&farm.location))
            .map(|lab| LabMatch::new(lab, AssignmentMethod::SameDistrict, None))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SameState;

impl AssignmentStrategy for SameState {
    fn name(&self) -> &'static str {
        "same_state"
    }

    fn select(&self, farm: &Farm, labs: &[Laboratory]) -> Option<LabMatch> {
        labs.iter()
            .find(|lab| lab.location.same_state(&farm.location))
            .map(|lab| LabMatch::new(lab, AssignmentMethod::SameState, None))
    }
}

/// First lab by creation order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLab;

impl AssignmentStrategy for DefaultLab {
    fn name(&self) -> &'static str {
        "default"
    }

    fn select(&self, _farm: &Farm, labs: &[Laboratory]) -> Option<LabMatch> {
        labs.first()
            .map(|lab| LabMatch::new(lab, AssignmentMethod::Default, None))
    }
}

/// Ordered fallback chain of strategies.
pub struct LabAssigner {
    strategies: Vec<Box<dyn AssignmentStrategy>>,
}

impl LabAssigner {
    pub fn new(strategies: Vec<Box<dyn AssignmentStrategy>>) -> Self {
        Self { strategies }
    }

    /// Nearest within `max_km`, same district, same state, first lab.
    pub fn standard(max_km: f64) -> Self {
        Self::new(vec![
            Box::new(NearestWithinRadius { max_km }),
            Box::new(SameDistrict),
            Box::new(SameState),
            Box::new(DefaultLab),
        ])
    }

    pub fn assign(&self, farm: &Farm, labs: &[Laboratory]) -> Option<LabMatch> {
        for strategy in &self.strategies {
            if let Some(found) = strategy.select(farm, labs) {
                debug!(
                    farm_id = %farm.farm_id,
                    strategy = strategy.name(),
                    lab_id = %found.lab_id,
                    "Selected laboratory"
                );
                return Some(found);
            }
        }
        None
    }
}

impl Default for LabAssigner {
    fn default() -> Self {
        Self::standard(DEFAULT_MAX_DISTANCE_KM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoPoint, Location};

    const ORIGIN: (f64, f64) = (12.9716, 77.5946);

    fn location(state: &str, district: &str, lat_offset: Option<f64>) -> Location {
        Location {
            state: Some(state.into()),
            district: Some(district.into()),
            taluk: None,
            coordinates: lat_offset.map(|o| GeoPoint::new(ORIGIN.0 + o, ORIGIN.1)),
        }
    }

    fn farm() -> Farm {
        Farm::new("Farm".into(), location("Karnataka", "Bengaluru Urban", Some(0.0)))
    }

    fn lab(name: &str, loc: Location) -> Laboratory {
        Laboratory::new(name.into(), loc)
    }

    #[test]
    fn test_nearest_lab_within_radius() {
        // One degree of latitude is about 111.2 km.
        let labs = vec![
            lab("Far", location("Karnataka", "Mysuru", Some(2.7))),
            lab("Near", location("Tamil Nadu", "Krishnagiri", Some(0.45))),
            lab("Mid", location("Karnataka", "Tumakuru", Some(1.89))),
        ];
        let found = LabAssigner::default().assign(&farm(), &labs).unwrap();
        assert_eq!(found.lab_name, "Near");
        assert_eq!(found.method, AssignmentMethod::Nearest);
        let d = found.distance_km.unwrap();
        assert!((d - 50.0).abs() < 1.0, "distance {}", d);
    }

    #[test]
    fn test_out_of_radius_falls_back_to_district() {
        let labs = vec![
            lab("Far", location("Karnataka", "Mysuru", Some(2.7))),
            lab("Mid", location("Karnataka", "Bengaluru Urban", Some(1.89))),
        ];
        let found = LabAssigner::default().assign(&farm(), &labs).unwrap();
        assert_eq!(found.lab_name, "Mid");
        assert_eq!(found.method, AssignmentMethod::SameDistrict);
        assert_eq!(found.distance_km, None);
    }

    #[test]
    fn test_out_of_radius_falls_back_to_state() {
        let labs = vec![
            lab("Other State", location("Kerala", "Wayanad", Some(2.7))),
            lab("Mid", location("Karnataka", "Tumakuru", Some(1.89))),
        ];
        let found = LabAssigner::default().assign(&farm(), &labs).unwrap();
        assert_eq!(found.lab_name, "Mid");
        assert_eq!(found.method, AssignmentMethod::SameState);
    }

    #[test]
    fn test_district_requires_same_state() {
        let labs = vec![lab("Namesake", location("Kerala", "Bengaluru Urban", None))];
        let found = LabAssigner::default().assign(&farm(), &labs).unwrap();
        assert_eq!(found.method, AssignmentMethod::Default);
    }

    #[test]
    fn test_default_is_first_created_and_none_without_labs() {
        let labs = vec![
            lab("First", location("Goa", "North Goa", None)),
            lab("Second", location("Goa", "South Goa", None)),
        ];
        let found = LabAssigner::default().assign(&farm(), &labs).unwrap();
        assert_eq!(found.lab_name, "First");
        assert_eq!(found.method, AssignmentMethod::Default);

        assert!(LabAssigner::default().assign(&farm(), &[]).is_none());
    }

    #[test]
    fn test_farm_without_coordinates_skips_proximity() {
        let mut f = farm();
        f.location.coordinates = None;
        let labs = vec![lab("Near", location("Karnataka", "Mysuru", Some(0.1)))];
        let found = LabAssigner::default().assign(&f, &labs).unwrap();
        assert_eq!(found.method, AssignmentMethod::SameState);
    }
}
