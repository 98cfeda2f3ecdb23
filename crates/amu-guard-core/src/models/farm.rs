//! Farm, animal/batch and laboratory models.

use serde::{Deserialize, Serialize};

use super::ProductMatrix;

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// WGS84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Haversine great-circle distance in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * other.latitude.to_radians().cos()
                * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }
}

/// Administrative location with optional coordinates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub state: Option<String>,
    pub district: Option<String>,
    pub taluk: Option<String>,
    pub coordinates: Option<GeoPoint>,
}

impl Location {
    pub fn same_state(&self, other: &Location) -> bool {
        same_name(self.state.as_deref(), other.state.as_deref())
    }

    /// Same district, and same state whenever both sides record one.
    pub fn same_district(&self, other: &Location) -> bool {
        if !same_name(self.district.as_deref(), other.district.as_deref()) {
            return false;
        }
        match (self.state.as_deref(), other.state.as_deref()) {
            (Some(_), Some(_)) => self.same_state(other),
            _ => true,
        }
    }
}

fn same_name(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a = a.trim();
            !a.is_empty() && a.eq_ignore_ascii_case(b.trim())
        }
        _ => false,
    }
}

/// A farm owning animals and batches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Farm {
    pub farm_id: String,
    /// Owner farmer identifier
    pub farmer_id: Option<String>,
    pub name: String,
    pub location: Location,
    pub created_at: String,
}

impl Farm {
    pub fn new(name: String, location: Location) -> Self {
        Self {
            farm_id: uuid::Uuid::new_v4().to_string(),
            farmer_id: None,
            name,
            location,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A single animal or a batch of animals on one farm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub entity_id: String,
    pub farm_id: String,
    /// Species (e.g., "cattle", "poultry")
    pub species: String,
    /// Ear tag or ring identity for a single animal
    pub tag_id: Option<String>,
    /// Batch or flock name
    pub batch_name: Option<String>,
    /// 1 for an individual animal, N for a batch
    pub population_count: u32,
    /// Measured average body weight in kg
    pub weight_kg: Option<f64>,
    /// Product channel residue projections are made for
    pub product_matrix: ProductMatrix,
    pub created_at: String,
}

impl Entity {
    pub fn new(farm_id: String, species: String, product_matrix: ProductMatrix) -> Self {
        Self {
            entity_id: uuid::Uuid::new_v4().to_string(),
            farm_id,
            species,
            tag_id: None,
            batch_name: None,
            population_count: 1,
            weight_kg: None,
            product_matrix,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_batch(&self) -> bool {
        self.population_count > 1 || self.batch_name.is_some()
    }
}

/// A residue-testing laboratory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Laboratory {
    pub lab_id: String,
    pub name: String,
    pub location: Location,
    pub created_at: String,
}

impl Laboratory {
    pub fn new(name: String, location: Location) -> Self {
        Self {
            lab_id: uuid::Uuid::new_v4().to_string(),
            name,
            location,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
