//! AMU Guard Core Library
//!
//! Local-first antimicrobial-use tracking for livestock: dose checks,
//! residue and withdrawal projection, and the sample compliance loop that
//! confirms products are safe before sale.
//!
//! # Architecture
//!
//! ```text
//! Treatment → Dose Classifier → Residue Projector
//!                                      │
//!                          [AMU risk record, sealed, write-once]
//!                                      │
//!                        Sample request (lab assignment)
//!                                      │
//!              requested → collected → tested → completed
//!                                      │
//!                            Lab verdict → Alerts
//!
//! Treatments ──► Biomass Aggregator        Feed ration ──► Feed-Risk Scorer
//! ```
//!
//! # Modules
//!
//! - [`catalog`]: validated reference catalog of dose bands and withdrawal curves
//! - [`risk`]: dose classifier, residue projector and the assessment pipeline
//! - [`compliance`]: sample request lifecycle and laboratory assignment
//! - [`biomass`]: herd-level antimicrobial exposure
//! - [`feed`]: feed-based AMU propensity
//! - [`alerts`]: alert sinks
//! - [`store`]: repository traits, implemented by [`db::Database`]
//! - [`export`]: withdrawal compliance export

pub mod alerts;
pub mod biomass;
pub mod catalog;
pub mod compliance;
pub mod config;
pub mod db;
pub mod export;
pub mod feed;
pub mod logging;
pub mod models;
pub mod risk;
pub mod store;

// Re-export commonly used types
pub use alerts::{AlertSink, MemoryAlertSink, TracingAlertSink};
pub use catalog::{ReferenceCatalog, ReferenceLookup};
pub use compliance::{LabAssigner, SampleCoordinator};
pub use config::AppConfig;
pub use db::Database;
pub use models::{
    AlertEvent, AmuRiskRecord, DoseTier, Entity, Farm, Laboratory, ProductMatrix, RiskCategory,
    SampleRequest, SampleStatus, Treatment,
};
pub use risk::{DoseClassifier, ResidueProjector, RiskAssessor};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use alerts::FanoutAlertSink;
use biomass::{BiomassAggregator, BiomassFilter, BiomassGrouping, BiomassReport};
use compliance::{CollectionInput, ComplianceError, IncomingCase, TestOutcome, TestReportInput};
use feed::{FeedError, FeedRiskScorer, FeedRiskService, FeedSubmission};
use models::{
    FeedInclusion, FeedRiskStatistics, FeedRiskSummary, FeedScore, GeoPoint, LabStatistics, Location,
    MedicineCategory, Sample,
};
use risk::RiskError;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum AmuGuardError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<db::DbError> for AmuGuardError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(msg) => AmuGuardError::NotFound(msg),
            db::DbError::Conflict(_) | db::DbError::Immutable(_) => {
                AmuGuardError::Conflict(e.to_string())
            }
            other => AmuGuardError::DatabaseError(other.to_string()),
        }
    }
}

impl From<RiskError> for AmuGuardError {
    fn from(e: RiskError) -> Self {
        match e {
            RiskError::Database(db) => db.into(),
            RiskError::NotFound(msg) => AmuGuardError::NotFound(msg),
            RiskError::InvalidTreatment(e) => AmuGuardError::InvalidInput(e.to_string()),
            RiskError::Serialization(e) => AmuGuardError::SerializationError(e.to_string()),
        }
    }
}

impl From<ComplianceError> for AmuGuardError {
    fn from(e: ComplianceError) -> Self {
        match e {
            ComplianceError::Database(db) => db.into(),
            ComplianceError::NotFound(msg) => AmuGuardError::NotFound(msg),
            ComplianceError::InvalidTransition(t) => {
                AmuGuardError::InvalidTransition(t.to_string())
            }
            ComplianceError::Conflict(_) | ComplianceError::AlreadyAssigned(_) => {
                AmuGuardError::Conflict(e.to_string())
            }
            other => AmuGuardError::InvalidInput(other.to_string()),
        }
    }
}

impl From<FeedError> for AmuGuardError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::Database(db) => db.into(),
            other => AmuGuardError::InvalidInput(other.to_string()),
        }
    }
}

impl From<catalog::CatalogError> for AmuGuardError {
    fn from(e: catalog::CatalogError) -> Self {
        AmuGuardError::ConfigError(e.to_string())
    }
}

impl From<config::ConfigError> for AmuGuardError {
    fn from(e: config::ConfigError) -> Self {
        AmuGuardError::ConfigError(e.to_string())
    }
}

impl From<serde_json::Error> for AmuGuardError {
    fn from(e: serde_json::Error) -> Self {
        AmuGuardError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for AmuGuardError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        AmuGuardError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
///
/// `config_path` points at a TOML file; a missing file means defaults.
#[uniffi::export]
pub fn open_database(
    path: String,
    config_path: Option<String>,
) -> Result<Arc<AmuGuardCore>, AmuGuardError> {
    let config = match config_path {
        Some(p) => AppConfig::load_or_default(Path::new(&p))?,
        None => AppConfig::default(),
    };
    let db = Database::open(&path)?;
    AmuGuardCore::build(db, config)
}

/// Create an in-memory database with default configuration (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<AmuGuardCore>, AmuGuardError> {
    AmuGuardCore::build(Database::open_in_memory()?, AppConfig::default())
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe pipeline facade for FFI.
#[derive(uniffi::Object)]
pub struct AmuGuardCore {
    db: Arc<Mutex<Database>>,
    catalog: ReferenceCatalog,
    config: AppConfig,
    assigner: LabAssigner,
    alerts: Arc<MemoryAlertSink>,
}

impl AmuGuardCore {
    fn build(db: Database, config: AppConfig) -> Result<Arc<Self>, AmuGuardError> {
        logging::init_with_level(&config.logging.level);
        let catalog = ReferenceCatalog::load_or_builtin(config.catalog.path.as_deref())?;
        Ok(Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            catalog,
            assigner: LabAssigner::standard(config.assignment.max_distance_km),
            config,
            alerts: Arc::new(MemoryAlertSink::new()),
        }))
    }

    /// Buffers alerts for `drain_alerts` and mirrors them to tracing.
    fn with_alerts<T>(
        &self,
        f: impl FnOnce(&dyn AlertSink) -> Result<T, AmuGuardError>,
    ) -> Result<T, AmuGuardError> {
        let tracing_sink = TracingAlertSink;
        let sinks: Vec<&dyn AlertSink> = vec![&*self.alerts, &tracing_sink];
        f(&FanoutAlertSink::new(sinks))
    }
}

#[uniffi::export]
impl AmuGuardCore {
    // =========================================================================
    // Registration
    // =========================================================================

    pub fn register_farm(
        &self,
        name: String,
        farmer_id: Option<String>,
        location: FfiLocation,
    ) -> Result<FfiFarm, AmuGuardError> {
        let db = self.db.lock()?;
        let mut farm = Farm::new(name, location.into());
        farm.farmer_id = farmer_id;
        db.insert_farm(&farm)?;
        Ok(farm.into())
    }

    pub fn register_entity(&self, input: FfiNewEntity) -> Result<FfiEntity, AmuGuardError> {
        let matrix = ProductMatrix::parse(&input.product_matrix).ok_or_else(|| {
            AmuGuardError::InvalidInput(format!("unknown product matrix: {}", input.product_matrix))
        })?;
        if input.population_count == 0 {
            return Err(AmuGuardError::InvalidInput("population count must be at least 1".into()));
        }

        let db = self.db.lock()?;
        let mut entity = Entity::new(input.farm_id, input.species, matrix);
        entity.tag_id = input.tag_id;
        entity.batch_name = input.batch_name;
        entity.population_count = input.population_count;
        entity.weight_kg = input.weight_kg;
        db.insert_entity(&entity)?;
        Ok(entity.into())
    }

    pub fn register_laboratory(
        &self,
        name: String,
        location: FfiLocation,
    ) -> Result<FfiLaboratory, AmuGuardError> {
        let db = self.db.lock()?;
        let lab = Laboratory::new(name, location.into());
        db.insert_laboratory(&lab)?;
        Ok(lab.into())
    }

    /// Store a treatment and return its id.
    pub fn record_treatment(&self, input: FfiNewTreatment) -> Result<String, AmuGuardError> {
        let db = self.db.lock()?;
        let entity = db
            .get_entity(&input.entity_id)?
            .ok_or_else(|| AmuGuardError::NotFound(format!("entity {}", input.entity_id)))?;

        let mut treatment = Treatment::new(
            entity.entity_id.clone(),
            entity.farm_id.clone(),
            entity.species.clone(),
            input.medicine,
            input.dose_amount,
            input.dose_unit,
            parse_date_input(&input.start_date)?,
        );
        if let Some(category) = input.category {
            treatment.category = MedicineCategory::parse(&category).ok_or_else(|| {
                AmuGuardError::InvalidInput(format!("unknown medicine category: {}", category))
            })?;
        }
        treatment.route = input.route;
        treatment.frequency_per_day = input.frequency_per_day.max(1);
        treatment.duration_days = input.duration_days;
        treatment.is_vaccine = input.is_vaccine;
        treatment.body_weight_kg = input.body_weight_kg;
        treatment
            .validate()
            .map_err(|e| AmuGuardError::InvalidInput(e.to_string()))?;

        db.insert_treatment(&treatment)?;
        Ok(treatment.treatment_id)
    }

    // =========================================================================
    // Risk
    // =========================================================================

    /// Tier of a dose against the reference catalog.
    pub fn classify_dose(&self, species: String, medicine: String, dose: f64, unit: String) -> String {
        DoseClassifier::new(&self.catalog)
            .classify(&species, &medicine, dose, &unit)
            .as_str()
            .to_string()
    }

    /// Assess a treatment and, when its safe date is after `today`, open its
    /// sample request.
    pub fn assess_treatment(
        &self,
        treatment_id: String,
        today: String,
    ) -> Result<FfiAssessment, AmuGuardError> {
        let today = parse_date_input(&today)?;
        let db = self.db.lock()?;
        self.with_alerts(|sink| {
            let assessment = RiskAssessor::new(&*db, &self.catalog, sink).assess(&treatment_id)?;
            let request = SampleCoordinator::new(&*db, &self.assigner, sink)
                .ensure_request(&assessment.record, today)?;
            Ok(FfiAssessment {
                created: assessment.created,
                record: assessment.record.into(),
                sample_request: request.map(|r| r.request.into()),
            })
        })
    }

    pub fn get_risk_record(&self, treatment_id: String) -> Result<Option<FfiRiskRecord>, AmuGuardError> {
        let db = self.db.lock()?;
        Ok(db.get_risk_record(&treatment_id)?.map(Into::into))
    }

    /// Records still inside their withdrawal period on `today`, soonest
    /// safe date first, optionally for one farmer.
    pub fn active_withdrawals(
        &self,
        today: String,
        farmer_id: Option<String>,
    ) -> Result<Vec<FfiRiskRecord>, AmuGuardError> {
        let today = parse_date_input(&today)?;
        let db = self.db.lock()?;
        Ok(db
            .list_active_withdrawals(today, farmer_id.as_deref())?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    // =========================================================================
    // Sample Compliance
    // =========================================================================

    pub fn sync_pending_requests(&self, today: String) -> Result<Vec<FfiSampleRequest>, AmuGuardError> {
        let today = parse_date_input(&today)?;
        let db = self.db.lock()?;
        self.with_alerts(|sink| {
            let opened =
                SampleCoordinator::new(&*db, &self.assigner, sink).sync_pending_requests(today)?;
            Ok(opened.into_iter().map(|e| e.request.into()).collect())
        })
    }

    pub fn unassigned_requests(&self) -> Result<Vec<FfiSampleRequest>, AmuGuardError> {
        let db = self.db.lock()?;
        self.with_alerts(|sink| {
            let requests = SampleCoordinator::new(&*db, &self.assigner, sink).unassigned_requests()?;
            Ok(requests.into_iter().map(Into::into).collect())
        })
    }

    pub fn assign_laboratory(
        &self,
        request_id: String,
        lab_id: String,
    ) -> Result<FfiSampleRequest, AmuGuardError> {
        let db = self.db.lock()?;
        self.with_alerts(|sink| {
            let request = SampleCoordinator::new(&*db, &self.assigner, sink)
                .assign_manually(&request_id, &lab_id)?;
            Ok(request.into())
        })
    }

    pub fn collect_sample(
        &self,
        request_id: String,
        sample_type: String,
        collected_on: String,
        lab_id: String,
        remarks: Option<String>,
    ) -> Result<FfiSample, AmuGuardError> {
        let input = CollectionInput {
            sample_type,
            collected_on: parse_date_input(&collected_on)?,
            lab_id,
            remarks,
        };
        let db = self.db.lock()?;
        self.with_alerts(|sink| {
            let sample = SampleCoordinator::new(&*db, &self.assigner, sink)
                .collect_sample(&request_id, input)?;
            Ok(sample.into())
        })
    }

    pub fn record_test_result(
        &self,
        sample_id: String,
        input: FfiTestInput,
    ) -> Result<FfiTestOutcome, AmuGuardError> {
        let final_status = RiskCategory::parse(&input.final_status).ok_or_else(|| {
            AmuGuardError::InvalidInput(format!("unknown verdict: {}", input.final_status))
        })?;
        let report = TestReportInput {
            detected_residue: input.detected_residue,
            mrl_limit: input.mrl_limit,
            final_status,
            withdrawal_days_remaining: input.withdrawal_days_remaining,
            tested_on: parse_date_input(&input.tested_on)?,
            remarks: input.remarks,
            certificate_ref: input.certificate_ref,
        };
        let db = self.db.lock()?;
        self.with_alerts(|sink| {
            let outcome =
                SampleCoordinator::new(&*db, &self.assigner, sink).record_test(&sample_id, report)?;
            Ok(outcome.into())
        })
    }

    pub fn complete_request(&self, request_id: String) -> Result<FfiSampleRequest, AmuGuardError> {
        let db = self.db.lock()?;
        self.with_alerts(|sink| {
            let request = SampleCoordinator::new(&*db, &self.assigner, sink).complete(&request_id)?;
            Ok(request.into())
        })
    }

    /// Requests ready for collection on `today` (`YYYY-MM-DD`).
    pub fn due_for_collection(&self, today: String) -> Result<Vec<FfiSampleRequest>, AmuGuardError> {
        let today = parse_date_input(&today)?;
        let db = self.db.lock()?;
        self.with_alerts(|sink| {
            let due = SampleCoordinator::new(&*db, &self.assigner, sink).due_for_collection(today)?;
            Ok(due.into_iter().map(Into::into).collect())
        })
    }

    /// Requests past the configured grace period.
    pub fn overdue_collections(&self, today: String) -> Result<Vec<FfiSampleRequest>, AmuGuardError> {
        let today = parse_date_input(&today)?;
        let db = self.db.lock()?;
        self.with_alerts(|sink| {
            let overdue = SampleCoordinator::new(&*db, &self.assigner, sink)
                .overdue_collections(today, self.config.compliance.overdue_grace_days)?;
            Ok(overdue.into_iter().map(|o| o.request.into()).collect())
        })
    }

    pub fn lab_statistics(&self, lab_id: String) -> Result<FfiLabStatistics, AmuGuardError> {
        let db = self.db.lock()?;
        self.with_alerts(|sink| {
            let stats = SampleCoordinator::new(&*db, &self.assigner, sink).lab_statistics(&lab_id)?;
            Ok(stats.into())
        })
    }

    /// Assessed treatments without a request yet, optionally for one lab.
    pub fn incoming_cases(
        &self,
        lab_id: Option<String>,
        today: String,
    ) -> Result<Vec<FfiIncomingCase>, AmuGuardError> {
        let today = parse_date_input(&today)?;
        let db = self.db.lock()?;
        self.with_alerts(|sink| {
            let cases = SampleCoordinator::new(&*db, &self.assigner, sink)
                .incoming_cases(lab_id.as_deref(), today)?;
            Ok(cases.into_iter().map(Into::into).collect())
        })
    }

    // =========================================================================
    // Biomass and Feed
    // =========================================================================

    /// Biomass grouped by `species`, `farm`, `month`, `state` or `district`.
    pub fn biomass_report(
        &self,
        grouping: String,
        filter: FfiBiomassFilter,
    ) -> Result<FfiBiomassReport, AmuGuardError> {
        let grouping = BiomassGrouping::parse(&grouping)
            .ok_or_else(|| AmuGuardError::InvalidInput(format!("unknown grouping: {}", grouping)))?;
        let filter = BiomassFilter {
            from: filter.from.as_deref().map(parse_date_input).transpose()?,
            to: filter.to.as_deref().map(parse_date_input).transpose()?,
            state: filter.state,
            district: filter.district,
            species: filter.species,
        };
        let db = self.db.lock()?;
        let report = BiomassAggregator::from_config(&self.config.biomass)
            .report(&*db, &filter, grouping)?;
        Ok(report.into())
    }

    pub fn upsert_feed_score(
        &self,
        species: String,
        feed_item: String,
        fni: f64,
    ) -> Result<(), AmuGuardError> {
        if !fni.is_finite() {
            return Err(AmuGuardError::InvalidInput(format!("FNI must be a number, got {}", fni)));
        }
        let db = self.db.lock()?;
        db.upsert_feed_score(&FeedScore {
            species,
            feed_item,
            fni,
        })?;
        Ok(())
    }

    pub fn submit_feed(
        &self,
        farmer_id: String,
        species: String,
        feeds: Vec<FfiFeedInclusion>,
    ) -> Result<FfiFeedSummary, AmuGuardError> {
        let submission = FeedSubmission {
            farmer_id,
            species,
            feeds: feeds.into_iter().map(Into::into).collect(),
        };
        let scorer = FeedRiskScorer::from_config(&self.config.feed);
        let db = self.db.lock()?;
        let assessment = FeedRiskService::new(&*db, &scorer).submit(&submission)?;
        Ok(assessment.summary.into())
    }

    pub fn latest_feed_summaries(
        &self,
        farmer_id: String,
        limit: u32,
    ) -> Result<Vec<FfiFeedSummary>, AmuGuardError> {
        let db = self.db.lock()?;
        let summaries = db.latest_feed_summaries(&farmer_id, limit)?;
        Ok(summaries.into_iter().map(Into::into).collect())
    }

    pub fn feed_risk_statistics(&self) -> Result<FfiFeedStatistics, AmuGuardError> {
        let db = self.db.lock()?;
        Ok(db.feed_risk_statistics()?.into())
    }

    // =========================================================================
    // Alerts and Export
    // =========================================================================

    /// Take every alert raised since the last call.
    pub fn drain_alerts(&self) -> Vec<FfiAlert> {
        self.alerts.drain().into_iter().map(Into::into).collect()
    }

    pub fn export_compliance_json(&self) -> Result<String, AmuGuardError> {
        let db = self.db.lock()?;
        let exporter = export::ComplianceExporter::new(&db);
        let batch = exporter.export_all()?;
        Ok(batch.to_json()?)
    }

    pub fn export_compliance_csv(&self) -> Result<String, AmuGuardError> {
        let db = self.db.lock()?;
        let exporter = export::ComplianceExporter::new(&db);
        let batch = exporter.export_all()?;
        Ok(batch.to_csv())
    }
}

fn parse_date_input(s: &str) -> Result<NaiveDate, AmuGuardError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| AmuGuardError::InvalidInput(format!("invalid date '{}': {}", s, e)))
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe location. Coordinates count only when both are present.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLocation {
    pub state: Option<String>,
    pub district: Option<String>,
    pub taluk: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl From<FfiLocation> for Location {
    fn from(loc: FfiLocation) -> Self {
        Location {
            state: loc.state,
            district: loc.district,
            taluk: loc.taluk,
            coordinates: match (loc.latitude, loc.longitude) {
                (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
                _ => None,
            },
        }
    }
}

impl From<Location> for FfiLocation {
    fn from(loc: Location) -> Self {
        Self {
            state: loc.state,
            district: loc.district,
            taluk: loc.taluk,
            latitude: loc.coordinates.map(|c| c.latitude),
            longitude: loc.coordinates.map(|c| c.longitude),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFarm {
    pub farm_id: String,
    pub farmer_id: Option<String>,
    pub name: String,
    pub location: FfiLocation,
}

impl From<Farm> for FfiFarm {
    fn from(farm: Farm) -> Self {
        Self {
            farm_id: farm.farm_id,
            farmer_id: farm.farmer_id,
            name: farm.name,
            location: farm.location.into(),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewEntity {
    pub farm_id: String,
    pub species: String,
    /// `meat`, `milk` or `egg`
    pub product_matrix: String,
    pub population_count: u32,
    pub weight_kg: Option<f64>,
    pub tag_id: Option<String>,
    pub batch_name: Option<String>,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEntity {
    pub entity_id: String,
    pub farm_id: String,
    pub species: String,
    pub product_matrix: String,
    pub population_count: u32,
    pub weight_kg: Option<f64>,
    pub tag_id: Option<String>,
    pub batch_name: Option<String>,
}

impl From<Entity> for FfiEntity {
    fn from(entity: Entity) -> Self {
        Self {
            entity_id: entity.entity_id,
            farm_id: entity.farm_id,
            species: entity.species,
            product_matrix: entity.product_matrix.as_str().to_string(),
            population_count: entity.population_count,
            weight_kg: entity.weight_kg,
            tag_id: entity.tag_id,
            batch_name: entity.batch_name,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLaboratory {
    pub lab_id: String,
    pub name: String,
    pub location: FfiLocation,
}

impl From<Laboratory> for FfiLaboratory {
    fn from(lab: Laboratory) -> Self {
        Self {
            lab_id: lab.lab_id,
            name: lab.name,
            location: lab.location.into(),
        }
    }
}

/// FFI-safe treatment input. Dates are `YYYY-MM-DD`.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewTreatment {
    pub entity_id: String,
    pub medicine: String,
    pub category: Option<String>,
    pub dose_amount: f64,
    pub dose_unit: String,
    pub route: Option<String>,
    pub frequency_per_day: u32,
    pub duration_days: u32,
    pub start_date: String,
    pub is_vaccine: bool,
    pub body_weight_kg: Option<f64>,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTissueResidue {
    pub tissue: String,
    pub predicted_residue: f64,
    pub base_mrl: f64,
    pub risk_percent: f64,
    pub category: String,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRiskRecord {
    pub record_id: String,
    pub treatment_id: String,
    pub entity_id: String,
    pub matrix: String,
    pub dose_tier: String,
    pub overdosage: bool,
    pub withdrawal_exempt: bool,
    pub tissues: Vec<FfiTissueResidue>,
    pub worst_tissue: Option<String>,
    pub risk_percent: Option<f64>,
    pub risk_category: Option<String>,
    pub withdrawal_days: Option<u32>,
    pub end_date: String,
    pub safe_date: Option<String>,
    pub model_version: String,
    pub record_hash: String,
}

impl From<AmuRiskRecord> for FfiRiskRecord {
    fn from(record: AmuRiskRecord) -> Self {
        Self {
            record_id: record.record_id,
            treatment_id: record.treatment_id,
            entity_id: record.entity_id,
            matrix: record.matrix.as_str().to_string(),
            dose_tier: record.dose_tier.as_str().to_string(),
            overdosage: record.overdosage,
            withdrawal_exempt: record.withdrawal_exempt,
            tissues: record
                .tissues
                .into_iter()
                .map(|t| FfiTissueResidue {
                    tissue: t.tissue,
                    predicted_residue: t.predicted_residue,
                    base_mrl: t.base_mrl,
                    risk_percent: t.risk_percent,
                    category: t.category.as_str().to_string(),
                })
                .collect(),
            worst_tissue: record.worst_tissue,
            risk_percent: record.risk_percent,
            risk_category: record.risk_category.map(|c| c.as_str().to_string()),
            withdrawal_days: record.withdrawal_days,
            end_date: record.end_date.to_string(),
            safe_date: record.safe_date.map(|d| d.to_string()),
            model_version: record.model_version,
            record_hash: record.record_hash,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSampleRequest {
    pub request_id: String,
    pub treatment_id: String,
    pub entity_id: String,
    pub farm_id: String,
    pub assigned_lab_id: Option<String>,
    pub assignment_method: Option<String>,
    pub distance_km: Option<f64>,
    pub safe_date: String,
    pub status: String,
}

impl From<SampleRequest> for FfiSampleRequest {
    fn from(request: SampleRequest) -> Self {
        Self {
            request_id: request.request_id,
            treatment_id: request.treatment_id,
            entity_id: request.entity_id,
            farm_id: request.farm_id,
            assigned_lab_id: request.assigned_lab_id,
            assignment_method: request.assignment_method.map(|m| m.as_str().to_string()),
            distance_km: request.distance_km,
            safe_date: request.safe_date.to_string(),
            status: request.status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAssessment {
    pub record: FfiRiskRecord,
    /// False when the treatment had already been assessed
    pub created: bool,
    /// `None` when the record has no safe date
    pub sample_request: Option<FfiSampleRequest>,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSample {
    pub sample_id: String,
    pub request_id: String,
    pub sample_type: String,
    pub collected_on: String,
    pub collected_by_lab_id: String,
    pub remarks: Option<String>,
}

impl From<Sample> for FfiSample {
    fn from(sample: Sample) -> Self {
        Self {
            sample_id: sample.sample_id,
            request_id: sample.request_id,
            sample_type: sample.sample_type,
            collected_on: sample.collected_on.to_string(),
            collected_by_lab_id: sample.collected_by_lab_id,
            remarks: sample.remarks,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTestInput {
    pub detected_residue: f64,
    pub mrl_limit: f64,
    /// `safe`, `borderline` or `unsafe`
    pub final_status: String,
    pub withdrawal_days_remaining: u32,
    pub tested_on: String,
    pub remarks: Option<String>,
    pub certificate_ref: Option<String>,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTestOutcome {
    pub report_id: String,
    pub request_id: String,
    pub final_status: String,
    pub predicted_category: Option<String>,
    pub prediction_mismatch: bool,
}

impl From<TestOutcome> for FfiTestOutcome {
    fn from(outcome: TestOutcome) -> Self {
        Self {
            report_id: outcome.report.report_id,
            request_id: outcome.report.request_id,
            final_status: outcome.report.final_status.as_str().to_string(),
            predicted_category: outcome.predicted_category.map(|c| c.as_str().to_string()),
            prediction_mismatch: outcome.prediction_mismatch,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLabStatistics {
    pub lab_id: String,
    pub requested: u32,
    pub collected: u32,
    pub tested: u32,
    pub completed: u32,
}

impl From<LabStatistics> for FfiLabStatistics {
    fn from(stats: LabStatistics) -> Self {
        Self {
            lab_id: stats.lab_id,
            requested: stats.requested,
            collected: stats.collected,
            tested: stats.tested,
            completed: stats.completed,
        }
    }
}

#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiBiomassFilter {
    pub from: Option<String>,
    pub to: Option<String>,
    pub state: Option<String>,
    pub district: Option<String>,
    pub species: Option<String>,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBiomassRow {
    pub key: String,
    pub treatment_count: u32,
    pub biomass_kg: f64,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBiomassReport {
    pub grouping: String,
    pub rows: Vec<FfiBiomassRow>,
    pub total_biomass_kg: f64,
    pub treatment_count: u32,
    pub distinct_farms: u32,
    pub mean_weight_kg: Option<f64>,
    pub skipped_treatments: Vec<String>,
}

impl From<BiomassReport> for FfiBiomassReport {
    fn from(report: BiomassReport) -> Self {
        Self {
            grouping: report.grouping.as_str().to_string(),
            rows: report
                .rows
                .into_iter()
                .map(|r| FfiBiomassRow {
                    key: r.key,
                    treatment_count: r.treatment_count,
                    biomass_kg: r.biomass_kg,
                })
                .collect(),
            total_biomass_kg: report.total_biomass_kg,
            treatment_count: report.treatment_count,
            distinct_farms: report.distinct_farms,
            mean_weight_kg: report.mean_weight_kg,
            skipped_treatments: report.skipped_treatments,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFeedInclusion {
    pub feed_item: String,
    pub inclusion_rate: f64,
}

impl From<FfiFeedInclusion> for FeedInclusion {
    fn from(feed: FfiFeedInclusion) -> Self {
        FeedInclusion {
            feed_item: feed.feed_item,
            inclusion_rate: feed.inclusion_rate,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFeedSummary {
    pub summary_id: String,
    pub farmer_id: String,
    pub species: String,
    pub daily_fni: f64,
    pub health_risk: f64,
    pub amu_risk: f64,
    pub risk_level: String,
    pub created_at: String,
}

impl From<FeedRiskSummary> for FfiFeedSummary {
    fn from(summary: FeedRiskSummary) -> Self {
        Self {
            summary_id: summary.summary_id,
            farmer_id: summary.farmer_id,
            species: summary.species,
            daily_fni: summary.daily_fni,
            health_risk: summary.health_risk,
            amu_risk: summary.amu_risk,
            risk_level: summary.risk_level.as_str().to_string(),
            created_at: summary.created_at,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLevelCount {
    pub level: String,
    pub count: u32,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFarmerFeedRisk {
    pub farmer_id: String,
    pub species: String,
    pub amu_risk: f64,
    pub risk_level: String,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFeedStatistics {
    pub total_assessments: u32,
    pub level_counts: Vec<FfiLevelCount>,
    pub mean_daily_fni: Option<f64>,
    pub mean_amu_risk: Option<f64>,
    pub highest_risk_farmers: Vec<FfiFarmerFeedRisk>,
}

impl From<FeedRiskStatistics> for FfiFeedStatistics {
    fn from(stats: FeedRiskStatistics) -> Self {
        Self {
            total_assessments: stats.total_assessments,
            level_counts: stats
                .level_counts
                .into_iter()
                .map(|(level, count)| FfiLevelCount {
                    level: level.as_str().to_string(),
                    count,
                })
                .collect(),
            mean_daily_fni: stats.mean_daily_fni,
            mean_amu_risk: stats.mean_amu_risk,
            highest_risk_farmers: stats
                .highest_risk_farmers
                .into_iter()
                .map(|f| FfiFarmerFeedRisk {
                    farmer_id: f.farmer_id,
                    species: f.species,
                    amu_risk: f.amu_risk,
                    risk_level: f.risk_level.as_str().to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiIncomingCase {
    pub treatment_id: String,
    pub entity_id: String,
    pub farm_id: String,
    pub safe_date: String,
    pub lab_id: Option<String>,
    pub lab_name: Option<String>,
    pub distance_km: Option<f64>,
}

impl From<IncomingCase> for FfiIncomingCase {
    fn from(case: IncomingCase) -> Self {
        let (lab_id, lab_name, distance_km) = match case.lab {
            Some(m) => (Some(m.lab_id), Some(m.lab_name), m.distance_km),
            None => (None, None, None),
        };
        Self {
            treatment_id: case.treatment_id,
            entity_id: case.entity_id,
            farm_id: case.farm_id,
            safe_date: case.safe_date.to_string(),
            lab_id,
            lab_name,
            distance_km,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAlert {
    pub kind: String,
    pub message: String,
    pub treatment_id: Option<String>,
    pub entity_id: Option<String>,
    pub raised_at: String,
}

impl From<AlertEvent> for FfiAlert {
    fn from(event: AlertEvent) -> Self {
        Self {
            kind: event.kind.as_str().to_string(),
            message: event.message,
            treatment_id: event.treatment_id,
            entity_id: event.entity_id,
            raised_at: event.raised_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(district: &str) -> FfiLocation {
        FfiLocation {
            state: Some("Karnataka".into()),
            district: Some(district.into()),
            taluk: None,
            latitude: None,
            longitude: None,
        }
    }

    fn treatment_input(entity_id: &str, medicine: &str, dose: f64) -> FfiNewTreatment {
        FfiNewTreatment {
            entity_id: entity_id.into(),
            medicine: medicine.into(),
            category: Some("antibiotic".into()),
            dose_amount: dose,
            dose_unit: "mg/kg".into(),
            route: Some("IM".into()),
            frequency_per_day: 1,
            duration_days: 3,
            start_date: "2024-01-01".into(),
            is_vaccine: false,
            body_weight_kg: None,
        }
    }

    #[test]
    fn test_facade_end_to_end() {
        let core = open_database_in_memory().unwrap();
        let farm = core
            .register_farm("Farm".into(), Some("farmer-1".into()), location("Mandya"))
            .unwrap();
        let lab = core.register_laboratory("Lab".into(), location("Mandya")).unwrap();
        let entity = core
            .register_entity(FfiNewEntity {
                farm_id: farm.farm_id.clone(),
                species: "cattle".into(),
                product_matrix: "meat".into(),
                population_count: 1,
                weight_kg: Some(400.0),
                tag_id: Some("TAG-1".into()),
                batch_name: None,
            })
            .unwrap();

        let treatment_id = core
            .record_treatment(treatment_input(&entity.entity_id, "Oxytetracycline", 20.0))
            .unwrap();
        let assessment = core
            .assess_treatment(treatment_id.clone(), "2024-01-02".into())
            .unwrap();
        assert!(assessment.created);
        assert_eq!(assessment.record.risk_category.as_deref(), Some("unsafe"));
        let request = assessment.sample_request.unwrap();
        assert_eq!(request.assigned_lab_id.as_deref(), Some(lab.lab_id.as_str()));
        assert_eq!(request.safe_date, "2024-01-05");

        let alerts = core.drain_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, "unsafe_mrl");

        let sample = core
            .collect_sample(
                request.request_id.clone(),
                "meat".into(),
                "2024-01-05".into(),
                lab.lab_id.clone(),
                None,
            )
            .unwrap();
        let outcome = core
            .record_test_result(
                sample.sample_id,
                FfiTestInput {
                    detected_residue: 150.0,
                    mrl_limit: 200.0,
                    final_status: "safe".into(),
                    withdrawal_days_remaining: 0,
                    tested_on: "2024-01-07".into(),
                    remarks: None,
                    certificate_ref: None,
                },
            )
            .unwrap();
        assert!(outcome.prediction_mismatch);
        let done = core.complete_request(request.request_id).unwrap();
        assert_eq!(done.status, "completed");

        let report = core
            .biomass_report("species".into(), FfiBiomassFilter::default())
            .unwrap();
        // 20 × 3 × 1 × 400 / 1000
        assert!((report.total_biomass_kg - 24.0).abs() < 1e-9);

        let csv = core.export_compliance_csv().unwrap();
        assert!(csv.contains(&treatment_id));
        assert!(core.export_compliance_json().unwrap().contains("\"hash_verified\": true"));
    }

    #[test]
    fn test_facade_rejects_bad_input() {
        let core = open_database_in_memory().unwrap();
        assert_eq!(
            core.classify_dose("cattle".into(), "Enrofloxacin".into(), 5.0, "ml".into()),
            "unknown"
        );
        assert!(matches!(
            core.record_treatment(treatment_input("missing", "Enrofloxacin", 5.0)),
            Err(AmuGuardError::NotFound(_))
        ));
        assert!(matches!(
            core.biomass_report("weekly".into(), FfiBiomassFilter::default()),
            Err(AmuGuardError::InvalidInput(_))
        ));
        assert!(matches!(
            core.due_for_collection("05/01/2024".into()),
            Err(AmuGuardError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_facade_rejects_unprojectable_treatments() {
        let core = open_database_in_memory().unwrap();
        let farm = core
            .register_farm("Farm".into(), None, location("Mandya"))
            .unwrap();
        let entity = core
            .register_entity(FfiNewEntity {
                farm_id: farm.farm_id,
                species: "cattle".into(),
                product_matrix: "meat".into(),
                population_count: 1,
                weight_kg: None,
                tag_id: None,
                batch_name: None,
            })
            .unwrap();

        let mut endless = treatment_input(&entity.entity_id, "Oxytetracycline", 20.0);
        endless.duration_days = 200_000_000;
        assert!(matches!(
            core.record_treatment(endless),
            Err(AmuGuardError::InvalidInput(_))
        ));
        for dose in [f64::INFINITY, f64::NAN, -1.0] {
            assert!(matches!(
                core.record_treatment(treatment_input(&entity.entity_id, "Oxytetracycline", dose)),
                Err(AmuGuardError::InvalidInput(_))
            ));
        }
        let mut hourly = treatment_input(&entity.entity_id, "Oxytetracycline", 20.0);
        hourly.frequency_per_day = 25;
        assert!(matches!(
            core.record_treatment(hourly),
            Err(AmuGuardError::InvalidInput(_))
        ));

        // The lock is still healthy after the rejections
        core.register_laboratory("Lab".into(), location("Mandya")).unwrap();
        let treatment_id = core
            .record_treatment(treatment_input(&entity.entity_id, "Oxytetracycline", 20.0))
            .unwrap();
        assert!(core.assess_treatment(treatment_id, "2024-01-02".into()).is_ok());
    }

    #[test]
    fn test_facade_elapsed_withdrawal_opens_no_request() {
        let core = open_database_in_memory().unwrap();
        let farm = core
            .register_farm("Farm".into(), Some("farmer-9".into()), location("Mandya"))
            .unwrap();
        core.register_laboratory("Lab".into(), location("Mandya")).unwrap();
        let entity = core
            .register_entity(FfiNewEntity {
                farm_id: farm.farm_id,
                species: "cattle".into(),
                product_matrix: "meat".into(),
                population_count: 1,
                weight_kg: None,
                tag_id: None,
                batch_name: None,
            })
            .unwrap();
        let treatment_id = core
            .record_treatment(treatment_input(&entity.entity_id, "Oxytetracycline", 20.0))
            .unwrap();

        // Safe date 2024-01-05
        let assessment = core
            .assess_treatment(treatment_id.clone(), "2024-01-05".into())
            .unwrap();
        assert_eq!(assessment.record.safe_date.as_deref(), Some("2024-01-05"));
        assert!(assessment.sample_request.is_none());
        assert!(core.sync_pending_requests("2024-01-06".into()).unwrap().is_empty());
        assert!(core.incoming_cases(None, "2024-01-05".into()).unwrap().is_empty());

        assert_eq!(core.active_withdrawals("2024-01-04".into(), None).unwrap().len(), 1);
        assert_eq!(
            core.active_withdrawals("2024-01-04".into(), Some("farmer-9".into()))
                .unwrap()
                .len(),
            1
        );
        assert!(core
            .active_withdrawals("2024-01-04".into(), Some("farmer-1".into()))
            .unwrap()
            .is_empty());
        assert!(core.active_withdrawals("2024-01-05".into(), None).unwrap().is_empty());
        assert!(matches!(
            core.active_withdrawals("soon".into(), None),
            Err(AmuGuardError::InvalidInput(_))
        ));

        let opened = core.sync_pending_requests("2024-01-04".into()).unwrap();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].treatment_id, treatment_id);
    }

    #[test]
    fn test_facade_feed_submission() {
        let core = open_database_in_memory().unwrap();
        core.upsert_feed_score("poultry".into(), "layer mash".into(), 0.7).unwrap();
        let summary = core
            .submit_feed(
                "farmer-1".into(),
                "poultry".into(),
                vec![FfiFeedInclusion {
                    feed_item: "layer mash".into(),
                    inclusion_rate: 1.0,
                }],
            )
            .unwrap();
        // (1 - 0.7) × 0.65 = 0.195
        assert_eq!(summary.risk_level, "low");
        assert_eq!(core.latest_feed_summaries("farmer-1".into(), 5).unwrap().len(), 1);
    }
}
