//! End-to-end pipeline tests over an in-memory database.

use amu_guard_core::alerts::MemoryAlertSink;
use amu_guard_core::biomass::{BiomassAggregator, BiomassFilter, BiomassGrouping};
use amu_guard_core::catalog::ReferenceCatalog;
use amu_guard_core::compliance::{
    CollectionInput, ComplianceError, LabAssigner, SampleCoordinator, TestReportInput,
};
use amu_guard_core::config::BiomassConfig;
use amu_guard_core::db::{Database, DbError};
use amu_guard_core::export::ComplianceExporter;
use amu_guard_core::models::{
    AlertKind, AssignmentMethod, DoseTier, Entity, Farm, GeoPoint, Laboratory, Location,
    MedicineCategory, ProductMatrix, RiskCategory, SampleStatus, Treatment,
};
use amu_guard_core::risk::RiskAssessor;
use chrono::NaiveDate;

const ORIGIN: (f64, f64) = (12.5222, 76.8951);

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn location(district: &str, lat_offset: Option<f64>) -> Location {
    Location {
        state: Some("Karnataka".into()),
        district: Some(district.into()),
        taluk: None,
        coordinates: lat_offset.map(|o| GeoPoint::new(ORIGIN.0 + o, ORIGIN.1)),
    }
}

struct Fixture {
    db: Database,
    catalog: ReferenceCatalog,
    assigner: LabAssigner,
    alerts: MemoryAlertSink,
    farm: Farm,
}

impl Fixture {
    fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let mut farm = Farm::new("Hosahalli Dairy".into(), location("Mandya", Some(0.0)));
        farm.farmer_id = Some("farmer-7".into());
        db.insert_farm(&farm).unwrap();
        Self {
            db,
            catalog: ReferenceCatalog::builtin().unwrap(),
            assigner: LabAssigner::default(),
            alerts: MemoryAlertSink::new(),
            farm,
        }
    }

    fn lab(&self, name: &str, loc: Location) -> Laboratory {
        let lab = Laboratory::new(name.into(), loc);
        self.db.insert_laboratory(&lab).unwrap();
        lab
    }

    fn entity(&self, species: &str, matrix: ProductMatrix, population: u32, weight: Option<f64>) -> Entity {
        let mut entity = Entity::new(self.farm.farm_id.clone(), species.into(), matrix);
        entity.population_count = population;
        entity.weight_kg = weight;
        self.db.insert_entity(&entity).unwrap();
        entity
    }

    fn treat(&self, entity: &Entity, medicine: &str, dose: f64, unit: &str, days: u32, start: &str) -> Treatment {
        let mut treatment = Treatment::new(
            entity.entity_id.clone(),
            entity.farm_id.clone(),
            entity.species.clone(),
            medicine.into(),
            dose,
            unit.into(),
            date(start),
        );
        treatment.category = MedicineCategory::Antibiotic;
        treatment.duration_days = days;
        self.db.insert_treatment(&treatment).unwrap();
        treatment
    }

    fn assessor(&self) -> RiskAssessor<'_, Database> {
        RiskAssessor::new(&self.db, &self.catalog, &self.alerts)
    }

    fn coordinator(&self) -> SampleCoordinator<'_, Database> {
        SampleCoordinator::new(&self.db, &self.assigner, &self.alerts)
    }
}

fn report(status: RiskCategory, tested_on: &str) -> TestReportInput {
    TestReportInput {
        detected_residue: 180.0,
        mrl_limit: 200.0,
        final_status: status,
        withdrawal_days_remaining: 0,
        tested_on: date(tested_on),
        remarks: Some("LC-MS/MS".into()),
        certificate_ref: Some("CERT-0042".into()),
    }
}

#[test]
fn test_treatment_to_completed_request() {
    let fx = Fixture::new();
    // ~50 km and ~210 km north of the farm
    let near = fx.lab("Mandya Residue Lab", location("Mandya", Some(0.45)));
    fx.lab("Tumakuru Lab", location("Tumakuru", Some(1.89)));
    let cow = fx.entity("cattle", ProductMatrix::Meat, 1, Some(380.0));
    let treatment = fx.treat(&cow, "Oxytetracycline", 20.0, "mg/kg", 3, "2024-01-01");

    let assessment = fx.assessor().assess(&treatment.treatment_id).unwrap();
    let record = assessment.record;
    assert_eq!(record.dose_tier, DoseTier::Safe);
    assert_eq!(record.risk_category, Some(RiskCategory::Unsafe));
    assert_eq!(record.worst_tissue.as_deref(), Some("muscle"));
    assert_eq!(record.safe_date, Some(date("2024-01-05")));
    assert!(record.verify_hash());

    let coordinator = fx.coordinator();
    let ensured = coordinator
        .ensure_request(&record, date("2024-01-02"))
        .unwrap()
        .unwrap();
    assert!(ensured.created);
    let request = ensured.request;
    assert_eq!(request.assigned_lab_id.as_deref(), Some(near.lab_id.as_str()));
    assert_eq!(request.assignment_method, Some(AssignmentMethod::Nearest));
    assert_eq!(request.farmer_id.as_deref(), Some("farmer-7"));

    assert!(coordinator.due_for_collection(date("2024-01-04")).unwrap().is_empty());
    let due = coordinator.due_for_collection(date("2024-01-05")).unwrap();
    assert_eq!(due.len(), 1);

    let sample = coordinator
        .collect_sample(
            &request.request_id,
            CollectionInput {
                sample_type: "muscle biopsy".into(),
                collected_on: date("2024-01-05"),
                lab_id: near.lab_id.clone(),
                remarks: None,
            },
        )
        .unwrap();
    let outcome = coordinator
        .record_test(&sample.sample_id, report(RiskCategory::Unsafe, "2024-01-08"))
        .unwrap();
    assert!(!outcome.prediction_mismatch);
    let done = coordinator.complete(&request.request_id).unwrap();
    assert_eq!(done.status, SampleStatus::Completed);

    let kinds: Vec<AlertKind> = fx.alerts.drain().into_iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![AlertKind::UnsafeMrl, AlertKind::SafeDateReached, AlertKind::UnsafeMrl]
    );

    let stats = coordinator.lab_statistics(&near.lab_id).unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.total(), 1);

    let export = ComplianceExporter::new(&fx.db).export_all().unwrap();
    assert_eq!(export.metadata.record_count, 1);
    assert_eq!(export.metadata.tested_count, 1);
    assert_eq!(export.metadata.mismatch_count, 0);
    assert_eq!(export.metadata.tampered_count, 0);
    let entry = &export.entries[0];
    assert_eq!(entry.request_status, Some(SampleStatus::Completed));
    assert_eq!(entry.certificate_ref.as_deref(), Some("CERT-0042"));
    assert!(entry.hash_verified);
}

#[test]
fn test_reassessment_is_idempotent() {
    let fx = Fixture::new();
    fx.lab("Lab", location("Mandya", None));
    let cow = fx.entity("cattle", ProductMatrix::Meat, 1, None);
    let treatment = fx.treat(&cow, "Oxytetracycline", 35.0, "mg/kg", 3, "2024-02-01");

    let first = fx.assessor().assess(&treatment.treatment_id).unwrap();
    let second = fx.assessor().assess(&treatment.treatment_id).unwrap();
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.record.record_id, second.record.record_id);
    assert_eq!(first.record.record_hash, second.record.record_hash);
    assert_eq!(fx.alerts.len(), 2);

    let coordinator = fx.coordinator();
    let a = coordinator.ensure_request(&first.record, date("2024-02-01")).unwrap().unwrap();
    let b = coordinator.ensure_request(&second.record, date("2024-02-01")).unwrap().unwrap();
    assert_eq!(a.request.request_id, b.request.request_id);
    assert!(!b.created);
}

#[test]
fn test_assessed_treatment_is_locked() {
    let fx = Fixture::new();
    let cow = fx.entity("cattle", ProductMatrix::Meat, 1, None);
    let mut treatment = fx.treat(&cow, "Enrofloxacin", 5.0, "mg/kg", 5, "2024-03-01");
    fx.assessor().assess(&treatment.treatment_id).unwrap();

    treatment.dose_amount = 9.0;
    assert!(matches!(
        fx.db.update_treatment(&treatment),
        Err(DbError::Immutable(_))
    ));
}

#[test]
fn test_enrofloxacin_at_safe_max() {
    let fx = Fixture::new();
    let cow = fx.entity("cattle", ProductMatrix::Meat, 1, None);
    let treatment = fx.treat(&cow, "Enrofloxacin", 5.0, "mg/kg", 5, "2024-03-01");
    let record = fx.assessor().assess(&treatment.treatment_id).unwrap().record;

    assert_eq!(record.dose_tier, DoseTier::Safe);
    let muscle = record.tissues.iter().find(|t| t.tissue == "muscle").unwrap();
    assert!(muscle.risk_percent < 100.0);
    let withdrawal = i64::from(record.withdrawal_days.unwrap());
    assert_eq!(
        record.safe_date,
        Some(date("2024-03-01") + chrono::Duration::days(5 + withdrawal))
    );
    assert!(fx.alerts.is_empty());
}

#[test]
fn test_overdosage_follows_tier_not_residue() {
    let fx = Fixture::new();
    let flock = fx.entity("poultry", ProductMatrix::Meat, 500, None);
    let mut treatment = Treatment::new(
        flock.entity_id.clone(),
        flock.farm_id.clone(),
        "poultry".into(),
        "Amoxicillin".into(),
        20.0,
        "mg/kg".into(),
        date("2024-04-01"),
    );
    treatment.route = Some("water".into());
    treatment.duration_days = 3;
    fx.db.insert_treatment(&treatment).unwrap();

    let record = fx.assessor().assess(&treatment.treatment_id).unwrap().record;
    assert_eq!(record.dose_tier, DoseTier::Moderate);
    assert!(!record.overdosage);
    assert_eq!(record.risk_category, Some(RiskCategory::Unsafe));

    let kinds: Vec<AlertKind> = fx.alerts.drain().into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![AlertKind::HighDosage, AlertKind::UnsafeMrl]);
}

#[test]
fn test_vaccine_is_exempt() {
    let fx = Fixture::new();
    let cow = fx.entity("cattle", ProductMatrix::Milk, 1, None);
    let mut treatment = fx.treat(&cow, "FMD Vaccine", 2.0, "ml", 1, "2024-05-10");
    treatment.category = MedicineCategory::Vaccine;
    treatment.is_vaccine = true;
    fx.db.update_treatment(&treatment).unwrap();

    let record = fx.assessor().assess(&treatment.treatment_id).unwrap().record;
    assert!(record.withdrawal_exempt);
    assert!(record.tissues.is_empty());
    assert_eq!(record.withdrawal_days, Some(0));
    assert_eq!(record.safe_date, Some(record.end_date));
    assert_eq!(record.risk_category, Some(RiskCategory::Safe));
}

#[test]
fn test_unassigned_request_then_manual_assignment() {
    let fx = Fixture::new();
    let cow = fx.entity("cattle", ProductMatrix::Meat, 1, None);
    let treatment = fx.treat(&cow, "Oxytetracycline", 20.0, "mg/kg", 3, "2024-01-01");
    fx.assessor().assess(&treatment.treatment_id).unwrap();

    let coordinator = fx.coordinator();
    let opened = coordinator.sync_pending_requests(date("2024-01-02")).unwrap();
    assert_eq!(opened.len(), 1);
    let request = &opened[0].request;
    assert!(request.assigned_lab_id.is_none());
    assert_eq!(coordinator.unassigned_requests().unwrap().len(), 1);
    assert!(coordinator.sync_pending_requests(date("2024-01-02")).unwrap().is_empty());

    let lab = fx.lab("Late Lab", location("Hassan", None));
    let assigned = coordinator
        .assign_manually(&request.request_id, &lab.lab_id)
        .unwrap();
    assert_eq!(assigned.assigned_lab_id.as_deref(), Some(lab.lab_id.as_str()));
    assert_eq!(assigned.assignment_method, Some(AssignmentMethod::Manual));
    assert!(matches!(
        coordinator.assign_manually(&request.request_id, &lab.lab_id),
        Err(ComplianceError::AlreadyAssigned(_))
    ));
    assert!(coordinator.unassigned_requests().unwrap().is_empty());
}

#[test]
fn test_skipping_collection_is_rejected() {
    let fx = Fixture::new();
    fx.lab("Lab", location("Mandya", None));
    let cow = fx.entity("cattle", ProductMatrix::Meat, 1, None);
    let treatment = fx.treat(&cow, "Oxytetracycline", 20.0, "mg/kg", 3, "2024-01-01");
    let record = fx.assessor().assess(&treatment.treatment_id).unwrap().record;
    let coordinator = fx.coordinator();
    let request = coordinator
        .ensure_request(&record, date("2024-01-02"))
        .unwrap()
        .unwrap()
        .request;

    assert!(matches!(
        coordinator.complete(&request.request_id),
        Err(ComplianceError::InvalidTransition(_))
    ));
    let stored = fx.db.get_sample_request(&request.request_id).unwrap().unwrap();
    assert_eq!(stored.status, SampleStatus::Requested);
}

#[test]
fn test_biomass_over_stored_treatments() {
    let fx = Fixture::new();
    let cow = fx.entity("cattle", ProductMatrix::Milk, 1, Some(400.0));
    let flock = fx.entity("poultry", ProductMatrix::Egg, 1000, None);
    fx.treat(&cow, "Oxytetracycline", 10.0, "mg/kg", 5, "2024-01-10");
    fx.treat(&flock, "Enrofloxacin", 10.0, "mg/kg", 5, "2024-02-03");
    fx.treat(&cow, "Enrofloxacin", 5.0, "mg/kg", 3, "2023-12-20");

    let aggregator = BiomassAggregator::from_config(&BiomassConfig::default());
    let filter = BiomassFilter::between(date("2024-01-01"), date("2024-12-31"));
    let report = aggregator
        .report(&fx.db, &filter, BiomassGrouping::Species)
        .unwrap();

    // cattle: 10 × 5 × 1 × 400 / 1000 = 20; poultry: 10 × 5 × 1000 × 2 / 1000 = 100
    assert_eq!(report.treatment_count, 2);
    assert_eq!(report.distinct_farms, 1);
    assert!((report.total_biomass_kg - 120.0).abs() < 1e-9);
    assert_eq!(report.rows[0].key, "poultry");
    assert_eq!(report.rows[1].key, "cattle");

    let by_month = aggregator
        .report(&fx.db, &BiomassFilter::default(), BiomassGrouping::Month)
        .unwrap();
    let keys: Vec<&str> = by_month.rows.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["2024-02", "2024-01", "2023-12"]);
}
