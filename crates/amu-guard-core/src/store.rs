//! Repository traits injected into the pipeline components.
//!
//! [`crate::db::Database`] implements all of them; tests can substitute
//! their own stores.

use crate::biomass::{BiomassFilter, BiomassInput};
use crate::db::DbResult;
use crate::models::{
    AmuRiskRecord, Entity, Farm, FeedEntry, FeedRiskSummary, FeedScore, LabTestReport, Laboratory,
    Sample, SampleRequest, SampleStatus, Treatment,
};

pub trait TreatmentStore {
    fn get_treatment(&self, treatment_id: &str) -> DbResult<Option<Treatment>>;
    fn get_entity(&self, entity_id: &str) -> DbResult<Option<Entity>>;
    fn get_farm(&self, farm_id: &str) -> DbResult<Option<Farm>>;
}

/// Write-once storage of AMU risk records.
pub trait RiskRecordStore {
    /// Insert a record. A second record for the same treatment is a `Conflict`.
    fn insert_risk_record(&self, record: &AmuRiskRecord) -> DbResult<()>;
    fn get_risk_record(&self, treatment_id: &str) -> DbResult<Option<AmuRiskRecord>>;
    /// Records with a safe date and no sample request yet.
    fn list_records_without_request(&self) -> DbResult<Vec<AmuRiskRecord>>;
}

pub trait LaboratoryStore {
    /// All laboratories in creation order.
    fn list_laboratories(&self) -> DbResult<Vec<Laboratory>>;
    fn get_laboratory(&self, lab_id: &str) -> DbResult<Option<Laboratory>>;
}

/// Sample request lifecycle storage. Status writes are compare-and-set.
pub trait SampleStore {
    /// Insert a request. A second request for the same treatment is a `Conflict`.
    fn insert_sample_request(&self, request: &SampleRequest) -> DbResult<()>;
    fn get_sample_request(&self, request_id: &str) -> DbResult<Option<SampleRequest>>;
    fn get_sample_request_for_treatment(&self, treatment_id: &str)
        -> DbResult<Option<SampleRequest>>;
    fn list_sample_requests(&self, status: Option<SampleStatus>) -> DbResult<Vec<SampleRequest>>;
    fn list_requests_for_lab(&self, lab_id: &str) -> DbResult<Vec<SampleRequest>>;
    /// `requested` rows with no laboratory, oldest first.
    fn list_unassigned_requests(&self) -> DbResult<Vec<SampleRequest>>;

    /// Assign a lab to an unassigned, still-requested row. `false` if the row no longer qualifies.
    fn assign_laboratory(&self, request_id: &str, lab_id: &str) -> DbResult<bool>;

    /// Move `from -> to` only if the row is still at `from`.
    fn update_request_status(
        &self,
        request_id: &str,
        from: SampleStatus,
        to: SampleStatus,
    ) -> DbResult<bool>;

    /// Insert the sample and move its request to `collected` atomically.
    fn record_collection(&self, sample: &Sample) -> DbResult<()>;
    fn get_sample(&self, sample_id: &str) -> DbResult<Option<Sample>>;
    fn get_sample_for_request(&self, request_id: &str) -> DbResult<Option<Sample>>;

    /// Insert the report and move its request to `tested` atomically.
    fn record_test_report(&self, report: &LabTestReport) -> DbResult<()>;
    fn get_report_for_request(&self, request_id: &str) -> DbResult<Option<LabTestReport>>;
}

pub trait FeedStore {
    fn get_feed_score(&self, species: &str, feed_item: &str) -> DbResult<Option<FeedScore>>;
    /// Write the summary and all entries in one transaction.
    fn save_feed_assessment(&self, summary: &FeedRiskSummary, entries: &[FeedEntry])
        -> DbResult<()>;
}

pub trait BiomassSource {
    fn biomass_inputs(&self, filter: &BiomassFilter) -> DbResult<Vec<BiomassInput>>;
}
