//! Sample compliance workflow.
//!
//! Once a risk record has a safe date, a sample request is opened for its
//! treatment and routed to a laboratory. The request then moves through
//! `requested → collected → tested → completed`, one step at a time. The
//! lab verdict is authoritative; disagreement with the projected category is
//! reported on the outcome, never used to overwrite either side.

pub mod assignment;

pub use assignment::{
    AssignmentStrategy, DefaultLab, LabAssigner, LabMatch, NearestWithinRadius, SameDistrict,
    SameState, DEFAULT_MAX_DISTANCE_KM,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::alerts::AlertSink;
use crate::db::DbError;
use crate::models::{
    AlertEvent, AlertKind, AmuRiskRecord, InvalidTransition, LabStatistics, LabTestReport,
    RiskCategory, Sample, SampleRequest, SampleStatus,
};
use crate::store::{LaboratoryStore, RiskRecordStore, SampleStore, TreatmentStore};

#[derive(Error, Debug)]
pub enum ComplianceError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Request {request_id} is assigned to lab {expected}, not {actual}")]
    WrongLaboratory {
        request_id: String,
        expected: String,
        actual: String,
    },

    #[error("Request {0} has no assigned laboratory")]
    Unassigned(String),

    #[error("Request {0} already has a laboratory")]
    AlreadyAssigned(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type ComplianceResult<T> = Result<T, ComplianceError>;

/// Request for a treatment and whether this call opened it.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsuredRequest {
    pub request: SampleRequest,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionInput {
    pub sample_type: String,
    pub collected_on: NaiveDate,
    /// Must be the lab assigned to the request
    pub lab_id: String,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestReportInput {
    pub detected_residue: f64,
    pub mrl_limit: f64,
    pub final_status: RiskCategory,
    pub withdrawal_days_remaining: u32,
    pub tested_on: NaiveDate,
    pub remarks: Option<String>,
    pub certificate_ref: Option<String>,
}

/// Stored report next to the projected category it confirms or contradicts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestOutcome {
    pub report: LabTestReport,
    pub predicted_category: Option<RiskCategory>,
    /// Verdict differs from a known prediction
    pub prediction_mismatch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverdueCollection {
    pub request: SampleRequest,
    pub days_overdue: i64,
}

/// Risk record still waiting for a request, with the lab it would go to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncomingCase {
    pub treatment_id: String,
    pub entity_id: String,
    pub farm_id: String,
    pub safe_date: NaiveDate,
    pub lab: Option<LabMatch>,
}

pub struct SampleCoordinator<'a, S: ?Sized> {
    store: &'a S,
    assigner: &'a LabAssigner,
    alerts: &'a dyn AlertSink,
}

impl<'a, S> SampleCoordinator<'a, S>
where
    S: SampleStore + LaboratoryStore + TreatmentStore + RiskRecordStore + ?Sized,
{
    pub fn new(store: &'a S, assigner: &'a LabAssigner, alerts: &'a dyn AlertSink) -> Self {
        Self {
            store,
            assigner,
            alerts,
        }
    }

    // ========================================================================
    // Request creation and assignment
    // ========================================================================

    /// Open the sample request for a record, or return the one that exists.
    ///
    /// Only a safe date after `today` opens a new request; records without
    /// one, or whose withdrawal already ended, get none.
    pub fn ensure_request(
        &self,
        record: &AmuRiskRecord,
        today: NaiveDate,
    ) -> ComplianceResult<Option<EnsuredRequest>> {
        let Some(safe_date) = record.safe_date else {
            return Ok(None);
        };
        if let Some(request) = self
            .store
            .get_sample_request_for_treatment(&record.treatment_id)?
        {
            return Ok(Some(EnsuredRequest {
                request,
                created: false,
            }));
        }
        if safe_date <= today {
            debug!(
                treatment_id = %record.treatment_id,
                %safe_date,
                %today,
                "Withdrawal already over, no sample request"
            );
            return Ok(None);
        }

        let farm = self
            .store
            .get_farm(&record.farm_id)?
            .ok_or_else(|| ComplianceError::NotFound(format!("farm {}", record.farm_id)))?;
        let labs = self.store.list_laboratories()?;

        let mut request = SampleRequest::new(
            record.treatment_id.clone(),
            record.entity_id.clone(),
            record.farm_id.clone(),
            safe_date,
        );
        request.farmer_id = farm.farmer_id.clone();
        if let Some(found) = self.assigner.assign(&farm, &labs) {
            request.assigned_lab_id = Some(found.lab_id);
            request.assignment_method = Some(found.method);
            request.distance_km = found.distance_km;
        }

        match self.store.insert_sample_request(&request) {
            Ok(()) => {}
            Err(DbError::Conflict(_)) => {
                let existing = self
                    .store
                    .get_sample_request_for_treatment(&record.treatment_id)?
                    .ok_or_else(|| {
                        ComplianceError::NotFound(format!(
                            "sample request for {}",
                            record.treatment_id
                        ))
                    })?;
                return Ok(Some(EnsuredRequest {
                    request: existing,
                    created: false,
                }));
            }
            Err(e) => return Err(e.into()),
        }

        match &request.assigned_lab_id {
            Some(lab_id) => info!(
                request_id = %request.request_id,
                treatment_id = %request.treatment_id,
                lab_id = %lab_id,
                method = ?request.assignment_method,
                safe_date = %request.safe_date,
                "Opened sample request"
            ),
            None => warn!(
                request_id = %request.request_id,
                farm_id = %request.farm_id,
                "No laboratory available; sample request needs manual assignment"
            ),
        }

        Ok(Some(EnsuredRequest {
            request,
            created: true,
        }))
    }

    /// Open requests for every record with a future safe date that lacks one.
    pub fn sync_pending_requests(&self, today: NaiveDate) -> ComplianceResult<Vec<EnsuredRequest>> {
        let mut opened = Vec::new();
        for record in self.store.list_records_without_request()? {
            if let Some(ensured) = self.ensure_request(&record, today)? {
                opened.push(ensured);
            }
        }
        Ok(opened)
    }

    /// Requests stuck without a laboratory.
    pub fn unassigned_requests(&self) -> ComplianceResult<Vec<SampleRequest>> {
        Ok(self.store.list_unassigned_requests()?)
    }

    /// Operator assignment of an unassigned, still-requested row.
    pub fn assign_manually(&self, request_id: &str, lab_id: &str) -> ComplianceResult<SampleRequest> {
        let request = self.require_request(request_id)?;
        if self.store.get_laboratory(lab_id)?.is_none() {
            return Err(ComplianceError::NotFound(format!("laboratory {}", lab_id)));
        }
        if request.assigned_lab_id.is_some() {
            return Err(ComplianceError::AlreadyAssigned(request_id.to_string()));
        }
        if request.status != SampleStatus::Requested {
            return Err(ComplianceError::InvalidInput(format!(
                "request {} is already {}",
                request_id, request.status
            )));
        }

        if !self.store.assign_laboratory(request_id, lab_id)? {
            return Err(ComplianceError::Conflict(format!(
                "request {} changed during assignment",
                request_id
            )));
        }
        info!(request_id, lab_id, "Manually assigned laboratory");
        self.require_request(request_id)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// `requested → collected`, creating the request's only sample.
    pub fn collect_sample(
        &self,
        request_id: &str,
        input: CollectionInput,
    ) -> ComplianceResult<Sample> {
        let request = self.require_request(request_id)?;
        if request.status == SampleStatus::Collected {
            return Err(ComplianceError::Conflict(format!(
                "sample already collected for request {}",
                request_id
            )));
        }
        request.status.transition_to(SampleStatus::Collected)?;

        let expected = request
            .assigned_lab_id
            .clone()
            .ok_or_else(|| ComplianceError::Unassigned(request_id.to_string()))?;
        if expected != input.lab_id {
            return Err(ComplianceError::WrongLaboratory {
                request_id: request_id.to_string(),
                expected,
                actual: input.lab_id,
            });
        }
        if input.sample_type.trim().is_empty() {
            return Err(ComplianceError::InvalidInput("sample type is empty".into()));
        }

        let mut sample = Sample::new(
            request.request_id.clone(),
            input.sample_type,
            input.collected_on,
            input.lab_id,
        );
        sample.remarks = input.remarks;

        self.store
            .record_collection(&sample)
            .map_err(|e| conflict_or(e, "sample collection"))?;
        info!(request_id, sample_id = %sample.sample_id, "Sample collected");
        Ok(sample)
    }

    /// `collected → tested`, storing the lab verdict for the sample.
    pub fn record_test(
        &self,
        sample_id: &str,
        input: TestReportInput,
    ) -> ComplianceResult<TestOutcome> {
        if !input.detected_residue.is_finite() || input.detected_residue < 0.0 {
            return Err(ComplianceError::InvalidInput(format!(
                "detected residue {} must be a non-negative number",
                input.detected_residue
            )));
        }
        if !input.mrl_limit.is_finite() || input.mrl_limit <= 0.0 {
            return Err(ComplianceError::InvalidInput(format!(
                "MRL limit {} must be positive",
                input.mrl_limit
            )));
        }

        let sample = self
            .store
            .get_sample(sample_id)?
            .ok_or_else(|| ComplianceError::NotFound(format!("sample {}", sample_id)))?;
        let request = self.require_request(&sample.request_id)?;
        if request.status == SampleStatus::Tested {
            return Err(ComplianceError::Conflict(format!(
                "sample {} already tested",
                sample_id
            )));
        }
        request.status.transition_to(SampleStatus::Tested)?;

        let report = LabTestReport {
            report_id: uuid::Uuid::new_v4().to_string(),
            sample_id: sample.sample_id.clone(),
            request_id: request.request_id.clone(),
            lab_id: sample.collected_by_lab_id.clone(),
            detected_residue: input.detected_residue,
            mrl_limit: input.mrl_limit,
            final_status: input.final_status,
            withdrawal_days_remaining: input.withdrawal_days_remaining,
            tested_on: input.tested_on,
            remarks: input.remarks,
            certificate_ref: input.certificate_ref,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.store
            .record_test_report(&report)
            .map_err(|e| conflict_or(e, "lab test report"))?;

        let predicted_category = self
            .store
            .get_risk_record(&request.treatment_id)?
            .and_then(|record| record.risk_category);
        let prediction_mismatch = predicted_category.is_some_and(|p| p != report.final_status);

        info!(
            request_id = %request.request_id,
            verdict = report.final_status.as_str(),
            "Lab verdict recorded"
        );
        if prediction_mismatch {
            warn!(
                request_id = %request.request_id,
                predicted = ?predicted_category,
                verdict = report.final_status.as_str(),
                "Lab verdict differs from projection"
            );
        }
        if report.final_status == RiskCategory::Unsafe {
            let message = format!(
                "Lab measured {:.1} against MRL {:.1}",
                report.detected_residue, report.mrl_limit
            );
            self.alerts.emit(
                AlertEvent::new(AlertKind::UnsafeMrl, message)
                    .for_treatment(&request.treatment_id, &request.entity_id),
            );
        }

        Ok(TestOutcome {
            report,
            predicted_category,
            prediction_mismatch,
        })
    }

    /// `tested → completed`.
    pub fn complete(&self, request_id: &str) -> ComplianceResult<SampleRequest> {
        let request = self.require_request(request_id)?;
        request.status.transition_to(SampleStatus::Completed)?;
        if !self.store.update_request_status(
            request_id,
            SampleStatus::Tested,
            SampleStatus::Completed,
        )? {
            return Err(ComplianceError::Conflict(format!(
                "request {} changed during completion",
                request_id
            )));
        }
        info!(request_id, "Sample request completed");
        self.require_request(request_id)
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Requested rows whose safe date has arrived. Raises one alert per row.
    pub fn due_for_collection(&self, today: NaiveDate) -> ComplianceResult<Vec<SampleRequest>> {
        let due: Vec<SampleRequest> = self
            .store
            .list_sample_requests(Some(SampleStatus::Requested))?
            .into_iter()
            .filter(|r| r.is_due(today))
            .collect();

        for request in &due {
            let message = format!("Safe date {} reached; sample can be collected", request.safe_date);
            self.alerts.emit(
                AlertEvent::new(AlertKind::SafeDateReached, message)
                    .for_treatment(&request.treatment_id, &request.entity_id),
            );
        }
        Ok(due)
    }

    /// Requested rows more than `grace_days` past their safe date.
    pub fn overdue_collections(
        &self,
        today: NaiveDate,
        grace_days: u32,
    ) -> ComplianceResult<Vec<OverdueCollection>> {
        Ok(self
            .store
            .list_sample_requests(Some(SampleStatus::Requested))?
            .into_iter()
            .filter_map(|request| {
                let days_overdue = request.days_past_safe_date(today);
                (days_overdue > i64::from(grace_days)).then_some(OverdueCollection {
                    request,
                    days_overdue,
                })
            })
            .collect())
    }

    pub fn lab_statistics(&self, lab_id: &str) -> ComplianceResult<LabStatistics> {
        let mut stats = LabStatistics {
            lab_id: lab_id.to_string(),
            ..LabStatistics::default()
        };
        for request in self.store.list_requests_for_lab(lab_id)? {
            stats.record(request.status);
        }
        Ok(stats)
    }

    /// Records still waiting for a request and the lab each would be routed to.
    /// With `lab_id`, only cases routed to that lab. Records whose safe date
    /// is not after `today` would never get a request and are left out.
    pub fn incoming_cases(
        &self,
        lab_id: Option<&str>,
        today: NaiveDate,
    ) -> ComplianceResult<Vec<IncomingCase>> {
        let labs = self.store.list_laboratories()?;
        let mut cases = Vec::new();
        for record in self.store.list_records_without_request()? {
            let Some(safe_date) = record.safe_date.filter(|d| *d > today) else {
                continue;
            };
            let lab = match self.store.get_farm(&record.farm_id)? {
                Some(farm) => self.assigner.assign(&farm, &labs),
                None => None,
            };
            if let Some(wanted) = lab_id {
                if lab.as_ref().map(|m| m.lab_id.as_str()) != Some(wanted) {
                    continue;
                }
            }
            cases.push(IncomingCase {
                treatment_id: record.treatment_id,
                entity_id: record.entity_id,
                farm_id: record.farm_id,
                safe_date,
                lab,
            });
        }
        Ok(cases)
    }

    fn require_request(&self, request_id: &str) -> ComplianceResult<SampleRequest> {
        self.store
            .get_sample_request(request_id)?
            .ok_or_else(|| ComplianceError::NotFound(format!("sample request {}", request_id)))
    }
}

fn conflict_or(err: DbError, what: &str) -> ComplianceError {
    match err {
        DbError::Conflict(msg) => ComplianceError::Conflict(format!("{}: {}", what, msg)),
        other => other.into(),
    }
}
