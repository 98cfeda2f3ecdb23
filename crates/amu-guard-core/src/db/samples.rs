//! Sample request, sample and lab report database operations.
//!
//! Status changes are compare-and-set: an UPDATE only applies while the row
//! still holds the expected status.

use rusqlite::{params, OptionalExtension, Row, ToSql};

use super::risk_records::parse_category;
use super::{format_date, map_write_error, parse_date, Database, DbError, DbResult};
use crate::models::{AssignmentMethod, LabTestReport, Sample, SampleRequest, SampleStatus};
use crate::store::SampleStore;

const REQUEST_COLUMNS: &str = r#"
    request_id, treatment_id, entity_id, farm_id, farmer_id, assigned_lab_id,
    assignment_method, distance_km, safe_date, status, created_at, updated_at
"#;

impl Database {
    // ========================================================================
    // Sample requests
    // ========================================================================

    pub fn insert_sample_request(&self, request: &SampleRequest) -> DbResult<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO sample_requests (
                    request_id, treatment_id, entity_id, farm_id, farmer_id,
                    assigned_lab_id, assignment_method, distance_km, safe_date,
                    status, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
                params![
                    request.request_id,
                    request.treatment_id,
                    request.entity_id,
                    request.farm_id,
                    request.farmer_id,
                    request.assigned_lab_id,
                    request.assignment_method.map(|m| m.as_str()),
                    request.distance_km,
                    format_date(request.safe_date),
                    request.status.as_str(),
                    request.created_at,
                    request.updated_at,
                ],
            )
            .map_err(|e| map_write_error(e, "sample request for treatment"))?;
        Ok(())
    }

    pub fn get_sample_request(&self, request_id: &str) -> DbResult<Option<SampleRequest>> {
        let sql = format!(
            "SELECT {} FROM sample_requests WHERE request_id = ?",
            REQUEST_COLUMNS
        );
        self.conn
            .query_row(&sql, [request_id], request_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    pub fn get_sample_request_for_treatment(
        &self,
        treatment_id: &str,
    ) -> DbResult<Option<SampleRequest>> {
        let sql = format!(
            "SELECT {} FROM sample_requests WHERE treatment_id = ?",
            REQUEST_COLUMNS
        );
        self.conn
            .query_row(&sql, [treatment_id], request_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Requests ordered by safe date, optionally filtered by status.
    pub fn list_sample_requests(
        &self,
        status: Option<SampleStatus>,
    ) -> DbResult<Vec<SampleRequest>> {
        match status {
            Some(status) => self.query_requests(
                &format!(
                    "SELECT {} FROM sample_requests WHERE status = ?1 ORDER BY safe_date, rowid",
                    REQUEST_COLUMNS
                ),
                &[&status.as_str()],
            ),
            None => self.query_requests(
                &format!(
                    "SELECT {} FROM sample_requests ORDER BY safe_date, rowid",
                    REQUEST_COLUMNS
                ),
                &[],
            ),
        }
    }

    pub fn list_requests_for_lab(&self, lab_id: &str) -> DbResult<Vec<SampleRequest>> {
        self.query_requests(
            &format!(
                "SELECT {} FROM sample_requests WHERE assigned_lab_id = ?1 ORDER BY safe_date, rowid",
                REQUEST_COLUMNS
            ),
            &[&lab_id],
        )
    }

    /// Requested rows still waiting for a laboratory.
    pub fn list_unassigned_requests(&self) -> DbResult<Vec<SampleRequest>> {
        self.query_requests(
            &format!(
                r#"
                SELECT {} FROM sample_requests
                WHERE assigned_lab_id IS NULL AND status = ?1
                ORDER BY safe_date, rowid
                "#,
                REQUEST_COLUMNS
            ),
            &[&SampleStatus::Requested.as_str()],
        )
    }

    fn query_requests(&self, sql: &str, params: &[&dyn ToSql]) -> DbResult<Vec<SampleRequest>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, request_row)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?.try_into()?);
        }
        Ok(requests)
    }

    /// Manually assign a lab to an unassigned, still-requested row.
    pub fn assign_laboratory(&self, request_id: &str, lab_id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute(
                r#"
                UPDATE sample_requests SET
                    assigned_lab_id = ?2,
                    assignment_method = 'manual',
                    distance_km = NULL,
                    updated_at = datetime('now')
                WHERE request_id = ?1
                  AND assigned_lab_id IS NULL
                  AND status = 'requested'
                "#,
                params![request_id, lab_id],
            )
            .map_err(|e| map_write_error(e, "laboratory assignment"))?;
        Ok(rows_affected > 0)
    }

    pub fn update_request_status(
        &self,
        request_id: &str,
        from: SampleStatus,
        to: SampleStatus,
    ) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute(
                r#"
                UPDATE sample_requests SET status = ?3, updated_at = datetime('now')
                WHERE request_id = ?1 AND status = ?2
                "#,
                params![request_id, from.as_str(), to.as_str()],
            )
            .map_err(|e| map_write_error(e, "sample request status"))?;
        Ok(rows_affected > 0)
    }

    // ========================================================================
    // Samples
    // ========================================================================

    pub fn record_collection(&self, sample: &Sample) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO samples (
                sample_id, request_id, sample_type, collected_on,
                collected_by_lab_id, remarks, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                sample.sample_id,
                sample.request_id,
                sample.sample_type,
                format_date(sample.collected_on),
                sample.collected_by_lab_id,
                sample.remarks,
                sample.created_at,
            ],
        )
        .map_err(|e| map_write_error(e, "sample for request"))?;

        let moved = tx.execute(
            r#"
            UPDATE sample_requests SET status = 'collected', updated_at = datetime('now')
            WHERE request_id = ?1 AND status = 'requested'
            "#,
            [&sample.request_id],
        )?;
        if moved == 0 {
            return Err(DbError::Conflict(format!(
                "request {} is no longer awaiting collection",
                sample.request_id
            )));
        }

        tx.commit()?;
        Ok(())
    }

    pub fn get_sample(&self, sample_id: &str) -> DbResult<Option<Sample>> {
        self.conn
            .query_row(
                r#"
                SELECT sample_id, request_id, sample_type, collected_on,
                       collected_by_lab_id, remarks, created_at
                FROM samples WHERE sample_id = ?
                "#,
                [sample_id],
                sample_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    pub fn get_sample_for_request(&self, request_id: &str) -> DbResult<Option<Sample>> {
        self.conn
            .query_row(
                r#"
                SELECT sample_id, request_id, sample_type, collected_on,
                       collected_by_lab_id, remarks, created_at
                FROM samples WHERE request_id = ?
                "#,
                [request_id],
                sample_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    // ========================================================================
    // Lab test reports
    // ========================================================================

    pub fn record_test_report(&self, report: &LabTestReport) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO lab_test_reports (
                report_id, sample_id, request_id, lab_id, detected_residue,
                mrl_limit, final_status, withdrawal_days_remaining, tested_on,
                remarks, certificate_ref, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                report.report_id,
                report.sample_id,
                report.request_id,
                report.lab_id,
                report.detected_residue,
                report.mrl_limit,
                report.final_status.as_str(),
                report.withdrawal_days_remaining,
                format_date(report.tested_on),
                report.remarks,
                report.certificate_ref,
                report.created_at,
            ],
        )
        .map_err(|e| map_write_error(e, "lab report for sample"))?;

        let moved = tx.execute(
            r#"
            UPDATE sample_requests SET status = 'tested', updated_at = datetime('now')
            WHERE request_id = ?1 AND status = 'collected'
            "#,
            [&report.request_id],
        )?;
        if moved == 0 {
            return Err(DbError::Conflict(format!(
                "request {} is not awaiting a test result",
                report.request_id
            )));
        }

        tx.commit()?;
        Ok(())
    }

    pub fn get_report_for_request(&self, request_id: &str) -> DbResult<Option<LabTestReport>> {
        self.conn
            .query_row(
                r#"
                SELECT report_id, sample_id, request_id, lab_id, detected_residue,
                       mrl_limit, final_status, withdrawal_days_remaining, tested_on,
                       remarks, certificate_ref, created_at
                FROM lab_test_reports WHERE request_id = ?
                "#,
                [request_id],
                report_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }
}

impl SampleStore for Database {
    fn insert_sample_request(&self, request: &SampleRequest) -> DbResult<()> {
        Database::insert_sample_request(self, request)
    }

    fn get_sample_request(&self, request_id: &str) -> DbResult<Option<SampleRequest>> {
        Database::get_sample_request(self, request_id)
    }

    fn get_sample_request_for_treatment(
        &self,
        treatment_id: &str,
    ) -> DbResult<Option<SampleRequest>> {
        Database::get_sample_request_for_treatment(self, treatment_id)
    }

    fn list_sample_requests(&self, status: Option<SampleStatus>) -> DbResult<Vec<SampleRequest>> {
        Database::list_sample_requests(self, status)
    }

    fn list_requests_for_lab(&self, lab_id: &str) -> DbResult<Vec<SampleRequest>> {
        Database::list_requests_for_lab(self, lab_id)
    }

    fn list_unassigned_requests(&self) -> DbResult<Vec<SampleRequest>> {
        Database::list_unassigned_requests(self)
    }

    fn assign_laboratory(&self, request_id: &str, lab_id: &str) -> DbResult<bool> {
        Database::assign_laboratory(self, request_id, lab_id)
    }

    fn update_request_status(
        &self,
        request_id: &str,
        from: SampleStatus,
        to: SampleStatus,
    ) -> DbResult<bool> {
        Database::update_request_status(self, request_id, from, to)
    }

    fn record_collection(&self, sample: &Sample) -> DbResult<()> {
        Database::record_collection(self, sample)
    }

    fn get_sample(&self, sample_id: &str) -> DbResult<Option<Sample>> {
        Database::get_sample(self, sample_id)
    }

    fn get_sample_for_request(&self, request_id: &str) -> DbResult<Option<Sample>> {
        Database::get_sample_for_request(self, request_id)
    }

    fn record_test_report(&self, report: &LabTestReport) -> DbResult<()> {
        Database::record_test_report(self, report)
    }

    fn get_report_for_request(&self, request_id: &str) -> DbResult<Option<LabTestReport>> {
        Database::get_report_for_request(self, request_id)
    }
}

/// Intermediate row struct for database mapping.
struct RequestRow {
    request_id: String,
    treatment_id: String,
    entity_id: String,
    farm_id: String,
    farmer_id: Option<String>,
    assigned_lab_id: Option<String>,
    assignment_method: Option<String>,
    distance_km: Option<f64>,
    safe_date: String,
    status: String,
    created_at: String,
    updated_at: String,
}

fn request_row(row: &Row<'_>) -> rusqlite::Result<RequestRow> {
    Ok(RequestRow {
        request_id: row.get(0)?,
        treatment_id: row.get(1)?,
        entity_id: row.get(2)?,
        farm_id: row.get(3)?,
        farmer_id: row.get(4)?,
        assigned_lab_id: row.get(5)?,
        assignment_method: row.get(6)?,
        distance_km: row.get(7)?,
        safe_date: row.get(8)?,
        status: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl TryFrom<RequestRow> for SampleRequest {
    type Error = DbError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let status = string_to_status(&row.status)?;
        let assignment_method = row
            .assignment_method
            .as_deref()
            .map(|m| {
                AssignmentMethod::parse(m)
                    .ok_or_else(|| DbError::InvalidData(format!("Unknown assignment method: {}", m)))
            })
            .transpose()?;

        Ok(SampleRequest {
            request_id: row.request_id,
            treatment_id: row.treatment_id,
            entity_id: row.entity_id,
            farm_id: row.farm_id,
            farmer_id: row.farmer_id,
            assigned_lab_id: row.assigned_lab_id,
            assignment_method,
            distance_km: row.distance_km,
            safe_date: parse_date(&row.safe_date)?,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Intermediate row struct for database mapping.
struct SampleRow {
    sample_id: String,
    request_id: String,
    sample_type: String,
    collected_on: String,
    collected_by_lab_id: String,
    remarks: Option<String>,
    created_at: String,
}

fn sample_row(row: &Row<'_>) -> rusqlite::Result<SampleRow> {
    Ok(SampleRow {
        sample_id: row.get(0)?,
        request_id: row.get(1)?,
        sample_type: row.get(2)?,
        collected_on: row.get(3)?,
        collected_by_lab_id: row.get(4)?,
        remarks: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl TryFrom<SampleRow> for Sample {
    type Error = DbError;

    fn try_from(row: SampleRow) -> Result<Self, Self::Error> {
        Ok(Sample {
            sample_id: row.sample_id,
            request_id: row.request_id,
            sample_type: row.sample_type,
            collected_on: parse_date(&row.collected_on)?,
            collected_by_lab_id: row.collected_by_lab_id,
            remarks: row.remarks,
            created_at: row.created_at,
        })
    }
}

/// Intermediate row struct for database mapping.
struct ReportRow {
    report_id: String,
    sample_id: String,
    request_id: String,
    lab_id: String,
    detected_residue: f64,
    mrl_limit: f64,
    final_status: String,
    withdrawal_days_remaining: u32,
    tested_on: String,
    remarks: Option<String>,
    certificate_ref: Option<String>,
    created_at: String,
}

fn report_row(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        report_id: row.get(0)?,
        sample_id: row.get(1)?,
        request_id: row.get(2)?,
        lab_id: row.get(3)?,
        detected_residue: row.get(4)?,
        mrl_limit: row.get(5)?,
        final_status: row.get(6)?,
        withdrawal_days_remaining: row.get(7)?,
        tested_on: row.get(8)?,
        remarks: row.get(9)?,
        certificate_ref: row.get(10)?,
        created_at: row.get(11)?,
    })
}

impl TryFrom<ReportRow> for LabTestReport {
    type Error = DbError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        Ok(LabTestReport {
            report_id: row.report_id,
            sample_id: row.sample_id,
            request_id: row.request_id,
            lab_id: row.lab_id,
            detected_residue: row.detected_residue,
            mrl_limit: row.mrl_limit,
            final_status: parse_category(&row.final_status)?,
            withdrawal_days_remaining: row.withdrawal_days_remaining,
            tested_on: parse_date(&row.tested_on)?,
            remarks: row.remarks,
            certificate_ref: row.certificate_ref,
            created_at: row.created_at,
        })
    }
}

fn string_to_status(s: &str) -> Result<SampleStatus, DbError> {
    SampleStatus::parse(s)
        .ok_or_else(|| DbError::InvalidData(format!("Unknown sample status: {}", s)))
}
