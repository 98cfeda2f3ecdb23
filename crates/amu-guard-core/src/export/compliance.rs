//! Withdrawal compliance export with record fingerprints.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::{Database, DbResult};
use crate::models::{AmuRiskRecord, DoseTier, ProductMatrix, RiskCategory, SampleStatus};

/// Prediction and lab outcome for one treatment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalComplianceEntry {
    pub treatment_id: String,
    pub entity_id: String,
    pub farm_id: String,
    pub species: String,
    pub medicine: String,
    pub matrix: ProductMatrix,
    pub dose_tier: DoseTier,
    pub overdosage: bool,
    pub predicted_category: Option<RiskCategory>,
    pub risk_percent: Option<f64>,
    pub worst_tissue: Option<String>,
    pub withdrawal_days: Option<u32>,
    pub safe_date: Option<NaiveDate>,
    /// `None` when no sample request exists yet
    pub request_status: Option<SampleStatus>,
    pub assigned_lab_id: Option<String>,
    pub verdict: Option<RiskCategory>,
    pub detected_residue: Option<f64>,
    pub mrl_limit: Option<f64>,
    pub tested_on: Option<NaiveDate>,
    pub certificate_ref: Option<String>,
    /// Lab verdict differs from the predicted category
    pub prediction_mismatch: bool,
    pub record_hash: String,
    /// Stored hash still matches the record contents
    pub hash_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalComplianceMetadata {
    /// Export format version
    pub format_version: String,
    pub exported_at: String,
    pub hash_algorithm: String,
    /// Exporting system identifier
    pub system_id: Option<String>,
    pub record_count: u32,
    pub tested_count: u32,
    pub mismatch_count: u32,
    /// Records whose stored hash no longer matches
    pub tampered_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalComplianceExport {
    pub metadata: WithdrawalComplianceMetadata,
    pub entries: Vec<WithdrawalComplianceEntry>,
}

impl WithdrawalComplianceExport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str(
            "treatment_id,entity_id,farm_id,species,medicine,matrix,dose_tier,overdosage,\
             predicted_category,risk_percent,withdrawal_days,safe_date,request_status,\
             verdict,detected_residue,mrl_limit,prediction_mismatch,record_hash,hash_verified\n",
        );

        for e in &self.entries {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
                escape_csv(&e.treatment_id),
                escape_csv(&e.entity_id),
                escape_csv(&e.farm_id),
                escape_csv(&e.species),
                escape_csv(&e.medicine),
                e.matrix.as_str(),
                e.dose_tier.as_str(),
                e.overdosage,
                e.predicted_category.map(|c| c.as_str()).unwrap_or(""),
                optional(e.risk_percent.map(|p| format!("{:.2}", p))),
                optional(e.withdrawal_days),
                optional(e.safe_date),
                e.request_status.map(|s| s.as_str()).unwrap_or(""),
                e.verdict.map(|c| c.as_str()).unwrap_or(""),
                optional(e.detected_residue),
                optional(e.mrl_limit),
                e.prediction_mismatch,
                e.record_hash,
                e.hash_verified,
            ));
        }

        csv
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub struct ComplianceExporter<'a> {
    db: &'a Database,
    system_id: Option<String>,
}

impl<'a> ComplianceExporter<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            system_id: None,
        }
    }

    pub fn with_system_id(mut self, system_id: String) -> Self {
        self.system_id = Some(system_id);
        self
    }

    pub fn entry_for(&self, record: &AmuRiskRecord) -> DbResult<WithdrawalComplianceEntry> {
        let request = self.db.get_sample_request_for_treatment(&record.treatment_id)?;
        let report = match &request {
            Some(r) => self.db.get_report_for_request(&r.request_id)?,
            None => None,
        };

        let verdict = report.as_ref().map(|r| r.final_status);
        let prediction_mismatch = matches!(
            (record.risk_category, verdict),
            (Some(predicted), Some(actual)) if predicted != actual
        );

        Ok(WithdrawalComplianceEntry {
            treatment_id: record.treatment_id.clone(),
            entity_id: record.entity_id.clone(),
            farm_id: record.farm_id.clone(),
            species: record.species.clone(),
            medicine: record.medicine.clone(),
            matrix: record.matrix,
            dose_tier: record.dose_tier,
            overdosage: record.overdosage,
            predicted_category: record.risk_category,
            risk_percent: record.risk_percent,
            worst_tissue: record.worst_tissue.clone(),
            withdrawal_days: record.withdrawal_days,
            safe_date: record.safe_date,
            request_status: request.as_ref().map(|r| r.status),
            assigned_lab_id: request.and_then(|r| r.assigned_lab_id),
            verdict,
            detected_residue: report.as_ref().map(|r| r.detected_residue),
            mrl_limit: report.as_ref().map(|r| r.mrl_limit),
            tested_on: report.as_ref().map(|r| r.tested_on),
            certificate_ref: report.and_then(|r| r.certificate_ref),
            prediction_mismatch,
            record_hash: record.record_hash.clone(),
            hash_verified: record.verify_hash(),
        })
    }

    /// Export every stored risk record.
    pub fn export_all(&self) -> DbResult<WithdrawalComplianceExport> {
        let records = self.db.list_risk_records()?;
        self.export_records(&records)
    }

    /// Export the risk records of one farm.
    pub fn export_farm(&self, farm_id: &str) -> DbResult<WithdrawalComplianceExport> {
        let records: Vec<AmuRiskRecord> = self
            .db
            .list_risk_records()?
            .into_iter()
            .filter(|r| r.farm_id == farm_id)
            .collect();
        self.export_records(&records)
    }

    fn export_records(&self, records: &[AmuRiskRecord]) -> DbResult<WithdrawalComplianceExport> {
        let entries = records
            .iter()
            .map(|r| self.entry_for(r))
            .collect::<DbResult<Vec<_>>>()?;

        let count = |f: fn(&WithdrawalComplianceEntry) -> bool| {
            entries.iter().filter(|e| f(e)).count() as u32
        };

        Ok(WithdrawalComplianceExport {
            metadata: WithdrawalComplianceMetadata {
                format_version: "1.0".to_string(),
                exported_at: chrono::Utc::now().to_rfc3339(),
                hash_algorithm: "SHA-256".to_string(),
                system_id: self.system_id.clone(),
                record_count: entries.len() as u32,
                tested_count: count(|e| e.verdict.is_some()),
                mismatch_count: count(|e| e.prediction_mismatch),
                tampered_count: count(|e| !e.hash_verified),
            },
            entries,
        })
    }
}
