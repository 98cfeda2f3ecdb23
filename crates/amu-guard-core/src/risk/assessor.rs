//! Treatment assessment: classify, project, persist once, alert.

use thiserror::Error;
use tracing::{debug, info};

use super::projector::{Projection, ResidueProjector, MODEL_VERSION};
use crate::alerts::AlertSink;
use crate::catalog::ReferenceLookup;
use crate::db::DbError;
use crate::models::{
    AlertEvent, AlertKind, AmuRiskRecord, DoseTier, Entity, InvalidTreatment, RiskCategory,
    Treatment,
};
use crate::store::{RiskRecordStore, TreatmentStore};

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidTreatment(#[from] InvalidTreatment),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RiskResult<T> = Result<T, RiskError>;

/// Stored record for a treatment and whether this call created it.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub record: AmuRiskRecord,
    pub created: bool,
}

pub struct RiskAssessor<'a, S: ?Sized> {
    store: &'a S,
    catalog: &'a dyn ReferenceLookup,
    alerts: &'a dyn AlertSink,
}

impl<'a, S> RiskAssessor<'a, S>
where
    S: TreatmentStore + RiskRecordStore + ?Sized,
{
    pub fn new(store: &'a S, catalog: &'a dyn ReferenceLookup, alerts: &'a dyn AlertSink) -> Self {
        Self {
            store,
            catalog,
            alerts,
        }
    }

    /// Assess a stored treatment.
    ///
    /// A treatment is assessed at most once. Later calls, including a caller
    /// that lost an insert race, get the stored record back with
    /// `created == false` and raise no alerts.
    pub fn assess(&self, treatment_id: &str) -> RiskResult<Assessment> {
        if let Some(record) = self.store.get_risk_record(treatment_id)? {
            debug!(treatment_id, "Treatment already assessed");
            return Ok(Assessment {
                record,
                created: false,
            });
        }

        let treatment = self
            .store
            .get_treatment(treatment_id)?
            .ok_or_else(|| RiskError::NotFound(format!("treatment {}", treatment_id)))?;
        let entity = self
            .store
            .get_entity(&treatment.entity_id)?
            .ok_or_else(|| RiskError::NotFound(format!("entity {}", treatment.entity_id)))?;

        treatment.validate()?;
        let projection =
            ResidueProjector::new(self.catalog).project(&treatment, entity.product_matrix)?;
        let record = self.build_record(&treatment, &entity, projection)?;

        match self.store.insert_risk_record(&record) {
            Ok(()) => {}
            Err(DbError::Conflict(_)) => {
                let existing = self.store.get_risk_record(treatment_id)?.ok_or_else(|| {
                    RiskError::NotFound(format!("risk record for {}", treatment_id))
                })?;
                return Ok(Assessment {
                    record: existing,
                    created: false,
                });
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            treatment_id,
            tier = record.dose_tier.as_str(),
            category = record.risk_category.map(|c| c.as_str()).unwrap_or("unknown"),
            withdrawal_days = ?record.withdrawal_days,
            "Stored AMU risk record"
        );
        self.raise_alerts(&record);

        Ok(Assessment {
            record,
            created: true,
        })
    }

    fn build_record(
        &self,
        treatment: &Treatment,
        entity: &Entity,
        projection: Projection,
    ) -> serde_json::Result<AmuRiskRecord> {
        AmuRiskRecord {
            record_id: uuid::Uuid::new_v4().to_string(),
            treatment_id: treatment.treatment_id.clone(),
            entity_id: entity.entity_id.clone(),
            farm_id: treatment.farm_id.clone(),
            species: treatment.species.clone(),
            medicine: treatment.medicine.clone(),
            matrix: entity.product_matrix,
            dose_tier: projection.dose_tier,
            overdosage: projection.overdosage,
            withdrawal_exempt: projection.withdrawal_exempt,
            tissues: projection.tissues,
            worst_tissue: projection.worst_tissue,
            risk_percent: projection.risk_percent,
            risk_category: projection.risk_category,
            withdrawal_days: projection.withdrawal_days,
            end_date: projection.end_date,
            safe_date: projection.safe_date,
            model_version: MODEL_VERSION.to_string(),
            catalog_version: self.catalog.version().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            record_hash: String::new(),
        }
        .seal()
    }

    fn raise_alerts(&self, record: &AmuRiskRecord) {
        let tier_alert = match record.dose_tier {
            DoseTier::Moderate => Some((
                AlertKind::HighDosage,
                format!(
                    "{} dose for {} is above the safe band",
                    record.medicine, record.species
                ),
            )),
            DoseTier::Overdose => Some((
                AlertKind::Overdosage,
                format!("{} dose for {} is an overdose", record.medicine, record.species),
            )),
            _ => None,
        };
        if let Some((kind, message)) = tier_alert {
            self.alerts.emit(
                AlertEvent::new(kind, message).for_treatment(&record.treatment_id, &record.entity_id),
            );
        }

        if record.risk_category == Some(RiskCategory::Unsafe) {
            let message = format!(
                "Predicted {} residue of {} at {:.0}% of MRL",
                record.worst_tissue.as_deref().unwrap_or("tissue"),
                record.medicine,
                record.risk_percent.unwrap_or_default()
            );
            self.alerts.emit(
                AlertEvent::new(AlertKind::UnsafeMrl, message)
                    .for_treatment(&record.treatment_id, &record.entity_id),
            );
        }
    }
}
