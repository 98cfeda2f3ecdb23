//! AMU risk record database operations.
//!
//! Records are written once together with their tissue rows; triggers reject
//! any later UPDATE or DELETE.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Params, Row};

use super::{format_date, map_write_error, parse_date, parse_optional_date, Database, DbError, DbResult};
use crate::models::{AmuRiskRecord, DoseTier, ProductMatrix, RiskCategory, TissueResidue};
use crate::store::RiskRecordStore;

const RECORD_COLUMNS: &str = r#"
    r.record_id, r.treatment_id, r.entity_id, r.farm_id, r.species, r.medicine,
    r.matrix, r.dose_tier, r.overdosage, r.withdrawal_exempt, r.worst_tissue,
    r.risk_percent, r.risk_category, r.withdrawal_days, r.end_date, r.safe_date,
    r.model_version, r.catalog_version, r.record_hash, r.created_at
"#;

impl Database {
    /// Insert a record and its tissue predictions atomically.
    pub fn insert_risk_record(&self, record: &AmuRiskRecord) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO amu_risk_records (
                record_id, treatment_id, entity_id, farm_id, species, medicine,
                matrix, dose_tier, overdosage, withdrawal_exempt, worst_tissue,
                risk_percent, risk_category, withdrawal_days, end_date, safe_date,
                model_version, catalog_version, record_hash, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                      ?15, ?16, ?17, ?18, ?19, ?20)
            "#,
            params![
                record.record_id,
                record.treatment_id,
                record.entity_id,
                record.farm_id,
                record.species,
                record.medicine,
                record.matrix.as_str(),
                record.dose_tier.as_str(),
                record.overdosage,
                record.withdrawal_exempt,
                record.worst_tissue,
                record.risk_percent,
                record.risk_category.map(|c| c.as_str()),
                record.withdrawal_days,
                format_date(record.end_date),
                record.safe_date.map(format_date),
                record.model_version,
                record.catalog_version,
                record.record_hash,
                record.created_at,
            ],
        )
        .map_err(|e| map_write_error(e, "AMU risk record for treatment"))?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO amu_tissue_residues (
                    record_id, position, tissue, predicted_residue, base_mrl,
                    risk_percent, risk_category
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for (position, tissue) in record.tissues.iter().enumerate() {
                stmt.execute(params![
                    record.record_id,
                    position as i64,
                    tissue.tissue,
                    tissue.predicted_residue,
                    tissue.base_mrl,
                    tissue.risk_percent,
                    tissue.category.as_str(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn get_risk_record(&self, treatment_id: &str) -> DbResult<Option<AmuRiskRecord>> {
        let sql = format!(
            "SELECT {} FROM amu_risk_records r WHERE r.treatment_id = ?",
            RECORD_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, [treatment_id], record_row)
            .optional()?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row)?)),
            None => Ok(None),
        }
    }

    /// Every stored record, oldest first.
    pub fn list_risk_records(&self) -> DbResult<Vec<AmuRiskRecord>> {
        let sql = format!(
            "SELECT {} FROM amu_risk_records r ORDER BY r.created_at, r.rowid",
            RECORD_COLUMNS
        );
        self.query_records(&sql, params![])
    }

    /// Records with a safe date that no sample request references yet.
    pub fn list_records_without_request(&self) -> DbResult<Vec<AmuRiskRecord>> {
        let sql = format!(
            r#"
            SELECT {} FROM amu_risk_records r
            WHERE r.safe_date IS NOT NULL
              AND NOT EXISTS (
                  SELECT 1 FROM sample_requests s WHERE s.treatment_id = r.treatment_id
              )
            ORDER BY r.safe_date, r.rowid
            "#,
            RECORD_COLUMNS
        );
        self.query_records(&sql, params![])
    }

    /// Records whose animal is still inside its withdrawal window on `today`,
    /// soonest safe date first. With `farmer_id`, only that farmer's farms.
    pub fn list_active_withdrawals(
        &self,
        today: NaiveDate,
        farmer_id: Option<&str>,
    ) -> DbResult<Vec<AmuRiskRecord>> {
        let sql = format!(
            r#"
            SELECT {} FROM amu_risk_records r
            WHERE r.safe_date IS NOT NULL AND r.safe_date > ?1
              AND (?2 IS NULL OR EXISTS (
                  SELECT 1 FROM farms f WHERE f.farm_id = r.farm_id AND f.farmer_id = ?2
              ))
            ORDER BY r.safe_date, r.rowid
            "#,
            RECORD_COLUMNS
        );
        self.query_records(&sql, params![format_date(today), farmer_id])
    }

    fn query_records<P: Params>(&self, sql: &str, params: P) -> DbResult<Vec<AmuRiskRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, record_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(self.hydrate(row)?);
        }
        Ok(records)
    }

    /// Attach tissue rows and convert.
    fn hydrate(&self, row: RecordRow) -> DbResult<AmuRiskRecord> {
        let tissues = self.tissues_for_record(&row.record_id)?;
        let mut record: AmuRiskRecord = row.try_into()?;
        record.tissues = tissues;
        Ok(record)
    }

    fn tissues_for_record(&self, record_id: &str) -> DbResult<Vec<TissueResidue>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT tissue, predicted_residue, base_mrl, risk_percent, risk_category
            FROM amu_tissue_residues
            WHERE record_id = ?
            ORDER BY position
            "#,
        )?;
        let rows = stmt.query_map([record_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut tissues = Vec::new();
        for row in rows {
            let (tissue, predicted_residue, base_mrl, risk_percent, category) = row?;
            tissues.push(TissueResidue {
                tissue,
                predicted_residue,
                base_mrl,
                risk_percent,
                category: parse_category(&category)?,
            });
        }
        Ok(tissues)
    }
}

impl RiskRecordStore for Database {
    fn insert_risk_record(&self, record: &AmuRiskRecord) -> DbResult<()> {
        Database::insert_risk_record(self, record)
    }

    fn get_risk_record(&self, treatment_id: &str) -> DbResult<Option<AmuRiskRecord>> {
        Database::get_risk_record(self, treatment_id)
    }

    fn list_records_without_request(&self) -> DbResult<Vec<AmuRiskRecord>> {
        Database::list_records_without_request(self)
    }
}

/// Intermediate row struct for database mapping.
struct RecordRow {
    record_id: String,
    treatment_id: String,
    entity_id: String,
    farm_id: String,
    species: String,
    medicine: String,
    matrix: String,
    dose_tier: String,
    overdosage: bool,
    withdrawal_exempt: bool,
    worst_tissue: Option<String>,
    risk_percent: Option<f64>,
    risk_category: Option<String>,
    withdrawal_days: Option<u32>,
    end_date: String,
    safe_date: Option<String>,
    model_version: String,
    catalog_version: String,
    record_hash: String,
    created_at: String,
}

fn record_row(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        record_id: row.get(0)?,
        treatment_id: row.get(1)?,
        entity_id: row.get(2)?,
        farm_id: row.get(3)?,
        species: row.get(4)?,
        medicine: row.get(5)?,
        matrix: row.get(6)?,
        dose_tier: row.get(7)?,
        overdosage: row.get(8)?,
        withdrawal_exempt: row.get(9)?,
        worst_tissue: row.get(10)?,
        risk_percent: row.get(11)?,
        risk_category: row.get(12)?,
        withdrawal_days: row.get(13)?,
        end_date: row.get(14)?,
        safe_date: row.get(15)?,
        model_version: row.get(16)?,
        catalog_version: row.get(17)?,
        record_hash: row.get(18)?,
        created_at: row.get(19)?,
    })
}

impl TryFrom<RecordRow> for AmuRiskRecord {
    type Error = DbError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let matrix = ProductMatrix::parse(&row.matrix)
            .ok_or_else(|| DbError::InvalidData(format!("Unknown matrix: {}", row.matrix)))?;
        let dose_tier = DoseTier::parse(&row.dose_tier)
            .ok_or_else(|| DbError::InvalidData(format!("Unknown dose tier: {}", row.dose_tier)))?;
        let risk_category = row.risk_category.as_deref().map(parse_category).transpose()?;

        Ok(AmuRiskRecord {
            record_id: row.record_id,
            treatment_id: row.treatment_id,
            entity_id: row.entity_id,
            farm_id: row.farm_id,
            species: row.species,
            medicine: row.medicine,
            matrix,
            dose_tier,
            overdosage: row.overdosage,
            withdrawal_exempt: row.withdrawal_exempt,
            tissues: Vec::new(),
            worst_tissue: row.worst_tissue,
            risk_percent: row.risk_percent,
            risk_category,
            withdrawal_days: row.withdrawal_days,
            end_date: parse_date(&row.end_date)?,
            safe_date: parse_optional_date(row.safe_date)?,
            model_version: row.model_version,
            catalog_version: row.catalog_version,
            record_hash: row.record_hash,
            created_at: row.created_at,
        })
    }
}

pub(super) fn parse_category(s: &str) -> DbResult<RiskCategory> {
    RiskCategory::parse(s)
        .ok_or_else(|| DbError::InvalidData(format!("Unknown risk category: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entity, Farm, Location, Treatment};
    use chrono::NaiveDate;

    fn setup_db() -> (Database, Treatment) {
        let db = Database::open_in_memory().unwrap();
        let mut farm = Farm::new("Farm".into(), Location::default());
        farm.farmer_id = Some("farmer-1".into());
        db.insert_farm(&farm).unwrap();
        let entity = Entity::new(farm.farm_id.clone(), "cattle".into(), ProductMatrix::Meat);
        db.insert_entity(&entity).unwrap();
        let treatment = Treatment::new(
            entity.entity_id.clone(),
            farm.farm_id.clone(),
            "cattle".into(),
            "Oxytetracycline".into(),
            20.0,
            "mg/kg".into(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        db.insert_treatment(&treatment).unwrap();
        (db, treatment)
    }

    fn make_record(treatment: &Treatment) -> AmuRiskRecord {
        let tissues = vec![
            TissueResidue {
                tissue: "muscle".into(),
                predicted_residue: 350.0 / 3.0,
                base_mrl: 200.0,
                risk_percent: 350.0 / 6.0,
                category: RiskCategory::Safe,
            },
            TissueResidue {
                tissue: "liver".into(),
                predicted_residue: 875.0,
                base_mrl: 600.0,
                risk_percent: 145.83333333333334,
                category: RiskCategory::Unsafe,
            },
        ];
        AmuRiskRecord {
            record_id: uuid::Uuid::new_v4().to_string(),
            treatment_id: treatment.treatment_id.clone(),
            entity_id: treatment.entity_id.clone(),
            farm_id: treatment.farm_id.clone(),
            species: treatment.species.clone(),
            medicine: treatment.medicine.clone(),
            matrix: ProductMatrix::Meat,
            dose_tier: DoseTier::Safe,
            overdosage: false,
            withdrawal_exempt: false,
            tissues,
            worst_tissue: Some("liver".into()),
            risk_percent: Some(145.83333333333334),
            risk_category: Some(RiskCategory::Unsafe),
            withdrawal_days: Some(1),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            safe_date: NaiveDate::from_ymd_opt(2024, 1, 3),
            model_version: "exp-decay-v1".into(),
            catalog_version: "2024.1".into(),
            created_at: chrono::Utc::now().to_rfc3339(),
            record_hash: String::new(),
        }
        .seal()
        .unwrap()
    }

    #[test]
    fn test_insert_and_reload_preserves_hash() {
        let (db, treatment) = setup_db();
        let record = make_record(&treatment);
        db.insert_risk_record(&record).unwrap();

        let stored = db.get_risk_record(&treatment.treatment_id).unwrap().unwrap();
        assert_eq!(stored, record);
        assert!(stored.verify_hash());
        assert_eq!(stored.tissues[0].tissue, "muscle");
    }

    #[test]
    fn test_second_record_is_conflict() {
        let (db, treatment) = setup_db();
        db.insert_risk_record(&make_record(&treatment)).unwrap();
        let result = db.insert_risk_record(&make_record(&treatment));
        assert!(matches!(result, Err(DbError::Conflict(_))));
        // The failed insert left no orphan tissue rows behind
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM amu_tissue_residues", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_treatment_locked_after_record() {
        let (db, mut treatment) = setup_db();
        db.insert_risk_record(&make_record(&treatment)).unwrap();

        treatment.dose_amount = 10.0;
        let result = db.update_treatment(&treatment);
        assert!(matches!(result, Err(DbError::Immutable(_))));
    }

    #[test]
    fn test_tissue_rows_cannot_be_deleted() {
        let (db, treatment) = setup_db();
        let record = make_record(&treatment);
        db.insert_risk_record(&record).unwrap();

        let result = db.conn().execute(
            "DELETE FROM amu_tissue_residues WHERE record_id = ?",
            [&record.record_id],
        );
        assert!(result.is_err());

        let stored = db.get_risk_record(&treatment.treatment_id).unwrap().unwrap();
        assert_eq!(stored.tissues.len(), 2);
        assert!(stored.verify_hash());
    }

    #[test]
    fn test_active_withdrawals_end_on_safe_date() {
        let (db, treatment) = setup_db();
        db.insert_risk_record(&make_record(&treatment)).unwrap();

        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let active = db.list_active_withdrawals(day(2), None).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].treatment_id, treatment.treatment_id);
        assert_eq!(active[0].tissues.len(), 2);

        assert_eq!(
            db.list_active_withdrawals(day(2), Some("farmer-1")).unwrap().len(),
            1
        );
        assert!(db
            .list_active_withdrawals(day(2), Some("someone-else"))
            .unwrap()
            .is_empty());

        // Safe date 2024-01-03: the animal is clear on that day
        assert!(db.list_active_withdrawals(day(3), None).unwrap().is_empty());
        assert!(db.list_active_withdrawals(day(4), None).unwrap().is_empty());
    }

    #[test]
    fn test_active_withdrawals_skip_records_without_safe_date() {
        let (db, treatment) = setup_db();
        let mut record = make_record(&treatment);
        record.safe_date = None;
        record.withdrawal_days = None;
        db.insert_risk_record(&record.seal().unwrap()).unwrap();

        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(db.list_active_withdrawals(today, None).unwrap().is_empty());
    }

    #[test]
    fn test_records_without_request() {
        let (db, treatment) = setup_db();
        db.insert_risk_record(&make_record(&treatment)).unwrap();
        let pending = db.list_records_without_request().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].treatment_id, treatment.treatment_id);
        assert_eq!(db.list_risk_records().unwrap().len(), 1);
    }
}
