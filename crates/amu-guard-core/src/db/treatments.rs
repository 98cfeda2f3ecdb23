//! Treatment database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{format_date, map_write_error, parse_date, Database, DbError, DbResult};
use crate::models::{Entity, Farm, MedicineCategory, Treatment};
use crate::store::TreatmentStore;

const TREATMENT_COLUMNS: &str = r#"
    treatment_id, entity_id, farm_id, species, medicine, category,
    dose_amount, dose_unit, route, frequency_per_day, duration_days,
    start_date, is_vaccine, body_weight_kg, created_at
"#;

impl Database {
    pub fn insert_treatment(&self, treatment: &Treatment) -> DbResult<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO treatments (
                    treatment_id, entity_id, farm_id, species, medicine, category,
                    dose_amount, dose_unit, route, frequency_per_day, duration_days,
                    start_date, is_vaccine, body_weight_kg, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                "#,
                params![
                    treatment.treatment_id,
                    treatment.entity_id,
                    treatment.farm_id,
                    treatment.species,
                    treatment.medicine,
                    treatment.category.as_str(),
                    treatment.dose_amount,
                    treatment.dose_unit,
                    treatment.route,
                    treatment.frequency_per_day,
                    treatment.duration_days,
                    format_date(treatment.start_date),
                    treatment.is_vaccine,
                    treatment.body_weight_kg,
                    treatment.created_at,
                ],
            )
            .map_err(|e| map_write_error(e, "treatment"))?;
        Ok(())
    }

    /// Update a treatment that has not yet been assessed.
    ///
    /// Returns `Immutable` once an AMU risk record references it.
    pub fn update_treatment(&self, treatment: &Treatment) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute(
                r#"
                UPDATE treatments SET
                    medicine = ?2,
                    category = ?3,
                    dose_amount = ?4,
                    dose_unit = ?5,
                    route = ?6,
                    frequency_per_day = ?7,
                    duration_days = ?8,
                    start_date = ?9,
                    is_vaccine = ?10,
                    body_weight_kg = ?11
                WHERE treatment_id = ?1
                "#,
                params![
                    treatment.treatment_id,
                    treatment.medicine,
                    treatment.category.as_str(),
                    treatment.dose_amount,
                    treatment.dose_unit,
                    treatment.route,
                    treatment.frequency_per_day,
                    treatment.duration_days,
                    format_date(treatment.start_date),
                    treatment.is_vaccine,
                    treatment.body_weight_kg,
                ],
            )
            .map_err(|e| match map_write_error(e, "treatment") {
                DbError::Constraint(_) => DbError::Immutable(format!(
                    "treatment {} has an AMU risk record",
                    treatment.treatment_id
                )),
                other => other,
            })?;
        Ok(rows_affected > 0)
    }

    pub fn get_treatment(&self, treatment_id: &str) -> DbResult<Option<Treatment>> {
        let sql = format!(
            "SELECT {} FROM treatments WHERE treatment_id = ?",
            TREATMENT_COLUMNS
        );
        self.conn
            .query_row(&sql, [treatment_id], treatment_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    pub fn list_treatments_for_entity(&self, entity_id: &str) -> DbResult<Vec<Treatment>> {
        let sql = format!(
            "SELECT {} FROM treatments WHERE entity_id = ? ORDER BY start_date, rowid",
            TREATMENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([entity_id], treatment_row)?;

        let mut treatments = Vec::new();
        for row in rows {
            treatments.push(row?.try_into()?);
        }
        Ok(treatments)
    }

    /// Treatments with no AMU risk record yet.
    pub fn list_unassessed_treatments(&self) -> DbResult<Vec<Treatment>> {
        let sql = format!(
            r#"
            SELECT {} FROM treatments t
            WHERE NOT EXISTS (
                SELECT 1 FROM amu_risk_records r WHERE r.treatment_id = t.treatment_id
            )
            ORDER BY start_date, rowid
            "#,
            TREATMENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], treatment_row)?;

        let mut treatments = Vec::new();
        for row in rows {
            treatments.push(row?.try_into()?);
        }
        Ok(treatments)
    }
}

impl TreatmentStore for Database {
    fn get_treatment(&self, treatment_id: &str) -> DbResult<Option<Treatment>> {
        Database::get_treatment(self, treatment_id)
    }

    fn get_entity(&self, entity_id: &str) -> DbResult<Option<Entity>> {
        Database::get_entity(self, entity_id)
    }

    fn get_farm(&self, farm_id: &str) -> DbResult<Option<Farm>> {
        Database::get_farm(self, farm_id)
    }
}

/// Intermediate row struct for database mapping.
struct TreatmentRow {
    treatment_id: String,
    entity_id: String,
    farm_id: String,
    species: String,
    medicine: String,
    category: String,
    dose_amount: f64,
    dose_unit: String,
    route: Option<String>,
    frequency_per_day: u32,
    duration_days: u32,
    start_date: String,
    is_vaccine: bool,
    body_weight_kg: Option<f64>,
    created_at: String,
}

fn treatment_row(row: &Row<'_>) -> rusqlite::Result<TreatmentRow> {
    Ok(TreatmentRow {
        treatment_id: row.get(0)?,
        entity_id: row.get(1)?,
        farm_id: row.get(2)?,
        species: row.get(3)?,
        medicine: row.get(4)?,
        category: row.get(5)?,
        dose_amount: row.get(6)?,
        dose_unit: row.get(7)?,
        route: row.get(8)?,
        frequency_per_day: row.get(9)?,
        duration_days: row.get(10)?,
        start_date: row.get(11)?,
        is_vaccine: row.get(12)?,
        body_weight_kg: row.get(13)?,
        created_at: row.get(14)?,
    })
}

impl TryFrom<TreatmentRow> for Treatment {
    type Error = DbError;

    fn try_from(row: TreatmentRow) -> Result<Self, Self::Error> {
        let category = MedicineCategory::parse(&row.category).ok_or_else(|| {
            DbError::InvalidData(format!("Unknown medicine category: {}", row.category))
        })?;

        Ok(Treatment {
            treatment_id: row.treatment_id,
            entity_id: row.entity_id,
            farm_id: row.farm_id,
            species: row.species,
            medicine: row.medicine,
            category,
            dose_amount: row.dose_amount,
            dose_unit: row.dose_unit,
            route: row.route,
            frequency_per_day: row.frequency_per_day,
            duration_days: row.duration_days,
            start_date: parse_date(&row.start_date)?,
            is_vaccine: row.is_vaccine,
            body_weight_kg: row.body_weight_kg,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, ProductMatrix};
    use chrono::NaiveDate;

    fn setup_db() -> (Database, Entity) {
        let db = Database::open_in_memory().unwrap();
        let farm = Farm::new("Farm".into(), Location::default());
        db.insert_farm(&farm).unwrap();
        let entity = Entity::new(farm.farm_id.clone(), "cattle".into(), ProductMatrix::Meat);
        db.insert_entity(&entity).unwrap();
        (db, entity)
    }

    fn make_treatment(entity: &Entity) -> Treatment {
        let mut t = Treatment::new(
            entity.entity_id.clone(),
            entity.farm_id.clone(),
            "cattle".into(),
            "Enrofloxacin".into(),
            5.0,
            "mg/kg".into(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        t.category = MedicineCategory::Antibiotic;
        t.duration_days = 5;
        t.route = Some("IM".into());
        t
    }

    #[test]
    fn test_insert_and_get_treatment() {
        let (db, entity) = setup_db();
        let treatment = make_treatment(&entity);
        db.insert_treatment(&treatment).unwrap();

        let retrieved = db.get_treatment(&treatment.treatment_id).unwrap().unwrap();
        assert_eq!(retrieved, treatment);
    }

    #[test]
    fn test_update_before_assessment() {
        let (db, entity) = setup_db();
        let mut treatment = make_treatment(&entity);
        db.insert_treatment(&treatment).unwrap();

        treatment.dose_amount = 4.0;
        assert!(db.update_treatment(&treatment).unwrap());
        let retrieved = db.get_treatment(&treatment.treatment_id).unwrap().unwrap();
        assert_eq!(retrieved.dose_amount, 4.0);
    }

    #[test]
    fn test_unassessed_listing() {
        let (db, entity) = setup_db();
        let treatment = make_treatment(&entity);
        db.insert_treatment(&treatment).unwrap();
        let pending = db.list_unassessed_treatments().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(db.list_treatments_for_entity(&entity.entity_id).unwrap().len(), 1);
    }
}
