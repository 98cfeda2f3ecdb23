//! Source rows for biomass aggregation.

use super::{parse_date, Database, DbResult};
use crate::biomass::{BiomassFilter, BiomassInput};
use crate::store::BiomassSource;

impl Database {
    /// Treatments joined with their entity and farm, narrowed by `filter`.
    pub fn biomass_inputs(&self, filter: &BiomassFilter) -> DbResult<Vec<BiomassInput>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.treatment_id, t.farm_id, t.species, f.state, f.district,
                   t.start_date, t.dose_amount, t.duration_days, e.population_count,
                   t.body_weight_kg, e.weight_kg
            FROM treatments t
            JOIN entities e ON e.entity_id = t.entity_id
            JOIN farms f ON f.farm_id = t.farm_id
            ORDER BY t.start_date, t.rowid
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, u32>(7)?,
                row.get::<_, u32>(8)?,
                row.get::<_, Option<f64>>(9)?,
                row.get::<_, Option<f64>>(10)?,
            ))
        })?;

        let mut inputs = Vec::new();
        for row in rows {
            let (
                treatment_id,
                farm_id,
                species,
                state,
                district,
                start_date,
                dose_amount,
                duration_days,
                population_count,
                treatment_weight_kg,
                entity_weight_kg,
            ) = row?;
            let input = BiomassInput {
                treatment_id,
                farm_id,
                species,
                state,
                district,
                start_date: parse_date(&start_date)?,
                dose_amount,
                duration_days,
                population_count,
                treatment_weight_kg,
                entity_weight_kg,
            };
            if filter.matches(&input) {
                inputs.push(input);
            }
        }
        Ok(inputs)
    }
}

impl BiomassSource for Database {
    fn biomass_inputs(&self, filter: &BiomassFilter) -> DbResult<Vec<BiomassInput>> {
        Database::biomass_inputs(self, filter)
    }
}
