//! Farm, entity and laboratory database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{map_write_error, Database, DbError, DbResult};
use crate::models::{Entity, Farm, GeoPoint, Laboratory, Location, ProductMatrix};
use crate::store::LaboratoryStore;

impl Database {
    // ========================================================================
    // Farms
    // ========================================================================

    pub fn insert_farm(&self, farm: &Farm) -> DbResult<()> {
        let (lat, lon) = split_coordinates(&farm.location);
        self.conn
            .execute(
                r#"
                INSERT INTO farms (
                    farm_id, farmer_id, name, state, district, taluk,
                    latitude, longitude, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    farm.farm_id,
                    farm.farmer_id,
                    farm.name,
                    farm.location.state,
                    farm.location.district,
                    farm.location.taluk,
                    lat,
                    lon,
                    farm.created_at,
                ],
            )
            .map_err(|e| map_write_error(e, "farm"))?;
        Ok(())
    }

    pub fn get_farm(&self, farm_id: &str) -> DbResult<Option<Farm>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT farm_id, farmer_id, name, state, district, taluk,
                       latitude, longitude, created_at
                FROM farms
                WHERE farm_id = ?
                "#,
                [farm_id],
                farm_from_row,
            )
            .optional()?)
    }

    pub fn list_farms(&self) -> DbResult<Vec<Farm>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT farm_id, farmer_id, name, state, district, taluk,
                   latitude, longitude, created_at
            FROM farms
            ORDER BY name
            "#,
        )?;
        let farms = stmt
            .query_map([], farm_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(farms)
    }

    // ========================================================================
    // Entities
    // ========================================================================

    pub fn insert_entity(&self, entity: &Entity) -> DbResult<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO entities (
                    entity_id, farm_id, species, tag_id, batch_name,
                    population_count, weight_kg, product_matrix, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    entity.entity_id,
                    entity.farm_id,
                    entity.species,
                    entity.tag_id,
                    entity.batch_name,
                    entity.population_count,
                    entity.weight_kg,
                    entity.product_matrix.as_str(),
                    entity.created_at,
                ],
            )
            .map_err(|e| map_write_error(e, "entity"))?;
        Ok(())
    }

    pub fn get_entity(&self, entity_id: &str) -> DbResult<Option<Entity>> {
        self.conn
            .query_row(
                r#"
                SELECT entity_id, farm_id, species, tag_id, batch_name,
                       population_count, weight_kg, product_matrix, created_at
                FROM entities
                WHERE entity_id = ?
                "#,
                [entity_id],
                entity_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    pub fn list_entities_for_farm(&self, farm_id: &str) -> DbResult<Vec<Entity>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT entity_id, farm_id, species, tag_id, batch_name,
                   population_count, weight_kg, product_matrix, created_at
            FROM entities
            WHERE farm_id = ?
            ORDER BY rowid
            "#,
        )?;
        let rows = stmt.query_map([farm_id], entity_row)?;

        let mut entities = Vec::new();
        for row in rows {
            entities.push(row?.try_into()?);
        }
        Ok(entities)
    }

    // ========================================================================
    // Laboratories
    // ========================================================================

    pub fn insert_laboratory(&self, lab: &Laboratory) -> DbResult<()> {
        let (lat, lon) = split_coordinates(&lab.location);
        self.conn
            .execute(
                r#"
                INSERT INTO laboratories (
                    lab_id, name, state, district, taluk, latitude, longitude, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    lab.lab_id,
                    lab.name,
                    lab.location.state,
                    lab.location.district,
                    lab.location.taluk,
                    lat,
                    lon,
                    lab.created_at,
                ],
            )
            .map_err(|e| map_write_error(e, "laboratory"))?;
        Ok(())
    }

    pub fn get_laboratory(&self, lab_id: &str) -> DbResult<Option<Laboratory>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT lab_id, name, state, district, taluk, latitude, longitude, created_at
                FROM laboratories
                WHERE lab_id = ?
                "#,
                [lab_id],
                lab_from_row,
            )
            .optional()?)
    }

    /// All laboratories in creation order.
    pub fn list_laboratories(&self) -> DbResult<Vec<Laboratory>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT lab_id, name, state, district, taluk, latitude, longitude, created_at
            FROM laboratories
            ORDER BY rowid
            "#,
        )?;
        let labs = stmt
            .query_map([], lab_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(labs)
    }
}

impl LaboratoryStore for Database {
    fn list_laboratories(&self) -> DbResult<Vec<Laboratory>> {
        Database::list_laboratories(self)
    }

    fn get_laboratory(&self, lab_id: &str) -> DbResult<Option<Laboratory>> {
        Database::get_laboratory(self, lab_id)
    }
}

fn split_coordinates(location: &Location) -> (Option<f64>, Option<f64>) {
    match location.coordinates {
        Some(p) => (Some(p.latitude), Some(p.longitude)),
        None => (None, None),
    }
}

fn location_from_columns(
    state: Option<String>,
    district: Option<String>,
    taluk: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Location {
    let coordinates = match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
        _ => None,
    };
    Location {
        state,
        district,
        taluk,
        coordinates,
    }
}

fn farm_from_row(row: &Row<'_>) -> rusqlite::Result<Farm> {
    Ok(Farm {
        farm_id: row.get(0)?,
        farmer_id: row.get(1)?,
        name: row.get(2)?,
        location: location_from_columns(row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?),
        created_at: row.get(8)?,
    })
}

fn lab_from_row(row: &Row<'_>) -> rusqlite::Result<Laboratory> {
    Ok(Laboratory {
        lab_id: row.get(0)?,
        name: row.get(1)?,
        location: location_from_columns(row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?),
        created_at: row.get(7)?,
    })
}

/// Intermediate row struct for database mapping.
struct EntityRow {
    entity_id: String,
    farm_id: String,
    species: String,
    tag_id: Option<String>,
    batch_name: Option<String>,
    population_count: u32,
    weight_kg: Option<f64>,
    product_matrix: String,
    created_at: String,
}

fn entity_row(row: &Row<'_>) -> rusqlite::Result<EntityRow> {
    Ok(EntityRow {
        entity_id: row.get(0)?,
        farm_id: row.get(1)?,
        species: row.get(2)?,
        tag_id: row.get(3)?,
        batch_name: row.get(4)?,
        population_count: row.get(5)?,
        weight_kg: row.get(6)?,
        product_matrix: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl TryFrom<EntityRow> for Entity {
    type Error = DbError;

    fn try_from(row: EntityRow) -> Result<Self, Self::Error> {
        let product_matrix = ProductMatrix::parse(&row.product_matrix).ok_or_else(|| {
            DbError::InvalidData(format!("Unknown product matrix: {}", row.product_matrix))
        })?;

        Ok(Entity {
            entity_id: row.entity_id,
            farm_id: row.farm_id,
            species: row.species,
            tag_id: row.tag_id,
            batch_name: row.batch_name,
            population_count: row.population_count,
            weight_kg: row.weight_kg,
            product_matrix,
            created_at: row.created_at,
        })
    }
}
