//! Feed score reference data and feed risk persistence.

use rusqlite::{params, OptionalExtension, Row};

use super::{map_write_error, Database, DbError, DbResult};
use crate::models::{
    FarmerFeedRisk, FeedEntry, FeedRiskLevel, FeedRiskStatistics, FeedRiskSummary, FeedScore,
};
use crate::store::FeedStore;

/// How many farmers the statistics view ranks.
const HIGHEST_RISK_LIMIT: u32 = 10;

impl Database {
    // ========================================================================
    // Feed scores
    // ========================================================================

    /// Insert or replace the FNI of a feed item.
    pub fn upsert_feed_score(&self, score: &FeedScore) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO feed_scores (species, feed_item, fni) VALUES (?1, ?2, ?3)
            ON CONFLICT(species, feed_item) DO UPDATE SET fni = excluded.fni
            "#,
            params![
                score.species.to_lowercase(),
                score.feed_item.to_lowercase(),
                score.fni
            ],
        )?;
        Ok(())
    }

    pub fn get_feed_score(&self, species: &str, feed_item: &str) -> DbResult<Option<FeedScore>> {
        Ok(self
            .conn
            .query_row(
                "SELECT species, feed_item, fni FROM feed_scores WHERE species = ?1 AND feed_item = ?2",
                params![species.trim().to_lowercase(), feed_item.trim().to_lowercase()],
                score_from_row,
            )
            .optional()?)
    }

    pub fn list_feed_scores(&self, species: &str) -> DbResult<Vec<FeedScore>> {
        let mut stmt = self.conn.prepare(
            "SELECT species, feed_item, fni FROM feed_scores WHERE species = ? ORDER BY feed_item",
        )?;
        let scores = stmt
            .query_map([species.trim().to_lowercase()], score_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scores)
    }

    // ========================================================================
    // Feed risk submissions
    // ========================================================================

    /// Write a summary and its entries; nothing is kept if any row fails.
    pub fn save_feed_assessment(
        &self,
        summary: &FeedRiskSummary,
        entries: &[FeedEntry],
    ) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO feed_risk_summaries (
                summary_id, farmer_id, species, daily_fni, health_risk,
                amu_risk, risk_level, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                summary.summary_id,
                summary.farmer_id,
                summary.species,
                summary.daily_fni,
                summary.health_risk,
                summary.amu_risk,
                summary.risk_level.as_str(),
                summary.created_at,
            ],
        )
        .map_err(|e| map_write_error(e, "feed risk summary"))?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO feed_entries (
                    entry_id, summary_id, farmer_id, species, feed_item,
                    inclusion_rate, fni_contribution, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.entry_id,
                    entry.summary_id,
                    entry.farmer_id,
                    entry.species,
                    entry.feed_item,
                    entry.inclusion_rate,
                    entry.fni_contribution,
                    entry.created_at,
                ])
                .map_err(|e| map_write_error(e, "feed entry"))?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Most recent summaries for a farmer, newest first.
    pub fn latest_feed_summaries(
        &self,
        farmer_id: &str,
        limit: u32,
    ) -> DbResult<Vec<FeedRiskSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT summary_id, farmer_id, species, daily_fni, health_risk,
                   amu_risk, risk_level, created_at
            FROM feed_risk_summaries
            WHERE farmer_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![farmer_id, limit], summary_row)?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?.try_into()?);
        }
        Ok(summaries)
    }

    /// Feed entries of a farmer, newest first.
    pub fn feed_history(&self, farmer_id: &str, limit: u32) -> DbResult<Vec<FeedEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT entry_id, summary_id, farmer_id, species, feed_item,
                   inclusion_rate, fni_contribution, created_at
            FROM feed_entries
            WHERE farmer_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )?;
        let entries = stmt
            .query_map(params![farmer_id, limit], |row| {
                Ok(FeedEntry {
                    entry_id: row.get(0)?,
                    summary_id: row.get(1)?,
                    farmer_id: row.get(2)?,
                    species: row.get(3)?,
                    feed_item: row.get(4)?,
                    inclusion_rate: row.get(5)?,
                    fni_contribution: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Counts per level, means, and farmers ranked by their latest AMU risk.
    pub fn feed_risk_statistics(&self) -> DbResult<FeedRiskStatistics> {
        let (total, mean_fni, mean_amu): (u32, Option<f64>, Option<f64>) = self.conn.query_row(
            "SELECT COUNT(*), AVG(daily_fni), AVG(amu_risk) FROM feed_risk_summaries",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let mut level_counts = Vec::with_capacity(FeedRiskLevel::ALL.len());
        for level in FeedRiskLevel::ALL {
            let count: u32 = self.conn.query_row(
                "SELECT COUNT(*) FROM feed_risk_summaries WHERE risk_level = ?",
                [level.as_str()],
                |row| row.get(0),
            )?;
            level_counts.push((level, count));
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT s.farmer_id, s.species, s.amu_risk, s.risk_level
            FROM feed_risk_summaries s
            WHERE s.rowid = (
                SELECT l.rowid FROM feed_risk_summaries l
                WHERE l.farmer_id = s.farmer_id
                ORDER BY l.created_at DESC, l.rowid DESC
                LIMIT 1
            )
            ORDER BY s.amu_risk DESC, s.farmer_id
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map([HIGHEST_RISK_LIMIT], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut highest_risk_farmers = Vec::new();
        for row in rows {
            let (farmer_id, species, amu_risk, level) = row?;
            highest_risk_farmers.push(FarmerFeedRisk {
                farmer_id,
                species,
                amu_risk,
                risk_level: parse_level(&level)?,
            });
        }

        Ok(FeedRiskStatistics {
            total_assessments: total,
            level_counts,
            mean_daily_fni: mean_fni,
            mean_amu_risk: mean_amu,
            highest_risk_farmers,
        })
    }
}

impl FeedStore for Database {
    fn get_feed_score(&self, species: &str, feed_item: &str) -> DbResult<Option<FeedScore>> {
        Database::get_feed_score(self, species, feed_item)
    }

    fn save_feed_assessment(
        &self,
        summary: &FeedRiskSummary,
        entries: &[FeedEntry],
    ) -> DbResult<()> {
        Database::save_feed_assessment(self, summary, entries)
    }
}

fn score_from_row(row: &Row<'_>) -> rusqlite::Result<FeedScore> {
    Ok(FeedScore {
        species: row.get(0)?,
        feed_item: row.get(1)?,
        fni: row.get(2)?,
    })
}

/// Intermediate row struct for database mapping.
struct SummaryRow {
    summary_id: String,
    farmer_id: String,
    species: String,
    daily_fni: f64,
    health_risk: f64,
    amu_risk: f64,
    risk_level: String,
    created_at: String,
}

fn summary_row(row: &Row<'_>) -> rusqlite::Result<SummaryRow> {
    Ok(SummaryRow {
        summary_id: row.get(0)?,
        farmer_id: row.get(1)?,
        species: row.get(2)?,
        daily_fni: row.get(3)?,
        health_risk: row.get(4)?,
        amu_risk: row.get(5)?,
        risk_level: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl TryFrom<SummaryRow> for FeedRiskSummary {
    type Error = DbError;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        Ok(FeedRiskSummary {
            summary_id: row.summary_id,
            farmer_id: row.farmer_id,
            species: row.species,
            daily_fni: row.daily_fni,
            health_risk: row.health_risk,
            amu_risk: row.amu_risk,
            risk_level: parse_level(&row.risk_level)?,
            created_at: row.created_at,
        })
    }
}

fn parse_level(s: &str) -> DbResult<FeedRiskLevel> {
    FeedRiskLevel::parse(s)
        .ok_or_else(|| DbError::InvalidData(format!("Unknown feed risk level: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(farmer: &str, amu_risk: f64, created_at: &str) -> FeedRiskSummary {
        FeedRiskSummary {
            summary_id: uuid::Uuid::new_v4().to_string(),
            farmer_id: farmer.into(),
            species: "cattle".into(),
            daily_fni: 1.0 - amu_risk / 0.45,
            health_risk: amu_risk / 0.45,
            amu_risk,
            risk_level: FeedRiskLevel::from_amu_risk(amu_risk),
            created_at: created_at.into(),
        }
    }

    fn entry(summary: &FeedRiskSummary, item: &str) -> FeedEntry {
        FeedEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            summary_id: summary.summary_id.clone(),
            farmer_id: summary.farmer_id.clone(),
            species: summary.species.clone(),
            feed_item: item.into(),
            inclusion_rate: 0.5,
            fni_contribution: 0.4,
            created_at: summary.created_at.clone(),
        }
    }

    #[test]
    fn test_feed_score_upsert_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_feed_score(&FeedScore {
            species: "Cattle".into(),
            feed_item: "Maize Silage".into(),
            fni: 0.7,
        })
        .unwrap();
        db.upsert_feed_score(&FeedScore {
            species: "cattle".into(),
            feed_item: "maize silage".into(),
            fni: 0.75,
        })
        .unwrap();

        let score = db.get_feed_score("CATTLE", " Maize Silage ").unwrap().unwrap();
        assert_eq!(score.fni, 0.75);
        assert_eq!(db.list_feed_scores("cattle").unwrap().len(), 1);
        assert!(db.get_feed_score("poultry", "maize silage").unwrap().is_none());
    }

    #[test]
    fn test_failed_entry_rolls_back_summary() {
        let db = Database::open_in_memory().unwrap();
        let s = summary("farmer-1", 0.3, "2024-01-01T00:00:00Z");
        let mut bad = entry(&s, "hay");
        bad.inclusion_rate = -1.0; // violates CHECK
        let result = db.save_feed_assessment(&s, &[entry(&s, "silage"), bad]);
        assert!(result.is_err());

        let summaries: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM feed_risk_summaries", [], |row| row.get(0))
            .unwrap();
        let entries: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM feed_entries", [], |row| row.get(0))
            .unwrap();
        assert_eq!((summaries, entries), (0, 0));
    }

    #[test]
    fn test_history_and_statistics() {
        let db = Database::open_in_memory().unwrap();
        let old = summary("farmer-1", 0.1, "2024-01-01T00:00:00Z");
        let new = summary("farmer-1", 0.5, "2024-02-01T00:00:00Z");
        let other = summary("farmer-2", 0.3, "2024-01-15T00:00:00Z");
        for s in [&old, &new, &other] {
            db.save_feed_assessment(s, &[entry(s, "silage")]).unwrap();
        }

        let latest = db.latest_feed_summaries("farmer-1", 1).unwrap();
        assert_eq!(latest[0].summary_id, new.summary_id);
        assert_eq!(db.feed_history("farmer-1", 10).unwrap().len(), 2);

        let stats = db.feed_risk_statistics().unwrap();
        assert_eq!(stats.total_assessments, 3);
        assert_eq!(stats.level_counts[0], (FeedRiskLevel::Low, 1));
        assert_eq!(stats.level_counts[1], (FeedRiskLevel::Moderate, 1));
        assert_eq!(stats.level_counts[2], (FeedRiskLevel::High, 1));
        assert!((stats.mean_amu_risk.unwrap() - 0.3).abs() < 1e-9);
        assert_eq!(stats.highest_risk_farmers.len(), 2);
        assert_eq!(stats.highest_risk_farmers[0].farmer_id, "farmer-1");
        assert_eq!(stats.highest_risk_farmers[0].amu_risk, 0.5);
    }
}
