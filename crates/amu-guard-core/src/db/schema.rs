//! SQLite schema definition.

/// Complete database schema for amu-guard.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Farms, animals and batches
-- ============================================================================

CREATE TABLE IF NOT EXISTS farms (
    farm_id TEXT PRIMARY KEY,
    farmer_id TEXT,
    name TEXT NOT NULL,
    state TEXT,
    district TEXT,
    taluk TEXT,
    latitude REAL,
    longitude REAL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_farms_location ON farms(state, district);
CREATE INDEX IF NOT EXISTS idx_farms_farmer ON farms(farmer_id);

CREATE TABLE IF NOT EXISTS entities (
    entity_id TEXT PRIMARY KEY,
    farm_id TEXT NOT NULL REFERENCES farms(farm_id),
    species TEXT NOT NULL,
    tag_id TEXT,
    batch_name TEXT,
    population_count INTEGER NOT NULL DEFAULT 1 CHECK (population_count >= 1),
    weight_kg REAL,
    product_matrix TEXT NOT NULL DEFAULT 'meat'
        CHECK (product_matrix IN ('meat', 'milk', 'egg')),
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_entities_farm ON entities(farm_id);

-- ============================================================================
-- Treatments (locked once an AMU risk record exists)
-- ============================================================================

CREATE TABLE IF NOT EXISTS treatments (
    treatment_id TEXT PRIMARY KEY,
    entity_id TEXT NOT NULL REFERENCES entities(entity_id),
    farm_id TEXT NOT NULL REFERENCES farms(farm_id),
    species TEXT NOT NULL,
    medicine TEXT NOT NULL,
    category TEXT NOT NULL,
    dose_amount REAL NOT NULL,
    dose_unit TEXT NOT NULL,
    route TEXT,
    frequency_per_day INTEGER NOT NULL DEFAULT 1 CHECK (frequency_per_day >= 1),
    duration_days INTEGER NOT NULL DEFAULT 1 CHECK (duration_days >= 0),
    start_date TEXT NOT NULL,                     -- YYYY-MM-DD
    is_vaccine INTEGER NOT NULL DEFAULT 0,
    body_weight_kg REAL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_treatments_entity ON treatments(entity_id);
CREATE INDEX IF NOT EXISTS idx_treatments_farm ON treatments(farm_id);
CREATE INDEX IF NOT EXISTS idx_treatments_start ON treatments(start_date);

-- ============================================================================
-- AMU Risk Records (write once)
-- ============================================================================

CREATE TABLE IF NOT EXISTS amu_risk_records (
    record_id TEXT PRIMARY KEY,
    treatment_id TEXT NOT NULL UNIQUE REFERENCES treatments(treatment_id),
    entity_id TEXT NOT NULL,
    farm_id TEXT NOT NULL,
    species TEXT NOT NULL,
    medicine TEXT NOT NULL,
    matrix TEXT NOT NULL CHECK (matrix IN ('meat', 'milk', 'egg')),
    dose_tier TEXT NOT NULL,
    overdosage INTEGER NOT NULL,
    withdrawal_exempt INTEGER NOT NULL,
    worst_tissue TEXT,
    risk_percent REAL,
    risk_category TEXT CHECK (risk_category IN ('safe', 'borderline', 'unsafe')),
    withdrawal_days INTEGER,
    end_date TEXT NOT NULL,
    safe_date TEXT,
    model_version TEXT NOT NULL,
    catalog_version TEXT NOT NULL,
    record_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_risk_records_farm ON amu_risk_records(farm_id);
CREATE INDEX IF NOT EXISTS idx_risk_records_safe_date ON amu_risk_records(safe_date);

-- Per-tissue predictions, in catalog order
CREATE TABLE IF NOT EXISTS amu_tissue_residues (
    record_id TEXT NOT NULL REFERENCES amu_risk_records(record_id),
    position INTEGER NOT NULL,
    tissue TEXT NOT NULL,
    predicted_residue REAL NOT NULL,
    base_mrl REAL NOT NULL,
    risk_percent REAL NOT NULL,
    risk_category TEXT NOT NULL CHECK (risk_category IN ('safe', 'borderline', 'unsafe')),
    PRIMARY KEY (record_id, position)
);

CREATE TRIGGER IF NOT EXISTS treatments_locked_update BEFORE UPDATE ON treatments
WHEN EXISTS (SELECT 1 FROM amu_risk_records WHERE treatment_id = old.treatment_id)
BEGIN
    SELECT RAISE(ABORT, 'Treatment is locked by its AMU risk record');
END;

CREATE TRIGGER IF NOT EXISTS treatments_locked_delete BEFORE DELETE ON treatments
WHEN EXISTS (SELECT 1 FROM amu_risk_records WHERE treatment_id = old.treatment_id)
BEGIN
    SELECT RAISE(ABORT, 'Treatment is locked by its AMU risk record');
END;

CREATE TRIGGER IF NOT EXISTS amu_risk_records_no_update BEFORE UPDATE ON amu_risk_records
BEGIN
    SELECT RAISE(ABORT, 'AMU risk records are immutable');
END;

CREATE TRIGGER IF NOT EXISTS amu_risk_records_no_delete BEFORE DELETE ON amu_risk_records
BEGIN
    SELECT RAISE(ABORT, 'AMU risk records are immutable');
END;

CREATE TRIGGER IF NOT EXISTS amu_tissue_residues_no_update BEFORE UPDATE ON amu_tissue_residues
BEGIN
    SELECT RAISE(ABORT, 'AMU risk records are immutable');
END;

CREATE TRIGGER IF NOT EXISTS amu_tissue_residues_no_delete BEFORE DELETE ON amu_tissue_residues
BEGIN
    SELECT RAISE(ABORT, 'AMU risk records are immutable');
END;

-- ============================================================================
-- Laboratories (rowid preserves creation order)
-- ============================================================================

CREATE TABLE IF NOT EXISTS laboratories (
    lab_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    state TEXT,
    district TEXT,
    taluk TEXT,
    latitude REAL,
    longitude REAL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Sample compliance workflow
-- ============================================================================

CREATE TABLE IF NOT EXISTS sample_requests (
    request_id TEXT PRIMARY KEY,
    treatment_id TEXT NOT NULL UNIQUE REFERENCES treatments(treatment_id),
    entity_id TEXT NOT NULL,
    farm_id TEXT NOT NULL,
    farmer_id TEXT,
    assigned_lab_id TEXT REFERENCES laboratories(lab_id),
    assignment_method TEXT
        CHECK (assignment_method IN ('nearest', 'same_district', 'same_state', 'default', 'manual')),
    distance_km REAL,
    safe_date TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'requested'
        CHECK (status IN ('requested', 'collected', 'tested', 'completed')),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_sample_requests_status ON sample_requests(status);
CREATE INDEX IF NOT EXISTS idx_sample_requests_lab ON sample_requests(assigned_lab_id);

-- Status only moves one step forward
CREATE TRIGGER IF NOT EXISTS sample_requests_status_forward
BEFORE UPDATE OF status ON sample_requests
WHEN NOT (
    (old.status = 'requested' AND new.status = 'collected') OR
    (old.status = 'collected' AND new.status = 'tested') OR
    (old.status = 'tested' AND new.status = 'completed')
)
BEGIN
    SELECT RAISE(ABORT, 'Invalid sample request status transition');
END;

CREATE TABLE IF NOT EXISTS samples (
    sample_id TEXT PRIMARY KEY,
    request_id TEXT NOT NULL UNIQUE REFERENCES sample_requests(request_id),
    sample_type TEXT NOT NULL,
    collected_on TEXT NOT NULL,
    collected_by_lab_id TEXT NOT NULL REFERENCES laboratories(lab_id),
    remarks TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS lab_test_reports (
    report_id TEXT PRIMARY KEY,
    sample_id TEXT NOT NULL UNIQUE REFERENCES samples(sample_id),
    request_id TEXT NOT NULL REFERENCES sample_requests(request_id),
    lab_id TEXT NOT NULL REFERENCES laboratories(lab_id),
    detected_residue REAL NOT NULL,
    mrl_limit REAL NOT NULL,
    final_status TEXT NOT NULL CHECK (final_status IN ('safe', 'borderline', 'unsafe')),
    withdrawal_days_remaining INTEGER NOT NULL DEFAULT 0,
    tested_on TEXT NOT NULL,
    remarks TEXT,
    certificate_ref TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Feed risk
-- ============================================================================

CREATE TABLE IF NOT EXISTS feed_scores (
    species TEXT NOT NULL,
    feed_item TEXT NOT NULL,
    fni REAL NOT NULL,
    PRIMARY KEY (species, feed_item)
);

CREATE TABLE IF NOT EXISTS feed_risk_summaries (
    summary_id TEXT PRIMARY KEY,
    farmer_id TEXT NOT NULL,
    species TEXT NOT NULL,
    daily_fni REAL NOT NULL,
    health_risk REAL NOT NULL,
    amu_risk REAL NOT NULL,
    risk_level TEXT NOT NULL CHECK (risk_level IN ('low', 'moderate', 'high', 'very_high')),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_feed_summaries_farmer ON feed_risk_summaries(farmer_id, created_at);

CREATE TABLE IF NOT EXISTS feed_entries (
    entry_id TEXT PRIMARY KEY,
    summary_id TEXT NOT NULL REFERENCES feed_risk_summaries(summary_id),
    farmer_id TEXT NOT NULL,
    species TEXT NOT NULL,
    feed_item TEXT NOT NULL,
    inclusion_rate REAL NOT NULL CHECK (inclusion_rate >= 0),
    fni_contribution REAL NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_feed_entries_farmer ON feed_entries(farmer_id, created_at);
"#;
