//! Reference catalog of dose bands, residue limits and withdrawal curves.
//!
//! The catalog is loaded once from JSON, validated as a whole and then only
//! read. Lookups are case-insensitive on species and medicine; a miss is
//! reported as `None` and never filled in with a near match.

mod validate;

pub use validate::{validate_entries, validate_entry};

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::models::ReferenceEntry;

/// Catalog shipped with the crate.
pub const BUILTIN_CATALOG_JSON: &str = include_str!("../../data/reference_catalog.json");

/// Minimum Jaro-Winkler similarity for a name suggestion.
pub const SUGGESTION_THRESHOLD: f64 = 0.85;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid reference catalog: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Read access to reference entries.
pub trait ReferenceLookup {
    fn lookup(&self, species: &str, medicine: &str) -> Option<&ReferenceEntry>;

    /// Version label recorded on every risk record.
    fn version(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    version: String,
    entries: Vec<ReferenceEntry>,
}

/// Validated, immutable reference catalog.
#[derive(Debug, Clone)]
pub struct ReferenceCatalog {
    version: String,
    entries: Vec<ReferenceEntry>,
    index: HashMap<(String, String), usize>,
}

pub(crate) fn catalog_key(species: &str, medicine: &str) -> (String, String) {
    (species.trim().to_lowercase(), medicine.trim().to_lowercase())
}

impl ReferenceCatalog {
    /// Build a catalog, rejecting it entirely if any entry is invalid.
    pub fn from_entries(version: String, entries: Vec<ReferenceEntry>) -> CatalogResult<Self> {
        let errors = validate_entries(&entries);
        if !errors.is_empty() {
            return Err(CatalogError::Invalid(errors));
        }

        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (catalog_key(&e.species, &e.medicine), i))
            .collect();

        Ok(Self {
            version,
            entries,
            index,
        })
    }

    pub fn from_json(json: &str) -> CatalogResult<Self> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        Self::from_entries(document.version, document.entries)
    }

    pub fn load(path: &Path) -> CatalogResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&json)?;
        tracing::info!(
            path = ?path,
            version = %catalog.version,
            entries = catalog.len(),
            "Loaded reference catalog"
        );
        Ok(catalog)
    }

    /// The catalog embedded in the crate.
    pub fn builtin() -> CatalogResult<Self> {
        Self::from_json(BUILTIN_CATALOG_JSON)
    }

    /// Load from `path` when given, otherwise the built-in catalog.
    pub fn load_or_builtin(path: Option<&Path>) -> CatalogResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    /// Entries for one species, in document order.
    pub fn entries_for_species<'a>(
        &'a self,
        species: &'a str,
    ) -> impl Iterator<Item = &'a ReferenceEntry> + 'a {
        let species = species.trim().to_lowercase();
        self.entries
            .iter()
            .filter(move |e| e.species.to_lowercase() == species)
    }

    /// Close medicine names for a species, best first. Diagnostics only.
    pub fn suggest(&self, species: &str, medicine: &str) -> Vec<String> {
        let wanted = medicine.trim().to_lowercase();
        let mut scored: Vec<(f64, &str)> = self
            .entries_for_species(species)
            .map(|e| {
                (
                    strsim::jaro_winkler(&wanted, &e.medicine.to_lowercase()),
                    e.medicine.as_str(),
                )
            })
            .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(_, name)| name.to_string()).collect()
    }
}

impl ReferenceLookup for ReferenceCatalog {
    fn lookup(&self, species: &str, medicine: &str) -> Option<&ReferenceEntry> {
        let found = self
            .index
            .get(&catalog_key(species, medicine))
            .and_then(|&i| self.entries.get(i));
        if found.is_none() {
            tracing::warn!(
                species,
                medicine,
                suggestions = ?self.suggest(species, medicine),
                "No reference catalog entry"
            );
        }
        found
    }

    fn version(&self) -> &str {
        &self.version
    }
}
