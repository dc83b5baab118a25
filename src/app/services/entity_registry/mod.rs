//! Entity registry for reconciling plant and station names
//!
//! Loads the plant master table once per run and maps the free-form
//! labels found in source workbooks onto canonical plant ids:
//! normalized exact match first, then a fuzzy fallback with a
//! configurable similarity cutoff, then `None`. Resolutions are cached
//! for the lifetime of the run and unmapped labels are counted so the
//! run metadata can surface them.

use crate::constants::{DEFAULT_PLANTS, REFERENCE_FILENAME};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub mod normalize;

pub use normalize::{canonicalize_plant_label, entity_key, normalize_label};

/// One row of the plant master table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Canonical plant id (e.g. "CH5")
    pub central_id: String,

    /// Display name (e.g. "CHARCANI V")
    pub central_nombre: String,

    /// Plant type ("HIDRO" / "TERMICA")
    pub tipo: String,

    /// Commissioning year
    pub anio_puesta: Option<i32>,

    /// Rated capacity in MW
    pub potencia_mw: Option<f64>,

    /// Grid zone
    pub zona: String,
}

/// Plant registry with cached label resolution
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    /// All reference records, in file order
    records: Vec<EntityRecord>,

    /// Canonical key (of id and of name) -> plant id
    lookup: HashMap<String, String>,

    /// Raw label -> resolution, for the lifetime of the run
    cache: HashMap<String, Option<String>>,

    /// Labels that resolved to nothing, with occurrence counts
    unmapped: HashMap<String, u64>,

    /// Minimum Jaro-Winkler similarity for the fuzzy fallback
    fuzzy_cutoff: f64,
}

impl EntityRegistry {
    /// Build a registry from records
    pub fn from_records(records: Vec<EntityRecord>, fuzzy_cutoff: f64) -> Self {
        let mut lookup = HashMap::new();
        for record in &records {
            lookup.insert(entity_key(&record.central_id), record.central_id.clone());
            lookup.insert(entity_key(&record.central_nombre), record.central_id.clone());
        }
        Self {
            records,
            lookup,
            cache: HashMap::new(),
            unmapped: HashMap::new(),
            fuzzy_cutoff,
        }
    }

    /// Load the plant reference from `<reference_dir>/centrales_egasa.csv`,
    /// creating it with the default EGASA plants when absent.
    ///
    /// Returns the registry together with the reference path so the run
    /// metadata can record the file as read.
    pub fn load_or_create(reference_dir: &Path, fuzzy_cutoff: f64) -> Result<(Self, PathBuf)> {
        let path = reference_dir.join(REFERENCE_FILENAME);
        if !path.exists() {
            write_default_reference(&path)?;
            info!("Plant reference created at {}", path.display());
        }

        let mut reader = csv::Reader::from_path(&path).map_err(|e| {
            Error::csv_parsing(
                path.display().to_string(),
                "could not open plant reference",
                Some(e),
            )
        })?;
        let mut records = Vec::new();
        for row in reader.deserialize::<EntityRecord>() {
            let record = row.map_err(|e| {
                Error::csv_parsing(
                    path.display().to_string(),
                    "invalid plant reference row",
                    Some(e),
                )
            })?;
            records.push(record);
        }
        debug!("Loaded {} plant reference record(s)", records.len());
        Ok((Self::from_records(records, fuzzy_cutoff), path))
    }

    /// Number of reference records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the reference is empty (every label maps to `None`)
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All reference records
    pub fn records(&self) -> &[EntityRecord] {
        &self.records
    }

    /// Resolve a free-form label to a plant id.
    ///
    /// Exact match on the canonical key, then the best fuzzy candidate if
    /// it clears the cutoff, else `None`. Misses are counted per label.
    pub fn map_label(&mut self, label: &str) -> Option<String> {
        let raw = label.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(cached) = self.cache.get(raw) {
            return cached.clone();
        }

        let key = entity_key(raw);
        let resolved = match self.lookup.get(&key) {
            Some(id) => Some(id.clone()),
            None => self.fuzzy_lookup(&key),
        };

        if resolved.is_none() {
            *self.unmapped.entry(raw.to_string()).or_insert(0) += 1;
        }
        self.cache.insert(raw.to_string(), resolved.clone());
        resolved
    }

    fn fuzzy_lookup(&self, key: &str) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        let (best_key, best_score) = self
            .lookup
            .keys()
            .map(|known| (known, strsim::jaro_winkler(key, known)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(known, score)| (known.clone(), score))?;

        if best_score >= self.fuzzy_cutoff {
            debug!(
                "Fuzzy-matched '{}' to '{}' (similarity {:.3})",
                key, best_key, best_score
            );
            self.lookup.get(&best_key).cloned()
        } else {
            None
        }
    }

    /// Total occurrences of labels that resolved to nothing
    pub fn unmapped_total(&self) -> u64 {
        self.unmapped.values().sum()
    }

    /// Most frequent unmapped labels, ties broken alphabetically
    pub fn unmapped_top(&self, n: usize) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .unmapped
            .iter()
            .map(|(label, count)| (label.clone(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }
}

/// Write the built-in plant reference
fn write_default_reference(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::io(format!("creating directory {}", parent.display()), e))?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| {
        Error::csv_parsing(
            path.display().to_string(),
            "could not create plant reference",
            Some(e),
        )
    })?;
    for (central_id, central_nombre, tipo, anio_puesta, potencia_mw, zona) in DEFAULT_PLANTS {
        let record = EntityRecord {
            central_id: central_id.to_string(),
            central_nombre: central_nombre.to_string(),
            tipo: tipo.to_string(),
            anio_puesta: Some(*anio_puesta),
            potencia_mw: Some(*potencia_mw),
            zona: zona.to_string(),
        };
        writer.serialize(&record).map_err(|e| {
            Error::csv_parsing(
                path.display().to_string(),
                "could not write plant reference row",
                Some(e),
            )
        })?;
    }
    writer.flush().map_err(|e| {
        Error::io(format!("flushing plant reference {}", path.display()), e)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> EntityRegistry {
        let records = vec![
            EntityRecord {
                central_id: "CH4".to_string(),
                central_nombre: "CHARCANI IV".to_string(),
                tipo: "HIDRO".to_string(),
                anio_puesta: Some(1959),
                potencia_mw: Some(14.40),
                zona: "SUR".to_string(),
            },
            EntityRecord {
                central_id: "CT1".to_string(),
                central_nombre: "C.T. CHILINA".to_string(),
                tipo: "TERMICA".to_string(),
                anio_puesta: Some(1981),
                potencia_mw: Some(22.00),
                zona: "SUR".to_string(),
            },
        ];
        EntityRegistry::from_records(records, 0.6)
    }

    #[test]
    fn test_exact_match_by_name_and_id() {
        let mut registry = sample_registry();
        assert_eq!(registry.map_label("CHARCANI IV").as_deref(), Some("CH4"));
        assert_eq!(registry.map_label("ch4").as_deref(), Some("CH4"));
        assert_eq!(registry.map_label("C.T. Chilina").as_deref(), Some("CT1"));
        assert_eq!(registry.unmapped_total(), 0);
    }

    #[test]
    fn test_roman_and_arabic_spellings_agree() {
        let mut registry = sample_registry();
        assert_eq!(registry.map_label("CHARCANI 4").as_deref(), Some("CH4"));
        assert_eq!(
            registry.map_label("C.H. CHARCANI IV").as_deref(),
            Some("CH4")
        );
    }

    #[test]
    fn test_fuzzy_match_above_cutoff() {
        let mut registry = sample_registry();
        // A dropped letter still clears the default cutoff
        assert_eq!(registry.map_label("CHARCNI IV").as_deref(), Some("CH4"));
        assert_eq!(registry.map_label("CHILINA").as_deref(), Some("CT1"));
    }

    #[test]
    fn test_unrelated_label_maps_to_none() {
        let mut registry = sample_registry();
        assert_eq!(registry.map_label("SAN GABAN"), None);
        assert_eq!(registry.map_label("SAN GABAN"), None);
        assert_eq!(registry.unmapped_total(), 2);
        assert_eq!(
            registry.unmapped_top(5),
            vec![("SAN GABAN".to_string(), 2)]
        );
    }

    #[test]
    fn test_cutoff_is_respected() {
        let records = sample_registry().records().to_vec();
        let mut strict = EntityRegistry::from_records(records, 0.99);
        // Similar, but not good enough for a 0.99 cutoff
        assert_eq!(strict.map_label("CHARCANI"), None);
        assert_eq!(strict.map_label("CHARCANI IV").as_deref(), Some("CH4"));
    }

    #[test]
    fn test_resolution_is_cached_and_idempotent() {
        let mut registry = sample_registry();
        let first = registry.map_label("Charcani IV");
        let second = registry.map_label("Charcani IV");
        assert_eq!(first, second);
        assert_eq!(first.as_deref(), Some("CH4"));
    }

    #[test]
    fn test_empty_registry_maps_everything_to_none() {
        let mut registry = EntityRegistry::from_records(Vec::new(), 0.6);
        assert!(registry.is_empty());
        assert_eq!(registry.map_label("CHARCANI IV"), None);
    }

    #[test]
    fn test_blank_labels_are_ignored() {
        let mut registry = sample_registry();
        assert_eq!(registry.map_label("   "), None);
        assert_eq!(registry.unmapped_total(), 0);
    }

    #[test]
    fn test_load_or_create_writes_default_reference() {
        let dir = tempfile::tempdir().unwrap();
        let (mut registry, path) =
            EntityRegistry::load_or_create(dir.path(), 0.6).unwrap();
        assert!(path.exists());
        assert_eq!(registry.len(), DEFAULT_PLANTS.len());
        assert_eq!(registry.map_label("CHARCANI V").as_deref(), Some("CH5"));
        assert_eq!(registry.map_label("C.T. MOLLENDO").as_deref(), Some("CT3"));

        // A second load reads the file instead of recreating it
        let (registry2, _) = EntityRegistry::load_or_create(dir.path(), 0.6).unwrap();
        assert_eq!(registry2.len(), registry.len());
    }
}
