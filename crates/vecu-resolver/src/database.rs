//! Vehicle capability database
//!
//! The database is the static collaborator behind the resolver: a lookup
//! of capability descriptors keyed by make, model, year and engine. The
//! TOML-backed implementation covers development and tests; production
//! builds can point the resolver at anything implementing
//! [`CapabilityDatabase`].

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use vecu_core::{EcuCapability, VehicleKey};

/// Read-only interface to static vehicle capability data.
///
/// Implementations must be cheap to query; the resolver calls them on
/// every cache miss and for every search.
pub trait CapabilityDatabase: Send + Sync {
    /// Brands present in the database, in display order.
    fn supported_brands(&self) -> Vec<String>;

    /// Model names available for one brand (case-insensitive).
    fn models_for_brand(&self, brand: &str) -> Vec<String>;

    /// Full record for a vehicle, if one matches the key.
    fn lookup(&self, key: &VehicleKey) -> Option<Arc<VehicleRecord>>;

    /// Profile summaries of every record, for search.
    fn profiles(&self) -> Vec<ProfileEntry>;
}

/// One database record: a production range of one model plus its ECU set.
#[derive(Debug, Clone)]
pub struct VehicleRecord {
    pub make: String,
    pub model: String,
    pub year_from: u16,
    pub year_to: u16,
    /// Engine codes this record covers; empty means any
    pub engines: Vec<String>,
    pub ecus: Vec<EcuCapability>,
}

impl VehicleRecord {
    /// Production range label ("2018-2023").
    pub fn year_range(&self) -> String {
        format!("{}-{}", self.year_from, self.year_to)
    }

    /// Whether this record covers the given key.
    ///
    /// Make and model compare case-insensitively, the year must fall in
    /// the production range, and a supplied engine must be listed unless
    /// the record declares none.
    pub fn matches(&self, key: &VehicleKey) -> bool {
        if self.make.to_lowercase() != key.make || self.model.to_lowercase() != key.model {
            return false;
        }
        if key.year < self.year_from || key.year > self.year_to {
            return false;
        }
        match &key.engine {
            Some(engine) if !self.engines.is_empty() => {
                self.engines.iter().any(|e| e.to_lowercase() == *engine)
            }
            _ => true,
        }
    }
}

/// Search-facing view of one record.
#[derive(Debug, Clone)]
pub struct ProfileEntry {
    pub make: String,
    pub model: String,
    pub year_from: u16,
    pub year_to: u16,
    pub engines: Vec<String>,
}

impl ProfileEntry {
    pub fn year_range(&self) -> String {
        format!("{}-{}", self.year_from, self.year_to)
    }
}

// ============================================================================
// TOML-backed implementation
// ============================================================================

/// Raw on-disk schema.
#[derive(Debug, Deserialize)]
struct DatabaseFile {
    /// Dataset revision label, informational
    #[serde(default)]
    revision: Option<String>,
    #[serde(default)]
    vehicles: Vec<VehicleEntry>,
}

#[derive(Debug, Deserialize)]
struct VehicleEntry {
    make: String,
    model: String,
    year_from: u16,
    year_to: u16,
    #[serde(default)]
    engines: Vec<String>,
    #[serde(default)]
    ecus: Vec<EcuCapability>,
}

/// [`CapabilityDatabase`] backed by a TOML document.
pub struct TomlVehicleDatabase {
    revision: Option<String>,
    records: Vec<Arc<VehicleRecord>>,
}

impl TomlVehicleDatabase {
    /// The bundled development dataset.
    pub fn builtin() -> Self {
        // Parse failure here is a packaging bug; the bundled data is
        // covered by unit tests.
        Self::from_toml_str(include_str!("../data/vehicles.toml"))
            .expect("bundled vehicle database is valid")
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, DatabaseError> {
        let file: DatabaseFile = toml::from_str(text)?;
        let mut records = Vec::with_capacity(file.vehicles.len());
        for entry in file.vehicles {
            validate_entry(&entry)?;
            records.push(Arc::new(VehicleRecord {
                make: entry.make,
                model: entry.model,
                year_from: entry.year_from,
                year_to: entry.year_to,
                engines: entry.engines,
                ecus: entry.ecus,
            }));
        }
        debug!(
            records = records.len(),
            revision = file.revision.as_deref().unwrap_or("unversioned"),
            "Vehicle database loaded"
        );
        Ok(Self {
            revision: file.revision,
            records,
        })
    }

    /// Load from a TOML file on disk.
    pub fn from_path(path: &Path) -> Result<Self, DatabaseError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Dataset revision label, when the file carries one.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

fn validate_entry(entry: &VehicleEntry) -> Result<(), DatabaseError> {
    let profile = format!("{} {}", entry.make, entry.model);
    if entry.year_from > entry.year_to {
        return Err(DatabaseError::Invalid(format!(
            "{profile}: year range {}-{} is reversed",
            entry.year_from, entry.year_to
        )));
    }
    let mut ecu_ids = BTreeSet::new();
    for ecu in &entry.ecus {
        if !ecu_ids.insert(ecu.id.as_str()) {
            return Err(DatabaseError::Invalid(format!(
                "{profile}: duplicate ECU id '{}'",
                ecu.id
            )));
        }
        let mut test_ids = BTreeSet::new();
        for test in &ecu.tests {
            if !test_ids.insert(test.id.as_str()) {
                return Err(DatabaseError::Invalid(format!(
                    "{profile}: ECU '{}' declares test '{}' twice",
                    ecu.id, test.id
                )));
            }
            if test.steps.is_empty() {
                return Err(DatabaseError::Invalid(format!(
                    "{profile}: test '{}' on ECU '{}' has no steps",
                    test.id, ecu.id
                )));
            }
        }
    }
    Ok(())
}

impl CapabilityDatabase for TomlVehicleDatabase {
    fn supported_brands(&self) -> Vec<String> {
        let mut brands = Vec::new();
        for record in &self.records {
            if !brands.contains(&record.make) {
                brands.push(record.make.clone());
            }
        }
        brands
    }

    fn models_for_brand(&self, brand: &str) -> Vec<String> {
        let needle = brand.trim().to_lowercase();
        let mut models = Vec::new();
        for record in &self.records {
            if record.make.to_lowercase() == needle && !models.contains(&record.model) {
                models.push(record.model.clone());
            }
        }
        models
    }

    fn lookup(&self, key: &VehicleKey) -> Option<Arc<VehicleRecord>> {
        self.records.iter().find(|r| r.matches(key)).cloned()
    }

    fn profiles(&self) -> Vec<ProfileEntry> {
        self.records
            .iter()
            .map(|r| ProfileEntry {
                make: r.make.clone(),
                model: r.model.clone(),
                year_from: r.year_from,
                year_to: r.year_to,
                engines: r.engines.clone(),
            })
            .collect()
    }
}

/// Database load and validation failures.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to read database file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse database: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid database: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
revision = "test"

[[vehicles]]
make = "BMW"
model = "3 Series"
year_from = 2018
year_to = 2023
engines = ["B48", "B58"]

[[vehicles.ecus]]
id = "ECM-1"
name = "Engine Control Module"
protocols = ["can"]

[[vehicles.ecus.tests]]
id = "OIL_RESET"
name = "Oil Service Reset"
routine = 0x0201
result_shape = "ack"
steps = [{ label = "Reset counters" }]
"#;

    #[test]
    fn parses_minimal_document() {
        let db = TomlVehicleDatabase::from_toml_str(MINIMAL).unwrap();
        assert_eq!(db.record_count(), 1);
        assert_eq!(db.revision(), Some("test"));
        assert_eq!(db.supported_brands(), vec!["BMW".to_string()]);
    }

    #[test]
    fn lookup_matches_year_in_range() {
        let db = TomlVehicleDatabase::from_toml_str(MINIMAL).unwrap();
        for year in [2018, 2021, 2023] {
            let key = VehicleKey::new("bmw", "3 SERIES", year, None);
            assert!(db.lookup(&key).is_some(), "year {year} should match");
        }
        let key = VehicleKey::new("BMW", "3 Series", 2017, None);
        assert!(db.lookup(&key).is_none());
    }

    #[test]
    fn lookup_checks_listed_engines() {
        let db = TomlVehicleDatabase::from_toml_str(MINIMAL).unwrap();
        assert!(db
            .lookup(&VehicleKey::new("BMW", "3 Series", 2021, Some("b48")))
            .is_some());
        assert!(db
            .lookup(&VehicleKey::new("BMW", "3 Series", 2021, Some("N20")))
            .is_none());
    }

    #[test]
    fn rejects_duplicate_ecu_ids() {
        let doc = r#"
[[vehicles]]
make = "A"
model = "B"
year_from = 2020
year_to = 2021

[[vehicles.ecus]]
id = "X"
name = "X"
protocols = ["can"]

[[vehicles.ecus]]
id = "X"
name = "X again"
protocols = ["can"]
"#;
        assert!(matches!(
            TomlVehicleDatabase::from_toml_str(doc),
            Err(DatabaseError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_test_without_steps() {
        let doc = r#"
[[vehicles]]
make = "A"
model = "B"
year_from = 2020
year_to = 2021

[[vehicles.ecus]]
id = "X"
name = "X"
protocols = ["can"]

[[vehicles.ecus.tests]]
id = "T"
name = "T"
routine = 1
result_shape = "ack"
steps = []
"#;
        assert!(matches!(
            TomlVehicleDatabase::from_toml_str(doc),
            Err(DatabaseError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_reversed_year_range() {
        let doc = r#"
[[vehicles]]
make = "A"
model = "B"
year_from = 2022
year_to = 2020
"#;
        assert!(matches!(
            TomlVehicleDatabase::from_toml_str(doc),
            Err(DatabaseError::Invalid(_))
        ));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vehicles.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let db = TomlVehicleDatabase::from_path(&path).unwrap();
        assert_eq!(db.record_count(), 1);
    }

    #[test]
    fn bundled_dataset_is_valid() {
        let db = TomlVehicleDatabase::builtin();
        assert!(db.record_count() >= 4);
        // The development dataset pins this profile; integration tests
        // select it.
        let key = VehicleKey::new("BMW", "3 Series", 2021, None);
        let record = db.lookup(&key).unwrap();
        assert_eq!(record.ecus.len(), 5);
        assert!(record
            .ecus
            .iter()
            .any(|e| e.id == "ECM-1" && e.test("OIL_RESET").is_some()));
    }
}
