//! Vehicle identity models

use serde::{Deserialize, Serialize};

/// The vehicle a session is working on.
///
/// Built by the resolver from its database record; immutable once selected
/// and replaced wholesale on re-selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleProfile {
    /// Manufacturer ("BMW")
    pub make: String,
    /// Model name ("3 Series")
    pub model: String,
    /// Model year
    pub year: u16,
    /// Engine code, when the caller supplied one ("B48")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Production range label from the database ("2018-2023")
    pub year_range: String,
}

/// Normalised lookup key for a vehicle.
///
/// Make, model and engine are lower-cased and trimmed so that lookups and
/// cache hits are insensitive to caller formatting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VehicleKey {
    pub make: String,
    pub model: String,
    pub year: u16,
    pub engine: Option<String>,
}

impl VehicleKey {
    pub fn new(make: &str, model: &str, year: u16, engine: Option<&str>) -> Self {
        Self {
            make: normalise(make),
            model: normalise(model),
            year,
            engine: engine.map(normalise),
        }
    }
}

fn normalise(s: &str) -> String {
    s.trim().to_lowercase()
}

/// One ranked hit from a vehicle database search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleSearchResult {
    pub make: String,
    pub model: String,
    /// Production range label ("2018-2023")
    pub year_range: String,
    /// Engine codes available for this profile
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub engines: Vec<String>,
    /// Match score; higher ranks first
    pub score: u32,
}
