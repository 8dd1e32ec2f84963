//! Vehicle capability resolver
//!
//! Resolution is a pure function of the selection plus the database, so
//! results are cached per normalised key and shared via `Arc`. One
//! resolver instance can serve any number of sessions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};
use vecu_core::{EcuCapability, VehicleKey, VehicleProfile, VehicleSearchResult};

use crate::database::{CapabilityDatabase, ProfileEntry, TomlVehicleDatabase};

/// Successful capability resolution for one vehicle.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Canonical profile (database casing, production range label)
    pub profile: VehicleProfile,
    /// ECUs reachable in this vehicle
    pub ecus: Vec<EcuCapability>,
    /// Brands the backing database knows about, for selection pickers
    pub supported_brands: Vec<String>,
}

/// Resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    #[error("Vehicle not found: {make} {model} {year}")]
    VehicleNotFound {
        make: String,
        model: String,
        year: u16,
    },
}

/// Maps vehicle selections to ECU capability sets.
pub struct CapabilityResolver {
    database: Arc<dyn CapabilityDatabase>,
    cache: RwLock<HashMap<VehicleKey, Arc<Resolution>>>,
}

impl CapabilityResolver {
    pub fn new(database: Arc<dyn CapabilityDatabase>) -> Self {
        Self {
            database,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolver over the bundled development dataset.
    pub fn builtin() -> Self {
        Self::new(Arc::new(TomlVehicleDatabase::builtin()))
    }

    /// Resolve the capability set for a vehicle, serving repeats from the
    /// cache.
    pub fn resolve(
        &self,
        make: &str,
        model: &str,
        year: u16,
        engine: Option<&str>,
    ) -> Result<Arc<Resolution>, ResolverError> {
        let key = VehicleKey::new(make, model, year, engine);
        if let Some(hit) = self.cache.read().get(&key) {
            debug!(make, model, year, "Capability cache hit");
            return Ok(hit.clone());
        }
        self.resolve_key(key, make, model, year, engine)
    }

    /// Resolve bypassing the cache, then re-prime it.
    ///
    /// Lets a session recovering from a critical programming outcome
    /// observe current data instead of a stale entry.
    pub fn resolve_uncached(
        &self,
        make: &str,
        model: &str,
        year: u16,
        engine: Option<&str>,
    ) -> Result<Arc<Resolution>, ResolverError> {
        let key = VehicleKey::new(make, model, year, engine);
        self.resolve_key(key, make, model, year, engine)
    }

    fn resolve_key(
        &self,
        key: VehicleKey,
        make: &str,
        model: &str,
        year: u16,
        engine: Option<&str>,
    ) -> Result<Arc<Resolution>, ResolverError> {
        let record = self
            .database
            .lookup(&key)
            .ok_or_else(|| ResolverError::VehicleNotFound {
                make: make.trim().to_string(),
                model: model.trim().to_string(),
                year,
            })?;

        let resolution = Arc::new(Resolution {
            profile: VehicleProfile {
                make: record.make.clone(),
                model: record.model.clone(),
                year,
                engine: engine.map(str::to_string),
                year_range: record.year_range(),
            },
            ecus: record.ecus.clone(),
            supported_brands: self.database.supported_brands(),
        });

        info!(
            make = %resolution.profile.make,
            model = %resolution.profile.model,
            year,
            ecus = resolution.ecus.len(),
            "Vehicle capabilities resolved"
        );

        self.cache.write().insert(key, resolution.clone());
        Ok(resolution)
    }

    /// Model names available for one brand.
    pub fn list_models(&self, brand: &str) -> Vec<String> {
        self.database.models_for_brand(brand)
    }

    /// Brands the database covers.
    pub fn supported_brands(&self) -> Vec<String> {
        self.database.supported_brands()
    }

    /// Free-text vehicle search with optional year and engine narrowing.
    ///
    /// An empty query matches nothing. Results are ranked exact match
    /// first, then prefix, then substring, then token overlap.
    pub fn search(
        &self,
        query: &str,
        year: Option<u16>,
        engine: Option<&str>,
    ) -> Vec<VehicleSearchResult> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let engine_needle = engine.map(|e| e.trim().to_lowercase());

        let mut hits: Vec<VehicleSearchResult> = self
            .database
            .profiles()
            .into_iter()
            .filter(|p| {
                year.map_or(true, |y| y >= p.year_from && y <= p.year_to)
                    && engine_needle.as_ref().map_or(true, |e| {
                        p.engines.is_empty() || p.engines.iter().any(|pe| pe.to_lowercase() == *e)
                    })
            })
            .filter_map(|p| {
                let score = score_profile(&p, &needle);
                (score > 0).then(|| VehicleSearchResult {
                    make: p.make.clone(),
                    model: p.model.clone(),
                    year_range: p.year_range(),
                    engines: p.engines,
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.make.cmp(&b.make))
                .then_with(|| a.model.cmp(&b.model))
        });
        hits
    }

    #[cfg(test)]
    fn cached_entries(&self) -> usize {
        self.cache.read().len()
    }
}

fn score_profile(profile: &ProfileEntry, needle: &str) -> u32 {
    let make = profile.make.to_lowercase();
    let model = profile.model.to_lowercase();
    let full = format!("{make} {model}");

    if full == needle || make == needle || model == needle {
        return 100;
    }
    if full.starts_with(needle) || model.starts_with(needle) {
        return 75;
    }
    if full.contains(needle) {
        return 50;
    }
    // Partial credit per query token found anywhere in the profile name.
    let matched = needle
        .split_whitespace()
        .filter(|token| full.contains(token))
        .count() as u32;
    matched * 10
}
