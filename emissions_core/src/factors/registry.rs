//! Factor Registry
//!
//! The [`FactorRegistry`] trait is the lookup contract calculators depend on.
//! [`InMemoryRegistry`] is the reference implementation: a map behind a
//! read/write lock, ranked with [`super::best_match`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{best_match, seed, EmissionFactor, FactorQuery};
use crate::errors::{EmissionsError, EmissionsResult};

/// Storage and best-match lookup of emission factors.
///
/// Implementations must be shareable across batch workers. A lookup miss is
/// reported as [`EmissionsError::NotFound`]; any other error means the
/// backend itself failed.
pub trait FactorRegistry: Send + Sync {
    /// Fetch a factor by id.
    fn get_factor(&self, id: &str) -> EmissionsResult<EmissionFactor>;

    /// Best match for the query by specificity score.
    fn find_factor(&self, query: &FactorQuery) -> EmissionsResult<EmissionFactor>;

    /// Every factor matching the query, sorted by id.
    fn list_factors(&self, query: &FactorQuery) -> EmissionsResult<Vec<EmissionFactor>>;

    /// Add or replace a factor. Invalid factors are rejected and never stored.
    fn register_factor(&self, factor: EmissionFactor) -> EmissionsResult<()>;
}

/// In-memory registry options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Seed the registry with [`seed::default_factors`]
    pub preload_defaults: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            preload_defaults: true,
        }
    }
}

/// Overview of registry contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSummary {
    pub total_count: usize,
    pub by_scope: BTreeMap<String, usize>,
    pub by_region: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    /// Oldest and newest `created_at`, if any factors exist
    pub created_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Thread-safe in-memory factor store.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    factors: RwLock<HashMap<String, EmissionFactor>>,
}

impl InMemoryRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let registry = Self::new();
        if config.preload_defaults {
            if let Err(e) = registry.seed_defaults() {
                tracing::warn!(error = %e, "default emission factors not seeded");
            }
        }
        registry
    }

    /// Registry preloaded with the default factor set
    pub fn with_defaults() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    fn seed_defaults(&self) -> EmissionsResult<usize> {
        let defaults = seed::default_factors();
        let count = defaults.len();
        let mut map = self.write()?;
        for factor in defaults {
            map.insert(factor.id.clone(), factor);
        }
        tracing::debug!(count, "seeded default emission factors");
        Ok(count)
    }

    fn read(&self) -> EmissionsResult<RwLockReadGuard<'_, HashMap<String, EmissionFactor>>> {
        self.factors
            .read()
            .map_err(|_| EmissionsError::registry_unavailable("factor store lock poisoned"))
    }

    fn write(&self) -> EmissionsResult<RwLockWriteGuard<'_, HashMap<String, EmissionFactor>>> {
        self.factors
            .write()
            .map_err(|_| EmissionsError::registry_unavailable("factor store lock poisoned"))
    }

    /// Register many factors, stopping at the first invalid one.
    pub fn register_all(&self, factors: impl IntoIterator<Item = EmissionFactor>) -> EmissionsResult<usize> {
        let mut count = 0;
        for factor in factors {
            self.register_factor(factor)?;
            count += 1;
        }
        Ok(count)
    }

    /// Number of stored factors. A poisoned lock is logged and counted
    /// through, since every write leaves the map whole.
    pub fn len(&self) -> usize {
        match self.factors.read() {
            Ok(map) => map.len(),
            Err(poisoned) => {
                tracing::warn!("factor store lock poisoned, counting anyway");
                poisoned.into_inner().len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every factor.
    pub fn clear(&self) -> EmissionsResult<()> {
        self.write()?.clear();
        Ok(())
    }

    pub fn summarize(&self) -> EmissionsResult<FactorSummary> {
        let map = self.read()?;
        let mut summary = FactorSummary {
            total_count: map.len(),
            by_scope: BTreeMap::new(),
            by_region: BTreeMap::new(),
            by_source: BTreeMap::new(),
            created_range: None,
        };

        for f in map.values() {
            *summary.by_scope.entry(f.scope.to_string()).or_default() += 1;
            *summary.by_region.entry(f.region.clone()).or_default() += 1;
            *summary.by_source.entry(f.source.clone()).or_default() += 1;

            summary.created_range = Some(match summary.created_range {
                None => (f.created_at, f.created_at),
                Some((min, max)) => (min.min(f.created_at), max.max(f.created_at)),
            });
        }

        Ok(summary)
    }
}

impl FactorRegistry for InMemoryRegistry {
    fn get_factor(&self, id: &str) -> EmissionsResult<EmissionFactor> {
        self.read()?
            .get(id)
            .cloned()
            .ok_or_else(|| EmissionsError::not_found(format!("factor id '{}'", id)))
    }

    fn find_factor(&self, query: &FactorQuery) -> EmissionsResult<EmissionFactor> {
        let map = self.read()?;
        let best = best_match(map.values(), query).cloned();

        match best {
            Some(factor) => {
                tracing::debug!(
                    factor_id = %factor.id,
                    scope = factor.scope.number(),
                    region = %factor.region,
                    value = factor.value_kg_co2e_per_unit,
                    "found emission factor"
                );
                Ok(factor)
            }
            None => Err(EmissionsError::not_found(query.to_string())),
        }
    }

    fn list_factors(&self, query: &FactorQuery) -> EmissionsResult<Vec<EmissionFactor>> {
        let map = self.read()?;
        let mut matches: Vec<EmissionFactor> = map.values().filter(|f| query.matches(f)).cloned().collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    fn register_factor(&self, mut factor: EmissionFactor) -> EmissionsResult<()> {
        factor.validate()?;

        let mut map = self.write()?;
        if let Some(previous) = map.get(&factor.id) {
            factor.created_at = previous.created_at;
            factor.updated_at = Utc::now();
        }

        tracing::info!(
            factor_id = %factor.id,
            scope = factor.scope.number(),
            region = %factor.region,
            value = factor.value_kg_co2e_per_unit,
            "registered emission factor"
        );
        map.insert(factor.id.clone(), factor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use std::sync::Arc;
    use std::thread;

    fn grid(id: &str, region: &str, value: f64) -> EmissionFactor {
        EmissionFactor::new(id, Scope::Scope2, region, "electricity", "kWh", value)
    }

    #[test]
    fn test_register_and_get() {
        let registry = InMemoryRegistry::new();
        registry.register_factor(grid("grid-uk", "EU-UK", 0.207)).unwrap();

        let f = registry.get_factor("grid-uk").unwrap();
        assert_eq!(f.value_kg_co2e_per_unit, 0.207);
        assert!(registry.get_factor("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_invalid_factor_never_stored() {
        let registry = InMemoryRegistry::new();
        let err = registry.register_factor(grid("bad", "", 0.2)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_FACTOR");
        assert!(registry.is_empty());

        assert!(registry.register_factor(grid("neg", "EU-UK", -1.0)).is_err());
        assert!(registry.get_factor("neg").is_err());
    }

    #[test]
    fn test_replace_by_id_keeps_created_at() {
        let registry = InMemoryRegistry::new();
        registry.register_factor(grid("g", "EU-UK", 0.2)).unwrap();
        let created = registry.get_factor("g").unwrap().created_at;

        registry.register_factor(grid("g", "EU-UK", 0.25)).unwrap();
        let replaced = registry.get_factor("g").unwrap();
        assert_eq!(replaced.value_kg_co2e_per_unit, 0.25);
        assert_eq!(replaced.created_at, created);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_find_prefers_exact_region() {
        let registry = InMemoryRegistry::new();
        registry.register_factor(grid("a-global", "GLOBAL", 0.4)).unwrap();
        registry.register_factor(grid("b-west", "US-WEST", 0.298)).unwrap();

        let q = FactorQuery::new().scope(Scope::Scope2).region("US-WEST").unit("kWh");
        assert_eq!(registry.find_factor(&q).unwrap().id, "b-west");

        let q = FactorQuery::new().scope(Scope::Scope2).region("EU-UK").unit("kWh");
        assert_eq!(registry.find_factor(&q).unwrap().id, "a-global");

        let q = FactorQuery::new().scope(Scope::Scope1);
        assert!(registry.find_factor(&q).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_sorted_by_id() {
        let registry = InMemoryRegistry::new();
        for id in ["c", "a", "b"] {
            registry.register_factor(grid(id, "EU-UK", 0.2)).unwrap();
        }
        let ids: Vec<_> = registry
            .list_factors(&FactorQuery::new())
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_preload_and_summary() {
        let registry = InMemoryRegistry::with_defaults();
        assert!(!registry.is_empty());

        let summary = registry.summarize().unwrap();
        assert_eq!(summary.total_count, registry.len());
        assert!(summary.by_scope.contains_key("Scope 1"));
        assert!(summary.by_scope.contains_key("Scope 2"));
        assert!(summary.created_range.is_some());

        registry.clear().unwrap();
        assert!(registry.is_empty());
        assert!(registry.summarize().unwrap().created_range.is_none());
    }

    #[test]
    fn test_concurrent_reads_and_writes() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.register_factor(grid("base", "EU-UK", 0.2)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry.register_factor(grid(&format!("g{}", i), "EU-UK", 0.1)).unwrap();
                    registry.get_factor("base").unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.len(), 9);
    }

    #[test]
    fn test_poisoned_lock() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.register_factor(grid("base", "EU-UK", 0.2)).unwrap();

        let writer = Arc::clone(&registry);
        let outcome = thread::spawn(move || {
            let _guard = writer.factors.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(outcome.is_err());

        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
        assert_eq!(registry.seed_defaults().unwrap_err().error_code(), "REGISTRY_UNAVAILABLE");
        assert_eq!(registry.get_factor("base").unwrap_err().error_code(), "REGISTRY_UNAVAILABLE");
        assert_eq!(
            registry.find_factor(&FactorQuery::new()).unwrap_err().error_code(),
            "REGISTRY_UNAVAILABLE"
        );
    }
}
