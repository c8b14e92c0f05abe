//! Registries chained by priority.
//!
//! Typical layering: organization overrides first, a database-backed store
//! next, the seeded defaults last.

use std::collections::HashSet;
use std::sync::Arc;

use super::{EmissionFactor, FactorQuery, FactorRegistry};
use crate::errors::{EmissionsError, EmissionsResult};

/// A [`FactorRegistry`] that consults several backing registries in order.
#[derive(Clone, Default)]
pub struct CompositeRegistry {
    registries: Vec<Arc<dyn FactorRegistry>>,
}

impl CompositeRegistry {
    pub fn new(registries: Vec<Arc<dyn FactorRegistry>>) -> Self {
        Self { registries }
    }

    /// Append a lower-priority registry.
    pub fn push(mut self, registry: Arc<dyn FactorRegistry>) -> Self {
        self.registries.push(registry);
        self
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    /// Try each registry until one answers. NotFound moves on down the
    /// chain; any other failure is returned immediately.
    fn first_hit<F>(&self, what: &str, lookup: F) -> EmissionsResult<EmissionFactor>
    where
        F: Fn(&dyn FactorRegistry) -> EmissionsResult<EmissionFactor>,
    {
        for (index, registry) in self.registries.iter().enumerate() {
            match lookup(registry.as_ref()) {
                Ok(factor) => {
                    tracing::debug!(factor_id = %factor.id, registry_index = index, "factor resolved in chain");
                    return Ok(factor);
                }
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        Err(EmissionsError::not_found(format!("{} (in {} registries)", what, self.registries.len())))
    }
}

impl std::fmt::Debug for CompositeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeRegistry")
            .field("registries", &self.registries.len())
            .finish()
    }
}

impl FactorRegistry for CompositeRegistry {
    fn get_factor(&self, id: &str) -> EmissionsResult<EmissionFactor> {
        self.first_hit(&format!("factor id '{}'", id), |r| r.get_factor(id))
    }

    fn find_factor(&self, query: &FactorQuery) -> EmissionsResult<EmissionFactor> {
        self.first_hit(&query.to_string(), |r| r.find_factor(query))
    }

    /// Union of all registries, first occurrence of an id wins.
    fn list_factors(&self, query: &FactorQuery) -> EmissionsResult<Vec<EmissionFactor>> {
        let mut seen = HashSet::new();
        let mut all = Vec::new();

        for registry in &self.registries {
            for factor in registry.list_factors(query)? {
                if seen.insert(factor.id.clone()) {
                    all.push(factor);
                }
            }
        }

        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    fn register_factor(&self, factor: EmissionFactor) -> EmissionsResult<()> {
        match self.registries.first() {
            Some(primary) => primary.register_factor(factor),
            None => Err(EmissionsError::registry_unavailable("composite registry has no backing registries")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::InMemoryRegistry;
    use crate::scope::Scope;

    fn grid(id: &str, region: &str, value: f64) -> EmissionFactor {
        EmissionFactor::new(id, Scope::Scope2, region, "electricity", "kWh", value)
    }

    fn layered() -> (Arc<InMemoryRegistry>, Arc<InMemoryRegistry>, CompositeRegistry) {
        let overrides = Arc::new(InMemoryRegistry::new());
        let defaults = Arc::new(InMemoryRegistry::new());
        overrides.register_factor(grid("grid-uk", "EU-UK", 0.150)).unwrap();
        defaults.register_factor(grid("grid-uk", "EU-UK", 0.207)).unwrap();
        defaults.register_factor(grid("grid-fr", "EU-FRANCE", 0.052)).unwrap();

        let composite = CompositeRegistry::new(vec![
            overrides.clone() as Arc<dyn FactorRegistry>,
            defaults.clone() as Arc<dyn FactorRegistry>,
        ]);
        (overrides, defaults, composite)
    }

    #[test]
    fn test_point_lookups_respect_priority() {
        let (_, _, composite) = layered();

        assert_eq!(composite.get_factor("grid-uk").unwrap().value_kg_co2e_per_unit, 0.150);
        assert_eq!(composite.get_factor("grid-fr").unwrap().value_kg_co2e_per_unit, 0.052);
        assert!(composite.get_factor("grid-de").unwrap_err().is_not_found());

        let q = FactorQuery::new().region("EU-FRANCE");
        assert_eq!(composite.find_factor(&q).unwrap().id, "grid-fr");
    }

    #[test]
    fn test_list_is_deduplicated() {
        let (_, _, composite) = layered();
        let all = composite.list_factors(&FactorQuery::new()).unwrap();

        assert_eq!(all.len(), 2);
        let uk = all.iter().find(|f| f.id == "grid-uk").unwrap();
        assert_eq!(uk.value_kg_co2e_per_unit, 0.150);
    }

    #[test]
    fn test_register_writes_to_first_only() {
        let (overrides, defaults, composite) = layered();
        composite.register_factor(grid("grid-es", "EU-SPAIN", 0.212)).unwrap();

        assert!(overrides.get_factor("grid-es").is_ok());
        assert!(defaults.get_factor("grid-es").is_err());
    }

    #[test]
    fn test_empty_chain() {
        let composite = CompositeRegistry::default();
        let err = composite.register_factor(grid("x", "EU-UK", 0.1)).unwrap_err();
        assert_eq!(err.error_code(), "REGISTRY_UNAVAILABLE");
        assert!(composite.find_factor(&FactorQuery::new()).unwrap_err().is_not_found());
        assert!(composite.list_factors(&FactorQuery::new()).unwrap().is_empty());
    }
}
