//! Default factor set for a freshly created registry.
//!
//! Location-based grid factors for common regions and GLOBAL fuel factors
//! for Scope 1, each with a citation. Loaded from `data/seed_factors.toml`.

use chrono::Utc;
use once_cell::sync::Lazy;
use serde::Deserialize;

use super::EmissionFactor;
use crate::defaults::parse_embedded;
use crate::scope::{CalculationMethod, Scope};

#[derive(Debug, Clone, Deserialize)]
struct SeedRow {
    id: String,
    scope: Scope,
    region: String,
    source: String,
    #[serde(default)]
    category: String,
    unit: String,
    value: f64,
    method: Option<CalculationMethod>,
    data_source: String,
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    factor: Vec<SeedRow>,
}

static SEED_ROWS: Lazy<Vec<SeedRow>> = Lazy::new(|| {
    parse_embedded::<SeedFile>("seed_factors.toml", include_str!("../../data/seed_factors.toml")).factor
});

/// The default factors, stamped with the current time.
pub fn default_factors() -> Vec<EmissionFactor> {
    let now = Utc::now();
    SEED_ROWS
        .iter()
        .map(|row| {
            let mut factor = EmissionFactor::new(
                row.id.clone(),
                row.scope,
                row.region.clone(),
                row.source.clone(),
                row.unit.clone(),
                row.value,
            )
            .with_category(row.category.clone())
            .with_data_source(row.data_source.clone());
            factor.method = row.method;
            factor.created_at = now;
            factor.updated_at = now;
            factor
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_seed_factors_are_valid() {
        let factors = default_factors();
        assert!(factors.len() >= 20);
        for f in &factors {
            f.validate().unwrap();
            assert!(!f.data_source.is_empty(), "{} has no citation", f.id);
        }
    }

    #[test]
    fn test_seed_ids_unique() {
        let factors = default_factors();
        let ids: HashSet<_> = factors.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids.len(), factors.len());
    }

    #[test]
    fn test_seed_contains_fleet_diesel() {
        let diesel = default_factors().into_iter().find(|f| f.id == "fuel-diesel").unwrap();
        assert_eq!(diesel.scope, Scope::Scope1);
        assert_eq!(diesel.region, "GLOBAL");
        assert_eq!(diesel.value_kg_co2e_per_unit, 2.68);
        assert_eq!(diesel.method, Some(CalculationMethod::ActivityBased));
    }
}
