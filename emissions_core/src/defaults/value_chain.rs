//! Scope 3 default tables.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;

use super::parse_embedded;

/// Factors sharing one unit, with optional per-key unit overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeyedTable {
    pub unit: String,
    pub factors: HashMap<String, f64>,
    #[serde(default)]
    pub units: HashMap<String, String>,
}

impl KeyedTable {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.factors.get(key).copied()
    }

    /// Unit of the factor stored under `key`.
    pub fn unit_for(&self, key: &str) -> &str {
        self.units.get(key).map(String::as_str).unwrap_or(&self.unit)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValueChainTables {
    pub business_travel: KeyedTable,
    pub commuting: KeyedTable,
    pub waste: KeyedTable,
    pub spend: KeyedTable,
    pub fuel_energy: KeyedTable,
    pub transport: KeyedTable,
    pub use_phase: KeyedTable,
    pub end_of_life: KeyedTable,
    pub leased_assets: KeyedTable,
}

impl ValueChainTables {
    pub fn all(&self) -> [(&'static str, &KeyedTable); 9] {
        [
            ("business_travel", &self.business_travel),
            ("commuting", &self.commuting),
            ("waste", &self.waste),
            ("spend", &self.spend),
            ("fuel_energy", &self.fuel_energy),
            ("transport", &self.transport),
            ("use_phase", &self.use_phase),
            ("end_of_life", &self.end_of_life),
            ("leased_assets", &self.leased_assets),
        ]
    }
}

static VALUE_CHAIN: Lazy<ValueChainTables> =
    Lazy::new(|| parse_embedded("scope3_tables.toml", include_str!("../../data/scope3_tables.toml")));

pub fn tables() -> &'static ValueChainTables {
    &VALUE_CHAIN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_negative_factors() {
        for (name, table) in tables().all() {
            for (key, value) in &table.factors {
                assert!(*value >= 0.0, "{}.{} is negative", name, key);
            }
        }
    }

    #[test]
    fn test_unit_overrides() {
        let t = tables();
        assert_eq!(t.commuting.unit_for("work-from-home"), "days");
        assert_eq!(t.commuting.unit_for("car-petrol"), "km");
        assert_eq!(t.transport.unit_for("rail_freight"), "tonne-km");
    }

    #[test]
    fn test_known_values() {
        let t = tables();
        assert_eq!(t.business_travel.get("flight-long"), Some(0.195));
        assert_eq!(t.spend.get("software"), Some(0.05));
        assert_eq!(t.leased_assets.get("leased_assets"), Some(12.0));
        assert_eq!(t.waste.get("nonexistent"), None);
    }
}
