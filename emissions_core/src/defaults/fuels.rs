//! Scope 1 fuel and refrigerant tables.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;

use super::{normalize_key, parse_embedded};

/// One combustible fuel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FuelEntry {
    /// kg CO2e per native unit
    pub factor: f64,
    /// Native unit of `factor`
    pub unit: String,
    /// Extra kg CO2e per unit for CH4 and N2O
    #[serde(default)]
    pub ch4_n2o_uplift: f64,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefrigerantTable {
    /// GWP applied to refrigerants missing from `gwp`
    pub default_gwp: f64,
    pub unit: String,
    /// Keyed by uppercase refrigerant code, e.g. "R-410A"
    pub gwp: HashMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FuelTables {
    pub fuels: HashMap<String, FuelEntry>,
    /// Fuel assumed for a source when the category is unrecognized
    #[serde(default)]
    pub source_defaults: HashMap<String, String>,
    pub refrigerants: RefrigerantTable,
}

static FUEL_TABLES: Lazy<FuelTables> =
    Lazy::new(|| parse_embedded("scope1_fuels.toml", include_str!("../../data/scope1_fuels.toml")));

pub fn tables() -> &'static FuelTables {
    &FUEL_TABLES
}

/// A fuel resolved from free text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedFuel {
    pub fuel: &'static str,
    pub entry: &'static FuelEntry,
}

impl FuelTables {
    /// Map an activity category (then its source) to a known fuel.
    pub fn resolve(&'static self, category: &str, source: &str) -> Option<ResolvedFuel> {
        let key = normalize_key(category);
        let by_alias = self
            .fuels
            .iter()
            .find(|(_, entry)| entry.aliases.iter().any(|alias| *alias == key));

        let found = match by_alias {
            Some(hit) => Some(hit),
            None => self
                .source_defaults
                .get(&normalize_key(source))
                .and_then(|fuel| self.fuels.get_key_value(fuel)),
        };

        found.map(|(fuel, entry)| ResolvedFuel {
            fuel: fuel.as_str(),
            entry,
        })
    }

    /// GWP for a refrigerant code and whether it came from the table.
    pub fn refrigerant_gwp(&self, code: &str) -> (f64, bool) {
        let key = code.trim().to_ascii_uppercase().replace(' ', "-");
        match self.refrigerants.gwp.get(&key) {
            Some(gwp) => (*gwp, true),
            None => (self.refrigerants.default_gwp, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_aliases() {
        let t = tables();
        assert_eq!(t.resolve("Diesel", "").unwrap().fuel, "diesel");
        assert_eq!(t.resolve("petrol", "").unwrap().fuel, "gasoline");
        assert_eq!(t.resolve("Natural Gas", "").unwrap().fuel, "natural_gas");
        assert_eq!(t.resolve("LPG", "").unwrap().fuel, "propane");
        assert_eq!(t.resolve("heating_oil", "").unwrap().fuel, "fuel_oil");
        assert_eq!(t.resolve("fuel_oil_6", "").unwrap().fuel, "fuel_oil_6");
        assert_eq!(t.resolve("aviation", "").unwrap().fuel, "jet_fuel");
    }

    #[test]
    fn test_fleet_defaults_to_diesel() {
        let t = tables();
        let fuel = t.resolve("unknown-blend", "fleet").unwrap();
        assert_eq!(fuel.fuel, "diesel");
        assert_eq!(fuel.entry.factor, 2.68);
        assert!(t.resolve("unknown-blend", "stationary_combustion").is_none());
    }

    #[test]
    fn test_aliases_are_unique() {
        let t = tables();
        let mut seen = std::collections::HashSet::new();
        for entry in t.fuels.values() {
            for alias in &entry.aliases {
                assert!(seen.insert(alias.clone()), "duplicate alias {}", alias);
            }
        }
    }

    #[test]
    fn test_factors_non_negative() {
        for (name, entry) in &tables().fuels {
            assert!(entry.factor >= 0.0, "{}", name);
            assert!(entry.ch4_n2o_uplift >= 0.0, "{}", name);
        }
    }

    #[test]
    fn test_refrigerants() {
        let t = tables();
        assert_eq!(t.refrigerant_gwp("r-410a"), (2088.0, true));
        assert_eq!(t.refrigerant_gwp("R-999"), (1500.0, false));
    }
}
