//! # Default Factor Tables
//!
//! Built-in emission factors used when no registry is configured, or when a
//! registry lookup falls through. The tables live as TOML under `data/`, are
//! embedded at compile time and parsed once on first use.
//!
//! - [`fuels`] - Scope 1 fuel factors, CH4/N2O uplifts, refrigerant GWPs
//! - [`grid`] - Scope 2 regional grid averages and the parent-region chain
//! - [`value_chain`] - Scope 3 per-category keyword tables

pub mod fuels;
pub mod grid;
pub mod value_chain;

use serde::de::DeserializeOwned;

/// Parse an embedded table. The files ship inside the crate and are covered
/// by tests, so a parse failure is a build defect rather than a runtime error.
pub(crate) fn parse_embedded<T: DeserializeOwned>(name: &str, text: &str) -> T {
    match toml::from_str(text) {
        Ok(table) => table,
        Err(err) => panic!("embedded table {} is malformed: {}", name, err),
    }
}

/// Lowercase a free-text token and fold spaces and hyphens to underscores.
pub fn normalize_key(token: &str) -> String {
    token
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key(" Natural Gas "), "natural_gas");
        assert_eq!(normalize_key("Jet-A"), "jet_a");
        assert_eq!(normalize_key("fuel_oil_2"), "fuel_oil_2");
    }

    #[test]
    fn test_all_tables_parse() {
        assert!(!fuels::tables().fuels.is_empty());
        assert!(!grid::table().regions.is_empty());
        assert!(!value_chain::tables().spend.factors.is_empty());
    }
}
