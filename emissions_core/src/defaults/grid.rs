//! Regional grid averages for purchased electricity.
//!
//! Lookup walks the parent-region chain: exact region, then explicit
//! parents (`US-CALIFORNIA` -> `US-WEST` -> `US-AVERAGE`), then the family
//! average for the region prefix. Callers fall back to
//! [`GridTable::global_default`] when the chain is exhausted.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;

use super::parse_embedded;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GridEntry {
    /// kg CO2e per kWh
    pub factor: f64,
    pub data_source: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GridTable {
    pub global_default: f64,
    pub regions: HashMap<String, GridEntry>,
    #[serde(default)]
    pub parents: HashMap<String, String>,
    #[serde(default)]
    pub families: HashMap<String, String>,
}

static GRID_TABLE: Lazy<GridTable> =
    Lazy::new(|| parse_embedded("scope2_grid.toml", include_str!("../../data/scope2_grid.toml")));

pub fn table() -> &'static GridTable {
    &GRID_TABLE
}

/// Which tier of the chain produced a grid factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridMatch {
    Exact,
    Parent,
}

/// A grid factor found in the table.
#[derive(Debug, Clone, PartialEq)]
pub struct GridHit<'a> {
    pub region: &'a str,
    pub entry: &'a GridEntry,
    pub tier: GridMatch,
}

/// Canonical form of a region code: trimmed, uppercase.
pub fn canonical_region(region: &str) -> String {
    region.trim().to_ascii_uppercase()
}

impl GridTable {
    pub fn exact(&self, region: &str) -> Option<GridHit<'_>> {
        self.regions
            .get_key_value(&canonical_region(region))
            .map(|(region, entry)| GridHit {
                region: region.as_str(),
                entry,
                tier: GridMatch::Exact,
            })
    }

    /// Broader regions to try for `region`, most specific first. Does not
    /// include `region` itself.
    pub fn parent_chain(&self, region: &str) -> Vec<String> {
        let start = canonical_region(region);
        let mut chain: Vec<String> = Vec::new();
        let mut current = start.clone();

        while let Some(parent) = self.parents.get(&current) {
            if *parent == start || chain.contains(parent) {
                break;
            }
            chain.push(parent.clone());
            current = parent.clone();
        }

        let family = start.split('-').next().unwrap_or_default();
        if let Some(average) = self.families.get(family) {
            if *average != start && !chain.contains(average) {
                chain.push(average.clone());
            }
        }

        chain
    }

    /// First table entry along the chain, exact region included.
    pub fn resolve(&self, region: &str) -> Option<GridHit<'_>> {
        if let Some(hit) = self.exact(region) {
            return Some(hit);
        }
        self.parent_chain(region).into_iter().find_map(|parent| {
            self.regions.get_key_value(&parent).map(|(region, entry)| GridHit {
                region: region.as_str(),
                entry,
                tier: GridMatch::Parent,
            })
        })
    }

    /// Emissions avoided by `renewable_kwh` of on-site or contracted
    /// renewable generation, valued at the region's grid average.
    pub fn renewable_offset_kg(&self, renewable_kwh: f64, region: &str) -> f64 {
        let factor = self
            .resolve(region)
            .map(|hit| hit.entry.factor)
            .unwrap_or(self.global_default);
        renewable_kwh * factor
    }
}
