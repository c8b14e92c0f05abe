//! # Emission Factors
//!
//! An emission factor converts one unit of activity into kg CO2e. Factors are
//! stored in a [`FactorRegistry`] and selected with a [`FactorQuery`].
//!
//! ## Modules
//!
//! - [`scoring`] - pure specificity ranking over a slice of candidates
//! - [`registry`] - the registry contract and the in-memory store
//! - [`composite`] - several registries chained by priority
//! - [`seed`] - the default factor set
//! - [`file`] - versioned JSON import/export of factor sets
//!
//! ## Matching
//!
//! A factor matches a query when every filter the query sets is satisfied.
//! Region, source and category compare case-insensitively, unit compares
//! exactly. A factor with region `GLOBAL` satisfies any region filter and a
//! factor with no category satisfies any category filter; both then score
//! lower than an exact match.

pub mod composite;
pub mod file;
pub mod registry;
pub mod scoring;
pub mod seed;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{EmissionsError, EmissionsResult};
use crate::scope::{CalculationMethod, Scope};

pub use composite::CompositeRegistry;
pub use registry::{FactorRegistry, FactorSummary, InMemoryRegistry, RegistryConfig};
pub use scoring::{best_match, specificity};

/// Region code that matches every queried region.
pub const GLOBAL_REGION: &str = "GLOBAL";

/// A conversion constant from activity units to kg CO2e.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionFactor {
    pub id: String,
    pub scope: Scope,
    pub region: String,
    pub source: String,
    #[serde(default)]
    pub category: String,
    pub unit: String,
    pub value_kg_co2e_per_unit: f64,
    #[serde(default)]
    pub method: Option<CalculationMethod>,
    /// Citation for the published value
    #[serde(default)]
    pub data_source: String,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub uncertainty_pct: Option<f64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

impl EmissionFactor {
    /// Create a factor with the required fields.
    ///
    /// # Example
    ///
    /// ```rust
    /// use emissions_core::factors::EmissionFactor;
    /// use emissions_core::scope::{CalculationMethod, Scope};
    ///
    /// let f = EmissionFactor::new("grid-fr", Scope::Scope2, "EU-FRANCE", "electricity", "kWh", 0.052)
    ///     .with_method(CalculationMethod::LocationBased)
    ///     .with_data_source("EEA 2023");
    /// assert!(f.validate().is_ok());
    /// ```
    pub fn new(
        id: impl Into<String>,
        scope: Scope,
        region: impl Into<String>,
        source: impl Into<String>,
        unit: impl Into<String>,
        value_kg_co2e_per_unit: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            scope,
            region: region.into(),
            source: source.into(),
            category: String::new(),
            unit: unit.into(),
            value_kg_co2e_per_unit,
            method: None,
            data_source: String::new(),
            valid_from: None,
            valid_to: None,
            uncertainty_pct: None,
            created_at: now,
            updated_at: now,
            notes: String::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_method(mut self, method: CalculationMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_data_source(mut self, data_source: impl Into<String>) -> Self {
        self.data_source = data_source.into();
        self
    }

    pub fn with_validity(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.valid_from = from;
        self.valid_to = to;
        self
    }

    pub fn with_uncertainty(mut self, pct: f64) -> Self {
        self.uncertainty_pct = Some(pct);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Check the fields a registry requires before storing the factor.
    pub fn validate(&self) -> EmissionsResult<()> {
        let required = [
            ("id", &self.id),
            ("region", &self.region),
            ("source", &self.source),
            ("unit", &self.unit),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(EmissionsError::invalid_factor(&self.id, field, "must not be empty"));
            }
        }

        if !self.value_kg_co2e_per_unit.is_finite() || self.value_kg_co2e_per_unit < 0.0 {
            return Err(EmissionsError::invalid_factor(
                &self.id,
                "value_kg_co2e_per_unit",
                format!("must be a non-negative number, got {}", self.value_kg_co2e_per_unit),
            ));
        }

        if let Some(pct) = self.uncertainty_pct {
            if !pct.is_finite() || pct < 0.0 {
                return Err(EmissionsError::invalid_factor(
                    &self.id,
                    "uncertainty_pct",
                    "must be a non-negative percentage",
                ));
            }
        }

        if let (Some(from), Some(to)) = (self.valid_from, self.valid_to) {
            if from > to {
                return Err(EmissionsError::invalid_factor(
                    &self.id,
                    "valid_from",
                    "validity window starts after it ends",
                ));
            }
        }

        Ok(())
    }

    /// True when `at` falls inside the validity window (open ends allowed).
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |from| at >= from) && self.valid_to.map_or(true, |to| at <= to)
    }

    pub fn is_global(&self) -> bool {
        self.region.eq_ignore_ascii_case(GLOBAL_REGION)
    }

    /// Apply this factor to a quantity already expressed in `self.unit`.
    pub fn apply(&self, quantity: f64) -> f64 {
        quantity * self.value_kg_co2e_per_unit
    }
}

impl fmt::Display for EmissionFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}, {:.4} kgCO2e/{})",
            self.id, self.scope, self.region, self.value_kg_co2e_per_unit, self.unit
        )
    }
}

/// Optional filters for factor lookup. Unset filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorQuery {
    pub scope: Option<Scope>,
    pub region: Option<String>,
    pub source: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub valid_at: Option<DateTime<Utc>>,
}

fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl FactorQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Blank strings leave the filter unset.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = non_empty(region);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = non_empty(source);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = non_empty(category);
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = non_empty(unit);
        self
    }

    pub fn valid_at(mut self, at: DateTime<Utc>) -> Self {
        self.valid_at = Some(at);
        self
    }

    /// Copy of this query without the unit filter.
    pub fn without_unit(&self) -> Self {
        Self {
            unit: None,
            ..self.clone()
        }
    }

    pub fn matches(&self, factor: &EmissionFactor) -> bool {
        if let Some(scope) = self.scope {
            if factor.scope != scope {
                return false;
            }
        }
        if let Some(region) = &self.region {
            if !factor.region.eq_ignore_ascii_case(region) && !factor.is_global() {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if !factor.source.eq_ignore_ascii_case(source) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if !factor.category.is_empty() && !factor.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(unit) = &self.unit {
            if &factor.unit != unit {
                return false;
            }
        }
        if let Some(at) = self.valid_at {
            if !factor.is_valid_at(at) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for FactorQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(scope) = self.scope {
            parts.push(format!("scope={}", scope.number()));
        }
        for (name, value) in [
            ("region", &self.region),
            ("source", &self.source),
            ("category", &self.category),
            ("unit", &self.unit),
        ] {
            if let Some(v) = value {
                parts.push(format!("{}={}", name, v));
            }
        }
        if parts.is_empty() {
            write!(f, "<any>")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn diesel() -> EmissionFactor {
        EmissionFactor::new("fuel-diesel", Scope::Scope1, "GLOBAL", "fleet", "L", 2.68).with_category("diesel")
    }

    #[test]
    fn test_validate_required_fields() {
        assert!(diesel().validate().is_ok());

        let mut f = diesel();
        f.unit = String::new();
        let err = f.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_FACTOR");

        let mut f = diesel();
        f.id = " ".into();
        assert!(f.validate().is_err());

        let mut f = diesel();
        f.value_kg_co2e_per_unit = -0.1;
        assert!(f.validate().is_err());

        let mut f = diesel();
        f.value_kg_co2e_per_unit = f64::NAN;
        assert!(f.validate().is_err());
    }

    #[test]
    fn test_zero_value_is_valid() {
        let f = EmissionFactor::new("bio", Scope::Scope1, "GLOBAL", "fleet", "L", 0.0);
        assert!(f.validate().is_ok());
    }

    #[test]
    fn test_validity_window() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        let f = diesel().with_validity(Some(start), Some(end));

        assert!(f.is_valid_at(start + Duration::days(10)));
        assert!(!f.is_valid_at(start - Duration::days(1)));
        assert!(!f.is_valid_at(end + Duration::days(1)));

        let open = diesel().with_validity(Some(start), None);
        assert!(open.is_valid_at(end + Duration::days(1000)));

        let backwards = diesel().with_validity(Some(end), Some(start));
        assert!(backwards.validate().is_err());
    }

    #[test]
    fn test_query_matching() {
        let f = diesel();
        assert!(FactorQuery::new().matches(&f));
        assert!(FactorQuery::new().scope(Scope::Scope1).source("FLEET").matches(&f));
        assert!(!FactorQuery::new().scope(Scope::Scope2).matches(&f));
        assert!(FactorQuery::new().category("Diesel").matches(&f));
        assert!(!FactorQuery::new().category("gasoline").matches(&f));
        // unit is exact
        assert!(FactorQuery::new().unit("L").matches(&f));
        assert!(!FactorQuery::new().unit("l").matches(&f));
    }

    #[test]
    fn test_global_and_uncategorized_are_wildcards() {
        let global = diesel();
        assert!(FactorQuery::new().region("US-WEST").matches(&global));

        let regional = EmissionFactor::new("grid-us-west", Scope::Scope2, "US-WEST", "electricity", "kWh", 0.298);
        assert!(FactorQuery::new().region("us-west").matches(&regional));
        assert!(!FactorQuery::new().region("EU-FRANCE").matches(&regional));
        assert!(FactorQuery::new().category("anything").matches(&regional));
    }

    #[test]
    fn test_blank_filters_are_unset() {
        let q = FactorQuery::new().region("").category("  ");
        assert_eq!(q.region, None);
        assert_eq!(q.category, None);
    }

    #[test]
    fn test_query_display() {
        let q = FactorQuery::new().scope(Scope::Scope2).region("EU-UK").unit("kWh");
        assert_eq!(q.to_string(), "scope=2 region=EU-UK unit=kWh");
        assert_eq!(FactorQuery::new().to_string(), "<any>");
    }
}
