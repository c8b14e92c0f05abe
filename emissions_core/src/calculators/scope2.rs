//! # Scope 2 Calculator
//!
//! Indirect emissions from purchased electricity, steam, heating and
//! cooling. Every quantity is normalized to kWh before a factor is applied.
//!
//! ## Factor Resolution
//!
//! 1. Registry: (scope 2, region, source, kWh, valid now). With
//!    `prefer_market_based`, market-based candidates are ranked first.
//! 2. Built-in grid table at the exact region, then along the parent chain
//!    (`US-CALIFORNIA` -> `US-WEST` -> `US-AVERAGE`).
//! 3. The global default factor.
//!
//! With `strict_region_matching`, a miss at the exact region is a
//! [`EmissionsError::NotFound`] instead of a fallback. The method actually
//! used is recorded on every record so location-based and market-based
//! totals can be reported separately.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::{ensure_present, ensure_quantity, source_in};
use crate::activity::Activity;
use crate::defaults::grid::{self, GridMatch};
use crate::errors::{EmissionsError, EmissionsResult};
use crate::factors::{best_match, EmissionFactor, FactorQuery, FactorRegistry};
use crate::record::{AppliedFactor, EmissionRecord};
use crate::scope::{CalculationMethod, DataQuality, Scope};
use crate::units::{normalize_to_kwh, EnergyUnit};

pub const SUPPORTED_SOURCES: [&str; 5] = ["utility_bill", "electricity", "steam", "heating", "cooling"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scope2Config {
    /// Rank market-based registry factors ahead of location-based ones
    pub prefer_market_based: bool,
    /// Fail instead of falling back when the exact region has no factor
    pub strict_region_matching: bool,
    /// Method recorded for registry factors that carry no method tag
    pub default_method: CalculationMethod,
    /// Region used when an activity has no location
    pub default_region: String,
}

impl Default for Scope2Config {
    fn default() -> Self {
        Self {
            prefer_market_based: false,
            strict_region_matching: false,
            default_method: CalculationMethod::LocationBased,
            default_region: "US-AVERAGE".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct Scope2Calculator {
    registry: Option<Arc<dyn FactorRegistry>>,
    config: Scope2Config,
}

impl fmt::Debug for Scope2Calculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope2Calculator")
            .field("config", &self.config)
            .field("has_registry", &self.registry.is_some())
            .finish()
    }
}

/// Region codes are letters, digits, `-` and `_`.
pub(crate) fn validate_region(region: &str) -> EmissionsResult<()> {
    match region.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_')) {
        Some(bad) => Err(EmissionsError::invalid_region(
            region,
            format!("unexpected character '{}'", bad),
        )),
        None => Ok(()),
    }
}

impl Scope2Calculator {
    pub fn new(config: Scope2Config) -> Self {
        Self {
            registry: None,
            config,
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn FactorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &Scope2Config {
        &self.config
    }

    /// Energy sources reported in an energy unit.
    pub fn supports(&self, activity: &dyn Activity) -> bool {
        source_in(activity.source(), &SUPPORTED_SOURCES) && EnergyUnit::parse(activity.unit()).is_some()
    }

    pub fn calculate(&self, activity: &dyn Activity) -> EmissionsResult<EmissionRecord> {
        ensure_present(activity)?;
        ensure_quantity(activity)?;
        if !source_in(activity.source(), &SUPPORTED_SOURCES) {
            return Err(EmissionsError::invalid_source(
                activity.source(),
                "not a purchased-energy source",
            ));
        }

        let quantity_kwh = normalize_to_kwh(activity.quantity(), activity.unit())?;

        let region = match activity.location().trim() {
            "" => grid::canonical_region(&self.config.default_region),
            location => grid::canonical_region(location),
        };
        validate_region(&region)?;

        tracing::debug!(
            activity_id = activity.id(),
            source = activity.source(),
            region = %region,
            quantity_kwh,
            "calculating scope 2 emissions"
        );

        let (mut applied, notes) = self.resolve(activity, &region)?;
        applied.quantity = quantity_kwh;
        let method = applied.method;

        let record = EmissionRecord::from_activity(activity, Scope::Scope2, applied)?.with_notes(notes);

        tracing::info!(
            activity_id = activity.id(),
            factor_id = record.factor_id(),
            method = %method,
            emissions_kg_co2e = record.emissions_kg_co2e(),
            "calculated scope 2 emissions"
        );

        Ok(record)
    }

    fn resolve(&self, activity: &dyn Activity, region: &str) -> EmissionsResult<(AppliedFactor, String)> {
        if let Some(registry) = &self.registry {
            let query = FactorQuery::new()
                .scope(Scope::Scope2)
                .region(region)
                .source(activity.source())
                .unit("kWh")
                .valid_at(Utc::now());

            match self.registry_factor(registry.as_ref(), &query) {
                Ok(factor) => return Ok((self.applied_from_registry(factor, region), String::new())),
                Err(err) if err.is_not_found() => {
                    tracing::debug!(region, "no registry factor, trying grid table");
                }
                Err(err) => return Err(err),
            }
        }

        self.table_factor(region)
    }

    fn registry_factor(&self, registry: &dyn FactorRegistry, query: &FactorQuery) -> EmissionsResult<EmissionFactor> {
        if self.config.prefer_market_based {
            let candidates = registry.list_factors(query)?;
            let market = candidates
                .iter()
                .filter(|f| f.method == Some(CalculationMethod::MarketBased));
            if let Some(factor) = best_match(market, query) {
                return Ok(factor.clone());
            }
        }
        registry.find_factor(query)
    }

    fn applied_from_registry(&self, factor: EmissionFactor, region: &str) -> AppliedFactor {
        let data_quality = if factor.data_source.trim().is_empty() {
            DataQuality::Default
        } else {
            DataQuality::Measured
        };
        AppliedFactor {
            method: factor.method.unwrap_or(self.config.default_method),
            factor_id: factor.id,
            value: factor.value_kg_co2e_per_unit,
            quantity: 0.0,
            data_quality,
            region: region.to_string(),
        }
    }

    fn table_factor(&self, region: &str) -> EmissionsResult<(AppliedFactor, String)> {
        let table = grid::table();

        if self.config.strict_region_matching && table.exact(region).is_none() {
            return Err(EmissionsError::not_found(format!(
                "scope 2 grid factor for region {} (strict region matching)",
                region
            )));
        }

        let applied = |factor_id: String, value: f64, data_quality: DataQuality| AppliedFactor {
            factor_id,
            value,
            quantity: 0.0,
            method: CalculationMethod::LocationBased,
            data_quality,
            region: region.to_string(),
        };

        match table.resolve(region) {
            Some(hit) if hit.tier == GridMatch::Exact => Ok((
                applied(
                    format!("grid-{}", hit.region.to_ascii_lowercase()),
                    hit.entry.factor,
                    DataQuality::Measured,
                ),
                hit.entry.data_source.clone(),
            )),
            Some(hit) => {
                tracing::warn!(region, fallback = hit.region, "using parent region grid factor");
                Ok((
                    applied(
                        format!("grid-{}", hit.region.to_ascii_lowercase()),
                        hit.entry.factor,
                        DataQuality::Estimated,
                    ),
                    format!("Fallback from {} to {} ({})", region, hit.region, hit.entry.data_source),
                ))
            }
            None => {
                tracing::warn!(region, default_factor = table.global_default, "using global default grid factor");
                Ok((
                    applied(
                        "default-scope2-global".to_string(),
                        table.global_default,
                        DataQuality::Default,
                    ),
                    format!("Global average default for {}", region),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityRecord;
    use crate::errors::ErrorKind;
    use crate::factors::InMemoryRegistry;

    fn bill(region: &str, quantity: f64, unit: &str) -> ActivityRecord {
        ActivityRecord::new("bill-1", "electricity", quantity, unit).with_location(region)
    }

    fn calc() -> Scope2Calculator {
        Scope2Calculator::new(Scope2Config::default())
    }

    #[test]
    fn test_exact_region_from_table() {
        let record = calc().calculate(&bill("EU-FRANCE", 1000.0, "kWh")).unwrap();
        assert_eq!(record.emissions_kg_co2e(), 1000.0 * 0.052);
        assert_eq!(record.factor_id(), "grid-eu-france");
        assert_eq!(record.method(), CalculationMethod::LocationBased);
        assert_eq!(record.data_quality(), DataQuality::Measured);
    }

    #[test]
    fn test_mwh_equals_1000_kwh() {
        let mwh = calc().calculate(&bill("EU-FRANCE", 1.0, "MWh")).unwrap();
        let kwh = calc().calculate(&bill("EU-FRANCE", 1000.0, "kWh")).unwrap();
        assert_eq!(mwh.emissions_kg_co2e(), kwh.emissions_kg_co2e());
        assert_eq!(mwh.input_quantity(), 1.0);
    }

    #[test]
    fn test_negative_and_nan_quantities_rejected() {
        let negative = calc().calculate(&bill("US-WEST", -1000.0, "kWh")).unwrap_err();
        assert_eq!(negative.kind(), ErrorKind::InvalidQuantity);

        let nan = calc().calculate(&bill("US-WEST", f64::NAN, "MWh")).unwrap_err();
        assert_eq!(nan.kind(), ErrorKind::InvalidQuantity);

        let infinite = calc().calculate(&bill("US-WEST", f64::INFINITY, "kWh")).unwrap_err();
        assert_eq!(infinite.error_code(), "INVALID_QUANTITY");
    }

    #[test]
    fn test_parent_chain_fallback() {
        let record = calc().calculate(&bill("US-CALIFORNIA", 1000.0, "kWh")).unwrap();
        let us_west = grid::table().exact("US-WEST").unwrap().entry.factor;
        assert_eq!(record.emissions_kg_co2e(), 1000.0 * us_west);
        assert_eq!(record.factor_id(), "grid-us-west");
        assert_eq!(record.data_quality(), DataQuality::Estimated);
        assert_eq!(record.region(), "US-CALIFORNIA");
        assert!(record.notes().contains("Fallback"));
    }

    #[test]
    fn test_strict_region_matching() {
        let strict = Scope2Calculator::new(Scope2Config {
            strict_region_matching: true,
            ..Scope2Config::default()
        });
        assert!(strict.calculate(&bill("US-CALIFORNIA", 10.0, "kWh")).unwrap_err().is_not_found());
        assert!(strict.calculate(&bill("US-WEST", 10.0, "kWh")).is_ok());
    }

    #[test]
    fn test_global_default() {
        let record = calc().calculate(&bill("MARS-NORTH", 100.0, "kWh")).unwrap();
        assert_eq!(record.emission_factor(), 0.4);
        assert_eq!(record.data_quality(), DataQuality::Default);
        assert_eq!(record.factor_id(), "default-scope2-global");
    }

    #[test]
    fn test_empty_location_uses_default_region() {
        let record = calc().calculate(&bill("", 100.0, "kWh")).unwrap();
        assert_eq!(record.region(), "US-AVERAGE");
        assert_eq!(record.factor_id(), "grid-us-average");
    }

    #[test]
    fn test_malformed_region() {
        let err = calc().calculate(&bill("US/WEST", 100.0, "kWh")).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_REGION");
    }

    #[test]
    fn test_unsupported_inputs() {
        let c = calc();
        let litres = bill("EU-FRANCE", 10.0, "L");
        assert!(!c.supports(&litres));
        assert!(c.calculate(&litres).unwrap_err().is_unsupported_unit());

        let travel = ActivityRecord::new("t-1", "travel", 10.0, "kWh");
        assert_eq!(c.calculate(&travel).unwrap_err().error_code(), "INVALID_SOURCE");
    }

    fn registry_with_market_and_location() -> Arc<InMemoryRegistry> {
        let registry = Arc::new(InMemoryRegistry::new());
        registry
            .register_factor(
                EmissionFactor::new("loc-uk", Scope::Scope2, "EU-UK", "electricity", "kWh", 0.212)
                    .with_method(CalculationMethod::LocationBased)
                    .with_data_source("DEFRA 2023"),
            )
            .unwrap();
        registry
            .register_factor(
                EmissionFactor::new("mkt-uk", Scope::Scope2, "GLOBAL", "electricity", "kWh", 0.05)
                    .with_method(CalculationMethod::MarketBased),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_registry_location_based_by_default() {
        let c = calc().with_registry(registry_with_market_and_location());
        let record = c.calculate(&bill("EU-UK", 100.0, "kWh")).unwrap();
        assert_eq!(record.factor_id(), "loc-uk");
        assert_eq!(record.method(), CalculationMethod::LocationBased);
        assert_eq!(record.data_quality(), DataQuality::Measured);
    }

    #[test]
    fn test_prefer_market_based() {
        let c = Scope2Calculator::new(Scope2Config {
            prefer_market_based: true,
            ..Scope2Config::default()
        })
        .with_registry(registry_with_market_and_location());

        let record = c.calculate(&bill("EU-UK", 100.0, "kWh")).unwrap();
        assert_eq!(record.factor_id(), "mkt-uk");
        assert_eq!(record.method(), CalculationMethod::MarketBased);
        assert_eq!(record.data_quality(), DataQuality::Default);
    }

    #[test]
    fn test_registry_miss_falls_through_to_table() {
        let c = calc().with_registry(registry_with_market_and_location());
        let record = c.calculate(&ActivityRecord::new("s-1", "steam", 10.0, "kWh").with_location("EU-FRANCE")).unwrap();
        assert_eq!(record.factor_id(), "grid-eu-france");
    }

    #[test]
    fn test_untagged_registry_factor_gets_default_method() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry
            .register_factor(EmissionFactor::new("plain", Scope::Scope2, "EU-UK", "electricity", "kWh", 0.2))
            .unwrap();
        let c = Scope2Calculator::new(Scope2Config {
            default_method: CalculationMethod::MarketBased,
            ..Scope2Config::default()
        })
        .with_registry(registry);
        let record = c.calculate(&bill("EU-UK", 1.0, "kWh")).unwrap();
        assert_eq!(record.method(), CalculationMethod::MarketBased);
    }
}
