//! # Scope 1 Calculator
//!
//! Direct emissions from sources the organization owns or controls: fleet
//! vehicles, boilers and furnaces, refrigerant leaks, process emissions.
//!
//! ## Factor Resolution
//!
//! With a registry attached, the calculator asks it for the best
//! (scope 1, region, source, category, unit) factor, accepting one in a
//! convertible unit when nothing matches exactly, and treats a miss as an
//! error unless `fallback_to_defaults` is set. Without one it uses the
//! built-in tables:
//!
//! - `fugitive` / `refrigerants`: kg leaked times the refrigerant's GWP
//! - everything else: the fuel named by the category (or the source default,
//!   `fleet` burns diesel), optionally with the CH4/N2O uplift
//!
//! Quantities are converted into the table's native unit first, so 10 US
//! gallons of diesel are costed as 37.85 L.
//!
//! ## Example
//!
//! ```rust
//! use emissions_core::activity::ActivityRecord;
//! use emissions_core::calculators::{Scope1Calculator, Scope1Config};
//!
//! let calc = Scope1Calculator::new(Scope1Config::default());
//! let diesel = ActivityRecord::new("act-1", "fleet", 100.0, "L").with_category("diesel");
//!
//! let record = calc.calculate(&diesel).unwrap();
//! assert_eq!(record.emissions_kg_co2e(), 268.0);
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::{ensure_present, ensure_quantity, find_convertible, source_in};
use crate::activity::Activity;
use crate::defaults::fuels;
use crate::errors::{EmissionsError, EmissionsResult};
use crate::factors::{FactorQuery, FactorRegistry};
use crate::record::{AppliedFactor, EmissionRecord};
use crate::scope::{CalculationMethod, DataQuality, Scope};
use crate::units::convert_quantity;

/// Sources that denote an owned or controlled emission source.
pub const SUPPORTED_SOURCES: [&str; 8] = [
    "fleet",
    "vehicle",
    "on-site",
    "stationary_combustion",
    "mobile_combustion",
    "fugitive",
    "refrigerants",
    "process",
];

const REFRIGERANT_SOURCES: [&str; 2] = ["fugitive", "refrigerants"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scope1Config {
    /// Add the CH4/N2O uplift to built-in fuel factors
    pub include_ch4_n2o: bool,
    /// Use the built-in tables when the registry has no match
    pub fallback_to_defaults: bool,
}

#[derive(Clone)]
pub struct Scope1Calculator {
    registry: Option<Arc<dyn FactorRegistry>>,
    config: Scope1Config,
}

impl fmt::Debug for Scope1Calculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope1Calculator")
            .field("config", &self.config)
            .field("has_registry", &self.registry.is_some())
            .finish()
    }
}

impl Scope1Calculator {
    pub fn new(config: Scope1Config) -> Self {
        Self {
            registry: None,
            config,
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn FactorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &Scope1Config {
        &self.config
    }

    pub fn supports(&self, activity: &dyn Activity) -> bool {
        source_in(activity.source(), &SUPPORTED_SOURCES)
    }

    pub fn calculate(&self, activity: &dyn Activity) -> EmissionsResult<EmissionRecord> {
        ensure_present(activity)?;
        ensure_quantity(activity)?;
        if !self.supports(activity) {
            return Err(EmissionsError::invalid_source(
                activity.source(),
                "not a direct-emission source",
            ));
        }

        tracing::debug!(
            activity_id = activity.id(),
            source = activity.source(),
            category = activity.category(),
            quantity = activity.quantity(),
            unit = activity.unit(),
            "calculating scope 1 emissions"
        );

        let from_registry = match &self.registry {
            Some(registry) => match self.registry_factor(registry.as_ref(), activity) {
                Ok(applied) => Some(applied),
                Err(e) if e.is_not_found() && self.config.fallback_to_defaults => {
                    tracing::debug!(activity_id = activity.id(), "no registry factor, using built-in tables");
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        let (applied, notes) = match from_registry {
            Some(applied) => (applied, String::new()),
            None if source_in(activity.source(), &REFRIGERANT_SOURCES) => self.refrigerant_factor(activity)?,
            None => self.fuel_factor(activity)?,
        };

        let record = EmissionRecord::from_activity(activity, Scope::Scope1, applied)?.with_notes(notes);

        tracing::info!(
            activity_id = activity.id(),
            factor_id = record.factor_id(),
            emissions_kg_co2e = record.emissions_kg_co2e(),
            "calculated scope 1 emissions"
        );

        Ok(record)
    }

    fn registry_factor(&self, registry: &dyn FactorRegistry, activity: &dyn Activity) -> EmissionsResult<AppliedFactor> {
        let query = FactorQuery::new()
            .scope(Scope::Scope1)
            .region(activity.location())
            .source(activity.source())
            .category(activity.category())
            .unit(activity.unit())
            .valid_at(Utc::now());

        let factor = find_convertible(registry, &query, activity.unit())?;
        let quantity = convert_quantity(activity.quantity(), activity.unit(), &factor.unit)?;

        Ok(AppliedFactor {
            factor_id: factor.id,
            value: factor.value_kg_co2e_per_unit,
            quantity,
            method: CalculationMethod::ActivityBased,
            data_quality: DataQuality::Measured,
            region: activity.location().to_string(),
        })
    }

    fn fuel_factor(&self, activity: &dyn Activity) -> EmissionsResult<(AppliedFactor, String)> {
        let resolved = fuels::tables()
            .resolve(activity.category(), activity.source())
            .ok_or_else(|| {
                EmissionsError::not_found(format!(
                    "default scope 1 fuel for category '{}' (source '{}')",
                    activity.category(),
                    activity.source()
                ))
            })?;

        let quantity = convert_quantity(activity.quantity(), activity.unit(), &resolved.entry.unit)?;

        let mut value = resolved.entry.factor;
        let mut notes = format!("Default factor: {}", resolved.fuel);
        if self.config.include_ch4_n2o && resolved.entry.ch4_n2o_uplift > 0.0 {
            value += resolved.entry.ch4_n2o_uplift;
            notes.push_str(" (incl. CH4/N2O)");
        }

        Ok((
            AppliedFactor {
                factor_id: format!("default-scope1-{}", resolved.fuel),
                value,
                quantity,
                method: CalculationMethod::ActivityBased,
                data_quality: DataQuality::Default,
                region: activity.location().to_string(),
            },
            notes,
        ))
    }

    fn refrigerant_factor(&self, activity: &dyn Activity) -> EmissionsResult<(AppliedFactor, String)> {
        let tables = fuels::tables();
        let quantity = convert_quantity(activity.quantity(), activity.unit(), &tables.refrigerants.unit)?;

        let (gwp, known) = tables.refrigerant_gwp(activity.category());
        let code = if known {
            activity.category().trim().to_ascii_uppercase()
        } else {
            tracing::warn!(
                activity_id = activity.id(),
                refrigerant = activity.category(),
                gwp,
                "unknown refrigerant, using default GWP"
            );
            "default".to_string()
        };

        Ok((
            AppliedFactor {
                factor_id: format!("default-refrigerant-{}", code.to_ascii_lowercase()),
                value: gwp,
                quantity,
                method: CalculationMethod::ActivityBased,
                data_quality: DataQuality::Default,
                region: activity.location().to_string(),
            },
            format!("Refrigerant {} at GWP {}", code, gwp),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityRecord;
    use crate::errors::ErrorKind;
    use crate::factors::{EmissionFactor, InMemoryRegistry};
    use approx::assert_relative_eq;

    fn diesel(quantity: f64, unit: &str) -> ActivityRecord {
        ActivityRecord::new("fleet-1", "fleet", quantity, unit)
            .with_category("diesel")
            .with_location("US-WEST")
    }

    #[test]
    fn test_default_diesel() {
        let calc = Scope1Calculator::new(Scope1Config::default());
        let record = calc.calculate(&diesel(100.0, "L")).unwrap();
        assert_eq!(record.emissions_kg_co2e(), 268.0);
        assert_eq!(record.emissions_tonnes_co2e(), 0.268);
        assert_eq!(record.factor_id(), "default-scope1-diesel");
        assert_eq!(record.data_quality(), DataQuality::Default);
        assert_eq!(record.method(), CalculationMethod::ActivityBased);
    }

    #[test]
    fn test_gallons_converted_to_litres() {
        let calc = Scope1Calculator::new(Scope1Config::default());
        let record = calc.calculate(&diesel(10.0, "gal")).unwrap();
        assert_relative_eq!(record.emissions_kg_co2e(), 10.0 * 3.78541 * 2.68, epsilon = 1e-9);
        assert_eq!(record.input_quantity(), 10.0);
        assert_eq!(record.input_unit(), "gal");
    }

    #[test]
    fn test_incompatible_unit() {
        let calc = Scope1Calculator::new(Scope1Config::default());
        let err = calc.calculate(&diesel(10.0, "kWh")).unwrap_err();
        assert!(err.is_unsupported_unit());
    }

    #[test]
    fn test_negative_and_nan_quantities_rejected() {
        let calc = Scope1Calculator::new(Scope1Config::default());
        let seeded = Scope1Calculator::new(Scope1Config::default())
            .with_registry(Arc::new(InMemoryRegistry::with_defaults()));

        for quantity in [-100.0, f64::NAN] {
            for calc in [&calc, &seeded] {
                let err = calc.calculate(&diesel(quantity, "L")).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::InvalidQuantity, "{}", quantity);
            }
        }
        assert_eq!(calc.calculate(&diesel(0.0, "L")).unwrap().emissions_kg_co2e(), 0.0);
    }

    #[test]
    fn test_ch4_n2o_uplift() {
        let plain = Scope1Calculator::new(Scope1Config::default());
        let uplifted = Scope1Calculator::new(Scope1Config {
            include_ch4_n2o: true,
            ..Default::default()
        });

        let base = plain.calculate(&diesel(100.0, "L")).unwrap();
        let with_uplift = uplifted.calculate(&diesel(100.0, "L")).unwrap();

        let uplift = fuels::tables().fuels["diesel"].ch4_n2o_uplift;
        assert!(uplift > 0.0);
        assert_relative_eq!(
            with_uplift.emissions_kg_co2e(),
            base.emissions_kg_co2e() + 100.0 * uplift,
            epsilon = 1e-9
        );
        assert!(with_uplift.notes().contains("CH4/N2O"));
    }

    #[test]
    fn test_unknown_fuel_is_not_found() {
        let calc = Scope1Calculator::new(Scope1Config::default());
        let boiler = ActivityRecord::new("b-1", "stationary_combustion", 5.0, "L").with_category("plasma");
        assert!(calc.calculate(&boiler).unwrap_err().is_not_found());

        let unknown_fleet_fuel = ActivityRecord::new("f-2", "fleet", 5.0, "L").with_category("plasma");
        assert_eq!(calc.calculate(&unknown_fleet_fuel).unwrap().emissions_kg_co2e(), 5.0 * 2.68);
    }

    #[test]
    fn test_refrigerant_leak() {
        let calc = Scope1Calculator::new(Scope1Config::default());
        let leak = ActivityRecord::new("r-1", "refrigerants", 2.0, "kg").with_category("R-410A");
        let record = calc.calculate(&leak).unwrap();
        assert_eq!(record.emissions_kg_co2e(), 2.0 * 2088.0);
        assert_eq!(record.factor_id(), "default-refrigerant-r-410a");

        let mystery = ActivityRecord::new("r-2", "fugitive", 1.0, "kg").with_category("R-999");
        let record = calc.calculate(&mystery).unwrap();
        assert_eq!(record.emission_factor(), 1500.0);
    }

    #[test]
    fn test_registry_factor_used() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry
            .register_factor(
                EmissionFactor::new("org-diesel", Scope::Scope1, "US-WEST", "fleet", "L", 2.70)
                    .with_category("diesel")
                    .with_data_source("Supplier fuel card"),
            )
            .unwrap();

        let calc = Scope1Calculator::new(Scope1Config::default()).with_registry(registry);
        let record = calc.calculate(&diesel(100.0, "L")).unwrap();
        assert_eq!(record.factor_id(), "org-diesel");
        assert_eq!(record.emissions_kg_co2e(), 100.0 * 2.70);
        assert_eq!(record.data_quality(), DataQuality::Measured);
    }

    #[test]
    fn test_registry_factor_in_convertible_unit() {
        let calc = Scope1Calculator::new(Scope1Config::default()).with_registry(Arc::new(InMemoryRegistry::with_defaults()));
        let record = calc.calculate(&diesel(10.0, "gal")).unwrap();
        assert_eq!(record.factor_id(), "fuel-diesel");
        assert_relative_eq!(record.emissions_kg_co2e(), 10.0 * 3.78541 * 2.68, epsilon = 1e-9);
    }

    #[test]
    fn test_registry_miss_is_error() {
        let calc = Scope1Calculator::new(Scope1Config::default()).with_registry(Arc::new(InMemoryRegistry::new()));
        assert!(calc.calculate(&diesel(100.0, "L")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_registry_miss_falls_back_when_enabled() {
        let config = Scope1Config {
            fallback_to_defaults: true,
            ..Default::default()
        };
        let calc = Scope1Calculator::new(config).with_registry(Arc::new(InMemoryRegistry::new()));
        let record = calc.calculate(&diesel(100.0, "L")).unwrap();
        assert_eq!(record.factor_id(), "default-scope1-diesel");
        assert_eq!(record.emissions_kg_co2e(), 268.0);
    }

    #[test]
    fn test_unsupported_source() {
        let calc = Scope1Calculator::new(Scope1Config::default());
        let bill = ActivityRecord::new("e-1", "electricity", 10.0, "kWh");
        assert!(!calc.supports(&bill));
        assert_eq!(calc.calculate(&bill).unwrap_err().error_code(), "INVALID_SOURCE");
    }
}
