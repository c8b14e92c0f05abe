//! # Scope 3 Calculator
//!
//! Value-chain emissions across the 15 GHG Protocol categories.
//!
//! ## Category Classification
//!
//! The category comes from fixed keyword rules over the activity's source
//! and category ([`determine_category`]). Some of these rules are product
//! policy rather than physics: a bare `freight` source is always upstream
//! transport, whichever way the goods travel.
//!
//! ## Method Selection
//!
//! | Data shape                                  | Method            | Quality   |
//! |---------------------------------------------|-------------------|-----------|
//! | Registry factor tagged supplier-specific    | supplier-specific | measured  |
//! | Physical quantity (km, kg, tonne-km, ...)   | activity-based    | estimated |
//! | Currency unit (USD, EUR, ...)               | spend-based       | default   |
//!
//! ## Example
//!
//! ```rust
//! use emissions_core::activity::ActivityRecord;
//! use emissions_core::calculators::{Scope3Calculator, Scope3Config};
//! use emissions_core::scope::CalculationMethod;
//!
//! let calc = Scope3Calculator::new(Scope3Config::default());
//! let laptops = ActivityRecord::new("po-17", "purchases", 5000.0, "USD").with_category("electronics");
//!
//! let record = calc.calculate(&laptops).unwrap();
//! assert_eq!(record.method(), CalculationMethod::SpendBased);
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::{ensure_present, ensure_quantity, find_convertible};
use crate::activity::Activity;
use crate::defaults::value_chain::{self, KeyedTable};
use crate::errors::{EmissionsError, EmissionsResult};
use crate::factors::{best_match, EmissionFactor, FactorQuery, FactorRegistry};
use crate::record::{AppliedFactor, EmissionRecord};
use crate::scope::{CalculationMethod, DataQuality, Scope, Scope3Category};
use crate::units::{convert_quantity, is_convertible, is_currency};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scope3Config {
    /// Rank supplier-specific registry factors ahead of other matches
    pub prefer_supplier_data: bool,
    /// Use the built-in tables when a configured registry has no factor
    pub fallback_to_defaults: bool,
}

impl Default for Scope3Config {
    fn default() -> Self {
        Self {
            prefer_supplier_data: true,
            fallback_to_defaults: true,
        }
    }
}

#[derive(Clone)]
pub struct Scope3Calculator {
    registry: Option<Arc<dyn FactorRegistry>>,
    config: Scope3Config,
}

impl fmt::Debug for Scope3Calculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope3Calculator")
            .field("config", &self.config)
            .field("has_registry", &self.registry.is_some())
            .finish()
    }
}

/// A factor before it is applied: which one, its value and its unit.
struct ResolvedFactor {
    id: String,
    value: f64,
    unit: String,
    method: Option<CalculationMethod>,
}

impl From<EmissionFactor> for ResolvedFactor {
    fn from(f: EmissionFactor) -> Self {
        Self {
            id: f.id,
            value: f.value_kg_co2e_per_unit,
            unit: f.unit,
            method: f.method,
        }
    }
}

/// Classify an activity into a Scope 3 category. `None` when no rule
/// applies.
pub fn determine_category(source: &str, category: &str) -> Option<Scope3Category> {
    let source = source.trim().to_ascii_lowercase();
    let category = category.trim().to_ascii_lowercase();

    let found = match source.as_str() {
        "travel" | "business_travel" => Scope3Category::BusinessTravel,
        "commuting" => Scope3Category::Commuting,
        "waste" => Scope3Category::Waste,
        "purchases" => match category.as_str() {
            "capital" | "equipment" | "machinery" | "capital_goods" => Scope3Category::CapitalGoods,
            _ => Scope3Category::PurchasedGoods,
        },
        "upstream" => match category.as_str() {
            "transportation_distribution" | "truck_freight" | "freight" | "shipping" => {
                Scope3Category::UpstreamTransport
            }
            "leased_assets" => Scope3Category::UpstreamLeasedAssets,
            _ => Scope3Category::FuelEnergy,
        },
        "downstream" => match category.as_str() {
            "processing_sold_products" => Scope3Category::ProcessingSoldProducts,
            "use_sold_products" => Scope3Category::UseSoldProducts,
            "end_of_life_treatment" => Scope3Category::EndOfLife,
            "leased_assets" => Scope3Category::DownstreamLeasedAssets,
            "franchises" => Scope3Category::Franchises,
            "investments" => Scope3Category::Investments,
            _ => Scope3Category::DownstreamTransport,
        },
        "freight" | "shipping" => Scope3Category::UpstreamTransport,
        "investment" => Scope3Category::Investments,
        _ => return None,
    };
    Some(found)
}

/// Supplier-specific data wins; a currency unit always means spend-based,
/// whatever other tag the factor carries.
fn select_method(tagged: Option<CalculationMethod>, unit: &str) -> CalculationMethod {
    match tagged {
        Some(CalculationMethod::SupplierSpecific) => CalculationMethod::SupplierSpecific,
        _ if is_currency(unit) => CalculationMethod::SpendBased,
        Some(method) => method,
        None => CalculationMethod::ActivityBased,
    }
}

fn data_quality_for(method: CalculationMethod) -> DataQuality {
    match method {
        CalculationMethod::SupplierSpecific => DataQuality::Measured,
        CalculationMethod::ActivityBased => DataQuality::Estimated,
        _ => DataQuality::Default,
    }
}

impl Scope3Calculator {
    pub fn new(config: Scope3Config) -> Self {
        Self {
            registry: None,
            config,
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn FactorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &Scope3Config {
        &self.config
    }

    pub fn supports(&self, activity: &dyn Activity) -> bool {
        determine_category(activity.source(), activity.category()).is_some()
    }

    pub fn calculate(&self, activity: &dyn Activity) -> EmissionsResult<EmissionRecord> {
        ensure_present(activity)?;
        ensure_quantity(activity)?;
        let category = determine_category(activity.source(), activity.category()).ok_or_else(|| {
            EmissionsError::invalid_source(activity.source(), "no Scope 3 category rule matches")
        })?;

        tracing::debug!(
            activity_id = activity.id(),
            source = activity.source(),
            category = activity.category(),
            scope3_category = category.number(),
            quantity = activity.quantity(),
            unit = activity.unit(),
            "calculating scope 3 emissions"
        );

        let factor = self.find_factor(activity, category)?;
        let quantity = convert_quantity(activity.quantity(), activity.unit(), &factor.unit)?;

        let method = select_method(factor.method, activity.unit());

        let applied = AppliedFactor {
            factor_id: factor.id,
            value: factor.value,
            quantity,
            method,
            data_quality: data_quality_for(method),
            region: activity.location().to_string(),
        };

        let record = EmissionRecord::from_activity(activity, Scope::Scope3, applied)?
            .with_notes(format!("Category: {}", category))
            .with_scope3_category(category);

        tracing::info!(
            activity_id = activity.id(),
            category = %category,
            method = %method,
            emissions_kg_co2e = record.emissions_kg_co2e(),
            "calculated scope 3 emissions"
        );

        Ok(record)
    }

    fn find_factor(&self, activity: &dyn Activity, category: Scope3Category) -> EmissionsResult<ResolvedFactor> {
        let Some(registry) = &self.registry else {
            return default_factor(activity, category);
        };

        match self.registry_factor(registry.as_ref(), activity) {
            Ok(factor) => Ok(factor.into()),
            Err(err) if err.is_not_found() && self.config.fallback_to_defaults => {
                tracing::debug!(activity_id = activity.id(), "no registry factor, using default tables");
                default_factor(activity, category)
            }
            Err(err) => Err(err),
        }
    }

    /// Exact match first; on a miss, any candidate whose unit the activity
    /// can be converted into.
    fn registry_factor(&self, registry: &dyn FactorRegistry, activity: &dyn Activity) -> EmissionsResult<EmissionFactor> {
        let query = FactorQuery::new()
            .scope(Scope::Scope3)
            .region(activity.location())
            .source(activity.source())
            .category(activity.category())
            .unit(activity.unit())
            .valid_at(Utc::now());
        let relaxed = query.without_unit();
        let unit = activity.unit();

        if self.config.prefer_supplier_data {
            let candidates = registry.list_factors(&relaxed)?;
            let supplier = candidates.iter().filter(|f| {
                f.method == Some(CalculationMethod::SupplierSpecific) && is_convertible(unit, &f.unit)
            });
            if let Some(factor) = best_match(supplier, &relaxed) {
                return Ok(factor.clone());
            }
        }

        find_convertible(registry, &query, unit)
    }
}

/// Built-in factor for an activity. Currency units always use the spend
/// table.
fn default_factor(activity: &dyn Activity, category: Scope3Category) -> EmissionsResult<ResolvedFactor> {
    let tables = value_chain::tables();
    let text = activity.category().trim().to_ascii_lowercase();

    if is_currency(activity.unit()) {
        let key = spend_key(category, &text);
        return table_factor(&tables.spend, "spend", key, Some(activity.unit()), CalculationMethod::SpendBased);
    }

    let (table, name, key) = match category {
        Scope3Category::BusinessTravel => (&tables.business_travel, "travel", map_business_travel_key(&text)),
        Scope3Category::Commuting => (&tables.commuting, "commuting", map_commuting_key(&text)),
        Scope3Category::Waste => (&tables.waste, "waste", map_waste_key(&text)),
        Scope3Category::FuelEnergy => (&tables.fuel_energy, "fuel-energy", map_fuel_energy_key(&text)),
        Scope3Category::UpstreamTransport => (&tables.transport, "transport", map_transport_key(&text)),
        Scope3Category::DownstreamTransport => {
            let key = match map_transport_key(&text) {
                "transportation_distribution" => "downstream_transport",
                mode => mode,
            };
            (&tables.transport, "transport", key)
        }
        Scope3Category::UseSoldProducts => (&tables.use_phase, "use-phase", "use_sold_products"),
        Scope3Category::EndOfLife => (&tables.end_of_life, "end-of-life", "end_of_life_treatment"),
        Scope3Category::UpstreamLeasedAssets | Scope3Category::DownstreamLeasedAssets => {
            (&tables.leased_assets, "leased-assets", "leased_assets")
        }
        Scope3Category::PurchasedGoods
        | Scope3Category::CapitalGoods
        | Scope3Category::ProcessingSoldProducts
        | Scope3Category::Franchises
        | Scope3Category::Investments => {
            return Err(EmissionsError::unsupported_unit(
                activity.unit(),
                format!("{} defaults are spend-based and need a currency unit", category),
            ))
        }
    };

    table_factor(table, name, key, None, CalculationMethod::ActivityBased)
}

fn table_factor(
    table: &KeyedTable,
    table_name: &str,
    key: &str,
    unit_override: Option<&str>,
    method: CalculationMethod,
) -> EmissionsResult<ResolvedFactor> {
    let value = table
        .get(key)
        .ok_or_else(|| EmissionsError::not_found(format!("default scope 3 {} factor '{}'", table_name, key)))?;
    Ok(ResolvedFactor {
        id: format!("scope3-{}-{}", table_name, key),
        value,
        unit: unit_override.unwrap_or_else(|| table.unit_for(key)).to_string(),
        method: Some(method),
    })
}

fn spend_key(category: Scope3Category, text: &str) -> &'static str {
    match category {
        Scope3Category::CapitalGoods => "capital-goods",
        Scope3Category::ProcessingSoldProducts => "processing_sold_products",
        Scope3Category::UseSoldProducts => "use_sold_products",
        Scope3Category::Franchises => "franchises",
        Scope3Category::Investments => "investments",
        Scope3Category::UpstreamTransport | Scope3Category::DownstreamTransport => "transportation_distribution",
        _ => map_spend_key(text),
    }
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

fn map_business_travel_key(text: &str) -> &'static str {
    if text.contains("flight") && text.contains("long") {
        "flight-long"
    } else if text.contains("flight") && text.contains("short") {
        "flight-short"
    } else if text.contains("flight") {
        "flight-domestic"
    } else if text.contains("train") {
        "train"
    } else if contains_any(text, &["taxi", "rideshare"]) {
        "car-taxi"
    } else if text.contains("bus") {
        "bus"
    } else if text.contains("hotel") {
        "hotel-night"
    } else if contains_any(text, &["car", "rental"]) {
        "car-rental"
    } else {
        "flight-domestic"
    }
}

fn map_commuting_key(text: &str) -> &'static str {
    if text.contains("electric") {
        "car-electric"
    } else if text.contains("hybrid") {
        "car-hybrid"
    } else if text.contains("diesel") {
        "car-diesel"
    } else if text.contains("train") {
        "train"
    } else if contains_any(text, &["bus", "transit"]) {
        "public-transit"
    } else if contains_any(text, &["bike", "bicycle"]) {
        "bicycle"
    } else if text.contains("walk") {
        "walking"
    } else if contains_any(text, &["wfh", "remote"]) {
        "work-from-home"
    } else {
        "car-petrol"
    }
}

fn map_waste_key(text: &str) -> &'static str {
    let recycled = text.contains("recycl");
    if recycled && text.contains("paper") {
        "recycling-paper"
    } else if recycled && text.contains("plastic") {
        "recycling-plastic"
    } else if recycled && text.contains("metal") {
        "recycling-metal"
    } else if recycled && text.contains("glass") {
        "recycling-glass"
    } else if recycled {
        "recycling-paper"
    } else if text.contains("compost") {
        "composting"
    } else if contains_any(text, &["anaerobic", "digest"]) {
        "anaerobic-digestion"
    } else if text.contains("incinerat") {
        "incineration"
    } else if text.contains("organic") {
        "landfill-organic"
    } else {
        "landfill-mixed"
    }
}

fn map_spend_key(text: &str) -> &'static str {
    const RULES: [(&[&str], &str); 15] = [
        (&["capital"], "capital-goods"),
        (&["electronic"], "electronics"),
        (&["software"], "software"),
        (&["cloud"], "cloud-services"),
        (&["office"], "office-supplies"),
        (&["furniture"], "furniture"),
        (&["food", "catering"], "food-catering"),
        (&["professional", "consulting"], "professional-services"),
        (&["marketing"], "marketing"),
        (&["construction"], "construction"),
        (&["processing_sold"], "processing_sold_products"),
        (&["use_sold"], "use_sold_products"),
        (&["transportation_distribution"], "transportation_distribution"),
        (&["investments"], "investments"),
        (&["franchise"], "franchises"),
    ];
    RULES
        .iter()
        .find(|(needles, _)| contains_any(text, needles))
        .map(|(_, key)| *key)
        .unwrap_or("general-goods")
}

fn map_fuel_energy_key(text: &str) -> &'static str {
    if contains_any(text, &["t&d", "transmission", "distribution"]) {
        "transmission_distribution"
    } else {
        "fuel_wtt"
    }
}

fn map_transport_key(text: &str) -> &'static str {
    if text.contains("air") {
        "air_freight"
    } else if contains_any(text, &["ship", "ocean", "sea"]) {
        "ship_freight"
    } else if text.contains("rail") {
        "rail_freight"
    } else if contains_any(text, &["truck", "road", "freight"]) {
        "truck_freight"
    } else {
        "transportation_distribution"
    }
}
