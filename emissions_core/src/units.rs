//! # Units
//!
//! Activities arrive with free unit strings such as `"MWh"`, `"miles"` or
//! `"USD"`. This module turns those tokens into dimensions and converts
//! quantities between tokens of the same dimension. Conversion constants
//! live here and nowhere else.
//!
//! Emission factors are always expressed in kg CO2e per unit. Tonnes are
//! derived by dividing by exactly 1000.
//!
//! ## Example
//!
//! ```rust
//! use emissions_core::units::{convert_quantity, normalize_to_kwh, EnergyUnit};
//!
//! assert_eq!(EnergyUnit::Mwh.to_kwh(1.0), 1000.0);
//! assert_eq!(normalize_to_kwh(2.0, "MWh").unwrap(), 2000.0);
//! assert_eq!(convert_quantity(3.0, "nights", "night").unwrap(), 3.0);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{EmissionsError, EmissionsResult};

/// kWh per GJ
pub const KWH_PER_GJ: f64 = 277.778;
/// kWh per US therm
pub const KWH_PER_THERM: f64 = 29.3071;
/// kWh per MMBtu
pub const KWH_PER_MMBTU: f64 = 293.071;
/// Kilometres per statute mile
pub const KM_PER_MILE: f64 = 1.60934;
/// Litres per US gallon
pub const LITRES_PER_US_GALLON: f64 = 3.78541;
pub const KG_PER_POUND: f64 = 0.453592;

// ============================================================================
// Unit Tokens
// ============================================================================

/// Energy units accepted for purchased-energy activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnergyUnit {
    #[serde(rename = "kWh")]
    Kwh,
    #[serde(rename = "MWh")]
    Mwh,
    #[serde(rename = "GJ")]
    Gj,
    #[serde(rename = "therm")]
    Therm,
    #[serde(rename = "MMBtu")]
    MmBtu,
}

impl EnergyUnit {
    pub const ALL: [EnergyUnit; 5] = [
        EnergyUnit::Kwh,
        EnergyUnit::Mwh,
        EnergyUnit::Gj,
        EnergyUnit::Therm,
        EnergyUnit::MmBtu,
    ];

    /// Canonical unit token
    pub fn code(&self) -> &'static str {
        match self {
            EnergyUnit::Kwh => "kWh",
            EnergyUnit::Mwh => "MWh",
            EnergyUnit::Gj => "GJ",
            EnergyUnit::Therm => "therm",
            EnergyUnit::MmBtu => "MMBtu",
        }
    }

    /// Parse a unit token, ignoring case and a trailing plural `s` on therms.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "kwh" => Some(EnergyUnit::Kwh),
            "mwh" => Some(EnergyUnit::Mwh),
            "gj" => Some(EnergyUnit::Gj),
            "therm" | "therms" => Some(EnergyUnit::Therm),
            "mmbtu" => Some(EnergyUnit::MmBtu),
            _ => None,
        }
    }

    /// kWh contained in one of this unit
    pub fn kwh_per_unit(&self) -> f64 {
        match self {
            EnergyUnit::Kwh => 1.0,
            EnergyUnit::Mwh => 1000.0,
            EnergyUnit::Gj => KWH_PER_GJ,
            EnergyUnit::Therm => KWH_PER_THERM,
            EnergyUnit::MmBtu => KWH_PER_MMBTU,
        }
    }

    pub fn to_kwh(&self, quantity: f64) -> f64 {
        quantity * self.kwh_per_unit()
    }
}

impl fmt::Display for EnergyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Normalize an energy quantity expressed in `unit` to kWh.
pub fn normalize_to_kwh(quantity: f64, unit: &str) -> EmissionsResult<f64> {
    EnergyUnit::parse(unit)
        .map(|u| u.to_kwh(quantity))
        .ok_or_else(|| EmissionsError::unsupported_unit(unit, "expected kWh, MWh, GJ, therm or MMBtu"))
}

const CURRENCY_CODES: [&str; 9] = ["USD", "EUR", "GBP", "CAD", "AUD", "JPY", "CHF", "CNY", "INR"];

/// True when the unit token denotes a monetary amount.
pub fn is_currency(unit: &str) -> bool {
    let unit = unit.trim();
    CURRENCY_CODES.iter().any(|code| unit.eq_ignore_ascii_case(code))
        || unit.contains('$')
        || unit.starts_with("USD")
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Dimension {
    Distance(f64),
    Freight(f64),
    Volume(f64),
    Energy(f64),
    Mass(f64),
    Nights(f64),
    Days(f64),
}

/// Canonicalize a unit token into a dimension and its size in base units
/// (km, tonne-km, litres, kWh, kg, nights, days).
fn dimension_of(token: &str) -> Option<Dimension> {
    if let Some(energy) = EnergyUnit::parse(token) {
        return Some(Dimension::Energy(energy.kwh_per_unit()));
    }
    let dim = match token.trim().to_ascii_lowercase().as_str() {
        "km" | "kilometer" | "kilometers" | "kilometre" | "kilometres" => Dimension::Distance(1.0),
        "mi" | "mile" | "miles" => Dimension::Distance(KM_PER_MILE),
        "tonne-km" | "ton-km" | "tkm" | "t-km" => Dimension::Freight(1.0),
        "kg-km" => Dimension::Freight(0.001),
        "tonne-mile" | "ton-mile" | "tonne-miles" | "ton-miles" => Dimension::Freight(KM_PER_MILE),
        "l" | "litre" | "litres" | "liter" | "liters" => Dimension::Volume(1.0),
        "gal" | "gallon" | "gallons" => Dimension::Volume(LITRES_PER_US_GALLON),
        "kg" | "kgs" | "kilogram" | "kilograms" => Dimension::Mass(1.0),
        "g" | "gram" | "grams" => Dimension::Mass(0.001),
        "t" | "tonne" | "tonnes" | "metric_ton" | "metric_tons" => Dimension::Mass(1000.0),
        "lb" | "lbs" | "pound" | "pounds" => Dimension::Mass(KG_PER_POUND),
        "night" | "nights" | "room-night" | "room-nights" => Dimension::Nights(1.0),
        "day" | "days" => Dimension::Days(1.0),
        _ => return None,
    };
    Some(dim)
}

/// Convert `quantity` from one unit token to another.
///
/// Identical tokens (case-insensitive) and an empty target pass through.
/// Otherwise both tokens must belong to the same dimension; anything else is
/// [`EmissionsError::UnsupportedUnit`].
pub fn convert_quantity(quantity: f64, from: &str, to: &str) -> EmissionsResult<f64> {
    if to.trim().is_empty() || from.trim().eq_ignore_ascii_case(to.trim()) {
        return Ok(quantity);
    }

    match (dimension_of(from), dimension_of(to)) {
        (Some(Dimension::Distance(a)), Some(Dimension::Distance(b)))
        | (Some(Dimension::Freight(a)), Some(Dimension::Freight(b)))
        | (Some(Dimension::Volume(a)), Some(Dimension::Volume(b)))
        | (Some(Dimension::Energy(a)), Some(Dimension::Energy(b)))
        | (Some(Dimension::Mass(a)), Some(Dimension::Mass(b)))
        | (Some(Dimension::Nights(a)), Some(Dimension::Nights(b)))
        | (Some(Dimension::Days(a)), Some(Dimension::Days(b))) => {
            if a == b {
                Ok(quantity)
            } else {
                Ok(quantity * a / b)
            }
        }
        _ => Err(EmissionsError::unsupported_unit(
            from,
            format!("cannot convert {} to {}", from, to),
        )),
    }
}

/// True when [`convert_quantity`] would succeed for these tokens.
pub fn is_convertible(from: &str, to: &str) -> bool {
    convert_quantity(1.0, from, to).is_ok()
}
