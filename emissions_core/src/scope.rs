//! GHG Protocol classification enums shared by factors and records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{EmissionsError, EmissionsResult};

/// GHG Protocol emission scope.
///
/// Serialized as its number (`1`, `2`, `3`); any other number is rejected
/// with [`EmissionsError::InvalidScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Scope {
    /// Direct emissions from owned or controlled sources
    Scope1,
    /// Indirect emissions from purchased energy
    Scope2,
    /// All other value-chain emissions
    Scope3,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Scope1, Scope::Scope2, Scope::Scope3];

    pub fn number(&self) -> u8 {
        match self {
            Scope::Scope1 => 1,
            Scope::Scope2 => 2,
            Scope::Scope3 => 3,
        }
    }

    pub fn from_number(n: u8) -> EmissionsResult<Self> {
        match n {
            1 => Ok(Scope::Scope1),
            2 => Ok(Scope::Scope2),
            3 => Ok(Scope::Scope3),
            other => Err(EmissionsError::InvalidScope {
                value: other.to_string(),
            }),
        }
    }

    /// Parse "1", "scope1", "Scope 2", "scope_3"
    pub fn from_str_flexible(s: &str) -> EmissionsResult<Self> {
        let cleaned: String = s
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect();
        let digits = cleaned.strip_prefix("scope").unwrap_or(&cleaned);
        digits
            .parse::<u8>()
            .map_err(|_| EmissionsError::InvalidScope { value: s.to_string() })
            .and_then(Scope::from_number)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Scope::Scope1 => "Scope 1",
            Scope::Scope2 => "Scope 2",
            Scope::Scope3 => "Scope 3",
        }
    }
}

impl TryFrom<u8> for Scope {
    type Error = EmissionsError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Scope::from_number(n)
    }
}

impl From<Scope> for u8 {
    fn from(scope: Scope) -> u8 {
        scope.number()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// How an emission figure was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CalculationMethod {
    /// Grid-average factor for the consumption location (Scope 2)
    LocationBased,
    /// Contractual or supplier-specific instrument (Scope 2)
    MarketBased,
    /// Monetary amount times an economic-intensity factor
    SpendBased,
    /// Physical quantity times an activity factor
    ActivityBased,
    /// Emissions data reported by the supplier
    SupplierSpecific,
}

impl CalculationMethod {
    pub fn code(&self) -> &'static str {
        match self {
            CalculationMethod::LocationBased => "location-based",
            CalculationMethod::MarketBased => "market-based",
            CalculationMethod::SpendBased => "spend-based",
            CalculationMethod::ActivityBased => "activity-based",
            CalculationMethod::SupplierSpecific => "supplier-specific",
        }
    }

    pub fn from_str_flexible(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().replace([' ', '_'], "-").as_str() {
            "location-based" | "location" => Some(CalculationMethod::LocationBased),
            "market-based" | "market" => Some(CalculationMethod::MarketBased),
            "spend-based" | "spend" => Some(CalculationMethod::SpendBased),
            "activity-based" | "activity" => Some(CalculationMethod::ActivityBased),
            "supplier-specific" | "supplier" => Some(CalculationMethod::SupplierSpecific),
            _ => None,
        }
    }
}

impl fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Confidence classification attached to every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    /// Metered or supplier-reported data
    Measured,
    /// Derived from a broader or proxy factor
    Estimated,
    /// Built-in default or spend-based proxy
    Default,
}

impl fmt::Display for DataQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataQuality::Measured => "measured",
            DataQuality::Estimated => "estimated",
            DataQuality::Default => "default",
        };
        f.write_str(s)
    }
}

/// The 15 GHG Protocol value-chain categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope3Category {
    PurchasedGoods,
    CapitalGoods,
    FuelEnergy,
    UpstreamTransport,
    Waste,
    BusinessTravel,
    Commuting,
    UpstreamLeasedAssets,
    DownstreamTransport,
    ProcessingSoldProducts,
    UseSoldProducts,
    EndOfLife,
    DownstreamLeasedAssets,
    Franchises,
    Investments,
}

impl Scope3Category {
    pub const ALL: [Scope3Category; 15] = [
        Scope3Category::PurchasedGoods,
        Scope3Category::CapitalGoods,
        Scope3Category::FuelEnergy,
        Scope3Category::UpstreamTransport,
        Scope3Category::Waste,
        Scope3Category::BusinessTravel,
        Scope3Category::Commuting,
        Scope3Category::UpstreamLeasedAssets,
        Scope3Category::DownstreamTransport,
        Scope3Category::ProcessingSoldProducts,
        Scope3Category::UseSoldProducts,
        Scope3Category::EndOfLife,
        Scope3Category::DownstreamLeasedAssets,
        Scope3Category::Franchises,
        Scope3Category::Investments,
    ];

    /// GHG Protocol category number, 1 through 15
    pub fn number(&self) -> u8 {
        match self {
            Scope3Category::PurchasedGoods => 1,
            Scope3Category::CapitalGoods => 2,
            Scope3Category::FuelEnergy => 3,
            Scope3Category::UpstreamTransport => 4,
            Scope3Category::Waste => 5,
            Scope3Category::BusinessTravel => 6,
            Scope3Category::Commuting => 7,
            Scope3Category::UpstreamLeasedAssets => 8,
            Scope3Category::DownstreamTransport => 9,
            Scope3Category::ProcessingSoldProducts => 10,
            Scope3Category::UseSoldProducts => 11,
            Scope3Category::EndOfLife => 12,
            Scope3Category::DownstreamLeasedAssets => 13,
            Scope3Category::Franchises => 14,
            Scope3Category::Investments => 15,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Scope3Category::ALL.iter().copied().find(|c| c.number() == n)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Scope3Category::PurchasedGoods => "Purchased Goods and Services",
            Scope3Category::CapitalGoods => "Capital Goods",
            Scope3Category::FuelEnergy => "Fuel and Energy Activities",
            Scope3Category::UpstreamTransport => "Upstream Transportation",
            Scope3Category::Waste => "Waste",
            Scope3Category::BusinessTravel => "Business Travel",
            Scope3Category::Commuting => "Employee Commuting",
            Scope3Category::UpstreamLeasedAssets => "Upstream Leased Assets",
            Scope3Category::DownstreamTransport => "Downstream Transportation",
            Scope3Category::ProcessingSoldProducts => "Processing of Sold Products",
            Scope3Category::UseSoldProducts => "Use of Sold Products",
            Scope3Category::EndOfLife => "End-of-Life Treatment",
            Scope3Category::DownstreamLeasedAssets => "Downstream Leased Assets",
            Scope3Category::Franchises => "Franchises",
            Scope3Category::Investments => "Investments",
        }
    }

    /// Categories 1-8
    pub fn is_upstream(&self) -> bool {
        self.number() <= 8
    }

    /// Categories 9-15
    pub fn is_downstream(&self) -> bool {
        !self.is_upstream()
    }
}

impl fmt::Display for Scope3Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Scope::Scope2).unwrap(), "2");
        let scope: Scope = serde_json::from_str("3").unwrap();
        assert_eq!(scope, Scope::Scope3);
    }

    #[test]
    fn test_out_of_range_scope_rejected() {
        assert!(serde_json::from_str::<Scope>("0").is_err());
        assert!(serde_json::from_str::<Scope>("4").is_err());
        assert_eq!(
            Scope::from_number(7).unwrap_err().error_code(),
            "INVALID_SCOPE"
        );
    }

    #[test]
    fn test_scope_flexible_parse() {
        assert_eq!(Scope::from_str_flexible("scope1").unwrap(), Scope::Scope1);
        assert_eq!(Scope::from_str_flexible("Scope 2").unwrap(), Scope::Scope2);
        assert_eq!(Scope::from_str_flexible("3").unwrap(), Scope::Scope3);
        assert!(Scope::from_str_flexible("scope four").is_err());
    }

    #[test]
    fn test_scope3_category_numbers() {
        for (i, category) in Scope3Category::ALL.iter().enumerate() {
            assert_eq!(category.number() as usize, i + 1);
            assert_eq!(Scope3Category::from_number(category.number()), Some(*category));
        }
        assert_eq!(Scope3Category::from_number(16), None);
        assert!(Scope3Category::UpstreamLeasedAssets.is_upstream());
        assert!(Scope3Category::DownstreamTransport.is_downstream());
    }

    #[test]
    fn test_method_codes() {
        assert_eq!(
            serde_json::to_string(&CalculationMethod::MarketBased).unwrap(),
            "\"market-based\""
        );
        assert_eq!(
            CalculationMethod::from_str_flexible("spend_based"),
            Some(CalculationMethod::SpendBased)
        );
        assert_eq!(CalculationMethod::from_str_flexible("guess"), None);
    }
}
