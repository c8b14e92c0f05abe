//! # Scope Calculators
//!
//! One calculator per GHG Protocol scope. Each follows the same shape:
//!
//! - `*Config` - serde-friendly options, defaulted
//! - `supports(activity)` - whether the calculator handles this activity
//! - `calculate(activity) -> EmissionsResult<EmissionRecord>`
//!
//! Calculators hold only their configuration and an optional shared
//! [`FactorRegistry`](crate::factors::FactorRegistry), so one instance can
//! serve any number of worker threads.
//!
//! ## Available Calculators
//!
//! - [`scope1`] - direct emissions (fuel combustion, refrigerant leaks)
//! - [`scope2`] - purchased energy, location- and market-based
//! - [`scope3`] - the 15 value-chain categories

pub mod scope1;
pub mod scope2;
pub mod scope3;

use crate::activity::Activity;
use crate::errors::{EmissionsError, EmissionsResult};
use crate::factors::{best_match, EmissionFactor, FactorQuery, FactorRegistry};
use crate::record::EmissionRecord;
use crate::scope::Scope;
use crate::units::is_convertible;

pub use scope1::{Scope1Calculator, Scope1Config};
pub use scope2::{Scope2Calculator, Scope2Config};
pub use scope3::{determine_category, Scope3Calculator, Scope3Config};

/// Closed set of calculators the engine can route to.
///
/// Chosen once when the engine is built, so dispatch is a plain match.
#[derive(Debug, Clone)]
pub enum ScopeCalculator {
    Scope1(Scope1Calculator),
    Scope2(Scope2Calculator),
    Scope3(Scope3Calculator),
}

impl ScopeCalculator {
    pub fn scope(&self) -> Scope {
        match self {
            ScopeCalculator::Scope1(_) => Scope::Scope1,
            ScopeCalculator::Scope2(_) => Scope::Scope2,
            ScopeCalculator::Scope3(_) => Scope::Scope3,
        }
    }

    pub fn supports(&self, activity: &dyn Activity) -> bool {
        match self {
            ScopeCalculator::Scope1(c) => c.supports(activity),
            ScopeCalculator::Scope2(c) => c.supports(activity),
            ScopeCalculator::Scope3(c) => c.supports(activity),
        }
    }

    pub fn calculate(&self, activity: &dyn Activity) -> EmissionsResult<EmissionRecord> {
        match self {
            ScopeCalculator::Scope1(c) => c.calculate(activity),
            ScopeCalculator::Scope2(c) => c.calculate(activity),
            ScopeCalculator::Scope3(c) => c.calculate(activity),
        }
    }
}

impl From<Scope1Calculator> for ScopeCalculator {
    fn from(c: Scope1Calculator) -> Self {
        ScopeCalculator::Scope1(c)
    }
}

impl From<Scope2Calculator> for ScopeCalculator {
    fn from(c: Scope2Calculator) -> Self {
        ScopeCalculator::Scope2(c)
    }
}

impl From<Scope3Calculator> for ScopeCalculator {
    fn from(c: Scope3Calculator) -> Self {
        ScopeCalculator::Scope3(c)
    }
}

/// Reject activities with no identity.
pub(crate) fn ensure_present(activity: &dyn Activity) -> EmissionsResult<()> {
    if activity.is_present() {
        Ok(())
    } else {
        Err(EmissionsError::NilActivity)
    }
}

/// Reject quantities no factor can turn into a valid record: negative,
/// NaN or infinite. Zero is allowed.
pub(crate) fn ensure_quantity(activity: &dyn Activity) -> EmissionsResult<()> {
    let quantity = activity.quantity();
    if !quantity.is_finite() {
        return Err(EmissionsError::invalid_quantity(
            activity.id(),
            quantity,
            "quantity must be a finite number",
        ));
    }
    if quantity < 0.0 {
        return Err(EmissionsError::invalid_quantity(activity.id(), quantity, "quantity must not be negative"));
    }
    Ok(())
}

/// Registry lookup that, on a miss, settles for the best candidate whose unit
/// `unit` converts into. The original miss is returned when none qualifies.
pub(crate) fn find_convertible(
    registry: &dyn FactorRegistry,
    query: &FactorQuery,
    unit: &str,
) -> EmissionsResult<EmissionFactor> {
    match registry.find_factor(query) {
        Err(err) if err.is_not_found() => {
            let relaxed = query.without_unit();
            let candidates = registry.list_factors(&relaxed)?;
            let convertible = candidates.iter().filter(|f| is_convertible(unit, &f.unit));
            best_match(convertible, &relaxed).cloned().ok_or(err)
        }
        other => other,
    }
}

/// Case-insensitive membership test for source tokens.
pub(crate) fn source_in(source: &str, sources: &[&str]) -> bool {
    let source = source.trim();
    sources.iter().any(|s| s.eq_ignore_ascii_case(source))
}
