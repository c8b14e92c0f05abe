//! # Emission Records
//!
//! The engine's output. A record is created once per successful calculation
//! and never changes afterwards: it carries a snapshot of the factor value
//! that was applied, so later edits to the registry do not rewrite history.
//!
//! Fields are private and exposed through getters. Records can be
//! serialized for downstream reporting and read back, but only the
//! calculators construct new ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::activity::Activity;
use crate::errors::{EmissionsError, EmissionsResult};
use crate::scope::{CalculationMethod, DataQuality, Scope, Scope3Category};
use crate::units::normalize_to_kwh;

/// The factor a calculator settled on, expressed against the quantity it
/// multiplies.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AppliedFactor {
    pub factor_id: String,
    /// kg CO2e per unit of `quantity`
    pub value: f64,
    /// Activity quantity after conversion into the factor's unit
    pub quantity: f64,
    pub method: CalculationMethod,
    pub data_quality: DataQuality,
    pub region: String,
}

/// One calculated emission, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionRecord {
    id: String,
    activity_id: String,
    factor_id: String,
    scope: Scope,
    emissions_kg_co2e: f64,
    emissions_tonnes_co2e: f64,
    input_quantity: f64,
    input_unit: String,
    emission_factor: f64,
    method: CalculationMethod,
    data_quality: DataQuality,
    region: String,
    #[serde(default)]
    org_id: String,
    #[serde(default)]
    workspace_id: String,
    #[serde(default)]
    period_start: Option<DateTime<Utc>>,
    #[serde(default)]
    period_end: Option<DateTime<Utc>>,
    calculated_at: DateTime<Utc>,
    #[serde(default)]
    notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope3_category: Option<Scope3Category>,
}

fn new_record_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("em_{}", &uuid[..12])
}

impl EmissionRecord {
    /// Apply the factor and check the result before handing it out.
    ///
    /// A product that overflows to infinity is reported against the
    /// activity's quantity; any other invariant violation is an internal
    /// error, since quantities and factors are validated upstream.
    pub(crate) fn from_activity(
        activity: &dyn Activity,
        scope: Scope,
        applied: AppliedFactor,
    ) -> EmissionsResult<Self> {
        let emissions_kg_co2e = applied.quantity * applied.value;
        if emissions_kg_co2e.is_infinite() {
            return Err(EmissionsError::invalid_quantity(
                activity.id(),
                activity.quantity(),
                format!("emissions overflow with factor {} ({})", applied.factor_id, applied.value),
            ));
        }

        let record = Self {
            id: new_record_id(),
            activity_id: activity.id().to_string(),
            factor_id: applied.factor_id,
            scope,
            emissions_kg_co2e,
            emissions_tonnes_co2e: emissions_kg_co2e / 1000.0,
            input_quantity: activity.quantity(),
            input_unit: activity.unit().to_string(),
            emission_factor: applied.value,
            method: applied.method,
            data_quality: applied.data_quality,
            region: applied.region,
            org_id: activity.org_id().to_string(),
            workspace_id: activity.workspace_id().to_string(),
            period_start: activity.period_start(),
            period_end: activity.period_end(),
            calculated_at: Utc::now(),
            notes: String::new(),
            scope3_category: None,
        };

        record.validate().map_err(|problems| EmissionsError::Internal {
            message: format!("record for activity '{}' is invalid: {}", record.activity_id, problems.join("; ")),
        })?;
        Ok(record)
    }

    pub(crate) fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub(crate) fn with_scope3_category(mut self, category: Scope3Category) -> Self {
        self.scope3_category = Some(category);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    pub fn factor_id(&self) -> &str {
        &self.factor_id
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn emissions_kg_co2e(&self) -> f64 {
        self.emissions_kg_co2e
    }

    /// Always `emissions_kg_co2e / 1000`.
    pub fn emissions_tonnes_co2e(&self) -> f64 {
        self.emissions_tonnes_co2e
    }

    /// Quantity as supplied on the activity, before any unit conversion.
    pub fn input_quantity(&self) -> f64 {
        self.input_quantity
    }

    pub fn input_unit(&self) -> &str {
        &self.input_unit
    }

    /// Snapshot of the factor value applied, kg CO2e per converted unit.
    pub fn emission_factor(&self) -> f64 {
        self.emission_factor
    }

    pub fn method(&self) -> CalculationMethod {
        self.method
    }

    pub fn data_quality(&self) -> DataQuality {
        self.data_quality
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        self.period_start
    }

    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.period_end
    }

    pub fn calculated_at(&self) -> DateTime<Utc> {
        self.calculated_at
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn scope3_category(&self) -> Option<Scope3Category> {
        self.scope3_category
    }

    /// Check the record invariants, reporting every violation at once.
    ///
    /// Useful on records read back from storage, where nothing guarantees
    /// they were produced by this crate.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.id.trim().is_empty() {
            problems.push("record id is empty".to_string());
        }
        if self.activity_id.trim().is_empty() {
            problems.push("activity id is empty".to_string());
        }
        if self.factor_id.trim().is_empty() {
            problems.push("factor id is empty".to_string());
        }
        if !self.emissions_kg_co2e.is_finite() || self.emissions_kg_co2e < 0.0 {
            problems.push(format!("emissions must be non-negative, got {}", self.emissions_kg_co2e));
        }
        if self.emissions_tonnes_co2e != self.emissions_kg_co2e / 1000.0 {
            problems.push(format!(
                "tonnes ({}) do not equal kg / 1000 ({})",
                self.emissions_tonnes_co2e,
                self.emissions_kg_co2e / 1000.0
            ));
        }
        if self.scope3_category.is_some() && self.scope != Scope::Scope3 {
            problems.push(format!("{} record carries a Scope 3 category", self.scope));
        }
        if let (Some(start), Some(end)) = (self.period_start, self.period_end) {
            if start > end {
                problems.push("reporting period starts after it ends".to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

/// Total kg CO2e over a set of records.
pub fn sum_emissions(records: &[EmissionRecord]) -> f64 {
    records.iter().map(|r| r.emissions_kg_co2e).sum()
}

/// kg CO2e per scope. Scopes with no records are absent.
pub fn sum_by_scope(records: &[EmissionRecord]) -> BTreeMap<Scope, f64> {
    let mut totals = BTreeMap::new();
    for record in records {
        *totals.entry(record.scope).or_insert(0.0) += record.emissions_kg_co2e;
    }
    totals
}

pub fn filter_by_scope(records: &[EmissionRecord], scope: Scope) -> Vec<&EmissionRecord> {
    records.iter().filter(|r| r.scope == scope).collect()
}

pub fn filter_by_org<'a>(records: &'a [EmissionRecord], org_id: &str) -> Vec<&'a EmissionRecord> {
    records.iter().filter(|r| r.org_id == org_id).collect()
}

/// Dual-method Scope 2 totals. Location-based and market-based figures are
/// kept apart so both can be disclosed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope2Summary {
    pub location_based_kg_co2e: f64,
    pub market_based_kg_co2e: f64,
    /// Energy covered by the records, normalized to kWh
    pub total_kwh: f64,
    pub record_count: usize,
}

impl Scope2Summary {
    /// Summarize the Scope 2 records in `records`; other scopes are ignored.
    pub fn from_records(records: &[EmissionRecord]) -> Self {
        let mut summary = Scope2Summary::default();
        for record in records.iter().filter(|r| r.scope == Scope::Scope2) {
            match record.method {
                CalculationMethod::MarketBased | CalculationMethod::SupplierSpecific => {
                    summary.market_based_kg_co2e += record.emissions_kg_co2e
                }
                _ => summary.location_based_kg_co2e += record.emissions_kg_co2e,
            }
            if let Ok(kwh) = normalize_to_kwh(record.input_quantity, &record.input_unit) {
                summary.total_kwh += kwh;
            }
            summary.record_count += 1;
        }
        summary
    }
}

/// Scope 3 totals per GHG Protocol category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope3Summary {
    pub by_category: BTreeMap<Scope3Category, f64>,
    /// Categories 1-8
    pub upstream_kg_co2e: f64,
    /// Categories 9-15
    pub downstream_kg_co2e: f64,
    /// Scope 3 records with no category attached
    pub uncategorized_kg_co2e: f64,
    pub total_kg_co2e: f64,
}

impl Scope3Summary {
    pub fn from_records(records: &[EmissionRecord]) -> Self {
        let mut summary = Scope3Summary::default();
        for record in records.iter().filter(|r| r.scope == Scope::Scope3) {
            let kg = record.emissions_kg_co2e;
            summary.total_kg_co2e += kg;
            match record.scope3_category {
                Some(category) => {
                    *summary.by_category.entry(category).or_insert(0.0) += kg;
                    if category.is_upstream() {
                        summary.upstream_kg_co2e += kg;
                    } else {
                        summary.downstream_kg_co2e += kg;
                    }
                }
                None => summary.uncategorized_kg_co2e += kg,
            }
        }
        summary
    }
}
