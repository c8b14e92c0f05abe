//! # Calculation Engine
//!
//! Routes each activity to the calculator for its scope and runs batches on
//! a fixed-size worker pool.
//!
//! The set of calculators and the shared registry are fixed when the engine
//! is built; nothing is re-resolved per call.
//!
//! ## Example
//!
//! ```rust
//! use emissions_core::activity::ActivityRecord;
//! use emissions_core::engine::{EngineBuilder, EngineConfig};
//!
//! let engine = EngineBuilder::new(EngineConfig::default())
//!     .standard_calculators(Default::default(), Default::default(), Default::default())
//!     .build()
//!     .unwrap();
//!
//! let bill = ActivityRecord::new("bill-7", "electricity", 1.0, "MWh").with_location("EU-FRANCE");
//! let record = engine.calculate(&bill).unwrap();
//! assert_eq!(record.emissions_kg_co2e(), 52.0);
//! ```

pub mod batch;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::activity::{Activity, WithDefaultLocation};
use crate::calculators::{
    Scope1Calculator, Scope1Config, Scope2Calculator, Scope2Config, Scope3Calculator, Scope3Config,
    ScopeCalculator,
};
use crate::errors::{EmissionsError, EmissionsResult};
use crate::factors::FactorRegistry;
use crate::record::EmissionRecord;
use crate::scope::Scope;

pub use batch::{BatchItemStatus, BatchResult, CalculationResult, CancellationToken};

/// Engine behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run batches on the worker pool
    pub enable_parallel_batch: bool,
    /// Worker pool size
    pub max_batch_concurrency: usize,
    /// Fail the whole batch when any activity fails
    pub strict_mode: bool,
    /// Location given to activities that have none
    pub default_region: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_parallel_batch: true,
            max_batch_concurrency: 10,
            strict_mode: false,
            default_region: "US-AVERAGE".to_string(),
        }
    }
}

impl EngineConfig {
    /// Every problem with the configuration, empty when valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.max_batch_concurrency == 0 {
            problems.push("engine.max_batch_concurrency must be at least 1".to_string());
        }
        if self.default_region.trim().is_empty() {
            problems.push("engine.default_region must not be blank".to_string());
        }
        problems
    }
}

const SCOPE1_SOURCES: [&str; 8] = [
    "fleet",
    "vehicle",
    "on-site",
    "stationary_combustion",
    "mobile_combustion",
    "fugitive",
    "refrigerants",
    "process",
];
const SCOPE2_SOURCES: [&str; 5] = ["utility_bill", "electricity", "steam", "heating", "cooling"];
const SCOPE3_SOURCES: [&str; 10] = [
    "travel",
    "business_travel",
    "commuting",
    "purchases",
    "waste",
    "upstream",
    "downstream",
    "freight",
    "shipping",
    "investment",
];

/// Scope for an activity, from its source alone. Unknown sources are
/// treated as purchased energy (Scope 2).
pub fn determine_scope(activity: &dyn Activity) -> Scope {
    let source = activity.source().trim().to_ascii_lowercase();
    let source = source.as_str();
    if SCOPE1_SOURCES.contains(&source) {
        Scope::Scope1
    } else if SCOPE3_SOURCES.contains(&source) {
        Scope::Scope3
    } else if SCOPE2_SOURCES.contains(&source) {
        Scope::Scope2
    } else {
        tracing::debug!(activity_id = activity.id(), source, "unrecognized source, defaulting to Scope 2");
        Scope::Scope2
    }
}

/// Assembles an [`Engine`].
///
/// Calculators given explicitly win over the standard set.
pub struct EngineBuilder {
    config: EngineConfig,
    registry: Option<Arc<dyn FactorRegistry>>,
    calculators: BTreeMap<Scope, ScopeCalculator>,
    standard: Option<(Scope1Config, Scope2Config, Scope3Config)>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: None,
            calculators: BTreeMap::new(),
            standard: None,
        }
    }

    /// Shared registry, handed to the standard calculators.
    pub fn registry(mut self, registry: Arc<dyn FactorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn calculator(mut self, calculator: impl Into<ScopeCalculator>) -> Self {
        let calculator = calculator.into();
        self.calculators.insert(calculator.scope(), calculator);
        self
    }

    /// Build one calculator per scope from these configs at [`build`](Self::build) time.
    pub fn standard_calculators(mut self, scope1: Scope1Config, scope2: Scope2Config, scope3: Scope3Config) -> Self {
        self.standard = Some((scope1, scope2, scope3));
        self
    }

    pub fn build(self) -> EmissionsResult<Engine> {
        let problems = self.config.problems();
        if !problems.is_empty() {
            return Err(EmissionsError::InvalidConfig { problems });
        }

        let mut calculators = self.calculators;
        if let Some((scope1, scope2, scope3)) = self.standard {
            let registry = self.registry.clone();
            let attach = |calc: ScopeCalculator| match (&registry, calc) {
                (Some(r), ScopeCalculator::Scope1(c)) => ScopeCalculator::Scope1(c.with_registry(r.clone())),
                (Some(r), ScopeCalculator::Scope2(c)) => ScopeCalculator::Scope2(c.with_registry(r.clone())),
                (Some(r), ScopeCalculator::Scope3(c)) => ScopeCalculator::Scope3(c.with_registry(r.clone())),
                (None, calc) => calc,
            };
            let standard = [
                attach(Scope1Calculator::new(scope1).into()),
                attach(Scope2Calculator::new(scope2).into()),
                attach(Scope3Calculator::new(scope3).into()),
            ];
            for calc in standard {
                calculators.entry(calc.scope()).or_insert(calc);
            }
        }

        let pool = if self.config.enable_parallel_batch {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.max_batch_concurrency)
                .thread_name(|i| format!("emissions-worker-{}", i))
                .build()
                .map_err(|e| EmissionsError::Internal {
                    message: format!("failed to start worker pool: {}", e),
                })?;
            Some(Arc::new(pool))
        } else {
            None
        };

        for scope in calculators.keys() {
            tracing::info!(scope = %scope, "registered calculator");
        }

        Ok(Engine {
            config: self.config,
            registry: self.registry,
            calculators,
            pool,
        })
    }
}

/// Scope routing and batch orchestration over a fixed set of calculators.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    registry: Option<Arc<dyn FactorRegistry>>,
    calculators: BTreeMap<Scope, ScopeCalculator>,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("has_registry", &self.registry.is_some())
            .field("calculators", &self.calculators)
            .finish()
    }
}

impl Engine {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> Option<&Arc<dyn FactorRegistry>> {
        self.registry.as_ref()
    }

    pub fn calculator(&self, scope: Scope) -> Option<&ScopeCalculator> {
        self.calculators.get(&scope)
    }

    pub fn determine_scope(&self, activity: &dyn Activity) -> Scope {
        determine_scope(activity)
    }

    /// Calculate one activity.
    ///
    /// # Errors
    ///
    /// * `NilActivity` - the activity has no id
    /// * `NoCalculatorRegistered` - nothing handles the activity's scope
    /// * `UnsupportedActivity` - the calculator rejects the activity
    /// * `CalculationFailed` - the calculator failed; the cause is kept
    pub fn calculate(&self, activity: &dyn Activity) -> EmissionsResult<EmissionRecord> {
        if !activity.is_present() {
            return Err(EmissionsError::NilActivity);
        }

        let start = Instant::now();
        let scope = determine_scope(activity);

        tracing::debug!(
            activity_id = activity.id(),
            source = activity.source(),
            scope = %scope,
            quantity = activity.quantity(),
            unit = activity.unit(),
            "calculating emissions"
        );

        let calculator = self
            .calculators
            .get(&scope)
            .ok_or_else(|| EmissionsError::NoCalculatorRegistered {
                activity_id: activity.id().to_string(),
                scope,
            })?;

        if !calculator.supports(activity) {
            return Err(EmissionsError::UnsupportedActivity {
                activity_id: activity.id().to_string(),
                activity_source: activity.source().to_string(),
                unit: activity.unit().to_string(),
            });
        }

        let located = WithDefaultLocation::new(activity, &self.config.default_region);
        let record = calculator.calculate(&located).map_err(|cause| {
            tracing::error!(
                activity_id = activity.id(),
                scope = %scope,
                error = %cause,
                "calculation failed"
            );
            EmissionsError::calculation_failed(activity.id(), scope, cause)
        })?;

        tracing::info!(
            activity_id = activity.id(),
            scope = %scope,
            emissions_kg_co2e = record.emissions_kg_co2e(),
            duration_ms = start.elapsed().as_millis() as u64,
            "calculated emissions"
        );

        Ok(record)
    }
}
