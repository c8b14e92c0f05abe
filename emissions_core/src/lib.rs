//! # emissions_core - GHG Protocol Emissions Calculation Engine
//!
//! `emissions_core` turns activity data (litres of diesel, kWh of grid power,
//! dollars of purchased software) into emission records in kg CO2e, following
//! the GHG Protocol split into Scope 1, Scope 2 and Scope 3.
//!
//! ## Design Philosophy
//!
//! - **Deterministic**: the same factors and inputs always give the same record
//!   values and the same batch totals, whatever the worker count
//! - **JSON-First**: records, factors, batch results and errors all serialize
//! - **Rich Errors**: callers can tell a missing factor from bad input data
//! - **Works Offline**: built-in factor tables cover every calculator when no
//!   registry is configured
//!
//! ## Quick Start
//!
//! ```rust
//! use emissions_core::activity::ActivityRecord;
//! use emissions_core::config::EmissionsConfig;
//!
//! let engine = EmissionsConfig::default().build_engine().unwrap();
//!
//! let activities = vec![
//!     ActivityRecord::new("fuel-1", "fleet", 100.0, "L").with_category("diesel"),
//!     ActivityRecord::new("bill-1", "electricity", 2.5, "MWh").with_location("EU-FRANCE"),
//!     ActivityRecord::new("po-1", "purchases", 1200.0, "USD").with_category("software"),
//! ];
//!
//! let batch = engine.calculate_batch(&activities).unwrap();
//! assert_eq!(batch.success_count, 3);
//!
//! let json = serde_json::to_string_pretty(&batch.records).unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`activity`] - the activity contract consumed by calculators
//! - [`factors`] - emission factors, the registry and specificity matching
//! - [`defaults`] - built-in fuel, grid and value-chain tables
//! - [`calculators`] - Scope 1, 2 and 3 calculators
//! - [`engine`] - scope routing and batch execution
//! - [`record`] - emission records and summaries
//! - [`config`] - TOML configuration
//! - [`units`] - unit normalization
//! - [`errors`] - structured error types

pub mod activity;
pub mod calculators;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod errors;
pub mod factors;
pub mod record;
pub mod scope;
pub mod units;

// Re-export commonly used types at crate root for convenience
pub use activity::{Activity, ActivityRecord};
pub use config::{load_config, EmissionsConfig};
pub use engine::{BatchResult, CancellationToken, Engine, EngineBuilder, EngineConfig};
pub use errors::{EmissionsError, EmissionsResult, ErrorKind};
pub use factors::{EmissionFactor, FactorQuery, FactorRegistry, InMemoryRegistry};
pub use record::EmissionRecord;
pub use scope::{CalculationMethod, DataQuality, Scope, Scope3Category};
