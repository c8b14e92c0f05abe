//! # Configuration
//!
//! One TOML document configures the whole engine. Every section and field
//! is optional; missing values take the documented defaults.
//!
//! ```toml
//! [engine]
//! enable_parallel_batch = true
//! max_batch_concurrency = 10
//! strict_mode = false
//! default_region = "US-AVERAGE"
//!
//! [registry]
//! preload_defaults = true
//! factor_files = ["factors/org.json"]
//!
//! [scope1]
//! include_ch4_n2o = false
//! fallback_to_defaults = false
//!
//! [scope2]
//! prefer_market_based = false
//! strict_region_matching = false
//! default_method = "location-based"
//! default_region = "US-AVERAGE"
//!
//! [scope3]
//! prefer_supplier_data = true
//! fallback_to_defaults = true
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::calculators::scope2::validate_region;
use crate::calculators::{Scope1Config, Scope2Config, Scope3Config};
use crate::engine::{Engine, EngineBuilder, EngineConfig};
use crate::errors::{EmissionsError, EmissionsResult};
use crate::factors::file::import_into;
use crate::factors::{InMemoryRegistry, RegistryConfig};
use crate::scope::CalculationMethod;

/// The `[registry]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Seed the registry with the built-in factor set
    pub preload_defaults: bool,
    /// JSON factor files imported at startup, in order
    pub factor_files: Vec<PathBuf>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            preload_defaults: true,
            factor_files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionsConfig {
    pub engine: EngineConfig,
    pub registry: RegistrySettings,
    pub scope1: Scope1Config,
    pub scope2: Scope2Config,
    pub scope3: Scope3Config,
}

impl EmissionsConfig {
    pub fn from_toml_str(s: &str) -> EmissionsResult<Self> {
        toml::from_str(s).map_err(|e| EmissionsError::serialization(format!("Invalid config: {}", e)))
    }

    /// Check the whole configuration, reporting every problem at once.
    pub fn validate(&self) -> EmissionsResult<()> {
        let mut problems = self.engine.problems();

        if self.scope2.default_region.trim().is_empty() {
            problems.push("scope2.default_region must not be blank".to_string());
        } else if let Err(e) = validate_region(&self.scope2.default_region) {
            problems.push(format!("scope2.default_region: {}", e));
        }

        if !matches!(
            self.scope2.default_method,
            CalculationMethod::LocationBased | CalculationMethod::MarketBased
        ) {
            problems.push(format!(
                "scope2.default_method must be location-based or market-based, got {}",
                self.scope2.default_method
            ));
        }

        for (i, path) in self.registry.factor_files.iter().enumerate() {
            if path.as_os_str().is_empty() {
                problems.push(format!("registry.factor_files[{}] is empty", i));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(EmissionsError::InvalidConfig { problems })
        }
    }

    /// Build the registry this configuration describes.
    ///
    /// Returns `None` when it would hold no factors, so the calculators use
    /// their built-in tables directly.
    pub fn build_registry(&self) -> EmissionsResult<Option<Arc<InMemoryRegistry>>> {
        let registry = InMemoryRegistry::with_config(RegistryConfig {
            preload_defaults: self.registry.preload_defaults,
        });
        for path in &self.registry.factor_files {
            import_into(&registry, path)?;
        }

        if registry.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Arc::new(registry)))
        }
    }

    /// Validate, then assemble an engine with the standard calculators.
    pub fn build_engine(&self) -> EmissionsResult<Engine> {
        self.validate()?;

        let mut builder = EngineBuilder::new(self.engine.clone());
        if let Some(registry) = self.build_registry()? {
            tracing::info!(factors = registry.len(), "factor registry ready");
            builder = builder.registry(registry);
        }

        builder
            .standard_calculators(self.scope1.clone(), self.scope2.clone(), self.scope3.clone())
            .build()
    }
}

/// Load a TOML configuration file.
///
/// # Returns
///
/// * `Err(EmissionsError::FileError)` - the file could not be read
/// * `Err(EmissionsError::SerializationError)` - invalid TOML or field types
pub fn load_config(path: &Path) -> EmissionsResult<EmissionsConfig> {
    let contents = fs::read_to_string(path)
        .map_err(|e| EmissionsError::file_error("read", path.display().to_string(), e.to_string()))?;

    EmissionsConfig::from_toml_str(&contents).map_err(|e| match e {
        EmissionsError::SerializationError { reason } => {
            EmissionsError::serialization(format!("{} ({})", reason, path.display()))
        }
        other => other,
    })
}
