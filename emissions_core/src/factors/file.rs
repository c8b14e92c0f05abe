//! # Factor Files
//!
//! Versioned JSON documents carrying a set of emission factors, used to move
//! curated factor sets between environments and to load organization
//! overrides at startup.
//!
//! - **Atomic export**: write to `.tmp`, sync, rename
//! - **Version validation**: major must match; for 0.x the file's minor may
//!   not be newer than ours
//! - **Factor validation**: every factor is validated on load
//!
//! ## Example
//!
//! ```rust,no_run
//! use emissions_core::factors::file::{load_factor_file, save_factor_file, FactorFile};
//! use emissions_core::factors::seed::default_factors;
//! use std::path::Path;
//!
//! let file = FactorFile::new(default_factors());
//! save_factor_file(&file, Path::new("factors.json"))?;
//!
//! let loaded = load_factor_file(Path::new("factors.json"))?;
//! assert_eq!(loaded.factors.len(), file.factors.len());
//! # Ok::<(), emissions_core::errors::EmissionsError>(())
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EmissionFactor, FactorRegistry};
use crate::errors::{EmissionsError, EmissionsResult};

/// Current factor-file schema version
pub const SCHEMA_VERSION: &str = "0.1.0";

/// On-disk factor set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorFile {
    pub version: String,
    #[serde(default = "Utc::now")]
    pub exported_at: DateTime<Utc>,
    pub factors: Vec<EmissionFactor>,
}

impl FactorFile {
    pub fn new(factors: Vec<EmissionFactor>) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            exported_at: Utc::now(),
            factors,
        }
    }

    /// Parse and validate a factor file from JSON text.
    pub fn from_json_str(json: &str) -> EmissionsResult<Self> {
        let file: FactorFile = serde_json::from_str(json)?;
        validate_version(&file.version)?;
        for factor in &file.factors {
            factor.validate()?;
        }
        Ok(file)
    }
}

/// Save a factor file with atomic write semantics.
pub fn save_factor_file(file: &FactorFile, path: &Path) -> EmissionsResult<()> {
    let json = serde_json::to_string_pretty(file)?;

    let tmp_path = path.with_extension("json.tmp");

    let mut tmp_file = File::create(&tmp_path).map_err(|e| {
        EmissionsError::file_error("create temp file", tmp_path.display().to_string(), e.to_string())
    })?;

    tmp_file.write_all(json.as_bytes()).map_err(|e| {
        EmissionsError::file_error("write temp file", tmp_path.display().to_string(), e.to_string())
    })?;

    tmp_file.sync_all().map_err(|e| {
        EmissionsError::file_error("sync temp file", tmp_path.display().to_string(), e.to_string())
    })?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        EmissionsError::file_error("rename to final", path.display().to_string(), e.to_string())
    })?;

    Ok(())
}

/// Load and validate a factor file.
///
/// # Returns
///
/// * `Ok(FactorFile)` - every factor passed validation
/// * `Err(EmissionsError::VersionMismatch)` - incompatible schema version
/// * `Err(EmissionsError::InvalidFactor)` - a factor failed validation
/// * `Err(EmissionsError::SerializationError)` - invalid JSON
/// * `Err(EmissionsError::FileError)` - I/O error
pub fn load_factor_file(path: &Path) -> EmissionsResult<FactorFile> {
    let mut file = File::open(path)
        .map_err(|e| EmissionsError::file_error("open", path.display().to_string(), e.to_string()))?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| EmissionsError::file_error("read", path.display().to_string(), e.to_string()))?;

    FactorFile::from_json_str(&contents).map_err(|e| match e {
        EmissionsError::SerializationError { reason } => {
            EmissionsError::serialization(format!("Invalid JSON in {}: {}", path.display(), reason))
        }
        other => other,
    })
}

/// Load a factor file straight into a registry. Returns the number of
/// factors registered.
pub fn import_into(registry: &dyn FactorRegistry, path: &Path) -> EmissionsResult<usize> {
    let file = load_factor_file(path)?;
    let count = file.factors.len();
    for factor in file.factors {
        registry.register_factor(factor)?;
    }
    tracing::info!(path = %path.display(), count, "imported emission factors");
    Ok(count)
}

/// Check a file version against [`SCHEMA_VERSION`].
pub fn validate_version(file_version: &str) -> EmissionsResult<()> {
    let parse = |v: &str| -> Vec<u32> { v.split('.').filter_map(|p| p.parse().ok()).collect() };
    let file_parts = parse(file_version);
    let current_parts = parse(SCHEMA_VERSION);

    let mismatch = || EmissionsError::VersionMismatch {
        file_version: file_version.to_string(),
        expected_version: SCHEMA_VERSION.to_string(),
    };

    match (file_parts.as_slice(), current_parts.as_slice()) {
        ([], _) | (_, []) => Err(mismatch()),
        ([file_major, ..], [current_major, ..]) if file_major != current_major => Err(mismatch()),
        ([0, file_minor, ..], [0, current_minor, ..]) if file_minor > current_minor => Err(mismatch()),
        _ => Ok(()),
    }
}
