//! Batch orchestration.
//!
//! Items run on the engine's worker pool and land in the result at their
//! input index, so totals and ordering never depend on scheduling.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::Engine;
use crate::activity::Activity;
use crate::errors::{EmissionsError, EmissionsResult};
use crate::record::EmissionRecord;

/// Shared flag that stops a batch from starting new items.
///
/// Clones observe the same flag. Items already running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal state of one batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemStatus {
    Succeeded,
    /// The calculator ran and failed
    Failed,
    /// No calculator handles the activity
    Skipped,
    /// Never started
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub activity_id: String,
    pub status: BatchItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<EmissionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EmissionsError>,
}

impl CalculationResult {
    fn succeeded(record: EmissionRecord) -> Self {
        Self {
            activity_id: record.activity_id().to_string(),
            status: BatchItemStatus::Succeeded,
            record: Some(record),
            error: None,
        }
    }

    fn failed(activity_id: &str, error: EmissionsError) -> Self {
        let status = match error {
            EmissionsError::NoCalculatorRegistered { .. } | EmissionsError::UnsupportedActivity { .. } => {
                BatchItemStatus::Skipped
            }
            _ => BatchItemStatus::Failed,
        };
        Self {
            activity_id: activity_id.to_string(),
            status,
            record: None,
            error: Some(error),
        }
    }

    fn cancelled(activity_id: &str) -> Self {
        Self {
            activity_id: activity_id.to_string(),
            status: BatchItemStatus::Cancelled,
            record: None,
            error: Some(EmissionsError::Cancelled {
                activity_id: activity_id.to_string(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BatchItemStatus::Succeeded
    }
}

/// Outcome of a batch run.
///
/// `error_count` covers every item that did not succeed; `skipped_count`
/// and `cancelled_count` break it down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub records: Vec<EmissionRecord>,
    pub results: Vec<CalculationResult>,
    pub total_emissions_kg_co2e: f64,
    pub success_count: usize,
    pub error_count: usize,
    pub skipped_count: usize,
    pub cancelled_count: usize,
    pub processed_at: DateTime<Utc>,
}

impl BatchResult {
    fn from_results(results: Vec<CalculationResult>) -> Self {
        let records: Vec<EmissionRecord> = results.iter().filter_map(|r| r.record.clone()).collect();
        let total_emissions_kg_co2e = records.iter().map(|r| r.emissions_kg_co2e()).sum();
        let count = |status: BatchItemStatus| results.iter().filter(|r| r.status == status).count();
        let success_count = count(BatchItemStatus::Succeeded);

        Self {
            total_emissions_kg_co2e,
            success_count,
            error_count: results.len() - success_count,
            skipped_count: count(BatchItemStatus::Skipped),
            cancelled_count: count(BatchItemStatus::Cancelled),
            records,
            results,
            processed_at: Utc::now(),
        }
    }

    /// Fraction of items that succeeded, 1.0 for an empty batch.
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        }
    }

    /// First non-cancelled failure by input index, else the first cancellation.
    fn first_error(&self) -> Option<&EmissionsError> {
        let failed = self
            .results
            .iter()
            .find(|r| matches!(r.status, BatchItemStatus::Failed | BatchItemStatus::Skipped));
        failed
            .or_else(|| self.results.iter().find(|r| r.status == BatchItemStatus::Cancelled))
            .and_then(|r| r.error.as_ref())
    }
}

impl Engine {
    /// Calculate every activity.
    ///
    /// In lenient mode failures are reported per item and the batch still
    /// succeeds. In strict mode the first failure stops new items from
    /// starting and is returned as the error.
    pub fn calculate_batch<A: Activity>(&self, activities: &[A]) -> EmissionsResult<BatchResult> {
        self.calculate_batch_with_cancel(activities, &CancellationToken::new())
    }

    pub fn calculate_batch_with_cancel<A: Activity>(
        &self,
        activities: &[A],
        token: &CancellationToken,
    ) -> EmissionsResult<BatchResult> {
        if activities.is_empty() {
            return Ok(BatchResult::from_results(Vec::new()));
        }

        let start = Instant::now();
        let abort = AtomicBool::new(false);
        let run = |activity: &A| self.run_item(activity, token, &abort);

        let results: Vec<CalculationResult> = match &self.pool {
            Some(pool) if activities.len() > 1 => {
                tracing::debug!(
                    count = activities.len(),
                    workers = self.config.max_batch_concurrency,
                    "running batch on worker pool"
                );
                pool.install(|| activities.par_iter().map(run).collect())
            }
            _ => activities.iter().map(run).collect(),
        };

        let batch = BatchResult::from_results(results);

        tracing::info!(
            count = activities.len(),
            succeeded = batch.success_count,
            failed = batch.error_count,
            skipped = batch.skipped_count,
            cancelled = batch.cancelled_count,
            total_kg_co2e = batch.total_emissions_kg_co2e,
            duration_ms = start.elapsed().as_millis() as u64,
            "batch complete"
        );

        if self.config.strict_mode {
            if let Some(error) = batch.first_error() {
                return Err(error.clone());
            }
        }

        Ok(batch)
    }

    fn run_item(&self, activity: &dyn Activity, token: &CancellationToken, abort: &AtomicBool) -> CalculationResult {
        if token.is_cancelled() || abort.load(Ordering::SeqCst) {
            return CalculationResult::cancelled(activity.id());
        }

        match self.calculate(activity) {
            Ok(record) => CalculationResult::succeeded(record),
            Err(error) => {
                if self.config.strict_mode {
                    abort.store(true, Ordering::SeqCst);
                }
                CalculationResult::failed(activity.id(), error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityRecord;
    use crate::calculators::{Scope1Config, Scope2Config, Scope3Config};
    use crate::engine::{EngineBuilder, EngineConfig};

    fn engine(config: EngineConfig) -> Engine {
        EngineBuilder::new(config)
            .standard_calculators(Scope1Config::default(), Scope2Config::default(), Scope3Config::default())
            .build()
            .unwrap()
    }

    fn mixed_batch() -> Vec<ActivityRecord> {
        vec![
            ActivityRecord::new("ok-1", "electricity", 1000.0, "kWh").with_location("EU-FRANCE"),
            ActivityRecord::new("bad-unit", "fleet", 5.0, "kWh").with_category("diesel"),
            ActivityRecord::new("skip", "teleporter", 1.0, "jumps"),
            ActivityRecord::new("ok-2", "fleet", 10.0, "L").with_category("diesel"),
        ]
    }

    #[test]
    fn test_empty_batch() {
        let batch = engine(EngineConfig::default()).calculate_batch::<ActivityRecord>(&[]).unwrap();
        assert!(batch.results.is_empty());
        assert_eq!(batch.total_emissions_kg_co2e, 0.0);
        assert_eq!(batch.success_rate(), 1.0);
    }

    #[test]
    fn test_lenient_statuses_in_input_order() {
        let batch = engine(EngineConfig::default()).calculate_batch(&mixed_batch()).unwrap();

        let statuses: Vec<BatchItemStatus> = batch.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                BatchItemStatus::Succeeded,
                BatchItemStatus::Failed,
                BatchItemStatus::Skipped,
                BatchItemStatus::Succeeded,
            ]
        );
        let ids: Vec<&str> = batch.results.iter().map(|r| r.activity_id.as_str()).collect();
        assert_eq!(ids, vec!["ok-1", "bad-unit", "skip", "ok-2"]);

        assert_eq!(batch.success_count, 2);
        assert_eq!(batch.error_count, 2);
        assert_eq!(batch.skipped_count, 1);
        assert_eq!(batch.cancelled_count, 0);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.success_rate(), 0.5);
        assert_eq!(batch.total_emissions_kg_co2e, 1000.0 * 0.052 + 10.0 * 2.68);
    }

    #[test]
    fn test_strict_returns_first_failure() {
        let strict = engine(EngineConfig {
            strict_mode: true,
            enable_parallel_batch: false,
            ..EngineConfig::default()
        });
        let err = strict.calculate_batch(&mixed_batch()).unwrap_err();
        match err {
            EmissionsError::CalculationFailed { activity_id, .. } => assert_eq!(activity_id, "bad-unit"),
            other => panic!("expected CalculationFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());

        let batch = engine(EngineConfig::default())
            .calculate_batch_with_cancel(&mixed_batch(), &token)
            .unwrap();
        assert_eq!(batch.cancelled_count, 4);
        assert_eq!(batch.error_count, 4);
        assert!(batch.records.is_empty());
        assert!(batch
            .results
            .iter()
            .all(|r| r.error.as_ref().map(|e| e.error_code()) == Some("CANCELLED")));
    }

    #[test]
    fn test_single_item_runs_without_pool() {
        let batch = engine(EngineConfig::default())
            .calculate_batch(&mixed_batch()[..1])
            .unwrap();
        assert_eq!(batch.success_count, 1);
        assert_eq!(batch.total_emissions_kg_co2e, 52.0);
    }
}
