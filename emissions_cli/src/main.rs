//! # Emissions CLI
//!
//! Runs a batch of activities through the engine and prints the records,
//! per-scope totals and the full batch result as JSON.
//!
//! ```text
//! emissions_cli [activities.json] [--config engine.toml] [--factors factors.json]...
//!               [--strict] [--sequential] [--json]
//! ```
//!
//! With no activities file a small demo batch is used. Log output goes to
//! stderr and is controlled with `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use emissions_core::record::{sum_by_scope, Scope2Summary, Scope3Summary};
use emissions_core::{
    load_config, ActivityRecord, BatchResult, EmissionsConfig, EmissionsError, EmissionsResult, Scope,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: emissions_cli [activities.json] [--config FILE] [--factors FILE]... [--strict] [--sequential] [--json]";

#[derive(Debug, Default)]
struct Args {
    activities: Option<PathBuf>,
    config: Option<PathBuf>,
    factor_files: Vec<PathBuf>,
    strict: bool,
    sequential: bool,
    json_only: bool,
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut args = Args::default();
    let mut raw = raw.into_iter();
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--config" => args.config = Some(raw.next().ok_or("--config needs a file")?.into()),
            "--factors" => args.factor_files.push(raw.next().ok_or("--factors needs a file")?.into()),
            "--strict" => args.strict = true,
            "--sequential" => args.sequential = true,
            "--json" => args.json_only = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with('-') => return Err(format!("unknown option {}\n{}", flag, USAGE)),
            _ if args.activities.is_none() => args.activities = Some(arg.into()),
            _ => return Err(format!("unexpected argument {}\n{}", arg, USAGE)),
        }
    }
    Ok(args)
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "emissions_core=info,emissions_cli=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    match run(&args) {
        Ok(batch) if batch.error_count == 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error [{}]: {}", e.error_code(), e);
            if let Ok(json) = serde_json::to_string_pretty(&e) {
                eprintln!();
                eprintln!("Error JSON:");
                eprintln!("{}", json);
            }
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args) -> EmissionsResult<BatchResult> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => EmissionsConfig::default(),
    };
    config.registry.factor_files.extend(args.factor_files.iter().cloned());
    if args.strict {
        config.engine.strict_mode = true;
    }
    if args.sequential {
        config.engine.enable_parallel_batch = false;
    }

    let activities = match &args.activities {
        Some(path) => load_activities(path)?,
        None => {
            tracing::info!("no activities file given, running the demo batch");
            demo_activities()
        }
    };

    let engine = config.build_engine()?;
    let batch = engine.calculate_batch(&activities)?;

    if !args.json_only {
        print_report(&batch);
        println!();
        println!("JSON Output:");
    }
    let json = serde_json::to_string_pretty(&batch)?;
    println!("{}", json);

    Ok(batch)
}

fn load_activities(path: &Path) -> EmissionsResult<Vec<ActivityRecord>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| EmissionsError::file_error("read", path.display().to_string(), e.to_string()))?;
    serde_json::from_str(&contents)
        .map_err(|e| EmissionsError::serialization(format!("Invalid activities in {}: {}", path.display(), e)))
}

fn demo_activities() -> Vec<ActivityRecord> {
    vec![
        ActivityRecord::new("demo-fleet", "fleet", 100.0, "L").with_category("diesel"),
        ActivityRecord::new("demo-boiler", "stationary_combustion", 850.0, "m3").with_category("natural_gas"),
        ActivityRecord::new("demo-vans", "fleet", 40.0, "gal").with_category("gasoline"),
        ActivityRecord::new("demo-hq", "electricity", 12.5, "MWh").with_location("US-CALIFORNIA"),
        ActivityRecord::new("demo-paris", "electricity", 4200.0, "kWh").with_location("EU-FRANCE"),
        ActivityRecord::new("demo-flights", "business_travel", 5400.0, "km").with_category("long-haul flight"),
        ActivityRecord::new("demo-saas", "purchases", 18000.0, "USD").with_category("software"),
        ActivityRecord::new("demo-waste", "waste", 2.0, "t").with_category("landfill"),
    ]
}

fn print_report(batch: &BatchResult) {
    println!("Emissions Calculation");
    println!("═══════════════════════════════════════════════════════════════════════");
    println!(
        "  {:<16} {:<6} {:>14} {:<28} {}",
        "Activity", "Scope", "kg CO2e", "Factor", "Quality"
    );
    println!("───────────────────────────────────────────────────────────────────────");

    for result in &batch.results {
        match (&result.record, &result.error) {
            (Some(record), _) => println!(
                "  {:<16} {:<6} {:>14.3} {:<28} {}",
                record.activity_id(),
                record.scope().number(),
                record.emissions_kg_co2e(),
                record.factor_id(),
                record.data_quality()
            ),
            (None, Some(error)) => println!(
                "  {:<16} {:<6} {:>14} [{}] {}",
                result.activity_id,
                "-",
                "-",
                error.error_code(),
                error.root_cause()
            ),
            (None, None) => {}
        }
    }

    println!("═══════════════════════════════════════════════════════════════════════");
    let by_scope = sum_by_scope(&batch.records);
    for scope in Scope::ALL {
        let kg = by_scope.get(&scope).copied().unwrap_or(0.0);
        println!("  {:<24} {:>14.3} kg CO2e", scope.display_name(), kg);
    }

    let scope2 = Scope2Summary::from_records(&batch.records);
    if scope2.record_count > 0 {
        println!(
            "    location-based {:.3} / market-based {:.3} over {:.1} kWh",
            scope2.location_based_kg_co2e, scope2.market_based_kg_co2e, scope2.total_kwh
        );
    }

    let scope3 = Scope3Summary::from_records(&batch.records);
    for (category, kg) in &scope3.by_category {
        println!("    {:>2}. {:<36} {:>14.3}", category.number(), category.display_name(), kg);
    }

    println!("───────────────────────────────────────────────────────────────────────");
    println!(
        "  TOTAL: {:.3} kg CO2e ({:.3} t)   {} ok / {} failed ({} skipped, {} cancelled)",
        batch.total_emissions_kg_co2e,
        batch.total_emissions_kg_co2e / 1000.0,
        batch.success_count,
        batch.error_count,
        batch.skipped_count,
        batch.cancelled_count
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Result<Args, String> {
        parse_args(raw.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["acts.json", "--factors", "a.json", "--factors", "b.json", "--strict"]).unwrap();
        assert_eq!(parsed.activities, Some(PathBuf::from("acts.json")));
        assert_eq!(parsed.factor_files.len(), 2);
        assert!(parsed.strict);
        assert!(!parsed.sequential);

        assert!(args(&["--config"]).is_err());
        assert!(args(&["--bogus"]).is_err());
        assert!(args(&["a.json", "b.json"]).is_err());
    }

    #[test]
    fn test_demo_batch_succeeds() {
        let engine = EmissionsConfig::default().build_engine().unwrap();
        let batch = engine.calculate_batch(&demo_activities()).unwrap();
        assert_eq!(batch.error_count, 0, "{:?}", batch.results);
        assert!(batch.total_emissions_kg_co2e > 0.0);
    }
}
