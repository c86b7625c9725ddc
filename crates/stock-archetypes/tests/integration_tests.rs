//! Integration tests for multi-pass archetype imputation.
//!
//! These tests run the public API end to end over a small survey extract.

use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use stock_archetypes::{
    ARCHETYPE_COLUMN, ArchetypeConfig, ArchetypeError, ArchetypePipeline, PassStage,
    PipelineConfig, SAMPLE_SIZE_COLUMN, build_archetypes, fill_with_archetype,
    filter_by_substrings, flag_known,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_csv(filename: &str) -> DataFrame {
    let path = fixtures_path().join(filename);
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path))
        .expect("Failed to create CSV reader")
        .finish()
        .expect("Failed to read CSV file")
}

fn load_config() -> PipelineConfig {
    PipelineConfig::from_json_file(fixtures_path().join("wall_uvalue_passes.json"))
        .expect("Failed to load pass configuration")
}

fn floats(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .cast(&DataType::Float64)
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .collect()
}

fn strings(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect()
}

fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("value should be filled");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

// ============================================================================
// Full Pipeline Tests
// ============================================================================

#[test]
fn test_pipeline_fills_from_fine_to_coarse() {
    let stock = load_csv("bers_sample.csv");

    let result = ArchetypePipeline::builder()
        .config(load_config())
        .build()
        .unwrap()
        .run(&stock)
        .unwrap();

    let summary = &result.summary;
    assert_eq!(summary.rows, 13);
    assert_eq!(summary.missing_before, 5);
    assert_eq!(summary.passes.len(), 3);

    // Only Dublin/1971-1980/Detached has more than two records
    assert_eq!(summary.passes[0].archetypes_built, 1);
    assert_eq!(summary.passes[0].filled(), 1);
    // Per-period groups across counties fill three more
    assert_eq!(summary.passes[1].archetypes_built, 3);
    assert_eq!(summary.passes[1].filled(), 3);
    // The lone bungalow never forms an archetype
    assert_eq!(summary.passes[2].filled(), 0);
    assert_eq!(summary.remaining_missing, 1);

    let uvalues = floats(&result.data, "wall_uvalue");
    assert_close(uvalues[2], 1.2);
    assert_close(uvalues[5], 1.2);
    assert_close(uvalues[7], 0.375);
    assert_close(uvalues[10], 0.575);
    assert_eq!(uvalues[12], None);

    // Non-target columns are completed by the same archetype
    let fuels = strings(&result.data, "main_sh_boiler_fuel");
    assert_eq!(fuels[3], Some("Heating Oil".to_string()));

    let labels = strings(&result.data, ARCHETYPE_COLUMN);
    assert_eq!(
        labels[2].as_deref(),
        Some("countyname__period_built__dwelling_type")
    );
    for row in [5, 7, 10] {
        assert_eq!(labels[row].as_deref(), Some("period_built__dwelling_type"));
    }
    for row in [0, 1, 3, 4, 6, 8, 9, 11] {
        assert_eq!(labels[row].as_deref(), Some("none"));
    }
    assert_eq!(labels[12], None);
}

#[test]
fn test_pipeline_preserves_rows_and_known_values() {
    let stock = load_csv("bers_sample.csv");

    let result = ArchetypePipeline::builder()
        .config(load_config())
        .build()
        .unwrap()
        .run(&stock)
        .unwrap();

    assert_eq!(result.data.height(), stock.height());
    for name in ["countyname", "period_built", "dwelling_type"] {
        assert_eq!(strings(&result.data, name), strings(&stock, name));
    }

    for name in ["wall_uvalue", "year_of_construction"] {
        let before = floats(&stock, name);
        let after = floats(&result.data, name);
        for (row, (b, a)) in before.iter().zip(&after).enumerate() {
            if b.is_some() {
                assert_eq!(a, b, "{name}[{row}] was overwritten");
            }
        }
    }

    let before = strings(&stock, "main_sh_boiler_fuel");
    let after = strings(&result.data, "main_sh_boiler_fuel");
    for (row, (b, a)) in before.iter().zip(&after).enumerate() {
        if b.is_some() {
            assert_eq!(a, b, "main_sh_boiler_fuel[{row}] was overwritten");
        }
    }
}

#[test]
fn test_pipeline_attaches_sample_sizes() {
    let stock = load_csv("bers_sample.csv");

    let result = ArchetypePipeline::builder()
        .config(load_config())
        .build()
        .unwrap()
        .run(&stock)
        .unwrap();

    let sizes: Vec<Option<u64>> = result
        .data
        .column(SAMPLE_SIZE_COLUMN)
        .unwrap()
        .as_materialized_series()
        .u64()
        .unwrap()
        .into_iter()
        .collect();

    assert_eq!(sizes[2], Some(4));
    assert_eq!(sizes[5], Some(6));
    assert_eq!(sizes[7], Some(3));
    assert_eq!(sizes[12], None);
}

#[test]
fn test_pipeline_is_deterministic() {
    let stock = load_csv("bers_sample.csv");
    let pipeline = ArchetypePipeline::builder()
        .config(load_config())
        .build()
        .unwrap();

    let first = pipeline.run(&stock).unwrap();
    let second = pipeline.run(&stock).unwrap();

    assert!(first.data.equals_missing(&second.data));
}

#[test]
fn test_pipeline_after_geographic_filter() {
    let stock = load_csv("bers_sample.csv");
    let dublin = filter_by_substrings(
        &stock,
        "countyname",
        &["Dublin"],
        &["Dublin", "Cork", "Galway", "Kerry"],
    )
    .unwrap();
    assert_eq!(dublin.height(), 5);

    let result = ArchetypePipeline::builder()
        .config(load_config())
        .build()
        .unwrap()
        .run(&dublin)
        .unwrap();

    assert_eq!(result.summary.missing_before, 1);
    assert_eq!(result.summary.remaining_missing, 0);
    // Complete after the first pass, the rest are skipped
    assert_eq!(result.summary.passes.len(), 1);
}

#[test]
fn test_pipeline_progress_reporting() {
    let stock = load_csv("bers_sample.csv");
    let completed = Arc::new(AtomicUsize::new(0));
    let counter = completed.clone();

    ArchetypePipeline::builder()
        .config(load_config())
        .on_progress(move |update| {
            assert!((0.0..=1.0).contains(&update.progress));
            if update.stage == PassStage::Complete {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build()
        .unwrap()
        .run(&stock)
        .unwrap();

    assert_eq!(completed.load(Ordering::SeqCst), 3);
}

#[test]
fn test_run_summary_serializes() {
    let stock = load_csv("bers_sample.csv");

    let result = ArchetypePipeline::builder()
        .config(load_config())
        .build()
        .unwrap()
        .run(&stock)
        .unwrap();

    let json = serde_json::to_value(&result.summary).unwrap();
    assert_eq!(json["target_column"], "wall_uvalue");
    assert_eq!(json["remaining_missing"], 1);
    assert_eq!(json["passes"].as_array().map(Vec::len), Some(3));
}

// ============================================================================
// Single Pass Tests
// ============================================================================

#[test]
fn test_single_pass_by_hand() {
    let stock = load_csv("bers_sample.csv");
    let pass = ArchetypeConfig::builder("dwelling_type")
        .key_columns(["dwelling_type"])
        .excluded_columns(["countyname", "period_built"])
        .min_sample_size(1)
        .build()
        .unwrap();

    let flagged = flag_known(&stock, "wall_uvalue").unwrap();
    let archetypes = build_archetypes(&stock, &pass).unwrap();
    let filled = fill_with_archetype(&flagged, &archetypes, &pass.key_columns).unwrap();

    // Apartment, Detached house, Semi-detached house; Bungalow is a single record
    assert_eq!(
        strings(&archetypes, "dwelling_type"),
        vec![
            Some("Apartment".to_string()),
            Some("Detached house".to_string()),
            Some("Semi-detached house".to_string()),
        ]
    );
    assert_eq!(filled.height(), stock.height());
    assert_eq!(filled.column("wall_uvalue").unwrap().null_count(), 1);
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn test_config_roundtrip_through_json() {
    let config = load_config();
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(PipelineConfig::from_json_str(&json).unwrap(), config);
}

#[test]
fn test_config_rejects_target_as_key() {
    let json = r#"{
        "target_column": "dwelling_type",
        "passes": [{"archetype_name": "dwelling_type", "key_columns": ["dwelling_type"]}]
    }"#;

    let err = PipelineConfig::from_json_str(json).unwrap_err();
    assert!(matches!(err, ArchetypeError::InvalidConfig(_)));
}

#[test]
fn test_pipeline_unknown_key_column() {
    let stock = load_csv("bers_sample.csv");

    let err = ArchetypePipeline::builder()
        .target_column("wall_uvalue")
        .pass(
            ArchetypeConfig::builder("floor_area")
                .key_columns(["ground_floor_area"])
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
        .run(&stock)
        .unwrap_err();

    assert!(err.is_schema_error());
    assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
}
