//! Basic pipeline tests

use super::{HEADER, config, data_dir, store, write_source};
use crate::constants::tables;
use crate::processor::EmissionsPipeline;
use tempfile::TempDir;

fn two_row_source() -> String {
    format!(
        "{}\n{}\n{}\n",
        HEADER,
        "Diesel Combustion,Energy,Stationary,litre,2.68787,2.6,0.0003,0.0001,Scope 1,No,2021,UK,AR5",
        "Petrol Combustion,Energy,Stationary,litre,2.31,2.3,0.0004,0.0001,Scope 1,No,2021,UK,AR5"
    )
}

#[tokio::test]
async fn test_basic_pipeline() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = data_dir(&temp_dir);
    write_source(&data_dir, "S2", "File 2-1.csv", &two_row_source());

    let pipeline = EmissionsPipeline::new(config(&data_dir)).unwrap();
    let mut store = store();
    let report = pipeline.run(&mut store).await.unwrap();

    assert_eq!(report.files_read, 1);
    assert_eq!(report.rows_read, 2);
    assert_eq!(report.rows_loaded, 2);
    assert_eq!(report.facts_inserted, 2);
    assert_eq!(report.rows_rejected(), 0);
    assert!(!report.dry_run);

    assert_eq!(store.count_rows(tables::EMISSION_FACTORS).unwrap(), 2);
    assert_eq!(store.count_rows(tables::ACTIVITIES).unwrap(), 2);
    assert_eq!(store.count_rows(tables::UNITS).unwrap(), 1);
    assert_eq!(store.count_rows(tables::REGIONS).unwrap(), 1);
    assert_eq!(store.count_rows(tables::SOURCES).unwrap(), 1);
    assert_eq!(store.count_rows(tables::STATUS).unwrap(), 3);
}

#[tokio::test]
async fn test_second_run_adds_no_dimension_rows() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = data_dir(&temp_dir);
    write_source(&data_dir, "S2", "File 2-1.csv", &two_row_source());

    let pipeline = EmissionsPipeline::new(config(&data_dir)).unwrap();
    let mut store = store();

    let first = pipeline.run(&mut store).await.unwrap();
    let activities = store.count_rows(tables::ACTIVITIES).unwrap();
    let second = pipeline.run(&mut store).await.unwrap();

    assert!(first.dimensions.total_inserted() > 0);
    assert_eq!(second.dimensions.total_inserted(), 0);
    assert_eq!(first.dimensions.activities.total, second.dimensions.activities.total);
    assert_eq!(store.count_rows(tables::ACTIVITIES).unwrap(), activities);
    assert_eq!(store.count_rows(tables::STATUS).unwrap(), 3);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = data_dir(&temp_dir);
    write_source(&data_dir, "S2", "File 2-1.csv", &two_row_source());

    let pipeline = EmissionsPipeline::new(config(&data_dir).with_dry_run()).unwrap();
    let mut store = store();
    let report = pipeline.run(&mut store).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.rows_loaded, 2);
    assert_eq!(report.facts_inserted, 0);
    assert_eq!(store.count_rows(tables::ACTIVITIES).unwrap(), 0);
    assert_eq!(store.count_rows(tables::EMISSION_FACTORS).unwrap(), 0);
}

#[tokio::test]
async fn test_explicit_sources_skip_discovery() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = data_dir(&temp_dir);
    let chosen = write_source(&data_dir, "S2", "File 2-1.csv", &two_row_source());
    write_source(&data_dir, "S3", "File 3-1.csv", &two_row_source());

    let pipeline =
        EmissionsPipeline::new(config(&data_dir).with_source("S2", chosen)).unwrap();
    let batch = pipeline.prepare().await.unwrap();

    assert_eq!(batch.files_read, 1);
    assert!(batch.records.iter().all(|record| record.source == "S2"));
}

#[tokio::test]
async fn test_empty_data_directory_loads_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = data_dir(&temp_dir);

    let pipeline = EmissionsPipeline::new(config(&data_dir)).unwrap();
    let mut store = store();
    let report = pipeline.run(&mut store).await.unwrap();

    assert_eq!(report.files_read, 0);
    assert_eq!(report.facts_inserted, 0);
    assert_eq!(store.count_rows(tables::STATUS).unwrap(), 0);
}

#[tokio::test]
async fn test_records_keep_source_order() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = data_dir(&temp_dir);
    write_source(&data_dir, "S2", "File 2-1.csv", &two_row_source());
    write_source(
        &data_dir,
        "S3",
        "File 3-1.csv",
        &format!("{}\nGrid Electricity,Energy,Grid,kWh,0.2,,,,Scope 2,No,2022,UK,AR5\n", HEADER),
    );

    let pipeline = EmissionsPipeline::new(config(&data_dir).with_max_concurrent_reads(2)).unwrap();
    let batch = pipeline.prepare().await.unwrap();

    let sources: Vec<&str> = batch.records.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(sources, vec!["S2", "S2", "S3"]);
}
