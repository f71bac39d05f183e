//! Tests combining several sources with different layouts

use super::{Cell, HEADER, config, data_dir, store, write_source, write_workbook};
use crate::constants::tables;
use crate::models::FieldValue;
use crate::processor::{EmissionsPipeline, facts};
use crate::store::{SqlValue, StoreGateway};
use tempfile::TempDir;

#[tokio::test]
async fn test_alias_and_canonical_headers_fill_kgco2e() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = data_dir(&temp_dir);
    write_source(
        &data_dir,
        "S2",
        "File 2-1.csv",
        "Activity Name,Unit,kgco2e\nDiesel,litre,2.5\n",
    );
    write_source(
        &data_dir,
        "S3",
        "File 3-1.csv",
        "Activity Name,Unit,Emission (kgCO2e)\nPetrol,litre,1.5\n",
    );

    let pipeline = EmissionsPipeline::new(config(&data_dir)).unwrap();
    let mut store = store();
    pipeline.run(&mut store).await.unwrap();

    let stored = facts::read_back(&mut store).unwrap();
    let values: Vec<_> = stored.iter().map(|fact| fact.kgco2e.clone()).collect();
    assert_eq!(
        values,
        vec![FieldValue::Present(2.5), FieldValue::Present(1.5)]
    );
}

#[tokio::test]
async fn test_combined_sector_category_is_split() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = data_dir(&temp_dir);
    write_source(
        &data_dir,
        "S1",
        "File 1-1.csv",
        "Activity Name,Sector-Category,Unit,kgco2e\nHGV Diesel,Transport/Freight,km,0.9\n",
    );

    let pipeline = EmissionsPipeline::new(config(&data_dir)).unwrap();
    let mut store = store();
    pipeline.run(&mut store).await.unwrap();

    let activities = store
        .query("SELECT activity_name, sector, category FROM activities")
        .unwrap();
    assert_eq!(
        activities,
        vec![vec![
            SqlValue::from("HGV Diesel"),
            SqlValue::from("transport"),
            SqlValue::from("freight"),
        ]]
    );
}

#[tokio::test]
async fn test_workbook_source_is_split_and_loaded() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = data_dir(&temp_dir);
    write_workbook(
        &data_dir.join("S1").join("File 1-1.xlsx"),
        &["Activity Name", "Sector-Category", "Unit", "kgco2e", "Year Valid From"],
        &[
            vec![
                Cell::Text("HGV Diesel"),
                Cell::Text("Transport/Freight"),
                Cell::Text("km"),
                Cell::Number(12.1234567),
                Cell::Number(2021.0),
            ],
            vec![
                Cell::Text("Van"),
                Cell::Text("Transport/Freight"),
                Cell::Text("KM"),
                Cell::Empty,
                Cell::Number(2022.0),
            ],
        ],
    );

    let pipeline = EmissionsPipeline::new(config(&data_dir)).unwrap();
    let mut store = store();
    let report = pipeline.run(&mut store).await.unwrap();

    assert_eq!(report.files_read, 1);
    assert_eq!(report.facts_inserted, 2);
    assert_eq!(report.rows_rejected(), 0);
    assert_eq!(store.count_rows(tables::UNITS).unwrap(), 1);

    let activities = store
        .query("SELECT activity_name, sector, category FROM activities ORDER BY activity_name")
        .unwrap();
    assert_eq!(
        activities[0],
        vec![
            SqlValue::from("HGV Diesel"),
            SqlValue::from("transport"),
            SqlValue::from("freight"),
        ]
    );

    let sources = store.query("SELECT source_name, file_type FROM sources").unwrap();
    assert_eq!(sources, vec![vec![SqlValue::from("S1"), SqlValue::from("xlsx")]]);

    let stored = facts::read_back(&mut store).unwrap();
    assert_eq!(stored[0].kgco2e, FieldValue::Present(12.12346));
    assert_eq!(stored[0].validity_year, FieldValue::Present(2021));
    assert_eq!(stored[1].kgco2e, FieldValue::Null);
    assert_eq!(stored[1].validity_year, FieldValue::Present(2022));
}

#[tokio::test]
async fn test_same_activity_from_two_files_shares_one_row() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = data_dir(&temp_dir);
    let row = "Diesel Combustion,Energy,Stationary,litre,2.68,,,,Scope 1,No,2021,UK,AR5";
    write_source(&data_dir, "S2", "File 2-1.csv", &format!("{}\n{}\n", HEADER, row));
    write_source(&data_dir, "S2", "File 2-2.csv", &format!("{}\n{}\n", HEADER, row));

    let pipeline = EmissionsPipeline::new(config(&data_dir)).unwrap();
    let mut store = store();
    let report = pipeline.run(&mut store).await.unwrap();

    assert_eq!(report.facts_inserted, 2);
    assert_eq!(store.count_rows(tables::ACTIVITIES).unwrap(), 1);

    let stored = facts::read_back(&mut store).unwrap();
    assert_eq!(stored[0].activity_id, stored[1].activity_id);
}

#[tokio::test]
async fn test_case_and_trailing_space_variants_share_dimension_ids() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = data_dir(&temp_dir);
    write_source(
        &data_dir,
        "S2",
        "File 2-1.csv",
        &format!(
            "{}\n{}\n{}\n",
            HEADER,
            "Diesel,Transport,Road,KG ,1.0,,,,Scope 1,No,2021,UK,AR5",
            "Diesel,transport  ,ROAD,kg,2.0,,,,Scope 1,No,2021,UK,AR5"
        ),
    );

    let pipeline = EmissionsPipeline::new(config(&data_dir)).unwrap();
    let mut store = store();
    pipeline.run(&mut store).await.unwrap();

    assert_eq!(store.count_rows(tables::UNITS).unwrap(), 1);
    assert_eq!(store.count_rows(tables::ACTIVITIES).unwrap(), 1);

    let stored = facts::read_back(&mut store).unwrap();
    assert_eq!(stored[0].unit_id, stored[1].unit_id);
    assert_eq!(stored[0].activity_id, stored[1].activity_id);
}

#[tokio::test]
async fn test_unknown_and_not_supplied_survive_read_back() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = data_dir(&temp_dir);
    write_source(
        &data_dir,
        "S2",
        "File 2-1.csv",
        &format!(
            "{}\n{}\n",
            HEADER,
            "Diesel,Energy,Stationary,litre,12.1234567,not-supplied,unknown,Not_Supplied,Scope 1,Unknown,2021,UK,AR5"
        ),
    );

    let pipeline = EmissionsPipeline::new(config(&data_dir)).unwrap();
    let mut store = store();
    pipeline.run(&mut store).await.unwrap();

    let stored = facts::read_back(&mut store).unwrap();
    let fact = &stored[0];
    assert_eq!(fact.kgco2e, FieldValue::Present(12.12346));
    assert_eq!(fact.kgco2, FieldValue::NotApplicable);
    assert_eq!(fact.kgch4, FieldValue::Null);
    assert_eq!(fact.kgn2o, FieldValue::NotApplicable);
    assert_eq!(fact.lca, FieldValue::Null);
    assert_eq!(fact.validity_year, FieldValue::Present(2021));
}

#[tokio::test]
async fn test_absent_region_references_reserved_member() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = data_dir(&temp_dir);
    write_source(
        &data_dir,
        "S2",
        "File 2-1.csv",
        &format!(
            "{}\n{}\n{}\n",
            HEADER,
            "Diesel,Energy,Stationary,litre,1.0,,,,Scope 1,No,2021,unknown,AR5",
            "Petrol,Energy,Stationary,litre,1.0,,,,Scope 1,No,2021,not-supplied,AR5"
        ),
    );

    let pipeline = EmissionsPipeline::new(config(&data_dir)).unwrap();
    let mut store = store();
    pipeline.run(&mut store).await.unwrap();

    let regions = store
        .query("SELECT name FROM regions ORDER BY name")
        .unwrap();
    assert_eq!(
        regions,
        vec![
            vec![SqlValue::from("<not_applicable>")],
            vec![SqlValue::from("<unknown>")],
        ]
    );
}

#[tokio::test]
async fn test_every_fact_references_existing_dimensions() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = data_dir(&temp_dir);
    write_source(
        &data_dir,
        "S1",
        "File 1-1.csv",
        "Activity Name,Sector-Category,Unit,kgco2e\nHGV Diesel,Transport/Freight,km,0.9\nVan,Transport/Freight,km,0.3\n",
    );
    write_source(
        &data_dir,
        "S3",
        "File 3-1.csv",
        "Activity Name,Unit,Emission (kgCO2e),Validity Region\nPetrol,litre,1.5,FR\n",
    );

    let pipeline = EmissionsPipeline::new(config(&data_dir)).unwrap();
    let mut store = store();
    let report = pipeline.run(&mut store).await.unwrap();

    let joined = store
        .query(
            "SELECT COUNT(*) FROM emission_factors f \
             JOIN activities a ON a.activity_id = f.activity_id \
             JOIN units u ON u.unit_id = f.unit_id \
             JOIN regions r ON r.region_id = f.region_id \
             JOIN sources s ON s.source_id = f.source_id \
             JOIN status st ON st.status_id = f.status_id \
             WHERE st.name = 'pending_review'",
        )
        .unwrap();
    assert_eq!(joined[0][0], SqlValue::Integer(report.facts_inserted as i64));
    assert_eq!(report.facts_inserted, 3);
}
