use std::sync::Arc;
use tabular_core::*;

use test_helpers::*;

#[test]
fn test_save_as_table_then_read_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let pandas = session.create_dataset(raw_pandas(6, 2)).unwrap();

    session.write(&pandas).save_as_table("pandas").unwrap();

    let back = session.table("pandas").unwrap();
    assert_eq!(back.schema(), pandas.schema());
    assert_same_items(&raw_pandas(6, 2), &records::<RawPanda>(&back));

    let same = session.read().table("PANDAS").unwrap();
    assert_eq!(same.count().unwrap(), 6);
    assert!(dir.path().join("warehouse").join("pandas").join("_table.json").is_file());
}

#[test]
fn test_tables_survive_a_new_session() {
    let dir = tempfile::tempdir().unwrap();
    {
        let session = test_session(dir.path());
        let pandas = session.create_dataset(raw_pandas(4, 2)).unwrap();
        session
            .write(&pandas)
            .partition_by(["zip"])
            .save_as_table("zoo_pandas")
            .unwrap();
    }

    let session = test_session(dir.path());
    assert_eq!(session.catalog().list_tables(), vec!["zoo_pandas"]);
    let entry = session.catalog().table("zoo_pandas").unwrap();
    assert_eq!(entry.partition_columns, vec!["zip"]);

    let back = session.table("zoo_pandas").unwrap();
    assert_same_items(&raw_pandas(4, 2), &records::<RawPanda>(&back));
}

#[test]
fn test_table_save_modes() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let pandas = session.create_dataset(raw_pandas(3, 1)).unwrap();

    session.write(&pandas).save_as_table("pandas").unwrap();
    let err = session.write(&pandas).save_as_table("pandas").unwrap_err();
    assert!(matches!(err, TabularError::TableAlreadyExists(_)));

    session.write(&pandas).mode(SaveMode::Append).save_as_table("pandas").unwrap();
    assert_eq!(session.table("pandas").unwrap().count().unwrap(), 6);

    session.write(&pandas).mode(SaveMode::Ignore).save_as_table("pandas").unwrap();
    assert_eq!(session.table("pandas").unwrap().count().unwrap(), 6);

    session.write(&pandas).mode(SaveMode::Overwrite).save_as_table("pandas").unwrap();
    assert_eq!(session.table("pandas").unwrap().count().unwrap(), 3);
}

#[test]
fn test_append_with_different_schema_fails() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let pandas = session.create_dataset(raw_pandas(3, 1)).unwrap();
    session.write(&pandas).save_as_table("pandas").unwrap();

    let narrower = pandas.select(&["id", "zip"]).unwrap();
    let err = session
        .write(&narrower)
        .mode(SaveMode::Append)
        .save_as_table("pandas")
        .unwrap_err();
    assert!(matches!(err, TabularError::Schema(_)));
    assert_eq!(session.table("pandas").unwrap().count().unwrap(), 3);
}

#[test]
fn test_unknown_and_invalid_table_names() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());

    assert!(matches!(
        session.table("missing").unwrap_err(),
        TabularError::TableNotFound(_)
    ));

    let pandas = session.create_dataset(raw_pandas(1, 1)).unwrap();
    let err = session.write(&pandas).save_as_table("../escape").unwrap_err();
    assert!(matches!(err, TabularError::InvalidArgument(_)));
    assert!(!dir.path().join("escape").exists());
}

#[test]
fn test_drop_table() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let pandas = session.create_dataset(raw_pandas(2, 1)).unwrap();
    session.write(&pandas).save_as_table("pandas").unwrap();

    assert!(session.catalog().drop_table("pandas").unwrap());
    assert!(!session.catalog().table_exists("pandas"));
    assert!(!dir.path().join("warehouse").join("pandas").exists());
    assert!(!session.catalog().drop_table("pandas").unwrap());
}

#[test]
fn test_sessions_can_share_a_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(Catalog::open(dir.path().join("shared")).unwrap());
    let writer = Session::builder()
        .config(SessionConfig::default())
        .catalog(catalog.clone())
        .build()
        .unwrap();
    let reader = Session::builder()
        .config(SessionConfig::default())
        .catalog(catalog)
        .build()
        .unwrap();

    let pandas = writer.create_dataset(raw_pandas(2, 1)).unwrap();
    writer.write(&pandas).save_as_table("pandas").unwrap();
    assert_eq!(reader.table("pandas").unwrap().count().unwrap(), 2);
    assert_eq!(
        reader.get_conf("warehouseDir").unwrap(),
        dir.path().join("shared").display().to_string()
    );
}

#[test]
fn test_table_entry_serializes_camel_case() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let pandas = session.create_dataset(raw_pandas(2, 1)).unwrap();
    session
        .write(&pandas)
        .partition_by(["zip"])
        .save_as_table("pandas")
        .unwrap();

    let raw = std::fs::read_to_string(
        dir.path().join("warehouse").join("pandas").join("_table.json"),
    )
    .unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["name"], "pandas");
    assert_eq!(json["partitionColumns"], serde_json::json!(["zip"]));
    assert!(json["createdAt"].is_string());

    let entry: TableEntry = serde_json::from_str(&raw).unwrap();
    assert_eq!(entry.schema, **pandas.schema());
}

#[test]
fn test_append_to_unregistered_location_keeps_existing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let location = dir.path().join("warehouse").join("pandas");
    let first = session.create_dataset(raw_pandas(2, 1)).unwrap();
    session.write(&first).parquet(&location).unwrap();
    assert!(!session.catalog().table_exists("pandas"));

    let second = session.create_dataset(raw_pandas(1, 1)).unwrap();
    session
        .write(&second)
        .mode(SaveMode::Append)
        .save_as_table("pandas")
        .unwrap();

    assert_eq!(session.read().parquet(&location).unwrap().count().unwrap(), 3);
    assert_eq!(session.table("pandas").unwrap().count().unwrap(), 3);
    assert!(location.join("_table.json").is_file());

    let reopened = test_session(dir.path());
    assert_eq!(reopened.catalog().list_tables(), vec!["pandas"]);
}

#[test]
fn test_append_to_unregistered_location_checks_partitioning() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let location = dir.path().join("warehouse").join("pandas");
    let pandas = session.create_dataset(raw_pandas(4, 2)).unwrap();
    session.write(&pandas).partition_by(["zip"]).parquet(&location).unwrap();

    let err = session
        .write(&pandas)
        .mode(SaveMode::Append)
        .save_as_table("pandas")
        .unwrap_err();
    assert!(matches!(err, TabularError::InvalidOption { ref key, .. } if key == "partitionBy"));
    assert_eq!(session.read().parquet(&location).unwrap().count().unwrap(), 4);
    assert!(!session.catalog().table_exists("pandas"));
}

#[test]
fn test_error_if_exists_on_unregistered_location() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let location = dir.path().join("warehouse").join("pandas");
    let pandas = session.create_dataset(raw_pandas(2, 1)).unwrap();
    session.write(&pandas).parquet(&location).unwrap();

    let err = session.write(&pandas).save_as_table("pandas").unwrap_err();
    assert!(matches!(err, TabularError::TableAlreadyExists(_)));
    assert_eq!(session.read().parquet(&location).unwrap().count().unwrap(), 2);
    assert!(!location.join("_table.json").exists());
}

#[test]
fn test_table_entry_is_committed_with_data() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let pandas = session.create_dataset(raw_pandas(3, 1)).unwrap();
    session.write(&pandas).save_as_table("pandas").unwrap();
    session.write(&pandas).mode(SaveMode::Overwrite).save_as_table("pandas").unwrap();
    session.write(&pandas).mode(SaveMode::Append).save_as_table("pandas").unwrap();

    let warehouse = dir.path().join("warehouse");
    let hidden: Vec<String> = std::fs::read_dir(&warehouse)
        .unwrap()
        .chain(std::fs::read_dir(warehouse.join("pandas")).unwrap())
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with('.'))
        .collect();
    assert!(hidden.is_empty(), "leftover files: {:?}", hidden);
    assert_eq!(session.table("pandas").unwrap().count().unwrap(), 6);
}
