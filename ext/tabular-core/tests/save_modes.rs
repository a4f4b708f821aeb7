use tabular_core::*;

use test_helpers::*;

fn ids(dataset: &Dataset) -> Vec<i64> {
    let mut ids: Vec<i64> = records::<RawPanda>(dataset).into_iter().map(|p| p.id).collect();
    ids.sort();
    ids
}

#[test]
fn test_default_mode_is_error_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let out = dir.path().join("pandas");
    let pandas = session.create_dataset(raw_pandas(3, 1)).unwrap();

    session.write(&pandas).parquet(&out).unwrap();
    let err = session.write(&pandas).parquet(&out).unwrap_err();
    assert!(matches!(err, TabularError::TableAlreadyExists(_)));
    assert_eq!(ids(&session.read().parquet(&out).unwrap()), vec![0, 1, 2]);
}

#[test]
fn test_overwrite_replaces_contents() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let out = dir.path().join("pandas");

    let first = session.create_dataset(raw_pandas(5, 2)).unwrap();
    session.write(&first).partition_by(["zip"]).parquet(&out).unwrap();

    let second = session.create_dataset(raw_pandas(2, 1)).unwrap();
    session.write(&second).mode(SaveMode::Overwrite).parquet(&out).unwrap();

    assert!(partition_dirs(&out, "zip").is_empty());
    assert_eq!(ids(&session.read().parquet(&out).unwrap()), vec![0, 1]);
}

#[test]
fn test_append_creates_missing_target() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let out = dir.path().join("fresh");
    let pandas = session.create_dataset(raw_pandas(2, 1)).unwrap();

    session.write(&pandas).mode(SaveMode::Append).json(&out).unwrap();
    assert_eq!(ids(&session.read().json(&out).unwrap()), vec![0, 1]);
}

#[test]
fn test_ignore_is_a_no_op_on_existing_target() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let out = dir.path().join("pandas");

    let first = session.create_dataset(raw_pandas(2, 1)).unwrap();
    session.write(&first).parquet(&out).unwrap();

    let second = session.create_dataset(raw_pandas(7, 1)).unwrap();
    session.write(&second).mode(SaveMode::Ignore).parquet(&out).unwrap();
    assert_eq!(ids(&session.read().parquet(&out).unwrap()), vec![0, 1]);
}

#[test]
fn test_ignore_writes_missing_target() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let out = dir.path().join("pandas");

    let pandas = session.create_dataset(raw_pandas(2, 1)).unwrap();
    session.write(&pandas).mode(SaveMode::Ignore).parquet(&out).unwrap();
    assert_eq!(ids(&session.read().parquet(&out).unwrap()), vec![0, 1]);
}

#[test]
fn test_mode_from_option_and_parse() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let out = dir.path().join("pandas");
    let pandas = session.create_dataset(raw_pandas(2, 1)).unwrap();

    session.write(&pandas).parquet(&out).unwrap();
    session.write(&pandas).option("mode", "append").parquet(&out).unwrap();
    assert_eq!(ids(&session.read().parquet(&out).unwrap()), vec![0, 0, 1, 1]);

    assert_eq!("Overwrite".parse::<SaveMode>().unwrap(), SaveMode::Overwrite);
    assert_eq!("errorifexists".parse::<SaveMode>().unwrap(), SaveMode::ErrorIfExists);
    assert!(matches!(
        "sometimes".parse::<SaveMode>(),
        Err(TabularError::InvalidOption { .. })
    ));
}

#[test]
fn test_builder_mode_wins_over_option() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let out = dir.path().join("pandas");
    let pandas = session.create_dataset(raw_pandas(2, 1)).unwrap();

    session.write(&pandas).parquet(&out).unwrap();
    session
        .write(&pandas)
        .option("mode", "append")
        .mode(SaveMode::Overwrite)
        .parquet(&out)
        .unwrap();
    assert_eq!(ids(&session.read().parquet(&out).unwrap()), vec![0, 1]);
}

#[test]
fn test_no_staging_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let session = test_session(dir.path());
    let out = dir.path().join("pandas");
    let pandas = session.create_dataset(raw_pandas(4, 2)).unwrap();

    session.write(&pandas).parquet(&out).unwrap();
    session.write(&pandas).mode(SaveMode::Overwrite).parquet(&out).unwrap();
    session.write(&pandas).mode(SaveMode::Append).parquet(&out).unwrap();

    let leftovers: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with('.'))
        .collect();
    assert!(leftovers.is_empty(), "leftover work dirs: {:?}", leftovers);
}
