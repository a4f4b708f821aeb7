use tabular_core::*;

use test_helpers::*;

typed_record! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct Counter {
        pub name: String,
        pub hits: u64,
    }
}

typed_record! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct Sighting {
        pub panda: Option<Panda>,
        pub note: Option<String>,
        pub coords: [f64; 2],
        pub photo: bytes::Bytes,
    }
}

#[test]
fn test_inferred_nested_schema() {
    let schema = infer_schema::<PandaPlace>().unwrap();
    assert_eq!(schema.field_names(), vec!["name", "pandas"]);

    let pandas = schema.field_with_name("pandas").unwrap();
    assert!(!pandas.is_nullable());
    match pandas.data_type() {
        DataType::Array {
            element,
            contains_null,
        } => {
            assert!(!contains_null);
            let DataType::Struct(panda) = element.as_ref() else {
                panic!("expected struct elements, got {}", element);
            };
            assert_eq!(panda.field_names(), vec!["id", "zip", "happy", "attributes"]);
            assert_eq!(
                panda.field_with_name("attributes").unwrap().data_type(),
                &DataType::array_non_null(DataType::Float)
            );
        }
        other => panic!("expected an array, got {}", other),
    }
}

#[test]
fn test_optional_fields_are_nullable() {
    let schema = infer_schema::<Sighting>().unwrap();
    assert!(schema.field_with_name("panda").unwrap().is_nullable());
    assert!(schema.field_with_name("note").unwrap().is_nullable());
    assert_eq!(
        schema.field_with_name("coords").unwrap().data_type(),
        &DataType::array_non_null(DataType::Double)
    );
    assert_eq!(schema.field_with_name("photo").unwrap().data_type(), &DataType::Binary);

    let sighting = Sighting {
        panda: None,
        note: Some("by the bamboo".to_string()),
        coords: [37.7, -122.4],
        photo: bytes::Bytes::from_static(&[0, 1, 2]),
    };
    let row = encode(&sighting, &schema).unwrap();
    assert!(row.is_null_at(0));
    assert_eq!(decode::<Sighting>(row).unwrap(), sighting);
}

#[test]
fn test_unsupported_field_type() {
    let err = infer_schema::<Counter>().unwrap_err();
    match err {
        TabularError::UnsupportedFieldType { path, type_name } => {
            assert_eq!(path, "hits");
            assert_eq!(type_name, "u64");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(matches!(
        Dataset::from_records(Vec::<Counter>::new(), SchemaMode::Inferred),
        Err(TabularError::UnsupportedFieldType { .. })
    ));
}

#[test]
fn test_equality_is_structural_and_ordered() {
    let a = SchemaBuilder::new()
        .field("id", DataType::Long, false)
        .field("zip", DataType::String, true)
        .build()
        .unwrap();
    let same = SchemaBuilder::new()
        .field("id", DataType::Long, false)
        .field("zip", DataType::String, true)
        .build()
        .unwrap();
    let reordered = SchemaBuilder::new()
        .field("zip", DataType::String, true)
        .field("id", DataType::Long, false)
        .build()
        .unwrap();
    let nullable = SchemaBuilder::new()
        .field("id", DataType::Long, true)
        .field("zip", DataType::String, true)
        .build()
        .unwrap();

    assert_eq!(a, same);
    assert_eq!(same, a);
    assert_ne!(a, reordered);
    assert_ne!(a, nullable);
}

#[test]
fn test_duplicate_names_rejected() {
    let err = SchemaBuilder::new()
        .field("id", DataType::Long, false)
        .field("id", DataType::String, true)
        .build()
        .unwrap_err();
    assert!(matches!(err, TabularError::Schema(_)));

    let fields = vec![
        Field::new("x", DataType::Integer, true),
        Field::new("x", DataType::Integer, true),
    ];
    assert!(Schema::new(fields).is_err());
}

#[test]
fn test_merge_appends_new_fields_as_nullable() {
    let ab = SchemaBuilder::new()
        .field("a", DataType::Long, false)
        .field("b", DataType::String, false)
        .build()
        .unwrap();
    let ac = SchemaBuilder::new()
        .field("a", DataType::Long, false)
        .field("c", DataType::Double, false)
        .build()
        .unwrap();

    let merged = ab.merge(&ac).unwrap();
    assert_eq!(merged.field_names(), vec!["a", "b", "c"]);
    assert!(!merged.field_with_name("a").unwrap().is_nullable());
    assert!(merged.field_with_name("b").unwrap().is_nullable());
    assert!(merged.field_with_name("c").unwrap().is_nullable());

    let clash = SchemaBuilder::new()
        .field("a", DataType::String, false)
        .build()
        .unwrap();
    assert!(matches!(ab.merge(&clash), Err(TabularError::Schema(_))));
}

#[test]
fn test_merge_nested_structs() {
    let left = SchemaBuilder::new()
        .field(
            "loc",
            DataType::Struct(
                SchemaBuilder::new()
                    .field("zip", DataType::String, true)
                    .build()
                    .unwrap(),
            ),
            true,
        )
        .build()
        .unwrap();
    let right = SchemaBuilder::new()
        .field(
            "loc",
            DataType::Struct(
                SchemaBuilder::new()
                    .field("city", DataType::String, true)
                    .build()
                    .unwrap(),
            ),
            true,
        )
        .build()
        .unwrap();

    let merged = left.merge(&right).unwrap();
    let DataType::Struct(loc) = merged.field(0).unwrap().data_type() else {
        panic!("expected a struct");
    };
    assert_eq!(loc.field_names(), vec!["zip", "city"]);
}

#[test]
fn test_binary_as_string_rewrites_nested_binary() {
    let schema = SchemaBuilder::new()
        .field("raw", DataType::Binary, true)
        .field("chunks", DataType::array(DataType::Binary), true)
        .build()
        .unwrap();
    let rewritten = schema.binary_as_string();
    assert_eq!(rewritten.field(0).unwrap().data_type(), &DataType::String);
    assert_eq!(
        rewritten.field(1).unwrap().data_type(),
        &DataType::array(DataType::String)
    );
}

#[test]
fn test_display() {
    let schema = infer_schema::<RawPanda>().unwrap();
    assert_eq!(
        schema.to_string(),
        "struct<id:long,zip:string,pt:string,happy:boolean,attributes:array<double>>"
    );
}

#[test]
fn test_serde_roundtrip_keeps_field_order() {
    let schema = panda_place_schema();
    let json = serde_json::to_string(&schema).unwrap();
    let back: Schema = serde_json::from_str(&json).unwrap();
    assert_eq!(back, schema);
    assert_eq!(back.field_names(), vec!["name", "pandas"]);

    let duplicate = r#"[{"name":"a","data_type":"long","nullable":true},{"name":"a","data_type":"long","nullable":true}]"#;
    assert!(serde_json::from_str::<Schema>(duplicate).is_err());
}
