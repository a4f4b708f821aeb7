//! Test utilities for tabular-core

#[cfg(test)]
pub mod test {
    use crate::{DataType, Dataset, Row, Schema, SchemaBuilder, Value};

    /// Flat panda schema partitioned by `zipcode` in the write tests
    pub fn raw_panda_schema() -> Schema {
        SchemaBuilder::new()
            .field("id", DataType::Long, false)
            .field("zipcode", DataType::String, true)
            .field("happy", DataType::Boolean, true)
            .field("attributes", DataType::array(DataType::Double), true)
            .build()
            .unwrap()
    }

    /// `count` pandas spread over three zipcodes
    pub fn raw_panda_rows(count: usize) -> Vec<Row> {
        const ZIPS: [&str; 3] = ["94110", "10003", "60614"];
        (0..count)
            .map(|i| {
                Row::new(vec![
                    Value::Long(i as i64),
                    Value::from(ZIPS[i % ZIPS.len()]),
                    Value::Boolean(i % 2 == 0),
                    Value::Array(vec![Value::from(i as f64), Value::from(0.5)]),
                ])
            })
            .collect()
    }

    pub fn raw_pandas(count: usize) -> Dataset {
        Dataset::from_rows(raw_panda_rows(count), raw_panda_schema()).unwrap()
    }

    /// Assert two row collections hold the same rows, ignoring order
    pub fn assert_same_rows(expected: &[Row], actual: &[Row]) {
        let mut expected: Vec<String> = expected.iter().map(|row| format!("{:?}", row)).collect();
        let mut actual: Vec<String> = actual.iter().map(|row| format!("{:?}", row)).collect();
        expected.sort();
        actual.sort();
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_raw_pandas_conform() {
        let ds = raw_pandas(5);
        assert_eq!(ds.count().unwrap(), 5);
        assert_eq!(ds.schema().len(), 4);
    }
}
