use crate::db::result::QueryResult;

pub const CSV_FILE_NAME: &str = "query_results.csv";
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Serializes a result as UTF-8 CSV with a header row. Nulls become empty
/// fields.
pub fn to_csv(result: &QueryResult) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(&result.columns)?;
    for row in &result.rows {
        writer.write_record(row.iter().map(|value| value.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::executor::{ExecutionMode, QueryExecutor};
    use crate::db::result::CellValue;
    use crate::test_support::create_movies_db;

    #[test]
    fn exported_rows_parse_back_to_the_same_values() {
        let dir = tempfile::tempdir().unwrap();
        let db = create_movies_db(dir.path());
        let result = QueryExecutor::new(ExecutionMode::ReadOnly)
            .execute("SELECT title, year, rating, NULL AS note FROM movies ORDER BY id", &db)
            .unwrap();

        let bytes = to_csv(&result).unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());

        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, result.columns);

        let parsed: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(parsed.len(), result.row_count());

        for (record, row) in parsed.iter().zip(&result.rows) {
            for (field, value) in record.iter().zip(row) {
                match value {
                    CellValue::Null => assert_eq!(field, ""),
                    CellValue::Integer(i) => assert_eq!(field.parse::<i64>().unwrap(), *i),
                    CellValue::Real(r) => assert_eq!(field.parse::<f64>().unwrap(), *r),
                    CellValue::Text(s) => assert_eq!(field, s),
                }
            }
        }
    }

    #[test]
    fn awkward_text_is_quoted() {
        let result = QueryResult {
            columns: vec!["title".to_string()],
            rows: vec![vec![CellValue::Text("Crouching Tiger, \"Hidden\"\nDragon".to_string())]],
        };

        let bytes = to_csv(&result).unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let record = reader.records().next().unwrap().unwrap();

        assert_eq!(&record[0], "Crouching Tiger, \"Hidden\"\nDragon");
    }

    #[test]
    fn empty_result_still_has_a_header() {
        let result = QueryResult {
            columns: vec!["title".to_string(), "rating".to_string()],
            rows: Vec::new(),
        };

        assert_eq!(String::from_utf8(to_csv(&result).unwrap()).unwrap(), "title,rating\n");
    }
}
