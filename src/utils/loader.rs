// src/utils/loader.rs

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use csv::ReaderBuilder;
use serde_json::Value;

use crate::models::RawRecord;

/// Load dynamic-column records from a CSV file. Every cell is kept as a
/// string under its header name; rows that fail to parse are skipped, not
/// fatal.
pub fn load_records_from_csv(file_path: &str) -> io::Result<Vec<RawRecord>> {
    let file = File::open(file_path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    let mut records = Vec::new();

    for result in reader.records() {
        let row = match result {
            Ok(row) => row,
            Err(_) => continue,
        };
        let mut map = RawRecord::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            map.insert(header.to_string(), Value::String(cell.to_string()));
        }
        records.push(map);
    }

    Ok(records)
}

/// Load records from a JSON array of objects. Non-object entries are
/// dropped.
pub fn load_records_from_json(file_path: &str) -> io::Result<Vec<RawRecord>> {
    let mut contents = String::new();
    File::open(file_path)?.read_to_string(&mut contents)?;

    let json: Value = serde_json::from_str(&contents)?;
    let mut records = Vec::new();

    if let Value::Array(array) = json {
        for item in array {
            if let Value::Object(map) = item {
                records.push(map);
            }
        }
    }

    Ok(records)
}

/// Dispatch on the file extension:
/// - .csv: CSV with a header row
/// - .json: JSON array of objects
pub fn load_records(file_path: &str) -> io::Result<Vec<RawRecord>> {
    let extension = Path::new(file_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "csv" => load_records_from_csv(file_path),
        "json" => load_records_from_json(file_path),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Unsupported file format",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("aid_dedup_loader_{name}"))
    }

    #[test]
    fn csv_rows_become_column_maps() {
        let path = temp_path("records.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "womanName,husbandName,nationalId").unwrap();
        writeln!(file, "فاطمة علي,محمد صالح,12345").unwrap();
        writeln!(file, "مريم حسن,كريم جاسم,").unwrap();

        let records = load_records(path.to_str().unwrap()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["womanName"], "فاطمة علي");
        assert_eq!(records[1]["nationalId"], "");

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn json_arrays_keep_non_string_cells() {
        let path = temp_path("records.json");
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"womanName":"فاطمة","nationalId":12345,"children":["أحمد","ليلى"]}}, 7]"#
        )
        .unwrap();

        let records = load_records(path.to_str().unwrap()).unwrap();
        assert_eq!(records.len(), 1, "non-object entries are dropped");
        assert_eq!(records[0]["nationalId"], 12345);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        assert!(load_records("records.xlsx").is_err());
    }
}
