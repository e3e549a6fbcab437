// src/utils/gold_set.rs

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::models::NormRecord;
use crate::utils::scoring::score_pair;

/// One labeled pair from a gold set, addressing rows by `internalId`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LabeledPair {
    pub a_id: String,
    pub b_id: String,
    pub is_match: bool,
}

/// Scorer quality against a gold set at the `minPair` decision floor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvalReport {
    pub pairs: usize,
    pub skipped: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Loads a gold set from a CSV file.
///
/// The CSV file should have the following columns:
/// - a_id: internalId of the first record
/// - b_id: internalId of the second record
/// - label: 1 for match, 0 for non-match
pub fn load_gold_set_from_csv(file_path: &str) -> io::Result<Vec<LabeledPair>> {
    let file = File::open(file_path)?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

    let mut pairs = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.len() < 3 {
            continue; // Skip records with insufficient fields
        }
        let label = record[2].parse::<u8>().unwrap_or(0);
        pairs.push(LabeledPair {
            a_id: record[0].to_string(),
            b_id: record[1].to_string(),
            is_match: label == 1,
        });
    }

    Ok(pairs)
}

/// Loads a gold set from a JSON file: an array of objects with `a_id`,
/// `b_id` and a numeric `label` (1 = match).
pub fn load_gold_set_from_json(file_path: &str) -> io::Result<Vec<LabeledPair>> {
    let mut contents = String::new();
    File::open(file_path)?.read_to_string(&mut contents)?;

    let json: Value = serde_json::from_str(&contents)?;
    let mut pairs = Vec::new();

    if let Value::Array(array) = json {
        for item in array {
            if let (Some(a_id), Some(b_id), Some(label)) = (
                item.get("a_id").and_then(Value::as_str),
                item.get("b_id").and_then(Value::as_str),
                item.get("label").and_then(Value::as_u64),
            ) {
                pairs.push(LabeledPair {
                    a_id: a_id.to_string(),
                    b_id: b_id.to_string(),
                    is_match: label == 1,
                });
            }
        }
    }

    Ok(pairs)
}

/// Dispatch on the file extension (.csv or .json).
pub fn load_gold_set(file_path: &str) -> io::Result<Vec<LabeledPair>> {
    let extension = Path::new(file_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "csv" => load_gold_set_from_csv(file_path),
        "json" => load_gold_set_from_json(file_path),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Unsupported file format",
        )),
    }
}

/// Score every resolvable pair with the production scorer and tally the
/// confusion matrix of the decision `score >= minPair`. Pairs whose ids are
/// unknown count as skipped, never as failures.
pub fn evaluate_scorer(
    pairs: &[LabeledPair],
    norms: &[NormRecord],
    ids: &HashMap<String, u32>,
    cfg: &EngineConfig,
) -> EvalReport {
    let mut report = EvalReport {
        pairs: pairs.len(),
        ..EvalReport::default()
    };

    for pair in pairs {
        let (Some(&a), Some(&b)) = (ids.get(&pair.a_id), ids.get(&pair.b_id)) else {
            report.skipped += 1;
            continue;
        };
        let predicted =
            score_pair(&norms[a as usize], &norms[b as usize], cfg).score >= cfg.thresholds.min_pair;
        match (predicted, pair.is_match) {
            (true, true) => report.true_positives += 1,
            (true, false) => report.false_positives += 1,
            (false, true) => report.false_negatives += 1,
            (false, false) => report.true_negatives += 1,
        }
    }

    let tp = report.true_positives as f64;
    let predicted_positive = report.true_positives + report.false_positives;
    report.precision = if predicted_positive == 0 {
        0.0
    } else {
        tp / predicted_positive as f64
    };
    let actual_positive = report.true_positives + report.false_negatives;
    report.recall = if actual_positive == 0 {
        0.0
    } else {
        tp / actual_positive as f64
    };
    report.f1 = if report.precision + report.recall == 0.0 {
        0.0
    } else {
        2.0 * report.precision * report.recall / (report.precision + report.recall)
    };
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use std::io::Write;

    fn norm(index: u32, woman: &str, id: &str) -> NormRecord {
        let record = Record {
            woman_name: woman.to_string(),
            national_id: id.to_string(),
            ..Record::default()
        };
        NormRecord::derive(index, &record)
    }

    #[test]
    fn csv_gold_set_round_trip() {
        let path = std::env::temp_dir().join("aid_dedup_gold_set.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "a_id,b_id,label").unwrap();
        writeln!(file, "row_0,row_1,1").unwrap();
        writeln!(file, "row_0,row_2,0").unwrap();

        let pairs = load_gold_set(path.to_str().unwrap()).unwrap();
        assert_eq!(pairs.len(), 2);
        assert!(pairs[0].is_match);
        assert!(!pairs[1].is_match);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn json_gold_set_skips_malformed_entries() {
        let path = std::env::temp_dir().join("aid_dedup_gold_set.json");
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"a_id":"row_0","b_id":"row_1","label":1}},{{"a_id":"row_9"}}]"#
        )
        .unwrap();

        let pairs = load_gold_set(path.to_str().unwrap()).unwrap();
        assert_eq!(pairs.len(), 1);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn evaluation_tallies_the_confusion_matrix() {
        let norms = vec![
            norm(0, "فاطمة علي", "111"),
            norm(1, "فاطمة علي", "111"),
            norm(2, "خديجة حسن", "222"),
        ];
        let ids: HashMap<String, u32> =
            (0..3).map(|i| (format!("row_{i}"), i as u32)).collect();
        let pairs = vec![
            LabeledPair {
                a_id: "row_0".to_string(),
                b_id: "row_1".to_string(),
                is_match: true,
            },
            LabeledPair {
                a_id: "row_0".to_string(),
                b_id: "row_2".to_string(),
                is_match: false,
            },
            LabeledPair {
                a_id: "row_0".to_string(),
                b_id: "row_9".to_string(),
                is_match: true,
            },
        ];
        let report = evaluate_scorer(&pairs, &norms, &ids, &EngineConfig::default());
        assert_eq!(report.true_positives, 1);
        assert_eq!(report.true_negatives, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.precision, 1.0);
        assert_eq!(report.recall, 1.0);
        assert_eq!(report.f1, 1.0);
    }
}
