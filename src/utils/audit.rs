// src/utils/audit.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{AnnotatedRow, Cluster, Finding, FindingType, Severity};
use crate::utils::matching::jaro_winkler;
use crate::utils::normalization::digits_only;

const WOMAN_SIMILARITY_FLOOR: f64 = 0.92;
const HUSBAND_SIMILARITY_FLOOR: f64 = 0.90;

/// 🔎 Apply the audit rule set over a finished result. Pure function of the
/// rows and clusters; findings reference rows by index.
pub fn run_audit(rows: &[AnnotatedRow], clusters: &[Cluster]) -> Vec<Finding> {
    let mut findings = Vec::new();
    duplicate_ids(rows, &mut findings);
    woman_multiple_husbands(rows, &mut findings);
    high_similarity(rows, clusters, &mut findings);
    duplicate_couples(rows, &mut findings);
    findings
}

/// Two or more records carrying the same non-empty national id.
fn duplicate_ids(rows: &[AnnotatedRow], findings: &mut Vec<Finding>) {
    let mut by_id: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        let id = digits_only(&row.record.national_id);
        if !id.is_empty() {
            by_id.entry(id).or_default().push(i as u32);
        }
    }
    for (id, group) in by_id {
        if group.len() >= 2 {
            findings.push(Finding {
                finding_type: FindingType::DuplicateId,
                severity: Severity::High,
                description: format!("{} records share national id {}", group.len(), id),
                records: group,
            });
        }
    }
}

/// The same woman name paired with two or more distinct husband names.
/// Records with an empty woman name group by their internal id, so they
/// never pool together.
fn woman_multiple_husbands(rows: &[AnnotatedRow], findings: &mut Vec<Finding>) {
    let mut by_woman: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        let name = row.record.woman_name.trim();
        let key = if name.is_empty() {
            row.internal_id.clone()
        } else {
            name.to_string()
        };
        by_woman.entry(key).or_default().push(i as u32);
    }
    for (name, group) in by_woman {
        if group.len() < 2 {
            continue;
        }
        let husbands: BTreeSet<&str> = group
            .iter()
            .map(|&i| rows[i as usize].record.husband_name.trim())
            .filter(|h| !h.is_empty())
            .collect();
        if husbands.len() >= 2 {
            findings.push(Finding {
                finding_type: FindingType::WomanMultipleHusbands,
                severity: Severity::High,
                description: format!(
                    "woman {} appears with {} different husband names",
                    name,
                    husbands.len()
                ),
                records: group,
            });
        }
    }
}

/// Intra-cluster pairs whose woman and husband names both agree at high
/// Jaro-Winkler.
fn high_similarity(rows: &[AnnotatedRow], clusters: &[Cluster], findings: &mut Vec<Finding>) {
    for cluster in clusters {
        for (i, &a) in cluster.records.iter().enumerate() {
            for &b in &cluster.records[i + 1..] {
                let (ra, rb) = (&rows[a as usize], &rows[b as usize]);
                let woman = jaro_winkler(&ra.woman_name_normalized, &rb.woman_name_normalized);
                let husband =
                    jaro_winkler(&ra.husband_name_normalized, &rb.husband_name_normalized);
                if woman >= WOMAN_SIMILARITY_FLOOR && husband >= HUSBAND_SIMILARITY_FLOOR {
                    findings.push(Finding {
                        finding_type: FindingType::HighSimilarity,
                        severity: Severity::Medium,
                        description: format!(
                            "records {} and {} agree on woman and husband names ({:.2}/{:.2})",
                            ra.internal_id, rb.internal_id, woman, husband
                        ),
                        records: vec![a, b],
                    });
                }
            }
        }
    }
}

/// The same woman/husband couple spelled out verbatim on several records.
fn duplicate_couples(rows: &[AnnotatedRow], findings: &mut Vec<Finding>) {
    let mut by_couple: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        let woman = row.record.woman_name.trim().to_lowercase();
        let husband = row.record.husband_name.trim().to_lowercase();
        if woman.is_empty() || husband.is_empty() {
            continue;
        }
        by_couple
            .entry(format!("{woman}|{husband}"))
            .or_default()
            .push(i as u32);
    }
    for (key, group) in by_couple {
        if group.len() >= 2 {
            findings.push(Finding {
                finding_type: FindingType::DuplicateCouple,
                severity: Severity::Medium,
                description: format!(
                    "{} records repeat the couple {}",
                    group.len(),
                    key.replace('|', " / ")
                ),
                records: group,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NormRecord, Record};

    fn row(index: usize, woman: &str, husband: &str, id: &str) -> AnnotatedRow {
        let record = Record {
            woman_name: woman.to_string(),
            husband_name: husband.to_string(),
            national_id: id.to_string(),
            ..Record::default()
        };
        let norm = NormRecord::derive(index as u32, &record);
        AnnotatedRow::new(index, record, &norm, None)
    }

    fn cluster(records: Vec<u32>) -> Cluster {
        Cluster {
            records,
            reasons: BTreeSet::new(),
            pair_scores: Vec::new(),
        }
    }

    #[test]
    fn duplicate_id_lists_every_occurrence_once() {
        let rows = vec![
            row(0, "فاطمة", "محمد", "77"),
            row(1, "مريم", "حسين", "77"),
            row(2, "زينب", "كريم", "77"),
            row(3, "هدى", "جاسم", "88"),
        ];
        // The three id-77 rows sit in two different clusters.
        let clusters = vec![cluster(vec![0, 1]), cluster(vec![2, 3])];
        let findings = run_audit(&rows, &clusters);
        let dup: Vec<&Finding> = findings
            .iter()
            .filter(|f| f.finding_type == FindingType::DuplicateId)
            .collect();
        assert_eq!(dup.len(), 1);
        assert_eq!(dup[0].records, vec![0, 1, 2]);
        assert_eq!(dup[0].severity, Severity::High);
    }

    #[test]
    fn woman_with_two_husbands_is_flagged_high() {
        let rows = vec![
            row(0, "فاطمة علي", "محمد صالح", ""),
            row(1, "فاطمة علي", "كريم جاسم", ""),
        ];
        let findings = run_audit(&rows, &[]);
        let hits: Vec<&Finding> = findings
            .iter()
            .filter(|f| f.finding_type == FindingType::WomanMultipleHusbands)
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].severity, Severity::High);
        assert_eq!(hits[0].records, vec![0, 1]);
    }

    #[test]
    fn empty_woman_names_never_pool_together() {
        let rows = vec![row(0, "", "محمد", ""), row(1, "", "كريم", "")];
        let findings = run_audit(&rows, &[]);
        assert!(!findings
            .iter()
            .any(|f| f.finding_type == FindingType::WomanMultipleHusbands));
    }

    #[test]
    fn high_similarity_fires_per_intra_cluster_pair() {
        let rows = vec![
            row(0, "فاطمة علي الجبوري", "محمد صالح", ""),
            row(1, "فاطمه علي الجبوري", "محمد صالح", ""),
            row(2, "خديجة حسن", "جاسم كريم", ""),
        ];
        let findings = run_audit(&rows, &[cluster(vec![0, 1, 2])]);
        let hits: Vec<&Finding> = findings
            .iter()
            .filter(|f| f.finding_type == FindingType::HighSimilarity)
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].records, vec![0, 1]);
    }

    #[test]
    fn duplicate_couple_matches_verbatim_names() {
        let rows = vec![
            row(0, "فاطمة علي", "محمد صالح", ""),
            row(1, "فاطمة علي", "محمد صالح", ""),
            row(2, "فاطمة علي", "", ""),
        ];
        let findings = run_audit(&rows, &[]);
        let hits: Vec<&Finding> = findings
            .iter()
            .filter(|f| f.finding_type == FindingType::DuplicateCouple)
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].records, vec![0, 1]);
    }

    #[test]
    fn clean_input_yields_no_findings() {
        let rows = vec![
            row(0, "فاطمة علي", "محمد صالح", "1"),
            row(1, "مريم حسن", "كريم جاسم", "2"),
        ];
        assert!(run_audit(&rows, &[]).is_empty());
    }
}
