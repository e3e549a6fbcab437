// src/models.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::utils::normalization::{digits_only, normalize, split_children};

/// One input row exactly as the host hands it over: column name to cell
/// value. Canonical fields are resolved out of this at the mapping step.
pub type RawRecord = serde_json::Map<String, Value>;

/// Children cells arrive either pre-split or as one delimited string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Children {
    One(String),
    Many(Vec<String>),
}

impl Default for Children {
    fn default() -> Self {
        Children::One(String::new())
    }
}

impl Children {
    /// Ordered list of normalized child names.
    pub fn normalized(&self) -> Vec<String> {
        match self {
            Children::One(s) => split_children(s),
            Children::Many(items) => items
                .iter()
                .map(|s| normalize(s))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

/// Column remapping: which source column feeds each canonical field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Mapping {
    pub woman_name: Option<String>,
    pub husband_name: Option<String>,
    pub national_id: Option<String>,
    pub phone: Option<String>,
    pub village: Option<String>,
    pub subdistrict: Option<String>,
    pub children: Option<String>,
    pub beneficiary_id: Option<String>,
}

/// Canonical record after mapping resolution. Columns not consumed by the
/// mapping ride along in `passthrough` for round-tripping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Record {
    pub woman_name: String,
    pub husband_name: String,
    pub national_id: String,
    pub phone: String,
    pub village: String,
    pub subdistrict: String,
    pub children: Children,
    #[serde(flatten)]
    pub passthrough: BTreeMap<String, Value>,
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

impl Record {
    /// Resolve one raw row against the (optional) column mapping. Missing or
    /// non-text cells degrade to empty values; resolution never fails.
    pub fn from_raw(raw: &RawRecord, mapping: Option<&Mapping>) -> Record {
        let fallback = Mapping::default();
        let m = mapping.unwrap_or(&fallback);
        let col = |mapped: &Option<String>, canonical: &str| -> String {
            mapped.as_deref().unwrap_or(canonical).to_string()
        };
        let woman_col = col(&m.woman_name, "womanName");
        let husband_col = col(&m.husband_name, "husbandName");
        let id_col = col(&m.national_id, "nationalId");
        let phone_col = col(&m.phone, "phone");
        let village_col = col(&m.village, "village");
        let subdistrict_col = col(&m.subdistrict, "subdistrict");
        let children_col = col(&m.children, "children");

        let text = |name: &str| raw.get(name).map(cell_text).unwrap_or_default();
        let children = match raw.get(children_col.as_str()) {
            Some(Value::Array(items)) => Children::Many(items.iter().map(cell_text).collect()),
            Some(v) => Children::One(cell_text(v)),
            None => Children::default(),
        };

        let consumed = [
            woman_col.as_str(),
            husband_col.as_str(),
            id_col.as_str(),
            phone_col.as_str(),
            village_col.as_str(),
            subdistrict_col.as_str(),
            children_col.as_str(),
        ];
        let mut passthrough: BTreeMap<String, Value> = raw
            .iter()
            .filter(|(k, _)| !consumed.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(bid_col) = m.beneficiary_id.as_deref() {
            if let Some(v) = raw.get(bid_col) {
                passthrough.insert("beneficiaryId".to_string(), v.clone());
            }
        }

        Record {
            woman_name: text(&woman_col),
            husband_name: text(&husband_col),
            national_id: text(&id_col),
            phone: text(&phone_col),
            village: text(&village_col),
            subdistrict: text(&subdistrict_col),
            children,
            passthrough,
        }
    }
}

/// Derived comparison fields, index-parallel with the record list. Owns no
/// original record data; records stay immutable after normalization.
#[derive(Debug, Clone)]
pub struct NormRecord {
    pub index: u32,
    pub woman_norm: String,
    pub husband_norm: String,
    pub village_norm: String,
    pub subdistrict_norm: String,
    pub children_norm: Vec<String>,
    pub id_digits: String,
    pub phone_digits: String,
    pub woman_tokens: Vec<String>,
    pub husband_tokens: Vec<String>,
}

impl NormRecord {
    pub fn derive(index: u32, r: &Record) -> NormRecord {
        let woman_norm = normalize(&r.woman_name);
        let husband_norm = normalize(&r.husband_name);
        let woman_tokens = woman_norm.split_whitespace().map(str::to_owned).collect();
        let husband_tokens = husband_norm.split_whitespace().map(str::to_owned).collect();
        NormRecord {
            index,
            village_norm: normalize(&r.village),
            subdistrict_norm: normalize(&r.subdistrict),
            children_norm: r.children.normalized(),
            id_digits: digits_only(&r.national_id),
            phone_digits: digits_only(&r.phone),
            woman_norm,
            husband_norm,
            woman_tokens,
            husband_tokens,
        }
    }
}

/// Why an edge or cluster was formed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    ExactId,
    PolygamyPattern,
    TokenReorder,
    WomanLineageMatch,
    DuplicatedHusbandLineage,
    AdditionalRule,
}

/// Scored candidate pair; `a < b` are record indices.
#[derive(Debug, Clone)]
pub struct Edge {
    pub a: u32,
    pub b: u32,
    pub score: f64,
    pub reasons: BTreeSet<Reason>,
}

/// One retained intra-cluster pair score, kept for display and averaging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeScore {
    pub a: u32,
    pub b: u32,
    pub score: f64,
}

/// A finalized group of 2 to 4 records treated as one beneficiary unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub records: Vec<u32>,
    pub reasons: BTreeSet<Reason>,
    pub pair_scores: Vec<EdgeScore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingType {
    DuplicateId,
    WomanMultipleHusbands,
    HighSimilarity,
    DuplicateCouple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

/// An audit observation. References rows by index, never owns them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub severity: Severity,
    pub description: String,
    pub records: Vec<u32>,
}

/// Per-component contribution of the weighted-sum scoring path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreBreakdown {
    pub first_name_score: f64,
    pub family_name_score: f64,
    pub advanced_name_score: f64,
    pub token_reorder_score: f64,
    pub husband_score: f64,
    pub id_score: f64,
    pub phone_score: f64,
    pub children_score: f64,
    pub location_score: f64,
}

/// Output row: the original fields plus derived comparison fields and
/// cluster membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedRow {
    pub internal_id: String,
    #[serde(flatten)]
    pub record: Record,
    pub woman_name_normalized: String,
    pub husband_name_normalized: String,
    pub village_normalized: String,
    pub subdistrict_normalized: String,
    pub children_normalized: Vec<String>,
    pub cluster: Option<usize>,
}

impl AnnotatedRow {
    pub fn new(index: usize, record: Record, norm: &NormRecord, cluster: Option<usize>) -> Self {
        AnnotatedRow {
            internal_id: format!("row_{index}"),
            woman_name_normalized: norm.woman_norm.clone(),
            husband_name_normalized: norm.husband_norm.clone(),
            village_normalized: norm.village_norm.clone(),
            subdistrict_normalized: norm.subdistrict_norm.clone(),
            children_normalized: norm.children_norm.clone(),
            cluster,
            record,
        }
    }
}

/// The single value the engine receives from its host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineInput {
    pub records: Vec<RawRecord>,
    pub mapping: Option<Mapping>,
    pub options: Option<EngineConfig>,
    pub pairwise_only: bool,
}

/// One fully scored pair in pairwise-only mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairwiseEntry {
    pub a_index: u32,
    pub b_index: u32,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub reasons: BTreeSet<Reason>,
}

/// Terminal success payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonePayload {
    pub rows: Vec<AnnotatedRow>,
    pub clusters: Vec<Cluster>,
    pub edges_used: usize,
}

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Blocking,
    BuildingEdges,
    EdgesBuilt,
    MergingEdges,
    Annotating,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Blocking => "blocking",
            Phase::BuildingEdges => "building-edges",
            Phase::EdgesBuilt => "edges-built",
            Phase::MergingEdges => "merging-edges",
            Phase::Annotating => "annotating",
            Phase::Done => "done",
        })
    }
}

/// Messages streamed back to the host. Exactly one terminal message per
/// run: `done` on success, `error` otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum EngineMessage {
    Progress {
        status: Phase,
        progress: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        completed: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<usize>,
    },
    PairwiseResult {
        pairs: Vec<PairwiseEntry>,
    },
    Done {
        payload: DonePayload,
    },
    Error {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(pairs: &[(&str, Value)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn from_raw_without_mapping_reads_canonical_columns() {
        let r = Record::from_raw(
            &raw(&[
                ("womanName", json!("فاطمة علي")),
                ("nationalId", json!(12345)),
                ("note", json!("keep me")),
            ]),
            None,
        );
        assert_eq!(r.woman_name, "فاطمة علي");
        assert_eq!(r.national_id, "12345");
        assert_eq!(r.husband_name, "");
        assert_eq!(r.passthrough.get("note"), Some(&json!("keep me")));
    }

    #[test]
    fn from_raw_with_mapping_replaces_canonical_fields() {
        let mapping = Mapping {
            woman_name: Some("اسم_المستفيدة".to_string()),
            beneficiary_id: Some("رقم".to_string()),
            ..Mapping::default()
        };
        let r = Record::from_raw(
            &raw(&[
                ("اسم_المستفيدة", json!("مريم خالد")),
                ("رقم", json!("B-9")),
            ]),
            Some(&mapping),
        );
        assert_eq!(r.woman_name, "مريم خالد");
        assert_eq!(r.passthrough.get("beneficiaryId"), Some(&json!("B-9")));
    }

    #[test]
    fn children_accepts_string_or_list() {
        let single = Children::One("أحمد، ليلى".to_string());
        assert_eq!(single.normalized(), vec!["احمد", "ليلى"]);
        let many = Children::Many(vec!["أحمد".to_string(), "".to_string()]);
        assert_eq!(many.normalized(), vec!["احمد"]);
    }

    #[test]
    fn message_wire_format_matches_contract() {
        let msg = EngineMessage::Progress {
            status: Phase::BuildingEdges,
            progress: 42,
            completed: Some(10),
            total: Some(100),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "progress");
        assert_eq!(v["status"], "building-edges");
        assert_eq!(v["progress"], 42);

        let err = serde_json::to_value(EngineMessage::Error {
            error: "cancelled".to_string(),
        })
        .unwrap();
        assert_eq!(err["type"], "error");
        assert_eq!(err["error"], "cancelled");
    }

    #[test]
    fn reason_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_value(Reason::DuplicatedHusbandLineage).unwrap(),
            json!("DUPLICATED_HUSBAND_LINEAGE")
        );
        assert_eq!(serde_json::to_value(Reason::ExactId).unwrap(), json!("EXACT_ID"));
    }
}
