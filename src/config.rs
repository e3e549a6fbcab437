// src/config.rs

use serde::{Deserialize, Serialize};

/// Score floors and blocking limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    /// Floor a scored pair must clear to become an edge.
    pub min_pair: f64,
    /// Floor for local edges inside the splitter.
    pub min_internal: f64,
    /// Buckets larger than this are processed in contiguous chunks.
    pub block_chunk_size: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_pair: 0.62,
            min_internal: 0.50,
            block_chunk_size: 3000,
        }
    }
}

/// Weights of the nine breakdown components on the weighted-sum path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinalScoreWeights {
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

impl Default for FinalScoreWeights {
    fn default() -> Self {
        Self {
            first_name_score: 0.15,
            family_name_score: 0.25,
            advanced_name_score: 0.12,
            token_reorder_score: 0.10,
            husband_score: 0.12,
            id_score: 0.08,
            phone_score: 0.05,
            children_score: 0.06,
            location_score: 0.04,
        }
    }
}

/// Toggles for the domain rule set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleToggles {
    pub enable_polygamy_rules: bool,
}

impl Default for RuleToggles {
    fn default() -> Self {
        Self {
            enable_polygamy_rules: true,
        }
    }
}

/// Full engine configuration. Every field has a default, so a partial JSON
/// config deserializes into the documented defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub thresholds: Thresholds,
    pub final_score_weights: FinalScoreWeights,
    pub rules: RuleToggles,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"thresholds":{"minPair":0.7}}"#).unwrap();
        assert_eq!(cfg.thresholds.min_pair, 0.7);
        assert_eq!(cfg.thresholds.min_internal, 0.50);
        assert_eq!(cfg.thresholds.block_chunk_size, 3000);
        assert!(cfg.rules.enable_polygamy_rules);
        assert_eq!(cfg.final_score_weights.family_name_score, 0.25);
    }

    #[test]
    fn weights_round_trip_in_camel_case() {
        let json = serde_json::to_value(FinalScoreWeights::default()).unwrap();
        assert_eq!(json["firstNameScore"], 0.15);
        assert_eq!(json["tokenReorderScore"], 0.10);
    }
}
