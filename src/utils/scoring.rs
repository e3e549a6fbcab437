// src/utils/scoring.rs

use std::collections::BTreeSet;

use crate::config::EngineConfig;
use crate::models::{NormRecord, Reason, ScoreBreakdown};
use crate::utils::matching::{jaro_winkler, list_jaccard, name_order_free_score, token_jaccard};

/// Jaro-Winkler tiers used by the lineage rules.
const S93: f64 = 0.93;
const S95: f64 = 0.95;

/// Scorer verdict for one record pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub reasons: BTreeSet<Reason>,
}

struct RuleHit {
    delta: f64,
    reason: Reason,
}

/// A lineage rule inspects a pair and either claims it with a score bump or
/// declines. A rule also declines when a token position it needs is absent
/// on either side.
type LineageRule = fn(&NormRecord, &NormRecord) -> Option<RuleHit>;

/// Ordered rule table; the first hit wins.
const LINEAGE_RULES: [LineageRule; 5] = [
    token_reorder_rule,
    household_children_rule,
    woman_lineage_rule,
    shifted_lineage_rule,
    full_lineage_rule,
];

/// 🎯 Score one record pair. Evaluation order is strict: exact id, then the
/// polygamy pattern, then the lineage rules, then the weighted blend. Pure
/// and symmetric in its two record arguments.
pub fn score_pair(a: &NormRecord, b: &NormRecord, cfg: &EngineConfig) -> ScoreOutcome {
    // 1) A shared national id decides on its own.
    if !a.id_digits.is_empty() && a.id_digits == b.id_digits {
        return ScoreOutcome {
            score: 0.99,
            breakdown: ScoreBreakdown {
                id_score: 1.0,
                ..ScoreBreakdown::default()
            },
            reasons: BTreeSet::from([Reason::ExactId]),
        };
    }

    // 2) Co-wife pattern: one husband, shared woman patronymic chain.
    if cfg.rules.enable_polygamy_rules && polygamy_pattern(a, b) {
        return ScoreOutcome {
            score: 0.97,
            breakdown: ScoreBreakdown {
                husband_score: jaro_winkler(&a.husband_norm, &b.husband_norm),
                ..ScoreBreakdown::default()
            },
            reasons: BTreeSet::from([Reason::PolygamyPattern]),
        };
    }

    // 3) Lineage rules, in table order.
    for rule in LINEAGE_RULES {
        if let Some(hit) = rule(a, b) {
            return ScoreOutcome {
                score: (cfg.thresholds.min_pair + hit.delta).min(1.0),
                breakdown: ScoreBreakdown::default(),
                reasons: BTreeSet::from([hit.reason]),
            };
        }
    }

    // 4) Weighted blend over the nine components.
    let breakdown = weighted_breakdown(a, b);
    let w = &cfg.final_score_weights;
    let mut score = w.first_name_score * breakdown.first_name_score
        + w.family_name_score * breakdown.family_name_score
        + w.advanced_name_score * breakdown.advanced_name_score
        + w.token_reorder_score * breakdown.token_reorder_score
        + w.husband_score * breakdown.husband_score
        + w.id_score * breakdown.id_score
        + w.phone_score * breakdown.phone_score
        + w.children_score * breakdown.children_score
        + w.location_score * breakdown.location_score;

    let strong_name_components = [
        breakdown.first_name_score,
        breakdown.family_name_score,
        breakdown.token_reorder_score,
    ]
    .iter()
    .filter(|&&c| c >= 0.85)
    .count();
    if strong_name_components >= 2 {
        score += 0.04;
    }

    let mut reasons = BTreeSet::new();
    if breakdown.token_reorder_score > 0.85 {
        reasons.insert(Reason::TokenReorder);
    }

    ScoreOutcome {
        score: score.clamp(0.0, 1.0),
        breakdown,
        reasons,
    }
}

/// Husband names at s95, woman second token at 0.93 and third at 0.90.
fn polygamy_pattern(a: &NormRecord, b: &NormRecord) -> bool {
    let chain = || -> Option<bool> {
        if jaro_winkler(&a.husband_norm, &b.husband_norm) < S95 {
            return Some(false);
        }
        let second = jaro_winkler(a.woman_tokens.get(1)?, b.woman_tokens.get(1)?);
        let third = jaro_winkler(a.woman_tokens.get(2)?, b.woman_tokens.get(2)?);
        Some(second >= 0.93 && third >= 0.90)
    };
    chain().unwrap_or(false)
}

/// Same woman-name tokens in a different order.
fn token_reorder_rule(a: &NormRecord, b: &NormRecord) -> Option<RuleHit> {
    if token_jaccard(&a.woman_norm, &b.woman_norm) >= 0.80 {
        return Some(RuleHit {
            delta: 0.22,
            reason: Reason::TokenReorder,
        });
    }
    None
}

/// Strong household evidence: matching first name, matching husband in
/// either order, and a near-identical children list.
fn household_children_rule(a: &NormRecord, b: &NormRecord) -> Option<RuleHit> {
    if jaro_winkler(a.woman_tokens.first()?, b.woman_tokens.first()?) < S93 {
        return None;
    }
    let husband_direct = jaro_winkler(&a.husband_norm, &b.husband_norm);
    let husband_reordered = name_order_free_score(&a.husband_norm, &b.husband_norm);
    if husband_direct < 0.90 && husband_reordered < 0.90 {
        return None;
    }
    if list_jaccard(&a.children_norm, &b.children_norm) < 0.90 {
        return None;
    }
    Some(RuleHit {
        delta: 0.25,
        reason: Reason::DuplicatedHusbandLineage,
    })
}

/// Three or four of the first four woman-name parts agree at s93 while the
/// husband first token clearly differs; the woman's own lineage carries the
/// match.
fn woman_lineage_rule(a: &NormRecord, b: &NormRecord) -> Option<RuleHit> {
    if a.woman_tokens.len() < 4 || b.woman_tokens.len() < 4 {
        return None;
    }
    let matched_parts = (0..4)
        .filter(|&i| jaro_winkler(&a.woman_tokens[i], &b.woman_tokens[i]) >= S93)
        .count();
    if matched_parts < 3 {
        return None;
    }
    if jaro_winkler(a.husband_tokens.first()?, b.husband_tokens.first()?) >= 0.70 {
        return None;
    }
    Some(RuleHit {
        delta: 0.18,
        reason: Reason::WomanLineageMatch,
    })
}

/// A four-token and a five-token rendition of the same lineage: an inserted
/// ancestor token shifts grandfather and family name one slot to the right.
fn shifted_lineage_rule(a: &NormRecord, b: &NormRecord) -> Option<RuleHit> {
    let (short, long) = match (a.woman_tokens.len(), b.woman_tokens.len()) {
        (4, 5) => (&a.woman_tokens, &b.woman_tokens),
        (5, 4) => (&b.woman_tokens, &a.woman_tokens),
        _ => return None,
    };
    if jaro_winkler(&short[0], &long[0]) < S93 || jaro_winkler(&short[1], &long[1]) < S93 {
        return None;
    }
    if jaro_winkler(&short[3], &long[4]) < S93 {
        return None;
    }
    // The short form's grandfather slot must line up with the shifted slot,
    // not with the token that displaced it.
    if jaro_winkler(&short[2], &long[2]) >= S93 || jaro_winkler(&short[2], &long[3]) < S93 {
        return None;
    }
    if jaro_winkler(a.husband_tokens.first()?, b.husband_tokens.first()?) < S95 {
        return None;
    }
    Some(RuleHit {
        delta: 0.20,
        reason: Reason::DuplicatedHusbandLineage,
    })
}

/// All four woman parts at s93 plus the full husband identity at s95.
fn full_lineage_rule(a: &NormRecord, b: &NormRecord) -> Option<RuleHit> {
    if a.woman_tokens.len() < 4 || b.woman_tokens.len() < 4 {
        return None;
    }
    if (0..4).any(|i| jaro_winkler(&a.woman_tokens[i], &b.woman_tokens[i]) < S93) {
        return None;
    }
    if jaro_winkler(&a.husband_norm, &b.husband_norm) < S95 {
        return None;
    }
    Some(RuleHit {
        delta: 0.23,
        reason: Reason::DuplicatedHusbandLineage,
    })
}

fn weighted_breakdown(a: &NormRecord, b: &NormRecord) -> ScoreBreakdown {
    let first_name_score = match (a.woman_tokens.first(), b.woman_tokens.first()) {
        (Some(x), Some(y)) => jaro_winkler(x, y),
        _ => 0.0,
    };
    ScoreBreakdown {
        first_name_score,
        family_name_score: jaro_winkler(&join_rest(&a.woman_tokens), &join_rest(&b.woman_tokens)),
        advanced_name_score: jaro_winkler(&root3(&a.woman_tokens), &root3(&b.woman_tokens)).min(0.5),
        token_reorder_score: name_order_free_score(&a.woman_norm, &b.woman_norm),
        husband_score: jaro_winkler(&a.husband_norm, &b.husband_norm)
            .max(name_order_free_score(&a.husband_norm, &b.husband_norm)),
        id_score: id_component(&a.id_digits, &b.id_digits),
        phone_score: phone_component(&a.phone_digits, &b.phone_digits),
        children_score: list_jaccard(&a.children_norm, &b.children_norm),
        location_score: location_component(a, b),
    }
}

fn join_rest(tokens: &[String]) -> String {
    tokens.get(1..).unwrap_or_default().join(" ")
}

/// First three characters of every token, fused into one comparison key.
fn root3(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| t.chars().take(3).collect::<String>())
        .collect()
}

fn id_component(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.len() >= 5 && b.len() >= 5 && a[a.len() - 5..] == b[b.len() - 5..] {
        return 0.75;
    }
    0.0
}

fn phone_component(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.len() >= 6 && b.len() >= 6 && a[a.len() - 6..] == b[b.len() - 6..] {
        return 0.85;
    }
    if a.len() >= 4 && b.len() >= 4 && a[a.len() - 4..] == b[b.len() - 4..] {
        return 0.60;
    }
    0.0
}

/// Village agreement is worth 0.40, subdistrict 0.25, capped at 0.50.
fn location_component(a: &NormRecord, b: &NormRecord) -> f64 {
    let mut score: f64 = 0.0;
    if !a.village_norm.is_empty() && a.village_norm == b.village_norm {
        score += 0.40;
    }
    if !a.subdistrict_norm.is_empty() && a.subdistrict_norm == b.subdistrict_norm {
        score += 0.25;
    }
    score.min(0.50)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;

    fn rec(woman: &str, husband: &str, id: &str, phone: &str) -> NormRecord {
        let record = Record {
            woman_name: woman.to_string(),
            husband_name: husband.to_string(),
            national_id: id.to_string(),
            phone: phone.to_string(),
            ..Record::default()
        };
        NormRecord::derive(0, &record)
    }

    fn cfg() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn exact_id_short_circuits_at_point_99() {
        let a = rec("فاطمة", "", "12345", "");
        let b = rec("مريم", "", "12345", "");
        let out = score_pair(&a, &b, &cfg());
        assert_eq!(out.score, 0.99);
        assert!(out.reasons.contains(&Reason::ExactId));
        assert_eq!(out.breakdown.id_score, 1.0);
    }

    #[test]
    fn empty_ids_never_match_as_exact() {
        let a = rec("فاطمة علي", "", "", "");
        let b = rec("مريم خالد", "", "", "");
        let out = score_pair(&a, &b, &cfg());
        assert!(!out.reasons.contains(&Reason::ExactId));
        assert!(out.score < 0.99);
    }

    #[test]
    fn polygamy_pattern_scores_point_97() {
        let a = rec("مريم خالد حسن", "محمد صالح العلي", "", "");
        let b = rec("ساره خالد حسن", "محمد صالح العلي", "", "");
        let out = score_pair(&a, &b, &cfg());
        assert_eq!(out.score, 0.97);
        assert_eq!(out.reasons, BTreeSet::from([Reason::PolygamyPattern]));
    }

    #[test]
    fn polygamy_rule_can_be_disabled() {
        let a = rec("مريم خالد حسن", "محمد صالح العلي", "", "");
        let b = rec("ساره خالد حسن", "محمد صالح العلي", "", "");
        let mut cfg = cfg();
        cfg.rules.enable_polygamy_rules = false;
        let out = score_pair(&a, &b, &cfg);
        assert_ne!(out.score, 0.97);
        assert!(!out.reasons.contains(&Reason::PolygamyPattern));
    }

    #[test]
    fn polygamy_declines_on_short_woman_names() {
        let a = rec("مريم", "محمد صالح العلي", "", "");
        let b = rec("ساره", "محمد صالح العلي", "", "");
        let out = score_pair(&a, &b, &cfg());
        assert!(!out.reasons.contains(&Reason::PolygamyPattern));
    }

    #[test]
    fn token_reorder_rule_bumps_above_min_pair() {
        let a = rec("فاطمة علي محمد الجبوري", "حسين كريم", "", "");
        let b = rec("محمد الجبوري فاطمة علي", "حسين كريم", "", "");
        let out = score_pair(&a, &b, &cfg());
        assert!((out.score - 0.84).abs() < 1e-9, "0.62 + 0.22, got {}", out.score);
        assert!(out.reasons.contains(&Reason::TokenReorder));
    }

    #[test]
    fn household_children_rule_fires_on_shared_children() {
        let a = {
            let record = Record {
                woman_name: "زينب حسن علي".to_string(),
                husband_name: "كريم جاسم محمد".to_string(),
                children: crate::models::Children::One("أحمد، ليلى، حسن".to_string()),
                ..Record::default()
            };
            NormRecord::derive(0, &record)
        };
        let b = {
            let record = Record {
                // Different lineage tail, same first name and household.
                woman_name: "زينب خليل ابراهيم".to_string(),
                husband_name: "محمد كريم جاسم".to_string(),
                children: crate::models::Children::One("أحمد، ليلى، حسن".to_string()),
                ..Record::default()
            };
            NormRecord::derive(1, &record)
        };
        let out = score_pair(&a, &b, &cfg());
        assert!((out.score - 0.87).abs() < 1e-9, "0.62 + 0.25, got {}", out.score);
        assert_eq!(out.reasons, BTreeSet::from([Reason::DuplicatedHusbandLineage]));
    }

    #[test]
    fn woman_lineage_rule_needs_differing_husband() {
        let a = rec("فاطمة علي محمد الجبوري", "حسين كريم", "", "");
        let b = rec("فاطمة علي محمد الجبوري", "صالح منصور", "", "");
        let out = score_pair(&a, &b, &cfg());
        // Token reorder claims the pair first: identical token sets.
        assert!(out.reasons.contains(&Reason::TokenReorder));

        let c = rec("فاطمة علي محمد الجبوري", "حسين كريم", "", "");
        let d = rec("فاطمة علي محمود الجبورية", "صالح منصور", "", "");
        let out = score_pair(&c, &d, &cfg());
        assert_eq!(out.reasons, BTreeSet::from([Reason::WomanLineageMatch]));
        assert!((out.score - 0.80).abs() < 1e-9, "0.62 + 0.18, got {}", out.score);
    }

    #[test]
    fn full_lineage_rule_needs_strong_husband() {
        // With the polygamy rule on, that rule claims this shape first; the
        // lineage fallback matters when it is toggled off.
        let a = rec("فاطمة علي محمود الجبوري", "حسين كريم جاسم", "", "");
        let b = rec("فاطمة علي محمد الجبورية", "حسين كريم جاسم", "", "");
        let mut cfg = cfg();
        cfg.rules.enable_polygamy_rules = false;
        let out = score_pair(&a, &b, &cfg);
        assert_eq!(out.reasons, BTreeSet::from([Reason::DuplicatedHusbandLineage]));
        assert!((out.score - 0.85).abs() < 1e-9, "0.62 + 0.23, got {}", out.score);
    }

    #[test]
    fn weighted_fallback_uses_id_and_phone_tiers() {
        let a = rec("نور", "", "900012345", "07701234567");
        let b = rec("هدى", "", "70012345", "07809934567");
        let out = score_pair(&a, &b, &cfg());
        assert_eq!(out.breakdown.id_score, 0.75);
        assert_eq!(out.breakdown.phone_score, 0.60);
        assert!(out.reasons.is_empty());
    }

    #[test]
    fn scorer_is_symmetric() {
        let a = rec("فاطمة علي محمد", "حسين كريم", "123", "0770");
        let b = rec("فاطمه علي محمود", "حسن كريم", "124", "0771");
        let ab = score_pair(&a, &b, &cfg());
        let ba = score_pair(&b, &a, &cfg());
        assert_eq!(ab.score, ba.score);
        assert_eq!(ab.breakdown, ba.breakdown);
        assert_eq!(ab.reasons, ba.reasons);
    }

    #[test]
    fn location_component_caps_at_half() {
        let mut ra = Record::default();
        ra.village = "القرية الشمالية".to_string();
        ra.subdistrict = "الناحية".to_string();
        let a = NormRecord::derive(0, &ra);
        let b = NormRecord::derive(1, &ra);
        let out = weighted_breakdown(&a, &b);
        assert_eq!(out.location_score, 0.50);
    }
}
