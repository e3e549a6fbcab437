// src/utils/blocking.rs

use std::collections::{BTreeMap, HashSet};

use crate::error::EngineError;
use crate::models::NormRecord;

/// Sentinel bucket for records producing no key at all; they still get
/// compared with each other.
const CATCH_ALL: &str = "blk:all";

/// Cadence of blocking progress callbacks, in buckets.
const PROGRESS_EVERY: usize = 20;

struct BlockKeys {
    w_first: String,
    h_first: String,
    id_last4: String,
    phone_last4: String,
    village: String,
}

fn prefix_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Trailing slice of a digit string; the whole string when shorter. Digit
/// strings are ASCII, so byte slicing is safe here.
fn tail(s: &str, n: usize) -> &str {
    if s.len() <= n {
        s
    } else {
        &s[s.len() - n..]
    }
}

fn block_keys(r: &NormRecord) -> BlockKeys {
    BlockKeys {
        w_first: r
            .woman_tokens
            .first()
            .map(|t| prefix_chars(t, 3))
            .unwrap_or_default(),
        h_first: r
            .husband_tokens
            .first()
            .map(|t| prefix_chars(t, 3))
            .unwrap_or_default(),
        id_last4: tail(&r.id_digits, 4).to_string(),
        phone_last4: tail(&r.phone_digits, 4).to_string(),
        village: prefix_chars(&r.village_norm, 6),
    }
}

/// Every bucket this record belongs to, most specific first.
fn bucket_names(k: &BlockKeys) -> Vec<String> {
    let mut names = Vec::new();
    if !k.w_first.is_empty()
        && !k.h_first.is_empty()
        && !k.id_last4.is_empty()
        && !k.phone_last4.is_empty()
    {
        names.push(format!(
            "full:{}:{}:{}:{}",
            k.w_first, k.h_first, k.id_last4, k.phone_last4
        ));
    }
    if !k.w_first.is_empty() && !k.phone_last4.is_empty() {
        names.push(format!("wp:{}:{}", k.w_first, k.phone_last4));
    }
    if !k.w_first.is_empty() && !k.id_last4.is_empty() {
        names.push(format!("wi:{}:{}", k.w_first, k.id_last4));
    }
    if !k.w_first.is_empty() && !k.h_first.is_empty() {
        names.push(format!("wh:{}:{}", k.w_first, k.h_first));
    }
    if !k.h_first.is_empty() {
        names.push(format!("h:{}", k.h_first));
    }
    if !k.w_first.is_empty() {
        names.push(format!("w:{}", k.w_first));
    }
    if !k.village.is_empty() {
        names.push(format!("v:{}", k.village));
    }
    if names.is_empty() {
        names.push(CATCH_ALL.to_string());
    }
    names
}

/// Candidate index pairs from the blocking index: the union of intra-bucket
/// pairs, deduplicated, with oversized buckets processed in contiguous
/// self-paired chunks. Buckets iterate in sorted key order so the emitted
/// pair list is deterministic. `on_progress(completed, total)` fires every
/// 20 buckets and on the last one; its error aborts the scan.
pub fn candidate_pairs<F>(
    records: &[NormRecord],
    chunk_size: usize,
    mut on_progress: F,
) -> Result<Vec<(u32, u32)>, EngineError>
where
    F: FnMut(usize, usize) -> Result<(), EngineError>,
{
    let mut buckets: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for r in records {
        for name in bucket_names(&block_keys(r)) {
            buckets.entry(name).or_default().push(r.index);
        }
    }

    let total = buckets.len();
    let chunk_size = chunk_size.max(2);
    let mut seen: HashSet<(u32, u32)> = HashSet::new();
    let mut pairs: Vec<(u32, u32)> = Vec::new();

    for (completed, members) in buckets.values().enumerate() {
        for chunk in members.chunks(chunk_size) {
            for i in 0..chunk.len() {
                for j in (i + 1)..chunk.len() {
                    let (a, b) = if chunk[i] < chunk[j] {
                        (chunk[i], chunk[j])
                    } else {
                        (chunk[j], chunk[i])
                    };
                    if seen.insert((a, b)) {
                        pairs.push((a, b));
                    }
                }
            }
        }
        let done = completed + 1;
        if done % PROGRESS_EVERY == 0 || done == total {
            on_progress(done, total)?;
        }
    }

    Ok(pairs)
}
