// src/utils/clustering.rs

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{Cluster, Edge, EdgeScore, NormRecord, Reason};
use crate::utils::scoring::score_pair;

/// Hard cluster size cap. Components above this are fractured, never
/// emitted whole.
pub const MAX_CLUSTER_SIZE: usize = 4;

/// Cadence of assembly progress callbacks, in edges.
const PROGRESS_EVERY: usize = 200;

/// Union-find with path compression and union by size.
struct UnionFind {
    parent: Vec<u32>,
    size: Vec<u32>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n as u32).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, x: u32) -> u32 {
        let mut root = x;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cur = x;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    /// Merge two distinct roots, smaller tree under the larger. Returns the
    /// surviving root.
    fn union(&mut self, ra: u32, rb: u32) -> u32 {
        let (big, small) = if self.size[ra as usize] >= self.size[rb as usize] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small as usize] = big;
        self.size[big as usize] += self.size[small as usize];
        big
    }
}

pub struct AssemblyOutcome {
    pub clusters: Vec<Cluster>,
    pub edges_used: usize,
}

/// Consume edges in the order given (descending score, ties by ascending
/// index pair) and grow components under the size cap. An edge that would
/// push a component past the cap hands both components to the splitter
/// instead; the resulting sub-clusters are final and their members leave
/// the game. `on_progress(consumed, total)` fires every 200 edges and once
/// at the end.
pub fn assemble<F>(
    edges: &[Edge],
    records: &[NormRecord],
    cfg: &EngineConfig,
    mut on_progress: F,
) -> Result<AssemblyOutcome, EngineError>
where
    F: FnMut(usize, usize) -> Result<(), EngineError>,
{
    let n = records.len();
    let mut uf = UnionFind::new(n);
    let mut members: Vec<Vec<u32>> = (0..n as u32).map(|i| vec![i]).collect();
    let mut reasons: Vec<BTreeSet<Reason>> = vec![BTreeSet::new(); n];
    let mut finalized = vec![false; n];
    let mut clusters: Vec<Cluster> = Vec::new();
    let mut edges_used = 0usize;

    for (idx, edge) in edges.iter().enumerate() {
        if idx > 0 && idx % PROGRESS_EVERY == 0 {
            on_progress(idx, edges.len())?;
        }
        if finalized[edge.a as usize] || finalized[edge.b as usize] {
            continue;
        }

        let ra = uf.find(edge.a);
        let rb = uf.find(edge.b);
        // Reasons accumulate on the live roots before any merge decision.
        reasons[ra as usize].extend(edge.reasons.iter().copied());
        reasons[rb as usize].extend(edge.reasons.iter().copied());
        if ra == rb {
            edges_used += 1;
            continue;
        }

        let combined = members[ra as usize].len() + members[rb as usize].len();
        if combined <= MAX_CLUSTER_SIZE {
            let survivor = uf.union(ra, rb);
            let absorbed = if survivor == ra { rb } else { ra };
            let moved = std::mem::take(&mut members[absorbed as usize]);
            members[survivor as usize].extend(moved);
            let moved_reasons = std::mem::take(&mut reasons[absorbed as usize]);
            reasons[survivor as usize].extend(moved_reasons);
            edges_used += 1;
            continue;
        }

        // Overflow: fracture both components locally instead of merging.
        // The offending edge is not owed a place in the partition. Members
        // already committed by an earlier overflow stay out of the subset.
        let mut subset: Vec<u32> = members[ra as usize]
            .iter()
            .chain(members[rb as usize].iter())
            .copied()
            .filter(|&m| !finalized[m as usize])
            .collect();
        subset.sort_unstable();
        for cluster in split_subset(&subset, records, cfg, cfg.thresholds.min_internal)? {
            for &m in &cluster.records {
                if finalized[m as usize] {
                    return Err(EngineError::Invariant(format!(
                        "record {m} committed to two clusters"
                    )));
                }
                finalized[m as usize] = true;
            }
            clusters.push(cluster);
        }
        edges_used += 1;
    }
    on_progress(edges.len(), edges.len())?;

    // Components still open after the edge sweep. Their sub-clusters keep
    // the reasons accumulated on the component root.
    let mut leftovers: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for i in 0..n as u32 {
        if !finalized[i as usize] {
            leftovers.entry(uf.find(i)).or_default().push(i);
        }
    }
    for (root, group) in leftovers {
        if group.len() < 2 {
            // Leftover singletons are not part of the output.
            continue;
        }
        let root_reasons = reasons[root as usize].clone();
        for mut cluster in split_subset(&group, records, cfg, cfg.thresholds.min_internal)? {
            cluster.reasons.extend(root_reasons.iter().copied());
            for &m in &cluster.records {
                finalized[m as usize] = true;
            }
            clusters.push(cluster);
        }
    }

    Ok(AssemblyOutcome {
        clusters,
        edges_used,
    })
}

/// Re-partition `subset` (two or more records) into clusters of at most
/// [`MAX_CLUSTER_SIZE`] members using only local pair evidence at or above
/// `min_internal`.
pub fn split_subset(
    subset: &[u32],
    records: &[NormRecord],
    cfg: &EngineConfig,
    min_internal: f64,
) -> Result<Vec<Cluster>, EngineError> {
    let n = subset.len();
    if n < 2 {
        return Ok(Vec::new());
    }

    // Local edges over subset positions.
    let mut local: Vec<Edge> = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let outcome = score_pair(
                &records[subset[i] as usize],
                &records[subset[j] as usize],
                cfg,
            );
            if outcome.score >= min_internal {
                local.push(Edge {
                    a: i as u32,
                    b: j as u32,
                    score: outcome.score,
                    reasons: outcome.reasons,
                });
            }
        }
    }

    if n <= MAX_CLUSTER_SIZE {
        let mut record_ids = subset.to_vec();
        record_ids.sort_unstable();
        return Ok(vec![Cluster {
            records: record_ids,
            reasons: local
                .iter()
                .flat_map(|e| e.reasons.iter().copied())
                .collect(),
            pair_scores: local
                .iter()
                .map(|e| EdgeScore {
                    a: subset[e.a as usize],
                    b: subset[e.b as usize],
                    score: e.score,
                })
                .collect(),
        }]);
    }

    local.sort_unstable_by(|x, y| {
        y.score
            .total_cmp(&x.score)
            .then_with(|| (x.a, x.b).cmp(&(y.a, y.b)))
    });

    // Fresh union-find over local positions; merge only under the cap.
    let mut uf = UnionFind::new(n);
    for e in &local {
        let ra = uf.find(e.a);
        let rb = uf.find(e.b);
        if ra == rb {
            continue;
        }
        if (uf.size[ra as usize] + uf.size[rb as usize]) as usize <= MAX_CLUSTER_SIZE {
            uf.union(ra, rb);
        }
    }

    let mut groups: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for i in 0..n as u32 {
        groups.entry(uf.find(i)).or_default().push(i);
    }

    let mut out = Vec::new();
    for group in groups.into_values() {
        if group.len() < 2 {
            continue;
        }
        if group.len() > MAX_CLUSTER_SIZE {
            // Unreachable under cap-merge; the guard recurses with a floor
            // that is raised, never lowered.
            let next_floor = min_internal.max(0.45);
            let global: Vec<u32> = group.iter().map(|&i| subset[i as usize]).collect();
            out.extend(split_subset(&global, records, cfg, next_floor)?);
            continue;
        }
        let in_group: HashSet<u32> = group.iter().copied().collect();
        let mut record_ids: Vec<u32> = group.iter().map(|&i| subset[i as usize]).collect();
        record_ids.sort_unstable();
        let mut reasons = BTreeSet::new();
        let mut pair_scores = Vec::new();
        for e in &local {
            if in_group.contains(&e.a) && in_group.contains(&e.b) {
                reasons.extend(e.reasons.iter().copied());
                pair_scores.push(EdgeScore {
                    a: subset[e.a as usize],
                    b: subset[e.b as usize],
                    score: e.score,
                });
            }
        }
        out.push(Cluster {
            records: record_ids,
            reasons,
            pair_scores,
        });
    }

    for c in &out {
        if c.records.len() > MAX_CLUSTER_SIZE {
            return Err(EngineError::Invariant(format!(
                "splitter produced a cluster of {}",
                c.records.len()
            )));
        }
    }
    Ok(out)
}
