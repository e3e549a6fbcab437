// src/engine.rs

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{
    AnnotatedRow, DonePayload, Edge, EngineInput, EngineMessage, NormRecord, PairwiseEntry, Phase,
    Record,
};
use crate::utils::blocking::candidate_pairs;
use crate::utils::clustering::assemble;
use crate::utils::scoring::score_pair;

/// Candidate pairs scored per parallel batch between progress checkpoints.
const SCORE_BATCH: usize = 2048;

/// 🚀 Run the full pipeline, pushing messages into `emit`. Exactly one
/// terminal message is produced: `done` on success, `error` otherwise. The
/// cancellation flag is observed at every progress boundary.
pub fn run_engine<F>(
    input: &EngineInput,
    cancel: &AtomicBool,
    mut emit: F,
) -> Result<DonePayload, EngineError>
where
    F: FnMut(&EngineMessage),
{
    let result = run_phases(input, cancel, &mut emit);
    match &result {
        Ok(payload) => emit(&EngineMessage::Done {
            payload: payload.clone(),
        }),
        Err(err) => emit(&EngineMessage::Error {
            error: err.to_string(),
        }),
    }
    result
}

/// Progress sink: clamps percentages monotone, checks cancellation before
/// every emission.
struct Progress<'a, F: FnMut(&EngineMessage)> {
    cancel: &'a AtomicBool,
    emit: &'a mut F,
    last: u8,
}

impl<'a, F: FnMut(&EngineMessage)> Progress<'a, F> {
    fn step(
        &mut self,
        status: Phase,
        pct: u8,
        completed: Option<usize>,
        total: Option<usize>,
    ) -> Result<(), EngineError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled);
        }
        let pct = pct.max(self.last).min(100);
        self.last = pct;
        (self.emit)(&EngineMessage::Progress {
            status,
            progress: pct,
            completed,
            total,
        });
        Ok(())
    }

    fn message(&mut self, msg: &EngineMessage) {
        (self.emit)(msg);
    }
}

/// Map phase-local completion onto a slice of the 0..100 run scale.
fn scale(done: usize, total: usize, lo: u8, hi: u8) -> u8 {
    if total == 0 {
        return hi;
    }
    let span = f64::from(hi - lo);
    lo + ((done as f64 / total as f64) * span).round() as u8
}

fn run_phases<F>(
    input: &EngineInput,
    cancel: &AtomicBool,
    emit: &mut F,
) -> Result<DonePayload, EngineError>
where
    F: FnMut(&EngineMessage),
{
    let cfg = input.options.unwrap_or_default();
    let mut progress = Progress {
        cancel,
        emit,
        last: 0,
    };

    // Mapping resolution and normalization happen before the first phase
    // tick; both are linear and tolerant of missing fields.
    let records: Vec<Record> = input
        .records
        .iter()
        .map(|raw| Record::from_raw(raw, input.mapping.as_ref()))
        .collect();
    let norms: Vec<NormRecord> = records
        .iter()
        .enumerate()
        .map(|(i, r)| NormRecord::derive(i as u32, r))
        .collect();

    if input.pairwise_only {
        return run_pairwise(&records, &norms, &cfg, &mut progress);
    }

    // C4: candidate generation.
    progress.step(Phase::Blocking, 0, None, None)?;
    let pairs = candidate_pairs(&norms, cfg.thresholds.block_chunk_size, |done, total| {
        progress.step(Phase::Blocking, scale(done, total, 0, 25), Some(done), Some(total))
    })?;

    // C3: score candidates in parallel batches; order within a batch is
    // preserved by the parallel collect, and the final sort below decides
    // consumption order regardless.
    progress.step(Phase::BuildingEdges, 25, Some(0), Some(pairs.len()))?;
    let mut edges: Vec<Edge> = Vec::new();
    let mut scored = 0usize;
    for batch in pairs.chunks(SCORE_BATCH) {
        let batch_edges: Vec<Edge> = batch
            .par_iter()
            .filter_map(|&(a, b)| {
                let outcome = score_pair(&norms[a as usize], &norms[b as usize], &cfg);
                (outcome.score >= cfg.thresholds.min_pair).then_some(Edge {
                    a,
                    b,
                    score: outcome.score,
                    reasons: outcome.reasons,
                })
            })
            .collect();
        edges.extend(batch_edges);
        scored += batch.len();
        progress.step(
            Phase::BuildingEdges,
            scale(scored, pairs.len(), 25, 70),
            Some(scored),
            Some(pairs.len()),
        )?;
    }

    // Deterministic consumption order: descending score, ties by ascending
    // index pair.
    edges.sort_unstable_by(|x, y| {
        y.score
            .total_cmp(&x.score)
            .then_with(|| (x.a, x.b).cmp(&(y.a, y.b)))
    });
    progress.step(Phase::EdgesBuilt, 70, Some(edges.len()), Some(edges.len()))?;

    // C5 + C6: merge under the cap, fracture on overflow.
    progress.step(Phase::MergingEdges, 70, Some(0), Some(edges.len()))?;
    let outcome = assemble(&edges, &norms, &cfg, |done, total| {
        progress.step(
            Phase::MergingEdges,
            scale(done, total, 70, 95),
            Some(done),
            Some(total),
        )
    })?;

    // Attach cluster membership to the output rows.
    progress.step(Phase::Annotating, 95, None, None)?;
    let mut membership: Vec<Option<usize>> = vec![None; records.len()];
    for (ci, cluster) in outcome.clusters.iter().enumerate() {
        for &m in &cluster.records {
            membership[m as usize] = Some(ci);
        }
    }
    let rows: Vec<AnnotatedRow> = records
        .into_iter()
        .zip(&norms)
        .enumerate()
        .map(|(i, (r, nr))| AnnotatedRow::new(i, r, nr, membership[i]))
        .collect();
    progress.step(Phase::Done, 100, None, None)?;

    Ok(DonePayload {
        rows,
        clusters: outcome.clusters,
        edges_used: outcome.edges_used,
    })
}

/// Pairwise-only mode: score every unordered pair, skip clustering.
fn run_pairwise<F>(
    records: &[Record],
    norms: &[NormRecord],
    cfg: &EngineConfig,
    progress: &mut Progress<'_, F>,
) -> Result<DonePayload, EngineError>
where
    F: FnMut(&EngineMessage),
{
    let n = norms.len();
    let total = n * n.saturating_sub(1) / 2;
    progress.step(Phase::BuildingEdges, 0, Some(0), Some(total))?;

    let mut pairs: Vec<(u32, u32)> = Vec::with_capacity(total);
    for a in 0..n as u32 {
        for b in (a + 1)..n as u32 {
            pairs.push((a, b));
        }
    }

    let mut entries: Vec<PairwiseEntry> = Vec::with_capacity(total);
    let mut scored = 0usize;
    for batch in pairs.chunks(SCORE_BATCH) {
        let batch_entries: Vec<PairwiseEntry> = batch
            .par_iter()
            .map(|&(a, b)| {
                let outcome = score_pair(&norms[a as usize], &norms[b as usize], cfg);
                PairwiseEntry {
                    a_index: a,
                    b_index: b,
                    score: outcome.score,
                    breakdown: outcome.breakdown,
                    reasons: outcome.reasons,
                }
            })
            .collect();
        entries.extend(batch_entries);
        scored += batch.len();
        progress.step(
            Phase::BuildingEdges,
            scale(scored, total, 0, 95),
            Some(scored),
            Some(total),
        )?;
    }

    progress.message(&EngineMessage::PairwiseResult { pairs: entries });

    let rows: Vec<AnnotatedRow> = records
        .iter()
        .zip(norms)
        .enumerate()
        .map(|(i, (r, nr))| AnnotatedRow::new(i, r.clone(), nr, None))
        .collect();
    progress.step(Phase::Done, 100, None, None)?;

    Ok(DonePayload {
        rows,
        clusters: Vec::new(),
        edges_used: 0,
    })
}
