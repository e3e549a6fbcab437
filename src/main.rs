// src/main.rs

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use aid_dedup::engine::run_engine;
use aid_dedup::models::{EngineInput, EngineMessage, Mapping, NormRecord, Record};
use aid_dedup::utils::audit::run_audit;
use aid_dedup::utils::gold_set::{evaluate_scorer, load_gold_set};
use aid_dedup::utils::loader::load_records;
use aid_dedup::EngineConfig;

struct CliArgs {
    input: String,
    config: Option<String>,
    mapping: Option<String>,
    out: String,
    pairwise: bool,
    evaluate: Option<String>,
}

fn usage() {
    eprintln!(
        "Usage: aid_dedup <records.(csv|json)> [--config cfg.json] [--mapping map.json] \
         [--out results.json] [--pairwise] [--evaluate gold.(csv|json)]"
    );
}

fn parse_args() -> Result<CliArgs, String> {
    let mut args = std::env::args().skip(1);
    let mut input = None;
    let mut config = None;
    let mut mapping = None;
    let mut out = "results.json".to_string();
    let mut pairwise = false;
    let mut evaluate = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(args.next().ok_or("--config needs a file")?),
            "--mapping" => mapping = Some(args.next().ok_or("--mapping needs a file")?),
            "--out" => out = args.next().ok_or("--out needs a file")?,
            "--pairwise" => pairwise = true,
            "--evaluate" => evaluate = Some(args.next().ok_or("--evaluate needs a file")?),
            other if other.starts_with("--") => return Err(format!("Unknown flag {other}")),
            other => {
                if input.is_some() {
                    return Err("More than one input file given".to_string());
                }
                input = Some(other.to_string());
            }
        }
    }

    Ok(CliArgs {
        input: input.ok_or("No input file given")?,
        config,
        mapping,
        out,
        pairwise,
        evaluate,
    })
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &str, what: &str) -> Result<T, String> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read {what} {path}: {e}"))?;
    serde_json::from_str(&contents).map_err(|e| format!("Failed to parse {what} {path}: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            usage();
            return ExitCode::FAILURE;
        }
    };

    println!("🔍 Loading records from {}…", args.input);
    let raw = match load_records(&args.input) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("⚠️  Failed to load input: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("✅ Loaded {} records.", raw.len());

    let options: Option<EngineConfig> = match &args.config {
        Some(path) => match read_json_file(path, "config") {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                eprintln!("⚠️  {e}");
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };
    let mapping: Option<Mapping> = match &args.mapping {
        Some(path) => match read_json_file(path, "mapping") {
            Ok(m) => Some(m),
            Err(e) => {
                eprintln!("⚠️  {e}");
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let input = EngineInput {
        records: raw,
        mapping,
        options,
        pairwise_only: args.pairwise,
    };

    if let Some(gold_path) = &args.evaluate {
        return run_evaluation(&input, gold_path);
    }

    // Best-effort cancellation: ctrl-c raises the flag, the engine observes
    // it at the next progress boundary.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("⚠️  Cancellation requested…");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let (tx, rx) = mpsc::channel::<EngineMessage>();
    let worker = {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            run_engine(&input, &cancel, |msg| {
                let _ = tx.send(msg.clone());
            })
        })
    };

    let printer = tokio::task::spawn_blocking(move || {
        let mut payload = None;
        for msg in rx {
            match msg {
                EngineMessage::Progress {
                    status,
                    progress,
                    completed,
                    total,
                } => match (completed, total) {
                    (Some(done), Some(total)) => {
                        println!("▶ {status} {progress}% ({done}/{total})")
                    }
                    _ => println!("▶ {status} {progress}%"),
                },
                EngineMessage::PairwiseResult { pairs } => {
                    println!("✅ Scored {} pairs.", pairs.len())
                }
                EngineMessage::Done { payload: done } => payload = Some(done),
                EngineMessage::Error { error } => eprintln!("⚠️  Engine error: {error}"),
            }
        }
        payload
    });

    let _ = worker.await;
    let payload = match printer.await {
        Ok(payload) => payload,
        Err(_) => None,
    };
    let Some(payload) = payload else {
        return ExitCode::FAILURE;
    };

    let findings = run_audit(&payload.rows, &payload.clusters);
    println!(
        "✅ {} clusters, {} edges used, {} audit findings.",
        payload.clusters.len(),
        payload.edges_used,
        findings.len()
    );

    let results = json!({
        "cacheId": Uuid::new_v4().to_string(),
        "generatedAt": Utc::now().to_rfc3339(),
        "rows": payload.rows,
        "clusters": payload.clusters,
        "auditFindings": findings,
    });
    let serialized = match serde_json::to_string_pretty(&results) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("⚠️  Failed to serialize results: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = std::fs::write(&args.out, serialized) {
        eprintln!("⚠️  Failed to write {}: {e}", args.out);
        return ExitCode::FAILURE;
    }
    println!("✅ Results written to {}.", args.out);
    ExitCode::SUCCESS
}

/// Score the gold-set pairs against the loaded records and report scorer
/// quality; no clustering runs in this mode.
fn run_evaluation(input: &EngineInput, gold_path: &str) -> ExitCode {
    let cfg = input.options.unwrap_or_default();
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
    let ids: HashMap<String, u32> = (0..records.len())
        .map(|i| (format!("row_{i}"), i as u32))
        .collect();

    let pairs = match load_gold_set(gold_path) {
        Ok(pairs) => pairs,
        Err(e) => {
            eprintln!("⚠️  Failed to load gold set: {e}");
            return ExitCode::FAILURE;
        }
    };
    let report = evaluate_scorer(&pairs, &norms, &ids, &cfg);
    println!("▶ Gold set: {} pairs ({} skipped)", report.pairs, report.skipped);
    println!(
        "  tp {}  fp {}  tn {}  fn {}",
        report.true_positives, report.false_positives, report.true_negatives, report.false_negatives
    );
    println!(
        "  precision {:.3}  recall {:.3}  f1 {:.3}",
        report.precision, report.recall, report.f1
    );
    ExitCode::SUCCESS
}
