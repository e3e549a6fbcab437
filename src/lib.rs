//! Offline deduplication and clustering engine for humanitarian aid
//! beneficiary registries.
//!
//! The same household often appears several times under orthographic
//! variants: Arabic letter-variant spellings, reordered name tokens, or
//! co-wives registered against one husband. The engine normalizes records,
//! blocks them into candidate buckets, scores candidate pairs with domain
//! rules plus a weighted blend, and assembles clusters of at most four
//! records, then audits the result for integrity problems.
//!
//! The engine is strictly offline and deterministic: identical input and
//! configuration produce identical output. It streams typed progress
//! messages to its host and never panics into it.

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod utils;

pub use config::EngineConfig;
pub use engine::run_engine;
pub use error::EngineError;
pub use models::{
    AnnotatedRow, Cluster, DonePayload, EngineInput, EngineMessage, Finding, Mapping, Reason,
};
pub use utils::audit::run_audit;
