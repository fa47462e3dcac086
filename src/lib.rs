//! Schema Metrics
//!
//! Structural metrics for corpora of JSON Schema documents. Every document is
//! turned into a containment graph, its `$ref` indirections are resolved (local
//! fragments and remote documents alike) and the result is measured: depth,
//! width, fan-in/out, recursion and cycle lengths, reachability of declared
//! definitions, and the blow-up of unfolding shared subtrees.
//!
//! ## Pipeline
//!
//! ```text
//! bytes ──▶ validity ──▶ graph::build ──▶ graph::resolve ──▶ GraphMetrics
//!                                              │                 ▲
//!                                              └─▶ graph::extend ┘
//!                                                                │
//!                             counters (traversal of resolved) ──┴─▶ AnalysisRecord
//! ```
//!
//! Each document yields exactly one [`AnalysisRecord`] or one
//! [`DocumentFailure`]; the [`batch`] harness runs documents in parallel and
//! aggregates a [`BatchReport`].

pub mod analysis;
pub mod batch;
pub mod checksum;
pub mod config;
pub mod counters;
pub mod error;
pub mod fetch;
pub mod graph;
pub mod validity;

pub use analysis::{AnalysisRecord, Analyzer, SchemaDocument};
pub use batch::{BatchReport, FailedDocument};
pub use checksum::Checksum;
pub use config::AnalyzerConfig;
pub use counters::CounterSet;
pub use error::{DocumentFailure, MetricsError, Result};
pub use fetch::{ChainFetcher, DirectoryFetcher, FetchError, MapFetcher, NoFetch, RemoteFetcher};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use graph::{GraphMetrics, SchemaGraph};
pub use validity::{AcceptAll, MetaSchemaChecker, SchemaDraft, ValidityChecker};
