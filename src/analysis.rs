//! Per-Document Analysis
//!
//! One document goes through validity check → tree build → reference
//! resolution → metrics and keyword counts, and comes out as exactly one
//! [`AnalysisRecord`] or one [`DocumentFailure`].
//!
//! [`SchemaDocument`] owns the graphs of one document. The resolved and
//! extended graphs are derived on first use and cached.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::OnceCell;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::checksum::Checksum;
use crate::config::AnalyzerConfig;
use crate::counters::{contains_reference, CounterSet};
use crate::error::{DocumentFailure, Result};
use crate::fetch::{ChainFetcher, RemoteFetcher};
use crate::graph::{
    build, extend, ExtendedGraph, GraphMetrics, ResolvedGraph, Resolver, SchemaGraph, MAX_ROUNDS,
};
use crate::validity::{MetaSchemaChecker, ValidityChecker};

// =============================================================================
// Schema Document
// =============================================================================

/// A parsed document and its lazily derived graphs
pub struct SchemaDocument<'f> {
    filename: String,
    value: Value,
    graph: SchemaGraph,
    fetcher: &'f dyn RemoteFetcher,
    max_rounds: usize,
    resolved: OnceCell<ResolvedGraph>,
    extended: OnceCell<ExtendedGraph>,
}

impl<'f> SchemaDocument<'f> {
    /// Build the unresolved graph; fails on unclassifiable shapes
    pub fn new(
        filename: impl Into<String>,
        value: Value,
        fetcher: &'f dyn RemoteFetcher,
    ) -> std::result::Result<Self, DocumentFailure> {
        let graph = build(&value).map_err(|e| DocumentFailure::Structural {
            path: e.path().to_string(),
        })?;
        Ok(Self {
            filename: filename.into(),
            value,
            graph,
            fetcher,
            max_rounds: MAX_ROUNDS,
            resolved: OnceCell::new(),
            extended: OnceCell::new(),
        })
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Unresolved graph
    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    pub fn resolved(&self) -> &ResolvedGraph {
        self.resolved.get_or_init(|| {
            Resolver::new(self.fetcher)
                .with_max_rounds(self.max_rounds)
                .for_document(self.filename.as_str())
                .resolve(&self.graph)
        })
    }

    pub fn extended(&self) -> &ExtendedGraph {
        self.extended.get_or_init(|| extend(self.resolved().graph()))
    }

    /// True if the document has any `$ref` leaf
    pub fn contains_references(&self) -> bool {
        contains_reference(&self.graph)
    }

    pub fn metrics(&self) -> GraphMetrics {
        GraphMetrics::compute(&self.value, &self.graph, self.resolved(), || self.extended())
    }
}

// =============================================================================
// Analysis Record
// =============================================================================

/// Result record of one successfully analyzed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub filename: String,
    pub checksum: Checksum,
    pub ref_count: usize,
    pub schema_depth: usize,
    pub resolved_depth: usize,
    pub shortest_cycle_length: usize,
    pub longest_cycle_length: usize,
    pub cycle_count: usize,
    pub max_fan_in: usize,
    pub max_fan_out: usize,
    pub fan_in_list: Vec<usize>,
    pub fan_out_list: Vec<usize>,
    pub width: usize,
    pub path_count: usize,
    pub has_recursion: bool,
    pub reachability: bool,
    pub blow_up_factor: f64,
    pub node_count: usize,
    pub resolved_node_count: usize,
    pub extended_node_count: usize,
    pub keyword_counts: BTreeMap<String, usize>,
}

impl AnalysisRecord {
    pub fn new(
        filename: impl Into<String>,
        checksum: Checksum,
        metrics: GraphMetrics,
        keyword_counts: BTreeMap<String, usize>,
    ) -> Self {
        Self {
            filename: filename.into(),
            checksum,
            ref_count: metrics.ref_count,
            schema_depth: metrics.schema_depth,
            resolved_depth: metrics.resolved_depth,
            shortest_cycle_length: metrics.cycles.shortest,
            longest_cycle_length: metrics.cycles.longest,
            cycle_count: metrics.cycles.count,
            max_fan_in: metrics.degrees.max_fan_in(),
            max_fan_out: metrics.degrees.max_fan_out(),
            fan_in_list: metrics.degrees.fan_in,
            fan_out_list: metrics.degrees.fan_out,
            width: metrics.width,
            path_count: metrics.path_count,
            has_recursion: metrics.has_recursion,
            reachability: metrics.reachability,
            blow_up_factor: metrics.blow_up_factor,
            node_count: metrics.node_count,
            resolved_node_count: metrics.resolved_node_count,
            extended_node_count: metrics.extended_node_count,
            keyword_counts,
        }
    }
}

// =============================================================================
// Analyzer
// =============================================================================

/// Shared, read-only analysis settings; one instance serves every worker
pub struct Analyzer {
    fetcher: Box<dyn RemoteFetcher>,
    validity: Box<dyn ValidityChecker>,
    counters: CounterSet,
    max_rounds: usize,
}

impl Analyzer {
    pub fn new(fetcher: Box<dyn RemoteFetcher>, validity: Box<dyn ValidityChecker>) -> Self {
        Self {
            fetcher,
            validity,
            counters: CounterSet::standard(),
            max_rounds: MAX_ROUNDS,
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        Ok(Self {
            fetcher: Box::new(ChainFetcher::from_config(&config.fetch)),
            validity: MetaSchemaChecker::from_config(&config.validation),
            counters: CounterSet::from_config(&config.counters)?,
            max_rounds: config.resolution.max_rounds,
        })
    }

    pub fn with_counters(mut self, counters: CounterSet) -> Self {
        self.counters = counters;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Analyze raw file content
    pub fn analyze_bytes(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> std::result::Result<AnalysisRecord, DocumentFailure> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| {
            warn!(document = filename, error = %e, "Unparsable document");
            DocumentFailure::Parse { reason: e.to_string() }
        })?;
        self.analyze_value(filename, value, Checksum::of(bytes))
    }

    /// Analyze an already parsed document
    pub fn analyze_value(
        &self,
        filename: &str,
        value: Value,
        checksum: Checksum,
    ) -> std::result::Result<AnalysisRecord, DocumentFailure> {
        if let Err(reason) = self.validity.check(&value) {
            warn!(document = filename, reason = %reason, "Invalid according to validator");
            return Err(DocumentFailure::Validation { reason });
        }

        let document = SchemaDocument::new(filename, value, self.fetcher.as_ref())
            .map_err(|failure| {
                warn!(document = filename, failure = %failure, "Malformed schema");
                failure
            })?
            .with_max_rounds(self.max_rounds);

        let resolved = document.resolved();
        if resolved.invalid_reference_detected() {
            let failure = DocumentFailure::from_references(resolved.failures());
            warn!(document = filename, failure = %failure, "Contains invalid references");
            return Err(failure);
        }

        let metrics = document.metrics();
        let keyword_counts = self.counters.count(resolved.graph());
        debug!(
            document = filename,
            rounds = resolved.rounds(),
            recursive = metrics.has_recursion,
            "Analyzed"
        );

        Ok(AnalysisRecord::new(filename, checksum, metrics, keyword_counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{MapFetcher, NoFetch};
    use crate::validity::AcceptAll;
    use serde_json::json;

    fn permissive() -> Analyzer {
        Analyzer::new(Box::new(NoFetch), Box::new(AcceptAll))
    }

    #[test]
    fn test_document_caches_resolution() {
        let value = json!({ "a": { "$ref": "#/b" }, "b": { "type": "string" } });
        let document = SchemaDocument::new("doc.json", value, &NoFetch).unwrap();
        let first = document.resolved() as *const ResolvedGraph;
        let second = document.resolved() as *const ResolvedGraph;
        assert_eq!(first, second);
        assert!(document.contains_references());
        assert_eq!(document.graph().references().len(), 1);
    }

    #[test]
    fn test_record_for_valid_document() {
        let record = permissive()
            .analyze_bytes("a.json", br#"{"type": "object", "properties": {"a": {"type": "string"}}}"#)
            .unwrap();
        assert_eq!(record.filename, "a.json");
        assert_eq!(record.width, 2);
        assert_eq!(record.blow_up_factor, 1.0);
        assert_eq!(record.keyword_counts["object_count"], 1);
        assert_eq!(record.keyword_counts["str_count"], 1);
    }

    #[test]
    fn test_failures_are_typed() {
        let analyzer = permissive();
        assert!(matches!(
            analyzer.analyze_bytes("broken.json", b"{ nope"),
            Err(DocumentFailure::Parse { .. })
        ));
        assert!(matches!(
            analyzer.analyze_bytes("missing.json", br##"{"$ref": "#/definitions/none"}"##),
            Err(DocumentFailure::Reference { .. })
        ));
        assert!(matches!(
            analyzer.analyze_bytes("remote.json", br#"{"$ref": "http://example.com/x.json"}"#),
            Err(DocumentFailure::Fetch { .. })
        ));

        let strict = Analyzer::new(Box::new(NoFetch), Box::new(MetaSchemaChecker::default()));
        assert!(matches!(
            strict.analyze_bytes("plain.json", br#"{"type": "string"}"#),
            Err(DocumentFailure::Validation { .. })
        ));
    }

    #[test]
    fn test_remote_document_analyzed() {
        let fetcher = MapFetcher::new().with(
            "http://example.com/item.json",
            json!({ "type": "object", "properties": { "id": { "type": "integer" } } }),
        );
        let analyzer = Analyzer::new(Box::new(fetcher), Box::new(AcceptAll));
        let record = analyzer
            .analyze_value(
                "list.json",
                json!({ "type": "array", "items": { "$ref": "http://example.com/item.json" } }),
                Checksum::of(b"list"),
            )
            .unwrap();

        assert_eq!(record.ref_count, 1);
        assert_eq!(record.keyword_counts["number_count"], 1);
        assert!(record.resolved_node_count > record.node_count);
        assert!(!record.has_recursion);
    }
}
