//! Reference Resolver
//!
//! Replaces `$ref` leaves with the subgraphs they name. Resolution works on a
//! clone of the unresolved graph and runs as an explicit worklist:
//!
//! 1. snapshot the pending identities of this round
//! 2. settle each one (local pointer, self URL, remote document, or failure)
//! 3. move settled identities from `pending` to `resolved`
//! 4. repeat while splicing exposed new identities, at most `max_rounds` times
//!
//! Failures never abort resolution. They are collected as
//! [`ReferenceFailure`]s and surface through
//! [`ResolvedGraph::invalid_reference_detected`].

use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::builder::build_with_base;
use super::identity::{
    classify, definition_section, fragment_of, identity_target, self_alias, without_fragment,
    RefIdentity, RefTarget,
};
use super::node::{Node, Scalar, REF_KEYWORD};
use super::{NodeHandle, SchemaGraph};
use crate::fetch::{FetchError, RemoteFetcher};

/// Default bound on resolution rounds
pub const MAX_ROUNDS: usize = 10;

// =============================================================================
// Resolution Results
// =============================================================================

/// Why a reference stayed unresolved
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureCause {
    #[error("target not found")]
    MissingTarget,

    #[error("reference points at itself")]
    SelfReference,

    #[error("malformed target: {0}")]
    Malformed(String),

    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("invalid reference inside {url}: {reason}")]
    InFetched { url: String, reason: String },

    #[error("round limit reached")]
    RoundsExhausted,
}

/// One unresolved reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceFailure {
    pub identity: RefIdentity,
    pub cause: FailureCause,
}

impl ReferenceFailure {
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self.cause, FailureCause::FetchFailed(_))
    }
}

impl std::fmt::Display for ReferenceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", identity_target(&self.identity), self.cause)
    }
}

/// Pending and resolved reference registries of one graph.
///
/// An identity lives in exactly one of the two maps, and never moves back
/// from `resolved` to `pending`.
#[derive(Debug, Clone, Default)]
pub struct ResolutionState {
    pub(crate) pending: BTreeMap<RefIdentity, NodeHandle>,
    pub(crate) resolved: BTreeMap<RefIdentity, NodeHandle>,
}

impl ResolutionState {
    pub fn pending(&self) -> &BTreeMap<RefIdentity, NodeHandle> {
        &self.pending
    }

    pub fn resolved(&self) -> &BTreeMap<RefIdentity, NodeHandle> {
        &self.resolved
    }

    pub fn is_resolved(&self, identity: &str) -> bool {
        self.resolved.contains_key(identity)
    }

    fn settle(&mut self, identity: &str, node: NodeHandle) {
        self.pending.remove(identity);
        self.resolved.insert(identity.to_string(), node);
    }

    /// Keep resolved entries alive when the node they point at is replaced
    fn retarget(&mut self, from: NodeHandle, to: NodeHandle) {
        for handle in self.resolved.values_mut() {
            if *handle == from {
                *handle = to;
            }
        }
    }
}

/// A graph with its references replaced
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    graph: SchemaGraph,
    state: ResolutionState,
    sections: BTreeSet<String>,
    nested_targets: BTreeSet<String>,
    failures: Vec<ReferenceFailure>,
    rounds: usize,
}

impl ResolvedGraph {
    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    pub fn state(&self) -> &ResolutionState {
        &self.state
    }

    /// First-level sections named by local references (`definitions`, ...)
    pub fn definition_sections(&self) -> &BTreeSet<String> {
        &self.sections
    }

    /// Local targets more than one level below their section. Their section
    /// is harvested; the target itself is kept for diagnostics
    pub fn nested_targets(&self) -> &BTreeSet<String> {
        &self.nested_targets
    }

    pub fn failures(&self) -> &[ReferenceFailure] {
        &self.failures
    }

    pub fn invalid_reference_detected(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Rounds the worklist ran
    pub fn rounds(&self) -> usize {
        self.rounds
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Which references a pass may settle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// The analyzed document: everything, sections harvested
    Document,
    /// A fetched document: local and self references only
    Fetched,
}

enum Settlement {
    Settled(NodeHandle),
    Deferred,
    Failed(FailureCause),
}

#[derive(Default)]
struct Pass {
    failures: Vec<ReferenceFailure>,
    sections: BTreeSet<String>,
    nested_targets: BTreeSet<String>,
    rounds: usize,
}

impl Pass {
    /// Record the first-level section of a settled local target
    fn harvest(&mut self, fragment: String) {
        if let Some((section, depth)) = definition_section(&fragment) {
            self.sections.insert(section);
            if depth > 1 {
                self.nested_targets.insert(fragment);
            }
        }
    }
}

/// Resolves the references of one document.
///
/// Remote documents are fetched at most once per resolver.
pub struct Resolver<'f> {
    fetcher: &'f dyn RemoteFetcher,
    max_rounds: usize,
    document: String,
    cache: HashMap<Url, Result<Value, FetchError>>,
}

impl<'f> Resolver<'f> {
    pub fn new(fetcher: &'f dyn RemoteFetcher) -> Self {
        Self {
            fetcher,
            max_rounds: MAX_ROUNDS,
            document: String::new(),
            cache: HashMap::new(),
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Name used in diagnostics
    pub fn for_document(mut self, document: impl Into<String>) -> Self {
        self.document = document.into();
        self
    }

    /// Resolve a clone of `graph`; the unresolved form stays untouched
    pub fn resolve(&mut self, graph: &SchemaGraph) -> ResolvedGraph {
        let mut resolved = graph.clone();
        let (state, pass) = self.run(&mut resolved, Scope::Document);

        if !pass.nested_targets.is_empty() {
            debug!(
                document = %self.document,
                targets = ?pass.nested_targets,
                "References below first-level definitions"
            );
        }

        ResolvedGraph {
            graph: resolved,
            state,
            sections: pass.sections,
            nested_targets: pass.nested_targets,
            failures: pass.failures,
            rounds: pass.rounds,
        }
    }

    fn run(&mut self, graph: &mut SchemaGraph, scope: Scope) -> (ResolutionState, Pass) {
        let mut state = ResolutionState {
            pending: graph.references.clone(),
            resolved: BTreeMap::new(),
        };
        let mut pass = Pass::default();
        let mut deferred: BTreeSet<RefIdentity> = BTreeSet::new();

        loop {
            let batch: Vec<(RefIdentity, NodeHandle)> = state
                .pending
                .iter()
                .filter(|(identity, _)| !deferred.contains(*identity))
                .map(|(identity, handle)| (identity.clone(), *handle))
                .collect();
            if batch.is_empty() {
                break;
            }

            if pass.rounds == self.max_rounds {
                warn!(
                    document = %self.document,
                    remaining = batch.len(),
                    rounds = self.max_rounds,
                    "Resolution round limit reached"
                );
                for (identity, leaf) in batch {
                    self.fail(&mut state, &mut pass, identity, leaf, FailureCause::RoundsExhausted);
                }
                break;
            }

            pass.rounds += 1;
            debug!(
                document = %self.document,
                round = pass.rounds,
                pending = batch.len(),
                "Resolution round"
            );

            for (identity, leaf) in batch {
                match self.settle(graph, &mut state, &mut pass, leaf, scope) {
                    Settlement::Settled(node) => {
                        state.retarget(leaf, node);
                        state.settle(&identity, node);
                    }
                    Settlement::Deferred => {
                        deferred.insert(identity);
                    }
                    Settlement::Failed(cause) => self.fail(&mut state, &mut pass, identity, leaf, cause),
                }
            }
        }

        (state, pass)
    }

    /// Failed identities settle onto their own leaf
    fn fail(
        &self,
        state: &mut ResolutionState,
        pass: &mut Pass,
        identity: RefIdentity,
        leaf: NodeHandle,
        cause: FailureCause,
    ) {
        warn!(
            document = %self.document,
            target = identity_target(&identity),
            cause = %cause,
            "Unresolved reference"
        );
        state.settle(&identity, leaf);
        pass.failures.push(ReferenceFailure { identity, cause });
    }

    fn settle(
        &mut self,
        graph: &mut SchemaGraph,
        state: &mut ResolutionState,
        pass: &mut Pass,
        leaf: NodeHandle,
        scope: Scope,
    ) -> Settlement {
        let raw = match graph.node(leaf).and_then(Node::value) {
            Some(Scalar::String(raw)) => raw.clone(),
            Some(other) => {
                return Settlement::Failed(FailureCause::Malformed(format!(
                    "non-string reference '{}'",
                    other
                )))
            }
            None => return Settlement::Failed(FailureCause::MissingTarget),
        };

        let own = graph.own_urls();
        let fragment = match classify(&raw, graph.base(), &own) {
            RefTarget::Local { fragment } | RefTarget::SelfUrl { fragment } => fragment,
            RefTarget::Remote { url } => {
                return match scope {
                    Scope::Fetched => Settlement::Deferred,
                    Scope::Document => self.settle_remote(graph, state, pass, leaf, &url),
                }
            }
            RefTarget::Malformed { reason } => {
                return Settlement::Failed(FailureCause::Malformed(reason))
            }
        };

        let settlement = settle_local(graph, leaf, &fragment);
        if scope == Scope::Document && matches!(settlement, Settlement::Settled(_)) {
            pass.harvest(fragment);
        }
        settlement
    }

    fn fetch(&mut self, location: &Url) -> Result<Value, FetchError> {
        if let Some(cached) = self.cache.get(location) {
            return cached.clone();
        }
        let fetched = self.fetcher.fetch(location);
        self.cache.insert(location.clone(), fetched.clone());
        fetched
    }

    /// Fetch, resolve internally, splice the fragment's subgraph in place of
    /// `leaf`
    fn settle_remote(
        &mut self,
        graph: &mut SchemaGraph,
        state: &mut ResolutionState,
        pass: &mut Pass,
        leaf: NodeHandle,
        url: &Url,
    ) -> Settlement {
        let location = without_fragment(url);
        let document = match self.fetch(&location) {
            Ok(document) => document,
            Err(e) => return Settlement::Failed(FailureCause::FetchFailed(e.to_string())),
        };
        let mut fetched = match build_with_base(&document, Some(location.clone())) {
            Ok(fetched) => fetched,
            Err(e) => return Settlement::Failed(FailureCause::FetchFailed(e.to_string())),
        };

        let (inner, inner_pass) = self.run(&mut fetched, Scope::Fetched);
        for failure in inner_pass.failures {
            warn!(
                document = %self.document,
                url = %location,
                "Invalid reference in externally referenced document"
            );
            pass.failures.push(ReferenceFailure {
                identity: failure.identity,
                cause: FailureCause::InFetched {
                    url: location.to_string(),
                    reason: failure.cause.to_string(),
                },
            });
        }

        let entry = match fetched.node_at_fragment(&fragment_of(url)) {
            Some(entry) => entry,
            None => return Settlement::Failed(FailureCause::MissingTarget),
        };

        match splice(graph, state, &fetched, &inner, entry) {
            Some(root) if root != leaf => {
                graph.redirect(leaf, root);
                Settlement::Settled(root)
            }
            Some(_) => Settlement::Failed(FailureCause::SelfReference),
            None => Settlement::Failed(FailureCause::MissingTarget),
        }
    }
}

/// Resolve with default settings
pub fn resolve(graph: &SchemaGraph, fetcher: &dyn RemoteFetcher) -> ResolvedGraph {
    Resolver::new(fetcher).resolve(graph)
}

fn settle_local(graph: &mut SchemaGraph, leaf: NodeHandle, fragment: &str) -> Settlement {
    match graph.node_at_fragment(fragment) {
        Some(target) if target == leaf => Settlement::Failed(FailureCause::SelfReference),
        Some(target) => {
            graph.redirect(leaf, target);
            Settlement::Settled(target)
        }
        None => Settlement::Failed(FailureCause::MissingTarget),
    }
}

/// Copy the nodes reachable from `entry` into `graph`.
///
/// Reference leaves the fetched document could not settle are unified with
/// the outer registries: known identities map to their outer node, unseen
/// ones join the outer `pending` map. Returns the node standing for `entry`.
///
/// No deferred leaf can carry the identity being resolved: the fetched
/// document's base is its own URL, so references back into it are local.
fn splice(
    graph: &mut SchemaGraph,
    state: &mut ResolutionState,
    fetched: &SchemaGraph,
    inner: &ResolutionState,
    entry: NodeHandle,
) -> Option<NodeHandle> {
    let members = fetched.subtree(entry);
    let deferred: HashMap<NodeHandle, &RefIdentity> =
        inner.pending.iter().map(|(id, handle)| (*handle, id)).collect();

    let mut remap: HashMap<NodeHandle, NodeHandle> = HashMap::with_capacity(members.len());
    for &member in members.iter().filter(|m| !deferred.contains_key(m)) {
        if let Some(node) = fetched.node(member) {
            remap.insert(member, graph.graph.add_node(node.clone()));
        }
    }

    for &member in members.iter() {
        if let Some(id) = deferred.get(&member) {
            let mapped = unify(graph, state, id);
            remap.insert(member, mapped);
        }
    }
    let root = *remap.get(&entry)?;

    for &member in &members {
        for edge in fetched.graph.edges_directed(member, Direction::Outgoing) {
            if let (Some(&source), Some(&target)) = (remap.get(&member), remap.get(&edge.target())) {
                graph.graph.update_edge(source, target, *edge.weight());
            }
        }
    }

    Some(root)
}

/// Outer node for an identity met inside a fetched document
fn unify(graph: &mut SchemaGraph, state: &mut ResolutionState, identity: &str) -> NodeHandle {
    let lookup = self_alias(identity, graph.base()).unwrap_or_else(|| identity.to_string());
    if let Some(&handle) = state.resolved.get(&lookup) {
        return handle;
    }
    if let Some(&handle) = state.pending.get(&lookup) {
        return handle;
    }

    // Stored absolute so classification no longer depends on the fetched base
    let target = identity_target(&lookup).to_string();
    let handle = graph.graph.add_node(Node::leaf(REF_KEYWORD, Scalar::String(target)));
    state.pending.insert(lookup, handle);
    handle
}
