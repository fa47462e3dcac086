//! Keyword Counters
//!
//! Pluggable [`KeywordCounter`]s run over the resolved graph of each
//! document. The standard table covers the keywords of the corpus study;
//! extra counters come from `[[counters]]` configuration entries with regex
//! matchers.
//!
//! Counters hold per-document state, so a [`CounterSet`] hands out a fresh
//! instance of every counter for each document.

use regex::Regex;
use std::collections::BTreeMap;

use crate::config::CounterConfig;
use crate::graph::{traverse, traverse_counters, KeywordCounter, Node, SchemaGraph, Visitor};

/// Which nodes a table counter matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Any node with one of these names
    Names(&'static [&'static str]),
    /// A `type` leaf whose value is one of these
    TypeValue(&'static [&'static str]),
}

impl Matcher {
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            Self::Names(names) => names.contains(&node.name.as_str()),
            Self::TypeValue(values) => {
                node.name == "type"
                    && node
                        .value()
                        .and_then(|v| v.as_str())
                        .map(|v| values.contains(&v))
                        .unwrap_or(false)
            }
        }
    }
}

/// Standard counters, by report key
pub const STANDARD_COUNTERS: &[(&str, Matcher)] = &[
    ("add_prop_count", Matcher::Names(&["additionalProperties"])),
    ("all_of_count", Matcher::Names(&["allOf"])),
    ("any_of_count", Matcher::Names(&["anyOf"])),
    ("array_count", Matcher::TypeValue(&["array"])),
    ("str_count", Matcher::TypeValue(&["string"])),
    ("enum_count", Matcher::Names(&["enum"])),
    ("mult_of_count", Matcher::Names(&["multipleOf"])),
    ("not_count", Matcher::Names(&["not"])),
    ("number_count", Matcher::TypeValue(&["number", "integer"])),
    ("pattern_count", Matcher::Names(&["pattern", "patternProperties"])),
    ("required_count", Matcher::Names(&["required"])),
    ("unique_items_count", Matcher::Names(&["uniqueItems"])),
    (
        "value_restriction_count",
        Matcher::Names(&[
            "minimum",
            "maximum",
            "minLength",
            "maxLength",
            "exclusiveMinimum",
            "exclusiveMaximum",
        ]),
    ),
    ("boolean_count", Matcher::TypeValue(&["boolean"])),
    ("nulltype_count", Matcher::TypeValue(&["null"])),
    ("object_count", Matcher::TypeValue(&["object"])),
];

// =============================================================================
// Counter Implementations
// =============================================================================

/// Counter driven by a [`Matcher`]
#[derive(Debug, Clone)]
pub struct TableCounter {
    key: &'static str,
    matcher: Matcher,
    count: usize,
}

impl TableCounter {
    pub fn new(key: &'static str, matcher: Matcher) -> Self {
        Self { key, matcher, count: 0 }
    }
}

impl Visitor for TableCounter {
    fn visit(&mut self, node: &Node) {
        if self.matcher.matches(node) {
            self.count += 1;
        }
    }
}

impl KeywordCounter for TableCounter {
    fn key(&self) -> &str {
        self.key
    }

    fn count(&self) -> usize {
        self.count
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// Counter with regex matchers on the node name and, optionally, the leaf
/// value
#[derive(Debug, Clone)]
pub struct PatternCounter {
    key: String,
    name: Regex,
    value: Option<Regex>,
    count: usize,
}

impl PatternCounter {
    pub fn new(key: impl Into<String>, name: Regex, value: Option<Regex>) -> Self {
        Self { key: key.into(), name, value, count: 0 }
    }

    pub fn from_config(config: &CounterConfig) -> Result<Self, regex::Error> {
        let name = Regex::new(&config.name)?;
        let value = config.value.as_deref().map(Regex::new).transpose()?;
        Ok(Self::new(config.key.clone(), name, value))
    }
}

impl Visitor for PatternCounter {
    fn visit(&mut self, node: &Node) {
        if !self.name.is_match(&node.name) {
            return;
        }
        let value_ok = match &self.value {
            Some(pattern) => node.value_text().map(|v| pattern.is_match(&v)).unwrap_or(false),
            None => true,
        };
        if value_ok {
            self.count += 1;
        }
    }
}

impl KeywordCounter for PatternCounter {
    fn key(&self) -> &str {
        &self.key
    }

    fn count(&self) -> usize {
        self.count
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// 1 if any `$ref` leaf is visited, else 0
#[derive(Debug, Clone, Default)]
pub struct ContainsRefCounter {
    found: bool,
}

impl Visitor for ContainsRefCounter {
    fn visit(&mut self, node: &Node) {
        self.found |= node.is_reference();
    }
}

impl KeywordCounter for ContainsRefCounter {
    fn key(&self) -> &str {
        "contains_ref"
    }

    fn count(&self) -> usize {
        usize::from(self.found)
    }

    fn reset(&mut self) {
        self.found = false;
    }
}

/// True if the graph still holds a reference leaf
pub fn contains_reference(graph: &SchemaGraph) -> bool {
    let mut counter = ContainsRefCounter::default();
    traverse(graph, &mut counter);
    counter.count() > 0
}

// =============================================================================
// Counter Set
// =============================================================================

/// Factory for the counters run on every document
#[derive(Debug, Clone)]
pub struct CounterSet {
    table: Vec<(&'static str, Matcher)>,
    patterns: Vec<PatternCounter>,
}

impl Default for CounterSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl CounterSet {
    pub fn standard() -> Self {
        Self { table: STANDARD_COUNTERS.to_vec(), patterns: Vec::new() }
    }

    /// Standard counters plus configured ones
    pub fn from_config(extra: &[CounterConfig]) -> Result<Self, regex::Error> {
        let patterns = extra
            .iter()
            .map(PatternCounter::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns, ..Self::standard() })
    }

    pub fn len(&self) -> usize {
        self.table.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fresh counters, all at zero
    pub fn build(&self) -> Vec<Box<dyn KeywordCounter>> {
        let table = self
            .table
            .iter()
            .map(|&(key, matcher)| Box::new(TableCounter::new(key, matcher)) as Box<dyn KeywordCounter>);
        let patterns = self.patterns.iter().map(|p| {
            let mut fresh = p.clone();
            fresh.reset();
            Box::new(fresh) as Box<dyn KeywordCounter>
        });
        table.chain(patterns).collect()
    }

    /// Run a fresh set over `graph`
    pub fn count(&self, graph: &SchemaGraph) -> BTreeMap<String, usize> {
        let mut counters = self.build();
        traverse_counters(graph, &mut counters);
        counters
            .iter()
            .map(|c| (c.key().to_string(), c.count()))
            .collect()
    }
}
