//! Schema Validity Checking
//!
//! Documents are analyzed only after a [`ValidityChecker`] accepts them. The
//! default checker detects the draft from `$schema` and compiles the document
//! with the `jsonschema` crate, which checks it against that draft's
//! meta-schema.

use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::config::ValidationConfig;

/// JSON Schema draft named by a `$schema` URI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaDraft {
    Draft03,
    Draft04,
    /// Never published a meta-schema of its own; checked as draft-04
    Draft05,
    Draft06,
    Draft07,
    Draft201909,
    Draft202012,
}

impl SchemaDraft {
    /// Draft of a document, from its `$schema` keyword
    pub fn detect(document: &Value) -> Option<Self> {
        document.get("$schema").and_then(Value::as_str).and_then(Self::from_uri)
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        if let Some(idx) = uri.find("draft-0") {
            return match uri.get(idx + 7..idx + 8)? {
                "3" => Some(Self::Draft03),
                "4" => Some(Self::Draft04),
                "5" => Some(Self::Draft05),
                "6" => Some(Self::Draft06),
                "7" => Some(Self::Draft07),
                _ => None,
            };
        }
        if uri.contains("/draft/2019-09/") {
            return Some(Self::Draft201909);
        }
        if uri.contains("/draft/2020-12/") {
            return Some(Self::Draft202012);
        }
        // Unversioned URI means the latest classic draft
        match uri.trim_end_matches('#') {
            "http://json-schema.org/schema" | "https://json-schema.org/schema" => Some(Self::Draft07),
            _ => None,
        }
    }

    /// Meta-schema used for the compile check, if the validator has one
    fn meta_draft(self) -> Option<Draft> {
        match self {
            Self::Draft04 | Self::Draft05 => Some(Draft::Draft4),
            Self::Draft06 => Some(Draft::Draft6),
            Self::Draft07 => Some(Draft::Draft7),
            Self::Draft03 | Self::Draft201909 | Self::Draft202012 => None,
        }
    }
}

impl fmt::Display for SchemaDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Draft03 => "draft-03",
            Self::Draft04 => "draft-04",
            Self::Draft05 => "draft-05",
            Self::Draft06 => "draft-06",
            Self::Draft07 => "draft-07",
            Self::Draft201909 => "2019-09",
            Self::Draft202012 => "2020-12",
        };
        f.write_str(name)
    }
}

/// Validity Collaborator
pub trait ValidityChecker: Send + Sync {
    /// `Err` carries the rejection reason
    fn check(&self, document: &Value) -> Result<(), String>;
}

/// Accepts every document
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ValidityChecker for AcceptAll {
    fn check(&self, _document: &Value) -> Result<(), String> {
        Ok(())
    }
}

/// Draft detection plus meta-schema compile check
#[derive(Debug, Clone, Copy)]
pub struct MetaSchemaChecker {
    require_schema_keyword: bool,
}

impl Default for MetaSchemaChecker {
    fn default() -> Self {
        Self { require_schema_keyword: true }
    }
}

impl MetaSchemaChecker {
    pub fn new(require_schema_keyword: bool) -> Self {
        Self { require_schema_keyword }
    }

    pub fn from_config(config: &ValidationConfig) -> Box<dyn ValidityChecker> {
        if config.enabled {
            Box::new(Self::new(config.require_schema_keyword))
        } else {
            Box::new(AcceptAll)
        }
    }
}

impl ValidityChecker for MetaSchemaChecker {
    fn check(&self, document: &Value) -> Result<(), String> {
        let mut options = JSONSchema::options();
        match (document.get("$schema"), SchemaDraft::detect(document)) {
            (_, Some(draft)) => match draft.meta_draft() {
                Some(meta) => {
                    options.with_draft(meta);
                }
                None => {
                    debug!(draft = %draft, "No meta-schema available, accepting");
                    return Ok(());
                }
            },
            (Some(other), None) => return Err(format!("unrecognized $schema {}", other)),
            (None, None) if self.require_schema_keyword => {
                return Err("$schema keyword missing".to_string())
            }
            (None, None) => {}
        }

        options
            .compile(document)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
