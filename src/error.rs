//! Error types for the analyzer

use serde::Serialize;
use thiserror::Error;

use crate::fetch::FetchError;
use crate::graph::{identity::identity_target, FailureCause, ReferenceFailure};

/// Result type for analyzer operations
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Analyzer errors
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("Invalid counter pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

/// Why one document produced no record.
///
/// Failures stay with their document; the batch continues.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentFailure {
    #[error("Unparsable document: {reason}")]
    Parse { reason: String },

    #[error("Invalid according to validator: {reason}")]
    Validation { reason: String },

    #[error("Unclassifiable JSON shape at {path}")]
    Structural { path: String },

    #[error("Contains {} invalid reference(s)", .unresolved.len())]
    Reference { unresolved: Vec<ReferenceFailure> },

    #[error("Remote document unavailable at {url}: {reason}")]
    Fetch { url: String, reason: String },
}

impl DocumentFailure {
    /// Most specific classification for a set of unresolved references
    pub fn from_references(unresolved: &[ReferenceFailure]) -> Self {
        match unresolved {
            [first, ..] if unresolved.iter().all(ReferenceFailure::is_fetch_failure) => {
                let reason = match &first.cause {
                    FailureCause::FetchFailed(reason) => reason.clone(),
                    other => other.to_string(),
                };
                Self::Fetch {
                    url: identity_target(&first.identity).to_string(),
                    reason,
                }
            }
            _ => Self::Reference { unresolved: unresolved.to_vec() },
        }
    }

    /// Short label for logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::Validation { .. } => "validation",
            Self::Structural { .. } => "structural",
            Self::Reference { .. } => "reference",
            Self::Fetch { .. } => "fetch",
        }
    }
}
