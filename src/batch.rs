//! Corpus Harness
//!
//! Discovers schema files, analyzes them on a rayon worker pool and gathers
//! one [`BatchReport`]. Each worker owns the graphs of the document it is
//! analyzing; only the [`Analyzer`] settings are shared.

use anyhow::Context;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::analysis::{AnalysisRecord, Analyzer};
use crate::config::{BatchConfig, OutputFormat};
use crate::error::{DocumentFailure, Result};

/// Directory names never descended into
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target"];

// =============================================================================
// Discovery
// =============================================================================

/// Expand files and directories into the document list.
///
/// Explicit files are taken as given; directories are walked in file-name
/// order and filtered by extension. `limit` caps the total.
pub fn discover(paths: &[PathBuf], config: &BatchConfig) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            anyhow::bail!("No such file or directory: {}", path.display());
        }

        let walker = WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || !SKIP_DIRS.iter().any(|skip| e.file_name() == *skip)
            });

        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
            if entry.file_type().is_file() && has_extension(entry.path(), &config.extensions) {
                files.push(entry.into_path());
            }
        }
    }

    if config.limit > 0 {
        files.truncate(config.limit);
    }
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

// =============================================================================
// Report
// =============================================================================

/// A document that produced no record
#[derive(Debug, Clone, Serialize)]
pub struct FailedDocument {
    pub filename: String,
    pub message: String,
    #[serde(flatten)]
    pub failure: DocumentFailure,
}

/// Aggregate result of one corpus run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub documents: usize,
    /// In input order
    pub succeeded: Vec<AnalysisRecord>,
    pub failed: Vec<FailedDocument>,
}

impl BatchReport {
    fn collect(outcomes: Vec<(String, std::result::Result<AnalysisRecord, DocumentFailure>)>) -> Self {
        let documents = outcomes.len();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        for (filename, outcome) in outcomes {
            match outcome {
                Ok(record) => succeeded.push(record),
                Err(failure) => failed.push(FailedDocument {
                    filename,
                    message: failure.to_string(),
                    failure,
                }),
            }
        }

        Self { generated_at: Utc::now(), documents, succeeded, failed }
    }

    pub fn to_json(&self, format: OutputFormat) -> serde_json::Result<String> {
        match format {
            OutputFormat::Pretty => serde_json::to_string_pretty(self),
            OutputFormat::Compact => serde_json::to_string(self),
        }
    }

    pub fn write(&self, path: &Path, format: OutputFormat) -> anyhow::Result<()> {
        let json = self.to_json(format)?;
        fs::write(path, json).with_context(|| format!("Failed to write report to {}", path.display()))
    }
}

// =============================================================================
// Run
// =============================================================================

/// Analyze `files` on `workers` threads
pub fn run(analyzer: &Analyzer, files: &[PathBuf], workers: usize) -> Result<BatchReport> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("schema-metrics-{}", i))
        .build()?;

    info!(documents = files.len(), workers, "Analyzing corpus");

    let outcomes = pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                let filename = path.display().to_string();
                let outcome = analyze_file(analyzer, &filename, path);
                if outcome.is_ok() {
                    debug!(document = %filename, "Record ready");
                }
                (filename, outcome)
            })
            .collect::<Vec<_>>()
    });

    let report = BatchReport::collect(outcomes);
    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "Corpus analyzed"
    );
    Ok(report)
}

fn analyze_file(
    analyzer: &Analyzer,
    filename: &str,
    path: &Path,
) -> std::result::Result<AnalysisRecord, DocumentFailure> {
    let bytes = fs::read(path).map_err(|e| DocumentFailure::Parse {
        reason: format!("unreadable file: {}", e),
    })?;
    analyzer.analyze_bytes(filename, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::NoFetch;
    use crate::validity::AcceptAll;

    fn corpus() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.json"), r#"{"type": "string"}"#).unwrap();
        fs::write(dir.path().join("a.json"), r##"{"items": {"$ref": "#/nowhere"}}"##).unwrap();
        fs::write(dir.path().join("notes.txt"), "not a schema").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/c.JSON"), r#"{"type": "object"}"#).unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/d.json"), "{}").unwrap();
        dir
    }

    fn names(files: &[PathBuf], root: &Path) -> Vec<String> {
        files
            .iter()
            .map(|f| f.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_discover_filters_and_orders() {
        let dir = corpus();
        let files = discover(&[dir.path().to_path_buf()], &BatchConfig::default()).unwrap();
        assert_eq!(names(&files, dir.path()), vec!["a.json", "b.json", "nested/c.JSON"]);

        let limited = BatchConfig { limit: 2, ..BatchConfig::default() };
        let files = discover(&[dir.path().to_path_buf()], &limited).unwrap();
        assert_eq!(files.len(), 2);

        let explicit = discover(&[dir.path().join("notes.txt")], &BatchConfig::default()).unwrap();
        assert_eq!(explicit.len(), 1);

        assert!(discover(&[dir.path().join("missing")], &BatchConfig::default()).is_err());
    }

    #[test]
    fn test_run_keeps_input_order() {
        let dir = corpus();
        let files = discover(&[dir.path().to_path_buf()], &BatchConfig::default()).unwrap();
        let analyzer = Analyzer::new(Box::new(NoFetch), Box::new(AcceptAll));

        let report = run(&analyzer, &files, 2).unwrap();
        assert_eq!(report.documents, 3);
        assert_eq!(report.succeeded.len(), 2);
        assert!(report.succeeded[0].filename.ends_with("b.json"));
        assert!(report.succeeded[1].filename.ends_with("c.JSON"));

        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].filename.ends_with("a.json"));
        assert_eq!(report.failed[0].failure.kind(), "reference");
    }

    #[test]
    fn test_report_written() {
        let dir = corpus();
        let analyzer = Analyzer::new(Box::new(NoFetch), Box::new(AcceptAll));
        let report = run(&analyzer, &[dir.path().join("b.json")], 1).unwrap();

        let out = dir.path().join("report.json");
        report.write(&out, OutputFormat::Compact).unwrap();
        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written["documents"], 1);
        assert_eq!(written["succeeded"][0]["width"], 1);
        assert!(written["generated_at"].is_string());
        assert!(written["failed"].as_array().unwrap().is_empty());
    }
}
