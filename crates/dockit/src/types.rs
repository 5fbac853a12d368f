//! Data types shared across the ingestion pipeline

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cache state of a project directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheValidity {
    /// Completion marker present and the stored hash matches
    Fresh,
    /// Completion marker present but the hash differs, is missing, or is unreadable
    Stale,
    /// No directory or no completion marker
    Absent,
}

/// How the documents of a manifest are retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Links point at raw document files (markdown, text)
    DirectDownload,
    /// Links point at rendered web pages
    WebPage,
}

/// One retrieved document, ready to be written and summarized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Path relative to the project directory, `/` separated
    pub path: String,
    /// Origin URL or local identifier
    pub origin: String,
    /// Document body
    pub content: String,
    /// Derived title
    pub title: String,
    /// Titles of sections merged into this document
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<String>,
}

impl DocumentRecord {
    /// Create a record, deriving the title from the content
    pub fn new(
        path: impl Into<String>,
        origin: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let content = content.into();
        let title = derive_title(&content, &path);
        Self {
            path,
            origin: origin.into(),
            content,
            title,
            sections: Vec::new(),
        }
    }

    /// Override the derived title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Record merged section titles
    pub fn with_sections(mut self, sections: Vec<String>) -> Self {
        self.sections = sections;
        self
    }
}

/// First markdown H1, else the file stem of the path
pub fn derive_title(content: &str, path: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| {
            let file = path.rsplit('/').next().unwrap_or(path);
            file.strip_suffix(".md").unwrap_or(file).to_string()
        })
}

/// Outcome of summarizing a single document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "lowercase")]
pub enum SummaryOutcome {
    Summary(String),
    Failed(String),
}

/// Summary (or error text) for one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    /// Path of the summarized document
    pub path: String,
    pub outcome: SummaryOutcome,
}

impl SummaryResult {
    pub fn summary(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            outcome: SummaryOutcome::Summary(text.into()),
        }
    }

    pub fn failed(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            outcome: SummaryOutcome::Failed(text.into()),
        }
    }

    /// Summary text or error text
    pub fn text(&self) -> &str {
        match &self.outcome {
            SummaryOutcome::Summary(t) | SummaryOutcome::Failed(t) => t,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, SummaryOutcome::Failed(_))
    }
}

/// Content retrieved by a fetcher for one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    /// Final URL after redirects
    pub url: String,
    pub title: String,
    /// Normalized text or markdown body
    pub content: String,
    /// In-scope outbound links, normalized
    pub links: Vec<String>,
}

/// Result of fetching one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Usable content
    Document(FetchedDocument),
    /// Retrieved but not worth keeping (soft 404, too short, blank)
    Empty { reason: String },
}

/// What an ingestion did with the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheAction {
    /// Cache was fresh, nothing fetched or summarized
    Reused,
    /// Documents reused, index regenerated
    Regenerated,
    /// Documents fetched and index built from scratch
    Rebuilt,
}

/// Outcome of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Source identifier (URL or local path)
    pub source: String,
    pub project_name: String,
    pub cache_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<FetchMode>,
    pub cache: CacheAction,
    /// Units attempted
    pub total: usize,
    /// Documents written
    pub succeeded: usize,
    /// Units that failed after retries
    pub failed: usize,
    /// Units skipped as empty or error pages
    pub skipped: usize,
    pub summaries_generated: usize,
    pub summaries_failed: usize,
    /// Sample of per-unit failure messages
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

impl IngestReport {
    /// Empty report for a run over `cache_dir`
    pub fn new(
        source: impl Into<String>,
        project_name: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
        cache: CacheAction,
    ) -> Self {
        Self {
            source: source.into(),
            project_name: project_name.into(),
            cache_dir: cache_dir.into(),
            mode: None,
            cache,
            total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            summaries_generated: 0,
            summaries_failed: 0,
            failures: Vec::new(),
        }
    }

    /// Succeeded units as a percentage of attempted units
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.succeeded as f64 * 100.0 / self.total as f64
        }
    }
}
