//! Detailed index assembly

use crate::types::{DocumentRecord, SummaryResult};
use serde::Serialize;
use std::collections::HashMap;

/// Heading of every rendered index
pub const INDEX_HEADING: &str = "# Detailed Documentation Index";

/// One document paired with its summary
#[derive(Debug, Clone, Serialize)]
pub struct IndexEntry {
    pub path: String,
    pub origin: String,
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<String>,
    pub summary: SummaryResult,
}

/// Path-sorted list of documents and summaries
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetailedIndex {
    pub entries: Vec<IndexEntry>,
}

impl DetailedIndex {
    /// Pair each document with its summary by path, sorted by path.
    ///
    /// Every document appears exactly once; a document without a summary
    /// gets error text instead of being dropped.
    pub fn build(documents: &[DocumentRecord], summaries: &[SummaryResult]) -> Self {
        let by_path: HashMap<&str, &SummaryResult> =
            summaries.iter().map(|s| (s.path.as_str(), s)).collect();

        let mut docs: Vec<&DocumentRecord> = documents.iter().collect();
        docs.sort_by(|a, b| a.path.cmp(&b.path));
        docs.dedup_by(|a, b| a.path == b.path);

        let entries = docs
            .into_iter()
            .map(|doc| {
                let summary = by_path
                    .get(doc.path.as_str())
                    .map(|s| (*s).clone())
                    .unwrap_or_else(|| {
                        SummaryResult::failed(
                            &doc.path,
                            format!("Error: No summary result available for {}", doc.path),
                        )
                    });
                IndexEntry {
                    path: doc.path.clone(),
                    origin: doc.origin.clone(),
                    title: doc.title.clone(),
                    sections: doc.sections.clone(),
                    summary,
                }
            })
            .collect();

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Markdown artifact consumed by the query agent
    pub fn render(&self) -> String {
        let mut out = format!("{}\n\n", INDEX_HEADING);
        for entry in &self.entries {
            out.push_str(&format!("## File: `{}`\n", entry.path));
            out.push_str(&format!("- Original URL: <{}>\n", entry.origin));
            if !entry.sections.is_empty() {
                out.push_str("- Contained sections:\n");
                for section in &entry.sections {
                    out.push_str(&format!("  - {}\n", section));
                }
            }
            out.push('\n');
            out.push_str(entry.summary.text().trim());
            out.push_str("\n\n---\n\n");
        }
        out
    }
}
