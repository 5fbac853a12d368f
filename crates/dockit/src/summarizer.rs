//! Batch summarization of documents
//!
//! Every input document yields exactly one [`SummaryResult`], in input
//! order. Backend failures become error text; they never abort the run.

use crate::error::SummarizationError;
use crate::llm::{ChatClient, ChatMessage};
use crate::types::{DocumentRecord, SummaryResult};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Summary recorded for blank documents
pub const EMPTY_FILE_SUMMARY: &str = "File is empty or contains only whitespace.";

/// Characters of a document sent to the backend
pub const MAX_SUMMARY_INPUT_CHARS: usize = 15_000;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(2);
const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(180);

const SYSTEM_PROMPT: &str = "You are an expert technical writer. Your task is to analyze \
the following markdown document content and provide a structured summary.";

/// External service producing a summary for one document
#[async_trait]
pub trait SummaryBackend: Send + Sync {
    async fn summarize(&self, path: &str, content: &str) -> Result<String, SummarizationError>;
}

/// Summaries through an OpenAI-compatible chat endpoint
pub struct ChatSummaryBackend {
    client: ChatClient,
}

impl ChatSummaryBackend {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SummaryBackend for ChatSummaryBackend {
    async fn summarize(&self, path: &str, content: &str) -> Result<String, SummarizationError> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(summary_prompt(path, content)),
        ];
        self.client.complete(&messages, 0.2).await
    }
}

/// User prompt for one document, content truncated to [`MAX_SUMMARY_INPUT_CHARS`]
pub fn summary_prompt(path: &str, content: &str) -> String {
    let truncated: String = content.chars().take(MAX_SUMMARY_INPUT_CHARS).collect();
    format!(
        "Please analyze the content of the document located at '{path}'.\n\
         Provide the following in markdown format:\n\
         1.  **Overall Summary:** A concise (2-3 sentences) overview of the document's main purpose and key information.\n\
         2.  **Main Topics:** A bulleted list of the primary topics or concepts discussed.\n\
         3.  **Major Sections:** A bulleted list of the most important H1, H2, or H3 level section headings found in the document. If no clear headings, state so.\n\n\
         Content to analyze:\n---\n{truncated}\n---\n"
    )
}

/// Runs a backend over documents in fixed-size batches with a cool-down between batches
pub struct Summarizer {
    backend: Arc<dyn SummaryBackend>,
    batch_size: usize,
    cooldown: Duration,
    item_timeout: Duration,
}

impl Summarizer {
    pub fn new(backend: Arc<dyn SummaryBackend>) -> Self {
        Self {
            backend,
            batch_size: DEFAULT_BATCH_SIZE,
            cooldown: DEFAULT_COOLDOWN,
            item_timeout: DEFAULT_ITEM_TIMEOUT,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Deadline for a single backend call
    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = timeout;
        self
    }

    /// Summarize every document; output length and order match the input
    pub async fn summarize_all(&self, documents: &[DocumentRecord]) -> Vec<SummaryResult> {
        let batches = documents.len().div_ceil(self.batch_size);
        let mut results = Vec::with_capacity(documents.len());

        for (i, batch) in documents.chunks(self.batch_size).enumerate() {
            if i > 0 && !self.cooldown.is_zero() {
                debug!(cooldown_ms = self.cooldown.as_millis() as u64, "Cooling down between summary batches");
                tokio::time::sleep(self.cooldown).await;
            }
            info!(batch = i + 1, batches, size = batch.len(), "Summarizing batch");
            results.extend(join_all(batch.iter().map(|doc| self.summarize_one(doc))).await);
        }

        let failed = results.iter().filter(|r| r.is_error()).count();
        info!(
            total = results.len(),
            failed,
            "Summarization finished"
        );
        results
    }

    async fn summarize_one(&self, doc: &DocumentRecord) -> SummaryResult {
        if doc.content.trim().is_empty() {
            return SummaryResult::summary(&doc.path, EMPTY_FILE_SUMMARY);
        }

        let call = self.backend.summarize(&doc.path, &doc.content);
        let outcome = match tokio::time::timeout(self.item_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SummarizationError::Timeout(self.item_timeout.as_secs())),
        };

        match outcome {
            Ok(text) => SummaryResult::summary(&doc.path, text),
            Err(e) => {
                warn!(path = %doc.path, error = %e, "Summary failed");
                SummaryResult::failed(
                    &doc.path,
                    format!("Error generating summary for {}: {}", doc.path, e),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the path; fails for paths containing "bad"
    struct EchoBackend {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl EchoBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SummaryBackend for EchoBackend {
        async fn summarize(&self, path: &str, _content: &str) -> Result<String, SummarizationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if path.contains("bad") {
                Err(SummarizationError::Api {
                    status: 429,
                    body: "quota".to_string(),
                })
            } else {
                Ok(format!("summary of {}", path))
            }
        }
    }

    fn docs(paths: &[&str]) -> Vec<DocumentRecord> {
        paths
            .iter()
            .map(|p| DocumentRecord::new(*p, format!("https://x.dev/{}", p), format!("# {}\nbody", p)))
            .collect()
    }

    #[tokio::test]
    async fn test_output_matches_input_order_and_length() {
        let backend = EchoBackend::new();
        let summarizer = Summarizer::new(backend.clone())
            .with_batch_size(3)
            .with_cooldown(Duration::ZERO);
        let input = docs(&["e.md", "a.md", "bad.md", "c.md", "b.md", "d.md", "f.md"]);

        let results = summarizer.summarize_all(&input).await;
        assert_eq!(results.len(), input.len());
        for (doc, result) in input.iter().zip(&results) {
            assert_eq!(doc.path, result.path);
        }
        assert_eq!(results[0].text(), "summary of e.md");
        assert!(results[2].is_error());
        assert!(results[2]
            .text()
            .starts_with("Error generating summary for bad.md: "));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 7);
        assert!(backend.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_empty_documents_skip_backend() {
        let backend = EchoBackend::new();
        let summarizer = Summarizer::new(backend.clone()).with_cooldown(Duration::ZERO);
        let input = vec![
            DocumentRecord::new("blank.md", "local://blank.md", "  \n\t"),
            DocumentRecord::new("a.md", "local://a.md", "# A"),
        ];

        let results = summarizer.summarize_all(&input).await;
        assert_eq!(results[0].text(), EMPTY_FILE_SUMMARY);
        assert!(!results[0].is_error());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_backend_times_out_per_item() {
        struct Slow;

        #[async_trait]
        impl SummaryBackend for Slow {
            async fn summarize(&self, _: &str, _: &str) -> Result<String, SummarizationError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("late".to_string())
            }
        }

        let summarizer = Summarizer::new(Arc::new(Slow))
            .with_cooldown(Duration::ZERO)
            .with_item_timeout(Duration::from_millis(20));
        let results = summarizer.summarize_all(&docs(&["a.md"])).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error());
    }

    #[tokio::test]
    async fn test_no_documents() {
        let summarizer = Summarizer::new(EchoBackend::new());
        assert!(summarizer.summarize_all(&[]).await.is_empty());
    }

    #[test]
    fn test_prompt_truncates_content() {
        let long = "x".repeat(MAX_SUMMARY_INPUT_CHARS + 500);
        let prompt = summary_prompt("guide/a.md", &long);
        assert!(prompt.contains("'guide/a.md'"));
        assert_eq!(prompt.matches('x').count(), MAX_SUMMARY_INPUT_CHARS + prompt_x_overhead());
    }

    /// Count of `x` characters in the fixed prompt text
    fn prompt_x_overhead() -> usize {
        summary_prompt("", "").matches('x').count()
    }
}
