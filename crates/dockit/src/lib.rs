//! DocKit - documentation ingestion and indexing for LLM agents
//!
//! This crate turns remote documentation into a locally cached, queryable
//! corpus: one file per logical document plus a `detailed_index.md` that
//! summarizes every file for downstream retrieval.
//!
//! ## Pipeline
//!
//! - [`manifest`] parses `llms.txt` manifests and picks a [`FetchMode`]
//! - [`Fetcher`] implementations retrieve one unit each: [`DirectFetcher`]
//!   for raw files, [`PageFetcher`] for rendered web pages
//! - [`Crawler`] drives a fetcher over a de-duplicating [`Frontier`] with a
//!   bounded worker pool
//! - [`PathMapper`] maps URLs to paths that never escape the cache root
//! - [`CacheStore`] decides between reuse, index regeneration and rebuild
//! - [`Summarizer`] summarizes documents in rate-limited batches
//! - [`DetailedIndex`] assembles the final artifact
//! - [`Registry`] persists known sources and the active one
//!
//! [`Tool`] exposes the operation surface to a tool-calling host.

pub mod agent;
pub mod cache;
pub mod client;
pub mod config;
mod convert;
pub mod crawler;
mod error;
pub mod extract;
pub mod fetchers;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod manifest;
pub mod paths;
pub mod preformatted;
pub mod registry;
pub mod retry;
pub mod summarizer;
mod tool;
mod types;
pub mod urls;

pub use agent::{ChatQueryAgent, QueryAgent};
pub use cache::CacheStore;
pub use client::{FetchOptions, HttpClient};
pub use config::Config;
pub use convert::html_to_markdown;
pub use crawler::{CrawlOptions, CrawlReport, Crawler, Frontier};
pub use error::{FetchError, IngestError, PathError, RegistryError, SummarizationError};
pub use fetchers::{DirectFetcher, Fetcher, HttpRenderer, PageFetcher, Renderer, RendererKind};
pub use index::DetailedIndex;
pub use ingest::Ingestor;
pub use paths::PathMapper;
pub use registry::{Registry, SourceProject};
pub use retry::RetryPolicy;
pub use summarizer::{ChatSummaryBackend, SummaryBackend, Summarizer};
pub use tool::{
    describe, IngestDocumentArgs, IngestManifestArgs, NoArgs, Operation, ProjectArgs, QueryArgs,
    ReadFilesArgs, ScrapeSiteArgs, Tool, ToolBuilder, DEFAULT_MERGE_THRESHOLD,
    DEFAULT_SECTION_MARKER,
};
pub use types::{
    derive_title, CacheAction, CacheValidity, DocumentRecord, FetchMode, FetchOutcome,
    FetchedDocument, IngestReport, SummaryOutcome, SummaryResult,
};

/// Default User-Agent string
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36 DocKit/0.1";

/// Tool description for LLM consumption
pub const TOOL_DESCRIPTION: &str = r#"Indexes documentation sources and answers questions about them.

- Ingests llms.txt manifests, crawls documentation sites, or splits one large document
- Caches documents locally and skips work when the source is unchanged
- Builds an AI-summarized detailed index per source
- Answers questions and reads files from the active source"#;

/// Extended documentation for LLM consumption (llmtxt)
pub const TOOL_LLMTXT: &str = r#"# DocKit Tool

Indexes documentation into a local cache with a detailed, summarized index,
then answers questions about the active source.

## Operations

### ingest_manifest
Index every document listed in an llms.txt manifest.
- `url` (required): manifest URL (http:// or https://)
- `concurrency` (optional): parallel downloads, 1-50 (default 10)

### scrape_site
Crawl a documentation website that has no llms.txt.
- `start_url` (required): page the crawl starts from
- `scope` (optional): URL prefix pages must match (default: the start URL)
- `concurrency` (optional): parallel fetches, 1-50 (default 10)
- `max_pages` (optional): page cap, 1-500 (default 100)

### ingest_document
Split one pre-formatted document into categorized files.
- `project_name` (required): name for the new project
- `source` (required): http(s) URL or local path
- `section_marker` (optional): separator line (default "==========")
- `merge_threshold` (optional): token budget for merging small categories (default 10000)

### list_projects
List indexed sources; the active one is marked (ACTIVE).

### set_active_project / remove_project
- `identifier` (required): source URL, source path, or project name

### query_docs
- `question` (required): answered from the active source's detailed index

### read_files
- `paths` (required): paths as listed in the detailed index, relative to the
  active source's cache directory. Absolute paths and `..` are rejected.

## Results
Every operation returns text. Failures start with `ERROR:`. Ingestion reports
succeeded/failed/total counts and the success rate.

## Examples

### Index a manifest
```json
{"url": "https://docs.example.com/llms.txt"}
```

### Crawl a site with a narrower scope
```json
{"start_url": "https://example.com/docs/", "scope": "https://example.com/docs/guide", "max_pages": 50}
```

### Read two files
```json
{"paths": ["guide/setup.md", "api/_merged_api.md"]}
```
"#;
