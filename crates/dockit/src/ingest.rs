//! Ingestion orchestration
//!
//! Each entry point decides from the cache state whether to reuse the
//! project as-is, regenerate only the index, or clear the directory and
//! rebuild it. A rebuild drives a [`Crawler`] to populate the cache, then
//! summarizes every document and writes the detailed index. The completion
//! marker is written last.

use crate::cache::{with_md_extension, CacheStore, FULL_TEXT_FILE, INDEX_FILE, MANIFEST_FILE};
use crate::client::{FetchOptions, HttpClient};
use crate::config::{clamp_concurrency, clamp_max_pages, Config};
use crate::crawler::{CrawlOptions, CrawlReport, Crawler};
use crate::error::IngestError;
use crate::fetchers::{build_renderer, fetcher_for_mode, HttpRenderer, PageFetcher, Renderer};
use crate::index::DetailedIndex;
use crate::llm::ChatClient;
use crate::manifest::{
    content_hash, detect_mode, extract_links, full_text_url, project_name, project_name_from_url,
    render_full_text, render_manifest, sanitize_name, ManifestEntry,
};
use crate::paths::PathMapper;
use crate::preformatted::{consolidate, split_sections};
use crate::registry::{Registry, SourceProject};
use crate::retry::RetryPolicy;
use crate::summarizer::{ChatSummaryBackend, SummaryBackend, Summarizer};
use crate::types::{CacheAction, CacheValidity, DocumentRecord, FetchMode, IngestReport};
use crate::urls::{normalize, normalize_scope, parse_http_url};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Failure messages kept in a report
const MAX_REPORTED_FAILURES: usize = 10;

/// Runs ingestions against one cache root and registry
pub struct Ingestor {
    config: Config,
    cache: CacheStore,
    registry: Arc<Registry>,
    client: HttpClient,
    backend: Option<Arc<dyn SummaryBackend>>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl Ingestor {
    pub fn new(config: Config, registry: Arc<Registry>) -> Result<Self, IngestError> {
        let cache = CacheStore::open(&config.cache_dir)?;
        let options = FetchOptions {
            retry: RetryPolicy::new(RetryPolicy::default().max_retries, config.retry_delay),
            ..FetchOptions::default()
        };
        let client = HttpClient::new(options)
            .map_err(|e| IngestError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            config,
            cache,
            registry,
            client,
            backend: None,
            renderer: None,
        })
    }

    /// Use this summary backend instead of the configured chat service
    pub fn with_summary_backend(mut self, backend: Arc<dyn SummaryBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use this renderer for web pages instead of the configured one
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Ingest the documents listed in a manifest (`llms.txt`)
    pub async fn ingest_manifest(
        &self,
        manifest_url: &str,
        concurrency: usize,
    ) -> Result<IngestReport, IngestError> {
        let url = parse_http_url(manifest_url).ok_or_else(|| {
            IngestError::InvalidInput(format!("not an http(s) URL: {}", manifest_url))
        })?;
        let summarizer = self.summarizer()?;
        let source = url.as_str().to_string();

        info!(source = %source, "Fetching manifest");
        let manifest = self
            .client
            .get_text_with_retry(&url)
            .await
            .map_err(|e| IngestError::SourceUnavailable {
                url: source.clone(),
                source: e,
            })?
            .body;
        let links = extract_links(&manifest, &url);
        if links.is_empty() {
            return Err(IngestError::NoDocuments(source));
        }

        let hash = match self.fetch_full_text(&url).await {
            Some(full) => content_hash(&full),
            None => content_hash(&manifest),
        };
        let name = project_name(&manifest);
        let dir = self.cache.project_dir(&name, &source);
        let validity = self.cache.check_validity(&dir, Some(&hash));
        info!(project = %name, ?validity, dir = %dir.display(), "Cache state");

        if validity == CacheValidity::Fresh {
            if let Some(report) = self
                .reuse_or_regenerate(&source, &name, &dir, &hash, Some(&url), &summarizer)
                .await?
            {
                return Ok(report);
            }
        }

        self.cache.reset(&dir, &source)?;
        self.cache.write_artifact(&dir, MANIFEST_FILE, &manifest)?;

        let mode = detect_mode(&links);
        let renderer = match mode {
            FetchMode::WebPage => self.renderer().await?,
            FetchMode::DirectDownload => self.http_renderer(),
        };
        let fetcher = fetcher_for_mode(mode, &self.client, renderer);
        let options = CrawlOptions {
            concurrency: clamp_concurrency(concurrency),
            max_units: None,
            scope: None,
            follow_links: false,
        };
        info!(project = %name, ?mode, links = links.len(), "Fetching documents");
        let crawl = Crawler::new(fetcher, options).run(&links).await;

        let mapper = PathMapper::new(&url, &dir)?;
        let mut report = IngestReport::new(&source, &name, &dir, CacheAction::Rebuilt);
        report.mode = Some(mode);
        let records = self.store_pages(&dir, &mapper, &crawl, mode, &mut report)?;
        if records.is_empty() {
            warn!(project = %name, "No documents retrieved");
            return Err(IngestError::NoDocuments(source));
        }

        self.finish(&dir, records, &hash, &summarizer, report).await
    }

    /// Crawl a website without a manifest, starting at `start_url`
    pub async fn ingest_site(
        &self,
        start_url: &str,
        scope: Option<&str>,
        concurrency: usize,
        max_pages: Option<usize>,
    ) -> Result<IngestReport, IngestError> {
        let start = parse_http_url(start_url).ok_or_else(|| {
            IngestError::InvalidInput(format!("not an http(s) URL: {}", start_url))
        })?;
        let summarizer = self.summarizer()?;
        let source = start.as_str().to_string();
        let scope = match scope.map(str::trim).filter(|s| !s.is_empty()) {
            Some(scope) => normalize_scope(scope),
            None => normalize(&start),
        };

        let name = project_name_from_url(&start);
        let dir = self.cache.project_dir(&name, &source);
        let validity = self.cache.check_validity(&dir, None);
        info!(project = %name, ?validity, scope = %scope, "Cache state");

        if validity == CacheValidity::Fresh {
            let hash = self
                .cache
                .stored_hash(&dir)
                .unwrap_or_else(|| content_hash(""));
            if let Some(report) = self
                .reuse_or_regenerate(&source, &name, &dir, &hash, Some(&start), &summarizer)
                .await?
            {
                return Ok(report);
            }
        }

        self.cache.reset(&dir, &source)?;
        let renderer = self.renderer().await?;
        let fetcher = Arc::new(PageFetcher::new(renderer, self.client.retry_policy()).with_scope(&scope));
        let options = CrawlOptions {
            concurrency: clamp_concurrency(concurrency),
            max_units: Some(clamp_max_pages(max_pages.unwrap_or(self.config.max_pages))),
            scope: Some(scope),
            follow_links: true,
        };
        info!(project = %name, start = %source, "Scraping site");
        let crawl = Crawler::new(fetcher, options).run([source.as_str()]).await;

        let mapper = PathMapper::new(&start, &dir)?;
        let mut report = IngestReport::new(&source, &name, &dir, CacheAction::Rebuilt);
        report.mode = Some(FetchMode::WebPage);
        let records = self.store_pages(&dir, &mapper, &crawl, FetchMode::WebPage, &mut report)?;
        if records.is_empty() {
            warn!(project = %name, "No pages scraped");
            return Err(IngestError::NoDocuments(source));
        }

        let entries: Vec<ManifestEntry> = records
            .iter()
            .map(|r| ManifestEntry {
                title: r.title.clone(),
                url: r.origin.clone(),
                path: r.path.clone(),
            })
            .collect();
        let full_text = render_full_text(records.iter().map(|r| (r.path.as_str(), r.content.as_str())));
        self.cache
            .write_artifact(&dir, MANIFEST_FILE, &render_manifest(&name, &source, &entries))?;
        self.cache.write_artifact(&dir, FULL_TEXT_FILE, &full_text)?;
        let hash = content_hash(&full_text);

        self.finish(&dir, records, &hash, &summarizer, report).await
    }

    /// Split one pre-formatted document into categorized files and index them
    pub async fn ingest_preformatted(
        &self,
        project: &str,
        source: &str,
        section_marker: &str,
        merge_threshold: usize,
    ) -> Result<IngestReport, IngestError> {
        let name = sanitize_name(project);
        if name.is_empty() {
            return Err(IngestError::InvalidInput(format!("invalid project name: {:?}", project)));
        }
        if section_marker.trim().is_empty() {
            return Err(IngestError::InvalidInput("section marker must not be empty".to_string()));
        }
        let summarizer = self.summarizer()?;
        let (source, text) = self.read_source(source).await?;

        let hash = content_hash(&text);
        let dir = self.cache.project_dir(&name, &source);
        let validity = self.cache.check_validity(&dir, Some(&hash));
        info!(project = %name, ?validity, "Cache state");

        let sections = split_sections(&text, section_marker);
        let records = consolidate(&sections, merge_threshold, &source);
        if records.is_empty() {
            return Err(IngestError::NoDocuments(source));
        }

        if validity == CacheValidity::Fresh && self.cache.has_index(&dir) {
            return self.reuse(&source, &name, &dir, &hash, records.len());
        }

        let action = if validity == CacheValidity::Fresh {
            self.cache.invalidate(&dir)?;
            CacheAction::Regenerated
        } else {
            self.cache.reset(&dir, &source)?;
            CacheAction::Rebuilt
        };
        let mut report = IngestReport::new(&source, &name, &dir, action);
        report.total = records.len();
        report.succeeded = records.len();
        for record in &records {
            self.cache.write_document(&dir, &record.path, &record.content)?;
        }
        info!(
            project = %name,
            sections = sections.len(),
            files = records.len(),
            "Split pre-formatted document"
        );

        self.finish(&dir, records, &hash, &summarizer, report).await
    }

    /// Fresh cache: reuse with an index, regenerate without one.
    ///
    /// Returns `None` when nothing usable is cached and a rebuild is needed.
    async fn reuse_or_regenerate(
        &self,
        source: &str,
        name: &str,
        dir: &Path,
        hash: &str,
        origin_root: Option<&Url>,
        summarizer: &Summarizer,
    ) -> Result<Option<IngestReport>, IngestError> {
        let records = self.cache.load_documents(dir, origin_root);
        if records.is_empty() {
            warn!(project = %name, "Cache marked complete but holds no documents, rebuilding");
            return Ok(None);
        }

        if self.cache.has_index(dir) {
            return self.reuse(source, name, dir, hash, records.len()).map(Some);
        }

        info!(project = %name, documents = records.len(), "Index missing, regenerating");
        self.cache.invalidate(dir)?;
        let mut report = IngestReport::new(source, name, dir, CacheAction::Regenerated);
        report.total = records.len();
        report.succeeded = records.len();
        self.finish(dir, records, hash, summarizer, report)
            .await
            .map(Some)
    }

    fn reuse(
        &self,
        source: &str,
        name: &str,
        dir: &Path,
        hash: &str,
        documents: usize,
    ) -> Result<IngestReport, IngestError> {
        info!(project = %name, documents, "Cache is fresh, reusing");
        self.register(source, name, dir, hash, documents)?;
        let mut report = IngestReport::new(source, name, dir, CacheAction::Reused);
        report.total = documents;
        report.succeeded = documents;
        Ok(report)
    }

    /// Write fetched pages into the cache and turn them into records
    fn store_pages(
        &self,
        dir: &Path,
        mapper: &PathMapper,
        crawl: &CrawlReport,
        mode: FetchMode,
        report: &mut IngestReport,
    ) -> Result<Vec<DocumentRecord>, IngestError> {
        report.total = crawl.attempted();
        report.skipped = crawl.empty.len();
        report.failed = crawl.failed.len();
        report
            .failures
            .extend(crawl.failed.iter().map(|f| format!("{}: {}", f.url, f.reason)));

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(crawl.pages.len());
        for page in &crawl.pages {
            let relative = match mapper.relative_path(&page.url) {
                Ok(relative) => relative,
                Err(e) => {
                    warn!(url = %page.url, error = %e, "Rejected path");
                    report.failed += 1;
                    report.failures.push(format!("{}: {}", page.url, e));
                    continue;
                }
            };
            let relative = match mode {
                FetchMode::WebPage => with_md_extension(&relative),
                FetchMode::DirectDownload => relative,
            };
            if !seen.insert(relative.clone()) {
                warn!(url = %page.url, path = %relative, "Duplicate local path, skipping");
                report.skipped += 1;
                continue;
            }
            if let Err(e) = self.cache.write_document(dir, &relative, &page.document.content) {
                warn!(url = %page.url, path = %relative, error = %e, "Failed to store document");
                report.failed += 1;
                report.failures.push(format!("{}: {}", page.url, e));
                continue;
            }
            records.push(
                DocumentRecord::new(relative, page.url.clone(), page.document.content.clone())
                    .with_title(page.document.title.clone()),
            );
        }
        report.succeeded = records.len();
        report.failures.truncate(MAX_REPORTED_FAILURES);
        Ok(records)
    }

    /// Summarize, write the index, commit and register
    async fn finish(
        &self,
        dir: &Path,
        records: Vec<DocumentRecord>,
        hash: &str,
        summarizer: &Summarizer,
        mut report: IngestReport,
    ) -> Result<IngestReport, IngestError> {
        let summaries = summarizer.summarize_all(&records).await;
        report.summaries_failed = summaries.iter().filter(|s| s.is_error()).count();
        report.summaries_generated = summaries.len() - report.summaries_failed;

        let index = DetailedIndex::build(&records, &summaries);
        self.cache.write_artifact(dir, INDEX_FILE, &index.render())?;
        self.cache.commit(dir, hash)?;
        self.register(&report.source, &report.project_name, dir, hash, index.len())?;

        info!(
            project = %report.project_name,
            documents = index.len(),
            failed = report.failed,
            summaries_failed = report.summaries_failed,
            "Ingestion complete"
        );
        Ok(report)
    }

    fn register(
        &self,
        source: &str,
        name: &str,
        dir: &Path,
        hash: &str,
        documents: usize,
    ) -> Result<(), IngestError> {
        self.registry.upsert(SourceProject {
            id: source.to_string(),
            name: name.to_string(),
            cache_dir: dir.to_path_buf(),
            content_hash: Some(hash.to_string()),
            documents,
        })?;
        Ok(())
    }

    fn summarizer(&self) -> Result<Summarizer, IngestError> {
        let backend = match &self.backend {
            Some(backend) => Arc::clone(backend),
            None => {
                let key = self.config.require_api_key()?;
                let client = ChatClient::new(&self.config.base_url, key, &self.config.summary_model)
                    .map_err(|e| IngestError::Configuration(e.to_string()))?;
                Arc::new(ChatSummaryBackend::new(client)) as Arc<dyn SummaryBackend>
            }
        };
        Ok(Summarizer::new(backend)
            .with_batch_size(self.config.summary_batch_size)
            .with_cooldown(self.config.summary_cooldown))
    }

    async fn renderer(&self) -> Result<Arc<dyn Renderer>, IngestError> {
        match &self.renderer {
            Some(renderer) => Ok(Arc::clone(renderer)),
            None => build_renderer(self.config.renderer, &self.client).await,
        }
    }

    fn http_renderer(&self) -> Arc<dyn Renderer> {
        match &self.renderer {
            Some(renderer) => Arc::clone(renderer),
            None => Arc::new(HttpRenderer::new(self.client.clone())),
        }
    }

    /// Companion full text, when the server has one
    async fn fetch_full_text(&self, manifest_url: &Url) -> Option<String> {
        let full_url = full_text_url(manifest_url)?;
        match self.client.get_text(&full_url).await {
            Ok(response) if !response.body.trim().is_empty() => {
                info!(url = %full_url, "Hashing full-text companion");
                Some(response.body)
            }
            Ok(_) => None,
            Err(e) => {
                info!(url = %full_url, error = %e, "No full-text companion, hashing manifest");
                None
            }
        }
    }

    /// Source identifier and text of a pre-formatted document (URL or local file)
    async fn read_source(&self, source: &str) -> Result<(String, String), IngestError> {
        if let Some(url) = parse_http_url(source) {
            let body = self
                .client
                .get_text_with_retry(&url)
                .await
                .map_err(|e| IngestError::SourceUnavailable {
                    url: url.to_string(),
                    source: e,
                })?
                .body;
            return Ok((url.to_string(), body));
        }

        let path = PathBuf::from(source.trim());
        let path = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| IngestError::InvalidInput(format!("cannot read {}: {}", source, e)))?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| IngestError::InvalidInput(format!("cannot read {}: {}", path.display(), e)))?;
        Ok((path.display().to_string(), text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SummarizationError;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Fixed;

    #[async_trait]
    impl SummaryBackend for Fixed {
        async fn summarize(&self, path: &str, _: &str) -> Result<String, SummarizationError> {
            Ok(format!("about {}", path))
        }
    }

    fn ingestor(tmp: &TempDir, backend: bool) -> Ingestor {
        let mut config = Config::with_cache_dir(tmp.path().join("cache"));
        config.summary_cooldown = std::time::Duration::ZERO;
        let registry = Arc::new(Registry::open(tmp.path().join("cache")).unwrap());
        let ingestor = Ingestor::new(config, registry).unwrap();
        if backend {
            ingestor.with_summary_backend(Arc::new(Fixed))
        } else {
            ingestor
        }
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_up_front() {
        let tmp = TempDir::new().unwrap();
        let ingestor = ingestor(&tmp, false);
        let err = ingestor
            .ingest_manifest("https://unreachable.invalid/llms.txt", 4)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_rejects_non_http_source() {
        let tmp = TempDir::new().unwrap();
        let ingestor = ingestor(&tmp, true);
        let err = ingestor.ingest_manifest("ftp://x.dev/llms.txt", 4).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidInput(_)));
        let err = ingestor.ingest_site("not a url", None, 4, None).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_preformatted_local_file_and_cache_hit() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("reference.txt");
        std::fs::write(
            &source,
            "---\nauth.signIn()\nSigns in.\n---\nauth.signOut()\nSigns out.\n---\ndb.select()\nSelects rows.\n",
        )
        .unwrap();
        let ingestor = ingestor(&tmp, true);

        let report = ingestor
            .ingest_preformatted("Ref Docs", source.to_str().unwrap(), "---", 1000)
            .await
            .unwrap();
        assert_eq!(report.cache, CacheAction::Rebuilt);
        assert_eq!(report.project_name, "Ref_Docs");
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.summaries_generated, 2);

        let index = std::fs::read_to_string(report.cache_dir.join(INDEX_FILE)).unwrap();
        assert!(index.contains("## File: `auth/_merged_auth.md`"));
        assert!(index.contains("  - auth.signIn()\n"));
        assert!(index.contains("about db/_merged_db.md"));

        let again = ingestor
            .ingest_preformatted("Ref Docs", source.to_str().unwrap(), "---", 1000)
            .await
            .unwrap();
        assert_eq!(again.cache, CacheAction::Reused);
        assert_eq!(ingestor.registry().active().unwrap().name, "Ref_Docs");
    }

    #[tokio::test]
    async fn test_preformatted_missing_file() {
        let tmp = TempDir::new().unwrap();
        let ingestor = ingestor(&tmp, true);
        let missing = tmp.path().join("nope.txt");
        let err = ingestor
            .ingest_preformatted("Docs", missing.to_str().unwrap(), "---", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidInput(_)));
    }
}
