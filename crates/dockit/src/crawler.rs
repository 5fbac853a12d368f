//! Bounded concurrent crawl over a URL frontier
//!
//! The [`Frontier`] is the only shared structure. `push` and `pop` are each
//! a single critical section, so a URL can be queued at most once and is
//! marked visited before it is dispatched. The [`Crawler`] drains the
//! frontier with at most `concurrency` fetches in flight, feeding in-scope
//! links from completed pages back into it.

use crate::fetchers::Fetcher;
use crate::types::{FetchOutcome, FetchedDocument};
use crate::urls::{in_scope, normalize_url};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Default)]
struct FrontierState {
    visited: HashSet<String>,
    queued: HashSet<String>,
    queue: VecDeque<String>,
}

/// Visited set plus to-visit queue
#[derive(Debug, Default)]
pub struct Frontier {
    state: Mutex<FrontierState>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a URL unless it was already queued or visited.
    ///
    /// Returns false for duplicates and for URLs that do not normalize.
    pub fn push(&self, url: &str) -> bool {
        let Some(url) = normalize_url(url) else {
            return false;
        };
        let mut state = self.lock();
        if state.visited.contains(&url) || !state.queued.insert(url.clone()) {
            return false;
        }
        state.queue.push_back(url);
        true
    }

    /// Take the next URL and mark it visited
    pub fn pop(&self) -> Option<String> {
        let mut state = self.lock();
        let url = state.queue.pop_front()?;
        state.queued.remove(&url);
        state.visited.insert(url.clone());
        Some(url)
    }

    pub fn is_visited(&self, url: &str) -> bool {
        normalize_url(url).is_some_and(|u| self.lock().visited.contains(&u))
    }

    pub fn visited_len(&self) -> usize {
        self.lock().visited.len()
    }

    pub fn queued_len(&self) -> usize {
        self.lock().queue.len()
    }
}

/// Crawl parameters
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Maximum fetches in flight
    pub concurrency: usize,
    /// Stop dispatching after this many units
    pub max_units: Option<usize>,
    /// Prefix every discovered link must match
    pub scope: Option<String>,
    /// Queue links found on fetched pages
    pub follow_links: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_units: None,
            scope: None,
            follow_links: true,
        }
    }
}

/// Document retrieved for a dispatched URL
#[derive(Debug, Clone)]
pub struct CrawledPage {
    /// Normalized URL that was dispatched
    pub url: String,
    pub document: FetchedDocument,
}

/// Unit that produced no document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUnit {
    pub url: String,
    pub reason: String,
}

/// Result of a crawl
#[derive(Debug, Default)]
pub struct CrawlReport {
    pub pages: Vec<CrawledPage>,
    /// Fetched but empty (soft 404, too short, binary)
    pub empty: Vec<SkippedUnit>,
    /// Failed after retries, or rejected seeds
    pub failed: Vec<SkippedUnit>,
    /// Size of the visited set at termination
    pub visited: usize,
    /// Units whose fetch completed
    pub processed: usize,
}

impl CrawlReport {
    /// Units attempted, including rejected seeds
    pub fn attempted(&self) -> usize {
        self.pages.len() + self.empty.len() + self.failed.len()
    }
}

/// Drives a [`Fetcher`] over a [`Frontier`] with a bounded worker pool
pub struct Crawler {
    fetcher: Arc<dyn Fetcher>,
    options: CrawlOptions,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn Fetcher>, options: CrawlOptions) -> Self {
        Self { fetcher, options }
    }

    /// Crawl from `seeds` until the frontier is drained or the unit cap is hit
    pub async fn run<I, S>(&self, seeds: I) -> CrawlReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let concurrency = self.options.concurrency.max(1);
        let frontier = Frontier::new();
        let mut report = CrawlReport::default();

        for seed in seeds {
            let seed = seed.as_ref();
            if normalize_url(seed).is_none() {
                warn!(url = seed, "Skipping invalid seed URL");
                report.failed.push(SkippedUnit {
                    url: seed.to_string(),
                    reason: "invalid URL".to_string(),
                });
                continue;
            }
            frontier.push(seed);
        }

        info!(
            fetcher = self.fetcher.name(),
            seeds = frontier.queued_len(),
            concurrency,
            max_units = ?self.options.max_units,
            scope = ?self.options.scope,
            "Starting crawl"
        );

        let mut in_flight = FuturesUnordered::new();
        let mut dispatched = 0usize;

        loop {
            while in_flight.len() < concurrency
                && self.options.max_units.map_or(true, |max| dispatched < max)
            {
                let Some(url) = frontier.pop() else {
                    break;
                };
                dispatched += 1;

                let fetcher = Arc::clone(&self.fetcher);
                in_flight.push(async move {
                    let result = match Url::parse(&url) {
                        Ok(parsed) => tokio::spawn(async move { fetcher.fetch(&parsed).await })
                            .await
                            .map_err(|e| format!("fetch task failed: {}", e))
                            .and_then(|r| r.map_err(|e| e.to_string())),
                        Err(e) => Err(format!("invalid URL: {}", e)),
                    };
                    (url, result)
                });
            }

            // Nothing in flight means nothing left to dispatch
            let Some((url, result)) = in_flight.next().await else {
                break;
            };
            report.processed += 1;

            match result {
                Ok(FetchOutcome::Document(document)) => {
                    if self.options.follow_links {
                        let mut queued = 0;
                        for link in &document.links {
                            let allowed = self
                                .options
                                .scope
                                .as_deref()
                                .map_or(true, |scope| in_scope(link, scope));
                            if allowed && frontier.push(link) {
                                queued += 1;
                            }
                        }
                        debug!(url = %url, links = document.links.len(), queued, "Fetched page");
                    } else {
                        debug!(url = %url, "Fetched document");
                    }
                    report.pages.push(CrawledPage { url, document });
                }
                Ok(FetchOutcome::Empty { reason }) => {
                    debug!(url = %url, %reason, "Empty result");
                    report.empty.push(SkippedUnit { url, reason });
                }
                Err(reason) => {
                    warn!(url = %url, error = %reason, "Fetch failed");
                    report.failed.push(SkippedUnit { url, reason });
                }
            }

            if report.processed % 25 == 0 {
                info!(
                    processed = report.processed,
                    queued = frontier.queued_len(),
                    in_flight = in_flight.len(),
                    "Crawl progress"
                );
            }
        }

        report.visited = frontier.visited_len();
        info!(
            visited = report.visited,
            documents = report.pages.len(),
            empty = report.empty.len(),
            failed = report.failed.len(),
            "Crawl finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory link graph; counts fetches per URL
    struct GraphFetcher {
        graph: HashMap<String, Vec<String>>,
        fetches: Mutex<HashMap<String, usize>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl GraphFetcher {
        fn new(edges: &[(&str, &[&str])]) -> Arc<Self> {
            Arc::new(Self {
                graph: edges
                    .iter()
                    .map(|(from, to)| {
                        (
                            from.to_string(),
                            to.iter().map(|t| t.to_string()).collect(),
                        )
                    })
                    .collect(),
                fetches: Mutex::new(HashMap::new()),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        fn fetch_counts(&self) -> HashMap<String, usize> {
            self.fetches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for GraphFetcher {
        fn name(&self) -> &'static str {
            "graph"
        }

        async fn fetch(&self, url: &Url) -> Result<FetchOutcome, FetchError> {
            let key = url.to_string();
            *self.fetches.lock().unwrap().entry(key.clone()).or_default() += 1;

            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if key.ends_with("/broken") {
                return Err(FetchError::Status { url: key, status: 500 });
            }
            if key.ends_with("/empty") {
                return Ok(FetchOutcome::Empty {
                    reason: "soft 404".to_string(),
                });
            }
            Ok(FetchOutcome::Document(FetchedDocument {
                url: key.clone(),
                title: key.clone(),
                content: format!("content of {}", key),
                links: self.graph.get(&key).cloned().unwrap_or_default(),
            }))
        }
    }

    /// Cyclic graph with fragment, query and trailing-slash variants
    fn site() -> Arc<GraphFetcher> {
        GraphFetcher::new(&[
            (
                "https://site.test/docs",
                &[
                    "https://site.test/docs/a",
                    "https://site.test/docs/b/",
                    "https://site.test/docs/a#intro",
                    "https://site.test/blog/post",
                    "https://other.test/docs/x",
                ],
            ),
            (
                "https://site.test/docs/a",
                &[
                    "https://site.test/docs",
                    "https://site.test/docs/b?tab=1",
                    "https://site.test/docs/c",
                    "https://site.test/docs/broken",
                ],
            ),
            (
                "https://site.test/docs/b",
                &["https://site.test/docs/a/", "https://site.test/docs/empty"],
            ),
            ("https://site.test/docs/c", &["https://site.test/docs/c#top"]),
        ])
    }

    fn scoped(concurrency: usize) -> CrawlOptions {
        CrawlOptions {
            concurrency,
            scope: Some("https://site.test/docs".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_terminates_without_duplicates_for_any_pool_size() {
        for concurrency in [1, 2, 4, 16] {
            let fetcher = site();
            let crawler = Crawler::new(fetcher.clone(), scoped(concurrency));
            let report = crawler.run(["https://site.test/docs/"]).await;

            assert_eq!(report.visited, report.processed, "concurrency {}", concurrency);
            assert_eq!(report.processed, 6, "concurrency {}", concurrency);
            assert_eq!(report.pages.len(), 4);
            assert_eq!(report.empty.len(), 1);
            assert_eq!(report.failed.len(), 1);

            let counts = fetcher.fetch_counts();
            assert_eq!(counts.len(), 6);
            assert!(counts.values().all(|&n| n == 1), "{:?}", counts);
        }
    }

    #[tokio::test]
    async fn test_scope_enforced_on_discovered_links() {
        let fetcher = site();
        let report = Crawler::new(fetcher.clone(), scoped(4))
            .run(["https://site.test/docs"])
            .await;
        let counts = fetcher.fetch_counts();
        assert!(!counts.contains_key("https://site.test/blog/post"));
        assert!(!counts.contains_key("https://other.test/docs/x"));
        assert!(report
            .pages
            .iter()
            .all(|p| p.url.starts_with("https://site.test/docs")));
    }

    #[tokio::test]
    async fn test_max_units_cap() {
        let fetcher = site();
        let options = CrawlOptions {
            max_units: Some(3),
            ..scoped(2)
        };
        let report = Crawler::new(fetcher.clone(), options)
            .run(["https://site.test/docs"])
            .await;
        assert_eq!(report.processed, 3);
        assert_eq!(report.visited, 3);
        assert_eq!(fetcher.fetch_counts().values().sum::<usize>(), 3);
    }

    #[tokio::test]
    async fn test_pool_size_bounds_in_flight() {
        let fetcher = site();
        Crawler::new(fetcher.clone(), scoped(2))
            .run(["https://site.test/docs"])
            .await;
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_seed_list_without_following() {
        let fetcher = site();
        let options = CrawlOptions {
            follow_links: false,
            ..Default::default()
        };
        let report = Crawler::new(fetcher.clone(), options)
            .run([
                "https://site.test/docs/a",
                "https://site.test/docs/a/",
                "https://site.test/docs/c",
                "not a url",
            ])
            .await;
        assert_eq!(report.processed, 2);
        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.attempted(), 3);
    }

    #[test]
    fn test_frontier_check_and_insert() {
        let frontier = Frontier::new();
        assert!(frontier.push("https://site.test/a"));
        assert!(!frontier.push("https://site.test/a/"));
        assert!(!frontier.push("https://site.test/a#x"));
        assert!(!frontier.push("mailto:x@y.z"));

        assert_eq!(frontier.pop().as_deref(), Some("https://site.test/a"));
        assert!(frontier.is_visited("https://site.test/a?q=1"));
        assert!(!frontier.push("https://site.test/a"));
        assert_eq!(frontier.pop(), None);
        assert_eq!(frontier.visited_len(), 1);
    }
}
