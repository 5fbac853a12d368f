//! Tool builder and operation surface for DocKit
//!
//! Every operation returns plain text: a success description, or a message
//! prefixed with `ERROR:`. Nothing here panics or returns `Err` to the host.

use crate::agent::{ChatQueryAgent, QueryAgent};
use crate::config::Config;
use crate::error::IngestError;
use crate::fetchers::Renderer;
use crate::ingest::Ingestor;
use crate::llm::ChatClient;
use crate::paths::resolve;
use crate::registry::Registry;
use crate::summarizer::SummaryBackend;
use crate::types::{CacheAction, IngestReport};
use crate::{TOOL_DESCRIPTION, TOOL_LLMTXT};
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::io;
use std::sync::Arc;
use tracing::{info, warn};

/// Default line separating sections of a pre-formatted document
pub const DEFAULT_SECTION_MARKER: &str = "==========";

/// Default token budget under which a category is merged into one file
pub const DEFAULT_MERGE_THRESHOLD: usize = 10_000;

/// Arguments of `ingest_manifest`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IngestManifestArgs {
    /// URL of an llms.txt manifest
    pub url: String,
    /// Parallel downloads (1-50, default 10)
    #[serde(default)]
    pub concurrency: Option<usize>,
}

/// Arguments of `scrape_site`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScrapeSiteArgs {
    /// Page the crawl starts from
    pub start_url: String,
    /// URL prefix every crawled page must start with (defaults to the start URL)
    #[serde(default)]
    pub scope: Option<String>,
    /// Parallel page fetches (1-50, default 10)
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Maximum pages to fetch (1-500, default 100)
    #[serde(default)]
    pub max_pages: Option<usize>,
}

/// Arguments of `ingest_document`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IngestDocumentArgs {
    /// Name of the project to create
    pub project_name: String,
    /// http(s) URL or local path of the document
    pub source: String,
    /// Line that separates sections (default "==========")
    #[serde(default)]
    pub section_marker: Option<String>,
    /// Categories with at most this many estimated tokens are merged (default 10000)
    #[serde(default)]
    pub merge_threshold: Option<usize>,
}

/// Arguments naming a registered source
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectArgs {
    /// Source URL, local source path, or project name
    pub identifier: String,
}

/// Arguments of `query_docs`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryArgs {
    /// Question about the active documentation
    pub question: String,
}

/// Arguments of `read_files`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadFilesArgs {
    /// Paths relative to the active project's cache directory
    pub paths: Vec<String>,
}

/// Arguments of `list_projects`
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NoArgs {}

/// Operations exposed to a tool-calling host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    IngestManifest,
    ScrapeSite,
    IngestDocument,
    ListProjects,
    SetActive,
    RemoveProject,
    Query,
    ReadFiles,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::IngestManifest,
        Operation::ScrapeSite,
        Operation::IngestDocument,
        Operation::ListProjects,
        Operation::SetActive,
        Operation::RemoveProject,
        Operation::Query,
        Operation::ReadFiles,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::IngestManifest => "ingest_manifest",
            Operation::ScrapeSite => "scrape_site",
            Operation::IngestDocument => "ingest_document",
            Operation::ListProjects => "list_projects",
            Operation::SetActive => "set_active_project",
            Operation::RemoveProject => "remove_project",
            Operation::Query => "query_docs",
            Operation::ReadFiles => "read_files",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Operation::IngestManifest => {
                "Index the documents listed in an llms.txt manifest and make it the active source. \
                 Unchanged manifests are served from cache."
            }
            Operation::ScrapeSite => {
                "Crawl a documentation website that has no llms.txt, index the pages and make it the active source."
            }
            Operation::IngestDocument => {
                "Split one large pre-formatted document into categorized files, index them and make it the active source."
            }
            Operation::ListProjects => "List indexed documentation sources and show which one is active.",
            Operation::SetActive => "Make an indexed documentation source the active one for queries.",
            Operation::RemoveProject => "Remove an indexed documentation source and delete its cache.",
            Operation::Query => "Answer a question using the active documentation source.",
            Operation::ReadFiles => {
                "Read files of the active documentation source by their paths in the detailed index."
            }
        }
    }

    /// JSON schema of the operation's arguments
    pub fn input_schema(self) -> serde_json::Value {
        let schema = match self {
            Operation::IngestManifest => schema_for!(IngestManifestArgs),
            Operation::ScrapeSite => schema_for!(ScrapeSiteArgs),
            Operation::IngestDocument => schema_for!(IngestDocumentArgs),
            Operation::ListProjects => schema_for!(NoArgs),
            Operation::SetActive | Operation::RemoveProject => schema_for!(ProjectArgs),
            Operation::Query => schema_for!(QueryArgs),
            Operation::ReadFiles => schema_for!(ReadFilesArgs),
        };
        serde_json::to_value(schema).unwrap_or_default()
    }
}

/// Builder for configuring the DocKit tool
#[derive(Default)]
pub struct ToolBuilder {
    config: Option<Config>,
    summary_backend: Option<Arc<dyn SummaryBackend>>,
    query_agent: Option<Arc<dyn QueryAgent>>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl ToolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this configuration instead of the environment
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn summary_backend(mut self, backend: Arc<dyn SummaryBackend>) -> Self {
        self.summary_backend = Some(backend);
        self
    }

    pub fn query_agent(mut self, agent: Arc<dyn QueryAgent>) -> Self {
        self.query_agent = Some(agent);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Open the registry and build the tool
    pub fn build(self) -> Result<Tool, IngestError> {
        let config = match self.config {
            Some(config) => config,
            None => Config::from_env()?,
        };
        let registry = Arc::new(Registry::open(&config.cache_dir)?);
        let mut ingestor = Ingestor::new(config, Arc::clone(&registry))?;
        if let Some(backend) = self.summary_backend {
            ingestor = ingestor.with_summary_backend(backend);
        }
        if let Some(renderer) = self.renderer {
            ingestor = ingestor.with_renderer(renderer);
        }
        Ok(Tool {
            ingestor,
            registry,
            query_agent: self.query_agent,
        })
    }
}

/// Configured DocKit tool
pub struct Tool {
    ingestor: Ingestor,
    registry: Arc<Registry>,
    query_agent: Option<Arc<dyn QueryAgent>>,
}

impl Tool {
    pub fn builder() -> ToolBuilder {
        ToolBuilder::new()
    }

    pub fn description(&self) -> &'static str {
        TOOL_DESCRIPTION
    }

    /// Full documentation (llmtxt)
    pub fn llmtxt(&self) -> &'static str {
        TOOL_LLMTXT
    }

    pub fn config(&self) -> &Config {
        self.ingestor.config()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Dispatch an operation by name with JSON arguments
    pub async fn call(&self, name: &str, arguments: serde_json::Value) -> String {
        let Some(op) = Operation::from_name(name) else {
            return error(format!("Unknown operation: {}", name));
        };
        let arguments = if arguments.is_null() {
            serde_json::json!({})
        } else {
            arguments
        };
        info!(operation = name, "Operation called");

        match op {
            Operation::IngestManifest => match parse::<IngestManifestArgs>(arguments) {
                Ok(args) => self.ingest_manifest(&args.url, args.concurrency).await,
                Err(e) => e,
            },
            Operation::ScrapeSite => match parse::<ScrapeSiteArgs>(arguments) {
                Ok(args) => {
                    self.scrape_site(&args.start_url, args.scope.as_deref(), args.concurrency, args.max_pages)
                        .await
                }
                Err(e) => e,
            },
            Operation::IngestDocument => match parse::<IngestDocumentArgs>(arguments) {
                Ok(args) => {
                    self.ingest_document(
                        &args.project_name,
                        &args.source,
                        args.section_marker.as_deref(),
                        args.merge_threshold,
                    )
                    .await
                }
                Err(e) => e,
            },
            Operation::ListProjects => self.list_projects(),
            Operation::SetActive => match parse::<ProjectArgs>(arguments) {
                Ok(args) => self.set_active(&args.identifier),
                Err(e) => e,
            },
            Operation::RemoveProject => match parse::<ProjectArgs>(arguments) {
                Ok(args) => self.remove_project(&args.identifier),
                Err(e) => e,
            },
            Operation::Query => match parse::<QueryArgs>(arguments) {
                Ok(args) => self.query(&args.question).await,
                Err(e) => e,
            },
            Operation::ReadFiles => match parse::<ReadFilesArgs>(arguments) {
                Ok(args) => self.read_files(&args.paths),
                Err(e) => e,
            },
        }
    }

    pub async fn ingest_manifest(&self, url: &str, concurrency: Option<usize>) -> String {
        let concurrency = concurrency.unwrap_or(self.config().concurrency.max(1));
        match self.ingestor.ingest_manifest(url, concurrency).await {
            Ok(report) => describe(&report),
            Err(e) => error(e),
        }
    }

    pub async fn scrape_site(
        &self,
        start_url: &str,
        scope: Option<&str>,
        concurrency: Option<usize>,
        max_pages: Option<usize>,
    ) -> String {
        let concurrency = concurrency.unwrap_or(self.config().concurrency.max(1));
        match self
            .ingestor
            .ingest_site(start_url, scope, concurrency, max_pages)
            .await
        {
            Ok(report) => describe(&report),
            Err(e) => error(e),
        }
    }

    pub async fn ingest_document(
        &self,
        project_name: &str,
        source: &str,
        section_marker: Option<&str>,
        merge_threshold: Option<usize>,
    ) -> String {
        let marker = section_marker.unwrap_or(DEFAULT_SECTION_MARKER);
        let threshold = merge_threshold.unwrap_or(DEFAULT_MERGE_THRESHOLD);
        match self
            .ingestor
            .ingest_preformatted(project_name, source, marker, threshold)
            .await
        {
            Ok(report) => describe(&report),
            Err(e) => error(e),
        }
    }

    pub fn list_projects(&self) -> String {
        let projects = self.registry.list();
        if projects.is_empty() {
            return "No documentation sources have been indexed yet. Use 'ingest_manifest', \
                    'scrape_site' or 'ingest_document' to add sources."
                .to_string();
        }
        let active = self.registry.active_id();
        let mut lines = vec![
            "Indexed Documentation Sources:".to_string(),
            "=".repeat(40),
        ];
        for project in projects {
            let status = if active.as_deref() == Some(project.id.as_str()) {
                " (ACTIVE)"
            } else {
                ""
            };
            lines.push(format!("• Source: {}{}", project.id, status));
            lines.push(format!("  Project: {}", project.name));
            lines.push(format!("  Documents: {}", project.documents));
            lines.push(format!("  Cache: {}", project.cache_dir.display()));
            lines.push(String::new());
        }
        lines.join("\n")
    }

    pub fn set_active(&self, identifier: &str) -> String {
        match self.registry.set_active(identifier) {
            Ok(project) => format!(
                "Set active documentation source to: {} (Project: '{}')",
                project.id, project.name
            ),
            Err(crate::error::RegistryError::UnknownProject(_)) => {
                error(self.unknown_source(identifier))
            }
            Err(e) => error(e),
        }
    }

    pub fn remove_project(&self, identifier: &str) -> String {
        match self.registry.remove(identifier) {
            Ok(project) => format!(
                "Removed documentation source: {} (Project: '{}'). Deleted cache directory {}.",
                project.id,
                project.name,
                project.cache_dir.display()
            ),
            Err(crate::error::RegistryError::UnknownProject(_)) => {
                error(self.unknown_source(identifier))
            }
            Err(e) => error(e),
        }
    }

    pub async fn query(&self, question: &str) -> String {
        if question.trim().is_empty() {
            return error("Question must not be empty");
        }
        let Some(project) = self.registry.active() else {
            return error(
                "No active documentation source. Index one or choose one with 'set_active_project'.",
            );
        };
        let index = match project.read_index() {
            Ok(index) => index,
            Err(e) => {
                return error(format!(
                    "Detailed index for '{}' is unavailable: {}. Re-run ingestion to rebuild it.",
                    project.name, e
                ))
            }
        };

        let agent = match self.query_agent() {
            Ok(agent) => agent,
            Err(e) => return error(e),
        };
        match agent.answer(&project, &index, question).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(project = %project.name, error = %e, "Query failed");
                error(format!("Query failed: {}", e))
            }
        }
    }

    /// Read files of the active project; each path yields its own block
    pub fn read_files(&self, paths: &[String]) -> String {
        let Some(project) = self.registry.active() else {
            return error("No active documentation source.");
        };
        if paths.is_empty() {
            return error("No file paths given.");
        }
        let root = match project.cache_dir.canonicalize() {
            Ok(root) => root,
            Err(e) => return error(format!("Cache directory unavailable: {}", e)),
        };

        paths
            .iter()
            .map(|path| match read_within(&root, path) {
                Ok(content) => format!("=== File: {} ===\n{}", path, content),
                Err(reason) => {
                    warn!(path = %path, %reason, "read_files rejected path");
                    format!("=== File: {} ===\nERROR: {}", path, reason)
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn query_agent(&self) -> Result<Arc<dyn QueryAgent>, IngestError> {
        if let Some(agent) = &self.query_agent {
            return Ok(Arc::clone(agent));
        }
        let config = self.config();
        let key = config.require_api_key()?;
        let client = ChatClient::new(&config.base_url, key, &config.agent_model)
            .map_err(|e| IngestError::Configuration(e.to_string()))?;
        Ok(Arc::new(ChatQueryAgent::new(client)))
    }

    fn unknown_source(&self, identifier: &str) -> String {
        let available: Vec<String> = self.registry.list().into_iter().map(|p| p.id).collect();
        let available = if available.is_empty() {
            "None".to_string()
        } else {
            available.join(", ")
        };
        format!(
            "Documentation source '{}' not found. Available sources: {}",
            identifier, available
        )
    }
}

/// Read `relative` under `root`, refusing anything that resolves outside it
fn read_within(root: &std::path::Path, relative: &str) -> Result<String, String> {
    let path = resolve(root, relative).map_err(|e| e.to_string())?;
    let real = path.canonicalize().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => "File not found".to_string(),
        _ => e.to_string(),
    })?;
    if !real.starts_with(root) {
        return Err("Path resolves outside the documentation directory".to_string());
    }
    if !real.is_file() {
        return Err("Not a file".to_string());
    }
    std::fs::read_to_string(&real).map_err(|e| e.to_string())
}

fn parse<T: serde::de::DeserializeOwned>(arguments: serde_json::Value) -> Result<T, String> {
    serde_json::from_value(arguments).map_err(|e| error(format!("Invalid arguments: {}", e)))
}

fn error(message: impl Display) -> String {
    format!("ERROR: {}", message)
}

/// Success text for an ingestion report
pub fn describe(report: &IngestReport) -> String {
    let head = match report.cache {
        CacheAction::Reused => format!(
            "Documentation already indexed and up to date: {}. Project: '{}' ({} documents).",
            report.source, report.project_name, report.total
        ),
        CacheAction::Regenerated => format!(
            "Regenerated detailed index for {}. Project: '{}' ({} documents, {} summaries generated, {} failed).",
            report.source,
            report.project_name,
            report.total,
            report.summaries_generated,
            report.summaries_failed
        ),
        CacheAction::Rebuilt => {
            let mut text = format!(
                "Successfully indexed documentation from {}. Project: '{}'. \
                 Documents: {} of {} succeeded, {} failed, {} skipped (success rate {:.1}%). \
                 Summaries: {} generated, {} failed.",
                report.source,
                report.project_name,
                report.succeeded,
                report.total,
                report.failed,
                report.skipped,
                report.success_rate(),
                report.summaries_generated,
                report.summaries_failed
            );
            if !report.failures.is_empty() {
                text.push_str(&format!(" Failures: {}.", report.failures.join("; ")));
            }
            text
        }
    };
    format!(
        "{} Cache directory: {}. Set as active documentation source.",
        head,
        report.cache_dir.display()
    )
}
