//! DocKit CLI - index documentation sources and query them

mod mcp;

use clap::{Parser, Subcommand};
use dockit::{Tool, TOOL_LLMTXT};
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

/// DocKit - documentation indexing for LLM agents
#[derive(Parser, Debug)]
#[command(name = "dockit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Print full help with examples (llmtxt)
    #[arg(long)]
    llmtxt: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as MCP (Model Context Protocol) server over stdio
    Mcp,
    /// Index the documents listed in an llms.txt manifest
    Ingest {
        /// Manifest URL
        url: String,

        /// Parallel downloads (1-50)
        #[arg(long, short)]
        concurrency: Option<usize>,
    },
    /// Crawl a documentation website and index its pages
    Scrape {
        /// Page the crawl starts from
        start_url: String,

        /// URL prefix pages must match
        #[arg(long)]
        scope: Option<String>,

        /// Parallel fetches (1-50)
        #[arg(long, short)]
        concurrency: Option<usize>,

        /// Maximum pages to crawl (1-500)
        #[arg(long)]
        max_pages: Option<usize>,
    },
    /// Split a pre-formatted document into categorized files and index them
    Import {
        /// Project name
        name: String,

        /// Document URL or local path
        source: String,

        /// Section separator line
        #[arg(long)]
        marker: Option<String>,

        /// Token budget for merging small categories
        #[arg(long)]
        merge_threshold: Option<usize>,
    },
    /// List indexed documentation sources
    List,
    /// Make a source the active one
    Activate {
        /// Source URL, path, or project name
        identifier: String,
    },
    /// Remove a source and its cache
    Remove {
        /// Source URL, path, or project name
        identifier: String,
    },
    /// Ask a question about the active source
    Query {
        /// Question text
        question: Vec<String>,
    },
    /// Print files of the active source
    Read {
        /// Paths relative to the source's cache directory
        paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    if cli.llmtxt {
        writeln_safe(TOOL_LLMTXT);
        std::process::exit(0);
    }

    let Some(command) = cli.command else {
        eprintln!("Usage: dockit ingest <URL>");
        eprintln!("   or: dockit mcp");
        eprintln!("   or: dockit --help");
        std::process::exit(1);
    };

    let tool = match Tool::builder().build() {
        Ok(tool) => tool,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let output = match command {
        Commands::Mcp => {
            mcp::run_server(tool).await;
            return;
        }
        Commands::Ingest { url, concurrency } => tool.ingest_manifest(&url, concurrency).await,
        Commands::Scrape {
            start_url,
            scope,
            concurrency,
            max_pages,
        } => {
            tool.scrape_site(&start_url, scope.as_deref(), concurrency, max_pages)
                .await
        }
        Commands::Import {
            name,
            source,
            marker,
            merge_threshold,
        } => {
            tool.ingest_document(&name, &source, marker.as_deref(), merge_threshold)
                .await
        }
        Commands::List => tool.list_projects(),
        Commands::Activate { identifier } => tool.set_active(&identifier),
        Commands::Remove { identifier } => tool.remove_project(&identifier),
        Commands::Query { question } => tool.query(&question.join(" ")).await,
        Commands::Read { paths } => tool.read_files(&paths),
    };

    writeln_safe(&output);
    std::process::exit(exit_code(&output));
}

/// Logs go to stderr so stdout stays clean for results and MCP frames
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Operation results that start with `ERROR:` exit non-zero
fn exit_code(output: &str) -> i32 {
    if output.starts_with("ERROR:") {
        1
    } else {
        0
    }
}

/// Write to stdout, exit silently on broken pipe
fn writeln_safe(s: &str) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", s) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        eprintln!("Error writing to stdout: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code("ERROR: Documentation source 'x' not found."), 1);
        assert_eq!(exit_code("Successfully indexed documentation"), 0);
        assert_eq!(exit_code("No documentation sources have been indexed yet."), 0);
    }

    #[test]
    fn test_parse_scrape() {
        let cli = Cli::parse_from([
            "dockit",
            "scrape",
            "https://example.com/docs/",
            "--scope",
            "https://example.com/docs/guide",
            "--max-pages",
            "20",
        ]);
        match cli.command {
            Some(Commands::Scrape {
                start_url,
                scope,
                concurrency,
                max_pages,
            }) => {
                assert_eq!(start_url, "https://example.com/docs/");
                assert_eq!(scope.as_deref(), Some("https://example.com/docs/guide"));
                assert_eq!(concurrency, None);
                assert_eq!(max_pages, Some(20));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_query_joins_words() {
        let cli = Cli::parse_from(["dockit", "query", "how", "do", "I", "log", "in?"]);
        match cli.command {
            Some(Commands::Query { question }) => assert_eq!(question.join(" "), "how do I log in?"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_llmtxt_flag() {
        let cli = Cli::parse_from(["dockit", "--llmtxt"]);
        assert!(cli.llmtxt);
        assert!(cli.command.is_none());
    }
}
