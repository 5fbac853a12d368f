//! Manifest (`llms.txt`) parsing and generation

use crate::types::FetchMode;
use crate::urls::{normalize, normalize_url};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use url::Url;

/// Links sampled when choosing the fetch mode
pub const MODE_SAMPLE_SIZE: usize = 10;

/// Extensions that mark a link as a raw document file
const DOCUMENT_EXTENSIONS: &[&str] = &[".md", ".mdx", ".txt", ".rst"];

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*?\]\(([^)\s]+?)(?:\s+[^)]*)?\)").expect("valid regex"));

/// Document links referenced by a manifest, in order, without duplicates.
///
/// Absolute http(s) links are kept. Relative links are kept when they point
/// at a markdown file and are resolved against the manifest URL.
pub fn extract_links(manifest: &str, manifest_url: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    MARKDOWN_LINK
        .captures_iter(manifest)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim()))
        .filter_map(|target| {
            if target.starts_with("http://") || target.starts_with("https://") {
                normalize_url(target)
            } else if !target.starts_with('#') && target.contains(".md") {
                manifest_url.join(target).ok().map(|u| normalize(&u))
            } else {
                None
            }
        })
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

/// Pick direct download when most sampled links name a document file
pub fn detect_mode(links: &[String]) -> FetchMode {
    let sample: Vec<&String> = links.iter().take(MODE_SAMPLE_SIZE).collect();
    if sample.is_empty() {
        return FetchMode::DirectDownload;
    }
    let documents = sample
        .iter()
        .filter(|link| {
            let path = Url::parse(link)
                .map(|u| u.path().to_lowercase())
                .unwrap_or_else(|_| link.to_lowercase());
            DOCUMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        })
        .count();
    if documents * 2 > sample.len() {
        FetchMode::DirectDownload
    } else {
        FetchMode::WebPage
    }
}

/// Project name from the first H1 of a manifest
pub fn project_name(manifest: &str) -> String {
    manifest
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(sanitize_name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown_project".to_string())
}

/// Project name derived from a site URL: `docs.example.com/guide` -> `docs_example_com_guide`
pub fn project_name_from_url(url: &Url) -> String {
    let raw = format!("{}{}", url.host_str().unwrap_or("site"), url.path());
    let name = sanitize_name(&raw.replace(['.', '/'], " "));
    if name.is_empty() {
        "unknown_project".to_string()
    } else {
        name
    }
}

/// Keep word characters, spaces and hyphens; whitespace runs become `_`
pub fn sanitize_name(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .trim_matches(|c| c == '_' || c == '-')
        .to_string()
}

/// Companion full-text URL: `.../llms.txt` -> `.../llms-full.txt`
pub fn full_text_url(manifest_url: &Url) -> Option<Url> {
    let path = manifest_url.path();
    let stem = path.strip_suffix(".txt")?;
    if stem.ends_with("-full") {
        return None;
    }
    let mut url = manifest_url.clone();
    url.set_path(&format!("{}-full.txt", stem));
    url.set_query(None);
    url.set_fragment(None);
    Some(url)
}

/// SHA-256 of `content`, hex encoded
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Entry in a generated manifest
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub title: String,
    pub url: String,
    pub path: String,
}

/// Manifest for a scraped site, links grouped by top-level folder
pub fn render_manifest(name: &str, source: &str, entries: &[ManifestEntry]) -> String {
    let mut groups: BTreeMap<&str, Vec<&ManifestEntry>> = BTreeMap::new();
    for entry in entries {
        let folder = match entry.path.split_once('/') {
            Some((folder, _)) => folder,
            None => "General",
        };
        groups.entry(folder).or_default().push(entry);
    }

    let mut out = format!("# {}\n\n> Documentation scraped from {}\n", name, source);
    for (folder, mut items) in groups {
        items.sort_by(|a, b| a.path.cmp(&b.path));
        out.push_str(&format!("\n## {}\n\n", folder));
        for item in items {
            out.push_str(&format!("- [{}]({})\n", item.title, item.url));
        }
    }
    out
}

/// Concatenation of every scraped document, path-sorted
pub fn render_full_text<'a, I>(documents: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut docs: Vec<(&str, &str)> = documents.into_iter().collect();
    docs.sort_by(|a, b| a.0.cmp(b.0));
    docs.iter()
        .map(|(_, content)| content.trim())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
