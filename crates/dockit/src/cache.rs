//! Per-project cache directories
//!
//! Layout of `<cache_root>/<project>/`:
//! - `.source_url` identifies the source that owns the directory
//! - `.content_hash` holds the hash the cache was built from
//! - `.download_complete` marks a finished ingestion
//! - `_manifest.txt`, `_full.txt` keep the manifest and full text
//! - `detailed_index.md` is the generated index
//! - everything else is a document file, mirroring the source URL layout
//!
//! The completion marker is always written last and removed first, so an
//! interrupted run is seen as absent or stale on the next attempt.

use crate::error::IngestError;
use crate::manifest::{content_hash, extract_links};
use crate::paths::{resolve, PathMapper};
use crate::types::{CacheValidity, DocumentRecord};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;
use walkdir::WalkDir;

pub const COMPLETE_MARKER: &str = ".download_complete";
pub const HASH_FILE: &str = ".content_hash";
pub const SOURCE_FILE: &str = ".source_url";
pub const MANIFEST_FILE: &str = "_manifest.txt";
pub const FULL_TEXT_FILE: &str = "_full.txt";
pub const INDEX_FILE: &str = "detailed_index.md";

/// Files at the top of a project directory that are not documents
const RESERVED_FILES: &[&str] = &[MANIFEST_FILE, FULL_TEXT_FILE, INDEX_FILE];

/// Owns the cache root and every project directory under it
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Open (creating if needed) a cache root; the path must be absolute
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, IngestError> {
        let root = root.into();
        if !root.is_absolute() {
            return Err(IngestError::InvalidInput(format!(
                "cache root must be absolute: {}",
                root.display()
            )));
        }
        fs::create_dir_all(&root).map_err(|e| IngestError::cache(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a project, disambiguated when the plain name belongs to another source
    pub fn project_dir(&self, name: &str, source: &str) -> PathBuf {
        let base = self.root.join(name);
        match read_source(&base) {
            Some(owner) if owner != source => {
                let suffix = &content_hash(source)[..8];
                let dir = self.root.join(format!("{}_{}", name, suffix));
                debug!(
                    project = name,
                    owner = %owner,
                    dir = %dir.display(),
                    "Project name taken by another source"
                );
                dir
            }
            _ => base,
        }
    }

    /// Classify a project directory against the current content hash.
    ///
    /// With no current hash (nothing to compare before a crawl), a complete
    /// directory with a stored hash is fresh.
    pub fn check_validity(&self, dir: &Path, current_hash: Option<&str>) -> CacheValidity {
        if !dir.is_dir() || !dir.join(COMPLETE_MARKER).is_file() {
            return CacheValidity::Absent;
        }
        match fs::read_to_string(dir.join(HASH_FILE)) {
            Ok(stored) => match current_hash {
                Some(current) if stored.trim() != current => CacheValidity::Stale,
                _ => CacheValidity::Fresh,
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => CacheValidity::Stale,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Unreadable cache hash, treating cache as stale");
                CacheValidity::Stale
            }
        }
    }

    /// Whether the index artifact exists
    pub fn has_index(&self, dir: &Path) -> bool {
        dir.join(INDEX_FILE).is_file()
    }

    pub fn read_index(&self, dir: &Path) -> io::Result<String> {
        fs::read_to_string(dir.join(INDEX_FILE))
    }

    pub fn stored_hash(&self, dir: &Path) -> Option<String> {
        fs::read_to_string(dir.join(HASH_FILE))
            .ok()
            .map(|h| h.trim().to_string())
    }

    /// Record a finished ingestion; must run after documents and index are written
    pub fn commit(&self, dir: &Path, hash: &str) -> Result<(), IngestError> {
        write_atomic(&dir.join(HASH_FILE), hash)?;
        write_atomic(&dir.join(COMPLETE_MARKER), "")?;
        info!(dir = %dir.display(), "Cache committed");
        Ok(())
    }

    /// Remove the completion marker and stored hash
    pub fn invalidate(&self, dir: &Path) -> Result<(), IngestError> {
        for name in [COMPLETE_MARKER, HASH_FILE] {
            match fs::remove_file(dir.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(IngestError::cache(dir.join(name), e)),
            }
        }
        debug!(dir = %dir.display(), "Cache invalidated");
        Ok(())
    }

    /// Empty a project directory for a full rebuild and claim it for `source`
    pub fn reset(&self, dir: &Path, source: &str) -> Result<(), IngestError> {
        self.invalidate(dir)?;
        if dir.exists() {
            fs::remove_dir_all(dir).map_err(|e| IngestError::cache(dir, e))?;
        }
        fs::create_dir_all(dir).map_err(|e| IngestError::cache(dir, e))?;
        write_atomic(&dir.join(SOURCE_FILE), source)
    }

    /// Write a project-level file such as the manifest or the index
    pub fn write_artifact(&self, dir: &Path, name: &str, content: &str) -> Result<(), IngestError> {
        write_atomic(&resolve(dir, name)?, content)
    }

    /// Write a document at a relative path inside the project directory
    pub fn write_document(
        &self,
        dir: &Path,
        relative: &str,
        content: &str,
    ) -> Result<PathBuf, IngestError> {
        let path = resolve(dir, relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| IngestError::cache(parent, e))?;
        }
        fs::write(&path, content).map_err(|e| IngestError::cache(&path, e))?;
        Ok(path)
    }

    /// Rebuild document records from files already in the cache.
    ///
    /// Origins come from the saved manifest when it references the file,
    /// otherwise `local://{path}`.
    pub fn load_documents(&self, dir: &Path, source: Option<&Url>) -> Vec<DocumentRecord> {
        let origins = source
            .and_then(|url| {
                let manifest = fs::read_to_string(dir.join(MANIFEST_FILE)).ok()?;
                let mapper = PathMapper::new(url, dir).ok()?;
                Some(manifest_origins(&manifest, url, &mapper))
            })
            .unwrap_or_default();

        let mut records = Vec::new();
        for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(dir) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if relative.starts_with('.')
                || relative.contains("/.")
                || RESERVED_FILES.contains(&relative.as_str())
            {
                continue;
            }
            let content = match fs::read_to_string(entry.path()) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping unreadable cached document");
                    continue;
                }
            };
            let origin = origins
                .get(&relative)
                .cloned()
                .unwrap_or_else(|| format!("local://{}", relative));
            records.push(DocumentRecord::new(relative, origin, content));
        }
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }
}

/// Relative path -> origin URL for every link in a manifest
fn manifest_origins(manifest: &str, url: &Url, mapper: &PathMapper) -> HashMap<String, String> {
    let mut origins = HashMap::new();
    for link in extract_links(manifest, url) {
        if let Ok(relative) = mapper.relative_path(&link) {
            origins.insert(with_md_extension(&relative), link.clone());
            origins.insert(relative, link);
        }
    }
    origins
}

/// Append `.md` unless the path already names a markdown file
pub fn with_md_extension(relative: &str) -> String {
    if relative.ends_with(".md") {
        relative.to_string()
    } else {
        format!("{}.md", relative)
    }
}

/// Source identifier recorded in a project directory
pub fn read_source(dir: &Path) -> Option<String> {
    fs::read_to_string(dir.join(SOURCE_FILE))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Write via a temporary file and rename
fn write_atomic(path: &Path, content: &str) -> Result<(), IngestError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content).map_err(|e| IngestError::cache(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| IngestError::cache(path, e))
}
