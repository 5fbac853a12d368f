//! Mapping of source URLs to local paths under a cache root
//!
//! Every file the pipeline writes goes through [`PathMapper::local_path`] or
//! [`resolve`]. Both are pure: they never touch the filesystem, and they
//! refuse any relative path that could land outside the cache root.

use crate::error::PathError;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// File name used for a target that maps to the domain root
pub const ROOT_SENTINEL: &str = "_root_index.md";

/// Maps target URLs to paths relative to a root reference URL
#[derive(Debug, Clone)]
pub struct PathMapper {
    root: Url,
    root_dir: String,
    cache_root: PathBuf,
}

impl PathMapper {
    /// Create a mapper for documents referenced from `root`.
    ///
    /// `cache_root` must be absolute.
    pub fn new(root: &Url, cache_root: impl Into<PathBuf>) -> Result<Self, PathError> {
        let cache_root = cache_root.into();
        if !cache_root.is_absolute() {
            return Err(PathError::invalid(
                cache_root.display().to_string(),
                "cache root must be absolute",
            ));
        }
        Ok(Self {
            root: root.clone(),
            root_dir: parent_dir(root.path()).to_string(),
            cache_root,
        })
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Relative, `/`-separated path for a target URL.
    ///
    /// Same-host targets under the root URL's directory lose that prefix.
    /// Cross-host targets use their own path.
    pub fn relative_path(&self, target: &str) -> Result<String, PathError> {
        if has_parent_segment(target) {
            return Err(PathError::invalid(target, "parent directory segment"));
        }
        let url = self
            .root
            .join(target.trim())
            .map_err(|_| PathError::invalid(target, "unparseable URL"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PathError::invalid(target, "unsupported scheme"));
        }

        let path = url.path();
        let same_host = url.host_str() == self.root.host_str()
            && url.port_or_known_default() == self.root.port_or_known_default();
        let relative = if same_host && self.root_dir != "/" {
            strip_dir_prefix(path, &self.root_dir).unwrap_or(path)
        } else {
            path
        };

        let relative = relative.trim_matches('/');
        if relative.is_empty() {
            return Ok(ROOT_SENTINEL.to_string());
        }
        validate_relative(relative)
    }

    /// Absolute path under the cache root for a target URL
    pub fn local_path(&self, target: &str) -> Result<PathBuf, PathError> {
        let relative = self.relative_path(target)?;
        resolve(&self.cache_root, &relative)
    }
}

/// One-shot form of [`PathMapper::local_path`]
pub fn map_url(root: &Url, target: &str, cache_root: &Path) -> Result<PathBuf, PathError> {
    PathMapper::new(root, cache_root)?.local_path(target)
}

/// Join a caller-supplied relative path onto `root`, rejecting escapes
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf, PathError> {
    let relative = validate_relative(relative)?;
    let joined = relative
        .split('/')
        .fold(root.to_path_buf(), |acc, part| acc.join(part));

    // Lexical check after normalization
    let inside = joined
        .strip_prefix(root)
        .map_err(|_| PathError::invalid(relative.clone(), "resolves outside the cache root"))?;
    let mut depth = 0usize;
    for component in inside.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            _ => return Err(PathError::invalid(relative, "resolves outside the cache root")),
        }
    }
    if depth == 0 {
        return Err(PathError::invalid(relative, "empty path"));
    }
    Ok(joined)
}

/// Normalize a relative path to `/`-separated form and reject escapes
pub fn validate_relative(relative: &str) -> Result<String, PathError> {
    let trimmed = relative.trim();
    if trimmed.is_empty() {
        return Err(PathError::invalid(relative, "empty path"));
    }
    if trimmed.contains('\0') {
        return Err(PathError::invalid(relative, "NUL byte"));
    }
    if trimmed.starts_with('/')
        || trimmed.starts_with('\\')
        || Path::new(trimmed).is_absolute()
        || has_drive_prefix(trimmed)
    {
        return Err(PathError::invalid(relative, "absolute path"));
    }
    if has_parent_segment(trimmed) {
        return Err(PathError::invalid(relative, "parent directory segment"));
    }

    let parts: Vec<&str> = trimmed
        .split(['/', '\\'])
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    if parts.is_empty() {
        return Err(PathError::invalid(relative, "empty path"));
    }
    Ok(parts.join("/"))
}

fn has_parent_segment(s: &str) -> bool {
    s.split(['/', '\\']).any(|seg| {
        let seg = seg.to_ascii_lowercase();
        seg == ".." || seg == "%2e%2e" || seg == ".%2e" || seg == "%2e."
    })
}

fn has_drive_prefix(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Directory portion of a URL path: `/docs/llms.txt` -> `/docs`
fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Strip `dir` from `path` only on a segment boundary
fn strip_dir_prefix<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(dir)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
