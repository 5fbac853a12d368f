//! Persisted registry of ingested documentation sources
//!
//! State lives in `<cache_root>/.dockit_registry.json`. Entries whose cache
//! directory has disappeared are dropped on load and on access; cache
//! directories that carry a `.source_url` marker but are missing from the
//! state file are adopted.

use crate::cache::{read_source, HASH_FILE, INDEX_FILE};
use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use url::Url;

/// File name of the persisted state inside the cache root
pub const STATE_FILE: &str = ".dockit_registry.json";

/// A registered documentation source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProject {
    /// Source identifier (manifest URL, start URL, or preformatted source)
    pub id: String,
    pub name: String,
    pub cache_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub documents: usize,
}

impl SourceProject {
    pub fn index_path(&self) -> PathBuf {
        self.cache_dir.join(INDEX_FILE)
    }

    /// Contents of the detailed index, if present
    pub fn read_index(&self) -> io::Result<String> {
        fs::read_to_string(self.index_path())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryState {
    #[serde(default)]
    projects: BTreeMap<String, SourceProject>,
    #[serde(default)]
    active: Option<String>,
}

impl RegistryState {
    /// Registered key for an identifier: exact match, the parsed URL form, or a project name
    fn resolve_key(&self, id: &str) -> Option<String> {
        let id = id.trim();
        if self.projects.contains_key(id) {
            return Some(id.to_string());
        }
        if let Ok(url) = Url::parse(id) {
            if self.projects.contains_key(url.as_str()) {
                return Some(url.as_str().to_string());
            }
        }
        self.projects
            .values()
            .find(|p| p.name == id)
            .map(|p| p.id.clone())
    }

    /// Drop projects whose directory is gone; true when anything changed
    fn prune_missing(&mut self) -> bool {
        let before = self.projects.len();
        self.projects.retain(|id, project| {
            let keep = project.cache_dir.is_dir();
            if !keep {
                warn!(
                    source = %id,
                    dir = %project.cache_dir.display(),
                    "Cache directory missing, dropping source"
                );
            }
            keep
        });
        let mut changed = self.projects.len() != before;
        if let Some(active) = &self.active {
            if !self.projects.contains_key(active) {
                self.active = None;
                changed = true;
            }
        }
        changed
    }
}

/// Projects known to this process, shared across operations
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    cache_root: PathBuf,
    state: Mutex<RegistryState>,
}

impl Registry {
    /// Load (or start) the registry for a cache root
    pub fn open(cache_root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let cache_root = cache_root.into();
        let path = cache_root.join(STATE_FILE);
        let mut state = load_state(&path);

        let mut changed = state.prune_missing();
        changed |= discover(&cache_root, &mut state);

        let registry = Self {
            path,
            cache_root,
            state: Mutex::new(state),
        };
        if changed {
            registry.persist(&registry.lock())?;
        }
        info!(
            projects = registry.lock().projects.len(),
            "Registry loaded"
        );
        Ok(registry)
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Add or replace a project and make it active
    pub fn upsert(&self, project: SourceProject) -> Result<(), RegistryError> {
        let mut state = self.lock();
        info!(source = %project.id, project = %project.name, "Registering source");
        state.active = Some(project.id.clone());
        state.projects.insert(project.id.clone(), project);
        self.persist(&state)
    }

    pub fn set_active(&self, id: &str) -> Result<SourceProject, RegistryError> {
        let mut state = self.lock();
        if state.prune_missing() {
            self.persist(&state)?;
        }
        let key = state
            .resolve_key(id)
            .ok_or_else(|| RegistryError::UnknownProject(id.to_string()))?;
        let project = state.projects[&key].clone();
        state.active = Some(key);
        self.persist(&state)?;
        info!(source = %project.id, "Active source changed");
        Ok(project)
    }

    /// Forget a project and delete its cache directory
    pub fn remove(&self, id: &str) -> Result<SourceProject, RegistryError> {
        let mut state = self.lock();
        let key = state
            .resolve_key(id)
            .ok_or_else(|| RegistryError::UnknownProject(id.to_string()))?;
        if let Some(project) = state.projects.get(&key).filter(|p| !self.owns(&p.cache_dir)) {
            warn!(
                source = %key,
                path = %project.cache_dir.display(),
                "Refusing to delete directory outside the cache root"
            );
            return Err(RegistryError::OutsideCacheRoot(project.cache_dir.clone()));
        }
        let project = state
            .projects
            .remove(&key)
            .ok_or_else(|| RegistryError::UnknownProject(id.to_string()))?;
        if state.active.as_deref() == Some(key.as_str()) {
            state.active = None;
        }
        match fs::remove_dir_all(&project.cache_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(RegistryError::RemoveDir {
                    path: project.cache_dir.clone(),
                    source,
                })
            }
        }
        self.persist(&state)?;
        info!(source = %project.id, "Source removed");
        Ok(project)
    }

    pub fn get(&self, id: &str) -> Option<SourceProject> {
        let state = self.lock();
        let key = state.resolve_key(id)?;
        state.projects.get(&key).cloned()
    }

    /// Active project, verified to still exist on disk
    pub fn active(&self) -> Option<SourceProject> {
        let mut state = self.lock();
        if state.prune_missing() {
            if let Err(e) = self.persist(&state) {
                warn!(error = %e, "Failed to persist pruned registry");
            }
        }
        let id = state.active.clone()?;
        state.projects.get(&id).cloned()
    }

    pub fn active_id(&self) -> Option<String> {
        self.lock().active.clone()
    }

    /// All projects, ordered by identifier
    pub fn list(&self) -> Vec<SourceProject> {
        let mut state = self.lock();
        if state.prune_missing() {
            if let Err(e) = self.persist(&state) {
                warn!(error = %e, "Failed to persist pruned registry");
            }
        }
        state.projects.values().cloned().collect()
    }

    /// Whether `dir` lies strictly inside the cache root
    fn owns(&self, dir: &Path) -> bool {
        dir != self.cache_root
            && dir.starts_with(&self.cache_root)
            && !dir.components().any(|c| matches!(c, Component::ParentDir))
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &RegistryState) -> Result<(), RegistryError> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        let persist_err = |source| RegistryError::Persist {
            path: self.path.clone(),
            source,
        };
        fs::create_dir_all(&self.cache_root).map_err(persist_err)?;
        fs::write(&tmp, json).map_err(persist_err)?;
        fs::rename(&tmp, &self.path).map_err(persist_err)?;
        debug!(path = %self.path.display(), "Registry persisted");
        Ok(())
    }
}

fn load_state(path: &Path) -> RegistryState {
    match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Corrupt registry state, starting empty");
            RegistryState::default()
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => RegistryState::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable registry state, starting empty");
            RegistryState::default()
        }
    }
}

/// Adopt indexed cache directories missing from the state; true when any were added
fn discover(cache_root: &Path, state: &mut RegistryState) -> bool {
    let Ok(entries) = fs::read_dir(cache_root) else {
        return false;
    };
    let mut added = false;
    for entry in entries.filter_map(Result::ok) {
        let dir = entry.path();
        if !dir.is_dir() || !dir.join(INDEX_FILE).is_file() {
            continue;
        }
        let Some(id) = read_source(&dir) else {
            continue;
        };
        if state.projects.contains_key(&id) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let content_hash = fs::read_to_string(dir.join(HASH_FILE))
            .ok()
            .map(|h| h.trim().to_string());
        info!(source = %id, project = %name, "Discovered cached source");
        state.projects.insert(
            id.clone(),
            SourceProject {
                id,
                name,
                cache_dir: dir,
                content_hash,
                documents: 0,
            },
        );
        added = true;
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SOURCE_FILE;
    use tempfile::TempDir;

    fn project(root: &Path, id: &str, name: &str) -> SourceProject {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        SourceProject {
            id: id.to_string(),
            name: name.to_string(),
            cache_dir: dir,
            content_hash: Some("abc".to_string()),
            documents: 3,
        }
    }

    #[test]
    fn test_upsert_persists_and_activates() {
        let tmp = TempDir::new().unwrap();
        let registry = Registry::open(tmp.path()).unwrap();
        registry
            .upsert(project(tmp.path(), "https://a.dev/llms.txt", "A"))
            .unwrap();
        registry
            .upsert(project(tmp.path(), "https://b.dev/llms.txt", "B"))
            .unwrap();
        assert_eq!(registry.active_id().as_deref(), Some("https://b.dev/llms.txt"));

        let reopened = Registry::open(tmp.path()).unwrap();
        assert_eq!(reopened.list().len(), 2);
        assert_eq!(reopened.active().unwrap().name, "B");
        assert_eq!(
            reopened.get("https://a.dev/llms.txt").unwrap().documents,
            3
        );
    }

    #[test]
    fn test_identifier_resolution() {
        let tmp = TempDir::new().unwrap();
        let registry = Registry::open(tmp.path()).unwrap();
        registry
            .upsert(project(tmp.path(), "https://a.dev/", "A"))
            .unwrap();
        registry
            .upsert(project(tmp.path(), "https://b.dev/llms.txt", "B"))
            .unwrap();

        assert_eq!(registry.set_active("https://a.dev").unwrap().name, "A");
        assert_eq!(registry.active_id().as_deref(), Some("https://a.dev/"));
        assert_eq!(registry.set_active("B").unwrap().id, "https://b.dev/llms.txt");
        assert!(registry.get("A").is_some());
    }

    #[test]
    fn test_set_active_unknown() {
        let tmp = TempDir::new().unwrap();
        let registry = Registry::open(tmp.path()).unwrap();
        let err = registry.set_active("https://nope.dev/llms.txt").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownProject(_)));
    }

    #[test]
    fn test_remove_deletes_directory_and_clears_active() {
        let tmp = TempDir::new().unwrap();
        let registry = Registry::open(tmp.path()).unwrap();
        let a = project(tmp.path(), "a", "A");
        let dir = a.cache_dir.clone();
        registry.upsert(a).unwrap();

        registry.remove("a").unwrap();
        assert!(!dir.exists());
        assert!(registry.active().is_none());
        assert!(registry.list().is_empty());
        assert!(matches!(
            registry.remove("a"),
            Err(RegistryError::UnknownProject(_))
        ));
    }

    #[test]
    fn test_remove_refuses_directory_outside_cache_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let outside = tmp.path().join("keep");
        fs::create_dir_all(outside.join("data")).unwrap();
        fs::create_dir_all(root.join("Y")).unwrap();
        let state = serde_json::json!({
            "projects": {
                "x": {"id": "x", "name": "X", "cache_dir": outside, "documents": 1},
                "y": {"id": "y", "name": "Y", "cache_dir": root.join("Y").join("..").join(".."), "documents": 1}
            },
            "active": "x"
        });
        fs::write(root.join(STATE_FILE), state.to_string()).unwrap();

        let registry = Registry::open(&root).unwrap();
        assert!(matches!(
            registry.remove("x"),
            Err(RegistryError::OutsideCacheRoot(_))
        ));
        assert!(matches!(
            registry.remove("y"),
            Err(RegistryError::OutsideCacheRoot(_))
        ));
        assert!(outside.join("data").exists());
        assert!(root.exists());
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_self_heals_when_directory_deleted() {
        let tmp = TempDir::new().unwrap();
        let registry = Registry::open(tmp.path()).unwrap();
        let a = project(tmp.path(), "a", "A");
        let dir = a.cache_dir.clone();
        registry.upsert(a).unwrap();

        fs::remove_dir_all(&dir).unwrap();
        assert!(registry.active().is_none());
        assert!(registry.list().is_empty());

        let reopened = Registry::open(tmp.path()).unwrap();
        assert!(reopened.list().is_empty());
        assert!(reopened.active_id().is_none());
    }

    #[test]
    fn test_discovers_unregistered_cache_dirs() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("Orphan");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SOURCE_FILE), "https://orphan.dev/llms.txt\n").unwrap();
        fs::write(dir.join(INDEX_FILE), "# Detailed Documentation Index\n").unwrap();
        fs::create_dir_all(tmp.path().join("NoIndex")).unwrap();
        fs::write(tmp.path().join("NoIndex").join(SOURCE_FILE), "https://x.dev").unwrap();

        let registry = Registry::open(tmp.path()).unwrap();
        let projects = registry.list();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, "https://orphan.dev/llms.txt");
        assert_eq!(projects[0].name, "Orphan");
        assert!(registry.active().is_none());
        assert!(tmp.path().join(STATE_FILE).is_file());
    }

    #[test]
    fn test_corrupt_state_starts_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(STATE_FILE), "{not json").unwrap();
        let registry = Registry::open(tmp.path()).unwrap();
        assert!(registry.list().is_empty());
    }
}
