// ABOUTME: ContextSet: notebook pages keyed by a stable document id, each with a selection flag.
// ABOUTME: Rebuilds preserve prior selections; round-trips through the pages JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PersistError;
use crate::session::persistence::write_atomic;

/// One notebook page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEntry {
    pub relative_path: String,
    #[serde(default)]
    pub selected: bool,
}

/// The pages of one notebook and which of them feed the system turn.
///
/// Keys are immutable document ids (the page creation timestamp for Zim
/// notebooks), so a page keeps its selection across renames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSet {
    #[serde(default)]
    pub root_path: Option<PathBuf>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pages: BTreeMap<String, PageEntry>,
}

impl ContextSet {
    pub fn new(root_path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root_path: Some(root_path.into()),
            name: Some(name.into()),
            pages: BTreeMap::new(),
        }
    }

    /// Add an unselected page. Returns false (and keeps the existing entry) on a duplicate key.
    pub fn insert(&mut self, key: impl Into<String>, relative_path: impl Into<String>) -> bool {
        let key = key.into();
        let relative_path = relative_path.into();
        if let Some(existing) = self.pages.get(&key) {
            warn!(
                page = %relative_path,
                existing = %existing.relative_path,
                key = %key,
                "duplicate page key, keeping first"
            );
            return false;
        }
        self.pages.insert(
            key,
            PageEntry {
                relative_path,
                selected: false,
            },
        );
        true
    }

    /// Replace every page with a freshly scanned list, carrying over the
    /// `selected` flag of keys that still exist.
    pub fn rebuild<I, K, P>(&mut self, scanned: I)
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: Into<String>,
    {
        let previous = std::mem::take(&mut self.pages);
        for (key, relative_path) in scanned {
            let key = key.into();
            if !self.insert(key.clone(), relative_path) {
                continue;
            }
            if let (Some(old), Some(entry)) = (previous.get(&key), self.pages.get_mut(&key)) {
                entry.selected = old.selected;
            }
        }
    }

    /// Set a page's selection by key. Returns false if the key is unknown.
    pub fn set_selected(&mut self, key: &str, selected: bool) -> bool {
        match self.pages.get_mut(key) {
            Some(entry) => {
                entry.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Flip the selection of the page matching `selector` (a key or a
    /// relative path). Returns the key and its new state.
    pub fn toggle(&mut self, selector: &str) -> Option<(String, bool)> {
        let key = self.resolve(selector)?;
        let entry = self.pages.get_mut(&key)?;
        entry.selected = !entry.selected;
        Some((key, entry.selected))
    }

    fn resolve(&self, selector: &str) -> Option<String> {
        if self.pages.contains_key(selector) {
            return Some(selector.to_string());
        }
        self.pages
            .iter()
            .find(|(_, e)| e.relative_path == selector)
            .map(|(k, _)| k.clone())
    }

    /// Selected pages, in key order.
    pub fn selected(&self) -> impl Iterator<Item = (&String, &PageEntry)> {
        self.pages.iter().filter(|(_, e)| e.selected)
    }

    pub fn selected_count(&self) -> usize {
        self.selected().count()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Header line shown whenever the selection changes.
    pub fn summary(&self) -> String {
        format!(
            "Zim wiki: {} ({}/{} pages selected)",
            self.name.as_deref().unwrap_or("(none)"),
            self.selected_count(),
            self.len()
        )
    }

    /// Load a pages file.
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let content = std::fs::read_to_string(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let set: Self =
            serde_json::from_str(&content).map_err(|source| PersistError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), pages = set.len(), "loaded pages");
        Ok(set)
    }

    /// Save to a pages file (atomic write).
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(path, &content)?;
        info!(path = %path.display(), pages = self.len(), "saved pages");
        Ok(())
    }
}
