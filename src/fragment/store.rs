//! Fragment store: loads fragments once per run and caches them by name.

use super::Fragment;
use crate::error::{Result, SkeinError};
use std::collections::BTreeMap;
use std::path::Path;

/// Read-only cache of fragments keyed by declared `name`.
///
/// Loaded once per run; fragments never mutate after loading. BTreeMap keeps
/// listing order deterministic.
#[derive(Debug, Default)]
pub struct FragmentStore {
    fragments: BTreeMap<String, Fragment>,
}

impl FragmentStore {
    /// Build a store from already-parsed fragments.
    ///
    /// Used by embedders and tests that assemble fragments in memory.
    pub fn from_fragments<I>(fragments: I) -> Result<Self>
    where
        I: IntoIterator<Item = Fragment>,
    {
        let mut store = FragmentStore::default();
        for fragment in fragments {
            store.insert(fragment)?;
        }
        Ok(store)
    }

    /// Load every `.md` fragment from a directory.
    ///
    /// Non-markdown files are skipped. A parse failure in any fragment file
    /// aborts the load; a store is either complete or absent.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();

        let entries = std::fs::read_dir(dir).map_err(|e| {
            SkeinError::UserError(format!(
                "failed to read fragments directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        let mut store = FragmentStore::default();

        for entry in entries {
            let entry = entry.map_err(|e| {
                SkeinError::UserError(format!("failed to read directory entry: {}", e))
            })?;

            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }

            let content = std::fs::read_to_string(&path).map_err(|e| {
                SkeinError::UserError(format!(
                    "failed to read fragment file '{}': {}",
                    path.display(),
                    e
                ))
            })?;

            let fragment = Fragment::parse(&content, &path.display().to_string())?;
            store.insert(fragment)?;
        }

        Ok(store)
    }

    fn insert(&mut self, fragment: Fragment) -> Result<()> {
        let name = fragment.name().to_string();
        if self.fragments.contains_key(&name) {
            return Err(SkeinError::MalformedFragment {
                name,
                reason: "duplicate fragment name".to_string(),
            });
        }
        self.fragments.insert(name, fragment);
        Ok(())
    }

    /// Look up a fragment by name.
    pub fn get(&self, name: &str) -> Result<&Fragment> {
        self.fragments
            .get(name)
            .ok_or_else(|| SkeinError::NotFound(name.to_string()))
    }

    /// Whether a fragment with this name is loaded.
    pub fn contains(&self, name: &str) -> bool {
        self.fragments.contains_key(name)
    }

    /// Number of loaded fragments.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Iterate over all fragments in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.values()
    }
}
