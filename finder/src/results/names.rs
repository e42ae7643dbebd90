//! Batch-scoped display name memo.

use std::collections::HashMap;

use crate::catalog::CatalogObject;

/// Memo of catalog id to display name.
///
/// One cache lives for one batch run and is owned by one worker, so nothing
/// here is shared or locked. Dropping the cache at the end of the batch
/// forgets every name.
#[derive(Debug, Default, Clone)]
pub struct NameCache {
    names: HashMap<String, String>,
    hits: usize,
    misses: usize,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display name for `object`, computed on first use.
    pub fn display_name(&mut self, object: &CatalogObject) -> String {
        if let Some(name) = self.names.get(&object.id) {
            self.hits += 1;
            return name.clone();
        }
        self.misses += 1;
        let name = object.display_name();
        self.names.insert(object.id.clone(), name.clone());
        name
    }

    /// Cached name for a catalog id, without computing anything.
    pub fn lookup(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// `(hits, misses)` since the cache was created.
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }
}
