use crate::error::ComparisonError;
use crate::market::Asset;

/// Hard cap on side-by-side comparisons.
pub const CAPACITY: usize = 5;

/// The ordered, deduplicated set of asset ids selected for comparison.
///
/// Insertion order is preserved for display. Ids are allowed to reference
/// assets missing from the current snapshot; those are skipped at render
/// time rather than purged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparisonSet {
    ids: Vec<String>,
}

impl ComparisonSet {
    pub fn new() -> ComparisonSet {
        ComparisonSet { ids: Vec::new() }
    }

    /// Rebuilds a set from persisted ids, dropping duplicates and anything
    /// beyond capacity while keeping insertion order.
    pub fn from_ids(ids: Vec<String>) -> ComparisonSet {
        let mut set = ComparisonSet::new();
        for id in ids {
            if set.add(&id).is_err() {
                break;
            }
        }
        set
    }

    /// Appends `id`. Adding an id that is already present is a no-op;
    /// adding a sixth distinct id is rejected with a user-visible notice.
    pub fn add(&mut self, id: &str) -> Result<(), ComparisonError> {
        if self.contains(id) {
            return Ok(());
        }
        if self.ids.len() >= CAPACITY {
            return Err(ComparisonError::Full(CAPACITY));
        }
        self.ids.push(id.to_string());
        Ok(())
    }

    /// Removes `id` if present. Idempotent.
    pub fn remove(&mut self, id: &str) {
        self.ids.retain(|existing| existing != id);
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|existing| existing == id)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Looks up each id in set order against the snapshot, silently
    /// skipping ids the snapshot no longer carries.
    pub fn resolve<'a>(&self, snapshot: &'a [Asset]) -> Vec<&'a Asset> {
        self.ids
            .iter()
            .filter_map(|id| snapshot.iter().find(|asset| &asset.id == id))
            .collect()
    }
}
