use crate::core::KeyComparison;

/// What to do when a Deleted node still owns an Added descendant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletedWithAddedPolicy {
    /// Fail the whole operation with `TrackingError::DeletedWithAddedChildren`.
    #[default]
    Reject,
    /// Leave the Added descendant untouched; it is neither inserted nor deleted.
    Skip,
}

/// Options for the synchronization engines
///
/// Similar to the builder-style connection configuration of a database client
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Load related entities for every node, not only freshly Added ones
    pub load_all: bool,

    /// How string foreign keys are matched to primary keys
    pub key_comparison: KeyComparison,

    /// Handling of Added nodes beneath a Deleted node
    pub deleted_with_added: DeletedWithAddedPolicy,

    /// Maximum number of keys per batched lookup (None = unlimited)
    pub max_batch_keys: Option<usize>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncOptions {
    pub fn new() -> Self {
        Self {
            load_all: false,
            key_comparison: KeyComparison::Normalized,
            deleted_with_added: DeletedWithAddedPolicy::Reject,
            max_batch_keys: None,
        }
    }

    /// Set whether related entities are loaded for every node
    pub fn load_all(mut self, load_all: bool) -> Self {
        self.load_all = load_all;
        self
    }

    /// Set string key comparison
    pub fn key_comparison(mut self, comparison: KeyComparison) -> Self {
        self.key_comparison = comparison;
        self
    }

    /// Set the Deleted-with-Added-descendant policy
    pub fn deleted_with_added(mut self, policy: DeletedWithAddedPolicy) -> Self {
        self.deleted_with_added = policy;
        self
    }

    /// Split batched lookups into chunks of at most `max` keys
    pub fn max_batch_keys(mut self, max: usize) -> Self {
        self.max_batch_keys = Some(max.max(1));
        self
    }

    pub(crate) fn chunk_size(&self, keys: usize) -> usize {
        self.max_batch_keys.unwrap_or(keys).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_reject_and_normalize() {
        let options = SyncOptions::default();
        assert!(!options.load_all);
        assert_eq!(options.key_comparison, KeyComparison::Normalized);
        assert_eq!(options.deleted_with_added, DeletedWithAddedPolicy::Reject);
        assert_eq!(options.chunk_size(50), 50);
    }

    #[test]
    fn builder_overrides_fields() {
        let options = SyncOptions::new()
            .load_all(true)
            .key_comparison(KeyComparison::Exact)
            .deleted_with_added(DeletedWithAddedPolicy::Skip)
            .max_batch_keys(0);

        assert!(options.load_all);
        assert_eq!(options.key_comparison, KeyComparison::Exact);
        assert_eq!(options.deleted_with_added, DeletedWithAddedPolicy::Skip);
        assert_eq!(options.chunk_size(10), 1);
    }
}
