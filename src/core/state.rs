use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Change intent recorded on a detached entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrackingState {
    #[default]
    Unchanged,
    Added,
    Modified,
    Deleted,
}

impl TrackingState {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unchanged => "Unchanged",
            Self::Added => "Added",
            Self::Modified => "Modified",
            Self::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State of an entity as understood by the persistence session.
///
/// Differs from [`TrackingState`] by the extra `Detached` value: an entity the
/// session has never been told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PersistenceState {
    #[default]
    Detached,
    Unchanged,
    Added,
    Modified,
    Deleted,
}

impl From<TrackingState> for PersistenceState {
    fn from(state: TrackingState) -> Self {
        match state {
            TrackingState::Unchanged => Self::Unchanged,
            TrackingState::Added => Self::Added,
            TrackingState::Modified => Self::Modified,
            TrackingState::Deleted => Self::Deleted,
        }
    }
}

/// Names of the properties changed while the entity was disconnected.
///
/// Only meaningful while the owning entity is `Modified`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifiedProperties(BTreeSet<String>);

impl ModifiedProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a changed property. Returns false when it was already recorded.
    pub fn insert(&mut self, property: impl Into<String>) -> bool {
        self.0.insert(property.into())
    }

    pub fn contains(&self, property: &str) -> bool {
        self.0.contains(property)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ModifiedProperties {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
