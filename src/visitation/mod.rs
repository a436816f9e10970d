// ============================================================================
// Visitation Set
// ============================================================================
//
// Persistent (structurally shared) record of the nodes already processed in
// one traversal. Cloning is O(1) and never affects other instances, so a
// traversal can fork a disposable copy for a side pass and keep threading the
// original through the main walk.
//
// Membership is decided by a pluggable `VisitEquality`: reference identity by
// default, primary-key identity for identity-map lookups, or correlation key.
//
// ============================================================================

use crate::core::{AnyEntity, CorrelationKey, KeyComparison, KeyValue, Result, TrackingError};
use std::collections::HashMap;
use std::sync::Arc;

/// Membership key of a visited node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VisitKey {
    Address(usize),
    PrimaryKey {
        entity_type: &'static str,
        key: KeyValue,
    },
    Correlation(CorrelationKey),
}

/// Equality used by a [`VisitationSet`] to decide membership.
pub trait VisitEquality: Clone {
    fn visit_key(&self, entity: &AnyEntity) -> Result<VisitKey>;
}

/// Two handles are equal when they point at the same node.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceEquality;

impl VisitEquality for ReferenceEquality {
    fn visit_key(&self, entity: &AnyEntity) -> Result<VisitKey> {
        Ok(VisitKey::Address(entity.address()))
    }
}

/// Two nodes are equal when they have the same type and primary key value.
///
/// Nodes whose type has no registered key name, or whose key is null (e.g. not
/// yet generated), fall back to reference identity.
#[derive(Debug, Clone, Default)]
pub struct PrimaryKeyEquality {
    primary_keys: Arc<HashMap<&'static str, String>>,
    comparison: KeyComparison,
}

impl PrimaryKeyEquality {
    pub fn new(comparison: KeyComparison) -> Self {
        Self {
            primary_keys: Arc::default(),
            comparison,
        }
    }

    pub fn with_primary_key(mut self, entity_type: &'static str, key_name: impl Into<String>) -> Self {
        self.register(entity_type, key_name);
        self
    }

    pub fn register(&mut self, entity_type: &'static str, key_name: impl Into<String>) {
        Arc::make_mut(&mut self.primary_keys).insert(entity_type, key_name.into());
    }

    pub fn is_registered(&self, entity_type: &str) -> bool {
        self.primary_keys.contains_key(entity_type)
    }

    pub fn primary_key_name(&self, entity_type: &str) -> Option<&str> {
        self.primary_keys.get(entity_type).map(String::as_str)
    }
}

impl VisitEquality for PrimaryKeyEquality {
    fn visit_key(&self, entity: &AnyEntity) -> Result<VisitKey> {
        let node = entity.read()?;
        let entity_type = node.entity_type();
        let key = self
            .primary_keys
            .get(entity_type)
            .and_then(|name| node.key_value(name));

        Ok(match key {
            Some(key) => VisitKey::PrimaryKey {
                entity_type,
                key: key.normalized(self.comparison),
            },
            None => VisitKey::Address(entity.address()),
        })
    }
}

/// Two nodes are equal when they carry the same correlation key.
///
/// Nodes without a key cannot be placed in the set.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationEquality;

impl VisitEquality for CorrelationEquality {
    fn visit_key(&self, entity: &AnyEntity) -> Result<VisitKey> {
        let node = entity.read()?;
        match node.correlation_key() {
            Some(key) => Ok(VisitKey::Correlation(key)),
            None => Err(TrackingError::MissingCorrelationKey {
                entity_type: node.entity_type().to_string(),
            }),
        }
    }
}

/// Immutable set of already-visited nodes.
#[derive(Debug, Clone)]
pub struct VisitationSet<E: VisitEquality = ReferenceEquality> {
    equality: E,
    visited: im::HashMap<VisitKey, AnyEntity>,
}

impl<E: VisitEquality + Default> Default for VisitationSet<E> {
    fn default() -> Self {
        Self::with_equality(E::default())
    }
}

impl VisitationSet<ReferenceEquality> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: VisitEquality> VisitationSet<E> {
    pub fn with_equality(equality: E) -> Self {
        Self {
            equality,
            visited: im::HashMap::new(),
        }
    }

    /// A set seeded with one element.
    pub fn of(equality: E, entity: &AnyEntity) -> Result<Self> {
        Self::with_equality(equality).with(entity)
    }

    pub fn equality(&self) -> &E {
        &self.equality
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }

    /// Returns a new set that also contains `entity`.
    ///
    /// Fails with [`TrackingError::AlreadyVisited`] when an equal element is
    /// already present.
    pub fn with(&self, entity: &AnyEntity) -> Result<Self> {
        match self.try_with(entity)? {
            Some(set) => Ok(set),
            None => Err(TrackingError::AlreadyVisited {
                entity_type: entity.entity_type()?.to_string(),
            }),
        }
    }

    /// Returns a new set that also contains `entity`, or `None` when an equal
    /// element is already present.
    pub fn try_with(&self, entity: &AnyEntity) -> Result<Option<Self>> {
        let key = self.equality.visit_key(entity)?;
        if self.visited.contains_key(&key) {
            return Ok(None);
        }

        Ok(Some(Self {
            equality: self.equality.clone(),
            visited: self.visited.update(key, entity.clone()),
        }))
    }

    pub fn is_visited(&self, entity: &AnyEntity) -> Result<bool> {
        let key = self.equality.visit_key(entity)?;
        Ok(self.visited.contains_key(&key))
    }

    /// Records `entity` unless an equal element is already present.
    ///
    /// Returns false, leaving the set untouched, when it was already visited.
    /// Clones taken earlier never observe the change.
    pub fn try_visit(&mut self, entity: &AnyEntity) -> Result<bool> {
        let key = self.equality.visit_key(entity)?;
        if self.visited.contains_key(&key) {
            return Ok(false);
        }
        self.visited.insert(key, entity.clone());
        Ok(true)
    }

    /// The previously recorded element equal to `entity`, if any.
    pub fn find_visited(&self, entity: &AnyEntity) -> Result<Option<AnyEntity>> {
        let key = self.equality.visit_key(entity)?;
        Ok(self.visited.get(&key).cloned())
    }

    pub fn entities(&self) -> impl Iterator<Item = &AnyEntity> {
        self.visited.values()
    }
}
