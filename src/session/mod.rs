// ============================================================================
// Persistence Session Boundary
// ============================================================================
//
// The engines drive an external ORM session through these traits. The
// session owns query execution, metadata and the save pipeline; the engines
// only issue state transitions and batched lookups.
//
// ============================================================================

pub mod memory;

use crate::core::{AnyEntity, KeyValue, PersistenceState, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

pub use memory::{InMemorySession, ModelCatalog, RelationshipInstruction};

/// Multiplicity of a navigation property relative to its owning entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    OneToOne,
    ManyToOne,
    ManyToMany,
    OneToMany,
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::OneToOne => "one-to-one",
            Self::ManyToOne => "many-to-one",
            Self::ManyToMany => "many-to-many",
            Self::OneToMany => "one-to-many",
        };
        f.write_str(label)
    }
}

/// Synchronous persistence-session capabilities consumed by the engines.
pub trait PersistenceSession {
    /// Session-tracked state of `entity`; `Detached` when unknown.
    fn state(&self, entity: &AnyEntity) -> Result<PersistenceState>;

    fn set_state(&mut self, entity: &AnyEntity, state: PersistenceState) -> Result<()>;

    /// Flags one property dirty without marking the whole row Modified.
    fn set_property_modified(&mut self, entity: &AnyEntity, property: &str) -> Result<()>;

    /// Adds or removes a many-to-many link independently of either row's state.
    fn set_relationship_state(
        &mut self,
        child: &AnyEntity,
        parent: &AnyEntity,
        property: &str,
        state: PersistenceState,
    ) -> Result<()>;

    fn resolve_relationship_kind(&self, entity_type: &str, property: &str) -> Option<RelationshipKind>;

    /// Name of the foreign-key property backing a reference navigation property.
    fn resolve_foreign_key_name(&self, entity_type: &str, property: &str) -> Option<String>;

    fn resolve_primary_key_name(&self, entity_type: &str) -> Option<String>;

    /// Fetches all `target_type` rows whose `key_name` is one of `keys`.
    fn query_by_foreign_keys(
        &mut self,
        target_type: &str,
        key_name: &str,
        keys: &[KeyValue],
    ) -> Result<Vec<AnyEntity>>;

    fn save(&mut self) -> Result<()>;
}

/// Suspending variants of the session operations that perform I/O.
///
/// The defaults delegate to the synchronous methods, which suits sessions
/// whose storage is local.
#[async_trait]
pub trait AsyncPersistenceSession: PersistenceSession + Send {
    async fn query_by_foreign_keys_async(
        &mut self,
        target_type: &str,
        key_name: &str,
        keys: &[KeyValue],
    ) -> Result<Vec<AnyEntity>> {
        self.query_by_foreign_keys(target_type, key_name, keys)
    }

    async fn save_async(&mut self) -> Result<()> {
        self.save()
    }
}

/// Relationship kinds resolved once per (entity type, property).
#[derive(Debug, Default)]
pub struct RelationshipCache {
    kinds: HashMap<(&'static str, &'static str), Option<RelationshipKind>>,
}

impl RelationshipCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve<S: PersistenceSession + ?Sized>(
        &mut self,
        session: &S,
        entity_type: &'static str,
        property: &'static str,
    ) -> Option<RelationshipKind> {
        *self
            .kinds
            .entry((entity_type, property))
            .or_insert_with(|| session.resolve_relationship_kind(entity_type, property))
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
