// ============================================================================
// tracksync Library
// ============================================================================
//
// Change tracking for disconnected entity graphs. A client edits a graph of
// entities while detached from its store, recording per-node intent
// (Added / Modified / Deleted). On reconnection the graph is synchronized with
// a persistence session so a single save applies exactly the right inserts,
// updates, deletes and relationship changes.
//
// ============================================================================

extern crate self as tracksync;

pub mod config;
pub mod core;
pub mod engine;
pub mod navigation;
pub mod prelude;
pub mod session;
pub mod visitation;

// Re-export main types for convenience
pub use crate::config::{DeletedWithAddedPolicy, SyncOptions};
pub use crate::core::{
    AnyEntity, CorrelationKey, EntityRef, EntityType, KeyComparison, KeyValue, ModifiedProperties,
    PersistenceState, Result, SessionError, ToKeyValue, TrackableEntity, TrackingError,
    TrackingState,
};
pub use crate::engine::{
    AsyncSessionExt, CorrelatedPair, GraphRoots, SessionExt, accept_changes, correlate,
    has_changes,
};
pub use crate::navigation::{
    CollectionProperty, NavigationKind, NavigationPropertiesExt, NavigationProperty,
    ReferenceProperty, navigation_properties,
};
pub use crate::session::{
    AsyncPersistenceSession, InMemorySession, ModelCatalog, PersistenceSession, RelationshipCache,
    RelationshipKind,
};
pub use crate::visitation::{
    CorrelationEquality, PrimaryKeyEquality, ReferenceEquality, VisitEquality, VisitKey,
    VisitationSet,
};

/// Derives [`TrackableEntity`] and [`EntityType`] for a struct.
///
/// `Option<EntityRef<T>>` fields become reference navigation properties and
/// `Vec<EntityRef<T>>` fields become collection navigation properties.
///
/// Field attributes:
/// - `#[tracking(state)]` / `#[tracking(modified)]`: the tracking fields
///   (fields named `tracking_state` / `modified_properties` are found without it)
/// - `#[tracking(correlation)]`: an `Option<CorrelationKey>` field
/// - `#[tracking(key)]`: a scalar readable through `key_value`
/// - `#[tracking(name = "...")]`: metadata name of the property
/// - `#[tracking(skip)]`: not a navigation property
///
/// Struct attributes:
/// - `#[trackable(name = "...")]`: entity type name (defaults to the struct name)
/// - `#[trackable(navigation_with = "method")]`: supply navigation properties
///   from `fn method(&self) -> Vec<NavigationProperty>` instead
pub use tracksync_derive::Trackable;
