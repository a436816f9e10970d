use crate::core::{KeyValue, ModifiedProperties, Result, TrackingError, TrackingState};
use crate::navigation::NavigationProperty;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Stable token used to match a disconnected instance with its persisted
/// counterpart after a round trip, independent of primary-key identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh random key.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static name of an entity type, as known to the persistence metadata.
pub trait EntityType {
    const ENTITY_TYPE: &'static str;
}

/// Contract every domain object participating in change tracking implements.
///
/// Usually generated with `#[derive(Trackable)]`.
pub trait TrackableEntity: Any + Send + Sync {
    /// Name of the entity type in persistence metadata.
    fn entity_type(&self) -> &'static str;

    fn tracking_state(&self) -> TrackingState;

    fn set_tracking_state(&mut self, state: TrackingState);

    fn modified_properties(&self) -> &ModifiedProperties;

    fn modified_properties_mut(&mut self) -> &mut ModifiedProperties;

    /// Correlation key for merge-by-identity scenarios, when the type carries one.
    fn correlation_key(&self) -> Option<CorrelationKey> {
        None
    }

    /// Reads a scalar key property (primary or foreign key) by name.
    ///
    /// Returns `None` for unknown properties and for null keys.
    fn key_value(&self, property: &str) -> Option<KeyValue>;

    /// Current navigation properties of this entity, in declaration order.
    fn navigation_properties(&self) -> Vec<NavigationProperty>;

    /// Replaces the value of a reference navigation property.
    fn set_reference(&mut self, property: &str, related: Option<AnyEntity>) -> Result<()>;

    /// Removes the element at `index` from a collection navigation property.
    fn remove_from_collection(&mut self, property: &str, index: usize) -> Result<()>;
}

/// Shared, typed handle to an entity node.
///
/// Graphs may share nodes and contain cycles, so nodes are reference counted
/// and interior-mutable.
pub struct EntityRef<T>(Arc<RwLock<T>>);

impl<T: TrackableEntity> EntityRef<T> {
    pub fn new(entity: T) -> Self {
        Self(Arc::new(RwLock::new(entity)))
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, T>> {
        Ok(self.0.read()?)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, T>> {
        Ok(self.0.write()?)
    }

    /// Type-erased handle to the same node.
    pub fn erase(&self) -> AnyEntity {
        let node: Arc<RwLock<dyn TrackableEntity>> = self.0.clone();
        let typed: Arc<dyn Any + Send + Sync> = self.0.clone();
        AnyEntity { node, typed }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for EntityRef<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: TrackableEntity> fmt::Debug for EntityRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Graphs may be cyclic, so related nodes are never printed.
        fmt::Debug::fmt(&self.erase(), f)
    }
}

impl<T: TrackableEntity> From<&EntityRef<T>> for AnyEntity {
    fn from(entity: &EntityRef<T>) -> Self {
        entity.erase()
    }
}

impl<T: TrackableEntity> From<EntityRef<T>> for AnyEntity {
    fn from(entity: EntityRef<T>) -> Self {
        entity.erase()
    }
}

/// Type-erased handle to an entity node, used by the traversal engines.
///
/// Equality of handles is reference identity of the underlying node.
#[derive(Clone)]
pub struct AnyEntity {
    node: Arc<RwLock<dyn TrackableEntity>>,
    typed: Arc<dyn Any + Send + Sync>,
}

impl AnyEntity {
    pub fn new<T: TrackableEntity>(entity: T) -> Self {
        EntityRef::new(entity).erase()
    }

    /// Address of the shared node; stable for as long as any handle lives.
    pub fn address(&self) -> usize {
        Arc::as_ptr(&self.typed) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &AnyEntity) -> bool {
        self.address() == other.address()
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, dyn TrackableEntity>> {
        Ok(self.node.read()?)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, dyn TrackableEntity>> {
        Ok(self.node.write()?)
    }

    /// Recovers the typed handle, if this node is a `T`.
    pub fn downcast<T: TrackableEntity>(&self) -> Option<EntityRef<T>> {
        self.typed.clone().downcast::<RwLock<T>>().ok().map(EntityRef)
    }

    pub fn is<T: TrackableEntity>(&self) -> bool {
        self.typed.is::<RwLock<T>>()
    }

    pub fn entity_type(&self) -> Result<&'static str> {
        Ok(self.read()?.entity_type())
    }

    pub fn tracking_state(&self) -> Result<TrackingState> {
        Ok(self.read()?.tracking_state())
    }

    pub fn set_tracking_state(&self, state: TrackingState) -> Result<()> {
        self.write()?.set_tracking_state(state);
        Ok(())
    }

    pub fn modified_properties(&self) -> Result<ModifiedProperties> {
        Ok(self.read()?.modified_properties().clone())
    }

    pub fn correlation_key(&self) -> Result<Option<CorrelationKey>> {
        Ok(self.read()?.correlation_key())
    }

    pub fn key_value(&self, property: &str) -> Result<Option<KeyValue>> {
        Ok(self.read()?.key_value(property))
    }

    /// Snapshot of the navigation properties; the node is unlocked on return.
    pub fn navigation_properties(&self) -> Result<Vec<NavigationProperty>> {
        Ok(self.read()?.navigation_properties())
    }

    pub fn set_reference(&self, property: &str, related: Option<AnyEntity>) -> Result<()> {
        self.write()?.set_reference(property, related)
    }

    pub fn remove_from_collection(&self, property: &str, index: usize) -> Result<()> {
        self.write()?.remove_from_collection(property, index)
    }
}

impl PartialEq for AnyEntity {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for AnyEntity {}

impl fmt::Debug for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("AnyEntity");
        if let Ok(entity) = self.node.try_read() {
            out.field("type", &entity.entity_type())
                .field("state", &entity.tracking_state());
        }
        out.field("address", &format_args!("{:#x}", self.address()))
            .finish()
    }
}

/// Converts an erased reference value into the typed field value of `property`.
///
/// Used by generated `set_reference` implementations.
pub fn downcast_related<T: TrackableEntity + EntityType>(
    property: &str,
    related: Option<AnyEntity>,
) -> Result<Option<EntityRef<T>>> {
    let Some(related) = related else {
        return Ok(None);
    };

    match related.downcast::<T>() {
        Some(typed) => Ok(Some(typed)),
        None => Err(TrackingError::TypeMismatch {
            property: property.to_string(),
            expected: T::ENTITY_TYPE.to_string(),
            found: related.entity_type()?.to_string(),
        }),
    }
}

/// Removes the element at `index` from a typed collection field.
///
/// Used by generated `remove_from_collection` implementations.
pub fn remove_related<T>(
    property: &str,
    collection: &mut Vec<EntityRef<T>>,
    index: usize,
) -> Result<()> {
    if index >= collection.len() {
        return Err(TrackingError::IndexOutOfRange {
            property: property.to_string(),
            index,
        });
    }
    collection.remove(index);
    Ok(())
}

/// Error for a property name a generated implementation does not know.
pub fn unknown_property(entity_type: &str, property: &str) -> TrackingError {
    TrackingError::UnknownProperty {
        entity_type: entity_type.to_string(),
        property: property.to_string(),
    }
}
