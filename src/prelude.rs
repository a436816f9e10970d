//! Everything needed to declare tracked entities and synchronize them.

pub use crate::{
    AnyEntity, AsyncSessionExt, CorrelationKey, EntityRef, ModifiedProperties,
    PersistenceSession, SessionExt, SyncOptions, Trackable, TrackableEntity, TrackingState,
    accept_changes, has_changes,
};
