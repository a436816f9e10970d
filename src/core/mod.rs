pub mod entity;
pub mod error;
pub mod state;
pub mod value;

pub use entity::{AnyEntity, CorrelationKey, EntityRef, EntityType, TrackableEntity};
pub use error::{Result, SessionError, TrackingError};
pub use state::{ModifiedProperties, PersistenceState, TrackingState};
pub use value::{KeyComparison, KeyValue, ToKeyValue};
