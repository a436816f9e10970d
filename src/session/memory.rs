use super::{AsyncPersistenceSession, PersistenceSession, RelationshipKind};
use crate::core::{
    AnyEntity, KeyComparison, KeyValue, PersistenceState, Result, SessionError, TrackableEntity,
};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Relationship and key metadata for a model, keyed by entity type name.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    relationships: HashMap<(String, String), RelationshipKind>,
    foreign_keys: HashMap<(String, String), String>,
    primary_keys: HashMap<String, String>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primary_key(mut self, entity_type: &str, key_name: &str) -> Self {
        self.primary_keys
            .insert(entity_type.to_string(), key_name.to_string());
        self
    }

    pub fn relationship(mut self, entity_type: &str, property: &str, kind: RelationshipKind) -> Self {
        self.relationships
            .insert((entity_type.to_string(), property.to_string()), kind);
        self
    }

    /// A many-to-one reference backed by `foreign_key` on `entity_type`.
    pub fn many_to_one(self, entity_type: &str, property: &str, foreign_key: &str) -> Self {
        self.relationship(entity_type, property, RelationshipKind::ManyToOne)
            .foreign_key(entity_type, property, foreign_key)
    }

    /// A one-to-one reference backed by `foreign_key` on `entity_type`.
    pub fn one_to_one(self, entity_type: &str, property: &str, foreign_key: &str) -> Self {
        self.relationship(entity_type, property, RelationshipKind::OneToOne)
            .foreign_key(entity_type, property, foreign_key)
    }

    pub fn one_to_many(self, entity_type: &str, property: &str) -> Self {
        self.relationship(entity_type, property, RelationshipKind::OneToMany)
    }

    pub fn many_to_many(self, entity_type: &str, property: &str) -> Self {
        self.relationship(entity_type, property, RelationshipKind::ManyToMany)
    }

    pub fn foreign_key(mut self, entity_type: &str, property: &str, foreign_key: &str) -> Self {
        self.foreign_keys.insert(
            (entity_type.to_string(), property.to_string()),
            foreign_key.to_string(),
        );
        self
    }

    pub fn relationship_kind(&self, entity_type: &str, property: &str) -> Option<RelationshipKind> {
        self.relationships
            .get(&(entity_type.to_string(), property.to_string()))
            .copied()
    }

    pub fn foreign_key_name(&self, entity_type: &str, property: &str) -> Option<&str> {
        self.foreign_keys
            .get(&(entity_type.to_string(), property.to_string()))
            .map(String::as_str)
    }

    pub fn primary_key_name(&self, entity_type: &str) -> Option<&str> {
        self.primary_keys.get(entity_type).map(String::as_str)
    }
}

/// A many-to-many link instruction issued against the session.
#[derive(Debug, Clone)]
pub struct RelationshipInstruction {
    pub child: AnyEntity,
    pub parent: AnyEntity,
    pub property: String,
    pub state: PersistenceState,
}

/// One batched lookup executed by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRecord {
    pub target_type: String,
    pub key_name: String,
    pub keys: Vec<KeyValue>,
}

/// Outcome recorded for one entity by a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRecord {
    pub entity_type: String,
    pub state: PersistenceState,
    pub modified_properties: Vec<String>,
}

type Materializer = Arc<dyn Fn() -> AnyEntity + Send + Sync>;

enum StoredRow {
    /// Seeded row; every lookup materializes a fresh instance, like a real store.
    Template(Materializer),
    /// Row inserted by a save; lookups hand back the saved instance.
    Instance(AnyEntity),
}

impl StoredRow {
    fn materialize(&self) -> AnyEntity {
        match self {
            Self::Template(make) => make(),
            Self::Instance(entity) => entity.clone(),
        }
    }
}

struct TrackedEntry {
    entity: AnyEntity,
    state: PersistenceState,
    modified: BTreeSet<String>,
}

/// Recording, in-memory implementation of the persistence-session boundary.
///
/// Keeps per-entity session states, dirty-property flags, many-to-many link
/// instructions and seeded rows, and counts every batched lookup so the
/// engines' round-trip behaviour can be observed.
pub struct InMemorySession {
    catalog: ModelCatalog,
    rows: HashMap<String, Vec<StoredRow>>,
    entries: HashMap<usize, TrackedEntry>,
    relationships: Vec<RelationshipInstruction>,
    lookups: Vec<LookupRecord>,
    saves: Vec<Vec<SaveRecord>>,
    pending_failure: Option<SessionError>,
}

impl InMemorySession {
    pub fn new(catalog: ModelCatalog) -> Self {
        Self {
            catalog,
            rows: HashMap::new(),
            entries: HashMap::new(),
            relationships: Vec::new(),
            lookups: Vec::new(),
            saves: Vec::new(),
            pending_failure: None,
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Seeds a stored row of type `T`.
    pub fn insert_row<T: TrackableEntity + Clone>(&mut self, row: T) {
        let entity_type = row.entity_type().to_string();
        let make: Materializer = Arc::new(move || AnyEntity::new(row.clone()));
        self.rows
            .entry(entity_type)
            .or_default()
            .push(StoredRow::Template(make));
    }

    pub fn row_count(&self, entity_type: &str) -> usize {
        self.rows.get(entity_type).map(Vec::len).unwrap_or(0)
    }

    /// Session state of `entity`; `Detached` when never attached.
    pub fn state_of(&self, entity: &AnyEntity) -> PersistenceState {
        self.entries
            .get(&entity.address())
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    /// Properties flagged dirty on `entity`, in name order.
    pub fn modified_properties_of(&self, entity: &AnyEntity) -> Vec<String> {
        self.entries
            .get(&entity.address())
            .map(|entry| entry.modified.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn attached_count(&self) -> usize {
        self.entries.len()
    }

    /// Attached entities currently in `state`.
    pub fn entities_in(&self, state: PersistenceState) -> Vec<AnyEntity> {
        self.entries
            .values()
            .filter(|entry| entry.state == state)
            .map(|entry| entry.entity.clone())
            .collect()
    }

    pub fn relationship_instructions(&self) -> &[RelationshipInstruction] {
        &self.relationships
    }

    pub fn lookups(&self) -> &[LookupRecord] {
        &self.lookups
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.len()
    }

    /// Records of each successful save, oldest first.
    pub fn saves(&self) -> &[Vec<SaveRecord>] {
        &self.saves
    }

    /// Makes the next `save` fail with `error` without touching any state.
    pub fn fail_next_save(&mut self, error: SessionError) {
        self.pending_failure = Some(error);
    }

    fn entry_mut(&mut self, entity: &AnyEntity) -> Result<&mut TrackedEntry> {
        let address = entity.address();
        match self.entries.get_mut(&address) {
            Some(entry) => Ok(entry),
            None => Err(SessionError::NotAttached(entity.entity_type()?.to_string()).into()),
        }
    }

    fn remove_stored_row(&mut self, entity: &AnyEntity) -> Result<()> {
        let entity_type = entity.entity_type()?;
        let key = match self.catalog.primary_key_name(entity_type) {
            Some(name) => entity.key_value(name)?,
            None => None,
        };
        let key_name = self.catalog.primary_key_name(entity_type).map(str::to_string);

        let Some(rows) = self.rows.get_mut(entity_type) else {
            return Ok(());
        };

        // Decide every row before touching the list so a failed key read
        // leaves the stored rows intact.
        let mut doomed = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let matches = match row {
                StoredRow::Instance(stored) => stored.ptr_eq(entity),
                StoredRow::Template(_) => match (&key, &key_name) {
                    (Some(key), Some(name)) => row.materialize().key_value(name)?.as_ref() == Some(key),
                    _ => false,
                },
            };
            doomed.push(matches);
        }

        let mut doomed = doomed.into_iter();
        rows.retain(|_| !doomed.next().unwrap_or(false));
        Ok(())
    }
}

impl fmt::Debug for InMemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySession")
            .field("catalog", &self.catalog)
            .field("attached", &self.entries.len())
            .field("relationships", &self.relationships.len())
            .field("lookups", &self.lookups.len())
            .field("saves", &self.saves.len())
            .finish()
    }
}

impl PersistenceSession for InMemorySession {
    fn state(&self, entity: &AnyEntity) -> Result<PersistenceState> {
        Ok(self.state_of(entity))
    }

    fn set_state(&mut self, entity: &AnyEntity, state: PersistenceState) -> Result<()> {
        let entry = self
            .entries
            .entry(entity.address())
            .or_insert_with(|| TrackedEntry {
                entity: entity.clone(),
                state: PersistenceState::Detached,
                modified: BTreeSet::new(),
            });
        entry.state = state;
        entry.modified.clear();
        Ok(())
    }

    fn set_property_modified(&mut self, entity: &AnyEntity, property: &str) -> Result<()> {
        let entry = self.entry_mut(entity)?;
        entry.modified.insert(property.to_string());
        Ok(())
    }

    fn set_relationship_state(
        &mut self,
        child: &AnyEntity,
        parent: &AnyEntity,
        property: &str,
        state: PersistenceState,
    ) -> Result<()> {
        self.relationships.push(RelationshipInstruction {
            child: child.clone(),
            parent: parent.clone(),
            property: property.to_string(),
            state,
        });
        Ok(())
    }

    fn resolve_relationship_kind(&self, entity_type: &str, property: &str) -> Option<RelationshipKind> {
        self.catalog.relationship_kind(entity_type, property)
    }

    fn resolve_foreign_key_name(&self, entity_type: &str, property: &str) -> Option<String> {
        self.catalog
            .foreign_key_name(entity_type, property)
            .map(str::to_string)
    }

    fn resolve_primary_key_name(&self, entity_type: &str) -> Option<String> {
        self.catalog.primary_key_name(entity_type).map(str::to_string)
    }

    fn query_by_foreign_keys(
        &mut self,
        target_type: &str,
        key_name: &str,
        keys: &[KeyValue],
    ) -> Result<Vec<AnyEntity>> {
        if self.catalog.primary_key_name(target_type).is_none() {
            return Err(SessionError::UnknownEntityType(target_type.to_string()).into());
        }

        self.lookups.push(LookupRecord {
            target_type: target_type.to_string(),
            key_name: key_name.to_string(),
            keys: keys.to_vec(),
        });

        let wanted = keys
            .iter()
            .map(|key| key.normalized(KeyComparison::Normalized))
            .collect::<BTreeSet<_>>();

        let mut found = Vec::new();
        for row in self.rows.get(target_type).into_iter().flatten() {
            let entity = row.materialize();
            let key = entity.key_value(key_name)?;
            if key.is_some_and(|key| wanted.contains(&key.normalized(KeyComparison::Normalized))) {
                found.push(entity);
            }
        }

        debug!(
            target_type,
            key_name,
            keys = keys.len(),
            rows = found.len(),
            "in-memory batched lookup"
        );
        Ok(found)
    }

    fn save(&mut self) -> Result<()> {
        if let Some(error) = self.pending_failure.take() {
            return Err(error.into());
        }

        let mut records = Vec::new();
        let mut inserted = Vec::new();
        let mut deleted = Vec::new();
        for entry in self.entries.values() {
            let changed = !matches!(
                entry.state,
                PersistenceState::Unchanged | PersistenceState::Detached
            ) || !entry.modified.is_empty();
            if !changed {
                continue;
            }

            records.push(SaveRecord {
                entity_type: entry.entity.entity_type()?.to_string(),
                state: entry.state,
                modified_properties: entry.modified.iter().cloned().collect(),
            });
            match entry.state {
                PersistenceState::Added => inserted.push(entry.entity.clone()),
                PersistenceState::Deleted => deleted.push(entry.entity.clone()),
                _ => {}
            }
        }

        for entity in inserted {
            let entity_type = entity.entity_type()?.to_string();
            self.rows
                .entry(entity_type)
                .or_default()
                .push(StoredRow::Instance(entity));
        }
        for entity in &deleted {
            self.remove_stored_row(entity)?;
            self.entries.remove(&entity.address());
        }
        for entry in self.entries.values_mut() {
            entry.state = PersistenceState::Unchanged;
            entry.modified.clear();
        }
        self.relationships.clear();

        records.sort_by(|a, b| a.entity_type.cmp(&b.entity_type));
        debug!(changes = records.len(), "in-memory session saved");
        self.saves.push(records);
        Ok(())
    }
}

impl AsyncPersistenceSession for InMemorySession {}
