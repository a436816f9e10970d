// ============================================================================
// Load-Related-Entities
// ============================================================================
//
// After a save, fills reference navigation properties the persistence layer
// left empty. The graph is processed level by level; within a level, lookups
// are grouped by navigation property across all items, so a graph N levels
// deep costs O(N) round trips regardless of how many nodes it has.
//
// Fetched rows pass through a primary-key identity map seeded with the whole
// graph, so a row already present anywhere in the graph is reused and every
// item pointing at the same key ends up sharing one instance.
//
// ============================================================================

use crate::config::SyncOptions;
use crate::core::{AnyEntity, KeyValue, Result, TrackingState};
use crate::navigation::NavigationPropertiesExt;
use crate::session::{AsyncPersistenceSession, PersistenceSession};
use crate::visitation::{PrimaryKeyEquality, VisitationSet};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};

/// A node queued for processing, with whether its parent was Added.
struct LevelItem {
    entity: AnyEntity,
    parent_added: bool,
}

/// One batched lookup: every empty reference `owner_type.property` in a level.
struct BatchLookup {
    property: &'static str,
    target_type: &'static str,
    primary_key: String,
    keys: Vec<KeyValue>,
    members: Vec<(AnyEntity, KeyValue)>,
}

pub(crate) struct LoadRelated<'a, S: PersistenceSession + ?Sized> {
    session: &'a mut S,
    options: &'a SyncOptions,
    identity: VisitationSet<PrimaryKeyEquality>,
    processed: VisitationSet,
    lookups: usize,
}

impl<'a, S: PersistenceSession + ?Sized> LoadRelated<'a, S> {
    pub(crate) fn new(session: &'a mut S, options: &'a SyncOptions) -> Self {
        Self {
            session,
            options,
            identity: VisitationSet::with_equality(PrimaryKeyEquality::new(options.key_comparison)),
            processed: VisitationSet::new(),
            lookups: 0,
        }
    }

    pub(crate) fn run(mut self, roots: &[AnyEntity]) -> Result<()> {
        self.seed_identity_map(roots)?;

        let mut level = root_level(roots);
        let mut depth = 0usize;
        while !level.is_empty() {
            let (accepted, batches) = self.plan_level(level)?;
            for batch in &batches {
                let mut fetched = Vec::new();
                for chunk in batch.keys.chunks(self.options.chunk_size(batch.keys.len())) {
                    self.lookups += 1;
                    fetched.extend(self.session.query_by_foreign_keys(
                        batch.target_type,
                        &batch.primary_key,
                        chunk,
                    )?);
                }
                self.wire(batch, fetched)?;
            }
            level = self.next_level(&accepted)?;
            depth += 1;
        }

        debug!(levels = depth, lookups = self.lookups, "related entities loaded");
        Ok(())
    }

    /// Registers primary keys for every type reachable from `roots` and
    /// records each node in the identity map (first instance wins).
    fn seed_identity_map(&mut self, roots: &[AnyEntity]) -> Result<()> {
        let mut seen = VisitationSet::new();
        let mut nodes = Vec::new();
        let mut stack = roots.to_vec();
        let mut types = HashSet::new();

        while let Some(node) = stack.pop() {
            if !seen.try_visit(&node)? {
                continue;
            }
            types.insert(node.entity_type()?);
            for property in node.navigation_properties()? {
                types.insert(property.target_type());
                stack.extend(property.entities().iter().cloned());
            }
            nodes.push(node);
        }

        for entity_type in types {
            if let Some(primary_key) = self.session.resolve_primary_key_name(entity_type) {
                self.register_primary_key(entity_type, &primary_key)?;
            }
        }
        for node in &nodes {
            self.identity.try_visit(node)?;
        }
        Ok(())
    }

    fn register_primary_key(&mut self, entity_type: &'static str, primary_key: &str) -> Result<()> {
        if self.identity.equality().is_registered(entity_type) {
            return Ok(());
        }

        let mut equality = self.identity.equality().clone();
        equality.register(entity_type, primary_key);

        // Existing entries were keyed without this type's key; re-key them.
        let mut rebuilt = VisitationSet::with_equality(equality);
        for entity in self.identity.entities() {
            rebuilt.try_visit(entity)?;
        }
        self.identity = rebuilt;
        Ok(())
    }

    fn plan_level(&mut self, level: Vec<LevelItem>) -> Result<(Vec<LevelItem>, Vec<BatchLookup>)> {
        let mut accepted = Vec::with_capacity(level.len());
        let mut batches: BTreeMap<(&'static str, &'static str), BatchLookup> = BTreeMap::new();

        for item in level {
            if !self.processed.try_visit(&item.entity)? {
                continue;
            }

            let selected = self.options.load_all
                || item.parent_added
                || item.entity.tracking_state()? == TrackingState::Added;
            if selected {
                self.plan_item(&item.entity, &mut batches)?;
            }
            accepted.push(item);
        }

        let comparison = self.options.key_comparison;
        let batches = batches
            .into_values()
            .map(|mut batch| {
                let mut distinct = HashSet::new();
                batch.keys = batch
                    .members
                    .iter()
                    .filter(|(_, key)| distinct.insert(key.normalized(comparison)))
                    .map(|(_, key)| key.clone())
                    .collect();
                batch
            })
            .collect();

        Ok((accepted, batches))
    }

    fn plan_item(
        &mut self,
        item: &AnyEntity,
        batches: &mut BTreeMap<(&'static str, &'static str), BatchLookup>,
    ) -> Result<()> {
        let owner_type = item.entity_type()?;
        for reference in item.navigation_properties()?.into_iter().references() {
            if reference.value.is_some() {
                continue;
            }

            let Some(foreign_key) = self
                .session
                .resolve_foreign_key_name(owner_type, reference.name)
            else {
                trace!(
                    owner_type,
                    property = reference.name,
                    "no foreign key metadata; property skipped"
                );
                continue;
            };
            let Some(primary_key) = self.session.resolve_primary_key_name(reference.target_type)
            else {
                trace!(
                    target_type = reference.target_type,
                    "no primary key metadata; property skipped"
                );
                continue;
            };
            let Some(key) = item.key_value(&foreign_key)? else {
                continue;
            };

            self.register_primary_key(reference.target_type, &primary_key)?;
            batches
                .entry((owner_type, reference.name))
                .or_insert_with(|| BatchLookup {
                    property: reference.name,
                    target_type: reference.target_type,
                    primary_key,
                    keys: Vec::new(),
                    members: Vec::new(),
                })
                .members
                .push((item.clone(), key));
        }
        Ok(())
    }

    fn wire(&mut self, batch: &BatchLookup, fetched: Vec<AnyEntity>) -> Result<()> {
        let comparison = self.options.key_comparison;
        let mut by_key: HashMap<KeyValue, AnyEntity> = HashMap::new();

        for entity in fetched {
            let Some(key) = entity.key_value(&batch.primary_key)? else {
                continue;
            };
            let canonical = match self.identity.find_visited(&entity)? {
                Some(existing) => existing,
                None => {
                    self.identity.try_visit(&entity)?;
                    entity
                }
            };
            by_key.entry(key.normalized(comparison)).or_insert(canonical);
        }

        let mut wired = 0usize;
        for (item, key) in &batch.members {
            if let Some(related) = by_key.get(&key.normalized(comparison)) {
                item.set_reference(batch.property, Some(related.clone()))?;
                wired += 1;
            }
        }

        debug!(
            target_type = batch.target_type,
            property = batch.property,
            keys = batch.keys.len(),
            wired,
            "batched lookup wired"
        );
        Ok(())
    }

    fn next_level(&mut self, accepted: &[LevelItem]) -> Result<Vec<LevelItem>> {
        let mut next = Vec::new();
        for item in accepted {
            let added = item.entity.tracking_state()? == TrackingState::Added;
            for property in item.entity.navigation_properties()? {
                next.extend(property.entities().iter().map(|child| LevelItem {
                    entity: child.clone(),
                    parent_added: added,
                }));
            }
        }
        Ok(next)
    }
}

impl<'a, S: AsyncPersistenceSession + ?Sized> LoadRelated<'a, S> {
    pub(crate) async fn run_async(mut self, roots: &[AnyEntity]) -> Result<()> {
        self.seed_identity_map(roots)?;

        let mut level = root_level(roots);
        let mut depth = 0usize;
        while !level.is_empty() {
            let (accepted, batches) = self.plan_level(level)?;
            for batch in &batches {
                let mut fetched = Vec::new();
                for chunk in batch.keys.chunks(self.options.chunk_size(batch.keys.len())) {
                    self.lookups += 1;
                    fetched.extend(
                        self.session
                            .query_by_foreign_keys_async(
                                batch.target_type,
                                &batch.primary_key,
                                chunk,
                            )
                            .await?,
                    );
                }
                self.wire(batch, fetched)?;
            }
            level = self.next_level(&accepted)?;
            depth += 1;
        }

        debug!(levels = depth, lookups = self.lookups, "related entities loaded");
        Ok(())
    }
}

fn root_level(roots: &[AnyEntity]) -> Vec<LevelItem> {
    roots
        .iter()
        .map(|root| LevelItem {
            entity: root.clone(),
            parent_added: false,
        })
        .collect()
}
