// ============================================================================
// Apply-Changes
// ============================================================================
//
// Walks a disconnected graph and tells the persistence session what each node
// means: insert, update (whole row or named properties), delete, leave alone,
// or add/remove a many-to-many link. The decision for a node depends on its
// own tracking state, the state its parent was applied with, and the kind of
// relationship linking the two.
//
// Children are applied in four passes by their own state, in the order
// Added, Unchanged, Modified, Deleted.
//
// ============================================================================

use crate::config::{DeletedWithAddedPolicy, SyncOptions};
use crate::core::{AnyEntity, PersistenceState, Result, TrackingError, TrackingState};
use crate::navigation::NavigationProperty;
use crate::session::{PersistenceSession, RelationshipCache, RelationshipKind};
use crate::visitation::VisitationSet;
use tracing::{debug, trace};

const PASS_ORDER: [TrackingState; 4] = [
    TrackingState::Added,
    TrackingState::Unchanged,
    TrackingState::Modified,
    TrackingState::Deleted,
];

/// How a child node is reached from its parent.
struct Link<'p> {
    parent: &'p AnyEntity,
    /// State the parent was applied with, which may differ from its own
    /// tracking state (e.g. a child inserted as part of an Added parent).
    parent_state: TrackingState,
    property: &'static str,
    kind: Option<RelationshipKind>,
}

impl Link<'_> {
    fn is_many_to_many(&self) -> bool {
        self.kind == Some(RelationshipKind::ManyToMany)
    }

    fn is_many_to_one(&self) -> bool {
        self.kind == Some(RelationshipKind::ManyToOne)
    }
}

pub(crate) struct ApplyChanges<'a, S: PersistenceSession + ?Sized> {
    session: &'a mut S,
    options: &'a SyncOptions,
    relationships: RelationshipCache,
}

impl<'a, S: PersistenceSession + ?Sized> ApplyChanges<'a, S> {
    pub(crate) fn new(session: &'a mut S, options: &'a SyncOptions) -> Self {
        Self {
            session,
            options,
            relationships: RelationshipCache::new(),
        }
    }

    pub(crate) fn run(mut self, roots: &[AnyEntity]) -> Result<()> {
        let mut visited = VisitationSet::new();
        for root in roots {
            self.apply(root, None, &mut visited)?;
        }
        debug!(
            visited = visited.len(),
            relationship_kinds = self.relationships.len(),
            "changes applied"
        );
        Ok(())
    }

    fn apply(
        &mut self,
        item: &AnyEntity,
        link: Option<&Link<'_>>,
        visited: &mut VisitationSet,
    ) -> Result<()> {
        if !visited.try_visit(item)? {
            return Ok(());
        }
        let state = item.tracking_state()?;

        if let Some(link) = link {
            if link.is_many_to_many() {
                return self.apply_many_to_many(item, state, link, visited);
            }

            if link.is_many_to_one() {
                // A referenced row cannot be deleted by unhooking it from the referrer.
                if state == TrackingState::Deleted {
                    return self.set_state(item, PersistenceState::Unchanged);
                }
            } else {
                match link.parent_state {
                    TrackingState::Added if state == TrackingState::Deleted => return Ok(()),
                    TrackingState::Added => return self.insert(item, visited),
                    TrackingState::Deleted => return Ok(()),
                    _ => {}
                }
            }
        }

        match state {
            TrackingState::Added => self.insert(item, visited),
            TrackingState::Deleted => self.delete(item, visited),
            TrackingState::Modified | TrackingState::Unchanged => {
                self.apply_row_state(item, state)?;
                self.apply_properties(item, state, visited)
            }
        }
    }

    /// Many-to-many children: the link carries the Added/Deleted intent, the
    /// child row itself is only ever updated.
    fn apply_many_to_many(
        &mut self,
        item: &AnyEntity,
        state: TrackingState,
        link: &Link<'_>,
        visited: &mut VisitationSet,
    ) -> Result<()> {
        let effective = if link.parent_state == TrackingState::Added {
            TrackingState::Added
        } else {
            state
        };

        let row_state = match effective {
            TrackingState::Added | TrackingState::Deleted => {
                let row_state = if state == TrackingState::Modified {
                    TrackingState::Modified
                } else {
                    TrackingState::Unchanged
                };
                self.apply_row_state(item, row_state)?;
                trace!(
                    property = link.property,
                    state = %effective,
                    "many-to-many link"
                );
                self.session.set_relationship_state(
                    item,
                    link.parent,
                    link.property,
                    effective.into(),
                )?;
                row_state
            }
            TrackingState::Modified | TrackingState::Unchanged => {
                self.apply_row_state(item, state)?;
                state
            }
        };

        self.apply_properties(item, row_state, visited)
    }

    fn insert(&mut self, item: &AnyEntity, visited: &mut VisitationSet) -> Result<()> {
        self.set_state(item, PersistenceState::Added)?;
        self.apply_properties(item, TrackingState::Added, visited)
    }

    /// Deletes `item` in two passes: owned descendants are first forced to
    /// Unchanged on a disposable copy of the visitation set, then the node and
    /// any explicitly Deleted descendants are marked Deleted.
    fn delete(&mut self, item: &AnyEntity, visited: &mut VisitationSet) -> Result<()> {
        let mut scratch = visited.clone();
        self.force_unchanged(item, &mut scratch)?;
        self.mark_deleted(item, visited)
    }

    fn force_unchanged(&mut self, node: &AnyEntity, scratch: &mut VisitationSet) -> Result<()> {
        for (property, kind) in self.classified_properties(node)? {
            // Referenced rows are independent of the node being deleted.
            if kind == Some(RelationshipKind::ManyToOne) {
                continue;
            }

            for child in property.entities() {
                if !scratch.try_visit(child)? {
                    continue;
                }
                let child_state = child.tracking_state()?;

                if child_state == TrackingState::Added {
                    match self.options.deleted_with_added {
                        DeletedWithAddedPolicy::Reject => {
                            return Err(TrackingError::DeletedWithAddedChildren {
                                entity_type: node.entity_type()?.to_string(),
                                property: property.name().to_string(),
                            });
                        }
                        DeletedWithAddedPolicy::Skip => {
                            debug!(
                                property = property.name(),
                                "skipping Added descendant of a Deleted node"
                            );
                            continue;
                        }
                    }
                }

                // The linked row outlives the node; only the link goes away.
                if kind == Some(RelationshipKind::ManyToMany) {
                    let row_state = if child_state == TrackingState::Modified {
                        TrackingState::Modified
                    } else {
                        TrackingState::Unchanged
                    };
                    self.apply_row_state(child, row_state)?;
                    continue;
                }

                self.set_state(child, PersistenceState::Unchanged)?;
                self.force_unchanged(child, scratch)?;
            }
        }
        Ok(())
    }

    fn mark_deleted(&mut self, node: &AnyEntity, visited: &mut VisitationSet) -> Result<()> {
        self.set_state(node, PersistenceState::Deleted)?;
        self.walk_deleted_subgraph(node, TrackingState::Deleted, visited)
    }

    fn walk_deleted_subgraph(
        &mut self,
        node: &AnyEntity,
        applied: TrackingState,
        visited: &mut VisitationSet,
    ) -> Result<()> {
        for (property, kind) in self.classified_properties(node)? {
            match kind {
                Some(RelationshipKind::ManyToMany) => {
                    for child in property.entities() {
                        visited.try_visit(child)?;
                        // An Added row was never linked; only reachable here under Skip.
                        if applied == TrackingState::Deleted
                            && child.tracking_state()? != TrackingState::Added
                        {
                            self.session.set_relationship_state(
                                child,
                                node,
                                property.name(),
                                PersistenceState::Deleted,
                            )?;
                        }
                    }
                }
                Some(RelationshipKind::ManyToOne) => {
                    let link = Link {
                        parent: node,
                        parent_state: applied,
                        property: property.name(),
                        kind,
                    };
                    for child in property.entities() {
                        self.apply(child, Some(&link), visited)?;
                    }
                }
                _ => {
                    for child in property.entities() {
                        if !visited.try_visit(child)? {
                            continue;
                        }
                        match child.tracking_state()? {
                            TrackingState::Deleted => self.mark_deleted(child, visited)?,
                            // Rejected during the first pass unless the policy skips it.
                            TrackingState::Added => {}
                            _ => self.walk_deleted_subgraph(child, TrackingState::Unchanged, visited)?,
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_properties(
        &mut self,
        item: &AnyEntity,
        applied: TrackingState,
        visited: &mut VisitationSet,
    ) -> Result<()> {
        let properties = self.classified_properties(item)?;
        for pass in PASS_ORDER {
            for (property, kind) in &properties {
                let link = Link {
                    parent: item,
                    parent_state: applied,
                    property: property.name(),
                    kind: *kind,
                };
                for child in property.entities() {
                    if child.tracking_state()? != pass {
                        continue;
                    }
                    self.apply(child, Some(&link), visited)?;
                }
            }
        }
        Ok(())
    }

    /// Sets the row state, flagging individual properties for partial updates.
    fn apply_row_state(&mut self, item: &AnyEntity, state: TrackingState) -> Result<()> {
        if state == TrackingState::Modified {
            let modified = item.modified_properties()?;
            if !modified.is_empty() {
                self.set_state(item, PersistenceState::Unchanged)?;
                for property in modified.iter() {
                    self.session.set_property_modified(item, property)?;
                }
                return Ok(());
            }
        }
        self.set_state(item, state.into())
    }

    fn set_state(&mut self, item: &AnyEntity, state: PersistenceState) -> Result<()> {
        trace!(entity = ?item, ?state, "set session state");
        self.session.set_state(item, state)
    }

    fn classified_properties(
        &mut self,
        item: &AnyEntity,
    ) -> Result<Vec<(NavigationProperty, Option<RelationshipKind>)>> {
        let entity_type = item.entity_type()?;
        let properties = item.navigation_properties()?;
        Ok(properties
            .into_iter()
            .map(|property| {
                let kind = self
                    .relationships
                    .resolve(&*self.session, entity_type, property.name());
                (property, kind)
            })
            .collect())
    }
}
