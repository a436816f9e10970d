// ============================================================================
// Navigation Property Model
// ============================================================================
//
// A navigation property is a typed view of one entity property holding
// related entities: a reference (0/1) or a collection (0..N, ordered).
// Implementations are normally generated by `#[derive(Trackable)]`, which
// classifies `Option<EntityRef<T>>` fields as references and
// `Vec<EntityRef<T>>` fields as collections.
//
// ============================================================================

use crate::core::{AnyEntity, Result, TrackableEntity};

/// A property holding at most one related entity.
#[derive(Debug, Clone)]
pub struct ReferenceProperty {
    pub name: &'static str,
    pub target_type: &'static str,
    pub value: Option<AnyEntity>,
}

/// A property holding an ordered sequence of related entities.
#[derive(Debug, Clone)]
pub struct CollectionProperty {
    pub name: &'static str,
    pub target_type: &'static str,
    pub items: Vec<AnyEntity>,
}

#[derive(Debug, Clone)]
pub enum NavigationProperty {
    Reference(ReferenceProperty),
    Collection(CollectionProperty),
}

/// Kind of a navigation property, fixed by its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    Reference,
    Collection,
}

impl NavigationProperty {
    pub fn reference(
        name: &'static str,
        target_type: &'static str,
        value: Option<AnyEntity>,
    ) -> Self {
        Self::Reference(ReferenceProperty {
            name,
            target_type,
            value,
        })
    }

    pub fn collection(name: &'static str, target_type: &'static str, items: Vec<AnyEntity>) -> Self {
        Self::Collection(CollectionProperty {
            name,
            target_type,
            items,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Reference(reference) => reference.name,
            Self::Collection(collection) => collection.name,
        }
    }

    /// Declared entity type of the related end.
    pub fn target_type(&self) -> &'static str {
        match self {
            Self::Reference(reference) => reference.target_type,
            Self::Collection(collection) => collection.target_type,
        }
    }

    pub fn kind(&self) -> NavigationKind {
        match self {
            Self::Reference(_) => NavigationKind::Reference,
            Self::Collection(_) => NavigationKind::Collection,
        }
    }

    /// Related entities currently held, in order. Empty for a null reference.
    pub fn entities(&self) -> &[AnyEntity] {
        match self {
            Self::Reference(reference) => reference.value.as_slice(),
            Self::Collection(collection) => &collection.items,
        }
    }
}

/// Navigation properties of `entity`, produced lazily from a snapshot.
///
/// The node lock is released before the first item is yielded, so callers are
/// free to lock related nodes while iterating.
pub fn navigation_properties(
    entity: &AnyEntity,
) -> Result<std::vec::IntoIter<NavigationProperty>> {
    Ok(entity.navigation_properties()?.into_iter())
}

/// Filtering helpers over a sequence of navigation properties.
pub trait NavigationPropertiesExt: Iterator<Item = NavigationProperty> + Sized {
    fn references(self) -> impl Iterator<Item = ReferenceProperty> {
        self.filter_map(|property| match property {
            NavigationProperty::Reference(reference) => Some(reference),
            NavigationProperty::Collection(_) => None,
        })
    }

    fn collections(self) -> impl Iterator<Item = CollectionProperty> {
        self.filter_map(|property| match property {
            NavigationProperty::Collection(collection) => Some(collection),
            NavigationProperty::Reference(_) => None,
        })
    }

    /// Keeps only properties whose related end is declared as `target_type`.
    fn of_type(self, target_type: &str) -> impl Iterator<Item = NavigationProperty> {
        self.filter(move |property| property.target_type() == target_type)
    }

    /// Keeps only properties whose related end is declared as `T`.
    fn of_entity<T: TrackableEntity + crate::core::EntityType>(
        self,
    ) -> impl Iterator<Item = NavigationProperty> {
        self.filter(|property| property.target_type() == T::ENTITY_TYPE)
    }
}

impl<I: Iterator<Item = NavigationProperty>> NavigationPropertiesExt for I {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntityRef, ModifiedProperties, TrackingState};
    use crate::Trackable;

    #[derive(Trackable, Default)]
    struct Leaf {
        #[tracking(key)]
        id: i64,
        tracking_state: TrackingState,
        modified_properties: ModifiedProperties,
    }

    #[derive(Trackable, Default)]
    struct Branch {
        #[tracking(key)]
        id: i64,
        primary: Option<EntityRef<Leaf>>,
        leaves: Vec<EntityRef<Leaf>>,
        #[tracking(skip)]
        archived: Vec<EntityRef<Leaf>>,
        tracking_state: TrackingState,
        modified_properties: ModifiedProperties,
    }

    fn leaf(id: i64) -> EntityRef<Leaf> {
        EntityRef::new(Leaf {
            id,
            ..Default::default()
        })
    }

    #[test]
    fn derived_properties_classify_references_and_collections() {
        let branch = AnyEntity::new(Branch {
            id: 1,
            primary: Some(leaf(10)),
            leaves: vec![leaf(11), leaf(12)],
            archived: vec![leaf(13)],
            ..Default::default()
        });

        let props = navigation_properties(&branch).unwrap().collect::<Vec<_>>();
        assert_eq!(props.len(), 2);
        assert_eq!(props[0].name(), "primary");
        assert_eq!(props[0].kind(), NavigationKind::Reference);
        assert_eq!(props[1].name(), "leaves");
        assert_eq!(props[1].target_type(), "Leaf");
        assert_eq!(props[1].entities().len(), 2);
    }

    #[test]
    fn null_reference_is_still_reported() {
        let branch = AnyEntity::new(Branch::default());
        let references = navigation_properties(&branch)
            .unwrap()
            .references()
            .collect::<Vec<_>>();
        assert_eq!(references.len(), 1);
        assert!(references[0].value.is_none());
    }

    #[test]
    fn filters_narrow_by_kind_and_type() {
        let branch = AnyEntity::new(Branch {
            leaves: vec![leaf(1)],
            ..Default::default()
        });

        let collections = navigation_properties(&branch)
            .unwrap()
            .collections()
            .collect::<Vec<_>>();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].items.len(), 1);

        assert_eq!(navigation_properties(&branch).unwrap().of_entity::<Leaf>().count(), 2);
        assert_eq!(navigation_properties(&branch).unwrap().of_type("Branch").count(), 0);
    }

    #[test]
    fn set_reference_rejects_wrong_entity_type() {
        let branch = AnyEntity::new(Branch::default());
        let other = AnyEntity::new(Branch::default());
        let err = branch.set_reference("primary", Some(other)).unwrap_err();
        assert!(matches!(err, crate::TrackingError::TypeMismatch { .. }));

        let unknown = branch.set_reference("missing", None).unwrap_err();
        assert!(matches!(unknown, crate::TrackingError::UnknownProperty { .. }));
    }

    #[test]
    fn remove_from_collection_keeps_remaining_order() {
        let typed = EntityRef::new(Branch {
            leaves: vec![leaf(1), leaf(2), leaf(3)],
            ..Default::default()
        });
        typed.erase().remove_from_collection("leaves", 1).unwrap();

        let ids = typed
            .read()
            .unwrap()
            .leaves
            .iter()
            .map(|leaf| leaf.read().unwrap().id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 3]);
        assert!(typed.erase().remove_from_collection("leaves", 5).is_err());
    }
}
