use crate::core::{AnyEntity, Result, TrackingState};
use crate::navigation::NavigationProperty;
use crate::visitation::VisitationSet;

/// Resets every reachable node to Unchanged and drops Deleted collection items.
pub(crate) fn accept_graph(roots: &[AnyEntity]) -> Result<usize> {
    let mut visited = VisitationSet::new();
    let mut removed = 0usize;
    for root in roots {
        accept(root, &mut visited, &mut removed)?;
    }
    Ok(removed)
}

fn accept(item: &AnyEntity, visited: &mut VisitationSet, removed: &mut usize) -> Result<()> {
    if !visited.try_visit(item)? {
        return Ok(());
    }

    for property in item.navigation_properties()? {
        match property {
            NavigationProperty::Collection(collection) => {
                // Back to front so earlier indices stay valid after a removal.
                for (index, child) in collection.items.iter().enumerate().rev() {
                    if child.tracking_state()? == TrackingState::Deleted {
                        item.remove_from_collection(collection.name, index)?;
                        *removed += 1;
                    } else {
                        accept(child, visited, removed)?;
                    }
                }
            }
            NavigationProperty::Reference(reference) => {
                if let Some(child) = &reference.value {
                    accept(child, visited, removed)?;
                }
            }
        }
    }

    let mut node = item.write()?;
    node.set_tracking_state(TrackingState::Unchanged);
    node.modified_properties_mut().clear();
    Ok(())
}

/// True when any node reachable from `roots` is not Unchanged.
pub(crate) fn graph_has_changes(roots: &[AnyEntity]) -> Result<bool> {
    let mut visited = VisitationSet::new();
    let mut stack = roots.to_vec();
    while let Some(node) = stack.pop() {
        if !visited.try_visit(&node)? {
            continue;
        }
        if !node.tracking_state()?.is_unchanged() {
            return Ok(true);
        }
        for property in node.navigation_properties()? {
            stack.extend(property.entities().iter().cloned());
        }
    }
    Ok(false)
}
