use crate::core::{AnyEntity, Result};
use crate::visitation::{CorrelationEquality, VisitationSet};

/// An instance from the caller's graph and its round-tripped counterpart.
#[derive(Debug, Clone)]
pub struct CorrelatedPair {
    pub original: AnyEntity,
    pub returned: AnyEntity,
}

/// Pairs every node reachable from `returned` with the node reachable from
/// `originals` that carries the same correlation key.
///
/// Nodes without a correlation key are never paired.
pub(crate) fn correlate_graphs(
    originals: &[AnyEntity],
    returned: &[AnyEntity],
) -> Result<Vec<CorrelatedPair>> {
    let mut keyed = VisitationSet::with_equality(CorrelationEquality);
    for node in reachable(originals)? {
        if node.correlation_key()?.is_some() {
            keyed.try_visit(&node)?;
        }
    }

    let mut pairs = Vec::new();
    for node in reachable(returned)? {
        if node.correlation_key()?.is_none() {
            continue;
        }
        if let Some(original) = keyed.find_visited(&node)? {
            pairs.push(CorrelatedPair {
                original,
                returned: node,
            });
        }
    }
    Ok(pairs)
}

/// Distinct nodes reachable from `roots`, depth first in declaration order.
fn reachable(roots: &[AnyEntity]) -> Result<Vec<AnyEntity>> {
    let mut visited = VisitationSet::new();
    let mut nodes = Vec::new();
    let mut stack = roots.iter().rev().cloned().collect::<Vec<_>>();

    while let Some(node) = stack.pop() {
        if !visited.try_visit(&node)? {
            continue;
        }
        for property in node.navigation_properties()?.iter().rev() {
            stack.extend(property.entities().iter().rev().cloned());
        }
        nodes.push(node);
    }
    Ok(nodes)
}
