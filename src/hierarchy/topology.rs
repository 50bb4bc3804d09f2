use super::error::MalformedHierarchyError;
use super::storage::{LocationRegistry, Slot};
use std::collections::VecDeque;

/// Verifies that following parent links from every slot terminates at a root.
///
/// Uses the same three-colour DFS as a dependency sort: a slot seen again while
/// its own parent chain is still being walked closes a cycle.
pub fn check_acyclic(registry: &LocationRegistry) -> Result<(), MalformedHierarchyError> {
    let count = registry.count();
    let mut state = vec![VisitState::None; count];

    for i in 0..count {
        if state[i] == VisitState::None {
            visit(Slot::new(i), registry, &mut state)?;
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    None,
    Visiting,
    Visited,
}

// Parent chains can be as deep as the hierarchy, so walk iteratively.
fn visit(
    start: Slot,
    registry: &LocationRegistry,
    state: &mut [VisitState],
) -> Result<(), MalformedHierarchyError> {
    let mut chain = Vec::new();
    let mut cursor = Some(start);

    while let Some(slot) = cursor {
        match state[slot.index()] {
            VisitState::Visited => break,
            VisitState::Visiting => {
                return Err(MalformedHierarchyError::Cycle { location: registry.id(slot) });
            }
            VisitState::None => {
                state[slot.index()] = VisitState::Visiting;
                chain.push(slot);
                cursor = registry.parents[slot.index()];
            }
        }
    }

    for slot in chain {
        state[slot.index()] = VisitState::Visited;
    }
    Ok(())
}

/// Breadth-first order from `root`, children visited in id order.
pub fn breadth_first(registry: &LocationRegistry, root: Slot) -> Vec<Slot> {
    let mut order = Vec::with_capacity(registry.count());
    let mut queue = VecDeque::from([root]);

    while let Some(slot) = queue.pop_front() {
        order.push(slot);
        queue.extend(registry.get_children(slot).iter().copied());
    }
    order
}

/// Assigns depth below the root to every reachable slot.
pub fn assign_levels(registry: &mut LocationRegistry, root: Slot) {
    for slot in breadth_first(registry, root) {
        let level = match registry.parents[slot.index()] {
            Some(parent) => registry.levels[parent.index()] + 1,
            None => 0,
        };
        registry.levels[slot.index()] = level;
    }
}
