//! [`Group`] tree: leaves are observation-groups, internal nodes are
//! AND-groups. OR-groups are a real variant but are unscored — see
//! `RankerError::Unsupported` in [`crate::ranker`].
//!
//! Re-modeled per the design note on "dynamic dispatch on group kind":
//! a tagged variant with an exhaustive match, rather than an `isinstance`
//! chain. Back-references from a child to its parent (needed to group
//! visits by scheduling group in [`crate::accounting`]) are kept as a
//! lookup table keyed by [`UniqueGroupID`], never as a pointer, per the
//! design note on group-tree cycles.

use super::observation::Observation;
use super::program::ProgramID;

/// `(program_id, local_id)`, unique across the whole scheduling request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniqueGroupID {
    pub program_id: ProgramID,
    pub local_id: String,
}

#[derive(Debug, Clone)]
pub enum Group {
    /// A leaf: a single observation.
    Observation { id: UniqueGroupID, obs: Box<Observation> },
    /// All children must be scheduled. `is_scheduling_group` marks a
    /// "scheduling group" per the glossary: children must be placed
    /// contiguously or charged together. Nesting a scheduling group
    /// inside another is forbidden — see
    /// `crate::selector::SelectorError::NestedSchedulingGroup`.
    And {
        id: UniqueGroupID,
        is_scheduling_group: bool,
        children: Vec<Group>,
    },
    /// Not currently implemented; an explicit non-goal. Present as a real
    /// variant so the match stays exhaustive, but scoring it is an error.
    Or { id: UniqueGroupID, children: Vec<Group> },
}

impl Group {
    #[must_use]
    pub fn unique_id(&self) -> &UniqueGroupID {
        match self {
            Group::Observation { id, .. } | Group::And { id, .. } | Group::Or { id, .. } => id,
        }
    }

    /// All observations reachable from this group, in tree order.
    pub fn observations(&self) -> Vec<&Observation> {
        match self {
            Group::Observation { obs, .. } => vec![obs.as_ref()],
            Group::And { children, .. } | Group::Or { children, .. } => {
                children.iter().flat_map(Group::observations).collect()
            }
        }
    }

    #[must_use]
    pub fn is_observation_group(&self) -> bool { matches!(self, Group::Observation { .. }) }

    /// Returns `true` if this AND-group (or any AND descendant) is a
    /// scheduling group nested inside another scheduling group.
    #[must_use]
    pub fn has_nested_scheduling_group(&self) -> bool { Self::check_nested(self, false) }

    fn check_nested(group: &Group, inside_scheduling: bool) -> bool {
        match group {
            Group::Observation { .. } => false,
            Group::And { is_scheduling_group, children, .. } => {
                if inside_scheduling && *is_scheduling_group {
                    return true;
                }
                let now_inside = inside_scheduling || *is_scheduling_group;
                children.iter().any(|c| Self::check_nested(c, now_inside))
            }
            Group::Or { children, .. } => children.iter().any(|c| Self::check_nested(c, inside_scheduling)),
        }
    }
}
