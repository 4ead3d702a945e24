use crate::group::{ConsensusGroup, GroupId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ordered set of consensus-group handles resident in this process.
///
/// The registry holds the strong references; everything else in the core
/// looks groups up by id and tolerates them having been deregistered.
/// Iteration is in `GroupId` order, which makes planner output
/// deterministic for a given registration set.
#[derive(Default)]
pub struct GroupRegistry {
    groups: BTreeMap<GroupId, Arc<dyn ConsensusGroup>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle, returning the previously registered handle for the
    /// same group if any.
    pub fn insert(&mut self, group: Arc<dyn ConsensusGroup>) -> Option<Arc<dyn ConsensusGroup>> {
        self.groups.insert(group.group(), group)
    }

    pub fn remove(&mut self, id: &GroupId) -> Option<Arc<dyn ConsensusGroup>> {
        self.groups.remove(id)
    }

    pub fn get(&self, id: &GroupId) -> Option<&Arc<dyn ConsensusGroup>> {
        self.groups.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ConsensusGroup>> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
