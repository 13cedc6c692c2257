//! Effect groups — static effects whose values multiply into one term.
//!
//! Groups live in a per-entity arena and are addressed by [`GroupHandle`].
//! Member slots hold the handle, never the group itself; removing a group
//! frees its slot and the caller clears every member's back-reference in the
//! same pass.

use serde::{Deserialize, Serialize};

use crate::types::EffectId;

/// Stable handle of a group inside one entity's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupHandle(pub(crate) usize);

/// A cluster of static effects contributing the product of their values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectGroup {
    /// Member effect ids in join order.
    pub members: Vec<EffectId>,
    /// Product of member values at the last recomputation.
    pub value: f32,
}

/// Slot arena of groups. Freed slots are reused by later insertions.
#[derive(Debug, Clone, Default)]
pub struct GroupArena {
    slots: Vec<Option<EffectGroup>>,
}

impl GroupArena {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a group and return its handle.
    pub fn insert(&mut self, group: EffectGroup) -> GroupHandle {
        if let Some(idx) = self.slots.iter().position(Option::is_none) {
            self.slots[idx] = Some(group);
            GroupHandle(idx)
        } else {
            self.slots.push(Some(group));
            GroupHandle(self.slots.len() - 1)
        }
    }

    /// Look up a live group.
    #[must_use]
    pub fn get(&self, handle: GroupHandle) -> Option<&EffectGroup> {
        self.slots.get(handle.0).and_then(Option::as_ref)
    }

    /// Look up a live group mutably.
    pub fn get_mut(&mut self, handle: GroupHandle) -> Option<&mut EffectGroup> {
        self.slots.get_mut(handle.0).and_then(Option::as_mut)
    }

    /// Take a group out of the arena, invalidating its handle.
    pub fn remove(&mut self, handle: GroupHandle) -> Option<EffectGroup> {
        let group = self.slots.get_mut(handle.0)?.take();
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
        group
    }

    /// Handles of all live groups, in slot order.
    #[must_use]
    pub fn handles(&self) -> Vec<GroupHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|_| GroupHandle(idx)))
            .collect()
    }

    /// Live groups in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (GroupHandle, &EffectGroup)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|g| (GroupHandle(idx), g)))
    }

    /// Number of live groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether no group is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
