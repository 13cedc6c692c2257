//! Per-entity arousal state.
//!
//! `arousal` always equals the sum of every ungrouped static value, every
//! dynamic value and every group value. Mutations keep that sum by folding
//! deltas in; it is only recomputed from scratch when a save is loaded.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error};

use crate::effect::{clamped_add, EffectRecord};
use crate::error::{Result, SlamError};
use crate::group::{EffectGroup, GroupArena, GroupHandle};
use crate::types::{DecayLaw, EffectId, EntityId};

/// Highest number of groups one entity may hold; the save format stores the
/// count in a single byte.
pub const MAX_GROUPS: usize = u8::MAX as usize;

/// Arousal bookkeeping for one entity.
#[derive(Debug, Clone, Default)]
pub struct EntityArousalState {
    pub(crate) arousal: f32,
    pub(crate) last_update: f32,
    pub(crate) static_effects: Vec<EffectRecord>,
    pub(crate) static_group_of: Vec<Option<GroupHandle>>,
    pub(crate) active_static: BTreeSet<EffectId>,
    pub(crate) dynamic_effects: BTreeMap<String, EffectRecord>,
    pub(crate) active_dynamic: BTreeSet<String>,
    pub(crate) groups: GroupArena,
}

impl EntityArousalState {
    /// Create a state with `slot_count` zeroed static slots.
    #[must_use]
    pub fn new(slot_count: usize) -> Self {
        Self {
            static_effects: vec![EffectRecord::new(); slot_count],
            static_group_of: vec![None; slot_count],
            ..Self::default()
        }
    }

    /// Current aggregate arousal.
    #[must_use]
    pub fn arousal(&self) -> f32 {
        self.arousal
    }

    /// Game time of the last update pass (0 before the first one).
    #[must_use]
    pub fn last_update(&self) -> f32 {
        self.last_update
    }

    /// Number of static effect slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.static_effects.len()
    }

    /// Sum of all contributions, computed from scratch.
    #[must_use]
    pub fn recompute_arousal(&self) -> f32 {
        let ungrouped: f32 = self
            .static_effects
            .iter()
            .zip(&self.static_group_of)
            .filter(|(_, group)| group.is_none())
            .map(|(effect, _)| effect.value)
            .sum();
        let dynamic: f32 = self.dynamic_effects.values().map(|e| e.value).sum();
        let grouped: f32 = self.groups.iter().map(|(_, g)| g.value).sum();
        ungrouped + dynamic + grouped
    }

    // ------------------------------------------------------------------
    // Registry fan-out
    // ------------------------------------------------------------------

    /// Append a zeroed slot for a newly allocated effect id.
    pub fn on_effect_allocated(&mut self) {
        self.static_effects.push(EffectRecord::new());
        self.static_group_of.push(None);
    }

    /// Reset the slot of an unregistered effect: zero value, no law, no group.
    ///
    /// # Errors
    /// Propagates [`SlamError::OutOfRange`] or [`SlamError::Logic`].
    pub fn on_effect_released(&mut self, id: EffectId) -> Result<()> {
        self.set_static_value(id, 0.0)?;
        self.set_static_effect(id, DecayLaw::None, 0.0, 0.0, 0)?;
        if self.group_of(id)?.is_some() {
            self.remove_group(id)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Static effects
    // ------------------------------------------------------------------

    fn slot(&self, id: EffectId) -> Result<usize> {
        let idx = id.index();
        if idx < self.static_effects.len() {
            Ok(idx)
        } else {
            Err(SlamError::out_of_range(id.0, self.static_effects.len()))
        }
    }

    /// The record stored in slot `id`.
    ///
    /// # Errors
    /// Returns [`SlamError::OutOfRange`] for an unknown slot.
    pub fn static_effect(&self, id: EffectId) -> Result<&EffectRecord> {
        let idx = self.slot(id)?;
        Ok(&self.static_effects[idx])
    }

    /// Group currently holding slot `id`.
    ///
    /// # Errors
    /// Returns [`SlamError::OutOfRange`] for an unknown slot.
    pub fn group_of(&self, id: EffectId) -> Result<Option<GroupHandle>> {
        let idx = self.slot(id)?;
        Ok(self.static_group_of[idx])
    }

    /// Look up a live group.
    #[must_use]
    pub fn group(&self, handle: GroupHandle) -> Option<&EffectGroup> {
        self.groups.get(handle)
    }

    /// All live groups.
    #[must_use]
    pub fn groups(&self) -> &GroupArena {
        &self.groups
    }

    /// Observable value of slot `id`: the group's product when grouped,
    /// otherwise the slot's own value.
    ///
    /// # Errors
    /// Returns [`SlamError::OutOfRange`] for an unknown slot.
    pub fn static_effect_value(&self, id: EffectId) -> Result<f32> {
        let idx = self.slot(id)?;
        if let Some(group) = self.static_group_of[idx].and_then(|h| self.groups.get(h)) {
            return Ok(group.value);
        }
        Ok(self.static_effects[idx].value)
    }

    /// Whether slot `id` is scheduled for time-stepped evaluation.
    #[must_use]
    pub fn is_static_effect_active(&self, id: EffectId) -> bool {
        self.active_static.contains(&id)
    }

    /// Ids scheduled for evaluation.
    pub fn active_static(&self) -> impl Iterator<Item = EffectId> + '_ {
        self.active_static.iter().copied()
    }

    /// Replace the law of slot `id`, keeping its value.
    ///
    /// # Errors
    /// Returns [`SlamError::OutOfRange`] for an unknown slot.
    pub fn set_static_effect(
        &mut self,
        id: EffectId,
        law: DecayLaw,
        param: f32,
        limit: f32,
        aux: i32,
    ) -> Result<()> {
        let idx = self.slot(id)?;
        let effect = &mut self.static_effects[idx];

        // Grouped slots stay listed; the update pass skips them and lets the
        // group evaluate their law.
        if law.is_active() && !effect.law.is_active() {
            self.active_static.insert(id);
        } else if !law.is_active() && effect.law.is_active() {
            self.active_static.remove(&id);
        }

        effect.set_law(law, param, limit, aux);
        Ok(())
    }

    /// Overwrite the value of slot `id`.
    ///
    /// Grouped slots leave `arousal` alone; the group's next recomputation
    /// absorbs the change.
    ///
    /// # Errors
    /// Returns [`SlamError::OutOfRange`] for an unknown slot.
    pub fn set_static_value(&mut self, id: EffectId, value: f32) -> Result<()> {
        let idx = self.slot(id)?;
        let effect = &mut self.static_effects[idx];
        let diff = value - effect.value;
        effect.value = value;
        if self.static_group_of[idx].is_none() {
            self.arousal += diff;
        }
        Ok(())
    }

    /// Add `delta` to slot `id` without crossing `limit`.
    ///
    /// Returns the delta actually applied.
    ///
    /// # Errors
    /// Returns [`SlamError::OutOfRange`] for an unknown slot.
    pub fn mod_static_value(&mut self, id: EffectId, delta: f32, limit: f32) -> Result<f32> {
        let idx = self.slot(id)?;
        let effect = &mut self.static_effects[idx];
        let value = clamped_add(effect.value, delta, limit);
        let applied = value - effect.value;
        effect.value = value;
        if self.static_group_of[idx].is_none() {
            self.arousal += applied;
        }
        Ok(applied)
    }

    /// Store an integer in the auxiliary slot of `id`.
    ///
    /// # Errors
    /// Returns [`SlamError::OutOfRange`] for an unknown slot.
    pub fn set_static_aux_int(&mut self, id: EffectId, value: i32) -> Result<()> {
        let idx = self.slot(id)?;
        self.static_effects[idx].set_aux_int(value);
        Ok(())
    }

    /// Store a float in the auxiliary slot of `id`.
    ///
    /// # Errors
    /// Returns [`SlamError::OutOfRange`] for an unknown slot.
    pub fn set_static_aux_float(&mut self, id: EffectId, value: f32) -> Result<()> {
        let idx = self.slot(id)?;
        self.static_effects[idx].set_aux_float(value);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Join `id_a` and `id_b` into one multiplicative group.
    ///
    /// An ungrouped slot joins the other's group, or both form a new one.
    /// Returns `false` when the two already sit in different groups.
    ///
    /// # Errors
    /// Returns [`SlamError::OutOfRange`] for an unknown slot or when a new
    /// group would exceed [`MAX_GROUPS`].
    pub fn group_effects(&mut self, who: EntityId, id_a: EffectId, id_b: EffectId) -> Result<bool> {
        let idx_a = self.slot(id_a)?;
        let idx_b = self.slot(id_b)?;

        let target = match (self.static_group_of[idx_a], self.static_group_of[idx_b]) {
            (Some(a), Some(b)) => return Ok(a == b),
            (Some(existing), None) | (None, Some(existing)) => existing,
            (None, None) => {
                if self.groups.len() >= MAX_GROUPS {
                    return Err(SlamError::out_of_range(
                        i64::try_from(self.groups.len()).unwrap_or(i64::MAX),
                        MAX_GROUPS,
                    ));
                }
                self.groups.insert(EffectGroup::default())
            }
        };

        for (id, idx) in [(id_a, idx_a), (id_b, idx_b)] {
            if self.static_group_of[idx].is_some() {
                continue;
            }
            self.static_group_of[idx] = Some(target);
            self.active_static.remove(&id);
            self.arousal -= self.static_effects[idx].value;
            if let Some(group) = self.groups.get_mut(target) {
                group.members.push(id);
            }
        }

        self.recompute_group(target, 0.0, who);
        debug!(entity = %who, a = %id_a, b = %id_b, "Grouped effects");
        Ok(true)
    }

    /// Dissolve the group holding slot `id`, restoring its members as
    /// independent terms.
    ///
    /// # Errors
    /// Returns [`SlamError::OutOfRange`] for an unknown slot and
    /// [`SlamError::Logic`] when the slot's group cannot be found.
    pub fn remove_group(&mut self, id: EffectId) -> Result<()> {
        let idx = self.slot(id)?;
        let group = self.static_group_of[idx]
            .and_then(|handle| self.groups.remove(handle))
            .ok_or_else(|| {
                error!(effect = %id, "Group to remove is not tracked");
                SlamError::Logic(format!("group of effect {id} does not exist"))
            })?;

        self.arousal -= group.value;
        for member in group.members {
            let midx = self.slot(member)?;
            self.static_group_of[midx] = None;
            let effect = &self.static_effects[midx];
            self.arousal += effect.value;
            if effect.law.is_active() {
                self.active_static.insert(member);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dynamic effects
    // ------------------------------------------------------------------

    fn prune_dynamic(&mut self, name: &str) {
        if self.dynamic_effects.get(name).is_some_and(EffectRecord::is_dormant) {
            self.dynamic_effects.remove(name);
        }
    }

    /// Create or update the dynamic effect `name`.
    ///
    /// A zero `initial_value` keeps the current value.
    pub fn set_dynamic_effect(
        &mut self,
        name: &str,
        initial_value: f32,
        law: DecayLaw,
        param: f32,
        limit: f32,
    ) {
        let effect = self.dynamic_effects.entry(name.to_string()).or_default();

        if law.is_active() && !effect.law.is_active() {
            self.active_dynamic.insert(name.to_string());
        } else if !law.is_active() && effect.law.is_active() {
            self.active_dynamic.remove(name);
        }

        effect.set_law(law, param, limit, 0);
        if initial_value != 0.0 {
            self.arousal += initial_value - effect.value;
            effect.value = initial_value;
        }
        self.prune_dynamic(name);
    }

    /// Add `modifier` to the dynamic effect `name` without crossing `limit`.
    ///
    /// Returns the delta actually applied.
    pub fn mod_dynamic_effect(&mut self, name: &str, modifier: f32, limit: f32) -> f32 {
        let effect = self.dynamic_effects.entry(name.to_string()).or_default();
        let value = clamped_add(effect.value, modifier, limit);
        let applied = value - effect.value;
        effect.value = value;
        self.arousal += applied;
        self.prune_dynamic(name);
        applied
    }

    /// Number of live dynamic effects.
    #[must_use]
    pub fn dynamic_effect_count(&self) -> usize {
        self.dynamic_effects.len()
    }

    /// Name of the `n`-th dynamic effect in name order.
    #[must_use]
    pub fn dynamic_effect_name(&self, n: usize) -> Option<&str> {
        self.dynamic_effects.keys().nth(n).map(String::as_str)
    }

    /// Value of the `n`-th dynamic effect in name order.
    #[must_use]
    pub fn dynamic_effect_value(&self, n: usize) -> Option<f32> {
        self.dynamic_effects.values().nth(n).map(|e| e.value)
    }

    /// The dynamic effect called `name`.
    #[must_use]
    pub fn dynamic_effect(&self, name: &str) -> Option<&EffectRecord> {
        self.dynamic_effects.get(name)
    }

    /// Value of the dynamic effect `name`, or 0 when absent.
    #[must_use]
    pub fn dynamic_effect_value_by_name(&self, name: &str) -> f32 {
        self.dynamic_effects.get(name).map_or(0.0, |e| e.value)
    }

    /// Whether the dynamic effect `name` is scheduled for evaluation.
    #[must_use]
    pub fn is_dynamic_effect_active(&self, name: &str) -> bool {
        self.active_dynamic.contains(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
