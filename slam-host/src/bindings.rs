//! Script-facing entry points.
//!
//! Every function here mirrors one native call exposed to game scripts.
//! None of them fail: an internal error is logged and a fixed default comes
//! back instead.
//!
//! | result               | default      |
//! |----------------------|--------------|
//! | numeric query        | `0` / `0.0`  |
//! | n-th dynamic value   | `f32::MIN`   |
//! | name query           | `""`         |
//! | success flag         | `false`      |
//!
//! Entities arrive as `Option<EntityId>`; `None` is a null actor reference
//! and fails with [`SlamError::InvalidEntity`].

use std::path::Path;

use slam_core::codec::IdentifierResolver;
use slam_core::error::{Result, SlamError};
use slam_core::metrics::CounterSnapshot;
use slam_core::store::SaveStore;
use slam_core::{ArousalEngine, DecayLaw, EffectId, EntityArousalState, EntityId, SlamConfig};
use tracing::{debug, error, warn};

use crate::serialization;

/// Log `result`'s error and fall back to `default`.
fn absorb<T>(op: &'static str, default: T, result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e @ SlamError::Logic(_)) => {
            error!(op, error = %e, "Internal invariant violated");
            default
        }
        Err(e @ (SlamError::Database(_) | SlamError::Io(_) | SlamError::Corrupted(_))) => {
            warn!(op, error = %e, "Call failed");
            default
        }
        Err(e) => {
            debug!(op, error = %e, "Call rejected");
            default
        }
    }
}

fn law_of(function_id: i32) -> Result<DecayLaw> {
    DecayLaw::from_raw(function_id).ok_or_else(|| SlamError::out_of_range(function_id, 5))
}

/// The native-call surface over one [`ArousalEngine`].
#[derive(Debug)]
pub struct Bindings {
    engine: ArousalEngine,
}

impl Bindings {
    /// Wrap a fresh engine built from `config`.
    ///
    /// # Errors
    /// Returns [`SlamError::Config`] for an invalid engine configuration.
    pub fn new(config: SlamConfig) -> Result<Self> {
        Ok(Self {
            engine: ArousalEngine::new(config)?,
        })
    }

    /// The wrapped engine.
    #[must_use]
    pub fn engine(&self) -> &ArousalEngine {
        &self.engine
    }

    /// The wrapped engine, mutably.
    pub fn engine_mut(&mut self) -> &mut ArousalEngine {
        &mut self.engine
    }

    fn state(&mut self, who: Option<EntityId>) -> Result<&mut EntityArousalState> {
        let who = who.ok_or(SlamError::InvalidEntity)?;
        Ok(self.engine.state(who))
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Number of allocated static effect ids.
    #[must_use]
    pub fn static_effect_count(&self) -> u32 {
        self.engine.static_effect_count()
    }

    /// Bind `name` and return its id.
    pub fn register_static_effect(&mut self, name: &str) -> u32 {
        self.engine.register_effect(name).0
    }

    /// Unbind `name`. `false` when it was not registered.
    pub fn unregister_static_effect(&mut self, name: &str) -> bool {
        self.engine.unregister_effect(name)
    }

    // ------------------------------------------------------------------
    // Static effects
    // ------------------------------------------------------------------

    /// Whether static effect `idx` is still evolving on `who`.
    pub fn is_static_effect_active(&mut self, who: Option<EntityId>, idx: i32) -> bool {
        let result = EffectId::from_script(idx)
            .and_then(|id| self.state(who).map(|s| s.is_static_effect_active(id)));
        absorb("IsStaticEffectActive", false, result)
    }

    /// Observable value of static effect `idx` (the group product if
    /// grouped).
    pub fn static_effect_value(&mut self, who: Option<EntityId>, idx: i32) -> f32 {
        let result = EffectId::from_script(idx)
            .and_then(|id| self.state(who)?.static_effect_value(id));
        absorb("GetStaticEffectValue", 0.0, result)
    }

    /// Law parameter of static effect `idx`.
    pub fn static_effect_param(&mut self, who: Option<EntityId>, idx: i32) -> f32 {
        let result = EffectId::from_script(idx)
            .and_then(|id| Ok(self.state(who)?.static_effect(id)?.param));
        absorb("GetStaticEffectParam", 0.0, result)
    }

    /// Auxiliary integer of static effect `idx`.
    pub fn static_effect_aux(&mut self, who: Option<EntityId>, idx: i32) -> i32 {
        let result = EffectId::from_script(idx)
            .and_then(|id| Ok(self.state(who)?.static_effect(id)?.aux_int()));
        absorb("GetStaticEffectAux", 0, result)
    }

    /// Attach law `function_id` to static effect `idx`.
    pub fn set_static_arousal_effect(
        &mut self,
        who: Option<EntityId>,
        idx: i32,
        function_id: i32,
        param: f32,
        limit: f32,
        aux: i32,
    ) {
        let result = EffectId::from_script(idx).and_then(|id| {
            let law = law_of(function_id)?;
            self.state(who)?.set_static_effect(id, law, param, limit, aux)
        });
        absorb("SetStaticArousalEffect", (), result);
    }

    /// Overwrite the value of static effect `idx`.
    pub fn set_static_arousal_value(&mut self, who: Option<EntityId>, idx: i32, value: f32) {
        let result = EffectId::from_script(idx)
            .and_then(|id| self.state(who)?.set_static_value(id, value));
        absorb("SetStaticArousalValue", (), result);
    }

    /// Add `diff` to static effect `idx` without crossing `limit`; returns
    /// the change actually applied.
    pub fn mod_static_arousal_value(
        &mut self,
        who: Option<EntityId>,
        idx: i32,
        diff: f32,
        limit: f32,
    ) -> f32 {
        let result = EffectId::from_script(idx)
            .and_then(|id| self.state(who)?.mod_static_value(id, diff, limit));
        absorb("ModStaticArousalValue", 0.0, result)
    }

    /// Store a float in the auxiliary slot of static effect `idx`.
    pub fn set_static_auxillary_float(&mut self, who: Option<EntityId>, idx: i32, value: f32) {
        let result = EffectId::from_script(idx)
            .and_then(|id| self.state(who)?.set_static_aux_float(id, value));
        absorb("SetStaticAuxillaryFloat", (), result);
    }

    /// Store an integer in the auxiliary slot of static effect `idx`.
    pub fn set_static_auxillary_int(&mut self, who: Option<EntityId>, idx: i32, value: i32) {
        let result = EffectId::from_script(idx)
            .and_then(|id| self.state(who)?.set_static_aux_int(id, value));
        absorb("SetStaticAuxillaryInt", (), result);
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Group static effects `idx` and `idx2` on `who`.
    pub fn group_effects(&mut self, who: Option<EntityId>, idx: i32, idx2: i32) -> bool {
        let result = EffectId::from_script(idx).and_then(|a| {
            let b = EffectId::from_script(idx2)?;
            let entity = who.ok_or(SlamError::InvalidEntity)?;
            self.engine.state(entity).group_effects(entity, a, b)
        });
        absorb("GroupEffects", false, result)
    }

    /// Dissolve the group holding static effect `idx`.
    pub fn remove_effect_group(&mut self, who: Option<EntityId>, idx: i32) -> bool {
        let result = EffectId::from_script(idx)
            .and_then(|id| self.state(who)?.remove_group(id))
            .map(|()| true);
        absorb("RemoveEffectGroup", false, result)
    }

    // ------------------------------------------------------------------
    // Dynamic effects
    // ------------------------------------------------------------------

    /// Number of dynamic effects on `who`.
    pub fn dynamic_effect_count(&mut self, who: Option<EntityId>) -> i32 {
        let result = self.state(who).and_then(|s| {
            i32::try_from(s.dynamic_effect_count())
                .map_err(|_| SlamError::Logic("dynamic effect count exceeds i32".to_string()))
        });
        absorb("GetDynamicEffectCount", 0, result)
    }

    /// Name of the `number`-th dynamic effect on `who`.
    pub fn dynamic_effect(&mut self, who: Option<EntityId>, number: i32) -> String {
        let result = self.state(who).and_then(|s| {
            let len = s.dynamic_effect_count();
            usize::try_from(number)
                .ok()
                .and_then(|n| s.dynamic_effect_name(n))
                .map(str::to_string)
                .ok_or_else(|| SlamError::out_of_range(number, len))
        });
        absorb("GetDynamicEffect", String::new(), result)
    }

    /// Value of the `number`-th dynamic effect on `who`.
    pub fn dynamic_effect_value(&mut self, who: Option<EntityId>, number: i32) -> f32 {
        let result = self.state(who).and_then(|s| {
            let len = s.dynamic_effect_count();
            usize::try_from(number)
                .ok()
                .and_then(|n| s.dynamic_effect_value(n))
                .ok_or_else(|| SlamError::out_of_range(number, len))
        });
        absorb("GetDynamicEffectValue", f32::MIN, result)
    }

    /// Value of the dynamic effect `name` on `who`, 0 when absent.
    pub fn dynamic_effect_value_by_name(&mut self, who: Option<EntityId>, name: &str) -> f32 {
        let result = self.state(who).map(|s| s.dynamic_effect_value_by_name(name));
        absorb("GetDynamicEffectValueByName", 0.0, result)
    }

    /// Create or update the dynamic effect `name` on `who`.
    pub fn set_dynamic_arousal_effect(
        &mut self,
        who: Option<EntityId>,
        name: &str,
        initial_value: f32,
        function_id: i32,
        param: f32,
        limit: f32,
    ) {
        let result = law_of(function_id).and_then(|law| {
            self.state(who)?
                .set_dynamic_effect(name, initial_value, law, param, limit);
            Ok(())
        });
        absorb("SetDynamicArousalEffect", (), result);
    }

    /// Add `modifier` to the dynamic effect `name` without crossing `limit`.
    pub fn mod_dynamic_arousal_effect(
        &mut self,
        who: Option<EntityId>,
        name: &str,
        modifier: f32,
        limit: f32,
    ) {
        let result = self
            .state(who)
            .map(|s| s.mod_dynamic_effect(name, modifier, limit));
        absorb("ModDynamicArousalEffect", (), result.map(|_| ()));
    }

    // ------------------------------------------------------------------
    // Aggregate, updates, bookkeeping
    // ------------------------------------------------------------------

    /// Current arousal of `who`.
    pub fn arousal(&mut self, who: Option<EntityId>) -> f32 {
        let result = self.state(who).map(|s| s.arousal());
        absorb("GetArousal", 0.0, result)
    }

    /// Run one update pass for `who` at `game_days_passed`.
    pub fn update_single_actor_arousal(&mut self, who: Option<EntityId>, game_days_passed: f32) {
        let result = who.ok_or(SlamError::InvalidEntity).map(|entity| {
            self.engine.advance(entity, game_days_passed);
        });
        absorb("UpdateSingleActorArousal", (), result);
    }

    /// Drop every state last updated before `last_update_before`; returns
    /// the number removed.
    pub fn clean_up_actors(&mut self, last_update_before: f32) -> i32 {
        let removed = self.engine.sweep(last_update_before);
        i32::try_from(removed).unwrap_or(i32::MAX)
    }

    /// Every entity with a state.
    #[must_use]
    pub fn actor_list(&self) -> Vec<EntityId> {
        self.engine.entities()
    }

    /// Test-and-set advisory lock `lock`.
    #[must_use]
    pub fn try_lock(&self, lock: i32) -> bool {
        self.engine.try_lock(lock)
    }

    /// Release advisory lock `lock`.
    pub fn unlock(&self, lock: i32) {
        self.engine.unlock(lock);
    }

    /// Counter values for dashboards.
    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        self.engine.counters().snapshot()
    }

    // ------------------------------------------------------------------
    // Save-game callbacks
    // ------------------------------------------------------------------

    /// Save callback: persist everything under `slot`. `false` on failure.
    pub fn on_save(&self, store: &SaveStore, slot: &str) -> bool {
        let result = serialization::save_to_store(&self.engine, store, slot).map(|()| true);
        absorb("Save", false, result)
    }

    /// Load callback: replace everything with `slot`'s record. On failure the
    /// engine is left empty and `false` returned.
    pub fn on_load(&mut self, store: &SaveStore, slot: &str, resolver: &dyn IdentifierResolver) -> bool {
        let result = serialization::load_from_store(&mut self.engine, store, slot, resolver);
        absorb("Load", false, result)
    }

    /// Revert callback: drop all state.
    pub fn on_revert(&mut self) {
        self.engine.revert();
    }

    /// Export everything as a standalone framed blob.
    pub fn export_blob(&self, path: &Path) -> bool {
        let result = serialization::export_blob(&self.engine, path).map(|()| true);
        absorb("ExportBlob", false, result)
    }

    /// Replace everything with a standalone framed blob.
    pub fn import_blob(&mut self, path: &Path, resolver: &dyn IdentifierResolver) -> bool {
        let result = serialization::import_blob(&mut self.engine, path, resolver).map(|()| true);
        absorb("ImportBlob", false, result)
    }
}
