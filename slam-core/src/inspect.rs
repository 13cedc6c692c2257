//! Human-readable snapshot of one entity's effects, for debug consoles and
//! log dumps.

use serde::Serialize;

use crate::engine::ArousalEngine;
use crate::error::Result;
use crate::types::{DecayLaw, EntityId};

/// One non-zero or active static slot.
#[derive(Debug, Clone, Serialize)]
pub struct StaticEntry {
    /// Registered name.
    pub name: String,
    /// Slot id.
    pub id: u32,
    /// Observable value (the group product when grouped).
    pub value: f32,
    /// Current law.
    pub law: DecayLaw,
    /// Whether the slot is still evaluated each pass.
    pub active: bool,
    /// Index of the group holding the slot, if any.
    pub group: Option<usize>,
}

/// One dynamic effect.
#[derive(Debug, Clone, Serialize)]
pub struct DynamicEntry {
    /// Entity-local key.
    pub name: String,
    /// Current value.
    pub value: f32,
    /// Current law.
    pub law: DecayLaw,
    /// Whether the effect is still evaluated each pass.
    pub active: bool,
}

/// Serializable view of an entity's state.
#[derive(Debug, Clone, Serialize)]
pub struct EntitySummary {
    /// Entity id as hex.
    pub entity: String,
    /// Aggregate arousal.
    pub arousal: f32,
    /// Game time of the last update.
    pub last_update: f32,
    /// Static slots that are non-zero, active or grouped.
    pub static_effects: Vec<StaticEntry>,
    /// All dynamic effects in name order.
    pub dynamic_effects: Vec<DynamicEntry>,
    /// Number of live groups.
    pub groups: usize,
}

impl EntitySummary {
    /// Summarize `who`, or `None` if the engine holds no state for it.
    #[must_use]
    pub fn capture(engine: &ArousalEngine, who: EntityId) -> Option<Self> {
        let state = engine.existing_state(who)?;

        let mut static_effects: Vec<StaticEntry> = engine
            .registry()
            .entries()
            .filter_map(|(name, id)| {
                let record = state.static_effect(id).ok()?;
                let group = state.group_of(id).ok().flatten();
                let value = state.static_effect_value(id).ok()?;
                let active = state.is_static_effect_active(id);
                (value != 0.0 || active || group.is_some()).then(|| StaticEntry {
                    name: name.to_string(),
                    id: id.0,
                    value,
                    law: record.law,
                    active,
                    group: group.map(|h| h.0),
                })
            })
            .collect();
        static_effects.sort_by_key(|e| e.id);

        let dynamic_effects = state
            .dynamic_effects
            .iter()
            .map(|(name, record)| DynamicEntry {
                name: name.clone(),
                value: record.value,
                law: record.law,
                active: state.is_dynamic_effect_active(name),
            })
            .collect();

        Some(Self {
            entity: who.to_string(),
            arousal: state.arousal(),
            last_update: state.last_update(),
            static_effects,
            dynamic_effects,
            groups: state.groups().len(),
        })
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    /// Returns [`crate::error::SlamError::Logic`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::SlamError::Logic(format!("summary serialization: {e}")))
    }
}
