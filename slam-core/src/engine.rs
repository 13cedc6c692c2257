//! The engine context: registry, every entity's state, advisory locks and the
//! random source for first-update jitter.
//!
//! Everything the host can reach goes through one [`ArousalEngine`] value.
//! Registry changes fan out to all live states synchronously.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, info_span, warn};

use crate::codec::{self, IdentifierResolver, SaveRecord};
use crate::config::SlamConfig;
use crate::error::{Result, SlamError};
use crate::locks::AdvisoryLocks;
use crate::metrics::{spans, EngineCounters, UpdateTimer};
use crate::registry::{EffectRegistry, Registration};
use crate::state::EntityArousalState;
use crate::types::{EffectId, EntityId};
use crate::update::{SeedJitter, UpdateReport};

/// Owner of all effect and arousal state.
#[derive(Debug)]
pub struct ArousalEngine {
    config: SlamConfig,
    registry: EffectRegistry,
    states: HashMap<EntityId, EntityArousalState>,
    locks: AdvisoryLocks,
    rng: StdRng,
    jitter: SeedJitter,
    counters: EngineCounters,
    timer: UpdateTimer,
}

impl ArousalEngine {
    /// Build an empty engine.
    ///
    /// # Errors
    /// Returns [`SlamError::Config`] for an invalid jitter distribution.
    pub fn new(config: SlamConfig) -> Result<Self> {
        let jitter = SeedJitter::new(
            config.engine.seed_jitter_mean,
            config.engine.seed_jitter_std_dev,
        )?;
        let rng = match config.engine.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let locks = AdvisoryLocks::new(config.engine.lock_count);
        info!(
            locks = config.engine.lock_count,
            seeded = config.engine.rng_seed.is_some(),
            "Arousal engine created"
        );
        Ok(Self {
            config,
            registry: EffectRegistry::new(),
            states: HashMap::new(),
            locks,
            rng,
            jitter,
            counters: EngineCounters::new(),
            timer: UpdateTimer::new(),
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SlamConfig {
        &self.config
    }

    /// The effect registry.
    #[must_use]
    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    /// Event counters.
    #[must_use]
    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    /// Update-pass timings.
    #[must_use]
    pub fn timer(&self) -> &UpdateTimer {
        &self.timer
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Bind `name` to an effect id. A brand-new id grows every live state by
    /// one slot.
    pub fn register_effect(&mut self, name: &str) -> EffectId {
        let registration = self.registry.register(name);
        match registration {
            Registration::Existing(_) => {}
            Registration::Reused(id) => {
                EngineCounters::add(&self.counters.effects_registered, 1);
                debug!(name, id = %id, "Effect reused a freed id");
            }
            Registration::Allocated(id) => {
                EngineCounters::add(&self.counters.effects_registered, 1);
                let _span = info_span!(spans::FAN_OUT, entities = self.states.len()).entered();
                for state in self.states.values_mut() {
                    state.on_effect_allocated();
                }
                debug!(name, id = %id, "Effect allocated a new id");
            }
        }
        registration.id()
    }

    /// Unbind `name` and reset its slot in every live state.
    ///
    /// Returns `false` for an unknown name. A state that fails to reset is
    /// logged and skipped.
    pub fn unregister_effect(&mut self, name: &str) -> bool {
        let Some(id) = self.registry.unregister(name) else {
            return false;
        };
        EngineCounters::add(&self.counters.effects_unregistered, 1);

        let _span = info_span!(spans::FAN_OUT, entities = self.states.len()).entered();
        for (who, state) in &mut self.states {
            if let Err(e) = state.on_effect_released(id) {
                warn!(entity = %who, effect = %id, error = %e, "Failed to reset unregistered effect");
            }
        }
        debug!(name, id = %id, "Effect unregistered");
        true
    }

    /// Number of allocated effect ids.
    #[must_use]
    pub fn static_effect_count(&self) -> u32 {
        self.registry.count()
    }

    // ------------------------------------------------------------------
    // Entity states
    // ------------------------------------------------------------------

    /// State of `who`, created with one zeroed slot per registered effect on
    /// first reference.
    pub fn state(&mut self, who: EntityId) -> &mut EntityArousalState {
        let slots = self.registry.count() as usize;
        self.states
            .entry(who)
            .or_insert_with(|| EntityArousalState::new(slots))
    }

    /// State of `who` if one exists.
    #[must_use]
    pub fn existing_state(&self, who: EntityId) -> Option<&EntityArousalState> {
        self.states.get(&who)
    }

    /// Run one update pass for `who` at `game_time`.
    pub fn advance(&mut self, who: EntityId, game_time: f32) -> UpdateReport {
        let _span = info_span!(spans::ADVANCE, entity = %who).entered();
        let _timing = self.timer.start();

        let slots = self.registry.count() as usize;
        let state = self
            .states
            .entry(who)
            .or_insert_with(|| EntityArousalState::new(slots));
        let report = state.advance(who, game_time, &self.jitter, &mut self.rng);

        EngineCounters::add(&self.counters.update_passes, 1);
        EngineCounters::add(&self.counters.effects_completed, report.completed);
        report
    }

    /// Drop every state last updated before `cutoff`. Returns how many were
    /// removed.
    pub fn sweep(&mut self, cutoff: f32) -> usize {
        let _span = info_span!(spans::SWEEP, cutoff).entered();
        let before = self.states.len();
        self.states.retain(|_, state| state.last_update() >= cutoff);
        let removed = before - self.states.len();
        EngineCounters::add(&self.counters.entities_swept, removed);
        if removed > 0 {
            info!(removed, remaining = self.states.len(), "Swept stale entity states");
        }
        removed
    }

    /// Ids of every entity with a state, ascending.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.states.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of entity states held.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.states.len()
    }

    // ------------------------------------------------------------------
    // Locks
    // ------------------------------------------------------------------

    /// Test-and-set advisory flag `index`.
    pub fn try_lock(&self, index: i32) -> bool {
        self.locks.try_lock(index)
    }

    /// Clear advisory flag `index`.
    pub fn unlock(&self, index: i32) {
        self.locks.unlock(index);
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Forget the registry, every state and every advisory lock.
    pub fn revert(&mut self) {
        self.registry.clear();
        self.states.clear();
        self.locks.clear_all();
        info!("Arousal engine reverted");
    }

    /// Encode the registry and every state.
    ///
    /// # Errors
    /// Returns [`SlamError::Logic`] if a state breaks a format limit.
    pub fn save(&self) -> Result<SaveRecord> {
        let _span = info_span!(spans::SAVE, entities = self.states.len()).entered();
        let record = codec::encode(&self.registry, &self.states)?;
        EngineCounters::add(&self.counters.saves, 1);
        Ok(record)
    }

    /// Replace everything with the contents of `record`.
    ///
    /// On failure the engine is left reverted, never half-loaded.
    ///
    /// # Errors
    /// Returns [`SlamError::Corrupted`] when the record cannot be decoded.
    pub fn load(&mut self, record: &SaveRecord, resolver: &dyn IdentifierResolver) -> Result<()> {
        let _span = info_span!(spans::LOAD, bytes = record.data.len()).entered();
        self.revert();

        match codec::decode(record, resolver, &self.config.persistence) {
            Ok(snapshot) => {
                EngineCounters::add(&self.counters.loads, 1);
                EngineCounters::add(&self.counters.arousal_heals, snapshot.healed);
                EngineCounters::add(&self.counters.corrupted_groups, snapshot.corrupted_groups);
                self.registry = snapshot.registry;
                self.states = snapshot.states;
                Ok(())
            }
            Err(e) => {
                EngineCounters::add(&self.counters.load_failures, 1);
                warn!(error = %e, "Encountered error while loading data");
                Err(e)
            }
        }
    }

    /// Look up an effect id by name.
    ///
    /// # Errors
    /// Returns [`SlamError::OutOfRange`] when `name` is not registered.
    pub fn effect_id(&self, name: &str) -> Result<EffectId> {
        self.registry
            .id_of(name)
            .ok_or_else(|| SlamError::out_of_range(-1, self.registry.count() as usize))
    }
}
