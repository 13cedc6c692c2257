//! Time-stepped update pass for one entity.
//!
//! Order within a pass: groups first (each member decays, the group takes
//! the product), then ungrouped active static effects, then active dynamic
//! effects. Every value change is folded into `arousal` as it happens.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::trace;

use crate::error::{Result, SlamError};
use crate::group::GroupHandle;
use crate::law::{evaluate, LawContext};
use crate::state::EntityArousalState;
use crate::types::{DecayLaw, EffectId, EntityId};

/// Distribution used to back-date an entity's very first update, so that
/// entities created in the same frame do not evolve in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct SeedJitter {
    dist: Normal<f64>,
}

impl SeedJitter {
    /// Jitter drawn as `|N(mean, std_dev)|`.
    ///
    /// # Errors
    /// Returns [`SlamError::Config`] for a negative or non-finite deviation.
    pub fn new(mean: f64, std_dev: f64) -> Result<Self> {
        Normal::new(mean, std_dev)
            .map(|dist| Self { dist })
            .map_err(|e| SlamError::Config(format!("seed jitter: {e}")))
    }

    /// Draw a non-negative back-dating offset.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        self.dist.sample(rng).abs() as f32
    }
}

/// What a single [`EntityArousalState::advance`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateReport {
    /// Elapsed game time applied.
    pub time_diff: f32,
    /// Effects whose law completed and was reset to `None`.
    pub completed: usize,
    /// Groups recomputed.
    pub groups: usize,
}

impl EntityArousalState {
    /// Advance this entity to `game_time`.
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        who: EntityId,
        game_time: f32,
        jitter: &SeedJitter,
        rng: &mut R,
    ) -> UpdateReport {
        if self.last_update == 0.0 {
            self.last_update = game_time - jitter.sample(rng);
        }

        let time_diff = game_time - self.last_update;
        self.last_update = game_time;
        let ctx = LawContext {
            entity: who,
            last_update: game_time,
        };
        let mut report = UpdateReport {
            time_diff,
            ..UpdateReport::default()
        };

        for handle in self.groups.handles() {
            self.recompute_group(handle, time_diff, who);
            report.groups += 1;
        }

        let active: Vec<EffectId> = self.active_static.iter().copied().collect();
        for id in active {
            let idx = id.index();
            let Some(effect) = self.static_effects.get_mut(idx) else {
                self.active_static.remove(&id);
                continue;
            };
            if self.static_group_of[idx].is_some() {
                continue;
            }
            let old = effect.value;
            let done = evaluate(effect, time_diff, &ctx);
            self.arousal += effect.value - old;
            if done {
                effect.law = DecayLaw::None;
                self.active_static.remove(&id);
                report.completed += 1;
            }
        }

        let active: Vec<String> = self.active_dynamic.iter().cloned().collect();
        for name in active {
            let Some(effect) = self.dynamic_effects.get_mut(&name) else {
                self.active_dynamic.remove(&name);
                continue;
            };
            let old = effect.value;
            let done = evaluate(effect, time_diff, &ctx);
            self.arousal += effect.value - old;
            if done {
                effect.law = DecayLaw::None;
                if effect.value == 0.0 {
                    self.dynamic_effects.remove(&name);
                }
                self.active_dynamic.remove(&name);
                report.completed += 1;
            }
        }

        trace!(
            entity = %who,
            time_diff,
            arousal = self.arousal,
            completed = report.completed,
            "Advanced entity"
        );
        report
    }

    /// Decay every member of a group by `time_diff` and replace the group's
    /// value with the product, folding the change into `arousal`.
    pub(crate) fn recompute_group(&mut self, handle: GroupHandle, time_diff: f32, who: EntityId) {
        let ctx = LawContext {
            entity: who,
            last_update: self.last_update,
        };
        let Some(group) = self.groups.get_mut(handle) else {
            return;
        };

        let mut value = 1.0_f32;
        for id in &group.members {
            if let Some(effect) = self.static_effects.get_mut(id.index()) {
                evaluate(effect, time_diff, &ctx);
                value *= effect.value;
            }
        }

        self.arousal += value - group.value;
        group.value = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const WHO: EntityId = EntityId(0x14);

    fn jitter() -> SeedJitter {
        SeedJitter::new(0.5, 2.0).expect("valid jitter")
    }

    /// State already past its first update so no jitter applies.
    fn primed(slots: usize) -> EntityArousalState {
        let mut state = EntityArousalState::new(slots);
        state.last_update = 1.0;
        state
    }

    #[test]
    fn first_advance_backdates_last_update() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = EntityArousalState::new(0);
        let report = state.advance(WHO, 100.0, &jitter(), &mut rng);
        assert!(report.time_diff >= 0.0);
        assert!((state.last_update() - 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn invalid_jitter_is_config_error() {
        assert!(matches!(SeedJitter::new(0.5, -1.0), Err(SlamError::Config(_))));
    }

    #[test]
    fn exponential_decay_scenario() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = primed(1);
        let heat = EffectId(0);
        state.set_static_effect(heat, DecayLaw::ExponentialDecay, 2.0, 0.0, 0).expect("law");
        state.set_static_value(heat, 10.0).expect("value");
        assert!((state.arousal() - 10.0).abs() < 1e-6);

        state.advance(WHO, 3.0, &jitter(), &mut rng);
        assert!((state.static_effect(heat).expect("rec").value - 5.0).abs() < 1e-4);
        assert!((state.arousal() - 5.0).abs() < 1e-4);
        assert!(state.is_static_effect_active(heat));

        let report = state.advance(WHO, 10_003.0, &jitter(), &mut rng);
        assert_eq!(report.completed, 1);
        let rec = state.static_effect(heat).expect("rec");
        assert!(rec.value.abs() < 1e-6);
        assert_eq!(rec.law, DecayLaw::None);
        assert!(!state.is_static_effect_active(heat));
        assert!(state.arousal().abs() < 1e-4);
    }

    #[test]
    fn grouped_members_decay_through_group() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut state = primed(2);
        state.set_static_effect(EffectId(0), DecayLaw::ExponentialDecay, 1.0, -100.0, 0).expect("law");
        state.set_static_value(EffectId(0), 4.0).expect("value");
        state.set_static_value(EffectId(1), 3.0).expect("value");
        state.group_effects(WHO, EffectId(0), EffectId(1)).expect("group");

        state.advance(WHO, 2.0, &jitter(), &mut rng);
        let handle = state.group_of(EffectId(0)).expect("slot").expect("grouped");
        // 4 halves once, times 3.
        assert!((state.group(handle).expect("group").value - 6.0).abs() < 1e-4);
        assert!((state.arousal() - 6.0).abs() < 1e-4);
        assert!((state.arousal() - state.recompute_arousal()).abs() < 1e-4);
    }

    #[test]
    fn grouped_member_stays_active_across_advance() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut state = primed(2);
        state.set_static_value(EffectId(0), 2.0).expect("value");
        state.set_static_value(EffectId(1), 3.0).expect("value");
        state.group_effects(WHO, EffectId(0), EffectId(1)).expect("group");
        state.set_static_effect(EffectId(0), DecayLaw::LinearRamp, 1.0, 50.0, 0).expect("law");

        state.advance(WHO, 2.0, &jitter(), &mut rng);
        assert!(state.is_static_effect_active(EffectId(0)));
        // 2 + 1, times 3, evaluated once through the group.
        let handle = state.group_of(EffectId(0)).expect("slot").expect("grouped");
        assert!((state.group(handle).expect("group").value - 9.0).abs() < 1e-4);
        assert!((state.arousal() - state.recompute_arousal()).abs() < 1e-4);

        state.remove_group(EffectId(0)).expect("ungroup");
        assert!(state.is_static_effect_active(EffectId(0)));
    }

    #[test]
    fn periodic_with_huge_negative_speed_stays_bounded() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut state = primed(1);
        state.set_static_effect(EffectId(0), DecayLaw::Periodic, -1.0e6, 1.0, 0).expect("law");
        state.advance(WHO, 1001.0, &jitter(), &mut rng);
        let value = state.static_effect(EffectId(0)).expect("rec").value;
        assert!((0.0..=2.0).contains(&value), "value {value}");
    }

    #[test]
    fn periodic_and_threshold_are_one_shot() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut state = primed(2);
        state.set_static_effect(EffectId(0), DecayLaw::Periodic, 1.0, 2.0, 0).expect("law");
        state.set_static_effect(EffectId(1), DecayLaw::Threshold, 0.5, 4.0, 0).expect("law");
        let report = state.advance(WHO, 2.0, &jitter(), &mut rng);
        assert_eq!(report.completed, 2);
        assert!(!state.is_static_effect_active(EffectId(0)));
        assert!(!state.is_static_effect_active(EffectId(1)));
        assert!((state.static_effect(EffectId(1)).expect("rec").value - 4.0).abs() < f32::EPSILON);
        assert!((state.arousal() - state.recompute_arousal()).abs() < 1e-4);
    }

    #[test]
    fn finished_dynamic_effect_at_zero_is_pruned() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut state = primed(0);
        state.set_dynamic_effect("sting", 3.0, DecayLaw::LinearRamp, -1.0, 0.0);
        state.advance(WHO, 2.0, &jitter(), &mut rng);
        assert!((state.dynamic_effect_value_by_name("sting") - 2.0).abs() < 1e-6);
        state.advance(WHO, 10.0, &jitter(), &mut rng);
        assert_eq!(state.dynamic_effect_count(), 0);
        assert!(!state.is_dynamic_effect_active("sting"));
        assert!(state.arousal().abs() < 1e-6);
    }

    #[test]
    fn finished_dynamic_effect_with_value_is_kept() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut state = primed(0);
        state.set_dynamic_effect("glow", 1.0, DecayLaw::LinearRamp, 1.0, 2.0);
        state.advance(WHO, 11.0, &jitter(), &mut rng);
        let rec = state.dynamic_effect("glow").expect("kept");
        assert_eq!(rec.law, DecayLaw::None);
        assert!((rec.value - 2.0).abs() < 1e-6);
        assert!((state.arousal() - 2.0).abs() < 1e-6);
    }
}
