//! Decay law evaluation.
//!
//! | law              | new value                                  | bound                        |
//! |------------------|--------------------------------------------|------------------------------|
//! | ExponentialDecay | `v · 0.5^(Δt / param)`                     | towards `limit`, ±0.5 offset |
//! | LinearRamp       | `v + Δt · param`                           | towards `limit`              |
//! | Periodic         | `(sin(phase) + 1) · limit`                 | none, one-shot               |
//! | Threshold        | `0` before `param`, `limit` afterwards     | none, one-shot               |
//!
//! The exponential law's limit already carries a +0.5 offset from
//! assignment; the clamp applies the offset a second time. Saved data
//! depends on this, so both applications stay.

use crate::effect::EffectRecord;
use crate::sine::fast_sin;
use crate::types::{DecayLaw, EntityId};

/// Prime used to spread entity ids over the periodic phase.
const PHASE_HASH_MODULUS: u32 = 7919;
/// Phase contribution per hashed entity step.
const PHASE_HASH_SCALE: f32 = 0.01;

/// Per-entity inputs the laws depend on besides the record itself.
#[derive(Debug, Clone, Copy)]
pub struct LawContext {
    /// Entity owning the effect.
    pub entity: EntityId,
    /// The entity's game time after this step has been applied.
    pub last_update: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    None,
    Upper,
    Lower,
}

/// Deterministic phase offset for an entity, in radians.
#[must_use]
pub fn entity_phase(entity: EntityId) -> f32 {
    (entity.0 % PHASE_HASH_MODULUS) as f32 * PHASE_HASH_SCALE
}

/// Advance `effect` by `time_diff` under its law.
///
/// Returns `true` when the law has run its course and the caller should
/// deactivate the effect. Periodic and threshold laws always report
/// completion after a single evaluation.
pub fn evaluate(effect: &mut EffectRecord, time_diff: f32, ctx: &LawContext) -> bool {
    let (mut value, bound) = match effect.law {
        DecayLaw::None => return true,
        DecayLaw::ExponentialDecay => {
            let value = effect.value * 0.5_f32.powf(time_diff / effect.param);
            let bound = if effect.param * effect.value < 0.0 {
                Bound::Upper
            } else {
                Bound::Lower
            };
            (value, bound)
        }
        DecayLaw::LinearRamp => {
            let value = effect.value + time_diff * effect.param;
            let bound = if effect.param >= 0.0 {
                Bound::Upper
            } else {
                Bound::Lower
            };
            (value, bound)
        }
        DecayLaw::Periodic => {
            let phase = entity_phase(ctx.entity) + ctx.last_update * effect.param;
            ((fast_sin(phase) + 1.0) * effect.limit, Bound::None)
        }
        DecayLaw::Threshold => {
            let value = if ctx.last_update < effect.param {
                0.0
            } else {
                effect.limit
            };
            (value, Bound::None)
        }
    };

    let offset = effect.law.limit_offset();
    let done = match bound {
        Bound::Upper if effect.limit < value => {
            value = effect.limit + offset;
            true
        }
        Bound::Lower if effect.limit > value => {
            value = effect.limit - offset;
            true
        }
        Bound::Upper | Bound::Lower => false,
        Bound::None => true,
    };

    effect.value = value;
    done
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(last_update: f32) -> LawContext {
        LawContext {
            entity: EntityId(0x14),
            last_update,
        }
    }

    fn record(value: f32, law: DecayLaw, param: f32, limit: f32) -> EffectRecord {
        let mut rec = EffectRecord {
            value,
            ..EffectRecord::default()
        };
        rec.set_law(law, param, limit, 0);
        rec
    }

    #[test]
    fn exponential_decay_halves_per_half_life() {
        let mut rec = record(10.0, DecayLaw::ExponentialDecay, 2.0, 0.0);
        let done = evaluate(&mut rec, 2.0, &ctx(2.0));
        assert!(!done);
        assert!((rec.value - 5.0).abs() < 1e-4);
    }

    #[test]
    fn exponential_decay_clamps_below_offset_limit() {
        let mut rec = record(10.0, DecayLaw::ExponentialDecay, 2.0, 0.0);
        let done = evaluate(&mut rec, 1000.0, &ctx(1000.0));
        assert!(done);
        // Stored limit is 0.5; clamp subtracts the offset again.
        assert!(rec.value.abs() < f32::EPSILON);
    }

    #[test]
    fn exponential_decay_negative_value_clamps_above() {
        let mut rec = record(-10.0, DecayLaw::ExponentialDecay, 2.0, -1.0);
        // Stored limit -0.5; value rises towards it.
        let done = evaluate(&mut rec, 1000.0, &ctx(1000.0));
        assert!(done);
        assert!(rec.value.abs() < f32::EPSILON, "got {}", rec.value);
    }

    #[test]
    fn linear_ramp_stops_at_limit() {
        let mut rec = record(0.0, DecayLaw::LinearRamp, 1.0, 3.0);
        assert!(!evaluate(&mut rec, 2.0, &ctx(2.0)));
        assert!((rec.value - 2.0).abs() < 1e-6);
        assert!(evaluate(&mut rec, 2.0, &ctx(4.0)));
        assert!((rec.value - 3.0).abs() < 1e-6);
    }

    #[test]
    fn negative_ramp_is_bounded_below() {
        let mut rec = record(5.0, DecayLaw::LinearRamp, -2.0, 1.0);
        assert!(evaluate(&mut rec, 10.0, &ctx(10.0)));
        assert!((rec.value - 1.0).abs() < 1e-6);
    }

    #[test]
    fn periodic_is_one_shot_and_bounded() {
        let mut rec = record(0.0, DecayLaw::Periodic, 1.0, 2.0);
        assert!(evaluate(&mut rec, 1.0, &ctx(3.0)));
        assert!(rec.value >= 0.0 && rec.value <= 4.0 + 1e-4);
    }

    #[test]
    fn threshold_steps_after_trigger_time() {
        let mut rec = record(0.0, DecayLaw::Threshold, 5.0, 7.0);
        assert!(evaluate(&mut rec, 1.0, &ctx(4.0)));
        assert_eq!(rec.value, 0.0);
        assert!(evaluate(&mut rec, 1.0, &ctx(5.0)));
        assert!((rec.value - 7.0).abs() < f32::EPSILON);
    }

    #[test]
    fn dormant_law_is_complete_and_untouched() {
        let mut rec = record(3.0, DecayLaw::None, 0.0, 0.0);
        assert!(evaluate(&mut rec, 10.0, &ctx(10.0)));
        assert!((rec.value - 3.0).abs() < f32::EPSILON);
    }
}
