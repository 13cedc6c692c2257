//! Property-Based Tests for SLAM Core
//!
//! Random operation sequences against a single entity state, checked against
//! an independent recomputation of the aggregate after every step.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use slam_core::codec::{self, IdentityResolver};
use slam_core::config::PersistenceConfig;
use slam_core::registry::EffectRegistry;
use slam_core::update::SeedJitter;
use slam_core::{DecayLaw, EffectId, EntityArousalState, EntityId};

const SLOTS: u32 = 4;
const WHO: EntityId = EntityId(0x0002_0014);
const NAMES: [&str; 3] = ["bath", "wind", "song"];

#[derive(Debug, Clone)]
enum Op {
    SetValue(u32, f32),
    ModValue(u32, f32, f32),
    SetLaw(u32, DecayLaw, f32, f32),
    Group(u32, u32),
    Ungroup(u32),
    SetDynamic(usize, f32, DecayLaw, f32, f32),
    ModDynamic(usize, f32, f32),
    Advance(f32),
}

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_law() -> impl Strategy<Value = DecayLaw> {
    prop_oneof![
        Just(DecayLaw::None),
        Just(DecayLaw::ExponentialDecay),
        Just(DecayLaw::LinearRamp),
        Just(DecayLaw::Periodic),
        Just(DecayLaw::Threshold),
    ]
}

/// Rates bounded away from zero so half-lives stay finite.
fn arb_dynamic_param() -> impl Strategy<Value = f32> {
    prop_oneof![-2.0..-0.25f32, 0.25..2.0f32]
}

fn arb_op() -> impl Strategy<Value = Op> {
    let slot = 0..SLOTS;
    prop_oneof![
        (slot.clone(), -5.0..5.0f32).prop_map(|(s, v)| Op::SetValue(s, v)),
        (slot.clone(), -5.0..5.0f32, -8.0..8.0f32).prop_map(|(s, d, l)| Op::ModValue(s, d, l)),
        (slot.clone(), arb_law(), 0.5..4.0f32, -5.0..5.0f32)
            .prop_map(|(s, law, p, l)| Op::SetLaw(s, law, p, l)),
        (slot.clone(), slot.clone()).prop_map(|(a, b)| Op::Group(a, b)),
        slot.prop_map(Op::Ungroup),
        (0..NAMES.len(), -5.0..5.0f32, arb_law(), arb_dynamic_param(), -5.0..5.0f32)
            .prop_map(|(n, v, law, p, l)| Op::SetDynamic(n, v, law, p, l)),
        (0..NAMES.len(), -5.0..5.0f32, -8.0..8.0f32).prop_map(|(n, d, l)| Op::ModDynamic(n, d, l)),
        (0.0..5.0f32).prop_map(Op::Advance),
    ]
}

fn apply(state: &mut EntityArousalState, op: &Op, clock: &mut f32, rng: &mut StdRng, jitter: &SeedJitter) {
    match *op {
        Op::SetValue(s, v) => {
            let _ = state.set_static_value(EffectId(s), v);
        }
        Op::ModValue(s, d, l) => {
            let _ = state.mod_static_value(EffectId(s), d, l);
        }
        Op::SetLaw(s, law, p, l) => {
            let _ = state.set_static_effect(EffectId(s), law, p, l, 0);
        }
        Op::Group(a, b) => {
            let _ = state.group_effects(WHO, EffectId(a), EffectId(b));
        }
        Op::Ungroup(s) => {
            if state.group_of(EffectId(s)).ok().flatten().is_some() {
                state.remove_group(EffectId(s)).expect("tracked group");
            }
        }
        Op::SetDynamic(n, v, law, p, l) => state.set_dynamic_effect(NAMES[n], v, law, p, l),
        Op::ModDynamic(n, d, l) => {
            state.mod_dynamic_effect(NAMES[n], d, l);
        }
        Op::Advance(dt) => {
            *clock += dt;
            state.advance(WHO, *clock, jitter, rng);
        }
    }
}

fn tolerance(state: &EntityArousalState) -> f32 {
    0.05 + 1e-3 * state.recompute_arousal().abs()
}

// ---------------------------------------------------------------------------
// Property: the aggregate always equals the sum of its parts
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn aggregate_matches_recomputation(ops in prop::collection::vec(arb_op(), 1..60), seed in any::<u64>()) {
        let mut state = EntityArousalState::new(SLOTS as usize);
        let mut rng = StdRng::seed_from_u64(seed);
        let jitter = SeedJitter::new(0.5, 2.0).expect("jitter");
        let mut clock = 1.0_f32;

        for op in &ops {
            apply(&mut state, op, &mut clock, &mut rng, &jitter);
            let expected = state.recompute_arousal();
            prop_assert!(
                (state.arousal() - expected).abs() <= tolerance(&state),
                "after {:?}: arousal {} vs recomputed {}", op, state.arousal(), expected
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Property: active sets only ever hold non-dormant effects
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn active_sets_hold_only_live_laws(ops in prop::collection::vec(arb_op(), 1..60)) {
        let mut state = EntityArousalState::new(SLOTS as usize);
        let mut rng = StdRng::seed_from_u64(11);
        let jitter = SeedJitter::new(0.5, 2.0).expect("jitter");
        let mut clock = 1.0_f32;

        for op in &ops {
            apply(&mut state, op, &mut clock, &mut rng, &jitter);
        }
        for id in state.active_static() {
            let record = state.static_effect(id).expect("slot");
            prop_assert!(record.law.is_active());
        }
        for name in NAMES {
            if state.is_dynamic_effect_active(name) {
                let record = state.dynamic_effect(name).expect("tracked");
                prop_assert!(record.law.is_active());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Property: a ramp never overshoots its limit
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn linear_ramp_never_overshoots(
        start in -10.0..10.0f32,
        rate in 0.1..5.0f32,
        headroom in 0.0..20.0f32,
        steps in prop::collection::vec(0.0..3.0f32, 1..30),
    ) {
        let limit = start + headroom;
        let mut state = EntityArousalState::new(1);
        let mut rng = StdRng::seed_from_u64(3);
        let jitter = SeedJitter::new(0.5, 2.0).expect("jitter");
        state.advance(WHO, 1.0, &jitter, &mut rng);
        state.set_static_value(EffectId(0), start).expect("value");
        state.set_static_effect(EffectId(0), DecayLaw::LinearRamp, rate, limit, 0).expect("law");

        let mut clock = 1.0_f32;
        for dt in steps {
            clock += dt;
            state.advance(WHO, clock, &jitter, &mut rng);
            prop_assert!(state.static_effect(EffectId(0)).expect("slot").value <= limit + 1e-4);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: register/unregister keeps ids dense and unique
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn registry_ids_stay_dense(actions in prop::collection::vec((any::<bool>(), 0..12u8), 1..80)) {
        let mut registry = EffectRegistry::new();
        for (register, n) in actions {
            let name = format!("effect{n}");
            if register {
                registry.register(&name);
            } else {
                registry.unregister(&name);
            }
        }
        let mut ids: Vec<u32> = registry.entries().map(|(_, id)| id.0).collect();
        ids.sort_unstable();
        let expected: Vec<u32> = (0..registry.count()).collect();
        prop_assert_eq!(ids, expected);
        prop_assert!(registry.count() <= 12);
    }
}

// ---------------------------------------------------------------------------
// Property: save → load keeps every aggregate within tolerance
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    #[test]
    fn codec_round_trip_keeps_aggregate(ops in prop::collection::vec(arb_op(), 1..40)) {
        let mut registry = EffectRegistry::new();
        for i in 0..SLOTS {
            registry.register(&format!("slot{i}"));
        }
        let mut state = EntityArousalState::new(SLOTS as usize);
        let mut rng = StdRng::seed_from_u64(5);
        let jitter = SeedJitter::new(0.5, 2.0).expect("jitter");
        let mut clock = 1.0_f32;
        for op in &ops {
            apply(&mut state, op, &mut clock, &mut rng, &jitter);
        }

        let before = state.arousal();
        let mut states = std::collections::HashMap::new();
        states.insert(WHO, state);
        let record = codec::encode(&registry, &states).expect("encode");
        let snapshot = codec::decode(&record, &IdentityResolver, &PersistenceConfig::default())
            .expect("decode");
        let after = snapshot.states[&WHO].arousal();
        // Values above the corruption threshold never arise from these inputs.
        prop_assert_eq!(snapshot.corrupted_groups, 0);
        prop_assert!((after - before).abs() <= 0.5 + 1e-3 * before.abs());
    }
}
