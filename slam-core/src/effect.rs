//! Effect records — one contribution's current value and evolution law.

use serde::{Deserialize, Serialize};

use crate::types::DecayLaw;

/// A single effect: current value plus the law that evolves it over time.
///
/// `aux` is a 32-bit slot the scripting side may read either as an integer
/// or as a float; the engine itself never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EffectRecord {
    /// Current contribution.
    pub value: f32,
    /// Time-evolution law.
    pub law: DecayLaw,
    /// Law parameter (half-life, ramp speed, angular speed or trigger time).
    pub param: f32,
    /// Law target, already shifted by [`DecayLaw::limit_offset`].
    pub limit: f32,
    /// Raw bits of the auxiliary slot.
    pub aux: i32,
}

impl EffectRecord {
    /// A zeroed, dormant record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the law and its parameters, shifting `limit` by the law's offset.
    ///
    /// The value is left untouched.
    pub fn set_law(&mut self, law: DecayLaw, param: f32, limit: f32, aux: i32) {
        self.law = law;
        self.param = param;
        self.limit = limit + law.limit_offset();
        self.aux = aux;
    }

    /// Whether the record is dormant and contributes nothing.
    #[must_use]
    pub fn is_dormant(&self) -> bool {
        self.law == DecayLaw::None && self.value == 0.0
    }

    /// Auxiliary slot read as an integer.
    #[must_use]
    pub fn aux_int(&self) -> i32 {
        self.aux
    }

    /// Auxiliary slot read as a float.
    #[must_use]
    pub fn aux_float(&self) -> f32 {
        f32::from_bits(self.aux as u32)
    }

    /// Store an integer in the auxiliary slot.
    pub fn set_aux_int(&mut self, value: i32) {
        self.aux = value;
    }

    /// Store a float in the auxiliary slot.
    pub fn set_aux_float(&mut self, value: f32) {
        self.aux = value.to_bits() as i32;
    }
}

/// Add `delta` to `current`, refusing to cross `limit` in the direction of
/// travel. Returns the new value.
#[must_use]
pub fn clamped_add(current: f32, delta: f32, limit: f32) -> f32 {
    let value = current + delta;
    if (delta < 0.0 && limit > value) || (delta > 0.0 && limit < value) {
        limit
    } else {
        value
    }
}
