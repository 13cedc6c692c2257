//! Core type definitions for the SLAM effect engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SlamError};

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Host-assigned identifier of an entity (actor) whose arousal is tracked.
///
/// The engine never interprets the value beyond hashing it into the phase of
/// the periodic law; resolution of stale identifiers is left to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// Registry-wide identifier of a static effect type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EffectId(pub u32);

impl EffectId {
    /// Slot index of this effect inside per-entity storage.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Convert a signed script-side index, rejecting negatives.
    ///
    /// # Errors
    /// Returns [`SlamError::OutOfRange`] for negative values.
    pub fn from_script(index: i32) -> Result<Self> {
        u32::try_from(index)
            .map(Self)
            .map_err(|_| SlamError::out_of_range(index, 0))
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Decay Laws
// ---------------------------------------------------------------------------

/// Time-evolution rule attached to an effect.
///
/// The discriminants are part of the save format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum DecayLaw {
    /// Dormant: the value never changes on its own.
    #[default]
    None = 0,
    /// Halves every `param` time units towards `limit`.
    ExponentialDecay = 1,
    /// Moves by `param` per time unit until it reaches `limit`.
    LinearRamp = 2,
    /// Oscillates around `limit` with angular speed `param`.
    Periodic = 3,
    /// Steps from 0 to `limit` once game time passes `param`.
    Threshold = 4,
}

impl DecayLaw {
    /// Decode a raw law discriminant.
    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::ExponentialDecay),
            2 => Some(Self::LinearRamp),
            3 => Some(Self::Periodic),
            4 => Some(Self::Threshold),
            _ => None,
        }
    }

    /// Raw discriminant as stored in save records.
    #[must_use]
    pub fn raw(self) -> i32 {
        self as i32
    }

    /// Whether an effect under this law needs time-stepped evaluation.
    #[must_use]
    pub fn is_active(self) -> bool {
        self != Self::None
    }

    /// Offset added to the stored limit when the law is assigned, and
    /// applied again when the evaluator clamps to that limit.
    #[must_use]
    pub fn limit_offset(self) -> f32 {
        match self {
            Self::ExponentialDecay => 0.5,
            _ => 0.0,
        }
    }
}

impl fmt::Display for DecayLaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::ExponentialDecay => write!(f, "ExponentialDecay"),
            Self::LinearRamp => write!(f, "LinearRamp"),
            Self::Periodic => write!(f, "Periodic"),
            Self::Threshold => write!(f, "Threshold"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
