//! Precomputed sine lookup used by the periodic law.
//!
//! One full turn is split into 512 steps; lookups truncate towards zero, so
//! the result is accurate to about 0.012 rad.

use std::f32::consts::PI;
use std::sync::LazyLock;

const CIRCLE_STEPS: usize = 512;
const HALF_CIRCLE: f32 = (CIRCLE_STEPS / 2) as f32;
const STEP_MASK: u32 = CIRCLE_STEPS as u32 - 1;

static SINE_TABLE: LazyLock<[f32; CIRCLE_STEPS + 1]> = LazyLock::new(|| {
    let mut table = [0.0_f32; CIRCLE_STEPS + 1];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = (i as f64 * f64::from(PI) / f64::from(HALF_CIRCLE)).sin() as f32;
    }
    table
});

/// Table-driven sine of `angle` (radians).
#[must_use]
pub fn fast_sin(angle: f32) -> f32 {
    let step = (angle * HALF_CIRCLE / PI) as i32;
    // Saturated casts reach i32::MIN, so mask the magnitude instead of negating.
    let wrapped = (step.unsigned_abs() & STEP_MASK) as usize;
    let idx = if step < 0 { CIRCLE_STEPS - wrapped } else { wrapped };
    SINE_TABLE[idx]
}
