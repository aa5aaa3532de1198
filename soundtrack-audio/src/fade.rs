//! Adjustable fade curves
//!
//! A single `curve_ratio` morphs the envelope through a family of shapes:
//!
//! - `ratio <= 0`: linear ramp raised to `1 - 2 * ratio` (0 is a straight line,
//!   negative values sag toward the lower gain)
//! - `0 < ratio < 0.5`: blend of the straight line and a half-cosine,
//!   weighted by `2 * ratio`
//! - `ratio >= 0.5`: half-cosine raised to `1.5 - ratio`
//!
//! Every envelope starts at `gain0`, heads toward `gain1`, and stays inside
//! `[min(gain0, gain1), max(gain0, gain1)]`.

use std::f64::consts::PI;

/// Generate a per-sample gain envelope of exactly `length` samples
pub fn curve(gain0: f32, gain1: f32, curve_ratio: f32, length: usize) -> Vec<f32> {
    if length == 0 {
        return Vec::new();
    }
    if gain0 == gain1 {
        return vec![gain0; length];
    }

    let (g0, g1, ratio) = (gain0 as f64, gain1 as f64, curve_ratio as f64);

    let normalized: Vec<f64> = if ratio > 0.0 && ratio < 0.5 {
        let weight = ratio * 2.0;
        linear(g0, g1, length)
            .into_iter()
            .zip(half_cosine(g0, g1, length))
            .map(|(lin, cos)| lin * (1.0 - weight) + cos * weight)
            .collect()
    } else if ratio > 0.0 {
        power_adjust(half_cosine(g0, g1, length), 1.5 - ratio)
    } else {
        power_adjust(linear(g0, g1, length), 1.0 - 2.0 * ratio)
    };

    let (lo, hi) = (g0.min(g1), g0.max(g1));
    normalized
        .into_iter()
        .map(|v| (lo + (hi - lo) * v).clamp(lo, hi) as f32)
        .collect()
}

/// Straight ramp normalized to 0..=1, endpoints included
///
/// Runs 1 -> 0 when fading down so that scaling into `[lo, hi]` starts at
/// `gain0`.
fn linear(gain0: f64, gain1: f64, length: usize) -> Vec<f64> {
    let falling = gain0 > gain1;
    (0..length)
        .map(|i| {
            let t = if length > 1 {
                i as f64 / (length - 1) as f64
            } else {
                0.0
            };
            if falling {
                1.0 - t
            } else {
                t
            }
        })
        .collect()
}

/// Half a cosine period normalized to 0..=1
///
/// Phase flips with direction; the final sample stops one step short of the
/// far endpoint.
fn half_cosine(gain0: f64, gain1: f64, length: usize) -> Vec<f64> {
    let phase = if gain0 > gain1 { 1.0 } else { -1.0 };
    (0..length)
        .map(|i| {
            let angle = (i as f64 / length as f64) * PI;
            (angle.cos() * phase + 1.0) * 0.5
        })
        .collect()
}

/// Raise each value to `power` (identity when `power == 1`)
fn power_adjust(envelope: Vec<f64>, power: f64) -> Vec<f64> {
    if power == 1.0 {
        return envelope;
    }
    envelope
        .into_iter()
        .map(|v| {
            let adjusted = (power * v.ln()).exp();
            if adjusted.is_finite() {
                adjusted.clamp(0.0, 1.0)
            } else if v > 0.0 {
                // 0 * ln(v) edge cases for power <= 0
                1.0
            } else {
                0.0
            }
        })
        .collect()
}
