//! Easing curves over normalized progress.
//!
//! Every function maps `t` in [0,1] to eased progress. Inputs outside that range
//! are extrapolated along the same formula; nothing here clamps.

/// Identity curve.
#[inline]
pub fn linear(t: f64) -> f64 {
    t
}

/// Quadratic ease-in.
#[inline]
pub fn ease_in(t: f64) -> f64 {
    t * t
}

/// Quadratic ease-out, `1 - (1 - t)^2` (equivalently `2t - t^2`).
#[inline]
pub fn ease_out(t: f64) -> f64 {
    let u = 1.0 - t;
    1.0 - u * u
}

/// Piecewise quadratic in-out, symmetric about (0.5, 0.5).
#[inline]
pub fn ease_in_out(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        let u = -2.0 * t + 2.0;
        1.0 - u * u / 2.0
    }
}

/// Parabolic hop: 0 at both ends, 1 at the midpoint.
/// Used for vertical offsets of flying entities.
#[inline]
pub fn arc(t: f64) -> f64 {
    4.0 * t * (1.0 - t)
}
