//! Display colors for liquids and time-based color transitions.
//!
//! Colors are straight (non-premultiplied) RGBA with `f64` channels in `0..=1`.
//! Liquids carry two colors, one for the meniscus (`top`) and one for the
//! body seen through the glass (`side`); both are blended independently.
//!
//! A [`ColorTransition`] stores its progress as plain state and is advanced by
//! the owner once per tick, so it can be driven with synthetic `dt` values.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Rgba
// ---------------------------------------------------------------------------

/// A straight-alpha RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    /// Fully transparent black, used for empty vessels.
    pub const CLEAR: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.0);
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color from RGB channels.
    pub const fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Weighted sum of two colors: `self * w_self + other * w_other`.
    ///
    /// Callers pass weights that sum to one (volume fractions).
    pub fn weighted(self, w_self: f64, other: Rgba, w_other: f64) -> Rgba {
        Rgba {
            r: self.r * w_self + other.r * w_other,
            g: self.g * w_self + other.g * w_other,
            b: self.b * w_self + other.b * w_other,
            a: self.a * w_self + other.a * w_other,
        }
    }

    /// Linear interpolation; `t` is clamped to `0..=1`.
    pub fn lerp(self, to: Rgba, t: f64) -> Rgba {
        let t = t.clamp(0.0, 1.0);
        self.weighted(1.0 - t, to, t)
    }

    /// Channel-wise comparison with an absolute tolerance.
    pub fn approx_eq(&self, other: &Rgba, tolerance: f64) -> bool {
        (self.r - other.r).abs() <= tolerance
            && (self.g - other.g).abs() <= tolerance
            && (self.b - other.b).abs() <= tolerance
            && (self.a - other.a).abs() <= tolerance
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Rgba::CLEAR
    }
}

// ---------------------------------------------------------------------------
// Easing
// ---------------------------------------------------------------------------

/// Easing curve applied to the normalized progress of a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Easing {
    #[default]
    Linear,
    /// Quadratic acceleration from rest.
    EaseIn,
    /// Quadratic deceleration to rest.
    EaseOut,
    /// Smoothstep: slow at both ends.
    EaseInOut,
}

impl Easing {
    /// Map linear progress `t` (clamped to `0..=1`) through the curve.
    /// Every curve maps 0 to 0 and 1 to 1.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => t * (2.0 - t),
            Easing::EaseInOut => t * t * (3.0 - 2.0 * t),
        }
    }
}

// ---------------------------------------------------------------------------
// ColorTransition
// ---------------------------------------------------------------------------

/// An in-progress interpolation of a top/side color pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTransition {
    from_top: Rgba,
    from_side: Rgba,
    to_top: Rgba,
    to_side: Rgba,
    duration: f64,
    elapsed: f64,
    easing: Easing,
}

impl ColorTransition {
    /// Start a transition from the given colors. A non-positive or
    /// non-finite duration yields a transition that finishes on its first
    /// advance.
    pub fn new(
        from: (Rgba, Rgba),
        to: (Rgba, Rgba),
        duration: f64,
        easing: Easing,
    ) -> Self {
        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        Self {
            from_top: from.0,
            from_side: from.1,
            to_top: to.0,
            to_side: to.1,
            duration,
            elapsed: 0.0,
            easing,
        }
    }

    /// Target colors `(top, side)`.
    pub fn target(&self) -> (Rgba, Rgba) {
        (self.to_top, self.to_side)
    }

    /// Linear progress in `0..=1`.
    pub fn progress(&self) -> f64 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).min(1.0)
        }
    }

    pub fn is_finished(&self) -> bool {
        self.progress() >= 1.0
    }

    /// Advance by `dt` seconds (negative values are treated as zero) and
    /// return the colors to display. Once finished the exact target is
    /// returned, never an interpolated approximation of it.
    pub fn advance(&mut self, dt: f64) -> (Rgba, Rgba) {
        if dt.is_finite() && dt > 0.0 {
            self.elapsed += dt;
        }
        self.current()
    }

    /// Colors at the current progress.
    pub fn current(&self) -> (Rgba, Rgba) {
        if self.is_finished() {
            return (self.to_top, self.to_side);
        }
        let t = self.easing.apply(self.progress());
        (
            self.from_top.lerp(self.to_top, t),
            self.from_side.lerp(self.to_side, t),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba = Rgba::rgb(1.0, 0.0, 0.0);
    const BLUE: Rgba = Rgba::rgb(0.0, 0.0, 1.0);

    #[test]
    fn weighted_mix_of_two_colors() {
        let mixed = RED.weighted(0.25, BLUE, 0.75);
        assert!(mixed.approx_eq(&Rgba::rgb(0.25, 0.0, 0.75), 1e-12));
    }

    #[test]
    fn lerp_clamps_parameter() {
        assert_eq!(RED.lerp(BLUE, -1.0), RED);
        assert_eq!(RED.lerp(BLUE, 2.0), BLUE);
    }

    #[test]
    fn easing_curves_fix_endpoints() {
        for easing in [Easing::Linear, Easing::EaseIn, Easing::EaseOut, Easing::EaseInOut] {
            assert_eq!(easing.apply(0.0), 0.0, "{easing:?}");
            assert_eq!(easing.apply(1.0), 1.0, "{easing:?}");
        }
        assert_eq!(Easing::EaseInOut.apply(0.5), 0.5);
        assert!(Easing::EaseIn.apply(0.5) < 0.5);
        assert!(Easing::EaseOut.apply(0.5) > 0.5);
    }

    #[test]
    fn transition_interpolates_then_snaps() {
        let mut tr = ColorTransition::new((RED, RED), (BLUE, BLUE), 4.0, Easing::Linear);
        let (top, side) = tr.advance(1.0);
        assert!(top.approx_eq(&Rgba::rgb(0.75, 0.0, 0.25), 1e-12));
        assert_eq!(top, side);
        assert!(!tr.is_finished());

        // Uneven steps that overshoot the duration still land exactly.
        for _ in 0..7 {
            tr.advance(0.4999);
        }
        assert!(tr.is_finished());
        assert_eq!(tr.current(), (BLUE, BLUE));
    }

    #[test]
    fn zero_duration_finishes_immediately() {
        let mut tr = ColorTransition::new((RED, RED), (BLUE, RED), 0.0, Easing::EaseOut);
        assert!(tr.is_finished());
        assert_eq!(tr.advance(0.0), (BLUE, RED));
    }

    #[test]
    fn negative_dt_does_not_rewind() {
        let mut tr = ColorTransition::new((RED, RED), (BLUE, BLUE), 2.0, Easing::Linear);
        tr.advance(1.0);
        tr.advance(-5.0);
        assert_eq!(tr.progress(), 0.5);
    }
}
