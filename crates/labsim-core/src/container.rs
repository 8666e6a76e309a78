//! Liquid vessels: volume, per-substance composition, and displayed color.
//!
//! A [`LiquidContainer`] is mutated only through [`LiquidContainer::add`],
//! [`LiquidContainer::draw`], and [`LiquidContainer::transition_color`]. All
//! volume arithmetic clamps; nothing here fails once a container exists.
//!
//! # Invariants
//!
//! - `0 <= volume <= capacity`
//! - `sum(composition) == volume` within floating tolerance
//! - composition entries are strictly positive

use std::collections::BTreeMap;

use crate::color::{ColorTransition, Easing, Rgba};
use crate::id::SubstanceId;

/// Fraction of capacity at or below which a vessel counts as empty for color
/// mixing. Incoming liquid replaces the color outright instead of blending.
pub const EMPTY_FRACTION: f64 = 1e-3;

/// Composition entries at or below this volume are dropped.
pub const COMPOSITION_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// LiquidPortion
// ---------------------------------------------------------------------------

/// A transient slice of liquid produced by [`LiquidContainer::draw`].
///
/// Carries the whole-container colors at the moment of drawing and is tagged
/// with the dominant substance. `substance` is `None` only for a zero-volume
/// portion drawn from an empty vessel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiquidPortion {
    pub volume: f64,
    pub top_color: Rgba,
    pub side_color: Rgba,
    pub substance: Option<SubstanceId>,
}

impl LiquidPortion {
    pub fn is_empty(&self) -> bool {
        self.volume <= 0.0 || self.substance.is_none()
    }
}

// ---------------------------------------------------------------------------
// LiquidContainer
// ---------------------------------------------------------------------------

/// A vessel holding a volume of liquid.
#[derive(Debug, Clone)]
pub struct LiquidContainer {
    capacity: f64,
    volume: f64,
    composition: BTreeMap<SubstanceId, f64>,
    top_color: Rgba,
    side_color: Rgba,
    /// Active display-only color interpolation, advanced by [`Self::advance`].
    transition: Option<ColorTransition>,
}

impl LiquidContainer {
    /// Create an empty container. Fails if `capacity` is not a positive,
    /// finite number.
    pub fn new(capacity: f64) -> Result<Self, ContainerError> {
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(ContainerError::NonPositiveCapacity(capacity));
        }
        Ok(Self {
            capacity,
            volume: 0.0,
            composition: BTreeMap::new(),
            top_color: Rgba::CLEAR,
            side_color: Rgba::CLEAR,
            transition: None,
        })
    }

    /// Create a container pre-filled with a single substance. The initial
    /// volume is clamped to `[0, capacity]`.
    pub fn with_contents(
        capacity: f64,
        substance: SubstanceId,
        volume: f64,
        top_color: Rgba,
        side_color: Rgba,
    ) -> Result<Self, ContainerError> {
        let mut container = Self::new(capacity)?;
        container.add(substance, volume, top_color, side_color);
        // An empty pre-filled vessel still shows the intended liquid color.
        container.top_color = top_color;
        container.side_color = side_color;
        Ok(container)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Room left before the container is full.
    pub fn remaining_capacity(&self) -> f64 {
        (self.capacity - self.volume).max(0.0)
    }

    /// `volume / capacity` in `0..=1`, as consumed by fill-level shaders.
    pub fn fill_fraction(&self) -> f64 {
        (self.volume / self.capacity).clamp(0.0, 1.0)
    }

    pub fn is_empty(&self) -> bool {
        self.volume <= COMPOSITION_EPSILON
    }

    pub fn is_full(&self) -> bool {
        self.remaining_capacity() <= COMPOSITION_EPSILON
    }

    pub fn top_color(&self) -> Rgba {
        self.top_color
    }

    pub fn side_color(&self) -> Rgba {
        self.side_color
    }

    /// Volume per substance, ordered by substance ID.
    pub fn composition(&self) -> &BTreeMap<SubstanceId, f64> {
        &self.composition
    }

    pub fn contains(&self, substance: SubstanceId) -> bool {
        self.composition.contains_key(&substance)
    }

    /// Volume of one substance (0 if absent).
    pub fn amount_of(&self, substance: SubstanceId) -> f64 {
        self.composition.get(&substance).copied().unwrap_or(0.0)
    }

    /// The substance with the largest volume share. Ties go to the first
    /// substance (lowest ID) that reaches the maximum.
    pub fn dominant_substance(&self) -> Option<SubstanceId> {
        let mut best: Option<(SubstanceId, f64)> = None;
        for (&id, &amount) in &self.composition {
            match best {
                Some((_, max)) if amount <= max => {}
                _ => best = Some((id, amount)),
            }
        }
        best.map(|(id, _)| id)
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Mix `volume_in` of `substance` into the container. Returns the volume
    /// actually added.
    ///
    /// The request is clamped to the remaining capacity and the excess is
    /// discarded. If the container was effectively empty the incoming colors
    /// replace the current ones; otherwise each color becomes the
    /// volume-weighted mix of old and incoming.
    pub fn add(
        &mut self,
        substance: SubstanceId,
        volume_in: f64,
        top_color: Rgba,
        side_color: Rgba,
    ) -> f64 {
        let requested = if volume_in.is_finite() { volume_in.max(0.0) } else { 0.0 };
        let actual = requested.min(self.remaining_capacity());
        if actual <= 0.0 {
            return 0.0;
        }

        let old_volume = self.volume;
        let new_volume = old_volume + actual;

        if old_volume <= EMPTY_FRACTION * self.capacity {
            self.top_color = top_color;
            self.side_color = side_color;
        } else {
            let w_old = old_volume / new_volume;
            let w_new = actual / new_volume;
            self.top_color = self.top_color.weighted(w_old, top_color, w_new);
            self.side_color = self.side_color.weighted(w_old, side_color, w_new);
        }

        self.volume = new_volume.min(self.capacity);
        *self.composition.entry(substance).or_insert(0.0) += actual;
        actual
    }

    /// Mix a previously drawn portion into this container. Returns the
    /// volume actually added.
    pub fn add_portion(&mut self, portion: &LiquidPortion) -> f64 {
        match portion.substance {
            Some(substance) => self.add(
                substance,
                portion.volume,
                portion.top_color,
                portion.side_color,
            ),
            None => 0.0,
        }
    }

    /// Remove up to `requested` volume and return it as a portion.
    ///
    /// The portion carries the current whole-container colors and is tagged
    /// with the dominant substance. The drawn volume is taken from the
    /// dominant substance's ledger entry; if that entry is smaller than the
    /// drawn volume the shortfall comes from the remaining substances,
    /// largest first, so the ledger always sums to the volume.
    pub fn draw(&mut self, requested: f64) -> LiquidPortion {
        let requested = if requested.is_finite() { requested } else { 0.0 };
        let actual = requested.clamp(0.0, self.volume);
        let dominant = self.dominant_substance();

        if actual <= 0.0 || dominant.is_none() {
            return LiquidPortion {
                volume: 0.0,
                top_color: self.top_color,
                side_color: self.side_color,
                substance: None,
            };
        }

        let portion = LiquidPortion {
            volume: actual,
            top_color: self.top_color,
            side_color: self.side_color,
            substance: dominant,
        };

        self.volume -= actual;
        if self.volume <= COMPOSITION_EPSILON {
            self.volume = 0.0;
            self.composition.clear();
            return portion;
        }

        let mut order: Vec<(SubstanceId, f64)> =
            self.composition.iter().map(|(&id, &v)| (id, v)).collect();
        // Dominant first, then descending volume; the sort is stable so
        // equal volumes keep ID order.
        order.sort_by(|a, b| {
            let a_dom = Some(a.0) == dominant;
            let b_dom = Some(b.0) == dominant;
            b_dom
                .cmp(&a_dom)
                .then(b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
        });

        let mut remaining = actual;
        for (id, amount) in order {
            if remaining <= 0.0 {
                break;
            }
            let take = amount.min(remaining);
            remaining -= take;
            let left = amount - take;
            if left <= COMPOSITION_EPSILON {
                self.composition.remove(&id);
            } else {
                self.composition.insert(id, left);
            }
        }

        portion
    }

    // -----------------------------------------------------------------------
    // Color transitions
    // -----------------------------------------------------------------------

    /// Begin interpolating the displayed colors toward the targets over
    /// `duration` seconds. Replaces any transition already in progress,
    /// starting from the colors currently shown. Volume and composition are
    /// untouched.
    pub fn transition_color(
        &mut self,
        target_top: Rgba,
        target_side: Rgba,
        duration: f64,
        easing: Easing,
    ) {
        self.transition = Some(ColorTransition::new(
            (self.top_color, self.side_color),
            (target_top, target_side),
            duration,
            easing,
        ));
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    /// The active transition, if any.
    pub fn transition(&self) -> Option<&ColorTransition> {
        self.transition.as_ref()
    }

    /// Advance the active color transition by `dt` seconds. Returns `true`
    /// if a transition finished during this call.
    pub fn advance(&mut self, dt: f64) -> bool {
        let Some(transition) = self.transition.as_mut() else {
            return false;
        };
        let (top, side) = transition.advance(dt);
        self.top_color = top;
        self.side_color = side;
        if transition.is_finished() {
            self.transition = None;
            true
        } else {
            false
        }
    }

    /// Jump the active transition straight to its target. Returns `true` if
    /// there was a transition to finish.
    pub fn finish_transition(&mut self) -> bool {
        match self.transition.take() {
            Some(transition) => {
                let (top, side) = transition.target();
                self.top_color = top;
                self.side_color = side;
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Configuration errors raised when constructing a container.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContainerError {
    #[error("container capacity must be positive and finite, got {0}")]
    NonPositiveCapacity(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn ethanol() -> SubstanceId {
        SubstanceId(0)
    }
    fn nitrating_mix() -> SubstanceId {
        SubstanceId(1)
    }
    fn water() -> SubstanceId {
        SubstanceId(2)
    }

    const CLEAR_LIQUID: Rgba = Rgba::new(0.9, 0.9, 0.95, 0.4);
    const DARK_RED: Rgba = Rgba::rgb(0.4, 0.05, 0.05);

    fn ledger_sum(c: &LiquidContainer) -> f64 {
        c.composition().values().sum()
    }

    #[test]
    fn rejects_non_positive_capacity() {
        assert_eq!(
            LiquidContainer::new(0.0).unwrap_err(),
            ContainerError::NonPositiveCapacity(0.0)
        );
        assert!(LiquidContainer::new(-5.0).is_err());
        assert!(LiquidContainer::new(f64::NAN).is_err());
        assert!(LiquidContainer::new(f64::INFINITY).is_err());
    }

    #[test]
    fn with_contents_clamps_initial_volume() {
        let c = LiquidContainer::with_contents(100.0, water(), 250.0, Rgba::WHITE, Rgba::WHITE)
            .unwrap();
        assert_eq!(c.volume(), 100.0);
        assert_eq!(c.amount_of(water()), 100.0);
        assert!(c.is_full());

        let empty =
            LiquidContainer::with_contents(100.0, water(), -3.0, DARK_RED, DARK_RED).unwrap();
        assert!(empty.is_empty());
        assert!(empty.composition().is_empty());
        assert_eq!(empty.top_color(), DARK_RED);
    }

    #[test]
    fn worked_example_fill_clamp_draw() {
        let mut c = LiquidContainer::new(100.0).unwrap();

        assert_eq!(c.add(ethanol(), 50.0, CLEAR_LIQUID, CLEAR_LIQUID), 50.0);
        assert_eq!(c.volume(), 50.0);

        let added = c.add(nitrating_mix(), 60.0, DARK_RED, DARK_RED);
        assert_eq!(added, 50.0);
        assert_eq!(c.volume(), 100.0);
        assert_eq!(c.amount_of(ethanol()), 50.0);
        assert_eq!(c.amount_of(nitrating_mix()), 50.0);

        let expected = CLEAR_LIQUID.weighted(0.5, DARK_RED, 0.5);
        let portion = c.draw(30.0);
        assert_eq!(portion.volume, 30.0);
        assert!(portion.top_color.approx_eq(&expected, TOL));
        assert!(portion.side_color.approx_eq(&expected, TOL));
        // Tie goes to the first substance reaching the maximum.
        assert_eq!(portion.substance, Some(ethanol()));
        assert_eq!(c.volume(), 70.0);
        assert!((ledger_sum(&c) - 70.0).abs() < TOL);
        assert_eq!(c.amount_of(ethanol()), 20.0);
    }

    #[test]
    fn add_to_full_container_adds_nothing() {
        let mut c =
            LiquidContainer::with_contents(10.0, water(), 10.0, Rgba::WHITE, Rgba::WHITE).unwrap();
        assert_eq!(c.add(ethanol(), 5.0, DARK_RED, DARK_RED), 0.0);
        assert_eq!(c.volume(), 10.0);
        assert!(!c.contains(ethanol()));
        assert_eq!(c.top_color(), Rgba::WHITE);
    }

    #[test]
    fn add_ignores_nonsense_volumes() {
        let mut c = LiquidContainer::new(10.0).unwrap();
        assert_eq!(c.add(water(), -1.0, Rgba::WHITE, Rgba::WHITE), 0.0);
        assert_eq!(c.add(water(), f64::NAN, Rgba::WHITE, Rgba::WHITE), 0.0);
        assert_eq!(c.add(water(), f64::INFINITY, Rgba::WHITE, Rgba::WHITE), 0.0);
        assert!(c.composition().is_empty());
    }

    #[test]
    fn draw_from_empty_returns_zero_portion() {
        let mut c = LiquidContainer::new(10.0).unwrap();
        let portion = c.draw(5.0);
        assert_eq!(portion.volume, 0.0);
        assert!(portion.substance.is_none());
        assert!(portion.is_empty());
        assert_eq!(c.volume(), 0.0);
    }

    #[test]
    fn draw_clamps_to_available_volume() {
        let mut c =
            LiquidContainer::with_contents(50.0, water(), 12.0, Rgba::WHITE, Rgba::WHITE).unwrap();
        let portion = c.draw(40.0);
        assert_eq!(portion.volume, 12.0);
        assert_eq!(portion.substance, Some(water()));
        assert!(c.is_empty());
        assert!(c.composition().is_empty());

        assert_eq!(c.draw(-3.0).volume, 0.0);
    }

    #[test]
    fn color_mix_law() {
        let c1 = Rgba::rgb(1.0, 0.0, 0.0);
        let c2 = Rgba::rgb(0.0, 1.0, 0.5);
        let side1 = Rgba::rgb(0.2, 0.2, 0.2);
        let side2 = Rgba::rgb(0.8, 0.4, 0.0);

        let mut c = LiquidContainer::new(100.0).unwrap();
        c.add(water(), 30.0, c1, side1);
        assert_eq!(c.top_color(), c1);
        assert_eq!(c.side_color(), side1);

        c.add(ethanol(), 10.0, c2, side2);
        let top = c1.weighted(30.0 / 40.0, c2, 10.0 / 40.0);
        let side = side1.weighted(30.0 / 40.0, side2, 10.0 / 40.0);
        assert!(c.top_color().approx_eq(&top, TOL));
        assert!(c.side_color().approx_eq(&side, TOL));
    }

    #[test]
    fn near_empty_container_takes_incoming_color() {
        let mut c =
            LiquidContainer::with_contents(100.0, water(), 0.05, Rgba::WHITE, Rgba::WHITE).unwrap();
        c.add(nitrating_mix(), 10.0, DARK_RED, DARK_RED);
        assert_eq!(c.top_color(), DARK_RED);
        assert!((c.volume() - 10.05).abs() < TOL);
    }

    #[test]
    fn draw_larger_than_dominant_share_spills_into_others() {
        let mut c = LiquidContainer::new(100.0).unwrap();
        c.add(water(), 40.0, Rgba::WHITE, Rgba::WHITE);
        c.add(ethanol(), 35.0, Rgba::WHITE, Rgba::WHITE);
        c.add(nitrating_mix(), 25.0, DARK_RED, DARK_RED);

        let portion = c.draw(60.0);
        assert_eq!(portion.substance, Some(water()));
        assert!(!c.contains(water()));
        // Shortfall of 20 taken from ethanol (next largest).
        assert!((c.amount_of(ethanol()) - 15.0).abs() < TOL);
        assert!((c.amount_of(nitrating_mix()) - 25.0).abs() < TOL);
        assert!((ledger_sum(&c) - c.volume()).abs() < TOL);
    }

    #[test]
    fn dominant_substance_prefers_larger_share() {
        let mut c = LiquidContainer::new(100.0).unwrap();
        assert_eq!(c.dominant_substance(), None);
        c.add(ethanol(), 10.0, Rgba::WHITE, Rgba::WHITE);
        c.add(nitrating_mix(), 30.0, DARK_RED, DARK_RED);
        assert_eq!(c.dominant_substance(), Some(nitrating_mix()));
    }

    #[test]
    fn fill_fraction_tracks_volume() {
        let mut c = LiquidContainer::new(250.0).unwrap();
        assert_eq!(c.fill_fraction(), 0.0);
        c.add(water(), 62.5, Rgba::WHITE, Rgba::WHITE);
        assert_eq!(c.fill_fraction(), 0.25);
        assert_eq!(c.remaining_capacity(), 187.5);
    }

    #[test]
    fn transition_changes_color_only() {
        let mut c = LiquidContainer::new(100.0).unwrap();
        c.add(ethanol(), 50.0, CLEAR_LIQUID, CLEAR_LIQUID);
        c.transition_color(DARK_RED, DARK_RED, 2.0, Easing::Linear);
        assert!(c.is_transitioning());

        assert!(!c.advance(1.0));
        assert!(c.top_color().approx_eq(&CLEAR_LIQUID.lerp(DARK_RED, 0.5), TOL));
        assert_eq!(c.volume(), 50.0);

        assert!(c.advance(1.5));
        assert!(!c.is_transitioning());
        assert_eq!(c.top_color(), DARK_RED);
        assert_eq!(c.side_color(), DARK_RED);
        assert_eq!(c.amount_of(ethanol()), 50.0);
    }

    #[test]
    fn new_transition_replaces_active_one() {
        let blue = Rgba::rgb(0.0, 0.0, 1.0);
        let mut c = LiquidContainer::new(100.0).unwrap();
        c.add(ethanol(), 50.0, Rgba::WHITE, Rgba::WHITE);
        c.transition_color(DARK_RED, DARK_RED, 4.0, Easing::Linear);
        c.advance(2.0);
        let midway = c.top_color();

        c.transition_color(blue, blue, 1.0, Easing::Linear);
        assert_eq!(c.transition().unwrap().progress(), 0.0);
        c.advance(0.5);
        assert!(c.top_color().approx_eq(&midway.lerp(blue, 0.5), TOL));
        c.advance(0.5);
        assert_eq!(c.top_color(), blue);
    }

    #[test]
    fn finish_transition_snaps_to_target() {
        let mut c = LiquidContainer::new(100.0).unwrap();
        assert!(!c.finish_transition());
        c.transition_color(DARK_RED, Rgba::BLACK, 10.0, Easing::EaseInOut);
        c.advance(3.0);
        assert!(c.finish_transition());
        assert_eq!(c.top_color(), DARK_RED);
        assert_eq!(c.side_color(), Rgba::BLACK);
        assert!(!c.advance(1.0));
    }

    #[test]
    fn add_portion_moves_tagged_volume() {
        let mut source = LiquidContainer::with_contents(50.0, nitrating_mix(), 20.0, DARK_RED, DARK_RED)
            .unwrap();
        let mut target = LiquidContainer::new(50.0).unwrap();
        let portion = source.draw(8.0);
        assert_eq!(target.add_portion(&portion), 8.0);
        assert_eq!(target.amount_of(nitrating_mix()), 8.0);
        assert_eq!(target.top_color(), DARK_RED);

        let nothing = LiquidContainer::new(5.0).unwrap().draw(1.0);
        assert_eq!(target.add_portion(&nothing), 0.0);
    }
}
