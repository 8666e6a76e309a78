//! Scripted reactions gated on physical preconditions.
//!
//! A [`ReactionEngine`] watches one flask. While `Idle` it re-evaluates its
//! [`ReactionRecipe`]'s preconditions whenever it has been notified of a
//! relevant change (flask content, heat plate, solid delivery). Once all of
//! them hold it moves to `Reacting` exactly once and plays the recipe's
//! phases in order, advanced by `dt` each tick. After the last phase it is
//! `Completed` for good.
//!
//! # Precondition order
//!
//! 1. flask volume >= `min_volume`
//! 2. every required substance is present in the flask
//! 3. heat plate on, if the recipe requires heat
//! 4. delivered solid units >= `required_solid_units`
//!
//! Unmet preconditions are routine and never an error; the engine simply
//! stays `Idle`.

use std::collections::BTreeSet;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::color::{Easing, Rgba};
use crate::container::LiquidContainer;
use crate::event::LabEvent;
use crate::id::{ContainerId, SubstanceId};
use crate::sim::Ticks;

// ---------------------------------------------------------------------------
// Recipe types
// ---------------------------------------------------------------------------

/// Effect collaborators should play when a phase starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionEffect {
    Sound,
    Particles,
}

/// What a phase does while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseKind {
    /// Mixing time. No state changes.
    Agitation,
    /// The flask's colors move toward the recipe's result colors.
    ColorTransition {
        #[serde(default)]
        easing: Easing,
    },
    /// Waiting after a visible change.
    Hold,
}

/// One timed sub-step of a reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionPhase {
    pub kind: PhaseKind,
    /// Seconds.
    pub duration: f64,
    #[serde(default)]
    pub effects: Vec<ReactionEffect>,
}

impl ReactionPhase {
    pub fn new(kind: PhaseKind, duration: f64) -> Self {
        Self {
            kind,
            duration,
            effects: Vec::new(),
        }
    }

    pub fn with_effects(mut self, effects: &[ReactionEffect]) -> Self {
        self.effects = effects.to_vec();
        self
    }
}

/// Immutable reaction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionRecipe {
    /// Minimum flask volume in ml.
    pub min_volume: f64,
    pub required_substances: BTreeSet<SubstanceId>,
    pub requires_heat: bool,
    pub required_solid_units: u32,
    pub result_top_color: Rgba,
    pub result_side_color: Rgba,
    pub phases: Vec<ReactionPhase>,
}

impl ReactionRecipe {
    /// The nitration from the lab procedure: at least 40 ml containing the
    /// solvent and the nitrating mixture, heated, with five units of solid
    /// delivered. Two seconds of agitation, then four seconds of transition
    /// to red-brown with sound and particles.
    pub fn nitration(solvent: SubstanceId, nitrating_mix: SubstanceId) -> Self {
        Self {
            min_volume: 40.0,
            required_substances: [solvent, nitrating_mix].into_iter().collect(),
            requires_heat: true,
            required_solid_units: 5,
            result_top_color: Rgba::rgb(0.55, 0.18, 0.08),
            result_side_color: Rgba::rgb(0.40, 0.12, 0.05),
            phases: vec![
                ReactionPhase::new(PhaseKind::Agitation, 2.0),
                ReactionPhase::new(
                    PhaseKind::ColorTransition {
                        easing: Easing::Linear,
                    },
                    4.0,
                )
                .with_effects(&[ReactionEffect::Sound, ReactionEffect::Particles]),
            ],
        }
    }

    /// Reject configurations that could never run.
    pub fn validate(&self) -> Result<(), RecipeError> {
        if !(self.min_volume.is_finite() && self.min_volume >= 0.0) {
            return Err(RecipeError::InvalidMinVolume(self.min_volume));
        }
        if self.phases.is_empty() {
            return Err(RecipeError::NoPhases);
        }
        for (index, phase) in self.phases.iter().enumerate() {
            if !(phase.duration.is_finite() && phase.duration >= 0.0) {
                return Err(RecipeError::InvalidPhaseDuration {
                    index,
                    duration: phase.duration,
                });
            }
        }
        if !self
            .phases
            .iter()
            .any(|p| matches!(p.kind, PhaseKind::ColorTransition { .. }))
        {
            return Err(RecipeError::NoColorTransition);
        }
        Ok(())
    }

    /// Sum of all phase durations.
    pub fn total_duration(&self) -> f64 {
        self.phases.iter().map(|p| p.duration).sum()
    }
}

/// Configuration errors in a reaction recipe.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecipeError {
    #[error("recipe has no phases")]
    NoPhases,
    #[error("recipe has no color transition phase")]
    NoColorTransition,
    #[error("phase {index} has invalid duration {duration}")]
    InvalidPhaseDuration { index: usize, duration: f64 },
    #[error("minimum volume must be non-negative and finite, got {0}")]
    InvalidMinVolume(f64),
}

// ---------------------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------------------

/// A precondition that did not hold, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnmetPrecondition {
    InsufficientVolume { required: f64, actual: f64 },
    MissingSubstance(SubstanceId),
    HeatOff,
    InsufficientSolids { required: u32, delivered: u32 },
}

/// Everything a precondition check reads, borrowed for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ReactionInputs<'a> {
    pub flask: &'a LiquidContainer,
    pub heat_on: bool,
    pub solid_units: u32,
}

/// Evaluate preconditions in order. With `stop_at_first` the list holds at
/// most one entry.
fn evaluate(recipe: &ReactionRecipe, inputs: &ReactionInputs<'_>, stop_at_first: bool) -> Vec<UnmetPrecondition> {
    let mut unmet = Vec::new();

    if inputs.flask.volume() < recipe.min_volume {
        unmet.push(UnmetPrecondition::InsufficientVolume {
            required: recipe.min_volume,
            actual: inputs.flask.volume(),
        });
        if stop_at_first {
            return unmet;
        }
    }

    for &substance in &recipe.required_substances {
        if !inputs.flask.contains(substance) {
            unmet.push(UnmetPrecondition::MissingSubstance(substance));
            if stop_at_first {
                return unmet;
            }
        }
    }

    if recipe.requires_heat && !inputs.heat_on {
        unmet.push(UnmetPrecondition::HeatOff);
        if stop_at_first {
            return unmet;
        }
    }

    if inputs.solid_units < recipe.required_solid_units {
        unmet.push(UnmetPrecondition::InsufficientSolids {
            required: recipe.required_solid_units,
            delivered: inputs.solid_units,
        });
    }

    unmet
}

// ---------------------------------------------------------------------------
// Reaction state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionState {
    #[default]
    Idle,
    Reacting,
    Completed,
}

// ---------------------------------------------------------------------------
// ReactionEngine
// ---------------------------------------------------------------------------

/// Per-flask reaction state machine.
#[derive(Debug, Clone)]
pub struct ReactionEngine {
    flask: ContainerId,
    recipe: ReactionRecipe,
    state: ReactionState,
    /// Set by [`Self::notify`]; cleared by the next evaluation.
    pending_check: bool,
    phase_index: usize,
    phase_elapsed: f64,
}

impl ReactionEngine {
    /// Create an engine for `flask`. Fails fast on an invalid recipe. The
    /// first tick always evaluates, so a flask that starts out satisfying
    /// everything reacts without needing a notification.
    pub fn new(flask: ContainerId, recipe: ReactionRecipe) -> Result<Self, RecipeError> {
        recipe.validate()?;
        Ok(Self {
            flask,
            recipe,
            state: ReactionState::Idle,
            pending_check: true,
            phase_index: 0,
            phase_elapsed: 0.0,
        })
    }

    pub fn flask(&self) -> ContainerId {
        self.flask
    }

    pub fn recipe(&self) -> &ReactionRecipe {
        &self.recipe
    }

    pub fn state(&self) -> ReactionState {
        self.state
    }

    /// Index of the running phase while `Reacting`.
    pub fn current_phase(&self) -> Option<usize> {
        (self.state == ReactionState::Reacting).then_some(self.phase_index)
    }

    /// Seconds spent in the running phase.
    pub fn phase_elapsed(&self) -> f64 {
        self.phase_elapsed
    }

    /// Record that something relevant changed. Ignored unless `Idle`.
    pub fn notify(&mut self) {
        if self.state == ReactionState::Idle {
            self.pending_check = true;
        }
    }

    pub fn needs_check(&self) -> bool {
        self.pending_check
    }

    /// Whether the running phase owns the flask's color transition. The
    /// engine advances that transition itself, in step with the phase.
    pub fn drives_color(&self) -> bool {
        self.state == ReactionState::Reacting
            && matches!(
                self.recipe.phases[self.phase_index].kind,
                PhaseKind::ColorTransition { .. }
            )
    }

    /// Full ordered list of unmet preconditions, for diagnostics. Does not
    /// change state.
    pub fn unmet_preconditions(&self, inputs: &ReactionInputs<'_>) -> Vec<UnmetPrecondition> {
        evaluate(&self.recipe, inputs, false)
    }

    /// Run one tick: evaluate if notified while `Idle`, otherwise advance the
    /// running phases by `dt`. Returns the events produced.
    pub fn update(
        &mut self,
        dt: f64,
        flask: &mut LiquidContainer,
        heat_on: bool,
        solid_units: u32,
        tick: Ticks,
    ) -> Vec<LabEvent> {
        match self.state {
            ReactionState::Idle => {
                if self.pending_check {
                    self.try_start(flask, heat_on, solid_units, tick)
                } else {
                    Vec::new()
                }
            }
            ReactionState::Reacting => self.advance(dt, flask, tick),
            ReactionState::Completed => Vec::new(),
        }
    }

    /// Evaluate preconditions, stopping at the first failure, and start the
    /// reaction if all hold. The `Idle -> Reacting` transition happens at
    /// most once per engine.
    pub fn try_start(
        &mut self,
        flask: &mut LiquidContainer,
        heat_on: bool,
        solid_units: u32,
        tick: Ticks,
    ) -> Vec<LabEvent> {
        if self.state != ReactionState::Idle {
            return Vec::new();
        }
        self.pending_check = false;

        let inputs = ReactionInputs {
            flask,
            heat_on,
            solid_units,
        };
        if let Some(first) = evaluate(&self.recipe, &inputs, true).first() {
            debug!("reaction {:?}: waiting, {:?}", self.flask, first);
            return Vec::new();
        }

        info!("reaction {:?}: preconditions met, starting", self.flask);
        self.state = ReactionState::Reacting;
        self.phase_index = 0;
        self.phase_elapsed = 0.0;

        let mut events = Vec::new();
        self.begin_phase(flask, tick, &mut events);
        events
    }

    fn begin_phase(&mut self, flask: &mut LiquidContainer, tick: Ticks, events: &mut Vec<LabEvent>) {
        let phase = &self.recipe.phases[self.phase_index];
        events.push(LabEvent::ReactionPhaseStarted {
            flask: self.flask,
            phase_index: self.phase_index,
            tick,
        });
        for &effect in &phase.effects {
            events.push(LabEvent::ReactionEffect {
                flask: self.flask,
                effect,
                tick,
            });
        }
        if let PhaseKind::ColorTransition { easing } = phase.kind {
            flask.transition_color(
                self.recipe.result_top_color,
                self.recipe.result_side_color,
                phase.duration,
                easing,
            );
        }
    }

    fn end_phase(&mut self, flask: &mut LiquidContainer, tick: Ticks, events: &mut Vec<LabEvent>) {
        if self.drives_color() && flask.finish_transition() {
            events.push(LabEvent::ContentChanged {
                container: self.flask,
                tick,
            });
        }
    }

    /// Advance running phases by `dt`, carrying leftover time into the next
    /// phase. Zero-length phases finish on the first advance after they
    /// begin. During a color phase the flask's transition moves by exactly
    /// the time the phase does, so the colors settle in the tick the phase
    /// ends.
    fn advance(&mut self, dt: f64, flask: &mut LiquidContainer, tick: Ticks) -> Vec<LabEvent> {
        let mut events = Vec::new();
        let mut remaining = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        while self.state == ReactionState::Reacting {
            let duration = self.recipe.phases[self.phase_index].duration;
            let left = (duration - self.phase_elapsed).max(0.0);
            if remaining < left {
                self.phase_elapsed += remaining;
                if self.drives_color() && remaining > 0.0 {
                    flask.advance(remaining);
                    events.push(LabEvent::ContentChanged {
                        container: self.flask,
                        tick,
                    });
                }
                break;
            }
            remaining -= left;
            self.end_phase(flask, tick, &mut events);

            self.phase_index += 1;
            self.phase_elapsed = 0.0;
            if self.phase_index >= self.recipe.phases.len() {
                self.state = ReactionState::Completed;
                info!("reaction {:?}: completed", self.flask);
                events.push(LabEvent::ReactionCompleted {
                    flask: self.flask,
                    tick,
                });
            } else {
                self.begin_phase(flask, tick, &mut events);
            }
        }

        events
    }
}
