//! The lab: owns every vessel and simulation component and orchestrates the
//! six-phase step pipeline.
//!
//! # Architecture
//!
//! The `Lab` owns:
//! - Containers in a `SlotMap` keyed by [`ContainerId`], with unique names
//! - A frozen [`SubstanceRegistry`]
//! - The [`HeatSource`], [`SolidTransferTracker`] and [`TransferCoordinator`]
//! - One [`ReactionEngine`] per reacting flask
//! - An optional [`StepSequencer`] for the scripted procedure
//! - An inbox of external [`LabSignal`]s and the [`EventBus`]
//!
//! # Six-Phase Pipeline
//!
//! Each step runs:
//! 1. **Inbound** -- route queued signals to their consumers and echo them on the bus
//! 2. **Transfer** -- latched pours move liquid between containers
//! 3. **Reaction** -- notified engines evaluate preconditions; reacting engines advance
//! 4. **Visual** -- containers advance their color transitions
//! 5. **Delivery** -- buffered events are delivered to subscribers
//! 6. **Bookkeeping** -- tick counter and elapsed time advance
//!
//! Content changes made during the transfer phase are seen by the reaction
//! phase of the same step. Direct mutations made between steps (`fill`,
//! solid moves, heat changes) are evaluated on the next step.

use std::collections::{HashMap, VecDeque};

use log::warn;
use slotmap::{SecondaryMap, SlotMap};

use crate::config::LabConfig;
use crate::container::{ContainerError, LiquidContainer};
use crate::event::{EventBus, LabEvent};
use crate::heat::HeatSource;
use crate::id::{ContainerId, SubstanceId};
use crate::query::{
    ContainerSnapshot, LabSnapshot, ProcedureSnapshot, ReactionSnapshot, SolidSnapshot,
};
use crate::reaction::{
    ReactionEngine, ReactionInputs, ReactionRecipe, RecipeError, UnmetPrecondition,
};
use crate::sequencer::{ProcedureError, ProcedureStep, StepSequencer};
use crate::sim::{
    AdvanceResult, FIXED_STEP_TOLERANCE, MIN_FIXED_TIMESTEP, SimState, SimulationStrategy, Ticks,
};
use crate::solid::{
    SolidConfig, SolidConfigError, SolidHolder, SolidTransferOutcome, SolidTransferTracker,
};
use crate::substance::{RegistryError, SubstanceRegistry};
use crate::transfer::{PourSignal, TransferCoordinator, TransferError};

// ---------------------------------------------------------------------------
// Inbound signals
// ---------------------------------------------------------------------------

/// A signal from an external collaborator, naming containers by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabSignal {
    /// Attachment detection: `child` snapped onto `parent`.
    Attached { child: String, parent: String },
    /// The heat plate reported its state.
    Heat { is_on: bool },
    /// Pour detection for a tilted `source` vessel.
    Pour {
        source: String,
        target: Option<String>,
        active: bool,
    },
}

impl LabSignal {
    pub fn attached(child: impl Into<String>, parent: impl Into<String>) -> Self {
        LabSignal::Attached {
            child: child.into(),
            parent: parent.into(),
        }
    }

    pub fn pour(source: impl Into<String>, target: Option<&str>, active: bool) -> Self {
        LabSignal::Pour {
            source: source.into(),
            target: target.map(str::to_string),
            active,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Configuration errors raised while assembling a lab.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LabError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Recipe(#[from] RecipeError),
    #[error(transparent)]
    Procedure(#[from] ProcedureError),
    #[error(transparent)]
    Solid(#[from] SolidConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("duplicate container name: {0}")]
    DuplicateName(String),
    #[error("unknown container: {0}")]
    UnknownContainer(String),
    #[error("container {0:?} already has a reaction")]
    DuplicateReaction(ContainerId),
    #[error("fixed timestep must be finite and at least 1e-6 s, got {0}")]
    InvalidTimestep(f64),
}

// ---------------------------------------------------------------------------
// Lab
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Lab {
    containers: SlotMap<ContainerId, LiquidContainer>,
    names: HashMap<String, ContainerId>,
    container_names: SecondaryMap<ContainerId, String>,

    substances: SubstanceRegistry,
    heat: HeatSource,
    solids: SolidTransferTracker,
    transfer: TransferCoordinator,

    /// Reaction engine per flask.
    reactions: SecondaryMap<ContainerId, ReactionEngine>,
    procedure: Option<StepSequencer>,

    /// Signals queued by collaborators, routed in the next inbound phase.
    inbox: VecDeque<LabSignal>,

    pub event_bus: EventBus,

    strategy: SimulationStrategy,
    pub sim_state: SimState,
    paused: bool,
}

impl Lab {
    /// Create an empty lab. Fails on invalid pour or timing configuration.
    pub fn new(
        config: &LabConfig,
        substances: SubstanceRegistry,
        solids: SolidConfig,
    ) -> Result<Self, LabError> {
        if let SimulationStrategy::Fixed { timestep } = config.strategy
            && !(timestep.is_finite() && timestep >= MIN_FIXED_TIMESTEP)
        {
            return Err(LabError::InvalidTimestep(timestep));
        }
        Ok(Self {
            containers: SlotMap::with_key(),
            names: HashMap::new(),
            container_names: SecondaryMap::new(),
            substances,
            heat: HeatSource::default(),
            solids: SolidTransferTracker::new(solids)?,
            transfer: TransferCoordinator::new(config.pour_rate, config.min_pour_volume)?,
            reactions: SecondaryMap::new(),
            procedure: None,
            inbox: VecDeque::new(),
            event_bus: EventBus::new(config.event_buffer_capacity),
            strategy: config.strategy,
            sim_state: SimState::new(),
            paused: false,
        })
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    pub fn add_container(
        &mut self,
        name: &str,
        container: LiquidContainer,
    ) -> Result<ContainerId, LabError> {
        if self.names.contains_key(name) {
            return Err(LabError::DuplicateName(name.to_string()));
        }
        for &substance in container.composition().keys() {
            if !self.substances.contains(substance) {
                return Err(RegistryError::UnknownSubstance(substance).into());
            }
        }
        let id = self.containers.insert(container);
        self.names.insert(name.to_string(), id);
        self.container_names.insert(id, name.to_string());
        Ok(id)
    }

    /// Remove a vessel along with its pour state and reaction.
    pub fn remove_container(&mut self, id: ContainerId) -> Option<LiquidContainer> {
        let container = self.containers.remove(id)?;
        if let Some(name) = self.container_names.remove(id) {
            self.names.remove(&name);
        }
        self.transfer.remove_container(id);
        self.reactions.remove(id);
        Some(container)
    }

    /// Attach a reaction to a flask. Every substance the recipe requires
    /// must be registered.
    pub fn add_reaction(&mut self, flask: ContainerId, recipe: ReactionRecipe) -> Result<(), LabError> {
        if !self.containers.contains_key(flask) {
            return Err(LabError::UnknownContainer(format!("{flask:?}")));
        }
        if self.reactions.contains_key(flask) {
            return Err(LabError::DuplicateReaction(flask));
        }
        for &substance in &recipe.required_substances {
            if !self.substances.contains(substance) {
                return Err(RegistryError::UnknownSubstance(substance).into());
            }
        }
        let engine = ReactionEngine::new(flask, recipe)?;
        self.reactions.insert(flask, engine);
        Ok(())
    }

    /// Install the scripted procedure, replacing any previous one.
    pub fn set_procedure(&mut self, steps: Vec<ProcedureStep>) -> Result<(), LabError> {
        self.procedure = Some(StepSequencer::new(steps)?);
        Ok(())
    }

    pub fn set_pour_rate(&mut self, source: ContainerId, rate: f64) -> Result<(), LabError> {
        if !self.containers.contains_key(source) {
            return Err(LabError::UnknownContainer(format!("{source:?}")));
        }
        self.transfer.set_pour_rate(source, rate)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inbound signals
    // -----------------------------------------------------------------------

    /// Queue a collaborator signal for the next step.
    pub fn submit(&mut self, signal: LabSignal) {
        self.inbox.push_back(signal);
    }

    pub fn pending_signals(&self) -> usize {
        self.inbox.len()
    }

    // -----------------------------------------------------------------------
    // Direct manipulation
    // -----------------------------------------------------------------------

    /// Empty a reagent bottle of `substance` into `container`, using the
    /// substance's reference colors. Returns the volume actually added.
    pub fn fill(
        &mut self,
        container: ContainerId,
        substance: SubstanceId,
        volume: f64,
    ) -> Result<f64, LabError> {
        let def = self
            .substances
            .get(substance)
            .ok_or(RegistryError::UnknownSubstance(substance))?;
        let (top, side) = (def.top_color, def.side_color);
        let vessel = self
            .containers
            .get_mut(container)
            .ok_or_else(|| LabError::UnknownContainer(format!("{container:?}")))?;

        let added = vessel.add(substance, volume, top, side);
        if added > 0.0 {
            self.content_changed(container);
        }
        Ok(added)
    }

    /// Pick one solid unit up with the spatula.
    pub fn collect_solid(&mut self) -> SolidTransferOutcome {
        self.solids.collect()
    }

    /// Move one solid unit between holders.
    pub fn move_solid(&mut self, from: SolidHolder, to: SolidHolder) -> SolidTransferOutcome {
        let outcome = self.solids.transfer(from, to);
        if outcome.is_moved() {
            let tick = self.sim_state.tick;
            self.event_bus.emit(LabEvent::SolidUnitMoved { from, to, tick });
            if to == SolidHolder::Destination {
                self.notify_all_reactions();
            }
        }
        outcome
    }

    pub fn discard_solid(&mut self, holder: SolidHolder) -> bool {
        self.solids.discard(holder)
    }

    /// Set the heat plate directly. Returns `true` if the state changed.
    pub fn set_heat(&mut self, is_on: bool) -> bool {
        let changed = self.heat.set(is_on);
        if changed {
            self.heat_changed();
        }
        changed
    }

    /// Flip the heat plate and return its new state.
    pub fn toggle_heat(&mut self) -> bool {
        let is_on = self.heat.toggle();
        self.heat_changed();
        is_on
    }

    fn heat_changed(&mut self) {
        let tick = self.sim_state.tick;
        self.event_bus.emit(LabEvent::HeatSourceStateChanged {
            is_on: self.heat.is_on(),
            tick,
        });
        self.notify_all_reactions();
    }

    fn content_changed(&mut self, container: ContainerId) {
        let tick = self.sim_state.tick;
        self.event_bus.emit(LabEvent::ContentChanged { container, tick });
        if let Some(engine) = self.reactions.get_mut(container) {
            engine.notify();
        }
    }

    fn notify_all_reactions(&mut self) {
        for (_, engine) in &mut self.reactions {
            engine.notify();
        }
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Pause the simulation. While paused, `advance()` and `step()` are no-ops.
    /// Setup and direct manipulation still work.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    /// Advance the simulation according to the configured strategy.
    ///
    /// - **Variable**: exactly one step runs with `dt`.
    /// - **Fixed**: `dt` is accumulated; as many fixed steps run as fit.
    pub fn advance(&mut self, dt: f64) -> AdvanceResult {
        let mut result = AdvanceResult::default();
        if self.paused {
            return result;
        }
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        match self.strategy {
            SimulationStrategy::Variable => self.step_internal(dt, &mut result),
            SimulationStrategy::Fixed { timestep } => {
                self.sim_state.accumulator += dt;
                // Tolerate accumulated rounding so that ten 0.1 s frames make
                // ten 0.1 s steps.
                let tolerance = timestep * FIXED_STEP_TOLERANCE;
                while self.sim_state.accumulator + tolerance >= timestep {
                    self.sim_state.accumulator = (self.sim_state.accumulator - timestep).max(0.0);
                    self.step_internal(timestep, &mut result);
                }
            }
        }
        result
    }

    /// Run exactly one step of `dt` seconds regardless of strategy.
    pub fn step(&mut self, dt: f64) -> AdvanceResult {
        let mut result = AdvanceResult::default();
        if self.paused {
            return result;
        }
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.step_internal(dt, &mut result);
        result
    }

    // -----------------------------------------------------------------------
    // Internal: single step
    // -----------------------------------------------------------------------

    fn step_internal(&mut self, dt: f64, result: &mut AdvanceResult) {
        let tick = self.sim_state.tick;

        // Phase 1: Inbound -- route queued signals.
        result.events_emitted += self.phase_inbound(tick);

        // Phase 2: Transfer -- latched pours move liquid.
        result.events_emitted += self.phase_transfer(dt, tick);

        // Phase 3: Reaction -- evaluate and advance engines.
        result.events_emitted += self.phase_reaction(dt, tick);

        // Phase 4: Visual -- color transitions.
        result.events_emitted += self.phase_visual(dt, tick);

        // Phase 5: Delivery.
        self.event_bus.deliver();

        // Phase 6: Bookkeeping.
        self.sim_state.tick += 1;
        self.sim_state.elapsed += dt;

        result.steps_run += 1;
    }

    fn emit(&mut self, events: Vec<LabEvent>) -> usize {
        let count = events.len();
        self.event_bus.emit_all(events);
        count
    }

    // -----------------------------------------------------------------------
    // Phase 1: Inbound
    // -----------------------------------------------------------------------

    fn phase_inbound(&mut self, tick: Ticks) -> usize {
        let mut emitted = 0;
        while let Some(signal) = self.inbox.pop_front() {
            emitted += match signal {
                LabSignal::Attached { child, parent } => {
                    let mut events = vec![LabEvent::ObjectAttached {
                        child: child.clone(),
                        parent: parent.clone(),
                        tick,
                    }];
                    if let Some(procedure) = self.procedure.as_mut() {
                        events.extend(procedure.on_attached(&child, &parent, tick));
                    }
                    self.emit(events)
                }
                LabSignal::Heat { is_on } => {
                    if self.heat.set(is_on) {
                        self.notify_all_reactions();
                        self.emit(vec![LabEvent::HeatSourceStateChanged { is_on, tick }])
                    } else {
                        0
                    }
                }
                LabSignal::Pour {
                    source,
                    target,
                    active,
                } => {
                    self.route_pour(&source, target.as_deref(), active);
                    self.emit(vec![LabEvent::PourSignal {
                        source,
                        target,
                        active,
                        tick,
                    }])
                }
            };
        }
        emitted
    }

    fn route_pour(&mut self, source: &str, target: Option<&str>, active: bool) {
        let Some(&source_id) = self.names.get(source) else {
            warn!("pour signal from unknown container {source:?} ignored");
            return;
        };
        let target_id = target.and_then(|name| {
            let id = self.names.get(name).copied();
            if id.is_none() {
                warn!("pour signal names unknown receiver {name:?}, treating as no target");
            }
            id
        });
        self.transfer.set_signal(PourSignal {
            source: source_id,
            target: target_id,
            active,
        });
    }

    // -----------------------------------------------------------------------
    // Phase 2: Transfer
    // -----------------------------------------------------------------------

    fn phase_transfer(&mut self, dt: f64, tick: Ticks) -> usize {
        let events = self.transfer.advance(dt, &mut self.containers, tick);
        for event in &events {
            if let LabEvent::ContentChanged { container, .. } = event
                && let Some(engine) = self.reactions.get_mut(*container)
            {
                engine.notify();
            }
        }
        self.emit(events)
    }

    // -----------------------------------------------------------------------
    // Phase 3: Reaction
    // -----------------------------------------------------------------------

    fn phase_reaction(&mut self, dt: f64, tick: Ticks) -> usize {
        let heat_on = self.heat.is_on();
        let delivered = self.solids.delivered();
        let mut events = Vec::new();
        for (flask, engine) in &mut self.reactions {
            let Some(container) = self.containers.get_mut(flask) else {
                continue;
            };
            events.extend(engine.update(dt, container, heat_on, delivered, tick));
        }
        self.emit(events)
    }

    // -----------------------------------------------------------------------
    // Phase 4: Visual
    // -----------------------------------------------------------------------

    /// Transitions owned by a running reaction phase are advanced by the
    /// engine in phase 3 and skipped here.
    fn phase_visual(&mut self, dt: f64, tick: Ticks) -> usize {
        let mut events = Vec::new();
        for (id, container) in &mut self.containers {
            if self.reactions.get(id).is_some_and(ReactionEngine::drives_color) {
                continue;
            }
            if container.is_transitioning() {
                container.advance(dt);
                events.push(LabEvent::ContentChanged { container: id, tick });
            }
        }
        self.emit(events)
    }

    // -----------------------------------------------------------------------
    // Query API (read-only)
    // -----------------------------------------------------------------------

    pub fn container(&self, id: ContainerId) -> Option<&LiquidContainer> {
        self.containers.get(id)
    }

    pub fn container_id(&self, name: &str) -> Option<ContainerId> {
        self.names.get(name).copied()
    }

    pub fn container_by_name(&self, name: &str) -> Option<&LiquidContainer> {
        self.container_id(name).and_then(|id| self.containers.get(id))
    }

    pub fn container_name(&self, id: ContainerId) -> Option<&str> {
        self.container_names.get(id).map(String::as_str)
    }

    pub fn containers(&self) -> impl Iterator<Item = (ContainerId, &LiquidContainer)> {
        self.containers.iter()
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    pub fn substances(&self) -> &SubstanceRegistry {
        &self.substances
    }

    pub fn heat_on(&self) -> bool {
        self.heat.is_on()
    }

    pub fn solids(&self) -> &SolidTransferTracker {
        &self.solids
    }

    pub fn transfer(&self) -> &TransferCoordinator {
        &self.transfer
    }

    pub fn reaction(&self, flask: ContainerId) -> Option<&ReactionEngine> {
        self.reactions.get(flask)
    }

    /// Every unmet precondition of a flask's reaction, in evaluation order.
    pub fn unmet_preconditions(&self, flask: ContainerId) -> Option<Vec<UnmetPrecondition>> {
        let engine = self.reactions.get(flask)?;
        let container = self.containers.get(flask)?;
        Some(engine.unmet_preconditions(&ReactionInputs {
            flask: container,
            heat_on: self.heat.is_on(),
            solid_units: self.solids.delivered(),
        }))
    }

    pub fn procedure(&self) -> Option<&StepSequencer> {
        self.procedure.as_ref()
    }

    pub fn strategy(&self) -> SimulationStrategy {
        self.strategy
    }

    pub fn tick(&self) -> Ticks {
        self.sim_state.tick
    }

    pub fn elapsed(&self) -> f64 {
        self.sim_state.elapsed
    }

    pub fn snapshot_container(&self, id: ContainerId) -> Option<ContainerSnapshot> {
        let container = self.containers.get(id)?;
        Some(ContainerSnapshot {
            id,
            name: self.container_name(id).unwrap_or_default().to_string(),
            capacity: container.capacity(),
            volume: container.volume(),
            fill_fraction: container.fill_fraction(),
            top_color: container.top_color(),
            side_color: container.side_color(),
            composition: container
                .composition()
                .iter()
                .map(|(&substance, &volume)| (substance, volume))
                .collect(),
            dominant_substance: container.dominant_substance(),
            transitioning: container.is_transitioning(),
        })
    }

    pub fn snapshot(&self) -> LabSnapshot {
        LabSnapshot {
            tick: self.sim_state.tick,
            elapsed: self.sim_state.elapsed,
            heat_on: self.heat.is_on(),
            containers: self
                .containers
                .keys()
                .filter_map(|id| self.snapshot_container(id))
                .collect(),
            solids: SolidSnapshot {
                on_collector: self.solids.units_on(SolidHolder::Collector),
                on_carrier: self.solids.units_on(SolidHolder::Carrier),
                in_destination: self.solids.units_on(SolidHolder::Destination),
                delivered: self.solids.delivered(),
                weighed_mg: self.solids.weighing().mass_mg(),
                target_mg: self.solids.weighing().target_mass_mg(),
            },
            reactions: self
                .reactions
                .iter()
                .map(|(flask, engine)| ReactionSnapshot {
                    flask,
                    state: engine.state(),
                    phase: engine.current_phase(),
                })
                .collect(),
            procedure: self.procedure.as_ref().map(|p| ProcedureSnapshot {
                current_index: p.current_index(),
                step_count: p.len(),
                current_step: p.current_step().map(|s| s.id.clone()),
                completed: p.is_completed(),
            }),
        }
    }
}
