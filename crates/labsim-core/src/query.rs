//! Read-only query API for inspecting lab state.
//!
//! Snapshot types aggregate lab state into owned views for rendering and UI
//! collaborators. They hold no references into the lab's storage.

use crate::color::Rgba;
use crate::id::{ContainerId, SubstanceId};
use crate::reaction::ReactionState;
use crate::sim::Ticks;

// ---------------------------------------------------------------------------
// Container snapshot
// ---------------------------------------------------------------------------

/// A read-only view of one container, as a fill-level visual consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSnapshot {
    pub id: ContainerId,
    pub name: String,
    pub capacity: f64,
    pub volume: f64,
    /// `volume / capacity`, in 0..=1.
    pub fill_fraction: f64,
    pub top_color: Rgba,
    pub side_color: Rgba,
    /// Composition in substance ID order.
    pub composition: Vec<(SubstanceId, f64)>,
    pub dominant_substance: Option<SubstanceId>,
    /// Whether a color transition is in progress.
    pub transitioning: bool,
}

impl ContainerSnapshot {
    /// The text shown on a vessel's volume display, e.g. `"70/100"`.
    pub fn label(&self) -> String {
        format!("{:.0}/{:.0}", self.volume.round(), self.capacity.round())
    }
}

// ---------------------------------------------------------------------------
// Solid snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolidSnapshot {
    pub on_collector: u32,
    pub on_carrier: u32,
    pub in_destination: u32,
    pub delivered: u32,
    /// Mass currently recorded on the weighing paper.
    pub weighed_mg: u32,
    pub target_mg: u32,
}

// ---------------------------------------------------------------------------
// Reaction / procedure snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactionSnapshot {
    pub flask: ContainerId,
    pub state: ReactionState,
    /// Running phase, while reacting.
    pub phase: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureSnapshot {
    pub current_index: usize,
    pub step_count: usize,
    /// ID of the step waiting to be completed.
    pub current_step: Option<String>,
    pub completed: bool,
}

// ---------------------------------------------------------------------------
// Lab snapshot
// ---------------------------------------------------------------------------

/// Everything a UI needs to redraw the bench in one owned value.
#[derive(Debug, Clone, PartialEq)]
pub struct LabSnapshot {
    pub tick: Ticks,
    pub elapsed: f64,
    pub heat_on: bool,
    pub containers: Vec<ContainerSnapshot>,
    pub solids: SolidSnapshot,
    pub reactions: Vec<ReactionSnapshot>,
    pub procedure: Option<ProcedureSnapshot>,
}

impl LabSnapshot {
    pub fn container(&self, name: &str) -> Option<&ContainerSnapshot> {
        self.containers.iter().find(|c| c.name == name)
    }
}
