//! Simulation strategy and state types.
//!
//! The lab is parameterized by a [`SimulationStrategy`] that determines how
//! wall-clock time is turned into pipeline steps. All strategies execute the
//! same six-phase step; they differ only in how many steps run per
//! `advance()` call and with which `dt`.

use serde::{Deserialize, Serialize};

/// Ticks count pipeline steps since the lab was created.
pub type Ticks = u64;

/// Smallest accepted fixed timestep in seconds.
pub const MIN_FIXED_TIMESTEP: f64 = 1e-6;

/// Fraction of a timestep the accumulator may fall short by and still run
/// the step, absorbing rounding from summed frame times.
pub const FIXED_STEP_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Simulation strategy
// ---------------------------------------------------------------------------

/// How the lab advances time. Chosen at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum SimulationStrategy {
    /// One step per `advance(dt)` call, using the caller's `dt` (one step per
    /// rendered frame).
    #[default]
    Variable,

    /// Accumulates `dt` and runs as many steps of exactly `timestep` seconds
    /// as fit, carrying the remainder forward.
    Fixed {
        /// Duration of one step in seconds.
        timestep: f64,
    },
}

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// Mutable simulation clock tracked by the lab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    /// Incremented by 1 for each pipeline step.
    pub tick: Ticks,

    /// Simulated seconds elapsed across all steps.
    pub elapsed: f64,

    /// Unconsumed time in fixed-step mode. Always below one timestep.
    pub accumulator: f64,
}

impl SimState {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Advance result
// ---------------------------------------------------------------------------

/// Result of a `Lab::advance()` call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AdvanceResult {
    /// Number of pipeline steps actually executed.
    pub steps_run: u64,
    /// Number of events emitted across those steps.
    pub events_emitted: usize,
}
