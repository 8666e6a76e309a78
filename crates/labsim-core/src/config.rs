//! Lab-wide tunables.

use serde::{Deserialize, Serialize};

use crate::sim::SimulationStrategy;
use crate::transfer::{DEFAULT_MIN_POUR_VOLUME, DEFAULT_POUR_RATE};

/// Default ring buffer capacity per event kind.
pub const DEFAULT_EVENT_BUFFER_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Pour rate in ml/s for sources without an override.
    pub pour_rate: f64,
    /// A source at or below this volume (ml) does not pour.
    pub min_pour_volume: f64,
    pub event_buffer_capacity: usize,
    pub strategy: SimulationStrategy,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            pour_rate: DEFAULT_POUR_RATE,
            min_pour_volume: DEFAULT_MIN_POUR_VOLUME,
            event_buffer_capacity: DEFAULT_EVENT_BUFFER_CAPACITY,
            strategy: SimulationStrategy::Variable,
        }
    }
}
