//! Granular solid handling: spatula, weighing paper, flask.
//!
//! Solids move in fixed-size units, one at a time, between three holders:
//! the collector (spatula) picks units up from bulk stock, the carrier
//! (weighing paper) receives them on the scale, and the destination (the
//! reaction flask) receives them from the carrier. Every holder has a fixed
//! number of pre-allocated slots. A unit is never present in two holders.

use serde::{Deserialize, Serialize};

/// Mass of one solid unit when none is configured, in milligrams.
pub const DEFAULT_MASS_PER_UNIT_MG: u32 = 100;

/// One of the three places a solid unit can sit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolidHolder {
    /// Pickup tool (spatula).
    Collector,
    /// Intermediate carrier (weighing paper).
    Carrier,
    /// Final vessel (reaction flask).
    Destination,
}

impl SolidHolder {
    pub const ALL: [SolidHolder; 3] = [
        SolidHolder::Collector,
        SolidHolder::Carrier,
        SolidHolder::Destination,
    ];
}

// ---------------------------------------------------------------------------
// SolidUnitTracker
// ---------------------------------------------------------------------------

/// Running count of units handled by one step of the procedure (for
/// example, weighing).
///
/// `units_collected` never exceeds `total_units_required` and only decreases
/// through an explicit [`SolidUnitTracker::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolidUnitTracker {
    total_units_required: u32,
    units_collected: u32,
    mass_per_unit_mg: u32,
}

impl SolidUnitTracker {
    pub fn new(total_units_required: u32, mass_per_unit_mg: u32) -> Self {
        Self {
            total_units_required,
            units_collected: 0,
            mass_per_unit_mg,
        }
    }

    pub fn total_units_required(&self) -> u32 {
        self.total_units_required
    }

    pub fn units_collected(&self) -> u32 {
        self.units_collected
    }

    /// Count one more unit. Returns `false` once the total is reached.
    pub fn record(&mut self) -> bool {
        if self.units_collected < self.total_units_required {
            self.units_collected += 1;
            true
        } else {
            false
        }
    }

    /// Take back up to `units`, mirroring consumption elsewhere. Returns the
    /// number actually removed.
    pub fn remove(&mut self, units: u32) -> u32 {
        let removed = units.min(self.units_collected);
        self.units_collected -= removed;
        removed
    }

    pub fn is_complete(&self) -> bool {
        self.units_collected >= self.total_units_required
    }

    /// Mass shown on the scale, in milligrams.
    pub fn mass_mg(&self) -> u32 {
        self.units_collected.saturating_mul(self.mass_per_unit_mg)
    }

    pub fn target_mass_mg(&self) -> u32 {
        self.total_units_required.saturating_mul(self.mass_per_unit_mg)
    }
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slots {
    capacity: u32,
    occupied: u32,
}

impl Slots {
    fn new(capacity: u32) -> Self {
        Self {
            capacity,
            occupied: 0,
        }
    }

    fn has_unit(&self) -> bool {
        self.occupied > 0
    }

    fn has_free_slot(&self) -> bool {
        self.occupied < self.capacity
    }
}

// ---------------------------------------------------------------------------
// SolidTransferTracker
// ---------------------------------------------------------------------------

/// Slot counts for the three holders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolidConfig {
    pub collector_slots: u32,
    pub carrier_slots: u32,
    pub destination_slots: u32,
    #[serde(default = "default_mass_per_unit")]
    pub mass_per_unit_mg: u32,
}

fn default_mass_per_unit() -> u32 {
    DEFAULT_MASS_PER_UNIT_MG
}

impl Default for SolidConfig {
    /// One unit on the spatula, five on the paper (500 mg), five in the flask.
    fn default() -> Self {
        Self {
            collector_slots: 1,
            carrier_slots: 5,
            destination_slots: 5,
            mass_per_unit_mg: DEFAULT_MASS_PER_UNIT_MG,
        }
    }
}

/// Result of a single solid move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolidTransferOutcome {
    Moved,
    /// The source holder has no unit to give.
    SourceEmpty,
    /// Every slot of the destination holder is taken.
    DestinationFull,
    /// Source and destination are the same holder.
    SameHolder,
}

impl SolidTransferOutcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, SolidTransferOutcome::Moved)
    }
}

/// Tracks solid units across the collector, carrier, and destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolidTransferTracker {
    collector: Slots,
    carrier: Slots,
    destination: Slots,
    /// Units weighed onto the carrier.
    weighing: SolidUnitTracker,
    /// Units ever delivered to the destination.
    delivered: u32,
}

impl SolidTransferTracker {
    pub fn new(config: SolidConfig) -> Result<Self, SolidConfigError> {
        for (holder, slots) in [
            (SolidHolder::Collector, config.collector_slots),
            (SolidHolder::Carrier, config.carrier_slots),
            (SolidHolder::Destination, config.destination_slots),
        ] {
            if slots == 0 {
                return Err(SolidConfigError::NoSlots(holder));
            }
        }
        if config.mass_per_unit_mg == 0 {
            return Err(SolidConfigError::ZeroUnitMass);
        }
        Ok(Self {
            collector: Slots::new(config.collector_slots),
            carrier: Slots::new(config.carrier_slots),
            destination: Slots::new(config.destination_slots),
            weighing: SolidUnitTracker::new(config.carrier_slots, config.mass_per_unit_mg),
            delivered: 0,
        })
    }

    fn slots(&self, holder: SolidHolder) -> &Slots {
        match holder {
            SolidHolder::Collector => &self.collector,
            SolidHolder::Carrier => &self.carrier,
            SolidHolder::Destination => &self.destination,
        }
    }

    fn slots_mut(&mut self, holder: SolidHolder) -> &mut Slots {
        match holder {
            SolidHolder::Collector => &mut self.collector,
            SolidHolder::Carrier => &mut self.carrier,
            SolidHolder::Destination => &mut self.destination,
        }
    }

    /// Units currently present on a holder.
    pub fn units_on(&self, holder: SolidHolder) -> u32 {
        self.slots(holder).occupied
    }

    pub fn capacity_of(&self, holder: SolidHolder) -> u32 {
        self.slots(holder).capacity
    }

    /// Units delivered to the destination so far. Read by reaction
    /// preconditions.
    pub fn delivered(&self) -> u32 {
        self.delivered
    }

    /// The weighing record for units placed on the carrier.
    pub fn weighing(&self) -> &SolidUnitTracker {
        &self.weighing
    }

    /// Pick one unit up from bulk stock onto the collector. Bulk stock is
    /// unlimited; only a full collector refuses.
    pub fn collect(&mut self) -> SolidTransferOutcome {
        if !self.collector.has_free_slot() {
            return SolidTransferOutcome::DestinationFull;
        }
        self.collector.occupied += 1;
        SolidTransferOutcome::Moved
    }

    /// Move exactly one unit from `from` to `to`.
    ///
    /// Succeeds only if `from` holds a unit and `to` has a free slot; the
    /// unit leaves `from` and lands on `to` in the same call. Units landing
    /// on the carrier are recorded on the weighing tracker; units landing on
    /// the destination count toward [`Self::delivered`].
    pub fn transfer(&mut self, from: SolidHolder, to: SolidHolder) -> SolidTransferOutcome {
        if from == to {
            return SolidTransferOutcome::SameHolder;
        }
        if !self.slots(from).has_unit() {
            return SolidTransferOutcome::SourceEmpty;
        }
        if !self.slots(to).has_free_slot() {
            return SolidTransferOutcome::DestinationFull;
        }

        self.slots_mut(from).occupied -= 1;
        self.slots_mut(to).occupied += 1;

        match to {
            SolidHolder::Carrier => {
                self.weighing.record();
            }
            SolidHolder::Destination => self.delivered += 1,
            // Scooped back off the paper: no longer on the scale.
            SolidHolder::Collector if from == SolidHolder::Carrier => {
                self.weighing.remove(1);
            }
            SolidHolder::Collector => {}
        }
        SolidTransferOutcome::Moved
    }

    /// Throw away one unit from a holder without delivering it. Removing
    /// from the carrier also takes the unit off the weighing record.
    pub fn discard(&mut self, holder: SolidHolder) -> bool {
        let slots = self.slots_mut(holder);
        if !slots.has_unit() {
            return false;
        }
        slots.occupied -= 1;
        if holder == SolidHolder::Carrier {
            self.weighing.remove(1);
        }
        true
    }
}

/// Configuration errors for solid handling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SolidConfigError {
    #[error("solid holder {0:?} must have at least one slot")]
    NoSlots(SolidHolder),
    #[error("solid unit mass must be positive")]
    ZeroUnitMass,
}
