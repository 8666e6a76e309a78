//! Pour transfer between liquid containers.
//!
//! Pour detection (vessel tilt, proximity of a receiver to the pour point)
//! happens outside the core. Its result arrives as a [`PourSignal`] which the
//! [`TransferCoordinator`] latches per source until the next signal for that
//! source. Every tick, each active pour with a valid target moves
//! `min(rate * dt, source.volume)` from source to target.
//!
//! A draw on the source is only executed after the target has been
//! confirmed, and is always followed in the same call by the matching add on
//! the target. A flickering signal without a target never drains a source.

use log::trace;
use slotmap::{SecondaryMap, SlotMap};

use crate::container::LiquidContainer;
use crate::event::LabEvent;
use crate::id::ContainerId;
use crate::sim::Ticks;

/// Pour rate used when a source has no override, in ml per second.
pub const DEFAULT_POUR_RATE: f64 = 10.0;

/// A source at or below this volume is treated as empty for pouring.
pub const DEFAULT_MIN_POUR_VOLUME: f64 = 0.001;

// ---------------------------------------------------------------------------
// Signals and outcomes
// ---------------------------------------------------------------------------

/// Resolved pour signal for one source vessel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PourSignal {
    pub source: ContainerId,
    /// Candidate receiver found near the pour point, if any.
    pub target: Option<ContainerId>,
    /// Whether the source is tilted past its pour angle.
    pub active: bool,
}

/// What happened to one source during the most recent tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PourOutcome {
    /// The pour signal is inactive.
    Idle,
    /// Pouring, but no valid receiver: the source is left untouched.
    NoTarget,
    /// Pouring into a valid receiver, but nothing left to pour.
    SourceEmpty,
    /// Liquid moved. `delivered < drawn` when the target overflowed.
    Transferred { drawn: f64, delivered: f64 },
}

impl PourOutcome {
    /// Whether the source is actively delivering into a receiver.
    pub fn is_pouring(&self) -> bool {
        matches!(self, PourOutcome::Transferred { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct PourChannel {
    signal: PourSignal,
    /// Target of the pour in progress, if the source delivered last tick.
    pouring_into: Option<ContainerId>,
    last_outcome: PourOutcome,
}

// ---------------------------------------------------------------------------
// TransferCoordinator
// ---------------------------------------------------------------------------

/// Moves liquid between containers while pour signals are active.
#[derive(Debug, Clone)]
pub struct TransferCoordinator {
    default_rate: f64,
    min_source_volume: f64,
    rates: SecondaryMap<ContainerId, f64>,
    channels: SecondaryMap<ContainerId, PourChannel>,
    /// Volume drawn from sources but clamped away by full targets.
    spilled: f64,
}

impl Default for TransferCoordinator {
    fn default() -> Self {
        Self {
            default_rate: DEFAULT_POUR_RATE,
            min_source_volume: DEFAULT_MIN_POUR_VOLUME,
            rates: SecondaryMap::new(),
            channels: SecondaryMap::new(),
            spilled: 0.0,
        }
    }
}

impl TransferCoordinator {
    /// Create a coordinator with a default pour rate (ml/s) and the volume at
    /// or below which a source counts as empty.
    pub fn new(default_rate: f64, min_source_volume: f64) -> Result<Self, TransferError> {
        validate_rate(default_rate)?;
        if !(min_source_volume.is_finite() && min_source_volume >= 0.0) {
            return Err(TransferError::InvalidMinVolume(min_source_volume));
        }
        Ok(Self {
            default_rate,
            min_source_volume,
            ..Self::default()
        })
    }

    /// Override the pour rate of one source.
    pub fn set_pour_rate(&mut self, source: ContainerId, rate: f64) -> Result<(), TransferError> {
        validate_rate(rate)?;
        self.rates.insert(source, rate);
        Ok(())
    }

    /// Effective pour rate of a source in ml/s.
    pub fn pour_rate(&self, source: ContainerId) -> f64 {
        self.rates.get(source).copied().unwrap_or(self.default_rate)
    }

    /// Latch the latest pour signal for its source.
    pub fn set_signal(&mut self, signal: PourSignal) {
        match self.channels.get_mut(signal.source) {
            Some(channel) => channel.signal = signal,
            None => {
                self.channels.insert(
                    signal.source,
                    PourChannel {
                        signal,
                        pouring_into: None,
                        last_outcome: PourOutcome::Idle,
                    },
                );
            }
        }
    }

    /// The signal currently latched for a source.
    pub fn signal(&self, source: ContainerId) -> Option<PourSignal> {
        self.channels.get(source).map(|c| c.signal)
    }

    /// Outcome of the most recent tick for a source.
    pub fn last_outcome(&self, source: ContainerId) -> PourOutcome {
        self.channels
            .get(source)
            .map(|c| c.last_outcome)
            .unwrap_or(PourOutcome::Idle)
    }

    pub fn is_pouring(&self, source: ContainerId) -> bool {
        self.channels
            .get(source)
            .is_some_and(|c| c.pouring_into.is_some())
    }

    /// Total volume lost to overflowing targets.
    pub fn spilled_volume(&self) -> f64 {
        self.spilled
    }

    /// Forget a container, both as a source and as a latched target.
    pub fn remove_container(&mut self, id: ContainerId) {
        self.channels.remove(id);
        self.rates.remove(id);
        for channel in self.channels.values_mut() {
            if channel.signal.target == Some(id) {
                channel.signal.target = None;
            }
        }
    }

    /// Run one tick of every latched pour. Returns the events produced, in
    /// source order.
    pub fn advance(
        &mut self,
        dt: f64,
        containers: &mut SlotMap<ContainerId, LiquidContainer>,
        tick: Ticks,
    ) -> Vec<LabEvent> {
        let mut events = Vec::new();
        let sources: Vec<ContainerId> = self.channels.keys().collect();

        for source in sources {
            let Some(channel) = self.channels.get(source).copied() else {
                continue;
            };
            let rate = self.pour_rate(source);
            let outcome = self.pour_once(channel.signal, rate * dt, containers);

            match outcome {
                PourOutcome::Transferred { drawn, delivered } => {
                    if drawn > 0.0 {
                        events.push(LabEvent::ContentChanged {
                            container: source,
                            tick,
                        });
                    }
                    if let Some(target) = channel.signal.target
                        && delivered > 0.0
                    {
                        events.push(LabEvent::ContentChanged {
                            container: target,
                            tick,
                        });
                    }
                }
                PourOutcome::Idle | PourOutcome::NoTarget | PourOutcome::SourceEmpty => {}
            }

            let now_into = if outcome.is_pouring() {
                channel.signal.target
            } else {
                None
            };
            if channel.pouring_into.is_some() && channel.pouring_into != now_into {
                events.push(LabEvent::PourStopped { source, tick });
            }
            if let Some(target) = now_into
                && channel.pouring_into != now_into
            {
                events.push(LabEvent::PourStarted {
                    source,
                    target,
                    tick,
                });
            }

            if let Some(channel) = self.channels.get_mut(source) {
                channel.pouring_into = now_into;
                channel.last_outcome = outcome;
            }
        }

        events
    }

    /// Move up to `max_volume` according to one signal.
    ///
    /// The target is validated before anything is drawn: it must exist and
    /// differ from the source. When it is valid the draw and the add happen
    /// back to back.
    pub fn pour_once(
        &mut self,
        signal: PourSignal,
        max_volume: f64,
        containers: &mut SlotMap<ContainerId, LiquidContainer>,
    ) -> PourOutcome {
        if !signal.active {
            return PourOutcome::Idle;
        }
        let Some(target) = signal.target else {
            return PourOutcome::NoTarget;
        };
        if target == signal.source
            || !containers.contains_key(target)
            || !containers.contains_key(signal.source)
        {
            return PourOutcome::NoTarget;
        }

        let Some(source) = containers.get_mut(signal.source) else {
            return PourOutcome::NoTarget;
        };
        if source.volume() <= self.min_source_volume {
            return PourOutcome::SourceEmpty;
        }

        let requested = if max_volume.is_finite() { max_volume.max(0.0) } else { 0.0 };
        let delta = requested.min(source.volume());
        let portion = source.draw(delta);

        let delivered = match containers.get_mut(target) {
            Some(receiver) => receiver.add_portion(&portion),
            None => 0.0,
        };
        self.spilled += portion.volume - delivered;
        trace!(
            "pour: drew {:.4} ml, delivered {:.4} ml",
            portion.volume, delivered
        );

        PourOutcome::Transferred {
            drawn: portion.volume,
            delivered,
        }
    }
}

fn validate_rate(rate: f64) -> Result<(), TransferError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(TransferError::NonPositiveRate(rate))
    }
}

/// Configuration errors for pour transfer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransferError {
    #[error("pour rate must be positive and finite, got {0}")]
    NonPositiveRate(f64),
    #[error("minimum pour volume must be non-negative and finite, got {0}")]
    InvalidMinVolume(f64),
}
