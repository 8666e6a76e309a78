//! Labsim Core -- the liquid state and reaction simulation engine for a
//! mixed-reality chemistry bench.
//!
//! This crate tracks the volume, composition and color of every vessel,
//! moves liquid between vessels while pour signals are active, counts solid
//! units through spatula, weighing paper and flask, gates a scripted
//! reaction behind physical preconditions, and walks an ordered procedure
//! driven by attachment events. Rendering, physics, voice and networking are
//! collaborators: they feed signals in and read events and snapshots out.
//!
//! # Six-Phase Step Pipeline
//!
//! Each call to [`lab::Lab::step`] advances the simulation by one step of
//! `dt` seconds:
//!
//! 1. **Inbound** -- Route queued collaborator signals (attachment, heat, pour).
//! 2. **Transfer** -- Move liquid for every latched, active pour.
//! 3. **Reaction** -- Notified engines evaluate preconditions; running ones advance.
//! 4. **Visual** -- Containers advance their color transitions.
//! 5. **Delivery** -- Deliver buffered events to subscribers.
//! 6. **Bookkeeping** -- Increment the tick counter and elapsed time.
//!
//! # Key Types
//!
//! - [`lab::Lab`] -- Owns every component and runs the pipeline.
//! - [`container::LiquidContainer`] -- Mass-conserving vessel with color blending.
//! - [`transfer::TransferCoordinator`] -- Rate-limited, atomic draw-then-add pours.
//! - [`solid::SolidTransferTracker`] -- Discrete solid units across three holders.
//! - [`reaction::ReactionEngine`] -- Per-flask precondition gate and phase runner.
//! - [`sequencer::StepSequencer`] -- Ordered procedure advanced by attachments.
//! - [`event::EventBus`] -- Subscription-based bus with buffered delivery.

pub mod color;
pub mod config;
pub mod container;
pub mod event;
pub mod heat;
pub mod id;
pub mod lab;
pub mod query;
pub mod reaction;
pub mod sequencer;
pub mod sim;
pub mod solid;
pub mod substance;
pub mod transfer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
