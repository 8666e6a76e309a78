//! Shared test helpers for unit and integration tests.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests and, via the `test-utils` feature, in other
//! crates' tests.

use std::cell::RefCell;
use std::rc::Rc;

use crate::color::Rgba;
use crate::config::LabConfig;
use crate::container::LiquidContainer;
use crate::event::{EventKind, LabEvent};
use crate::id::{ContainerId, SubstanceId};
use crate::lab::{Lab, LabSignal};
use crate::reaction::ReactionRecipe;
use crate::sequencer::ProcedureStage;
use crate::solid::{SolidConfig, SolidHolder};
use crate::substance::SubstanceRegistryBuilder;

// ===========================================================================
// Colors
// ===========================================================================

pub fn ethanol_color() -> Rgba {
    Rgba::new(0.95, 0.95, 1.0, 0.6)
}

pub fn nitrating_color() -> Rgba {
    Rgba::rgb(0.85, 0.75, 0.30)
}

pub fn dark_red() -> Rgba {
    Rgba::rgb(0.5, 0.0, 0.0)
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

// ===========================================================================
// Nitration bench
// ===========================================================================

/// The standard bench: a 250 ml flask with the nitration reaction, a 100 ml
/// cylinder of ethanol, a beaker of nitrating mixture, and the ten-stage
/// procedure.
pub struct NitrationLab {
    pub lab: Lab,
    pub ethanol: SubstanceId,
    pub nitrating_mix: SubstanceId,
    pub flask: ContainerId,
    pub cylinder: ContainerId,
    pub mix_beaker: ContainerId,
}

pub fn nitration_lab() -> NitrationLab {
    nitration_lab_with(LabConfig::default())
}

pub fn nitration_lab_with(config: LabConfig) -> NitrationLab {
    let mut substances = SubstanceRegistryBuilder::new();
    let ethanol = substances
        .register("ethanol", ethanol_color(), ethanol_color())
        .unwrap();
    let nitrating_mix = substances
        .register("nitrating_mix", nitrating_color(), nitrating_color())
        .unwrap();

    let mut lab = Lab::new(&config, substances.build(), SolidConfig::default()).unwrap();
    let flask = lab
        .add_container("flask", LiquidContainer::new(250.0).unwrap())
        .unwrap();
    let cylinder = lab
        .add_container(
            "cylinder",
            LiquidContainer::with_contents(100.0, ethanol, 30.0, ethanol_color(), ethanol_color())
                .unwrap(),
        )
        .unwrap();
    let mix_beaker = lab
        .add_container(
            "mix_beaker",
            LiquidContainer::with_contents(
                100.0,
                nitrating_mix,
                20.0,
                nitrating_color(),
                nitrating_color(),
            )
            .unwrap(),
        )
        .unwrap();

    lab.add_reaction(flask, ReactionRecipe::nitration(ethanol, nitrating_mix))
        .unwrap();
    lab.set_procedure(ProcedureStage::standard_procedure())
        .unwrap();

    NitrationLab {
        lab,
        ethanol,
        nitrating_mix,
        flask,
        cylinder,
        mix_beaker,
    }
}

impl NitrationLab {
    /// Spatula -> paper -> flask for `units` units.
    pub fn deliver_solids(&mut self, units: u32) {
        for _ in 0..units {
            self.lab.collect_solid();
            self.lab.move_solid(SolidHolder::Collector, SolidHolder::Carrier);
            self.lab.move_solid(SolidHolder::Carrier, SolidHolder::Destination);
        }
    }

    /// Hold a pour from `source` into the flask for `seconds`, in 0.1 s steps,
    /// then stop it.
    pub fn pour_into_flask(&mut self, source: &str, seconds: f64) {
        self.lab.submit(LabSignal::pour(source, Some("flask"), true));
        let steps = (seconds / 0.1).round() as u32;
        for _ in 0..steps {
            self.lab.step(0.1);
        }
        self.lab.submit(LabSignal::pour(source, Some("flask"), false));
        self.lab.step(0.0);
    }

    pub fn attach(&mut self, stage: ProcedureStage) {
        let (child, parent) = stage.attachment();
        self.lab.submit(LabSignal::attached(child, parent));
    }

    pub fn run(&mut self, seconds: f64, dt: f64) {
        let steps = (seconds / dt).round() as u32;
        for _ in 0..steps {
            self.lab.step(dt);
        }
    }
}

// ===========================================================================
// Event recording
// ===========================================================================

/// Collects every delivered event, in delivery order.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Rc<RefCell<Vec<LabEvent>>>,
}

impl EventRecorder {
    /// Subscribe to every event kind on the lab's bus.
    pub fn attach(lab: &mut Lab) -> Self {
        Self::attach_kinds(lab, &EventKind::ALL)
    }

    pub fn attach_kinds(lab: &mut Lab, kinds: &[EventKind]) -> Self {
        let recorder = Self::default();
        for &kind in kinds {
            let sink = recorder.events.clone();
            lab.event_bus
                .subscribe(kind, Box::new(move |e| sink.borrow_mut().push(e.clone())));
        }
        recorder
    }

    pub fn events(&self) -> Vec<LabEvent> {
        self.events.borrow().clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.borrow().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}
