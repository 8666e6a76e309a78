//! Nitration walkthrough: the full bench procedure driven headless.
//!
//! Builds the standard bench, subscribes listeners to reaction and procedure
//! events, then plays the ten procedure stages with pours, solid transfer and
//! heating until the flask turns red-brown.
//!
//! Run with: `RUST_LOG=info cargo run -p labsim-core --example nitration_walkthrough`

use std::cell::RefCell;
use std::rc::Rc;

use labsim_core::color::Rgba;
use labsim_core::config::LabConfig;
use labsim_core::container::LiquidContainer;
use labsim_core::event::{EventKind, LabEvent};
use labsim_core::lab::{Lab, LabSignal};
use labsim_core::reaction::ReactionRecipe;
use labsim_core::sequencer::ProcedureStage;
use labsim_core::solid::{SolidConfig, SolidHolder};
use labsim_core::substance::SubstanceRegistryBuilder;

fn main() {
    env_logger::init();

    // --- Substances and vessels ---

    let mut substances = SubstanceRegistryBuilder::new();
    let ethanol = substances
        .register("ethanol", Rgba::new(0.95, 0.95, 1.0, 0.6), Rgba::new(0.95, 0.95, 1.0, 0.6))
        .unwrap();
    let mix = substances
        .register("nitrating_mix", Rgba::rgb(0.85, 0.75, 0.3), Rgba::rgb(0.85, 0.75, 0.3))
        .unwrap();

    let mut lab = Lab::new(&LabConfig::default(), substances.build(), SolidConfig::default()).unwrap();
    let flask = lab
        .add_container("flask", LiquidContainer::new(250.0).unwrap())
        .unwrap();
    let cylinder = lab
        .add_container("cylinder", LiquidContainer::new(100.0).unwrap())
        .unwrap();
    let beaker = lab
        .add_container("mix_beaker", LiquidContainer::new(100.0).unwrap())
        .unwrap();

    lab.add_reaction(flask, ReactionRecipe::nitration(ethanol, mix)).unwrap();
    lab.set_procedure(ProcedureStage::standard_procedure()).unwrap();

    // --- Listeners ---

    let narration: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    for kind in [
        EventKind::StepAdvanced,
        EventKind::ProcedureCompleted,
        EventKind::ReactionPhaseStarted,
        EventKind::ReactionEffect,
        EventKind::ReactionCompleted,
    ] {
        let log = narration.clone();
        lab.event_bus.subscribe(
            kind,
            Box::new(move |event| {
                let line = match event {
                    LabEvent::StepAdvanced { step_id, tick, .. } => format!("[{tick}] step {step_id} done"),
                    LabEvent::ProcedureCompleted { tick } => format!("[{tick}] procedure complete"),
                    LabEvent::ReactionPhaseStarted { phase_index, tick, .. } => {
                        format!("[{tick}] reaction phase {phase_index}")
                    }
                    LabEvent::ReactionEffect { effect, tick, .. } => format!("[{tick}] play {effect:?}"),
                    LabEvent::ReactionCompleted { tick, .. } => format!("[{tick}] reaction complete"),
                    other => format!("{other:?}"),
                };
                log.borrow_mut().push(line);
            }),
        );
    }

    let attach = |lab: &mut Lab, stage: ProcedureStage| {
        let (child, parent) = stage.attachment();
        lab.submit(LabSignal::attached(child, parent));
        lab.step(0.1);
    };
    let pour = |lab: &mut Lab, source: &str, seconds: u32| {
        lab.submit(LabSignal::pour(source, Some("flask"), true));
        for _ in 0..seconds * 10 {
            lab.step(0.1);
        }
        lab.submit(LabSignal::pour(source, Some("flask"), false));
        lab.step(0.0);
    };

    // --- F1..F3: flask, weighing, solid transfer ---

    attach(&mut lab, ProcedureStage::PlaceFlask);
    for _ in 0..5 {
        lab.collect_solid();
        lab.move_solid(SolidHolder::Collector, SolidHolder::Carrier);
    }
    println!("weighed: {} mg", lab.solids().weighing().mass_mg());
    attach(&mut lab, ProcedureStage::WeighSolid);
    for _ in 0..5 {
        lab.move_solid(SolidHolder::Carrier, SolidHolder::Destination);
    }
    attach(&mut lab, ProcedureStage::TransferSolid);

    // --- F4..F5: solvent ---

    lab.fill(cylinder, ethanol, 30.0).unwrap();
    attach(&mut lab, ProcedureStage::MeasureSolvent);
    attach(&mut lab, ProcedureStage::AddSolvent);
    pour(&mut lab, "cylinder", 3);

    // --- F6..F9: heat, acids, mixture ---

    lab.set_heat(true);
    attach(&mut lab, ProcedureStage::Heat);
    lab.fill(beaker, mix, 20.0).unwrap();
    attach(&mut lab, ProcedureStage::AddSulfuricAcid);
    attach(&mut lab, ProcedureStage::AddNitricAcid);
    attach(&mut lab, ProcedureStage::PourMixture);
    pour(&mut lab, "mix_beaker", 2);

    if let Some(unmet) = lab.unmet_preconditions(flask) {
        println!("unmet preconditions: {unmet:?}");
    }

    // --- F10: wait for the color ---

    for _ in 0..70 {
        lab.step(0.1);
    }
    attach(&mut lab, ProcedureStage::ObserveColor);

    for line in narration.borrow().iter() {
        println!("{line}");
    }
    let snapshot = lab.snapshot();
    for container in &snapshot.containers {
        println!(
            "{:>10}: {:>7}  top {:?}",
            container.name,
            container.label(),
            container.top_color
        );
    }
    println!(
        "tick {} ({:.1} s), reaction {:?}",
        snapshot.tick,
        snapshot.elapsed,
        lab.reaction(flask).map(|r| r.state())
    );
}
