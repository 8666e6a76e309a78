//! Integration test: the nitration practical end to end.
//!
//! Drives the standard bench through all ten procedure stages with pours,
//! solid transfer and heating, and checks that the reaction is gated on
//! every precondition, runs its phases once, and leaves the flask at the
//! result colors.

use labsim_core::color::Rgba;
use labsim_core::event::{EventKind, LabEvent};
use labsim_core::lab::LabSignal;
use labsim_core::reaction::{ReactionEffect, ReactionState, UnmetPrecondition};
use labsim_core::sequencer::ProcedureStage;
use labsim_core::solid::{SolidHolder, SolidTransferOutcome};
use labsim_core::test_utils::*;

// ===========================================================================
// Full procedure
// ===========================================================================

/// Walk every stage in order. The reaction starts in the tick the flask
/// reaches 40 ml and completes six seconds later.
#[test]
fn full_procedure_turns_the_flask_red_brown() {
    let mut bench = nitration_lab();
    let recorder = EventRecorder::attach(&mut bench.lab);

    bench.attach(ProcedureStage::PlaceFlask);
    bench.lab.step(0.1);

    // Five units onto the paper: 500 mg.
    for _ in 0..5 {
        assert_eq!(bench.lab.collect_solid(), SolidTransferOutcome::Moved);
        bench.lab.move_solid(SolidHolder::Collector, SolidHolder::Carrier);
    }
    assert!(bench.lab.solids().weighing().is_complete());
    assert_eq!(bench.lab.solids().weighing().mass_mg(), 500);
    bench.attach(ProcedureStage::WeighSolid);
    bench.lab.step(0.1);

    for _ in 0..5 {
        bench.lab.move_solid(SolidHolder::Carrier, SolidHolder::Destination);
    }
    assert_eq!(bench.lab.solids().delivered(), 5);
    bench.attach(ProcedureStage::TransferSolid);
    bench.lab.step(0.1);

    bench.attach(ProcedureStage::MeasureSolvent);
    bench.lab.step(0.1);
    bench.attach(ProcedureStage::AddSolvent);
    bench.pour_into_flask("cylinder", 3.0);
    assert!(approx(bench.lab.container(bench.flask).unwrap().volume(), 30.0));

    bench.lab.set_heat(true);
    bench.attach(ProcedureStage::Heat);
    bench.lab.step(0.1);
    bench.attach(ProcedureStage::AddSulfuricAcid);
    bench.lab.step(0.1);
    bench.attach(ProcedureStage::AddNitricAcid);
    bench.lab.step(0.1);

    // Everything but volume and the nitrating mixture is in place.
    assert_eq!(
        bench.lab.unmet_preconditions(bench.flask).unwrap(),
        vec![
            UnmetPrecondition::InsufficientVolume {
                required: 40.0,
                actual: 30.0
            },
            UnmetPrecondition::MissingSubstance(bench.nitrating_mix),
        ]
    );
    assert_eq!(
        bench.lab.reaction(bench.flask).unwrap().state(),
        ReactionState::Idle
    );

    bench.attach(ProcedureStage::PourMixture);
    bench.pour_into_flask("mix_beaker", 2.0);

    let flask = bench.lab.container(bench.flask).unwrap();
    assert!(approx(flask.volume(), 50.0));
    assert!(approx(flask.amount_of(bench.ethanol), 30.0));
    assert!(approx(flask.amount_of(bench.nitrating_mix), 20.0));
    assert_eq!(
        bench.lab.reaction(bench.flask).unwrap().state(),
        ReactionState::Reacting
    );

    bench.run(7.0, 0.1);
    bench.attach(ProcedureStage::ObserveColor);
    bench.lab.step(0.1);

    let flask = bench.lab.container(bench.flask).unwrap();
    assert_eq!(
        bench.lab.reaction(bench.flask).unwrap().state(),
        ReactionState::Completed
    );
    assert_eq!(flask.top_color(), Rgba::rgb(0.55, 0.18, 0.08));
    assert_eq!(flask.side_color(), Rgba::rgb(0.40, 0.12, 0.05));
    assert!(!flask.is_transitioning());

    assert_eq!(recorder.count(EventKind::StepAdvanced), 10);
    assert_eq!(recorder.count(EventKind::ProcedureCompleted), 1);
    assert_eq!(recorder.count(EventKind::ReactionPhaseStarted), 2);
    assert_eq!(recorder.count(EventKind::ReactionCompleted), 1);
    assert_eq!(recorder.count(EventKind::SolidUnitMoved), 10);
    assert_eq!(recorder.count(EventKind::PourStarted), 2);
    assert_eq!(recorder.count(EventKind::PourStopped), 2);

    let effects: Vec<ReactionEffect> = recorder
        .events()
        .iter()
        .filter_map(|e| match e {
            LabEvent::ReactionEffect { effect, .. } => Some(*effect),
            _ => None,
        })
        .collect();
    assert_eq!(effects, vec![ReactionEffect::Sound, ReactionEffect::Particles]);

    let snapshot = bench.lab.snapshot();
    assert_eq!(snapshot.container("flask").unwrap().label(), "50/250");
    assert!(snapshot.procedure.unwrap().completed);
}

// ===========================================================================
// Gating
// ===========================================================================

/// Heat is the last missing precondition: nothing happens until the plate
/// is switched on, then the reaction starts on the next step.
#[test]
fn reaction_waits_for_heat() {
    let mut bench = nitration_lab();
    bench.deliver_solids(5);
    bench.pour_into_flask("cylinder", 3.0);
    bench.pour_into_flask("mix_beaker", 2.0);
    bench.run(5.0, 0.1);

    assert_eq!(
        bench.lab.unmet_preconditions(bench.flask).unwrap(),
        vec![UnmetPrecondition::HeatOff]
    );
    assert_eq!(
        bench.lab.reaction(bench.flask).unwrap().state(),
        ReactionState::Idle
    );

    bench.lab.submit(LabSignal::Heat { is_on: true });
    bench.lab.step(0.1);
    assert_eq!(
        bench.lab.reaction(bench.flask).unwrap().state(),
        ReactionState::Reacting
    );

    // Switching the heat back off does not stop a running reaction.
    bench.lab.set_heat(false);
    bench.run(6.5, 0.1);
    assert_eq!(
        bench.lab.reaction(bench.flask).unwrap().state(),
        ReactionState::Completed
    );
}

/// Four solid units are not enough.
#[test]
fn reaction_waits_for_all_solids() {
    let mut bench = nitration_lab();
    bench.lab.set_heat(true);
    bench.deliver_solids(4);
    bench.pour_into_flask("cylinder", 3.0);
    bench.pour_into_flask("mix_beaker", 2.0);
    bench.run(1.0, 0.1);
    assert_eq!(
        bench.lab.unmet_preconditions(bench.flask).unwrap(),
        vec![UnmetPrecondition::InsufficientSolids {
            required: 5,
            delivered: 4
        }]
    );

    bench.deliver_solids(1);
    bench.lab.step(0.1);
    assert_eq!(
        bench.lab.reaction(bench.flask).unwrap().state(),
        ReactionState::Reacting
    );
}

// ===========================================================================
// Transfer and procedure edge cases
// ===========================================================================

/// A tilted vessel with no receiver never loses liquid.
#[test]
fn pouring_without_receiver_keeps_source() {
    let mut bench = nitration_lab();
    bench.lab.submit(LabSignal::pour("cylinder", None, true));
    bench.run(2.0, 0.1);
    assert_eq!(bench.lab.container(bench.cylinder).unwrap().volume(), 30.0);

    // Receiver found: pouring starts.
    bench.lab.submit(LabSignal::pour("cylinder", Some("flask"), true));
    bench.lab.step(0.1);
    assert!(approx(bench.lab.container(bench.cylinder).unwrap().volume(), 29.0));
    assert!(approx(bench.lab.container(bench.flask).unwrap().volume(), 1.0));
}

/// Out-of-order attachments are dropped, not replayed.
#[test]
fn procedure_ignores_out_of_order_attachments() {
    let mut bench = nitration_lab();
    bench.attach(ProcedureStage::Heat);
    bench.attach(ProcedureStage::WeighSolid);
    bench.lab.step(0.1);
    assert_eq!(bench.lab.procedure().unwrap().current_index(), 0);

    bench.attach(ProcedureStage::PlaceFlask);
    bench.lab.step(0.1);
    assert_eq!(bench.lab.procedure().unwrap().current_index(), 1);

    // The earlier WeighSolid attachment was not buffered.
    bench.lab.step(0.1);
    assert_eq!(bench.lab.procedure().unwrap().current_index(), 1);
}

/// Filling past capacity loses the excess, and a spatula refuses a second
/// unit while it already holds one.
#[test]
fn clamps_are_routine() {
    let mut bench = nitration_lab();
    let added = bench.lab.fill(bench.cylinder, bench.ethanol, 500.0).unwrap();
    assert!(approx(added, 70.0));
    assert!(bench.lab.container(bench.cylinder).unwrap().is_full());

    assert_eq!(bench.lab.collect_solid(), SolidTransferOutcome::Moved);
    assert_eq!(
        bench.lab.collect_solid(),
        SolidTransferOutcome::DestinationFull
    );
    assert!(bench.lab.discard_solid(SolidHolder::Collector));
    assert_eq!(
        bench.lab.move_solid(SolidHolder::Collector, SolidHolder::Carrier),
        SolidTransferOutcome::SourceEmpty
    );
}
