//! Integration test: a bench loaded from a data file behaves like the one
//! built in code.
//!
//! Writes the nitration bench as TOML, loads it through labsim-data, and
//! runs it with a fixed timestep through `advance()`.

use std::fs;
use std::path::PathBuf;

use labsim_core::event::EventKind;
use labsim_core::lab::LabSignal;
use labsim_core::reaction::ReactionState;
use labsim_core::sequencer::ProcedureStage;
use labsim_core::sim::SimulationStrategy;
use labsim_core::solid::SolidHolder;
use labsim_core::test_utils::{EventRecorder, approx};
use labsim_data::load_lab;

const BENCH_TOML: &str = r#"
procedure = "Standard"

[config]
pour_rate = 20.0
strategy = { Fixed = { timestep = 0.05 } }

[[substances]]
name = "ethanol"
top_color = [0.95, 0.95, 1.0, 0.6]

[[substances]]
name = "nitrating_mix"
top_color = [0.85, 0.75, 0.3]

[[containers]]
name = "flask"
capacity = 250.0

[[containers]]
name = "cylinder"
capacity = 100.0
contents = { substance = "ethanol", volume = 30.0 }

[[containers]]
name = "mix_beaker"
capacity = 100.0
contents = { substance = "nitrating_mix", volume = 20.0 }

[[reactions]]
flask = "flask"
min_volume = 40.0
required_substances = ["ethanol", "nitrating_mix"]
requires_heat = true
required_solid_units = 5
result_top_color = [0.55, 0.18, 0.08]
result_side_color = [0.40, 0.12, 0.05]
phases = [
    { kind = "Agitation", duration = 2.0 },
    { kind = { ColorTransition = { easing = "EaseInOut" } }, duration = 4.0, effects = ["Sound", "Particles"] },
]
"#;

fn write_bench(suffix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "labsim_integration_{suffix}_{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("lab.toml"), BENCH_TOML).unwrap();
    dir
}

#[test]
fn loaded_bench_runs_the_reaction() {
    let dir = write_bench("reaction");
    let mut lab = load_lab(&dir).unwrap();
    let _ = fs::remove_dir_all(&dir);

    assert_eq!(lab.strategy(), SimulationStrategy::Fixed { timestep: 0.05 });
    let recorder = EventRecorder::attach_kinds(&mut lab, &[EventKind::ReactionCompleted]);
    let flask = lab.container_id("flask").unwrap();

    for _ in 0..5 {
        lab.collect_solid();
        lab.move_solid(SolidHolder::Collector, SolidHolder::Carrier);
        lab.move_solid(SolidHolder::Carrier, SolidHolder::Destination);
    }
    lab.set_heat(true);

    // 20 ml/s: both vessels empty within two seconds.
    lab.submit(LabSignal::pour("cylinder", Some("flask"), true));
    lab.submit(LabSignal::pour("mix_beaker", Some("flask"), true));
    let result = lab.advance(2.0);
    assert_eq!(result.steps_run, 40);
    assert!(approx(lab.container(flask).unwrap().volume(), 50.0));
    assert_eq!(lab.reaction(flask).unwrap().state(), ReactionState::Reacting);

    lab.advance(7.0);
    assert_eq!(lab.reaction(flask).unwrap().state(), ReactionState::Completed);
    assert_eq!(recorder.count(EventKind::ReactionCompleted), 1);
}

#[test]
fn loaded_bench_runs_the_procedure() {
    let dir = write_bench("procedure");
    let mut lab = load_lab(&dir.join("lab.toml")).unwrap();
    let _ = fs::remove_dir_all(&dir);

    for stage in ProcedureStage::ALL {
        let (child, parent) = stage.attachment();
        lab.submit(LabSignal::attached(child, parent));
    }
    // One step routes all ten in order.
    lab.advance(0.05);
    assert!(lab.procedure().unwrap().is_completed());
}
