//! Ordered procedure state machine driven by attachment events.

use std::collections::HashSet;
use std::fmt;

use log::{debug, info};

use crate::event::LabEvent;
use crate::sim::Ticks;

// ---------------------------------------------------------------------------
// Procedure stages
// ---------------------------------------------------------------------------

/// The ten stages of the nitration practical, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcedureStage {
    PlaceFlask,
    WeighSolid,
    TransferSolid,
    MeasureSolvent,
    AddSolvent,
    Heat,
    AddSulfuricAcid,
    AddNitricAcid,
    PourMixture,
    ObserveColor,
}

impl ProcedureStage {
    pub const ALL: [ProcedureStage; 10] = [
        ProcedureStage::PlaceFlask,
        ProcedureStage::WeighSolid,
        ProcedureStage::TransferSolid,
        ProcedureStage::MeasureSolvent,
        ProcedureStage::AddSolvent,
        ProcedureStage::Heat,
        ProcedureStage::AddSulfuricAcid,
        ProcedureStage::AddNitricAcid,
        ProcedureStage::PourMixture,
        ProcedureStage::ObserveColor,
    ];

    /// Short code shown on the task board.
    pub fn code(self) -> &'static str {
        match self {
            ProcedureStage::PlaceFlask => "F1",
            ProcedureStage::WeighSolid => "F2",
            ProcedureStage::TransferSolid => "F3",
            ProcedureStage::MeasureSolvent => "F4",
            ProcedureStage::AddSolvent => "F5",
            ProcedureStage::Heat => "F6",
            ProcedureStage::AddSulfuricAcid => "F7",
            ProcedureStage::AddNitricAcid => "F8",
            ProcedureStage::PourMixture => "F9",
            ProcedureStage::ObserveColor => "F10",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ProcedureStage::PlaceFlask => "Place the flask on its support",
            ProcedureStage::WeighSolid => "Weigh the solid on the paper",
            ProcedureStage::TransferSolid => "Transfer the solid into the flask",
            ProcedureStage::MeasureSolvent => "Measure the solvent",
            ProcedureStage::AddSolvent => "Add the solvent to the flask",
            ProcedureStage::Heat => "Heat the flask to 60 degrees",
            ProcedureStage::AddSulfuricAcid => "Add sulfuric acid",
            ProcedureStage::AddNitricAcid => "Add nitric acid",
            ProcedureStage::PourMixture => "Pour the nitrating mixture",
            ProcedureStage::ObserveColor => "Observe the color change",
        }
    }

    /// Position in [`Self::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// The `(child, parent)` attachment that completes this stage on the
    /// standard bench.
    pub fn attachment(self) -> (&'static str, &'static str) {
        match self {
            ProcedureStage::PlaceFlask => ("flask", "support"),
            ProcedureStage::WeighSolid => ("paper", "scale"),
            ProcedureStage::TransferSolid => ("paper", "flask_mouth"),
            ProcedureStage::MeasureSolvent => ("cylinder", "bench"),
            ProcedureStage::AddSolvent => ("cylinder", "flask_mouth"),
            ProcedureStage::Heat => ("flask", "heat_plate"),
            ProcedureStage::AddSulfuricAcid => ("sulfuric_bottle", "mix_beaker"),
            ProcedureStage::AddNitricAcid => ("nitric_bottle", "mix_beaker"),
            ProcedureStage::PourMixture => ("mix_beaker", "flask_mouth"),
            ProcedureStage::ObserveColor => ("flask", "viewer"),
        }
    }

    /// All ten stages as attachment steps, keyed by stage code.
    pub fn standard_procedure() -> Vec<ProcedureStep> {
        Self::ALL
            .iter()
            .map(|stage| {
                let (child, parent) = stage.attachment();
                ProcedureStep::attachment(stage.code(), child, parent)
            })
            .collect()
    }
}

impl fmt::Display for ProcedureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.title())
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Decides whether an attachment `(child, parent)` completes a step.
pub enum StepPredicate {
    /// Exact match on both names.
    Attachment { child: String, parent: String },
    Custom(Box<dyn Fn(&str, &str) -> bool>),
}

impl StepPredicate {
    pub fn matches(&self, child: &str, parent: &str) -> bool {
        match self {
            StepPredicate::Attachment {
                child: expected_child,
                parent: expected_parent,
            } => expected_child == child && expected_parent == parent,
            StepPredicate::Custom(predicate) => predicate(child, parent),
        }
    }
}

impl fmt::Debug for StepPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepPredicate::Attachment { child, parent } => f
                .debug_struct("Attachment")
                .field("child", child)
                .field("parent", parent)
                .finish(),
            StepPredicate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug)]
pub struct ProcedureStep {
    pub id: String,
    pub predicate: StepPredicate,
}

impl ProcedureStep {
    /// A step completed by attaching `child` to `parent`.
    pub fn attachment(id: impl Into<String>, child: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            predicate: StepPredicate::Attachment {
                child: child.into(),
                parent: parent.into(),
            },
        }
    }

    pub fn custom(id: impl Into<String>, predicate: impl Fn(&str, &str) -> bool + 'static) -> Self {
        Self {
            id: id.into(),
            predicate: StepPredicate::Custom(Box::new(predicate)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcedureError {
    #[error("procedure has no steps")]
    Empty,
    #[error("duplicate step id: {0}")]
    DuplicateStep(String),
}

// ---------------------------------------------------------------------------
// StepSequencer
// ---------------------------------------------------------------------------

/// Linear cursor over an ordered list of steps. Only the step at the cursor
/// is ever tested; anything else is dropped.
#[derive(Debug)]
pub struct StepSequencer {
    steps: Vec<ProcedureStep>,
    current: usize,
}

impl StepSequencer {
    pub fn new(steps: Vec<ProcedureStep>) -> Result<Self, ProcedureError> {
        if steps.is_empty() {
            return Err(ProcedureError::Empty);
        }
        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.id.as_str()) {
                return Err(ProcedureError::DuplicateStep(step.id.clone()));
            }
        }
        Ok(Self { steps, current: 0 })
    }

    /// Index of the next step to complete. Equals `len()` once completed.
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_step(&self) -> Option<&ProcedureStep> {
        self.steps.get(self.current)
    }

    pub fn is_completed(&self) -> bool {
        self.current >= self.steps.len()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[ProcedureStep] {
        &self.steps
    }

    /// Feed one attachment event. Advances by at most one step.
    pub fn on_attached(&mut self, child: &str, parent: &str, tick: Ticks) -> Vec<LabEvent> {
        let Some(step) = self.steps.get(self.current) else {
            return Vec::new();
        };

        if !step.predicate.matches(child, parent) {
            debug!(
                "procedure: dropped attachment {child} -> {parent}, waiting on step {}",
                step.id
            );
            return Vec::new();
        }

        let mut events = vec![LabEvent::StepAdvanced {
            step_index: self.current,
            step_id: step.id.clone(),
            tick,
        }];
        info!("procedure: step {} ({}) completed", self.current, step.id);
        self.current += 1;

        if self.is_completed() {
            info!("procedure: all {} steps completed", self.steps.len());
            events.push(LabEvent::ProcedureCompleted { tick });
        }
        events
    }
}
