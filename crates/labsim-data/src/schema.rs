//! Serde data file structs for lab bench definitions.
//!
//! These structs define the on-disk format for substances, vessels, solid
//! handling, reactions and the procedure. They are deserialized from RON,
//! JSON, or TOML and then resolved into core types by the loader.

use serde::Deserialize;

use labsim_core::config::LabConfig;
use labsim_core::reaction::ReactionPhase;
use labsim_core::solid::SolidConfig;

// ===========================================================================
// Top level
// ===========================================================================

/// A complete lab bench definition, one per file.
#[derive(Debug, Clone, Deserialize)]
pub struct LabData {
    #[serde(default)]
    pub config: LabConfig,
    pub substances: Vec<SubstanceData>,
    pub containers: Vec<ContainerData>,
    #[serde(default)]
    pub solids: SolidConfig,
    #[serde(default)]
    pub heat_on: bool,
    #[serde(default)]
    pub reactions: Vec<ReactionData>,
    #[serde(default)]
    pub procedure: ProcedureData,
}

// ===========================================================================
// Substances and containers
// ===========================================================================

/// A color as `[r, g, b]` or `[r, g, b, a]`, components in 0..=1.
pub type ColorData = Vec<f64>;

#[derive(Debug, Clone, Deserialize)]
pub struct SubstanceData {
    pub name: String,
    pub top_color: ColorData,
    /// Defaults to `top_color`.
    #[serde(default)]
    pub side_color: Option<ColorData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerData {
    pub name: String,
    /// Capacity in ml.
    pub capacity: f64,
    #[serde(default)]
    pub contents: Option<ContentsData>,
    /// Pour rate override in ml/s.
    #[serde(default)]
    pub pour_rate: Option<f64>,
}

/// Initial single-substance contents of a container.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentsData {
    pub substance: String,
    pub volume: f64,
}

// ===========================================================================
// Reactions
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ReactionData {
    /// Name of the container the reaction runs in.
    pub flask: String,
    pub min_volume: f64,
    pub required_substances: Vec<String>,
    #[serde(default)]
    pub requires_heat: bool,
    #[serde(default)]
    pub required_solid_units: u32,
    pub result_top_color: ColorData,
    /// Defaults to `result_top_color`.
    #[serde(default)]
    pub result_side_color: Option<ColorData>,
    pub phases: Vec<ReactionPhase>,
}

// ===========================================================================
// Procedure
// ===========================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub enum ProcedureData {
    /// No scripted procedure.
    #[default]
    None,
    /// The ten-stage nitration procedure on the standard bench.
    Standard,
    Steps(Vec<StepData>),
}

/// A step completed by attaching `child` to `parent`.
#[derive(Debug, Clone, Deserialize)]
pub struct StepData {
    pub id: String,
    pub child: String,
    pub parent: String,
}
