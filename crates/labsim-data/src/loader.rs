//! Resolution pipeline: reads a lab file, resolves names, builds a [`Lab`].
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and
//! deserialization helpers, plus the builder that turns a [`LabData`] into a
//! ready-to-run lab.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use log::info;
use serde::de::DeserializeOwned;

use labsim_core::color::Rgba;
use labsim_core::container::LiquidContainer;
use labsim_core::id::{ContainerId, SubstanceId};
use labsim_core::lab::{Lab, LabError};
use labsim_core::reaction::ReactionRecipe;
use labsim_core::sequencer::{ProcedureStage, ProcedureStep};
use labsim_core::substance::SubstanceRegistryBuilder;

use crate::schema::{ColorData, LabData, ProcedureData};

/// Base name of the lab definition inside a data directory.
pub const LAB_FILE: &str = "lab";

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: &'static str, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// A color did not have three or four components.
    #[error("invalid color in {file}: expected 3 or 4 components, got {len}")]
    InvalidColor { file: PathBuf, len: usize },

    /// The definition parsed but describes an invalid lab.
    #[error("invalid lab in {file}: {source}")]
    Lab {
        file: PathBuf,
        #[source]
        source: LabError,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for `{base_name}.ron`, `.toml` or `.json`.
///
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// more than one format exists for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = &found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing.clone(),
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    deserialize_str(&content, format, path)
}

/// Deserialize already-read content. `path` is only used for error reports.
pub fn deserialize_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    path: &Path,
) -> Result<T, DataLoadError> {
    let parse_error = |detail: String| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string())),
    }
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name in a map, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Return a `DuplicateName` error if `name` is already in the map.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

fn parse_color(color: &ColorData, file: &Path) -> Result<Rgba, DataLoadError> {
    match color.as_slice() {
        &[r, g, b] => Ok(Rgba::rgb(r, g, b)),
        &[r, g, b, a] => Ok(Rgba::new(r, g, b, a)),
        other => Err(DataLoadError::InvalidColor {
            file: file.to_path_buf(),
            len: other.len(),
        }),
    }
}

// ===========================================================================
// Loading
// ===========================================================================

/// Load and build a lab from a single definition file.
pub fn load_lab_file(path: &Path) -> Result<Lab, DataLoadError> {
    let data: LabData = deserialize_file(path)?;
    build_lab(&data, path)
}

/// Load and build a lab from a directory containing `lab.{ron,toml,json}`.
pub fn load_lab_dir(dir: &Path) -> Result<Lab, DataLoadError> {
    let path = find_data_file(dir, LAB_FILE)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: LAB_FILE,
        dir: dir.to_path_buf(),
    })?;
    load_lab_file(&path)
}

/// Load from either a definition file or a data directory.
pub fn load_lab(path: &Path) -> Result<Lab, DataLoadError> {
    if path.is_dir() {
        load_lab_dir(path)
    } else {
        load_lab_file(path)
    }
}

/// Resolve every name in `data` and assemble the lab. `file` is only used
/// for error reports.
pub fn build_lab(data: &LabData, file: &Path) -> Result<Lab, DataLoadError> {
    let lab_error = |source: LabError| DataLoadError::Lab {
        file: file.to_path_buf(),
        source,
    };

    // -- Substances --
    let mut substance_ids: HashMap<String, SubstanceId> = HashMap::new();
    let mut registry = SubstanceRegistryBuilder::new();
    for substance in &data.substances {
        check_duplicate(&substance_ids, &substance.name, file)?;
        let top = parse_color(&substance.top_color, file)?;
        let side = match &substance.side_color {
            Some(color) => parse_color(color, file)?,
            None => top,
        };
        let id = registry
            .register(&substance.name, top, side)
            .map_err(|e| lab_error(e.into()))?;
        substance_ids.insert(substance.name.clone(), id);
    }
    let registry = registry.build();

    let mut lab = Lab::new(&data.config, registry, data.solids).map_err(lab_error)?;

    // -- Containers --
    let mut container_ids: HashMap<String, ContainerId> = HashMap::new();
    for container in &data.containers {
        check_duplicate(&container_ids, &container.name, file)?;
        let vessel = match &container.contents {
            Some(contents) => {
                let substance = *resolve_name(&substance_ids, &contents.substance, file, "substance")?;
                let (top, side) = lab
                    .substances()
                    .get(substance)
                    .map(|def| (def.top_color, def.side_color))
                    .unwrap_or((Rgba::CLEAR, Rgba::CLEAR));
                LiquidContainer::with_contents(container.capacity, substance, contents.volume, top, side)
            }
            None => LiquidContainer::new(container.capacity),
        }
        .map_err(|e| lab_error(e.into()))?;

        let id = lab.add_container(&container.name, vessel).map_err(lab_error)?;
        if let Some(rate) = container.pour_rate {
            lab.set_pour_rate(id, rate).map_err(lab_error)?;
        }
        container_ids.insert(container.name.clone(), id);
    }

    // -- Reactions --
    for reaction in &data.reactions {
        let flask = *resolve_name(&container_ids, &reaction.flask, file, "container")?;
        let mut required_substances = BTreeSet::new();
        for name in &reaction.required_substances {
            required_substances.insert(*resolve_name(&substance_ids, name, file, "substance")?);
        }
        let result_top_color = parse_color(&reaction.result_top_color, file)?;
        let result_side_color = match &reaction.result_side_color {
            Some(color) => parse_color(color, file)?,
            None => result_top_color,
        };
        let recipe = ReactionRecipe {
            min_volume: reaction.min_volume,
            required_substances,
            requires_heat: reaction.requires_heat,
            required_solid_units: reaction.required_solid_units,
            result_top_color,
            result_side_color,
            phases: reaction.phases.clone(),
        };
        lab.add_reaction(flask, recipe).map_err(lab_error)?;
    }

    // -- Procedure --
    let steps = match &data.procedure {
        ProcedureData::None => None,
        ProcedureData::Standard => Some(ProcedureStage::standard_procedure()),
        ProcedureData::Steps(steps) => Some(
            steps
                .iter()
                .map(|s| ProcedureStep::attachment(s.id.clone(), s.child.clone(), s.parent.clone()))
                .collect(),
        ),
    };
    if let Some(steps) = steps {
        lab.set_procedure(steps).map_err(lab_error)?;
    }

    lab.set_heat(data.heat_on);

    info!(
        "loaded lab from {}: {} substances, {} containers, {} reactions",
        file.display(),
        substance_ids.len(),
        container_ids.len(),
        data.reactions.len()
    );
    Ok(lab)
}

// ===========================================================================
// Tests
// ===========================================================================
