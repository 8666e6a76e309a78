//! Substance registry: names and reference colors for every liquid the lab
//! knows about.
//!
//! Built in two phases, registration then freeze, so that IDs handed out
//! during setup stay valid for the lifetime of the simulation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::color::Rgba;
use crate::id::SubstanceId;

/// A substance definition in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstanceDef {
    pub name: String,
    /// Meniscus color of the pure substance.
    pub top_color: Rgba,
    /// Body color of the pure substance.
    pub side_color: Rgba,
}

/// Builder for constructing an immutable [`SubstanceRegistry`].
#[derive(Debug, Default)]
pub struct SubstanceRegistryBuilder {
    substances: Vec<SubstanceDef>,
    name_to_id: HashMap<String, SubstanceId>,
}

impl SubstanceRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a substance. Returns its ID, or an error if the name is taken.
    pub fn register(
        &mut self,
        name: &str,
        top_color: Rgba,
        side_color: Rgba,
    ) -> Result<SubstanceId, RegistryError> {
        if self.name_to_id.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        let id = SubstanceId(self.substances.len() as u32);
        self.substances.push(SubstanceDef {
            name: name.to_string(),
            top_color,
            side_color,
        });
        self.name_to_id.insert(name.to_string(), id);
        Ok(id)
    }

    /// Lookup a substance ID by name.
    pub fn id(&self, name: &str) -> Option<SubstanceId> {
        self.name_to_id.get(name).copied()
    }

    /// Finalize and build the immutable registry.
    pub fn build(self) -> SubstanceRegistry {
        SubstanceRegistry {
            substances: self.substances,
            name_to_id: self.name_to_id,
        }
    }
}

/// Immutable registry. Frozen after `build()`.
#[derive(Debug, Clone, Default)]
pub struct SubstanceRegistry {
    substances: Vec<SubstanceDef>,
    name_to_id: HashMap<String, SubstanceId>,
}

impl SubstanceRegistry {
    pub fn get(&self, id: SubstanceId) -> Option<&SubstanceDef> {
        self.substances.get(id.0 as usize)
    }

    pub fn id(&self, name: &str) -> Option<SubstanceId> {
        self.name_to_id.get(name).copied()
    }

    /// Name of a substance, or `"?"` for an unregistered ID. Used in logs.
    pub fn name(&self, id: SubstanceId) -> &str {
        self.get(id).map(|s| s.name.as_str()).unwrap_or("?")
    }

    pub fn contains(&self, id: SubstanceId) -> bool {
        (id.0 as usize) < self.substances.len()
    }

    pub fn len(&self) -> usize {
        self.substances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.substances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SubstanceId, &SubstanceDef)> {
        self.substances
            .iter()
            .enumerate()
            .map(|(i, def)| (SubstanceId(i as u32), def))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate substance name: {0}")]
    Duplicate(String),
    #[error("unknown substance: {0:?}")]
    UnknownSubstance(SubstanceId),
}
