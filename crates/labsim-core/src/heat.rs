//! The heating plate.

/// On/off heat source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeatSource {
    is_on: bool,
}

impl HeatSource {
    pub fn new(is_on: bool) -> Self {
        Self { is_on }
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    /// Set the state. Returns `true` if it changed.
    pub fn set(&mut self, is_on: bool) -> bool {
        let changed = self.is_on != is_on;
        self.is_on = is_on;
        changed
    }

    /// Flip the state and return the new one.
    pub fn toggle(&mut self) -> bool {
        self.is_on = !self.is_on;
        self.is_on
    }
}
