use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a vessel (beaker, flask, cylinder) owned by a lab.
    pub struct ContainerId;
}

/// Identifies a substance in the registry. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubstanceId(pub u32);

/// Handle returned by [`crate::event::EventBus::subscribe`]. Pass it back to
/// `unsubscribe` when the subscribing component is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substance_id_equality() {
        let a = SubstanceId(0);
        let b = SubstanceId(0);
        let c = SubstanceId(1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn substance_ids_order_by_registration() {
        assert!(SubstanceId(0) < SubstanceId(1));
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(SubstanceId(0), "ethanol");
        map.insert(SubstanceId(1), "nitrating_mix");
        assert_eq!(map[&SubstanceId(0)], "ethanol");
    }
}
