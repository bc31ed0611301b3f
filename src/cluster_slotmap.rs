use std::collections::HashSet;

use crate::cluster_routing::SLOT_SIZE;
use crate::cluster_topology::Slot;

/// Dense mapping `slot → [primary, replica..]` of node endpoints.
///
/// This is the single source of routing truth.  It is immutable once
/// built; a refresh constructs a new map from the freshly parsed slot
/// ranges and swaps the shared snapshot whole, so readers always
/// observe one consistent allocation.
pub(crate) struct SlotMap {
    entries: Vec<Vec<String>>,
    covered: usize,
}

impl SlotMap {
    pub(crate) fn new() -> SlotMap {
        SlotMap {
            entries: vec![Vec::new(); SLOT_SIZE as usize],
            covered: 0,
        }
    }

    pub(crate) fn from_slots(slots: &[Slot]) -> SlotMap {
        let mut map = SlotMap::new();
        for slot in slots {
            let nodes = slot.nodes();
            for id in slot.start()..=slot.end() {
                let entry = &mut map.entries[id as usize];
                if entry.is_empty() {
                    map.covered += 1;
                }
                *entry = nodes.clone();
            }
        }
        map
    }

    /// The `[primary, replica..]` endpoints owning `slot`; empty when
    /// the slot is uncovered by the current allocation.
    pub(crate) fn nodes_for_slot(&self, slot: u16) -> &[String] {
        &self.entries[slot as usize]
    }

    /// True until the first successful discovery populates the map.
    pub(crate) fn is_empty(&self) -> bool {
        self.covered == 0
    }

    /// Every endpoint referenced by any slot.  Pool entries outside
    /// this set are pruned after a refresh.
    pub(crate) fn all_addresses(&self) -> HashSet<&str> {
        let mut addresses = HashSet::new();
        for entry in &self.entries {
            for addr in entry {
                addresses.insert(addr.as_str());
            }
        }
        addresses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> SlotMap {
        SlotMap::from_slots(&[
            Slot::new(0, 8191, "n1:6379".to_string(), vec!["n2:6379".to_string()]),
            Slot::new(8192, 16383, "n3:6379".to_string(), vec![]),
        ])
    }

    #[test]
    fn test_range_fill_and_boundaries() {
        let map = sample_map();
        assert_eq!(map.nodes_for_slot(0), &["n1:6379", "n2:6379"]);
        assert_eq!(map.nodes_for_slot(8191), &["n1:6379", "n2:6379"]);
        assert_eq!(map.nodes_for_slot(8192), &["n3:6379"]);
        assert_eq!(map.nodes_for_slot(16383), &["n3:6379"]);
        assert!(!map.is_empty());
    }

    #[test]
    fn test_partial_coverage_leaves_gaps() {
        let map = SlotMap::from_slots(&[Slot::new(
            100,
            200,
            "n1:6379".to_string(),
            vec![],
        )]);
        assert!(map.nodes_for_slot(99).is_empty());
        assert_eq!(map.nodes_for_slot(100), &["n1:6379"]);
        assert!(map.nodes_for_slot(201).is_empty());
        assert!(!map.is_empty());
    }

    #[test]
    fn test_empty_map() {
        let map = SlotMap::new();
        assert!(map.is_empty());
        assert!(map.nodes_for_slot(0).is_empty());
        assert!(map.all_addresses().is_empty());
    }

    #[test]
    fn test_all_addresses() {
        let map = sample_map();
        let addresses = map.all_addresses();
        assert_eq!(addresses.len(), 3);
        assert!(addresses.contains("n2:6379"));
    }
}
