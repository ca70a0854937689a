//! Build plate queue

use std::collections::VecDeque;

use rotaslice_core::BuildPlateId;

/// FIFO of plates waiting to be sliced, each at most once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildPlateQueue {
    plates: VecDeque<BuildPlateId>,
}

impl BuildPlateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `plate`; returns false when it is already pending
    pub fn push(&mut self, plate: BuildPlateId) -> bool {
        if self.plates.contains(&plate) {
            return false;
        }
        self.plates.push_back(plate);
        true
    }

    pub fn pop(&mut self) -> Option<BuildPlateId> {
        self.plates.pop_front()
    }

    pub fn remove(&mut self, plate: BuildPlateId) -> bool {
        let before = self.plates.len();
        self.plates.retain(|p| *p != plate);
        self.plates.len() != before
    }

    pub fn contains(&self, plate: BuildPlateId) -> bool {
        self.plates.contains(&plate)
    }

    pub fn clear(&mut self) {
        self.plates.clear();
    }

    pub fn len(&self) -> usize {
        self.plates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = BuildPlateId> + '_ {
        self.plates.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fifo_without_duplicates() {
        let mut queue = BuildPlateQueue::new();
        assert!(queue.push(2));
        assert!(queue.push(0));
        assert!(!queue.push(2));
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![2, 0]);
        assert_eq!(queue.pop(), Some(2));
        assert!(queue.push(2));
        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.pop(), Some(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut queue = BuildPlateQueue::new();
        queue.push(1);
        queue.push(3);
        assert!(queue.remove(1));
        assert!(!queue.remove(1));
        assert_eq!(queue.len(), 1);
    }

    proptest! {
        #[test]
        fn pops_first_occurrences_in_order(plates in prop::collection::vec(0u32..8, 0..40)) {
            let mut queue = BuildPlateQueue::new();
            for plate in &plates {
                queue.push(*plate);
            }
            let mut expected = Vec::new();
            for plate in plates {
                if !expected.contains(&plate) {
                    expected.push(plate);
                }
            }
            let popped: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
            prop_assert_eq!(popped, expected);
        }
    }
}
