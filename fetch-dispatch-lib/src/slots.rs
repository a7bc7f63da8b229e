//! Write-once outcome storage.
//!
//! One cell per input index, pre-sized before any worker starts. Workers
//! write disjoint indices concurrently through a shared reference; the
//! dispatcher collects the cells only after every worker has been joined.

use crate::error::DispatchError;
use crate::types::Outcome;
use std::sync::OnceLock;

/// Fixed-size, index-addressable array of outcomes.
#[derive(Debug)]
pub struct OutcomeSlots<T> {
    cells: Vec<OnceLock<Outcome<T>>>,
}

impl<T> OutcomeSlots<T> {
    /// Create `len` unset slots.
    pub fn new(len: usize) -> Self {
        Self {
            cells: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Record the outcome for `index`.
    ///
    /// Fails with [`DispatchError::SlotAlreadySet`] if the slot was already
    /// written; the stored outcome is left untouched.
    pub fn set(&self, index: usize, outcome: Outcome<T>) -> Result<(), DispatchError> {
        let cell = self.cells.get(index).ok_or_else(|| {
            DispatchError::internal(format!(
                "outcome slot {} out of range for {} items",
                index,
                self.cells.len()
            ))
        })?;

        cell.set(outcome)
            .map_err(|_| DispatchError::SlotAlreadySet { index })
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.cells.get(index).is_some_and(|c| c.get().is_some())
    }

    /// Write `outcome_for(index)` into every slot that is still unset.
    ///
    /// Returns the number of slots filled.
    pub fn fill_unset<F>(&self, mut outcome_for: F) -> usize
    where
        F: FnMut(usize) -> Outcome<T>,
    {
        let mut filled = 0;
        for (index, cell) in self.cells.iter().enumerate() {
            if cell.get().is_none() && cell.set(outcome_for(index)).is_ok() {
                filled += 1;
            }
        }
        filled
    }

    /// Consume the slots into an ordered outcome sequence.
    ///
    /// Fails with [`DispatchError::SlotUnset`] naming the first empty slot.
    pub fn into_outcomes(self) -> Result<Vec<Outcome<T>>, DispatchError> {
        self.cells
            .into_iter()
            .enumerate()
            .map(|(index, cell)| {
                cell.into_inner()
                    .ok_or(DispatchError::SlotUnset { index })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ok(v: u32) -> Outcome<u32> {
        Outcome::Success { value: v }
    }

    #[test]
    fn test_new_slots_are_unset() {
        let slots = OutcomeSlots::<u32>::new(3);
        assert_eq!(slots.len(), 3);
        assert!((0..3).all(|i| !slots.is_set(i)));
    }

    #[test]
    fn test_second_write_is_rejected() {
        let slots = OutcomeSlots::new(2);
        slots.set(1, ok(10)).unwrap();

        let err = slots.set(1, ok(99)).unwrap_err();
        assert_eq!(err, DispatchError::SlotAlreadySet { index: 1 });

        slots.set(0, ok(5)).unwrap();
        assert_eq!(slots.into_outcomes().unwrap(), vec![ok(5), ok(10)]);
    }

    #[test]
    fn test_out_of_range_write_is_an_error() {
        let slots = OutcomeSlots::new(1);
        assert!(matches!(
            slots.set(4, ok(1)),
            Err(DispatchError::Internal { .. })
        ));
    }

    #[test]
    fn test_unset_slot_reported_on_collect() {
        let slots = OutcomeSlots::new(3);
        slots.set(0, ok(1)).unwrap();
        slots.set(2, ok(3)).unwrap();

        let err = slots.into_outcomes().unwrap_err();
        assert_eq!(err, DispatchError::SlotUnset { index: 1 });
        assert!(err.is_invariant_breach());
    }

    #[test]
    fn test_fill_unset_only_touches_empty_slots() {
        let slots = OutcomeSlots::new(4);
        slots.set(1, ok(7)).unwrap();

        let filled = slots.fill_unset(|i| Outcome::Failure {
            reason: format!("missing {}", i),
        });
        assert_eq!(filled, 3);

        let outcomes = slots.into_outcomes().unwrap();
        assert_eq!(outcomes[1], ok(7));
        assert_eq!(outcomes[3].reason(), Some("missing 3"));
    }

    #[test]
    fn test_concurrent_disjoint_writes() {
        let slots = Arc::new(OutcomeSlots::new(64));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let slots = Arc::clone(&slots);
                std::thread::spawn(move || {
                    for i in (t..64).step_by(4) {
                        slots.set(i, ok(i as u32)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let slots = Arc::try_unwrap(slots).unwrap();
        let outcomes = slots.into_outcomes().unwrap();
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.value(), Some(&(i as u32)));
        }
    }
}
