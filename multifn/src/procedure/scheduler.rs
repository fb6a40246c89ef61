//! Work queue of `(instruction, indices)` pairs
use super::InstructionId;
use crate::IndexMask;
use std::{borrow::Cow, collections::BTreeMap};

/// Indices to evaluate at an instruction
///
/// The initial mask is borrowed from the caller; masks produced by a branch
/// are owned.
pub type InstructionIndices<'m> = Cow<'m, IndexMask>;

/// Queue of pending instructions, each with the indices that reached it
///
/// Instructions are popped in ascending id order.  If several index sets
/// are waiting at the same instruction (because independent paths joined
/// there), they are merged into a single evaluation.
#[derive(Default)]
pub struct InstructionScheduler<'m> {
    pending: BTreeMap<InstructionId, Vec<InstructionIndices<'m>>>,
}

impl<'m> InstructionScheduler<'m> {
    /// Builds an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a borrowed mask; empty masks are ignored
    pub fn add_referenced_indices(
        &mut self,
        instr: InstructionId,
        mask: &'m IndexMask,
    ) {
        self.add(instr, Cow::Borrowed(mask))
    }

    /// Schedules an owned set of indices; empty sets are ignored
    pub fn add_owned_indices(
        &mut self,
        instr: InstructionId,
        indices: Vec<usize>,
    ) {
        self.add(instr, Cow::Owned(IndexMask::from_indices(indices)))
    }

    /// Schedules a set of indices; empty sets are ignored
    pub fn add(
        &mut self,
        instr: InstructionId,
        indices: InstructionIndices<'m>,
    ) {
        if !indices.is_empty() {
            self.pending.entry(instr).or_default().push(indices);
        }
    }

    /// Checks whether any work remains
    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    /// Removes the lowest-id pending instruction and its indices
    pub fn pop_next(
        &mut self,
    ) -> Option<(InstructionId, InstructionIndices<'m>)> {
        let (id, mut masks) = self.pending.pop_first()?;
        let indices = if masks.len() == 1 {
            masks.pop()?
        } else {
            Cow::Owned(IndexMask::union_disjoint(masks.iter().map(|m| &**m)))
        };
        Some((id, indices))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::index::Index;

    #[test]
    fn pop_order_and_merge() {
        let full = IndexMask::new(6);
        let mut s = InstructionScheduler::new();
        assert!(s.is_done());
        assert!(s.pop_next().is_none());

        let a = InstructionId::new(3);
        let b = InstructionId::new(1);
        s.add_referenced_indices(a, &full);
        s.add_owned_indices(b, vec![4, 5]);
        s.add_owned_indices(b, vec![0, 2]);
        s.add_owned_indices(a, vec![]);
        assert!(!s.is_done());

        let (id, mask) = s.pop_next().unwrap();
        assert_eq!(id, b);
        assert!(matches!(mask, Cow::Owned(..)));
        assert_eq!(mask.to_vec(), vec![0, 2, 4, 5]);

        let (id, mask) = s.pop_next().unwrap();
        assert_eq!(id, a);
        assert!(matches!(mask, Cow::Borrowed(..)));
        assert!(mask.is_range());
        assert!(s.is_done());
    }
}
