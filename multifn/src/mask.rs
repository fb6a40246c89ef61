//! Ordered sets of element indices
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// An immutable, strictly increasing set of element indices
///
/// Every batch operation in this crate runs over an `IndexMask`.  Buffers which
/// are indexed by a mask must be at least [`min_array_size`] long, i.e. one
/// past the largest index in the mask.
///
/// ```
/// use multifn::IndexMask;
///
/// let mask = IndexMask::from_indices(vec![1, 4, 5]);
/// assert_eq!(mask.len(), 3);
/// assert_eq!(mask.min_array_size(), 6);
/// assert_eq!(mask.iter().collect::<Vec<_>>(), vec![1, 4, 5]);
///
/// let range = IndexMask::range(0..3);
/// assert!(range.is_range());
/// assert_eq!(range.min_array_size(), 3);
/// ```
///
/// [`min_array_size`]: IndexMask::min_array_size
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexMask {
    /// Contiguous range of indices
    Range(Range<usize>),
    /// Sorted, deduplicated list of indices
    Indices(Vec<usize>),
}

impl Default for IndexMask {
    fn default() -> Self {
        IndexMask::Range(0..0)
    }
}

impl IndexMask {
    /// Builds a mask covering `0..n`
    pub fn new(n: usize) -> Self {
        IndexMask::Range(0..n)
    }

    /// Builds a mask covering the given range
    pub fn range(r: Range<usize>) -> Self {
        IndexMask::Range(r)
    }

    /// Builds a mask from a list of indices
    ///
    /// # Panics
    /// If the indices are not strictly increasing
    pub fn from_indices(indices: Vec<usize>) -> Self {
        assert!(
            Self::indices_are_valid(&indices),
            "mask indices must be strictly increasing"
        );
        // Collapse contiguous runs back into a range, which is cheaper to
        // iterate and to check against
        match (indices.first(), indices.last()) {
            (Some(&first), Some(&last))
                if last - first + 1 == indices.len() =>
            {
                IndexMask::Range(first..last + 1)
            }
            (None, _) => IndexMask::Range(0..0),
            _ => IndexMask::Indices(indices),
        }
    }

    /// Checks whether the given indices could form a mask
    pub fn indices_are_valid(indices: &[usize]) -> bool {
        indices.windows(2).all(|w| w[0] < w[1])
    }

    /// Returns the number of indices in the mask
    pub fn len(&self) -> usize {
        match self {
            IndexMask::Range(r) => r.len(),
            IndexMask::Indices(v) => v.len(),
        }
    }

    /// Checks whether the mask is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks whether this mask is stored as a contiguous range
    pub fn is_range(&self) -> bool {
        matches!(self, IndexMask::Range(..))
    }

    /// Minimum length of a buffer that can be indexed by every index in the
    /// mask (one past the last index, or 0 if the mask is empty)
    pub fn min_array_size(&self) -> usize {
        match self {
            IndexMask::Range(r) if r.is_empty() => 0,
            IndexMask::Range(r) => r.end,
            IndexMask::Indices(v) => v.last().map(|i| i + 1).unwrap_or(0),
        }
    }

    /// Returns the `i`'th index in the mask
    pub fn get(&self, i: usize) -> Option<usize> {
        match self {
            IndexMask::Range(r) => (i < r.len()).then(|| r.start + i),
            IndexMask::Indices(v) => v.get(i).copied(),
        }
    }

    /// Returns the first (smallest) index, if present
    pub fn first(&self) -> Option<usize> {
        self.get(0)
    }

    /// Returns the last (largest) index, if present
    pub fn last(&self) -> Option<usize> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Checks whether the mask contains the given index
    pub fn contains(&self, i: usize) -> bool {
        match self {
            IndexMask::Range(r) => r.contains(&i),
            IndexMask::Indices(v) => v.binary_search(&i).is_ok(),
        }
    }

    /// Iterates over indices in increasing order
    pub fn iter(&self) -> MaskIter<'_> {
        match self {
            IndexMask::Range(r) => MaskIter::Range(r.clone()),
            IndexMask::Indices(v) => MaskIter::Indices(v.iter()),
        }
    }

    /// Returns the indices as an owned vector
    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }

    /// Merges a set of pairwise-disjoint masks into a single mask
    ///
    /// # Panics
    /// If any index is present in more than one mask
    pub fn union_disjoint<'a, I>(masks: I) -> Self
    where
        I: IntoIterator<Item = &'a IndexMask>,
    {
        let mut out: Vec<usize> = vec![];
        for m in masks {
            out.extend(m.iter());
        }
        out.sort_unstable();
        let n = out.len();
        out.dedup();
        assert_eq!(n, out.len(), "masks are not disjoint");
        Self::from_indices(out)
    }
}

impl<'a> IntoIterator for &'a IndexMask {
    type Item = usize;
    type IntoIter = MaskIter<'a>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl From<Range<usize>> for IndexMask {
    fn from(r: Range<usize>) -> Self {
        IndexMask::Range(r)
    }
}

/// Iterator over the indices in an [`IndexMask`]
#[derive(Clone, Debug)]
pub enum MaskIter<'a> {
    #[allow(missing_docs)]
    Range(Range<usize>),
    #[allow(missing_docs)]
    Indices(std::slice::Iter<'a, usize>),
}

impl Iterator for MaskIter<'_> {
    type Item = usize;
    fn next(&mut self) -> Option<usize> {
        match self {
            MaskIter::Range(r) => r.next(),
            MaskIter::Indices(v) => v.next().copied(),
        }
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            MaskIter::Range(r) => r.size_hint(),
            MaskIter::Indices(v) => v.size_hint(),
        }
    }
}

impl ExactSizeIterator for MaskIter<'_> {}

/// Splits the indices of `mask` by a per-index predicate
///
/// Returns `(false_indices, true_indices)`; each is strictly increasing, and
/// together they contain every index of `mask` exactly once.
pub fn indices_split<F>(mask: &IndexMask, mut f: F) -> [Vec<usize>; 2]
where
    F: FnMut(usize) -> bool,
{
    let mut out = [vec![], vec![]];
    for i in mask {
        out[f(i) as usize].push(i);
    }
    out
}
