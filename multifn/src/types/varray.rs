use super::{Column, Element, ElementType, VectorColumn};

/// Read-only, runtime-typed view of one value per index
///
/// A `VArray` either refers to a full [`Column`] (indexed by absolute index),
/// or to one value within a column which is shared by every index.
#[derive(Copy, Clone, Debug)]
pub enum VArray<'a> {
    /// `column[i]` is the value at index `i`
    Span(&'a Column),
    /// `column[j]` is the value at every index
    Single(&'a Column, usize),
}

impl<'a> VArray<'a> {
    /// Builds a single-value view of the first value in `c`
    pub fn single(c: &'a Column) -> Self {
        debug_assert!(!c.is_empty());
        VArray::Single(c, 0)
    }

    /// Returns the element type
    pub fn element_type(&self) -> ElementType {
        match self {
            VArray::Span(c) | VArray::Single(c, _) => c.element_type(),
        }
    }

    /// Checks whether every index has the same value
    pub fn is_single(&self) -> bool {
        matches!(self, VArray::Single(..))
    }

    /// Collapses the view to a single value, taking the value at index `i`
    pub fn collapse(&self, i: usize) -> Self {
        match *self {
            VArray::Span(c) => VArray::Single(c, i),
            VArray::Single(..) => *self,
        }
    }

    /// Returns a typed view
    ///
    /// # Panics
    /// If `T` does not match the element type
    pub fn typed<T: Element>(&self) -> VSpan<'a, T> {
        match *self {
            VArray::Span(c) => VSpan::Span(c.as_slice()),
            VArray::Single(c, j) => VSpan::Single(c.as_slice()[j]),
        }
    }
}

/// Typed equivalent of [`VArray`]
#[derive(Copy, Clone, Debug)]
pub enum VSpan<'a, T> {
    /// `slice[i]` is the value at index `i`
    Span(&'a [T]),
    /// The value at every index
    Single(T),
}

impl<T: Copy> VSpan<'_, T> {
    /// Returns the value at index `i`
    #[inline]
    pub fn get(&self, i: usize) -> T {
        match self {
            VSpan::Span(s) => s[i],
            VSpan::Single(v) => *v,
        }
    }

    /// Checks whether every index has the same value
    pub fn is_single(&self) -> bool {
        matches!(self, VSpan::Single(..))
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Read-only, runtime-typed view of one list per index
#[derive(Copy, Clone, Debug)]
pub enum VVectorArray<'a> {
    /// `column[i]` is the list at index `i`
    Span(&'a VectorColumn),
    /// `column[j]` is the list at every index
    Single(&'a VectorColumn, usize),
}

impl<'a> VVectorArray<'a> {
    /// Builds a single-list view of the first list in `c`
    pub fn single(c: &'a VectorColumn) -> Self {
        debug_assert!(!c.is_empty());
        VVectorArray::Single(c, 0)
    }

    /// Returns the element type
    pub fn element_type(&self) -> ElementType {
        match self {
            VVectorArray::Span(c) | VVectorArray::Single(c, _) => {
                c.element_type()
            }
        }
    }

    /// Checks whether every index has the same list
    pub fn is_single_vector(&self) -> bool {
        matches!(self, VVectorArray::Single(..))
    }

    /// Collapses the view to a single list, taking the list at index `i`
    pub fn collapse(&self, i: usize) -> Self {
        match *self {
            VVectorArray::Span(c) => VVectorArray::Single(c, i),
            VVectorArray::Single(..) => *self,
        }
    }

    /// Returns a typed view
    ///
    /// # Panics
    /// If `T` does not match the element type
    pub fn typed<T: Element>(&self) -> VVector<'a, T> {
        match *self {
            VVectorArray::Span(c) => VVector::Span(c.as_vectors()),
            VVectorArray::Single(c, j) => VVector::Single(&c.as_vectors()[j]),
        }
    }
}

/// Typed equivalent of [`VVectorArray`]
#[derive(Copy, Clone, Debug)]
pub enum VVector<'a, T> {
    /// `lists[i]` is the list at index `i`
    Span(&'a [Vec<T>]),
    /// The list at every index
    Single(&'a [T]),
}

impl<'a, T> VVector<'a, T> {
    /// Returns the list at index `i`
    #[inline]
    pub fn get(&self, i: usize) -> &'a [T] {
        match *self {
            VVector::Span(s) => &s[i],
            VVector::Single(v) => v,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn collapse() {
        let c = Column::from(vec![1i32, 2, 3]);
        let v = VArray::Span(&c);
        assert!(!v.is_single());
        let s = v.collapse(2);
        assert!(s.is_single());
        assert_eq!(s.typed::<i32>().get(0), 3);
        assert_eq!(s.collapse(0).typed::<i32>().get(7), 3);
    }

    #[test]
    fn vector_views() {
        let c = VectorColumn::from(vec![vec![true], vec![false, true]]);
        let v = VVectorArray::Span(&c).typed::<bool>();
        assert_eq!(v.get(1), &[false, true]);
        let s = VVectorArray::Span(&c).collapse(0);
        assert!(s.is_single_vector());
        assert_eq!(s.typed::<bool>().get(1), &[true]);
    }
}
