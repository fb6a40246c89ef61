use super::{Element, ElementType, VArray, VVectorArray, type_mismatch};
use crate::IndexMask;
use serde::{Deserialize, Serialize};

/// Runs `$body` with `$v` bound to the inner `Vec` of any variant
macro_rules! dispatch {
    ($ty:ident, $self:expr, $v:ident => $body:expr) => {
        match $self {
            $ty::Float($v) => $body,
            $ty::Int($v) => $body,
            $ty::Bool($v) => $body,
        }
    };
}

/// A runtime-typed buffer storing one value per index
///
/// Columns which are indexed by an [`IndexMask`] must be at least
/// [`IndexMask::min_array_size`] long; values at indices outside of the mask
/// are unspecified.  A column of length 1 is used to store a single value which
/// is shared by every index.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Float(Vec<f32>),
    Int(Vec<i32>),
    Bool(Vec<bool>),
}

impl Column {
    /// Builds a new column of the given type, filled with default values
    pub fn new(ty: ElementType, len: usize) -> Self {
        match ty {
            ElementType::Float => Column::Float(vec![0.0; len]),
            ElementType::Int => Column::Int(vec![0; len]),
            ElementType::Bool => Column::Bool(vec![false; len]),
        }
    }

    /// Returns the element type
    pub fn element_type(&self) -> ElementType {
        match self {
            Column::Float(..) => ElementType::Float,
            Column::Int(..) => ElementType::Int,
            Column::Bool(..) => ElementType::Bool,
        }
    }

    /// Returns the number of values in the column
    pub fn len(&self) -> usize {
        dispatch!(Column, self, v => v.len())
    }

    /// Checks whether the column is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Changes the length of the column, filling new slots with defaults
    pub fn resize(&mut self, len: usize) {
        dispatch!(Column, self, v => v.resize(len, Default::default()))
    }

    /// Returns a typed slice
    ///
    /// # Panics
    /// If `T` does not match the column's element type
    pub fn as_slice<T: Element>(&self) -> &[T] {
        T::slice(self)
            .unwrap_or_else(|| type_mismatch(T::TYPE, self.element_type()))
    }

    /// Returns a typed mutable slice
    ///
    /// # Panics
    /// If `T` does not match the column's element type
    pub fn as_mut_slice<T: Element>(&mut self) -> &mut [T] {
        let actual = self.element_type();
        T::slice_mut(self).unwrap_or_else(|| type_mismatch(T::TYPE, actual))
    }

    /// Copies `src[i]` into `self[i]` for every `i` in `mask`
    ///
    /// If `src` is a single value, that value is broadcast to every index.
    ///
    /// # Panics
    /// If the element types differ or the column is too short for the mask
    pub fn materialize(&mut self, mask: &IndexMask, src: VArray<'_>) {
        fn run<T: Element>(dst: &mut [T], mask: &IndexMask, src: VArray<'_>) {
            match src.typed::<T>() {
                super::VSpan::Span(s) => {
                    for i in mask {
                        dst[i] = s[i];
                    }
                }
                super::VSpan::Single(v) => {
                    for i in mask {
                        dst[i] = v;
                    }
                }
            }
        }
        debug_assert!(self.len() >= mask.min_array_size());
        dispatch!(Column, self, v => run(v, mask, src))
    }
}

////////////////////////////////////////////////////////////////////////////////

/// A runtime-typed buffer storing a variable-length list of values per index
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VectorColumn {
    Float(Vec<Vec<f32>>),
    Int(Vec<Vec<i32>>),
    Bool(Vec<Vec<bool>>),
}

impl VectorColumn {
    /// Builds a new vector column with `len` empty lists
    pub fn new(ty: ElementType, len: usize) -> Self {
        match ty {
            ElementType::Float => VectorColumn::Float(vec![vec![]; len]),
            ElementType::Int => VectorColumn::Int(vec![vec![]; len]),
            ElementType::Bool => VectorColumn::Bool(vec![vec![]; len]),
        }
    }

    /// Returns the element type
    pub fn element_type(&self) -> ElementType {
        match self {
            VectorColumn::Float(..) => ElementType::Float,
            VectorColumn::Int(..) => ElementType::Int,
            VectorColumn::Bool(..) => ElementType::Bool,
        }
    }

    /// Returns the number of lists (i.e. the number of indices)
    pub fn len(&self) -> usize {
        dispatch!(VectorColumn, self, v => v.len())
    }

    /// Checks whether the column stores no lists
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Changes the number of lists, then empties every list
    ///
    /// Inner allocations are kept, so a recycled vector column doesn't have to
    /// reallocate as values are appended.
    pub fn reset(&mut self, len: usize) {
        dispatch!(VectorColumn, self, v => {
            v.resize_with(len, Vec::new);
            v.iter_mut().for_each(Vec::clear);
        })
    }

    /// Returns the typed lists
    ///
    /// # Panics
    /// If `T` does not match the column's element type
    pub fn as_vectors<T: Element>(&self) -> &[Vec<T>] {
        T::vectors(self)
            .unwrap_or_else(|| type_mismatch(T::TYPE, self.element_type()))
    }

    /// Returns the typed lists mutably
    ///
    /// # Panics
    /// If `T` does not match the column's element type
    pub fn as_vectors_mut<T: Element>(&mut self) -> &mut [Vec<T>] {
        let actual = self.element_type();
        T::vectors_mut(self).unwrap_or_else(|| type_mismatch(T::TYPE, actual))
    }

    /// Returns the list at index `i`
    pub fn get<T: Element>(&self, i: usize) -> &[T] {
        &self.as_vectors::<T>()[i]
    }

    /// Appends a value to the list at index `i`
    pub fn push<T: Element>(&mut self, i: usize, value: T) {
        self.as_vectors_mut::<T>()[i].push(value)
    }

    /// Appends `src[i]` to `self[i]` for every `i` in `mask`
    pub fn extend(&mut self, mask: &IndexMask, src: VVectorArray<'_>) {
        fn run<T: Element>(
            dst: &mut [Vec<T>],
            mask: &IndexMask,
            src: VVectorArray<'_>,
        ) {
            let src = src.typed::<T>();
            for i in mask {
                dst[i].extend_from_slice(src.get(i));
            }
        }
        debug_assert!(self.len() >= mask.min_array_size());
        dispatch!(VectorColumn, self, v => run(v, mask, src))
    }

    /// Empties the list at every index in `mask`
    pub fn clear(&mut self, mask: &IndexMask) {
        dispatch!(VectorColumn, self, v => {
            for i in mask {
                v[i].clear();
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn materialize_span() {
        let src = Column::from(vec![1.0f32, 2.0, 3.0, 4.0]);
        let mut dst = Column::new(ElementType::Float, 4);
        let mask = IndexMask::from_indices(vec![1, 3]);
        dst.materialize(&mask, VArray::Span(&src));
        assert_eq!(dst.as_slice::<f32>(), &[0.0, 2.0, 0.0, 4.0]);
    }

    #[test]
    fn materialize_single() {
        let src = Column::from(vec![7i32]);
        let mut dst = Column::new(ElementType::Int, 3);
        dst.materialize(&IndexMask::new(3), VArray::single(&src));
        assert_eq!(dst.as_slice::<i32>(), &[7, 7, 7]);
    }

    #[test]
    #[should_panic]
    fn materialize_mismatch() {
        let src = Column::from(vec![true]);
        let mut dst = Column::new(ElementType::Int, 1);
        dst.materialize(&IndexMask::new(1), VArray::single(&src));
    }

    #[test]
    fn vector_extend_and_clear() {
        let src = VectorColumn::from(vec![vec![1i32, 2], vec![3], vec![]]);
        let mut dst = VectorColumn::new(ElementType::Int, 3);
        dst.extend(&IndexMask::new(3), VVectorArray::Span(&src));
        dst.extend(&IndexMask::new(2), VVectorArray::Span(&src));
        assert_eq!(dst.get::<i32>(0), &[1, 2, 1, 2]);
        assert_eq!(dst.get::<i32>(1), &[3, 3]);
        dst.clear(&IndexMask::from_indices(vec![0]));
        assert!(dst.get::<i32>(0).is_empty());

        dst.reset(1);
        assert_eq!(dst.len(), 1);
        assert!(dst.get::<i32>(0).is_empty());
    }

    #[test]
    fn vector_extend_single() {
        let src = VectorColumn::from(vec![vec![0.5f32]]);
        let mut dst = VectorColumn::new(ElementType::Float, 2);
        dst.extend(&IndexMask::new(2), VVectorArray::single(&src));
        assert_eq!(dst.as_vectors::<f32>(), &[vec![0.5], vec![0.5]]);
    }
}
