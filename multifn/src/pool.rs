//! Reuse of intermediate buffers within a single evaluation
use crate::types::{Column, ElementType, VectorColumn};
use log::trace;
use std::collections::HashMap;

/// Arena of spare buffers, keyed by element type and length
///
/// Evaluators release intermediate buffers here once their last consumer has
/// finished, then obtain them again for later outputs of the same shape.  Since
/// every evaluation runs over a single mask, most intermediate buffers share
/// the same length and are recycled many times in a long chain of nodes.
///
/// Buffers coming out of the pool have the requested type and length, but
/// their contents are unspecified; callers must write every index they later
/// read.  Vector columns are always handed out with every list empty.
///
/// ```
/// use multifn::{BufferPool, types::ElementType};
///
/// let mut pool = BufferPool::new();
/// let c = pool.obtain_column(ElementType::Float, 16);
/// assert_eq!(c.len(), 16);
/// pool.release_column(c);
/// assert_eq!(pool.spare_columns(), 1);
///
/// let c = pool.obtain_column(ElementType::Float, 16);
/// assert_eq!(pool.spare_columns(), 0);
/// # drop(c);
/// ```
#[derive(Default)]
pub struct BufferPool {
    /// Spare columns; the most recently released is at the back of each `Vec`
    columns: HashMap<(ElementType, usize), Vec<Column>>,

    /// Spare vector columns, in the same order as `columns`
    vectors: HashMap<(ElementType, usize), Vec<VectorColumn>>,

    /// Number of buffers allocated (rather than reused)
    allocated: usize,
}

impl BufferPool {
    /// Builds a new empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a column of the given type and length
    pub fn obtain_column(&mut self, ty: ElementType, len: usize) -> Column {
        if let Some(c) = self.columns.get_mut(&(ty, len)).and_then(Vec::pop) {
            trace!("reusing {ty} column of length {len}");
            c
        } else {
            self.allocated += 1;
            Column::new(ty, len)
        }
    }

    /// Returns a column to the pool
    pub fn release_column(&mut self, c: Column) {
        self.columns
            .entry((c.element_type(), c.len()))
            .or_default()
            .push(c);
    }

    /// Returns a vector column of the given type and length, with every list
    /// empty
    pub fn obtain_vector(
        &mut self,
        ty: ElementType,
        len: usize,
    ) -> VectorColumn {
        if let Some(mut c) =
            self.vectors.get_mut(&(ty, len)).and_then(Vec::pop)
        {
            trace!("reusing {ty} vector column of length {len}");
            c.reset(len);
            c
        } else {
            self.allocated += 1;
            VectorColumn::new(ty, len)
        }
    }

    /// Returns a vector column to the pool
    pub fn release_vector(&mut self, c: VectorColumn) {
        self.vectors
            .entry((c.element_type(), c.len()))
            .or_default()
            .push(c);
    }

    /// Returns the number of spare columns held by the pool
    pub fn spare_columns(&self) -> usize {
        self.columns.values().map(Vec::len).sum()
    }

    /// Returns the number of spare vector columns held by the pool
    pub fn spare_vectors(&self) -> usize {
        self.vectors.values().map(Vec::len).sum()
    }

    /// Returns the number of buffers which were freshly allocated
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Drops every spare buffer
    pub fn clear(&mut self) {
        self.columns.clear();
        self.vectors.clear();
    }
}
