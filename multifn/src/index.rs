//! Container types with strongly-typed indexes
//!
//! Nodes, sockets, variables, and instructions are all identified by dense
//! integer ids, which are used to index per-call storage arrays.  Wrapping them
//! in distinct types keeps an output socket id from being used to look up a
//! variable (and so on).

/// Trait for a `usize` wrapper that can be used as an [`IndexVec`] key
pub trait Index: Copy {
    /// Builds the index from a raw `usize`
    fn new(i: usize) -> Self;
    /// Returns the raw `usize`
    fn get(&self) -> usize;
}

/// A `Vec<V>` with strongly-typed indexes, used to improve the type-safety
/// of data storage.
///
/// The `Index` type should be a wrapper around a `usize` and be convertible
/// in both directions; it is typically passed around using `Copy`.  A suitable
/// index type can be constructed with [`define_index`].
#[derive(Clone, Debug)]
pub struct IndexVec<V, I> {
    data: Vec<V>,
    _phantom: std::marker::PhantomData<fn(I)>,
}

impl<V, I> Default for IndexVec<V, I> {
    fn default() -> Self {
        Self {
            data: vec![],
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<V, I: Index> IndexVec<V, I> {
    /// Builds a new empty vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a vector of `n` copies of `v`
    pub fn filled(v: V, n: usize) -> Self
    where
        V: Clone,
    {
        vec![v; n].into()
    }

    /// Pushes a value, returning its index
    pub fn push(&mut self, v: V) -> I {
        let i = I::new(self.data.len());
        self.data.push(v);
        i
    }

    /// Returns the number of items in the vector
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Checks whether the vector is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Looks up an item, returning `None` if the index is out of range
    pub fn get(&self, i: I) -> Option<&V> {
        self.data.get(i.get())
    }

    /// Looks up an item mutably, returning `None` if the index is out of range
    pub fn get_mut(&mut self, i: I) -> Option<&mut V> {
        self.data.get_mut(i.get())
    }

    /// Iterates over every valid index
    pub fn keys(&self) -> impl Iterator<Item = I> + use<V, I> {
        (0..self.data.len()).map(I::new)
    }

    /// Iterates over values
    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.data.iter()
    }

    /// Iterates over values mutably
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, V> {
        self.data.iter_mut()
    }

    /// Iterates over `(index, value)` pairs
    pub fn enumerate(&self) -> impl Iterator<Item = (I, &V)> {
        self.data.iter().enumerate().map(|(i, v)| (I::new(i), v))
    }
}

impl<V, I> std::iter::IntoIterator for IndexVec<V, I> {
    type Item = V;
    type IntoIter = std::vec::IntoIter<V>;
    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

impl<V, I> FromIterator<V> for IndexVec<V, I> {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Vec::from_iter(iter).into()
    }
}

impl<V, I> std::ops::Index<I> for IndexVec<V, I>
where
    I: Index,
{
    type Output = V;
    fn index(&self, i: I) -> &V {
        &self.data[i.get()]
    }
}

impl<V, I> std::ops::IndexMut<I> for IndexVec<V, I>
where
    I: Index,
{
    fn index_mut(&mut self, i: I) -> &mut V {
        &mut self.data[i.get()]
    }
}

impl<V, I> From<Vec<V>> for IndexVec<V, I> {
    fn from(data: Vec<V>) -> Self {
        Self {
            data,
            _phantom: std::marker::PhantomData,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Defines an index type suitable for use in an [`IndexVec`]
macro_rules! define_index {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Copy, Clone, Default, Debug, Eq, PartialEq, Hash, Ord, PartialOrd,
        )]
        pub struct $name(usize);
        impl crate::index::Index for $name {
            fn new(i: usize) -> Self {
                Self(i)
            }
            fn get(&self) -> usize {
                self.0
            }
        }
        impl $name {
            /// Returns the raw index
            pub fn index(&self) -> usize {
                self.0
            }
        }
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}
pub(crate) use define_index;

#[cfg(test)]
mod test {
    use super::*;

    define_index!(Thing, "Test index");

    #[test]
    fn index_vec_push() {
        let mut v: IndexVec<&str, Thing> = IndexVec::new();
        let a = v.push("a");
        let b = v.push("b");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(v[b], "b");
        assert_eq!(v.keys().collect::<Vec<_>>(), vec![a, b]);
        assert!(v.get(Thing::new(2)).is_none());
    }

    #[test]
    fn index_vec_filled() {
        let mut v: IndexVec<Option<u32>, Thing> = IndexVec::filled(None, 3);
        v[Thing::new(1)] = Some(4);
        assert_eq!(v.len(), 3);
        assert_eq!(v.iter().flatten().count(), 1);
        assert_eq!(format!("{}", Thing::new(1)), "Thing(1)");
    }
}
