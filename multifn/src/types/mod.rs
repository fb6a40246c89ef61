//! Runtime data types and type-erased containers
//!
//! Multi-functions are called with parameters whose element type is only known
//! at runtime.  This module provides the closed set of supported element types
//! ([`ElementType`]), the containers which store them ([`Column`] and
//! [`VectorColumn`]), and read-only views ([`VArray`] and [`VVectorArray`])
//! which may either refer to one value per index or broadcast a single value
//! to every index.
//!
//! Typed access goes through the [`Element`] trait:
//! ```
//! use multifn::types::{Column, VArray};
//!
//! let c = Column::from(vec![1.0f32, 2.0, 3.0]);
//! assert_eq!(c.as_slice::<f32>(), &[1.0, 2.0, 3.0]);
//!
//! let v = VArray::Span(&c).typed::<f32>();
//! assert_eq!(v.get(1), 2.0);
//!
//! let one = Column::from(vec![5.0f32]);
//! let v = VArray::single(&one).typed::<f32>();
//! assert_eq!(v.get(1000), 5.0);
//! ```
use serde::{Deserialize, Serialize};

mod column;
mod varray;

pub use column::{Column, VectorColumn};
pub use varray::{VArray, VSpan, VVector, VVectorArray};

/// Element type stored in a [`Column`] or [`VectorColumn`]
#[allow(missing_docs)]
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
pub enum ElementType {
    Float,
    Int,
    Bool,
}

/// Data type of a socket, variable, or parameter
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Serialize,
    Deserialize,
)]
pub enum DataType {
    /// One value per index
    Single(ElementType),
    /// A variable-length list of values per index
    Vector(ElementType),
}

impl DataType {
    /// Returns the element type, regardless of category
    pub fn element_type(&self) -> ElementType {
        match self {
            DataType::Single(t) | DataType::Vector(t) => *t,
        }
    }

    /// Checks whether this is a [`DataType::Single`]
    pub fn is_single(&self) -> bool {
        matches!(self, DataType::Single(..))
    }

    /// Checks whether this is a [`DataType::Vector`]
    pub fn is_vector(&self) -> bool {
        matches!(self, DataType::Vector(..))
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Single(t) => write!(f, "{t}"),
            DataType::Vector(t) => write!(f, "[{t}]"),
        }
    }
}

/// Trait for a Rust type that can be stored in a runtime-typed container
///
/// This is implemented for `f32`, `i32`, and `bool`, matching the variants of
/// [`ElementType`].  The accessors return `None` if the container stores a
/// different element type.
pub trait Element:
    Copy + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static
{
    /// Runtime tag for this type
    const TYPE: ElementType;

    /// Borrows the column's data, if it has this element type
    fn slice(c: &Column) -> Option<&[Self]>;

    /// Borrows the column's data mutably, if it has this element type
    fn slice_mut(c: &mut Column) -> Option<&mut [Self]>;

    /// Borrows the vector column's data, if it has this element type
    fn vectors(c: &VectorColumn) -> Option<&[Vec<Self>]>;

    /// Borrows the vector column's data mutably, if it has this element type
    fn vectors_mut(c: &mut VectorColumn) -> Option<&mut [Vec<Self>]>;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const TYPE: ElementType = ElementType::$variant;
            fn slice(c: &Column) -> Option<&[Self]> {
                match c {
                    Column::$variant(v) => Some(v),
                    _ => None,
                }
            }
            fn slice_mut(c: &mut Column) -> Option<&mut [Self]> {
                match c {
                    Column::$variant(v) => Some(v),
                    _ => None,
                }
            }
            fn vectors(c: &VectorColumn) -> Option<&[Vec<Self>]> {
                match c {
                    VectorColumn::$variant(v) => Some(v),
                    _ => None,
                }
            }
            fn vectors_mut(c: &mut VectorColumn) -> Option<&mut [Vec<Self>]> {
                match c {
                    VectorColumn::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
        impl From<Vec<$ty>> for Column {
            fn from(v: Vec<$ty>) -> Self {
                Column::$variant(v)
            }
        }
        impl From<Vec<Vec<$ty>>> for VectorColumn {
            fn from(v: Vec<Vec<$ty>>) -> Self {
                VectorColumn::$variant(v)
            }
        }
    };
}

impl_element!(f32, Float);
impl_element!(i32, Int);
impl_element!(bool, Bool);

#[cold]
#[inline(never)]
pub(crate) fn type_mismatch(expected: ElementType, actual: ElementType) -> ! {
    panic!("element type mismatch: expected {expected}, found {actual}")
}
