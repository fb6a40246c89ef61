//! Multi-functions: vectorized functions over a batch of indices
//!
//! A [`MultiFunction`] is called once for a whole [`IndexMask`], reading its
//! inputs and writing its outputs at every index in the mask.  Parameters are
//! passed in a fixed order given by the function's [`Signature`], using a
//! [`Params`] list:
//!
//! ```
//! use multifn::{
//!     Context, IndexMask, MultiFunction, Params,
//!     function::Si2So,
//!     types::{Column, ElementType, VArray},
//! };
//!
//! let add = Si2So::new("add", |a: f32, b: f32| a + b);
//!
//! let a = Column::from(vec![1.0f32, 2.0, 3.0]);
//! let b = Column::from(vec![10.0f32]);
//! let mut out = Column::new(ElementType::Float, 3);
//!
//! let mut params = Params::new();
//! params.add_readonly_single_input(VArray::Span(&a));
//! params.add_readonly_single_input(VArray::single(&b));
//! params.add_uninitialized_single_output(&mut out);
//! add.call(&IndexMask::new(3), &mut params, &Context::new());
//! drop(params);
//!
//! assert_eq!(out.as_slice::<f32>(), &[11.0, 12.0, 13.0]);
//! ```
//!
//! Network and procedure evaluators implement [`MultiFunction`] themselves, so
//! they can be nested inside other networks and procedures.
use crate::{
    Error, IndexMask,
    types::{DataType, Element},
};
use std::collections::BTreeMap;

mod builtin;
mod params;

pub use builtin::{
    Constant, ContextAttribute, Counted, ElementIndex, Mutate, Si2So, Si3So,
    SiSo, VectorAppend, VectorConstant, VectorSum,
};
pub use params::{Param, Params};

/// Direction of a parameter
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Interface {
    /// Read-only input
    Input,
    /// Uninitialized output, which must be written at every index in the mask
    Output,
    /// Initialized value which may be modified in place
    Mutable,
}

/// Direction and data type of a parameter
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ParamType {
    /// Parameter direction
    pub interface: Interface,
    /// Parameter data type
    pub data_type: DataType,
}

impl ParamType {
    /// Builds a new parameter type
    pub fn new(interface: Interface, data_type: DataType) -> Self {
        Self {
            interface,
            data_type,
        }
    }

    /// Checks whether the parameter is read by the function
    pub fn is_input_or_mutable(&self) -> bool {
        matches!(self.interface, Interface::Input | Interface::Mutable)
    }

    /// Checks whether the parameter is written by the function
    pub fn is_output_or_mutable(&self) -> bool {
        matches!(self.interface, Interface::Output | Interface::Mutable)
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let i = match self.interface {
            Interface::Input => "in",
            Interface::Output => "out",
            Interface::Mutable => "mut",
        };
        write!(f, "{i} {}", self.data_type)
    }
}

/// Named parameter within a [`Signature`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParamInfo {
    /// Parameter name, used for debugging
    pub name: String,
    /// Parameter type
    pub ty: ParamType,
}

/// Name and parameter list of a multi-function
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Signature {
    name: String,
    params: Vec<ParamInfo>,
}

impl Signature {
    /// Builds a new signature with no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: vec![],
        }
    }

    /// Appends a parameter
    pub fn push(&mut self, name: impl Into<String>, ty: ParamType) {
        self.params.push(ParamInfo {
            name: name.into(),
            ty,
        });
    }

    /// Appends a parameter, returning the modified signature
    pub fn param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.push(name, ty);
        self
    }

    /// Appends a single-value input of element type `T`
    pub fn single_input<T: Element>(self, name: impl Into<String>) -> Self {
        self.param(name, single(Interface::Input, T::TYPE))
    }

    /// Appends a single-value output of element type `T`
    pub fn single_output<T: Element>(self, name: impl Into<String>) -> Self {
        self.param(name, single(Interface::Output, T::TYPE))
    }

    /// Appends a single-value mutable parameter of element type `T`
    pub fn single_mutable<T: Element>(self, name: impl Into<String>) -> Self {
        self.param(name, single(Interface::Mutable, T::TYPE))
    }

    /// Appends a vector input of element type `T`
    pub fn vector_input<T: Element>(self, name: impl Into<String>) -> Self {
        self.param(name, vector(Interface::Input, T::TYPE))
    }

    /// Appends a vector output of element type `T`
    pub fn vector_output<T: Element>(self, name: impl Into<String>) -> Self {
        self.param(name, vector(Interface::Output, T::TYPE))
    }

    /// Appends a vector mutable parameter of element type `T`
    pub fn vector_mutable<T: Element>(self, name: impl Into<String>) -> Self {
        self.param(name, vector(Interface::Mutable, T::TYPE))
    }

    /// Returns the function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameter list
    pub fn params(&self) -> &[ParamInfo] {
        &self.params
    }

    /// Returns the number of parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Checks whether the signature has no parameters
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the type of the given parameter
    ///
    /// # Panics
    /// If the index is out of range
    pub fn param_type(&self, i: usize) -> ParamType {
        self.params[i].ty
    }

    pub(crate) fn bad_param(&self, index: usize) -> Error {
        Error::BadParam {
            function: self.name.clone(),
            index,
        }
    }
}

fn single(interface: Interface, t: crate::types::ElementType) -> ParamType {
    ParamType::new(interface, DataType::Single(t))
}

fn vector(interface: Interface, t: crate::types::ElementType) -> ParamType {
    ParamType::new(interface, DataType::Vector(t))
}

////////////////////////////////////////////////////////////////////////////////

/// Call-scoped data which is shared by every index
///
/// The context is passed unchanged to every multi-function invoked by an
/// evaluator.  Functions which read it must say so through
/// [`MultiFunction::depends_on_context`].
#[derive(Clone, Debug, Default)]
pub struct Context {
    attributes: BTreeMap<String, f32>,
}

impl Context {
    /// Builds an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a named attribute, returning the modified context
    pub fn with(mut self, name: impl Into<String>, value: f32) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a named attribute
    pub fn set(&mut self, name: impl Into<String>, value: f32) {
        self.attributes.insert(name.into(), value);
    }

    /// Looks up a named attribute
    pub fn get(&self, name: &str) -> Option<f32> {
        self.attributes.get(name).cloned()
    }
}

////////////////////////////////////////////////////////////////////////////////

/// A vectorized function over a batch of indices
///
/// Implementations must uphold the following contract:
/// - Every output parameter is written at every index in the mask, and every
///   mutable parameter is left initialized at every index in the mask.
/// - Values at indices outside of the mask are neither read nor written.
/// - The call does not fail; there is no error channel.
/// - Unless [`depends_on_context`](MultiFunction::depends_on_context) returns
///   `true`, the value written at index `i` depends only on the input values
///   at index `i`.  Evaluators rely on this to call the function once on a
///   single index when every input is the same at every index.
pub trait MultiFunction: Send + Sync {
    /// Returns the function's signature
    fn signature(&self) -> &Signature;

    /// Evaluates the function at every index in `mask`
    ///
    /// `params` must match the signature, and every buffer must be at least
    /// [`mask.min_array_size()`](IndexMask::min_array_size) long.
    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, ctx: &Context);

    /// Checks whether the results depend on anything other than the inputs at
    /// a particular index (e.g. the index itself, or the [`Context`])
    fn depends_on_context(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::ElementType;

    #[test]
    fn signature_builder() {
        let s = Signature::new("f")
            .single_input::<f32>("a")
            .vector_mutable::<i32>("b")
            .single_output::<bool>("c");
        assert_eq!(s.name(), "f");
        assert_eq!(s.len(), 3);
        assert_eq!(
            s.param_type(0),
            ParamType::new(
                Interface::Input,
                DataType::Single(ElementType::Float)
            )
        );
        assert!(s.param_type(1).is_input_or_mutable());
        assert!(s.param_type(1).is_output_or_mutable());
        assert!(!s.param_type(2).is_input_or_mutable());
        assert_eq!(s.param_type(1).to_string(), "mut [Int]");
    }

    #[test]
    fn context_attributes() {
        let mut ctx = Context::new().with("time", 1.5);
        assert_eq!(ctx.get("time"), Some(1.5));
        assert_eq!(ctx.get("frame"), None);
        ctx.set("time", 2.0);
        assert_eq!(ctx.get("time"), Some(2.0));
    }
}
