use super::{Interface, ParamType, Signature};
use crate::{
    Error,
    types::{
        Column, DataType, Element, ElementType, VArray, VSpan, VVector,
        VVectorArray, VectorColumn,
    },
};

/// A single parameter passed to a multi-function
#[derive(Debug)]
pub enum Param<'p> {
    /// Read-only single-value input
    SingleInput(VArray<'p>),
    /// Read-only vector input
    VectorInput(VVectorArray<'p>),
    /// Uninitialized single-value output
    SingleOutput(&'p mut Column),
    /// Vector output; every list in the mask starts out empty
    VectorOutput(&'p mut VectorColumn),
    /// Initialized single value which may be modified in place
    SingleMutable(&'p mut Column),
    /// Initialized vector which may be modified in place
    VectorMutable(&'p mut VectorColumn),
    /// Single-value output whose result is discarded
    IgnoredSingle(Column),
    /// Vector output whose result is discarded
    IgnoredVector(VectorColumn),
}

impl Param<'_> {
    /// Returns the type of this parameter
    pub fn param_type(&self) -> ParamType {
        use DataType::{Single, Vector};
        let (i, t) = match self {
            Param::SingleInput(v) => {
                (Interface::Input, Single(v.element_type()))
            }
            Param::VectorInput(v) => {
                (Interface::Input, Vector(v.element_type()))
            }
            Param::SingleOutput(c) => {
                (Interface::Output, Single(c.element_type()))
            }
            Param::IgnoredSingle(c) => {
                (Interface::Output, Single(c.element_type()))
            }
            Param::VectorOutput(c) => {
                (Interface::Output, Vector(c.element_type()))
            }
            Param::IgnoredVector(c) => {
                (Interface::Output, Vector(c.element_type()))
            }
            Param::SingleMutable(c) => {
                (Interface::Mutable, Single(c.element_type()))
            }
            Param::VectorMutable(c) => {
                (Interface::Mutable, Vector(c.element_type()))
            }
        };
        ParamType::new(i, t)
    }
}

/// Ordered parameter list for a multi-function call
///
/// Parameters are added in signature order with the `add_*` functions, then
/// read back by index with the accessors.  Read-only inputs are returned with
/// the list's lifetime `'p`, so they can be held while an output is borrowed
/// mutably.
///
/// # Panics
/// Every accessor panics if the parameter at the given index is of a
/// different kind, or if its element type doesn't match the requested type.
#[derive(Debug, Default)]
pub struct Params<'p> {
    params: Vec<Param<'p>>,
}

impl<'p> Params<'p> {
    /// Builds an empty parameter list
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an empty parameter list with room for `n` parameters
    pub fn with_capacity(n: usize) -> Self {
        Self {
            params: Vec::with_capacity(n),
        }
    }

    /// Appends an arbitrary parameter
    pub fn push(&mut self, p: Param<'p>) {
        self.params.push(p);
    }

    /// Appends a read-only single-value input
    pub fn add_readonly_single_input(&mut self, v: VArray<'p>) {
        self.push(Param::SingleInput(v));
    }

    /// Appends a read-only vector input
    pub fn add_readonly_vector_input(&mut self, v: VVectorArray<'p>) {
        self.push(Param::VectorInput(v));
    }

    /// Appends an uninitialized single-value output
    pub fn add_uninitialized_single_output(&mut self, c: &'p mut Column) {
        self.push(Param::SingleOutput(c));
    }

    /// Appends a vector output
    pub fn add_vector_output(&mut self, c: &'p mut VectorColumn) {
        self.push(Param::VectorOutput(c));
    }

    /// Appends a mutable single-value parameter
    pub fn add_single_mutable(&mut self, c: &'p mut Column) {
        self.push(Param::SingleMutable(c));
    }

    /// Appends a mutable vector parameter
    pub fn add_vector_mutable(&mut self, c: &'p mut VectorColumn) {
        self.push(Param::VectorMutable(c));
    }

    /// Appends a single-value output whose result is not needed
    ///
    /// A scratch buffer of the given type and length is owned by the list.
    pub fn add_ignored_single_output(&mut self, ty: ElementType, len: usize) {
        self.push(Param::IgnoredSingle(Column::new(ty, len)));
    }

    /// Appends a vector output whose result is not needed
    pub fn add_ignored_vector_output(&mut self, ty: ElementType, len: usize) {
        self.push(Param::IgnoredVector(VectorColumn::new(ty, len)));
    }

    /// Returns the number of parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Checks whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterates over parameters mutably
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Param<'p>> {
        self.params.iter_mut()
    }

    /// Checks that the parameter list matches a signature
    pub fn check(&self, sig: &Signature) -> Result<(), Error> {
        if self.params.len() != sig.len() {
            return Err(Error::BadParamCount {
                function: sig.name().to_owned(),
                expected: sig.len(),
                actual: self.params.len(),
            });
        }
        for (i, p) in self.params.iter().enumerate() {
            if p.param_type() != sig.param_type(i) {
                return Err(sig.bad_param(i));
            }
        }
        Ok(())
    }

    /// Checks whether the output at index `i` will be read by the caller
    pub fn output_is_required(&self, i: usize) -> bool {
        !matches!(
            self.params[i],
            Param::IgnoredSingle(..) | Param::IgnoredVector(..)
        )
    }

    /// Returns the read-only single-value input at index `i`
    pub fn readonly_single_input(&self, i: usize) -> VArray<'p> {
        match &self.params[i] {
            Param::SingleInput(v) => *v,
            p => wrong_kind(i, p),
        }
    }

    /// Returns the read-only vector input at index `i`
    pub fn readonly_vector_input(&self, i: usize) -> VVectorArray<'p> {
        match &self.params[i] {
            Param::VectorInput(v) => *v,
            p => wrong_kind(i, p),
        }
    }

    /// Returns the single-value output buffer at index `i`
    pub fn uninitialized_single_output(&mut self, i: usize) -> &mut Column {
        match &mut self.params[i] {
            Param::SingleOutput(c) => &mut **c,
            Param::IgnoredSingle(c) => c,
            p => wrong_kind(i, p),
        }
    }

    /// Returns the vector output buffer at index `i`
    pub fn vector_output_column(&mut self, i: usize) -> &mut VectorColumn {
        match &mut self.params[i] {
            Param::VectorOutput(c) => &mut **c,
            Param::IgnoredVector(c) => c,
            p => wrong_kind(i, p),
        }
    }

    /// Returns the mutable single-value buffer at index `i`
    pub fn single_mutable_column(&mut self, i: usize) -> &mut Column {
        match &mut self.params[i] {
            Param::SingleMutable(c) => &mut **c,
            p => wrong_kind(i, p),
        }
    }

    /// Returns the mutable vector buffer at index `i`
    pub fn vector_mutable_column(&mut self, i: usize) -> &mut VectorColumn {
        match &mut self.params[i] {
            Param::VectorMutable(c) => &mut **c,
            p => wrong_kind(i, p),
        }
    }

    /// Returns a typed view of the single-value input at index `i`
    pub fn single_input<T: Element>(&self, i: usize) -> VSpan<'p, T> {
        self.readonly_single_input(i).typed()
    }

    /// Returns a typed view of the vector input at index `i`
    pub fn vector_input<T: Element>(&self, i: usize) -> VVector<'p, T> {
        self.readonly_vector_input(i).typed()
    }

    /// Returns the typed single-value output at index `i`
    pub fn single_output<T: Element>(&mut self, i: usize) -> &mut [T] {
        self.uninitialized_single_output(i).as_mut_slice()
    }

    /// Returns the typed vector output at index `i`
    pub fn vector_output<T: Element>(&mut self, i: usize) -> &mut [Vec<T>] {
        self.vector_output_column(i).as_vectors_mut()
    }

    /// Returns the typed single-value mutable parameter at index `i`
    pub fn single_mutable<T: Element>(&mut self, i: usize) -> &mut [T] {
        self.single_mutable_column(i).as_mut_slice()
    }

    /// Returns the typed vector mutable parameter at index `i`
    pub fn vector_mutable<T: Element>(&mut self, i: usize) -> &mut [Vec<T>] {
        self.vector_mutable_column(i).as_vectors_mut()
    }
}

#[cold]
#[inline(never)]
fn wrong_kind(i: usize, p: &Param) -> ! {
    panic!("parameter {i} has the wrong kind ({})", p.param_type())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::function::Signature;

    #[test]
    fn accessors() {
        let a = Column::from(vec![1i32, 2]);
        let mut out = Column::new(ElementType::Bool, 2);
        let mut params = Params::new();
        params.add_readonly_single_input(VArray::Span(&a));
        params.add_uninitialized_single_output(&mut out);
        params.add_ignored_single_output(ElementType::Float, 2);

        let input = params.single_input::<i32>(0);
        let o = params.single_output::<bool>(1);
        o[0] = input.get(0) == 1;
        o[1] = input.get(1) == 1;
        assert!(params.output_is_required(1));
        assert!(!params.output_is_required(2));
        params.single_output::<f32>(2)[0] = 1.0;
        drop(params);
        assert_eq!(out.as_slice::<bool>(), &[true, false]);
    }

    #[test]
    fn check_signature() {
        let sig = Signature::new("f")
            .single_input::<f32>("a")
            .vector_output::<i32>("b");
        let a = Column::from(vec![1.0f32]);
        let mut b = VectorColumn::new(ElementType::Int, 1);

        let mut params = Params::new();
        params.add_readonly_single_input(VArray::single(&a));
        assert!(matches!(
            params.check(&sig),
            Err(Error::BadParamCount { expected: 2, .. })
        ));
        params.add_vector_output(&mut b);
        assert_eq!(params.check(&sig), Ok(()));

        let mut params = Params::new();
        params.add_readonly_single_input(VArray::single(&a));
        params.add_ignored_vector_output(ElementType::Float, 1);
        assert!(matches!(
            params.check(&sig),
            Err(Error::BadParam { index: 1, .. })
        ));
    }

    #[test]
    #[should_panic]
    fn wrong_accessor() {
        let a = Column::from(vec![1.0f32]);
        let mut params = Params::new();
        params.add_readonly_single_input(VArray::single(&a));
        params.uninitialized_single_output(0);
    }
}
