//! Small closure-backed multi-functions
use super::{Context, MultiFunction, Params, Signature};
use crate::{IndexMask, types::Element};
use std::{
    marker::PhantomData,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Single input, single output
pub struct SiSo<A, O, F> {
    signature: Signature,
    f: F,
    _p: PhantomData<fn(A) -> O>,
}

impl<A, O, F> SiSo<A, O, F>
where
    A: Element,
    O: Element,
    F: Fn(A) -> O + Send + Sync,
{
    /// Builds a new function with parameters `(a, out)`
    pub fn new(name: impl Into<String>, f: F) -> Self {
        let signature = Signature::new(name)
            .single_input::<A>("a")
            .single_output::<O>("out");
        Self {
            signature,
            f,
            _p: PhantomData,
        }
    }
}

impl<A, O, F> MultiFunction for SiSo<A, O, F>
where
    A: Element,
    O: Element,
    F: Fn(A) -> O + Send + Sync,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _: &Context) {
        let a = params.single_input::<A>(0);
        let out = params.single_output::<O>(1);
        for i in mask {
            out[i] = (self.f)(a.get(i));
        }
    }
}

/// Two single inputs, single output
pub struct Si2So<A, B, O, F> {
    signature: Signature,
    f: F,
    _p: PhantomData<fn(A, B) -> O>,
}

impl<A, B, O, F> Si2So<A, B, O, F>
where
    A: Element,
    B: Element,
    O: Element,
    F: Fn(A, B) -> O + Send + Sync,
{
    /// Builds a new function with parameters `(a, b, out)`
    pub fn new(name: impl Into<String>, f: F) -> Self {
        let signature = Signature::new(name)
            .single_input::<A>("a")
            .single_input::<B>("b")
            .single_output::<O>("out");
        Self {
            signature,
            f,
            _p: PhantomData,
        }
    }
}

impl<A, B, O, F> MultiFunction for Si2So<A, B, O, F>
where
    A: Element,
    B: Element,
    O: Element,
    F: Fn(A, B) -> O + Send + Sync,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _: &Context) {
        let a = params.single_input::<A>(0);
        let b = params.single_input::<B>(1);
        let out = params.single_output::<O>(2);
        for i in mask {
            out[i] = (self.f)(a.get(i), b.get(i));
        }
    }
}

/// Three single inputs, single output
pub struct Si3So<A, B, C, O, F> {
    signature: Signature,
    f: F,
    _p: PhantomData<fn(A, B, C) -> O>,
}

impl<A, B, C, O, F> Si3So<A, B, C, O, F>
where
    A: Element,
    B: Element,
    C: Element,
    O: Element,
    F: Fn(A, B, C) -> O + Send + Sync,
{
    /// Builds a new function with parameters `(a, b, c, out)`
    pub fn new(name: impl Into<String>, f: F) -> Self {
        let signature = Signature::new(name)
            .single_input::<A>("a")
            .single_input::<B>("b")
            .single_input::<C>("c")
            .single_output::<O>("out");
        Self {
            signature,
            f,
            _p: PhantomData,
        }
    }
}

impl<A, B, C, O, F> MultiFunction for Si3So<A, B, C, O, F>
where
    A: Element,
    B: Element,
    C: Element,
    O: Element,
    F: Fn(A, B, C) -> O + Send + Sync,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _: &Context) {
        let a = params.single_input::<A>(0);
        let b = params.single_input::<B>(1);
        let c = params.single_input::<C>(2);
        let out = params.single_output::<O>(3);
        for i in mask {
            out[i] = (self.f)(a.get(i), b.get(i), c.get(i));
        }
    }
}

/// Writes the same value at every index
pub struct Constant<T> {
    signature: Signature,
    value: T,
}

impl<T: Element> Constant<T> {
    /// Builds a new constant function, with a single output parameter
    pub fn new(value: T) -> Self {
        let signature = Signature::new(format!("Constant({value:?})"))
            .single_output::<T>("value");
        Self { signature, value }
    }
}

impl<T: Element> MultiFunction for Constant<T> {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _: &Context) {
        let out = params.single_output::<T>(0);
        for i in mask {
            out[i] = self.value;
        }
    }
}

/// Writes the same list at every index
pub struct VectorConstant<T> {
    signature: Signature,
    value: Vec<T>,
}

impl<T: Element> VectorConstant<T> {
    /// Builds a new constant function, with a single vector output
    pub fn new(value: Vec<T>) -> Self {
        let signature = Signature::new(format!("VectorConstant({value:?})"))
            .vector_output::<T>("value");
        Self { signature, value }
    }
}

impl<T: Element> MultiFunction for VectorConstant<T> {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _: &Context) {
        let out = params.vector_output::<T>(0);
        for i in mask {
            out[i].extend_from_slice(&self.value);
        }
    }
}

/// Modifies a single value in place
pub struct Mutate<T, F> {
    signature: Signature,
    f: F,
    _p: PhantomData<fn(&mut T)>,
}

impl<T, F> Mutate<T, F>
where
    T: Element,
    F: Fn(&mut T) + Send + Sync,
{
    /// Builds a new function with one mutable parameter
    pub fn new(name: impl Into<String>, f: F) -> Self {
        let signature = Signature::new(name).single_mutable::<T>("value");
        Self {
            signature,
            f,
            _p: PhantomData,
        }
    }
}

impl<T, F> MultiFunction for Mutate<T, F>
where
    T: Element,
    F: Fn(&mut T) + Send + Sync,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _: &Context) {
        let v = params.single_mutable::<T>(0);
        for i in mask {
            (self.f)(&mut v[i]);
        }
    }
}

/// Appends a single value to a mutable vector
pub struct VectorAppend<T> {
    signature: Signature,
    _p: PhantomData<fn(T)>,
}

impl<T: Element> VectorAppend<T> {
    /// Builds a new function with parameters `(vector, value)`
    pub fn new() -> Self {
        let signature = Signature::new("VectorAppend")
            .vector_mutable::<T>("vector")
            .single_input::<T>("value");
        Self {
            signature,
            _p: PhantomData,
        }
    }
}

impl<T: Element> Default for VectorAppend<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> MultiFunction for VectorAppend<T> {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _: &Context) {
        let value = params.single_input::<T>(1);
        let vectors = params.vector_mutable::<T>(0);
        for i in mask {
            vectors[i].push(value.get(i));
        }
    }
}

/// Sums every value in a vector
pub struct VectorSum<T> {
    signature: Signature,
    _p: PhantomData<fn(T)>,
}

impl<T: Element + std::iter::Sum<T>> VectorSum<T> {
    /// Builds a new function with parameters `(vector, sum)`
    pub fn new() -> Self {
        let signature = Signature::new("VectorSum")
            .vector_input::<T>("vector")
            .single_output::<T>("sum");
        Self {
            signature,
            _p: PhantomData,
        }
    }
}

impl<T: Element + std::iter::Sum<T>> Default for VectorSum<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element + std::iter::Sum<T>> MultiFunction for VectorSum<T> {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _: &Context) {
        let vectors = params.vector_input::<T>(0);
        let out = params.single_output::<T>(1);
        for i in mask {
            out[i] = vectors.get(i).iter().cloned().sum();
        }
    }
}

/// Reads a named attribute from the [`Context`]
///
/// Missing attributes evaluate to 0.
pub struct ContextAttribute {
    signature: Signature,
    attribute: String,
}

impl ContextAttribute {
    /// Builds a new function with a single `Float` output
    pub fn new(attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        let signature =
            Signature::new(format!("Attribute({attribute})"))
                .single_output::<f32>("value");
        Self {
            signature,
            attribute,
        }
    }
}

impl MultiFunction for ContextAttribute {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, ctx: &Context) {
        let v = ctx.get(&self.attribute).unwrap_or(0.0);
        let out = params.single_output::<f32>(0);
        for i in mask {
            out[i] = v;
        }
    }

    fn depends_on_context(&self) -> bool {
        true
    }
}

/// Writes each index (as an `Int`) to the output
pub struct ElementIndex {
    signature: Signature,
}

impl ElementIndex {
    /// Builds a new function with a single `Int` output
    pub fn new() -> Self {
        let signature = Signature::new("Index").single_output::<i32>("index");
        Self { signature }
    }
}

impl Default for ElementIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiFunction for ElementIndex {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _: &Context) {
        let out = params.single_output::<i32>(0);
        for i in mask {
            out[i] = i as i32;
        }
    }

    fn depends_on_context(&self) -> bool {
        true
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Wrapper which records how often a function is called
///
/// ```
/// use multifn::{
///     Context, IndexMask, MultiFunction, Params,
///     function::{Constant, Counted},
///     types::{Column, ElementType},
/// };
///
/// let f = Counted::new(Constant::new(1i32));
/// let mut out = Column::new(ElementType::Int, 8);
/// let mut params = Params::new();
/// params.add_uninitialized_single_output(&mut out);
/// f.call(&IndexMask::new(8), &mut params, &Context::new());
///
/// assert_eq!(f.calls(), 1);
/// assert_eq!(f.indices(), 8);
/// ```
pub struct Counted<F> {
    inner: F,
    calls: AtomicUsize,
    indices: AtomicUsize,
}

impl<F: MultiFunction> Counted<F> {
    /// Wraps a function
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            indices: AtomicUsize::new(0),
        }
    }

    /// Returns the number of calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Returns the total number of indices evaluated so far
    pub fn indices(&self) -> usize {
        self.indices.load(Ordering::Relaxed)
    }

    /// Resets both counters
    pub fn reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.indices.store(0, Ordering::Relaxed);
    }
}

impl<F: MultiFunction> MultiFunction for Counted<F> {
    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, ctx: &Context) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.indices.fetch_add(mask.len(), Ordering::Relaxed);
        self.inner.call(mask, params, ctx)
    }

    fn depends_on_context(&self) -> bool {
        self.inner.depends_on_context()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{Column, ElementType, VArray, VVectorArray, VectorColumn};

    #[test]
    fn si3so() {
        let f = Si3So::new("select", |c: bool, a: i32, b: i32| {
            if c { a } else { b }
        });
        let c = Column::from(vec![true, false, true]);
        let a = Column::from(vec![1i32]);
        let b = Column::from(vec![2i32]);
        let mut out = Column::new(ElementType::Int, 3);
        let mut params = Params::new();
        params.add_readonly_single_input(VArray::Span(&c));
        params.add_readonly_single_input(VArray::single(&a));
        params.add_readonly_single_input(VArray::single(&b));
        params.add_uninitialized_single_output(&mut out);
        assert_eq!(params.check(f.signature()), Ok(()));
        f.call(&IndexMask::new(3), &mut params, &Context::new());
        drop(params);
        assert_eq!(out.as_slice::<i32>(), &[1, 2, 1]);
    }

    #[test]
    fn vectors() {
        let mut v = VectorColumn::from(vec![vec![1.0f32], vec![]]);
        let x = Column::from(vec![2.0f32, 3.0]);

        let f = VectorAppend::<f32>::new();
        let mut params = Params::new();
        params.add_vector_mutable(&mut v);
        params.add_readonly_single_input(VArray::Span(&x));
        f.call(&IndexMask::new(2), &mut params, &Context::new());
        drop(params);
        assert_eq!(v.as_vectors::<f32>(), &[vec![1.0, 2.0], vec![3.0]]);

        let f = VectorSum::<f32>::new();
        let mut out = Column::new(ElementType::Float, 2);
        let mut params = Params::new();
        params.add_readonly_vector_input(VVectorArray::Span(&v));
        params.add_uninitialized_single_output(&mut out);
        f.call(&IndexMask::new(2), &mut params, &Context::new());
        drop(params);
        assert_eq!(out.as_slice::<f32>(), &[3.0, 3.0]);
    }

    #[test]
    fn mutate_masked() {
        let f = Mutate::new("double", |v: &mut i32| *v *= 2);
        let mut c = Column::from(vec![1i32, 2, 3, 4]);
        let mut params = Params::new();
        params.add_single_mutable(&mut c);
        f.call(
            &IndexMask::from_indices(vec![1, 3]),
            &mut params,
            &Context::new(),
        );
        drop(params);
        assert_eq!(c.as_slice::<i32>(), &[1, 4, 3, 8]);
    }

    #[test]
    fn context_and_index() {
        let f = ContextAttribute::new("time");
        assert!(f.depends_on_context());
        let mut out = Column::new(ElementType::Float, 2);
        let mut params = Params::new();
        params.add_uninitialized_single_output(&mut out);
        let ctx = Context::new().with("time", 4.0);
        f.call(&IndexMask::new(2), &mut params, &ctx);
        drop(params);
        assert_eq!(out.as_slice::<f32>(), &[4.0, 4.0]);

        let f = ElementIndex::new();
        let mut out = Column::new(ElementType::Int, 5);
        let mut params = Params::new();
        params.add_uninitialized_single_output(&mut out);
        f.call(&IndexMask::range(2..5), &mut params, &Context::new());
        drop(params);
        assert_eq!(&out.as_slice::<i32>()[2..], &[2, 3, 4]);
    }
}
