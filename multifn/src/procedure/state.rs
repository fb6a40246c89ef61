//! Per-variable storage during a single procedure call
use super::{Procedure, VariableId};
use crate::{
    BufferPool, Context, IndexMask, MultiFunction,
    function::{Interface, Param, ParamInfo, Params},
    index::IndexVec,
    mask::indices_split,
    types::{Column, DataType, VArray, VVectorArray, VectorColumn},
};
use log::trace;

/// Current value of a variable
enum VariableValue<'a> {
    /// Read-only data from the caller
    InputSingle(VArray<'a>),
    /// Read-only vector data from the caller
    InputVector(VVectorArray<'a>),
    /// Data lives in the variable's caller storage
    CallerSingle,
    /// Vector data lives in the variable's caller storage
    CallerVector,
    /// Per-index buffer owned by the executor
    OwnSingle(Column),
    /// Per-index vector buffer owned by the executor
    OwnVector(VectorColumn),
    /// One value shared by every index
    OneSingle {
        column: Column,
        is_initialized: bool,
    },
    /// One vector shared by every index
    OneVector(VectorColumn),
}

impl VariableValue<'_> {
    fn kind(&self) -> &'static str {
        match self {
            VariableValue::InputSingle(..) => "InputSingle",
            VariableValue::InputVector(..) => "InputVector",
            VariableValue::CallerSingle => "CallerSingle",
            VariableValue::CallerVector => "CallerVector",
            VariableValue::OwnSingle(..) => "OwnSingle",
            VariableValue::OwnVector(..) => "OwnVector",
            VariableValue::OneSingle { .. } => "OneSingle",
            VariableValue::OneVector(..) => "OneVector",
        }
    }

    fn release(self, pool: &mut BufferPool) {
        match self {
            VariableValue::OwnSingle(c)
            | VariableValue::OneSingle { column: c, .. } => {
                pool.release_column(c)
            }
            VariableValue::OwnVector(c) | VariableValue::OneVector(c) => {
                pool.release_vector(c)
            }
            VariableValue::InputSingle(..)
            | VariableValue::InputVector(..)
            | VariableValue::CallerSingle
            | VariableValue::CallerVector => (),
        }
    }
}

/// Buffer provided by the caller for an output or mutable parameter
enum CallerStorage<'a> {
    Single(&'a mut Column),
    Vector(&'a mut VectorColumn),
}

/// State of one variable during a procedure call
///
/// Besides its value, each variable tracks how many indices are currently
/// initialized (this is a count, not a set: which indices those are is
/// guaranteed by [`Procedure::validate`]).
#[derive(Default)]
pub struct VariableState<'a> {
    value: Option<VariableValue<'a>>,
    tot_initialized: usize,
    caller_storage: Option<CallerStorage<'a>>,
}

impl<'a> VariableState<'a> {
    /// Returns the number of initialized indices
    pub fn tot_initialized(&self) -> usize {
        self.tot_initialized
    }

    /// Checks whether the variable holds (at most) one value for every index
    pub fn is_one(&self) -> bool {
        match &self.value {
            None => true,
            Some(VariableValue::InputSingle(v)) => v.is_single(),
            Some(VariableValue::InputVector(v)) => v.is_single_vector(),
            Some(
                VariableValue::CallerSingle
                | VariableValue::CallerVector
                | VariableValue::OwnSingle(..)
                | VariableValue::OwnVector(..),
            ) => self.tot_initialized == 0,
            Some(
                VariableValue::OneSingle { .. } | VariableValue::OneVector(..),
            ) => true,
        }
    }

    /// Checks whether the value lives in a per-index buffer
    fn is_mutable(&self) -> bool {
        matches!(
            self.value,
            Some(
                VariableValue::CallerSingle
                    | VariableValue::CallerVector
                    | VariableValue::OwnSingle(..)
                    | VariableValue::OwnVector(..)
            )
        )
    }

    /// Checks whether enough indices are initialized to cover `mask`
    pub fn is_fully_initialized(&self, mask: &IndexMask) -> bool {
        self.tot_initialized >= mask.len()
    }

    /// Checks whether enough indices are uninitialized to cover `mask`
    pub fn is_fully_uninitialized(
        &self,
        mask: &IndexMask,
        full_mask: &IndexMask,
    ) -> bool {
        self.tot_initialized + mask.len() <= full_mask.len()
    }

    /// Returns a read-only view of a single-value variable
    ///
    /// # Panics
    /// If the variable holds no value or holds a vector
    pub fn single_input(&self) -> VArray<'_> {
        match &self.value {
            Some(VariableValue::InputSingle(v)) => *v,
            Some(VariableValue::CallerSingle) => match &self.caller_storage {
                Some(CallerStorage::Single(c)) => VArray::Span(&**c),
                _ => panic!("caller storage is not a single-value buffer"),
            },
            Some(VariableValue::OwnSingle(c)) => VArray::Span(c),
            Some(VariableValue::OneSingle {
                column,
                is_initialized,
            }) => {
                debug_assert!(*is_initialized);
                VArray::single(column)
            }
            Some(v) => panic!("cannot read {} as a single value", v.kind()),
            None => panic!("cannot read an uninitialized variable"),
        }
    }

    /// Returns a read-only view of a vector variable
    ///
    /// # Panics
    /// If the variable holds no value or holds a single value
    pub fn vector_input(&self) -> VVectorArray<'_> {
        match &self.value {
            Some(VariableValue::InputVector(v)) => *v,
            Some(VariableValue::CallerVector) => match &self.caller_storage {
                Some(CallerStorage::Vector(c)) => VVectorArray::Span(&**c),
                _ => panic!("caller storage is not a vector buffer"),
            },
            Some(VariableValue::OwnVector(c)) => VVectorArray::Span(c),
            Some(VariableValue::OneVector(c)) => VVectorArray::single(c),
            Some(v) => panic!("cannot read {} as a vector", v.kind()),
            None => panic!("cannot read an uninitialized variable"),
        }
    }

    /// Adds the variable as a read-only input
    pub fn add_as_input<'s>(&'s self, params: &mut Params<'s>, ty: DataType) {
        match ty {
            DataType::Single(..) => {
                params.add_readonly_single_input(self.single_input())
            }
            DataType::Vector(..) => {
                params.add_readonly_vector_input(self.vector_input())
            }
        }
    }

    /// Adds the variable as a read-only input to a one-value call
    pub fn add_as_input_one<'s>(
        &'s self,
        params: &mut Params<'s>,
        ty: DataType,
    ) {
        debug_assert!(self.is_one() && self.tot_initialized > 0);
        self.add_as_input(params, ty)
    }

    /// Switches the variable to a per-index buffer (owned or provided by the
    /// caller), copying any current value into it
    pub fn ensure_is_mutable(
        &mut self,
        full_mask: &IndexMask,
        ty: DataType,
        pool: &mut BufferPool,
    ) {
        if self.is_mutable() {
            return;
        }
        let n = full_mask.min_array_size();
        let old = self.value.take();
        let new = match ty {
            DataType::Single(t) => {
                let mut own = None;
                let dst: &mut Column = match &mut self.caller_storage {
                    Some(CallerStorage::Single(c)) => &mut **c,
                    Some(CallerStorage::Vector(..)) => {
                        panic!("caller storage is not a single-value buffer")
                    }
                    None => own.insert(pool.obtain_column(t, n)),
                };
                match &old {
                    None => (),
                    Some(VariableValue::InputSingle(v)) => {
                        dst.materialize(full_mask, *v)
                    }
                    Some(VariableValue::OneSingle {
                        column,
                        is_initialized,
                    }) => {
                        if *is_initialized {
                            dst.materialize(full_mask, VArray::single(column))
                        }
                    }
                    Some(v) => panic!("cannot copy {} to a column", v.kind()),
                }
                match own {
                    Some(c) => VariableValue::OwnSingle(c),
                    None => VariableValue::CallerSingle,
                }
            }
            DataType::Vector(t) => {
                let mut own = None;
                let dst: &mut VectorColumn = match &mut self.caller_storage {
                    Some(CallerStorage::Vector(c)) => &mut **c,
                    Some(CallerStorage::Single(..)) => {
                        panic!("caller storage is not a vector buffer")
                    }
                    None => own.insert(pool.obtain_vector(t, n)),
                };
                match &old {
                    None => (),
                    Some(VariableValue::InputVector(v)) => {
                        dst.extend(full_mask, *v)
                    }
                    Some(VariableValue::OneVector(c)) => {
                        dst.extend(full_mask, VVectorArray::single(c))
                    }
                    Some(v) => panic!("cannot copy {} to a vector", v.kind()),
                }
                match own {
                    Some(c) => VariableValue::OwnVector(c),
                    None => VariableValue::CallerVector,
                }
            }
        };
        if let Some(old) = old {
            old.release(pool);
        }
        self.value = Some(new);
    }

    /// Adds the variable as an uninitialized output over `mask`
    pub fn add_as_output<'s>(
        &'s mut self,
        params: &mut Params<'s>,
        mask: &IndexMask,
        full_mask: &IndexMask,
        ty: DataType,
        pool: &mut BufferPool,
    ) {
        debug_assert!(self.is_fully_uninitialized(mask, full_mask));
        self.ensure_is_mutable(full_mask, ty, pool);
        self.tot_initialized += mask.len();
        match (&mut self.value, &mut self.caller_storage) {
            (
                Some(VariableValue::CallerSingle),
                Some(CallerStorage::Single(c)),
            ) => params.add_uninitialized_single_output(&mut **c),
            (Some(VariableValue::OwnSingle(c)), _) => {
                params.add_uninitialized_single_output(c)
            }
            (
                Some(VariableValue::CallerVector),
                Some(CallerStorage::Vector(c)),
            ) => params.add_vector_output(&mut **c),
            (Some(VariableValue::OwnVector(c)), _) => {
                params.add_vector_output(c)
            }
            _ => unreachable!("variable is mutable after ensure_is_mutable"),
        }
    }

    /// Adds the variable as an output of a one-value call
    ///
    /// The result is kept as a one-value buffer, and is only copied into the
    /// caller's storage (if any) when the procedure finishes.
    pub fn add_as_output_one<'s>(
        &'s mut self,
        params: &mut Params<'s>,
        mask: &IndexMask,
        ty: DataType,
        pool: &mut BufferPool,
    ) {
        debug_assert_eq!(self.tot_initialized, 0);
        let value = match self.value.take() {
            Some(v @ VariableValue::OneSingle { .. })
            | Some(v @ VariableValue::OneVector(..)) => v,
            old => {
                if let Some(old) = old {
                    old.release(pool);
                }
                match ty {
                    DataType::Single(t) => VariableValue::OneSingle {
                        column: pool.obtain_column(t, 1),
                        is_initialized: false,
                    },
                    DataType::Vector(t) => {
                        VariableValue::OneVector(pool.obtain_vector(t, 1))
                    }
                }
            }
        };
        self.tot_initialized += mask.len();
        match self.value.insert(value) {
            VariableValue::OneSingle {
                column,
                is_initialized,
            } => {
                *is_initialized = true;
                params.add_uninitialized_single_output(column)
            }
            VariableValue::OneVector(c) => params.add_vector_output(c),
            _ => unreachable!(),
        }
    }

    /// Adds the variable as a mutable parameter over `mask`
    pub fn add_as_mutable<'s>(
        &'s mut self,
        params: &mut Params<'s>,
        mask: &IndexMask,
        full_mask: &IndexMask,
        ty: DataType,
        pool: &mut BufferPool,
    ) {
        debug_assert!(self.is_fully_initialized(mask));
        self.ensure_is_mutable(full_mask, ty, pool);
        match (&mut self.value, &mut self.caller_storage) {
            (
                Some(VariableValue::CallerSingle),
                Some(CallerStorage::Single(c)),
            ) => params.add_single_mutable(&mut **c),
            (Some(VariableValue::OwnSingle(c)), _) => {
                params.add_single_mutable(c)
            }
            (
                Some(VariableValue::CallerVector),
                Some(CallerStorage::Vector(c)),
            ) => params.add_vector_mutable(&mut **c),
            (Some(VariableValue::OwnVector(c)), _) => {
                params.add_vector_mutable(c)
            }
            _ => unreachable!("variable is mutable after ensure_is_mutable"),
        }
    }

    /// Adds the variable as a mutable parameter of a one-value call
    pub fn add_as_mutable_one<'s>(
        &'s mut self,
        params: &mut Params<'s>,
        ty: DataType,
        pool: &mut BufferPool,
    ) {
        debug_assert!(self.is_one() && self.tot_initialized > 0);
        let one = IndexMask::new(1);
        let value = match self.value.take() {
            Some(v @ VariableValue::OneSingle { .. })
            | Some(v @ VariableValue::OneVector(..)) => v,
            Some(VariableValue::InputSingle(v)) => {
                let mut column = pool.obtain_column(ty.element_type(), 1);
                column.materialize(&one, v);
                VariableValue::OneSingle {
                    column,
                    is_initialized: true,
                }
            }
            Some(VariableValue::InputVector(v)) => {
                let mut c = pool.obtain_vector(ty.element_type(), 1);
                c.extend(&one, v);
                VariableValue::OneVector(c)
            }
            Some(v) => panic!("cannot mutate {} as one value", v.kind()),
            None => panic!("cannot mutate an uninitialized variable"),
        };
        match self.value.insert(value) {
            VariableValue::OneSingle { column, .. } => {
                params.add_single_mutable(column)
            }
            VariableValue::OneVector(c) => params.add_vector_mutable(c),
            _ => unreachable!(),
        }
    }

    /// Marks the indices in `mask` as uninitialized
    ///
    /// A value shared between indices (a one value or caller input) is
    /// first copied into a per-index buffer if some indices stay
    /// initialized, so that only the indices in `mask` are cleared.
    ///
    /// Returns `true` if no index remains initialized and the value can be
    /// released.
    pub fn destruct(
        &mut self,
        mask: &IndexMask,
        full_mask: &IndexMask,
        ty: DataType,
        pool: &mut BufferPool,
    ) -> bool {
        assert!(
            self.tot_initialized >= mask.len(),
            "destructing more indices than are initialized"
        );
        assert!(
            self.value.is_some(),
            "cannot destruct an uninitialized variable"
        );
        let remaining = self.tot_initialized - mask.len();
        if remaining > 0 && !self.is_mutable() {
            trace!("expanding shared value to destruct {} indices", mask.len());
            self.ensure_is_mutable(full_mask, ty, pool);
        }
        match &mut self.value {
            Some(VariableValue::CallerVector) => match &mut self.caller_storage
            {
                Some(CallerStorage::Vector(c)) => c.clear(mask),
                _ => panic!("caller storage is not a vector buffer"),
            },
            Some(VariableValue::OwnVector(c)) => c.clear(mask),
            Some(VariableValue::OneSingle { is_initialized, .. }) => {
                if remaining == 0 {
                    *is_initialized = false;
                }
            }
            Some(VariableValue::OneVector(c)) => {
                if remaining == 0 {
                    c.clear(&IndexMask::new(1));
                }
            }
            Some(_) => (),
            None => panic!("cannot destruct an uninitialized variable"),
        }
        self.tot_initialized = remaining;
        remaining == 0 && self.caller_storage.is_none()
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Variable states for every variable in a procedure, during a single call
pub struct VariableStates<'a> {
    procedure: &'a Procedure,
    full_mask: &'a IndexMask,
    states: IndexVec<VariableState<'a>, VariableId>,
    pool: BufferPool,
}

impl<'a> VariableStates<'a> {
    /// Builds uninitialized states for every variable
    pub fn new(procedure: &'a Procedure, full_mask: &'a IndexMask) -> Self {
        let states = std::iter::repeat_with(VariableState::default)
            .take(procedure.variable_count())
            .collect();
        Self {
            procedure,
            full_mask,
            states,
            pool: BufferPool::new(),
        }
    }

    /// Looks up a variable's state
    pub fn state(&self, v: VariableId) -> &VariableState<'a> {
        &self.states[v]
    }

    /// Returns the pool of spare buffers
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Returns the number of buffers currently owned by variables
    pub fn owned_values(&self) -> usize {
        self.states
            .iter()
            .filter(|s| {
                matches!(
                    s.value,
                    Some(
                        VariableValue::OwnSingle(..)
                            | VariableValue::OwnVector(..)
                            | VariableValue::OneSingle { .. }
                            | VariableValue::OneVector(..)
                    )
                )
            })
            .count()
    }

    /// Binds the caller's parameters to the procedure's parameter variables
    ///
    /// Inputs and mutable parameters start out initialized over the full mask;
    /// outputs start out uninitialized, with the caller buffer as storage.
    pub fn add_initial_variable_states<'p: 'a>(
        &mut self,
        params: impl IntoIterator<Item = &'a mut Param<'p>>,
    ) {
        let n = self.full_mask.len();
        let procedure = self.procedure;
        for (&(interface, v), p) in procedure.params().iter().zip(params) {
            let state = &mut self.states[v];
            match (interface, p) {
                (Interface::Input, Param::SingleInput(d)) => {
                    state.value = Some(VariableValue::InputSingle(*d));
                    state.tot_initialized = n;
                }
                (Interface::Input, Param::VectorInput(d)) => {
                    state.value = Some(VariableValue::InputVector(*d));
                    state.tot_initialized = n;
                }
                (Interface::Output, Param::SingleOutput(c)) => {
                    state.caller_storage =
                        Some(CallerStorage::Single(&mut **c))
                }
                (Interface::Output, Param::IgnoredSingle(c)) => {
                    state.caller_storage = Some(CallerStorage::Single(c))
                }
                (Interface::Output, Param::VectorOutput(c)) => {
                    state.caller_storage =
                        Some(CallerStorage::Vector(&mut **c))
                }
                (Interface::Output, Param::IgnoredVector(c)) => {
                    state.caller_storage = Some(CallerStorage::Vector(c))
                }
                (Interface::Mutable, Param::SingleMutable(c)) => {
                    state.caller_storage =
                        Some(CallerStorage::Single(&mut **c));
                    state.value = Some(VariableValue::CallerSingle);
                    state.tot_initialized = n;
                }
                (Interface::Mutable, Param::VectorMutable(c)) => {
                    state.caller_storage =
                        Some(CallerStorage::Vector(&mut **c));
                    state.value = Some(VariableValue::CallerVector);
                    state.tot_initialized = n;
                }
                (i, p) => panic!(
                    "{v} is an {i:?} parameter, got {:?}",
                    p.param_type()
                ),
            }
        }
    }

    /// Checks parameter post-conditions once every index has returned, and
    /// copies output and mutable values into the caller's buffers
    ///
    /// # Panics
    /// If an input is still initialized, or an output or mutable parameter is
    /// not fully initialized
    pub fn ensure_params_finished(&mut self) {
        let procedure = self.procedure;
        for &(interface, v) in procedure.params() {
            let ty = procedure.variable(v).data_type();
            let state = &mut self.states[v];
            match interface {
                Interface::Input => assert_eq!(
                    state.tot_initialized, 0,
                    "input {v} was not destructed"
                ),
                Interface::Output | Interface::Mutable => {
                    assert!(
                        state.is_fully_initialized(self.full_mask),
                        "{interface:?} {v} is not fully initialized"
                    );
                    state.ensure_is_mutable(self.full_mask, ty, &mut self.pool)
                }
            }
        }
    }

    /// Calls a function over `mask`, with one variable (or `None`) per
    /// parameter
    ///
    /// If the mask covers every index, the function doesn't depend on its
    /// context, and every variable holds one value, the function is called
    /// once with a one-index mask.
    pub fn call_function(
        &mut self,
        function: &dyn MultiFunction,
        vars: &[Option<VariableId>],
        mask: &IndexMask,
        context: &Context,
    ) {
        let sig = function.signature();
        let full_mask = self.full_mask;
        let as_one = mask.len() == full_mask.len()
            && !function.depends_on_context()
            && vars.iter().flatten().all(|v| self.states[*v].is_one());

        // Written variables are moved out while the parameters are built, so
        // that inputs can borrow the remaining states
        let written = |p: &ParamInfo, v: &Option<VariableId>| {
            v.filter(|_| p.ty.is_output_or_mutable())
        };
        let mut taken: Vec<VariableState<'a>> = sig
            .params()
            .iter()
            .zip(vars)
            .filter_map(|(p, v)| written(p, v))
            .map(|v| std::mem::take(&mut self.states[v]))
            .collect();

        {
            let one = IndexMask::new(1);
            let call_mask = if as_one { &one } else { mask };
            let n = call_mask.min_array_size();
            let states = &self.states;
            let pool = &mut self.pool;
            let mut params = Params::with_capacity(vars.len());
            let mut taken = taken.iter_mut();
            for (p, v) in sig.params().iter().zip(vars) {
                let ty = p.ty.data_type;
                match (p.ty.interface, v) {
                    (Interface::Input, Some(v)) => {
                        if as_one {
                            states[*v].add_as_input_one(&mut params, ty)
                        } else {
                            states[*v].add_as_input(&mut params, ty)
                        }
                    }
                    (Interface::Output, None) => match ty {
                        DataType::Single(t) => params
                            .add_ignored_single_output(t, n),
                        DataType::Vector(t) => params
                            .add_ignored_vector_output(t, n),
                    },
                    (Interface::Output, Some(_)) => {
                        let s = taken.next().unwrap_or_else(|| unreachable!());
                        if as_one {
                            s.add_as_output_one(&mut params, mask, ty, pool)
                        } else {
                            s.add_as_output(
                                &mut params,
                                mask,
                                full_mask,
                                ty,
                                pool,
                            )
                        }
                    }
                    (Interface::Mutable, Some(_)) => {
                        let s = taken.next().unwrap_or_else(|| unreachable!());
                        if as_one {
                            s.add_as_mutable_one(&mut params, ty, pool)
                        } else {
                            s.add_as_mutable(
                                &mut params,
                                mask,
                                full_mask,
                                ty,
                                pool,
                            )
                        }
                    }
                    (i, None) => {
                        panic!("{i:?} parameter of {} is unbound", sig.name())
                    }
                }
            }
            function.call(call_mask, &mut params, context);
        }

        let mut taken = taken.drain(..);
        for (p, v) in sig.params().iter().zip(vars) {
            if let Some(v) = written(p, v) {
                self.states[v] = taken.next().unwrap_or_default();
            }
        }
    }

    /// Splits `mask` by the value of a boolean variable
    ///
    /// Returns `[false_indices, true_indices]`.
    pub fn split(
        &self,
        condition: VariableId,
        mask: &IndexMask,
    ) -> [Vec<usize>; 2] {
        let view = self.states[condition].single_input().typed::<bool>();
        indices_split(mask, |i| view.get(i))
    }

    /// Destructs a variable over `mask`, releasing its value if no index
    /// remains initialized
    pub fn destruct(&mut self, v: VariableId, mask: &IndexMask) {
        let ty = self.procedure.variable(v).data_type();
        let state = &mut self.states[v];
        if state.destruct(mask, self.full_mask, ty, &mut self.pool) {
            if let Some(value) = state.value.take() {
                value.release(&mut self.pool);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::ElementType;

    const INT: DataType = DataType::Single(ElementType::Int);
    const INTS: DataType = DataType::Vector(ElementType::Int);

    #[test]
    fn one_value_lifecycle() {
        let mut pool = BufferPool::new();
        let full = IndexMask::new(4);
        let mut s = VariableState::default();
        assert!(s.is_one());
        assert!(s.is_fully_uninitialized(&full, &full));

        {
            let mut params = Params::new();
            s.add_as_output_one(&mut params, &full, INT, &mut pool);
            params.single_output::<i32>(0)[0] = 7;
        }
        assert!(s.is_one());
        assert!(s.is_fully_initialized(&full));
        assert_eq!(s.single_input().typed::<i32>().get(3), 7);

        // Destructing part of the range forces a per-index buffer
        let lo = IndexMask::range(0..2);
        assert!(!s.destruct(&lo, &full, INT, &mut pool));
        assert!(!s.is_one());
        assert_eq!(s.tot_initialized(), 2);
        {
            let mut params = Params::new();
            s.add_as_output(&mut params, &lo, &full, INT, &mut pool);
            params.single_output::<i32>(0)[..2].copy_from_slice(&[1, 2]);
        }
        assert!(!s.is_one());
        let v = s.single_input().typed::<i32>();
        assert_eq!((0..4).map(|i| v.get(i)).collect::<Vec<_>>(), [1, 2, 7, 7]);

        assert!(!s.destruct(&lo, &full, INT, &mut pool));
        assert!(s.destruct(&IndexMask::range(2..4), &full, INT, &mut pool));
        assert_eq!(s.tot_initialized(), 0);
    }

    #[test]
    fn copy_into_caller_storage() {
        let mut pool = BufferPool::new();
        let full = IndexMask::new(3);
        let mut out = VectorColumn::new(ElementType::Int, 3);
        {
            let mut s = VariableState {
                caller_storage: Some(CallerStorage::Vector(&mut out)),
                ..Default::default()
            };
            {
                let mut params = Params::new();
                s.add_as_output_one(&mut params, &full, INTS, &mut pool);
                params.vector_output::<i32>(0)[0].extend([4, 5]);
            }
            s.ensure_is_mutable(&full, INTS, &mut pool);
            assert!(!s.is_one());
            // One-value buffer goes back to the pool
            assert_eq!(pool.spare_vectors(), 1);
            let one = IndexMask::from_indices(vec![1]);
            assert!(!s.destruct(&one, &full, INTS, &mut pool));
        }
        assert_eq!(out.get::<i32>(0), &[4, 5]);
        assert_eq!(out.get::<i32>(1), &[] as &[i32]);
        assert_eq!(out.get::<i32>(2), &[4, 5]);
    }

    #[test]
    fn mutable_input_is_copied() {
        let mut pool = BufferPool::new();
        let full = IndexMask::new(3);
        let data = Column::from(vec![1i32, 2, 3]);
        let mut s = VariableState {
            value: Some(VariableValue::InputSingle(VArray::Span(&data))),
            tot_initialized: 3,
            caller_storage: None,
        };
        assert!(!s.is_one());
        {
            let mut params = Params::new();
            s.add_as_mutable(&mut params, &full, &full, INT, &mut pool);
            params.single_mutable::<i32>(0)[1] = 20;
        }
        assert_eq!(data.as_slice::<i32>(), &[1, 2, 3]);
        assert_eq!(s.single_input().typed::<i32>().get(1), 20);
        assert!(s.destruct(&full, &full, INT, &mut pool));
    }

    fn lists(s: &VariableState<'_>, n: usize) -> Vec<Vec<i32>> {
        let v = s.vector_input().typed::<i32>();
        (0..n).map(|i| v.get(i).to_vec()).collect()
    }

    #[test]
    fn partial_destruct_of_one_vector() {
        let mut pool = BufferPool::new();
        let full = IndexMask::new(5);
        let mut s = VariableState::default();
        {
            let mut params = Params::new();
            s.add_as_output_one(&mut params, &full, INTS, &mut pool);
            params.vector_output::<i32>(0)[0].push(1);
        }

        let odd = IndexMask::from_indices(vec![0, 2, 4]);
        assert!(!s.destruct(&odd, &full, INTS, &mut pool));
        assert!(!s.is_one());
        assert_eq!(lists(&s, 5), [vec![], vec![1], vec![], vec![1], vec![]]);

        // Rewriting the destructed indices doesn't see the old lists
        {
            let mut params = Params::new();
            s.add_as_output(&mut params, &odd, &full, INTS, &mut pool);
            for i in &odd {
                params.vector_output::<i32>(0)[i].push(2);
            }
        }
        assert_eq!(s.tot_initialized(), 5);
        assert_eq!(lists(&s, 5), [vec![2], vec![1], vec![2], vec![1], vec![2]]);
    }

    #[test]
    fn partial_mutate_then_destruct_of_one_vector() {
        let mut pool = BufferPool::new();
        let full = IndexMask::new(3);
        let mut out = VectorColumn::new(ElementType::Int, 3);
        {
            let mut s = VariableState {
                caller_storage: Some(CallerStorage::Vector(&mut out)),
                ..Default::default()
            };
            {
                let mut params = Params::new();
                s.add_as_output_one(&mut params, &full, INTS, &mut pool);
                params.vector_output::<i32>(0)[0].push(1);
            }
            let tail = IndexMask::range(1..3);
            {
                let mut params = Params::new();
                s.add_as_mutable(&mut params, &tail, &full, INTS, &mut pool);
                for i in &tail {
                    params.vector_mutable::<i32>(0)[i].push(9);
                }
            }
            let mid = IndexMask::from_indices(vec![1]);
            assert!(!s.destruct(&mid, &full, INTS, &mut pool));
            assert_eq!(s.tot_initialized(), 2);
        }
        assert_eq!(out.get::<i32>(0), &[1]);
        assert_eq!(out.get::<i32>(1), &[] as &[i32]);
        assert_eq!(out.get::<i32>(2), &[1, 9]);
    }

    #[test]
    fn partial_destruct_of_vector_input() {
        let mut pool = BufferPool::new();
        let full = IndexMask::new(2);
        let data = VectorColumn::from(vec![vec![3i32]]);
        let value = VariableValue::InputVector(VVectorArray::single(&data));
        let mut s = VariableState {
            value: Some(value),
            tot_initialized: 2,
            caller_storage: None,
        };
        let first = IndexMask::from_indices(vec![0]);
        assert!(!s.destruct(&first, &full, INTS, &mut pool));
        assert_eq!(lists(&s, 2), [vec![], vec![3]]);
        assert_eq!(data.get::<i32>(0), &[3]);
    }
}
