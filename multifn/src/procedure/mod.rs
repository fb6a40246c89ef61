//! Procedures: multi-function calls with explicit control flow
//!
//! A [`Procedure`] is a list of instructions operating on a set of variables.
//! Unlike a [`Network`](crate::Network), a procedure may branch: each index in
//! the mask follows its own path through the instructions, and indices which
//! take the same path are evaluated together.
//!
//! ```
//! use multifn::{
//!     Context, IndexMask, MultiFunction, Params, Procedure, ProcedureExecutor,
//!     function::{Constant, Interface},
//!     types::{Column, DataType, ElementType, VArray},
//! };
//! use std::sync::Arc;
//!
//! // out = cond ? 1 : 2
//! let mut p = Procedure::new();
//! let cond = p.new_variable(DataType::Single(ElementType::Bool), "cond");
//! let out = p.new_variable(DataType::Single(ElementType::Int), "out");
//! p.add_parameter(Interface::Input, cond);
//! p.add_parameter(Interface::Output, out);
//!
//! let branch = p.new_branch(cond);
//! let [t, f] = [1, 2].map(|v| {
//!     let d = p.new_destruct(cond);
//!     let c = p.new_call(Arc::new(Constant::new(v)), vec![Some(out)]);
//!     let r = p.new_return();
//!     p.set_next(d, c).unwrap();
//!     p.set_next(c, r).unwrap();
//!     d
//! });
//! p.set_branch_true(branch, t).unwrap();
//! p.set_branch_false(branch, f).unwrap();
//! p.set_entry(branch);
//!
//! let exec = ProcedureExecutor::new(Arc::new(p)).unwrap();
//!
//! let c = Column::from(vec![true, false, true]);
//! let mut o = Column::new(ElementType::Int, 3);
//! let mut params = Params::new();
//! params.add_readonly_single_input(VArray::Span(&c));
//! params.add_uninitialized_single_output(&mut o);
//! exec.call(&IndexMask::new(3), &mut params, &Context::new());
//! drop(params);
//!
//! assert_eq!(o.as_slice::<i32>(), &[1, 2, 1]);
//! ```
use crate::{
    Error, MultiFunction,
    function::Interface,
    index::{Index, IndexVec, define_index},
    types::{DataType, ElementType},
};
use arrayvec::ArrayVec;
use std::sync::Arc;

mod eval;
mod scheduler;
mod state;

pub use eval::ProcedureExecutor;
pub use scheduler::{InstructionIndices, InstructionScheduler};
pub use state::{VariableState, VariableStates};

define_index!(VariableId, "Index of a variable in a [`Procedure`]");
define_index!(InstructionId, "Index of an instruction in a [`Procedure`]");

/// A named slot with a fixed data type
#[derive(Clone, Debug)]
pub struct Variable {
    name: String,
    data_type: DataType,
}

impl Variable {
    /// Returns the variable's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the variable's data type
    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

/// A single step of a [`Procedure`]
#[derive(Clone)]
pub enum Instruction {
    /// Calls a multi-function
    Call {
        /// Function to call
        function: Arc<dyn MultiFunction>,
        /// Variable bound to each parameter, or `None` for an ignored output
        params: Vec<Option<VariableId>>,
        /// Successor
        next: Option<InstructionId>,
    },
    /// Splits indices by a boolean condition
    Branch {
        /// Variable of type `Single(Bool)`
        condition: VariableId,
        /// Successor for indices where the condition is `true`
        branch_true: Option<InstructionId>,
        /// Successor for indices where the condition is `false`
        branch_false: Option<InstructionId>,
    },
    /// Marks a variable as uninitialized
    Destruct {
        /// Variable to destruct
        variable: VariableId,
        /// Successor
        next: Option<InstructionId>,
    },
    /// Does nothing
    Dummy {
        /// Successor
        next: Option<InstructionId>,
    },
    /// Finishes evaluation for the current indices
    Return,
}

impl Instruction {
    /// Returns every successor which has been set
    pub fn successors(&self) -> ArrayVec<InstructionId, 2> {
        let mut out = ArrayVec::new();
        match self {
            Instruction::Call { next, .. }
            | Instruction::Destruct { next, .. }
            | Instruction::Dummy { next } => out.extend(*next),
            Instruction::Branch {
                branch_true,
                branch_false,
                ..
            } => {
                out.extend(*branch_true);
                out.extend(*branch_false);
            }
            Instruction::Return => (),
        }
        out
    }

    /// Returns the number of successors that this instruction needs
    fn successor_count(&self) -> usize {
        match self {
            Instruction::Call { .. }
            | Instruction::Destruct { .. }
            | Instruction::Dummy { .. } => 1,
            Instruction::Branch { .. } => 2,
            Instruction::Return => 0,
        }
    }
}

/// Initialization state of a variable, merged over every path reaching an
/// instruction
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct InitState {
    can_be_initialized: bool,
    can_be_uninitialized: bool,
}

impl InitState {
    const INITIALIZED: Self = Self {
        can_be_initialized: true,
        can_be_uninitialized: false,
    };
    const UNINITIALIZED: Self = Self {
        can_be_initialized: false,
        can_be_uninitialized: true,
    };

    fn merge(self, other: Self) -> Self {
        Self {
            can_be_initialized: self.can_be_initialized
                || other.can_be_initialized,
            can_be_uninitialized: self.can_be_uninitialized
                || other.can_be_uninitialized,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// A list of instructions operating on a set of variables
///
/// Procedures are built incrementally, then checked with
/// [`validate`](Procedure::validate) (which is also called by
/// [`ProcedureExecutor::new`]).
#[derive(Clone, Default)]
pub struct Procedure {
    variables: IndexVec<Variable, VariableId>,
    instructions: IndexVec<Instruction, InstructionId>,
    params: Vec<(Interface, VariableId)>,
    entry: Option<InstructionId>,
}

impl Procedure {
    /// Builds a new empty procedure
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable
    pub fn new_variable(
        &mut self,
        data_type: DataType,
        name: impl Into<String>,
    ) -> VariableId {
        self.variables.push(Variable {
            name: name.into(),
            data_type,
        })
    }

    /// Adds a call instruction, with one variable (or `None`) per parameter
    pub fn new_call(
        &mut self,
        function: Arc<dyn MultiFunction>,
        params: Vec<Option<VariableId>>,
    ) -> InstructionId {
        self.instructions.push(Instruction::Call {
            function,
            params,
            next: None,
        })
    }

    /// Adds a branch instruction
    pub fn new_branch(&mut self, condition: VariableId) -> InstructionId {
        self.instructions.push(Instruction::Branch {
            condition,
            branch_true: None,
            branch_false: None,
        })
    }

    /// Adds a destruct instruction
    pub fn new_destruct(&mut self, variable: VariableId) -> InstructionId {
        self.instructions.push(Instruction::Destruct {
            variable,
            next: None,
        })
    }

    /// Adds a dummy instruction
    pub fn new_dummy(&mut self) -> InstructionId {
        self.instructions.push(Instruction::Dummy { next: None })
    }

    /// Adds a return instruction
    pub fn new_return(&mut self) -> InstructionId {
        self.instructions.push(Instruction::Return)
    }

    /// Sets the successor of a call, destruct, or dummy instruction
    pub fn set_next(
        &mut self,
        id: InstructionId,
        to: InstructionId,
    ) -> Result<(), Error> {
        match self.instructions.get_mut(id) {
            Some(
                Instruction::Call { next, .. }
                | Instruction::Destruct { next, .. }
                | Instruction::Dummy { next },
            ) => {
                *next = Some(to);
                Ok(())
            }
            _ => Err(Error::BadInstruction(id)),
        }
    }

    /// Sets the `true` successor of a branch instruction
    pub fn set_branch_true(
        &mut self,
        id: InstructionId,
        to: InstructionId,
    ) -> Result<(), Error> {
        match self.instructions.get_mut(id) {
            Some(Instruction::Branch { branch_true, .. }) => {
                *branch_true = Some(to);
                Ok(())
            }
            _ => Err(Error::BadInstruction(id)),
        }
    }

    /// Sets the `false` successor of a branch instruction
    pub fn set_branch_false(
        &mut self,
        id: InstructionId,
        to: InstructionId,
    ) -> Result<(), Error> {
        match self.instructions.get_mut(id) {
            Some(Instruction::Branch { branch_false, .. }) => {
                *branch_false = Some(to);
                Ok(())
            }
            _ => Err(Error::BadInstruction(id)),
        }
    }

    /// Adds a procedure parameter
    ///
    /// Parameters are passed to the [`ProcedureExecutor`] in the order in
    /// which they are added.
    pub fn add_parameter(
        &mut self,
        interface: Interface,
        variable: VariableId,
    ) {
        self.params.push((interface, variable));
    }

    /// Sets the first instruction
    pub fn set_entry(&mut self, id: InstructionId) {
        self.entry = Some(id);
    }

    /// Returns the first instruction
    pub fn entry(&self) -> Option<InstructionId> {
        self.entry
    }

    /// Returns the procedure parameters, in order
    pub fn params(&self) -> &[(Interface, VariableId)] {
        &self.params
    }

    /// Looks up a variable
    ///
    /// # Panics
    /// If the variable is not in this procedure
    pub fn variable(&self, v: VariableId) -> &Variable {
        &self.variables[v]
    }

    /// Looks up an instruction
    ///
    /// # Panics
    /// If the instruction is not in this procedure
    pub fn instruction(&self, i: InstructionId) -> &Instruction {
        &self.instructions[i]
    }

    /// Returns the number of variables
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Returns the number of instructions
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Iterates over every instruction
    pub fn instructions(
        &self,
    ) -> impl Iterator<Item = (InstructionId, &Instruction)> {
        self.instructions.enumerate()
    }

    fn check_variable(&self, v: VariableId) -> Result<&Variable, Error> {
        self.variables.get(v).ok_or(Error::BadVariable(v))
    }

    /// Checks that the procedure can be executed
    ///
    /// In addition to the structure of the procedure (successors, parameter
    /// types, and so on), this checks that every variable is initialized
    /// where it's read and uninitialized where it's written, along every
    /// possible path; that at every `Return`, outputs and mutable parameters
    /// are initialized; and that every other variable has been destructed.
    pub fn validate(&self) -> Result<(), Error> {
        let entry = self.entry.ok_or(Error::NoEntry)?;
        if self.instructions.get(entry).is_none() {
            return Err(Error::BadInstruction(entry));
        }

        let mut seen = vec![false; self.variables.len()];
        for &(_, v) in &self.params {
            self.check_variable(v)?;
            if std::mem::replace(&mut seen[v.index()], true) {
                return Err(Error::DuplicateParameter(v));
            }
        }

        for (id, instr) in self.instructions.enumerate() {
            let succ = instr.successors();
            if succ.len() != instr.successor_count() {
                return Err(Error::MissingSuccessor(id));
            }
            if let Some(s) =
                succ.iter().find(|s| self.instructions.get(**s).is_none())
            {
                return Err(Error::BadInstruction(*s));
            }
            match instr {
                Instruction::Call {
                    function, params, ..
                } => self.validate_call(id, function.as_ref(), params)?,
                Instruction::Branch { condition, .. } => {
                    let var = self.check_variable(*condition)?;
                    if var.data_type != DataType::Single(ElementType::Bool) {
                        return Err(Error::BadCondition(*condition));
                    }
                }
                Instruction::Destruct { variable, .. } => {
                    self.check_variable(*variable)?;
                }
                Instruction::Dummy { .. } | Instruction::Return => (),
            }
        }

        self.validate_initialization(entry)
    }

    fn validate_call(
        &self,
        id: InstructionId,
        function: &dyn MultiFunction,
        params: &[Option<VariableId>],
    ) -> Result<(), Error> {
        let sig = function.signature();
        if sig.len() != params.len() {
            return Err(Error::BadParamCount {
                function: sig.name().to_owned(),
                expected: sig.len(),
                actual: params.len(),
            });
        }
        for (i, (p, v)) in sig.params().iter().zip(params).enumerate() {
            let Some(v) = v else {
                if p.ty.interface == Interface::Output {
                    continue;
                } else {
                    return Err(sig.bad_param(i));
                }
            };
            let var = self.check_variable(*v)?;
            if var.data_type != p.ty.data_type {
                return Err(Error::MismatchedTypes {
                    expected: p.ty.data_type,
                    actual: var.data_type,
                });
            }
            // A written variable may not be used by any other parameter
            if p.ty.is_output_or_mutable() {
                let uses = params.iter().filter(|o| **o == Some(*v)).count();
                if uses > 1 {
                    return Err(Error::VariableReused {
                        instruction: id,
                        variable: *v,
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_initialization(
        &self,
        entry: InstructionId,
    ) -> Result<(), Error> {
        let mut initial = vec![InitState::UNINITIALIZED; self.variables.len()];
        for &(i, v) in &self.params {
            if matches!(i, Interface::Input | Interface::Mutable) {
                initial[v.index()] = InitState::INITIALIZED;
            }
        }

        // Forward data-flow to a fixed point, merging states where paths join
        let mut states: IndexVec<Option<Vec<InitState>>, InstructionId> =
            IndexVec::filled(None, self.instructions.len());
        states[entry] = Some(initial);
        let mut todo = vec![entry];
        while let Some(id) = todo.pop() {
            let Some(mut state) = states[id].clone() else {
                continue;
            };
            let instr = &self.instructions[id];
            match instr {
                Instruction::Call {
                    function, params, ..
                } => {
                    let sig = function.signature();
                    for (p, v) in sig.params().iter().zip(params) {
                        if p.ty.interface != Interface::Output {
                            continue;
                        }
                        if let Some(v) = v {
                            state[v.index()] = InitState::INITIALIZED;
                        }
                    }
                }
                Instruction::Destruct { variable, .. } => {
                    state[variable.index()] = InitState::UNINITIALIZED;
                }
                Instruction::Branch { .. }
                | Instruction::Dummy { .. }
                | Instruction::Return => (),
            }
            for s in instr.successors() {
                let next = match &states[s] {
                    None => state.clone(),
                    Some(prev) => {
                        let merged = prev.iter().zip(&state);
                        merged.map(|(a, b)| a.merge(*b)).collect()
                    }
                };
                if states[s].as_ref() != Some(&next) {
                    states[s] = Some(next);
                    todo.push(s);
                }
            }
        }

        let param_kind = |v: VariableId| {
            self.params.iter().find(|(_, p)| *p == v).map(|(i, _)| *i)
        };
        for (id, state) in states.enumerate() {
            let Some(state) = state else {
                continue;
            };
            let uninit = |v: VariableId| {
                if state[v.index()].can_be_uninitialized {
                    Err(Error::MaybeUninitialized {
                        instruction: id,
                        variable: v,
                    })
                } else {
                    Ok(())
                }
            };
            let init = |v: VariableId| {
                if state[v.index()].can_be_initialized {
                    Err(Error::MaybeInitialized {
                        instruction: id,
                        variable: v,
                    })
                } else {
                    Ok(())
                }
            };
            match &self.instructions[id] {
                Instruction::Call {
                    function, params, ..
                } => {
                    let sig = function.signature();
                    for (p, v) in sig.params().iter().zip(params) {
                        let Some(v) = v else { continue };
                        match p.ty.interface {
                            Interface::Input | Interface::Mutable => {
                                uninit(*v)?
                            }
                            Interface::Output => init(*v)?,
                        }
                    }
                }
                Instruction::Branch { condition, .. } => uninit(*condition)?,
                Instruction::Destruct { variable, .. } => uninit(*variable)?,
                Instruction::Dummy { .. } => (),
                Instruction::Return => {
                    for v in self.variables.keys() {
                        match param_kind(v) {
                            Some(Interface::Output | Interface::Mutable) => {
                                uninit(v)?
                            }
                            Some(Interface::Input) | None => init(v)?,
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let var = |v: &VariableId| self.variables[*v].name.clone();
        let next = |n: &Option<InstructionId>| match n {
            Some(n) => n.index().to_string(),
            None => "?".to_owned(),
        };
        for (i, v) in &self.params {
            writeln!(
                f,
                "param {i:?} {}: {}",
                var(v),
                self.variables[*v].data_type
            )?;
        }
        for (id, instr) in self.instructions.enumerate() {
            let marker = if Some(id) == self.entry { ">" } else { " " };
            write!(f, "{marker}{:>3}: ", id.index())?;
            match instr {
                Instruction::Call {
                    function,
                    params,
                    next: n,
                } => {
                    let args = params
                        .iter()
                        .map(|p| p.as_ref().map(&var).unwrap_or("_".to_owned()))
                        .collect::<Vec<_>>();
                    writeln!(
                        f,
                        "call {}({}) -> {}",
                        function.signature().name(),
                        args.join(", "),
                        next(n)
                    )?
                }
                Instruction::Branch {
                    condition,
                    branch_true,
                    branch_false,
                } => writeln!(
                    f,
                    "branch {} ? {} : {}",
                    var(condition),
                    next(branch_true),
                    next(branch_false)
                )?,
                Instruction::Destruct { variable, next: n } => {
                    writeln!(f, "destruct {} -> {}", var(variable), next(n))?
                }
                Instruction::Dummy { next: n } => {
                    writeln!(f, "dummy -> {}", next(n))?
                }
                Instruction::Return => writeln!(f, "return")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::function::{Constant, Mutate, Si2So, SiSo};

    const INT: DataType = DataType::Single(ElementType::Int);
    const BOOL: DataType = DataType::Single(ElementType::Bool);

    /// `out = a + 1`, with `a` destructed before returning
    fn simple() -> (Procedure, InstructionId) {
        let mut p = Procedure::new();
        let a = p.new_variable(INT, "a");
        let out = p.new_variable(INT, "out");
        p.add_parameter(Interface::Input, a);
        p.add_parameter(Interface::Output, out);
        let call = p.new_call(
            Arc::new(SiSo::new("inc", |a: i32| a + 1)),
            vec![Some(a), Some(out)],
        );
        let d = p.new_destruct(a);
        let r = p.new_return();
        p.set_next(call, d).unwrap();
        p.set_next(d, r).unwrap();
        p.set_entry(call);
        (p, d)
    }

    #[test]
    fn valid_procedure() {
        let (p, _) = simple();
        assert_eq!(p.validate(), Ok(()));
        assert_eq!(p.instruction_count(), 3);
        assert_eq!(p.variable_count(), 2);
        let s = p.to_string();
        assert!(s.contains("call inc(a, out) -> 1"));
        assert!(s.contains(">  0:"));
    }

    #[test]
    fn structural_errors() {
        let mut p = Procedure::new();
        assert_eq!(p.validate(), Err(Error::NoEntry));

        let d = p.new_dummy();
        p.set_entry(d);
        assert_eq!(p.validate(), Err(Error::MissingSuccessor(d)));
        let r = p.new_return();
        assert_eq!(p.set_next(r, d), Err(Error::BadInstruction(r)));
        assert_eq!(p.set_branch_true(d, r), Err(Error::BadInstruction(d)));
        p.set_next(d, r).unwrap();
        assert_eq!(p.validate(), Ok(()));

        let i = p.new_variable(INT, "i");
        let b = p.new_branch(i);
        p.set_branch_true(b, r).unwrap();
        assert_eq!(p.validate(), Err(Error::MissingSuccessor(b)));
        p.set_branch_false(b, r).unwrap();
        assert_eq!(p.validate(), Err(Error::BadCondition(i)));
    }

    #[test]
    fn call_errors() {
        let mut p = Procedure::new();
        let a = p.new_variable(INT, "a");
        let b = p.new_variable(BOOL, "b");
        let add = Arc::new(Si2So::new("add", |a: i32, b: i32| a + b));
        let call = p.new_call(add.clone(), vec![Some(a), Some(a)]);
        let r = p.new_return();
        p.set_next(call, r).unwrap();
        p.set_entry(call);
        assert!(matches!(
            p.validate(),
            Err(Error::BadParamCount { expected: 3, .. })
        ));

        p = Procedure::new();
        let a = p.new_variable(INT, "a");
        let _ = p.new_variable(BOOL, "b");
        let call = p.new_call(add.clone(), vec![Some(a), Some(b), Some(a)]);
        let r = p.new_return();
        p.set_next(call, r).unwrap();
        p.set_entry(call);
        assert_eq!(
            p.validate(),
            Err(Error::MismatchedTypes {
                expected: INT,
                actual: BOOL
            })
        );

        // Output bound to the same variable as an input
        p = Procedure::new();
        let a = p.new_variable(INT, "a");
        let call = p.new_call(add.clone(), vec![Some(a), Some(a), Some(a)]);
        let r = p.new_return();
        p.set_next(call, r).unwrap();
        p.set_entry(call);
        assert_eq!(
            p.validate(),
            Err(Error::VariableReused {
                instruction: call,
                variable: a
            })
        );

        // Inputs may repeat, and outputs may be ignored
        p = Procedure::new();
        let a = p.new_variable(INT, "a");
        p.add_parameter(Interface::Input, a);
        let call = p.new_call(add, vec![Some(a), Some(a), None]);
        let d = p.new_destruct(a);
        let r = p.new_return();
        p.set_next(call, d).unwrap();
        p.set_next(d, r).unwrap();
        p.set_entry(call);
        assert_eq!(p.validate(), Ok(()));
        p.add_parameter(Interface::Input, a);
        assert_eq!(p.validate(), Err(Error::DuplicateParameter(a)));
    }

    #[test]
    fn initialization_errors() {
        // Input isn't destructed before returning
        let (mut p, _) = simple();
        let r = p.new_return();
        p.set_next(InstructionId::new(0), r).unwrap();
        assert!(matches!(
            p.validate(),
            Err(Error::MaybeInitialized { instruction, .. }) if instruction == r
        ));

        // Reading a local before it's written
        let mut p = Procedure::new();
        let a = p.new_variable(INT, "a");
        let m = p.new_call(
            Arc::new(Mutate::new("inc", |v: &mut i32| *v += 1)),
            vec![Some(a)],
        );
        let r = p.new_return();
        p.set_next(m, r).unwrap();
        p.set_entry(m);
        assert_eq!(
            p.validate(),
            Err(Error::MaybeUninitialized {
                instruction: m,
                variable: a
            })
        );

        // Output written on only one side of a branch
        let mut p = Procedure::new();
        let cond = p.new_variable(BOOL, "cond");
        let out = p.new_variable(INT, "out");
        p.add_parameter(Interface::Input, cond);
        p.add_parameter(Interface::Output, out);
        let b = p.new_branch(cond);
        let d = p.new_destruct(cond);
        let c = p.new_call(Arc::new(Constant::new(1i32)), vec![Some(out)]);
        let j = p.new_dummy();
        let r = p.new_return();
        p.set_entry(b);
        p.set_branch_true(b, c).unwrap();
        p.set_branch_false(b, j).unwrap();
        p.set_next(c, j).unwrap();
        p.set_next(j, d).unwrap();
        p.set_next(d, r).unwrap();
        assert_eq!(
            p.validate(),
            Err(Error::MaybeUninitialized {
                instruction: r,
                variable: out
            })
        );
    }
}
