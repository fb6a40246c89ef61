use super::{
    Instruction, InstructionId, InstructionScheduler, Procedure, VariableStates,
};
use crate::{
    Context, Error, IndexMask, MultiFunction, Params,
    function::{ParamType, Signature},
};
use log::{debug, trace};
use std::sync::Arc;

/// Executes a [`Procedure`] as a single multi-function
///
/// The executor's parameters are the procedure's parameters, in order.  Every
/// index in the mask starts at the entry instruction; branches split the
/// indices, and each set is evaluated separately until it reaches a
/// `Return`.
pub struct ProcedureExecutor {
    procedure: Arc<Procedure>,
    signature: Signature,
    depends_on_context: bool,
}

impl ProcedureExecutor {
    /// Validates a procedure and builds an executor for it
    pub fn new(procedure: Arc<Procedure>) -> Result<Self, Error> {
        procedure.validate()?;
        let mut signature = Signature::new("Procedure");
        for &(interface, v) in procedure.params() {
            let var = procedure.variable(v);
            let ty = ParamType::new(interface, var.data_type());
            signature.push(var.name(), ty);
        }
        let depends_on_context = procedure.instructions().any(|(_, i)| {
            matches!(i, Instruction::Call { function, .. }
                if function.depends_on_context())
        });
        Ok(Self {
            procedure,
            signature,
            depends_on_context,
        })
    }

    /// Returns the procedure being executed
    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }
}

/// Unwraps an instruction's successor, which is checked by validation
fn successor(id: InstructionId, next: Option<InstructionId>) -> InstructionId {
    next.unwrap_or_else(|| panic!("{id} has no successor"))
}

impl MultiFunction for ProcedureExecutor {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, ctx: &Context) {
        if mask.is_empty() {
            return;
        }
        debug_assert_eq!(params.check(&self.signature), Ok(()));
        debug!(
            "executing procedure with {} instructions over {} indices",
            self.procedure.instruction_count(),
            mask.len()
        );

        let procedure = &*self.procedure;
        let mut states = VariableStates::new(procedure, mask);
        states.add_initial_variable_states(params.iter_mut());

        let mut scheduler = InstructionScheduler::new();
        let entry = procedure.entry().unwrap_or_else(|| unreachable!());
        scheduler.add_referenced_indices(entry, mask);

        while let Some((id, indices)) = scheduler.pop_next() {
            trace!("{id} over {} indices", indices.len());
            match procedure.instruction(id) {
                Instruction::Call {
                    function,
                    params,
                    next,
                } => {
                    states.call_function(&**function, params, &indices, ctx);
                    scheduler.add(successor(id, *next), indices);
                }
                Instruction::Branch {
                    condition,
                    branch_true,
                    branch_false,
                } => {
                    let [f, t] = states.split(*condition, &indices);
                    let (bt, bf) = (*branch_true, *branch_false);
                    scheduler.add_owned_indices(successor(id, bt), t);
                    scheduler.add_owned_indices(successor(id, bf), f);
                }
                Instruction::Destruct { variable, next } => {
                    states.destruct(*variable, &indices);
                    scheduler.add(successor(id, *next), indices);
                }
                Instruction::Dummy { next } => {
                    scheduler.add(successor(id, *next), indices);
                }
                Instruction::Return => (),
            }
        }

        states.ensure_params_finished();
        debug_assert_eq!(states.owned_values(), 0);
        trace!(
            "procedure execution allocated {} buffers",
            states.pool().allocated()
        );
    }

    fn depends_on_context(&self) -> bool {
        self.depends_on_context
    }
}
