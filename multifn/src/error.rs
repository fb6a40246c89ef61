//! Module containing the universal error type
use crate::{
    network::{InputId, NodeId, OutputId},
    procedure::{InstructionId, VariableId},
    types::DataType,
};
use thiserror::Error;

/// Universal error type
///
/// Errors are only reported while building or checking a network or
/// procedure; evaluation itself has no error path, and treats a broken
/// invariant as a bug (i.e. it panics).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Node is not present in this network
    #[error("{0} is not present in this network")]
    BadNode(NodeId),

    /// Input socket is not present in this network
    #[error("{0} is not present in this network")]
    BadInput(InputId),

    /// Output socket is not present in this network
    #[error("{0} is not present in this network")]
    BadOutput(OutputId),

    /// Input socket already has an origin
    #[error("{0} is already linked")]
    AlreadyLinked(InputId),

    /// Socket types do not match
    #[error("type mismatch: expected {expected}, found {actual}")]
    MismatchedTypes {
        /// Expected data type
        expected: DataType,
        /// Actual data type
        actual: DataType,
    },

    /// Input socket is needed for evaluation but has no origin
    #[error("{0} is needed for evaluation but is not linked")]
    UnlinkedInput(InputId),

    /// Dummy output socket is needed for evaluation but no value is provided
    #[error("{0} is needed for evaluation but is not an evaluator input")]
    UnboundInput(OutputId),

    /// Dummy output socket is bound to more than one evaluator input
    #[error("{0} is bound to more than one evaluator input")]
    DuplicateInput(OutputId),

    /// Network contains a cycle through the given node
    #[error("network contains a cycle through {0}")]
    Cycle(NodeId),

    /// Socket does not belong to a dummy node
    #[error("{0} must belong to a dummy node")]
    NotADummy(NodeId),

    /// Parameter list does not match the function signature
    #[error("parameter {index} of `{function}` is invalid")]
    BadParam {
        /// Function name
        function: String,
        /// Parameter index
        index: usize,
    },

    /// Parameter count does not match the function signature
    #[error("`{function}` expects {expected} parameters, found {actual}")]
    BadParamCount {
        /// Function name
        function: String,
        /// Expected parameter count
        expected: usize,
        /// Actual parameter count
        actual: usize,
    },

    /// Variable is not present in this procedure
    #[error("{0} is not present in this procedure")]
    BadVariable(VariableId),

    /// Instruction is not present in this procedure
    #[error("{0} is not present in this procedure")]
    BadInstruction(InstructionId),

    /// Procedure has no entry instruction
    #[error("procedure has no entry instruction")]
    NoEntry,

    /// Instruction is missing a successor
    #[error("{0} is missing a successor")]
    MissingSuccessor(InstructionId),

    /// Variable is bound to more than one output or mutable parameter of a
    /// single call, or to such a parameter and an input
    #[error("{variable} is used more than once by {instruction}")]
    VariableReused {
        /// Call instruction
        instruction: InstructionId,
        /// Variable used more than once
        variable: VariableId,
    },

    /// Variable is used as more than one procedure parameter
    #[error("{0} is used as more than one procedure parameter")]
    DuplicateParameter(VariableId),

    /// Branch condition is not a single boolean
    #[error("condition {0} of a branch must be a single bool")]
    BadCondition(VariableId),

    /// Variable may be uninitialized where it must be initialized
    #[error("{variable} may be uninitialized at {instruction}")]
    MaybeUninitialized {
        /// Instruction reading the variable
        instruction: InstructionId,
        /// Variable which may be uninitialized
        variable: VariableId,
    },

    /// Variable may be initialized where it must be uninitialized
    #[error("{variable} may already be initialized at {instruction}")]
    MaybeInitialized {
        /// Instruction writing (or returning) the variable
        instruction: InstructionId,
        /// Variable which may be initialized
        variable: VariableId,
    },
}
