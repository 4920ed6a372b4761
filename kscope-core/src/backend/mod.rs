pub mod vm;
#[cfg(feature = "compiler")]
pub mod llvm;

use std::fmt::Debug;

use thiserror::Error;

pub mod prelude {
    pub use super::{
        ArithOp,
        Backend,
        BackendError,
        CompareOp,
        vm::prelude::*,
    };

    #[cfg(feature = "compiler")]
    pub use super::llvm::*;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
}

/// Comparisons produce `1.0` or `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    LessThan,
    Equal,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("no compilation unit is open")]
    NoUnit,
    #[error("the builder is not positioned inside a function")]
    NoInsertionPoint,
    #[error("function `{name}` has no parameter #{index}")]
    MissingParameter {
        name: String,
        index: usize,
    },
    #[error("unresolved external symbol `{name}`")]
    UnresolvedSymbol {
        name: String,
    },
    #[error("maximum call depth of {limit} exceeded")]
    CallDepthExceeded {
        limit: usize,
    },
    #[error("block `{block}` of `{function}` has no terminator")]
    UnterminatedBlock {
        function: String,
        block: String,
    },
    #[error("invalid {what} handle")]
    InvalidHandle {
        what: &'static str,
    },
    #[error("LLVM: {message}")]
    Llvm {
        message: String,
    },
}

/// Code generation target of the evaluator.
///
/// A backend owns at most one compilation unit at a time. Every value is a
/// double, so functions are described by their parameter count alone.
pub trait Backend {
    type Function: Copy + PartialEq + Debug;
    type Block: Copy + PartialEq + Debug;
    type Value: Copy + Debug;
    type Slot: Copy + Debug;

    fn begin_unit(&mut self, name: &str) -> Result<(), BackendError>;
    /// Releases the current unit. Does nothing when none is open.
    fn dispose_unit(&mut self);

    fn declare_function(&mut self, name: &str, parameters: &[String]) -> Result<Self::Function, BackendError>;
    fn get_function(&self, name: &str) -> Option<Self::Function>;
    fn has_body(&self, function: Self::Function) -> bool;
    fn parameter_count(&self, function: Self::Function) -> usize;
    fn parameter(&self, function: Self::Function, index: usize) -> Result<Self::Value, BackendError>;
    /// Drops the body of `function`, leaving a bare declaration.
    fn discard_body(&mut self, function: Self::Function);
    /// Removes a bodyless declaration nothing calls. Returns `false` and
    /// keeps the function otherwise.
    fn forget_function(&mut self, function: Self::Function) -> bool;

    fn append_block(&mut self, function: Self::Function, name: &str) -> Result<Self::Block, BackendError>;
    fn position_at_end(&mut self, block: Self::Block);
    fn insert_block(&self) -> Option<Self::Block>;
    fn current_function(&self) -> Option<Self::Function>;

    fn const_number(&mut self, value: f64) -> Self::Value;
    fn build_arith(&mut self, op: ArithOp, lhs: Self::Value, rhs: Self::Value) -> Result<Self::Value, BackendError>;
    fn build_compare(&mut self, op: CompareOp, lhs: Self::Value, rhs: Self::Value) -> Result<Self::Value, BackendError>;
    /// `value != 0.0`, as a branch condition.
    fn build_truth_test(&mut self, value: Self::Value) -> Result<Self::Value, BackendError>;

    /// Allocates a slot in the entry block of `function`.
    fn build_slot(&mut self, function: Self::Function, name: &str) -> Result<Self::Slot, BackendError>;
    fn build_load(&mut self, slot: Self::Slot, name: &str) -> Result<Self::Value, BackendError>;
    fn build_store(&mut self, slot: Self::Slot, value: Self::Value) -> Result<(), BackendError>;

    fn build_branch(&mut self, target: Self::Block) -> Result<(), BackendError>;
    fn build_conditional_branch(
        &mut self,
        condition: Self::Value,
        then: Self::Block,
        otherwise: Self::Block
    ) -> Result<(), BackendError>;
    fn build_phi(&mut self, incoming: &[(Self::Value, Self::Block)], name: &str) -> Result<Self::Value, BackendError>;
    fn build_call(&mut self, function: Self::Function, arguments: &[Self::Value], name: &str) -> Result<Self::Value, BackendError>;
    fn build_return(&mut self, value: Self::Value) -> Result<(), BackendError>;

    /// Called once the whole batch is lowered, before anything runs.
    fn finish_unit(&mut self) -> Result<(), BackendError>;
    fn execute(&mut self, function: Self::Function) -> Result<f64, BackendError>;

    /// Textual listing of the current unit.
    fn dump(&self) -> String;
}
