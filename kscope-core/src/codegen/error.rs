use thiserror::Error;

use crate::{backend::prelude::BackendError, utils::prelude::SrcSpan};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodegenError {
    #[error("unbound variable `{name}`")]
    UnboundVariable {
        name: String,
        location: SrcSpan,
    },
    #[error("unknown function `{name}`")]
    UnknownFunction {
        name: String,
        location: SrcSpan,
    },
    #[error("`{name}` takes {expected} argument(s) but {found} were supplied")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
        location: SrcSpan,
    },
    #[error("redefinition of `{name}` with a different number of parameters")]
    RedefinitionArity {
        name: String,
        previous: usize,
        found: usize,
        location: SrcSpan,
    },
    #[error("redefinition of function `{name}`")]
    Redefinition {
        name: String,
        location: SrcSpan,
    },
    #[error("destination of `=` must be a variable")]
    AssignToNonVariable {
        location: SrcSpan,
    },
    #[error("parameter `{name}` of `{function}` is declared more than once")]
    DuplicateParameter {
        function: String,
        name: String,
        location: SrcSpan,
    },
    #[error("expected an expression producing a value")]
    ExpectedValue {
        location: SrcSpan,
    },
    #[error("expected a definition or an extern")]
    ExpectedFunction {
        location: SrcSpan,
    },
    /// A definition from an earlier batch failed to lower again at `location`.
    #[error("`{name}` can no longer be lowered: {error}")]
    InDefinition {
        name: String,
        location: SrcSpan,
        error: Box<CodegenError>,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl CodegenError {
    pub fn location(&self) -> Option<SrcSpan> {
        match self {
            Self::UnboundVariable { location, .. }
            | Self::UnknownFunction { location, .. }
            | Self::ArgumentCount { location, .. }
            | Self::RedefinitionArity { location, .. }
            | Self::Redefinition { location, .. }
            | Self::AssignToNonVariable { location }
            | Self::DuplicateParameter { location, .. }
            | Self::ExpectedValue { location }
            | Self::ExpectedFunction { location }
            | Self::InDefinition { location, .. } => Some(*location),
            Self::Backend(_) => None,
        }
    }

    pub fn hint(&self) -> Option<String> {
        match self {
            Self::UnknownFunction { name, .. } if name.starts_with("binary_") || name.starts_with("unary_") => {
                Some("Operators are defined with `def binary` or `def unary`".to_string())
            },
            Self::UnknownFunction { .. } => Some("Declare it with `def` or `extern` first".to_string()),
            Self::RedefinitionArity { previous, .. } => Some(format!("It was declared with {previous} parameter(s)")),
            Self::InDefinition { name, error, .. } => Some(match error.hint() {
                Some(hint) => format!("`{name}` was defined in an earlier input. {hint}"),
                None => format!("`{name}` was defined in an earlier input"),
            }),
            Self::Backend(BackendError::UnresolvedSymbol { .. }) => {
                Some("The host provides only `putchard` and `printd`".to_string())
            },
            _ => None,
        }
    }
}

/// Error of one top-level form; `index` is `None` when the whole unit failed.
#[derive(Debug, Clone, PartialEq)]
pub struct FormError {
    pub index: Option<usize>,
    pub location: Option<SrcSpan>,
    pub error: CodegenError,
}
