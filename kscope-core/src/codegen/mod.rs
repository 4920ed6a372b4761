pub mod context;
pub mod error;
pub mod evaluator;

pub mod prelude {
    pub use super::{
        context::*,
        error::*,
        evaluator::*
    };
}

#[cfg(test)]
mod tests;
