pub mod error;
pub mod parser;
pub mod ast;
pub mod visitor;

pub mod prelude {
    pub use super::{
        error::*,
        parser::*,
        ast::*,
        visitor::*
    };
}

#[cfg(test)]
mod tests;
