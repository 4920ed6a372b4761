pub mod ir;
pub mod machine;

pub mod prelude {
    pub use super::{
        ir::*,
        machine::*
    };
}

#[cfg(test)]
mod tests;
