pub mod lexer;
pub mod parser;
pub mod codegen;
pub mod backend;
pub mod host;
pub mod session;
pub mod utils;
