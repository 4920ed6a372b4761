mod cli;
mod repl;
mod rlpl;
mod rppl;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
#[cfg(feature = "compiler")]
use inkwell::context::Context;
#[cfg(feature = "compiler")]
use kscope_core::backend::prelude::LlvmBackend;
use kscope_core::{
    backend::prelude::{Backend, VirtualMachine, MAX_CALL_DEPTH},
    session::Session,
};
use runner::Options;

#[derive(Parser)]
#[command(version, about = "Kaleidoscope interpreter")]
struct Cli {
    /// Source file to run, starts the REPL when omitted
    path: Option<PathBuf>,
    /// Backend used to lower and execute code
    #[arg(short, long, value_enum, default_value_t = BackendKind::Vm, global = true)]
    backend: BackendKind,
    /// Print the listing of every unit to stderr
    #[arg(long, default_value_t = false, global = true)]
    dump_unit: bool,
    /// Call depth at which the vm backend gives up
    #[arg(long, default_value_t = MAX_CALL_DEPTH, global = true)]
    max_call_depth: usize,
    /// Print the ast of every batch before running it
    #[arg(long, default_value_t = false, global = true)]
    print_ast: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Runs a source file as a single batch
    Run {
        /// Path of source file
        path: PathBuf,
    },
    /// Runs Read Eval Print Loop
    Repl,
    /// Runs Read Lex Print Loop
    Lex,
    /// Runs Read Parse Print Loop
    Parse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Built-in interpreter of a small SSA-like IR
    Vm,
    /// LLVM JIT, needs the `compiler` feature
    Llvm,
}

/// What to do once a backend is ready.
enum Mode {
    File(PathBuf),
    Repl,
}

fn main() {
    let cli = Cli::parse();

    let options = Options {
        dump_unit: cli.dump_unit,
        print_ast: cli.print_ast,
    };

    let mode = match cli.command {
        Some(Command::Run { path }) => Mode::File(path),
        Some(Command::Repl) => Mode::Repl,
        Some(Command::Lex) => {
            let _ = rlpl::start();
            return;
        },
        Some(Command::Parse) => {
            let _ = rppl::start(options.print_ast);
            return;
        },
        None => match cli.path {
            Some(path) => Mode::File(path),
            None => Mode::Repl,
        },
    };

    let succeeded = match cli.backend {
        BackendKind::Vm => launch(VirtualMachine::new().with_max_call_depth(cli.max_call_depth), mode, options),
        #[cfg(feature = "compiler")]
        BackendKind::Llvm => {
            let context = Context::create();

            match LlvmBackend::new(&context) {
                Ok(backend) => launch(backend, mode, options),
                Err(err) => {
                    cli::print_colourful_prefix("Error", termcolor::Color::Red, &err.to_string());
                    false
                }
            }
        },
        #[cfg(not(feature = "compiler"))]
        BackendKind::Llvm => {
            cli::print_colourful_prefix(
                "Error",
                termcolor::Color::Red,
                "kscope was built without the `compiler` feature",
            );
            false
        },
    };

    if !succeeded {
        std::process::exit(1);
    }
}

fn launch<B: Backend>(backend: B, mode: Mode, options: Options) -> bool {
    let session = Session::new(backend).with_listing(options.dump_unit);

    match mode {
        Mode::File(path) => runner::run_file(session, &path, options),
        Mode::Repl => repl::start(session, options).is_ok(),
    }
}
