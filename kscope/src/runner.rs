use std::{path::Path, time::Instant};

use kscope_core::{
    backend::prelude::Backend,
    session::{read_source, Session},
};

use crate::cli::{print_errors, print_finished, print_listing, print_parsed, print_running};

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub dump_unit: bool,
    pub print_ast: bool,
}

/// Runs a whole file as one batch. Returns whether everything succeeded.
pub fn run_file<B: Backend>(session: Session<B>, path: &Path, options: Options) -> bool {
    print_running(&path.display().to_string());
    let start = Instant::now();

    let src = match read_source(path) {
        Ok(src) => src,
        Err(err) => {
            print_errors(&[err]);
            return false;
        }
    };

    let mut session = session.with_path(path);
    let succeeded = evaluate(&mut session, &src, options);

    print_finished(start.elapsed());

    succeeded
}

/// Evaluates one batch, printing values to stdout and errors to stderr.
pub fn evaluate<B: Backend>(session: &mut Session<B>, src: &str, options: Options) -> bool {
    let parsed = match session.parse(src) {
        Ok(parsed) => parsed,
        Err(err) => {
            print_errors(&[err]);
            return false;
        }
    };

    if options.print_ast {
        print_parsed(parsed.forms.len());

        for form in &parsed.forms {
            println!("{form:#?}");
        }
    }

    let outcome = session.run_parsed(src, parsed);

    if options.dump_unit {
        if let Some(listing) = session.evaluator().last_listing() {
            print_listing(listing);
        }
    }

    let (values, errors) = outcome.into_parts();

    for value in values {
        println!("> {value}");
    }

    match errors {
        Some(errors) => {
            print_errors(&errors);
            false
        },
        None => true,
    }
}
