use std::path::{Path, PathBuf};

use utf8_chars::BufReadCharsExt;

use crate::{
    backend::prelude::Backend,
    codegen::prelude::Evaluator,
    lexer::prelude::{scan, Token},
    parser::prelude::{parse_tokens, OperatorTable, Parsed},
    utils::prelude::{Error, Outcome},
};

/// Name used in diagnostics for input that doesn't come from a file.
pub const INTERACTIVE: &str = "<repl>";

/// Everything that outlives a single batch: the operator table and the
/// evaluator with its registry.
pub struct Session<B: Backend> {
    path: PathBuf,
    operators: OperatorTable,
    evaluator: Evaluator<B>,
}

impl<B: Backend> Session<B> {
    pub fn new(backend: B) -> Self {
        Self {
            path: PathBuf::from(INTERACTIVE),
            operators: OperatorTable::new(),
            evaluator: Evaluator::new(backend),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_listing(mut self, keep: bool) -> Self {
        self.evaluator = self.evaluator.with_listing(keep);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    pub fn evaluator(&self) -> &Evaluator<B> {
        &self.evaluator
    }

    pub fn lex(&self, src: &str) -> Result<Vec<Token>, Error> {
        scan(src).map_err(|error| Error::Lex {
            path: self.path.clone(),
            src: src.to_string(),
            error,
        })
    }

    /// Parses one batch; operators it declares stay visible to later batches.
    pub fn parse(&mut self, src: &str) -> Result<Parsed, Error> {
        let tokens = self.lex(src)?;

        Ok(parse_tokens(tokens, &mut self.operators))
    }

    /// Parses, lowers and runs `src` as one batch.
    ///
    /// Values of the top-level expressions come back in source order. Every
    /// error is reported, the forms it didn't touch still run.
    pub fn run(&mut self, src: &str) -> Outcome<Vec<f64>, Vec<Error>> {
        match self.parse(src) {
            Ok(parsed) => self.run_parsed(src, parsed),
            Err(err) => Outcome::PartialFailure(vec![], vec![err]),
        }
    }

    /// Same as [`Session::run`] for a batch already parsed from `src`.
    pub fn run_parsed(&mut self, src: &str, parsed: Parsed) -> Outcome<Vec<f64>, Vec<Error>> {
        let mut errors = parsed.errors.into_iter()
            .map(|error| Error::Parse {
                path: self.path.clone(),
                src: src.to_string(),
                error,
            })
            .collect::<Vec<Error>>();

        let values = match self.evaluator.run_batch(&parsed.forms) {
            Outcome::Ok(values) => values,
            Outcome::PartialFailure(values, form_errors) => {
                errors.extend(form_errors.into_iter().map(|error| Error::Codegen {
                    path: self.path.clone(),
                    src: src.to_string(),
                    error,
                }));

                values
            },
        };

        if errors.is_empty() {
            Outcome::Ok(values)
        } else {
            Outcome::PartialFailure(values, errors)
        }
    }
}

/// Reads a whole source file as UTF-8.
pub fn read_source(path: &Path) -> Result<String, Error> {
    let file = std::fs::File::open(path)
        .map_err(|err| Error::StdIo { err: err.kind() })?;

    let file_size = file.metadata()
        .map_err(|err| Error::StdIo { err: err.kind() })?.len() as usize;

    let mut src = String::with_capacity(file_size);
    let mut reader = std::io::BufReader::new(file);

    for ch in reader.chars() {
        let ch = ch.map_err(|err| Error::StdIo { err: err.kind() })?;
        src.push(ch);
    }

    Ok(src)
}
