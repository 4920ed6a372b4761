use std::path::PathBuf;

use termcolor::Buffer;
use thiserror::Error;

use crate::{
    backend::prelude::BackendError,
    codegen::prelude::{CodegenError, FormError},
    lexer::prelude::LexicalError,
    parser::prelude::ParseError,
    utils::prelude::SrcSpan,
};
use super::diagnostic::{Diagnostic, Label, Level, Location};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("failed to tokenize source code")]
    Lex {
        path: PathBuf,
        src: String,
        error: LexicalError
    },
    #[error("failed to parse source code")]
    Parse {
        path: PathBuf,
        src: String,
        error: ParseError
    },
    #[error("failed to evaluate source code")]
    Codegen {
        path: PathBuf,
        src: String,
        error: FormError
    },
    #[error("IO operation failed")]
    StdIo {
        err: std::io::ErrorKind
    }
}

impl Error {
    pub fn pretty_string(&self) -> String {
        let mut nocolor = Buffer::no_color();
        self.pretty(&mut nocolor);
        String::from_utf8(nocolor.into_inner()).expect("Error printing produced invalid utf8")
    }

    pub fn pretty(&self, buf: &mut Buffer) {
        use std::io::Write;

        for diagnostic in self.to_diagnostics() {
            diagnostic.write(buf);
            writeln!(buf).expect("write new line diagnostic");
        }
    }

    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            Error::Lex { path, src, error } => {
                let (label, extra) = error.details();

                vec![Diagnostic {
                    title: "Lexical error".into(),
                    text: extra.join("\n"),
                    level: Level::Error,
                    location: Some(Location {
                        src,
                        path: path.clone(),
                        label: Label {
                            text: Some(label.to_string()),
                            span: error.location,
                        },
                        extra_labels: vec![],
                    }),
                }]
            },
            Error::Parse { path, src, error } => {
                let (label, extra) = error.details();
                let text = extra.join("\n");

                let adjusted_location = if error.is_eof() {
                    SrcSpan {
                        start: src.len() as u32,
                        end: src.len() as u32,
                    }
                } else {
                    error.span
                };

                vec![Diagnostic {
                    title: "Syntax error".into(),
                    text,
                    level: Level::Error,
                    location: Some(Location {
                        src,
                        path: path.clone(),
                        label: Label {
                            text: Some(label.to_string()),
                            span: adjusted_location,
                        },
                        extra_labels: vec![],
                    }),
                }]
            },
            Error::Codegen { path, src, error } => {
                let (title, level) = match &error.error {
                    CodegenError::Backend(
                        BackendError::UnresolvedSymbol { .. } | BackendError::CallDepthExceeded { .. }
                    ) => ("Runtime error", Level::Error),
                    CodegenError::Backend(_) => ("Backend failure", Level::Bug),
                    _ => ("Code generation error", Level::Error),
                };

                let text = error.error.hint().unwrap_or_default();

                let location = error.location.map(|span| Location {
                    src,
                    path: path.clone(),
                    label: Label {
                        text: Some(error.error.to_string()),
                        span,
                    },
                    extra_labels: vec![],
                });

                // nothing to underline, so the message goes into the text
                let text = match location {
                    Some(_) => text,
                    None if text.is_empty() => error.error.to_string(),
                    None => format!("{}\n{text}", error.error),
                };

                vec![Diagnostic {
                    title: title.into(),
                    text,
                    level,
                    location,
                }]
            },
            Error::StdIo { err, } => {
                vec![Diagnostic {
                    title: "Standard IO error".into(),
                    text: format!("{err}"),
                    level: Level::Error,
                    location: None,
                }]
            }
        }
    }
}
