use crate::utils::prelude::SrcSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexicalErrorType {
    MissingDigitAfterPeriod,
    MissingDigitBeforePeriod,
    MultipleFloatingPoints,
    MalformedNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexicalError {
    pub error: LexicalErrorType,
    pub location: SrcSpan,
    pub line: u32,
}

impl LexicalError {
    pub fn details(&self) -> (&'static str, Vec<String>) {
        match self.error {
            LexicalErrorType::MissingDigitAfterPeriod => {
                ("Missing digits after the decimal point", vec![])
            },
            LexicalErrorType::MissingDigitBeforePeriod => {
                ("Missing digits before the decimal point", vec![
                    "Write `0.5` instead of `.5`".to_string()
                ])
            },
            LexicalErrorType::MultipleFloatingPoints => {
                ("A number may contain only one decimal point", vec![])
            },
            LexicalErrorType::MalformedNumber => {
                ("Number literal is not a valid double", vec![])
            },
        }
    }
}
