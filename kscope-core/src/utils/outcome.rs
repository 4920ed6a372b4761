/// Result of a batch that can partly succeed.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T, E> {
    Ok(T),
    PartialFailure(T, E)
}

impl<T, E> Outcome<T, E> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Ok(value) | Self::PartialFailure(value, _) => value,
        }
    }

    pub fn into_parts(self) -> (T, Option<E>) {
        match self {
            Self::Ok(value) => (value, None),
            Self::PartialFailure(value, errors) => (value, Some(errors)),
        }
    }
}
