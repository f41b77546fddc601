use crate::error::TaskError;

/// Observable state of a loadable resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// A load is in flight; `data` is what was known before it started.
    Progress(Option<T>),
    /// Load finished.
    Success(T),
    /// Load failed; `data` is the last known value, if it was kept.
    Error { error: TaskError, data: Option<T> },
}

impl<T> Default for Outcome<T> {
    fn default() -> Self {
        Outcome::Progress(None)
    }
}

impl<T> Outcome<T> {
    /// Data carried by any variant.
    pub fn data(&self) -> Option<&T> {
        match self {
            Outcome::Progress(data) | Outcome::Error { data, .. } => data.as_ref(),
            Outcome::Success(data) => Some(data),
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Outcome::Progress(data) | Outcome::Error { data, .. } => data,
            Outcome::Success(data) => Some(data),
        }
    }

    pub fn error(&self) -> Option<&TaskError> {
        match self {
            Outcome::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_progress(&self) -> bool {
        matches!(self, Outcome::Progress(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Maps the carried data, keeping the variant.
    pub fn map_data<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Progress(data) => Outcome::Progress(data.map(f)),
            Outcome::Success(data) => Outcome::Success(f(data)),
            Outcome::Error { error, data } => Outcome::Error {
                error,
                data: data.map(f),
            },
        }
    }
}
