use crate::vm::VmError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- user input errors -----------------------------------------
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
    #[error("invalid hex id `{0}`")]
    InvalidHexId(String),
    #[error("no {0} selected")]
    NoSelection(&'static str),
    #[error("{0} not found")]
    NotFound(String),

    // --------------------------------- VM errors -------------------------------------------------
    /// VM can't accept a request right now, reported uniformly for all actions.
    #[error("VM busy")]
    VmBusy,
    #[error(transparent)]
    Vm(VmError),

    // --------------------------------- internal errors -------------------------------------------
    /// Focus policy left the session in an inconsistent state.
    #[error("{0}")]
    StaleFocus(&'static str),
    #[error("{context}: {source:#}")]
    Unexpected {
        context: &'static str,
        source: Box<Error>,
    },
}

impl From<VmError> for Error {
    fn from(e: VmError) -> Self {
        match e {
            VmError::Busy => Error::VmBusy,
            e => Error::Vm(e),
        }
    }
}

impl Error {
    /// Wrap error with context of failed operation.
    pub fn unexpected(context: &'static str, source: Error) -> Self {
        Error::Unexpected {
            context,
            source: Box::new(source),
        }
    }

    /// Return a hint to an interface - continue inspection after error or treat it as an
    /// internal invariant violation.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::InvalidAddress(_) => false,
            Error::InvalidHexId(_) => false,
            Error::NoSelection(_) => false,
            Error::NotFound(_) => false,
            Error::VmBusy => false,
            Error::Vm(_) => false,
            Error::StaleFocus(_) => true,
            Error::Unexpected { source, .. } => source.is_fatal(),
        }
    }
}

pub type InspectionResult<T> = Result<T, Error>;
