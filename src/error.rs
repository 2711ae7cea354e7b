use thiserror::Error;

/// Process exit code for a compile (scan/parse/emit) failure.
pub const EXIT_COMPILE_ERROR: i32 = 65;
/// Process exit code for a runtime failure.
pub const EXIT_RUNTIME_ERROR: i32 = 70;

#[derive(Debug, Error)]
pub enum Error {
    /// One or more scan/parse errors, already formatted with `[line N]`
    /// prefixes and joined with newlines.
    #[error("{0}")]
    Parse(String),

    /// One or more emitter errors (constant pool overflow, jump out of
    /// range, misplaced break/continue/return, ...).
    #[error("{0}")]
    Compile(String),

    /// A runtime error. The message includes the stack trace, one line per
    /// active call frame, innermost first.
    #[error("{0}")]
    Runtime(String),
}

impl Error {
    /// The process exit code `interpret` maps this error to.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Parse(_) | Error::Compile(_) => EXIT_COMPILE_ERROR,
            Error::Runtime(_) => EXIT_RUNTIME_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
