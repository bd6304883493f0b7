use std::fmt;

/// Everything that can go wrong while building, compiling or running a
/// lambda expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A placeholder with this name is already registered.
    #[error("name `{0}` has already been created")]
    NamingConflict(String),

    /// The name is not an identifier, or it is a reserved word.
    #[error("name `{0}` is not a valid identifier")]
    InvalidIdentifier(String),

    /// `LambdaExpr::apply` only takes expression text as arguments.
    #[error("arguments should be expression text, got {kind} ({arg})")]
    ArgumentType { arg: String, kind: &'static str },

    /// The assembled function source did not parse.
    #[error(transparent)]
    Compile(#[from] SyntaxError),

    /// Raised by the compiled function while it was running.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("syntax error at offset {pos}: {message}")]
pub struct SyntaxError {
    /// Byte offset into the source where the error was detected.
    pub pos: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new<S: Into<String>>(pos: usize, message: S) -> SyntaxError {
        SyntaxError {
            pos,
            message: message.into(),
        }
    }
}

/// The class of a runtime error, named after the exception the expression
/// language would raise.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    TypeError,
    ValueError,
    ZeroDivisionError,
    NameError,
    AttributeError,
    IndexError,
    KeyError,
    OverflowError,
    StopIteration,
    RecursionError,
    KeyboardInterrupt,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RuntimeError {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> RuntimeError {
        RuntimeError {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error<S: Into<String>>(message: S) -> RuntimeError {
        RuntimeError::new(ErrorKind::TypeError, message)
    }

    pub fn value_error<S: Into<String>>(message: S) -> RuntimeError {
        RuntimeError::new(ErrorKind::ValueError, message)
    }

    pub fn zero_division<S: Into<String>>(message: S) -> RuntimeError {
        RuntimeError::new(ErrorKind::ZeroDivisionError, message)
    }

    pub fn overflow() -> RuntimeError {
        RuntimeError::new(ErrorKind::OverflowError, "integer result out of range")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_message() {
        let err = RuntimeError::type_error("unsupported operand");
        assert_eq!(err.to_string(), "TypeError: unsupported operand");
    }

    #[test]
    fn compile_error_is_transparent() {
        let err: Error = SyntaxError::new(3, "unexpected ')'").into();
        assert_eq!(err.to_string(), "syntax error at offset 3: unexpected ')'");
    }
}
