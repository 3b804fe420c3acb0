use std::error;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum ErrorKind {
    // Errors caused by a histogram description that cannot be compiled.
    Compile,

    // Structural errors that indicate a bug in an earlier compilation stage, such as host-level
    // operations ending up inside a kernel body.
    Internal,

    // Errors raised by the reference interpreter while executing a program.
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Compile => write!(f, "Compilation error"),
            ErrorKind::Internal => write!(f, "Internal compiler error"),
            ErrorKind::Runtime => write!(f, "Runtime error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompileError {
    pub msg: String,
    pub kind: ErrorKind
}

impl CompileError {
    pub fn compile_err(msg: String) -> Self {
        CompileError {msg, kind: ErrorKind::Compile}
    }

    pub fn internal_err(msg: String) -> Self {
        CompileError {msg, kind: ErrorKind::Internal}
    }

    pub fn runtime_err(msg: String) -> Self {
        CompileError {msg, kind: ErrorKind::Runtime}
    }

    pub fn is_internal(&self) -> bool {
        self.kind == ErrorKind::Internal
    }
}

impl error::Error for CompileError {}
impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{0}: {1}", self.kind, &self.msg)
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

#[macro_export]
macro_rules! parhist_compile_error {
    ($i:expr,$($t:tt)*) => {{
        Err($crate::utils::err::CompileError::compile_err($i.error_msg(format!($($t)*))))
    }}
}

#[macro_export]
macro_rules! parhist_internal_error {
    ($i:expr,$($t:tt)*) => {{
        Err($crate::utils::err::CompileError::internal_err($i.error_msg(format!($($t)*))))
    }}
}

#[macro_export]
macro_rules! parhist_runtime_error {
    ($i:expr,$($t:tt)*) => {{
        Err($crate::utils::err::CompileError::runtime_err($i.error_msg(format!($($t)*))))
    }}
}
