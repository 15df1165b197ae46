use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// The adapter does not implement this operation.
    Unsupported { library: String, operation: &'static str },
    /// File could not be opened, read or written.
    Io(String),
    /// Workbook content could not be decoded.
    Parse(String),
    /// Bad cell reference, range, sheet name or payload.
    InvalidInput(String),
    /// The underlying library reported an error.
    Backend(String),
    /// A workbook handle created by another adapter was passed in.
    WrongHandle { library: String },
}

impl AdapterError {
    pub fn unsupported(library: impl Into<String>, operation: &'static str) -> Self {
        Self::Unsupported {
            library: library.into(),
            operation,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { library, operation } => {
                write!(f, "{library} does not support {operation}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Backend(msg) => write!(f, "backend error: {msg}"),
            Self::WrongHandle { library } => {
                write!(f, "workbook handle was not created by {library}")
            }
        }
    }
}

impl std::error::Error for AdapterError {}

impl From<std::io::Error> for AdapterError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
