// Error types for strata

use std::error::Error as StdError;
use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error across strata layers
#[derive(Debug)]
pub enum Error {
    Schema(SchemaError),
    Write(WriteError),
    Decode(DecodeError),
    Io(std::io::Error),
}

/// Schema construction errors
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaError {
    DuplicateFieldName(String),
}

/// Writer misuse errors; fatal to the offending call only
#[derive(Debug, Clone, PartialEq)]
pub enum WriteError {
    SchemaArityMismatch { expected: usize, actual: usize },
    TypeMismatch { column: usize, expected: String, actual: String },
    WriterClosed,
    Compression(String),
    Serialization(String),
}

/// Data-integrity errors; non-recoverable for the affected stripe or stream
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    MalformedStream(&'static str),
    MalformedBlockHeader { declared: usize, available: usize },
    DictionaryIndexOutOfRange { index: usize, size: usize },
    TruncatedStream { expected: usize, available: usize },
    CorruptStripe(String),
    Decompression(String),
    InvalidUtf8,
    ColumnOutOfRange(usize),
    RowOutOfRange(usize),
    StripeOutOfRange(usize),
    InvalidMagic,
    InvalidFooter(String),
}

// Error trait implementations

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Schema(e) => Some(e),
            Error::Write(e) => Some(e),
            Error::Decode(e) => Some(e),
            Error::Io(e) => Some(e),
        }
    }
}

impl StdError for SchemaError {}
impl StdError for WriteError {}
impl StdError for DecodeError {}

// Display implementations

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Schema(e) => write!(f, "Schema error: {}", e),
            Error::Write(e) => write!(f, "Write error: {}", e),
            Error::Decode(e) => write!(f, "Decode error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::DuplicateFieldName(name) => {
                write!(f, "Duplicate field name in schema: {}", name)
            }
        }
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::SchemaArityMismatch { expected, actual } => {
                write!(
                    f,
                    "Row arity mismatch: schema has {} columns, row has {}",
                    expected, actual
                )
            }
            WriteError::TypeMismatch {
                column,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Type mismatch in column {}: expected {}, got {}",
                    column, expected, actual
                )
            }
            WriteError::WriterClosed => {
                write!(f, "Writer is closed")
            }
            WriteError::Compression(msg) => {
                write!(f, "Compression failed: {}", msg)
            }
            WriteError::Serialization(msg) => {
                write!(f, "Serialization failed: {}", msg)
            }
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MalformedStream(msg) => {
                write!(f, "Malformed stream: {}", msg)
            }
            DecodeError::MalformedBlockHeader {
                declared,
                available,
            } => {
                write!(
                    f,
                    "Malformed block header: declares {} bytes, {} available",
                    declared, available
                )
            }
            DecodeError::DictionaryIndexOutOfRange { index, size } => {
                write!(
                    f,
                    "Dictionary index {} out of range for dictionary of {} entries",
                    index, size
                )
            }
            DecodeError::TruncatedStream {
                expected,
                available,
            } => {
                write!(
                    f,
                    "Truncated stream: expected {} bytes, {} available",
                    expected, available
                )
            }
            DecodeError::CorruptStripe(msg) => {
                write!(f, "Corrupt stripe: {}", msg)
            }
            DecodeError::Decompression(msg) => {
                write!(f, "Decompression failed: {}", msg)
            }
            DecodeError::InvalidUtf8 => {
                write!(f, "String column contains invalid UTF-8")
            }
            DecodeError::ColumnOutOfRange(index) => {
                write!(f, "Column index {} out of range", index)
            }
            DecodeError::RowOutOfRange(index) => {
                write!(f, "Row index {} out of range", index)
            }
            DecodeError::StripeOutOfRange(index) => {
                write!(f, "Stripe index {} out of range", index)
            }
            DecodeError::InvalidMagic => {
                write!(f, "Invalid magic bytes in file trailer")
            }
            DecodeError::InvalidFooter(msg) => {
                write!(f, "Invalid file footer: {}", msg)
            }
        }
    }
}

// Convenience From implementations for error composition

impl From<SchemaError> for Error {
    fn from(error: SchemaError) -> Self {
        Error::Schema(error)
    }
}

impl From<WriteError> for Error {
    fn from(error: WriteError) -> Self {
        Error::Write(error)
    }
}

impl From<DecodeError> for Error {
    fn from(error: DecodeError) -> Self {
        Error::Decode(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}
