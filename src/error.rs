use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Decoding Errors
/// - [`Error::OutOfBounds`] - Attempted to read beyond the instruction stream
/// - [`Error::Malformed`] - Corrupted or truncated instruction stream
/// - [`Error::ScopeResolution`] - Token not found (or wrong shape) in the bound resolution scope
///
/// ## Interception Errors
/// - [`Error::UnsupportedHostVersion`] - The detected host runtime has no known descriptor layout
/// - [`Error::MethodNotFound`] - A compiling method cannot be mapped back to a managed identity
/// - [`Error::ReplacementContentInvalid`] - An observer supplied empty replacement string content
/// - [`Error::EngineShutdown`] - The interception engine was torn down and cannot be reused
///
/// ## Ambient Errors
/// - [`Error::LockError`] - Thread synchronization failure
/// - [`Error::Loading`] - Failure while looking up host runtime exports
#[derive(Error, Debug)]
pub enum Error {
    /// The instruction stream is damaged and could not be decoded.
    ///
    /// The error includes the source location where the malformation was
    /// detected for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while decoding the stream.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A token could not be resolved in the bound resolution scope.
    ///
    /// Raised both for tokens that are absent from the scope's table and for
    /// tokens whose entry does not have the requested shape (e.g. asking for
    /// a member and finding a signature). The decoder downgrades this to a
    /// raw-integer operand in relaxed mode, at the ambiguous-member operand
    /// only; everywhere else it propagates.
    #[error("Token {0} could not be resolved in the current scope")]
    ScopeResolution(Token),

    /// The discovered host runtime version has no known descriptor-table layout.
    ///
    /// Fatal at engine construction: without the fixed vtable offsets for this
    /// version, no interception entry point can be reached safely.
    #[error("Host runtime version {0} has no known descriptor table layout")]
    UnsupportedHostVersion(String),

    /// An observer supplied empty replacement string content.
    ///
    /// Surfaced immediately: the replacement's encoded byte length must be
    /// nonzero, and an empty override indicates an observer bug rather than a
    /// transient condition.
    #[error("Replacement string content must not be empty")]
    ReplacementContentInvalid,

    /// The compiling method could not be mapped back to a managed identity.
    ///
    /// An internal consistency break: the method definition token obtained
    /// from the host does not resolve in the module registered for the
    /// compile request's scope. The triggering compile is aborted.
    #[error("No managed method maps to the compiling handle {0:#x}")]
    MethodNotFound(usize),

    /// The interception engine has been torn down.
    ///
    /// A destroyed engine cannot be reused; a new instance must be created.
    #[error("The interception engine has been shut down")]
    EngineShutdown,

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,

    /// Error while resolving a host runtime export.
    #[error("{0}")]
    Loading(#[from] libloading::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
