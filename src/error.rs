use std::io;
use thiserror::Error;

/// type alias for all operations on the store that could fail with a [`StoreError`]
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error variants used throughout the store.
/// It wraps any lower level errors from third party crates
#[derive(Error)]
pub enum StoreError {
    /// variant for socket and stream read/write failures
    #[error("IO error")]
    Io {
        /// source of the IO Error
        #[from]
        source: io::Error,
    },

    /// variant for errors when a key was not found in the store
    #[error("Key not found")]
    KeyNotFound,

    /// variant for requests carrying an argument the server rejects, such as a
    /// negative counter increment or an unknown command byte
    #[error("{}", .0)]
    InvalidArgument(String),

    /// variant for malformed traffic on the wire: short reads mid-request,
    /// oversize lengths, a bad validation magic
    #[error("{}", .0)]
    Protocol(String),

    /// variant for errors when parsing strings to some other type
    #[error("{}", .0)]
    Parsing(String),

    /// catch-all variant for faults in the store's own plumbing, such as a
    /// backend owner thread that is no longer running
    #[error("{}", .0)]
    Internal(String),
}

impl StoreError {
    /// returns true if this error is the far end closing its connection,
    /// which the server logs at debug rather than treating as a fault
    pub fn is_disconnect(&self) -> bool {
        match self {
            StoreError::Io { source } => matches!(
                source.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// a custom Debug implementation that will write the entire error chain
impl std::fmt::Debug for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// writes the entire error chain of the given error `e`, to the formatter.
fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by: {}", cause)?;
        current = cause.source();
    }
    Ok(())
}
