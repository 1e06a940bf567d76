use std::io;

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Everything that can go wrong in microtp.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The underlying socket failed.
    #[error("socket error: {0}")]
    IoError(#[from] io::Error),
    /// The datagram is shorter than a packet header.
    #[error("received datagram is too short to hold a packet header")]
    ReceivedDataToShort,
    /// No connection is registered under the given handle.
    #[error("no connection registered under this handle")]
    UnknownConnection,
    /// The connection has been closed or reset.
    #[error("connection is closed")]
    ConnectionClosed,
    /// The writable side was already finished with `end`.
    #[error("write after end")]
    WriteAfterEnd,
    /// The configuration breaks an invariant of the protocol.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        fn fails() -> Result<()> {
            Err(io::Error::new(io::ErrorKind::AddrInUse, "taken"))?;
            Ok(())
        }

        match fails() {
            Err(ErrorKind::IoError(err)) => assert_eq!(err.kind(), io::ErrorKind::AddrInUse),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(ErrorKind::WriteAfterEnd.to_string(), "write after end");
        assert_eq!(
            ErrorKind::InvalidConfig("buffer_size").to_string(),
            "invalid configuration: buffer_size"
        );
    }
}
