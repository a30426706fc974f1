use std::{io, result};

use thiserror::Error;

use crate::id::ConnectionId;

/// Convenience alias used throughout arqlink.
pub type Result<T> = result::Result<T, ErrorKind>;

/// Everything that can go wrong in the engine or the adapter.
///
/// Failures are structural (bad id, bad state, bad size) or I/O; the engine
/// handles transient network loss itself and never reports it here.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The server could not bind its socket.
    #[error("could not bind port {port}: {source}")]
    BindError {
        /// Port that was requested.
        port: u16,
        /// Underlying socket error.
        source: io::Error,
    },
    /// The connection id is not in the server's live set.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    /// The client is not connected.
    #[error("client is not connected")]
    NotConnected,
    /// The client is already connecting or connected.
    #[error("client is already connecting or connected")]
    AlreadyConnected,
    /// The endpoint is active and cannot be reinitialized.
    #[error("transport is active; stop the server and disconnect the client first")]
    AlreadyActive,
    /// The payload exceeds the max message size for its channel.
    #[error("payload of {size} bytes exceeds the max message size of {max} bytes")]
    PayloadTooLarge {
        /// Size of the rejected payload.
        size: usize,
        /// Max size allowed on the channel.
        max: usize,
    },
    /// Empty payloads are not sent.
    #[error("payload is empty")]
    EmptyPayload,
    /// The client could not resolve the remote address.
    #[error("could not resolve address: {0}")]
    AddressResolution(String),
    /// A datagram or segment header could not be parsed.
    #[error("could not read header: {0}")]
    CouldNotReadHeader(String),
    /// A datagram was shorter than its smallest valid form.
    #[error("received data is too short")]
    ReceivedDataToShort,
    /// Wrapper around `std::io::Error`.
    #[error("io error: {0}")]
    IOError(#[from] io::Error),
}

impl ErrorKind {
    /// Returns true for failures that concern a single message or id and
    /// leave the endpoint usable.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            ErrorKind::UnknownConnection(_) | ErrorKind::PayloadTooLarge { .. } | ErrorKind::EmptyPayload
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_convert() {
        fn fails() -> Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "boom"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(ErrorKind::IOError(_))));
    }

    #[test]
    fn test_messages_name_the_offender() {
        let err = ErrorKind::UnknownConnection(ConnectionId::new(42));
        assert_eq!(err.to_string(), "unknown connection 42");

        let err = ErrorKind::PayloadTooLarge { size: 10, max: 9 };
        assert!(err.to_string().contains("10 bytes"));
        assert!(err.is_soft());
        assert!(!ErrorKind::NotConnected.is_soft());
    }
}
