//! Error types for promload operations.
//!
//! Every failure of a read or write exchange is reported through [`Error`].
//! Expected outcomes such as an empty segment or an exhausted time range are
//! not errors; they are variants of [`ReadOutcome`](crate::ReadOutcome).

use thiserror::Error;

/// Result type alias for promload operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`RemoteClient`](crate::RemoteClient) and the migration
/// driver.
#[derive(Debug, Error)]
pub enum Error {
    /// The request could not be serialized, or the serialized length did not
    /// match the length predicted before encoding.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The response body failed snappy decompression or protobuf decoding.
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// The HTTP exchange failed or was rejected by the remote endpoint.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The response did not have the shape the request asked for, e.g. more
    /// than one series for a single-series read.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid construction parameters (time range, URL, configuration).
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Returns the HTTP status code when the error is a rejected request.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transport(e) => e.status(),
            _ => None,
        }
    }
}

/// Failure of a single HTTP round trip.
///
/// `Status` means the endpoint answered with something other than 200.
/// `Network` means no response was received at all.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint answered with a non-200 status. `body` holds the raw
    /// response body as text.
    #[error("{status}: {body}")]
    Status { status: u16, body: String },

    /// Connection, timeout, TLS or body read failure.
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),
}

impl TransportError {
    /// HTTP status code, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Network(e) => e.status().map(|s| s.as_u16()),
        }
    }

    /// Raw response body of a rejected request.
    pub fn body(&self) -> Option<&str> {
        match self {
            TransportError::Status { body, .. } => Some(body),
            TransportError::Network(_) => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(TransportError::Network(err))
    }
}

impl From<prost::EncodeError> for Error {
    fn from(err: prost::EncodeError) -> Self {
        Error::Encoding(err.to_string())
    }
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Self {
        Error::Decoding(format!("invalid protobuf: {}", err))
    }
}

impl From<snap::Error> for Error {
    fn from(err: snap::Error) -> Self {
        Error::Decoding(format!("invalid snappy block: {}", err))
    }
}
