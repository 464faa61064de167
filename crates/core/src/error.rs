//! Error types for the RTSP server library.

use std::fmt;

/// Errors that can occur in the RTSP server library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Configuration**: [`InvalidConfig`](Self::InvalidConfig) — rejected at
///   startup, never at runtime.
/// - **Protocol**: [`Parse`](Self::Parse) — malformed RTSP messages; the
///   connection is closed without a response.
/// - **Transport**: [`Io`](Self::Io),
///   [`PortRangeExhausted`](Self::PortRangeExhausted),
///   [`TransportUnsupported`](Self::TransportUnsupported).
/// - **Session**: [`SessionNotFound`](Self::SessionNotFound) — surfaced to
///   the client as `454 Session Not Found`.
/// - **Publisher**: [`StreamNotFound`](Self::StreamNotFound) — `push_frame`
///   on an untracked path.
/// - **Server**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server configuration rejected at startup (invalid port, both
    /// transports disabled).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to parse an RTSP request message (RFC 2326 §6).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// No session with the given ID exists in the
    /// [`SessionManager`](crate::session::SessionManager).
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// SETUP requested a lower transport that is disabled by configuration.
    #[error("transport not enabled: {0}")]
    TransportUnsupported(&'static str),

    /// UDP port allocation probed its whole window without binding.
    #[error("no available UDP port starting at {start}")]
    PortRangeExhausted { start: u16 },

    /// No stream registered at the requested path.
    #[error("stream not found: {0}")]
    StreamNotFound(String),

    /// [`Server::start`](crate::Server::start) has not been called yet.
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method URL Version` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// SETUP arrived without a Transport header.
    MissingTransport,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::MissingTransport => write!(f, "missing Transport header"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
