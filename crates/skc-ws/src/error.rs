use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    /// The peer closed the connection at a message boundary.
    #[error("connection closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("request line longer than {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("malformed request line {0:?}")]
    MalformedRequestLine(String),

    #[error("malformed header line {0:?}")]
    MalformedHeader(String),

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("FIN flag expected")]
    Fragmented,

    #[error("raw or text data expected, got opcode {0:#x}")]
    UnsupportedOpcode(u8),

    #[error("mask flag expected")]
    Unmasked,

    #[error("short payload expected, got length code {0}")]
    ExtendedLength(u8),

    #[error("payload of {0} bytes does not fit a short frame")]
    PayloadTooLarge(usize),
}

impl WsError {
    /// A protocol violation by the peer, as opposed to a transport failure.
    pub fn is_protocol_fault(&self) -> bool {
        !matches!(self, WsError::Closed | WsError::Io(_))
    }
}
