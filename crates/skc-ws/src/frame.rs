//! Single-frame WebSocket messages.
//!
//! ```text
//! byte 0: FIN | RSV1-3 | opcode(4)
//! byte 1: MASK | payload length(7)
//! [4-byte masking key, client frames only]
//! payload
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::WsError;

/// Largest payload expressible without the extended length encodings.
pub const MAX_PAYLOAD: usize = 125;

const FIN: u8 = 0x80;
const MASK: u8 = 0x80;
const OPCODE_MASK: u8 = 0x0F;
const LEN_MASK: u8 = 0x7F;

pub mod opcode {
    pub const CONTINUATION: u8 = 0x0;
    pub const TEXT: u8 = 0x1;
    pub const BINARY: u8 = 0x2;
    pub const CLOSE: u8 = 0x8;
}

/// Validate a client frame header, returning the payload length.
pub fn parse_header(header: [u8; 2]) -> Result<usize, WsError> {
    if header[0] & FIN == 0 {
        return Err(WsError::Fragmented);
    }
    let op = header[0] & OPCODE_MASK;
    if op != opcode::TEXT && op != opcode::BINARY {
        return Err(WsError::UnsupportedOpcode(op));
    }
    if header[1] & MASK == 0 {
        return Err(WsError::Unmasked);
    }
    let len = header[1] & LEN_MASK;
    if usize::from(len) > MAX_PAYLOAD {
        return Err(WsError::ExtendedLength(len));
    }
    Ok(usize::from(len))
}

pub fn unmask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Read one client message and return its unmasked payload.
///
/// A clean EOF before the first header byte is reported as [`WsError::Closed`].
pub async fn read_message<R>(reader: &mut R) -> Result<Vec<u8>, WsError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WsError::Closed)
        }
        Err(err) => return Err(err.into()),
    }
    let len = parse_header(header)?;

    let mut key = [0u8; 4];
    reader.read_exact(&mut key).await?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    unmask(&mut payload, key);
    Ok(payload)
}

/// Unmasked single binary frame.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, WsError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(WsError::PayloadTooLarge(payload.len()));
    }
    let mut out = Vec::with_capacity(2 + payload.len());
    out.push(FIN | opcode::BINARY);
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Write one binary message and wait for it to be flushed.
pub async fn write_message<W>(writer: &mut W, payload: &[u8]) -> Result<(), WsError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
