// Length-prefixed record framing over a byte stream: 4-byte big-endian
// length `L` followed by exactly `L` bytes of payload. Distinct from the
// teacher's framing (4-byte magic + little-endian length) — this wire
// format is fixed by the protocol, not left to the implementation.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Generous ceiling on a single frame (a Block with a full body). Guards
/// against a peer claiming an absurd length and forcing a huge allocation.
pub const MAX_FRAME: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("frame length {0} exceeds the {MAX_FRAME} byte ceiling")]
    FrameTooLarge(usize),
}

pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

pub async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, payload: &[u8]) -> Result<(), FramingError> {
    stream.write_all(&encode_frame(payload)).await?;
    Ok(())
}

/// Read exactly one frame. `Ok(None)` means the stream closed cleanly
/// between frames (normal end-of-stream); a close mid-frame surfaces as
/// `Err`, since the spec treats that as a protocol error rather than EOF.
pub async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Option<Vec<u8>>, FramingError> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME {
        return Err(FramingError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Decode a single frame out of a whole UDP datagram: the datagram carries
/// exactly one length-prefixed record.
pub fn decode_datagram(buf: &[u8]) -> Option<&[u8]> {
    if buf.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
    buf.get(4..4 + len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_roundtrip_frame() {
        let encoded = encode_frame(b"payload");
        let mut cursor = Cursor::new(encoded);
        let got = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(got, b"payload");
    }

    #[tokio::test]
    async fn test_clean_eof_between_frames() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let got = read_frame(&mut cursor).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_mid_frame_close_is_error() {
        let mut partial = encode_frame(b"0123456789");
        partial.truncate(7); // length prefix plus a few payload bytes only
        let mut cursor = Cursor::new(partial);
        assert!(read_frame(&mut cursor).await.is_err());
    }

    #[test]
    fn test_decode_datagram() {
        let encoded = encode_frame(b"hi");
        assert_eq!(decode_datagram(&encoded), Some(&b"hi"[..]));
    }
}
