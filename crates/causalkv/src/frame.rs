//! Length-framed wire format: a 4-byte big-endian length followed by exactly
//! that many payload bytes, symmetric for requests and responses.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Frames longer than this are rejected as malformed instead of buffered.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Writes one frame: length prefix, payload, flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds the {} byte limit", payload.len(), MAX_FRAME_LEN),
        )));
    }
    let length = (payload.len() as u32).to_be_bytes();
    writer.write_all(&length).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame into `buf`, replacing its contents. Empty payloads are
/// legal; lengths above [`MAX_FRAME_LEN`] are rejected without reading the
/// body.
pub async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut length = [0u8; 4];
    reader.read_exact(&mut length).await?;
    let length = u32::from_be_bytes(length) as usize;
    if length > MAX_FRAME_LEN {
        return Err(Error::InvalidResponse {
            reason: format!("frame length {} exceeds the {} byte limit", length, MAX_FRAME_LEN),
        });
    }
    buf.clear();
    buf.resize(length, 0);
    if length > 0 {
        reader.read_exact(buf).await?;
    }
    Ok(())
}
