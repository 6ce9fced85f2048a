//! Length-prefixed framing.
//!
//! Every message is a 4-byte little-endian `u32` body length followed by
//! exactly that many bytes of body. There is no compression and no checksum.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, SessionError};

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Where an incremental decoder is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    AwaitingHeader,
    AwaitingBody { len: usize },
}

/// Incremental frame decoder.
///
/// Bytes are fed in whatever chunks the transport delivers; complete bodies
/// are handed out one at a time by [`next_frame`](Self::next_frame).
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    state: DecodeState,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            state: DecodeState::AwaitingHeader,
            max_frame_size,
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// True when no partial frame is buffered.
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::AwaitingHeader && self.buffer.is_empty()
    }

    /// Append raw bytes from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Take the next complete body, if one is buffered.
    ///
    /// A header announcing more than the configured maximum is an error; the
    /// decoder must not be used afterwards.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            match self.state {
                DecodeState::AwaitingHeader => {
                    if self.buffer.len() < HEADER_LEN {
                        return Ok(None);
                    }
                    let b = &self.buffer;
                    let len = u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize;
                    if len > self.max_frame_size {
                        return Err(SessionError::FrameTooLarge {
                            size: len,
                            max: self.max_frame_size,
                        });
                    }
                    self.buffer.drain(..HEADER_LEN);
                    self.state = DecodeState::AwaitingBody { len };
                }
                DecodeState::AwaitingBody { len } => {
                    if self.buffer.len() < len {
                        return Ok(None);
                    }
                    let body: Vec<u8> = self.buffer.drain(..len).collect();
                    self.state = DecodeState::AwaitingHeader;
                    return Ok(Some(body));
                }
            }
        }
    }
}

/// Prefix `body` with its length.
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(body.len()).map_err(|_| SessionError::FrameTooLarge {
        size: body.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Write one frame with a single buffered write.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(body)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// This is the client side of the protocol: a connection that only reads
/// can await whole frames. The session itself uses [`FrameDecoder`] so a
/// half-read frame never blocks its other events.
///
/// Returns `None` on a clean end of stream before the header.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > max_frame_size {
        return Err(SessionError::FrameTooLarge {
            size: len,
            max: max_frame_size,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            SessionError::Truncated
        } else {
            SessionError::Io(e)
        }
    })?;
    Ok(Some(body))
}
