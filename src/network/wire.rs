//! Sending and receiving framed messages
//!
//! A frame is the 64-byte header followed by exactly `size` payload bytes.
//! `send`/`receive` work directly on any async byte stream; `FrameCodec`
//! applies the same rules for use with `tokio_util::codec::Framed`.

use crate::network::header::{CryptMode, FrameError, FrameHeader, HEADER_SIZE};
use crate::network::message::{DecodeError, Message};
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

/// Errors while moving messages over a connection
#[derive(Error, Debug)]
pub enum WireError {
    /// Zero bytes where a header was expected: the peer closed the connection
    #[error("Empty header, peer closed the connection")]
    EmptyHeader,
    #[error("Invalid header: {0}")]
    InvalidHeader(FrameError),
    #[error("Unsupported crypt mode: {0:?}")]
    UnsupportedCryptMode(CryptMode),
    #[error("Payload of {size} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { size: usize, max: u32 },
    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(String),
    #[error("Corrupt payload: {0}")]
    CorruptPayload(String),
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl WireError {
    /// True when the error only means the other side went away
    pub fn is_disconnect(&self) -> bool {
        match self {
            WireError::EmptyHeader => true,
            WireError::IoError(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl From<FrameError> for WireError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Empty => WireError::EmptyHeader,
            other => WireError::InvalidHeader(other),
        }
    }
}

impl From<DecodeError> for WireError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::UnknownMessageKind(kind) => WireError::UnknownMessageKind(kind),
            DecodeError::CorruptPayload(reason) => WireError::CorruptPayload(reason),
        }
    }
}

/// Encode a message into header + payload bytes
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, WireError> {
    let payload = msg
        .to_bytes()
        .map_err(|e| WireError::Encode(e.to_string()))?;
    let size = u32::try_from(payload.len()).map_err(|_| WireError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX,
    })?;
    let header = FrameHeader::unencrypted(size)
        .encode()
        .map_err(|e| WireError::Encode(e.to_string()))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Reject headers this side cannot honour
fn check_header(header: &FrameHeader, max_payload: u32) -> Result<(), WireError> {
    if header.crypt_mode != CryptMode::Unencrypted {
        return Err(WireError::UnsupportedCryptMode(header.crypt_mode));
    }
    if header.size > max_payload {
        return Err(WireError::PayloadTooLarge {
            size: header.size as usize,
            max: max_payload,
        });
    }
    Ok(())
}

/// Write one message: header first, then payload
pub async fn send<W>(writer: &mut W, msg: &Message) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Fill `buf` unless the stream ends first; returns the number of bytes read
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read one message: exactly 64 header bytes, then exactly `size` payload bytes
pub async fn receive<R>(reader: &mut R, max_payload: u32) -> Result<Message, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut slot = [0u8; HEADER_SIZE];
    let n = read_full(reader, &mut slot).await?;
    if n == 0 {
        return Err(WireError::EmptyHeader);
    }
    if n < HEADER_SIZE {
        return Err(WireError::IoError(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed inside frame header",
        )));
    }

    let header = FrameHeader::decode(&slot)?;
    check_header(&header, max_payload)?;

    let mut payload = vec![0u8; header.size as usize];
    reader.read_exact(&mut payload).await?;

    Ok(Message::from_bytes(&payload)?)
}

/// Codec for header-prefixed messages
#[derive(Debug)]
pub struct FrameCodec {
    max_payload: u32,
    /// Header of the frame whose payload is still arriving
    pending: Option<FrameHeader>,
}

impl FrameCodec {
    pub fn new(max_payload: u32) -> Self {
        Self {
            max_payload,
            pending: None,
        }
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = WireError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = encode_frame(&item)?;
        dst.reserve(frame.len());
        dst.put_slice(&frame);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending {
            Some(header) => header,
            None => {
                // Need the whole header slot
                if src.len() < HEADER_SIZE {
                    return Ok(None);
                }
                let header = FrameHeader::decode(&src[..HEADER_SIZE])?;
                check_header(&header, self.max_payload)?;
                src.advance(HEADER_SIZE);
                self.pending = Some(header);
                header
            }
        };

        let size = header.size as usize;
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }

        self.pending = None;
        let data = src.split_to(size);
        Ok(Some(Message::from_bytes(&data)?))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(msg) => Ok(Some(msg)),
            None if buf.is_empty() && self.pending.is_none() => Ok(None),
            None => Err(WireError::IoError(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside a frame",
            ))),
        }
    }
}
