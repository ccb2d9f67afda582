//! Per-socket connection state machine.

use crate::error::ServerError;
use crate::handler::{Dispatch, RequestDispatcher};
use bytes::{Buf, Bytes};
use cqlwire_protocol::{
    decode_header, first_byte_version, FrameError, FrameFlags, FrameHeader, ProtocolVersion,
    Response, MAX_FRAME_SIZE, MAX_HEADER_SIZE, RESPONSE_BIT,
};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use uuid::Uuid;

/// Upper bound on the buffer reserved up front for a frame body.
const BODY_PREALLOC_LIMIT: usize = 64 * 1024;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No frame parsed yet; the next header fixes the version.
    AwaitingVersion,
    /// Every frame must carry this version.
    Established(ProtocolVersion),
    /// End of stream or fatal error.
    Closed,
}

impl ConnectionState {
    /// Returns the negotiated version, if any.
    pub fn version(&self) -> Option<ProtocolVersion> {
        match self {
            ConnectionState::Established(v) => Some(*v),
            _ => None,
        }
    }
}

/// A client connection.
///
/// Frames are handled one at a time: the response to a frame is written and
/// flushed before the next header is read.
pub struct Connection<S> {
    id: Uuid,
    peer: String,
    stream: BufReader<S>,
    state: ConnectionState,
    dispatcher: Arc<RequestDispatcher>,
    max_frame_bytes: u32,
    frames: u64,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a connection over `stream`. `peer` labels log output.
    pub fn new(stream: S, peer: impl Into<String>, dispatcher: Arc<RequestDispatcher>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer: peer.into(),
            stream: BufReader::new(stream),
            state: ConnectionState::AwaitingVersion,
            dispatcher,
            max_frame_bytes: MAX_FRAME_SIZE,
            frames: 0,
        }
    }

    /// Sets the largest accepted frame body.
    pub fn with_max_frame_bytes(mut self, max: u32) -> Self {
        self.max_frame_bytes = max;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of frames read so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Serves the connection until the client disconnects or breaks the
    /// protocol.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        let result = self.process().await;
        self.state = ConnectionState::Closed;

        // Best effort; the peer may already be gone.
        let _ = self.stream.get_mut().shutdown().await;
        result
    }

    async fn process(&mut self) -> Result<(), ServerError> {
        tracing::debug!("[{}] Connection {} opened", self.peer, self.id);

        loop {
            let (header, body) = match self.read_frame().await? {
                Some(frame) => frame,
                None => {
                    tracing::debug!(
                        "[{}] Connection closed by client after {} frames",
                        self.peer,
                        self.frames
                    );
                    return Ok(());
                }
            };
            self.frames += 1;

            tracing::debug!(
                "[{}] Received {} on stream {} ({} bytes)",
                self.peer,
                header.opcode,
                header.stream_id,
                header.body_length
            );

            match self.dispatcher.dispatch(header.stream_id, header.opcode, body) {
                Dispatch::Reply(response) => {
                    self.write_response(header.version, response).await?;
                }
                Dispatch::ReplyAndClose(response) => {
                    self.write_response(header.version, response).await?;
                    return Err(ServerError::UnexpectedOpcode {
                        stream_id: header.stream_id,
                        opcode: header.opcode,
                    });
                }
            }
        }
    }

    /// Reads one complete frame. Returns `None` on a clean end of stream.
    async fn read_frame(&mut self) -> Result<Option<(FrameHeader, Bytes)>, ServerError> {
        if self.state == ConnectionState::Closed {
            return Ok(None);
        }

        // The header length depends on the version byte.
        let first = match self.stream.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let version = match self.state.version() {
            Some(locked) => {
                let actual = first & !RESPONSE_BIT;
                if actual != locked.as_u8() {
                    return Err(FrameError::VersionMismatch {
                        expected: locked.as_u8(),
                        actual,
                    }
                    .into());
                }
                locked
            }
            None => first_byte_version(first)?,
        };

        let size = version.header_size();
        let mut raw = Vec::with_capacity(MAX_HEADER_SIZE);
        raw.push(first);
        let n = (&mut self.stream)
            .take((size - 1) as u64)
            .read_to_end(&mut raw)
            .await?;
        if n + 1 < size {
            return Err(FrameError::TruncatedHeader {
                expected: size,
                actual: n + 1,
            }
            .into());
        }

        screen_header(&raw, version, self.max_frame_bytes)?;

        let header = match decode_header(self.state.version(), &raw) {
            Ok((header, _)) => header,
            Err(FrameError::UnknownOpcode { stream_id, opcode }) => {
                tracing::warn!(
                    "[{}] Unknown opcode {:#04x} on stream {}",
                    self.peer,
                    opcode,
                    stream_id
                );
                let response = RequestDispatcher::unknown_opcode(stream_id, opcode);
                self.write_response(version, response).await?;
                return Err(FrameError::UnknownOpcode { stream_id, opcode }.into());
            }
            Err(e) => return Err(e.into()),
        };

        let expected = header.body_length as usize;
        let mut body = Vec::with_capacity(expected.min(BODY_PREALLOC_LIMIT));
        let n = (&mut self.stream)
            .take(header.body_length as u64)
            .read_to_end(&mut body)
            .await?;
        if n < expected {
            return Err(FrameError::TruncatedBody {
                expected,
                actual: n,
            }
            .into());
        }

        if self.state == ConnectionState::AwaitingVersion {
            tracing::debug!("[{}] Negotiated protocol {}", self.peer, version);
            self.state = ConnectionState::Established(version);
        }

        Ok(Some((header, Bytes::from(body))))
    }

    async fn write_response(
        &mut self,
        version: ProtocolVersion,
        response: Response,
    ) -> Result<(), ServerError> {
        let stream_id = response.stream_id();
        let opcode = response.opcode();
        let msg = response.finalize(version)?;

        tracing::debug!(
            "[{}] Sending {} on stream {} ({} bytes)",
            self.peer,
            opcode,
            stream_id,
            msg.len()
        );
        self.stream.write_all(&msg).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Rejects a raw header that closes the connection without a reply: a
/// response-direction frame, a compressed body, or a body over `max`.
///
/// Runs before the opcode is looked up, so an unknown opcode is only answered
/// on a frame that passes these checks.
fn screen_header(raw: &[u8], version: ProtocolVersion, max: u32) -> Result<(), FrameError> {
    let mut buf = raw;
    if buf.get_u8() & RESPONSE_BIT != 0 {
        return Err(FrameError::UnexpectedDirection);
    }
    let flags = FrameFlags::from_bits(buf.get_u8());
    let stream_id = if version.header_size() < MAX_HEADER_SIZE {
        i16::from(buf.get_i8())
    } else {
        buf.get_i16()
    };
    buf.advance(1);
    let body_length = buf.get_u32();

    if flags.is_compressed() {
        return Err(FrameError::CompressionUnsupported { stream_id });
    }
    if body_length > max {
        return Err(FrameError::FrameTooLarge {
            size: body_length,
            max,
        });
    }
    Ok(())
}
