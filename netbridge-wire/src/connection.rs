//! Framed async stream shared by the coordinator and worker sides.
//!
//! `Connection<S>` owns a stream (TCP, or a `&TcpStream` when one socket is
//! read and written from different tasks), a receive buffer and a
//! [`FrameDecoder`]. The stream is dropped on EOF or on any I/O error, after
//! which every call reports the connection as closed.

use bytes::{Bytes, BytesMut};
use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use compio::net::TcpStream;
use netbridge_core::error::{NetBridgeError, Result};
use netbridge_core::options::DEFAULT_READ_BUFFER_SIZE;
use netbridge_core::poison::PoisonGuard;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use tracing::trace;

use crate::codec::{self, CodecError, FrameDecoder, DEFAULT_MAX_FRAME_SIZE};

impl From<CodecError> for NetBridgeError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::FrameTooLarge { size, max } => Self::FrameTooLarge { size, max },
            other => Self::Protocol(other.to_string()),
        }
    }
}

pub struct Connection<S = TcpStream> {
    stream: Option<S>,
    decoder: FrameDecoder,
    recv: BytesMut,
    read_buf: Vec<u8>,
    read_buffer_size: usize,
    max_frame_size: usize,
    is_poisoned: bool,
}

impl<S> Connection<S> {
    /// Wrap a stream with the default frame limit and buffer size.
    pub fn new(stream: S) -> Self {
        Self::with_limits(stream, DEFAULT_MAX_FRAME_SIZE, DEFAULT_READ_BUFFER_SIZE)
    }

    pub fn with_limits(stream: S, max_frame_size: usize, read_buffer_size: usize) -> Self {
        let read_buffer_size = read_buffer_size.max(1);
        Self {
            stream: Some(stream),
            decoder: FrameDecoder::new(max_frame_size),
            recv: BytesMut::with_capacity(read_buffer_size),
            read_buf: Vec::with_capacity(read_buffer_size),
            read_buffer_size,
            max_frame_size,
            is_poisoned: false,
        }
    }

    #[inline]
    pub const fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    #[inline]
    pub const fn is_poisoned(&self) -> bool {
        self.is_poisoned
    }

    /// Bytes received but not yet decoded into a frame.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.recv.len()
    }

    pub fn get_ref(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    /// Pop a complete frame body out of already-received bytes.
    ///
    /// A decode error drops the stream.
    pub fn try_decode(&mut self) -> Result<Option<Bytes>> {
        match self.decoder.decode(&mut self.recv) {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.stream = None;
                Err(e.into())
            }
        }
    }
}

impl<S: AsyncRead + Unpin> Connection<S> {
    /// Read once from the stream into the receive buffer.
    ///
    /// Returns `Ok(0)` on EOF, after which the connection is closed.
    pub async fn fill(&mut self) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(NetBridgeError::ConnectionClosed)?;

        let mut buf = std::mem::take(&mut self.read_buf);
        buf.clear();
        buf.reserve(self.read_buffer_size);

        let BufResult(result, buf) = AsyncRead::read(stream, buf).await;
        let n = match result {
            Ok(n) => n,
            Err(e) => {
                self.stream = None;
                return Err(e.into());
            }
        };

        if n == 0 {
            trace!("[Connection] EOF");
            self.stream = None;
            self.read_buf = buf;
            return Ok(0);
        }

        self.recv.extend_from_slice(&buf[..n]);
        self.read_buf = buf;
        Ok(n)
    }

    /// Read until one complete frame body is available.
    ///
    /// Returns `Ok(None)` on a clean EOF between frames. EOF in the middle of
    /// a frame is an error.
    pub async fn recv_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.try_decode()? {
                return Ok(Some(frame));
            }
            if self.fill().await? == 0 {
                if self.recv.is_empty() && !self.decoder.is_mid_frame() {
                    return Ok(None);
                }
                return Err(NetBridgeError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                )));
            }
        }
    }

    /// Receive and deserialize one value.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.recv_frame().await? {
            Some(body) => match codec::decode_payload(&body) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    self.stream = None;
                    Err(e.into())
                }
            },
            None => Ok(None),
        }
    }
}

impl<S: AsyncWrite + Unpin> Connection<S> {
    /// Write one already-encoded frame (prefix included).
    pub async fn send_frame(&mut self, frame: Bytes) -> Result<()> {
        if self.is_poisoned {
            return Err(NetBridgeError::Poisoned);
        }
        let stream = self.stream.as_mut().ok_or(NetBridgeError::ConnectionClosed)?;

        let guard = PoisonGuard::new(&mut self.is_poisoned);
        let BufResult(result, _) = stream.write_all(frame.to_vec()).await;
        if let Err(e) = result {
            self.stream = None;
            return Err(e.into());
        }
        guard.disarm();

        trace!("[Connection] sent {} bytes", frame.len());
        Ok(())
    }

    /// Serialize and send one value.
    pub async fn send<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let frame = codec::encode_with_limit(value, self.max_frame_size)?;
        self.send_frame(frame).await
    }

    /// Shut down the write side and drop the stream.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}
