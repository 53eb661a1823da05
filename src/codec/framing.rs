//! Byte-level helpers shared by the codec variants and the handshake.
//!
//! Reads go through a `BufReader` so a clean close at a message boundary can
//! be told apart from a close in the middle of a message. Writes go through a
//! `BufWriter` and are flushed once per frame.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufWriter};

use super::BoxWrite;
use crate::error::{QrpcError, Result};

/// Returns `ConnectionClosed` if the peer hung up before the next message.
pub(crate) async fn ensure_more<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<()> {
    if reader.fill_buf().await?.is_empty() {
        return Err(QrpcError::ConnectionClosed);
    }
    Ok(())
}

/// Read one `\n`-terminated line of at most `max` bytes (newline excluded).
///
/// An overlong line is consumed up to and including its newline before
/// `MessageTooLarge` is returned, so the next read starts on a message
/// boundary.
pub(crate) async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R, max: usize) -> Result<Vec<u8>> {
    ensure_more(reader).await?;

    let mut line = Vec::new();
    let limit = max.saturating_add(1) as u64;
    (&mut *reader).take(limit).read_until(b'\n', &mut line).await?;

    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        return Ok(line);
    }

    if line.len() > max {
        let skipped = skip_line(reader).await?;
        return Err(QrpcError::MessageTooLarge {
            size: line.len() + skipped,
            max,
        });
    }

    Err(QrpcError::Io(std::io::ErrorKind::UnexpectedEof.into()))
}

/// Discard input up to and including the next newline. Returns bytes skipped.
async fn skip_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<usize> {
    let mut skipped = 0;
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(skipped);
        }
        match buf.iter().position(|&b| b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(skipped + i);
            }
            None => {
                let n = buf.len();
                reader.consume(n);
                skipped += n;
            }
        }
    }
}

/// Discard exactly `len` bytes.
pub(crate) async fn skip_exact<R: AsyncBufRead + Unpin>(reader: &mut R, len: usize) -> Result<()> {
    let copied = tokio::io::copy(&mut (&mut *reader).take(len as u64), &mut tokio::io::sink()).await?;
    if copied < len as u64 {
        return Err(QrpcError::Io(std::io::ErrorKind::UnexpectedEof.into()));
    }
    Ok(())
}

/// Buffered write side of a connection.
///
/// Once any write fails the stream is shut down and every later call returns
/// `ConnectionClosed`; a half-written frame is never continued.
pub(crate) struct StreamWriter {
    inner: BufWriter<BoxWrite>,
    closed: bool,
}

impl StreamWriter {
    pub(crate) fn new(writer: BoxWrite) -> Self {
        Self {
            inner: BufWriter::new(writer),
            closed: false,
        }
    }

    /// Write all parts as one frame and flush.
    pub(crate) async fn write_frame(&mut self, parts: &[&[u8]]) -> Result<()> {
        if self.closed {
            return Err(QrpcError::ConnectionClosed);
        }
        let result = async {
            for part in parts {
                self.inner.write_all(part).await?;
            }
            self.inner.flush().await
        }
        .await;

        if let Err(e) = result {
            self.abort().await;
            return Err(QrpcError::Io(e));
        }
        Ok(())
    }

    /// Shut the write side down after an encode or write failure.
    ///
    /// The read side belongs to the reader; a connection stops it through
    /// its write gate.
    pub(crate) async fn abort(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.inner.shutdown().await;
        }
    }

    /// Flush and shut down. A second close reports `ConnectionClosed`.
    pub(crate) async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(QrpcError::ConnectionClosed);
        }
        self.closed = true;
        self.inner.shutdown().await?;
        Ok(())
    }
}
