//! RFC 4978 DEFLATE stream layer.
//!
//! After a successful COMPRESS=DEFLATE negotiation both directions of the
//! connection carry raw deflate data (no zlib header). Writes are
//! compressed into an internal buffer and emitted with a sync flush on
//! [`AsyncWrite::poll_flush`], so each command reaches the server as a
//! complete compressed unit.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const READ_BUF_SIZE: usize = 8192;

/// A DEFLATE layer over an inner async stream.
pub struct DeflateStream<S> {
    inner: S,
    compress: Compress,
    decompress: Decompress,
    /// Compressed bytes read from the wire, not yet decompressed.
    in_buf: Box<[u8]>,
    in_start: usize,
    in_end: usize,
    /// Compressed bytes produced locally, not yet written to the wire.
    out_buf: Vec<u8>,
    out_pos: usize,
}

impl<S> DeflateStream<S> {
    /// Wraps the inner stream with fresh raw-deflate state in both
    /// directions.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            compress: Compress::new(Compression::default(), false),
            decompress: Decompress::new(false),
            in_buf: vec![0u8; READ_BUF_SIZE].into_boxed_slice(),
            in_start: 0,
            in_end: 0,
            out_buf: Vec::with_capacity(READ_BUF_SIZE),
            out_pos: 0,
        }
    }

    /// Returns a reference to the inner stream.
    pub const fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S> DeflateStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Writes buffered compressed output to the inner stream.
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while self.out_pos < self.out_buf.len() {
            let n =
                ready!(Pin::new(&mut self.inner).poll_write(cx, &self.out_buf[self.out_pos..]))?;
            if n == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "inner stream closed while draining compressed output",
                )));
            }
            self.out_pos += n;
        }
        self.out_buf.clear();
        self.out_pos = 0;
        Poll::Ready(Ok(()))
    }
}

impl<S> AsyncRead for DeflateStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if this.in_start < this.in_end {
                let before_in = this.decompress.total_in();
                let before_out = this.decompress.total_out();

                let status = this
                    .decompress
                    .decompress(
                        &this.in_buf[this.in_start..this.in_end],
                        buf.initialize_unfilled(),
                        FlushDecompress::None,
                    )
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

                let consumed = usize::try_from(this.decompress.total_in() - before_in)
                    .unwrap_or(usize::MAX);
                let produced = usize::try_from(this.decompress.total_out() - before_out)
                    .unwrap_or(usize::MAX);

                this.in_start += consumed;

                if produced > 0 {
                    buf.advance(produced);
                    return Poll::Ready(Ok(()));
                }
                if status == Status::StreamEnd {
                    return Poll::Ready(Ok(()));
                }
                if consumed > 0 {
                    continue;
                }
            }

            // Unconsumed compressed bytes must survive this poll: compact
            // them to the front and append fresh input behind them.
            let pending = this.in_end - this.in_start;
            if pending > 0 && this.in_start > 0 {
                this.in_buf.copy_within(this.in_start..this.in_end, 0);
            }
            this.in_start = 0;
            this.in_end = pending;
            if this.in_end == this.in_buf.len() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "decompressor made no progress on a full input buffer",
                )));
            }
            let mut read_buf = ReadBuf::new(&mut this.in_buf[this.in_end..]);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut read_buf))?;
            let n = read_buf.filled().len();
            if n == 0 {
                // EOF on the wire; report it upward as a zero-byte read.
                return Poll::Ready(Ok(()));
            }
            this.in_end += n;
        }
    }
}

impl<S> AsyncWrite for DeflateStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        // Apply backpressure once pending output grows large.
        if this.out_buf.len() - this.out_pos > READ_BUF_SIZE * 4 {
            ready!(this.poll_drain(cx))?;
        }

        let mut consumed = 0;
        while consumed < buf.len() {
            this.out_buf.reserve((buf.len() - consumed) / 2 + 64);
            let before = this.compress.total_in();
            this.compress
                .compress_vec(&buf[consumed..], &mut this.out_buf, FlushCompress::None)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            consumed +=
                usize::try_from(this.compress.total_in() - before).unwrap_or(usize::MAX);
        }

        // Opportunistic drain; buffered bytes go out on flush regardless.
        let _ = this.poll_drain(cx)?;

        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        // Emit a sync-flush block so the peer can decode everything
        // written so far.
        loop {
            this.out_buf.reserve(64);
            let before = this.compress.total_out();
            this.compress
                .compress_vec(&[], &mut this.out_buf, FlushCompress::Sync)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            if this.compress.total_out() == before {
                break;
            }
        }

        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.as_mut().poll_flush(cx))?;
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    #[tokio::test]
    async fn round_trip_through_paired_layers() {
        let (a, b) = duplex(64 * 1024);
        let mut client = DeflateStream::new(a);
        let mut server = DeflateStream::new(b);

        client.write_all(b"A0001 NOOP\r\n").await.unwrap();
        client.flush().await.unwrap();

        let mut line = vec![0u8; 12];
        server.read_exact(&mut line).await.unwrap();
        assert_eq!(&line, b"A0001 NOOP\r\n");

        server.write_all(b"A0001 OK NOOP completed\r\n").await.unwrap();
        server.flush().await.unwrap();

        let mut reply = vec![0u8; 25];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"A0001 OK NOOP completed\r\n");
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_output() {
        let (a, b) = duplex(64 * 1024);
        let mut client = DeflateStream::new(a);
        let mut server = DeflateStream::new(b);

        client.write_all(b"A0002 LOGOUT\r\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut line = vec![0u8; 14];
        server.read_exact(&mut line).await.unwrap();
        assert_eq!(&line, b"A0002 LOGOUT\r\n");
    }

    #[tokio::test]
    async fn zero_length_destination_leaves_input_intact() {
        let (a, b) = duplex(64 * 1024);
        let mut client = DeflateStream::new(a);
        let mut server = DeflateStream::new(b);

        client.write_all(b"A0003 NOOP\r\n").await.unwrap();
        client.flush().await.unwrap();

        // A full destination buffer returns immediately without touching
        // the buffered compressed input.
        let n = server.read(&mut []).await.unwrap();
        assert_eq!(n, 0);

        let mut line = vec![0u8; 12];
        server.read_exact(&mut line).await.unwrap();
        assert_eq!(&line, b"A0003 NOOP\r\n");
    }

    #[tokio::test]
    async fn large_payload_survives_compression() {
        let (a, b) = duplex(64 * 1024);
        let mut tx = DeflateStream::new(a);
        let mut rx = DeflateStream::new(b);

        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();

        let writer = tokio::spawn(async move {
            tx.write_all(&payload).await.unwrap();
            tx.flush().await.unwrap();
            tx
        });

        let mut received = vec![0u8; expected.len()];
        rx.read_exact(&mut received).await.unwrap();
        writer.await.unwrap();

        assert_eq!(received, expected);
    }
}
