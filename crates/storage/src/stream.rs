//! Progress-reporting reader used as the body of simple uploads.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use biotransfer_common::ProgressCounter;
use tokio::io::{AsyncRead, ReadBuf};

/// Wraps a reader and adds every byte read to a [`ProgressCounter`].
///
/// Only reads are intercepted; the wrapped reader stays reachable through
/// [`get_ref`](Self::get_ref), [`get_mut`](Self::get_mut) and
/// [`into_inner`](Self::into_inner).
#[derive(Debug)]
pub struct ProgressReader<R> {
    inner: R,
    counter: ProgressCounter,
}

impl<R> ProgressReader<R> {
    /// Wrap `inner`, reporting into `counter`.
    pub fn new(inner: R, counter: ProgressCounter) -> Self {
        Self { inner, counter }
    }

    /// Counter this reader reports into.
    pub fn counter(&self) -> &ProgressCounter {
        &self.counter
    }

    /// Borrow the wrapped reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the wrapped reader. Bytes read through it are not counted.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Unwrap the reader, dropping the counter handle.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before: usize = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let read: usize = buf.filled().len() - before;
            if read > 0 {
                self.counter.add(read as u64);
            }
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_counts_every_byte_read() {
        let data: Vec<u8> = vec![7u8; 10_000];
        let counter: ProgressCounter = ProgressCounter::new();
        let mut reader = ProgressReader::new(data.as_slice(), counter.clone());

        let mut first: [u8; 100] = [0; 100];
        reader.read_exact(&mut first).await.unwrap();
        assert_eq!(counter.get(), 100);

        let mut rest: Vec<u8> = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest.len(), 9_900);
        assert_eq!(counter.get(), 10_000);
    }

    #[tokio::test]
    async fn test_into_inner_returns_reader() {
        let data: &[u8] = b"abc";
        let reader = ProgressReader::new(data, ProgressCounter::new());
        assert_eq!(reader.get_ref().len(), 3);
        assert_eq!(reader.into_inner(), b"abc");
    }
}
