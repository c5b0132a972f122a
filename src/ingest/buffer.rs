//! Bounded FIFO byte buffer between the socket and the framer

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Unconsumed bytes read from the socket
///
/// Holds at most `capacity` bytes. Bytes leave strictly in arrival order via
/// [`consume`](Self::consume); a fill never overwrites or reorders what is
/// already buffered.
#[derive(Debug)]
pub struct IngestBuffer {
    data: Vec<u8>,
    head: usize,
    capacity: usize,
}

impl IngestBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity), head: 0, capacity }
    }

    /// Unconsumed byte count
    pub fn len(&self) -> usize {
        self.data.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes that can still be accepted
    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.len()
    }

    /// Unconsumed bytes, oldest first
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.head..]
    }

    /// Drop the oldest `n` bytes
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds [`len`](Self::len).
    pub fn consume(&mut self, n: usize) {
        assert!(n <= self.len(), "consume({}) beyond {} buffered bytes", n, self.len());
        self.head += n;
        if self.head == self.data.len() {
            self.clear();
        }
    }

    /// Discard everything buffered
    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }

    /// Append as much of `bytes` as fits, returning how many were taken
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> usize {
        let take = bytes.len().min(self.remaining_capacity());
        self.compact();
        self.data.extend_from_slice(&bytes[..take]);
        take
    }

    /// Perform one read of at most `max_bytes` from `reader` into the buffer
    ///
    /// Returns the number of bytes appended; `0` means the reader reached end
    /// of stream. Cancel safe: if the future is dropped before completing,
    /// the buffer is left exactly as it was.
    pub async fn fill_from<R>(&mut self, reader: &mut R, max_bytes: usize) -> io::Result<usize>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let want = max_bytes.min(self.remaining_capacity());
        if want == 0 {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "ingest buffer is full"));
        }
        self.compact();

        let start = self.data.len();
        self.data.resize(start + want, 0);
        let mut guard = Truncate { data: &mut self.data, keep: start };
        let n = reader.read(&mut guard.data[start..]).await?;
        guard.keep = start + n;
        Ok(n)
    }

    fn compact(&mut self) {
        if self.head > 0 {
            self.data.drain(..self.head);
            self.head = 0;
        }
    }
}

// Trims the zero-filled read window back to the bytes actually read, on
// every exit path including cancellation.
struct Truncate<'a> {
    data: &'a mut Vec<u8>,
    keep: usize,
}

impl Drop for Truncate<'_> {
    fn drop(&mut self) {
        self.data.truncate(self.keep);
    }
}
