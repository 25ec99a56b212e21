//! Hashed-block framing
//!
//! KDBX3 does not use an HMAC over the encrypted stream like KDBX4 does -
//! once the outer cipher is decrypted, the plaintext is split into
//! sequentially-indexed blocks, each prefixed with a plain SHA-256 hash of
//! its own payload. A block with a zero length terminates the stream; its
//! hash is not meaningful and is not checked.

use super::PipelineError;
use crate::crypto;
use std::io::{self, Read, Write};

/// Default payload size per hashed block when writing, matching what
/// KeePass 2.x itself uses
pub(crate) const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

pub(crate) struct HashedBlockReader<R>
where
    R: Read,
{
    inner: R,
    buffer: Vec<u8>,
    buf_idx: usize,
    max_frame_bytes: usize,
    next_index: u32,
    finished: bool,
}

impl<R> HashedBlockReader<R>
where
    R: Read,
{
    pub(crate) fn new(inner: R, max_frame_bytes: usize) -> HashedBlockReader<R> {
        HashedBlockReader {
            inner,
            buffer: Vec::new(),
            buf_idx: 0,
            max_frame_bytes,
            next_index: 0,
            finished: false,
        }
    }

    fn buffer_next_block(&mut self) -> io::Result<usize> {
        // The per-block hash only covers the payload, not the index, so a
        // reordered or duplicated block with an otherwise-valid hash would
        // pass unnoticed unless the index itself is checked against the
        // running counter (spec's requirement that block_index increments
        // from 0).
        let mut index_buf = [0u8; 4];
        self.inner.read_exact(&mut index_buf)?;
        let index = u32::from_le_bytes(index_buf);
        if index != self.next_index {
            return Err(PipelineError::CorruptFrame.into_io());
        }
        self.next_index = self.next_index.wrapping_add(1);
        let mut hash_buf = [0u8; 32];
        self.inner.read_exact(&mut hash_buf)?;
        let mut len_buf = [0u8; 4];
        self.inner.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;

        if len == 0 {
            self.finished = true;
            self.buffer.clear();
            self.buf_idx = 0;
            return Ok(0);
        }

        if len > self.max_frame_bytes {
            return Err(PipelineError::CorruptFrame.into_io());
        }

        self.buffer.resize_with(len, Default::default);
        self.inner.read_exact(&mut self.buffer)?;
        self.buf_idx = 0;
        if crypto::verify_sha256(&self.buffer, &hash_buf) {
            Ok(len)
        } else {
            Err(PipelineError::IntegrityFailure.into_io())
        }
    }
}

impl<R> Read for HashedBlockReader<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished {
            return Ok(0);
        }
        let mut remaining_in_buffer = self.buffer.len() - self.buf_idx;

        if remaining_in_buffer == 0 {
            remaining_in_buffer = self.buffer_next_block()?;
            if remaining_in_buffer == 0 {
                return Ok(0);
            }
        }
        let copy_len = usize::min(remaining_in_buffer, buf.len());
        buf[..copy_len].copy_from_slice(&self.buffer[self.buf_idx..self.buf_idx + copy_len]);
        self.buf_idx += copy_len;
        Ok(copy_len)
    }
}

pub(crate) struct HashedBlockWriter<W>
where
    W: Write,
{
    inner: Option<W>,
    buffer: Vec<u8>,
    block_size: usize,
    block_index: u32,
}

impl<W> HashedBlockWriter<W>
where
    W: Write,
{
    pub(crate) fn new(inner: W, block_size: usize) -> HashedBlockWriter<W> {
        HashedBlockWriter {
            inner: Some(inner),
            buffer: Vec::with_capacity(block_size),
            block_size,
            block_index: 0,
        }
    }

    fn flush_block(&mut self) -> io::Result<()> {
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "Stream already closed"))?;
        let hash = crypto::sha256(&self.buffer);
        inner.write_all(&self.block_index.to_le_bytes())?;
        inner.write_all(&hash)?;
        inner.write_all(&(self.buffer.len() as u32).to_le_bytes())?;
        inner.write_all(&self.buffer)?;
        self.block_index += 1;
        self.buffer.clear();
        Ok(())
    }

    /// Flush any buffered bytes as a final short block, then write the
    /// zero-length terminator block
    pub(crate) fn finish(&mut self) -> io::Result<W> {
        if !self.buffer.is_empty() {
            self.flush_block()?;
        }
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "Stream already closed"))?;
        inner.write_all(&self.block_index.to_le_bytes())?;
        inner.write_all(&[0u8; 32])?;
        inner.write_all(&0u32.to_le_bytes())?;
        Ok(self.inner.take().unwrap())
    }
}

impl<W> Write for HashedBlockWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        let mut remaining = buf;
        while !remaining.is_empty() {
            let space = self.block_size - self.buffer.len();
            let take = space.min(remaining.len());
            self.buffer.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
            written += take;
            if self.buffer.len() == self.block_size {
                self.flush_block()?;
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(inner) = self.inner.as_mut() {
            inner.flush()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_data_spanning_several_blocks() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut framed = Vec::new();
        {
            let mut writer = HashedBlockWriter::new(&mut framed, 1024);
            writer.write_all(&payload).unwrap();
            writer.finish().unwrap();
        }

        let mut reader = HashedBlockReader::new(framed.as_slice(), 1_000_000);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn empty_payload_round_trips() {
        let mut framed = Vec::new();
        {
            let mut writer = HashedBlockWriter::new(&mut framed, 1024);
            writer.finish().unwrap();
        }
        let mut reader = HashedBlockReader::new(framed.as_slice(), 1_000_000);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn corrupted_payload_is_rejected() {
        let mut framed = Vec::new();
        {
            let mut writer = HashedBlockWriter::new(&mut framed, 1024);
            writer.write_all(b"hello world").unwrap();
            writer.finish().unwrap();
        }
        // Flip a byte inside the payload, after the 4-byte index and 32-byte hash.
        framed[4 + 32 + 4] ^= 0xFF;

        let mut reader = HashedBlockReader::new(framed.as_slice(), 1_000_000);
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
    }

    #[test]
    fn out_of_order_block_index_is_rejected() {
        let mut framed = Vec::new();
        {
            let mut writer = HashedBlockWriter::new(&mut framed, 1024);
            writer.write_all(b"hello world").unwrap();
            writer.finish().unwrap();
        }
        // The payload and its hash are untouched - only the leading index is
        // bumped from the expected 0 to 1, which the hash alone can't catch.
        framed[0..4].copy_from_slice(&1u32.to_le_bytes());

        let mut reader = HashedBlockReader::new(framed.as_slice(), 1_000_000);
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
    }

    #[test]
    fn oversized_frame_is_rejected_before_allocating() {
        let mut framed = Vec::new();
        framed.extend_from_slice(&0u32.to_le_bytes());
        framed.extend_from_slice(&[0u8; 32]);
        framed.extend_from_slice(&(50_000_000u32).to_le_bytes());
        let mut reader = HashedBlockReader::new(framed.as_slice(), 1_000_000);
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
    }
}
