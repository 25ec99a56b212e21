//! The streaming pipeline runner
//!
//! KDBX3's read side is a linear chain: outer AES-256-CBC decryption, a
//! stream-start-bytes check, hashed-block deframing, then optional gzip
//! inflation. [`spawn_read_pipeline`] runs that whole chain on a dedicated
//! worker thread connected to the caller through a bounded [`flume`]
//! channel, so outer decryption can overlap with XML parsing on the
//! caller's thread instead of the two strictly alternating. Writing mirrors
//! the same stages in reverse via [`write_pipeline`]; it stays on the
//! caller's thread since there is nothing downstream for it to overlap with.

use crate::binary;
use crate::config::Config;
use crate::crypto;
use std::io::{self, Read, Write};
use std::thread::JoinHandle;

use aes::Aes256;

use super::block::{HashedBlockReader, HashedBlockWriter, DEFAULT_BLOCK_SIZE};
use super::{BlockCipherReader, BlockCipherWriter, BlockCipherWriterExt, PipelineError};

/// A chunk of bytes handed across a pipeline stage boundary, or the I/O
/// error that closed the channel
type StageMessage = io::Result<Vec<u8>>;

/// Receiving half of an inter-stage channel, exposed to callers as a plain
/// [`Read`] - this is the "bounded, blocking byte buffer" between stages
/// from spec's streaming pipeline runner.
struct ChannelReader {
    rx: flume::Receiver<StageMessage>,
    buffer: Vec<u8>,
    buf_idx: usize,
    done: bool,
}

impl ChannelReader {
    fn new(rx: flume::Receiver<StageMessage>) -> ChannelReader {
        ChannelReader {
            rx,
            buffer: Vec::new(),
            buf_idx: 0,
            done: false,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done {
            return Ok(0);
        }
        if self.buf_idx >= self.buffer.len() {
            match self.rx.recv() {
                Ok(Ok(chunk)) => {
                    self.buffer = chunk;
                    self.buf_idx = 0;
                }
                Ok(Err(e)) => {
                    self.done = true;
                    return Err(e);
                }
                Err(flume::RecvError::Disconnected) => {
                    self.done = true;
                    return Ok(0);
                }
            }
            if self.buffer.is_empty() {
                self.done = true;
                return Ok(0);
            }
        }
        let n = usize::min(buf.len(), self.buffer.len() - self.buf_idx);
        buf[..n].copy_from_slice(&self.buffer[self.buf_idx..self.buf_idx + n]);
        self.buf_idx += n;
        Ok(n)
    }
}

/// Sending half of an inter-stage channel, exposed as a [`Write`]. A dropped
/// receiver - the caller abandoned the stream - surfaces here as
/// `BrokenPipe`, which unwinds the worker thread's read loop promptly.
struct ChannelWriter {
    tx: flume::Sender<StageMessage>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(Ok(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "downstream stage closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Handle to a background pipeline stage and the channel carrying its
/// output. Dropping this before the worker finishes cancels the stream: the
/// closed receiver makes the worker's next write fail and it unwinds at the
/// end of whatever block it's currently processing.
pub(crate) struct PipelineStage {
    reader: ChannelReader,
    worker: Option<JoinHandle<()>>,
}

impl Read for PipelineStage {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Drop for PipelineStage {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn spawn_stage<F>(body: F) -> PipelineStage
where
    F: FnOnce(&mut ChannelWriter) -> io::Result<()> + Send + 'static,
{
    // Small multiple of one chunk in flight, per spec - enough for the
    // worker to stay ahead of a slow consumer without unbounded buffering.
    let (tx, rx) = flume::bounded(4);
    let worker = std::thread::spawn(move || {
        let mut out = ChannelWriter { tx };
        if let Err(e) = body(&mut out) {
            let _ = out.tx.send(Err(e));
        }
        // Otherwise `out` drops here, dropping `tx` and signalling a clean
        // end-of-stream to the reader.
    });
    PipelineStage {
        reader: ChannelReader::new(rx),
        worker: Some(worker),
    }
}

fn block_cipher_read_stream<C, R>(
    inner: R,
    key: crypto::CipherKey,
    iv: &[u8],
) -> io::Result<BlockCipherReader<C, R>>
where
    C: cipher::BlockCipher + cipher::BlockDecryptMut + cipher::KeyInit,
    R: Read,
{
    BlockCipherReader::<C, _>::wrap(inner, key, iv)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid cipher parameters"))
}

/// Compares the first `stream_start_bytes.len()` decrypted bytes against the
/// header's `StreamStartBytes` before forwarding anything downstream -
/// spec's early wrong-key detector.
struct StartBytesReader<R> {
    inner: R,
    expected: Vec<u8>,
    checked: bool,
}

impl<R: Read> StartBytesReader<R> {
    fn new(inner: R, expected: Vec<u8>) -> StartBytesReader<R> {
        StartBytesReader {
            inner,
            expected,
            checked: false,
        }
    }

    fn check(&mut self) -> io::Result<()> {
        let mut actual = vec![0u8; self.expected.len()];
        self.inner.read_exact(&mut actual)?;
        self.checked = true;
        if actual == self.expected {
            Ok(())
        } else {
            Err(PipelineError::BadPassword.into_io())
        }
    }
}

impl<R: Read> Read for StartBytesReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.checked {
            self.check()?;
        }
        self.inner.read(buf)
    }
}

/// Spawn the read-side pipeline - outer decrypt, start-bytes check,
/// hashed-block deframe, optional inflate - on a background thread.
///
/// The returned handle yields plaintext XML bytes. A wrong password
/// surfaces as soon as the first chunk is read, since the start-bytes check
/// runs before anything is forwarded; a corrupt frame discovered only near
/// EOF surfaces when the caller's read reaches that point.
pub(crate) fn spawn_read_pipeline<R>(
    source: R,
    cipher_key: crypto::CipherKey,
    cipher: binary::Cipher,
    iv: Vec<u8>,
    compression: binary::CompressionType,
    stream_start_bytes: Vec<u8>,
    config: Config,
) -> PipelineStage
where
    R: Read + Send + 'static,
{
    let buffer_bytes = config.pipeline_buffer_bytes();
    let max_frame_bytes = config.max_frame_bytes();
    spawn_stage(move |out| {
        tracing::debug!(?cipher, ?compression, "read pipeline starting");
        let decrypted: Box<dyn Read> = match cipher {
            binary::Cipher::Aes256 => {
                Box::new(block_cipher_read_stream::<Aes256, _>(source, cipher_key, &iv)?)
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unsupported outer cipher {:?}", other),
                ))
            }
        };

        let mut start_checked = StartBytesReader::new(decrypted, stream_start_bytes);
        let framed = HashedBlockReader::new(&mut start_checked, max_frame_bytes);
        let mut decompressed: Box<dyn Read> = match compression {
            binary::CompressionType::None => Box::new(framed),
            binary::CompressionType::Gzip => Box::new(libflate::gzip::Decoder::new(framed)?),
            binary::CompressionType::Unknown(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unsupported compression type {:?}", compression),
                ))
            }
        };

        let mut buf = vec![0u8; buffer_bytes];
        let mut total = 0u64;
        loop {
            let n = decompressed.read(&mut buf)?;
            if n == 0 {
                break;
            }
            total += n as u64;
            out.write_all(&buf[..n])?;
        }
        tracing::debug!(plaintext_bytes = total, "read pipeline finished");
        Ok(())
    })
}

/// Write side of the KDBX3 pipeline - hashed-block frame, then outer
/// encrypt, with optional gzip deflation in between.
pub(crate) enum WritePipeline<W: Write> {
    Raw(HashedBlockWriter<BlockCipherWriter<Aes256, W>>),
    Gzip(libflate::gzip::Encoder<HashedBlockWriter<BlockCipherWriter<Aes256, W>>>),
}

impl<W: Write> Write for WritePipeline<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            WritePipeline::Raw(inner) => inner.write(buf),
            WritePipeline::Gzip(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            WritePipeline::Raw(inner) => inner.flush(),
            WritePipeline::Gzip(inner) => inner.flush(),
        }
    }
}

impl<W: Write> WritePipeline<W> {
    /// Flush the terminator frame, unwrap the deflate/frame/cipher stack and
    /// return the underlying sink
    pub(crate) fn finish(self) -> io::Result<W> {
        tracing::debug!("write pipeline finishing");
        let mut framed = match self {
            WritePipeline::Raw(framed) => framed,
            WritePipeline::Gzip(gz) => gz.finish().into_result()?,
        };
        let mut encrypted = framed.finish()?;
        encrypted.finish()
    }
}

/// Build the write-side pipeline. The caller writes plaintext XML bytes to
/// the result and calls [`WritePipeline::finish`] to flush the terminator
/// frame and padding and recover the sink.
pub(crate) fn write_pipeline<W>(
    sink: W,
    cipher_key: crypto::CipherKey,
    cipher: binary::Cipher,
    iv: &[u8],
    compression: binary::CompressionType,
    stream_start_bytes: &[u8],
) -> io::Result<WritePipeline<W>>
where
    W: Write,
{
    tracing::debug!(?cipher, ?compression, "write pipeline starting");
    let mut encrypted: BlockCipherWriter<Aes256, W> = match cipher {
        binary::Cipher::Aes256 => BlockCipherWriter::wrap(sink, cipher_key, iv)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid cipher parameters"))?,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported outer cipher {:?}", other),
            ))
        }
    };
    encrypted.write_all(stream_start_bytes)?;
    let framed = HashedBlockWriter::new(encrypted, DEFAULT_BLOCK_SIZE);
    Ok(match compression {
        binary::CompressionType::None => WritePipeline::Raw(framed),
        binary::CompressionType::Gzip => {
            WritePipeline::Gzip(libflate::gzip::Encoder::new(framed)?)
        }
        binary::CompressionType::Unknown(_) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported compression type {:?}", compression),
            ))
        }
    })
}
