/*! Payload decoders.

The encoding named by the header is a closed set: gzip and raw payloads are decoded,
every other name is rejected before any counting work starts.
*/
mod gzip;
mod raw;

use crate::error::{HistoError, Result};
use crate::header::{Encoding, PayloadDescriptor};
use std::io::{BufRead, ErrorKind, Read};

/// The size of the window compressed bytes are streamed through
pub const WINDOW_SIZE: usize = 16 * 1024;

/// The decoded payload, as an ordered list of buffers
#[derive(Debug)]
pub struct DecodedPayload {
    buffers: Vec<Vec<u8>>,
}

impl DecodedPayload {
    pub fn new(buffers: Vec<Vec<u8>>) -> Self {
        Self { buffers }
    }

    pub fn buffers(&self) -> &[Vec<u8>] {
        &self.buffers
    }

    /// Total number of decoded bytes
    pub fn len(&self) -> usize {
        self.buffers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_buffers(self) -> Vec<Vec<u8>> {
        self.buffers
    }
}

impl Encoding {
    /// Fails with a format error unless this encoding has a decoder
    pub fn ensure_supported(&self) -> Result<()> {
        match self {
            Encoding::Gzip | Encoding::Raw => Ok(()),
            Encoding::Unsupported(name) => Err(unsupported(name)),
        }
    }

    /// Decode `sample_count` samples of `sample_width` bytes from the reader.
    ///
    /// `chunk_len` is a hint for the size of each output buffer, it's rounded up to a
    /// whole number of samples.
    pub fn decode<R: BufRead>(
        &self,
        reader: R,
        sample_count: usize,
        sample_width: usize,
        chunk_len: usize,
    ) -> Result<DecodedPayload> {
        let expected = sample_count.checked_mul(sample_width).ok_or_else(|| {
            HistoError::Overflow(format!(
                "{} samples of {} bytes can not be addressed",
                sample_count, sample_width
            ))
        })?;
        let chunk_len = align_up(chunk_len.max(1), sample_width);
        let buffers = match self {
            Encoding::Gzip => gzip::decode(reader, expected, chunk_len)?,
            Encoding::Raw => raw::decode(reader, expected)?,
            Encoding::Unsupported(name) => return Err(unsupported(name)),
        };
        Ok(DecodedPayload::new(buffers))
    }
}

/// Decode the payload of a parsed file, producing roughly one buffer per worker
pub fn decode_payload<R: BufRead>(
    reader: R,
    descriptor: &PayloadDescriptor,
    parallelism: usize,
) -> Result<DecodedPayload> {
    let chunk_len = (descriptor.payload_len() / parallelism.max(1)).max(WINDOW_SIZE);
    descriptor.encoding().decode(
        reader,
        descriptor.sample_count(),
        descriptor.sample_type().width(),
        chunk_len,
    )
}

fn unsupported(name: &str) -> HistoError {
    HistoError::format(format!("unsupported encoding '{}'", name))
}

fn align_up(len: usize, width: usize) -> usize {
    match len % width {
        0 => len,
        rem => len + (width - rem),
    }
}

/// Corrupt or truncated data is a decode error, everything else is plain I/O
fn classify_io_error(err: std::io::Error) -> HistoError {
    match err.kind() {
        ErrorKind::InvalidInput | ErrorKind::InvalidData | ErrorKind::UnexpectedEof => {
            HistoError::Decode(err.to_string())
        }
        _ => HistoError::Io(err),
    }
}

/// Read until the buffer is full or the stream ends, returns the bytes read
fn fill_buffer<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(classify_io_error(e)),
        }
    }
    Ok(filled)
}
