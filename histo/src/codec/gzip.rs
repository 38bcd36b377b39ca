use super::{classify_io_error, fill_buffer};
use crate::error::{HistoError, Result};
use flate2::bufread::MultiGzDecoder;
use log::debug;
use std::io::{BufRead, Read};

/// Inflate a gzip payload of `expected` bytes into buffers of at most `chunk_len` bytes.
///
/// The gzip framing (magic, CRC32 and ISIZE trailer) is validated by flate2, the
/// trailer is only checked once the stream has been read to its end, which is why
/// the decoder is drained after the expected payload size is reached.
pub(super) fn decode<R: BufRead>(
    reader: R,
    expected: usize,
    chunk_len: usize,
) -> Result<Vec<Vec<u8>>> {
    let mut decoder = MultiGzDecoder::new(reader);
    let mut buffers = Vec::with_capacity(expected / chunk_len + 1);
    let mut remaining = expected;

    while remaining > 0 {
        let mut buffer = vec![0; chunk_len.min(remaining)];
        let size = fill_buffer(&mut decoder, &mut buffer)?;
        if size < buffer.len() {
            return Err(HistoError::decode(format!(
                "gzip payload ends after {} bytes, {} expected",
                expected - remaining + size,
                expected
            )));
        }
        remaining -= size;
        debug!("Inflated {} bytes, {} remaining", size, remaining);
        buffers.push(buffer);
    }

    let mut probe = [0u8; 1];
    loop {
        match decoder.read(&mut probe) {
            Ok(0) => break,
            Ok(_) => {
                return Err(HistoError::decode(format!(
                    "gzip payload is longer than the {} bytes declared by the header",
                    expected
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(classify_io_error(e)),
        }
    }

    Ok(buffers)
}
