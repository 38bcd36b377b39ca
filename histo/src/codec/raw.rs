use super::fill_buffer;
use crate::error::{HistoError, Result};
use log::debug;
use std::io::BufRead;

/// Copy exactly `expected` bytes out of the stream
pub(super) fn decode<R: BufRead>(mut reader: R, expected: usize) -> Result<Vec<Vec<u8>>> {
    let mut buffer = vec![0; expected];
    let size = fill_buffer(&mut reader, &mut buffer)?;
    if size < expected {
        return Err(HistoError::decode(format!(
            "raw payload ends after {} bytes, {} expected",
            size, expected
        )));
    }
    if !reader.fill_buf()?.is_empty() {
        debug!("Ignoring trailing bytes after the raw payload");
    }
    Ok(vec![buffer])
}
