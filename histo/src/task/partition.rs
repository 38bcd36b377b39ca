use crate::codec::DecodedPayload;

/// A sample aligned view into one decoded buffer
#[derive(Clone, Copy, Debug)]
pub struct Slice<'a> {
    buffer: usize,
    offset: usize,
    data: &'a [u8],
}

impl<'a> Slice<'a> {
    /// Index of the decoded buffer this slice belongs to
    pub fn buffer(&self) -> usize {
        self.buffer
    }

    /// Byte offset of this slice inside its buffer
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Split every decoded buffer into `parallelism` near equal slices.
///
/// Each slice length is rounded down to a multiple of `width` so that no sample is
/// cut in half; the last slice of a buffer takes whatever is left. Empty slices are
/// dropped.
pub fn partition(payload: &DecodedPayload, parallelism: usize, width: usize) -> Vec<Slice<'_>> {
    assert!(width > 0, "sample width must be positive");
    let parts = parallelism.max(1);
    let mut slices = Vec::with_capacity(payload.buffers().len() * parts);

    for (buffer_idx, buffer) in payload.buffers().iter().enumerate() {
        let step = buffer.len() / parts / width * width;
        let mut offset = 0;
        for part in 0..parts {
            let end = if part + 1 == parts {
                buffer.len()
            } else {
                offset + step
            };
            if end > offset {
                slices.push(Slice {
                    buffer: buffer_idx,
                    offset,
                    data: &buffer[offset..end],
                });
            }
            offset = end;
        }
    }

    slices
}
