use crate::codec::WINDOW_SIZE;
use crate::error::{HistoError, Result};
use log::{debug, warn};
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// The maximum number of axes a payload can declare
pub const MAX_DIMENSIONS: usize = 16;

/// The sample types the engine understands.
///
/// The table is fixed to one byte unsigned and two byte signed samples. Other type
/// tokens, including the four byte `int` used by some writers, are rejected rather
/// than being read with the wrong width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleType {
    UnsignedChar,
    Short,
}

impl SampleType {
    /// Look up a TYPE value, the token is expected to be trimmed already
    pub fn from_token(token: &str) -> Result<Self> {
        let normalized = token
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();
        match normalized.as_str() {
            "UNSIGNED CHAR" | "UCHAR" | "UINT8" | "UINT8_T" => Ok(Self::UnsignedChar),
            "SHORT" | "SHORT INT" | "SIGNED SHORT" | "SIGNED SHORT INT" | "INT16" | "INT16_T" => {
                Ok(Self::Short)
            }
            "INT" | "SIGNED INT" | "INT32" | "INT32_T" => Err(HistoError::format(format!(
                "sample type '{}' is not supported, only 'unsigned char' and 'short' are",
                token
            ))),
            _ => Err(HistoError::format(format!(
                "unknown sample type '{}'",
                token
            ))),
        }
    }

    /// The number of bytes a single sample occupies
    pub fn width(self) -> usize {
        match self {
            Self::UnsignedChar => 1,
            Self::Short => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::UnsignedChar => "unsigned char",
            Self::Short => "short",
        }
    }
}

/// The payload encoding declared by the header
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Encoding {
    Gzip,
    Raw,
    /// A well-formed encoding name that this engine can not decode
    Unsupported(String),
}

impl Encoding {
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_uppercase().as_str() {
            "GZIP" | "GZ" => Self::Gzip,
            "RAW" => Self::Raw,
            _ => Self::Unsupported(token.trim().to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Gzip => "gzip",
            Self::Raw => "raw",
            Self::Unsupported(name) => name.as_str(),
        }
    }
}

/// Everything the header tells us about the binary payload
#[derive(Clone, Debug)]
pub struct PayloadDescriptor {
    sample_type: SampleType,
    dimension: usize,
    sizes: [usize; MAX_DIMENSIONS],
    encoding: Encoding,
    sample_count: usize,
    payload_offset: u64,
}

#[derive(Default)]
struct RawHeader {
    sample_type: Option<SampleType>,
    dimension: Option<usize>,
    sizes: Option<Vec<usize>>,
    encoding: Option<Encoding>,
}

fn parse_lenient(key: &str, token: &str) -> usize {
    token.parse().unwrap_or_else(|_| {
        warn!("Invalid {} value '{}', assuming 1", key, token);
        1
    })
}

fn check_endian(value: &str) {
    let declared = value.trim().to_lowercase();
    let host = if cfg!(target_endian = "little") {
        "little"
    } else {
        "big"
    };
    if declared != host {
        warn!(
            "Payload declares {} endian samples, reading them as host ({}) endian",
            declared, host
        );
    }
}

impl RawHeader {
    fn feed_line(&mut self, line: &str) -> Result<()> {
        if line.starts_with('#') {
            return Ok(());
        }
        let (key, value) = match line.find(':') {
            Some(pos) => (line[..pos].trim(), line[pos + 1..].trim()),
            None => {
                debug!("Skipping header line without a key: {}", line);
                return Ok(());
            }
        };
        match key.to_uppercase().as_str() {
            "TYPE" => self.sample_type = Some(SampleType::from_token(value)?),
            "DIMENSION" => self.dimension = Some(parse_lenient("dimension", value)),
            "SIZES" => {
                let sizes: Vec<_> = value
                    .split_whitespace()
                    .map(|tok| parse_lenient("size", tok))
                    .collect();
                if sizes.len() > MAX_DIMENSIONS {
                    return Err(HistoError::format(format!(
                        "{} sizes declared, at most {} axes are supported",
                        sizes.len(),
                        MAX_DIMENSIONS
                    )));
                }
                self.sizes = Some(sizes);
            }
            "ENCODING" => self.encoding = Some(Encoding::from_token(value)),
            "ENDIAN" => check_endian(value),
            _ => debug!("Ignoring unrecognized header key '{}'", key),
        }
        Ok(())
    }

    fn finish(self, payload_offset: u64) -> Result<PayloadDescriptor> {
        let sample_type = self
            .sample_type
            .ok_or_else(|| HistoError::format("header has no TYPE field"))?;
        let encoding = self
            .encoding
            .ok_or_else(|| HistoError::format("header has no ENCODING field"))?;
        let given_sizes = self
            .sizes
            .ok_or_else(|| HistoError::format("header has no SIZES field"))?;
        let dimension = self.dimension.unwrap_or_else(|| given_sizes.len());

        if dimension == 0 || dimension > MAX_DIMENSIONS {
            return Err(HistoError::format(format!(
                "dimension {} is outside of 1..={}",
                dimension, MAX_DIMENSIONS
            )));
        }
        if dimension != given_sizes.len() {
            warn!(
                "Header declares {} dimensions but lists {} sizes, only the first {} axes are used",
                dimension,
                given_sizes.len(),
                dimension
            );
        }

        let used = dimension.min(given_sizes.len());
        let mut sizes = [1; MAX_DIMENSIONS];
        sizes[..used].copy_from_slice(&given_sizes[..used]);

        let sample_count = sizes[..dimension].iter().try_fold(1usize, |acc, &s| {
            acc.checked_mul(s).ok_or_else(|| {
                HistoError::Overflow(format!(
                    "product of sizes {:?} overflows",
                    &sizes[..dimension]
                ))
            })
        })?;

        sample_count
            .checked_mul(sample_type.width())
            .ok_or_else(|| {
                HistoError::Overflow(format!(
                    "{} samples of {} bytes can not be addressed",
                    sample_count,
                    sample_type.width()
                ))
            })?;

        Ok(PayloadDescriptor {
            sample_type,
            dimension,
            sizes,
            encoding,
            sample_count,
            payload_offset,
        })
    }
}

impl PayloadDescriptor {
    /// Parse the textual header, leaving the reader at the first payload byte
    pub fn parse<R: BufRead>(mut reader: R) -> Result<Self> {
        let mut header = RawHeader::default();
        let mut offset = 0u64;
        let mut line = Vec::new();
        loop {
            line.clear();
            let size = reader.read_until(b'\n', &mut line)?;
            if size == 0 {
                return Err(HistoError::format(
                    "header is not terminated by an empty line",
                ));
            }
            offset += size as u64;
            if line.last() != Some(&b'\n') {
                return Err(HistoError::format(
                    "header is not terminated by an empty line",
                ));
            }
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(&['\n', '\r'][..]);
            if text.is_empty() {
                break;
            }
            header.feed_line(text)?;
        }
        header.finish(offset)
    }

    /// Open a file and parse its header, the returned reader streams the payload
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, BufReader<File>)> {
        let mut reader = BufReader::with_capacity(WINDOW_SIZE, File::open(path.as_ref())?);
        let descriptor = Self::parse(&mut reader)?;
        Ok((descriptor, reader))
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The per-axis extents, axes past the declared dimension are reported as 1
    pub fn sizes(&self) -> &[usize; MAX_DIMENSIONS] {
        &self.sizes
    }

    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Size of the decoded payload in bytes, checked when the header was parsed
    pub fn payload_len(&self) -> usize {
        self.sample_count * self.sample_type.width()
    }

    /// Byte offset of the payload from the beginning of the file
    pub fn payload_offset(&self) -> u64 {
        self.payload_offset
    }
}

impl Display for PayloadDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let sizes: Vec<_> = self.sizes[..self.dimension]
            .iter()
            .map(ToString::to_string)
            .collect();
        writeln!(f, "type\t{}", self.sample_type.name())?;
        writeln!(f, "dimension\t{}", self.dimension)?;
        writeln!(f, "sizes\t{}", sizes.join(" "))?;
        writeln!(f, "encoding\t{}", self.encoding.name())?;
        writeln!(f, "samples\t{}", self.sample_count)?;
        write!(f, "payload_offset\t{}", self.payload_offset)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{Cursor, Read};
    type TestResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

    #[test]
    fn test_parse_header() -> TestResult<()> {
        let data = b"NRRD0004\n# comment: here\ntype: unsigned char\ndimension: 3\nsizes: 215 215 167\nencoding: gzip\n\n\x1f\x8b";
        let mut reader = Cursor::new(&data[..]);
        let desc = PayloadDescriptor::parse(&mut reader)?;
        assert_eq!(desc.sample_type(), SampleType::UnsignedChar);
        assert_eq!(desc.dimension(), 3);
        assert_eq!(&desc.sizes()[..4], &[215, 215, 167, 1]);
        assert_eq!(desc.encoding(), &Encoding::Gzip);
        assert_eq!(desc.sample_count(), 215 * 215 * 167);
        assert_eq!(desc.payload_offset(), data.len() as u64 - 2);

        let mut rest = vec![];
        reader.read_to_end(&mut rest)?;
        assert_eq!(rest, vec![0x1f, 0x8b]);
        Ok(())
    }

    #[test]
    fn test_case_insensitive_keys_and_crlf() -> TestResult<()> {
        let data = b"TYPE:SHORT\r\nDimension: 2\r\nSiZeS: 4 5\r\nENCODING: RAW\r\nspace: right\r\n\r\n";
        let desc = PayloadDescriptor::parse(Cursor::new(&data[..]))?;
        assert_eq!(desc.sample_type(), SampleType::Short);
        assert_eq!(desc.sample_count(), 20);
        assert_eq!(desc.payload_len(), 40);
        assert_eq!(desc.encoding(), &Encoding::Raw);
        Ok(())
    }

    #[test]
    fn test_lenient_sizes() -> TestResult<()> {
        let data = b"type: uchar\ndimension: 3\nsizes: 4 ? 3\nencoding: raw\n\n";
        let desc = PayloadDescriptor::parse(Cursor::new(&data[..]))?;
        assert_eq!(&desc.sizes()[..3], &[4, 1, 3]);
        assert_eq!(desc.sample_count(), 12);

        let data = b"type: uchar\ndimension: x\nsizes: 4 ? 3\nencoding: raw\n\n";
        let desc = PayloadDescriptor::parse(Cursor::new(&data[..]))?;
        assert_eq!(desc.dimension(), 1);
        assert_eq!(desc.sample_count(), 4);
        Ok(())
    }

    #[test]
    fn test_dimension_selects_the_sizes() -> TestResult<()> {
        let data = b"type: uchar\ndimension: 2\nsizes: 4 5 6\nencoding: raw\n\n";
        let desc = PayloadDescriptor::parse(Cursor::new(&data[..]))?;
        assert_eq!(&desc.sizes()[..3], &[4, 5, 1]);
        assert_eq!(desc.sample_count(), 20);
        let text = desc.to_string();
        assert!(text.contains("sizes\t4 5\n"));
        assert!(text.contains("samples\t20\n"));

        let data = b"type: uchar\ndimension: 3\nsizes: 4 5\nencoding: raw\n\n";
        let desc = PayloadDescriptor::parse(Cursor::new(&data[..]))?;
        assert_eq!(desc.sample_count(), 20);
        assert!(desc.to_string().contains("sizes\t4 5 1\n"));
        Ok(())
    }

    #[test]
    fn test_rejects_unknown_type() {
        for token in &["int", "float", "double"] {
            let data = format!("type: {}\nsizes: 1\nencoding: raw\n\n", token);
            let err = PayloadDescriptor::parse(Cursor::new(data.as_bytes())).unwrap_err();
            assert_eq!(err.kind(), "FormatError");
        }
    }

    #[test]
    fn test_unsupported_encoding_is_parsed() -> TestResult<()> {
        let data = b"type: short\nsizes: 2 2\nencoding: bzip2\n\n";
        let desc = PayloadDescriptor::parse(Cursor::new(&data[..]))?;
        assert_eq!(desc.encoding(), &Encoding::Unsupported("bzip2".to_string()));
        Ok(())
    }

    #[test]
    fn test_unterminated_header() {
        let data = b"type: short\nsizes: 2 2\nencoding: raw\n";
        let err = PayloadDescriptor::parse(Cursor::new(&data[..])).unwrap_err();
        assert_eq!(err.kind(), "FormatError");
    }

    #[test]
    fn test_missing_fields() {
        let data = b"type: short\nencoding: raw\n\n";
        assert!(PayloadDescriptor::parse(Cursor::new(&data[..])).is_err());
        let data = b"sizes: 1\nencoding: raw\n\n";
        assert!(PayloadDescriptor::parse(Cursor::new(&data[..])).is_err());
    }

    #[test]
    fn test_overflow() {
        let huge = usize::MAX / 2;
        let data = format!("type: short\nsizes: {} 3\nencoding: raw\n\n", huge);
        let err = PayloadDescriptor::parse(Cursor::new(data.as_bytes())).unwrap_err();
        assert_eq!(err.kind(), "OverflowError");
    }

    #[test]
    fn test_zero_size_is_parsed() -> TestResult<()> {
        let data = b"type: uchar\nsizes: 0 1 1\nencoding: raw\n\n";
        let desc = PayloadDescriptor::parse(Cursor::new(&data[..]))?;
        assert_eq!(desc.sample_count(), 0);
        Ok(())
    }
}
