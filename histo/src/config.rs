use crate::error::{HistoError, Result};
use serde_derive::{Deserialize, Serialize};
use std::io::Read;
use std::path::PathBuf;

/// The engine configuration: bin layout and the files to read and write
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistogramConfig {
    /// Number of bins in the histogram
    pub bins: usize,
    /// Value mapped to the lowest populated bin, smaller samples are clamped to it
    pub min: u32,
    /// Value mapped to the highest populated bin, larger samples are clamped to it
    pub max: u32,
    pub input: PathBuf,
    pub output: PathBuf,
    /// Number of counting tasks per decoded buffer, defaults to the number of CPUs
    #[serde(default)]
    pub threads: Option<usize>,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            bins: 256,
            min: 0,
            max: 255,
            input: PathBuf::from("sample.nrrd"),
            output: PathBuf::from("solution.txt"),
            threads: None,
        }
    }
}

impl HistogramConfig {
    /// Load a configuration from JSON, missing fields are an error
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader).map_err(|e| HistoError::InvalidConfig(e.to_string()))
    }

    /// Pretty print the configuration in JSON format
    pub fn pretty_print(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn bin_range(&self) -> Result<BinRange> {
        BinRange::new(self.bins, self.min, self.max)
    }

    pub fn parallelism(&self) -> usize {
        match self.threads {
            Some(n) if n > 0 => n,
            _ => default_parallelism(),
        }
    }
}

pub fn default_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Largest supported bin count, bin indices must fit a 16 bit unsigned integer
pub const MAX_BINS: usize = u16::MAX as usize;

/// A validated `[min, max]` clamp range over `bins` counters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BinRange {
    bins: usize,
    min: u32,
    max: u32,
}

impl BinRange {
    pub fn new(bins: usize, min: u32, max: u32) -> Result<Self> {
        if bins == 0 {
            return Err(HistoError::InvalidConfig(
                "the histogram needs at least one bin".to_string(),
            ));
        }
        if bins > MAX_BINS {
            return Err(HistoError::InvalidConfig(format!(
                "{} bins requested, at most {} are supported",
                bins, MAX_BINS
            )));
        }
        if min > max {
            return Err(HistoError::InvalidConfig(format!(
                "min ({}) is larger than max ({})",
                min, max
            )));
        }
        if max as usize >= bins {
            return Err(HistoError::BinIndexOutOfRange {
                index: max as usize,
                bins,
            });
        }
        Ok(Self { bins, min, max })
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Map a sample value to its bin, values outside of the range land in the boundary bins
    #[inline(always)]
    pub fn clamp_index(&self, value: i64) -> usize {
        value.max(self.min as i64).min(self.max as i64) as usize
    }
}
