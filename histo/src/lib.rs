/**
 * A parallel histogram engine for NRRD style raster files.
 **/
pub mod codec;
pub mod config;
mod error;
pub mod header;
pub mod output;
pub mod pool;
pub mod task;

pub use codec::DecodedPayload;
pub use config::{BinRange, HistogramConfig, MAX_BINS};
pub use error::{HistoError, Result};
pub use header::{Encoding, PayloadDescriptor, SampleType};
pub use pool::{BinBufferPool, BinLease};
pub use task::{Histogram, HistogramTask, RunReport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
