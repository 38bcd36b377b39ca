use clap::ArgMatches;
use histo::{HistoError, HistogramConfig};
use rayon::ThreadPoolBuildError;
use std::error::Error;
use std::fs::File;
use std::io;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub type AppResult<T> = Result<T, Box<dyn Error>>;

fn parse_value<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> AppResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match matches.value_of(name) {
        Some(text) => Ok(Some(text.parse().map_err(|e: T::Err| {
            format!("Invalid value '{}' for --{}: {}", text, name, e)
        })?)),
        None => Ok(None),
    }
}

/// Build the engine configuration: the JSON config file if any, then the command line flags
pub fn make_config(matches: &ArgMatches) -> AppResult<HistogramConfig> {
    let mut config = match matches.value_of("config") {
        Some(path) => HistogramConfig::from_json_reader(File::open(path)?)?,
        None => HistogramConfig::default(),
    };
    if let Some(bins) = parse_value(matches, "bins")? {
        config.bins = bins;
    }
    if let Some(min) = parse_value(matches, "min")? {
        config.min = min;
    }
    if let Some(max) = parse_value(matches, "max")? {
        config.max = max;
    }
    if let Some(input) = matches.value_of("input") {
        config.input = input.into();
    }
    if let Some(output) = matches.value_of("output") {
        config.output = output.into();
    }
    if let Some(threads) = parse_value(matches, "threads")? {
        config.threads = Some(threads);
    }
    Ok(config)
}

pub fn setup_thread_pool(config: &HistogramConfig) -> Result<(), ThreadPoolBuildError> {
    if let Some(threads) = config.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }
    Ok(())
}

/// The one line diagnostic for a failed subcommand, `None` when the failure should stay silent.
///
/// Engine failures are prefixed with their error class.
pub fn describe_failure(err: &(dyn Error + 'static)) -> Option<String> {
    let io_error = match err.downcast_ref::<HistoError>() {
        Some(HistoError::Io(io_error)) => Some(io_error),
        Some(_) => None,
        None => err.downcast_ref::<io::Error>(),
    };
    if io_error.map_or(false, |e| e.kind() == io::ErrorKind::BrokenPipe) {
        return None;
    }
    Some(match err.downcast_ref::<HistoError>() {
        Some(histo_error) => format!("{}: {}", histo_error.kind(), histo_error),
        None => format!("Error: {}", err),
    })
}

/// Programming errors abort the process instead of exiting normally
pub fn is_bug(err: &(dyn Error + 'static)) -> bool {
    err.downcast_ref::<HistoError>()
        .map_or(false, HistoError::is_bug)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_engine_failure_is_described_once() {
        let err: Box<dyn Error> = HistoError::Format("unsupported encoding 'bzip2'".into()).into();
        let message = describe_failure(err.as_ref()).unwrap();
        assert_eq!(
            message,
            "FormatError: Malformed input: unsupported encoding 'bzip2'"
        );
        assert_eq!(message.lines().count(), 1);
        assert!(!is_bug(err.as_ref()));
    }

    #[test]
    fn test_broken_pipe_is_silent() {
        let pipe = || io::Error::new(io::ErrorKind::BrokenPipe, "closed");
        let plain: Box<dyn Error> = pipe().into();
        let wrapped: Box<dyn Error> = HistoError::from(pipe()).into();
        assert!(describe_failure(plain.as_ref()).is_none());
        assert!(describe_failure(wrapped.as_ref()).is_none());
    }

    #[test]
    fn test_other_failures() {
        let err: Box<dyn Error> = "Invalid value 'x' for --bins".into();
        assert_eq!(
            describe_failure(err.as_ref()).as_deref(),
            Some("Error: Invalid value 'x' for --bins")
        );
        let err: Box<dyn Error> = HistoError::PoolInvariant("leak".into()).into();
        assert!(is_bug(err.as_ref()));
    }
}
