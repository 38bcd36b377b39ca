use crate::error::Result;
use crate::pool::BinCounter;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write one `(index, count)` line per bin, in increasing index order
pub fn write_histogram<W: Write, T: BinCounter>(mut writer: W, bins: &[T]) -> std::io::Result<()> {
    for (idx, count) in bins.iter().enumerate() {
        writeln!(writer, "({}, {})", idx, count.as_u64())?;
    }
    Ok(())
}

/// Writes a histogram file without ever leaving a half written file at the target path.
///
/// Data goes to `<path>.partial` first and is renamed over the target once complete.
/// Dropping the writer before [HistogramWriter::finish] removes the partial file.
pub struct HistogramWriter {
    path: PathBuf,
    partial_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl HistogramWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let mut partial = path.as_os_str().to_owned();
        partial.push(".partial");
        let partial_path = PathBuf::from(partial);
        let writer = BufWriter::new(File::create(&partial_path)?);
        Ok(Self {
            path,
            partial_path,
            writer: Some(writer),
        })
    }

    pub fn write<T: BinCounter>(&mut self, bins: &[T]) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            write_histogram(writer, bins)?;
        }
        Ok(())
    }

    /// Flush the data and move it to the target path, replacing any existing file.
    ///
    /// On failure the partial file is removed and the target is left as it was.
    pub fn finish(mut self) -> Result<()> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => return Ok(()),
        };
        let committed = Self::commit(writer, &self.partial_path, &self.path);
        if committed.is_err() {
            let _ = fs::remove_file(&self.partial_path);
        }
        committed
    }

    fn commit(writer: BufWriter<File>, partial_path: &Path, path: &Path) -> Result<()> {
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(partial_path, path)?;
        Ok(())
    }
}

impl Drop for HistogramWriter {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            let _ = fs::remove_file(&self.partial_path);
        }
    }
}

/// Write the histogram to `path`
pub fn write_histogram_file<P: AsRef<Path>, T: BinCounter>(path: P, bins: &[T]) -> Result<()> {
    let mut writer = HistogramWriter::create(path)?;
    writer.write(bins)?;
    writer.finish()
}
