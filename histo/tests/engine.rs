use flate2::{write::GzEncoder, Compression};
use histo::{BinBufferPool, HistogramConfig, HistogramTask};
use rand::Rng;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

type TestResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("histo-{}-{}", std::process::id(), name))
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn write_nrrd(name: &str, sample_type: &str, sizes: &str, encoding: &str, payload: &[u8]) -> PathBuf {
    let path = temp_path(name);
    let mut content = format!(
        "NRRD0004\n# generated for testing\ntype: {}\ndimension: {}\nsizes: {}\nendian: little\nencoding: {}\n\n",
        sample_type,
        sizes.split_whitespace().count(),
        sizes,
        encoding
    )
    .into_bytes();
    content.extend_from_slice(payload);
    fs::write(&path, content).unwrap();
    path
}

fn config_for(input: PathBuf, output: PathBuf, bins: usize, threads: usize) -> HistogramConfig {
    HistogramConfig {
        bins,
        min: 0,
        max: bins as u32 - 1,
        input,
        output,
        threads: Some(threads),
    }
}

fn read_output(path: &PathBuf) -> Vec<(usize, u64)> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| {
            let inner = line.trim_start_matches('(').trim_end_matches(')');
            let mut parts = inner.split(", ");
            let idx = parts.next().unwrap().parse().unwrap();
            let count = parts.next().unwrap().parse().unwrap();
            (idx, count)
        })
        .collect()
}

#[test]
fn test_gzip_constant_volume() -> TestResult<()> {
    let total = 215 * 215 * 167;
    let input = write_nrrd(
        "const.nrrd",
        "unsigned char",
        "215 215 167",
        "gzip",
        &gzip(&vec![7u8; total]),
    );
    let output = temp_path("const.txt");
    let task = HistogramTask::new(config_for(input.clone(), output.clone(), 256, 4))?;
    let report = task.run()?;
    assert_eq!(report.total_samples, total as u64);
    assert_eq!(report.bins, 256);

    let lines = read_output(&output);
    assert_eq!(lines.len(), 256);
    for (expected_idx, (idx, count)) in lines.into_iter().enumerate() {
        assert_eq!(idx, expected_idx);
        assert_eq!(count, if idx == 7 { total as u64 } else { 0 });
    }
    assert_eq!(task.pool().leased(), 0);
    task.close()?;

    fs::remove_file(input)?;
    fs::remove_file(output)?;
    Ok(())
}

#[test]
fn test_raw_matches_direct_scan() -> TestResult<()> {
    let total = 215 * 215 * 167;
    let mut rng = rand::thread_rng();
    let data: Vec<u8> = (0..total).map(|_| rng.gen()).collect();
    let mut expected = vec![0u64; 256];
    for &v in data.iter() {
        expected[v as usize] += 1;
    }

    let input = write_nrrd("raw.nrrd", "uchar", "215 215 167", "raw", &data);
    for &threads in &[1, 3, 8] {
        let output = temp_path(&format!("raw-{}.txt", threads));
        let task = HistogramTask::new(config_for(input.clone(), output.clone(), 256, threads))?;
        let histogram = task.compute()?;
        assert_eq!(histogram.bins(), &expected[..]);
        assert_eq!(histogram.total(), total as u64);
        assert_eq!(histogram.sample_count(), total);
        drop(histogram);
        task.close()?;
        assert!(!output.exists());
    }
    fs::remove_file(input)?;
    Ok(())
}

#[test]
fn test_short_samples_are_clamped() -> TestResult<()> {
    let values: Vec<i16> = (0..256 * 256 * 3).map(|v| (v % 700) as i16 - 200).collect();
    let payload: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes().to_vec()).collect();
    let input = write_nrrd("short.nrrd", "short", "256 256 3", "gzip", &gzip(&payload));
    let output = temp_path("short.txt");

    let config = HistogramConfig {
        bins: 300,
        min: 0,
        max: 299,
        input: input.clone(),
        output: output.clone(),
        threads: Some(5),
    };
    let histogram = HistogramTask::new(config)?.compute()?;
    let mut expected = vec![0u64; 300];
    for &v in values.iter() {
        expected[(v.max(0).min(299)) as usize] += 1;
    }
    assert_eq!(histogram.bins(), &expected[..]);
    assert_eq!(histogram.total(), values.len() as u64);
    fs::remove_file(input)?;
    Ok(())
}

#[test]
fn test_unsupported_encoding_fails_early() -> TestResult<()> {
    let input = write_nrrd("bzip2.nrrd", "uchar", "215 215 167", "bzip2", b"BZh91AY&SY");
    let output = temp_path("bzip2.txt");
    let task = HistogramTask::new(config_for(input.clone(), output.clone(), 256, 2))?;
    let err = task.run().unwrap_err();
    assert_eq!(err.kind(), "FormatError");
    assert!(err.to_string().contains("bzip2"));
    assert!(!output.exists());
    assert_eq!(task.pool().allocated(), 0);
    fs::remove_file(input)?;
    Ok(())
}

#[test]
fn test_empty_payload_is_rejected() -> TestResult<()> {
    let input = write_nrrd("empty.nrrd", "uchar", "0 1 1", "raw", b"");
    let output = temp_path("empty.txt");
    let task = HistogramTask::new(config_for(input.clone(), output.clone(), 256, 2))?;
    let err = task.run().unwrap_err();
    assert_eq!(err.kind(), "FormatError");
    assert!(err.to_string().contains("empty payload"));
    assert!(!output.exists());
    assert_eq!(task.pool().allocated(), 0);
    fs::remove_file(input)?;
    Ok(())
}

#[test]
fn test_corrupt_payload_leaves_output_untouched() -> TestResult<()> {
    let mut compressed = gzip(&vec![1u8; 4096]);
    let crc_pos = compressed.len() - 8;
    compressed[crc_pos] ^= 0x55;
    let input = write_nrrd("corrupt.nrrd", "uchar", "64 64", "gzip", &compressed);
    let output = temp_path("corrupt.txt");
    fs::write(&output, "previous result\n")?;

    let task = HistogramTask::new(config_for(input.clone(), output.clone(), 256, 2))?;
    let err = task.run().unwrap_err();
    assert_eq!(err.kind(), "DecodeError");
    assert_eq!(fs::read_to_string(&output)?, "previous result\n");

    fs::remove_file(input)?;
    fs::remove_file(output)?;
    Ok(())
}

#[test]
fn test_missing_input() {
    let config = config_for(temp_path("missing.nrrd"), temp_path("missing.txt"), 16, 1);
    let err = HistogramTask::new(config).unwrap().run().unwrap_err();
    assert_eq!(err.kind(), "IoError");
}

#[test]
fn test_invalid_range_is_rejected_up_front() {
    let mut config = config_for(temp_path("x.nrrd"), temp_path("x.txt"), 16, 1);
    config.max = 16;
    assert_eq!(
        HistogramTask::new(config).err().map(|e| e.kind()),
        Some("BinIndexOutOfRange")
    );
}

#[test]
fn test_oversized_bin_count_is_rejected_up_front() {
    let mut config = config_for(temp_path("y.nrrd"), temp_path("y.txt"), 256, 2);
    config.bins = usize::MAX / 4;
    assert_eq!(
        HistogramTask::new(config).err().map(|e| e.kind()),
        Some("InvalidConfig")
    );
}

#[test]
fn test_concurrent_runs_share_a_pool() -> TestResult<()> {
    let pool = BinBufferPool::new();
    let data: Vec<u8> = (0..50_000u32).map(|v| (v % 13) as u8).collect();
    let input = write_nrrd("shared.nrrd", "uchar", "50000", "gzip", &gzip(&data));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let pool = pool.clone();
            let config = config_for(input.clone(), temp_path(&format!("shared-{}.txt", i)), 16, i + 1);
            std::thread::spawn(move || {
                let task = HistogramTask::with_pool(config, pool).unwrap();
                let histogram = task.compute().unwrap();
                histogram.bins().to_vec()
            })
        })
        .collect();

    for handle in handles {
        let bins = handle.join().unwrap();
        assert_eq!(bins.iter().sum::<u64>(), 50_000);
        assert_eq!(bins[0], 3847);
        assert_eq!(&bins[13..], &[0, 0, 0]);
    }
    assert_eq!(pool.leased(), 0);
    pool.shutdown()?;
    fs::remove_file(input)?;
    Ok(())
}
