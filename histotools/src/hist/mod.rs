use clap::{App, Arg};
use histo::HistogramTask;
use histotools::{make_config, setup_thread_pool, AppResult};
use log::info;

pub fn entry_point(args: Vec<String>) -> AppResult<()> {
    let matches = App::new("histotools-hist")
        .version(histo::VERSION)
        .about("Compute the histogram of the samples stored in a raster file")
        .arg(
            Arg::with_name("bins")
                .short("b")
                .long("bins")
                .takes_value(true)
                .help("Number of bins in the histogram [default: 256]"),
        )
        .arg(
            Arg::with_name("min")
                .long("min")
                .takes_value(true)
                .help("Value at the low end of the histogram [default: 0]"),
        )
        .arg(
            Arg::with_name("max")
                .long("max")
                .takes_value(true)
                .help("Value at the high end of the histogram [default: 255]"),
        )
        .arg(
            Arg::with_name("input")
                .short("i")
                .long("input")
                .takes_value(true)
                .help("The input raster file"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .help("The output histogram file"),
        )
        .arg(
            Arg::with_name("threads")
                .short("t")
                .long("threads")
                .takes_value(true)
                .help("Number of threads"),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .help("Load the configuration from a JSON file, flags override it"),
        )
        .arg(
            Arg::with_name("dump-config")
                .long("dump-config")
                .help("Print the effective configuration and exit"),
        )
        .get_matches_from(&args);

    let config = make_config(&matches)?;

    if matches.is_present("dump-config") {
        println!("{}", config.pretty_print()?);
        return Ok(());
    }

    setup_thread_pool(&config)?;

    let task = HistogramTask::new(config)?;
    let report = task.run()?;
    info!("Bins: {} Duration: {}ms", report.bins, report.elapsed.as_millis());
    task.close()?;

    println!("{}", report.total_samples);
    Ok(())
}
