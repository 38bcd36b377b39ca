use clap::{App, Arg};
use histo::PayloadDescriptor;
use histotools::AppResult;

pub fn entry_point(args: Vec<String>) -> AppResult<()> {
    let matches = App::new("histotools-header")
        .version(histo::VERSION)
        .about("Print the header of a raster file")
        .arg(
            Arg::with_name("input")
                .required(true)
                .help("The input raster file"),
        )
        .get_matches_from(&args);

    let path = matches.value_of("input").unwrap();
    let (descriptor, _) = PayloadDescriptor::open(path)?;
    println!("{}", descriptor);
    Ok(())
}
