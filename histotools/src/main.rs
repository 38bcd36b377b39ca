mod header;
mod hist;

fn main() {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "warn"),
    );
    let args: Vec<_> = std::env::args().skip(1).collect();
    let ret = match args.first().map(AsRef::as_ref) {
        Some("hist") | Some("histo") => hist::entry_point(args),
        Some("header") => header::entry_point(args),
        _ => {
            eprintln!(
                "Histogram Utilities Program {}(histo library version: {})",
                histotools::VERSION,
                histo::VERSION
            );
            eprintln!("Usage: histotools <subcommand> <args>");
            eprintln!("Possible subcommands are:");
            eprintln!("\thist     \tCompute the histogram of a raster file");
            eprintln!("\theader   \tPrint the parsed header of a raster file");
            eprintln!();
            eprintln!("Type 'histotools <subcommand> --help' to learn more about each subcommands.");
            Ok(())
        }
    };

    if let Err(err) = ret {
        if let Some(message) = histotools::describe_failure(err.as_ref()) {
            eprintln!("{}", message);
            if histotools::is_bug(err.as_ref()) {
                std::process::abort();
            }
            std::process::exit(1);
        }
    }
}
