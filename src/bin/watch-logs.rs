//! Follow every log file in a directory and print new lines as they land.

use std::path::Path;
use std::process;
use std::time::Duration;

use serde::Deserialize;
use structopt::StructOpt;

use maas_plugins::logwatch::{LogWatcher, WatchOptions};

/// Follow the log files in a directory, printing each new line as
/// '<path>: <line>'
#[derive(StructOpt, Debug, Deserialize)]
#[structopt(
    name = "watch-logs (part of maas-plugins)",
    setting = structopt::clap::AppSettings::ColoredHelp
)]
struct Args {
    #[structopt(help = "Directory to watch", default_value = "/var/log")]
    directory: String,
    #[structopt(
        long = "interval",
        default_value = "0.1",
        help = "Seconds to sleep between polls"
    )]
    interval: f64,
    #[structopt(
        long = "extension",
        name = "EXT",
        help = "Watch files with this extension (repeatable) [default: log]"
    )]
    extensions: Vec<String>,
    #[structopt(
        long = "name",
        name = "FILENAME",
        help = "Watch only these exact base names (repeatable)"
    )]
    names: Vec<String>,
    #[structopt(
        long = "tail",
        default_value = "0",
        help = "Print the last <tail> lines of each file before following"
    )]
    tail_lines: usize,
}

#[cfg_attr(test, allow(dead_code))]
fn main() {
    let args = Args::from_args();
    if !args.interval.is_finite() || args.interval < 0.0 {
        println!("--interval must be a non-negative number of seconds");
        process::exit(1);
    }

    let mut options = WatchOptions {
        file_names: args.names.clone(),
        tail_lines: args.tail_lines,
        ..WatchOptions::default()
    };
    if !args.extensions.is_empty() {
        options.extensions = args.extensions.clone();
    }

    let mut watcher = match LogWatcher::new(
        &args.directory,
        |path: &Path, lines: &[String]| {
            for line in lines {
                println!("{}: {}", path.display(), line);
            }
        },
        options,
    ) {
        Ok(watcher) => watcher,
        Err(err) => {
            println!("{}", err);
            process::exit(1);
        }
    };

    if let Err(err) = watcher.run(Duration::from_secs_f64(args.interval)) {
        println!("{}", err);
        process::exit(1);
    }
}
