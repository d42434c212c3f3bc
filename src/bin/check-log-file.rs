//! Check a log file for lines matching a pattern.
//!
//! Meant to be run on a schedule by the monitoring agent: each invocation
//! picks up where the previous one stopped, using an offset record under
//! `--offset-dir`, so a line is scanned exactly once no matter how often
//! the check fires or how the file gets rotated in between.

use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;

use regex::Regex;
use serde::Deserialize;
use structopt::StructOpt;

use maas_plugins::logwatch::{LogWatcher, WatchOptions};
use maas_plugins::output::{CheckOutput, CheckStatus, MetricKind};

/// Scan new lines of a log file and alert when any match a pattern
#[derive(StructOpt, Debug, Deserialize)]
#[structopt(
    name = "check-log-file (part of maas-plugins)",
    setting = structopt::clap::AppSettings::ColoredHelp
)]
struct Args {
    #[structopt(help = "Base name of the log file to scan")]
    file: String,
    #[structopt(
        long = "directory",
        default_value = "/var/log",
        help = "Directory the log file lives in"
    )]
    directory: String,
    #[structopt(
        long = "pattern",
        default_value = "CRITICAL",
        help = "Regex that makes a line count as a hit"
    )]
    pattern: String,
    #[structopt(
        long = "alert-status",
        default_value = "critical",
        help = "Status to report when a line matches. Choices: warning critical error"
    )]
    alert_status: CheckStatus,
    #[structopt(
        long = "offset-dir",
        default_value = "/tmp",
        help = "Directory holding <file>.offset resume records"
    )]
    offset_dir: PathBuf,
    #[structopt(
        long = "tail",
        name = "N",
        default_value = "0",
        help = "Also scan the last <N> existing lines on the first run"
    )]
    tail_lines: usize,
}

#[cfg_attr(test, allow(dead_code))]
fn main() {
    let args = Args::from_args();
    let mut output = CheckOutput::new();

    let re = match Regex::new(&args.pattern) {
        Ok(re) => re,
        Err(err) => {
            output.status_err(&format!("invalid line pattern: {}", err));
            output.emit();
        }
    };

    let options = WatchOptions {
        file_names: vec![args.file.clone()],
        tail_lines: args.tail_lines,
        offset_dir: args.offset_dir.clone(),
        quiet: true,
        ..WatchOptions::default()
    };

    let (tx, rx) = channel();
    let mut watcher = match LogWatcher::new(
        &args.directory,
        move |_path: &Path, lines: &[String]| {
            for line in lines {
                let _ = tx.send(line.clone());
            }
        },
        options,
    ) {
        Ok(watcher) => watcher,
        Err(err) => {
            output.status_err(&format!("cannot watch {}: {}", args.directory, err));
            output.emit();
        }
    };

    if let Err(err) = watcher.run_once() {
        output.status_err(&format!("error while reading {}: {}", args.file, err));
        output.emit();
    }

    let scanned: Vec<String> = rx.try_iter().collect();
    report(&mut output, &args, &re, &scanned);
    output.emit();
}

/// Turn this invocation's scanned lines into a status and metrics.
fn report(output: &mut CheckOutput, args: &Args, re: &Regex, scanned: &[String]) {
    let matching: Vec<&String> = scanned.iter().filter(|line| re.is_match(line)).collect();
    match matching.first() {
        Some(first) => output.status(
            args.alert_status,
            &format!(
                "{} matching line(s) in {}, first: {}",
                matching.len(),
                args.file,
                first
            ),
        ),
        None => output.status_ok(&format!("no matching lines in {}", args.file)),
    }
    output.metric("lines_scanned", MetricKind::Uint32, scanned.len(), None);
    output.metric("matching_lines", MetricKind::Uint32, matching.len(), None);
    output.metric_bool("matching_line_found", !matching.is_empty());
}
