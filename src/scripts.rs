//! Documentation about the check scripts contained herein
//!
//! - [check-log-file](#check-log-file)
//! - [watch-logs](#watch-logs)
//!
//! # check-log-file
//!
//! Meant to be scheduled by the monitoring agent; each invocation resumes
//! where the previous one stopped.
//!
//! ```plain
//! $ check-log-file --help
//! check-log-file (part of maas-plugins) 0.1.0
//! Scan new lines of a log file and alert when any match a pattern
//!
//! USAGE:
//!     check-log-file [OPTIONS] <file>
//!
//! FLAGS:
//!     -h, --help       Prints help information
//!     -V, --version    Prints version information
//!
//! OPTIONS:
//!         --alert-status <alert-status>    Status to report when a line matches. Choices: warning critical error
//!                                          [default: critical]
//!         --directory <directory>          Directory the log file lives in [default: /var/log]
//!         --offset-dir <offset-dir>        Directory holding <file>.offset resume records [default: /tmp]
//!         --pattern <pattern>              Regex that makes a line count as a hit [default: CRITICAL]
//!         --tail <N>                       Also scan the last <N> existing lines on the first run [default: 0]
//!
//! ARGS:
//!     <file>    Base name of the log file to scan
//! ```
//!
//! # watch-logs
//!
//! Follows a directory forever; mostly useful for eyeballing what the
//! watcher would feed a check.
//!
//! ```plain
//! $ watch-logs --help
//! watch-logs (part of maas-plugins) 0.1.0
//! Follow the log files in a directory, printing each new line as '<path>: <line>'
//!
//! USAGE:
//!     watch-logs [OPTIONS] [directory]
//!
//! FLAGS:
//!     -h, --help       Prints help information
//!     -V, --version    Prints version information
//!
//! OPTIONS:
//!         --extension <EXT>...    Watch files with this extension (repeatable) [default: log]
//!         --interval <interval>   Seconds to sleep between polls [default: 0.1]
//!         --name <FILENAME>...    Watch only these exact base names (repeatable)
//!         --tail <tail>           Print the last <tail> lines of each file before following [default: 0]
//!
//! ARGS:
//!     <directory>    Directory to watch [default: /var/log]
//! ```
