//! Monitoring check plugins for hosts that report through the agent's
//! `status`/`metric` text protocol.
//!
//! Each binary under `src/bin/` is one check: it looks at one thing, prints
//! one `status` line and a handful of `metric` lines, and exits. The parts
//! they share live here:
//!
//! - [`logwatch`] — a polling directory watcher that hands newly appended
//!   log lines to a callback, following files across rotation and
//!   remembering read offsets between invocations
//! - [`output`] — the `status`/`metric` accumulator the checks print through
//!
//! See the [`scripts`] module for documentation of the individual check
//! scripts.

pub mod logwatch;
pub mod output;
pub mod scripts;

pub use crate::logwatch::LogWatcher;
pub use crate::output::{CheckOutput, CheckStatus};
