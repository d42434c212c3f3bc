//! The `status`/`metric` text protocol the monitoring agent reads from a
//! check's stdout.
//!
//! A check prints at most one `status` line followed by its `metric`
//! lines, then exits 0 unless the status is `error`:
//!
//! ```plain
//! status okay no matching lines in demo.log
//! metric lines_scanned uint32 12
//! metric matching_line_found uint32 0
//! ```
//!
//! Results accumulate in a [`CheckOutput`] that the check logic carries
//! around and prints once, at the end, via [`CheckOutput::emit`].

use std::fmt;
use std::process;
use std::str::FromStr;

use serde::Deserialize;

/// Maximum metrics a single check may report.
pub const MAX_METRICS: usize = 50;

/// A status message cannot exceed 256 characters: `error ` plus up to 250
/// from the end of the message.
const MAX_ERROR_MESSAGE: usize = 250;

/// The status a check reports to the agent.
///
/// The agent's legacy spellings `ok`/`warn`/`err` create a metric called
/// `legacy_state` and must never be sent; being an enum, this type cannot
/// produce them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Okay,
    Warning,
    Critical,
    Error,
}

impl CheckStatus {
    /// The process exit code the agent expects for this status.
    pub fn exit_code(self) -> i32 {
        match self {
            CheckStatus::Error => 1,
            _ => 0,
        }
    }

    pub fn str_values() -> [&'static str; 4] {
        ["okay", "warning", "critical", "error"]
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            CheckStatus::Okay => "okay",
            CheckStatus::Warning => "warning",
            CheckStatus::Critical => "critical",
            CheckStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct InvalidStatus(String);

impl fmt::Display for InvalidStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Invalid value for status: '{}'", self.0)
    }
}

impl FromStr for CheckStatus {
    type Err = InvalidStatus;
    fn from_str(s: &str) -> Result<CheckStatus, InvalidStatus> {
        match s {
            "okay" => Ok(CheckStatus::Okay),
            "warning" => Ok(CheckStatus::Warning),
            "critical" => Ok(CheckStatus::Critical),
            "error" => Ok(CheckStatus::Error),
            _ => Err(InvalidStatus(s.to_string())),
        }
    }
}

/// Wire type of a metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Uint32,
    Int32,
    Uint64,
    Int64,
    Float,
    Double,
    Str,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            MetricKind::Uint32 => "uint32",
            MetricKind::Int32 => "int32",
            MetricKind::Uint64 => "uint64",
            MetricKind::Int64 => "int64",
            MetricKind::Float => "float",
            MetricKind::Double => "double",
            MetricKind::Str => "string",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
struct Metric {
    name: String,
    kind: MetricKind,
    value: String,
    unit: Option<String>,
}

/// Accumulates one check's status and metrics, then prints them in one go.
#[derive(Debug, Default)]
pub struct CheckOutput {
    status: Option<(CheckStatus, String)>,
    metrics: Vec<Metric>,
}

impl CheckOutput {
    pub fn new() -> CheckOutput {
        CheckOutput::default()
    }

    /// Set the status line, replacing any earlier one.
    pub fn status(&mut self, status: CheckStatus, message: &str) {
        self.status = Some((status, escape(message)));
    }

    pub fn status_ok(&mut self, message: &str) {
        self.status(CheckStatus::Okay, message);
    }

    /// Set an `error` status, keeping only the last [`MAX_ERROR_MESSAGE`]
    /// characters of an oversized message.
    pub fn status_err(&mut self, message: &str) {
        let start = message
            .char_indices()
            .rev()
            .nth(MAX_ERROR_MESSAGE - 1)
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.status(CheckStatus::Error, &message[start..]);
    }

    /// Record a metric line. Past [`MAX_METRICS`] the status becomes an
    /// error and further metrics are dropped.
    pub fn metric(&mut self, name: &str, kind: MetricKind, value: impl fmt::Display, unit: Option<&str>) {
        if self.metrics.len() >= MAX_METRICS {
            self.status_err(&format!("Maximum of {} metrics per check", MAX_METRICS));
            return;
        }
        self.metrics.push(Metric {
            name: escape(name),
            kind,
            value: escape(&value.to_string()),
            unit: unit.map(escape),
        });
    }

    pub fn metric_bool(&mut self, name: &str, success: bool) {
        self.metric(name, MetricKind::Uint32, if success { 1 } else { 0 }, None);
    }

    pub fn current_status(&self) -> Option<CheckStatus> {
        self.status.as_ref().map(|&(status, _)| status)
    }

    /// Render the protocol lines: the status first, then every metric in
    /// the order it was recorded.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some((status, message)) = &self.status {
            if message.is_empty() {
                out.push_str(&format!("status {}\n", status));
            } else {
                out.push_str(&format!("status {} {}\n", status, message));
            }
        }
        for metric in &self.metrics {
            out.push_str(&format!("metric {} {} {}", metric.name, metric.kind, metric.value));
            if let Some(unit) = &metric.unit {
                out.push(' ');
                out.push_str(unit);
            }
            out.push('\n');
        }
        out
    }

    /// Print the accumulated report and exit with the matching code.
    pub fn emit(self) -> ! {
        print!("{}", self.render());
        let code = self.current_status().map(CheckStatus::exit_code).unwrap_or(0);
        process::exit(code);
    }
}

fn escape(s: &str) -> String {
    s.replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_the_status_line_then_metrics() {
        let mut output = CheckOutput::new();
        output.status_ok("nova-api is responding");
        output.metric("response_time", MetricKind::Double, 43.4, Some("ms"));
        output.metric_bool("nova_api_up", true);
        assert_eq!(
            output.render(),
            "status okay nova-api is responding\n\
             metric response_time double 43.4 ms\n\
             metric nova_api_up uint32 1\n"
        );
    }

    #[test]
    fn later_statuses_replace_earlier_ones() {
        let mut output = CheckOutput::new();
        output.status_ok("fine so far");
        output.status(CheckStatus::Critical, "no longer fine");
        assert_eq!(output.render(), "status critical no longer fine\n");
        assert_eq!(output.current_status(), Some(CheckStatus::Critical));
    }

    #[test]
    fn newlines_are_escaped() {
        let mut output = CheckOutput::new();
        output.status_ok("two\nlines");
        output.metric("name", MetricKind::Str, "multi\nline", None);
        assert_eq!(
            output.render(),
            "status okay two\\nlines\nmetric name string multi\\nline\n"
        );
    }

    #[test]
    fn long_error_messages_keep_their_tail() {
        let mut output = CheckOutput::new();
        let message = format!("{}interesting part", "x".repeat(500));
        output.status_err(&message);
        let rendered = output.render();
        assert!(rendered.ends_with("interesting part\n"));
        // "status error " plus the truncated message
        assert_eq!(rendered.len(), "status error \n".len() + 250);
    }

    #[test]
    fn the_fifty_first_metric_turns_into_an_error() {
        let mut output = CheckOutput::new();
        output.status_ok("all good");
        for i in 0..MAX_METRICS {
            output.metric(&format!("metric_{}", i), MetricKind::Uint32, i, None);
        }
        assert_eq!(output.current_status(), Some(CheckStatus::Okay));

        output.metric("one_too_many", MetricKind::Uint32, 51, None);
        assert_eq!(output.current_status(), Some(CheckStatus::Error));
        assert_eq!(output.render().matches("\nmetric ").count() + 1, MAX_METRICS + 1);
        assert!(!output.render().contains("one_too_many"));
    }

    #[test]
    fn exit_codes_follow_the_status() {
        assert_eq!(CheckStatus::Okay.exit_code(), 0);
        assert_eq!(CheckStatus::Warning.exit_code(), 0);
        assert_eq!(CheckStatus::Critical.exit_code(), 0);
        assert_eq!(CheckStatus::Error.exit_code(), 1);
    }

    #[test]
    fn statuses_parse_from_their_wire_spelling() {
        assert_eq!("critical".parse::<CheckStatus>().unwrap(), CheckStatus::Critical);
        assert!("ok".parse::<CheckStatus>().is_err());
        for value in &CheckStatus::str_values() {
            assert!(value.parse::<CheckStatus>().is_ok());
        }
    }
}
