//! Collector log file: line format and reader
//!
//! Lines look like `2024-06-28 14:02:30,123 - farmwatch_collector::api - INFO - message`.
//! [`AlertLogFormat`] writes them through `tracing-subscriber`;
//! [`read_logs`] parses them back for `GET /get_logs`.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const LINE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S,%3f";
const ENTRY_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S,%6f";

/// Event formatter for the plain-text log file
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertLogFormat;

impl<S, N> FormatEvent<S, N> for AlertLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(
            writer,
            "{} - {} - {} - ",
            chrono::Local::now().format(LINE_TIMESTAMP),
            metadata.target(),
            level_name(metadata.level())
        )?;
        // Fields go through a plain writer so ANSI styling never reaches the file
        let mut fields = String::new();
        ctx.field_format()
            .format_fields(Writer::new(&mut fields), event)?;
        writeln!(writer, "{}", fields)
    }
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARNING",
        Level::ERROR => "ERROR",
    }
}

/// Numeric rank of a level name; unknown names rank 0
pub fn level_num(level: &str) -> u8 {
    match level {
        "DEBUG" => 10,
        "INFO" => 20,
        "WARN" | "WARNING" => 30,
        "ERROR" => 40,
        "CRITICAL" => 50,
        _ => 0,
    }
}

/// One parsed log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub date_time: String,
    pub module: String,
    pub level: String,
    pub level_num: u8,
    pub message: String,
}

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2},\d{3}) - (\S+) - (\S+) - (.+)$")
            .expect("log line pattern is valid")
    })
}

/// Parse one line; `None` if it does not follow the format
pub fn parse_line(line: &str) -> Option<(NaiveDateTime, LogEntry)> {
    let caps = line_pattern().captures(line.trim_end_matches(['\r', '\n']))?;
    let at = NaiveDateTime::parse_from_str(&caps[1], LINE_TIMESTAMP).ok()?;
    let level = caps[3].to_string();

    Some((
        at,
        LogEntry {
            date_time: at.format(ENTRY_TIMESTAMP).to_string(),
            module: caps[2].to_string(),
            level_num: level_num(&level),
            level,
            message: caps[4].to_string(),
        },
    ))
}

/// Parse a whole log text, newest entry first
pub fn parse_logs(text: &str) -> Vec<LogEntry> {
    let mut entries: Vec<(NaiveDateTime, LogEntry)> = text.lines().filter_map(parse_line).collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0));
    entries.into_iter().map(|(_, entry)| entry).collect()
}

/// Read and parse the log file. A missing file is an empty log.
pub async fn read_logs(path: &Path) -> std::io::Result<Vec<LogEntry>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(parse_logs(&String::from_utf8_lossy(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}
