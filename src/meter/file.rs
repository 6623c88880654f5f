//! # File Meter
//!
//! Reads `value [identifier] [@rfc3339-timestamp]` lines from a text file
//! or FIFO and re-reads from the top on every poll. Lines starting with
//! `#` and blank lines are skipped; malformed lines are logged at debug
//! level and ignored. The optional `@` token lets replay files carry the
//! original measurement times.

use std::path::PathBuf;

use async_trait::async_trait;

use super::Meter;
use crate::error::MeterLogError;
use crate::logging::log_debug;
use crate::reading::{Reading, ReadingIdentifier, ReadingTime};

pub struct FileMeter {
    path: PathBuf,
}

impl FileMeter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileMeter { path: path.into() }
    }
}

/// Parses one non-blank, non-comment line.
fn parse_line(line: &str) -> Option<Reading> {
    let mut value: Option<f64> = None;
    let mut identifier = ReadingIdentifier::Nil;
    let mut time = ReadingTime::now();
    for (i, token) in line.split_whitespace().enumerate() {
        if i == 0 {
            value = token.parse().ok();
            value?;
        } else if let Some(stamp) = token.strip_prefix('@') {
            let parsed = chrono::DateTime::parse_from_rfc3339(stamp).ok()?;
            time = ReadingTime::new(
                parsed.timestamp(),
                parsed.timestamp_subsec_micros() as i64,
            );
        } else {
            identifier = ReadingIdentifier::resolve(token);
        }
    }
    Some(Reading::new(value?, time, identifier))
}

#[async_trait]
impl Meter for FileMeter {
    async fn open(&mut self) -> Result<(), MeterLogError> {
        tokio::fs::metadata(&self.path).await.map_err(|e| {
            MeterLogError::MeterError(format!("cannot open {}: {e}", self.path.display()))
        })?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), MeterLogError> {
        Ok(())
    }

    async fn read(&mut self, max: usize) -> Result<Vec<Reading>, MeterLogError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let mut readings = Vec::new();
        for line in content.lines() {
            if readings.len() >= max {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match parse_line(trimmed) {
                Some(reading) => readings.push(reading),
                None => log_debug(&format!("file meter: skipping malformed line {trimmed:?}")),
            }
        }
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_value_only() {
        let reading = parse_line("42.5").unwrap();
        assert_eq!(reading.value, 42.5);
        assert_eq!(reading.identifier, ReadingIdentifier::Nil);
    }

    #[test]
    fn test_parse_with_identifier() {
        let reading = parse_line("42.5 1-0:1.8.0").unwrap();
        assert!(matches!(reading.identifier, ReadingIdentifier::Obis(_)));
    }

    #[test]
    fn test_parse_with_timestamp() {
        let reading = parse_line("1.0 @2026-08-25T10:00:00Z").unwrap();
        assert_eq!(reading.time.secs(), 1_787_652_000);
        assert_eq!(reading.time.micros(), 0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_line("not-a-number").is_none());
        assert!(parse_line("1.0 @yesterday").is_none());
    }

    #[tokio::test]
    async fn test_read_skips_comments_and_caps_at_max() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# header").unwrap();
        writeln!(file, "1.0").unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, "2.0 power").unwrap();
        writeln!(file, "3.0").unwrap();
        file.flush().unwrap();

        let mut meter = FileMeter::new(file.path());
        meter.open().await.unwrap();
        let readings = meter.read(2).await.unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].value, 1.0);
        assert_eq!(readings[1].value, 2.0);
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let mut meter = FileMeter::new("/nonexistent/meterlog-test");
        assert!(meter.open().await.is_err());
    }
}
