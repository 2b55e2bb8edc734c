//! Result envelope printed by the generator at the end of a run

use crate::error::Result;
use crate::models::{LoadSummary, MetricsSnapshot};
use serde::{Deserialize, Serialize};

pub const RESULT_BEGIN: &str = "===K6_HARNESS_RESULT_BEGIN===";
pub const RESULT_END: &str = "===K6_HARNESS_RESULT_END===";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub exit_code: i32,
    #[serde(default)]
    pub summary: Option<LoadSummary>,
    #[serde(default)]
    pub snapshot: Option<MetricsSnapshot>,
}

impl ResultEnvelope {
    /// Render as a marker-delimited block, one JSON line between the markers
    pub fn render(&self) -> Result<String> {
        let body = serde_json::to_string(self)?;
        Ok(format!("{}\n{}\n{}\n", RESULT_BEGIN, body, RESULT_END))
    }

    /// Find the last complete envelope in a log dump
    pub fn extract(logs: &str) -> Option<Self> {
        let mut scanner = EnvelopeScanner::default();
        logs.lines().filter_map(|line| scanner.feed(line)).last()
    }
}

/// Line-at-a-time envelope detection for streamed logs
#[derive(Debug, Default)]
pub struct EnvelopeScanner {
    body: Option<String>,
}

impl EnvelopeScanner {
    /// Feed one log line. Returns an envelope when its end marker is seen.
    ///
    /// Lines inside an envelope are consumed; a malformed body is dropped.
    pub fn feed(&mut self, line: &str) -> Option<ResultEnvelope> {
        let line = line.trim_end();
        if line == RESULT_BEGIN {
            self.body = Some(String::new());
            return None;
        }
        if line == RESULT_END {
            let body = self.body.take()?;
            return serde_json::from_str(&body).ok();
        }
        if let Some(body) = self.body.as_mut() {
            body.push_str(line);
        }
        None
    }

    /// True while lines are being captured into an envelope
    pub fn in_envelope(&self) -> bool {
        self.body.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CounterStats;

    fn envelope() -> ResultEnvelope {
        ResultEnvelope {
            exit_code: 0,
            summary: Some(LoadSummary {
                http_reqs: CounterStats {
                    count: 100,
                    rate: 10.0,
                },
                ..Default::default()
            }),
            snapshot: None,
        }
    }

    #[test]
    fn test_extract_from_log_dump() {
        let logs = format!(
            "running (0m10.0s), 10/10 VUs\n{}done\n",
            envelope().render().unwrap()
        );
        assert_eq!(ResultEnvelope::extract(&logs), Some(envelope()));
    }

    #[test]
    fn test_scanner_swallows_envelope_lines() {
        let rendered = envelope().render().unwrap();
        let mut scanner = EnvelopeScanner::default();
        let mut found = None;
        for line in rendered.lines() {
            if let Some(e) = scanner.feed(line) {
                found = Some(e);
            } else if line != RESULT_BEGIN {
                assert!(scanner.in_envelope());
            }
        }
        assert_eq!(found, Some(envelope()));
        assert!(!scanner.in_envelope());
    }

    #[test]
    fn test_unterminated_or_malformed_envelope_is_ignored() {
        let logs = format!("{}\n{{\"exit_code\": 0", RESULT_BEGIN);
        assert_eq!(ResultEnvelope::extract(&logs), None);

        let logs = format!("{}\nnot json\n{}\n", RESULT_BEGIN, RESULT_END);
        assert_eq!(ResultEnvelope::extract(&logs), None);
    }

    #[test]
    fn test_end_marker_without_begin_is_plain_output() {
        let mut scanner = EnvelopeScanner::default();
        assert_eq!(scanner.feed(RESULT_END), None);
        assert!(!scanner.in_envelope());
    }
}
