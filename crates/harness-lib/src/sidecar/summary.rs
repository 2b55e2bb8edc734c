//! Parsing of k6's `--summary-export` output

use crate::error::{HarnessError, Result};
use crate::models::{CounterStats, LoadSummary, RateStats, TrendStats};
use serde_json::Value;

fn number(metric: &Value, field: &str) -> Option<f64> {
    metric.get(field).and_then(Value::as_f64)
}

/// Read the headline metrics out of a k6 summary export.
///
/// `http_reqs` is required; the failure rate and latency trend default to
/// zero when k6 did not record them (for example when no request finished).
pub fn parse_k6_summary(raw: &str) -> Result<LoadSummary> {
    let document: Value = serde_json::from_str(raw)?;
    let metrics = document
        .get("metrics")
        .ok_or_else(|| HarnessError::MetricsUnavailable("summary has no metrics".to_string()))?;

    let reqs = metrics.get("http_reqs").ok_or_else(|| {
        HarnessError::MetricsUnavailable("summary has no http_reqs metric".to_string())
    })?;
    let http_reqs = CounterStats {
        count: number(reqs, "count").unwrap_or(0.0) as u64,
        rate: number(reqs, "rate").unwrap_or(0.0),
    };

    // Rate metrics export their ratio as `value`
    let http_req_failed = RateStats {
        rate: metrics
            .get("http_req_failed")
            .and_then(|m| number(m, "value").or_else(|| number(m, "rate")))
            .unwrap_or(0.0),
    };

    let http_req_duration = metrics
        .get("http_req_duration")
        .map(|m| TrendStats {
            avg: number(m, "avg").unwrap_or(0.0),
            p50: number(m, "p(50)").or_else(|| number(m, "med")).unwrap_or(0.0),
            p95: number(m, "p(95)").unwrap_or(0.0),
            p99: number(m, "p(99)").unwrap_or(0.0),
        })
        .unwrap_or_default();

    Ok(LoadSummary {
        http_reqs,
        http_req_failed,
        http_req_duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"{
        "root_group": { "name": "", "path": "", "checks": {} },
        "metrics": {
            "http_reqs": { "count": 6000, "rate": 99.87 },
            "http_req_failed": { "passes": 12, "fails": 5988, "value": 0.002,
                "thresholds": { "rate<0.01": false } },
            "http_req_duration": { "avg": 41.2, "min": 3.1, "med": 38.0, "max": 812.5,
                "p(50)": 38.0, "p(95)": 120.4, "p(99)": 310.9,
                "thresholds": { "p(95)<500": false } }
        }
    }"#;

    #[test]
    fn test_parses_headline_metrics() {
        let summary = parse_k6_summary(EXPORT).unwrap();
        assert_eq!(summary.http_reqs.count, 6000);
        assert_eq!(summary.http_reqs.rate, 99.87);
        assert_eq!(summary.http_req_failed.rate, 0.002);
        assert_eq!(summary.http_req_duration.p50, 38.0);
        assert_eq!(summary.http_req_duration.p95, 120.4);
        assert_eq!(summary.http_req_duration.p99, 310.9);
    }

    #[test]
    fn test_median_stands_in_for_p50() {
        let raw = r#"{"metrics": {"http_reqs": {"count": 1, "rate": 1.0},
            "http_req_duration": {"avg": 5.0, "med": 4.0, "p(95)": 9.0}}}"#;
        let summary = parse_k6_summary(raw).unwrap();
        assert_eq!(summary.http_req_duration.p50, 4.0);
        assert_eq!(summary.http_req_duration.p99, 0.0);
        assert_eq!(summary.http_req_failed.rate, 0.0);
    }

    #[test]
    fn test_missing_request_counter_is_rejected() {
        let err = parse_k6_summary(r#"{"metrics": {}}"#).unwrap_err();
        assert!(matches!(err, HarnessError::MetricsUnavailable(_)));
        assert!(parse_k6_summary("not json").is_err());
    }
}
