//! Rendering of run summaries.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

use crate::result::{AssayError, AssayResult};
use crate::runner::{Outcome, RunSummary, ScenarioResult};

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human-readable
    #[default]
    Text,
    /// One JSON document
    Json,
    /// JUnit XML
    Junit,
}

impl FromStr for ReportFormat {
    type Err = AssayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "junit" => Ok(Self::Junit),
            other => Err(AssayError::script(format!("unknown report format `{other}`"))),
        }
    }
}

/// Render `summary` in `format`
pub fn render(summary: &RunSummary, format: ReportFormat) -> AssayResult<String> {
    match format {
        ReportFormat::Text => Ok(render_text(summary)),
        ReportFormat::Json => render_json(summary),
        ReportFormat::Junit => Ok(render_junit(summary)),
    }
}

/// Write `summary` to `path`
pub fn write_report(summary: &RunSummary, format: ReportFormat, path: &Path) -> AssayResult<()> {
    std::fs::write(path, render(summary, format)?)?;
    Ok(())
}

/// Pretty-printed JSON
pub fn render_json(summary: &RunSummary) -> AssayResult<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

/// Plain text, one line per scenario plus failure diagnostics
#[must_use]
pub fn render_text(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} (started {})",
        summary.suite,
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for result in &summary.results {
        let _ = writeln!(out, "  {}", scenario_line(result));
        if let Some(failure) = &result.failure {
            let _ = writeln!(
                out,
                "      at {:?} command {}: {}",
                failure.stage, failure.command_index, failure.command
            );
            if let (Some(expected), Some(actual)) = (&failure.expected, &failure.actual) {
                let _ = writeln!(out, "      expected: {expected}");
                let _ = writeln!(out, "      actual:   {actual}");
            }
            let _ = writeln!(out, "      {}", failure.message);
        }
    }
    let _ = writeln!(out, "{} in {}ms", summary.summary(), summary.duration_ms);
    out
}

/// `[PASS] name (12ms)`
#[must_use]
pub fn scenario_line(result: &ScenarioResult) -> String {
    let tag = match result.outcome {
        Outcome::Passed => "PASS",
        Outcome::Failed => "FAIL",
        Outcome::Skipped => "SKIP",
    };
    format!("[{tag}] {} ({}ms)", result.name, result.duration_ms)
}

/// JUnit XML content
#[must_use]
pub fn render_junit(summary: &RunSummary) -> String {
    let mut xml = String::new();

    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    let _ = writeln!(
        xml,
        r#"<testsuite name="{}" tests="{}" failures="{}" skipped="{}" time="{:.3}" timestamp="{}">"#,
        escape_xml(&summary.suite),
        summary.total(),
        summary.failed_count(),
        summary.skipped_count(),
        summary.duration_ms as f64 / 1000.0,
        summary.started_at.to_rfc3339()
    );

    for result in &summary.results {
        let _ = writeln!(
            xml,
            r#"  <testcase name="{}" time="{:.3}">"#,
            escape_xml(&result.name),
            result.duration_ms as f64 / 1000.0
        );
        match (&result.outcome, &result.failure) {
            (Outcome::Failed, Some(failure)) => {
                let _ = writeln!(
                    xml,
                    r#"    <failure message="{}" type="{}">{}</failure>"#,
                    escape_xml(&failure.message),
                    escape_xml(&failure.error),
                    escape_xml(&failure.command)
                );
            }
            (Outcome::Skipped, _) => xml.push_str("    <skipped/>\n"),
            _ => {}
        }
        xml.push_str("  </testcase>\n");
    }

    xml.push_str("</testsuite>\n");
    xml
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::queue::Phase;
    use crate::runner::{FailureDetail, Stage};
    use chrono::Utc;

    fn summary() -> RunSummary {
        RunSummary {
            suite: "marketplace".into(),
            started_at: Utc::now(),
            duration_ms: 4321,
            results: vec![
                ScenarioResult {
                    name: "menu".into(),
                    outcome: Outcome::Passed,
                    failure: None,
                    duration_ms: 120,
                    trace: Vec::new(),
                },
                ScenarioResult {
                    name: "purchase <fast>".into(),
                    outcome: Outcome::Failed,
                    failure: Some(FailureDetail {
                        stage: Stage::Body,
                        command_index: 3,
                        phase: Phase::Assertion,
                        command: "assert `div:contains(\"Purchase successful!\")` to be visible".into(),
                        locator: Some("div:contains(\"Purchase successful!\")".into()),
                        expected: Some("visible".into()),
                        actual: Some("no matching element".into()),
                        elapsed_ms: 10_000,
                        error: "assertion_timeout".into(),
                        message: "Timed out after 10000ms".into(),
                    }),
                    duration_ms: 10_400,
                    trace: Vec::new(),
                },
            ],
        }
    }

    #[test]
    fn test_text_report() {
        let text = render_text(&summary());
        assert!(text.contains("[PASS] menu (120ms)"));
        assert!(text.contains("[FAIL] purchase <fast>"));
        assert!(text.contains("expected: visible"));
        assert!(text.contains("actual:   no matching element"));
        assert!(text.contains("1 passed, 1 failed, 0 skipped (2 total)"));
    }

    #[test]
    fn test_json_report() {
        let json: serde_json::Value = serde_json::from_str(&render_json(&summary()).unwrap()).unwrap();
        assert_eq!(json["results"][1]["outcome"], "failed");
        assert_eq!(json["results"][1]["failure"]["command_index"], 3);
        assert_eq!(json["results"][1]["failure"]["phase"], "assertion");
        assert_eq!(json["results"][1]["failure"]["elapsed_ms"], 10_000);
    }

    #[test]
    fn test_junit_escapes() {
        let xml = render_junit(&summary());
        assert!(xml.contains(r#"failures="1""#));
        assert!(xml.contains("purchase &lt;fast&gt;"));
        assert!(xml.contains(r#"type="assertion_timeout""#));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!("html".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xml");
        write_report(&summary(), ReportFormat::Junit, &path).unwrap();
        assert!(std::fs::read_to_string(path).unwrap().starts_with("<?xml"));
    }
}
