//! Console output and progress reporting

use assay::{DevicePreset, Outcome, RunSummary, ScenarioResult};
use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress reporter for scenario execution
///
/// Everything goes to stderr so that reports written to stdout stay clean.
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` scenarios
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet || !self.term.is_term() {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Record one finished scenario
    pub fn scenario_finished(&self, result: &ScenarioResult) {
        let line = format!("{} ({}ms)", result.name, result.duration_ms);
        match result.outcome {
            Outcome::Passed => self.success(&line),
            Outcome::Skipped => self.skipped(&line),
            Outcome::Failed => {
                let detail = result
                    .failure
                    .as_ref()
                    .map_or_else(String::new, |f| format!(": {}", f.message));
                self.failure(&format!("{line}{detail}"));
            }
        }
        if let Some(ref pb) = self.progress_bar {
            pb.inc(1);
        }
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn write(&self, line: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.println(line),
            None => {
                let _ = self.term.write_line(line);
            }
        }
    }

    fn prefix(&self, symbol: &str, plain: &str, style: &Style) -> String {
        if self.use_color {
            style.apply_to(symbol).bold().to_string()
        } else {
            plain.to_string()
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = self.prefix("✓", "PASS", &Style::new().green());
        self.write(&format!("{prefix} {message}"));
    }

    /// Print a failure message, even in quiet mode
    pub fn failure(&self, message: &str) {
        let prefix = self.prefix("✗", "FAIL", &Style::new().red());
        self.write(&format!("{prefix} {message}"));
    }

    /// Print a skip message
    pub fn skipped(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = self.prefix("-", "SKIP", &Style::new().yellow());
        self.write(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = self.prefix("ℹ", "INFO", &Style::new().blue());
        self.write(&format!("{prefix} {message}"));
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }
        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };
        self.write("");
        self.write(&styled);
    }

    /// Print the run totals
    pub fn summary(&self, summary: &RunSummary) {
        let failed = summary.failed_count();
        if self.quiet && failed == 0 {
            return;
        }

        let passed = summary.passed_count();
        let skipped = summary.skipped_count();
        let total = summary.total();
        #[allow(clippy::cast_precision_loss)]
        let secs = summary.duration_ms as f64 / 1000.0;

        let line = if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();
            let status = if failed > 0 {
                failed_style.apply_to("FAILED")
            } else {
                passed_style.apply_to("PASSED")
            };
            format!(
                "{status} {total} scenarios in {secs:.2}s ({} passed, {} failed, {} skipped)",
                passed_style.apply_to(passed),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
                Style::new().yellow().apply_to(skipped)
            )
        } else {
            let status = if failed > 0 { "FAILED" } else { "PASSED" };
            format!(
                "{status} {total} scenarios in {secs:.2}s ({passed} passed, {failed} failed, {skipped} skipped)"
            )
        };
        self.write("");
        self.write(&line);
    }
}

/// Device table printed by `assay devices`
#[must_use]
pub fn device_table<'a>(
    presets: impl Iterator<Item = &'a DevicePreset>,
    aliases: impl Iterator<Item = (&'a str, &'a str)>,
) -> String {
    let aliases: Vec<(&str, &str)> = aliases.collect();
    let mut out = format!("{:<18} {:<10} {:<7} {}\n", "NAME", "SIZE", "MOBILE", "ALIASES");
    for preset in presets {
        let names: Vec<&str> = aliases
            .iter()
            .filter(|(_, target)| *target == preset.name)
            .map(|(alias, _)| *alias)
            .collect();
        out.push_str(&format!(
            "{:<18} {:<10} {:<7} {}\n",
            preset.name,
            preset.viewport.to_string(),
            if preset.is_mobile { "yes" } else { "no" },
            names.join(", ")
        ));
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use assay::DeviceRegistry;

    mod reporter_tests {
        use super::*;

        #[test]
        fn test_quiet_reporter_skips_progress() {
            let mut reporter = ProgressReporter::new(false, true);
            reporter.start_progress(3, "running");
            assert!(reporter.progress_bar.is_none());
        }

        #[test]
        fn test_plain_prefix() {
            let reporter = ProgressReporter::new(false, false);
            assert_eq!(reporter.prefix("✓", "PASS", &Style::new().green()), "PASS");
        }
    }

    mod device_table_tests {
        use super::*;

        #[test]
        fn test_lists_presets_and_aliases() {
            let registry = DeviceRegistry::new();
            let table = device_table(registry.presets(), registry.aliases());
            assert!(table.starts_with("NAME"));
            let reference = table
                .lines()
                .find(|l| l.starts_with("mobile-reference"))
                .unwrap();
            assert!(reference.contains("375x812"));
            assert!(reference.contains("yes"));
            assert!(reference.contains("iphone-x"));
            let desktop = table.lines().find(|l| l.starts_with("desktop")).unwrap();
            assert!(desktop.contains("no"));
        }
    }
}
