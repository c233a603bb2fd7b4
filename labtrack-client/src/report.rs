//! Results view
//!
//! Presentation model for the Results step: headline, per-level counts, and
//! the flagged metrics called out ahead of the full table.

use crate::models::{AnalysisResult, AnalysisSummary, Metric, MetricLevel};
use serde::Serialize;
use std::fmt::Write;

/// Counts of metrics per level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelCounts {
    pub low: usize,
    pub normal: usize,
    pub high: usize,
}

impl LevelCounts {
    pub fn abnormal(&self) -> usize {
        self.low + self.high
    }
}

/// Rendered form of one `AnalysisResult`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsView<'a> {
    pub headline: &'static str,
    pub counts: LevelCounts,
    pub abnormal: Vec<&'a Metric>,
    pub metrics: &'a [Metric],
    pub details: &'a str,
}

impl<'a> From<&'a AnalysisResult> for ResultsView<'a> {
    fn from(result: &'a AnalysisResult) -> Self {
        let mut counts = LevelCounts::default();
        for metric in &result.metrics {
            match metric.level {
                MetricLevel::Low => counts.low += 1,
                MetricLevel::Normal => counts.normal += 1,
                MetricLevel::High => counts.high += 1,
            }
        }

        let headline = match result.summary {
            AnalysisSummary::AllNormal => "All results are within normal ranges",
            AnalysisSummary::PartialAbnormal => "Some results are outside normal ranges",
        };

        Self {
            headline,
            counts,
            abnormal: result.abnormal_metrics().collect(),
            metrics: &result.metrics,
            details: &result.details,
        }
    }
}

impl ResultsView<'_> {
    /// Plain-text report for terminals
    pub fn render_text(&self) -> String {
        let mut out = String::new();

        // Writing to a String cannot fail
        let _ = writeln!(out, "{}", self.headline);
        let _ = writeln!(
            out,
            "{} normal, {} low, {} high",
            self.counts.normal, self.counts.low, self.counts.high
        );

        if !self.abnormal.is_empty() {
            let _ = writeln!(out, "\nNeeds attention:");
            for metric in &self.abnormal {
                let _ = writeln!(out, "  ! {} ({})", format_value(metric), metric.level);
                if let Some(explanation) = &metric.explanation {
                    let _ = writeln!(out, "    {}", explanation);
                }
            }
        }

        let _ = writeln!(out, "\nAll metrics:");
        let width = self.metrics.iter().map(|m| m.name.len()).max().unwrap_or(0);
        for metric in self.metrics {
            let _ = writeln!(
                out,
                "  {:<width$}  {:<14} {}",
                metric.name,
                value_with_unit(metric),
                metric.level,
                width = width
            );
        }

        if !self.details.is_empty() {
            let _ = writeln!(out, "\n{}", self.details);
        }

        out
    }
}

fn value_with_unit(metric: &Metric) -> String {
    if metric.unit.is_empty() {
        metric.value.to_string()
    } else {
        format!("{} {}", metric.value, metric.unit)
    }
}

fn format_value(metric: &Metric) -> String {
    format!("{}: {}", metric.name, value_with_unit(metric))
}
