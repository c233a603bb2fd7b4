//! Analysis result payload
//!
//! Produced wholesale by the analysis backend. The client renders and
//! persists it; it never computes one.

use serde::{Deserialize, Serialize};

/// Summary classification of a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisSummary {
    /// Every metric within its reference range
    AllNormal,
    /// At least one metric low or high
    PartialAbnormal,
}

impl AnalysisSummary {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisSummary::AllNormal => "all-normal",
            AnalysisSummary::PartialAbnormal => "partial-abnormal",
        }
    }
}

/// Position of a measurement relative to its reference range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricLevel {
    Low,
    Normal,
    High,
}

impl MetricLevel {
    pub fn is_abnormal(&self) -> bool {
        !matches!(self, MetricLevel::Normal)
    }
}

impl std::fmt::Display for MetricLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricLevel::Low => write!(f, "low"),
            MetricLevel::Normal => write!(f, "normal"),
            MetricLevel::High => write!(f, "high"),
        }
    }
}

/// Measured value: numeric, or free text such as "negative" or "<0.5"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{}", n),
            MetricValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One lab-test measurement
///
/// Accepts both naming conventions seen on the wire (`name`/`key`,
/// `level`/`status`). An unknown level is rejected at deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(alias = "key")]
    pub name: String,
    pub value: MetricValue,
    #[serde(default)]
    pub unit: String,
    #[serde(alias = "status")]
    pub level: MetricLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Complete analysis of one uploaded file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: AnalysisSummary,
    /// Metrics in the order the backend reported them
    pub metrics: Vec<Metric>,
    /// Free-text details and recommendations
    #[serde(default, alias = "recommendations")]
    pub details: String,
}

impl AnalysisResult {
    /// Metrics outside their reference range, in report order
    pub fn abnormal_metrics(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.iter().filter(|m| m.level.is_abnormal())
    }

    /// Canned result served by the fixture analyzer and the mock backend
    pub fn fixture() -> Self {
        fn metric(
            name: &str,
            value: MetricValue,
            unit: &str,
            level: MetricLevel,
            explanation: Option<&str>,
        ) -> Metric {
            Metric {
                name: name.to_string(),
                value,
                unit: unit.to_string(),
                level,
                explanation: explanation.map(str::to_string),
            }
        }

        Self {
            summary: AnalysisSummary::PartialAbnormal,
            metrics: vec![
                metric("Hemoglobin", MetricValue::Number(13.8), "g/dL", MetricLevel::Normal, None),
                metric(
                    "White Blood Cells",
                    MetricValue::Number(11.6),
                    "10^9/L",
                    MetricLevel::High,
                    Some("Slightly elevated; often seen with a recent infection."),
                ),
                metric("Platelets", MetricValue::Number(245.0), "10^9/L", MetricLevel::Normal, None),
                metric("Fasting Glucose", MetricValue::Number(5.1), "mmol/L", MetricLevel::Normal, None),
                metric(
                    "Vitamin D (25-OH)",
                    MetricValue::Number(17.0),
                    "ng/mL",
                    MetricLevel::Low,
                    Some("Below the sufficiency threshold of 20 ng/mL."),
                ),
                metric("Urine Protein", MetricValue::Text("negative".to_string()), "", MetricLevel::Normal, None),
            ],
            details: "Most values are within their reference ranges. Discuss the elevated white \
                      blood cell count and low vitamin D with your doctor; a repeat test in \
                      4-6 weeks is commonly recommended."
                .to_string(),
        }
    }
}
