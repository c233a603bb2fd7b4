//! Data models for labtrack-client
//!
//! - Analysis result payload (summary, metrics, details)
//! - Selected file (name, MIME type, size, contents)

pub mod analysis_result;
pub mod selected_file;

pub use analysis_result::{AnalysisResult, AnalysisSummary, Metric, MetricLevel, MetricValue};
pub use selected_file::SelectedFile;
