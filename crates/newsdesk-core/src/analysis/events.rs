//! Notification sink for analysis progress

use serde_json::Value;

/// Receives analysis lifecycle notifications; the host application
/// connects these to its panels and status bar.
///
/// For one analysis call, `analysis_started` is followed by exactly one
/// of the completed notifications or `analysis_failed`. A storage
/// failure after a successful model call surfaces only through
/// `status_message_updated`, never through `analysis_failed`.
pub trait AnalysisEvents: Send + Sync {
    fn analysis_started(&self, analysis_type: &str);
    fn single_analysis_completed(&self, analysis_type: &str, result: &Value);
    fn group_analysis_completed(&self, analysis_type: &str, result: &Value);
    fn analysis_failed(&self, analysis_type: &str, message: &str);
    fn status_message_updated(&self, message: &str);
}
