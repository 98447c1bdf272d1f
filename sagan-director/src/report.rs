//! Convergence report export sinks.
//!
//! The report format itself is an external concern; the director hands
//! every stop decision to each registered sink as both the structured
//! document and a human-readable rendering.

use sagan_convergence::ConvergenceReport;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Collaborator-provided destination for convergence reports.
pub trait ReportSink: Send + Sync {
    /// Export one report. `rendered` is the human-readable form.
    fn export(&self, report: &ConvergenceReport, rendered: &str);
}

impl<S: ReportSink> ReportSink for Arc<S> {
    fn export(&self, report: &ConvergenceReport, rendered: &str) {
        (**self).export(report, rendered);
    }
}

/// Sink that writes the rendering to the tracing log.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn export(&self, report: &ConvergenceReport, rendered: &str) {
        info!(criterion = %report.criterion, confidence = report.confidence, "{rendered}");
    }
}

/// Sink that keeps reports in memory, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<ConvergenceReport>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All exported reports, oldest first.
    pub fn reports(&self) -> Vec<ConvergenceReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl ReportSink for MemorySink {
    fn export(&self, report: &ConvergenceReport, _rendered: &str) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sagan_convergence::{suggestions_for, ConvergenceMetrics, CriterionKind};

    fn sample_report() -> ConvergenceReport {
        ConvergenceReport {
            question: "q".to_string(),
            iterations: 3,
            hypothesis_count: 2,
            result_count: 4,
            metrics: ConvergenceMetrics {
                discovery_rate: 0.5,
                novelty_score: 0.1,
                novelty_trend: vec![0.3, 0.2, 0.1],
                novelty_declining: true,
                saturation_ratio: 1.0,
                consistency_score: 0.5,
                cost_per_discovery: 2.0,
                computed_at: Utc::now(),
            },
            criterion: CriterionKind::NoveltyDecline,
            confidence: 0.8,
            suggestions: suggestions_for(CriterionKind::NoveltyDecline),
        }
    }

    #[test]
    fn test_memory_sink_collects_reports() {
        let sink = MemorySink::new();
        let report = sample_report();
        sink.export(&report, &report.to_string());
        sink.export(&report, &report.to_string());
        assert_eq!(sink.reports().len(), 2);
        assert_eq!(sink.reports()[0].criterion, CriterionKind::NoveltyDecline);
    }
}
