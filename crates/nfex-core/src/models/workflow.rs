//! Typed workflow state carried through one document's processing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::record::Extraction;

/// The three external analysis stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    /// Fiscal rule lookup against the extracted items.
    Validation,
    /// Discrepancy analysis and proposed solutions.
    Discrepancy,
    /// Tax delta calculation.
    TaxDelta,
}

impl AnalysisStage {
    /// All stages in execution order.
    pub const ALL: [AnalysisStage; 3] = [
        AnalysisStage::Validation,
        AnalysisStage::Discrepancy,
        AnalysisStage::TaxDelta,
    ];

    /// Stable identifier used in URLs and file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStage::Validation => "validation",
            AnalysisStage::Discrepancy => "discrepancy",
            AnalysisStage::TaxDelta => "tax_delta",
        }
    }
}

impl std::fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome status reported by an analysis agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    /// Completed with reduced output (e.g. rate limited mid-way).
    Partial,
    Error,
}

/// Category of a structured finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Opportunity,
    Discrepancy,
    Solution,
    Exposure,
}

/// One rule, discrepancy or solution item returned by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,

    /// Product code or description the finding refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,

    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

/// Result of one analysis stage. Consumed for display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub stage: AnalysisStage,
    pub status: StepStatus,

    /// Human-readable summary.
    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub findings: Vec<Finding>,

    #[serde(default)]
    pub products_analyzed: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Total tax exposure in BRL (tax delta stage).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_total: Option<f64>,

    /// Total potential fines in BRL (tax delta stage).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fines_total: Option<f64>,

    pub completed_at: DateTime<Utc>,
}

impl StepReport {
    /// A report for a stage whose agent call failed.
    pub fn failed(stage: AnalysisStage, error: impl Into<String>) -> Self {
        Self {
            stage,
            status: StepStatus::Error,
            summary: String::new(),
            findings: Vec::new(),
            products_analyzed: 0,
            error: Some(error.into()),
            exposure_total: None,
            fines_total: None,
            completed_at: Utc::now(),
        }
    }

    /// One-line financial result of a tax delta report.
    ///
    /// Exposure takes precedence over fines; zero amounts are not reported.
    pub fn delta_headline(&self) -> String {
        let positive = |amount: Option<f64>| amount.filter(|a| *a > 0.0);

        if let Some(exposure) = positive(self.exposure_total) {
            format!("delta of R$ {exposure:.2} identified")
        } else if let Some(fines) = positive(self.fines_total) {
            format!("potential fines of R$ {fines:.2}")
        } else {
            "financial analysis finished".to_string()
        }
    }

    /// Number of findings of a given kind.
    pub fn count(&self, kind: FindingKind) -> usize {
        self.findings.iter().filter(|f| f.kind == kind).count()
    }

    pub fn is_usable(&self) -> bool {
        matches!(self.status, StepStatus::Success | StepStatus::Partial)
    }
}

/// Aggregate view of one orchestrated run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub stages_run: usize,
    pub opportunities: usize,
    pub discrepancies: usize,
    pub solutions: usize,
    pub products_analyzed: usize,

    /// Validation succeeded and the later stages succeeded or partially succeeded.
    pub complete: bool,

    /// Validation failed and the later stages were not run.
    pub aborted: bool,
}

/// Everything known about one document as it moves through the workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Name of the uploaded file.
    pub source_name: String,

    /// Plain extraction result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<Extraction>,

    /// Extraction with sensitive fields protected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected: Option<Extraction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<StepReport>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discrepancy: Option<StepReport>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_delta: Option<StepReport>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ExecutionSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl WorkflowState {
    /// Start a workflow for a named document.
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            ..Self::default()
        }
    }

    /// Report slot for a stage.
    pub fn report(&self, stage: AnalysisStage) -> Option<&StepReport> {
        match stage {
            AnalysisStage::Validation => self.validation.as_ref(),
            AnalysisStage::Discrepancy => self.discrepancy.as_ref(),
            AnalysisStage::TaxDelta => self.tax_delta.as_ref(),
        }
    }

    /// Store a stage report in its slot.
    pub fn set_report(&mut self, report: StepReport) {
        match report.stage {
            AnalysisStage::Validation => self.validation = Some(report),
            AnalysisStage::Discrepancy => self.discrepancy = Some(report),
            AnalysisStage::TaxDelta => self.tax_delta = Some(report),
        }
    }

    /// Drop analysis results, keeping the extracted data.
    pub fn clear_analysis(&mut self) {
        self.validation = None;
        self.discrepancy = None;
        self.tax_delta = None;
        self.summary = None;
        self.processed_at = None;
    }

    /// Recompute the execution summary from the stored reports.
    pub fn summarize(&self) -> ExecutionSummary {
        let validation = self.validation.as_ref();
        let aborted = validation.is_some_and(|v| v.status == StepStatus::Error);

        ExecutionSummary {
            stages_run: AnalysisStage::ALL
                .iter()
                .filter(|s| self.report(**s).is_some())
                .count(),
            opportunities: validation.map_or(0, |v| v.count(FindingKind::Opportunity)),
            discrepancies: validation.map_or(0, |v| v.count(FindingKind::Discrepancy)),
            solutions: self
                .discrepancy
                .as_ref()
                .map_or(0, |d| d.count(FindingKind::Solution)),
            products_analyzed: validation.map_or(0, |v| v.products_analyzed),
            complete: validation.is_some_and(|v| v.status == StepStatus::Success)
                && self.discrepancy.as_ref().is_some_and(StepReport::is_usable)
                && self.tax_delta.as_ref().is_some_and(StepReport::is_usable),
            aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tax_report(exposure: Option<f64>, fines: Option<f64>) -> StepReport {
        StepReport {
            exposure_total: exposure,
            fines_total: fines,
            status: StepStatus::Success,
            ..StepReport::failed(AnalysisStage::TaxDelta, "")
        }
    }

    #[test]
    fn test_delta_headline_prefers_exposure() {
        assert_eq!(
            tax_report(Some(1520.5), Some(300.0)).delta_headline(),
            "delta of R$ 1520.50 identified"
        );
        assert_eq!(
            tax_report(Some(0.0), Some(300.0)).delta_headline(),
            "potential fines of R$ 300.00"
        );
        assert_eq!(tax_report(None, None).delta_headline(), "financial analysis finished");
    }

    #[test]
    fn test_amounts_are_optional_in_json() {
        let json = r#"{"stage":"tax_delta","status":"partial","completed_at":"2024-01-15T10:30:00Z"}"#;
        let report: StepReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.exposure_total, None);
        assert!(!serde_json::to_string(&report).unwrap().contains("fines_total"));
    }
}
