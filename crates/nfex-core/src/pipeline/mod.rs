//! Sequential orchestration of the external analysis agents.

mod orchestrator;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::PipelineError;
use crate::models::record::Extraction;

pub use crate::models::workflow::{
    AnalysisStage, ExecutionSummary, Finding, FindingKind, StepReport, StepStatus,
};
pub use orchestrator::Orchestrator;

/// Input handed to an analysis agent.
///
/// Agents only ever see the protected extraction plus the reports of the
/// stages that ran before them.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest<'a> {
    pub stage: AnalysisStage,
    pub header: &'a crate::models::record::Record,
    pub items: &'a [crate::models::record::Record],
    pub previous: Vec<&'a StepReport>,
}

impl<'a> AnalysisRequest<'a> {
    pub fn new(stage: AnalysisStage, data: &'a Extraction, previous: Vec<&'a StepReport>) -> Self {
        Self {
            stage,
            header: &data.header,
            items: &data.items,
            previous,
        }
    }
}

/// An external analysis collaborator (rule lookup, discrepancy analysis or
/// tax delta calculation).
#[async_trait]
pub trait AnalysisAgent: Send + Sync {
    /// Run one stage and return its report.
    async fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<StepReport, PipelineError>;
}
