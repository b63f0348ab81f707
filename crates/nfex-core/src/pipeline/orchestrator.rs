//! Runs validation, discrepancy analysis and tax delta calculation in order.

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::models::record::Extraction;
use crate::models::workflow::{AnalysisStage, ExecutionSummary, StepReport, StepStatus, WorkflowState};

use super::{AnalysisAgent, AnalysisRequest};

type StatusCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Sequential coordinator for the three analysis agents.
pub struct Orchestrator {
    validator: Box<dyn AnalysisAgent>,
    analyst: Box<dyn AnalysisAgent>,
    tax_advisor: Box<dyn AnalysisAgent>,
    on_status: Option<StatusCallback>,
}

impl Orchestrator {
    /// Create an orchestrator from one agent per stage.
    pub fn new(
        validator: Box<dyn AnalysisAgent>,
        analyst: Box<dyn AnalysisAgent>,
        tax_advisor: Box<dyn AnalysisAgent>,
    ) -> Self {
        Self {
            validator,
            analyst,
            tax_advisor,
            on_status: None,
        }
    }

    /// Receive a human-readable message as each stage starts and finishes.
    pub fn with_status_callback(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Box::new(callback));
        self
    }

    /// Run all stages against the protected data in `state`.
    ///
    /// A failed validation stops the run; failures in the later stages are
    /// recorded and the run continues.
    pub async fn run(&self, state: &mut WorkflowState) -> Result<ExecutionSummary, PipelineError> {
        let data = state
            .protected
            .clone()
            .ok_or_else(|| PipelineError::NotReady("no protected extraction in workflow".to_string()))?;

        state.clear_analysis();

        self.status("Validation agent looking up fiscal rules");
        let validation = self.call(self.validator.as_ref(), AnalysisStage::Validation, &data, vec![]).await;
        let aborted = validation.status == StepStatus::Error;
        if aborted {
            self.status("Validation failed; aborting analysis");
        } else {
            self.status(&format!(
                "Validation finished: {} opportunities, {} discrepancies",
                validation.count(super::FindingKind::Opportunity),
                validation.count(super::FindingKind::Discrepancy)
            ));
        }
        state.set_report(validation);

        if !aborted {
            self.status("Analyst agent reviewing discrepancies");
            let discrepancy = {
                let previous = state.validation.iter().collect();
                self.call(self.analyst.as_ref(), AnalysisStage::Discrepancy, &data, previous).await
            };
            if discrepancy.is_usable() {
                self.status(&format!(
                    "Analyst finished: {} solutions proposed",
                    discrepancy.count(super::FindingKind::Solution)
                ));
            } else {
                self.status("Analyst failed; continuing with tax delta");
            }
            state.set_report(discrepancy);

            self.status("Tax agent calculating deltas");
            let tax_delta = {
                let previous = state.validation.iter().chain(state.discrepancy.iter()).collect();
                self.call(self.tax_advisor.as_ref(), AnalysisStage::TaxDelta, &data, previous).await
            };
            if tax_delta.is_usable() {
                self.status(&format!("Tax agent finished: {}", tax_delta.delta_headline()));
            } else {
                self.status("Tax agent failed; results are limited");
            }
            state.set_report(tax_delta);
        }

        let summary = state.summarize();
        state.summary = Some(summary.clone());
        state.processed_at = Some(Utc::now());

        info!(
            "Analysis of {} finished: complete={}, opportunities={}, discrepancies={}, solutions={}",
            state.source_name, summary.complete, summary.opportunities, summary.discrepancies, summary.solutions
        );
        self.status("Analysis finished");

        Ok(summary)
    }

    async fn call(
        &self,
        agent: &dyn AnalysisAgent,
        stage: AnalysisStage,
        data: &Extraction,
        previous: Vec<&StepReport>,
    ) -> StepReport {
        let request = AnalysisRequest::new(stage, data, previous);
        match agent.analyze(&request).await {
            Ok(mut report) => {
                if report.stage != stage {
                    warn!("Agent for {} returned a report labelled {}", stage, report.stage);
                    report.stage = stage;
                }
                report
            }
            Err(e) => {
                error!("Agent for {} failed: {}", stage, e);
                StepReport::failed(stage, e.to_string())
            }
        }
    }

    fn status(&self, message: &str) {
        info!("{}", message);
        if let Some(callback) = &self.on_status {
            callback(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::Record;
    use crate::models::workflow::{Finding, FindingKind};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    struct FixedAgent {
        status: StepStatus,
        findings: Vec<Finding>,
        exposure: Option<f64>,
        seen_previous: Arc<Mutex<Vec<usize>>>,
    }

    impl FixedAgent {
        fn boxed(status: StepStatus, findings: Vec<Finding>) -> Box<dyn AnalysisAgent> {
            Box::new(Self {
                status,
                findings,
                exposure: None,
                seen_previous: Arc::new(Mutex::new(Vec::new())),
            })
        }
    }

    #[async_trait]
    impl AnalysisAgent for FixedAgent {
        async fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<StepReport, PipelineError> {
            self.seen_previous.lock().unwrap().push(request.previous.len());
            Ok(StepReport {
                stage: request.stage,
                status: self.status,
                summary: format!("{} done", request.stage),
                findings: self.findings.clone(),
                products_analyzed: request.items.len(),
                error: None,
                exposure_total: self.exposure,
                fines_total: None,
                completed_at: Utc::now(),
            })
        }
    }

    struct FailingAgent;

    #[async_trait]
    impl AnalysisAgent for FailingAgent {
        async fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<StepReport, PipelineError> {
            Err(PipelineError::Agent {
                stage: request.stage.to_string(),
                reason: "quota exceeded".to_string(),
            })
        }
    }

    fn finding(kind: FindingKind) -> Finding {
        Finding {
            kind,
            product: Some("A-001".to_string()),
            description: "test".to_string(),
            severity: None,
            recommendation: None,
        }
    }

    fn ready_state() -> WorkflowState {
        let mut state = WorkflowState::new("nota.xml");
        let items = vec![Record::from_iter([("Item", "1")]), Record::from_iter([("Item", "2")])];
        state.protected = Some(Extraction { header: Record::new(), items });
        state
    }

    #[tokio::test]
    async fn test_full_run_summarizes_all_stages() {
        let orchestrator = Orchestrator::new(
            FixedAgent::boxed(
                StepStatus::Success,
                vec![finding(FindingKind::Opportunity), finding(FindingKind::Discrepancy), finding(FindingKind::Discrepancy)],
            ),
            FixedAgent::boxed(StepStatus::Partial, vec![finding(FindingKind::Solution)]),
            FixedAgent::boxed(StepStatus::Success, vec![finding(FindingKind::Exposure)]),
        );

        let mut state = ready_state();
        let summary = orchestrator.run(&mut state).await.unwrap();

        assert_eq!(
            summary,
            ExecutionSummary {
                stages_run: 3,
                opportunities: 1,
                discrepancies: 2,
                solutions: 1,
                products_analyzed: 2,
                complete: true,
                aborted: false,
            }
        );
        assert!(state.processed_at.is_some());
        assert_eq!(state.summary.as_ref(), Some(&summary));
    }

    #[tokio::test]
    async fn test_validation_failure_aborts() {
        let orchestrator = Orchestrator::new(
            Box::new(FailingAgent),
            FixedAgent::boxed(StepStatus::Success, vec![]),
            FixedAgent::boxed(StepStatus::Success, vec![]),
        );

        let mut state = ready_state();
        let summary = orchestrator.run(&mut state).await.unwrap();

        assert!(summary.aborted);
        assert!(!summary.complete);
        assert_eq!(summary.stages_run, 1);
        assert!(state.discrepancy.is_none());
        assert_eq!(
            state.validation.as_ref().and_then(|r| r.error.as_deref()),
            Some("agent validation failed: quota exceeded")
        );
    }

    #[tokio::test]
    async fn test_later_failures_are_recorded_and_run_continues() {
        let orchestrator = Orchestrator::new(
            FixedAgent::boxed(StepStatus::Success, vec![]),
            Box::new(FailingAgent),
            FixedAgent::boxed(StepStatus::Success, vec![]),
        );

        let mut state = ready_state();
        let summary = orchestrator.run(&mut state).await.unwrap();

        assert_eq!(summary.stages_run, 3);
        assert!(!summary.complete);
        assert!(!summary.aborted);
        assert_eq!(state.discrepancy.as_ref().map(|r| r.status), Some(StepStatus::Error));
        assert_eq!(state.tax_delta.as_ref().map(|r| r.status), Some(StepStatus::Success));
    }

    #[tokio::test]
    async fn test_previous_reports_are_forwarded() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let agent = |seen: &Arc<Mutex<Vec<usize>>>| -> Box<dyn AnalysisAgent> {
            Box::new(FixedAgent {
                status: StepStatus::Success,
                findings: vec![],
                exposure: None,
                seen_previous: Arc::clone(seen),
            })
        };
        let orchestrator = Orchestrator::new(agent(&seen), agent(&seen), agent(&seen));

        orchestrator.run(&mut ready_state()).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_requires_protected_data() {
        let orchestrator = Orchestrator::new(
            FixedAgent::boxed(StepStatus::Success, vec![]),
            FixedAgent::boxed(StepStatus::Success, vec![]),
            FixedAgent::boxed(StepStatus::Success, vec![]),
        );

        let err = orchestrator.run(&mut WorkflowState::new("x.xml")).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_status_callback_receives_messages() {
        let messages = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&messages);
        let orchestrator = Orchestrator::new(
            FixedAgent::boxed(StepStatus::Success, vec![]),
            FixedAgent::boxed(StepStatus::Success, vec![]),
            FixedAgent::boxed(StepStatus::Success, vec![]),
        )
        .with_status_callback(move |m| sink.lock().unwrap().push(m.to_string()));

        orchestrator.run(&mut ready_state()).await.unwrap();

        let messages = messages.lock().unwrap();
        assert_eq!(messages.last().map(String::as_str), Some("Analysis finished"));
        assert!(messages.len() >= 4);
    }

    #[tokio::test]
    async fn test_completion_messages_for_later_stages() {
        let messages = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&messages);
        let tax_advisor = Box::new(FixedAgent {
            status: StepStatus::Success,
            findings: vec![],
            exposure: Some(842.1),
            seen_previous: Arc::new(Mutex::new(Vec::new())),
        });
        let orchestrator = Orchestrator::new(
            FixedAgent::boxed(StepStatus::Success, vec![]),
            FixedAgent::boxed(
                StepStatus::Success,
                vec![finding(FindingKind::Solution), finding(FindingKind::Solution)],
            ),
            tax_advisor,
        )
        .with_status_callback(move |m| sink.lock().unwrap().push(m.to_string()));

        let mut state = ready_state();
        orchestrator.run(&mut state).await.unwrap();

        let messages = messages.lock().unwrap();
        assert!(messages.contains(&"Analyst finished: 2 solutions proposed".to_string()));
        assert!(messages.contains(&"Tax agent finished: delta of R$ 842.10 identified".to_string()));
        assert_eq!(state.tax_delta.as_ref().and_then(|r| r.exposure_total), Some(842.1));
    }

    #[tokio::test]
    async fn test_tax_failure_is_reported() {
        let messages = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&messages);
        let orchestrator = Orchestrator::new(
            FixedAgent::boxed(StepStatus::Success, vec![]),
            FixedAgent::boxed(StepStatus::Success, vec![]),
            Box::new(FailingAgent),
        )
        .with_status_callback(move |m| sink.lock().unwrap().push(m.to_string()));

        orchestrator.run(&mut ready_state()).await.unwrap();

        assert!(messages
            .lock()
            .unwrap()
            .contains(&"Tax agent failed; results are limited".to_string()));
    }
}
