//! Analyze command - extract, protect and run the analysis agents.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{debug, info};

use nfex_core::error::PipelineError;
use nfex_core::models::config::AnalysisConfig;
use nfex_core::pipeline::{AnalysisRequest, ExecutionSummary, Finding};
use nfex_core::{
    AnalysisAgent, AnalysisStage, FieldProtector, Orchestrator, SelectiveProtector, StepReport,
    StepStatus, WorkflowState,
};

use super::{extractor, load_config};

/// Arguments for the analyze command.
#[derive(Args)]
pub struct AnalyzeArgs {
    /// Input NF-e XML file
    #[arg(required = true)]
    input: PathBuf,

    /// Write the full workflow state as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Analysis service base URL (overrides config)
    #[arg(long)]
    endpoint: Option<String>,
}

pub async fn run(args: AnalyzeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(endpoint) = args.endpoint {
        config.analysis.endpoint = Some(endpoint);
    }

    let Some(endpoint) = config.analysis.endpoint.clone() else {
        anyhow::bail!(
            "No analysis endpoint configured.\n\n\
             Pass --endpoint or run 'nfex config set analysis.endpoint <url>'."
        );
    };

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let source = args
        .input
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("nfe.xml")
        .to_string();

    let xml = fs::read_to_string(&args.input)?;
    let extraction = extractor(&config).extract(&xml)?;

    let mut state = WorkflowState::new(&source);
    state.protected = Some(if config.protection.enabled {
        SelectiveProtector::from_config(&config.protection)?.protect(&extraction)?
    } else {
        extraction.clone()
    });
    state.extracted = Some(extraction);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.analysis.request_timeout_secs))
        .build()?;
    let api_key = std::env::var(&config.analysis.api_key_env).ok();
    let agent = |stage: AnalysisStage| -> Box<dyn AnalysisAgent> {
        Box::new(HttpAgent::new(client.clone(), &endpoint, stage, api_key.clone(), &config.analysis))
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));

    let status_pb = pb.clone();
    let orchestrator = Orchestrator::new(
        agent(AnalysisStage::Validation),
        agent(AnalysisStage::Discrepancy),
        agent(AnalysisStage::TaxDelta),
    )
    .with_status_callback(move |message| status_pb.set_message(message.to_string()));

    let budget = config.analysis.total_timeout_secs;
    let summary = match tokio::time::timeout(Duration::from_secs(budget), orchestrator.run(&mut state)).await {
        Ok(result) => result?,
        Err(_) => {
            pb.abandon_with_message("Timed out");
            return Err(PipelineError::Timeout(budget).into());
        }
    };
    pb.finish_and_clear();

    print_summary(&state, &summary);

    if let Some(output_path) = &args.output {
        fs::write(output_path, serde_json::to_string_pretty(&state)?)?;
        println!(
            "{} Workflow state written to {}",
            style("✓").green(),
            output_path.display()
        );
    }

    Ok(())
}

fn print_summary(state: &WorkflowState, summary: &ExecutionSummary) {
    println!("{}", style(format!("Analysis of {}", state.source_name)).bold());

    for stage in AnalysisStage::ALL {
        let line = match state.report(stage) {
            Some(report) => match report.status {
                StepStatus::Success if stage == AnalysisStage::TaxDelta => format!(
                    "{} {} ({})",
                    style("✓").green(),
                    report.summary,
                    report.delta_headline()
                ),
                StepStatus::Success => format!("{} {}", style("✓").green(), report.summary),
                StepStatus::Partial => format!("{} {}", style("~").yellow(), report.summary),
                StepStatus::Error => format!(
                    "{} {}",
                    style("✗").red(),
                    report.error.as_deref().unwrap_or("failed")
                ),
            },
            None => format!("{} not run", style("-").dim()),
        };
        println!("  {:<12} {}", stage.as_str(), line);
    }

    println!();
    println!("  Products analysed: {}", summary.products_analyzed);
    println!("  Opportunities:     {}", summary.opportunities);
    println!("  Discrepancies:     {}", summary.discrepancies);
    println!("  Solutions:         {}", summary.solutions);

    if summary.aborted {
        println!("{}", style("Validation failed; later stages were skipped.").red());
    } else if summary.complete {
        println!("{}", style("Analysis complete.").green());
    } else {
        println!("{}", style("Analysis finished with partial results.").yellow());
    }
}

/// Agent backed by a JSON HTTP service at `<endpoint>/<stage>`.
struct HttpAgent {
    client: reqwest::Client,
    url: String,
    stage: AnalysisStage,
    api_key: Option<String>,
    step_delay: Duration,
}

/// Body returned by the analysis service.
#[derive(Deserialize)]
struct AgentResponse {
    status: StepStatus,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    findings: Vec<Finding>,
    #[serde(default)]
    products_analyzed: usize,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    exposure_total: Option<f64>,
    #[serde(default)]
    fines_total: Option<f64>,
}

impl HttpAgent {
    fn new(
        client: reqwest::Client,
        endpoint: &str,
        stage: AnalysisStage,
        api_key: Option<String>,
        config: &AnalysisConfig,
    ) -> Self {
        Self {
            client,
            url: format!("{}/{}", endpoint.trim_end_matches('/'), stage.as_str()),
            stage,
            api_key,
            step_delay: Duration::from_millis(config.step_delay_ms),
        }
    }

    fn failure(&self, reason: impl ToString) -> PipelineError {
        PipelineError::Agent {
            stage: self.stage.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl AnalysisAgent for HttpAgent {
    async fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<StepReport, PipelineError> {
        // Inter-stage pacing for provider rate limits.
        if self.stage != AnalysisStage::Validation && !self.step_delay.is_zero() {
            debug!("Waiting {:?} before {}", self.step_delay, self.stage);
            tokio::time::sleep(self.step_delay).await;
        }

        info!("POST {}", self.url);
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.failure(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.failure(format!("HTTP {}: {}", status, body.trim())));
        }

        let body: AgentResponse = response.json().await.map_err(|e| self.failure(e))?;

        Ok(StepReport {
            stage: self.stage,
            status: body.status,
            summary: body.summary,
            findings: body.findings,
            products_analyzed: body.products_analyzed,
            error: body.error,
            exposure_total: body.exposure_total,
            fines_total: body.fines_total,
            completed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use nfex_core::Extraction;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    type Route = (&'static str, u16, &'static str);

    /// Local HTTP server answering each path with a canned JSON body.
    /// Returns the base URL and the raw requests received.
    async fn serve(routes: Vec<Route>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let request = read_request(&mut socket).await;
                let path = request.split_whitespace().nth(1).unwrap_or("").to_string();
                log.lock().unwrap().push(request);

                let (status, body) = routes
                    .iter()
                    .find(|(route, _, _)| *route == path)
                    .map(|(_, status, body)| (*status, *body))
                    .unwrap_or((404, "{}"));
                let response = format!(
                    "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}"), received)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn agent(endpoint: &str, stage: AnalysisStage, step_delay_ms: u64, api_key: Option<&str>) -> HttpAgent {
        let config = AnalysisConfig {
            step_delay_ms,
            ..AnalysisConfig::default()
        };
        HttpAgent::new(
            reqwest::Client::new(),
            endpoint,
            stage,
            api_key.map(str::to_string),
            &config,
        )
    }

    fn extraction() -> Extraction {
        Extraction {
            header: [("Número NF", "4521")].into_iter().collect(),
            items: vec![[("Item", "1"), ("NCM", "73181500")].into_iter().collect()],
        }
    }

    #[tokio::test]
    async fn test_posts_to_stage_url_and_maps_response() {
        let (endpoint, received) = serve(vec![(
            "/validation",
            200,
            r#"{"status":"success","summary":"2 rules","findings":[{"kind":"opportunity","description":"credit"}],"products_analyzed":1}"#,
        )])
        .await;

        let data = extraction();
        let request = AnalysisRequest::new(AnalysisStage::Validation, &data, vec![]);
        let report = agent(&format!("{endpoint}/"), AnalysisStage::Validation, 0, Some("secret"))
            .analyze(&request)
            .await
            .unwrap();

        assert_eq!(report.stage, AnalysisStage::Validation);
        assert_eq!(report.status, StepStatus::Success);
        assert_eq!(report.summary, "2 rules");
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.products_analyzed, 1);

        let requests = received.lock().unwrap();
        let raw = requests[0].to_lowercase();
        assert!(raw.starts_with("post /validation http/1.1"));
        assert!(raw.contains("authorization: bearer secret"));
        assert!(raw.contains(r#""stage":"validation""#));
        assert!(raw.contains("73181500"));
    }

    #[tokio::test]
    async fn test_http_error_becomes_agent_failure() {
        let (endpoint, _) = serve(vec![("/discrepancy", 500, "quota exceeded")]).await;

        let data = extraction();
        let request = AnalysisRequest::new(AnalysisStage::Discrepancy, &data, vec![]);
        let err = agent(&endpoint, AnalysisStage::Discrepancy, 0, None)
            .analyze(&request)
            .await
            .unwrap_err();

        match err {
            PipelineError::Agent { stage, reason } => {
                assert_eq!(stage, "discrepancy");
                assert!(reason.contains("500"));
                assert!(reason.contains("quota exceeded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_step_delay_applies_after_validation_only() {
        let (endpoint, _) = serve(vec![
            ("/validation", 200, r#"{"status":"success"}"#),
            ("/tax_delta", 200, r#"{"status":"success"}"#),
        ])
        .await;
        let data = extraction();

        let validation = AnalysisRequest::new(AnalysisStage::Validation, &data, vec![]);
        let quick = agent(&endpoint, AnalysisStage::Validation, 60_000, None);
        let result = tokio::time::timeout(Duration::from_secs(10), quick.analyze(&validation)).await;
        assert!(result.is_ok());

        let tax = AnalysisRequest::new(AnalysisStage::TaxDelta, &data, vec![]);
        let delayed = agent(&endpoint, AnalysisStage::TaxDelta, 60_000, None);
        let result = tokio::time::timeout(Duration::from_millis(300), delayed.analyze(&tax)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_pipeline_continues_after_analyst_failure() {
        let (endpoint, received) = serve(vec![
            ("/validation", 200, r#"{"status":"success","products_analyzed":1}"#),
            ("/discrepancy", 500, "upstream unavailable"),
            ("/tax_delta", 200, r#"{"status":"partial","summary":"estimated","exposure_total":1000.0}"#),
        ])
        .await;

        let orchestrator = Orchestrator::new(
            Box::new(agent(&endpoint, AnalysisStage::Validation, 0, None)),
            Box::new(agent(&endpoint, AnalysisStage::Discrepancy, 0, None)),
            Box::new(agent(&endpoint, AnalysisStage::TaxDelta, 0, None)),
        );

        let mut state = WorkflowState::new("nota.xml");
        state.protected = Some(extraction());
        let summary = orchestrator.run(&mut state).await.unwrap();

        assert_eq!(summary.stages_run, 3);
        assert!(!summary.aborted);
        assert!(!summary.complete);
        assert_eq!(state.discrepancy.as_ref().map(|r| r.status), Some(StepStatus::Error));

        let tax = state.tax_delta.as_ref().unwrap();
        assert_eq!(tax.status, StepStatus::Partial);
        assert_eq!(tax.exposure_total, Some(1000.0));
        assert_eq!(received.lock().unwrap().len(), 3);
    }
}
