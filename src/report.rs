//! Report export.
//!
//! Assembles the rendering payload from a finished workflow and hands it to
//! an external renderer. Document layout belongs to the renderer; this side
//! only builds the payload and saves the returned artifact.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{WorkflowError, WorkflowResult};
use crate::evaluator::EvaluationResult;
use crate::params::ParameterSet;
use crate::plan::{self, DayPlanEntry};

const RENDER_TIMEOUT_SECS: u64 = 60;

static RENDER_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent("mealflow/0.1")
        .timeout(Duration::from_secs(RENDER_TIMEOUT_SECS))
        .build()
        .expect("failed to build HTTP client")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
    Xlsx,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Xlsx => "xlsx",
        }
    }
}

/// Institution metadata stamped onto the report header.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReportMetadata {
    pub school_name: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub days: u32,
    pub budget_won: f64,
    pub avg_kcal: f64,
    pub total_cost: f64,
    pub budget_compliance_pct: f64,
    pub feasible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPayload {
    pub generated_at: String,
    pub metadata: ReportMetadata,
    pub strategy_title: String,
    pub params: ParameterSet,
    pub summary: ReportSummary,
    pub plan: Vec<DayPlanEntry>,
    pub format: ReportFormat,
}

/// Builds the renderer payload from the chosen evaluation result.
pub fn build_payload(
    result: &EvaluationResult,
    params: &ParameterSet,
    metadata: ReportMetadata,
    format: ReportFormat,
) -> WorkflowResult<ReportPayload> {
    if !result.succeeded() {
        return Err(WorkflowError::validation(
            "cannot export a failed evaluation",
        ));
    }
    if result.entries.is_empty() {
        return Err(WorkflowError::validation("plan has no day entries"));
    }

    let total_cost = plan::total_cost(&result.entries);
    let per_day = total_cost / result.entries.len() as f64;
    let summary = ReportSummary {
        days: result.entries.len() as u32,
        budget_won: params.budget_won,
        avg_kcal: plan::avg_calories(&result.entries),
        total_cost,
        budget_compliance_pct: plan::budget_compliance_pct(&result.entries, params.budget_won),
        feasible: per_day <= params.budget_won,
    };

    Ok(ReportPayload {
        generated_at: Utc::now().to_rfc3339(),
        metadata,
        strategy_title: result.title.clone(),
        params: params.clone(),
        summary,
        plan: result.entries.clone(),
        format,
    })
}

#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, payload: &ReportPayload) -> WorkflowResult<Vec<u8>>;
}

/// Posts the payload to the rendering service and returns the artifact bytes.
pub struct HttpRenderer {
    base_url: String,
}

impl HttpRenderer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ReportRenderer for HttpRenderer {
    async fn render(&self, payload: &ReportPayload) -> WorkflowResult<Vec<u8>> {
        let url = format!("{}/api/report/render", self.base_url);
        let response = RENDER_CLIENT
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| WorkflowError::operation(format!("failed POST request: {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(WorkflowError::operation(format!(
                "POST {url} returned {status}"
            )));
        }
        let bytes = response.bytes().await.map_err(|e| {
            WorkflowError::operation(format!("failed reading artifact body: {url}: {e}"))
        })?;
        if bytes.is_empty() {
            return Err(WorkflowError::operation("renderer returned empty artifact"));
        }
        Ok(bytes.to_vec())
    }
}

/// Writes the rendered artifact under `dir` with a timestamped name and
/// returns the path.
pub fn save_artifact(
    dir: &Path,
    payload: &ReportPayload,
    artifact: &[u8],
) -> WorkflowResult<PathBuf> {
    std::fs::create_dir_all(dir)
        .map_err(|e| WorkflowError::operation(format!("failed creating {}: {e}", dir.display())))?;
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let file = dir.join(format!(
        "meal-plan-{stamp}.{}",
        payload.format.extension()
    ));
    std::fs::write(&file, artifact)
        .map_err(|e| WorkflowError::operation(format!("failed writing {}: {e}", file.display())))?;
    info!(path = %file.display(), bytes = artifact.len(), "report artifact saved");
    Ok(file)
}
