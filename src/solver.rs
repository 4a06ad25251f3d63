//! Meal-plan solver backends.
//!
//! The optimizer lives behind [`MealPlanSolver`] so the workflow can run
//! against the real HTTP service or a deterministic in-process mock. Raw
//! solver responses are parsed strictly at this boundary; anything malformed
//! surfaces as an operation error instead of leaking into workflow state.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{WorkflowError, WorkflowResult};
use crate::params::ParameterSet;
use crate::plan::{self, DayPlanEntry};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 6;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent("mealflow/0.1")
        .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .build()
        .expect("failed to build HTTP client")
});

/// Per-plan aggregates reported alongside the day entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub days: u32,
    pub total_cost: f64,
    pub avg_kcal: f64,
    pub feasible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOutcome {
    pub entries: Vec<DayPlanEntry>,
    pub summary: PlanSummary,
}

#[async_trait]
pub trait MealPlanSolver: Send + Sync {
    fn name(&self) -> &str;
    async fn optimize(&self, params: &ParameterSet, use_preset: bool)
        -> WorkflowResult<SolverOutcome>;
}

/// Talks to the optimization service over HTTP.
pub struct HttpSolver {
    base_url: String,
}

impl HttpSolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/mealplan/optimize", self.base_url)
    }
}

#[async_trait]
impl MealPlanSolver for HttpSolver {
    fn name(&self) -> &str {
        "http"
    }

    async fn optimize(
        &self,
        params: &ParameterSet,
        use_preset: bool,
    ) -> WorkflowResult<SolverOutcome> {
        let url = self.endpoint();
        let body = json!({
            "use_preset": use_preset,
            "params": {
                "days": params.days,
                "budget_won": params.budget_won,
                "target_kcal": params.target_kcal,
            },
        });
        debug!(%url, days = params.days, "dispatching optimize request");

        let response = HTTP_CLIENT
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| WorkflowError::operation(format!("failed POST request: {url}: {e}")))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            WorkflowError::operation(format!("failed reading response body: {url}: {e}"))
        })?;
        if !status.is_success() {
            let preview: String = text.chars().take(180).collect();
            return Err(WorkflowError::operation(format!(
                "POST {url} returned {status}: {preview}"
            )));
        }
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| WorkflowError::operation(format!("invalid JSON response: {url}: {e}")))?;
        parse_solver_response(&value, params)
    }
}

/// Converts the wire payload into typed workflow state. Non-day footer rows
/// are dropped; rows claiming a numeric day must parse fully or the whole
/// response is rejected.
pub fn parse_solver_response(value: &Value, params: &ParameterSet) -> WorkflowResult<SolverOutcome> {
    let rows = value
        .get("plan")
        .and_then(Value::as_array)
        .ok_or_else(|| WorkflowError::operation("solver response missing plan array"))?;
    let entries = plan::parse_plan_entries(rows)?;
    if entries.is_empty() {
        return Err(WorkflowError::operation(
            "solver response contained no day entries",
        ));
    }

    let summary = match value.get("summary") {
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| WorkflowError::operation(format!("malformed solver summary: {e}")))?,
        None => {
            warn!("solver response missing summary, deriving from entries");
            derive_summary(&entries, params)
        }
    };

    Ok(SolverOutcome { entries, summary })
}

fn derive_summary(entries: &[DayPlanEntry], params: &ParameterSet) -> PlanSummary {
    let total_cost = plan::total_cost(entries);
    PlanSummary {
        days: entries.len() as u32,
        total_cost,
        avg_kcal: plan::avg_calories(entries),
        feasible: total_cost / entries.len().max(1) as f64 <= params.budget_won,
    }
}

/// Runs the primary solver and substitutes the fallback on operation
/// failure. Cancellations and validation failures pass through untouched.
pub struct FallbackSolver<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> FallbackSolver<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P, F> MealPlanSolver for FallbackSolver<P, F>
where
    P: MealPlanSolver,
    F: MealPlanSolver,
{
    fn name(&self) -> &str {
        "fallback"
    }

    async fn optimize(
        &self,
        params: &ParameterSet,
        use_preset: bool,
    ) -> WorkflowResult<SolverOutcome> {
        match self.primary.optimize(params, use_preset).await {
            Err(WorkflowError::Operation(message)) => {
                warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    %message,
                    "primary solver failed, using fallback"
                );
                self.fallback.optimize(params, use_preset).await
            }
            other => other,
        }
    }
}

/// Builds the solver stack described by the configuration.
pub fn from_config(config: &crate::config::Config) -> std::sync::Arc<dyn MealPlanSolver> {
    let http = HttpSolver::new(config.solver.base_url.clone());
    if config.workflow.mock_fallback {
        std::sync::Arc::new(FallbackSolver::new(http, MockSolver))
    } else {
        std::sync::Arc::new(http)
    }
}

/// Deterministic in-process solver. Output depends only on the parameters,
/// so repeated runs and tests see identical plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockSolver;

const MOCK_RICE: [&str; 4] = ["Rice", "Barley rice", "Multigrain rice", "Bean rice"];
const MOCK_SOUP: [&str; 4] = [
    "Soybean paste soup",
    "Seaweed soup",
    "Beef radish soup",
    "Egg drop soup",
];
const MOCK_SIDES: [&str; 6] = [
    "Bulgogi",
    "Grilled mackerel",
    "Stir-fried pork",
    "Braised tofu",
    "Chicken teriyaki",
    "Fish cake stir-fry",
];
const MOCK_VEG: [&str; 4] = [
    "Seasoned spinach",
    "Bean sprout salad",
    "Cucumber salad",
    "Stir-fried zucchini",
];
const MOCK_SNACK: [&str; 4] = ["Apple", "Yogurt", "Banana", "Milk"];

#[async_trait]
impl MealPlanSolver for MockSolver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn optimize(
        &self,
        params: &ParameterSet,
        _use_preset: bool,
    ) -> WorkflowResult<SolverOutcome> {
        params.validate()?;
        let (carb, prot, fat) = match &params.macro_ratios {
            Some(ratios) => (
                ratios.carb_pct as f64,
                ratios.protein_pct as f64,
                ratios.fat_pct as f64,
            ),
            None => (60.0, 15.0, 25.0),
        };

        let entries: Vec<DayPlanEntry> = (1..=params.days)
            .map(|day| {
                let idx = day as usize;
                // Small deterministic wobble keeps per-day figures distinct
                // while holding the average cost under the budget.
                let wobble = (day % 5) as f64 / 100.0;
                DayPlanEntry {
                    day,
                    rice: MOCK_RICE[idx % MOCK_RICE.len()].to_string(),
                    soup: MOCK_SOUP[idx % MOCK_SOUP.len()].to_string(),
                    side1: MOCK_SIDES[idx % MOCK_SIDES.len()].to_string(),
                    side2: MOCK_SIDES[(idx + 3) % MOCK_SIDES.len()].to_string(),
                    side3: MOCK_VEG[idx % MOCK_VEG.len()].to_string(),
                    snack: MOCK_SNACK[idx % MOCK_SNACK.len()].to_string(),
                    day_kcal: params.target_kcal * (0.98 + wobble),
                    day_cost: params.budget_won * (0.96 + wobble),
                    carb_pct_cal: carb,
                    prot_pct_cal: prot,
                    fat_pct_cal: fat,
                }
            })
            .collect();

        let summary = derive_summary(&entries, params);
        Ok(SolverOutcome { entries, summary })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_params() -> ParameterSet {
        ParameterSet::default()
    }

    #[test]
    fn parses_plan_and_summary_from_response() {
        let payload = json!({
            "plan": [
                {
                    "day": 1, "rice": "Rice", "soup": "Seaweed soup",
                    "side1": "Bulgogi", "side2": "Braised tofu",
                    "side3": "Seasoned spinach", "snack": "Apple",
                    "day_kcal": 905.0, "day_cost": 5310.0,
                    "carb_pct_cal": 58.0, "prot_pct_cal": 16.0, "fat_pct_cal": 26.0
                },
                { "day": "합계", "day_cost": 5310.0 }
            ],
            "summary": { "days": 1, "total_cost": 5310.0, "avg_kcal": 905.0, "feasible": true }
        });

        let outcome =
            parse_solver_response(&payload, &sample_params()).expect("parse failed");
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.summary.days, 1);
        assert!(outcome.summary.feasible);
    }

    #[test]
    fn missing_plan_array_is_an_operation_error() {
        let payload = json!({ "summary": {} });
        let err = parse_solver_response(&payload, &sample_params()).unwrap_err();
        assert!(matches!(err, WorkflowError::Operation(_)));
    }

    #[test]
    fn empty_plan_is_rejected() {
        let payload = json!({ "plan": [] });
        let err = parse_solver_response(&payload, &sample_params()).unwrap_err();
        assert!(matches!(err, WorkflowError::Operation(_)));
    }

    #[tokio::test]
    async fn mock_solver_is_deterministic() {
        let solver = MockSolver;
        let params = sample_params();
        let first = solver.optimize(&params, false).await.expect("solve failed");
        let second = solver.optimize(&params, false).await.expect("solve failed");
        assert_eq!(first.entries.len(), params.days as usize);
        assert_eq!(
            serde_json::to_string(&first.entries).expect("serialize"),
            serde_json::to_string(&second.entries).expect("serialize"),
        );
    }

    #[tokio::test]
    async fn mock_solver_respects_parameters() {
        let solver = MockSolver;
        let mut params = sample_params();
        params.days = 5;
        params.budget_won = 6000.0;
        let outcome = solver.optimize(&params, false).await.expect("solve failed");
        assert_eq!(outcome.summary.days, 5);
        assert!(outcome.summary.feasible);
        for entry in &outcome.entries {
            assert!(entry.day_cost > 5000.0);
        }
    }

    struct BrokenSolver;

    #[async_trait]
    impl MealPlanSolver for BrokenSolver {
        fn name(&self) -> &str {
            "broken"
        }

        async fn optimize(
            &self,
            _params: &ParameterSet,
            _use_preset: bool,
        ) -> WorkflowResult<SolverOutcome> {
            Err(WorkflowError::operation("connection refused"))
        }
    }

    #[tokio::test]
    async fn fallback_covers_primary_operation_failures() {
        let solver = FallbackSolver::new(BrokenSolver, MockSolver);
        let params = sample_params();
        let outcome = solver.optimize(&params, false).await.expect("solve failed");
        assert_eq!(outcome.entries.len(), params.days as usize);
    }

    #[tokio::test]
    async fn fallback_leaves_validation_errors_alone() {
        let solver = FallbackSolver::new(MockSolver, BrokenSolver);
        let mut params = sample_params();
        params.budget_won = -1.0;
        let err = solver.optimize(&params, false).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[tokio::test]
    async fn mock_solver_rejects_invalid_parameters() {
        let solver = MockSolver;
        let mut params = sample_params();
        params.days = 0;
        let err = solver.optimize(&params, false).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }
}
