//! Multi-alternative evaluation.
//!
//! Runs one solver call per alternative under its own lifecycle key, so a
//! re-triggered evaluation supersedes the in-flight one cleanly. The calls
//! run concurrently and fail independently; the comparison advances as long
//! as at least one succeeds.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::alternatives::{Alternative, StrategyType};
use crate::error::{WorkflowError, WorkflowResult};
use crate::lifecycle::RequestManager;
use crate::params::ParameterSet;
use crate::plan::{self, DayPlanEntry};
use crate::solver::{MealPlanSolver, PlanSummary};

/// Quantitative figures derived from a solved plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetrics {
    pub total_cost: f64,
    pub avg_calories: f64,
    pub budget_compliance_pct: f64,
}

/// Strategy commentary shown beside the numbers. Fixed per strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitativeNotes {
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub alternative_id: u32,
    pub title: String,
    pub strategy_type: StrategyType,
    pub entries: Vec<DayPlanEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<PlanSummary>,
    pub metrics: PlanMetrics,
    pub qualitative: QualitativeNotes,
    pub status: EvaluationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl EvaluationResult {
    pub fn succeeded(&self) -> bool {
        self.status == EvaluationStatus::Success
    }
}

pub fn qualitative_notes(strategy: StrategyType) -> QualitativeNotes {
    match strategy {
        StrategyType::Nutrition => QualitativeNotes {
            pros: vec![
                "Strong macro and micro nutrient coverage".to_string(),
                "Higher protein share per meal".to_string(),
            ],
            cons: vec!["Per-meal cost runs above the baseline".to_string()],
            risks: vec!["Budget overrun when ingredient prices spike".to_string()],
        },
        StrategyType::Economic => QualitativeNotes {
            pros: vec![
                "Lowest per-meal cost of the three".to_string(),
                "Stable procurement from staple ingredients".to_string(),
            ],
            cons: vec!["Less menu variety across the cycle".to_string()],
            risks: vec!["Nutrient targets may sit near the lower bounds".to_string()],
        },
        StrategyType::Preference => QualitativeNotes {
            pros: vec![
                "High expected student satisfaction".to_string(),
                "Balanced cost close to the baseline".to_string(),
            ],
            cons: vec!["Popular menus repeat more often".to_string()],
            risks: vec!["Preference data can drift between semesters".to_string()],
        },
    }
}

/// Evaluates every alternative against the shared parameter set,
/// concurrently. Per-call failures become `Failed` rows; only an all-fail
/// run is an error. A cancelled call aborts the whole evaluation so a newer
/// run can take over.
pub async fn evaluate_alternatives(
    manager: &RequestManager,
    solver: &dyn MealPlanSolver,
    alternatives: &[Alternative],
    params: &ParameterSet,
) -> WorkflowResult<Vec<EvaluationResult>> {
    params.validate()?;
    if alternatives.is_empty() {
        return Err(WorkflowError::validation("no alternatives to evaluate"));
    }

    let outcomes = join_all(alternatives.iter().map(|alternative| async move {
        let key = format!("optimize:{}", alternative.id);
        manager.submit(&key, solver.optimize(params, false)).await
    }))
    .await;

    let mut results = Vec::with_capacity(alternatives.len());
    for (alternative, outcome) in alternatives.iter().zip(outcomes) {
        match outcome {
            Ok(solved) => {
                let metrics = PlanMetrics {
                    total_cost: plan::total_cost(&solved.entries),
                    avg_calories: plan::avg_calories(&solved.entries),
                    budget_compliance_pct: plan::budget_compliance_pct(
                        &solved.entries,
                        params.budget_won,
                    ),
                };
                info!(
                    alternative = alternative.id,
                    compliance = metrics.budget_compliance_pct,
                    "alternative evaluated"
                );
                results.push(EvaluationResult {
                    alternative_id: alternative.id,
                    title: alternative.title.clone(),
                    strategy_type: alternative.strategy_type,
                    entries: solved.entries,
                    summary: Some(solved.summary),
                    metrics,
                    qualitative: qualitative_notes(alternative.strategy_type),
                    status: EvaluationStatus::Success,
                    error_detail: None,
                });
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                warn!(alternative = alternative.id, error = %err, "alternative evaluation failed");
                results.push(EvaluationResult {
                    alternative_id: alternative.id,
                    title: alternative.title.clone(),
                    strategy_type: alternative.strategy_type,
                    entries: Vec::new(),
                    summary: None,
                    metrics: PlanMetrics {
                        total_cost: 0.0,
                        avg_calories: 0.0,
                        budget_compliance_pct: 0.0,
                    },
                    qualitative: qualitative_notes(alternative.strategy_type),
                    status: EvaluationStatus::Failed,
                    error_detail: Some(err.to_string()),
                });
            }
        }
    }

    if results.iter().all(|r| !r.succeeded()) {
        return Err(WorkflowError::operation(
            "every alternative evaluation failed",
        ));
    }
    Ok(results)
}

/// Best successful result by budget compliance, ties broken by lower id.
pub fn best_result(results: &[EvaluationResult]) -> Option<&EvaluationResult> {
    results
        .iter()
        .filter(|r| r.succeeded())
        .min_by(|a, b| {
            b.metrics
                .budget_compliance_pct
                .total_cmp(&a.metrics.budget_compliance_pct)
                .then(a.alternative_id.cmp(&b.alternative_id))
        })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::alternatives::generate_alternatives;
    use crate::solver::{MockSolver, SolverOutcome};

    use super::*;

    /// Fails on a fixed set of call indices, delegating the rest to the mock.
    struct FlakySolver {
        calls: AtomicU32,
        fail_on: Vec<u32>,
    }

    impl FlakySolver {
        fn failing_on(fail_on: Vec<u32>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl MealPlanSolver for FlakySolver {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn optimize(
            &self,
            params: &ParameterSet,
            use_preset: bool,
        ) -> WorkflowResult<SolverOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.contains(&call) {
                return Err(WorkflowError::operation("solver unavailable"));
            }
            MockSolver.optimize(params, use_preset).await
        }
    }

    /// Blocks every call until all expected callers have arrived.
    struct RendezvousSolver {
        barrier: tokio::sync::Barrier,
    }

    #[async_trait]
    impl MealPlanSolver for RendezvousSolver {
        fn name(&self) -> &str {
            "rendezvous"
        }

        async fn optimize(
            &self,
            params: &ParameterSet,
            use_preset: bool,
        ) -> WorkflowResult<SolverOutcome> {
            self.barrier.wait().await;
            MockSolver.optimize(params, use_preset).await
        }
    }

    fn fixtures() -> (RequestManager, Vec<Alternative>, ParameterSet) {
        let alternatives =
            generate_alternatives("20일 5370원 900kcal").expect("generation failed");
        (RequestManager::new(), alternatives, ParameterSet::default())
    }

    #[tokio::test]
    async fn evaluates_all_alternatives_successfully() {
        let (manager, alternatives, params) = fixtures();
        let results = evaluate_alternatives(&manager, &MockSolver, &alternatives, &params)
            .await
            .expect("evaluation failed");
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(EvaluationResult::succeeded));
        for result in &results {
            assert_eq!(result.entries.len(), params.days as usize);
            assert!(result.metrics.budget_compliance_pct > 0.0);
            assert!(!result.qualitative.pros.is_empty());
        }
    }

    #[tokio::test]
    async fn solver_calls_run_concurrently() {
        let (manager, alternatives, params) = fixtures();
        let solver = RendezvousSolver {
            barrier: tokio::sync::Barrier::new(alternatives.len()),
        };
        // The barrier only releases once every call is in flight, so a
        // sequential evaluation would hit the timeout.
        let results = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            evaluate_alternatives(&manager, &solver, &alternatives, &params),
        )
        .await
        .expect("solver calls were not in flight together")
        .expect("evaluation failed");
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn partial_failure_still_advances() {
        let (manager, alternatives, params) = fixtures();
        let solver = FlakySolver::failing_on(vec![1]);
        let results = evaluate_alternatives(&manager, &solver, &alternatives, &params)
            .await
            .expect("evaluation failed");
        assert_eq!(results.len(), 3);
        assert!(results[0].succeeded());
        assert!(!results[1].succeeded());
        assert!(results[2].succeeded());
        assert!(results[1]
            .error_detail
            .as_deref()
            .is_some_and(|d| d.contains("solver unavailable")));
        assert!(results[1].entries.is_empty());
    }

    #[tokio::test]
    async fn all_failures_surface_as_operation_error() {
        let (manager, alternatives, params) = fixtures();
        let solver = FlakySolver::failing_on(vec![0, 1, 2]);
        let err = evaluate_alternatives(&manager, &solver, &alternatives, &params)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Operation(_)));
    }

    #[tokio::test]
    async fn best_result_prefers_highest_compliance() {
        let (manager, alternatives, params) = fixtures();
        let results = evaluate_alternatives(&manager, &MockSolver, &alternatives, &params)
            .await
            .expect("evaluation failed");
        let best = best_result(&results).expect("no successful result");
        // Mock output is identical per alternative, so the tie breaks on id.
        assert_eq!(best.alternative_id, 1);
    }

    #[test]
    fn qualitative_notes_cover_every_strategy() {
        for strategy in StrategyType::ALL {
            let notes = qualitative_notes(strategy);
            assert!(!notes.pros.is_empty());
            assert!(!notes.cons.is_empty());
            assert!(!notes.risks.is_empty());
        }
    }
}
