//! Workflow session and step state machine.
//!
//! The session object is the only shared mutable state in the workflow. It
//! is written exclusively by the transition methods here; every guarded
//! transition either advances the step or leaves the session exactly on its
//! originating step with `error` set.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alternatives::{self, Alternative};
use crate::error::{WorkflowError, WorkflowResult};
use crate::evaluator::{self, EvaluationResult};
use crate::lifecycle::RequestManager;
use crate::nl;
use crate::params::ParameterSet;
use crate::plan::DayPlanEntry;
use crate::solver::MealPlanSolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Input,
    Alternatives,
    Comparison,
    Result,
}

impl WorkflowStep {
    pub fn number(&self) -> u8 {
        match self {
            WorkflowStep::Input => 1,
            WorkflowStep::Alternatives => 2,
            WorkflowStep::Comparison => 3,
            WorkflowStep::Result => 4,
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkflowStep::Input => "input",
            WorkflowStep::Alternatives => "alternatives",
            WorkflowStep::Comparison => "comparison",
            WorkflowStep::Result => "result",
        };
        f.write_str(label)
    }
}

pub struct WorkflowSession {
    step: WorkflowStep,
    user_request: String,
    params: ParameterSet,
    alternatives: Vec<Alternative>,
    selected_alternative_id: Option<u32>,
    evaluation_results: Vec<EvaluationResult>,
    evaluated_fingerprint: Option<String>,
    final_plan: Option<Vec<DayPlanEntry>>,
    error: Option<String>,
    manager: RequestManager,
    solver: Arc<dyn MealPlanSolver>,
}

impl WorkflowSession {
    pub fn new(solver: Arc<dyn MealPlanSolver>) -> Self {
        Self {
            step: WorkflowStep::Input,
            user_request: String::new(),
            params: ParameterSet::default(),
            alternatives: Vec::new(),
            selected_alternative_id: None,
            evaluation_results: Vec::new(),
            evaluated_fingerprint: None,
            final_plan: None,
            error: None,
            manager: RequestManager::new(),
            solver,
        }
    }

    pub fn step(&self) -> WorkflowStep {
        self.step
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn alternatives(&self) -> &[Alternative] {
        &self.alternatives
    }

    pub fn selected_alternative_id(&self) -> Option<u32> {
        self.selected_alternative_id
    }

    pub fn evaluation_results(&self) -> &[EvaluationResult] {
        &self.evaluation_results
    }

    pub fn final_plan(&self) -> Option<&[DayPlanEntry]> {
        self.final_plan.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Generates alternatives from the free-text request and advances to the
    /// alternatives step. Regeneration replaces the whole list and clears
    /// every downstream field.
    pub fn submit_request(&mut self, request: &str) -> WorkflowResult<&[Alternative]> {
        let generated = match alternatives::generate_alternatives(request) {
            Ok(generated) => generated,
            Err(err) => return Err(self.fail(err)),
        };
        let signals = alternatives::extract_signals(request)?;

        self.user_request = request.trim().to_string();
        self.params = signals.into();
        self.alternatives = generated;
        self.clear_downstream();
        self.error = None;
        self.step = WorkflowStep::Alternatives;
        info!(step = %self.step, count = self.alternatives.len(), "alternatives generated");
        Ok(&self.alternatives)
    }

    /// Marks an alternative as highlighted. Does not advance the step.
    pub fn select_alternative(&mut self, id: u32) -> WorkflowResult<()> {
        if !self.alternatives.iter().any(|a| a.id == id) {
            return Err(self.fail(WorkflowError::validation(format!(
                "no alternative with id {id}"
            ))));
        }
        self.selected_alternative_id = Some(id);
        Ok(())
    }

    /// Replaces the shared parameters wholesale after validation.
    pub fn set_params(&mut self, params: ParameterSet) -> WorkflowResult<()> {
        if let Err(err) = params.validate() {
            return Err(self.fail(err));
        }
        self.params = params;
        self.error = None;
        Ok(())
    }

    /// Applies a natural-language edit to the shared parameters. Valid on
    /// any step; a parameter change invalidates cached evaluation results.
    pub fn edit_params(&mut self, instruction: &str) -> WorkflowResult<Vec<String>> {
        let (updated, changes) = match nl::apply_instruction(instruction, &self.params) {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.fail(err)),
        };
        if !changes.is_empty() {
            info!(changes = changes.len(), "parameters updated");
        }
        self.params = updated;
        self.error = None;
        Ok(changes)
    }

    /// Runs the evaluator over the full alternative set and advances to the
    /// comparison step. Results are cached per parameter fingerprint, so
    /// re-entering comparison without a parameter change issues no solver
    /// calls.
    pub async fn evaluate(&mut self) -> WorkflowResult<&[EvaluationResult]> {
        if self.alternatives.is_empty() {
            return Err(self.fail(WorkflowError::validation(
                "no alternatives to evaluate, submit a request first",
            )));
        }

        let fingerprint = self.params.fingerprint();
        if self.evaluated_fingerprint.as_deref() == Some(fingerprint.as_str())
            && !self.evaluation_results.is_empty()
        {
            self.step = WorkflowStep::Comparison;
            return Ok(&self.evaluation_results);
        }

        let outcome = evaluator::evaluate_alternatives(
            &self.manager,
            self.solver.as_ref(),
            &self.alternatives,
            &self.params,
        )
        .await;
        match outcome {
            Ok(results) => {
                self.evaluation_results = results;
                self.evaluated_fingerprint = Some(fingerprint);
                self.final_plan = None;
                self.error = None;
                self.step = WorkflowStep::Comparison;
                Ok(&self.evaluation_results)
            }
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Copies the selected successful result's plan into `final_plan` and
    /// advances to the result step.
    pub fn finalize(&mut self) -> WorkflowResult<&[DayPlanEntry]> {
        let Some(id) = self.selected_alternative_id else {
            return Err(self.fail(WorkflowError::validation(
                "no alternative selected",
            )));
        };
        let result = self
            .evaluation_results
            .iter()
            .find(|r| r.alternative_id == id);
        match result {
            Some(result) if result.succeeded() => {
                self.final_plan = Some(result.entries.clone());
                self.error = None;
                self.step = WorkflowStep::Result;
                Ok(self.final_plan.as_deref().unwrap_or_default())
            }
            Some(result) => Err(self.fail(WorkflowError::validation(format!(
                "alternative {id} failed evaluation: {}",
                result.error_detail.as_deref().unwrap_or("unknown error")
            )))),
            None => Err(self.fail(WorkflowError::validation(format!(
                "alternative {id} has not been evaluated"
            )))),
        }
    }

    /// Returns to the input step and clears everything, cancelling any
    /// outstanding requests.
    pub fn reset(&mut self) {
        self.manager.shutdown();
        self.step = WorkflowStep::Input;
        self.user_request.clear();
        self.params = ParameterSet::default();
        self.alternatives.clear();
        self.clear_downstream();
        self.error = None;
    }

    fn clear_downstream(&mut self) {
        self.selected_alternative_id = None;
        self.evaluation_results.clear();
        self.evaluated_fingerprint = None;
        self.final_plan = None;
    }

    fn fail(&mut self, err: WorkflowError) -> WorkflowError {
        self.error = Some(err.to_string());
        err
    }
}

impl Drop for WorkflowSession {
    fn drop(&mut self) {
        self.manager.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::solver::{MockSolver, SolverOutcome};

    use super::*;

    struct CountingSolver {
        calls: AtomicU32,
    }

    impl CountingSolver {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl MealPlanSolver for CountingSolver {
        fn name(&self) -> &str {
            "counting"
        }

        async fn optimize(
            &self,
            params: &ParameterSet,
            use_preset: bool,
        ) -> WorkflowResult<SolverOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            MockSolver.optimize(params, use_preset).await
        }
    }

    fn session() -> WorkflowSession {
        WorkflowSession::new(Arc::new(MockSolver))
    }

    #[tokio::test]
    async fn full_workflow_reaches_result() {
        let mut session = session();
        let alts = session
            .submit_request("예산 5370원으로 20일치 영양가 높은 급식 메뉴를 계획해주세요")
            .expect("request failed");
        assert_eq!(alts.len(), 3);
        assert_eq!(session.step(), WorkflowStep::Alternatives);
        assert_eq!(session.params().days, 20);
        assert_eq!(session.params().budget_won, 5370.0);

        session.select_alternative(1).expect("selection failed");
        let results = session.evaluate().await.expect("evaluation failed");
        assert_eq!(results.len(), 3);
        assert_eq!(session.step(), WorkflowStep::Comparison);

        let plan = session.finalize().expect("finalize failed");
        assert_eq!(plan.len(), 20);
        assert_eq!(session.step(), WorkflowStep::Result);
        assert!(session.error().is_none());
    }

    #[tokio::test]
    async fn empty_request_stays_on_input_with_error() {
        let mut session = session();
        let err = session.submit_request("   ").unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(session.step(), WorkflowStep::Input);
        assert!(session.error().is_some());
    }

    #[tokio::test]
    async fn evaluate_without_alternatives_is_rejected() {
        let mut session = session();
        let err = session.evaluate().await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(session.step(), WorkflowStep::Input);
    }

    #[tokio::test]
    async fn selecting_unknown_alternative_is_rejected() {
        let mut session = session();
        session.submit_request("한달 급식").expect("request failed");
        let err = session.select_alternative(9).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert!(session.selected_alternative_id().is_none());
    }

    #[tokio::test]
    async fn finalize_requires_successful_selected_result() {
        let mut session = session();
        session.submit_request("20일 급식").expect("request failed");
        session.select_alternative(2).expect("selection failed");
        // Not yet evaluated.
        let err = session.finalize().unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(session.step(), WorkflowStep::Alternatives);
    }

    #[tokio::test]
    async fn evaluation_results_are_cached_per_parameter_fingerprint() {
        let solver = Arc::new(CountingSolver::new());
        let mut session = WorkflowSession::new(solver.clone());
        session.submit_request("20일 급식").expect("request failed");

        session.evaluate().await.expect("evaluation failed");
        assert_eq!(solver.calls.load(Ordering::SeqCst), 3);

        // Same parameters: cached results, no new solver calls.
        session.evaluate().await.expect("evaluation failed");
        assert_eq!(solver.calls.load(Ordering::SeqCst), 3);

        // A parameter edit invalidates the cache.
        let changes = session
            .edit_params("예산을 6000원으로 설정")
            .expect("edit failed");
        assert!(!changes.is_empty());
        session.evaluate().await.expect("evaluation failed");
        assert_eq!(solver.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn regeneration_clears_downstream_state() {
        let mut session = session();
        session.submit_request("20일 급식").expect("request failed");
        session.select_alternative(1).expect("selection failed");
        session.evaluate().await.expect("evaluation failed");

        session
            .submit_request("10일 6000원 급식")
            .expect("request failed");
        assert_eq!(session.step(), WorkflowStep::Alternatives);
        assert!(session.selected_alternative_id().is_none());
        assert!(session.evaluation_results().is_empty());
        assert!(session.final_plan().is_none());
        assert_eq!(session.params().days, 10);
    }

    #[tokio::test]
    async fn reset_returns_to_input_from_any_step() {
        let mut session = session();
        session.submit_request("20일 급식").expect("request failed");
        session.select_alternative(1).expect("selection failed");
        session.evaluate().await.expect("evaluation failed");
        session.finalize().expect("finalize failed");
        assert_eq!(session.step(), WorkflowStep::Result);

        session.reset();
        assert_eq!(session.step(), WorkflowStep::Input);
        assert!(session.alternatives().is_empty());
        assert!(session.final_plan().is_none());
        assert_eq!(session.params(), &ParameterSet::default());
    }
}
