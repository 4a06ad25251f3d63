use serde::{Deserialize, Serialize};

use crate::error::{WorkflowError, WorkflowResult};

pub const DEFAULT_DAYS: u32 = 20;
pub const DEFAULT_BUDGET_WON: f64 = 5370.0;
pub const DEFAULT_TARGET_KCAL: f64 = 900.0;
pub const MAX_DAYS: u32 = 365;

/// Shared optimization parameters. These drive every solver call; the
/// per-alternative cost/calorie labels are advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub days: u32,
    pub budget_won: f64,
    pub target_kcal: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macro_ratios: Option<MacroRatios>,
    #[serde(default)]
    pub micro_targets: MicroTargets,
}

/// Calorie-share ratios in integer percent. Must sum to exactly 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroRatios {
    pub carb_pct: u32,
    pub protein_pct: u32,
    pub fat_pct: u32,
}

impl MacroRatios {
    pub fn sum(&self) -> u32 {
        self.carb_pct + self.protein_pct + self.fat_pct
    }
}

/// Optional micro-nutrient targets. Unset fields are left to the solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct MicroTargets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vitamin_c_mg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calcium_mg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iron_mg: Option<f64>,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            days: DEFAULT_DAYS,
            budget_won: DEFAULT_BUDGET_WON,
            target_kcal: DEFAULT_TARGET_KCAL,
            macro_ratios: None,
            micro_targets: MicroTargets::default(),
        }
    }
}

impl ParameterSet {
    /// Validates bounds before any solver submission. The macro-ratio gate is
    /// exact: 100 passes, 99 or 101 is rejected.
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.days == 0 || self.days > MAX_DAYS {
            return Err(WorkflowError::validation(format!(
                "days must be within 1..={MAX_DAYS}, got {}",
                self.days
            )));
        }
        if !(self.budget_won > 0.0) {
            return Err(WorkflowError::validation(format!(
                "budget must be positive, got {}",
                self.budget_won
            )));
        }
        if !(self.target_kcal > 0.0) {
            return Err(WorkflowError::validation(format!(
                "target kcal must be positive, got {}",
                self.target_kcal
            )));
        }
        if let Some(ratios) = &self.macro_ratios {
            let sum = ratios.sum();
            if sum != 100 {
                return Err(WorkflowError::validation(format!(
                    "macro ratios must sum to 100%, got {sum}%"
                )));
            }
        }
        Ok(())
    }

    /// Stable fingerprint used to scope the evaluation cache: any change to
    /// the parameters invalidates cached results.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        assert!(ParameterSet::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_days() {
        let mut params = ParameterSet::default();
        params.days = 0;
        assert!(matches!(
            params.validate(),
            Err(WorkflowError::Validation(_))
        ));
        params.days = 366;
        assert!(params.validate().is_err());
        params.days = 365;
        assert!(params.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_budget_and_kcal() {
        let mut params = ParameterSet::default();
        params.budget_won = 0.0;
        assert!(params.validate().is_err());
        params.budget_won = 5370.0;
        params.target_kcal = -1.0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn macro_ratio_gate_is_exact() {
        let mut params = ParameterSet::default();
        params.macro_ratios = Some(MacroRatios {
            carb_pct: 60,
            protein_pct: 15,
            fat_pct: 26,
        });
        assert!(matches!(
            params.validate(),
            Err(WorkflowError::Validation(_))
        ));

        params.macro_ratios = Some(MacroRatios {
            carb_pct: 60,
            protein_pct: 15,
            fat_pct: 25,
        });
        assert!(params.validate().is_ok());
    }

    #[test]
    fn fingerprint_tracks_parameter_changes() {
        let params = ParameterSet::default();
        let mut changed = params.clone();
        assert_eq!(params.fingerprint(), changed.fingerprint());
        changed.budget_won = 6000.0;
        assert_ne!(params.fingerprint(), changed.fingerprint());
    }
}
