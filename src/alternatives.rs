use std::fmt::{Display, Formatter};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::error::{WorkflowError, WorkflowResult};
use crate::params::{ParameterSet, DEFAULT_BUDGET_WON, DEFAULT_DAYS, DEFAULT_TARGET_KCAL};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    Nutrition,
    Economic,
    Preference,
}

impl StrategyType {
    pub const ALL: [StrategyType; 3] = [
        StrategyType::Nutrition,
        StrategyType::Economic,
        StrategyType::Preference,
    ];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Nutrition => "nutrition",
            Self::Economic => "economic",
            Self::Preference => "preference",
        }
    }
}

impl Display for StrategyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::Nutrition => "Nutrition",
            Self::Economic => "Economic",
            Self::Preference => "Preference",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Error)]
#[error("unknown strategy type: {0}")]
pub struct StrategyParseError(pub String);

impl FromStr for StrategyType {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nutrition" | "nutritional" => Ok(Self::Nutrition),
            "economic" | "economy" | "budget" => Ok(Self::Economic),
            "preference" | "popularity" => Ok(Self::Preference),
            _ => Err(StrategyParseError(s.to_string())),
        }
    }
}

/// A candidate strategy with advisory cost/calorie labels. Immutable once
/// generated; regenerating replaces the full list and clears downstream
/// session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub strategy_type: StrategyType,
    pub estimated_cost: f64,
    pub target_calories: f64,
    pub features: Vec<String>,
    pub highlight: String,
}

/// Numeric signals extracted from the free-text request, with documented
/// defaults applied where the text is silent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestSignals {
    pub days: u32,
    pub budget_won: f64,
    pub target_kcal: f64,
}

impl From<RequestSignals> for ParameterSet {
    fn from(signals: RequestSignals) -> Self {
        ParameterSet {
            days: signals.days,
            budget_won: signals.budget_won,
            target_kcal: signals.target_kcal,
            ..ParameterSet::default()
        }
    }
}

static BUDGET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*원").expect("budget regex"));
static DAYS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*일").expect("days regex"));
static KCAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:kcal|칼로리)").expect("kcal regex"));

/// Extracts budget (`5370원`), day count (`20일`) and calorie target
/// (`900kcal` / `900칼로리`) from a free-text request. Missing signals fall
/// back to `days=20, budget=5370, kcal=900`.
pub fn extract_signals(request: &str) -> WorkflowResult<RequestSignals> {
    let trimmed = request.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::validation("request text is empty"));
    }

    let capture_u32 = |re: &Regex| {
        re.captures(trimmed)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
    };

    let budget_won = capture_u32(&BUDGET_RE)
        .map(f64::from)
        .unwrap_or(DEFAULT_BUDGET_WON);
    let days = capture_u32(&DAYS_RE)
        .filter(|d| (1..=365).contains(d))
        .unwrap_or(DEFAULT_DAYS);
    let target_kcal = capture_u32(&KCAL_RE)
        .map(f64::from)
        .unwrap_or(DEFAULT_TARGET_KCAL);

    Ok(RequestSignals {
        days,
        budget_won,
        target_kcal,
    })
}

/// Produces exactly one alternative per strategy type from the extracted
/// signals. Pure and deterministic: identical input yields identical output.
/// Nutrition scales the advisory labels upward, economic downward, preference
/// stays neutral.
pub fn generate_alternatives(request: &str) -> WorkflowResult<Vec<Alternative>> {
    let signals = extract_signals(request)?;
    info!(
        days = signals.days,
        budget_won = signals.budget_won,
        target_kcal = signals.target_kcal,
        "extracted request signals"
    );

    let alternatives = vec![
        Alternative {
            id: 1,
            title: "Nutrition-first plan".to_string(),
            description: format!(
                "Prioritizes macro and micronutrient balance across {} days, \
                 accepting a modest cost premium over the {:.0} won baseline.",
                signals.days, signals.budget_won
            ),
            strategy_type: StrategyType::Nutrition,
            estimated_cost: signals.budget_won * 1.10,
            target_calories: signals.target_kcal * 1.05,
            features: vec![
                "high-protein mains favored".to_string(),
                "vitamin-rich sides guaranteed daily".to_string(),
                format!("calorie target raised toward {:.0} kcal", signals.target_kcal * 1.05),
            ],
            highlight: "Strongest nutritional coverage".to_string(),
        },
        Alternative {
            id: 2,
            title: "Budget-first plan".to_string(),
            description: format!(
                "Maximizes cost efficiency within the {:.0} won per-day budget \
                 by favoring low-cost menu combinations.",
                signals.budget_won
            ),
            strategy_type: StrategyType::Economic,
            estimated_cost: signals.budget_won * 0.90,
            target_calories: signals.target_kcal * 0.95,
            features: vec![
                "budget-friendly menus prioritized".to_string(),
                "price-stable staples favored".to_string(),
                format!("projected spend {:.0} won per day", signals.budget_won * 0.90),
            ],
            highlight: "Lowest projected cost".to_string(),
        },
        Alternative {
            id: 3,
            title: "Preference-first plan".to_string(),
            description: format!(
                "Selects the historically best-received menus over {} days \
                 while staying near the requested budget.",
                signals.days
            ),
            strategy_type: StrategyType::Preference,
            estimated_cost: signals.budget_won,
            target_calories: signals.target_kcal,
            features: vec![
                "high intake-rate dishes prioritized".to_string(),
                "popular pairings kept together".to_string(),
                "waste reduction through proven menus".to_string(),
            ],
            highlight: "Highest expected satisfaction".to_string(),
        },
    ];

    Ok(alternatives)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_signals_from_korean_request() {
        let signals = extract_signals("예산 5370원으로 20일치 영양가 높은 급식 메뉴를 계획해주세요")
            .expect("extraction failed");
        assert_eq!(signals.days, 20);
        assert_eq!(signals.budget_won, 5370.0);
        assert_eq!(signals.target_kcal, 900.0);
    }

    #[test]
    fn applies_defaults_when_signals_absent() {
        let signals = extract_signals("아무거나 맛있게 해주세요").expect("extraction failed");
        assert_eq!(signals.days, DEFAULT_DAYS);
        assert_eq!(signals.budget_won, DEFAULT_BUDGET_WON);
        assert_eq!(signals.target_kcal, DEFAULT_TARGET_KCAL);
    }

    #[test]
    fn empty_request_is_a_validation_error() {
        assert!(matches!(
            generate_alternatives("   "),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn produces_exactly_three_with_full_strategy_coverage() {
        let alternatives =
            generate_alternatives("예산 6000원으로 15일 900kcal").expect("generation failed");
        assert_eq!(alternatives.len(), 3);
        let mut types: Vec<_> = alternatives.iter().map(|a| a.strategy_type).collect();
        types.sort();
        assert_eq!(types, StrategyType::ALL.to_vec());
    }

    #[test]
    fn generation_is_deterministic() {
        let request = "예산 5370원으로 20일치 계획";
        let a = generate_alternatives(request).expect("first run failed");
        let b = generate_alternatives(request).expect("second run failed");
        assert_eq!(a, b);
    }

    #[test]
    fn strategy_scaling_directions_hold() {
        let alternatives = generate_alternatives("예산 5000원 10일").expect("generation failed");
        let by_type = |t: StrategyType| {
            alternatives
                .iter()
                .find(|a| a.strategy_type == t)
                .expect("missing strategy")
        };
        let nutrition = by_type(StrategyType::Nutrition);
        let economic = by_type(StrategyType::Economic);
        let preference = by_type(StrategyType::Preference);

        assert!(nutrition.estimated_cost > preference.estimated_cost);
        assert!(economic.estimated_cost < preference.estimated_cost);
        assert_eq!(preference.estimated_cost, 5000.0);
    }
}
