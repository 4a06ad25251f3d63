//! Natural-language parameter editing.
//!
//! A pure instruction parser: given free text and the current parameters it
//! returns a new parameter set where only explicitly mentioned fields change,
//! plus human-readable change descriptions. Unrecognized phrasing is not an
//! error; it simply changes nothing.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{WorkflowError, WorkflowResult};
use crate::params::{MacroRatios, ParameterSet};

const BUDGET_KEYWORDS: &[&str] = &["예산", "가격", "비용", "돈", "원", "budget", "price", "cost"];
const DAYS_KEYWORDS: &[&str] = &["일", "기간", "날", "day"];
const KCAL_KEYWORDS: &[&str] = &["칼로리", "kcal", "열량", "calorie"];
const INCREASE_KEYWORDS: &[&str] = &["올려", "올리", "높여", "늘려", "증가", "raise", "increase"];
const DECREASE_KEYWORDS: &[&str] = &["내려", "낮춰", "줄여", "감소", "lower", "reduce"];

static WON_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*원").expect("won regex"));
static DAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*일").expect("day regex"));
static KCAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:kcal|칼로리)").expect("kcal regex"));
// Unitless numbers only bind when they sit right after their intent's
// keyword; a bare number elsewhere in the sentence belongs to another
// intent.
static KCAL_NEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:칼로리|kcal|열량|calorie)\s*(?:를|을)?\s*(\d+)").expect("kcal near regex")
});
static BUDGET_NEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:예산|가격|비용|budget|price|cost)\s*(?:을|를|은|는|이|가)?\s*(\d+)")
        .expect("budget near regex")
});
static PROTEIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:단백질|protein)\D*?(\d+)").expect("protein regex"));
static VITAMIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:비타민\s*c?|vitamin\s*c?)\D*?(\d+)").expect("vitamin regex"));
static CALCIUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:칼슘|calcium)\D*?(\d+)").expect("calcium regex"));
static IRON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:철분|iron)\D*?(\d+)").expect("iron regex"));
static CARB_PCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:탄수화물|carb)\D*?(\d+)\s*%").expect("carb pct regex"));
static PROTEIN_PCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:단백질|protein)\D*?(\d+)\s*%").expect("protein pct regex"));
static FAT_PCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:지방|fat)\D*?(\d+)\s*%").expect("fat pct regex"));

/// Applies one free-text instruction to `params`. Only empty input is an
/// error; anything else falls through to "no recognized change".
pub fn apply_instruction(
    instruction: &str,
    params: &ParameterSet,
) -> WorkflowResult<(ParameterSet, Vec<String>)> {
    let trimmed = instruction.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::validation("instruction text is empty"));
    }
    let text = trimmed.to_lowercase();

    let mut updated = params.clone();
    let mut changes = Vec::new();

    apply_budget(&text, &mut updated, &mut changes);
    apply_days(&text, &mut updated, &mut changes);
    apply_calories(&text, &mut updated, &mut changes);
    apply_micro_targets(&text, &mut updated, &mut changes);
    apply_macro_ratios(&text, &mut updated, &mut changes);

    Ok((updated, changes))
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

fn anchored_number(text: &str, re: &Regex) -> Option<f64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn apply_budget(text: &str, params: &mut ParameterSet, changes: &mut Vec<String>) {
    if !contains_any(text, BUDGET_KEYWORDS) {
        return;
    }
    let Some(amount) =
        anchored_number(text, &WON_RE).or_else(|| anchored_number(text, &BUDGET_NEAR_RE))
    else {
        return;
    };

    let old = params.budget_won;
    let has_set_marker = contains_any(text, &["으로", "설정", "맞춰", " to "]);
    // "6000원으로" names the new budget; "500원 올려줘" moves it by the
    // amount. Absolute edits must name a plausible budget, so tiny numbers
    // are ignored rather than misread as a per-day total.
    let new = if amount > 1000.0 && has_set_marker {
        amount
    } else if contains_any(text, INCREASE_KEYWORDS) && amount < old {
        old + amount
    } else if contains_any(text, DECREASE_KEYWORDS) && amount < old {
        (old - amount).max(1.0)
    } else if amount > 1000.0 {
        amount
    } else {
        return;
    };

    if new != old {
        params.budget_won = new;
        changes.push(format!("budget: {old:.0} won -> {new:.0} won"));
    }
}

fn apply_days(text: &str, params: &mut ParameterSet, changes: &mut Vec<String>) {
    if !contains_any(text, DAYS_KEYWORDS) {
        return;
    }
    let Some(value) = anchored_number(text, &DAY_RE) else {
        return;
    };
    let days = value as u32;
    if (1..=365).contains(&days) && days != params.days {
        let old = params.days;
        params.days = days;
        changes.push(format!("days: {old} -> {days}"));
    }
}

fn apply_calories(text: &str, params: &mut ParameterSet, changes: &mut Vec<String>) {
    if !contains_any(text, KCAL_KEYWORDS) {
        return;
    }
    let Some(value) =
        anchored_number(text, &KCAL_RE).or_else(|| anchored_number(text, &KCAL_NEAR_RE))
    else {
        return;
    };
    if (500.0..=2000.0).contains(&value) && value != params.target_kcal {
        let old = params.target_kcal;
        params.target_kcal = value;
        changes.push(format!("target calories: {old:.0} -> {value:.0} kcal"));
    }
}

fn apply_micro_targets(text: &str, params: &mut ParameterSet, changes: &mut Vec<String>) {
    // "단백질 20%" is a ratio edit, not a gram target.
    if !PROTEIN_PCT_RE.is_match(text) {
        if let Some(value) = anchored_number(text, &PROTEIN_RE) {
            if (10.0..=50.0).contains(&value) {
                params.micro_targets.protein_g = Some(value);
                changes.push(format!("protein target: {value:.0} g"));
            }
        }
    }
    if let Some(value) = anchored_number(text, &VITAMIN_RE) {
        if (20.0..=200.0).contains(&value) {
            params.micro_targets.vitamin_c_mg = Some(value);
            changes.push(format!("vitamin C target: {value:.0} mg"));
        }
    }
    if let Some(value) = anchored_number(text, &CALCIUM_RE) {
        if (100.0..=1000.0).contains(&value) {
            params.micro_targets.calcium_mg = Some(value);
            changes.push(format!("calcium target: {value:.0} mg"));
        }
    }
    if let Some(value) = anchored_number(text, &IRON_RE) {
        if (3.0..=20.0).contains(&value) {
            params.micro_targets.iron_mg = Some(value);
            changes.push(format!("iron target: {value:.0} mg"));
        }
    }
}

fn apply_macro_ratios(text: &str, params: &mut ParameterSet, changes: &mut Vec<String>) {
    if !text.contains('%') {
        return;
    }
    let mut ratios = params.macro_ratios.unwrap_or(MacroRatios {
        carb_pct: 60,
        protein_pct: 15,
        fat_pct: 25,
    });
    let mut touched = false;

    if let Some(value) = anchored_number(text, &CARB_PCT_RE) {
        let pct = value as u32;
        if (40..=80).contains(&pct) {
            ratios.carb_pct = pct;
            changes.push(format!("carb ratio: {pct}%"));
            touched = true;
        }
    }
    if let Some(value) = anchored_number(text, &PROTEIN_PCT_RE) {
        let pct = value as u32;
        if (5..=30).contains(&pct) {
            ratios.protein_pct = pct;
            changes.push(format!("protein ratio: {pct}%"));
            touched = true;
        }
    }
    if let Some(value) = anchored_number(text, &FAT_PCT_RE) {
        let pct = value as u32;
        if (10..=40).contains(&pct) {
            ratios.fat_pct = pct;
            changes.push(format!("fat ratio: {pct}%"));
            touched = true;
        }
    }

    if touched {
        params.macro_ratios = Some(ratios);
    }
}
