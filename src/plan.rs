use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{WorkflowError, WorkflowResult};

pub const DEFAULT_PAGE_SIZE: usize = 25;

/// One day of a computed plan as returned by the solver. The orchestration
/// layer filters and aggregates these entries but never rewrites them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlanEntry {
    pub day: u32,
    pub rice: String,
    pub soup: String,
    pub side1: String,
    pub side2: String,
    pub side3: String,
    pub snack: String,
    pub day_kcal: f64,
    pub day_cost: f64,
    pub carb_pct_cal: f64,
    pub prot_pct_cal: f64,
    pub fat_pct_cal: f64,
}

impl DayPlanEntry {
    /// Daily macro shares inside the commonly recommended bands
    /// (carb 55-65%, protein 7-20%, fat 15-30%).
    pub fn is_nutritionally_balanced(&self) -> bool {
        (55.0..=65.0).contains(&self.carb_pct_cal)
            && (7.0..=20.0).contains(&self.prot_pct_cal)
            && (15.0..=30.0).contains(&self.fat_pct_cal)
    }
}

/// Parses the solver's `plan` array, keeping only rows with a numeric `day`.
/// Summary/footer rows (the solver appends a totals row with a text `day`)
/// are dropped here so they never reach business logic. A row that has a
/// numeric day but an otherwise malformed shape is a collaborator bug and
/// becomes an `Operation` error at this boundary.
pub fn parse_plan_entries(raw: &[Value]) -> WorkflowResult<Vec<DayPlanEntry>> {
    let mut entries = Vec::with_capacity(raw.len());
    for row in raw {
        let Some(object) = row.as_object() else {
            return Err(WorkflowError::operation(
                "solver returned a non-object plan row",
            ));
        };
        let Some(day) = object.get("day").and_then(Value::as_u64) else {
            // Footer rows carry "합계" or similar in the day column.
            continue;
        };
        if day == 0 {
            return Err(WorkflowError::operation("solver returned day 0 in plan"));
        }
        let entry: DayPlanEntry = serde_json::from_value(row.clone()).map_err(|e| {
            WorkflowError::operation(format!("malformed plan row for day {day}: {e}"))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

pub fn total_cost(entries: &[DayPlanEntry]) -> f64 {
    entries.iter().map(|e| e.day_cost).sum()
}

pub fn avg_calories(entries: &[DayPlanEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    entries.iter().map(|e| e.day_kcal).sum::<f64>() / entries.len() as f64
}

/// Budget compliance: target per-day budget over realized per-day cost, as a
/// percentage rounded to one decimal. Defined as 0.0 for an empty plan.
pub fn budget_compliance_pct(entries: &[DayPlanEntry], budget_won: f64) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    let per_day_avg_cost = total_cost(entries) / entries.len() as f64;
    if per_day_avg_cost <= 0.0 {
        return 0.0;
    }
    let pct = (budget_won / per_day_avg_cost) * 100.0;
    (pct * 10.0).round() / 10.0
}

/// Stateless pagination: returns the slice for `page_index`, clamping the
/// index into the valid page range. Identical inputs always yield identical
/// output.
pub fn page(entries: &[DayPlanEntry], page_size: usize, page_index: usize) -> &[DayPlanEntry] {
    if entries.is_empty() || page_size == 0 {
        return &[];
    }
    let page_count = entries.len().div_ceil(page_size);
    let index = page_index.min(page_count - 1);
    let start = index * page_size;
    let end = (start + page_size).min(entries.len());
    &entries[start..end]
}

pub fn page_count(len: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    len.div_ceil(page_size)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entry(day: u32) -> DayPlanEntry {
        DayPlanEntry {
            day,
            rice: "Rice".into(),
            soup: "Kimchi Soup".into(),
            side1: "Bulgogi".into(),
            side2: "Steamed Egg".into(),
            side3: "Kimchi".into(),
            snack: "Apple".into(),
            day_kcal: 900.0,
            day_cost: 5000.0,
            carb_pct_cal: 60.0,
            prot_pct_cal: 15.0,
            fat_pct_cal: 25.0,
        }
    }

    #[test]
    fn drops_footer_rows_without_numeric_day() {
        let raw = vec![
            json!({
                "day": 1, "rice": "Rice", "soup": "Beef Soup", "side1": "a",
                "side2": "b", "side3": "c", "snack": "Apple",
                "day_kcal": 880.0, "day_cost": 5100.0,
                "carb_pct_cal": 61.0, "prot_pct_cal": 14.0, "fat_pct_cal": 25.0
            }),
            json!({ "day": "합계", "day_cost": 5100.0 }),
        ];
        let entries = parse_plan_entries(&raw).expect("parse failed");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].day, 1);
    }

    #[test]
    fn malformed_numeric_row_is_an_operation_error() {
        let raw = vec![json!({ "day": 3, "rice": "Rice" })];
        assert!(matches!(
            parse_plan_entries(&raw),
            Err(WorkflowError::Operation(_))
        ));
    }

    #[test]
    fn compliance_is_zero_for_empty_plan() {
        assert_eq!(budget_compliance_pct(&[], 5370.0), 0.0);
    }

    #[test]
    fn compliance_rounds_to_one_decimal() {
        let entries = vec![entry(1), entry(2), entry(3)];
        // 5370 / 5000 * 100 = 107.4
        assert_eq!(budget_compliance_pct(&entries, 5370.0), 107.4);
    }

    #[test]
    fn pagination_is_idempotent_and_clamped() {
        let entries: Vec<_> = (1..=60).map(entry).collect();
        let first = page(&entries, 25, 0);
        assert_eq!(first.len(), 25);
        assert_eq!(first[0].day, 1);
        assert_eq!(page(&entries, 25, 0), first);

        let last = page(&entries, 25, 2);
        assert_eq!(last.len(), 10);
        assert_eq!(last[0].day, 51);

        // Out-of-range index clamps to the last page.
        assert_eq!(page(&entries, 25, 99), last);
        assert_eq!(page_count(entries.len(), 25), 3);
    }

    #[test]
    fn balance_bands_match_recommended_ranges() {
        let mut e = entry(1);
        assert!(e.is_nutritionally_balanced());
        e.fat_pct_cal = 35.0;
        assert!(!e.is_nutritionally_balanced());
    }
}
