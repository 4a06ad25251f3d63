use anyhow::Result;

use crate::evaluator::EvaluationResult;
use crate::plan::DayPlanEntry;

pub fn plan_to_csv(entries: &[DayPlanEntry]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "day", "rice", "soup", "side1", "side2", "side3", "snack", "kcal", "cost", "carb_pct",
        "protein_pct", "fat_pct",
    ])?;
    for entry in entries {
        writer.write_record([
            entry.day.to_string(),
            entry.rice.clone(),
            entry.soup.clone(),
            entry.side1.clone(),
            entry.side2.clone(),
            entry.side3.clone(),
            entry.snack.clone(),
            format!("{:.0}", entry.day_kcal),
            format!("{:.0}", entry.day_cost),
            format!("{:.1}", entry.carb_pct_cal),
            format!("{:.1}", entry.prot_pct_cal),
            format!("{:.1}", entry.fat_pct_cal),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn comparison_to_csv(results: &[EvaluationResult]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "alternative_id",
        "strategy",
        "status",
        "total_cost",
        "avg_kcal",
        "budget_compliance_pct",
        "error",
    ])?;
    for result in results {
        writer.write_record([
            result.alternative_id.to_string(),
            result.strategy_type.to_string(),
            if result.succeeded() {
                "success".to_string()
            } else {
                "failed".to_string()
            },
            format!("{:.2}", result.metrics.total_cost),
            format!("{:.1}", result.metrics.avg_calories),
            format!("{:.1}", result.metrics.budget_compliance_pct),
            result.error_detail.clone().unwrap_or_default(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
