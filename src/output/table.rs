use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::alternatives::Alternative;
use crate::evaluator::EvaluationResult;
use crate::plan::{self, DayPlanEntry};

pub fn render_alternatives_table(alternatives: &[Alternative]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Id",
        "Strategy",
        "Title",
        "Est. Cost (won)",
        "Target Kcal",
        "Highlight",
    ]);

    for alt in alternatives {
        table.add_row(vec![
            alt.id.to_string(),
            alt.strategy_type.to_string(),
            alt.title.clone(),
            format!("{:.0}", alt.estimated_cost),
            format!("{:.0}", alt.target_calories),
            alt.highlight.clone(),
        ]);
    }
    table.to_string()
}

pub fn render_comparison_table(results: &[EvaluationResult]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Id",
        "Strategy",
        "Status",
        "Total Cost (won)",
        "Avg Kcal",
        "Budget Compliance",
        "Detail",
    ]);

    for r in results {
        let status_cell = if r.succeeded() {
            Cell::new("SUCCESS").fg(Color::Green)
        } else {
            Cell::new("FAILED").fg(Color::Red)
        };
        let detail = if r.succeeded() {
            r.qualitative
                .pros
                .first()
                .cloned()
                .unwrap_or_default()
        } else {
            r.error_detail.clone().unwrap_or_default()
        };
        table.add_row(Row::from(vec![
            Cell::new(r.alternative_id.to_string()),
            Cell::new(r.strategy_type.to_string()),
            status_cell,
            Cell::new(format!("{:.0}", r.metrics.total_cost)),
            Cell::new(format!("{:.0}", r.metrics.avg_calories)),
            Cell::new(format!("{:.1}%", r.metrics.budget_compliance_pct)),
            Cell::new(detail),
        ]));
    }
    table.to_string()
}

pub fn render_plan_table(entries: &[DayPlanEntry], page_size: usize, page_index: usize) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Day", "Rice", "Soup", "Side 1", "Side 2", "Side 3", "Snack", "Kcal", "Cost", "Balance",
    ]);

    for e in plan::page(entries, page_size, page_index) {
        let balance = if e.is_nutritionally_balanced() {
            Cell::new("OK").fg(Color::Green)
        } else {
            Cell::new("CHECK").fg(Color::Yellow)
        };
        table.add_row(Row::from(vec![
            Cell::new(e.day.to_string()),
            Cell::new(&e.rice),
            Cell::new(&e.soup),
            Cell::new(&e.side1),
            Cell::new(&e.side2),
            Cell::new(&e.side3),
            Cell::new(&e.snack),
            Cell::new(format!("{:.0}", e.day_kcal)),
            Cell::new(format!("{:.0}", e.day_cost)),
            balance,
        ]));
    }

    let pages = plan::page_count(entries.len(), page_size);
    let index = if pages == 0 { 0 } else { page_index.min(pages - 1) };
    format!("{table}\nPage {}/{}", index + 1, pages.max(1))
}

pub fn render_changes_list(changes: &[String]) -> String {
    if changes.is_empty() {
        return "No recognized changes.".to_string();
    }
    changes
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use crate::alternatives::generate_alternatives;

    use super::*;

    #[test]
    fn alternatives_table_lists_every_row() {
        let alternatives = generate_alternatives("20일 급식").expect("generation failed");
        let rendered = render_alternatives_table(&alternatives);
        for alt in &alternatives {
            assert!(rendered.contains(&alt.title));
        }
    }

    #[test]
    fn plan_table_reports_page_position() {
        let entries: Vec<DayPlanEntry> = (1..=30)
            .map(|day| DayPlanEntry {
                day,
                rice: "Rice".to_string(),
                soup: "Seaweed soup".to_string(),
                side1: "Bulgogi".to_string(),
                side2: "Braised tofu".to_string(),
                side3: "Seasoned spinach".to_string(),
                snack: "Apple".to_string(),
                day_kcal: 900.0,
                day_cost: 5300.0,
                carb_pct_cal: 60.0,
                prot_pct_cal: 15.0,
                fat_pct_cal: 25.0,
            })
            .collect();
        let rendered = render_plan_table(&entries, 25, 1);
        assert!(rendered.ends_with("Page 2/2"));
        assert!(rendered.contains("26"));
    }

    #[test]
    fn empty_change_list_has_a_message() {
        assert_eq!(render_changes_list(&[]), "No recognized changes.");
        let rendered = render_changes_list(&["budget set to 6000".to_string()]);
        assert!(rendered.starts_with("- "));
    }
}
