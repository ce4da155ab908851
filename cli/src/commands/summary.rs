use anyhow::Result;
use chrono::{Duration, Local};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nosh_core::db::Database;
use nosh_core::models::Nutrient;

use super::helpers::{exit_not_found, no_neg_zero, parse_date, print_json, print_meal_table};

pub(crate) fn cmd_summary(db: &Database, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let summary = db.get_daily_summary(date)?;

    if json {
        return print_json(&summary);
    }

    if summary.meal_count == 0 {
        exit_not_found(&format!("No meals logged for {date}"), false);
    }

    let meals = db.get_meals_by_date(date)?;
    println!("=== {date} ({} meals) ===\n", summary.meal_count);
    print_meal_table(&meals);
    println!();

    for nutrient in Nutrient::ALL {
        let value = no_neg_zero(summary.totals.get(nutrient));
        let range = nutrient.target_range();
        let unit = if nutrient == Nutrient::Calories { "kcal" } else { "g" };
        let status = if value < range.min {
            "low"
        } else if value > range.max {
            "high"
        } else {
            "ok"
        };
        println!(
            "  {:<9} {value:>7.0} {unit:<4} (target {:.0}-{:.0}) {status}",
            nutrient.as_str(),
            range.min,
            range.max,
        );
    }

    Ok(())
}

pub(crate) fn cmd_weekly(db: &Database, days: u32, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct DayRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Meals")]
        meals: i64,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Fiber")]
        fiber: String,
    }

    let today = Local::now().date_naive();
    let start = today - Duration::days(i64::from(days.max(1)) - 1);
    let summaries = db.get_weekly_summary(start, today)?;

    if json {
        return print_json(&summaries);
    }

    if summaries.is_empty() {
        exit_not_found(&format!("No meals in the last {days} days"), false);
    }

    let rows: Vec<DayRow> = summaries
        .iter()
        .map(|s| {
            let t = s.totals.map(no_neg_zero);
            DayRow {
                date: s.date.clone(),
                meals: s.meal_count,
                calories: format!("{:.0}", t.calories),
                protein: format!("{:.0}g", t.protein),
                carbs: format!("{:.0}g", t.carbs),
                fat: format!("{:.0}g", t.fat),
                fiber: format!("{:.0}g", t.fiber),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
