use anyhow::{Result, bail};
use chrono::{Duration, Local, NaiveDate};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nosh_core::analyzer::{Analyzer, Comparison, Suggestion, food_recommendations};
use nosh_core::chat::{ReplyGenerator, chat};
use nosh_core::db::Database;
use nosh_core::stats::meal_stats;

use super::helpers::{
    exit_not_found, format_macros, parse_date, parse_optional_date, print_json,
};

fn print_suggestions(title: &str, items: &[Suggestion]) {
    if items.is_empty() {
        return;
    }
    println!("{title}:");
    for s in items {
        let kind = format!("{:?}", s.kind).to_uppercase();
        println!("  [{kind}] {}", s.message);
        if let Some(rec) = &s.recommendation {
            println!("      -> {rec}");
        }
    }
    println!();
}

pub(crate) fn cmd_analyze(db: &Database, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let report = Analyzer::new(db).generate_suggestions(date)?;

    if json {
        return print_json(&report);
    }

    println!("=== Analysis for {date} ===\n");
    println!("  {}\n", format_macros(&report.summary.totals));
    let m = &report.macro_breakdown;
    println!(
        "  Macros: protein {:.0}%  carbs {:.0}%  fat {:.0}%\n",
        m.protein.percent, m.carbs.percent, m.fat.percent
    );
    print_suggestions("Suggestions", &report.suggestions);
    print_suggestions("Insights", &report.insights);
    Ok(())
}

pub(crate) fn cmd_recommend(nutrients: &[String], json: bool) -> Result<()> {
    let recommendations = food_recommendations(nutrients);

    if json {
        return print_json(&recommendations);
    }

    if recommendations.is_empty() {
        bail!("No known nutrients given. Use calories, protein, carbs, fat, or fiber");
    }

    for (nutrient, foods) in &recommendations {
        println!("{nutrient}:");
        for food in *foods {
            println!("  - {food}");
        }
        println!();
    }
    Ok(())
}

pub(crate) fn cmd_progress(db: &Database, json: bool) -> Result<()> {
    let today = Local::now().date_naive();
    let progress = Analyzer::new(db).weekly_progress(today)?;

    if json {
        return print_json(&progress);
    }

    let Some(data) = &progress.data else {
        let message = progress.message.as_deref().unwrap_or("No data");
        exit_not_found(message, false);
    };

    println!("=== Weekly progress ({}) ===\n", data.period);
    println!("  Daily average: {}", format_macros(&data.averages));
    println!("  Days logged:   {}\n", data.daily_data.len());
    print_suggestions("Suggestions", &data.suggestions);
    Ok(())
}

pub(crate) fn cmd_compare(
    db: &Database,
    start: Option<String>,
    end: Option<String>,
    json: bool,
) -> Result<()> {
    let end = parse_optional_date(end)?.unwrap_or_else(|| Local::now().date_naive());
    let start = parse_optional_date(start)?.unwrap_or(end - Duration::days(6));
    if start > end {
        bail!("Start date {start} is after end date {end}");
    }

    let comparison = Analyzer::new(db).compare_with_previous(start, end)?;

    if json {
        return print_json(&comparison);
    }

    match &comparison {
        Comparison::NoData { message, .. } | Comparison::NoPrevious { message, .. } => {
            exit_not_found(message, false);
        }
        Comparison::Compared {
            current,
            previous,
            changes,
            insights,
            ..
        } => {
            let (Some(cur), Some(prev)) = (&current.data, &previous.data) else {
                bail!("Comparison is missing period data");
            };
            println!(
                "=== {} to {} vs {} to {} ===\n",
                cur.period.start_date,
                cur.period.end_date,
                prev.period.start_date,
                prev.period.end_date
            );
            println!("  Current:  {}", format_macros(&cur.averages));
            println!("  Previous: {}", format_macros(&prev.averages));
            println!(
                "  Change:   {:+.0} kcal | P:{:+.0}g C:{:+.0}g F:{:+.0}g Fiber:{:+.0}g\n",
                changes.calories, changes.protein, changes.carbs, changes.fat, changes.fiber
            );
            print_suggestions("Insights", insights);
        }
    }
    Ok(())
}

pub(crate) fn cmd_stats(
    db: &Database,
    start: Option<String>,
    end: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct SourceRow {
        #[tabled(rename = "Source")]
        source: String,
        #[tabled(rename = "Meals")]
        meals: usize,
    }

    let start = parse_optional_date(start)?;
    let end = parse_optional_date(end)?;
    let mut meals = match (start, end) {
        (Some(s), Some(e)) => db.get_meals_by_date_range(s, e)?,
        _ => db.get_all_meals_by_date()?,
    };
    // One open bound: filter the full history on date keys
    let in_range = |key: &str| {
        let key = NaiveDate::parse_from_str(key, "%Y-%m-%d").ok();
        key.is_some_and(|d| start.is_none_or(|s| d >= s) && end.is_none_or(|e| d <= e))
    };
    meals.retain(|key, _| in_range(key));
    let stats = meal_stats(&meals, start, end);

    if json {
        return print_json(&stats);
    }

    let s = &stats.summary;
    if s.total_meals == 0 {
        exit_not_found("No meals found", false);
    }

    let from = stats.date_range.start_date.as_deref().unwrap_or("?");
    let to = stats.date_range.end_date.as_deref().unwrap_or("?");
    println!("=== {from} to {to} ===\n");
    println!("  Meals:            {}", s.total_meals);
    println!("  Days with data:   {}", s.days_with_data);
    println!(
        "  Totals:           {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g Fiber:{:.0}g",
        s.total_calories, s.total_protein, s.total_carbs, s.total_fat, s.total_fiber
    );
    println!("  Avg calories/day: {:.0}", s.avg_calories_per_day);
    println!("  Avg protein/day:  {:.1}g", s.avg_protein_per_day);
    println!("  Avg meals/day:    {:.1}\n", s.avg_meals_per_day);

    let rows: Vec<SourceRow> = stats
        .source_counts
        .iter()
        .map(|(source, meals)| SourceRow {
            source: source.clone(),
            meals: *meals,
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) async fn cmd_ask(
    db: &Database,
    generator: Option<&dyn ReplyGenerator>,
    message: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let summary = db.get_daily_summary(date)?;
    let date_str = date.format("%Y-%m-%d").to_string();

    let reply = chat(generator, message, Some(&date_str), Some(&summary)).await?;

    if json {
        return print_json(&reply);
    }
    if reply.fallback {
        eprintln!("(fallback reply)");
    }
    println!("{}", reply.response);
    Ok(())
}
