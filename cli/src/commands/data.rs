use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};

use nosh_core::db::Database;
use nosh_core::export::{build_workbook, export_filename};
use nosh_core::interchange::{self, ExportScope};

use super::helpers::{parse_optional_date, print_json};

pub(crate) fn cmd_export(
    db: &Database,
    output: Option<&Path>,
    scope: &str,
    json: bool,
) -> Result<()> {
    let scope: ExportScope = scope.parse()?;
    let data = interchange::export_data(db, scope, Local::now().date_naive())?;
    let body = serde_json::to_string_pretty(&data)?;

    let Some(path) = output else {
        println!("{body}");
        return Ok(());
    };

    std::fs::write(path, &body)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let ingredients = data.ingredients.as_ref().map_or(0, |c| c.ingredient_count());
    let recipes = data.recipes.as_ref().map_or(0, |r| r.dishes.len());
    let meals: usize = data
        .meals
        .as_ref()
        .map_or(0, |m| m.values().map(Vec::len).sum());

    if json {
        println!(
            "{}",
            serde_json::json!({
                "path": path.display().to_string(),
                "ingredients": ingredients,
                "recipes": recipes,
                "meals": meals,
            })
        );
    } else {
        println!(
            "Exported {ingredients} ingredients, {recipes} recipes and {meals} meals to {}",
            path.display()
        );
    }
    Ok(())
}

pub(crate) fn cmd_import(db: &Database, file: &Path, json: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let document = interchange::parse_document(&content)
        .with_context(|| format!("Failed to parse {}", file.display()))?;
    let summary = interchange::import_data(db, &document)?;

    if json {
        return print_json(&summary);
    }

    println!("Import complete:");
    println!(
        "  Ingredients: {} imported, {} skipped",
        summary.ingredients_imported, summary.ingredients_skipped
    );
    println!(
        "  Recipes:     {} imported, {} skipped",
        summary.recipes_imported, summary.recipes_skipped
    );
    println!(
        "  Meals:       {} imported, {} skipped",
        summary.meals_imported, summary.meals_skipped
    );
    Ok(())
}

pub(crate) fn cmd_spreadsheet(
    db: &Database,
    start: Option<String>,
    end: Option<String>,
    output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let start = parse_optional_date(start)?;
    let end = parse_optional_date(end)?;
    let meals = match (start, end) {
        (Some(s), Some(e)) => db.get_meals_by_date_range(s, e)?,
        (Some(s), None) => db.get_meals_by_date_range(s, Local::now().date_naive())?,
        _ => {
            let mut all = db.get_all_meals_by_date()?;
            if let Some(e) = end {
                let last = e.format("%Y-%m-%d").to_string();
                all.retain(|date, _| *date <= last);
            }
            all
        }
    };

    let workbook = build_workbook(&meals)?;
    let bytes = workbook.to_xlsx()?;
    let path = output.unwrap_or_else(|| PathBuf::from(export_filename(Local::now().date_naive())));
    std::fs::write(&path, &bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let months: Vec<&str> = workbook.sheets.iter().map(|s| s.name.as_str()).collect();
    if json {
        println!(
            "{}",
            serde_json::json!({ "path": path.display().to_string(), "sheets": months })
        );
    } else {
        println!(
            "Wrote {} ({} month{}: {})",
            path.display(),
            months.len(),
            if months.len() == 1 { "" } else { "s" },
            months.join(", ")
        );
    }
    Ok(())
}
