use anyhow::{Result, bail};
use chrono::{Local, NaiveDate};

use nosh_core::db::Database;
use nosh_core::models::{InsertOutcome, NewMeal, NutritionTotals, validate_new_meal};

use super::helpers::{
    exit_not_found, format_macros, parse_date, print_json, print_meal_table,
};

const MEAL_TYPES: [&str; 4] = ["breakfast", "lunch", "dinner", "snack"];

pub(crate) struct MealInput {
    pub description: String,
    pub nutrition: NutritionTotals,
    pub meal_type: String,
    pub source: String,
}

fn normalize_meal_type(meal_type: &str) -> Result<String> {
    let lower = meal_type.trim().to_lowercase();
    if !MEAL_TYPES.contains(&lower.as_str()) {
        bail!(
            "Invalid meal type '{meal_type}'. Use one of: {}",
            MEAL_TYPES.join(", ")
        );
    }
    Ok(lower)
}

fn build_new_meal(db: &Database, input: MealInput) -> Result<NewMeal> {
    let meal = NewMeal {
        id: db.next_meal_id()?,
        description: input.description.trim().to_string(),
        meal_type: normalize_meal_type(&input.meal_type)?,
        timestamp: Some(Local::now().to_rfc3339()),
        source: input.source,
        nutrition: input.nutrition,
        ingredient_data: None,
    };
    validate_new_meal(&meal)?;
    Ok(meal)
}

pub(crate) fn cmd_add(
    db: &Database,
    input: MealInput,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let new_meal = build_new_meal(db, input)?;

    if db.insert_meal(date, &new_meal)? == InsertOutcome::AlreadyExists {
        bail!("Meal id {} is already taken, try again", new_meal.id);
    }
    let Some(meal) = db.get_meal(new_meal.id)? else {
        bail!("Meal {} was not stored", new_meal.id);
    };

    if json {
        print_json(&meal)?;
    } else {
        let id = meal.id;
        let desc = &meal.description;
        let kind = &meal.meal_type;
        let macros = format_macros(&meal.nutrition);
        println!("Added [{id}] {desc} ({kind}) on {date}: {macros}");
    }
    Ok(())
}

pub(crate) fn cmd_list(db: &Database, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let meals = db.get_meals_by_date(date)?;

    if json {
        return print_json(&meals);
    }

    if meals.is_empty() {
        exit_not_found(&format!("No meals logged for {date}"), false);
    }

    println!("=== {date} ===\n");
    print_meal_table(&meals);
    let total: NutritionTotals = meals.iter().map(|m| m.nutrition).sum();
    println!("\n  TOTAL: {}", format_macros(&total));
    Ok(())
}

pub(crate) fn cmd_delete(db: &Database, id: i64, json: bool) -> Result<()> {
    if !db.delete_meal(id)? {
        exit_not_found(&format!("Meal {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted meal {id}");
    }
    Ok(())
}

pub(crate) fn cmd_copy(db: &Database, from: String, to: String, json: bool) -> Result<()> {
    let from = parse_date(Some(from))?;
    let to = parse_date(Some(to))?;

    let copied = db.copy_meals(from, to)?;
    if copied.is_empty() {
        exit_not_found(&format!("No meals found for {from}"), json);
    }

    if json {
        print_json(&copied)?;
    } else {
        let count = copied.len();
        println!("Copied {count} meals from {from} to {to}");
    }
    Ok(())
}

pub(crate) fn cmd_clear(db: &Database, date: Option<String>, json: bool) -> Result<()> {
    let date: NaiveDate = parse_date(date)?;
    let deleted = db.delete_meals_for_date(date)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "date": date.format("%Y-%m-%d").to_string(), "deleted": deleted })
        );
    } else {
        println!("Deleted {deleted} meals from {date}");
    }
    Ok(())
}
