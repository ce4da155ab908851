use anyhow::{Result, bail};
use std::collections::BTreeMap;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nosh_core::db::Database;
use nosh_core::models::{IngredientData, NutritionTotals, validate_ingredient};

use super::helpers::{exit_not_found, no_neg_zero, print_json, truncate};

pub(crate) struct IngredientInput {
    pub category: String,
    pub key: String,
    pub name: String,
    pub measurement: String,
    pub nutrition: NutritionTotals,
}

pub(crate) fn cmd_ingredient_list(
    db: &Database,
    category: Option<&str>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Key")]
        key: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Measurement")]
        measurement: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
    }

    let mut catalog = db.get_all_ingredients()?;
    if let Some(category) = category {
        catalog.basic_ingredients.retain(|c, _| c == category);
    }

    if json {
        return print_json(&catalog);
    }

    if catalog.ingredient_count() == 0 {
        exit_not_found("No ingredients found", false);
    }

    let mut rows = Vec::new();
    for (cat, ingredients) in &catalog.basic_ingredients {
        for (key, data) in ingredients {
            if data.measurements.is_empty() {
                rows.push(IngredientRow {
                    category: cat.clone(),
                    key: key.clone(),
                    name: truncate(&data.name, 30),
                    measurement: "-".to_string(),
                    calories: "-".to_string(),
                    protein: "-".to_string(),
                    carbs: "-".to_string(),
                    fat: "-".to_string(),
                });
            }
            for (measurement, n) in &data.measurements {
                rows.push(IngredientRow {
                    category: cat.clone(),
                    key: key.clone(),
                    name: truncate(&data.name, 30),
                    measurement: measurement.clone(),
                    calories: format!("{:.0}", no_neg_zero(n.calories)),
                    protein: format!("{:.1}g", no_neg_zero(n.protein)),
                    carbs: format!("{:.1}g", no_neg_zero(n.carbs)),
                    fat: format!("{:.1}g", no_neg_zero(n.fat)),
                });
            }
        }
    }

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

/// Add an ingredient, or add a measurement to an existing one.
pub(crate) fn cmd_ingredient_add(db: &Database, input: IngredientInput, json: bool) -> Result<()> {
    let existing = db.get_ingredient(&input.category, &input.key)?;
    let is_new = existing.is_none();

    let mut data = existing.unwrap_or_else(|| IngredientData {
        name: input.name.clone(),
        measurements: BTreeMap::new(),
    });
    if data.measurements.contains_key(&input.measurement) {
        bail!(
            "Ingredient '{}' already has a '{}' measurement",
            input.key,
            input.measurement
        );
    }
    data.measurements
        .insert(input.measurement.clone(), input.nutrition);
    validate_ingredient(&input.category, &input.key, &data)?;

    if is_new {
        db.add_ingredient(&input.category, &input.key, &data)?;
    } else {
        db.update_ingredient(&input.category, &input.key, &data)?;
    }

    if json {
        print_json(&data)?;
    } else if is_new {
        println!(
            "Added ingredient \"{}\" to {} ({})",
            data.name, input.category, input.measurement
        );
    } else {
        println!(
            "Added measurement '{}' to \"{}\"",
            input.measurement, data.name
        );
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_delete(
    db: &Database,
    category: &str,
    key: &str,
    json: bool,
) -> Result<()> {
    let Some(name) = db.delete_ingredient(category, key)? else {
        exit_not_found(
            &format!("Ingredient '{key}' not found in category '{category}'"),
            json,
        );
    };
    if json {
        println!(
            "{}",
            serde_json::json!({ "deleted": key, "category": category, "name": name })
        );
    } else {
        println!("Deleted ingredient \"{name}\"");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_list(db: &Database, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "Key")]
        key: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Servings")]
        servings: String,
        #[tabled(rename = "Ingredients")]
        ingredients: usize,
        #[tabled(rename = "Cal/serving")]
        calories: String,
        #[tabled(rename = "P/serving")]
        protein: String,
    }

    let book = db.get_all_recipes()?;

    if json {
        return print_json(&book);
    }

    if book.dishes.is_empty() {
        exit_not_found("No recipes found", false);
    }

    let rows: Vec<RecipeRow> = book
        .dishes
        .iter()
        .map(|(key, r)| RecipeRow {
            key: key.clone(),
            name: truncate(&r.name, 35),
            servings: format!("{}", r.servings),
            ingredients: r.ingredients.len(),
            calories: format!("{:.0}", no_neg_zero(r.total_per_serving.calories)),
            protein: format!("{:.1}g", no_neg_zero(r.total_per_serving.protein)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_recipe_delete(db: &Database, key: &str, json: bool) -> Result<()> {
    let Some(recipe) = db.get_recipe(key)? else {
        exit_not_found(&format!("Recipe '{key}' not found"), json);
    };
    db.delete_recipe(key)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": key, "name": recipe.name }));
    } else {
        println!("Deleted recipe \"{}\"", recipe.name);
    }
    Ok(())
}
