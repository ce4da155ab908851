use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::Database;
use crate::models::{
    IngredientCatalog, MealsByDate, NewMeal, RecipeBook, validate_ingredient, validate_recipe,
};

/// Days of meal history included in a data export.
pub const EXPORT_MEAL_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportScope {
    #[default]
    All,
    Ingredients,
    Recipes,
    Meals,
}

impl ExportScope {
    fn includes(self, other: ExportScope) -> bool {
        self == ExportScope::All || self == other
    }
}

impl FromStr for ExportScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "ingredients" => Ok(Self::Ingredients),
            "recipes" => Ok(Self::Recipes),
            "meals" => Ok(Self::Meals),
            _ => bail!("Unknown export type '{s}'. Use all, ingredients, recipes, or meals"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataExport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<IngredientCatalog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipes: Option<RecipeBook>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meals: Option<MealsByDate>,
}

/// Import document. Exported meals carry their date and stored fields;
/// those are read back as [`NewMeal`] under the date key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataImport {
    #[serde(default)]
    pub ingredients: Option<IngredientCatalog>,
    #[serde(default)]
    pub recipes: Option<RecipeBook>,
    #[serde(default)]
    pub meals: Option<BTreeMap<String, Vec<NewMeal>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub ingredients_imported: usize,
    pub ingredients_skipped: usize,
    pub recipes_imported: usize,
    pub recipes_skipped: usize,
    pub meals_imported: usize,
    pub meals_skipped: usize,
}

pub fn export_data(db: &Database, scope: ExportScope, today: NaiveDate) -> Result<DataExport> {
    let mut export = DataExport::default();

    if scope.includes(ExportScope::Ingredients) {
        export.ingredients = Some(db.get_all_ingredients()?);
    }
    if scope.includes(ExportScope::Recipes) {
        export.recipes = Some(db.get_all_recipes()?);
    }
    if scope.includes(ExportScope::Meals) {
        let start = today - Duration::days(EXPORT_MEAL_DAYS);
        export.meals = Some(db.get_meals_by_date_range(start, today)?);
    }

    Ok(export)
}

/// Import a document into the store. Ingredients and recipes that are
/// invalid or already present are skipped; meals are inserted idempotently.
pub fn import_data(db: &Database, data: &DataImport) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    if let Some(catalog) = &data.ingredients {
        for (category, items) in &catalog.basic_ingredients {
            for (key, item) in items {
                let result = validate_ingredient(category, key, item)
                    .and_then(|()| db.add_ingredient(category, key, item));
                match result {
                    Ok(()) => summary.ingredients_imported += 1,
                    Err(e) => {
                        warn!(category = %category, key = %key, error = %e, "skipped ingredient");
                        summary.ingredients_skipped += 1;
                    }
                }
            }
        }
    }

    if let Some(book) = &data.recipes {
        for (key, recipe) in &book.dishes {
            let result = validate_recipe(key, recipe).and_then(|()| db.add_recipe(key, recipe));
            match result {
                Ok(()) => summary.recipes_imported += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "skipped recipe");
                    summary.recipes_skipped += 1;
                }
            }
        }
    }

    if let Some(meals) = &data.meals {
        let total: usize = meals.values().map(Vec::len).sum();
        summary.meals_imported = db.import_meals(meals)?;
        summary.meals_skipped = total - summary.meals_imported;
    }

    info!(
        ingredients = summary.ingredients_imported,
        recipes = summary.recipes_imported,
        meals = summary.meals_imported,
        "import finished"
    );
    Ok(summary)
}

/// Parse an import document. Besides the combined `{ingredients, recipes,
/// meals}` layout this accepts the standalone catalog (`basic_ingredients`),
/// recipe book (`dishes`) and date-keyed meal files.
pub fn parse_document(json: &str) -> Result<DataImport> {
    let value: serde_json::Value = serde_json::from_str(json).context("Invalid JSON document")?;
    let Some(object) = value.as_object() else {
        bail!("Import document must be a JSON object");
    };

    if ["ingredients", "recipes", "meals"]
        .iter()
        .any(|k| object.contains_key(*k))
    {
        return serde_json::from_value(value).context("Invalid import document");
    }
    if object.contains_key("basic_ingredients") {
        return Ok(DataImport {
            ingredients: Some(serde_json::from_value(value).context("Invalid ingredient catalog")?),
            ..DataImport::default()
        });
    }
    if object.contains_key("dishes") {
        return Ok(DataImport {
            recipes: Some(serde_json::from_value(value).context("Invalid recipe book")?),
            ..DataImport::default()
        });
    }

    Ok(DataImport {
        meals: Some(serde_json::from_value(value).context("Invalid meals document")?),
        ..DataImport::default()
    })
}
