use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::models::{
    DailySummary, IngredientCatalog, IngredientData, InsertOutcome, Meal, MealsByDate, NewMeal,
    NutritionTotals, RecipeBook, RecipeData, RecipeIngredient, validate_new_meal,
};

const MEAL_COLUMNS: &str = "id, description, meal_type, date, timestamp, source,
     calories, protein, carbs, fat, fiber, ingredient_data";

pub struct Database {
    conn: Connection,
}

fn day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.pragma_update(None, "foreign_keys", true)?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE
                );

                CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                    key TEXT NOT NULL,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (category_id, key)
                );

                CREATE TABLE IF NOT EXISTS ingredient_measurements (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id) ON DELETE CASCADE,
                    measurement TEXT NOT NULL,
                    calories REAL NOT NULL DEFAULT 0,
                    protein REAL NOT NULL DEFAULT 0,
                    carbs REAL NOT NULL DEFAULT 0,
                    fat REAL NOT NULL DEFAULT 0,
                    fiber REAL NOT NULL DEFAULT 0,
                    UNIQUE (ingredient_id, measurement)
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    key TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    category TEXT,
                    servings REAL NOT NULL DEFAULT 1.0,
                    calories REAL NOT NULL DEFAULT 0,
                    protein REAL NOT NULL DEFAULT 0,
                    carbs REAL NOT NULL DEFAULT 0,
                    fat REAL NOT NULL DEFAULT 0,
                    fiber REAL NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    ingredient_key TEXT NOT NULL,
                    ingredient_name TEXT NOT NULL,
                    amount TEXT NOT NULL,
                    calories REAL NOT NULL DEFAULT 0,
                    protein REAL NOT NULL DEFAULT 0,
                    carbs REAL NOT NULL DEFAULT 0,
                    fat REAL NOT NULL DEFAULT 0,
                    fiber REAL NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS meals (
                    id INTEGER PRIMARY KEY,
                    description TEXT NOT NULL,
                    meal_type TEXT NOT NULL,
                    date TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    source TEXT NOT NULL,
                    calories REAL NOT NULL DEFAULT 0,
                    protein REAL NOT NULL DEFAULT 0,
                    carbs REAL NOT NULL DEFAULT 0,
                    fat REAL NOT NULL DEFAULT 0,
                    fiber REAL NOT NULL DEFAULT 0,
                    ingredient_data TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_meals_date ON meals(date);
                CREATE INDEX IF NOT EXISTS idx_ingredients_category ON ingredients(category_id);
                CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe ON recipe_ingredients(recipe_id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // Reads five nutrient columns starting at `offset`:
    // calories, protein, carbs, fat, fiber
    fn totals_from_row(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<NutritionTotals> {
        Ok(NutritionTotals {
            calories: row.get(offset)?,
            protein: row.get(offset + 1)?,
            carbs: row.get(offset + 2)?,
            fat: row.get(offset + 3)?,
            fiber: row.get(offset + 4)?,
        })
    }

    // Expects MEAL_COLUMNS order.
    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Meal> {
        let id: i64 = row.get(0)?;
        let ingredient_data: Option<String> = row.get(11)?;
        let ingredient_data = ingredient_data.and_then(|s| match serde_json::from_str(&s) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(id, error = %e, "ignoring unreadable ingredient data");
                None
            }
        });
        Ok(Meal {
            id,
            description: row.get(1)?,
            meal_type: row.get(2)?,
            date: row.get(3)?,
            timestamp: row.get(4)?,
            source: row.get(5)?,
            nutrition: Self::totals_from_row(row, 6)?,
            ingredient_data,
        })
    }

    // --- Ingredient catalog ---

    pub fn get_categories(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM categories ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn get_all_ingredients(&self) -> Result<IngredientCatalog> {
        let mut stmt = self.conn.prepare(
            "SELECT c.name, i.key, i.name, m.measurement,
                    m.calories, m.protein, m.carbs, m.fat, m.fiber
             FROM ingredients i
             JOIN categories c ON c.id = i.category_id
             LEFT JOIN ingredient_measurements m ON m.ingredient_id = i.id
             ORDER BY c.name, i.key, m.measurement",
        )?;

        let rows = stmt
            .query_map([], |row| {
                let measurement: Option<String> = row.get(3)?;
                let nutrition = match measurement {
                    Some(_) => Some(Self::totals_from_row(row, 4)?),
                    None => None,
                };
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    measurement.zip(nutrition),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut catalog = IngredientCatalog::default();
        for (category, key, name, measurement) in rows {
            let entry = catalog
                .basic_ingredients
                .entry(category)
                .or_default()
                .entry(key)
                .or_insert_with(|| IngredientData {
                    name,
                    measurements: BTreeMap::new(),
                });
            if let Some((label, nutrition)) = measurement {
                entry.measurements.insert(label, nutrition);
            }
        }

        Ok(catalog)
    }

    pub fn get_ingredient(&self, category: &str, key: &str) -> Result<Option<IngredientData>> {
        let catalog = self.get_all_ingredients()?;
        Ok(catalog
            .basic_ingredients
            .get(category)
            .and_then(|items| items.get(key))
            .cloned())
    }

    fn ensure_category(&self, name: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO categories (name) VALUES (?1)",
            params![name],
        )?;
        self.conn
            .query_row(
                "SELECT id FROM categories WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .context("Category not found")
    }

    fn ingredient_id(&self, category: &str, key: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT i.id FROM ingredients i
                 JOIN categories c ON c.id = i.category_id
                 WHERE c.name = ?1 AND i.key = ?2",
                params![category, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn insert_measurements(&self, ingredient_id: i64, data: &IngredientData) -> Result<()> {
        for (measurement, n) in &data.measurements {
            self.conn.execute(
                "INSERT INTO ingredient_measurements
                 (ingredient_id, measurement, calories, protein, carbs, fat, fiber)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    ingredient_id,
                    measurement,
                    n.calories,
                    n.protein,
                    n.carbs,
                    n.fat,
                    n.fiber
                ],
            )?;
        }
        Ok(())
    }

    pub fn add_ingredient(&self, category: &str, key: &str, data: &IngredientData) -> Result<()> {
        if self.ingredient_id(category, key)?.is_some() {
            bail!("Ingredient '{key}' already exists in category '{category}'");
        }
        let category_id = self.ensure_category(category)?;
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO ingredients (category_id, key, name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![category_id, key, data.name, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.insert_measurements(id, data)?;
        debug!(category, key, "added ingredient");
        Ok(())
    }

    /// Replace an ingredient's name and measurements. Returns false when
    /// the ingredient does not exist.
    pub fn update_ingredient(
        &self,
        category: &str,
        key: &str,
        data: &IngredientData,
    ) -> Result<bool> {
        let Some(id) = self.ingredient_id(category, key)? else {
            return Ok(false);
        };
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "UPDATE ingredients SET name = ?1, updated_at = ?2 WHERE id = ?3",
            params![data.name, now, id],
        )?;
        self.conn.execute(
            "DELETE FROM ingredient_measurements WHERE ingredient_id = ?1",
            params![id],
        )?;
        self.insert_measurements(id, data)?;
        Ok(true)
    }

    /// Delete an ingredient, returning its display name if it existed.
    pub fn delete_ingredient(&self, category: &str, key: &str) -> Result<Option<String>> {
        let Some(id) = self.ingredient_id(category, key)? else {
            return Ok(None);
        };
        let name: String = self.conn.query_row(
            "SELECT name FROM ingredients WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "DELETE FROM ingredient_measurements WHERE ingredient_id = ?1",
            params![id],
        )?;
        self.conn
            .execute("DELETE FROM ingredients WHERE id = ?1", params![id])?;
        Ok(Some(name))
    }

    // --- Recipes ---

    pub fn get_all_recipes(&self) -> Result<RecipeBook> {
        let mut stmt = self.conn.prepare(
            "SELECT id, key, name, category, servings, calories, protein, carbs, fat, fiber
             FROM recipes ORDER BY name",
        )?;
        let recipes = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    RecipeData {
                        name: row.get(2)?,
                        category: row.get(3)?,
                        servings: row.get(4)?,
                        total_per_serving: Self::totals_from_row(row, 5)?,
                        ingredients: Vec::new(),
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut book = RecipeBook::default();
        for (id, key, mut recipe) in recipes {
            recipe.ingredients = self.get_recipe_ingredients(id)?;
            book.dishes.insert(key, recipe);
        }
        Ok(book)
    }

    pub fn get_recipe(&self, key: &str) -> Result<Option<RecipeData>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, category, servings, calories, protein, carbs, fat, fiber
                 FROM recipes WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        RecipeData {
                            name: row.get(1)?,
                            category: row.get(2)?,
                            servings: row.get(3)?,
                            total_per_serving: Self::totals_from_row(row, 4)?,
                            ingredients: Vec::new(),
                        },
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, mut recipe)) => {
                recipe.ingredients = self.get_recipe_ingredients(id)?;
                Ok(Some(recipe))
            }
            None => Ok(None),
        }
    }

    fn get_recipe_ingredients(&self, recipe_id: i64) -> Result<Vec<RecipeIngredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT ingredient_key, ingredient_name, amount, calories, protein, carbs, fat, fiber
             FROM recipe_ingredients WHERE recipe_id = ?1 ORDER BY id",
        )?;
        let ingredients = stmt
            .query_map(params![recipe_id], |row| {
                Ok(RecipeIngredient {
                    key: row.get(0)?,
                    name: row.get(1)?,
                    amount: row.get(2)?,
                    nutrition: Self::totals_from_row(row, 3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    fn insert_recipe_ingredients(
        &self,
        recipe_id: i64,
        ingredients: &[RecipeIngredient],
    ) -> Result<()> {
        for ing in ingredients {
            let n = &ing.nutrition;
            self.conn.execute(
                "INSERT INTO recipe_ingredients
                 (recipe_id, ingredient_key, ingredient_name, amount,
                  calories, protein, carbs, fat, fiber)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    recipe_id, ing.key, ing.name, ing.amount, n.calories, n.protein, n.carbs,
                    n.fat, n.fiber
                ],
            )?;
        }
        Ok(())
    }

    fn recipe_id(&self, key: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM recipes WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn add_recipe(&self, key: &str, recipe: &RecipeData) -> Result<()> {
        if self.recipe_id(key)?.is_some() {
            bail!("Recipe '{key}' already exists");
        }
        let now = Local::now().to_rfc3339();
        let n = &recipe.total_per_serving;
        self.conn.execute(
            "INSERT INTO recipes
             (key, name, category, servings, calories, protein, carbs, fat, fiber,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                key,
                recipe.name,
                recipe.category,
                recipe.servings,
                n.calories,
                n.protein,
                n.carbs,
                n.fat,
                n.fiber,
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.insert_recipe_ingredients(id, &recipe.ingredients)?;
        debug!(key, "added recipe");
        Ok(())
    }

    /// Replace a recipe and its ingredient list. Returns false when the
    /// recipe does not exist.
    pub fn update_recipe(&self, key: &str, recipe: &RecipeData) -> Result<bool> {
        let Some(id) = self.recipe_id(key)? else {
            return Ok(false);
        };
        let now = Local::now().to_rfc3339();
        let n = &recipe.total_per_serving;
        self.conn.execute(
            "UPDATE recipes SET name = ?1, category = ?2, servings = ?3,
             calories = ?4, protein = ?5, carbs = ?6, fat = ?7, fiber = ?8, updated_at = ?9
             WHERE id = ?10",
            params![
                recipe.name,
                recipe.category,
                recipe.servings,
                n.calories,
                n.protein,
                n.carbs,
                n.fat,
                n.fiber,
                now,
                id
            ],
        )?;
        self.conn.execute(
            "DELETE FROM recipe_ingredients WHERE recipe_id = ?1",
            params![id],
        )?;
        self.insert_recipe_ingredients(id, &recipe.ingredients)?;
        Ok(true)
    }

    pub fn delete_recipe(&self, key: &str) -> Result<bool> {
        let Some(id) = self.recipe_id(key)? else {
            return Ok(false);
        };
        self.conn.execute(
            "DELETE FROM recipe_ingredients WHERE recipe_id = ?1",
            params![id],
        )?;
        self.conn
            .execute("DELETE FROM recipes WHERE id = ?1", params![id])?;
        Ok(true)
    }

    // --- Meals ---

    pub fn get_meal(&self, id: i64) -> Result<Option<Meal>> {
        let meal = self
            .conn
            .query_row(
                &format!("SELECT {MEAL_COLUMNS} FROM meals WHERE id = ?1"),
                params![id],
                Self::meal_from_row,
            )
            .optional()?;
        Ok(meal)
    }

    /// Meals logged on `date`, ordered by timestamp.
    pub fn get_meals_by_date(&self, date: NaiveDate) -> Result<Vec<Meal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE date = ?1 ORDER BY timestamp, id"
        ))?;
        let meals = stmt
            .query_map(params![day(date)], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    /// Meals in the inclusive range, grouped by date.
    pub fn get_meals_by_date_range(&self, start: NaiveDate, end: NaiveDate) -> Result<MealsByDate> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals
             WHERE date >= ?1 AND date <= ?2
             ORDER BY date, timestamp, id"
        ))?;
        let meals = stmt
            .query_map(params![day(start), day(end)], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(group_by_date(meals))
    }

    pub fn get_all_meals_by_date(&self) -> Result<MealsByDate> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals ORDER BY date, timestamp, id"
        ))?;
        let meals = stmt
            .query_map([], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(group_by_date(meals))
    }

    /// Insert a meal under its caller-assigned id. A meal whose id is
    /// already stored is left untouched and reported as `AlreadyExists`.
    pub fn insert_meal(&self, date: NaiveDate, meal: &NewMeal) -> Result<InsertOutcome> {
        let timestamp = meal
            .timestamp
            .clone()
            .unwrap_or_else(|| Local::now().to_rfc3339());
        let ingredient_data = meal
            .ingredient_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("failed to encode ingredient data")?;
        let n = &meal.nutrition;

        let changed = self.conn.execute(
            "INSERT INTO meals
             (id, description, meal_type, date, timestamp, source,
              calories, protein, carbs, fat, fiber, ingredient_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO NOTHING",
            params![
                meal.id,
                meal.description,
                meal.meal_type,
                day(date),
                timestamp,
                meal.source,
                n.calories,
                n.protein,
                n.carbs,
                n.fat,
                n.fiber,
                ingredient_data
            ],
        )?;

        if changed == 0 {
            debug!(id = meal.id, "meal already exists");
            Ok(InsertOutcome::AlreadyExists)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    /// Overwrite a stored meal. Returns false when no meal has this id.
    pub fn update_meal(&self, id: i64, date: NaiveDate, meal: &NewMeal) -> Result<bool> {
        let Some(existing) = self.get_meal(id)? else {
            return Ok(false);
        };
        let timestamp = meal.timestamp.clone().unwrap_or(existing.timestamp);
        let ingredient_data = meal
            .ingredient_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("failed to encode ingredient data")?;
        let n = &meal.nutrition;

        self.conn.execute(
            "UPDATE meals SET description = ?1, meal_type = ?2, date = ?3, timestamp = ?4,
             source = ?5, calories = ?6, protein = ?7, carbs = ?8, fat = ?9, fiber = ?10,
             ingredient_data = ?11
             WHERE id = ?12",
            params![
                meal.description,
                meal.meal_type,
                day(date),
                timestamp,
                meal.source,
                n.calories,
                n.protein,
                n.carbs,
                n.fat,
                n.fiber,
                ingredient_data,
                id
            ],
        )?;
        Ok(true)
    }

    pub fn delete_meal(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM meals WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn delete_meals_for_date(&self, date: NaiveDate) -> Result<usize> {
        let changed = self
            .conn
            .execute("DELETE FROM meals WHERE date = ?1", params![day(date)])?;
        Ok(changed)
    }

    /// Next free meal id: the current time in milliseconds, bumped past
    /// the largest stored id when needed.
    pub fn next_meal_id(&self) -> Result<i64> {
        let max_id: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(id), 0) FROM meals", [], |row| {
                row.get(0)
            })?;
        let now = Local::now().timestamp_millis();
        Ok(now.max(max_id + 1))
    }

    /// Copy every meal of `source` onto `target` with fresh ids and timestamps.
    pub fn copy_meals(&self, source: NaiveDate, target: NaiveDate) -> Result<Vec<Meal>> {
        let meals = self.get_meals_by_date(source)?;
        let mut copied = Vec::with_capacity(meals.len());

        for meal in &meals {
            let mut new_meal = NewMeal::from(meal);
            new_meal.id = self.next_meal_id()?;
            new_meal.timestamp = Some(Local::now().to_rfc3339());
            self.insert_meal(target, &new_meal)?;
            let stored = self
                .get_meal(new_meal.id)?
                .context("Copied meal not found")?;
            copied.push(stored);
        }

        Ok(copied)
    }

    /// Insert meals grouped by date. Duplicates are skipped, invalid meals
    /// are logged and skipped. Returns the number of meals inserted.
    pub fn import_meals(&self, meals: &BTreeMap<String, Vec<NewMeal>>) -> Result<usize> {
        let mut inserted = 0;
        for (date_str, day_meals) in meals {
            let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
                warn!(date = %date_str, "skipping meals with invalid date");
                continue;
            };
            for meal in day_meals {
                if let Err(e) = validate_new_meal(meal) {
                    warn!(id = meal.id, error = %e, "skipping invalid meal");
                    continue;
                }
                if self.insert_meal(date, meal)? == InsertOutcome::Inserted {
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    }

    // --- Aggregates ---

    /// Totals for one date. Dates without meals yield zero totals.
    pub fn get_daily_summary(&self, date: NaiveDate) -> Result<DailySummary> {
        let date_str = day(date);
        let (meal_count, totals) = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(calories), 0), COALESCE(SUM(protein), 0),
                    COALESCE(SUM(carbs), 0), COALESCE(SUM(fat), 0), COALESCE(SUM(fiber), 0)
             FROM meals WHERE date = ?1",
            params![date_str],
            |row| Ok((row.get::<_, i64>(0)?, Self::totals_from_row(row, 1)?)),
        )?;
        Ok(DailySummary {
            date: date_str,
            totals,
            meal_count,
        })
    }

    /// One summary per date in the inclusive range that has at least one
    /// meal, ascending.
    pub fn get_weekly_summary(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailySummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, SUM(calories), SUM(protein), SUM(carbs), SUM(fat), SUM(fiber), COUNT(*)
             FROM meals
             WHERE date >= ?1 AND date <= ?2
             GROUP BY date
             ORDER BY date",
        )?;
        let summaries = stmt
            .query_map(params![day(start), day(end)], |row| {
                Ok(DailySummary {
                    date: row.get(0)?,
                    totals: Self::totals_from_row(row, 1)?,
                    meal_count: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }
}

fn group_by_date(meals: Vec<Meal>) -> MealsByDate {
    let mut grouped = MealsByDate::new();
    for meal in meals {
        grouped.entry(meal.date.clone()).or_default().push(meal);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn meal(id: i64, description: &str, meal_type: &str, calories: f64) -> NewMeal {
        NewMeal {
            id,
            description: description.to_string(),
            meal_type: meal_type.to_string(),
            timestamp: None,
            source: "manual".to_string(),
            nutrition: NutritionTotals::new(calories, 10.0, 30.0, 8.0, 4.0),
            ingredient_data: None,
        }
    }

    fn timed(mut m: NewMeal, ts: &str) -> NewMeal {
        m.timestamp = Some(ts.to_string());
        m
    }

    fn rice() -> IngredientData {
        let mut measurements = BTreeMap::new();
        measurements.insert(
            "1 cup".to_string(),
            NutritionTotals::new(205.0, 4.3, 45.0, 0.4, 0.6),
        );
        measurements.insert(
            "100g".to_string(),
            NutritionTotals::new(130.0, 2.7, 28.0, 0.3, 0.4),
        );
        IngredientData {
            name: "White Rice".to_string(),
            measurements,
        }
    }

    fn dal_recipe() -> RecipeData {
        RecipeData {
            name: "Dal Tadka".to_string(),
            category: Some("Main".to_string()),
            servings: 4.0,
            total_per_serving: NutritionTotals::new(180.0, 9.0, 24.0, 5.0, 6.0),
            ingredients: vec![
                RecipeIngredient {
                    key: "toor_dal".to_string(),
                    name: "Toor Dal".to_string(),
                    amount: "1 cup".to_string(),
                    nutrition: NutritionTotals::new(600.0, 34.0, 100.0, 3.0, 20.0),
                },
                RecipeIngredient {
                    key: "ghee".to_string(),
                    name: "Ghee".to_string(),
                    amount: "1 tbsp".to_string(),
                    nutrition: NutritionTotals::new(120.0, 0.0, 0.0, 14.0, 0.0),
                },
            ],
        }
    }

    #[test]
    fn test_open_file_database() {
        let dir = std::env::temp_dir().join(format!("nosh-db-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("nosh.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_meal(d("2025-06-01"), &meal(1, "Toast", "breakfast", 200.0))
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_meals_by_date(d("2025-06-01")).unwrap().len(), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_insert_and_get_meal() {
        let db = Database::open_in_memory().unwrap();
        let mut m = meal(42, "Idli sambar", "breakfast", 320.0);
        m.ingredient_data = Some(serde_json::json!([
            {"name": "Idli", "quantity": 3, "measurement": "piece"}
        ]));
        assert_eq!(
            db.insert_meal(d("2025-06-01"), &m).unwrap(),
            InsertOutcome::Inserted
        );

        let stored = db.get_meal(42).unwrap().unwrap();
        assert_eq!(stored.description, "Idli sambar");
        assert_eq!(stored.meal_type, "breakfast");
        assert_eq!(stored.date, "2025-06-01");
        assert_eq!(stored.source, "manual");
        assert!(!stored.timestamp.is_empty());
        assert!((stored.nutrition.calories - 320.0).abs() < f64::EPSILON);
        assert_eq!(stored.ingredient_data.unwrap()[0]["name"], "Idli");

        assert!(db.get_meal(43).unwrap().is_none());
    }

    #[test]
    fn test_unreadable_ingredient_data_reads_as_none() {
        let db = Database::open_in_memory().unwrap();
        let mut m = meal(7, "Poha", "breakfast", 250.0);
        m.ingredient_data = Some(serde_json::json!([{"name": "Poha"}]));
        db.insert_meal(d("2025-06-01"), &m).unwrap();
        db.conn
            .execute(
                "UPDATE meals SET ingredient_data = '{not json' WHERE id = 7",
                [],
            )
            .unwrap();

        let stored = db.get_meal(7).unwrap().unwrap();
        assert_eq!(stored.description, "Poha");
        assert!(stored.ingredient_data.is_none());
        assert_eq!(db.get_meals_by_date(d("2025-06-01")).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_meal_id_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.insert_meal(d("2025-06-01"), &meal(7, "Original", "lunch", 500.0))
            .unwrap();
        let outcome = db
            .insert_meal(d("2025-06-02"), &meal(7, "Replacement", "dinner", 900.0))
            .unwrap();
        assert_eq!(outcome, InsertOutcome::AlreadyExists);

        let stored = db.get_meal(7).unwrap().unwrap();
        assert_eq!(stored.description, "Original");
        assert_eq!(stored.date, "2025-06-01");
        assert!(db.get_meals_by_date(d("2025-06-02")).unwrap().is_empty());
    }

    #[test]
    fn test_meals_by_date_ordered_by_timestamp() {
        let db = Database::open_in_memory().unwrap();
        let date = d("2025-06-01");
        db.insert_meal(
            date,
            &timed(meal(3, "Dinner", "dinner", 600.0), "2025-06-01T20:00:00+00:00"),
        )
        .unwrap();
        db.insert_meal(
            date,
            &timed(meal(1, "Breakfast", "breakfast", 300.0), "2025-06-01T08:00:00+00:00"),
        )
        .unwrap();
        db.insert_meal(
            date,
            &timed(meal(2, "Lunch", "lunch", 500.0), "2025-06-01T13:00:00+00:00"),
        )
        .unwrap();

        let meals = db.get_meals_by_date(date).unwrap();
        let names: Vec<&str> = meals.iter().map(|m| m.description.as_str()).collect();
        assert_eq!(names, vec!["Breakfast", "Lunch", "Dinner"]);
    }

    #[test]
    fn test_meals_by_date_range_grouped() {
        let db = Database::open_in_memory().unwrap();
        db.insert_meal(d("2025-05-31"), &meal(1, "Outside", "lunch", 100.0))
            .unwrap();
        db.insert_meal(d("2025-06-01"), &meal(2, "A", "lunch", 100.0))
            .unwrap();
        db.insert_meal(d("2025-06-01"), &meal(3, "B", "dinner", 100.0))
            .unwrap();
        db.insert_meal(d("2025-06-03"), &meal(4, "C", "lunch", 100.0))
            .unwrap();

        let grouped = db
            .get_meals_by_date_range(d("2025-06-01"), d("2025-06-07"))
            .unwrap();
        let dates: Vec<&String> = grouped.keys().collect();
        assert_eq!(dates, vec!["2025-06-01", "2025-06-03"]);
        assert_eq!(grouped["2025-06-01"].len(), 2);

        let all = db.get_all_meals_by_date().unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_update_meal() {
        let db = Database::open_in_memory().unwrap();
        db.insert_meal(d("2025-06-01"), &meal(5, "Salad", "lunch", 250.0))
            .unwrap();
        let before = db.get_meal(5).unwrap().unwrap();

        let mut changed = meal(5, "Big salad", "dinner", 400.0);
        changed.source = "database".to_string();
        assert!(db.update_meal(5, d("2025-06-02"), &changed).unwrap());

        let after = db.get_meal(5).unwrap().unwrap();
        assert_eq!(after.description, "Big salad");
        assert_eq!(after.meal_type, "dinner");
        assert_eq!(after.date, "2025-06-02");
        assert_eq!(after.source, "database");
        assert_eq!(after.timestamp, before.timestamp);
        assert!((after.nutrition.calories - 400.0).abs() < f64::EPSILON);

        assert!(!db.update_meal(999, d("2025-06-02"), &changed).unwrap());
    }

    #[test]
    fn test_delete_meal() {
        let db = Database::open_in_memory().unwrap();
        db.insert_meal(d("2025-06-01"), &meal(5, "Salad", "lunch", 250.0))
            .unwrap();
        assert!(db.delete_meal(5).unwrap());
        assert!(!db.delete_meal(5).unwrap());
        assert!(db.get_meal(5).unwrap().is_none());
    }

    #[test]
    fn test_delete_meals_for_date() {
        let db = Database::open_in_memory().unwrap();
        db.insert_meal(d("2025-06-01"), &meal(1, "A", "lunch", 100.0))
            .unwrap();
        db.insert_meal(d("2025-06-01"), &meal(2, "B", "dinner", 100.0))
            .unwrap();
        db.insert_meal(d("2025-06-02"), &meal(3, "C", "lunch", 100.0))
            .unwrap();

        assert_eq!(db.delete_meals_for_date(d("2025-06-01")).unwrap(), 2);
        assert!(db.get_meals_by_date(d("2025-06-01")).unwrap().is_empty());
        assert_eq!(db.get_meals_by_date(d("2025-06-02")).unwrap().len(), 1);
    }

    #[test]
    fn test_copy_meals() {
        let db = Database::open_in_memory().unwrap();
        db.insert_meal(d("2025-06-01"), &meal(1, "Oats", "breakfast", 300.0))
            .unwrap();
        db.insert_meal(d("2025-06-01"), &meal(2, "Rajma", "lunch", 550.0))
            .unwrap();

        let copied = db.copy_meals(d("2025-06-01"), d("2025-06-05")).unwrap();
        assert_eq!(copied.len(), 2);
        assert!(copied.iter().all(|m| m.date == "2025-06-05"));
        assert!(copied.iter().all(|m| m.id != 1 && m.id != 2));
        assert_ne!(copied[0].id, copied[1].id);

        let target = db.get_meals_by_date(d("2025-06-05")).unwrap();
        assert_eq!(target.len(), 2);
        assert_eq!(db.get_meals_by_date(d("2025-06-01")).unwrap().len(), 2);
    }

    #[test]
    fn test_copy_meals_empty_source() {
        let db = Database::open_in_memory().unwrap();
        let copied = db.copy_meals(d("2025-06-01"), d("2025-06-02")).unwrap();
        assert!(copied.is_empty());
    }

    #[test]
    fn test_next_meal_id_passes_existing_ids() {
        let db = Database::open_in_memory().unwrap();
        let far_future = i64::MAX / 2;
        db.insert_meal(d("2025-06-01"), &meal(far_future, "X", "lunch", 1.0))
            .unwrap();
        assert_eq!(db.next_meal_id().unwrap(), far_future + 1);
    }

    #[test]
    fn test_import_meals_skips_duplicates_and_invalid() {
        let db = Database::open_in_memory().unwrap();
        db.insert_meal(d("2025-06-01"), &meal(1, "Existing", "lunch", 100.0))
            .unwrap();

        let mut batch = BTreeMap::new();
        batch.insert(
            "2025-06-01".to_string(),
            vec![
                meal(1, "Existing", "lunch", 100.0),
                meal(2, "New", "dinner", 400.0),
                meal(3, "", "snack", 50.0),
            ],
        );
        batch.insert("not-a-date".to_string(), vec![meal(4, "Lost", "lunch", 1.0)]);
        batch.insert("2025-06-02".to_string(), vec![meal(5, "Next", "lunch", 1.0)]);

        assert_eq!(db.import_meals(&batch).unwrap(), 2);
        assert!(db.get_meal(2).unwrap().is_some());
        assert!(db.get_meal(3).unwrap().is_none());
        assert!(db.get_meal(4).unwrap().is_none());
        assert!(db.get_meal(5).unwrap().is_some());
    }

    #[test]
    fn test_daily_summary_sums_meals() {
        let db = Database::open_in_memory().unwrap();
        let date = d("2025-06-01");
        db.insert_meal(date, &meal(1, "A", "breakfast", 300.0))
            .unwrap();
        db.insert_meal(date, &meal(2, "B", "lunch", 650.5)).unwrap();
        db.insert_meal(d("2025-06-02"), &meal(3, "C", "lunch", 999.0))
            .unwrap();

        let summary = db.get_daily_summary(date).unwrap();
        assert_eq!(summary.date, "2025-06-01");
        assert_eq!(summary.meal_count, 2);
        assert!((summary.totals.calories - 950.5).abs() < 1e-9);
        assert!((summary.totals.protein - 20.0).abs() < 1e-9);
        assert!((summary.totals.fiber - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_daily_summary_empty_date_is_zero_filled() {
        let db = Database::open_in_memory().unwrap();
        let summary = db.get_daily_summary(d("2025-06-01")).unwrap();
        assert_eq!(summary, DailySummary::empty(d("2025-06-01")));
    }

    #[test]
    fn test_daily_summary_tracks_edits() {
        let db = Database::open_in_memory().unwrap();
        let date = d("2025-06-01");
        db.insert_meal(date, &meal(1, "A", "lunch", 300.0)).unwrap();
        db.insert_meal(date, &meal(2, "B", "dinner", 500.0)).unwrap();
        db.update_meal(2, date, &meal(2, "B", "dinner", 200.0))
            .unwrap();
        db.delete_meal(1).unwrap();

        let summary = db.get_daily_summary(date).unwrap();
        assert_eq!(summary.meal_count, 1);
        assert!((summary.totals.calories - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_weekly_summary_only_dates_with_meals() {
        let db = Database::open_in_memory().unwrap();
        db.insert_meal(d("2025-06-03"), &meal(1, "A", "lunch", 300.0))
            .unwrap();
        db.insert_meal(d("2025-06-01"), &meal(2, "B", "lunch", 500.0))
            .unwrap();
        db.insert_meal(d("2025-06-01"), &meal(3, "C", "dinner", 700.0))
            .unwrap();
        db.insert_meal(d("2025-06-09"), &meal(4, "D", "dinner", 700.0))
            .unwrap();

        let rows = db
            .get_weekly_summary(d("2025-06-01"), d("2025-06-07"))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, "2025-06-01");
        assert_eq!(rows[0].meal_count, 2);
        assert!((rows[0].totals.calories - 1200.0).abs() < 1e-9);
        assert_eq!(rows[1].date, "2025-06-03");
        assert_eq!(rows[1].meal_count, 1);
    }

    #[test]
    fn test_weekly_summary_matches_daily_summary() {
        let db = Database::open_in_memory().unwrap();
        for (i, cal) in [250.0, 410.5, 333.3].iter().enumerate() {
            db.insert_meal(
                d("2025-06-04"),
                &meal(i as i64 + 1, "M", "snack", *cal),
            )
            .unwrap();
        }
        let daily = db.get_daily_summary(d("2025-06-04")).unwrap();
        let weekly = db
            .get_weekly_summary(d("2025-06-04"), d("2025-06-04"))
            .unwrap();
        assert_eq!(weekly, vec![daily]);
    }

    #[test]
    fn test_add_and_list_ingredients() {
        let db = Database::open_in_memory().unwrap();
        db.add_ingredient("Grains", "rice", &rice()).unwrap();
        db.add_ingredient(
            "Dairy",
            "paneer",
            &IngredientData {
                name: "Paneer".to_string(),
                measurements: BTreeMap::from([(
                    "100g".to_string(),
                    NutritionTotals::new(265.0, 18.0, 1.2, 21.0, 0.0),
                )]),
            },
        )
        .unwrap();

        let catalog = db.get_all_ingredients().unwrap();
        assert_eq!(catalog.ingredient_count(), 2);
        let grains = &catalog.basic_ingredients["Grains"];
        assert_eq!(grains["rice"], rice());
        assert_eq!(db.get_categories().unwrap(), vec!["Dairy", "Grains"]);
        assert_eq!(db.get_ingredient("Grains", "rice").unwrap(), Some(rice()));
        assert!(db.get_ingredient("Dairy", "rice").unwrap().is_none());
    }

    #[test]
    fn test_ingredient_without_measurements_is_listed() {
        let db = Database::open_in_memory().unwrap();
        let bare = IngredientData {
            name: "Salt".to_string(),
            measurements: BTreeMap::new(),
        };
        db.add_ingredient("Spices", "salt", &bare).unwrap();
        let catalog = db.get_all_ingredients().unwrap();
        assert_eq!(catalog.basic_ingredients["Spices"]["salt"], bare);
    }

    #[test]
    fn test_add_duplicate_ingredient_fails() {
        let db = Database::open_in_memory().unwrap();
        db.add_ingredient("Grains", "rice", &rice()).unwrap();
        assert!(db.add_ingredient("Grains", "rice", &rice()).is_err());
        // Same key in another category is allowed
        db.add_ingredient("Staples", "rice", &rice()).unwrap();
    }

    #[test]
    fn test_update_ingredient_replaces_measurements() {
        let db = Database::open_in_memory().unwrap();
        db.add_ingredient("Grains", "rice", &rice()).unwrap();

        let replacement = IngredientData {
            name: "Brown Rice".to_string(),
            measurements: BTreeMap::from([(
                "1 cup".to_string(),
                NutritionTotals::new(216.0, 5.0, 45.0, 1.8, 3.5),
            )]),
        };
        assert!(db.update_ingredient("Grains", "rice", &replacement).unwrap());
        assert_eq!(
            db.get_ingredient("Grains", "rice").unwrap(),
            Some(replacement.clone())
        );
        assert!(!db.update_ingredient("Grains", "quinoa", &replacement).unwrap());
    }

    #[test]
    fn test_delete_ingredient() {
        let db = Database::open_in_memory().unwrap();
        db.add_ingredient("Grains", "rice", &rice()).unwrap();
        assert_eq!(
            db.delete_ingredient("Grains", "rice").unwrap().as_deref(),
            Some("White Rice")
        );
        assert!(db.delete_ingredient("Grains", "rice").unwrap().is_none());
        assert_eq!(db.get_all_ingredients().unwrap().ingredient_count(), 0);
    }

    #[test]
    fn test_recipe_crud() {
        let db = Database::open_in_memory().unwrap();
        db.add_recipe("dal_tadka", &dal_recipe()).unwrap();
        assert!(db.add_recipe("dal_tadka", &dal_recipe()).is_err());

        let book = db.get_all_recipes().unwrap();
        assert_eq!(book.dishes.len(), 1);
        assert_eq!(book.dishes["dal_tadka"], dal_recipe());

        let mut changed = dal_recipe();
        changed.servings = 2.0;
        changed.ingredients.truncate(1);
        assert!(db.update_recipe("dal_tadka", &changed).unwrap());
        let stored = db.get_recipe("dal_tadka").unwrap().unwrap();
        assert!((stored.servings - 2.0).abs() < f64::EPSILON);
        assert_eq!(stored.ingredients.len(), 1);
        assert!(!db.update_recipe("missing", &changed).unwrap());

        assert!(db.delete_recipe("dal_tadka").unwrap());
        assert!(!db.delete_recipe("dal_tadka").unwrap());
        assert!(db.get_recipe("dal_tadka").unwrap().is_none());
    }
}
