use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Meals keyed by `YYYY-MM-DD`, ascending.
pub type MealsByDate = BTreeMap<String, Vec<Meal>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NutritionTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
}

impl NutritionTotals {
    #[must_use]
    pub fn new(calories: f64, protein: f64, carbs: f64, fat: f64, fiber: f64) -> Self {
        Self {
            calories,
            protein,
            carbs,
            fat,
            fiber,
        }
    }

    /// Apply `f` to every nutrient.
    #[must_use]
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            calories: f(self.calories),
            protein: f(self.protein),
            carbs: f(self.carbs),
            fat: f(self.fat),
            fiber: f(self.fiber),
        }
    }

    #[must_use]
    pub fn get(&self, nutrient: Nutrient) -> f64 {
        match nutrient {
            Nutrient::Calories => self.calories,
            Nutrient::Protein => self.protein,
            Nutrient::Carbs => self.carbs,
            Nutrient::Fat => self.fat,
            Nutrient::Fiber => self.fiber,
        }
    }
}

impl Add for NutritionTotals {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            calories: self.calories + rhs.calories,
            protein: self.protein + rhs.protein,
            carbs: self.carbs + rhs.carbs,
            fat: self.fat + rhs.fat,
            fiber: self.fiber + rhs.fiber,
        }
    }
}

impl AddAssign for NutritionTotals {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for NutritionTotals {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            calories: self.calories - rhs.calories,
            protein: self.protein - rhs.protein,
            carbs: self.carbs - rhs.carbs,
            fat: self.fat - rhs.fat,
            fiber: self.fiber - rhs.fiber,
        }
    }
}

impl Sum for NutritionTotals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a NutritionTotals> for NutritionTotals {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nutrient {
    Calories,
    Protein,
    Carbs,
    Fat,
    Fiber,
}

impl Nutrient {
    pub const ALL: [Nutrient; 5] = [
        Nutrient::Calories,
        Nutrient::Protein,
        Nutrient::Carbs,
        Nutrient::Fat,
        Nutrient::Fiber,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Nutrient::Calories => "calories",
            Nutrient::Protein => "protein",
            Nutrient::Carbs => "carbs",
            Nutrient::Fat => "fat",
            Nutrient::Fiber => "fiber",
        }
    }

    /// Recommended daily range for an average adult.
    #[must_use]
    pub fn target_range(self) -> TargetRange {
        match self {
            Nutrient::Calories => TargetRange::new(1800.0, 2400.0),
            Nutrient::Protein => TargetRange::new(50.0, 175.0),
            Nutrient::Carbs => TargetRange::new(225.0, 325.0),
            Nutrient::Fat => TargetRange::new(44.0, 78.0),
            Nutrient::Fiber => TargetRange::new(25.0, 38.0),
        }
    }
}

impl fmt::Display for Nutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Nutrient {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        Nutrient::ALL
            .into_iter()
            .find(|n| n.as_str() == lower)
            .ok_or_else(|| anyhow::anyhow!("Unknown nutrient '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetRange {
    pub min: f64,
    pub max: f64,
}

impl TargetRange {
    const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: String,
    pub totals: NutritionTotals,
    pub meal_count: i64,
}

impl DailySummary {
    #[must_use]
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date: date.format("%Y-%m-%d").to_string(),
            totals: NutritionTotals::default(),
            meal_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub id: i64,
    pub description: String,
    #[serde(alias = "mealType")]
    pub meal_type: String,
    pub date: String,
    pub timestamp: String,
    pub source: String,
    pub nutrition: NutritionTotals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredient_data: Option<serde_json::Value>,
}

/// A meal as submitted by a client. The date is supplied separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMeal {
    #[serde(default)]
    pub id: i64,
    pub description: String,
    #[serde(default, alias = "mealType")]
    pub meal_type: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub source: String,
    pub nutrition: NutritionTotals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredient_data: Option<serde_json::Value>,
}

impl From<&Meal> for NewMeal {
    fn from(meal: &Meal) -> Self {
        Self {
            id: meal.id,
            description: meal.description.clone(),
            meal_type: meal.meal_type.clone(),
            timestamp: Some(meal.timestamp.clone()),
            source: meal.source.clone(),
            nutrition: meal.nutrition,
            ingredient_data: meal.ingredient_data.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

// --- Ingredient catalog ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientData {
    pub name: String,
    pub measurements: BTreeMap<String, NutritionTotals>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngredientCatalog {
    #[serde(default)]
    pub basic_ingredients: BTreeMap<String, BTreeMap<String, IngredientData>>,
}

impl IngredientCatalog {
    #[must_use]
    pub fn ingredient_count(&self) -> usize {
        self.basic_ingredients.values().map(BTreeMap::len).sum()
    }
}

// --- Recipes ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub nutrition: NutritionTotals,
}

fn default_servings() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default = "default_servings")]
    pub servings: f64,
    #[serde(default)]
    pub total_per_serving: NutritionTotals,
    #[serde(default)]
    pub ingredients: Vec<RecipeIngredient>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeBook {
    #[serde(default)]
    pub dishes: BTreeMap<String, RecipeData>,
}

// --- Validation ---

pub fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("Invalid date '{s}'. Use YYYY-MM-DD"))
}

pub fn validate_nutrition(nutrition: &NutritionTotals) -> Result<()> {
    for nutrient in Nutrient::ALL {
        let value = nutrition.get(nutrient);
        if !value.is_finite() {
            bail!("{nutrient} must be a finite number");
        }
        if value < 0.0 {
            bail!("{nutrient} must not be negative");
        }
    }
    Ok(())
}

pub fn validate_new_meal(meal: &NewMeal) -> Result<()> {
    if meal.id <= 0 {
        bail!("Meal id must be a positive integer");
    }
    if meal.description.trim().is_empty() {
        bail!("Meal description must not be empty");
    }
    if let Some(ts) = &meal.timestamp {
        chrono::DateTime::parse_from_rfc3339(ts)
            .map_err(|_| anyhow::anyhow!("Invalid timestamp '{ts}'. Must be RFC 3339 format"))?;
    }
    validate_nutrition(&meal.nutrition)
}

pub fn validate_ingredient(category: &str, key: &str, data: &IngredientData) -> Result<()> {
    if category.trim().is_empty() {
        bail!("Category must not be empty");
    }
    if key.trim().is_empty() {
        bail!("Ingredient key must not be empty");
    }
    if data.name.trim().is_empty() {
        bail!("Ingredient name must not be empty");
    }
    for (measurement, nutrition) in &data.measurements {
        if measurement.trim().is_empty() {
            bail!("Measurement names must not be empty");
        }
        validate_nutrition(nutrition)?;
    }
    Ok(())
}

pub fn validate_recipe(key: &str, recipe: &RecipeData) -> Result<()> {
    if key.trim().is_empty() {
        bail!("Recipe key must not be empty");
    }
    if recipe.name.trim().is_empty() {
        bail!("Recipe name must not be empty");
    }
    if recipe.servings <= 0.0 || !recipe.servings.is_finite() {
        bail!("Servings must be greater than 0");
    }
    validate_nutrition(&recipe.total_per_serving)?;
    for ingredient in &recipe.ingredients {
        validate_nutrition(&ingredient.nutrition)?;
    }
    Ok(())
}

/// Round to one decimal place.
#[must_use]
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
