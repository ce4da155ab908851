use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{MealsByDate, NutritionTotals, round1};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    pub total_meals: usize,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub total_fiber: f64,
    pub days_with_data: usize,
    pub avg_calories_per_day: f64,
    pub avg_meals_per_day: f64,
    pub avg_protein_per_day: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayStats {
    pub meals: usize,
    #[serde(flatten)]
    pub totals: NutritionTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealStats {
    pub summary: StatsSummary,
    pub source_counts: BTreeMap<String, usize>,
    pub daily_stats: BTreeMap<String, DayStats>,
    pub date_range: DateRange,
}

/// Counts, totals and per-day figures over `meals`. The reported date
/// range is `start`/`end` when given, else the first and last date present.
pub fn meal_stats(
    meals: &MealsByDate,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> MealStats {
    let mut total = NutritionTotals::default();
    let mut total_meals = 0;
    let mut source_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut daily_stats = BTreeMap::new();

    for (date, day_meals) in meals {
        if day_meals.is_empty() {
            continue;
        }
        let day_total: NutritionTotals = day_meals.iter().map(|m| m.nutrition).sum();
        total += day_total;
        total_meals += day_meals.len();

        for meal in day_meals {
            let source = if meal.source.is_empty() {
                "unknown"
            } else {
                meal.source.as_str()
            };
            *source_counts.entry(source.to_string()).or_default() += 1;
        }

        daily_stats.insert(
            date.clone(),
            DayStats {
                meals: day_meals.len(),
                totals: rounded(day_total),
            },
        );
    }

    let days_with_data = daily_stats.len();
    let per_day = |value: f64| {
        if days_with_data == 0 {
            0.0
        } else {
            value / days_with_data as f64
        }
    };

    let rounded_total = rounded(total);
    let summary = StatsSummary {
        total_meals,
        total_calories: rounded_total.calories,
        total_protein: rounded_total.protein,
        total_carbs: rounded_total.carbs,
        total_fat: rounded_total.fat,
        total_fiber: rounded_total.fiber,
        days_with_data,
        avg_calories_per_day: per_day(total.calories).round(),
        avg_meals_per_day: round1(per_day(total_meals as f64)),
        avg_protein_per_day: round1(per_day(total.protein)),
    };

    let date_range = DateRange {
        start_date: start
            .map(|d| d.format("%Y-%m-%d").to_string())
            .or_else(|| meals.keys().next().cloned()),
        end_date: end
            .map(|d| d.format("%Y-%m-%d").to_string())
            .or_else(|| meals.keys().next_back().cloned()),
    };

    MealStats {
        summary,
        source_counts,
        daily_stats,
        date_range,
    }
}

// Calories to whole kcal, grams to one decimal.
fn rounded(totals: NutritionTotals) -> NutritionTotals {
    NutritionTotals {
        calories: totals.calories.round(),
        ..totals.map(round1)
    }
}
