use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::models::{DailySummary, Nutrient, NutritionTotals};
use crate::store::NutritionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Warning,
    Info,
    Success,
    Increase,
    Decrease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Calories,
    Protein,
    Fiber,
    Balance,
    Frequency,
    Variety,
    Consistency,
}

/// A suggestion or insight line. Both lists share this shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub category: Category,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl Suggestion {
    fn new(kind: SuggestionKind, category: Category, message: String) -> Self {
        Self {
            kind,
            category,
            message,
            recommendation: None,
        }
    }

    fn recommend(mut self, recommendation: &str) -> Self {
        self.recommendation = Some(recommendation.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Period {
    pub start_date: String,
    pub end_date: String,
    pub days: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternData {
    pub period: Period,
    pub averages: NutritionTotals,
    pub totals: NutritionTotals,
    pub daily_data: Vec<DailySummary>,
}

/// Averages and totals over a date range. `data` is absent when the
/// range holds no logged meals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionPattern {
    pub has_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub data: Option<PatternData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacroShare {
    pub grams: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacroBreakdown {
    pub protein: MacroShare,
    pub carbs: MacroShare,
    pub fat: MacroShare,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionReport {
    pub date: String,
    pub summary: DailySummary,
    pub suggestions: Vec<Suggestion>,
    pub insights: Vec<Suggestion>,
    pub macro_breakdown: MacroBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressData {
    pub period: &'static str,
    pub averages: NutritionTotals,
    pub suggestions: Vec<Suggestion>,
    pub daily_data: Vec<DailySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyProgress {
    pub has_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub data: Option<ProgressData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Comparison {
    NoData {
        has_data: bool,
        message: String,
    },
    NoPrevious {
        has_comparison: bool,
        message: String,
        current: NutritionPattern,
    },
    Compared {
        has_comparison: bool,
        current: NutritionPattern,
        previous: NutritionPattern,
        changes: NutritionTotals,
        insights: Vec<Suggestion>,
    },
}

const PROTEIN_KCAL_PER_G: f64 = 4.0;
const CARBS_KCAL_PER_G: f64 = 4.0;
const FAT_KCAL_PER_G: f64 = 9.0;

/// Rule-based analysis over a [`NutritionStore`]. Holds no state of its
/// own; every call reads the store again.
pub struct Analyzer<'a, S: NutritionStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: NutritionStore + ?Sized> Analyzer<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn analyze_nutrition_pattern(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<NutritionPattern> {
        let summaries = self.store.weekly_summary(start, end)?;

        if summaries.is_empty() {
            return Ok(NutritionPattern {
                has_data: false,
                message: Some("No data available for the selected date range.".to_string()),
                data: None,
            });
        }

        let totals: NutritionTotals = summaries.iter().map(|s| s.totals).sum();
        let days = summaries.len();
        let averages = totals.map(|v| (v / days as f64).round());

        Ok(NutritionPattern {
            has_data: true,
            message: None,
            data: Some(PatternData {
                period: Period {
                    start_date: start.format("%Y-%m-%d").to_string(),
                    end_date: end.format("%Y-%m-%d").to_string(),
                    days,
                },
                averages,
                totals,
                daily_data: summaries,
            }),
        })
    }

    pub fn generate_suggestions(&self, date: NaiveDate) -> Result<SuggestionReport> {
        let summary = self.store.daily_summary(date)?;
        let meals = self.store.meals_by_date(date)?;
        let t = summary.totals;

        let mut suggestions = Vec::new();
        let mut insights = Vec::new();

        let calories = Nutrient::Calories.target_range();
        if t.calories < calories.min {
            suggestions.push(
                Suggestion::new(
                    SuggestionKind::Warning,
                    Category::Calories,
                    format!(
                        "Your calorie intake ({} kcal) is below the recommended minimum of {} kcal.",
                        whole(t.calories),
                        whole(calories.min)
                    ),
                )
                .recommend(
                    "Consider adding nutrient-dense foods like nuts, avocados, or whole grains to meet your energy needs.",
                ),
            );
        } else if t.calories > calories.max {
            suggestions.push(
                Suggestion::new(
                    SuggestionKind::Info,
                    Category::Calories,
                    format!(
                        "Your calorie intake ({} kcal) exceeds the typical recommendation of {} kcal.",
                        whole(t.calories),
                        whole(calories.max)
                    ),
                )
                .recommend(
                    "Monitor portion sizes and consider reducing high-calorie processed foods if weight management is a goal.",
                ),
            );
        } else {
            insights.push(Suggestion::new(
                SuggestionKind::Success,
                Category::Calories,
                format!(
                    "Great! Your calorie intake ({} kcal) is within the recommended range.",
                    whole(t.calories)
                ),
            ));
        }

        // Only the minimum is checked for protein
        if t.protein < Nutrient::Protein.target_range().min {
            suggestions.push(
                Suggestion::new(
                    SuggestionKind::Warning,
                    Category::Protein,
                    format!(
                        "Your protein intake ({}g) is below the recommended minimum.",
                        whole(t.protein)
                    ),
                )
                .recommend(
                    "Add protein-rich foods like lentils, chickpeas, tofu, eggs, or Greek yogurt to your meals.",
                ),
            );
        } else {
            insights.push(Suggestion::new(
                SuggestionKind::Success,
                Category::Protein,
                format!(
                    "Excellent protein intake ({}g)! Protein helps with muscle maintenance and satiety.",
                    whole(t.protein)
                ),
            ));
        }

        let fiber_min = Nutrient::Fiber.target_range().min;
        if t.fiber < fiber_min {
            suggestions.push(
                Suggestion::new(
                    SuggestionKind::Warning,
                    Category::Fiber,
                    format!(
                        "Your fiber intake ({}g) is below the recommended {}g.",
                        whole(t.fiber),
                        whole(fiber_min)
                    ),
                )
                .recommend(
                    "Increase fiber by eating more vegetables, fruits, whole grains, and legumes. Fiber aids digestion and heart health.",
                ),
            );
        } else {
            insights.push(Suggestion::new(
                SuggestionKind::Success,
                Category::Fiber,
                format!(
                    "Great fiber intake ({}g)! This supports digestive health.",
                    whole(t.fiber)
                ),
            ));
        }

        let total_calories = t.calories.max(1.0);
        let protein_pct = t.protein * PROTEIN_KCAL_PER_G / total_calories * 100.0;
        let carbs_pct = t.carbs * CARBS_KCAL_PER_G / total_calories * 100.0;
        let fat_pct = t.fat * FAT_KCAL_PER_G / total_calories * 100.0;

        if carbs_pct > 70.0 {
            suggestions.push(
                Suggestion::new(
                    SuggestionKind::Info,
                    Category::Balance,
                    format!(
                        "Your diet is high in carbohydrates ({}% of calories).",
                        whole(carbs_pct)
                    ),
                )
                .recommend("Consider balancing with more protein and healthy fats for sustained energy."),
            );
        }

        if fat_pct < 20.0 {
            suggestions.push(
                Suggestion::new(
                    SuggestionKind::Info,
                    Category::Balance,
                    format!(
                        "Your fat intake is relatively low ({}% of calories).",
                        whole(fat_pct)
                    ),
                )
                .recommend(
                    "Include healthy fats from sources like nuts, seeds, olive oil, and avocados for better nutrient absorption.",
                ),
            );
        }

        if summary.meal_count < 2 {
            suggestions.push(
                Suggestion::new(
                    SuggestionKind::Info,
                    Category::Frequency,
                    "You logged fewer than 2 meals today.".to_string(),
                )
                .recommend(
                    "Regular meals help maintain stable energy levels. Aim for 3 balanced meals or 2-3 main meals with healthy snacks.",
                ),
            );
        }

        let mut meal_types: Vec<&str> = Vec::new();
        for meal in &meals {
            if !meal_types.contains(&meal.meal_type.as_str()) {
                meal_types.push(&meal.meal_type);
            }
        }
        insights.push(Suggestion::new(
            SuggestionKind::Info,
            Category::Variety,
            format!(
                "You logged {} meal(s) across {} meal type(s): {}.",
                summary.meal_count,
                meal_types.len(),
                meal_types.join(", ")
            ),
        ));

        let macro_breakdown = MacroBreakdown {
            protein: MacroShare {
                grams: t.protein.round(),
                percent: protein_pct.round(),
            },
            carbs: MacroShare {
                grams: t.carbs.round(),
                percent: carbs_pct.round(),
            },
            fat: MacroShare {
                grams: t.fat.round(),
                percent: fat_pct.round(),
            },
        };

        Ok(SuggestionReport {
            date: date.format("%Y-%m-%d").to_string(),
            summary,
            suggestions,
            insights,
            macro_breakdown,
        })
    }

    /// Progress over the week ending on `today`, inclusive of both ends.
    pub fn weekly_progress(&self, today: NaiveDate) -> Result<WeeklyProgress> {
        let analysis = self.analyze_nutrition_pattern(today - Duration::days(7), today)?;

        let Some(data) = analysis.data else {
            return Ok(WeeklyProgress {
                has_data: false,
                message: Some("No data available for the past week.".to_string()),
                data: None,
            });
        };

        let mut suggestions = Vec::new();
        let logged_days = data.daily_data.len();

        if logged_days < 5 {
            suggestions.push(
                Suggestion::new(
                    SuggestionKind::Info,
                    Category::Consistency,
                    format!("You've logged meals on {logged_days} out of 7 days."),
                )
                .recommend("Try to log meals consistently for better tracking and insights."),
            );
        }

        if data.averages.calories < Nutrient::Calories.target_range().min {
            suggestions.push(
                Suggestion::new(
                    SuggestionKind::Warning,
                    Category::Calories,
                    "Your average daily calorie intake is below recommendations.".to_string(),
                )
                .recommend("Focus on regular, balanced meals to meet your energy needs."),
            );
        }

        if data.averages.fiber < Nutrient::Fiber.target_range().min {
            suggestions.push(
                Suggestion::new(
                    SuggestionKind::Warning,
                    Category::Fiber,
                    "Your average fiber intake could be improved.".to_string(),
                )
                .recommend("Incorporate more vegetables, fruits, and whole grains throughout the week."),
            );
        }

        Ok(WeeklyProgress {
            has_data: true,
            message: None,
            data: Some(ProgressData {
                period: "7 days",
                averages: data.averages,
                suggestions,
                daily_data: data.daily_data,
            }),
        })
    }

    /// Compare `start..=end` with the equally long period ending the day
    /// before `start`.
    pub fn compare_with_previous(&self, start: NaiveDate, end: NaiveDate) -> Result<Comparison> {
        let current = self.analyze_nutrition_pattern(start, end)?;
        let Some(current_data) = current.data.as_ref() else {
            return Ok(Comparison::NoData {
                has_data: false,
                message: "Insufficient data for comparison".to_string(),
            });
        };

        let (prev_start, prev_end) = previous_period(start, end);
        let previous = self.analyze_nutrition_pattern(prev_start, prev_end)?;
        let Some(previous_data) = previous.data.as_ref() else {
            return Ok(Comparison::NoPrevious {
                has_comparison: false,
                message: "No previous period data for comparison".to_string(),
                current,
            });
        };

        let changes = current_data.averages - previous_data.averages;
        let mut insights = Vec::new();

        if changes.calories.abs() > 100.0 {
            let (kind, verb) = if changes.calories > 0.0 {
                (SuggestionKind::Increase, "increased")
            } else {
                (SuggestionKind::Decrease, "decreased")
            };
            insights.push(Suggestion::new(
                kind,
                Category::Calories,
                format!(
                    "Your average daily calories {verb} by {} kcal compared to the previous period.",
                    whole(changes.calories).abs()
                ),
            ));
        }

        if changes.protein > 10.0 {
            insights.push(Suggestion::new(
                SuggestionKind::Increase,
                Category::Protein,
                format!(
                    "Great! Your protein intake increased by {}g per day.",
                    whole(changes.protein)
                ),
            ));
        } else if changes.protein < -10.0 {
            insights.push(Suggestion::new(
                SuggestionKind::Decrease,
                Category::Protein,
                format!(
                    "Your protein intake decreased by {}g per day. Consider adding protein-rich foods.",
                    whole(changes.protein).abs()
                ),
            ));
        }

        // No decrease branch for fiber
        if changes.fiber > 5.0 {
            insights.push(Suggestion::new(
                SuggestionKind::Increase,
                Category::Fiber,
                format!(
                    "Excellent! Your fiber intake increased by {}g per day.",
                    whole(changes.fiber)
                ),
            ));
        }

        Ok(Comparison::Compared {
            has_comparison: true,
            current,
            previous,
            changes,
            insights,
        })
    }
}

/// The period of equal length that ends the day before `start`.
pub fn previous_period(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let days_diff = (end - start).num_days();
    let prev_end = start - Duration::days(1);
    let prev_start = prev_end - Duration::days(days_diff);
    (prev_start, prev_end)
}

const PROTEIN_FOODS: &[&str] = &[
    "Lentils (toor dal, moong dal) - excellent protein source",
    "Chickpeas (chana) - versatile and protein-rich",
    "Paneer - Indian cottage cheese, high in protein",
    "Greek yogurt or hung curd - probiotic-rich protein",
    "Eggs - complete protein with all essential amino acids",
    "Tofu or soy products - plant-based complete protein",
];

const FIBER_FOODS: &[&str] = &[
    "Whole wheat chapati instead of white rice",
    "Oats upma or dalia for breakfast",
    "Mixed vegetable sabzi with leafy greens",
    "Fresh fruits like apple, pear, or guava",
    "Brown rice or quinoa instead of white rice",
    "Sprouts (moong, chana) - fiber and protein rich",
];

const CALORIE_FOODS: &[&str] = &[
    "Nuts and seeds (almonds, walnuts, pumpkin seeds)",
    "Ghee or coconut oil in moderation",
    "Banana or dates for natural energy",
    "Whole grain bread with nut butter",
    "Smoothie with banana, oats, and milk",
    "Energy balls made with dates and nuts",
];

const FAT_FOODS: &[&str] = &[
    "Avocado or avocado toast",
    "Nuts (almonds, cashews, walnuts)",
    "Seeds (chia, flax, pumpkin)",
    "Olive oil or coconut oil for cooking",
    "Fatty fish like salmon (if non-vegetarian)",
    "Nut butters (peanut, almond)",
];

const CARB_FOODS: &[&str] = &[
    "Whole grains (brown rice, quinoa, oats)",
    "Sweet potato or regular potato",
    "Whole wheat bread or chapati",
    "Fruits (banana, mango, apple)",
    "Legumes (rajma, chole)",
    "Idli or dosa made from whole grains",
];

pub fn foods_for(nutrient: Nutrient) -> &'static [&'static str] {
    match nutrient {
        Nutrient::Protein => PROTEIN_FOODS,
        Nutrient::Fiber => FIBER_FOODS,
        Nutrient::Calories => CALORIE_FOODS,
        Nutrient::Fat => FAT_FOODS,
        Nutrient::Carbs => CARB_FOODS,
    }
}

/// Food suggestions for each named nutrient. Names that are not a known
/// nutrient are skipped.
pub fn food_recommendations<T: AsRef<str>>(
    deficient: &[T],
) -> BTreeMap<Nutrient, &'static [&'static str]> {
    deficient
        .iter()
        .filter_map(|name| name.as_ref().parse::<Nutrient>().ok())
        .map(|nutrient| (nutrient, foods_for(nutrient)))
        .collect()
}

fn whole(value: f64) -> i64 {
    value.round() as i64
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::db::Database;
    use crate::models::{Meal, NewMeal};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn day(date: &str, totals: NutritionTotals, meal_count: i64) -> DailySummary {
        DailySummary {
            date: date.to_string(),
            totals,
            meal_count,
        }
    }

    fn meal_of_type(id: i64, date: &str, meal_type: &str) -> Meal {
        Meal {
            id,
            description: format!("meal {id}"),
            meal_type: meal_type.to_string(),
            date: date.to_string(),
            timestamp: format!("{date}T12:00:00+00:00"),
            source: "manual".to_string(),
            nutrition: NutritionTotals::default(),
            ingredient_data: None,
        }
    }

    /// Serves fixed rows and records the order of store reads.
    #[derive(Default)]
    struct FixedStore {
        days: Vec<DailySummary>,
        meals: Vec<Meal>,
        calls: RefCell<Vec<&'static str>>,
    }

    impl NutritionStore for FixedStore {
        fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary> {
            self.calls.borrow_mut().push("daily_summary");
            let key = date.format("%Y-%m-%d").to_string();
            Ok(self
                .days
                .iter()
                .find(|s| s.date == key)
                .cloned()
                .unwrap_or_else(|| DailySummary::empty(date)))
        }

        fn weekly_summary(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailySummary>> {
            self.calls.borrow_mut().push("weekly_summary");
            Ok(self
                .days
                .iter()
                .filter(|s| {
                    let date = d(&s.date);
                    date >= start && date <= end
                })
                .cloned()
                .collect())
        }

        fn meals_by_date(&self, date: NaiveDate) -> Result<Vec<Meal>> {
            self.calls.borrow_mut().push("meals_by_date");
            let key = date.format("%Y-%m-%d").to_string();
            Ok(self.meals.iter().filter(|m| m.date == key).cloned().collect())
        }
    }

    struct FailingStore;

    impl NutritionStore for FailingStore {
        fn daily_summary(&self, _date: NaiveDate) -> Result<DailySummary> {
            anyhow::bail!("store offline")
        }

        fn weekly_summary(&self, _start: NaiveDate, _end: NaiveDate) -> Result<Vec<DailySummary>> {
            anyhow::bail!("store offline")
        }

        fn meals_by_date(&self, _date: NaiveDate) -> Result<Vec<Meal>> {
            anyhow::bail!("store offline")
        }
    }

    fn calories_only(calories: f64) -> NutritionTotals {
        NutritionTotals::new(calories, 0.0, 0.0, 0.0, 0.0)
    }

    fn week_store() -> FixedStore {
        let calories = [2000.0, 2100.0, 1900.0, 2200.0, 2000.0, 2050.0, 1950.0];
        FixedStore {
            days: calories
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    day(
                        &format!("2025-06-{:02}", i + 1),
                        NutritionTotals::new(*c, 60.0, 250.0, 60.0, 20.0),
                        3,
                    )
                })
                .collect(),
            ..FixedStore::default()
        }
    }

    #[test]
    fn test_pattern_averages_week() {
        let store = week_store();
        let analyzer = Analyzer::new(&store);
        let pattern = analyzer
            .analyze_nutrition_pattern(d("2025-06-01"), d("2025-06-07"))
            .unwrap();

        assert!(pattern.has_data);
        let data = pattern.data.unwrap();
        assert_eq!(data.period.days, 7);
        assert_eq!(data.period.start_date, "2025-06-01");
        assert_eq!(data.period.end_date, "2025-06-07");
        assert!((data.averages.calories - 2029.0).abs() < f64::EPSILON);
        assert!((data.totals.calories - 14200.0).abs() < f64::EPSILON);
        assert_eq!(data.daily_data.len(), 7);
    }

    #[test]
    fn test_pattern_totals_not_rounded() {
        let store = FixedStore {
            days: vec![
                day("2025-06-01", calories_only(100.4), 1),
                day("2025-06-02", calories_only(100.3), 1),
            ],
            ..FixedStore::default()
        };
        let pattern = Analyzer::new(&store)
            .analyze_nutrition_pattern(d("2025-06-01"), d("2025-06-02"))
            .unwrap();
        let data = pattern.data.unwrap();
        assert!((data.totals.calories - 200.7).abs() < 1e-9);
        assert!((data.averages.calories - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pattern_average_rounds_half_up() {
        let store = FixedStore {
            days: vec![
                day("2025-06-01", calories_only(1.0), 1),
                day("2025-06-02", calories_only(2.0), 1),
            ],
            ..FixedStore::default()
        };
        let pattern = Analyzer::new(&store)
            .analyze_nutrition_pattern(d("2025-06-01"), d("2025-06-02"))
            .unwrap();
        assert!((pattern.data.unwrap().averages.calories - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pattern_empty_range() {
        let store = FixedStore::default();
        let pattern = Analyzer::new(&store)
            .analyze_nutrition_pattern(d("2025-06-01"), d("2025-06-07"))
            .unwrap();
        assert!(!pattern.has_data);
        assert!(pattern.data.is_none());

        let json = serde_json::to_value(&pattern).unwrap();
        assert_eq!(json["has_data"], false);
        assert_eq!(
            json["message"],
            "No data available for the selected date range."
        );
        assert!(json.get("averages").is_none());
        assert!(json.get("totals").is_none());
    }

    #[test]
    fn test_pattern_json_shape() {
        let store = week_store();
        let pattern = Analyzer::new(&store)
            .analyze_nutrition_pattern(d("2025-06-01"), d("2025-06-07"))
            .unwrap();
        let json = serde_json::to_value(&pattern).unwrap();
        assert_eq!(json["has_data"], true);
        assert!(json.get("message").is_none());
        assert_eq!(json["period"]["days"], 7);
        assert_eq!(json["averages"]["calories"], 2029.0);
        assert_eq!(json["daily_data"].as_array().unwrap().len(), 7);
    }

    #[test]
    fn test_suggestions_low_calories() {
        let store = FixedStore {
            days: vec![day(
                "2025-06-01",
                NutritionTotals::new(1500.0, 60.0, 150.0, 50.0, 30.0),
                3,
            )],
            ..FixedStore::default()
        };
        let report = Analyzer::new(&store)
            .generate_suggestions(d("2025-06-01"))
            .unwrap();

        let calorie: Vec<&Suggestion> = report
            .suggestions
            .iter()
            .filter(|s| s.category == Category::Calories)
            .collect();
        assert_eq!(calorie.len(), 1);
        assert_eq!(calorie[0].kind, SuggestionKind::Warning);
        assert!(calorie[0].message.contains("1500"));
        assert!(calorie[0].message.contains("1800"));
        assert!(calorie[0].recommendation.is_some());
        assert!(!report.insights.iter().any(|s| s.category == Category::Calories));
    }

    #[test]
    fn test_suggestions_high_calories_is_info() {
        let store = FixedStore {
            days: vec![day(
                "2025-06-01",
                NutritionTotals::new(2600.0, 80.0, 300.0, 90.0, 30.0),
                3,
            )],
            ..FixedStore::default()
        };
        let report = Analyzer::new(&store)
            .generate_suggestions(d("2025-06-01"))
            .unwrap();
        assert_eq!(report.suggestions[0].kind, SuggestionKind::Info);
        assert_eq!(report.suggestions[0].category, Category::Calories);
        assert!(report.suggestions[0].message.contains("2400"));
    }

    #[test]
    fn test_suggestions_balanced_day_order() {
        let store = FixedStore {
            days: vec![day(
                "2025-06-01",
                NutritionTotals::new(2000.0, 80.0, 250.0, 70.0, 30.0),
                3,
            )],
            meals: vec![
                meal_of_type(1, "2025-06-01", "breakfast"),
                meal_of_type(2, "2025-06-01", "lunch"),
                meal_of_type(3, "2025-06-01", "breakfast"),
            ],
            ..FixedStore::default()
        };
        let report = Analyzer::new(&store)
            .generate_suggestions(d("2025-06-01"))
            .unwrap();

        assert!(report.suggestions.is_empty());
        let categories: Vec<Category> = report.insights.iter().map(|s| s.category).collect();
        assert_eq!(
            categories,
            vec![
                Category::Calories,
                Category::Protein,
                Category::Fiber,
                Category::Variety
            ]
        );
        assert_eq!(
            report.insights[3].message,
            "You logged 3 meal(s) across 2 meal type(s): breakfast, lunch."
        );
        assert_eq!(report.insights[3].kind, SuggestionKind::Info);
    }

    #[test]
    fn test_suggestions_empty_day() {
        let store = FixedStore::default();
        let report = Analyzer::new(&store)
            .generate_suggestions(d("2025-06-01"))
            .unwrap();

        let categories: Vec<Category> = report.suggestions.iter().map(|s| s.category).collect();
        assert_eq!(
            categories,
            vec![
                Category::Calories,
                Category::Protein,
                Category::Fiber,
                Category::Balance,
                Category::Frequency
            ]
        );
        // Zero calories uses a divisor of 1
        assert!((report.macro_breakdown.fat.percent - 0.0).abs() < f64::EPSILON);
        assert_eq!(
            report.insights[0].message,
            "You logged 0 meal(s) across 0 meal type(s): ."
        );
    }

    #[test]
    fn test_low_protein_warns() {
        let store = FixedStore {
            days: vec![day(
                "2025-06-01",
                NutritionTotals::new(2000.0, 49.6, 250.0, 70.0, 30.0),
                3,
            )],
            ..FixedStore::default()
        };
        let report = Analyzer::new(&store)
            .generate_suggestions(d("2025-06-01"))
            .unwrap();
        let protein = report
            .suggestions
            .iter()
            .find(|s| s.category == Category::Protein)
            .unwrap();
        assert_eq!(protein.kind, SuggestionKind::Warning);
        assert_eq!(
            protein.message,
            "Your protein intake (50g) is below the recommended minimum."
        );
    }

    #[test]
    fn test_very_high_protein_is_still_success() {
        let store = FixedStore {
            days: vec![day(
                "2025-06-01",
                NutritionTotals::new(2000.0, 300.0, 100.0, 60.0, 30.0),
                3,
            )],
            ..FixedStore::default()
        };
        let report = Analyzer::new(&store)
            .generate_suggestions(d("2025-06-01"))
            .unwrap();
        let protein = report
            .insights
            .iter()
            .find(|s| s.category == Category::Protein)
            .unwrap();
        assert_eq!(protein.kind, SuggestionKind::Success);
        assert!(protein.message.contains("300g"));
    }

    #[test]
    fn test_macro_breakdown_floors_calories_at_one() {
        let store = FixedStore {
            days: vec![day(
                "2025-06-01",
                NutritionTotals::new(0.5, 1.0, 1.0, 1.0, 0.0),
                1,
            )],
            ..FixedStore::default()
        };
        let report = Analyzer::new(&store)
            .generate_suggestions(d("2025-06-01"))
            .unwrap();
        let m = report.macro_breakdown;
        assert!((m.protein.percent - 400.0).abs() < f64::EPSILON);
        assert!((m.carbs.percent - 400.0).abs() < f64::EPSILON);
        assert!((m.fat.percent - 900.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_macro_breakdown_atwater() {
        let store = FixedStore {
            days: vec![day(
                "2025-06-01",
                NutritionTotals::new(2000.0, 100.0, 400.0, 20.0, 30.0),
                3,
            )],
            ..FixedStore::default()
        };
        let report = Analyzer::new(&store)
            .generate_suggestions(d("2025-06-01"))
            .unwrap();
        let m = report.macro_breakdown;
        assert!((m.protein.percent - 20.0).abs() < f64::EPSILON);
        assert!((m.carbs.percent - 80.0).abs() < f64::EPSILON);
        assert!((m.fat.percent - 9.0).abs() < f64::EPSILON);
        assert!((m.carbs.grams - 400.0).abs() < f64::EPSILON);

        let balance: Vec<&str> = report
            .suggestions
            .iter()
            .filter(|s| s.category == Category::Balance)
            .map(|s| s.message.as_str())
            .collect();
        assert_eq!(
            balance,
            vec![
                "Your diet is high in carbohydrates (80% of calories).",
                "Your fat intake is relatively low (9% of calories)."
            ]
        );
    }

    #[test]
    fn test_suggestions_read_summary_before_meals() {
        let store = FixedStore::default();
        Analyzer::new(&store)
            .generate_suggestions(d("2025-06-01"))
            .unwrap();
        assert_eq!(
            *store.calls.borrow(),
            vec!["daily_summary", "meals_by_date"]
        );
    }

    #[test]
    fn test_report_json_shape() {
        let store = FixedStore::default();
        let report = Analyzer::new(&store)
            .generate_suggestions(d("2025-06-01"))
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["date"], "2025-06-01");
        assert_eq!(json["suggestions"][0]["type"], "warning");
        assert_eq!(json["suggestions"][0]["category"], "calories");
        assert!(json["macro_breakdown"]["protein"]["grams"].is_number());
        assert!(json["insights"][0].get("recommendation").is_none());
    }

    #[test]
    fn test_food_recommendations_skips_unknown() {
        let recs = food_recommendations(&["protein", "unknownNutrient"]);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[&Nutrient::Protein].len(), 6);

        let json = serde_json::to_value(&recs).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["protein"]);
    }

    #[test]
    fn test_food_recommendations_all() {
        let recs = food_recommendations(&["fiber", "calories", "fat", "carbs", "protein"]);
        assert_eq!(recs.len(), 5);
        assert!(recs.values().all(|foods| foods.len() == 6));
        assert!(food_recommendations::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_weekly_progress_window_is_eight_days() {
        let store = week_store();
        let progress = Analyzer::new(&store)
            .weekly_progress(d("2025-06-08"))
            .unwrap();
        let data = progress.data.unwrap();
        // 2025-06-01 is today - 7 and still counted
        assert_eq!(data.daily_data.len(), 7);
        assert_eq!(data.period, "7 days");
        // fiber average is 20
        assert_eq!(data.suggestions.len(), 1);
        assert_eq!(data.suggestions[0].category, Category::Fiber);
    }

    #[test]
    fn test_weekly_progress_sparse_low_week() {
        let store = FixedStore {
            days: vec![
                day("2025-06-05", NutritionTotals::new(1200.0, 40.0, 150.0, 40.0, 10.0), 2),
                day("2025-06-06", NutritionTotals::new(1400.0, 40.0, 150.0, 40.0, 12.0), 2),
            ],
            ..FixedStore::default()
        };
        let progress = Analyzer::new(&store)
            .weekly_progress(d("2025-06-07"))
            .unwrap();
        let data = progress.data.unwrap();
        let kinds: Vec<(Category, SuggestionKind)> =
            data.suggestions.iter().map(|s| (s.category, s.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (Category::Consistency, SuggestionKind::Info),
                (Category::Calories, SuggestionKind::Warning),
                (Category::Fiber, SuggestionKind::Warning)
            ]
        );
        assert_eq!(
            data.suggestions[0].message,
            "You've logged meals on 2 out of 7 days."
        );
    }

    #[test]
    fn test_weekly_progress_no_data() {
        let store = FixedStore::default();
        let progress = Analyzer::new(&store)
            .weekly_progress(d("2025-06-07"))
            .unwrap();
        assert!(!progress.has_data);
        assert_eq!(
            progress.message.as_deref(),
            Some("No data available for the past week.")
        );
    }

    #[test]
    fn test_previous_period_equal_length() {
        let (start, end) = previous_period(d("2025-06-08"), d("2025-06-14"));
        assert_eq!(start, d("2025-06-01"));
        assert_eq!(end, d("2025-06-07"));

        let (start, end) = previous_period(d("2025-03-01"), d("2025-03-01"));
        assert_eq!(start, d("2025-02-28"));
        assert_eq!(end, d("2025-02-28"));
    }

    #[test]
    fn test_compare_protein_increase() {
        let store = FixedStore {
            days: vec![
                day("2025-06-01", NutritionTotals::new(2000.0, 55.0, 250.0, 60.0, 25.0), 3),
                day("2025-06-08", NutritionTotals::new(2000.0, 70.0, 250.0, 60.0, 25.0), 3),
            ],
            ..FixedStore::default()
        };
        let comparison = Analyzer::new(&store)
            .compare_with_previous(d("2025-06-08"), d("2025-06-14"))
            .unwrap();

        let Comparison::Compared {
            changes, insights, ..
        } = comparison
        else {
            panic!("expected a comparison");
        };
        assert!((changes.protein - 15.0).abs() < f64::EPSILON);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].kind, SuggestionKind::Increase);
        assert_eq!(insights[0].category, Category::Protein);
        assert_eq!(
            insights[0].message,
            "Great! Your protein intake increased by 15g per day."
        );
    }

    #[test]
    fn test_compare_decreases() {
        let store = FixedStore {
            days: vec![
                day("2025-06-01", NutritionTotals::new(2300.0, 80.0, 250.0, 60.0, 30.0), 3),
                day("2025-06-08", NutritionTotals::new(2000.0, 60.0, 250.0, 60.0, 20.0), 3),
            ],
            ..FixedStore::default()
        };
        let comparison = Analyzer::new(&store)
            .compare_with_previous(d("2025-06-08"), d("2025-06-14"))
            .unwrap();
        let Comparison::Compared { insights, .. } = comparison else {
            panic!("expected a comparison");
        };
        let messages: Vec<&str> = insights.iter().map(|s| s.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Your average daily calories decreased by 300 kcal compared to the previous period.",
                "Your protein intake decreased by 20g per day. Consider adding protein-rich foods."
            ]
        );
        assert!(insights.iter().all(|s| s.kind == SuggestionKind::Decrease));
    }

    #[test]
    fn test_compare_without_previous() {
        let store = FixedStore {
            days: vec![day("2025-06-08", calories_only(2000.0), 2)],
            ..FixedStore::default()
        };
        let comparison = Analyzer::new(&store)
            .compare_with_previous(d("2025-06-08"), d("2025-06-14"))
            .unwrap();
        let json = serde_json::to_value(&comparison).unwrap();
        assert_eq!(json["has_comparison"], false);
        assert_eq!(json["message"], "No previous period data for comparison");
        assert_eq!(json["current"]["has_data"], true);
    }

    #[test]
    fn test_compare_without_current() {
        let store = FixedStore {
            days: vec![day("2025-06-01", calories_only(2000.0), 2)],
            ..FixedStore::default()
        };
        let comparison = Analyzer::new(&store)
            .compare_with_previous(d("2025-06-08"), d("2025-06-14"))
            .unwrap();
        assert_eq!(
            comparison,
            Comparison::NoData {
                has_data: false,
                message: "Insufficient data for comparison".to_string()
            }
        );
    }

    #[test]
    fn test_store_errors_propagate() {
        let analyzer = Analyzer::new(&FailingStore);
        let err = analyzer
            .generate_suggestions(d("2025-06-01"))
            .unwrap_err();
        assert_eq!(err.to_string(), "store offline");
        assert!(analyzer.weekly_progress(d("2025-06-01")).is_err());
        assert!(
            analyzer
                .compare_with_previous(d("2025-06-01"), d("2025-06-07"))
                .is_err()
        );
    }

    #[test]
    fn test_against_database() {
        let db = Database::open_in_memory().unwrap();
        let date = d("2025-06-01");
        for (id, meal_type, calories) in [(1, "breakfast", 400.0), (2, "dinner", 900.0)] {
            db.insert_meal(
                date,
                &NewMeal {
                    id,
                    description: "food".to_string(),
                    meal_type: meal_type.to_string(),
                    timestamp: None,
                    source: "manual".to_string(),
                    nutrition: NutritionTotals::new(calories, 30.0, 100.0, 30.0, 10.0),
                    ingredient_data: None,
                },
            )
            .unwrap();
        }

        let report = Analyzer::new(&db).generate_suggestions(date).unwrap();
        assert_eq!(report.summary.meal_count, 2);
        assert!(report.suggestions[0].message.contains("1300"));
        assert_eq!(
            report.insights.last().unwrap().message,
            "You logged 2 meal(s) across 2 meal type(s): breakfast, dinner."
        );
    }
}
