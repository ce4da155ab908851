use anyhow::Result;
use chrono::NaiveDate;

use crate::db::Database;
use crate::models::{DailySummary, Meal};

/// Read access the analyzer needs from a meal store.
pub trait NutritionStore {
    /// Totals for a single date; zero-filled when nothing is logged.
    fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary>;

    /// One row per date in `start..=end` with at least one meal, ascending.
    fn weekly_summary(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailySummary>>;

    fn meals_by_date(&self, date: NaiveDate) -> Result<Vec<Meal>>;
}

impl NutritionStore for Database {
    fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary> {
        self.get_daily_summary(date)
    }

    fn weekly_summary(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailySummary>> {
        self.get_weekly_summary(start, end)
    }

    fn meals_by_date(&self, date: NaiveDate) -> Result<Vec<Meal>> {
        self.get_meals_by_date(date)
    }
}
