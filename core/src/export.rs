use std::collections::BTreeMap;

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate};
use rust_xlsxwriter::{Color, Format, FormatAlign, Worksheet};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{Meal, MealsByDate, NutritionTotals, round1};

pub const HEADERS: [&str; 10] = [
    "Date",
    "Time",
    "Meal Description",
    "Calories",
    "Protein (g)",
    "Carbs (g)",
    "Fat (g)",
    "Fiber (g)",
    "Source",
    "Ingredients",
];

const COLUMN_WIDTHS: [f64; 10] = [15.0, 10.0, 40.0, 10.0, 12.0, 12.0, 10.0, 10.0, 15.0, 50.0];

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    fn text(s: &str) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

/// How a row is highlighted in the written sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStyle {
    Plain,
    DailyTotal,
    MonthTotal,
    Average,
}

/// One spreadsheet row. A row with no description and no values is a
/// spacer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportRow {
    pub date: String,
    pub time: String,
    pub description: String,
    pub nutrition: Option<NutritionTotals>,
    pub source: String,
    pub ingredients: String,
}

impl ExportRow {
    pub fn blank() -> Self {
        Self::default()
    }

    fn summary(description: String, nutrition: NutritionTotals, source: &str) -> Self {
        Self {
            description,
            nutrition: Some(nutrition),
            source: source.to_string(),
            ..Self::default()
        }
    }

    pub fn is_blank(&self) -> bool {
        self == &Self::default()
    }

    pub fn style(&self) -> RowStyle {
        if self.nutrition.is_none() {
            return RowStyle::Plain;
        }
        match self.source.as_str() {
            "SUMMARY" => RowStyle::DailyTotal,
            "MONTH TOTAL" => RowStyle::MonthTotal,
            "AVERAGE" => RowStyle::Average,
            _ => RowStyle::Plain,
        }
    }

    fn cells(&self) -> [Cell; 10] {
        let number = |f: fn(&NutritionTotals) -> f64| {
            self.nutrition
                .as_ref()
                .map_or(Cell::Empty, |n| Cell::Number(f(n)))
        };
        [
            Cell::text(&self.date),
            Cell::text(&self.time),
            Cell::text(&self.description),
            number(|n| n.calories),
            number(|n| n.protein),
            number(|n| n.carbs),
            number(|n| n.fat),
            number(|n| n.fiber),
            Cell::text(&self.source),
            Cell::text(&self.ingredients),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    /// Month name, e.g. "June 2025".
    pub name: String,
    pub rows: Vec<ExportRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Portion {
    name: String,
    #[serde(default)]
    quantity: serde_json::Value,
    #[serde(default)]
    measurement: String,
}

fn source_label(source: &str) -> &'static str {
    match source {
        "database" => "Database",
        "ingredients" => "Custom Recipe",
        _ => "Manual Entry",
    }
}

fn format_ingredients(meal: &Meal) -> String {
    let Some(data) = &meal.ingredient_data else {
        return String::new();
    };
    let Ok(portions) = serde_json::from_value::<Vec<Portion>>(data.clone()) else {
        return String::new();
    };
    portions
        .iter()
        .map(|p| {
            let quantity = match &p.quantity {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            format!("{} ({quantity}x {})", p.name, p.measurement)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// Wall-clock time in the timestamp's own offset.
fn format_time(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default()
}

fn meal_row(date_label: &str, meal: &Meal) -> ExportRow {
    ExportRow {
        date: date_label.to_string(),
        time: format_time(&meal.timestamp),
        description: meal.description.clone(),
        nutrition: Some(meal.nutrition),
        source: source_label(&meal.source).to_string(),
        ingredients: format_ingredients(meal),
    }
}

// Calories to whole kcal, grams to one decimal.
fn rounded(totals: NutritionTotals) -> NutritionTotals {
    NutritionTotals {
        calories: totals.calories.round(),
        ..totals.map(round1)
    }
}

fn build_sheet(name: String, days: &BTreeMap<NaiveDate, &Vec<Meal>>) -> Sheet {
    let mut rows = Vec::new();
    let mut month_total = NutritionTotals::default();
    let mut month_meals = 0;

    for (date, meals) in days {
        let label = date.format("%a, %b %-d").to_string();
        let mut day_total = NutritionTotals::default();

        for meal in meals.iter() {
            rows.push(meal_row(&label, meal));
            day_total += meal.nutrition;
        }

        if meals.len() > 1 {
            rows.push(ExportRow::summary(
                format!("Daily Total ({} meals)", meals.len()),
                rounded(day_total),
                "SUMMARY",
            ));
        }
        rows.push(ExportRow::blank());

        month_total += day_total;
        month_meals += meals.len();
    }

    let day_count = days.len() as f64;
    rows.push(ExportRow::blank());
    rows.push(ExportRow::summary(
        format!("{name} TOTAL ({month_meals} meals)"),
        rounded(month_total),
        "MONTH TOTAL",
    ));
    rows.push(ExportRow::summary(
        format!("Daily Average ({} days)", days.len()),
        rounded(month_total.map(|v| v / day_count)),
        "AVERAGE",
    ));

    Sheet { name, rows }
}

/// Lay out meals as one sheet per month. Dates without meals are left
/// out; an input with no meals at all is an error.
pub fn build_workbook(meals: &MealsByDate) -> Result<Workbook> {
    let mut months: BTreeMap<String, BTreeMap<NaiveDate, &Vec<Meal>>> = BTreeMap::new();

    for (key, day_meals) in meals {
        if day_meals.is_empty() {
            continue;
        }
        let Ok(date) = NaiveDate::parse_from_str(key, "%Y-%m-%d") else {
            warn!(date = %key, "skipping meals with invalid date in export");
            continue;
        };
        months
            .entry(date.format("%Y-%m").to_string())
            .or_default()
            .insert(date, day_meals);
    }

    if months.is_empty() {
        bail!("No meal data found for export");
    }

    let sheets = months
        .into_values()
        .map(|days| {
            let name = days
                .keys()
                .next()
                .map(|d| d.format("%B %Y").to_string())
                .unwrap_or_default();
            build_sheet(name, &days)
        })
        .collect();

    Ok(Workbook { sheets })
}

struct Styles {
    header: Format,
    daily_total: Format,
    month_total: Format,
    average: Format,
}

impl Styles {
    fn new() -> Self {
        let blue = Color::RGB(0x0044_72C4);
        Self {
            header: Format::new()
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(blue)
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter),
            daily_total: Format::new()
                .set_bold()
                .set_background_color(Color::RGB(0x00E7_E6E6)),
            month_total: Format::new()
                .set_bold()
                .set_font_size(12)
                .set_font_color(Color::White)
                .set_background_color(blue),
            average: Format::new()
                .set_bold()
                .set_italic()
                .set_background_color(Color::RGB(0x00D9_E2F3)),
        }
    }

    fn for_row(&self, style: RowStyle) -> Option<&Format> {
        match style {
            RowStyle::Plain => None,
            RowStyle::DailyTotal => Some(&self.daily_total),
            RowStyle::MonthTotal => Some(&self.month_total),
            RowStyle::Average => Some(&self.average),
        }
    }
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    format: Option<&Format>,
) -> Result<()> {
    match (cell, format) {
        (Cell::Text(s), Some(f)) => {
            worksheet.write_string_with_format(row, col, s, f)?;
        }
        (Cell::Text(s), None) => {
            worksheet.write_string(row, col, s)?;
        }
        (Cell::Number(n), Some(f)) => {
            worksheet.write_number_with_format(row, col, *n, f)?;
        }
        (Cell::Number(n), None) => {
            worksheet.write_number(row, col, *n)?;
        }
        (Cell::Empty, Some(f)) => {
            worksheet.write_blank(row, col, f)?;
        }
        (Cell::Empty, None) => {}
    }
    Ok(())
}

fn write_sheet(worksheet: &mut Worksheet, sheet: &Sheet, styles: &Styles) -> Result<()> {
    worksheet.set_name(&sheet.name)?;
    for (col, width) in (0u16..).zip(COLUMN_WIDTHS) {
        worksheet.set_column_width(col, width)?;
    }

    for (col, title) in (0u16..).zip(HEADERS) {
        worksheet.write_string_with_format(0, col, title, &styles.header)?;
    }
    worksheet.set_row_height(0, 25)?;
    worksheet.set_freeze_panes(1, 0)?;

    for (row, export_row) in (1u32..).zip(&sheet.rows) {
        let format = styles.for_row(export_row.style());
        for (col, cell) in (0u16..).zip(export_row.cells().iter()) {
            write_cell(worksheet, row, col, cell, format)?;
        }
    }
    Ok(())
}

impl Workbook {
    /// Serialize as an xlsx workbook with one worksheet per month.
    pub fn to_xlsx(&self) -> Result<Vec<u8>> {
        let styles = Styles::new();
        let mut workbook = rust_xlsxwriter::Workbook::new();
        for sheet in &self.sheets {
            write_sheet(workbook.add_worksheet(), sheet, &styles)?;
        }
        let bytes = workbook.save_to_buffer()?;
        debug!(sheets = self.sheets.len(), bytes = bytes.len(), "wrote xlsx workbook");
        Ok(bytes)
    }
}

pub fn export_filename(today: NaiveDate) -> String {
    format!("Food_Diary_Export_{}.xlsx", today.format("%Y-%m-%d"))
}
