use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use nosh_core::analyzer::{
    Analyzer, Comparison, SuggestionReport, WeeklyProgress, food_recommendations,
};
use nosh_core::chat::{ChatReply, ChatRequest, ReplyGenerator, chat};
use nosh_core::db::Database;
use nosh_core::export::{XLSX_CONTENT_TYPE, build_workbook, export_filename};
use nosh_core::interchange::{DataExport, DataImport, ExportScope, ImportSummary};
use nosh_core::models::{
    DailySummary, IngredientCatalog, IngredientData, InsertOutcome, Meal, MealsByDate, NewMeal,
    RecipeBook, RecipeData, validate_ingredient, validate_new_meal, validate_recipe,
};
use nosh_core::stats::{MealStats, meal_stats};
use nosh_core::{interchange, models};

const BODY_LIMIT: usize = 50 * 1024 * 1024; // 50 MB

/// Days of meals returned by `GET /api/meals` without a date filter.
const RECENT_MEAL_DAYS: i64 = 30;

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
    chat: Option<Arc<dyn ReplyGenerator>>,
    api_key: Option<String>,
}

impl AppState {
    fn db(&self) -> MutexGuard<'_, Database> {
        self.db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CreateIngredientRequest {
    category: String,
    #[serde(alias = "ingredientKey")]
    ingredient_key: String,
    #[serde(alias = "ingredientData")]
    ingredient_data: IngredientData,
}

#[derive(Deserialize)]
struct UpdateIngredientRequest {
    #[serde(alias = "ingredientData")]
    ingredient_data: IngredientData,
}

#[derive(Deserialize)]
struct CreateRecipeRequest {
    #[serde(alias = "recipeKey")]
    recipe_key: String,
    #[serde(alias = "recipeData")]
    recipe_data: RecipeData,
}

#[derive(Deserialize)]
struct UpdateRecipeRequest {
    #[serde(alias = "recipeData")]
    recipe_data: RecipeData,
}

#[derive(Deserialize)]
struct MealRequest {
    date: String,
    meal: NewMeal,
}

#[derive(Deserialize)]
struct BulkMealsRequest {
    operation: String,
    meals: BTreeMap<String, Vec<NewMeal>>,
}

#[derive(Deserialize)]
struct CopyMealsRequest {
    #[serde(alias = "sourceDate")]
    source_date: String,
    #[serde(alias = "targetDate")]
    target_date: String,
}

#[derive(Deserialize)]
struct MealsQuery {
    date: Option<String>,
    #[serde(alias = "startDate")]
    start_date: Option<String>,
    #[serde(alias = "endDate")]
    end_date: Option<String>,
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    date: Option<String>,
}

#[derive(Deserialize)]
struct CompareRequest {
    #[serde(alias = "currentStartDate")]
    current_start_date: Option<String>,
    #[serde(alias = "currentEndDate")]
    current_end_date: Option<String>,
}

#[derive(Deserialize)]
struct RecommendationsRequest {
    #[serde(alias = "deficientNutrients")]
    deficient_nutrients: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct ExportQuery {
    #[serde(rename = "type", default)]
    scope: Option<String>,
}

#[derive(Deserialize, Default)]
struct SpreadsheetRequest {
    #[serde(default, alias = "mealsByDate")]
    meals_by_date: Option<MealsByDate>,
    #[serde(default, alias = "startDate")]
    start_date: Option<String>,
    #[serde(default, alias = "endDate")]
    end_date: Option<String>,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    message: String,
}

impl MessageResponse {
    fn ok(message: String) -> Json<Self> {
        Json(Self {
            success: true,
            message,
        })
    }
}

#[derive(Serialize)]
struct MealResponse {
    success: bool,
    message: String,
    meal: Meal,
    date: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    already_exists: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err}"))
}

fn parse_date(s: &str) -> Result<NaiveDate, ApiError> {
    models::parse_iso_date(s).map_err(|e| bad_request(&e))
}

fn required_date(value: Option<&str>, what: &str) -> Result<NaiveDate, ApiError> {
    match value {
        Some(s) if !s.trim().is_empty() => parse_date(s),
        _ => Err(ApiError::BadRequest(format!("{what} is required"))),
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "chat": state.chat.is_some(),
        "timestamp": Local::now().to_rfc3339(),
    }))
}

async fn list_ingredients(
    State(state): State<AppState>,
) -> Result<Json<IngredientCatalog>, ApiError> {
    let catalog = state
        .db()
        .get_all_ingredients()
        .context("failed to read ingredients")?;
    Ok(Json(catalog))
}

async fn create_ingredient(
    State(state): State<AppState>,
    Json(req): Json<CreateIngredientRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    validate_ingredient(&req.category, &req.ingredient_key, &req.ingredient_data)
        .map_err(|e| bad_request(&e))?;

    let db = state.db();
    if db
        .get_ingredient(&req.category, &req.ingredient_key)
        .context("database error")?
        .is_some()
    {
        return Err(ApiError::BadRequest(format!(
            "Ingredient '{}' already exists in category '{}'",
            req.ingredient_key, req.category
        )));
    }
    db.add_ingredient(&req.category, &req.ingredient_key, &req.ingredient_data)
        .context("failed to add ingredient")?;

    Ok((
        StatusCode::CREATED,
        MessageResponse::ok(format!(
            "Ingredient \"{}\" added successfully",
            req.ingredient_data.name
        )),
    ))
}

async fn update_ingredient(
    State(state): State<AppState>,
    Path((category, key)): Path<(String, String)>,
    Json(req): Json<UpdateIngredientRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_ingredient(&category, &key, &req.ingredient_data).map_err(|e| bad_request(&e))?;

    let updated = state
        .db()
        .update_ingredient(&category, &key, &req.ingredient_data)
        .context("failed to update ingredient")?;
    if !updated {
        return Err(ApiError::NotFound(format!(
            "Ingredient '{key}' not found in category '{category}'"
        )));
    }
    Ok(MessageResponse::ok(format!(
        "Ingredient \"{}\" updated successfully",
        req.ingredient_data.name
    )))
}

async fn delete_ingredient(
    State(state): State<AppState>,
    Path((category, key)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = state
        .db()
        .delete_ingredient(&category, &key)
        .context("failed to delete ingredient")?;
    match deleted {
        Some(name) => Ok(MessageResponse::ok(format!(
            "Ingredient \"{name}\" deleted successfully"
        ))),
        None => Err(ApiError::NotFound(format!(
            "Ingredient '{key}' not found in category '{category}'"
        ))),
    }
}

async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let categories = state
        .db()
        .get_categories()
        .context("failed to read categories")?;
    Ok(Json(serde_json::json!({ "categories": categories })))
}

async fn list_recipes(State(state): State<AppState>) -> Result<Json<RecipeBook>, ApiError> {
    let book = state
        .db()
        .get_all_recipes()
        .context("failed to read recipes")?;
    Ok(Json(book))
}

async fn create_recipe(
    State(state): State<AppState>,
    Json(req): Json<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    validate_recipe(&req.recipe_key, &req.recipe_data).map_err(|e| bad_request(&e))?;

    let db = state.db();
    if db
        .get_recipe(&req.recipe_key)
        .context("database error")?
        .is_some()
    {
        return Err(ApiError::BadRequest(format!(
            "Recipe '{}' already exists",
            req.recipe_key
        )));
    }
    db.add_recipe(&req.recipe_key, &req.recipe_data)
        .context("failed to add recipe")?;

    Ok((
        StatusCode::CREATED,
        MessageResponse::ok(format!(
            "Recipe \"{}\" added successfully",
            req.recipe_data.name
        )),
    ))
}

async fn update_recipe(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<UpdateRecipeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_recipe(&key, &req.recipe_data).map_err(|e| bad_request(&e))?;

    let updated = state
        .db()
        .update_recipe(&key, &req.recipe_data)
        .context("failed to update recipe")?;
    if !updated {
        return Err(ApiError::NotFound(format!("Recipe '{key}' not found")));
    }
    Ok(MessageResponse::ok(format!(
        "Recipe \"{}\" updated successfully",
        req.recipe_data.name
    )))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let db = state.db();
    let Some(recipe) = db.get_recipe(&key).context("database error")? else {
        return Err(ApiError::NotFound(format!("Recipe '{key}' not found")));
    };
    db.delete_recipe(&key).context("failed to delete recipe")?;
    Ok(MessageResponse::ok(format!(
        "Recipe \"{}\" deleted successfully",
        recipe.name
    )))
}

async fn list_meals(
    State(state): State<AppState>,
    Query(params): Query<MealsQuery>,
) -> Result<Json<MealsByDate>, ApiError> {
    let (start, end) = match (&params.date, &params.start_date, &params.end_date) {
        (Some(date), _, _) => {
            let date = parse_date(date)?;
            (date, date)
        }
        (None, Some(start), Some(end)) => (parse_date(start)?, parse_date(end)?),
        _ => {
            let today = Local::now().date_naive();
            (today - Duration::days(RECENT_MEAL_DAYS), today)
        }
    };

    let mut meals = state
        .db()
        .get_meals_by_date_range(start, end)
        .context("failed to read meals")?;

    // A single-date query always names its date, even when empty
    if let Some(date) = params.date.as_deref() {
        meals.entry(date.trim().to_string()).or_default();
    }
    Ok(Json(meals))
}

async fn create_meal(
    State(state): State<AppState>,
    Json(req): Json<MealRequest>,
) -> Result<(StatusCode, Json<MealResponse>), ApiError> {
    let date = parse_date(&req.date)?;
    validate_new_meal(&req.meal).map_err(|e| bad_request(&e))?;

    let db = state.db();
    let outcome = db
        .insert_meal(date, &req.meal)
        .context("failed to insert meal")?;
    let meal = db
        .get_meal(req.meal.id)
        .context("database error")?
        .context("stored meal not found")?;

    let (status, message, already_exists) = match outcome {
        InsertOutcome::Inserted => (
            StatusCode::CREATED,
            format!("Meal \"{}\" added successfully", meal.description),
            false,
        ),
        InsertOutcome::AlreadyExists => (
            StatusCode::OK,
            format!("Meal \"{}\" already exists", meal.description),
            true,
        ),
    };

    Ok((
        status,
        Json(MealResponse {
            success: true,
            message,
            date: meal.date.clone(),
            meal,
            already_exists,
        }),
    ))
}

async fn update_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(mut req): Json<MealRequest>,
) -> Result<Json<MealResponse>, ApiError> {
    let date = parse_date(&req.date)?;
    req.meal.id = id;
    validate_new_meal(&req.meal).map_err(|e| bad_request(&e))?;

    let db = state.db();
    if !db
        .update_meal(id, date, &req.meal)
        .context("failed to update meal")?
    {
        return Err(ApiError::NotFound(format!("Meal {id} not found")));
    }
    let meal = db
        .get_meal(id)
        .context("database error")?
        .context("updated meal not found")?;

    Ok(Json(MealResponse {
        success: true,
        message: format!("Meal \"{}\" updated successfully", meal.description),
        date: meal.date.clone(),
        meal,
        already_exists: false,
    }))
}

async fn delete_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    if state.db().delete_meal(id).context("database error")? {
        Ok(MessageResponse::ok("Meal deleted successfully".to_string()))
    } else {
        Err(ApiError::NotFound(format!("Meal {id} not found")))
    }
}

async fn bulk_meals(
    State(state): State<AppState>,
    Json(req): Json<BulkMealsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.operation != "import" && req.operation != "sync" {
        return Err(ApiError::BadRequest(
            "Invalid operation. Use \"import\" or \"sync\"".to_string(),
        ));
    }

    let processed = state
        .db()
        .import_meals(&req.meals)
        .context("bulk meal import failed")?;
    info!(operation = %req.operation, processed, "bulk meal operation");

    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Bulk {} completed successfully", req.operation),
        "processed_count": processed,
        "operation": req.operation,
    })))
}

async fn copy_meals(
    State(state): State<AppState>,
    Json(req): Json<CopyMealsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let source = parse_date(&req.source_date)?;
    let target = parse_date(&req.target_date)?;

    let copied = state
        .db()
        .copy_meals(source, target)
        .context("failed to copy meals")?;
    if copied.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No meals found for {}",
            req.source_date
        )));
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "count": copied.len(),
        "meals": copied,
    })))
}

async fn delete_meals_for_date(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let date = parse_date(&date_str)?;
    let deleted = state
        .db()
        .delete_meals_for_date(date)
        .context("failed to delete meals")?;
    Ok(Json(serde_json::json!({ "success": true, "deleted": deleted })))
}

async fn get_meal_stats(
    State(state): State<AppState>,
    Query(params): Query<MealsQuery>,
) -> Result<Json<MealStats>, ApiError> {
    let range = match (&params.start_date, &params.end_date) {
        (Some(start), Some(end)) => Some((parse_date(start)?, parse_date(end)?)),
        _ => None,
    };

    let db = state.db();
    let meals = match range {
        Some((start, end)) => db.get_meals_by_date_range(start, end),
        None => db.get_all_meals_by_date(),
    }
    .context("failed to read meals")?;

    Ok(Json(meal_stats(
        &meals,
        range.map(|(s, _)| s),
        range.map(|(_, e)| e),
    )))
}

async fn daily_summary(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
) -> Result<Json<DailySummary>, ApiError> {
    let date = parse_date(&date_str)?;
    let summary = state
        .db()
        .get_daily_summary(date)
        .context("failed to read daily summary")?;
    Ok(Json(summary))
}

async fn weekly_summary(
    State(state): State<AppState>,
    Query(params): Query<MealsQuery>,
) -> Result<Json<Vec<DailySummary>>, ApiError> {
    let (Some(start), Some(end)) = (&params.start_date, &params.end_date) else {
        return Err(ApiError::BadRequest(
            "Missing start_date or end_date".to_string(),
        ));
    };
    let (start, end) = (parse_date(start)?, parse_date(end)?);
    let summaries = state
        .db()
        .get_weekly_summary(start, end)
        .context("failed to read weekly summary")?;
    Ok(Json(summaries))
}

async fn ai_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message is required".to_string()));
    }
    let date = match req.date.as_deref() {
        Some(d) => parse_date(d)?,
        None => Local::now().date_naive(),
    };

    let summary = state
        .db()
        .get_daily_summary(date)
        .context("failed to read daily summary")?;

    let reply = chat(
        state.chat.as_deref(),
        &req.message,
        req.date.as_deref(),
        Some(&summary),
    )
    .await?;
    Ok(Json(reply))
}

async fn ai_analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<SuggestionReport>, ApiError> {
    let date = required_date(req.date.as_deref(), "Date")?;
    let db = state.db();
    let report = Analyzer::new(&*db)
        .generate_suggestions(date)
        .context("failed to generate analysis")?;
    Ok(Json(report))
}

async fn ai_weekly_progress(
    State(state): State<AppState>,
) -> Result<Json<WeeklyProgress>, ApiError> {
    let today = Local::now().date_naive();
    let db = state.db();
    let progress = Analyzer::new(&*db)
        .weekly_progress(today)
        .context("failed to compute weekly progress")?;
    Ok(Json(progress))
}

async fn ai_compare(
    State(state): State<AppState>,
    Json(req): Json<CompareRequest>,
) -> Result<Json<Comparison>, ApiError> {
    let (Some(start), Some(end)) = (&req.current_start_date, &req.current_end_date) else {
        return Err(ApiError::BadRequest("Date range is required".to_string()));
    };
    let (start, end) = (parse_date(start)?, parse_date(end)?);
    let db = state.db();
    let comparison = Analyzer::new(&*db)
        .compare_with_previous(start, end)
        .context("failed to compare periods")?;
    Ok(Json(comparison))
}

async fn ai_recommendations(
    Json(req): Json<RecommendationsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(nutrients) = req.deficient_nutrients else {
        return Err(ApiError::BadRequest(
            "deficient_nutrients must be an array".to_string(),
        ));
    };
    let recommendations = food_recommendations(&nutrients);
    let value =
        serde_json::to_value(recommendations).context("failed to serialize recommendations")?;
    Ok(Json(value))
}

async fn export_data(
    State(state): State<AppState>,
    Query(params): Query<ExportQuery>,
) -> Result<Json<DataExport>, ApiError> {
    let scope = match params.scope.as_deref() {
        Some(s) => s.parse::<ExportScope>().map_err(|e| bad_request(&e))?,
        None => ExportScope::All,
    };
    let today = Local::now().date_naive();
    let data = interchange::export_data(&state.db(), scope, today)
        .context("failed to export data")?;
    Ok(Json(data))
}

async fn import_data(
    State(state): State<AppState>,
    Json(data): Json<DataImport>,
) -> Result<Json<ImportSummary>, ApiError> {
    let summary =
        interchange::import_data(&state.db(), &data).context("failed to import data")?;
    Ok(Json(summary))
}

async fn export_spreadsheet(
    State(state): State<AppState>,
    Json(req): Json<SpreadsheetRequest>,
) -> Result<Response, ApiError> {
    let meals = match req.meals_by_date {
        Some(meals) => meals,
        None => {
            let range = match (&req.start_date, &req.end_date) {
                (Some(start), Some(end)) => Some((parse_date(start)?, parse_date(end)?)),
                _ => None,
            };
            let db = state.db();
            let stored = match range {
                Some((start, end)) => db.get_meals_by_date_range(start, end),
                None => db.get_all_meals_by_date(),
            };
            stored.context("failed to read meals")?
        }
    };

    let workbook = build_workbook(&meals).map_err(|e| bad_request(&e))?;
    let bytes = workbook.to_xlsx().context("failed to write spreadsheet")?;

    let filename = req
        .filename
        .map(|f| f.replace(['"', '\\', '/', '\r', '\n'], ""))
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| export_filename(Local::now().date_naive()));
    info!(sheets = workbook.sheets.len(), %filename, "spreadsheet export");

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/ingredients",
            get(list_ingredients).post(create_ingredient),
        )
        .route(
            "/api/ingredients/{category}/{key}",
            put(update_ingredient).delete(delete_ingredient),
        )
        .route("/api/categories", get(list_categories))
        .route("/api/recipes", get(list_recipes).post(create_recipe))
        .route(
            "/api/recipes/{key}",
            put(update_recipe).delete(delete_recipe),
        )
        .route("/api/meals", get(list_meals).post(create_meal))
        .route("/api/meals/bulk", post(bulk_meals))
        .route("/api/meals/copy", post(copy_meals))
        .route("/api/meals/stats", get(get_meal_stats))
        .route("/api/meals/by-date/{date}", delete(delete_meals_for_date))
        .route("/api/meals/{id}", put(update_meal).delete(delete_meal))
        .route("/api/analytics/daily/{date}", get(daily_summary))
        .route("/api/analytics/weekly", get(weekly_summary))
        .route("/api/ai/chat", post(ai_chat))
        .route("/api/ai/analyze", post(ai_analyze))
        .route("/api/ai/weekly-progress", post(ai_weekly_progress))
        .route("/api/ai/compare", post(ai_compare))
        .route("/api/ai/recommendations", post(ai_recommendations))
        .route("/api/export", get(export_data))
        .route("/api/import", post(import_data))
        .route("/api/export/spreadsheet", post(export_spreadsheet))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    db: Database,
    port: u16,
    bind: &str,
    api_key: Option<String>,
    chat: Option<Arc<dyn ReplyGenerator>>,
) -> anyhow::Result<()> {
    if chat.is_none() {
        warn!("GEMINI_API_KEY not set, chat replies will use the fallback message");
    }

    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        chat,
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {}...{} (see api_key file in data directory)",
            &key[..4],
            &key[key.len() - 4..],
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {bind}:{port}"))?;
    info!("Listening on http://{bind}:{port}");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
