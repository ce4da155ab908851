mod commands;
mod config;
mod gemini;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    IngredientInput, MealInput, cmd_add, cmd_analyze, cmd_ask, cmd_clear, cmd_compare, cmd_copy,
    cmd_delete, cmd_export, cmd_import, cmd_ingredient_add, cmd_ingredient_delete,
    cmd_ingredient_list, cmd_list, cmd_progress, cmd_recipe_delete, cmd_recipe_list,
    cmd_recommend, cmd_spreadsheet, cmd_stats, cmd_summary, cmd_weekly,
};
use crate::config::Config;
use crate::gemini::GeminiClient;
use nosh_core::chat::ReplyGenerator;
use nosh_core::db::Database;
use nosh_core::models::NutritionTotals;

#[derive(Parser)]
#[command(
    name = "nosh",
    version,
    about = "A nutrition diary with rule-based analysis",
    long_about = "\n\n  ███╗   ██╗ ██████╗ ███████╗██╗  ██╗
  ████╗  ██║██╔═══██╗██╔════╝██║  ██║
  ██╔██╗ ██║██║   ██║███████╗███████║
  ██║╚██╗██║██║   ██║╚════██║██╔══██║
  ██║ ╚████║╚██████╔╝███████║██║  ██║
  ╚═╝  ╚═══╝ ╚═════╝ ╚══════╝╚═╝  ╚═╝
        log it, then look at it.
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a meal with its nutrition
    Add {
        /// What was eaten
        description: String,
        /// Calories (kcal)
        #[arg(long)]
        calories: f64,
        /// Protein in grams
        #[arg(long, default_value = "0")]
        protein: f64,
        /// Carbohydrates in grams
        #[arg(long, default_value = "0")]
        carbs: f64,
        /// Fat in grams
        #[arg(long, default_value = "0")]
        fat: f64,
        /// Fiber in grams
        #[arg(long, default_value = "0")]
        fiber: f64,
        /// Meal type: breakfast, lunch, dinner, snack
        #[arg(short, long, default_value = "snack")]
        meal: String,
        /// Where the numbers came from (manual, database, ingredients)
        #[arg(long, default_value = "manual")]
        source: String,
        /// Date to log for (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List meals for a date (defaults to today)
    List {
        /// Date to show (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a meal by ID
    Delete {
        /// Meal ID to delete
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy all meals from one date to another
    Copy {
        /// Source date
        from: String,
        /// Destination date
        to: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every meal on a date (defaults to today)
    Clear {
        /// Date to clear
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daily totals against targets (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show per-day totals for the last N days
    Weekly {
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Suggestions and insights for a day (defaults to today)
    Analyze {
        /// Date to analyze
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Food ideas for nutrients you are short on
    Recommend {
        /// Nutrients: calories, protein, carbs, fat, fiber
        #[arg(required = true)]
        nutrients: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Progress over the past week
    Progress {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare a period with the one before it (default: last 7 days)
    Compare {
        /// First day of the current period
        #[arg(long)]
        start: Option<String>,
        /// Last day of the current period (default: today)
        #[arg(long)]
        end: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Meal statistics (default: all history)
    Stats {
        /// First day to include
        #[arg(long)]
        start: Option<String>,
        /// Last day to include
        #[arg(long)]
        end: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask the nutrition assistant a question
    Ask {
        /// Your question
        message: String,
        /// Day whose totals are given as context (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the ingredient catalog
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Manage saved recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Export ingredients, recipes and recent meals as JSON
    Export {
        /// File to write (default: stdout)
        output: Option<PathBuf>,
        /// What to export: all, ingredients, recipes, meals
        #[arg(short = 't', long = "type", default_value = "all")]
        scope: String,
        /// Output a JSON summary when writing to a file
        #[arg(long)]
        json: bool,
    },
    /// Import a JSON document (combined export, catalog, recipes or meals)
    Import {
        /// Path to the JSON file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write meals to an xlsx workbook, one worksheet per month
    Spreadsheet {
        /// First day to include
        #[arg(long)]
        start: Option<String>,
        /// Last day to include
        #[arg(long)]
        end: Option<String>,
        /// File to write (default: Food_Diary_Export_<date>.xlsx)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// List catalog ingredients
    List {
        /// Only show this category
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an ingredient, or a new measurement to an existing one
    Add {
        /// Category (e.g. Grains, Dairy)
        category: String,
        /// Ingredient key, unique within the category
        key: String,
        /// Display name
        name: String,
        /// Measurement label (e.g. "1 cup", "100g")
        #[arg(long, default_value = "100g")]
        measurement: String,
        /// Calories per measurement
        #[arg(long)]
        calories: f64,
        /// Protein in grams
        #[arg(long, default_value = "0")]
        protein: f64,
        /// Carbohydrates in grams
        #[arg(long, default_value = "0")]
        carbs: f64,
        /// Fat in grams
        #[arg(long, default_value = "0")]
        fat: f64,
        /// Fiber in grams
        #[arg(long, default_value = "0")]
        fiber: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an ingredient
    Delete {
        /// Category
        category: String,
        /// Ingredient key
        key: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// List saved recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe
    Delete {
        /// Recipe key
        key: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(config: &Config, default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_filter.as_deref().unwrap_or(default_level)))
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn reply_generator(config: &Config) -> Result<Option<Arc<dyn ReplyGenerator>>> {
    let Some(key) = config.gemini_api_key.clone() else {
        return Ok(None);
    };
    let client = GeminiClient::new(key, config.gemini_model.clone())?;
    Ok(Some(Arc::new(client)))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let default_level = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    init_tracing(&config, default_level);

    debug!(path = %config.db_path.display(), "opening database");
    let db = Database::open(&config.db_path)?;

    match cli.command {
        Commands::Add {
            description,
            calories,
            protein,
            carbs,
            fat,
            fiber,
            meal,
            source,
            date,
            json,
        } => cmd_add(
            &db,
            MealInput {
                description,
                nutrition: NutritionTotals::new(calories, protein, carbs, fat, fiber),
                meal_type: meal,
                source,
            },
            date,
            json,
        ),
        Commands::List { date, json } => cmd_list(&db, date, json),
        Commands::Delete { id, json } => cmd_delete(&db, id, json),
        Commands::Copy { from, to, json } => cmd_copy(&db, from, to, json),
        Commands::Clear { date, json } => cmd_clear(&db, date, json),
        Commands::Summary { date, json } => cmd_summary(&db, date, json),
        Commands::Weekly { days, json } => cmd_weekly(&db, days, json),
        Commands::Analyze { date, json } => cmd_analyze(&db, date, json),
        Commands::Recommend { nutrients, json } => cmd_recommend(&nutrients, json),
        Commands::Progress { json } => cmd_progress(&db, json),
        Commands::Compare { start, end, json } => cmd_compare(&db, start, end, json),
        Commands::Stats { start, end, json } => cmd_stats(&db, start, end, json),
        Commands::Ask {
            message,
            date,
            json,
        } => {
            let generator = reply_generator(&config)?;
            cmd_ask(&db, generator.as_deref(), &message, date, json).await
        }
        Commands::Ingredient { command } => match command {
            IngredientCommands::List { category, json } => {
                cmd_ingredient_list(&db, category.as_deref(), json)
            }
            IngredientCommands::Add {
                category,
                key,
                name,
                measurement,
                calories,
                protein,
                carbs,
                fat,
                fiber,
                json,
            } => cmd_ingredient_add(
                &db,
                IngredientInput {
                    category,
                    key,
                    name,
                    measurement,
                    nutrition: NutritionTotals::new(calories, protein, carbs, fat, fiber),
                },
                json,
            ),
            IngredientCommands::Delete {
                category,
                key,
                json,
            } => cmd_ingredient_delete(&db, &category, &key, json),
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::List { json } => cmd_recipe_list(&db, json),
            RecipeCommands::Delete { key, json } => cmd_recipe_delete(&db, &key, json),
        },
        Commands::Export {
            output,
            scope,
            json,
        } => cmd_export(&db, output.as_deref(), &scope, json),
        Commands::Import { file, json } => cmd_import(&db, &file, json),
        Commands::Spreadsheet {
            start,
            end,
            output,
            json,
        } => cmd_spreadsheet(&db, start, end, output, json),
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                let (key, _new) = config.load_or_create_api_key()?;
                Some(key)
            };
            let generator = reply_generator(&config)?;
            server::start_server(db, port, &bind, api_key, generator).await
        }
    }
}
