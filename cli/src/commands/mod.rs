mod analyze;
mod catalog;
mod data;
mod helpers;
mod meal;
mod summary;

pub(crate) use analyze::{
    cmd_analyze, cmd_ask, cmd_compare, cmd_progress, cmd_recommend, cmd_stats,
};
pub(crate) use catalog::{
    IngredientInput, cmd_ingredient_add, cmd_ingredient_delete, cmd_ingredient_list,
    cmd_recipe_delete, cmd_recipe_list,
};
pub(crate) use data::{cmd_export, cmd_import, cmd_spreadsheet};
pub(crate) use meal::{MealInput, cmd_add, cmd_clear, cmd_copy, cmd_delete, cmd_list};
pub(crate) use summary::{cmd_summary, cmd_weekly};
