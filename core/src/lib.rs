pub mod analyzer;
pub mod chat;
pub mod db;
pub mod export;
pub mod gemini;
pub mod interchange;
pub mod models;
pub mod stats;
pub mod store;
