use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::DailySummary;

pub const UNAVAILABLE_REPLY: &str = "I'm currently unavailable. Please set the GEMINI_API_KEY environment variable to enable AI chat. In the meantime, run `nosh analyze` or `nosh recommend` (POST /api/ai/analyze or /api/ai/recommendations) for nutrition analysis.";

pub const TROUBLE_REPLY: &str = "I'm having trouble processing your request right now. Please try asking in a different way, or run `nosh analyze` (POST /api/ai/analyze) for a nutrition analysis.";

/// Produces a free-text reply for a prompt, typically via a hosted model.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub fallback: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

pub fn build_prompt(message: &str, date: Option<&str>, summary: Option<&DailySummary>) -> String {
    let mut context = String::from("You are a helpful nutrition assistant. ");

    if let Some(s) = summary {
        let t = s.totals;
        context.push_str(&format!(
            "The user has logged {} meals today ({}) with {} calories, {}g protein, {}g carbs, {}g fat, and {}g fiber. ",
            s.meal_count,
            date.unwrap_or("today"),
            t.calories.round(),
            t.protein.round(),
            t.carbs.round(),
            t.fat.round(),
            t.fiber.round(),
        ));
    }

    context.push_str(
        "Provide concise, helpful nutrition advice. Keep responses under 100 words unless detailed analysis is requested. Use a friendly, encouraging tone.",
    );

    format!("{context}\n\nUser question: {message}\n\nResponse:")
}

/// Answer a chat message. A missing generator or a failed generation
/// yields a fixed fallback reply rather than an error; only an empty
/// message is rejected.
pub async fn chat(
    generator: Option<&dyn ReplyGenerator>,
    message: &str,
    date: Option<&str>,
    summary: Option<&DailySummary>,
) -> Result<ChatReply> {
    if message.trim().is_empty() {
        bail!("Message is required");
    }

    let Some(generator) = generator else {
        return Ok(ChatReply {
            response: UNAVAILABLE_REPLY.to_string(),
            fallback: true,
            error: false,
        });
    };

    let prompt = build_prompt(message, date, summary);
    match generator.generate_reply(&prompt).await {
        Ok(response) => Ok(ChatReply {
            response,
            fallback: false,
            error: false,
        }),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "chat generation failed, using fallback reply");
            Ok(ChatReply {
                response: TROUBLE_REPLY.to_string(),
                fallback: true,
                error: true,
            })
        }
    }
}
