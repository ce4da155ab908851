use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::debug;

use nosh_core::chat::ReplyGenerator;
use nosh_core::gemini::{GenerateRequest, GenerateResponse, extract_reply_text};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_base_url(api_key, model, API_BASE)
    }

    pub fn with_base_url(api_key: String, model: String, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "nosh/{} (nutrition diary)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ReplyGenerator for GeminiClient {
    async fn generate_reply(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model, "requesting Gemini reply");
        // Key goes in a header, never the URL.
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&GenerateRequest::from_prompt(prompt))
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to reach Gemini API")?;

        let status = resp.status();
        let data: GenerateResponse = resp
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to parse Gemini response")?;

        if let Some(message) = data.error.as_ref().and_then(|e| e.message.clone()) {
            bail!("Gemini API error ({status}): {message}");
        }
        if !status.is_success() {
            bail!("Gemini API returned {status}");
        }

        extract_reply_text(data).context("Gemini returned no reply text")
    }
}
