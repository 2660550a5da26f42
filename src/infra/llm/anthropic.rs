use super::send_json;
use crate::core::generator::{Prompt, TextGenerator};
use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

pub struct AnthropicGenerator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicGenerator {
    pub fn new(
        client: Client,
        api_key: String,
        model: String,
        base_url: Option<String>,
        max_tokens: u32,
    ) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens,
        }
    }

    fn extract_text(content: Vec<ContentBlock>) -> String {
        content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl TextGenerator for AnthropicGenerator {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let body = MessageRequest {
            model: &self.model,
            system: &prompt.system,
            messages: vec![Message { role: "user", content: &prompt.user }],
            max_tokens: self.max_tokens,
            temperature: 0.0,
        };
        let request = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);

        let response: MessageResponse = send_json(self.name(), request).await?;
        Ok(Self::extract_text(response.content))
    }
}

impl std::fmt::Debug for AnthropicGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicGenerator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_blocks_and_skips_others() {
        let reply: MessageResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"SELECT"},{"type":"thinking","thinking":"x"},{"type":"text","text":"1"}]}"#,
        )
        .unwrap();
        assert_eq!(AnthropicGenerator::extract_text(reply.content), "SELECT\n1");
    }

    #[test]
    fn debug_redacts_key() {
        let gen = AnthropicGenerator::new(
            Client::new(),
            "sk-ant-secret".into(),
            "claude".into(),
            Some("http://localhost:9000/v1/".into()),
            256,
        );
        let shown = format!("{:?}", gen);
        assert!(!shown.contains("sk-ant-secret"));
        assert!(shown.contains("http://localhost:9000/v1\""));
    }
}
