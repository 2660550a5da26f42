//! 文本生成服务商（OpenAI / Anthropic）的 HTTP 客户端

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicGenerator;
pub use openai::OpenAiGenerator;

use crate::config::{LlmConfig, LlmProvider};
use crate::core::generator::TextGenerator;
use crate::error::GenerationError;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use std::sync::Arc;
use std::time::Duration;

/// 按配置构建生成器；未配置时返回 None，流水线只走模板
pub fn build_generator(config: &LlmConfig) -> anyhow::Result<Option<Arc<dyn TextGenerator>>> {
    let api_key = match (&config.provider, &config.api_key) {
        (LlmProvider::None, _) => return Ok(None),
        (_, Some(key)) => key.clone(),
        (provider, None) => anyhow::bail!("LLM_PROVIDER={} 需要 LLM_API_KEY", provider),
    };
    let client = http_client(config.timeout_secs)?;
    let generator: Arc<dyn TextGenerator> = match config.provider {
        LlmProvider::OpenAi => Arc::new(OpenAiGenerator::new(
            client,
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            config.max_tokens,
        )),
        LlmProvider::Anthropic => Arc::new(AnthropicGenerator::new(
            client,
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            config.max_tokens,
        )),
        LlmProvider::None => return Ok(None),
    };
    Ok(Some(generator))
}

fn http_client(timeout_secs: u64) -> anyhow::Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// 发送请求并解析响应，非 2xx 时尽量取出服务商的错误信息
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> Result<T, GenerationError> {
    let response = request
        .send()
        .await
        .map_err(|e| GenerationError::Transport(format!("{}: {}", provider, e)))?;

    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| GenerationError::Transport(format!("{}: invalid response: {}", provider, e)));
    }

    let text = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
    let message = match serde_json::from_str::<ApiError>(&text) {
        Ok(api_error) => api_error.error.message,
        Err(_) => text,
    };
    Err(GenerationError::Provider {
        provider: provider.to_string(),
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: LlmProvider, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: api_key.map(str::to_string),
            model: "m".into(),
            base_url: None,
            timeout_secs: 5,
            max_tokens: 256,
        }
    }

    #[test]
    fn none_provider_builds_nothing() {
        assert!(build_generator(&config(LlmProvider::None, Some("k"))).unwrap().is_none());
    }

    #[test]
    fn provider_without_key_is_a_config_error() {
        let err = build_generator(&config(LlmProvider::OpenAi, None)).err().unwrap();
        assert!(err.to_string().contains("LLM_API_KEY"));
    }

    #[test]
    fn builds_named_providers() {
        let openai = build_generator(&config(LlmProvider::OpenAi, Some("k"))).unwrap().unwrap();
        assert_eq!(openai.name(), "openai");
        let anthropic = build_generator(&config(LlmProvider::Anthropic, Some("k")))
            .unwrap()
            .unwrap();
        assert_eq!(anthropic.name(), "anthropic");
    }
}
