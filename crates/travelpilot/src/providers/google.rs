use super::errors::ProviderError;
use crate::message::Message;
use crate::model::ModelConfig;
use crate::providers::base::{Provider, ProviderUsage};
use crate::providers::formats::google::{create_request, get_usage, response_to_message};
use crate::providers::utils::{
    emit_debug_trace, handle_response_google_compat, unescape_json_values,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use rmcp::model::Tool;
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const GOOGLE_API_HOST: &str = "https://generativelanguage.googleapis.com";

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, serde::Serialize)]
pub struct GoogleProvider {
    #[serde(skip)]
    client: Client,
    host: String,
    model: ModelConfig,
    #[serde(skip)]
    retry_base_delay: Duration,
}

impl GoogleProvider {
    pub fn new(host: &str, api_key: &str, model: ModelConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(api_key).map_err(|_| {
            ProviderError::Authentication("GOOGLE_API_KEY is not a valid header value".into())
        })?;
        headers.insert("x-goog-api-key", key);

        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            host: host.to_string(),
            model,
            retry_base_delay: RETRY_BASE_DELAY,
        })
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    async fn post(&self, payload: &Value) -> Result<Value, ProviderError> {
        let url = Url::parse(&self.host)?.join(&format!(
            "v1beta/models/{}:generateContent",
            self.model.model_name
        ))?;

        let mut retries = 0;
        loop {
            let response = self
                .client
                .post(url.clone())
                .json(payload)
                .send()
                .await?;

            match handle_response_google_compat(response).await {
                Err(ProviderError::RateLimitExceeded(_)) => {
                    retries += 1;
                    if retries > MAX_RETRIES {
                        return Err(ProviderError::RateLimitExceeded(
                            "Max retries exceeded for rate limit error".to_string(),
                        ));
                    }

                    let delay = self.retry_base_delay * 2u32.pow(retries);
                    tracing::warn!(attempt = retries, "Rate limit hit. Retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn get_model_config(&self) -> ModelConfig {
        self.model.clone()
    }

    #[tracing::instrument(
        skip(self, system, messages, tools),
        fields(model = %self.model.model_name, tools = tools.len())
    )]
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, ProviderUsage), ProviderError> {
        let payload = create_request(&self.model, system, messages, tools);

        let response = self.post(&payload).await?;

        let message = response_to_message(unescape_json_values(&response))?;
        let usage = get_usage(&response);
        let model = response
            .get("modelVersion")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.model.model_name.clone());
        emit_debug_trace(&self.model, &payload, &response, &usage);
        Ok((message, ProviderUsage::new(model, usage)))
    }
}
