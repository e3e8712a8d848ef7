use reqwest::{Response, StatusCode};
use serde_json::{Map, Value};

use super::base::Usage;
use crate::model::ModelConfig;
use crate::providers::errors::ProviderError;

/// Gemini reports some failures inside a 200 body, prefer the embedded code then
fn get_google_final_status(status: StatusCode, payload: Option<&Value>) -> StatusCode {
    if status.is_success() {
        if let Some(code) = payload
            .and_then(|p| p.get("error"))
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok())
        {
            if let Ok(embedded) = StatusCode::from_u16(code) {
                return embedded;
            }
        }
    }
    status
}

/// Handle response from the Gemini API
/// Error codes: https://ai.google.dev/gemini-api/docs/troubleshooting
pub async fn handle_response_google_compat(response: Response) -> Result<Value, ProviderError> {
    let status = response.status();
    let payload: Option<Value> = response.json().await.ok();
    let final_status = get_google_final_status(status, payload.as_ref());

    match final_status {
        StatusCode::OK => payload.ok_or_else(|| {
            ProviderError::InvalidResponse("Response body is not valid JSON".to_string())
        }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(ProviderError::Authentication(format!(
                "Authentication failed. Please ensure your API keys are valid and have the required permissions. \
                Status: {}. Response: {:?}",
                final_status, payload
            )))
        }
        StatusCode::BAD_REQUEST => {
            let mut error_msg = "Unknown error".to_string();
            if let Some(error) = payload.as_ref().and_then(|p| p.get("error")) {
                error_msg = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("Unknown error")
                    .to_string();
                let error_status = error
                    .get("status")
                    .and_then(|s| s.as_str())
                    .unwrap_or_default();
                if error_status == "INVALID_ARGUMENT"
                    && error_msg.to_lowercase().contains("exceeds")
                {
                    return Err(ProviderError::ContextLengthExceeded(error_msg));
                }
            }
            tracing::debug!(
                "Provider request failed with status: {}. Payload: {:?}",
                final_status,
                payload
            );
            Err(ProviderError::Api {
                status: final_status,
                message: error_msg,
            })
        }
        StatusCode::TOO_MANY_REQUESTS => {
            Err(ProviderError::RateLimitExceeded(format!("{:?}", payload)))
        }
        StatusCode::INTERNAL_SERVER_ERROR | StatusCode::SERVICE_UNAVAILABLE => {
            Err(ProviderError::Api {
                status: final_status,
                message: format!("{:?}", payload),
            })
        }
        _ => {
            tracing::debug!(
                "Provider request failed with status: {}. Payload: {:?}",
                final_status,
                payload
            );
            Err(ProviderError::Api {
                status: final_status,
                message: "unexpected status".to_string(),
            })
        }
    }
}

pub fn sanitize_function_name(name: &str) -> String {
    name.chars()
        .map(|c| if is_function_name_char(c) { c } else { '_' })
        .collect()
}

pub fn is_valid_function_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_function_name_char)
}

fn is_function_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Some models return JSON-encoded strings inside tool arguments, decode
/// those so tool servers receive structured values.
pub fn unescape_json_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let new_map: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), unescape_json_values(v)))
                .collect();
            Value::Object(new_map)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(unescape_json_values).collect()),
        Value::String(s) => Value::String(
            s.replace("\\\\n", "\n")
                .replace("\\\\t", "\t")
                .replace("\\\\r", "\r")
                .replace("\\\\\"", "\"")
                .replace("\\n", "\n")
                .replace("\\t", "\t")
                .replace("\\r", "\r")
                .replace("\\\"", "\""),
        ),
        _ => value.clone(),
    }
}

pub fn emit_debug_trace(
    model_config: &ModelConfig,
    payload: &Value,
    response: &Value,
    usage: &Usage,
) {
    tracing::debug!(
        model_config = %serde_json::to_string_pretty(model_config).unwrap_or_default(),
        input = %serde_json::to_string_pretty(payload).unwrap_or_default(),
        output = %serde_json::to_string_pretty(response).unwrap_or_default(),
        input_tokens = ?usage.input_tokens.unwrap_or_default(),
        output_tokens = ?usage.output_tokens.unwrap_or_default(),
        total_tokens = ?usage.total_tokens.unwrap_or_default(),
    );
}
