use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::base::Usage;
use super::errors::ProviderError;

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n?(.*?)\n?\s*```\s*$").unwrap();
}

// Maps a non-ok response status to a ProviderError
pub async fn non_ok_response_to_provider_error(
    payload: &Value,
    response: Response,
) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Authentication(format!("Authentication failed. Please ensure your API keys are valid and have the required permissions. \
                Status: {}. Response: {:?}", status, body))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            ProviderError::RateLimitExceeded(format!("Rate limit exceeded. Please retry after some time. Status: {}", status))
        }
        StatusCode::BAD_REQUEST if body.contains("context_length_exceeded") => {
            ProviderError::ContextLengthExceeded(body)
        }
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE => {
            ProviderError::ServerError(format!("Server error occurred. Status: {}", status))
        }
        _ => {
            debug!(
                "Provider request failed with status: {}. Body: {:?}. Payload: {}",
                status, body, payload
            );
            ProviderError::RequestFailed(format!("Request failed with status: {}.", status))
        }
    }
}

pub async fn handle_response(payload: &Value, response: Response) -> Result<Value, ProviderError> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(non_ok_response_to_provider_error(payload, response).await)
    }
}

/// Extract the model name from a JSON object. Common with most providers to have this top level attribute.
pub fn get_model(data: &Value) -> String {
    data.get("model")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string()
}

/// Read OpenAI-style token counts, deriving the total when it is absent
pub fn get_usage(data: &Value) -> Result<Usage, ProviderError> {
    let usage = data
        .get("usage")
        .filter(|u| u.is_object())
        .ok_or_else(|| ProviderError::UsageError("No usage data in response".to_string()))?;

    let count = |key: &str| {
        usage
            .get(key)
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok())
    };
    let input_tokens = count("prompt_tokens");
    let output_tokens = count("completion_tokens");
    let total_tokens = count("total_tokens").or(match (input_tokens, output_tokens) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    });
    Ok(Usage::new(input_tokens, output_tokens, total_tokens))
}

/// The assistant text of the first choice in a chat completion
pub fn get_message_text(data: &Value) -> Result<String, ProviderError> {
    data.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ProviderError::ResponseParseError("Missing message content in response".to_string())
        })
}

/// Remove a surrounding Markdown code fence, if any
pub fn strip_code_fences(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text.trim(),
    }
}

/// Parse model output that should be JSON, with or without a code fence
pub fn parse_json_text(text: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(strip_code_fences(text))
        .map_err(|e| ProviderError::ResponseParseError(format!("Invalid JSON: {}", e)))
}

pub fn emit_debug_trace<T: serde::Serialize>(
    model_config: &T,
    payload: &impl serde::Serialize,
    response: &Value,
    usage: &Usage,
) {
    debug!(
        model_config = %serde_json::to_string_pretty(model_config).unwrap_or_default(),
        input = %serde_json::to_string_pretty(payload).unwrap_or_default(),
        output = %serde_json::to_string_pretty(response).unwrap_or_default(),
        input_tokens = ?usage.input_tokens.unwrap_or_default(),
        output_tokens = ?usage.output_tokens.unwrap_or_default(),
        total_tokens = ?usage.total_tokens.unwrap_or_default(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_model() {
        assert_eq!(get_model(&json!({"model": "gpt-4o"})), "gpt-4o");
        assert_eq!(get_model(&json!({"model": 3})), "Unknown");
        assert_eq!(get_model(&json!({})), "Unknown");
    }

    #[test]
    fn test_get_usage() {
        let usage = get_usage(&json!({
            "usage": {"prompt_tokens": 12, "completion_tokens": 15, "total_tokens": 27}
        }))
        .unwrap();
        assert_eq!(usage, Usage::new(Some(12), Some(15), Some(27)));

        let derived = get_usage(&json!({
            "usage": {"prompt_tokens": 2, "completion_tokens": 3}
        }))
        .unwrap();
        assert_eq!(derived.total_tokens, Some(5));

        assert!(matches!(
            get_usage(&json!({"id": "x"})),
            Err(ProviderError::UsageError(_))
        ));
    }

    #[test]
    fn test_get_message_text() {
        let response = json!({"choices": [{"message": {"role": "assistant", "content": "hi"}}]});
        assert_eq!(get_message_text(&response).unwrap(), "hi");

        let empty = json!({"choices": []});
        assert!(matches!(
            get_message_text(&empty),
            Err(ProviderError::ResponseParseError(_))
        ));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n[1]\n```  "), "[1]");
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_json_text() {
        assert_eq!(
            parse_json_text("```json\n{\"steps\": []}\n```").unwrap(),
            json!({"steps": []})
        );
        assert!(matches!(
            parse_json_text("not json"),
            Err(ProviderError::ResponseParseError(_))
        ));
    }
}
