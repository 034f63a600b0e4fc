//! HTTP client for the external Dify engine: blocking chat messages,
//! conversation listing, and blocking/streaming workflow runs.

use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DifyError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Engine error ({status}): {body}")]
    EngineError { status: u16, body: String },
    #[error("Missing field in engine response: {0}")]
    MissingField(&'static str),
}

#[derive(Clone)]
pub struct DifyClient {
    client: Client,
    base_url: String,
    chat_api_key: String,
    workflow_api_key: String,
}

impl DifyClient {
    pub fn new(base_url: String, chat_api_key: String, workflow_api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            chat_api_key,
            workflow_api_key,
        }
    }

    /// One blocking chat turn. An empty conversation_id tells the engine to
    /// open a new conversation; the response body is returned unparsed beyond
    /// JSON so callers can pass it through verbatim.
    pub async fn send_chat_message(
        &self,
        query: &str,
        user: &str,
        conversation_id: Option<&str>,
    ) -> Result<Value, DifyError> {
        let url = format!("{}/chat-messages", self.base_url);
        debug!("Sending blocking chat message for user {}", user);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.chat_api_key)
            .json(&json!({
                "inputs": {},
                "query": query,
                "response_mode": "blocking",
                "user": user,
                "conversation_id": conversation_id.unwrap_or(""),
            }))
            .send()
            .await?;

        Self::json_or_error(response).await
    }

    /// Verbatim proxy of the engine's conversation-list endpoint.
    pub async fn list_conversations(&self, user: &str, limit: u32) -> Result<Value, DifyError> {
        let url = format!("{}/conversations", self.base_url);
        debug!("Listing conversations for user {}", user);

        let response = self
            .client
            .get(&url)
            .query(&[("user", user), ("limit", &limit.to_string())])
            .bearer_auth(&self.chat_api_key)
            .send()
            .await?;

        Self::json_or_error(response).await
    }

    /// Blocking workflow run; callers unwrap the outputs themselves.
    pub async fn run_workflow(&self, query: &str, user: &str) -> Result<Value, DifyError> {
        let url = format!("{}/workflows/run", self.base_url);
        debug!("Running blocking workflow for user {}", user);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.workflow_api_key)
            .json(&json!({
                "inputs": { "query": query },
                "response_mode": "blocking",
                "user": user,
            }))
            .send()
            .await?;

        Self::json_or_error(response).await
    }

    /// Streaming workflow run. Returns the upstream response so the caller
    /// can relay the event-stream bytes without buffering; dropping the
    /// response closes the upstream connection.
    pub async fn run_workflow_stream(
        &self,
        query: &str,
        user: &str,
    ) -> Result<reqwest::Response, DifyError> {
        let url = format!("{}/workflows/run", self.base_url);
        debug!("Running streaming workflow for user {}", user);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.workflow_api_key)
            .json(&json!({
                "inputs": { "query": query },
                "response_mode": "streaming",
                "user": user,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DifyError::EngineError {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn json_or_error(response: reqwest::Response) -> Result<Value, DifyError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<Value>().await?)
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(DifyError::EngineError {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Aggregate usage figures the engine reports under `metadata.usage` of a
/// blocking chat response. Both fields default to zero when absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatUsage {
    pub total_tokens: i64,
    pub total_cost: f64,
}

impl ChatUsage {
    pub fn from_response(body: &Value) -> ChatUsage {
        let usage = body.pointer("/metadata/usage");
        let total_tokens = usage
            .and_then(|u| u.get("total_tokens"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        // total_price arrives as a decimal string, e.g. "0.0000137"
        let total_cost = usage
            .and_then(|u| u.get("total_price"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);
        ChatUsage {
            total_tokens,
            total_cost,
        }
    }
}

/// Pull the conversation id out of a blocking chat response.
pub fn conversation_id_of(body: &Value) -> Result<&str, DifyError> {
    body.get("conversation_id")
        .and_then(Value::as_str)
        .ok_or(DifyError::MissingField("conversation_id"))
}

/// Unwrap the `result` output of a blocking workflow response.
pub fn workflow_result_of(body: &Value) -> Result<&str, DifyError> {
    body.pointer("/data/outputs/result")
        .and_then(Value::as_str)
        .ok_or(DifyError::MissingField("data.outputs.result"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_extracted_from_chat_response() {
        let body = json!({
            "conversation_id": "1b7e2423-cb4f-45b0-b683-bdc6ea900f7c",
            "answer": "hello",
            "metadata": {
                "usage": {
                    "total_tokens": 31,
                    "total_price": "0.0000137",
                    "currency": "USD"
                }
            }
        });
        let usage = ChatUsage::from_response(&body);
        assert_eq!(usage.total_tokens, 31);
        assert!((usage.total_cost - 0.0000137).abs() < f64::EPSILON);
        assert_eq!(
            conversation_id_of(&body).unwrap(),
            "1b7e2423-cb4f-45b0-b683-bdc6ea900f7c"
        );
    }

    #[test]
    fn usage_defaults_to_zero_when_metadata_missing() {
        let body = json!({ "answer": "hello" });
        let usage = ChatUsage::from_response(&body);
        assert_eq!(usage.total_tokens, 0);
        assert_eq!(usage.total_cost, 0.0);
    }

    #[test]
    fn usage_defaults_when_price_unparseable() {
        let body = json!({
            "metadata": { "usage": { "total_tokens": 10, "total_price": "n/a" } }
        });
        let usage = ChatUsage::from_response(&body);
        assert_eq!(usage.total_tokens, 10);
        assert_eq!(usage.total_cost, 0.0);
    }

    #[test]
    fn workflow_result_unwrapped_from_nested_response() {
        let body = json!({
            "task_id": "da1adc9b",
            "data": {
                "status": "succeeded",
                "outputs": { "result": "done" },
                "total_tokens": 34
            }
        });
        assert_eq!(workflow_result_of(&body).unwrap(), "done");
    }

    #[test]
    fn workflow_result_missing_is_an_error() {
        let body = json!({ "data": { "outputs": {} } });
        assert!(workflow_result_of(&body).is_err());
    }
}
