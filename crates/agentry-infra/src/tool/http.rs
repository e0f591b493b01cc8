//! HttpToolExecutor -- [`ToolExecutor`] over the external tool service.
//!
//! Calls `POST {base_url}/tools/execute` with `{"toolId", "input"}`. The
//! service answers with `{"result": ..}`; bodies without `result` are used
//! as-is. `{"success": false, "error": ..}` is a tool failure.

use std::time::Duration;

use agentry_core::tool::ToolExecutor;
use agentry_types::config::ServiceEndpoint;
use agentry_types::error::ToolError;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest<'a> {
    tool_id: &'a str,
    input: &'a serde_json::Value,
}

pub struct HttpToolExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpToolExecutor {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// `None` when the endpoint has no URL configured.
    pub fn from_endpoint(endpoint: &ServiceEndpoint) -> Result<Option<Self>, ToolError> {
        endpoint
            .url
            .as_deref()
            .map(|url| Self::new(url, Duration::from_secs(endpoint.timeout_secs)))
            .transpose()
    }

    fn url(&self) -> String {
        format!("{}/tools/execute", self.base_url)
    }
}

/// Pull the tool output out of a tool-service response body.
fn extract_result(tool_name: &str, body: serde_json::Value) -> Result<serde_json::Value, ToolError> {
    if body.get("success").and_then(|s| s.as_bool()) == Some(false) {
        let message = body
            .get("error")
            .map(|e| match e.as_str() {
                Some(s) => s.to_string(),
                None => e.to_string(),
            })
            .unwrap_or_else(|| "tool reported failure".to_string());
        return Err(ToolError::Execution {
            tool: tool_name.to_string(),
            message,
        });
    }

    match body {
        serde_json::Value::Object(mut map) => match map.remove("result") {
            Some(result) if !result.is_null() => Ok(result),
            _ => Ok(serde_json::Value::Object(map)),
        },
        other => Ok(other),
    }
}

impl ToolExecutor for HttpToolExecutor {
    async fn execute(
        &self,
        tool_name: &str,
        input: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let response = self
            .client
            .post(self.url())
            .json(&ExecuteRequest {
                tool_id: tool_name,
                input,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout(e.to_string())
                } else {
                    ToolError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ToolError::UnknownTool(tool_name.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Execution {
                tool: tool_name.to_string(),
                message: format!("HTTP {status}: {body}"),
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|e| ToolError::Execution {
            tool: tool_name.to_string(),
            message: format!("invalid response body: {e}"),
        })?;

        tracing::debug!(tool = tool_name, "tool service call succeeded");
        extract_result(tool_name, body)
    }
}
