//! Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use url::Url;

use super::{
    GenerationConfig, LlmClient, LlmError, Message, Part, Role, ToolCall, ToolResult, ToolSchema,
};

/// Client for the Gemini REST API.
pub struct GeminiClient {
    client: reqwest::Client,
    host: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String, host: String) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self {
            client,
            host,
            api_key,
        })
    }

    fn endpoint(&self, model: &str) -> Result<Url, LlmError> {
        let base = Url::parse(&self.host)
            .map_err(|e| LlmError::Request(format!("Invalid base URL: {}", e)))?;
        base.join(&format!("v1beta/models/{}:generateContent", model))
            .map_err(|e| LlmError::Request(format!("Failed to construct endpoint URL: {}", e)))
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        history: &[Message],
        tools: &[ToolSchema],
        config: &GenerationConfig,
    ) -> Result<Message, LlmError> {
        let url = self.endpoint(model)?;
        let payload = build_request(history, tools, config);

        tracing::debug!(model, messages = history.len(), "Calling Gemini");

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), &body));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| LlmError::InvalidResponse(format!("{}: {}", e, body)))?;
        parse_response(&value)
    }
}

/// Build the `generateContent` request body.
pub(crate) fn build_request(
    history: &[Message],
    tools: &[ToolSchema],
    config: &GenerationConfig,
) -> Value {
    let contents: Vec<Value> = history.iter().map(format_message).collect();

    let mut payload = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": config.temperature,
            "maxOutputTokens": config.max_output_tokens,
        },
    });

    if !config.system_instruction.is_empty() {
        payload["systemInstruction"] = json!({
            "parts": [{ "text": config.system_instruction }]
        });
    }

    if !tools.is_empty() {
        let declarations: Vec<Value> = tools.iter().map(format_tool).collect();
        payload["tools"] = json!([{ "functionDeclarations": declarations }]);
    }

    payload
}

fn format_message(message: &Message) -> Value {
    // Gemini only knows "user" and "model"; tool output travels as user content.
    let role = match message.role {
        Role::Model => "model",
        Role::User | Role::Tool => "user",
    };

    let parts: Vec<Value> = message
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text(text) if text.is_empty() => None,
            Part::Text(text) => Some(json!({ "text": text })),
            Part::ToolCall(call) => {
                let mut function_call = Map::new();
                function_call.insert("name".to_string(), json!(call.name));
                if call.arguments.as_object().is_some_and(|a| !a.is_empty()) {
                    function_call.insert("args".to_string(), call.arguments.clone());
                }
                Some(json!({ "functionCall": function_call }))
            }
            Part::ToolResult(result) => Some(json!({
                "functionResponse": {
                    "name": result.name,
                    "response": { "result": result.value },
                }
            })),
        })
        .collect();

    json!({ "role": role, "parts": parts })
}

fn format_tool(tool: &ToolSchema) -> Value {
    let mut declaration = Map::new();
    declaration.insert("name".to_string(), json!(tool.name));
    declaration.insert("description".to_string(), json!(tool.description));

    // Gemini rejects an object schema without properties.
    if tool
        .parameters
        .get("properties")
        .and_then(|p| p.as_object())
        .is_some_and(|p| !p.is_empty())
    {
        declaration.insert("parameters".to_string(), tool.parameters.clone());
    }

    Value::Object(declaration)
}

/// Convert the first candidate of a response into a model message.
pub(crate) fn parse_response(response: &Value) -> Result<Message, LlmError> {
    let candidate = response
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| {
            let reason = response
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates");
            LlmError::InvalidResponse(format!("Empty response: {}", reason))
        })?;

    let empty = Vec::new();
    let raw_parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .unwrap_or(&empty);

    let mut parts = Vec::with_capacity(raw_parts.len());
    for raw in raw_parts {
        if let Some(text) = raw.get("text").and_then(|t| t.as_str()) {
            parts.push(Part::Text(text.to_string()));
        } else if let Some(call) = raw.get("functionCall") {
            let name = call
                .get("name")
                .and_then(|n| n.as_str())
                .ok_or_else(|| LlmError::InvalidResponse("functionCall without name".into()))?;
            let arguments = match call.get("args") {
                Some(Value::Object(args)) => Value::Object(args.clone()),
                _ => Value::Object(Map::new()),
            };
            parts.push(Part::ToolCall(ToolCall::new(name, arguments)));
        } else if let Some(resp) = raw.get("functionResponse") {
            // Not expected from the model.
            parts.push(Part::ToolResult(ToolResult {
                name: resp["name"].as_str().unwrap_or_default().to_string(),
                value: resp["response"].to_string(),
            }));
        }
    }

    Ok(Message::model(parts))
}
