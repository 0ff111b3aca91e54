//! Plain HTTP page fetch, no browser involved.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use super::error::required_str;
use super::{truncate_output, Tool, ToolContext, ToolError};

const PAGE_TEXT_LIMIT: usize = 8_000;
const FETCH_TIMEOUT_SECS: u64 = 15;

/// Fetch a page and return its readable text.
pub struct ReadWebpage;

#[async_trait]
impl Tool for ReadWebpage {
    fn name(&self) -> &str {
        "read_webpage"
    }

    fn description(&self) -> &str {
        "Fast HTTP text fetch without a browser (max 8000 chars)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        let url = normalize_url(required_str(args, "url")?);

        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;

        let response = client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout(FETCH_TIMEOUT_SECS)
            } else {
                ToolError::from(e)
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http(format!("HTTP {} for {}", status, url)));
        }

        let body = response.text().await?;
        let text = extract_text_from_html(&body);

        if text.is_empty() {
            Ok("No content.".to_string())
        } else {
            Ok(truncate_output(&text, PAGE_TEXT_LIMIT))
        }
    }
}

/// Prefix `https://` when the scheme is missing.
pub(crate) fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

fn hidden_blocks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<(script|style|nav|footer|head|noscript)\b[^>]*>.*?</(script|style|nav|footer|head|noscript)\s*>",
        )
        .expect("static regex")
    })
}

fn tags() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"))
}

/// Readable text of an HTML document, one text run per line.
fn extract_text_from_html(html: &str) -> String {
    let visible = hidden_blocks().replace_all(html, "\n");
    let text = tags().replace_all(&visible, "\n");

    text.lines()
        .map(|line| html_decode(line.trim()))
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Basic HTML entity decoding.
fn html_decode(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
