//! Browser automation over the W3C WebDriver protocol.
//!
//! A single browser session is opened lazily on the first browser tool call
//! and reused for every later call until [`Browser::close`] is invoked.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::error::{required_f64, required_str};
use super::web::normalize_url;
use super::{truncate_chars, truncate_output, Tool, ToolContext, ToolError};
use crate::config::BrowserConfig;

/// W3C identifier for element references in WebDriver payloads.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const PAGE_TEXT_LIMIT: usize = 6_000;
const EVAL_RESULT_LIMIT: usize = 3_000;
const MAX_LINKS: usize = 40;
const MAX_WAIT_SECS: f64 = 30.0;

/// Process-wide browser handle shared by all browser tools.
pub struct Browser {
    config: BrowserConfig,
    http: reqwest::Client,
    session: Mutex<Option<WebDriverSession>>,
}

impl Browser {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            session: Mutex::new(None),
        }
    }

    pub fn webdriver_url(&self) -> &str {
        &self.config.webdriver_url
    }

    pub async fn is_open(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// End the browser session, if one is open.
    pub async fn close(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };

        match session.delete().await {
            Ok(()) => tracing::info!(session = %session.id, "Browser session closed"),
            Err(e) => tracing::warn!("Failed to close browser session: {}", e),
        }
    }

    /// Mark a session as open without contacting the driver.
    #[cfg(test)]
    pub(crate) async fn attach_session(&self, id: &str) {
        *self.session.lock().await = Some(WebDriverSession {
            http: self.http.clone(),
            base: self.config.webdriver_url.trim_end_matches('/').to_string(),
            id: id.to_string(),
        });
    }

    /// The current session, starting one if needed.
    async fn page(&self) -> Result<WebDriverSession, ToolError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let session = WebDriverSession::start(&self.http, &self.config).await?;
        tracing::info!(session = %session.id, "Browser session started");
        *guard = Some(session.clone());
        Ok(session)
    }
}

/// An open WebDriver session.
#[derive(Clone)]
struct WebDriverSession {
    http: reqwest::Client,
    base: String,
    id: String,
}

impl WebDriverSession {
    async fn start(http: &reqwest::Client, config: &BrowserConfig) -> Result<Self, ToolError> {
        let base = config.webdriver_url.trim_end_matches('/').to_string();

        let mut chrome_args = vec!["--window-size=1280,800".to_string()];
        if config.headless {
            chrome_args.push("--headless=new".to_string());
        }

        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": chrome_args }
                }
            }
        });

        let response = http
            .post(format!("{}/session", base))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ToolError::Browser(format!("cannot reach WebDriver at {}: {}", base, e))
            })?;
        let value = read_value(response).await?;

        let id = value["sessionId"]
            .as_str()
            .ok_or_else(|| ToolError::Browser("WebDriver did not return a session id".into()))?
            .to_string();

        let session = Self {
            http: http.clone(),
            base,
            id,
        };

        if let Err(e) = session
            .command(
                Method::POST,
                "/window/rect",
                Some(json!({"width": 1280, "height": 800})),
            )
            .await
        {
            tracing::debug!("Could not resize browser window: {}", e);
        }

        Ok(session)
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ToolError> {
        let url = format!("{}/session/{}{}", self.base, self.id, path);
        let mut request = self.http.request(method.clone(), &url);
        if method != Method::GET && method != Method::DELETE {
            request = request.json(&body.unwrap_or_else(|| json!({})));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::Browser(e.to_string()))?;
        read_value(response).await
    }

    async fn delete(&self) -> Result<(), ToolError> {
        self.command(Method::DELETE, "", None).await.map(|_| ())
    }

    async fn navigate(&self, url: &str) -> Result<(), ToolError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn title(&self) -> Result<String, ToolError> {
        let value = self.command(Method::GET, "/title", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn current_url(&self) -> Result<String, ToolError> {
        let value = self.command(Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn back(&self) -> Result<(), ToolError> {
        self.command(Method::POST, "/back", None).await.map(|_| ())
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, ToolError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, ToolError> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| ToolError::Browser("screenshot payload is not a string".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ToolError::Browser(format!("invalid screenshot data: {}", e)))
    }

    async fn click(&self, element: &str) -> Result<(), ToolError> {
        self.command(Method::POST, &format!("/element/{}/click", element), None)
            .await
            .map(|_| ())
    }

    async fn fill(&self, element: &str, text: &str) -> Result<(), ToolError> {
        self.command(Method::POST, &format!("/element/{}/clear", element), None)
            .await?;
        self.command(
            Method::POST,
            &format!("/element/{}/value", element),
            Some(json!({ "text": text })),
        )
        .await
        .map(|_| ())
    }

    async fn press_key(&self, key: &str) -> Result<(), ToolError> {
        let code = key_code(key);
        let actions = json!({
            "actions": [{
                "type": "key",
                "id": "keyboard",
                "actions": [
                    { "type": "keyDown", "value": code },
                    { "type": "keyUp", "value": code }
                ]
            }]
        });
        self.command(Method::POST, "/actions", Some(actions))
            .await
            .map(|_| ())
    }
}

/// Unwrap the `value` member of a WebDriver response, mapping protocol errors.
async fn read_value(response: reqwest::Response) -> Result<Value, ToolError> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| ToolError::Browser(format!("unreadable WebDriver response: {}", e)))?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        let error = value["error"].as_str().unwrap_or("unknown error");
        let message = value["message"].as_str().unwrap_or_default();
        let first_line = message.lines().next().unwrap_or_default();
        return Err(ToolError::Browser(format!("{}: {}", error, first_line)));
    }

    Ok(value)
}

/// Element id from a script result, if the script returned an element.
fn element_id(value: &Value) -> Option<String> {
    value
        .get(ELEMENT_KEY)
        .and_then(|id| id.as_str())
        .map(|id| id.to_string())
}

/// WebDriver key code for a key name such as `Enter` or `ArrowDown`.
fn key_code(key: &str) -> String {
    let code = match key.to_lowercase().as_str() {
        "enter" | "return" => "\u{E007}",
        "tab" => "\u{E004}",
        "escape" | "esc" => "\u{E00C}",
        "backspace" => "\u{E003}",
        "delete" => "\u{E017}",
        "space" => " ",
        "arrowup" | "up" => "\u{E013}",
        "arrowdown" | "down" => "\u{E015}",
        "arrowleft" | "left" => "\u{E012}",
        "arrowright" | "right" => "\u{E014}",
        "pageup" => "\u{E00E}",
        "pagedown" => "\u{E00F}",
        "home" => "\u{E011}",
        "end" => "\u{E010}",
        _ => return key.to_string(),
    };
    code.to_string()
}

/// Make a bare expression usable as a WebDriver script body.
fn as_script_body(script: &str) -> String {
    if return_statement_re().is_match(script) {
        script.to_string()
    } else {
        format!("return ({});", script.trim().trim_end_matches(';'))
    }
}

/// A `return` keyword in statement position.
fn return_statement_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)(^|[;{}])\s*return\b").expect("static regex"))
}

fn scroll_script(direction: &str) -> Option<&'static str> {
    match direction {
        "down" => Some("window.scrollBy(0, window.innerHeight * 0.9);"),
        "up" => Some("window.scrollBy(0, -window.innerHeight * 0.9);"),
        "top" => Some("window.scrollTo(0, 0);"),
        "bottom" => Some("window.scrollTo(0, document.body.scrollHeight);"),
        _ => None,
    }
}

fn format_links(links: &Value) -> String {
    let lines: Vec<String> = links
        .as_array()
        .map(|items| {
            items
                .iter()
                .take(MAX_LINKS)
                .filter_map(|link| {
                    let text = link["text"].as_str()?.trim();
                    let href = link["href"].as_str()?;
                    (!text.is_empty() && !href.is_empty())
                        .then(|| format!("{} -> {}", truncate_chars(text, 60), href))
                })
                .collect()
        })
        .unwrap_or_default();

    if lines.is_empty() {
        "No links.".to_string()
    } else {
        lines.join("\n")
    }
}

const FIND_CLICKABLE: &str = r#"
const needle = arguments[0];
const lower = needle.toLowerCase();
const visible = el => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
const label = el => (el.innerText || el.value || el.getAttribute('aria-label') || '').trim().toLowerCase();
const pick = sel => Array.from(document.querySelectorAll(sel)).find(el => visible(el) && label(el).includes(lower));
let el = Array.from(document.querySelectorAll('body *')).find(e => visible(e) && e.children.length === 0 && label(e).includes(lower))
  || pick('button, [role=button], input[type=submit], input[type=button]')
  || pick('a, [role=link]');
if (!el) { try { el = document.querySelector(needle); } catch (e) { el = null; } }
return el || null;
"#;

const FIND_FIELD: &str = r#"
const needle = arguments[0];
const lower = needle.toLowerCase();
const fields = Array.from(document.querySelectorAll('input, textarea, [contenteditable=true]'));
const byAttr = attr => fields.find(el => (el.getAttribute(attr) || '').toLowerCase() === lower);
let el = byAttr('placeholder');
if (!el) {
  const lbl = Array.from(document.querySelectorAll('label')).find(l => l.innerText.trim().toLowerCase() === lower);
  if (lbl) el = lbl.control || (lbl.htmlFor ? document.getElementById(lbl.htmlFor) : null);
}
el = el || byAttr('aria-label') || byAttr('name');
if (!el) { try { el = document.querySelector(needle); } catch (e) { el = null; } }
el = el || document.querySelector('input[type=search], [role=searchbox]');
return el || null;
"#;

const SELECT_OPTION: &str = r#"
const [selector, wanted] = arguments;
let select;
try { select = document.querySelector(selector); } catch (e) { return null; }
if (!select || !select.options) return null;
const options = Array.from(select.options);
let how = 'label';
let opt = options.find(o => o.text.trim() === wanted);
if (!opt) { how = 'value'; opt = options.find(o => o.value === wanted); }
if (!opt) return null;
select.value = opt.value;
select.dispatchEvent(new Event('input', { bubbles: true }));
select.dispatchEvent(new Event('change', { bubbles: true }));
return how;
"#;

const COLLECT_LINKS: &str = r#"
return Array.from(document.querySelectorAll('a[href]'))
  .map(a => ({ text: (a.innerText || '').trim(), href: a.href }))
  .filter(l => l.text && l.href);
"#;

/// The individual browser operations exposed as tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrowserAction {
    Goto,
    Click,
    Type,
    GetText,
    Screenshot,
    GetLinks,
    Scroll,
    PressKey,
    SelectOption,
    Wait,
    CurrentUrl,
    GoBack,
    EvalJs,
}

const ACTIONS: [BrowserAction; 13] = [
    BrowserAction::Goto,
    BrowserAction::Click,
    BrowserAction::Type,
    BrowserAction::GetText,
    BrowserAction::Screenshot,
    BrowserAction::GetLinks,
    BrowserAction::Scroll,
    BrowserAction::PressKey,
    BrowserAction::SelectOption,
    BrowserAction::Wait,
    BrowserAction::CurrentUrl,
    BrowserAction::GoBack,
    BrowserAction::EvalJs,
];

pub(super) fn all(browser: Arc<Browser>) -> Vec<Arc<dyn Tool>> {
    ACTIONS
        .iter()
        .map(|&action| {
            Arc::new(BrowserTool {
                action,
                browser: browser.clone(),
            }) as Arc<dyn Tool>
        })
        .collect()
}

/// A browser tool bound to the shared session.
pub struct BrowserTool {
    action: BrowserAction,
    browser: Arc<Browser>,
}

fn string_params(params: &[(&str, &str)]) -> Value {
    let properties: serde_json::Map<String, Value> = params
        .iter()
        .map(|(name, description)| {
            (
                name.to_string(),
                json!({ "type": "string", "description": description }),
            )
        })
        .collect();
    let required: Vec<&str> = params.iter().map(|(name, _)| *name).collect();
    json!({ "type": "object", "properties": properties, "required": required })
}

fn no_params() -> Value {
    json!({ "type": "object", "properties": {} })
}

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        match self.action {
            BrowserAction::Goto => "browser_goto",
            BrowserAction::Click => "browser_click",
            BrowserAction::Type => "browser_type",
            BrowserAction::GetText => "browser_get_text",
            BrowserAction::Screenshot => "browser_screenshot",
            BrowserAction::GetLinks => "browser_get_links",
            BrowserAction::Scroll => "browser_scroll",
            BrowserAction::PressKey => "browser_press_key",
            BrowserAction::SelectOption => "browser_select_option",
            BrowserAction::Wait => "browser_wait",
            BrowserAction::CurrentUrl => "browser_current_url",
            BrowserAction::GoBack => "browser_go_back",
            BrowserAction::EvalJs => "browser_eval_js",
        }
    }

    fn description(&self) -> &str {
        match self.action {
            BrowserAction::Goto => "Navigate to a URL in the browser.",
            BrowserAction::Click => "Click an element by visible text or CSS selector.",
            BrowserAction::Type => {
                "Type text into a form field (placeholder, label, or CSS selector)."
            }
            BrowserAction::GetText => "Get all visible text from the current page (max 6000 chars).",
            BrowserAction::Screenshot => "Take a screenshot of the page and save it as PNG.",
            BrowserAction::GetLinks => "Return up to 40 links from the current page.",
            BrowserAction::Scroll => "Scroll the page: up, down, top, or bottom.",
            BrowserAction::PressKey => "Press a keyboard key: Enter, Tab, Escape, ArrowDown, etc.",
            BrowserAction::SelectOption => "Select an option from a dropdown.",
            BrowserAction::Wait => "Wait N seconds (max 30).",
            BrowserAction::CurrentUrl => "Return the current URL and page title.",
            BrowserAction::GoBack => "Go back to the previous page.",
            BrowserAction::EvalJs => "Execute JavaScript on the page and return the result.",
        }
    }

    fn parameters_schema(&self) -> Value {
        match self.action {
            BrowserAction::Goto => string_params(&[("url", "Address to open")]),
            BrowserAction::Click => string_params(&[("selector", "Visible text or CSS selector")]),
            BrowserAction::Type => string_params(&[
                ("selector", "Placeholder, label, or CSS selector of the field"),
                ("text", "Text to type"),
            ]),
            BrowserAction::Screenshot => string_params(&[("path", "Output file path")]),
            BrowserAction::Scroll => json!({
                "type": "object",
                "properties": {
                    "direction": {
                        "type": "string",
                        "enum": ["up", "down", "top", "bottom"],
                        "description": "Scroll direction"
                    }
                },
                "required": ["direction"]
            }),
            BrowserAction::PressKey => string_params(&[("key", "Key name")]),
            BrowserAction::SelectOption => string_params(&[
                ("selector", "CSS selector of the <select> element"),
                ("value", "Option label or value"),
            ]),
            BrowserAction::Wait => json!({
                "type": "object",
                "properties": {
                    "seconds": { "type": "number", "description": "Seconds to wait" }
                },
                "required": ["seconds"]
            }),
            BrowserAction::EvalJs => string_params(&[("script", "JavaScript to run")]),
            BrowserAction::GetText
            | BrowserAction::GetLinks
            | BrowserAction::CurrentUrl
            | BrowserAction::GoBack => no_params(),
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        // Waiting needs no page; keep it from opening a browser.
        if self.action == BrowserAction::Wait {
            let seconds = required_f64(args, "seconds")?.clamp(0.0, MAX_WAIT_SECS);
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            return Ok(format!("Waited {}s", seconds));
        }

        let page = self.browser.page().await?;

        match self.action {
            BrowserAction::Goto => {
                let url = normalize_url(required_str(args, "url")?);
                page.navigate(&url).await?;
                let title = page.title().await?;
                Ok(format!("Opened: {} | Title: {}", url, title))
            }
            BrowserAction::Click => {
                let selector = required_str(args, "selector")?;
                let found = page.execute(FIND_CLICKABLE, vec![json!(selector)]).await?;
                let Some(element) = element_id(&found) else {
                    return Ok(format!("Element not found: {}", selector));
                };
                page.click(&element).await?;
                Ok(format!("Clicked: {}", selector))
            }
            BrowserAction::Type => {
                let selector = required_str(args, "selector")?;
                let text = required_str(args, "text")?;
                let found = page.execute(FIND_FIELD, vec![json!(selector)]).await?;
                let Some(element) = element_id(&found) else {
                    return Ok(format!("Field not found: {}", selector));
                };
                page.fill(&element, text).await?;
                Ok(format!("Typed '{}' into: {}", text, selector))
            }
            BrowserAction::GetText => {
                let text = page
                    .execute("return document.body ? document.body.innerText : '';", vec![])
                    .await?;
                Ok(truncate_output(text.as_str().unwrap_or_default(), PAGE_TEXT_LIMIT))
            }
            BrowserAction::Screenshot => {
                let mut raw = required_str(args, "path")?.to_string();
                if !raw.to_lowercase().ends_with(".png") {
                    raw.push_str(".png");
                }
                let path = ctx.resolve(&raw);
                let png = page.screenshot().await?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| ToolError::io("Screenshot error", e))?;
                }
                tokio::fs::write(&path, png)
                    .await
                    .map_err(|e| ToolError::io("Screenshot error", e))?;
                Ok(format!("Screenshot saved: {}", path.display()))
            }
            BrowserAction::GetLinks => {
                let links = page.execute(COLLECT_LINKS, vec![]).await?;
                Ok(format_links(&links))
            }
            BrowserAction::Scroll => {
                let direction = required_str(args, "direction")?;
                let script = scroll_script(direction).ok_or_else(|| {
                    ToolError::invalid("direction", "expected up, down, top or bottom")
                })?;
                page.execute(script, vec![]).await?;
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(format!("Scrolled: {}", direction))
            }
            BrowserAction::PressKey => {
                let key = required_str(args, "key")?;
                page.press_key(key).await?;
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(format!("Pressed: {}", key))
            }
            BrowserAction::SelectOption => {
                let selector = required_str(args, "selector")?;
                let value = required_str(args, "value")?;
                let how = page
                    .execute(SELECT_OPTION, vec![json!(selector), json!(value)])
                    .await?;
                if how.is_null() {
                    Ok(format!("Option '{}' not found in: {}", value, selector))
                } else {
                    Ok(format!("Selected '{}' in: {}", value, selector))
                }
            }
            BrowserAction::CurrentUrl => {
                let url = page.current_url().await?;
                let title = page.title().await?;
                Ok(format!("URL: {} | Title: {}", url, title))
            }
            BrowserAction::GoBack => {
                page.back().await?;
                Ok(format!("Went back. URL: {}", page.current_url().await?))
            }
            BrowserAction::EvalJs => {
                let script = required_str(args, "script")?;
                let result = page.execute(&as_script_body(script), vec![]).await?;
                Ok(match result {
                    Value::Null => "OK (no result)".to_string(),
                    Value::String(s) if s.is_empty() => "OK (no result)".to_string(),
                    Value::String(s) => truncate_chars(&s, EVAL_RESULT_LIMIT),
                    other => truncate_chars(&other.to_string(), EVAL_RESULT_LIMIT),
                })
            }
            BrowserAction::Wait => unreachable!("handled before opening the page"),
        }
    }
}
