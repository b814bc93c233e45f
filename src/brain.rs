//! The orchestrator: owns the tool-calling conversation with the external
//! model and dispatches its structured action requests back to the page.
//!
//! One conversation exists per chat turn. It grows monotonically while the
//! model keeps requesting tools and is dropped when the turn ends; nothing
//! persists across turns.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::channel::PageChannel;
use crate::classifier;
use crate::dom;
use crate::error::{AgentError, Result};
use crate::hands;
use crate::types::{ChatMessage, PageSnapshot, ToolCall};

/// Name of the single tool declared to the model.
pub const EXECUTE_CODE_TOOL: &str = "executeCode";

/// Returned when the model's final reply carries no text.
const EMPTY_REPLY_FALLBACK: &str = "Action completed successfully";

const SYSTEM_PROMPT: &str = "You are a browsing agent that can read web pages and act on them by \
calling the executeCode function with small DOM snippets. You receive structured page \
information: clickable elements, links, form fields, headings and a text sample.

AVAILABLE ACTIONS:
1. DATA EXTRACTION: simple DOM reads such as \
document.querySelectorAll('a[data-hovercard-type=\"user\"]'), element.textContent or \
element.getAttribute('href'). Use plain queries; complex expressions and eval() are not \
supported and will be refused.
2. CLICKING: document.querySelector('selector').click(). Prefer the selectors provided in \
the page context; the system automatically tries alternative selectors when the first one \
fails.
3. CSS MODIFICATION: direct style changes like \
document.querySelector('selector').style.property = 'value', or rule injection via \
insertRule.
4. NAVIGATION: window.location.href = 'https://example.com', or clicking links from the \
LINKS section.

IMPORTANT:
- Use the structured page information to understand what is available before acting.
- Prefer the provided selectors for reliable targeting.
- Keep each executeCode call to one simple operation.

Respond conversationally and perform the requested actions with executeCode.";

/// One assistant reply, possibly carrying tool invocations.
#[derive(Debug, Clone, Default)]
pub struct AssistantReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Seam to the external model, mockable in tests.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> Result<AssistantReply>;
}

/// Chat-completions client for an OpenAI-compatible API.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Point at an API-compatible service.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> Result<AssistantReply> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }

        tracing::debug!(model = %self.model, messages = messages.len(), "requesting completion");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::ModelApi {
                status: status.as_u16(),
                body,
            });
        }

        let payload: serde_json::Value = response.json().await?;
        let message = &payload["choices"][0]["message"];
        if message.is_null() {
            return Err(AgentError::InvalidModelReply(payload.to_string()));
        }

        let content = message["content"].as_str().map(String::from);
        let tool_calls = match message.get("tool_calls") {
            Some(value) if !value.is_null() => serde_json::from_value(value.clone())?,
            _ => Vec::new(),
        };
        tracing::debug!(tool_calls = tool_calls.len(), "completion received");
        Ok(AssistantReply {
            content,
            tool_calls,
        })
    }
}

#[derive(Deserialize)]
struct ExecuteCodeArgs {
    code: String,
}

/// Owns one model client and one page channel; every chat turn flows
/// through here.
pub struct Orchestrator {
    model: Box<dyn ModelClient>,
    page: Arc<dyn PageChannel>,
    has_credential: bool,
}

impl Orchestrator {
    pub fn new(
        model: Box<dyn ModelClient>,
        page: Arc<dyn PageChannel>,
        has_credential: bool,
    ) -> Self {
        Self {
            model,
            page,
            has_credential,
        }
    }

    /// Run one full chat turn: ground the model in a page snapshot, then
    /// alternate between model replies and tool execution until the model
    /// stops requesting tools.
    pub async fn handle_chat(&self, prompt: &str) -> Result<String> {
        if !self.has_credential {
            tracing::warn!("chat request refused: no API key is configured");
            return Ok("Missing API key".to_string());
        }

        let snapshot = self.capture_snapshot().await?;
        tracing::info!(url = %snapshot.url, "page snapshot captured");

        let tools = vec![execute_code_tool()];
        let mut messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "{}\n\nUser request: {prompt}",
                render_context(&snapshot)
            )),
        ];

        let mut reply = self.model.complete(&messages, &tools).await?;

        while !reply.tool_calls.is_empty() {
            for call in &reply.tool_calls {
                self.process_tool_call(call, &reply, &mut messages).await;
            }
            reply = self.model.complete(&messages, &tools).await?;
        }

        Ok(reply
            .content
            .filter(|content| !content.is_empty())
            .unwrap_or_else(|| EMPTY_REPLY_FALLBACK.to_string()))
    }

    /// Direct command path: classify and execute one raw code string with
    /// no model round-trip.
    pub async fn handle_dsl(&self, code: &str) -> Result<String> {
        tracing::info!("dsl command received");
        let intent = classifier::classify(code);
        let result = hands::execute(&intent, self.page.as_ref()).await;
        if result.is_empty() {
            Ok("DSL command executed successfully".to_string())
        } else {
            Ok(result)
        }
    }

    /// Handle one tool invocation. Argument-parse failures and execution
    /// misses are folded into the conversation as tool results so the
    /// model can correct itself; they never abort the turn.
    async fn process_tool_call(
        &self,
        call: &ToolCall,
        reply: &AssistantReply,
        messages: &mut Vec<ChatMessage>,
    ) {
        let echo = ChatMessage::assistant_echo(reply.content.clone(), reply.tool_calls.clone());

        if call.function.name != EXECUTE_CODE_TOOL {
            tracing::warn!(tool = %call.function.name, "model requested an undeclared tool");
            messages.push(echo);
            messages.push(ChatMessage::tool_result(
                &call.id,
                format!("Unknown tool: {}", call.function.name),
            ));
            return;
        }

        let arguments: ExecuteCodeArgs = match serde_json::from_str(&call.function.arguments) {
            Ok(arguments) => arguments,
            Err(parse_error) => {
                tracing::warn!(%parse_error, "tool arguments did not parse");
                messages.push(echo);
                messages.push(ChatMessage::tool_result(
                    &call.id,
                    format!("Error parsing tool arguments: {parse_error}"),
                ));
                return;
            }
        };

        let intent = classifier::classify(&arguments.code);
        tracing::debug!(?intent, "executing classified action");
        let result = hands::execute(&intent, self.page.as_ref()).await;
        tracing::info!(%result, "action executed");

        messages.push(echo);
        messages.push(ChatMessage::tool_result(&call.id, result));
    }

    /// The protocol requires grounded context: a turn with no readable
    /// page fails rather than letting the model guess.
    async fn capture_snapshot(&self) -> Result<PageSnapshot> {
        let document = self.page.page_info().await?;
        if document.html.trim().is_empty() {
            return Err(AgentError::ContentScript(
                "Unable to get page information. The page may not be loaded.".to_string(),
            ));
        }
        Ok(dom::perceive(&document.url, &document.title, &document.html))
    }
}

/// Render the snapshot into the bounded context block the model sees.
pub fn render_context(snapshot: &PageSnapshot) -> String {
    let title = if snapshot.title.is_empty() {
        "No title"
    } else {
        &snapshot.title
    };
    let mut context = format!("Current page URL: {}\nPage Title: {title}\n\n", snapshot.url);

    if !snapshot.clickable_elements.is_empty() {
        context.push_str("CLICKABLE ELEMENTS:\n");
        for (index, element) in snapshot.clickable_elements.iter().enumerate() {
            context.push_str(&format!(
                "{}. {}: \"{}\" (selector: {})\n",
                index + 1,
                element.kind.to_uppercase(),
                element.text,
                element.selector
            ));
        }
        context.push('\n');
    }

    if !snapshot.links.is_empty() {
        context.push_str("LINKS:\n");
        for (index, link) in snapshot.links.iter().enumerate() {
            context.push_str(&format!(
                "{}. \"{}\" -> {} (selector: {})\n",
                index + 1,
                link.text,
                link.href,
                link.selector
            ));
        }
        context.push('\n');
    }

    if !snapshot.form_elements.is_empty() {
        context.push_str("FORM ELEMENTS:\n");
        for (index, element) in snapshot.form_elements.iter().enumerate() {
            let label = element
                .placeholder
                .as_deref()
                .or(element.name.as_deref())
                .unwrap_or("unnamed");
            context.push_str(&format!(
                "{}. {}: {label} (selector: {})\n",
                index + 1,
                element.kind.to_uppercase(),
                element.selector
            ));
        }
        context.push('\n');
    }

    if !snapshot.headings.is_empty() {
        context.push_str("PAGE STRUCTURE (HEADINGS):\n");
        for (index, heading) in snapshot.headings.iter().enumerate() {
            context.push_str(&format!(
                "{}. {}: \"{}\"\n",
                index + 1,
                heading.level.to_uppercase(),
                heading.text
            ));
        }
        context.push('\n');
    }

    if !snapshot.visible_text.is_empty() {
        let sample: String = snapshot.visible_text.chars().take(500).collect();
        let ellipsis = if snapshot.visible_text.chars().count() > 500 {
            "..."
        } else {
            ""
        };
        context.push_str(&format!("VISIBLE TEXT (SAMPLE):\n{sample}{ellipsis}\n\n"));
    }

    if snapshot.raw_html_preview.is_empty() {
        context.push_str("RAW HTML (TRUNCATED):\nNo HTML available");
    } else {
        context.push_str(&format!(
            "RAW HTML (TRUNCATED):\n{}...",
            snapshot.raw_html_preview
        ));
    }

    context
}

/// The one tool declared to the model.
fn execute_code_tool() -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": EXECUTE_CODE_TOOL,
            "description": "Execute JavaScript code on the current page",
            "parameters": {
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "JavaScript code to execute"
                    }
                },
                "required": ["code"]
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::perceive;

    #[test]
    fn context_block_enumerates_every_section() {
        let html = r#"<body>
            <h1>Welcome</h1>
            <button id="go">Go</button>
            <a href="/about">About us</a>
            <input type="text" placeholder="Search">
            <p>Some page prose for the sample.</p>
        </body>"#;
        let snapshot = perceive("https://example.com/", "Example", html);
        let context = render_context(&snapshot);

        assert!(context.starts_with("Current page URL: https://example.com/"));
        assert!(context.contains("Page Title: Example"));
        assert!(context.contains("CLICKABLE ELEMENTS:\n1. BUTTON: \"Go\" (selector: #go)"));
        assert!(context.contains("LINKS:\n1. \"About us\" -> /about"));
        assert!(context.contains("FORM ELEMENTS:\n1. TEXT: Search"));
        assert!(context.contains("PAGE STRUCTURE (HEADINGS):\n1. H1: \"Welcome\""));
        assert!(context.contains("VISIBLE TEXT (SAMPLE):"));
        assert!(context.contains("RAW HTML (TRUNCATED):"));
    }

    #[test]
    fn empty_snapshot_still_renders_url_and_html_sections() {
        let snapshot = PageSnapshot {
            url: "https://blank.example/".to_string(),
            ..PageSnapshot::default()
        };
        let context = render_context(&snapshot);
        assert!(context.contains("Page Title: No title"));
        assert!(!context.contains("CLICKABLE ELEMENTS"));
        assert!(context.contains("RAW HTML (TRUNCATED):\nNo HTML available"));
    }

    #[test]
    fn declared_tool_matches_the_protocol_shape() {
        let tool = execute_code_tool();
        assert_eq!(tool["type"], "function");
        assert_eq!(tool["function"]["name"], EXECUTE_CODE_TOOL);
        assert_eq!(tool["function"]["parameters"]["required"][0], "code");
    }
}
