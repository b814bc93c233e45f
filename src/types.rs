use serde::{Deserialize, Serialize};

/// Caps applied while extracting a snapshot. They bound the token cost of
/// every model request and are enforced at extraction time, not by the
/// consumer.
pub const MAX_CLICKABLE_ELEMENTS: usize = 20;
pub const MAX_LINKS: usize = 15;
pub const MAX_FORM_ELEMENTS: usize = 15;
pub const MAX_HEADINGS: usize = 10;
pub const MAX_VISIBLE_TEXT_CHARS: usize = 2000;
pub const MAX_HTML_PREVIEW_CHARS: usize = 2000;

/// Raw page state fetched over the dispatcher before perception runs.
#[derive(Debug, Clone, Default)]
pub struct PageDocument {
    pub url: String,
    pub title: String,
    pub html: String,
}

/// Bounded structural summary of the active page, used as model context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub raw_html_preview: String,
    pub clickable_elements: Vec<ClickableElement>,
    pub links: Vec<LinkElement>,
    pub form_elements: Vec<FormElement>,
    pub headings: Vec<Heading>,
    pub visible_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickableElement {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkElement {
    pub text: String,
    pub href: String,
    pub selector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormElement {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heading {
    pub level: String,
    pub text: String,
    pub selector: String,
}

/// How the classifier saw the element lookup in the planner's code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    Query,
    Id,
    Class,
    Tag,
}

/// A classified, typed DOM operation. Produced only by the classifier,
/// consumed only by the executor, immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ActionIntent {
    Click {
        selector: Option<String>,
        selector_type: SelectorKind,
    },
    ModifyCss {
        css_code: String,
    },
    Navigate {
        url: Option<String>,
    },
    Extract {
        code: String,
    },
}

/// A single requested action from the model. `arguments` is untrusted text
/// and must be parsed defensively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

fn default_call_type() -> String {
    "function".to_string()
}

/// A message in the conversation sent to the LLM. The sequence is
/// append-only, created fresh per chat turn and discarded when the turn
/// ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// The assistant turn echoed back into history while its tool calls
    /// are being processed.
    pub fn assistant_echo(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: &str, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_deserializes_without_type_field() {
        let call: ToolCall = serde_json::from_str(
            r#"{"id":"call_1","function":{"name":"executeCode","arguments":"{}"}}"#,
        )
        .unwrap();
        assert_eq!(call.call_type, "function");
        assert_eq!(call.function.name, "executeCode");
    }

    #[test]
    fn intent_serializes_with_action_tag() {
        let intent = ActionIntent::Click {
            selector: Some(".x".to_string()),
            selector_type: SelectorKind::Query,
        };
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["action"], "click");
        assert_eq!(json["selectorType"], "query");
    }

    #[test]
    fn tool_message_carries_its_invocation_id() {
        let message = ChatMessage::tool_result("call_9", "done");
        assert_eq!(message.role, "tool");
        assert_eq!(message.tool_call_id.as_deref(), Some("call_9"));
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("tool_calls").is_none());
    }
}
