//! Inbound HTTP surface: a minimal chat page plus the JSON command API.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::brain::Orchestrator;
use crate::error::AgentError;

#[derive(Deserialize)]
pub struct ChatPayload {
    pub prompt: String,
}

#[derive(Deserialize)]
pub struct DslPayload {
    pub code: String,
}

/// Envelope for both command endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub timestamp: String,
}

impl CommandResponse {
    pub fn ok(data: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_type: None,
            suggestion: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Chat failures carry the error type and, when the message matches a
    /// known pattern, a suggestion.
    pub fn chat_error(error: &AgentError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_type: Some(error.error_type().to_string()),
            suggestion: error.suggestion().map(str::to_string),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// The dsl envelope is plainer: success flag, error text, timestamp.
    pub fn dsl_error(error: &AgentError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_type: None,
            suggestion: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/dsl", post(dsl_handler))
        .route(
            "/favicon.ico",
            get(|| async { axum::http::StatusCode::NO_CONTENT }),
        )
        .with_state(orchestrator)
}

/// Serve on the first free port in `port..port+10`.
pub async fn serve(orchestrator: Arc<Orchestrator>, port: u16) -> anyhow::Result<()> {
    let app = router(orchestrator);

    let mut bound = None;
    for candidate in port..port + 10 {
        match tokio::net::TcpListener::bind(("127.0.0.1", candidate)).await {
            Ok(listener) => {
                bound = Some((listener, candidate));
                break;
            }
            Err(_) => continue,
        }
    }
    let Some((listener, actual)) = bound else {
        anyhow::bail!("could not bind any port in {}..{}", port, port + 10);
    };

    tracing::info!("agent UI listening on http://127.0.0.1:{actual}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn chat_handler(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(payload): Json<ChatPayload>,
) -> Json<CommandResponse> {
    match orchestrator.handle_chat(&payload.prompt).await {
        Ok(data) => Json(CommandResponse::ok(data)),
        Err(error) => {
            tracing::error!(%error, "chat turn failed");
            Json(CommandResponse::chat_error(&error))
        }
    }
}

async fn dsl_handler(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(payload): Json<DslPayload>,
) -> Json<CommandResponse> {
    match orchestrator.handle_dsl(&payload.code).await {
        Ok(data) => Json(CommandResponse::ok(data)),
        Err(error) => {
            tracing::error!(%error, "dsl command failed");
            Json(CommandResponse::dsl_error(&error))
        }
    }
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Tab Pilot</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body {
    background: #0a0a0f;
    color: #e0e0e0;
    font-family: 'Segoe UI', system-ui, sans-serif;
    height: 100vh;
    display: flex;
    flex-direction: column;
  }
  header { padding: 20px 28px; border-bottom: 1px solid #1a1a2e; }
  header h1 { font-size: 18px; font-weight: 600; color: #fff; }
  .main {
    flex: 1; display: flex; flex-direction: column;
    max-width: 760px; width: 100%; margin: 0 auto;
    padding: 20px 28px; gap: 14px; overflow: hidden;
  }
  #log { flex: 1; overflow-y: auto; display: flex; flex-direction: column; gap: 8px; }
  .entry { padding: 10px 14px; border-radius: 8px; font-size: 14px; line-height: 1.5; white-space: pre-wrap; }
  .entry.user { background: #1a1a2e; border-left: 3px solid #6366f1; }
  .entry.agent { background: #111118; border-left: 3px solid #3b82f6; }
  .entry.error { background: #1a0a0a; border-left: 3px solid #ef4444; color: #fca5a5; }
  .input-area { display: flex; gap: 8px; }
  #prompt {
    flex: 1; background: #111118; border: 1px solid #222; border-radius: 8px;
    padding: 11px 14px; color: #fff; font-size: 15px; outline: none;
  }
  #prompt:focus { border-color: #6366f1; }
  #prompt:disabled { opacity: 0.5; }
  button {
    background: #6366f1; color: #fff; border: none; border-radius: 8px;
    padding: 11px 22px; font-size: 14px; font-weight: 600; cursor: pointer;
  }
  button:disabled { background: #333; cursor: not-allowed; }
</style>
</head>
<body>
  <header><h1>Tab Pilot</h1></header>
  <div class="main">
    <div id="log"></div>
    <div class="input-area">
      <input type="text" id="prompt" placeholder="Tell the agent what to do on the current tab... (prefix with / for a raw command)" autofocus />
      <button id="send" onclick="send()">Send</button>
    </div>
  </div>
<script>
  const log = document.getElementById('log');
  const promptBox = document.getElementById('prompt');
  const sendBtn = document.getElementById('send');

  function addEntry(cls, text) {
    const div = document.createElement('div');
    div.className = 'entry ' + cls;
    div.textContent = text;
    log.appendChild(div);
    log.scrollTop = log.scrollHeight;
  }

  function setBusy(busy) {
    promptBox.disabled = busy;
    sendBtn.disabled = busy;
    if (!busy) promptBox.focus();
  }

  async function send() {
    const text = promptBox.value.trim();
    if (!text || promptBox.disabled) return;
    promptBox.value = '';
    addEntry('user', text);
    setBusy(true);
    const dsl = text.startsWith('/');
    const endpoint = dsl ? '/api/dsl' : '/api/chat';
    const body = dsl ? { code: text.slice(1) } : { prompt: text };
    try {
      const res = await fetch(endpoint, {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify(body),
      });
      const reply = await res.json();
      if (reply.success) {
        addEntry('agent', reply.data);
      } else {
        addEntry('error', reply.error + (reply.suggestion ? '\n' + reply.suggestion : ''));
      }
    } catch (e) {
      addEntry('error', 'Request failed: ' + e.message);
    }
    setBusy(false);
  }

  promptBox.addEventListener('keydown', e => { if (e.key === 'Enter') send(); });
  addEntry('agent', 'Agent ready. Type a request to begin.');
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_omits_error_fields() {
        let json = serde_json::to_value(CommandResponse::ok("done".to_string())).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], "done");
        assert!(json.get("error").is_none());
        assert!(json.get("errorType").is_none());
        assert!(json.get("suggestion").is_none());
        assert!(json["timestamp"].as_str().is_some());
    }

    #[test]
    fn chat_error_envelope_carries_type_and_suggestion() {
        let json = serde_json::to_value(CommandResponse::chat_error(&AgentError::NoActiveTab))
            .unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorType"], "NoActiveTab");
        assert!(
            json["suggestion"]
                .as_str()
                .is_some_and(|s| s.contains("tab"))
        );
    }

    #[test]
    fn dsl_error_envelope_is_plain() {
        let error = AgentError::Browser("tab gone".to_string());
        let json = serde_json::to_value(CommandResponse::dsl_error(&error)).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("errorType").is_none());
        assert!(json.get("suggestion").is_none());
    }
}
