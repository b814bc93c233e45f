use thiserror::Error;

/// Failures that abort a whole turn. Recoverable conditions (unparsable
/// tool arguments, unresolvable selectors, invalid navigation targets) are
/// not errors here: they flow back to the model as ordinary tool-result
/// strings.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("No active tab found. Ensure a browser tab is open and active.")]
    NoActiveTab,

    #[error("Content script error: {0}")]
    ContentScript(String),

    #[error("Model API error ({status}): {body}")]
    ModelApi { status: u16, body: String },

    #[error("Invalid response from model API: {0}")]
    InvalidModelReply(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Short machine-readable name used in the response envelope.
    pub fn error_type(&self) -> &'static str {
        match self {
            AgentError::NoActiveTab => "NoActiveTab",
            AgentError::ContentScript(_) => "ContentScriptUnavailable",
            AgentError::ModelApi { .. } => "ModelApiError",
            AgentError::InvalidModelReply(_) => "InvalidModelReply",
            AgentError::Browser(_) => "BrowserError",
            AgentError::Http(_) => "HttpError",
            AgentError::Json(_) => "JsonError",
        }
    }

    /// Human-readable guidance attached when the rendered message matches
    /// one of the known failure patterns.
    pub fn suggestion(&self) -> Option<&'static str> {
        let message = self.to_string();
        if message.contains("API key") {
            Some("Check that the configured API key is valid and has sufficient credits.")
        } else if message.contains("Content script") {
            Some("Try refreshing the page and ensure the agent has permission to access this site.")
        } else if message.contains("No active tab") {
            Some("Ensure you have an active browser tab open.")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestion_matches_known_patterns() {
        assert!(AgentError::NoActiveTab.suggestion().unwrap().contains("tab"));
        assert!(
            AgentError::ContentScript("no response".to_string())
                .suggestion()
                .unwrap()
                .contains("refreshing")
        );
        let api = AgentError::ModelApi {
            status: 401,
            body: "Incorrect API key provided".to_string(),
        };
        assert!(api.suggestion().unwrap().contains("API key"));
    }

    #[test]
    fn unknown_errors_carry_no_suggestion() {
        let error = AgentError::Browser("tab crashed".to_string());
        assert!(error.suggestion().is_none());
    }

    #[test]
    fn error_type_names_are_stable() {
        assert_eq!(
            AgentError::ContentScript(String::new()).error_type(),
            "ContentScriptUnavailable"
        );
        assert_eq!(
            AgentError::ModelApi {
                status: 500,
                body: String::new()
            }
            .error_type(),
            "ModelApiError"
        );
    }
}
