//! Shared types for the financial advisor chat service and its clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =====================================================
// Chat Turn Types
// =====================================================

/// An uploaded file as the chat surface reports it.
///
/// Clients send either a bare path string or an object carrying a `path`
/// and/or `name` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileRef {
    Plain(String),
    Named(NamedFile),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl FileRef {
    pub fn plain(path: impl Into<String>) -> Self {
        FileRef::Plain(path.into())
    }

    pub fn named(path: impl Into<String>, name: impl Into<String>) -> Self {
        FileRef::Named(NamedFile {
            path: Some(path.into()),
            name: Some(name.into()),
        })
    }

    /// Resolve this reference to a single path string.
    ///
    /// Records prefer `path` and fall back to `name`; blank values count as
    /// absent. Returns `None` when nothing usable is present.
    pub fn resolve(&self) -> Option<&str> {
        match self {
            FileRef::Plain(path) => non_blank(path),
            FileRef::Named(record) => record
                .path
                .as_deref()
                .and_then(non_blank)
                .or_else(|| record.name.as_deref().and_then(non_blank)),
        }
    }
}

fn non_blank(s: &str) -> Option<&str> {
    if s.trim().is_empty() { None } else { Some(s) }
}

/// One user interaction: message text plus optional attachments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub files: Vec<FileRef>,
    /// Prior conversation as the chat surface sends it. Accepted, never read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Value>,
    /// Chat session the turn belongs to; artifacts and ordering are scoped to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ChatTurn {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_files(mut self, files: Vec<FileRef>) -> Self {
        self.files = files;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// What the chat surface renders for a turn: bare text, or text plus
/// attachment paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnReply {
    Text(String),
    WithFiles { text: String, files: Vec<String> },
}

impl TurnReply {
    pub fn text(&self) -> &str {
        match self {
            TurnReply::Text(text) => text,
            TurnReply::WithFiles { text, .. } => text,
        }
    }

    pub fn files(&self) -> &[String] {
        match self {
            TurnReply::Text(_) => &[],
            TurnReply::WithFiles { files, .. } => files,
        }
    }
}

// =====================================================
// HTTP Response Types
// =====================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<TurnReply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
    /// Where the chart attached to this turn can be fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
}

impl ChatResponse {
    pub fn ok(turn_id: impl Into<String>, reply: TurnReply) -> Self {
        Self {
            success: true,
            reply: Some(reply),
            error: None,
            turn_id: Some(turn_id.into()),
            artifact_url: None,
        }
    }

    pub fn with_artifact_url(mut self, url: impl Into<String>) -> Self {
        self.artifact_url = Some(url.into());
        self
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            reply: None,
            error: Some(msg.into()),
            turn_id: None,
            artifact_url: None,
        }
    }
}

/// Layout hints for the chat widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUiConfig {
    pub title: String,
    pub placeholder_html: String,
    pub multimodal: bool,
    pub file_count: String,
    pub height: u32,
}
