//! Core data models used throughout brainstore.
//!
//! These types mirror the four persisted tables (`brains`, `brains_users`,
//! `brains_vectors`, `vectors`) plus the transient values that flow through
//! the upload pipeline (files, segments, upload messages).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

pub const DEFAULT_BRAIN_NAME: &str = "Default brain";
pub const DEFAULT_BRAIN_DESCRIPTION: &str = "This is a description";
pub const DEFAULT_BRAIN_STATUS: &str = "public";
pub const DEFAULT_BRAIN_MODEL: &str = "gpt-3.5-turbo-0613";
pub const DEFAULT_BRAIN_MAX_TOKENS: u32 = 256;

/// A brain: a named, owned collection of ingested documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brain {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub status: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Per-brain credential for the chat model. Never serialized and never
    /// used for quota decisions.
    #[serde(default, skip_serializing)]
    pub openai_api_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a brain that does not exist yet. The id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewBrain {
    pub name: String,
    pub description: String,
    pub status: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub openai_api_key: Option<String>,
}

impl Default for NewBrain {
    fn default() -> Self {
        Self {
            name: DEFAULT_BRAIN_NAME.to_string(),
            description: DEFAULT_BRAIN_DESCRIPTION.to_string(),
            status: DEFAULT_BRAIN_STATUS.to_string(),
            model: DEFAULT_BRAIN_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: DEFAULT_BRAIN_MAX_TOKENS,
            openai_api_key: None,
        }
    }
}

/// Partial update of a brain's mutable fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub openai_api_key: Option<String>,
}

impl BrainUpdate {
    pub fn is_empty(&self) -> bool {
        self == &BrainUpdate::default()
    }

    /// Apply the present fields onto `brain`.
    pub fn apply(&self, brain: &mut Brain) {
        if let Some(name) = &self.name {
            brain.name = name.clone();
        }
        if let Some(description) = &self.description {
            brain.description = description.clone();
        }
        if let Some(status) = &self.status {
            brain.status = status.clone();
        }
        if let Some(model) = &self.model {
            brain.model = model.clone();
        }
        if let Some(temperature) = self.temperature {
            brain.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            brain.max_tokens = max_tokens;
        }
        if let Some(key) = &self.openai_api_key {
            brain.openai_api_key = Some(key.clone());
        }
    }
}

/// Rights a user holds on a brain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Owner,
    Editor,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "Owner",
            Role::Editor => "Editor",
            Role::Viewer => "Viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Owner" => Ok(Role::Owner),
            "Editor" => Ok(Role::Editor),
            "Viewer" => Ok(Role::Viewer),
            other => Err(Error::Decode(format!("unknown role: '{}'", other))),
        }
    }
}

/// Membership row: a user's rights on a brain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrainUser {
    pub brain_id: Uuid,
    pub user_id: Uuid,
    pub rights: Role,
    pub default_brain: bool,
}

/// A brain as seen from one of its members.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserBrain {
    pub id: Uuid,
    pub name: String,
    pub rights: Role,
}

/// Link row between a brain and a vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrainVector {
    pub brain_id: Uuid,
    pub vector_id: Uuid,
    pub file_sha1: String,
}

/// Provenance attached to every segment and mirrored into the vector row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    /// Hex content hash of the whole source file.
    pub file_sha1: String,
    pub file_size: u64,
    pub file_name: String,
    pub file_extension: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Ingestion date as `YYYYMMDD`.
    pub date: String,
    pub summarization: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

/// A bounded slice of a file's text: the unit of embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub content: String,
    pub metadata: SegmentMetadata,
}

/// A vector row about to be written. The id is chosen by the writer so that
/// retried writes are idempotent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVector {
    pub id: Uuid,
    pub content: String,
    pub metadata: SegmentMetadata,
    /// `None` when embeddings are disabled (store-only mode).
    pub embedding: Option<Vec<f32>>,
}

/// A persisted vector row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorRecord {
    pub id: Uuid,
    pub content: String,
    pub metadata: SegmentMetadata,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

/// One entry of the distinct-files view of a brain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileSummary {
    pub name: String,
    pub size: u64,
}

/// Outcome class of an upload, serialized as the message `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Success,
    Warning,
    Error,
}

/// Status message returned by the upload flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadMessage {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
}

impl UploadMessage {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: MessageType::Success,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: MessageType::Warning,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: MessageType::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageType::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::Owner, Role::Editor, Role::Viewer] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_brain_update_applies_only_present_fields() {
        let mut brain = Brain {
            id: Uuid::new_v4(),
            name: "notes".into(),
            description: "d".into(),
            status: "private".into(),
            model: DEFAULT_BRAIN_MODEL.into(),
            temperature: 0.0,
            max_tokens: 256,
            openai_api_key: None,
            created_at: Utc::now(),
        };
        let update = BrainUpdate {
            name: Some("papers".into()),
            temperature: Some(0.7),
            ..Default::default()
        };
        update.apply(&mut brain);
        assert_eq!(brain.name, "papers");
        assert_eq!(brain.temperature, 0.7);
        assert_eq!(brain.status, "private");
        assert!(!update.is_empty());
        assert!(BrainUpdate::default().is_empty());
    }

    #[test]
    fn test_brain_key_is_not_serialized() {
        let brain = Brain {
            id: Uuid::nil(),
            name: "notes".into(),
            description: String::new(),
            status: DEFAULT_BRAIN_STATUS.into(),
            model: DEFAULT_BRAIN_MODEL.into(),
            temperature: 0.0,
            max_tokens: DEFAULT_BRAIN_MAX_TOKENS,
            openai_api_key: Some("sk-secret".into()),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&brain).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_upload_message_serializes_type_field() {
        let msg = UploadMessage::error("too big");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "too big");
        assert!(msg.is_error());
        assert!(!UploadMessage::warning("dup").is_error());
    }

    #[test]
    fn test_segment_metadata_omits_missing_url() {
        let meta = SegmentMetadata {
            file_sha1: "abc".into(),
            file_size: 12,
            file_name: "a.txt".into(),
            file_extension: ".txt".into(),
            chunk_size: 500,
            chunk_overlap: 0,
            date: "20260101".into(),
            summarization: false,
            file_url: None,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("file_url").is_none());
        let back: SegmentMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}
