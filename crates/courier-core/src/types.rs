use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Correspondent,
    Agent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Correspondent => write!(f, "correspondent"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

/// One message-equivalent unit of dialogue. Immutable once written; the
/// stored log is append-only apart from FIFO truncation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn correspondent(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Correspondent,
            content: content.into(),
            timestamp,
        }
    }

    pub fn agent(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
            timestamp,
        }
    }
}

/// Payload kind of a normalized inbound message.
///
/// Non-text kinds arrive with `text` already filled by the upstream
/// decryption/transcription/captioning stage; the kind only survives as a
/// bracketed label in prompts and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundKind {
    Text,
    Image,
    Audio,
    Voice,
    Video,
    Document,
}

impl InboundKind {
    /// Bracketed media-type label appended to non-text inputs. `None` for text.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            InboundKind::Text => None,
            InboundKind::Image => Some("[image]"),
            InboundKind::Audio => Some("[audio]"),
            InboundKind::Voice => Some("[voice message]"),
            InboundKind::Video => Some("[video]"),
            InboundKind::Document => Some("[document]"),
        }
    }
}

/// Normalized inbound turn delivered by the transport boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Stable correspondent address (e.g. a phone number).
    pub correspondent_id: String,
    pub kind: InboundKind,
    /// Plain-text representation of the payload (transcript/caption for media).
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub media_url: Option<String>,
    /// Transport-provided display name, used once for profile derivation.
    #[serde(default)]
    pub sender_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Media asset kinds the transport can deliver outbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// One entry of the external media catalog. Read-only from the relay's
/// perspective; refreshed on its own TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub id: u32,
    pub url: String,
    pub kind: MediaKind,
    #[serde(default)]
    pub caption: Option<String>,
    pub description: String,
}

/// Cached per-correspondent attributes, written lazily on first contact and
/// read-only thereafter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrespondentProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    /// Inferred grammatical gender / locale hint ("male", "female", "unknown").
    #[serde(default)]
    pub gender_hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// One entry of the ordered instruction sequence sent to the completion
/// service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}
