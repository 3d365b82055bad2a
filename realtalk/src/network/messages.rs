//! WebSocket message types for the realtime conversation API
//!
//! Every frame is a JSON object whose `type` field names the event. Client
//! events are serialized from [`ClientEvent`]; server events are parsed into
//! [`ServerEvent`], with unknown types landing in [`ServerEvent::Other`].

use serde::{Deserialize, Serialize};

use crate::config::SessionDescriptor;

// ============================================================================
// Client -> Server Messages
// ============================================================================

/// Events the client sends
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Configure the conversation; sent once after connecting
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionDescriptor },

    /// Add a user item to the conversation
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    /// Append base64 PCM to the input audio buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { event_id: String, audio: String },

    /// Close the input audio buffer as one user turn
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    /// Ask the server to respond
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// Wire name of the event
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            ClientEvent::InputAudioBufferCommit => "input_audio_buffer.commit",
            ClientEvent::ResponseCreate => "response.create",
        }
    }

    /// Append event for the `sequence`-th chunk of an upload
    pub fn audio_append(sequence: u64, audio_base64: String) -> Self {
        ClientEvent::InputAudioBufferAppend {
            event_id: format!("audio_chunk_{sequence}"),
            audio: audio_base64,
        }
    }
}

/// A conversation item created by the client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConversationItem {
    /// Item kind (always "message" for user input)
    #[serde(rename = "type")]
    pub item_type: String,
    /// Speaker role
    pub role: String,
    /// Content parts
    pub content: Vec<ContentPart>,
}

impl ConversationItem {
    /// A user message containing typed text
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            item_type: "message".to_string(),
            role: "user".to_string(),
            content: vec![ContentPart::InputText { text: text.into() }],
        }
    }

    /// A user message whose audio follows in the input audio buffer
    pub fn user_audio(source: impl Into<String>) -> Self {
        Self {
            item_type: "message".to_string(),
            role: "user".to_string(),
            content: vec![ContentPart::InputAudio {
                source: source.into(),
            }],
        }
    }
}

/// One content part of a client conversation item
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "input_text")]
    InputText { text: String },

    /// Reference to audio streamed through `input_audio_buffer.append`
    #[serde(rename = "input_audio")]
    InputAudio { source: String },
}

// ============================================================================
// Server -> Client Messages
// ============================================================================

/// Events received from the server
///
/// Uses serde's internally tagged representation on the `type` field.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Connection accepted; carries the server-side session
    #[serde(rename = "session.created")]
    SessionCreated { session: SessionInfo },

    /// Acknowledges a `session.update`
    #[serde(rename = "session.updated")]
    SessionUpdated { session: SessionInfo },

    /// One fragment of response audio
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        /// Base64 PCM or a `"[trimmed: N bytes]"` sentinel
        delta: String,
    },

    /// All fragments of one audio stream have been sent
    #[serde(rename = "response.audio.done")]
    AudioDone { response_id: String, item_id: String },

    /// A response finished, with transcripts of any audio it produced
    #[serde(rename = "response.done")]
    ResponseDone { response: ResponseBody },

    /// Server-side error report
    #[serde(rename = "error")]
    Error { error: ServerErrorBody },

    /// Updated rate limits
    #[serde(rename = "rate_limits.updated")]
    RateLimitsUpdated {
        #[serde(default)]
        rate_limits: Vec<RateLimit>,
    },

    /// Any event type this client does not handle
    #[serde(other)]
    Other,
}

/// Server-side session summary
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SessionInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
}

/// Body of `response.done`
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ResponseBody {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

impl ResponseBody {
    /// `(item_id, transcript)` for every audio part with a non-empty transcript
    pub fn audio_transcripts(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.output.iter().flat_map(|item| {
            item.content.iter().filter_map(move |part| match &part.transcript {
                Some(transcript) if part.content_type == "audio" && !transcript.is_empty() => {
                    Some((item.id.as_str(), transcript.as_str()))
                }
                _ => None,
            })
        })
    }

    /// Text of every `text` content part
    pub fn texts(&self) -> impl Iterator<Item = &str> + '_ {
        self.output.iter().flat_map(|item| {
            item.content.iter().filter_map(|part| match &part.text {
                Some(text) if part.content_type == "text" && !text.is_empty() => {
                    Some(text.as_str())
                }
                _ => None,
            })
        })
    }
}

/// One item of a response's output
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct OutputItem {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Vec<OutputContent>,
}

/// One content part of an output item
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct OutputContent {
    #[serde(default, rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
}

/// Body of an `error` event
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ServerErrorBody {
    #[serde(default, rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// One entry of `rate_limits.updated`
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RateLimit {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub remaining: u64,
    #[serde(default)]
    pub reset_seconds: f64,
}
