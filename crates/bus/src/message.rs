use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Interaction category of a protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    /// Request accepted before start.
    Consent,
    /// Request rejected before start.
    Refusal,
    /// Progress or completion.
    Inform,
    /// Runtime error.
    Failure,
    /// Out-of-band status change (e.g. precondition retry).
    Update,
    /// Inbound skill request.
    Request,
}

impl MessageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consent => "consent",
            Self::Refusal => "refusal",
            Self::Inform => "inform",
            Self::Failure => "failure",
            Self::Update => "update",
            Self::Request => "request",
        }
    }
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub role: String,
}

impl Participant {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }
}

/// Protocol frame of a conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub category: MessageCategory,
    pub conversation_id: String,
    pub sender: Participant,
    pub receiver: Participant,
}

/// Wire envelope for everything that crosses the bus.
///
/// The envelope itself and its payload are MessagePack encoded. `topic`
/// drives subscriber-side prefix filtering; `frame` is present on
/// conversation messages and absent on broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,

    #[serde(with = "raw_bytes")]
    pub payload: Vec<u8>,

    pub timestamp: DateTime<Utc>,

    /// Unique per message.
    pub message_id: Uuid,

    #[serde(default)]
    pub frame: Option<Frame>,

    /// Payload schema version.
    #[serde(default = "default_version")]
    pub version: u16,
}

fn default_version() -> u16 {
    1
}

impl Message {
    /// Unframed message, e.g. a queue broadcast.
    pub fn new<T: Serialize>(
        topic: impl Into<String>,
        payload: &T,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self {
            topic: topic.into(),
            payload: rmp_serde::to_vec(payload)?,
            timestamp: Utc::now(),
            message_id: Uuid::new_v4(),
            frame: None,
            version: 1,
        })
    }

    /// Conversation message carrying a protocol frame.
    pub fn framed<T: Serialize>(
        topic: impl Into<String>,
        frame: Frame,
        payload: &T,
    ) -> Result<Self, rmp_serde::encode::Error> {
        let mut message = Self::new(topic, payload)?;
        message.frame = Some(frame);
        Ok(message)
    }

    pub fn category(&self) -> Option<MessageCategory> {
        self.frame.as_ref().map(|f| f.category)
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.frame.as_ref().map(|f| f.conversation_id.as_str())
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.payload)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

// MessagePack bin encoding for the payload instead of an int array.
mod raw_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}
