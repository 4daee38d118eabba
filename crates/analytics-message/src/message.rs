//! Event types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An analytics event payload.
///
/// Events are free-form JSON objects; the engine only looks at a handful of
/// well-known keys (`userId`, `anonymousId`, `context`, `messageId`, ...).
pub type Event = serde_json::Map<String, serde_json::Value>;

/// The six event kinds accepted by the ingestion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Identify,
    Group,
    Track,
    Page,
    Screen,
    Alias,
}

impl MessageType {
    /// Wire name of the type, as written into the event's `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Identify => "identify",
            MessageType::Group => "group",
            MessageType::Track => "track",
            MessageType::Page => "page",
            MessageType::Screen => "screen",
            MessageType::Alias => "alias",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identify" => Ok(MessageType::Identify),
            "group" => Ok(MessageType::Group),
            "track" => Ok(MessageType::Track),
            "page" => Ok(MessageType::Page),
            "screen" => Ok(MessageType::Screen),
            "alias" => Ok(MessageType::Alias),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

/// Library identity stamped into `context.library` and the user agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryInfo {
    pub name: String,
    pub version: String,
}

impl LibraryInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// `<name>/<version>`, used as the HTTP user agent.
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}
