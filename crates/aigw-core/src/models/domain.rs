//! Capability domain model
//!
//! Domains are a validated closed set with an opaque fallback so that a
//! backend advertising a domain this gateway predates still routes and
//! lists correctly.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A capability category advertised by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Domain {
    /// Conversational text generation
    Chat,
    /// Image generation
    Image,
    /// Speech synthesis / audio generation
    Audio,
    /// Tool / function execution
    Tool,
    /// Vector embeddings
    Embedding,
    /// Forward-compatibility fallback for domains this gateway does not
    /// know about yet
    Other(String),
}

impl Domain {
    /// Canonical lowercase name of the domain
    pub fn as_str(&self) -> &str {
        match self {
            Domain::Chat => "chat",
            Domain::Image => "image",
            Domain::Audio => "audio",
            Domain::Tool => "tool",
            Domain::Embedding => "embedding",
            Domain::Other(s) => s,
        }
    }
}

impl From<String> for Domain {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "chat" => Domain::Chat,
            "image" => Domain::Image,
            "audio" => Domain::Audio,
            "tool" => Domain::Tool,
            "embedding" => Domain::Embedding,
            _ => Domain::Other(s.to_lowercase()),
        }
    }
}

impl From<&str> for Domain {
    fn from(s: &str) -> Self {
        Domain::from(s.to_string())
    }
}

impl From<Domain> for String {
    fn from(d: Domain) -> Self {
        d.as_str().to_string()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
