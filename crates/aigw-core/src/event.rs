//! Normalized stream-event protocol
//!
//! Every relayed request produces exactly one ordered event sequence:
//! `route`, zero or more `thinking`/`delta`/`audio`, then exactly one
//! terminal `done` or `error`. Nothing is emitted after the terminal
//! event.

use serde::{Deserialize, Serialize};

/// Why the router picked a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    /// An operator alias resolved directly to the backend
    Alias,
    /// Domain-based capability match
    Domain,
    /// Next-best entry after the first selection failed to connect
    Reroute,
}

/// One event in a relayed response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Routing decision; always the first event of a relay
    Route {
        /// Selected backend name
        backend: String,
        /// Model the request resolves to
        model: String,
        /// Selection reason
        reason: RouteReason,
    },
    /// Incremental reasoning text
    Thinking {
        /// Text fragment
        text: String,
    },
    /// Incremental response text
    Delta {
        /// Text fragment
        text: String,
    },
    /// Generated audio artifact
    Audio {
        /// URL of the audio payload
        url: String,
    },
    /// Terminal failure
    Error {
        /// Backend involved, if the failure is attributable
        #[serde(skip_serializing_if = "Option::is_none")]
        backend: Option<String>,
        /// Machine-readable cause
        code: String,
        /// Human-readable message
        message: String,
    },
    /// Terminal success
    Done,
}

impl StreamEvent {
    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }

    /// SSE event name for this variant.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Route { .. } => "route",
            StreamEvent::Thinking { .. } => "thinking",
            StreamEvent::Delta { .. } => "delta",
            StreamEvent::Audio { .. } => "audio",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Done => "done",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_serialization() {
        let e = StreamEvent::Route {
            backend: "ollama".to_string(),
            model: "llama3".to_string(),
            reason: RouteReason::Domain,
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "route");
        assert_eq!(json["reason"], "domain");
    }

    #[test]
    fn test_terminal_detection() {
        assert!(StreamEvent::Done.is_terminal());
        assert!(StreamEvent::Error {
            backend: None,
            code: "timeout".to_string(),
            message: "idle".to_string(),
        }
        .is_terminal());
        assert!(!StreamEvent::Delta {
            text: "hi".to_string()
        }
        .is_terminal());
    }

    #[test]
    fn test_upstream_event_parses() {
        let e: StreamEvent =
            serde_json::from_str(r#"{"type":"delta","text":"hello"}"#).unwrap();
        assert_eq!(
            e,
            StreamEvent::Delta {
                text: "hello".to_string()
            }
        );
    }
}
