//! Stream event payloads.
//!
//! Each SSE event emitted by the relay carries exactly one JSON object in its
//! `data` field. Fragment events have no `event:` name; the single terminal
//! failure event is named [`ERROR_EVENT`].

use serde::{Deserialize, Serialize};

/// Line prefix that marks an SSE data field.
pub const DATA_PREFIX: &str = "data: ";

/// Event name used for a terminal mid-stream failure.
pub const ERROR_EVENT: &str = "error";

/// One generated text fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentChunk {
    pub content: String,
}

/// Terminal failure notice sent when the upstream stream breaks after streaming began.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFailure {
    pub error: String,
}

/// Lenient view of any event payload, as read by clients.
///
/// Unknown fields are ignored so newer relays stay readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamPayload {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StreamPayload {
    /// Parse the text following `data: `.
    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    /// The fragment to append, if any. Empty fragments carry nothing.
    pub fn fragment(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_serialization() {
        let chunk = ContentChunk {
            content: "Hel".to_string(),
        };
        assert_eq!(serde_json::to_string(&chunk).unwrap(), r#"{"content":"Hel"}"#);
    }

    #[test]
    fn test_payload_fragment() {
        let payload = StreamPayload::parse(r#"{"content":"lo"}"#).unwrap();
        assert_eq!(payload.fragment(), Some("lo"));

        let empty = StreamPayload::parse(r#"{"content":""}"#).unwrap();
        assert_eq!(empty.fragment(), None);

        let failure = StreamPayload::parse(r#"{"error":"boom","extra":1}"#).unwrap();
        assert_eq!(failure.fragment(), None);
        assert_eq!(failure.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_payload_rejects_non_json() {
        assert!(StreamPayload::parse("not json").is_err());
    }
}
